//! Module runtime on top of [`MqttClient`](crate::MqttClient).
//!
//! A runtime serves one broker session for one [`MqttModule`]: it subscribes
//! to the topics the module registers, hands it inbound messages and broker
//! acknowledgements, ticks it periodically and performs whatever the module
//! queued in its [`SessionOutbox`]. Other tasks publish through a
//! [`PublisherHandle`] backed by a static channel; the client itself is never
//! shared.

pub(crate) mod event_loop;
pub(crate) mod publisher;
pub(crate) mod registry;
pub(crate) mod traits;

pub use event_loop::{MqttRuntime, OUTBOX_CAPACITY, OUTBOX_PAYLOAD_SIZE};
pub use publisher::{
    BufferedOutbox, OutboxRequest, OwnedPublishRequest, PublishRequest, PublishRequestChannel,
    PublishRequestReceiver, PublishRequestSender, PublisherHandle,
};
pub use registry::TopicRegistry;
pub use traits::{ModulePair, MqttModule, NoopModule, SessionOutbox, TopicCollector};

pub use crate::packet::Publish;
