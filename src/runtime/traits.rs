//! The `MqttModule` trait and its supporting collector/outbox traits.
//!
//! Modules never perform async I/O directly. They queue requests on a
//! [`SessionOutbox`] and the runtime carries them out after the callback
//! returns, which keeps every method synchronous and the trait dyn-compatible.

use embassy_time::Duration;

use crate::packet::{Publish, QoS};

/// Object-safe sink for requests a module wants the session to perform.
///
/// ```ignore
/// fn on_tick(&mut self, outbox: &mut dyn SessionOutbox) -> Duration {
///     outbox.publish("device/state", b"online", QoS::AtMostOnce);
///     Duration::from_secs(30)
/// }
/// ```
pub trait SessionOutbox {
    /// Queue a message for publishing.
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS);

    /// Queue an unsubscribe from `topic`.
    fn unsubscribe(&mut self, topic: &str);
}

/// Collects the topics a module subscribes to when a session starts.
pub trait TopicCollector {
    /// Add a topic filter at the requested QoS.
    ///
    /// The topic is copied, so it only needs to live for the duration of the
    /// call. Returns `false` if the collector is full or the topic too long.
    fn add(&mut self, topic: &str, qos: QoS) -> bool;
}

/// Application logic driven by [`MqttRuntime`](super::MqttRuntime).
///
/// A module declares its subscriptions in `register`, reacts to broker events
/// and queues outbound work through a [`SessionOutbox`].
///
/// ```ignore
/// const CMD_TOPIC: &str = "device/cmd";
///
/// struct Echo {
///     pending: bool,
/// }
///
/// impl MqttModule for Echo {
///     fn register(&self, collector: &mut dyn TopicCollector) {
///         collector.add(CMD_TOPIC, QoS::AtMostOnce);
///     }
///
///     fn on_message(&mut self, msg: &Publish<'_>) {
///         self.pending = msg.topic == CMD_TOPIC;
///     }
///
///     fn on_tick(&mut self, outbox: &mut dyn SessionOutbox) -> Duration {
///         if core::mem::take(&mut self.pending) {
///             outbox.publish("device/ack", b"ok", QoS::AtMostOnce);
///         }
///         Duration::from_secs(30)
///     }
///
///     fn needs_immediate_publish(&self) -> bool {
///         self.pending
///     }
/// }
/// ```
pub trait MqttModule {
    /// Register the topics to subscribe to, in subscription order.
    fn register(&self, collector: &mut dyn TopicCollector);

    /// Handle an inbound application message.
    ///
    /// The message borrows the client's receive buffer, so replies cannot be
    /// sent from here. Record what is needed and answer from `on_tick`
    /// (see `needs_immediate_publish`).
    fn on_message(&mut self, msg: &Publish<'_>);

    /// Periodic work. Returns the delay until the next tick.
    fn on_tick(&mut self, _outbox: &mut dyn SessionOutbox) -> Duration {
        Duration::from_secs(60)
    }

    /// Called once per session, after the subscriptions have been sent.
    fn on_start(&mut self, _outbox: &mut dyn SessionOutbox) {}

    /// The broker acknowledged a SUBSCRIBE.
    fn on_subscribed(&mut self, _packet_id: u16, _outbox: &mut dyn SessionOutbox) {}

    /// The broker acknowledged an UNSUBSCRIBE.
    fn on_unsubscribed(&mut self, _packet_id: u16) {}

    /// If `true` after `on_message`, `on_tick` runs right away.
    fn needs_immediate_publish(&self) -> bool {
        false
    }
}

/// A module that subscribes to nothing and ignores everything.
pub struct NoopModule;

impl MqttModule for NoopModule {
    fn register(&self, _collector: &mut dyn TopicCollector) {}

    fn on_message(&mut self, _msg: &Publish<'_>) {}
}

/// Two modules driven as one. Both see every event.
pub struct ModulePair<M1, M2> {
    pub first: M1,
    pub second: M2,
}

impl<M1, M2> ModulePair<M1, M2> {
    pub fn new(first: M1, second: M2) -> Self {
        Self { first, second }
    }
}

impl<M1, M2> MqttModule for ModulePair<M1, M2>
where
    M1: MqttModule,
    M2: MqttModule,
{
    fn register(&self, collector: &mut dyn TopicCollector) {
        self.first.register(collector);
        self.second.register(collector);
    }

    fn on_message(&mut self, msg: &Publish<'_>) {
        self.first.on_message(msg);
        self.second.on_message(msg);
    }

    fn on_tick(&mut self, outbox: &mut dyn SessionOutbox) -> Duration {
        let d1 = self.first.on_tick(outbox);
        let d2 = self.second.on_tick(outbox);
        d1.min(d2)
    }

    fn on_start(&mut self, outbox: &mut dyn SessionOutbox) {
        self.first.on_start(outbox);
        self.second.on_start(outbox);
    }

    fn on_subscribed(&mut self, packet_id: u16, outbox: &mut dyn SessionOutbox) {
        self.first.on_subscribed(packet_id, outbox);
        self.second.on_subscribed(packet_id, outbox);
    }

    fn on_unsubscribed(&mut self, packet_id: u16) {
        self.first.on_unsubscribed(packet_id);
        self.second.on_unsubscribed(packet_id);
    }

    fn needs_immediate_publish(&self) -> bool {
        self.first.needs_immediate_publish() || self.second.needs_immediate_publish()
    }
}

/// Lets `&mut dyn MqttModule` be used wherever a module is expected.
impl<M: MqttModule + ?Sized> MqttModule for &mut M {
    fn register(&self, collector: &mut dyn TopicCollector) {
        (**self).register(collector)
    }

    fn on_message(&mut self, msg: &Publish<'_>) {
        (**self).on_message(msg)
    }

    fn on_tick(&mut self, outbox: &mut dyn SessionOutbox) -> Duration {
        (**self).on_tick(outbox)
    }

    fn on_start(&mut self, outbox: &mut dyn SessionOutbox) {
        (**self).on_start(outbox)
    }

    fn on_subscribed(&mut self, packet_id: u16, outbox: &mut dyn SessionOutbox) {
        (**self).on_subscribed(packet_id, outbox)
    }

    fn on_unsubscribed(&mut self, packet_id: u16) {
        (**self).on_unsubscribed(packet_id)
    }

    fn needs_immediate_publish(&self) -> bool {
        (**self).needs_immediate_publish()
    }
}
