//! Publish requests from other tasks, and the outbox modules queue into.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use heapless::{String, Vec};

use super::traits::SessionOutbox;
use crate::QoS;

/// A request to publish a message, sent over a channel to the runtime.
///
/// Topic and payload are borrowed; producers on embedded targets normally
/// hand in `'static` data.
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: QoS,
}

pub type PublishRequestChannel<'a, const OUTBOX_DEPTH: usize> =
    Channel<CriticalSectionRawMutex, PublishRequest<'a>, OUTBOX_DEPTH>;

pub type PublishRequestSender<'a, const OUTBOX_DEPTH: usize> =
    Sender<'a, CriticalSectionRawMutex, PublishRequest<'a>, OUTBOX_DEPTH>;

pub type PublishRequestReceiver<'a, const OUTBOX_DEPTH: usize> =
    Receiver<'a, CriticalSectionRawMutex, PublishRequest<'a>, OUTBOX_DEPTH>;

/// Lets any task publish through the session without touching the client.
///
/// The handle is `Copy`; the runtime owns the receiving end and performs the
/// actual publish.
#[derive(Clone, Copy)]
pub struct PublisherHandle<'a, const OUTBOX_DEPTH: usize> {
    tx: PublishRequestSender<'a, OUTBOX_DEPTH>,
}

impl<'a, const OUTBOX_DEPTH: usize> PublisherHandle<'a, OUTBOX_DEPTH> {
    pub fn new(tx: PublishRequestSender<'a, OUTBOX_DEPTH>) -> Self {
        Self { tx }
    }

    /// Queues a publish, waiting while the channel is full.
    pub async fn publish(&self, topic: &'a str, payload: &'a [u8], qos: QoS) {
        self.tx
            .send(PublishRequest {
                topic,
                payload,
                qos,
            })
            .await;
    }

    /// Queues a publish without waiting. Returns `false` if the channel is full.
    pub fn try_publish(&self, topic: &'a str, payload: &'a [u8], qos: QoS) -> bool {
        self.tx
            .try_send(PublishRequest {
                topic,
                payload,
                qos,
            })
            .is_ok()
    }
}

/// A publish with inline storage for topic and payload.
#[derive(Debug, Clone)]
pub struct OwnedPublishRequest<const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize> {
    pub topic: String<TOPIC_SIZE>,
    pub payload: Vec<u8, PAYLOAD_SIZE>,
    pub qos: QoS,
}

/// Something a module asked the session to do.
#[derive(Debug, Clone)]
pub enum OutboxRequest<const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize> {
    Publish(OwnedPublishRequest<TOPIC_SIZE, PAYLOAD_SIZE>),
    Unsubscribe(String<TOPIC_SIZE>),
}

/// Collects module requests during a callback so the runtime can carry them
/// out afterwards, in order.
///
/// Requests that do not fit (outbox full, topic or payload too long) are
/// dropped with a warning.
pub struct BufferedOutbox<const CAPACITY: usize, const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize>
{
    requests: Vec<OutboxRequest<TOPIC_SIZE, PAYLOAD_SIZE>, CAPACITY>,
}

impl<const CAPACITY: usize, const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize>
    BufferedOutbox<CAPACITY, TOPIC_SIZE, PAYLOAD_SIZE>
{
    pub fn new() -> Self {
        Self {
            requests: Vec::new(),
        }
    }

    pub fn requests(&self) -> &[OutboxRequest<TOPIC_SIZE, PAYLOAD_SIZE>] {
        &self.requests
    }

    pub fn clear(&mut self) {
        self.requests.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    fn push(&mut self, request: OutboxRequest<TOPIC_SIZE, PAYLOAD_SIZE>) {
        if self.requests.push(request).is_err() {
            warn!("outbox full, request dropped");
        }
    }
}

impl<const CAPACITY: usize, const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize> Default
    for BufferedOutbox<CAPACITY, TOPIC_SIZE, PAYLOAD_SIZE>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAPACITY: usize, const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize> SessionOutbox
    for BufferedOutbox<CAPACITY, TOPIC_SIZE, PAYLOAD_SIZE>
{
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) {
        let mut topic_str = String::new();
        let mut payload_vec = Vec::new();
        if topic_str.push_str(topic).is_err() || payload_vec.extend_from_slice(payload).is_err() {
            warn!("publish to {} dropped, does not fit the outbox", topic);
            return;
        }
        self.push(OutboxRequest::Publish(OwnedPublishRequest {
            topic: topic_str,
            payload: payload_vec,
            qos,
        }));
    }

    fn unsubscribe(&mut self, topic: &str) {
        let mut topic_str = String::new();
        if topic_str.push_str(topic).is_err() {
            warn!("unsubscribe from {} dropped, topic too long", topic);
            return;
        }
        self.push(OutboxRequest::Unsubscribe(topic_str));
    }
}
