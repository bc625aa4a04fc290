//! The runtime loop: one client, one module, one publish channel.

use embassy_futures::select::{Either3, select3};
use embassy_time::{Instant, Timer};

use super::publisher::{BufferedOutbox, OutboxRequest, PublishRequestReceiver};
use super::registry::TopicRegistry;
use super::traits::MqttModule;
use crate::client::{MAX_TOPIC_LEN, MqttClient, MqttEvent};
use crate::error::MqttError;
use crate::transport::MqttTransport;

/// Requests a module may queue during one callback.
pub const OUTBOX_CAPACITY: usize = 8;
/// Largest payload a module may queue.
pub const OUTBOX_PAYLOAD_SIZE: usize = 128;

type ModuleOutbox = BufferedOutbox<OUTBOX_CAPACITY, MAX_TOPIC_LEN, OUTBOX_PAYLOAD_SIZE>;

/// Drives an [`MqttModule`] over an [`MqttClient`] for the lifetime of one
/// broker session.
///
/// ```ignore
/// static PUBLISH_CHANNEL: PublishRequestChannel<'static, 4> = Channel::new();
///
/// let client = MqttClient::<_, 4, 1024>::new(transport, options);
/// let mut runtime = MqttRuntime::new(client, &mut module, PUBLISH_CHANNEL.receiver());
/// if let Err(e) = runtime.run().await {
///     warn!("session ended: {}", e.describe());
/// }
/// ```
pub struct MqttRuntime<
    'a,
    'r,
    T,
    M,
    const MAX_TOPICS: usize,
    const BUF_SIZE: usize,
    const OUTBOX_DEPTH: usize,
> {
    client: MqttClient<'a, T, MAX_TOPICS, BUF_SIZE>,
    module: M,
    requests: PublishRequestReceiver<'r, OUTBOX_DEPTH>,
}

impl<'a, 'r, T, M, const MAX_TOPICS: usize, const BUF_SIZE: usize, const OUTBOX_DEPTH: usize>
    MqttRuntime<'a, 'r, T, M, MAX_TOPICS, BUF_SIZE, OUTBOX_DEPTH>
where
    T: MqttTransport,
    M: MqttModule,
{
    pub fn new(
        client: MqttClient<'a, T, MAX_TOPICS, BUF_SIZE>,
        module: M,
        requests: PublishRequestReceiver<'r, OUTBOX_DEPTH>,
    ) -> Self {
        Self {
            client,
            module,
            requests,
        }
    }

    pub fn client(&self) -> &MqttClient<'a, T, MAX_TOPICS, BUF_SIZE> {
        &self.client
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn into_parts(self) -> (MqttClient<'a, T, MAX_TOPICS, BUF_SIZE>, M) {
        (self.client, self.module)
    }

    /// Connects, subscribes to the module's topics and serves the session.
    ///
    /// Only returns on error; the caller decides whether to reconnect.
    pub async fn run(&mut self) -> Result<(), MqttError<T::Error>> {
        self.client.connect().await?;
        info!("session established");

        let mut registry = TopicRegistry::<MAX_TOPICS>::new();
        self.module.register(&mut registry);
        for (topic, qos) in registry.iter() {
            let packet_id = self.client.subscribe(topic, qos).await?;
            info!("sent subscribe successful, msg_id={}", packet_id);
        }

        let mut outbox = ModuleOutbox::new();
        self.module.on_start(&mut outbox);
        self.flush(&mut outbox).await?;

        let mut next_tick = Instant::now();
        loop {
            let woke = select3(
                self.client.poll(),
                self.requests.receive(),
                Timer::at(next_tick),
            )
            .await;

            match woke {
                Either3::First(event) => match event? {
                    Some(MqttEvent::Message(msg)) => {
                        debug!("message on {} ({} bytes)", msg.topic, msg.payload.len());
                        self.module.on_message(&msg);
                        if self.module.needs_immediate_publish() {
                            next_tick = Instant::now() + self.module.on_tick(&mut outbox);
                        }
                    }
                    Some(MqttEvent::Subscribed {
                        packet_id,
                        rejected,
                    }) => {
                        if rejected {
                            warn!("broker rejected subscription, msg_id={}", packet_id);
                        } else {
                            info!("subscribed, msg_id={}", packet_id);
                        }
                        self.module.on_subscribed(packet_id, &mut outbox);
                    }
                    Some(MqttEvent::Unsubscribed { packet_id }) => {
                        info!("unsubscribed, msg_id={}", packet_id);
                        self.module.on_unsubscribed(packet_id);
                    }
                    Some(MqttEvent::Published { packet_id }) => {
                        info!("published, msg_id={}", packet_id);
                    }
                    Some(MqttEvent::PingResponse) => trace!("ping response"),
                    None => {}
                },
                Either3::Second(request) => {
                    let packet_id = self
                        .client
                        .publish(request.topic, request.payload, request.qos)
                        .await?;
                    info!(
                        "sent publish successful, msg_id={}",
                        packet_id.unwrap_or(0)
                    );
                }
                Either3::Third(()) => {
                    next_tick = Instant::now() + self.module.on_tick(&mut outbox);
                }
            }

            self.flush(&mut outbox).await?;
        }
    }

    /// Carries out everything the module queued, in order.
    async fn flush(&mut self, outbox: &mut ModuleOutbox) -> Result<(), MqttError<T::Error>> {
        for request in outbox.requests() {
            match request {
                OutboxRequest::Publish(p) => {
                    let packet_id = self.client.publish(&p.topic, &p.payload, p.qos).await?;
                    info!(
                        "sent publish successful, msg_id={}",
                        packet_id.unwrap_or(0)
                    );
                }
                OutboxRequest::Unsubscribe(topic) => {
                    let packet_id = self.client.unsubscribe(topic).await?;
                    info!("sent unsubscribe successful, msg_id={}", packet_id);
                }
            }
        }
        outbox.clear();
        Ok(())
    }
}
