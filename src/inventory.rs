//! The node's MQTT behavior.
//!
//! On every session it subscribes to [`DATA_TOPIC`] (QoS 0) and [`ACK_TOPIC`]
//! (QoS 1), then immediately unsubscribes from [`ACK_TOPIC`]. Each SUBACK is
//! answered with a `data` publish on [`DATA_TOPIC`]. Inbound messages are
//! logged and decoded as [`ItemRecord`]s. A status report can optionally be
//! published on [`STATUS_TOPIC`].

use embassy_time::{Duration, Instant};

use crate::config::AppConfig;
use crate::packet::{Publish, QoS};
use crate::payload::{self, ItemRecord, StatusReport};
use crate::runtime::{MqttModule, SessionOutbox, TopicCollector};

pub const DATA_TOPIC: &str = "/topic/qos0";
pub const ACK_TOPIC: &str = "/topic/qos1";
pub const STATUS_TOPIC: &str = "/topic/test3";

/// Published on [`DATA_TOPIC`] for every acknowledged subscription.
pub const SUBSCRIBED_PAYLOAD: &[u8] = b"data";

/// Tick interval while no status report is configured.
const IDLE_TICK: Duration = Duration::from_secs(3600);

pub struct InventoryModule {
    client_id: &'static str,
    status_interval: Option<Duration>,
    started_at: Instant,
    last_record: Option<ItemRecord>,
    received: u32,
    decode_failures: u32,
}

impl InventoryModule {
    pub fn new(client_id: &'static str) -> Self {
        Self {
            client_id,
            status_interval: None,
            started_at: Instant::now(),
            last_record: None,
            received: 0,
            decode_failures: 0,
        }
    }

    /// Publishes a status report every `interval`.
    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = Some(interval);
        self
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let module = Self::new(config.broker.client_id);
        match config.status_interval_secs {
            Some(secs) if secs > 0 => module.with_status_interval(Duration::from_secs(secs as u64)),
            _ => module,
        }
    }

    /// The most recent record that decoded cleanly.
    pub fn last_record(&self) -> Option<&ItemRecord> {
        self.last_record.as_ref()
    }

    /// Messages received since start.
    pub fn received(&self) -> u32 {
        self.received
    }

    pub fn decode_failures(&self) -> u32 {
        self.decode_failures
    }
}

impl MqttModule for InventoryModule {
    fn register(&self, collector: &mut dyn TopicCollector) {
        collector.add(DATA_TOPIC, QoS::AtMostOnce);
        collector.add(ACK_TOPIC, QoS::AtLeastOnce);
    }

    fn on_start(&mut self, outbox: &mut dyn SessionOutbox) {
        outbox.unsubscribe(ACK_TOPIC);
    }

    fn on_subscribed(&mut self, _packet_id: u16, outbox: &mut dyn SessionOutbox) {
        outbox.publish(DATA_TOPIC, SUBSCRIBED_PAYLOAD, QoS::AtMostOnce);
    }

    fn on_message(&mut self, msg: &Publish<'_>) {
        self.received = self.received.wrapping_add(1);
        info!("TOPIC={}", msg.topic);
        match core::str::from_utf8(msg.payload) {
            Ok(text) => info!("DATA={}", text),
            Err(_) => info!("DATA=<{} bytes>", msg.payload.len()),
        }

        match payload::decode_item(msg.payload) {
            Ok(record) => {
                info!(
                    "Item: {}, Qty: {} , Type: {}",
                    record.item.as_str(),
                    record.qty,
                    record.kind.as_str()
                );
                self.last_record = Some(record);
            }
            Err(e) => {
                self.decode_failures = self.decode_failures.wrapping_add(1);
                warn!("error parsing payload: {}", e.describe());
            }
        }
    }

    fn on_tick(&mut self, outbox: &mut dyn SessionOutbox) -> Duration {
        let Some(interval) = self.status_interval else {
            return IDLE_TICK;
        };

        let report = StatusReport {
            name: self.client_id,
            uptime_s: self.started_at.elapsed().as_secs(),
        };
        let mut buf = [0u8; 96];
        match payload::encode_status(&report, &mut buf) {
            Ok(len) => outbox.publish(STATUS_TOPIC, &buf[..len], QoS::AtMostOnce),
            Err(_) => warn!("status report does not fit its buffer"),
        }
        interval
    }
}
