//! In-memory transport and broker frame builders for unit tests.

use std::collections::VecDeque;
use std::vec::Vec;

use crate::packet::{EncodePacket, Publish, QoS};
use crate::transport::{MqttTransport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockError {
    Closed,
}

impl TransportError for MockError {}

/// Replays queued broker frames and records everything sent.
#[derive(Default)]
pub struct MockTransport {
    pub inbound: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
    hang_when_empty: bool,
    /// First byte of a packet whose first send never completes.
    stall_once: Option<u8>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block forever instead of reporting a closed stream once drained.
    pub fn hang_when_empty(mut self) -> Self {
        self.hang_when_empty = true;
        self
    }

    /// The first send of a packet starting with `kind` stays pending forever.
    pub fn stall_first_send(mut self, kind: u8) -> Self {
        self.stall_once = Some(kind);
        self
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.inbound.push_back(chunk.to_vec());
    }
}

impl MqttTransport for MockTransport {
    type Error = MockError;

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        if self.stall_once.is_some() && buf.first() == self.stall_once.as_ref() {
            self.stall_once = None;
            core::future::pending::<()>().await;
        }
        self.sent.push(buf.to_vec());
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let Some(mut chunk) = self.inbound.pop_front() else {
            if self.hang_when_empty {
                core::future::pending::<()>().await;
            }
            return Err(MockError::Closed);
        };
        if chunk.len() > buf.len() {
            let rest = chunk.split_off(buf.len());
            self.inbound.push_front(rest);
        }
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }
}

pub fn connack(code: u8) -> Vec<u8> {
    std::vec![0x20, 0x02, 0x00, code]
}

pub fn suback(packet_id: u16, code: u8) -> Vec<u8> {
    let [hi, lo] = packet_id.to_be_bytes();
    std::vec![0x90, 0x03, hi, lo, code]
}

pub fn unsuback(packet_id: u16) -> Vec<u8> {
    let [hi, lo] = packet_id.to_be_bytes();
    std::vec![0xB0, 0x02, hi, lo]
}

pub fn puback(packet_id: u16) -> Vec<u8> {
    let [hi, lo] = packet_id.to_be_bytes();
    std::vec![0x40, 0x02, hi, lo]
}

pub fn publish(topic: &str, payload: &[u8], qos: QoS, packet_id: Option<u16>) -> Vec<u8> {
    let mut buf = std::vec![0u8; topic.len() + payload.len() + 16];
    let packet = Publish {
        topic,
        qos,
        retain: false,
        payload,
        packet_id,
    };
    let len = packet.encode(&mut buf).unwrap();
    buf.truncate(len);
    buf
}
