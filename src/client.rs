//! # MQTT Client
//!
//! A single-session MQTT 3.1.1 client over any [`MqttTransport`].
//!
//! The client owns two fixed buffers of `BUF_SIZE` bytes: one for encoding
//! outbound packets and one for reassembling inbound frames, which may arrive
//! split across reads or several to a read. Up to `MAX_TOPICS` active
//! subscriptions are tracked.
//!
//! ```ignore
//! let options = MqttOptions::new("node-1")
//!     .with_keep_alive(Duration::from_secs(60))
//!     .with_credentials("user", Some("secret"));
//! let mut client = MqttClient::<_, 4, 512>::new(transport, options);
//! client.connect().await?;
//! client.subscribe("/topic/qos0", QoS::AtMostOnce).await?;
//! loop {
//!     if let Some(MqttEvent::Message(msg)) = client.poll().await? {
//!         // msg borrows the receive buffer until the next poll
//!     }
//! }
//! ```

use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Instant, Timer};
use heapless::{String, Vec};

use crate::error::{ConnectReasonCode, MqttError, ProtocolError};
use crate::packet::{
    self, Connect, Disconnect, EncodePacket, MqttPacket, PingReq, PubAck, Publish, QoS, Subscribe,
    Unsubscribe,
};
use crate::transport::MqttTransport;
use crate::util;

/// Maximum length for a single topic string.
pub const MAX_TOPIC_LEN: usize = 128;

/// Connection options for [`MqttClient`].
#[derive(Debug, Clone, Copy)]
pub struct MqttOptions<'a> {
    client_id: &'a str,
    keep_alive: Duration,
    clean_session: bool,
    username: Option<&'a str>,
    password: Option<&'a [u8]>,
}

impl<'a> MqttOptions<'a> {
    /// Options with a 60 s keep-alive, a clean session and no credentials.
    pub fn new(client_id: &'a str) -> Self {
        Self {
            client_id,
            keep_alive: Duration::from_secs(60),
            clean_session: true,
            username: None,
            password: None,
        }
    }

    /// Sets the keep-alive interval. Zero disables pings.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    pub fn with_credentials(mut self, username: &'a str, password: Option<&'a str>) -> Self {
        self.username = Some(username);
        self.password = password.map(str::as_bytes);
        self
    }

    pub fn client_id(&self) -> &'a str {
        self.client_id
    }

    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }
}

/// Something the broker sent, as returned by [`MqttClient::poll`].
#[derive(Debug)]
pub enum MqttEvent<'a> {
    /// An application message on a subscribed topic.
    Message(Publish<'a>),
    /// A SUBSCRIBE was acknowledged. `rejected` is set if the broker refused it.
    Subscribed { packet_id: u16, rejected: bool },
    /// An UNSUBSCRIBE was acknowledged.
    Unsubscribed { packet_id: u16 },
    /// A QoS 1 publish was acknowledged.
    Published { packet_id: u16 },
    /// Answer to a keep-alive ping.
    PingResponse,
}

/// An MQTT 3.1.1 client session.
pub struct MqttClient<'a, T, const MAX_TOPICS: usize, const BUF_SIZE: usize> {
    transport: T,
    options: MqttOptions<'a>,
    connected: bool,
    packet_id: u16,
    subscriptions: Vec<(String<MAX_TOPIC_LEN>, QoS), MAX_TOPICS>,
    tx_buf: [u8; BUF_SIZE],
    rx_buf: [u8; BUF_SIZE],
    /// Bytes currently buffered in `rx_buf`.
    rx_len: usize,
    /// Length of the frame handed out by the previous `poll`; dropped on the next read.
    /// Zero while a frame is still being handled.
    consumed: usize,
    last_sent: Instant,
}

impl<'a, T, const MAX_TOPICS: usize, const BUF_SIZE: usize> MqttClient<'a, T, MAX_TOPICS, BUF_SIZE>
where
    T: MqttTransport,
{
    pub fn new(transport: T, options: MqttOptions<'a>) -> Self {
        Self {
            transport,
            options,
            connected: false,
            packet_id: 0,
            subscriptions: Vec::new(),
            tx_buf: [0; BUF_SIZE],
            rx_buf: [0; BUF_SIZE],
            rx_len: 0,
            consumed: 0,
            last_sent: Instant::now(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn options(&self) -> &MqttOptions<'a> {
        &self.options
    }

    /// Active subscriptions, in the order they were made.
    pub fn subscriptions(&self) -> impl Iterator<Item = (&str, QoS)> {
        self.subscriptions.iter().map(|(t, q)| (t.as_str(), *q))
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Sends CONNECT and waits for the broker's CONNACK.
    pub async fn connect(&mut self) -> Result<(), MqttError<T::Error>> {
        self.connected = false;
        self.rx_len = 0;
        self.consumed = 0;

        let keep_alive = self.options.keep_alive.as_secs().min(u16::MAX as u64) as u16;
        let mut connect = Connect::new(self.options.client_id, keep_alive, self.options.clean_session);
        if let Some(username) = self.options.username {
            connect = connect.with_credentials(username, self.options.password);
        }
        self.send_packet(&connect).await?;
        debug!("CONNECT sent as {}", self.options.client_id);

        let len = self.read_frame().await?;
        self.consumed = len;
        let ack = match packet::decode::<T::Error>(&self.rx_buf[..len])? {
            Some(MqttPacket::ConnAck(ack)) => ack,
            _ => return Err(MqttError::Protocol(ProtocolError::InvalidResponse)),
        };

        match ConnectReasonCode::from(ack.reason_code) {
            ConnectReasonCode::Success => {
                self.connected = true;
                info!(
                    "connected to broker, session present: {}",
                    ack.session_present
                );
                Ok(())
            }
            code => {
                warn!("broker refused connection, code {}", ack.reason_code);
                Err(MqttError::ConnectionRefused(code))
            }
        }
    }

    /// Subscribes to `topic` and returns the packet id of the SUBSCRIBE.
    pub async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<u16, MqttError<T::Error>> {
        self.ensure_connected()?;
        if qos == QoS::ExactlyOnce {
            return Err(MqttError::Protocol(ProtocolError::UnsupportedQos));
        }
        let known = self.subscriptions.iter().position(|(t, _)| t.as_str() == topic);
        if known.is_none() && self.subscriptions.is_full() {
            return Err(MqttError::Protocol(ProtocolError::TooManyTopics));
        }
        let mut owned = String::new();
        owned
            .push_str(topic)
            .map_err(|_| MqttError::Protocol(ProtocolError::PayloadTooLarge))?;

        let packet_id = self.next_packet_id();
        self.send_packet(&Subscribe::new(packet_id, topic, qos)).await?;

        match known {
            Some(index) => self.subscriptions[index].1 = qos,
            None => {
                let _ = self.subscriptions.push((owned, qos));
            }
        }
        Ok(packet_id)
    }

    /// Unsubscribes from `topic` and returns the packet id of the UNSUBSCRIBE.
    pub async fn unsubscribe(&mut self, topic: &str) -> Result<u16, MqttError<T::Error>> {
        self.ensure_connected()?;
        let packet_id = self.next_packet_id();
        self.send_packet(&Unsubscribe::new(packet_id, topic)).await?;
        self.subscriptions.retain(|(t, _)| t.as_str() != topic);
        Ok(packet_id)
    }

    /// Publishes a message. Returns the packet id for QoS 1, `None` for QoS 0.
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
    ) -> Result<Option<u16>, MqttError<T::Error>> {
        self.ensure_connected()?;
        let packet_id = match qos {
            QoS::AtMostOnce => None,
            QoS::AtLeastOnce => Some(self.next_packet_id()),
            QoS::ExactlyOnce => return Err(MqttError::Protocol(ProtocolError::UnsupportedQos)),
        };
        let publish = Publish {
            topic,
            qos,
            retain: false,
            payload,
            packet_id,
        };
        self.send_packet(&publish).await?;
        Ok(packet_id)
    }

    /// Waits for the next packet from the broker.
    ///
    /// Inbound QoS 1 messages are acknowledged before they are returned. The
    /// future may be dropped at any await point: a message whose PUBACK did
    /// not go out is returned again by the next call. If the
    /// keep-alive interval passes without outbound traffic a PINGREQ is sent
    /// and `Ok(None)` is returned. The returned event borrows the receive
    /// buffer until the next call.
    pub async fn poll(&mut self) -> Result<Option<MqttEvent<'_>>, MqttError<T::Error>> {
        self.ensure_connected()?;
        self.discard_consumed();

        let len = loop {
            if let Some(len) = self.buffered_frame()? {
                break len;
            }
            if self.rx_len == BUF_SIZE {
                return Err(MqttError::BufferTooSmall);
            }

            let deadline = if self.options.keep_alive == Duration::from_ticks(0) {
                Instant::MAX
            } else {
                self.last_sent + self.options.keep_alive
            };
            let recv = self.transport.recv(&mut self.rx_buf[self.rx_len..]);
            let woke = select(recv, Timer::at(deadline)).await;
            match woke {
                Either::First(Ok(n)) => self.rx_len += n,
                Either::First(Err(e)) => {
                    self.connected = false;
                    return Err(MqttError::Transport(e));
                }
                Either::Second(()) => {
                    trace!("keep-alive elapsed, sending PINGREQ");
                    self.send_packet(&PingReq).await?;
                    return Ok(None);
                }
            }
        };

        // The frame stays buffered until its PUBACK is written, so a poll
        // dropped mid-ack decodes and acknowledges it again next time.
        let event = match packet::decode::<T::Error>(&self.rx_buf[..len]) {
            Ok(Some(MqttPacket::Publish(publish))) => {
                if publish.qos == QoS::AtLeastOnce
                    && let Some(packet_id) = publish.packet_id
                {
                    send_on(&mut self.transport, &mut self.tx_buf, &PubAck { packet_id }).await?;
                    self.last_sent = Instant::now();
                }
                Some(MqttEvent::Message(publish))
            }
            Ok(Some(MqttPacket::SubAck(ack))) => Some(MqttEvent::Subscribed {
                packet_id: ack.packet_id,
                rejected: ack.is_rejected(),
            }),
            Ok(Some(MqttPacket::UnsubAck(ack))) => Some(MqttEvent::Unsubscribed {
                packet_id: ack.packet_id,
            }),
            Ok(Some(MqttPacket::PubAck(ack))) => Some(MqttEvent::Published {
                packet_id: ack.packet_id,
            }),
            Ok(Some(MqttPacket::PingResp)) => Some(MqttEvent::PingResponse),
            Ok(Some(MqttPacket::ConnAck(_))) => {
                self.consumed = len;
                return Err(MqttError::Protocol(ProtocolError::InvalidResponse));
            }
            Ok(None) => None,
            Err(e) => {
                self.consumed = len;
                return Err(e);
            }
        };
        self.consumed = len;
        Ok(event)
    }

    /// Sends DISCONNECT and marks the session closed.
    pub async fn disconnect(&mut self) -> Result<(), MqttError<T::Error>> {
        self.ensure_connected()?;
        self.connected = false;
        self.subscriptions.clear();
        self.send_packet(&Disconnect).await
    }

    fn ensure_connected(&self) -> Result<(), MqttError<T::Error>> {
        if self.connected {
            Ok(())
        } else {
            Err(MqttError::NotConnected)
        }
    }

    /// Packet ids run 1..=65535 and wrap, skipping zero.
    fn next_packet_id(&mut self) -> u16 {
        self.packet_id = self.packet_id.wrapping_add(1);
        if self.packet_id == 0 {
            self.packet_id = 1;
        }
        self.packet_id
    }

    async fn send_packet<P: EncodePacket>(&mut self, packet: &P) -> Result<(), MqttError<T::Error>> {
        send_on(&mut self.transport, &mut self.tx_buf, packet).await?;
        self.last_sent = Instant::now();
        Ok(())
    }

    fn discard_consumed(&mut self) {
        if self.consumed > 0 {
            self.rx_buf.copy_within(self.consumed..self.rx_len, 0);
            self.rx_len -= self.consumed;
            self.consumed = 0;
        }
    }

    fn buffered_frame(&self) -> Result<Option<usize>, MqttError<T::Error>> {
        util::frame_len(&self.rx_buf[..self.rx_len]).map_err(MqttError::cast_transport_error)
    }

    /// Reads until one complete frame is buffered, without keep-alive handling.
    async fn read_frame(&mut self) -> Result<usize, MqttError<T::Error>> {
        self.discard_consumed();
        loop {
            if let Some(len) = self.buffered_frame()? {
                return Ok(len);
            }
            if self.rx_len == BUF_SIZE {
                return Err(MqttError::BufferTooSmall);
            }
            let n = self.transport.recv(&mut self.rx_buf[self.rx_len..]).await?;
            self.rx_len += n;
        }
    }
}

async fn send_on<T, P>(transport: &mut T, buf: &mut [u8], packet: &P) -> Result<(), MqttError<T::Error>>
where
    T: MqttTransport,
    P: EncodePacket,
{
    let len = packet.encode(buf).map_err(MqttError::cast_transport_error)?;
    transport.send(&buf[..len]).await?;
    Ok(())
}
