//! # Control packets
//!
//! MQTT 3.1.1 control packets needed by a client, and the traits for encoding
//! them into and decoding them from a byte buffer.
//!
//! Encoders reserve the maximum four bytes for the remaining length, write the
//! variable header and payload, then compact the frame once the real length is
//! known.

use crate::error::{MqttError, ProtocolError};
use crate::transport::{self, ErrorPlaceHolder};
use crate::util::{self, read_u16, read_utf8_string, write_u16, write_u8, write_utf8_string};
use heapless::Vec;

type CodecResult<T> = Result<T, MqttError<ErrorPlaceHolder>>;

/// Maximum number of topic filters in one SUBSCRIBE/UNSUBSCRIBE packet.
pub const MAX_FILTERS: usize = 8;

/// Offset of the first content byte while encoding (1 header + 4 reserved length bytes).
const CONTENT_START: usize = 5;

/// Delivery guarantee of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(ProtocolError::MalformedPacket),
        }
    }
}

/// Serializes a packet into a frame.
pub trait EncodePacket {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize>;
}

/// Parses a packet out of one complete frame.
pub trait DecodePacket<'a>: Sized {
    fn decode(buf: &'a [u8]) -> CodecResult<Self>;
}

/// The packets a client can receive from a broker.
#[derive(Debug)]
pub enum MqttPacket<'a> {
    ConnAck(ConnAck),
    Publish(Publish<'a>),
    PubAck(PubAck),
    SubAck(SubAck),
    UnsubAck(UnsubAck),
    PingResp,
}

/// Decodes one complete frame into an `MqttPacket`.
pub fn decode<'a, T>(buf: &'a [u8]) -> Result<Option<MqttPacket<'a>>, MqttError<T>>
where
    T: transport::TransportError,
{
    let Some(first) = buf.first() else {
        return Ok(None);
    };

    let packet_type = first >> 4;
    let packet = match packet_type {
        2 => MqttPacket::ConnAck(ConnAck::decode(buf).map_err(MqttError::cast_transport_error)?),
        3 => MqttPacket::Publish(Publish::decode(buf).map_err(MqttError::cast_transport_error)?),
        4 => MqttPacket::PubAck(PubAck::decode(buf).map_err(MqttError::cast_transport_error)?),
        9 => MqttPacket::SubAck(SubAck::decode(buf).map_err(MqttError::cast_transport_error)?),
        11 => {
            MqttPacket::UnsubAck(UnsubAck::decode(buf).map_err(MqttError::cast_transport_error)?)
        }
        13 => MqttPacket::PingResp,
        _ => {
            return Err(MqttError::Protocol(ProtocolError::InvalidPacketType(
                packet_type,
            )));
        }
    };

    Ok(Some(packet))
}

/// Starts a frame: checks room for the fixed header and writes the first byte.
fn begin_frame(buf: &mut [u8], first_byte: u8) -> CodecResult<usize> {
    if buf.len() < CONTENT_START {
        return Err(MqttError::BufferTooSmall);
    }
    buf[0] = first_byte;
    Ok(CONTENT_START)
}

/// Writes the remaining length and moves the content right behind it.
fn finish_frame(buf: &mut [u8], cursor: usize) -> CodecResult<usize> {
    let remaining_len = cursor - CONTENT_START;
    let len_bytes = util::write_variable_byte_integer_len(&mut buf[1..], remaining_len)?;
    let header_len = 1 + len_bytes;
    buf.copy_within(CONTENT_START..cursor, header_len);
    Ok(header_len + remaining_len)
}

/// Reads the fixed header and returns `(content_start, content_end)`.
fn content_bounds(buf: &[u8]) -> CodecResult<(usize, usize)> {
    let mut cursor = 1;
    let remaining_len = util::read_variable_byte_integer(&mut cursor, buf)?;
    let end = cursor + remaining_len;
    if end > buf.len() {
        return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
    }
    Ok((cursor, end))
}

/// Decodes a two-byte acknowledgement (`PUBACK`, `UNSUBACK`) and returns its packet id.
fn decode_ack(buf: &[u8]) -> CodecResult<u16> {
    let (mut cursor, end) = content_bounds(buf)?;
    if end - cursor != 2 {
        return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
    }
    read_u16(&mut cursor, buf)
}

// --- CONNECT Packet ---
#[derive(Debug)]
pub struct Connect<'a> {
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
}

impl<'a> Connect<'a> {
    pub fn new(client_id: &'a str, keep_alive: u16, clean_session: bool) -> Self {
        Self {
            client_id,
            keep_alive,
            clean_session,
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: &'a str, password: Option<&'a [u8]>) -> Self {
        self.username = Some(username);
        self.password = password;
        self
    }
}

impl EncodePacket for Connect<'_> {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        let mut cursor = begin_frame(buf, 0x10)?;
        // Protocol name "MQTT", level 4 (3.1.1)
        cursor += write_utf8_string(&mut buf[cursor..], "MQTT")?;
        write_u8(&mut cursor, buf, 4)?;

        // A password without a username is not allowed in 3.1.1.
        let password = self.username.and(self.password);
        let mut flags = 0;
        if self.clean_session {
            flags |= 0x02;
        }
        if self.username.is_some() {
            flags |= 0x80;
        }
        if password.is_some() {
            flags |= 0x40;
        }
        write_u8(&mut cursor, buf, flags)?;
        write_u16(&mut cursor, buf, self.keep_alive)?;

        cursor += write_utf8_string(&mut buf[cursor..], self.client_id)?;
        if let Some(username) = self.username {
            cursor += write_utf8_string(&mut buf[cursor..], username)?;
        }
        if let Some(password) = password {
            cursor += util::write_binary(&mut buf[cursor..], password)?;
        }
        finish_frame(buf, cursor)
    }
}

// --- CONNACK Packet ---
#[derive(Debug)]
pub struct ConnAck {
    pub session_present: bool,
    pub reason_code: u8,
}

impl DecodePacket<'_> for ConnAck {
    fn decode(buf: &[u8]) -> CodecResult<Self> {
        let (cursor, end) = content_bounds(buf)?;
        if end - cursor != 2 {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
        Ok(Self {
            session_present: (buf[cursor] & 0x01) != 0,
            reason_code: buf[cursor + 1],
        })
    }
}

// --- PUBLISH Packet ---
#[derive(Debug, Clone)]
pub struct Publish<'a> {
    pub topic: &'a str,
    pub qos: QoS,
    pub retain: bool,
    pub payload: &'a [u8],
    pub packet_id: Option<u16>,
}

impl<'a> DecodePacket<'a> for Publish<'a> {
    fn decode(buf: &'a [u8]) -> CodecResult<Self> {
        let flags = buf
            .first()
            .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?
            & 0x0F;
        let qos = QoS::try_from((flags >> 1) & 0x03).map_err(MqttError::Protocol)?;
        let retain = flags & 0x01 != 0;

        let (mut cursor, end) = content_bounds(buf)?;
        let topic = read_utf8_string(&mut cursor, &buf[..end])?;

        let packet_id = if qos != QoS::AtMostOnce {
            Some(read_u16(&mut cursor, &buf[..end])?)
        } else {
            None
        };

        let payload = buf
            .get(cursor..end)
            .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;

        Ok(Publish {
            topic,
            qos,
            retain,
            payload,
            packet_id,
        })
    }
}

impl EncodePacket for Publish<'_> {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        let mut first = 0x30 | ((self.qos as u8) << 1);
        if self.retain {
            first |= 0x01;
        }
        let mut cursor = begin_frame(buf, first)?;

        cursor += write_utf8_string(&mut buf[cursor..], self.topic)?;

        // packet id, QoS 1 and 2 only
        if self.qos != QoS::AtMostOnce {
            let id = self
                .packet_id
                .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
            write_u16(&mut cursor, buf, id)?;
        }

        buf.get_mut(cursor..cursor + self.payload.len())
            .ok_or(MqttError::BufferTooSmall)?
            .copy_from_slice(self.payload);
        cursor += self.payload.len();

        finish_frame(buf, cursor)
    }
}

// --- PUBACK Packet ---
#[derive(Debug)]
pub struct PubAck {
    pub packet_id: u16,
}

impl DecodePacket<'_> for PubAck {
    fn decode(buf: &[u8]) -> CodecResult<Self> {
        Ok(PubAck {
            packet_id: decode_ack(buf)?,
        })
    }
}

impl EncodePacket for PubAck {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        let out = buf.get_mut(..4).ok_or(MqttError::BufferTooSmall)?;
        out[0] = 0x40;
        out[1] = 0x02;
        out[2..4].copy_from_slice(&self.packet_id.to_be_bytes());
        Ok(4)
    }
}

// --- SUBSCRIBE Packet ---
#[derive(Debug)]
pub struct Subscribe<'a> {
    pub packet_id: u16,
    pub topics: Vec<(&'a str, QoS), MAX_FILTERS>,
}

impl<'a> Subscribe<'a> {
    /// SUBSCRIBE for one topic filter.
    pub fn new(packet_id: u16, topic: &'a str, qos: QoS) -> Self {
        let mut topics = Vec::new();
        let _ = topics.push((topic, qos));
        Self { packet_id, topics }
    }
}

impl EncodePacket for Subscribe<'_> {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        // SUBSCRIBE packet type (8) with reserved bits 0b0010
        let mut cursor = begin_frame(buf, 0x82)?;
        write_u16(&mut cursor, buf, self.packet_id)?;

        for (topic, qos) in &self.topics {
            cursor += write_utf8_string(&mut buf[cursor..], topic)?;
            write_u8(&mut cursor, buf, *qos as u8)?;
        }

        finish_frame(buf, cursor)
    }
}

// --- SUBACK Packet ---
#[derive(Debug)]
pub struct SubAck {
    pub packet_id: u16,
    pub return_codes: Vec<u8, MAX_FILTERS>,
}

impl SubAck {
    /// `0x80` in a return code means the broker rejected that filter.
    pub fn is_rejected(&self) -> bool {
        self.return_codes.iter().any(|code| *code == 0x80)
    }
}

impl DecodePacket<'_> for SubAck {
    fn decode(buf: &[u8]) -> CodecResult<Self> {
        let (mut cursor, end) = content_bounds(buf)?;
        let packet_id = read_u16(&mut cursor, &buf[..end])?;

        let mut return_codes = Vec::new();
        for code in &buf[cursor..end] {
            return_codes
                .push(*code)
                .map_err(|_| MqttError::Protocol(ProtocolError::TooManyTopics))?;
        }

        Ok(SubAck {
            packet_id,
            return_codes,
        })
    }
}

// --- UNSUBSCRIBE Packet ---
#[derive(Debug)]
pub struct Unsubscribe<'a> {
    pub packet_id: u16,
    pub topics: Vec<&'a str, MAX_FILTERS>,
}

impl<'a> Unsubscribe<'a> {
    /// Creates a new Unsubscribe packet with a single topic.
    pub fn new(packet_id: u16, topic: &'a str) -> Self {
        let mut topics = Vec::new();
        let _ = topics.push(topic);
        Self { packet_id, topics }
    }
}

impl EncodePacket for Unsubscribe<'_> {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        let mut cursor = begin_frame(buf, 0xA2)?;
        write_u16(&mut cursor, buf, self.packet_id)?;
        for topic in &self.topics {
            cursor += write_utf8_string(&mut buf[cursor..], topic)?;
        }
        finish_frame(buf, cursor)
    }
}

// --- UNSUBACK Packet ---
#[derive(Debug)]
pub struct UnsubAck {
    pub packet_id: u16,
}

impl DecodePacket<'_> for UnsubAck {
    fn decode(buf: &[u8]) -> CodecResult<Self> {
        Ok(UnsubAck {
            packet_id: decode_ack(buf)?,
        })
    }
}

// --- PINGREQ Packet ---
#[derive(Debug)]
pub struct PingReq;

impl EncodePacket for PingReq {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        let out = buf.get_mut(..2).ok_or(MqttError::BufferTooSmall)?;
        out.copy_from_slice(&[0xC0, 0x00]);
        Ok(2)
    }
}

// --- DISCONNECT Packet ---
#[derive(Debug)]
pub struct Disconnect;

impl EncodePacket for Disconnect {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        let out = buf.get_mut(..2).ok_or(MqttError::BufferTooSmall)?;
        out.copy_from_slice(&[0xE0, 0x00]);
        Ok(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode<P: EncodePacket>(packet: &P, buf: &mut [u8]) -> usize {
        packet.encode(buf).unwrap()
    }

    #[test]
    fn connect_with_credentials_layout() {
        let packet = Connect::new("node", 60, true).with_credentials("user", Some(b"pw"));
        let mut buf = [0u8; 64];
        let n = encode(&packet, &mut buf);

        let expected: &[u8] = &[
            0x10, 26, // fixed header
            0x00, 0x04, b'M', b'Q', b'T', b'T', // protocol name
            0x04, // level
            0xC2, // username | password | clean session
            0x00, 0x3C, // keep alive
            0x00, 0x04, b'n', b'o', b'd', b'e', // client id
            0x00, 0x04, b'u', b's', b'e', b'r', // username
            0x00, 0x02, b'p', b'w', // password
        ];
        assert_eq!(&buf[..n], expected);
    }

    #[test]
    fn connect_drops_password_without_username() {
        let mut packet = Connect::new("n", 0, false);
        packet.password = Some(b"secret");
        let mut buf = [0u8; 32];
        let n = encode(&packet, &mut buf);
        // Flags byte follows the protocol name and level.
        assert_eq!(buf[9], 0x00);
        assert_eq!(n, 2 + 10 + 3);
    }

    #[test]
    fn subscribe_and_unsubscribe_layout() {
        let mut buf = [0u8; 32];
        let n = encode(&Subscribe::new(1, "/topic/qos1", QoS::AtLeastOnce), &mut buf);
        let mut expected = std::vec![0x82, 16, 0x00, 0x01, 0x00, 11];
        expected.extend_from_slice(b"/topic/qos1");
        expected.push(0x01);
        assert_eq!(&buf[..n], &expected[..]);

        let n = encode(&Unsubscribe::new(2, "/topic/qos1"), &mut buf);
        let mut expected = std::vec![0xA2, 15, 0x00, 0x02, 0x00, 11];
        expected.extend_from_slice(b"/topic/qos1");
        assert_eq!(&buf[..n], &expected[..]);
    }

    #[test]
    fn publish_qos0_has_no_packet_id() {
        let packet = Publish {
            topic: "/topic/qos0",
            qos: QoS::AtMostOnce,
            retain: false,
            payload: b"data",
            packet_id: None,
        };
        let mut buf = [0u8; 32];
        let n = encode(&packet, &mut buf);
        assert_eq!(buf[0], 0x30);
        assert_eq!(buf[1] as usize, 2 + 11 + 4);
        assert_eq!(&buf[n - 4..n], b"data");

        let decoded = Publish::decode(&buf[..n]).unwrap();
        assert_eq!(decoded.topic, "/topic/qos0");
        assert_eq!(decoded.payload, b"data");
        assert_eq!(decoded.packet_id, None);
    }

    #[test]
    fn publish_qos1_requires_packet_id() {
        let mut packet = Publish {
            topic: "t",
            qos: QoS::AtLeastOnce,
            retain: false,
            payload: b"x",
            packet_id: None,
        };
        let mut buf = [0u8; 16];
        assert!(packet.encode(&mut buf).is_err());

        packet.packet_id = Some(7);
        let n = encode(&packet, &mut buf);
        assert_eq!(&buf[..n], &[0x32, 6, 0x00, 0x01, b't', 0x00, 0x07, b'x']);
    }

    #[test]
    fn publish_payload_larger_than_buffer_is_rejected() {
        let payload = [0u8; 64];
        let packet = Publish {
            topic: "t",
            qos: QoS::AtMostOnce,
            retain: false,
            payload: &payload,
            packet_id: None,
        };
        let mut buf = [0u8; 32];
        assert!(matches!(
            packet.encode(&mut buf),
            Err(MqttError::BufferTooSmall)
        ));
    }

    #[test]
    fn decodes_broker_packets() {
        let connack = decode::<ErrorPlaceHolder>(&[0x20, 0x02, 0x01, 0x05])
            .unwrap()
            .unwrap();
        assert!(matches!(
            connack,
            MqttPacket::ConnAck(ConnAck {
                session_present: true,
                reason_code: 5
            })
        ));

        let suback = decode::<ErrorPlaceHolder>(&[0x90, 0x04, 0x00, 0x03, 0x00, 0x80])
            .unwrap()
            .unwrap();
        match suback {
            MqttPacket::SubAck(ack) => {
                assert_eq!(ack.packet_id, 3);
                assert_eq!(&ack.return_codes[..], &[0x00, 0x80]);
                assert!(ack.is_rejected());
            }
            other => panic!("unexpected packet {:?}", other),
        }

        let unsuback = decode::<ErrorPlaceHolder>(&[0xB0, 0x02, 0x00, 0x09])
            .unwrap()
            .unwrap();
        assert!(matches!(
            unsuback,
            MqttPacket::UnsubAck(UnsubAck { packet_id: 9 })
        ));

        let pingresp = decode::<ErrorPlaceHolder>(&[0xD0, 0x00]).unwrap().unwrap();
        assert!(matches!(pingresp, MqttPacket::PingResp));
    }

    #[test]
    fn truncated_packets_are_malformed_not_panics() {
        for frame in [
            &[0x20, 0x02, 0x00][..],
            &[0x30, 0x05, 0x00, 0x09, b'a'][..],
            &[0x32, 0x04, 0x00, 0x01, b't', 0x00][..],
            &[0x40, 0x01, 0x00][..],
        ] {
            assert!(matches!(
                decode::<ErrorPlaceHolder>(frame),
                Err(MqttError::Protocol(ProtocolError::MalformedPacket))
            ));
        }
    }

    #[test]
    fn unknown_packet_type_is_reported() {
        assert!(matches!(
            decode::<ErrorPlaceHolder>(&[0x50, 0x02, 0x00, 0x01]),
            Err(MqttError::Protocol(ProtocolError::InvalidPacketType(5)))
        ));
    }
}
