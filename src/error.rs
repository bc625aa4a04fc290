//! Client errors.
//!
//! Everything the client can fail with, from a dead socket to a refusing
//! broker. Each enum has a `describe()` for log lines, since the log backends
//! only take strings and integers.

use crate::transport::TransportError;

/// Error of an MQTT operation over a transport whose own error type is `T`.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError<T> {
    Transport(T),
    Protocol(ProtocolError),
    /// CONNACK carried a non-zero return code.
    ConnectionRefused(ConnectReasonCode),
    /// No session; call `connect` first.
    NotConnected,
    /// A packet does not fit the client's buffers.
    BufferTooSmall,
    Timeout,
}

impl<T: TransportError> From<T> for MqttError<T> {
    fn from(err: T) -> Self {
        MqttError::Transport(err)
    }
}

impl<T> MqttError<T> {
    /// Moves a codec error over to a concrete transport error type.
    ///
    /// The codec never produces `Transport`; should one show up anyway it is
    /// mapped to `InvalidResponse`.
    pub fn cast_transport_error<E>(other: MqttError<E>) -> MqttError<T> {
        match other {
            MqttError::Transport(_) => MqttError::Protocol(ProtocolError::InvalidResponse),
            MqttError::Protocol(p) => MqttError::Protocol(p),
            MqttError::ConnectionRefused(code) => MqttError::ConnectionRefused(code),
            MqttError::NotConnected => MqttError::NotConnected,
            MqttError::BufferTooSmall => MqttError::BufferTooSmall,
            MqttError::Timeout => MqttError::Timeout,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            MqttError::Transport(_) => "transport error",
            MqttError::Protocol(p) => p.describe(),
            MqttError::ConnectionRefused(_) => "connection refused by broker",
            MqttError::NotConnected => "not connected",
            MqttError::BufferTooSmall => "buffer too small",
            MqttError::Timeout => "timed out",
        }
    }
}

/// CONNACK return codes (MQTT 3.1.1, section 3.2.2.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectReasonCode {
    Success,
    UnacceptableProtocolVersion,
    IdentifierRejected,
    ServerUnavailable,
    BadUserNameOrPassword,
    NotAuthorized,
    /// Reserved code.
    Other(u8),
}

impl From<u8> for ConnectReasonCode {
    fn from(code: u8) -> Self {
        match code {
            0 => ConnectReasonCode::Success,
            1 => ConnectReasonCode::UnacceptableProtocolVersion,
            2 => ConnectReasonCode::IdentifierRejected,
            3 => ConnectReasonCode::ServerUnavailable,
            4 => ConnectReasonCode::BadUserNameOrPassword,
            5 => ConnectReasonCode::NotAuthorized,
            other => ConnectReasonCode::Other(other),
        }
    }
}

impl ConnectReasonCode {
    pub fn describe(&self) -> &'static str {
        match self {
            ConnectReasonCode::Success => "accepted",
            ConnectReasonCode::UnacceptableProtocolVersion => "unacceptable protocol version",
            ConnectReasonCode::IdentifierRejected => "client identifier rejected",
            ConnectReasonCode::ServerUnavailable => "server unavailable",
            ConnectReasonCode::BadUserNameOrPassword => "bad user name or password",
            ConnectReasonCode::NotAuthorized => "not authorized",
            ConnectReasonCode::Other(_) => "reserved return code",
        }
    }
}

/// The peer, or the bytes it sent, broke the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// Fixed header names a packet type a client never receives.
    InvalidPacketType(u8),
    /// A valid packet, but not the one expected at this point.
    InvalidResponse,
    ConnectionClosed,
    /// Truncated frame, bad length or bad flags.
    MalformedPacket,
    PayloadTooLarge,
    InvalidUtf8String,
    /// The subscription table is full.
    TooManyTopics,
    /// QoS 2 is decoded but never sent.
    UnsupportedQos,
}

impl ProtocolError {
    pub fn describe(&self) -> &'static str {
        match self {
            ProtocolError::InvalidPacketType(_) => "invalid packet type",
            ProtocolError::InvalidResponse => "unexpected response",
            ProtocolError::ConnectionClosed => "connection closed",
            ProtocolError::MalformedPacket => "malformed packet",
            ProtocolError::PayloadTooLarge => "payload too large",
            ProtocolError::InvalidUtf8String => "invalid utf-8 string",
            ProtocolError::TooManyTopics => "too many topics",
            ProtocolError::UnsupportedQos => "unsupported qos",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ErrorPlaceHolder;

    #[test]
    fn connack_codes_map_to_reasons() {
        assert_eq!(ConnectReasonCode::from(0), ConnectReasonCode::Success);
        assert_eq!(
            ConnectReasonCode::from(4),
            ConnectReasonCode::BadUserNameOrPassword
        );
        assert_eq!(ConnectReasonCode::from(0x80), ConnectReasonCode::Other(0x80));
        assert_eq!(
            ConnectReasonCode::from(5).describe(),
            "not authorized"
        );
    }

    #[test]
    fn cast_keeps_codec_errors() {
        let err: MqttError<ErrorPlaceHolder> = MqttError::Protocol(ProtocolError::MalformedPacket);
        let cast: MqttError<u8> = MqttError::cast_transport_error(err);
        assert!(matches!(
            cast,
            MqttError::Protocol(ProtocolError::MalformedPacket)
        ));

        let err: MqttError<ErrorPlaceHolder> = MqttError::Transport(ErrorPlaceHolder);
        let cast: MqttError<u8> = MqttError::cast_transport_error(err);
        assert!(matches!(
            cast,
            MqttError::Protocol(ProtocolError::InvalidResponse)
        ));
    }
}
