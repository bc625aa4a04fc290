//! # Wire primitives
//!
//! Bounds-checked readers and writers for the MQTT field encodings:
//! variable-byte integers, big-endian `u16` values and length-prefixed
//! strings.

use crate::error::{MqttError, ProtocolError};
use crate::transport::ErrorPlaceHolder;

type CodecResult<T> = Result<T, MqttError<ErrorPlaceHolder>>;

/// Decodes a variable-byte integer at the cursor and moves past it.
///
/// Used for the remaining-length field of every frame.
pub fn read_variable_byte_integer(cursor: &mut usize, buf: &[u8]) -> CodecResult<usize> {
    let mut multiplier = 1;
    let mut value = 0;
    let mut i = 0;
    loop {
        let encoded_byte = buf
            .get(*cursor + i)
            .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
        value += (encoded_byte & 127) as usize * multiplier;
        if (encoded_byte & 128) == 0 {
            break;
        }
        multiplier *= 128;
        i += 1;
        if i >= 4 {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
    }
    *cursor += i + 1;
    Ok(value)
}

/// Writes a variable-byte integer at the start of `buf` and returns the byte count.
pub fn write_variable_byte_integer_len(buf: &mut [u8], mut val: usize) -> CodecResult<usize> {
    let mut i = 0;
    loop {
        let mut encoded_byte = (val % 128) as u8;
        val /= 128;
        if val > 0 {
            encoded_byte |= 128;
        }
        *buf.get_mut(i).ok_or(MqttError::BufferTooSmall)? = encoded_byte;
        i += 1;
        if val == 0 {
            break;
        }
    }
    Ok(i)
}

/// Reads a big-endian `u16`, advancing the cursor.
pub fn read_u16(cursor: &mut usize, buf: &[u8]) -> CodecResult<u16> {
    let bytes = buf
        .get(*cursor..*cursor + 2)
        .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
    *cursor += 2;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Writes a big-endian `u16` at the cursor, advancing it.
pub fn write_u16(cursor: &mut usize, buf: &mut [u8], val: u16) -> CodecResult<()> {
    buf.get_mut(*cursor..*cursor + 2)
        .ok_or(MqttError::BufferTooSmall)?
        .copy_from_slice(&val.to_be_bytes());
    *cursor += 2;
    Ok(())
}

/// Writes a single byte at the cursor, advancing it.
pub fn write_u8(cursor: &mut usize, buf: &mut [u8], val: u8) -> CodecResult<()> {
    *buf.get_mut(*cursor).ok_or(MqttError::BufferTooSmall)? = val;
    *cursor += 1;
    Ok(())
}

/// Reads binary data prefixed with a 2-byte length.
pub fn read_binary<'a>(cursor: &mut usize, buf: &'a [u8]) -> CodecResult<&'a [u8]> {
    let len = read_u16(cursor, buf)? as usize;
    let data = buf
        .get(*cursor..*cursor + len)
        .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
    *cursor += len;
    Ok(data)
}

/// Reads a length-prefixed UTF-8 string.
pub fn read_utf8_string<'a>(cursor: &mut usize, buf: &'a [u8]) -> CodecResult<&'a str> {
    let data = read_binary(cursor, buf)?;
    core::str::from_utf8(data).map_err(|_| MqttError::Protocol(ProtocolError::InvalidUtf8String))
}

/// Writes binary data prefixed with a 2-byte length, returning the bytes written.
pub fn write_binary(buf: &mut [u8], data: &[u8]) -> CodecResult<usize> {
    let len = data.len();
    if len > u16::MAX as usize {
        return Err(MqttError::Protocol(ProtocolError::PayloadTooLarge));
    }
    let len_bytes = (len as u16).to_be_bytes();

    let required_space = 2 + len;
    let slice = buf
        .get_mut(0..required_space)
        .ok_or(MqttError::BufferTooSmall)?;

    slice[0..2].copy_from_slice(&len_bytes);
    slice[2..].copy_from_slice(data);
    Ok(required_space)
}

/// Writes a length-prefixed UTF-8 string.
pub fn write_utf8_string(buf: &mut [u8], s: &str) -> CodecResult<usize> {
    write_binary(buf, s.as_bytes())
}

/// Returns the total length of the first complete packet in `buf`, if any.
///
/// `Ok(None)` means more bytes are needed.
pub fn frame_len(buf: &[u8]) -> CodecResult<Option<usize>> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let mut cursor = 1;
    let remaining = match read_variable_byte_integer(&mut cursor, buf) {
        Ok(len) => len,
        // A continuation bit on the last buffered byte just means the length
        // is still arriving.
        Err(_) if buf.len() < 5 && buf[1..].iter().all(|b| b & 0x80 != 0) => return Ok(None),
        Err(e) => return Err(e),
    };
    let total = cursor + remaining;
    Ok((buf.len() >= total).then_some(total))
}
