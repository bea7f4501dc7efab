//! Parsing utility functions

use std::slice::Iter;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::Error;

/// Variable Byte Integer
///
/// An unsigned integer that is encoded in one to four bytes, each byte
/// carrying seven value bits and a continuation bit.
///
/// In MQTT 3.1.1 it is used only for the `Remaining Length` in the fixed
/// header. In MQTT 5.0 it also encodes property lengths and identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VarInt {
    value: u32,
    length: u8,
}

impl PartialOrd<usize> for VarInt {
    fn partial_cmp(&self, other: &usize) -> Option<std::cmp::Ordering> {
        Some(self.value().cmp(other))
    }
}

impl PartialEq<usize> for VarInt {
    fn eq(&self, other: &usize) -> bool {
        self.value().eq(other)
    }
}

impl From<VarInt> for u32 {
    fn from(val: VarInt) -> Self {
        val.value
    }
}

impl VarInt {
    /// Creates a new variable byte integer
    ///
    /// # Errors
    /// This will return an error if the value is too large to be encoded
    pub fn new(value: usize) -> Result<Self, Error> {
        let length = match value {
            0..=127 => 1,
            128..=16_383 => 2,
            16_384..=2_097_151 => 3,
            2_097_152..=268_435_455 => 4,
            _ => return Err(Error::PayloadTooLong),
        };
        Ok(Self {
            value: value as u32,
            length,
        })
    }

    /// The numeric value of the variable byte integer
    pub const fn value(&self) -> usize {
        self.value as usize
    }

    /// The number of bytes required to encode this variable byte integer
    pub const fn length(&self) -> usize {
        self.length as usize
    }

    /// Read a variable byte integer from the stream
    ///
    /// Reading never consumes from the parent stream; the caller advances
    /// the cursor by [`VarInt::length`] bytes on success.
    pub fn read(stream: Iter<u8>) -> Result<Self, Error> {
        let mut value: u32 = 0;
        let mut length = 0;
        let mut shift = 0;
        let mut done = false;

        for &byte in stream {
            value += ((byte & 0b0111_1111) as u32) << shift;
            length += 1;
            shift += 7;

            // continuation bit cleared means the integer is complete
            if (byte & 0b1000_0000) == 0 {
                done = true;
                break;
            }

            // a 5th byte would be needed, which the protocol forbids
            if length >= 4 {
                return Err(Error::MalformedRemainingLength);
            }
        }

        // Not enough bytes in the stream to frame the integer.
        // Wait for at least one more byte.
        if !done {
            return Err(Error::InsufficientBytes(1));
        }

        Ok(Self { value, length })
    }

    /// Write a variable byte integer to the stream
    pub fn write(&self, stream: &mut BytesMut) {
        let mut x = self.value;
        let mut done = false;

        while !done {
            let mut byte = (x % 128) as u8;
            x >>= 7;
            if x > 0 {
                byte |= 128;
            } else {
                done = true;
            }

            stream.put_u8(byte);
        }
    }
}

/// Read length-prefixed binary data from a byte stream.
pub fn read_mqtt_bytes(stream: &mut Bytes) -> Result<Bytes, Error> {
    let len = read_u16(stream)? as usize;

    // Prevent attacks with a wrong remaining length. The caller framed the
    // packet with enough bytes; a length prefix must not cross that boundary.
    if len > stream.len() {
        return Err(Error::BoundaryCrossed(len));
    }

    Ok(stream.split_to(len))
}

/// Read a length-prefixed UTF-8 encoded string from a byte stream.
///
/// The protocol forbids U+0000 inside string fields.
pub fn read_mqtt_string(stream: &mut Bytes) -> Result<String, Error> {
    let s = read_mqtt_bytes(stream)?;
    if s.contains(&0x00) {
        return Err(Error::EmbeddedNul);
    }
    String::from_utf8(s.to_vec()).map_err(|e| Error::Utf8Encoding(e.utf8_error()))
}

/// Write length-prefixed binary data to a byte stream.
pub fn write_mqtt_bytes(stream: &mut BytesMut, bytes: &[u8]) {
    stream.put_u16(bytes.len() as u16);
    stream.extend_from_slice(bytes);
}

/// Write a length-prefixed UTF-8 encoded string to a byte stream.
pub fn write_mqtt_string(stream: &mut BytesMut, string: &str) {
    write_mqtt_bytes(stream, string.as_bytes());
}

/// A checked version of [`bytes::Buf::get_u8`]
pub fn read_u8(stream: &mut Bytes) -> Result<u8, Error> {
    if stream.is_empty() {
        return Err(Error::MalformedPacket);
    }

    Ok(stream.get_u8())
}

/// A checked version of [`bytes::Buf::get_u16`]
pub fn read_u16(stream: &mut Bytes) -> Result<u16, Error> {
    if stream.len() < 2 {
        return Err(Error::MalformedPacket);
    }

    Ok(stream.get_u16())
}

/// A checked version of [`bytes::Buf::get_u32`]
pub fn read_u32(stream: &mut Bytes) -> Result<u32, Error> {
    if stream.len() < 4 {
        return Err(Error::MalformedPacket);
    }

    Ok(stream.get_u32())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestCase {
        bytes: Vec<u8>,
        value: usize,
        length: usize,
    }

    #[rustfmt::skip]
    fn test_cases() -> Vec<TestCase> {
        vec![
            TestCase { bytes: vec![0x00], value: 0, length: 1 },
            TestCase { bytes: vec![0x7F], value: 127, length: 1 },
            TestCase { bytes: vec![0x80, 0x01], value: 128, length: 2 },
            TestCase { bytes: vec![0xFF, 0x7F], value: 16_383, length: 2 },
            TestCase { bytes: vec![0x80, 0x80, 0x01], value: 16_384, length: 3 },
            TestCase { bytes: vec![0xFF, 0xFF, 0x7F], value: 2_097_151, length: 3 },
            TestCase { bytes: vec![0x80, 0x80, 0x80, 0x01], value: 2_097_152, length: 4 },
            TestCase { bytes: vec![0xFF, 0xFF, 0xFF, 0x7F], value: 268_435_455, length: 4 },
        ]
    }

    #[test]
    fn varint_read() {
        for case in test_cases() {
            let varint = VarInt::read(case.bytes.iter()).unwrap();
            assert_eq!(varint.value(), case.value);
            assert_eq!(varint.length(), case.length);
        }
    }

    #[test]
    fn varint_read_insufficient() {
        let stream = [0x80, 0x80].iter();
        assert!(matches!(
            VarInt::read(stream),
            Err(Error::InsufficientBytes(1))
        ));
    }

    #[test]
    fn varint_read_malformed() {
        // 5 continuation bytes must error out, not loop or panic
        let stream = [0x80, 0x80, 0x80, 0x80, 0x80].iter();
        assert!(matches!(
            VarInt::read(stream),
            Err(Error::MalformedRemainingLength)
        ));
    }

    #[test]
    fn varint_write() {
        for case in test_cases() {
            let mut stream = BytesMut::new();
            let varint = VarInt::new(case.value).unwrap();
            assert_eq!(varint.length(), case.length);
            varint.write(&mut stream);
            assert_eq!(stream, case.bytes);
        }
    }

    #[test]
    fn string_with_embedded_nul_is_rejected() {
        let mut stream = Bytes::from_static(&[0x00, 0x03, b'a', 0x00, b'b']);
        assert!(matches!(
            read_mqtt_string(&mut stream),
            Err(Error::EmbeddedNul)
        ));
    }

    #[test]
    fn string_crossing_boundary_is_rejected() {
        let mut stream = Bytes::from_static(&[0x00, 0x10, b'a']);
        assert!(matches!(
            read_mqtt_string(&mut stream),
            Err(Error::BoundaryCrossed(16))
        ));
    }
}
