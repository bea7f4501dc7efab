use crate::{reason, Error, Properties};

/// Publish acknowledgement
///
/// Response to a PUBLISH packet with QoS 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubAck {
    pub pkid: u16,
    pub reason: PubAckReasonCode,
    pub properties: Properties,
}

impl PubAck {
    pub fn new(pkid: u16) -> Self {
        Self {
            pkid,
            reason: PubAckReasonCode::Success,
            properties: Properties::new(),
        }
    }
}

/// Reason code in PUBACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PubAckReasonCode {
    Success = reason::SUCCESS,
    NoMatchingSubscribers = reason::NO_MATCHING_SUBSCRIBERS,
    UnspecifiedError = reason::UNSPECIFIED_ERROR,
    ImplementationSpecificError = reason::IMPLEMENTATION_SPECIFIC_ERROR,
    NotAuthorized = reason::NOT_AUTHORIZED,
    TopicNameInvalid = reason::TOPIC_NAME_INVALID,
    PacketIdentifierInUse = reason::PACKET_IDENTIFIER_IN_USE,
    QuotaExceeded = reason::QUOTA_EXCEEDED,
    PayloadFormatInvalid = reason::PAYLOAD_FORMAT_INVALID,
}

impl TryFrom<u8> for PubAckReasonCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            reason::SUCCESS => Self::Success,
            reason::NO_MATCHING_SUBSCRIBERS => Self::NoMatchingSubscribers,
            reason::UNSPECIFIED_ERROR => Self::UnspecifiedError,
            reason::IMPLEMENTATION_SPECIFIC_ERROR => Self::ImplementationSpecificError,
            reason::NOT_AUTHORIZED => Self::NotAuthorized,
            reason::TOPIC_NAME_INVALID => Self::TopicNameInvalid,
            reason::PACKET_IDENTIFIER_IN_USE => Self::PacketIdentifierInUse,
            reason::QUOTA_EXCEEDED => Self::QuotaExceeded,
            reason::PAYLOAD_FORMAT_INVALID => Self::PayloadFormatInvalid,
            num => return Err(Error::InvalidReasonCode(num)),
        };

        Ok(code)
    }
}

pub(crate) mod v4 {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::PubAck;
    use crate::{parse::*, Error, FixedHeader};

    pub fn read(_fixed_header: FixedHeader, mut bytes: Bytes) -> Result<PubAck, Error> {
        let pkid = read_u16(&mut bytes)?;
        Ok(PubAck::new(pkid))
    }

    pub fn write(packet: &PubAck, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        buffer.put_u8(0x40);
        // remaining length
        let len = len(packet)?;
        len.write(buffer);
        // packet identifier
        buffer.put_u16(packet.pkid);

        Ok(1 + len.length() + len.value())
    }

    pub fn len(_packet: &PubAck) -> Result<VarInt, Error> {
        VarInt::new(2) // pkid
    }
}

pub(crate) mod v5 {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::{PubAck, PubAckReasonCode};
    use crate::property::PropertyType;
    use crate::{parse::*, Error, FixedHeader, Properties};

    const ALLOWED_PROPERTIES: &[PropertyType] =
        &[PropertyType::ReasonString, PropertyType::UserProperty];

    pub fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<PubAck, Error> {
        let pkid = read_u16(&mut bytes)?;

        // No reason code or properties if remaining length == 2
        if fixed_header.remaining_len == 2 {
            return Ok(PubAck::new(pkid));
        }

        let ack_reason = read_u8(&mut bytes)?;
        if fixed_header.remaining_len < 4 {
            // Properties length is omitted
            return Ok(PubAck {
                pkid,
                reason: ack_reason.try_into()?,
                properties: Properties::new(),
            });
        }

        Ok(PubAck {
            pkid,
            reason: ack_reason.try_into()?,
            properties: Properties::read(&mut bytes, ALLOWED_PROPERTIES)?,
        })
    }

    pub fn write(packet: &PubAck, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        buffer.put_u8(0x40);
        // remaining length
        let len = len(packet)?;
        len.write(buffer);
        // packet identifier
        buffer.put_u16(packet.pkid);

        if len > 2 {
            // reason code
            buffer.put_u8(packet.reason as u8);
            // properties
            packet.properties.write(buffer)?;
        }

        Ok(1 + len.length() + len.value())
    }

    pub fn len(packet: &PubAck) -> Result<VarInt, Error> {
        let mut len = 2; // packet identifier

        if packet.reason == PubAckReasonCode::Success && packet.properties.is_empty() {
            // Reason code and property length can be omitted in this case
            return VarInt::new(len);
        }

        len += 1; // reason code

        let properties_len = packet.properties.len()?;
        len += properties_len.length() + properties_len.value();

        VarInt::new(len)
    }
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::packet::{
        size_from_len,
        tests::{USER_PROP_KEY, USER_PROP_VAL},
    };
    use crate::{properties, Packet, Property, Protocol, V4, V5};

    #[test]
    fn puback_parsing_works() {
        let stream = &[
            0b0100_0000,
            0x02, // packet type, flags and remaining len
            0x00,
            0x0A, // packet identifier = 10
            0xDE,
            0xAD,
            0xBE,
            0xEF, // extra packets in the stream
        ];
        let mut stream = BytesMut::from(&stream[..]);
        let packet = V4::read(&mut stream, 128).unwrap();
        assert_eq!(packet, Packet::PubAck(PubAck::new(10)));
    }

    #[test]
    fn short_form_round_trips() {
        // A successful ack without properties omits reason code and
        // property length entirely.
        let mut buf = BytesMut::new();
        let written = v5::write(&PubAck::new(42), &mut buf).unwrap();
        assert_eq!(written, 4);
        assert_eq!(&buf[..], &[0x40, 0x02, 0x00, 0x2A]);

        let packet = V5::read(&mut buf, 128).unwrap();
        assert_eq!(packet, Packet::PubAck(PubAck::new(42)));
    }

    #[test]
    fn length_calculation() {
        let mut dummy_bytes = BytesMut::new();
        let puback_props = properties![Property::UserProperty {
            name: USER_PROP_KEY.into(),
            value: USER_PROP_VAL.into(),
        }];

        let puback_pkt = PubAck {
            pkid: 1,
            reason: PubAckReasonCode::Success,
            properties: puback_props,
        };

        let size_from_size = size_from_len(v5::len(&puback_pkt).unwrap());
        let size_from_write = v5::write(&puback_pkt, &mut dummy_bytes).unwrap();
        let size_from_bytes = dummy_bytes.len();

        assert_eq!(size_from_write, size_from_bytes);
        assert_eq!(size_from_size, size_from_bytes);
    }
}
