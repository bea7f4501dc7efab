use crate::{reason, Error, Properties};

/// Publish received
///
/// Response to a PUBLISH packet with QoS 2.
/// It is the second packet of the QoS 2 protocol exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubRec {
    pub pkid: u16,
    pub reason: PubRecReasonCode,
    pub properties: Properties,
}

impl PubRec {
    pub fn new(pkid: u16) -> Self {
        Self {
            pkid,
            reason: PubRecReasonCode::Success,
            properties: Properties::new(),
        }
    }
}

/// Reason code in PUBREC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PubRecReasonCode {
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

impl TryFrom<u8> for PubRecReasonCode {
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

    use super::PubRec;
    use crate::{parse::*, Error, FixedHeader};

    pub fn read(_fixed_header: FixedHeader, mut bytes: Bytes) -> Result<PubRec, Error> {
        let pkid = read_u16(&mut bytes)?;
        Ok(PubRec::new(pkid))
    }

    pub fn write(packet: &PubRec, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        buffer.put_u8(0x50);
        // remaining length
        let len = len(packet)?;
        len.write(buffer);
        // packet identifier
        buffer.put_u16(packet.pkid);

        Ok(1 + len.length() + len.value())
    }

    pub fn len(_packet: &PubRec) -> Result<VarInt, Error> {
        VarInt::new(2) // pkid
    }
}

pub(crate) mod v5 {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::{PubRec, PubRecReasonCode};
    use crate::property::PropertyType;
    use crate::{parse::*, Error, FixedHeader, Properties};

    const ALLOWED_PROPERTIES: &[PropertyType] =
        &[PropertyType::ReasonString, PropertyType::UserProperty];

    pub fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<PubRec, Error> {
        let pkid = read_u16(&mut bytes)?;

        // No reason code or properties if remaining length == 2
        if fixed_header.remaining_len == 2 {
            return Ok(PubRec::new(pkid));
        }

        let ack_reason = read_u8(&mut bytes)?;
        if fixed_header.remaining_len < 4 {
            // Properties length is omitted
            return Ok(PubRec {
                pkid,
                reason: ack_reason.try_into()?,
                properties: Properties::new(),
            });
        }

        Ok(PubRec {
            pkid,
            reason: ack_reason.try_into()?,
            properties: Properties::read(&mut bytes, ALLOWED_PROPERTIES)?,
        })
    }

    pub fn write(packet: &PubRec, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        buffer.put_u8(0x50);
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

    pub fn len(packet: &PubRec) -> Result<VarInt, Error> {
        let mut len = 2; // packet identifier

        if packet.reason == PubRecReasonCode::Success && packet.properties.is_empty() {
            // Reason code and property length can be omitted in this case
            return VarInt::new(len);
        }

        len += 1; // reason code

        let properties_len = packet.properties.len()?;
        len += properties_len.length() + properties_len.value();

        VarInt::new(len)
    }
}
