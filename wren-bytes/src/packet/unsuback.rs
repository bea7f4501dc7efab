use crate::{reason, Error, Properties};

/// Unsubscribe acknowledgement
///
/// Sent by the server to the client to confirm receipt of an UNSUBSCRIBE packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubAck {
    pub pkid: u16,
    pub properties: Properties,
    pub reason_codes: Vec<UnsubscribeReasonCode>,
}

impl UnsubAck {
    pub fn new(pkid: u16) -> Self {
        UnsubAck {
            pkid,
            reason_codes: Vec::new(),
            properties: Properties::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UnsubscribeReasonCode {
    Success = reason::SUCCESS,
    NoSubscriptionExisted = reason::NO_SUBSCRIPTION_EXISTED,
    UnspecifiedError = reason::UNSPECIFIED_ERROR,
    ImplementationSpecificError = reason::IMPLEMENTATION_SPECIFIC_ERROR,
    NotAuthorized = reason::NOT_AUTHORIZED,
    TopicFilterInvalid = reason::TOPIC_FILTER_INVALID,
    PacketIdentifierInUse = reason::PACKET_IDENTIFIER_IN_USE,
}

impl TryFrom<u8> for UnsubscribeReasonCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            reason::SUCCESS => Self::Success,
            reason::NO_SUBSCRIPTION_EXISTED => Self::NoSubscriptionExisted,
            reason::UNSPECIFIED_ERROR => Self::UnspecifiedError,
            reason::IMPLEMENTATION_SPECIFIC_ERROR => Self::ImplementationSpecificError,
            reason::NOT_AUTHORIZED => Self::NotAuthorized,
            reason::TOPIC_FILTER_INVALID => Self::TopicFilterInvalid,
            reason::PACKET_IDENTIFIER_IN_USE => Self::PacketIdentifierInUse,
            num => return Err(Error::InvalidSubscribeReasonCode(num)),
        };

        Ok(code)
    }
}

pub(crate) mod v4 {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::UnsubAck;
    use crate::{parse::*, Error, FixedHeader};

    pub fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<UnsubAck, Error> {
        if fixed_header.remaining_len != 2 {
            return Err(Error::MalformedPacket);
        }

        let pkid = read_u16(&mut bytes)?;
        Ok(UnsubAck::new(pkid))
    }

    pub fn write(packet: &UnsubAck, buffer: &mut BytesMut) -> Result<usize, Error> {
        buffer.put_slice(&[0xB0, 0x02]);
        buffer.put_u16(packet.pkid);
        Ok(4)
    }

    pub fn len(_packet: &UnsubAck) -> Result<VarInt, Error> {
        VarInt::new(2) // pkid
    }
}

pub(crate) mod v5 {
    use bytes::{Buf, BufMut, Bytes, BytesMut};

    use super::UnsubAck;
    use crate::property::PropertyType;
    use crate::{parse::*, Error, FixedHeader, Properties};

    const ALLOWED_PROPERTIES: &[PropertyType] =
        &[PropertyType::ReasonString, PropertyType::UserProperty];

    pub fn read(_fixed_header: FixedHeader, mut bytes: Bytes) -> Result<UnsubAck, Error> {
        let pkid = read_u16(&mut bytes)?;
        let properties = Properties::read(&mut bytes, ALLOWED_PROPERTIES)?;

        if !bytes.has_remaining() {
            return Err(Error::MalformedPacket);
        }

        let mut reason_codes = Vec::new();
        while bytes.has_remaining() {
            let r = read_u8(&mut bytes)?;
            reason_codes.push(r.try_into()?);
        }

        Ok(UnsubAck {
            pkid,
            reason_codes,
            properties,
        })
    }

    pub fn write(packet: &UnsubAck, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        buffer.put_u8(0xB0);
        // remaining length
        let len = len(packet)?;
        len.write(buffer);
        // packet identifier
        buffer.put_u16(packet.pkid);
        // properties
        packet.properties.write(buffer)?;

        // reason codes
        buffer.extend(packet.reason_codes.iter().map(|&c| c as u8));

        Ok(1 + len.length() + len.value())
    }

    pub fn len(packet: &UnsubAck) -> Result<VarInt, Error> {
        let mut len = 2 + packet.reason_codes.len();

        let properties_len = packet.properties.len()?;
        len += properties_len.length() + properties_len.value();

        VarInt::new(len)
    }
}
