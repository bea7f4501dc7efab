use crate::{reason, Error, Properties};

/// Publish complete
///
/// Response to a PUBREL packet.
/// It is the fourth and final packet of the QoS 2 protocol exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubComp {
    pub pkid: u16,
    pub reason: PubCompReasonCode,
    pub properties: Properties,
}

impl PubComp {
    pub fn new(pkid: u16) -> Self {
        Self {
            pkid,
            reason: PubCompReasonCode::Success,
            properties: Properties::new(),
        }
    }
}

/// Reason code in PUBCOMP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PubCompReasonCode {
    Success = reason::SUCCESS,
    PacketIdentifierNotFound = reason::PACKET_IDENTIFIER_NOT_FOUND,
}

impl TryFrom<u8> for PubCompReasonCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            reason::SUCCESS => Self::Success,
            reason::PACKET_IDENTIFIER_NOT_FOUND => Self::PacketIdentifierNotFound,
            num => return Err(Error::InvalidReasonCode(num)),
        };

        Ok(code)
    }
}

pub(crate) mod v4 {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::PubComp;
    use crate::{parse::*, Error, FixedHeader};

    pub fn read(_fixed_header: FixedHeader, mut bytes: Bytes) -> Result<PubComp, Error> {
        let pkid = read_u16(&mut bytes)?;
        Ok(PubComp::new(pkid))
    }

    pub fn write(packet: &PubComp, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        buffer.put_u8(0x70);
        // remaining length
        let len = len(packet)?;
        len.write(buffer);
        // packet identifier
        buffer.put_u16(packet.pkid);

        Ok(1 + len.length() + len.value())
    }

    pub fn len(_packet: &PubComp) -> Result<VarInt, Error> {
        VarInt::new(2) // pkid
    }
}

pub(crate) mod v5 {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::{PubComp, PubCompReasonCode};
    use crate::property::PropertyType;
    use crate::{parse::*, Error, FixedHeader, Properties};

    const ALLOWED_PROPERTIES: &[PropertyType] =
        &[PropertyType::ReasonString, PropertyType::UserProperty];

    pub fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<PubComp, Error> {
        let pkid = read_u16(&mut bytes)?;

        // No reason code or properties if remaining length == 2
        if fixed_header.remaining_len == 2 {
            return Ok(PubComp::new(pkid));
        }

        let ack_reason = read_u8(&mut bytes)?;
        if fixed_header.remaining_len < 4 {
            // Properties length is omitted
            return Ok(PubComp {
                pkid,
                reason: ack_reason.try_into()?,
                properties: Properties::new(),
            });
        }

        Ok(PubComp {
            pkid,
            reason: ack_reason.try_into()?,
            properties: Properties::read(&mut bytes, ALLOWED_PROPERTIES)?,
        })
    }

    pub fn write(packet: &PubComp, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        buffer.put_u8(0x70);
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

    pub fn len(packet: &PubComp) -> Result<VarInt, Error> {
        let mut len = 2; // packet identifier

        if packet.reason == PubCompReasonCode::Success && packet.properties.is_empty() {
            // Reason code and property length can be omitted in this case
            return VarInt::new(len);
        }

        len += 1; // reason code

        let properties_len = packet.properties.len()?;
        len += properties_len.length() + properties_len.value();

        VarInt::new(len)
    }
}
