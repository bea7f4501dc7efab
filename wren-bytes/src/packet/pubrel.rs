use crate::{reason, Error, Properties};

/// Publish release
///
/// Response to a PUBREC packet.
/// It is the third packet of the QoS 2 protocol exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubRel {
    pub pkid: u16,
    pub reason: PubRelReasonCode,
    pub properties: Properties,
}

impl PubRel {
    pub fn new(pkid: u16) -> Self {
        Self {
            pkid,
            reason: PubRelReasonCode::Success,
            properties: Properties::new(),
        }
    }
}

/// Reason code in PUBREL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PubRelReasonCode {
    Success = reason::SUCCESS,
    PacketIdentifierNotFound = reason::PACKET_IDENTIFIER_NOT_FOUND,
}

impl TryFrom<u8> for PubRelReasonCode {
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

    use super::PubRel;
    use crate::{parse::*, Error, FixedHeader};

    pub fn read(_fixed_header: FixedHeader, mut bytes: Bytes) -> Result<PubRel, Error> {
        let pkid = read_u16(&mut bytes)?;
        Ok(PubRel::new(pkid))
    }

    pub fn write(packet: &PubRel, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags, PUBREL carries fixed flags 0b0010
        buffer.put_u8(0x62);
        // remaining length
        let len = len(packet)?;
        len.write(buffer);
        // packet identifier
        buffer.put_u16(packet.pkid);

        Ok(1 + len.length() + len.value())
    }

    pub fn len(_packet: &PubRel) -> Result<VarInt, Error> {
        VarInt::new(2) // pkid
    }
}

pub(crate) mod v5 {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::{PubRel, PubRelReasonCode};
    use crate::property::PropertyType;
    use crate::{parse::*, Error, FixedHeader, Properties};

    const ALLOWED_PROPERTIES: &[PropertyType] =
        &[PropertyType::ReasonString, PropertyType::UserProperty];

    pub fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<PubRel, Error> {
        let pkid = read_u16(&mut bytes)?;

        // No reason code or properties if remaining length == 2
        if fixed_header.remaining_len == 2 {
            return Ok(PubRel::new(pkid));
        }

        let ack_reason = read_u8(&mut bytes)?;
        if fixed_header.remaining_len < 4 {
            // Properties length is omitted
            return Ok(PubRel {
                pkid,
                reason: ack_reason.try_into()?,
                properties: Properties::new(),
            });
        }

        Ok(PubRel {
            pkid,
            reason: ack_reason.try_into()?,
            properties: Properties::read(&mut bytes, ALLOWED_PROPERTIES)?,
        })
    }

    pub fn write(packet: &PubRel, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags, PUBREL carries fixed flags 0b0010
        buffer.put_u8(0x62);
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

    pub fn len(packet: &PubRel) -> Result<VarInt, Error> {
        let mut len = 2; // packet identifier

        if packet.reason == PubRelReasonCode::Success && packet.properties.is_empty() {
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
    use crate::{Packet, Protocol, V5};

    #[test]
    fn reason_code_round_trips() {
        let pubrel = PubRel {
            pkid: 3,
            reason: PubRelReasonCode::PacketIdentifierNotFound,
            properties: Properties::new(),
        };

        let mut buf = BytesMut::new();
        v5::write(&pubrel, &mut buf).unwrap();
        // reason code followed by a zero property length
        assert_eq!(&buf[..], &[0x62, 0x04, 0x00, 0x03, 0x92, 0x00]);

        let packet = V5::read(&mut buf, 128).unwrap();
        assert_eq!(packet, Packet::PubRel(pubrel));
    }
}
