use crate::{reason, Error, Properties, QoS};

/// Subscribe acknowledgement
///
/// Sent by the server to the client to confirm receipt and processing of a SUBSCRIBE packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    pub pkid: u16,
    pub properties: Properties,
    pub reason_codes: Vec<SubscribeReasonCode>,
}

impl SubAck {
    pub fn new(pkid: u16, reason_codes: Vec<SubscribeReasonCode>) -> Self {
        SubAck {
            pkid,
            properties: Properties::new(),
            reason_codes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeReasonCode {
    Success(QoS),
    Unspecified,
    ImplementationSpecific,
    NotAuthorized,
    TopicFilterInvalid,
    PkidInUse,
    QuotaExceeded,
    SharedSubscriptionsNotSupported,
    SubscriptionIdNotSupported,
    WildcardSubscriptionsNotSupported,
}

impl TryFrom<u8> for SubscribeReasonCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let v = match value {
            reason::GRANTED_QOS_0 => Self::Success(QoS::AtMostOnce),
            reason::GRANTED_QOS_1 => Self::Success(QoS::AtLeastOnce),
            reason::GRANTED_QOS_2 => Self::Success(QoS::ExactlyOnce),
            reason::UNSPECIFIED_ERROR => Self::Unspecified,
            reason::IMPLEMENTATION_SPECIFIC_ERROR => Self::ImplementationSpecific,
            reason::NOT_AUTHORIZED => Self::NotAuthorized,
            reason::TOPIC_FILTER_INVALID => Self::TopicFilterInvalid,
            reason::PACKET_IDENTIFIER_IN_USE => Self::PkidInUse,
            reason::QUOTA_EXCEEDED => Self::QuotaExceeded,
            reason::SHARED_SUBSCRIPTIONS_NOT_SUPPORTED => Self::SharedSubscriptionsNotSupported,
            reason::SUBSCRIPTION_IDENTIFIERS_NOT_SUPPORTED => Self::SubscriptionIdNotSupported,
            reason::WILDCARD_SUBSCRIPTIONS_NOT_SUPPORTED => Self::WildcardSubscriptionsNotSupported,
            v => return Err(Error::InvalidSubscribeReasonCode(v)),
        };

        Ok(v)
    }
}

impl From<SubscribeReasonCode> for u8 {
    fn from(value: SubscribeReasonCode) -> u8 {
        match value {
            SubscribeReasonCode::Success(qos) => qos as u8,
            SubscribeReasonCode::Unspecified => reason::UNSPECIFIED_ERROR,
            SubscribeReasonCode::ImplementationSpecific => reason::IMPLEMENTATION_SPECIFIC_ERROR,
            SubscribeReasonCode::NotAuthorized => reason::NOT_AUTHORIZED,
            SubscribeReasonCode::TopicFilterInvalid => reason::TOPIC_FILTER_INVALID,
            SubscribeReasonCode::PkidInUse => reason::PACKET_IDENTIFIER_IN_USE,
            SubscribeReasonCode::QuotaExceeded => reason::QUOTA_EXCEEDED,
            SubscribeReasonCode::SharedSubscriptionsNotSupported => {
                reason::SHARED_SUBSCRIPTIONS_NOT_SUPPORTED
            }
            SubscribeReasonCode::SubscriptionIdNotSupported => {
                reason::SUBSCRIPTION_IDENTIFIERS_NOT_SUPPORTED
            }
            SubscribeReasonCode::WildcardSubscriptionsNotSupported => {
                reason::WILDCARD_SUBSCRIPTIONS_NOT_SUPPORTED
            }
        }
    }
}

pub(crate) mod v4 {
    use bytes::{Buf, BufMut, Bytes, BytesMut};

    use super::SubAck;
    use crate::{parse::*, Error, FixedHeader};

    pub fn read(_fixed_header: FixedHeader, mut bytes: Bytes) -> Result<SubAck, Error> {
        let pkid = read_u16(&mut bytes)?;

        if !bytes.has_remaining() {
            return Err(Error::MalformedPacket);
        }

        let mut return_codes = Vec::new();
        while bytes.has_remaining() {
            let return_code = read_u8(&mut bytes)?;
            return_codes.push(return_code.try_into()?);
        }

        Ok(SubAck::new(pkid, return_codes))
    }

    pub fn write(packet: &SubAck, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        buffer.put_u8(0x90);
        // remaining length
        let len = len(packet)?;
        len.write(buffer);
        // packet identifier
        buffer.put_u16(packet.pkid);

        // return codes
        buffer.extend(packet.reason_codes.iter().map(|&c| u8::from(c)));

        Ok(1 + len.length() + len.value())
    }

    pub fn len(packet: &SubAck) -> Result<VarInt, Error> {
        VarInt::new(2 + packet.reason_codes.len())
    }
}

pub(crate) mod v5 {
    use bytes::{Buf, BufMut, Bytes, BytesMut};

    use super::SubAck;
    use crate::property::PropertyType;
    use crate::{parse::*, Error, FixedHeader, Properties};

    const ALLOWED_PROPERTIES: &[PropertyType] =
        &[PropertyType::ReasonString, PropertyType::UserProperty];

    pub fn read(_fixed_header: FixedHeader, mut bytes: Bytes) -> Result<SubAck, Error> {
        let pkid = read_u16(&mut bytes)?;
        let properties = Properties::read(&mut bytes, ALLOWED_PROPERTIES)?;

        if !bytes.has_remaining() {
            return Err(Error::MalformedPacket);
        }

        let mut reason_codes = Vec::new();
        while bytes.has_remaining() {
            let return_code = read_u8(&mut bytes)?;
            reason_codes.push(return_code.try_into()?);
        }

        Ok(SubAck {
            pkid,
            properties,
            reason_codes,
        })
    }

    pub fn write(packet: &SubAck, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        buffer.put_u8(0x90);
        // remaining length
        let len = len(packet)?;
        len.write(buffer);
        // packet identifier
        buffer.put_u16(packet.pkid);
        // properties
        packet.properties.write(buffer)?;

        // reason codes
        buffer.extend(packet.reason_codes.iter().map(|&c| u8::from(c)));

        Ok(1 + len.length() + len.value())
    }

    pub fn len(packet: &SubAck) -> Result<VarInt, Error> {
        let mut len = 2 + packet.reason_codes.len();

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
    use crate::{Packet, Protocol, V4};

    #[test]
    fn suback_parsing_works() {
        let stream = vec![
            0x90, 4, // packet type, flags and remaining len
            0x00, 0x0F, // variable header. pkid = 15
            0x01, 0x80, // payload. return codes [success qos1, failure]
            0xDE, 0xAD, 0xBE, 0xEF, // extra packets in the stream
        ];

        let mut stream = BytesMut::from(&stream[..]);
        let packet = V4::read(&mut stream, 128).unwrap();

        assert_eq!(
            packet,
            Packet::SubAck(SubAck::new(
                15,
                vec![
                    SubscribeReasonCode::Success(QoS::AtLeastOnce),
                    SubscribeReasonCode::Unspecified,
                ]
            ))
        );
    }

    #[test]
    fn suback_without_codes_is_rejected() {
        let stream = vec![
            0x90, 2, // packet type, flags and remaining len
            0x00, 0x0F, // pkid = 15, no return codes
        ];
        let mut stream = BytesMut::from(&stream[..]);
        assert!(matches!(
            V4::read(&mut stream, 128),
            Err(Error::MalformedPacket)
        ));
    }
}
