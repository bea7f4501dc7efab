use crate::{reason, Error, Properties};

/// Connect acknowledgment
///
/// Packet sent by the server in response to a CONNECT packet received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnAck {
    pub session_present: bool,
    pub code: ConnectReasonCode,
    pub properties: Properties,
}

impl ConnAck {
    pub fn new(session_present: bool) -> Self {
        Self {
            session_present,
            code: ConnectReasonCode::Success,
            properties: Properties::new(),
        }
    }
}

/// MQTT 5.0 connect reason codes
///
/// A subset of these codes are used in MQTT 3.1.1 as well.
/// A [ConnectReturnCode] can always be converted to a [ConnectReasonCode],
/// the conversion in the other direction is fallible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectReasonCode {
    Success = reason::SUCCESS,
    UnspecifiedError = reason::UNSPECIFIED_ERROR,
    MalformedPacket = reason::MALFORMED_PACKET,
    ProtocolError = reason::PROTOCOL_ERROR,
    ImplementationSpecificError = reason::IMPLEMENTATION_SPECIFIC_ERROR,
    UnsupportedProtocolVersion = reason::UNSUPPORTED_PROTOCOL_VERSION,
    ClientIdentifierNotValid = reason::CLIENT_IDENTIFIER_NOT_VALID,
    BadUserNamePassword = reason::BAD_USER_NAME_OR_PASSWORD,
    NotAuthorized = reason::NOT_AUTHORIZED,
    ServerUnavailable = reason::SERVER_UNAVAILABLE,
    ServerBusy = reason::SERVER_BUSY,
    Banned = reason::BANNED,
    BadAuthenticationMethod = reason::BAD_AUTHENTICATION_METHOD,
    TopicNameInvalid = reason::TOPIC_NAME_INVALID,
    PacketTooLarge = reason::PACKET_TOO_LARGE,
    QuotaExceeded = reason::QUOTA_EXCEEDED,
    PayloadFormatInvalid = reason::PAYLOAD_FORMAT_INVALID,
    RetainNotSupported = reason::RETAIN_NOT_SUPPORTED,
    QoSNotSupported = reason::QOS_NOT_SUPPORTED,
    UseAnotherServer = reason::USE_ANOTHER_SERVER,
    ServerMoved = reason::SERVER_MOVED,
    ConnectionRateExceeded = reason::CONNECTION_RATE_EXCEEDED,
}

impl ConnectReasonCode {
    /// Whether the server accepted the connection
    pub fn is_success(&self) -> bool {
        *self == ConnectReasonCode::Success
    }
}

/// MQTT 3.1.1 return codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectReturnCode {
    Success = 0,
    RefusedProtocolVersion,
    BadClientId,
    ServiceUnavailable,
    BadUserNamePassword,
    NotAuthorized,
}

impl TryFrom<u8> for ConnectReasonCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            reason::SUCCESS => Self::Success,
            reason::UNSPECIFIED_ERROR => Self::UnspecifiedError,
            reason::MALFORMED_PACKET => Self::MalformedPacket,
            reason::PROTOCOL_ERROR => Self::ProtocolError,
            reason::IMPLEMENTATION_SPECIFIC_ERROR => Self::ImplementationSpecificError,
            reason::UNSUPPORTED_PROTOCOL_VERSION => Self::UnsupportedProtocolVersion,
            reason::CLIENT_IDENTIFIER_NOT_VALID => Self::ClientIdentifierNotValid,
            reason::BAD_USER_NAME_OR_PASSWORD => Self::BadUserNamePassword,
            reason::NOT_AUTHORIZED => Self::NotAuthorized,
            reason::SERVER_UNAVAILABLE => Self::ServerUnavailable,
            reason::SERVER_BUSY => Self::ServerBusy,
            reason::BANNED => Self::Banned,
            reason::BAD_AUTHENTICATION_METHOD => Self::BadAuthenticationMethod,
            reason::TOPIC_NAME_INVALID => Self::TopicNameInvalid,
            reason::PACKET_TOO_LARGE => Self::PacketTooLarge,
            reason::QUOTA_EXCEEDED => Self::QuotaExceeded,
            reason::PAYLOAD_FORMAT_INVALID => Self::PayloadFormatInvalid,
            reason::RETAIN_NOT_SUPPORTED => Self::RetainNotSupported,
            reason::QOS_NOT_SUPPORTED => Self::QoSNotSupported,
            reason::USE_ANOTHER_SERVER => Self::UseAnotherServer,
            reason::SERVER_MOVED => Self::ServerMoved,
            reason::CONNECTION_RATE_EXCEEDED => Self::ConnectionRateExceeded,
            num => return Err(Error::InvalidConnectReasonCode(num)),
        };

        Ok(code)
    }
}

impl TryFrom<u8> for ConnectReturnCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            0 => Self::Success,
            1 => Self::RefusedProtocolVersion,
            2 => Self::BadClientId,
            3 => Self::ServiceUnavailable,
            4 => Self::BadUserNamePassword,
            5 => Self::NotAuthorized,
            num => return Err(Error::InvalidConnectReasonCode(num)),
        };

        Ok(code)
    }
}

impl From<ConnectReturnCode> for ConnectReasonCode {
    fn from(value: ConnectReturnCode) -> Self {
        match value {
            ConnectReturnCode::Success => Self::Success,
            ConnectReturnCode::RefusedProtocolVersion => Self::UnsupportedProtocolVersion,
            ConnectReturnCode::BadClientId => Self::ClientIdentifierNotValid,
            ConnectReturnCode::ServiceUnavailable => Self::ServerUnavailable,
            ConnectReturnCode::BadUserNamePassword => Self::BadUserNamePassword,
            ConnectReturnCode::NotAuthorized => Self::NotAuthorized,
        }
    }
}

impl TryFrom<ConnectReasonCode> for ConnectReturnCode {
    type Error = Error;

    fn try_from(value: ConnectReasonCode) -> Result<Self, Self::Error> {
        let code = match value {
            ConnectReasonCode::Success => Self::Success,
            ConnectReasonCode::UnsupportedProtocolVersion => Self::RefusedProtocolVersion,
            ConnectReasonCode::ClientIdentifierNotValid => Self::BadClientId,
            ConnectReasonCode::ServerUnavailable => Self::ServiceUnavailable,
            ConnectReasonCode::BadUserNamePassword => Self::BadUserNamePassword,
            ConnectReasonCode::NotAuthorized => Self::NotAuthorized,
            // MQTT 3.1.1 does not know the remaining MQTT 5.0 codes
            _ => return Err(Error::InvalidConnectReasonCode(value as u8)),
        };
        Ok(code)
    }
}

pub(crate) mod v4 {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::{ConnAck, ConnectReturnCode};
    use crate::{parse::*, Error, FixedHeader, Properties};

    pub fn read(_fixed_header: FixedHeader, mut bytes: Bytes) -> Result<ConnAck, Error> {
        let flags = read_u8(&mut bytes)?;
        let return_code = read_u8(&mut bytes)?;

        let session_present = (flags & 0x01) == 1;
        let code = ConnectReturnCode::try_from(return_code)?;
        Ok(ConnAck {
            session_present,
            code: code.into(),
            properties: Properties::new(),
        })
    }

    pub fn write(packet: &ConnAck, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        buffer.put_u8(0x20);
        // remaining length
        let len = len(packet)?;
        len.write(buffer);
        // connect acknowledge flags
        buffer.put_u8(packet.session_present as u8);
        // return code
        buffer.put_u8(ConnectReturnCode::try_from(packet.code)? as u8);

        Ok(1 + len.length() + len.value())
    }

    pub fn len(_packet: &ConnAck) -> Result<VarInt, Error> {
        // session present + code
        VarInt::new(1 + 1)
    }
}

pub(crate) mod v5 {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::{ConnAck, ConnectReasonCode};
    use crate::property::PropertyType;
    use crate::{parse::*, Error, FixedHeader, Properties};

    const ALLOWED_PROPERTIES: &[PropertyType] = &[
        PropertyType::SessionExpiryInterval,
        PropertyType::ReceiveMaximum,
        PropertyType::MaximumQos,
        PropertyType::RetainAvailable,
        PropertyType::MaximumPacketSize,
        PropertyType::AssignedClientIdentifier,
        PropertyType::TopicAliasMaximum,
        PropertyType::ReasonString,
        PropertyType::UserProperty,
        PropertyType::WildcardSubscriptionAvailable,
        PropertyType::SubscriptionIdentifierAvailable,
        PropertyType::SharedSubscriptionAvailable,
        PropertyType::ServerKeepAlive,
        PropertyType::ResponseInformation,
        PropertyType::ServerReference,
        PropertyType::AuthenticationMethod,
        PropertyType::AuthenticationData,
    ];

    pub fn read(_fixed_header: FixedHeader, mut bytes: Bytes) -> Result<ConnAck, Error> {
        let flags = read_u8(&mut bytes)?;
        let return_code = read_u8(&mut bytes)?;
        let properties = Properties::read(&mut bytes, ALLOWED_PROPERTIES)?;

        let session_present = (flags & 0x01) == 1;
        let code = ConnectReasonCode::try_from(return_code)?;
        Ok(ConnAck {
            session_present,
            code,
            properties,
        })
    }

    pub fn write(packet: &ConnAck, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        buffer.put_u8(0x20);
        // remaining length
        let len = len(packet)?;
        len.write(buffer);
        // connect acknowledge flags
        buffer.put_u8(packet.session_present as u8);
        // reason code
        buffer.put_u8(packet.code as u8);
        // properties
        packet.properties.write(buffer)?;

        Ok(1 + len.length() + len.value())
    }

    pub fn len(packet: &ConnAck) -> Result<VarInt, Error> {
        let mut len = 1  // connect acknowledge flags
                    + 1; // connect reason code

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
    use crate::{properties, Packet, Property, Protocol, V4};

    #[test]
    fn session_present_flag_is_parsed() {
        let stream = &[
            0x20, 0x02, // packet type, flags and remaining len
            0x01, 0x00, // session present, accepted
        ];
        let mut stream = BytesMut::from(&stream[..]);
        let packet = V4::read(&mut stream, 128).unwrap();
        assert_eq!(packet, Packet::ConnAck(ConnAck::new(true)));
    }

    #[test]
    fn v5_only_reason_codes_cannot_be_written_as_v4() {
        let mut connack = ConnAck::new(false);
        connack.code = ConnectReasonCode::ServerBusy;
        let mut buf = BytesMut::new();
        assert!(v4::write(&connack, &mut buf).is_err());
    }

    #[test]
    fn length_calculation() {
        let mut dummy_bytes = BytesMut::new();
        let connack_props = properties![Property::UserProperty {
            name: USER_PROP_KEY.into(),
            value: USER_PROP_VAL.into(),
        }];

        let connack_pkt = ConnAck {
            session_present: false,
            code: ConnectReasonCode::Success,
            properties: connack_props,
        };

        let size_from_size = size_from_len(v5::len(&connack_pkt).unwrap());
        let size_from_write = v5::write(&connack_pkt, &mut dummy_bytes).unwrap();
        let size_from_bytes = dummy_bytes.len();

        assert_eq!(size_from_write, size_from_bytes);
        assert_eq!(size_from_size, size_from_bytes);
    }
}
