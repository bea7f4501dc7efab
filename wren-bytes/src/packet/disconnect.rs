use crate::{reason, Error, Properties};

/// Disconnect notification
///
/// The final MQTT packet sent from the client or the server.
/// It indicates the reason why the network connection is being closed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Disconnect {
    /// Disconnect Reason Code
    pub reason_code: DisconnectReasonCode,
    /// Disconnect Properties
    pub properties: Properties,
}

impl Disconnect {
    pub fn new() -> Self {
        Self {
            reason_code: DisconnectReasonCode::NormalDisconnection,
            properties: Properties::new(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DisconnectReasonCode {
    /// Close the connection normally. Do not send the Will Message.
    #[default]
    NormalDisconnection = reason::NORMAL_DISCONNECTION,
    /// The client wishes to disconnect but requires that the server also publishes its Will Message.
    DisconnectWithWillMessage = reason::DISCONNECT_WITH_WILL_MESSAGE,
    /// The sender does not wish to reveal the reason, or none of the other codes apply.
    UnspecifiedError = reason::UNSPECIFIED_ERROR,
    /// The received packet does not conform to this specification.
    MalformedPacket = reason::MALFORMED_PACKET,
    /// An unexpected or out of order packet was received.
    ProtocolError = reason::PROTOCOL_ERROR,
    /// The packet received is valid but cannot be processed by this implementation.
    ImplementationSpecificError = reason::IMPLEMENTATION_SPECIFIC_ERROR,
    /// The request is not authorized.
    NotAuthorized = reason::NOT_AUTHORIZED,
    /// The server is busy and cannot continue processing requests from this client.
    ServerBusy = reason::SERVER_BUSY,
    /// The server is shutting down.
    ServerShuttingDown = reason::SERVER_SHUTTING_DOWN,
    /// No packet has been received for 1.5 times the keep alive time.
    KeepAliveTimeout = reason::KEEP_ALIVE_TIMEOUT,
    /// Another connection using the same client identifier has connected.
    SessionTakenOver = reason::SESSION_TAKEN_OVER,
    /// The topic filter is correctly formed but is not accepted.
    TopicFilterInvalid = reason::TOPIC_FILTER_INVALID,
    /// The topic name is correctly formed but is not accepted.
    TopicNameInvalid = reason::TOPIC_NAME_INVALID,
    /// More PUBLISH packets in flight than the receive maximum allows.
    ReceiveMaximumExceeded = reason::RECEIVE_MAXIMUM_EXCEEDED,
    /// A topic alias exceeds the maximum announced in CONNECT or CONNACK.
    TopicAliasInvalid = reason::TOPIC_ALIAS_INVALID,
    /// The packet exceeded the maximum permissible size.
    PacketTooLarge = reason::PACKET_TOO_LARGE,
    /// The received data rate is too high.
    MessageRateTooHigh = reason::MESSAGE_RATE_TOO_HIGH,
    /// An implementation or administrative imposed limit has been exceeded.
    QuotaExceeded = reason::QUOTA_EXCEEDED,
    /// The connection is closed due to an administrative action.
    AdministrativeAction = reason::ADMINISTRATIVE_ACTION,
    /// The payload format does not match the payload format indicator.
    PayloadFormatInvalid = reason::PAYLOAD_FORMAT_INVALID,
    /// The server does not support retained messages.
    RetainNotSupported = reason::RETAIN_NOT_SUPPORTED,
    /// The client specified a QoS greater than the maximum in CONNACK.
    QoSNotSupported = reason::QOS_NOT_SUPPORTED,
    /// The client should temporarily use another server.
    UseAnotherServer = reason::USE_ANOTHER_SERVER,
    /// The client should permanently use another server.
    ServerMoved = reason::SERVER_MOVED,
    /// The server does not support shared subscriptions.
    SharedSubscriptionNotSupported = reason::SHARED_SUBSCRIPTIONS_NOT_SUPPORTED,
    /// The connection rate limit has been exceeded.
    ConnectionRateExceeded = reason::CONNECTION_RATE_EXCEEDED,
    /// The maximum connection time authorized for this connection has been exceeded.
    MaximumConnectTime = reason::MAXIMUM_CONNECT_TIME,
    /// The server does not support subscription identifiers.
    SubscriptionIdentifiersNotSupported = reason::SUBSCRIPTION_IDENTIFIERS_NOT_SUPPORTED,
    /// The server does not support wildcard subscriptions.
    WildcardSubscriptionsNotSupported = reason::WILDCARD_SUBSCRIPTIONS_NOT_SUPPORTED,
}

impl TryFrom<u8> for DisconnectReasonCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            reason::NORMAL_DISCONNECTION => Self::NormalDisconnection,
            reason::DISCONNECT_WITH_WILL_MESSAGE => Self::DisconnectWithWillMessage,
            reason::UNSPECIFIED_ERROR => Self::UnspecifiedError,
            reason::MALFORMED_PACKET => Self::MalformedPacket,
            reason::PROTOCOL_ERROR => Self::ProtocolError,
            reason::IMPLEMENTATION_SPECIFIC_ERROR => Self::ImplementationSpecificError,
            reason::NOT_AUTHORIZED => Self::NotAuthorized,
            reason::SERVER_BUSY => Self::ServerBusy,
            reason::SERVER_SHUTTING_DOWN => Self::ServerShuttingDown,
            reason::KEEP_ALIVE_TIMEOUT => Self::KeepAliveTimeout,
            reason::SESSION_TAKEN_OVER => Self::SessionTakenOver,
            reason::TOPIC_FILTER_INVALID => Self::TopicFilterInvalid,
            reason::TOPIC_NAME_INVALID => Self::TopicNameInvalid,
            reason::RECEIVE_MAXIMUM_EXCEEDED => Self::ReceiveMaximumExceeded,
            reason::TOPIC_ALIAS_INVALID => Self::TopicAliasInvalid,
            reason::PACKET_TOO_LARGE => Self::PacketTooLarge,
            reason::MESSAGE_RATE_TOO_HIGH => Self::MessageRateTooHigh,
            reason::QUOTA_EXCEEDED => Self::QuotaExceeded,
            reason::ADMINISTRATIVE_ACTION => Self::AdministrativeAction,
            reason::PAYLOAD_FORMAT_INVALID => Self::PayloadFormatInvalid,
            reason::RETAIN_NOT_SUPPORTED => Self::RetainNotSupported,
            reason::QOS_NOT_SUPPORTED => Self::QoSNotSupported,
            reason::USE_ANOTHER_SERVER => Self::UseAnotherServer,
            reason::SERVER_MOVED => Self::ServerMoved,
            reason::SHARED_SUBSCRIPTIONS_NOT_SUPPORTED => Self::SharedSubscriptionNotSupported,
            reason::CONNECTION_RATE_EXCEEDED => Self::ConnectionRateExceeded,
            reason::MAXIMUM_CONNECT_TIME => Self::MaximumConnectTime,
            reason::SUBSCRIPTION_IDENTIFIERS_NOT_SUPPORTED => {
                Self::SubscriptionIdentifiersNotSupported
            }
            reason::WILDCARD_SUBSCRIPTIONS_NOT_SUPPORTED => Self::WildcardSubscriptionsNotSupported,
            num => return Err(Error::InvalidReasonCode(num)),
        };

        Ok(code)
    }
}

pub(crate) mod v4 {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::Disconnect;
    use crate::{parse::*, Error, FixedHeader};

    pub fn read(fixed_header: FixedHeader, _bytes: Bytes) -> Result<Disconnect, Error> {
        if fixed_header.flags() != 0x00 {
            return Err(Error::MalformedPacket);
        }

        Ok(Disconnect::new())
    }

    pub fn write(packet: &Disconnect, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        buffer.put_u8(0xE0);
        // remaining length
        let len = len(packet)?;
        len.write(buffer);

        Ok(1 + len.length() + len.value())
    }

    pub fn len(_packet: &Disconnect) -> Result<VarInt, Error> {
        VarInt::new(0) // no variable header
    }
}

pub(crate) mod v5 {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::{Disconnect, DisconnectReasonCode};
    use crate::property::PropertyType;
    use crate::{parse::*, Error, FixedHeader, Properties};

    const ALLOWED_PROPERTIES: &[PropertyType] = &[
        PropertyType::SessionExpiryInterval,
        PropertyType::ReasonString,
        PropertyType::UserProperty,
        PropertyType::ServerReference,
    ];

    pub fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Disconnect, Error> {
        if fixed_header.flags() != 0x00 {
            return Err(Error::MalformedPacket);
        }

        if fixed_header.remaining_len == 0 {
            return Ok(Disconnect::new());
        }

        let reason_code = read_u8(&mut bytes)?;
        if fixed_header.remaining_len < 2 {
            // Property length is omitted, no properties
            return Ok(Disconnect {
                reason_code: reason_code.try_into()?,
                properties: Properties::new(),
            });
        }

        Ok(Disconnect {
            reason_code: reason_code.try_into()?,
            properties: Properties::read(&mut bytes, ALLOWED_PROPERTIES)?,
        })
    }

    pub fn write(packet: &Disconnect, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        buffer.put_u8(0xE0);
        // remaining length
        let len = len(packet)?;
        len.write(buffer);

        if len > 0 {
            // reason code
            buffer.put_u8(packet.reason_code as u8);
            // properties
            packet.properties.write(buffer)?;
        }

        Ok(1 + len.length() + len.value())
    }

    pub fn len(packet: &Disconnect) -> Result<VarInt, Error> {
        if packet.reason_code == DisconnectReasonCode::NormalDisconnection
            && packet.properties.is_empty()
        {
            return VarInt::new(0); // no variable header
        }

        let mut len = 1; // reason code

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
    use crate::{properties, Packet, Property, Protocol, V5};

    #[test]
    fn normal_disconnect_is_two_bytes() {
        let mut buffer = BytesMut::new();
        v5::write(&Disconnect::new(), &mut buffer).unwrap();
        assert_eq!(&buffer[..], &[0xE0, 0x00]);

        let packet = V5::read(&mut buffer, 128).unwrap();
        assert_eq!(packet, Packet::Disconnect(Disconnect::new()));
    }

    #[test]
    fn disconnect_with_properties_round_trips() {
        let disconnect = Disconnect {
            reason_code: DisconnectReasonCode::UnspecifiedError,
            properties: properties![
                Property::SessionExpiryInterval(1234),
                Property::ReasonString("test".to_owned()),
                Property::ServerReference("test".to_owned()),
            ],
        };

        let mut buffer = BytesMut::new();
        v5::write(&disconnect, &mut buffer).unwrap();
        let packet = V5::read(&mut buffer, 128).unwrap();
        assert_eq!(packet, Packet::Disconnect(disconnect));
    }
}
