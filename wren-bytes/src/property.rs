//! Module for working with MQTT properties

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::parse::{
    read_mqtt_bytes, read_mqtt_string, read_u16, read_u32, read_u8, write_mqtt_bytes,
    write_mqtt_string,
};
use crate::{Error, VarInt};

/// MQTT 5.0 Property
///
/// A key-value pair carried in the variable header of a packet. The key is
/// an identifier encoded as a variable byte integer, the value format
/// depends on the identifier.
///
/// Each packet type accepts only a subset of these; reading validates the
/// identifier against a per-packet allow list.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum Property {
    PayloadFormatIndicator(u8),
    MessageExpiryInterval(u32),
    ContentType(String),
    ResponseTopic(String),
    CorrelationData(Bytes),
    SubscriptionIdentifier(VarInt),
    SessionExpiryInterval(u32),
    AssignedClientIdentifier(String),
    ServerKeepAlive(u16),
    AuthenticationMethod(String),
    AuthenticationData(Bytes),
    RequestProblemInformation(bool),
    WillDelayInterval(u32),
    RequestResponseInformation(bool),
    ResponseInformation(String),
    ServerReference(String),
    ReasonString(String),
    ReceiveMaximum(u16),
    TopicAliasMaximum(u16),
    TopicAlias(u16),
    MaximumQos(u8),
    RetainAvailable(bool),
    UserProperty { name: String, value: String },
    MaximumPacketSize(u32),
    WildcardSubscriptionAvailable(bool),
    SubscriptionIdentifierAvailable(bool),
    SharedSubscriptionAvailable(bool),
}

impl Property {
    /// Read the value of a single property, the identifier byte already consumed.
    fn read(property_type: PropertyType, stream: &mut Bytes) -> Result<Self, Error> {
        let property = match property_type {
            PropertyType::PayloadFormatIndicator => {
                Property::PayloadFormatIndicator(read_u8(stream)?)
            }
            PropertyType::MessageExpiryInterval => {
                Property::MessageExpiryInterval(read_u32(stream)?)
            }
            PropertyType::ContentType => Property::ContentType(read_mqtt_string(stream)?),
            PropertyType::ResponseTopic => Property::ResponseTopic(read_mqtt_string(stream)?),
            PropertyType::CorrelationData => Property::CorrelationData(read_mqtt_bytes(stream)?),
            PropertyType::SubscriptionIdentifier => {
                let varint = VarInt::read(stream.iter())?;
                stream.advance(varint.length());
                Property::SubscriptionIdentifier(varint)
            }
            PropertyType::SessionExpiryInterval => {
                Property::SessionExpiryInterval(read_u32(stream)?)
            }
            PropertyType::AssignedClientIdentifier => {
                Property::AssignedClientIdentifier(read_mqtt_string(stream)?)
            }
            PropertyType::ServerKeepAlive => Property::ServerKeepAlive(read_u16(stream)?),
            PropertyType::AuthenticationMethod => {
                Property::AuthenticationMethod(read_mqtt_string(stream)?)
            }
            PropertyType::AuthenticationData => {
                Property::AuthenticationData(read_mqtt_bytes(stream)?)
            }
            PropertyType::RequestProblemInformation => {
                Property::RequestProblemInformation(read_u8(stream)? != 0)
            }
            PropertyType::WillDelayInterval => Property::WillDelayInterval(read_u32(stream)?),
            PropertyType::RequestResponseInformation => {
                Property::RequestResponseInformation(read_u8(stream)? != 0)
            }
            PropertyType::ResponseInformation => {
                Property::ResponseInformation(read_mqtt_string(stream)?)
            }
            PropertyType::ServerReference => Property::ServerReference(read_mqtt_string(stream)?),
            PropertyType::ReasonString => Property::ReasonString(read_mqtt_string(stream)?),
            PropertyType::ReceiveMaximum => Property::ReceiveMaximum(read_u16(stream)?),
            PropertyType::TopicAliasMaximum => Property::TopicAliasMaximum(read_u16(stream)?),
            PropertyType::TopicAlias => Property::TopicAlias(read_u16(stream)?),
            PropertyType::MaximumQos => Property::MaximumQos(read_u8(stream)?),
            PropertyType::RetainAvailable => Property::RetainAvailable(read_u8(stream)? != 0),
            PropertyType::UserProperty => {
                let name = read_mqtt_string(stream)?;
                let value = read_mqtt_string(stream)?;
                Property::UserProperty { name, value }
            }
            PropertyType::MaximumPacketSize => Property::MaximumPacketSize(read_u32(stream)?),
            PropertyType::WildcardSubscriptionAvailable => {
                Property::WildcardSubscriptionAvailable(read_u8(stream)? != 0)
            }
            PropertyType::SubscriptionIdentifierAvailable => {
                Property::SubscriptionIdentifierAvailable(read_u8(stream)? != 0)
            }
            PropertyType::SharedSubscriptionAvailable => {
                Property::SharedSubscriptionAvailable(read_u8(stream)? != 0)
            }
        };

        Ok(property)
    }

    /// Write the property, identifier byte included.
    fn write(&self, stream: &mut BytesMut) {
        stream.put_u8(self.property_type() as u8);
        match self {
            Property::PayloadFormatIndicator(value) => stream.put_u8(*value),
            Property::MessageExpiryInterval(value) => stream.put_u32(*value),
            Property::ContentType(value) => write_mqtt_string(stream, value),
            Property::ResponseTopic(value) => write_mqtt_string(stream, value),
            Property::CorrelationData(value) => write_mqtt_bytes(stream, value),
            Property::SubscriptionIdentifier(value) => value.write(stream),
            Property::SessionExpiryInterval(value) => stream.put_u32(*value),
            Property::AssignedClientIdentifier(value) => write_mqtt_string(stream, value),
            Property::ServerKeepAlive(value) => stream.put_u16(*value),
            Property::AuthenticationMethod(value) => write_mqtt_string(stream, value),
            Property::AuthenticationData(value) => write_mqtt_bytes(stream, value),
            Property::RequestProblemInformation(value) => stream.put_u8(u8::from(*value)),
            Property::WillDelayInterval(value) => stream.put_u32(*value),
            Property::RequestResponseInformation(value) => stream.put_u8(u8::from(*value)),
            Property::ResponseInformation(value) => write_mqtt_string(stream, value),
            Property::ServerReference(value) => write_mqtt_string(stream, value),
            Property::ReasonString(value) => write_mqtt_string(stream, value),
            Property::ReceiveMaximum(value) => stream.put_u16(*value),
            Property::TopicAliasMaximum(value) => stream.put_u16(*value),
            Property::TopicAlias(value) => stream.put_u16(*value),
            Property::MaximumQos(value) => stream.put_u8(*value),
            Property::RetainAvailable(value) => stream.put_u8(u8::from(*value)),
            Property::UserProperty { name, value } => {
                write_mqtt_string(stream, name);
                write_mqtt_string(stream, value);
            }
            Property::MaximumPacketSize(value) => stream.put_u32(*value),
            Property::WildcardSubscriptionAvailable(value) => stream.put_u8(u8::from(*value)),
            Property::SubscriptionIdentifierAvailable(value) => stream.put_u8(u8::from(*value)),
            Property::SharedSubscriptionAvailable(value) => stream.put_u8(u8::from(*value)),
        }
    }

    fn property_type(&self) -> PropertyType {
        match self {
            Property::PayloadFormatIndicator(_) => PropertyType::PayloadFormatIndicator,
            Property::MessageExpiryInterval(_) => PropertyType::MessageExpiryInterval,
            Property::ContentType(_) => PropertyType::ContentType,
            Property::ResponseTopic(_) => PropertyType::ResponseTopic,
            Property::CorrelationData(_) => PropertyType::CorrelationData,
            Property::SubscriptionIdentifier(_) => PropertyType::SubscriptionIdentifier,
            Property::SessionExpiryInterval(_) => PropertyType::SessionExpiryInterval,
            Property::AssignedClientIdentifier(_) => PropertyType::AssignedClientIdentifier,
            Property::ServerKeepAlive(_) => PropertyType::ServerKeepAlive,
            Property::AuthenticationMethod(_) => PropertyType::AuthenticationMethod,
            Property::AuthenticationData(_) => PropertyType::AuthenticationData,
            Property::RequestProblemInformation(_) => PropertyType::RequestProblemInformation,
            Property::WillDelayInterval(_) => PropertyType::WillDelayInterval,
            Property::RequestResponseInformation(_) => PropertyType::RequestResponseInformation,
            Property::ResponseInformation(_) => PropertyType::ResponseInformation,
            Property::ServerReference(_) => PropertyType::ServerReference,
            Property::ReasonString(_) => PropertyType::ReasonString,
            Property::ReceiveMaximum(_) => PropertyType::ReceiveMaximum,
            Property::TopicAliasMaximum(_) => PropertyType::TopicAliasMaximum,
            Property::TopicAlias(_) => PropertyType::TopicAlias,
            Property::MaximumQos(_) => PropertyType::MaximumQos,
            Property::RetainAvailable(_) => PropertyType::RetainAvailable,
            Property::UserProperty { .. } => PropertyType::UserProperty,
            Property::MaximumPacketSize(_) => PropertyType::MaximumPacketSize,
            Property::WildcardSubscriptionAvailable(_) => {
                PropertyType::WildcardSubscriptionAvailable
            }
            Property::SubscriptionIdentifierAvailable(_) => {
                PropertyType::SubscriptionIdentifierAvailable
            }
            Property::SharedSubscriptionAvailable(_) => PropertyType::SharedSubscriptionAvailable,
        }
    }

    /// Encoded size of the value, excluding the identifier byte.
    fn len(&self) -> usize {
        match self {
            Property::PayloadFormatIndicator(_) => 1,
            Property::MessageExpiryInterval(_) => 4,
            Property::ContentType(s) => 2 + s.len(),
            Property::ResponseTopic(s) => 2 + s.len(),
            Property::CorrelationData(v) => 2 + v.len(),
            Property::SubscriptionIdentifier(varint) => varint.length(),
            Property::SessionExpiryInterval(_) => 4,
            Property::AssignedClientIdentifier(s) => 2 + s.len(),
            Property::ServerKeepAlive(_) => 2,
            Property::AuthenticationMethod(s) => 2 + s.len(),
            Property::AuthenticationData(v) => 2 + v.len(),
            Property::RequestProblemInformation(_) => 1,
            Property::WillDelayInterval(_) => 4,
            Property::RequestResponseInformation(_) => 1,
            Property::ResponseInformation(s) => 2 + s.len(),
            Property::ServerReference(s) => 2 + s.len(),
            Property::ReasonString(s) => 2 + s.len(),
            Property::ReceiveMaximum(_) => 2,
            Property::TopicAliasMaximum(_) => 2,
            Property::TopicAlias(_) => 2,
            Property::MaximumQos(_) => 1,
            Property::RetainAvailable(_) => 1,
            Property::UserProperty { name, value } => 2 + name.len() + 2 + value.len(),
            Property::MaximumPacketSize(_) => 4,
            Property::WildcardSubscriptionAvailable(_) => 1,
            Property::SubscriptionIdentifierAvailable(_) => 1,
            Property::SharedSubscriptionAvailable(_) => 1,
        }
    }
}

/// A set of [Property] values from the variable header of a packet.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Properties(Vec<Property>);

/// Create new [Properties] from a given list of [Property] instances.
///
/// # Example
/// ```
/// # use wren_bytes::{properties, Property};
/// let props = properties![
///     Property::ReceiveMaximum(20),
///     Property::MaximumPacketSize(1024),
/// ];
/// ```
#[macro_export]
macro_rules! properties {
    () => (
        $crate::Properties::new()
    );
    ($($x:expr),+ $(,)?) => (
        $crate::Properties::from_vec(vec![$($x),+])
    );
}

impl Properties {
    /// Create a new empty [Properties] instance.
    pub const fn new() -> Self {
        Properties(Vec::new())
    }

    /// Create a new [Properties] instance containing a list of [Property]'s.
    pub const fn from_vec(properties: Vec<Property>) -> Self {
        Properties(properties)
    }

    /// Add a property to the list of properties.
    pub fn add(&mut self, property: Property) {
        self.0.push(property);
    }

    /// The session expiry interval in seconds, if present.
    pub fn session_expiry_interval(&self) -> Option<u32> {
        self.0.iter().find_map(|p| match p {
            Property::SessionExpiryInterval(v) => Some(*v),
            _ => None,
        })
    }

    /// The receive maximum, if present.
    pub fn receive_maximum(&self) -> Option<u16> {
        self.0.iter().find_map(|p| match p {
            Property::ReceiveMaximum(v) => Some(*v),
            _ => None,
        })
    }

    /// The maximum packet size the peer accepts, if present.
    pub fn maximum_packet_size(&self) -> Option<u32> {
        self.0.iter().find_map(|p| match p {
            Property::MaximumPacketSize(v) => Some(*v),
            _ => None,
        })
    }

    /// The keep alive interval assigned by the server, if present.
    pub fn server_keep_alive(&self) -> Option<u16> {
        self.0.iter().find_map(|p| match p {
            Property::ServerKeepAlive(v) => Some(*v),
            _ => None,
        })
    }

    /// The client identifier assigned by the server, if present.
    pub fn assigned_client_identifier(&self) -> Option<&str> {
        self.0.iter().find_map(|p| match p {
            Property::AssignedClientIdentifier(v) => Some(v.as_str()),
            _ => None,
        })
    }

    pub(crate) fn read(stream: &mut Bytes, allow_list: &[PropertyType]) -> Result<Self, Error> {
        let mut properties = Vec::new();
        let properties_len = VarInt::read(stream.iter())?;
        stream.advance(properties_len.length());

        let mut cursor = 0;
        while properties_len > cursor {
            let property_type = PropertyType::try_from(read_u8(stream)?)?;
            if !allow_list.contains(&property_type) {
                return Err(Error::InvalidPropertyType(property_type as u8));
            }

            let property = Property::read(property_type, stream)?;
            cursor += 1 + property.len();
            properties.push(property);
        }

        Ok(Properties(properties))
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<usize, Error> {
        let varint = self.len()?;
        varint.write(stream);

        for property in &self.0 {
            property.write(stream);
        }

        Ok(varint.length() + varint.value())
    }

    /// The size, as a variable byte integer, of the properties after serialization.
    pub(crate) fn len(&self) -> Result<VarInt, Error> {
        let mut properties_len = 0;
        for property in &self.0 {
            // property id + property length
            properties_len += 1 + property.len();
        }

        VarInt::new(properties_len)
    }
}

impl core::ops::Deref for Properties {
    type Target = [Property];

    fn deref(&self) -> &Self::Target {
        self.0.as_slice()
    }
}

impl IntoIterator for Properties {
    type Item = Property;
    type IntoIter = std::vec::IntoIter<Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Properties {
    type Item = &'a Property;
    type IntoIter = std::slice::Iter<'a, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Identifiers of the different properties used in MQTT 5.0
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PropertyType {
    PayloadFormatIndicator = 1,
    MessageExpiryInterval = 2,
    ContentType = 3,
    ResponseTopic = 8,
    CorrelationData = 9,
    SubscriptionIdentifier = 11,
    SessionExpiryInterval = 17,
    AssignedClientIdentifier = 18,
    ServerKeepAlive = 19,
    AuthenticationMethod = 21,
    AuthenticationData = 22,
    RequestProblemInformation = 23,
    WillDelayInterval = 24,
    RequestResponseInformation = 25,
    ResponseInformation = 26,
    ServerReference = 28,
    ReasonString = 31,
    ReceiveMaximum = 33,
    TopicAliasMaximum = 34,
    TopicAlias = 35,
    MaximumQos = 36,
    RetainAvailable = 37,
    UserProperty = 38,
    MaximumPacketSize = 39,
    WildcardSubscriptionAvailable = 40,
    SubscriptionIdentifierAvailable = 41,
    SharedSubscriptionAvailable = 42,
}

impl TryFrom<u8> for PropertyType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let property = match value {
            1 => PropertyType::PayloadFormatIndicator,
            2 => PropertyType::MessageExpiryInterval,
            3 => PropertyType::ContentType,
            8 => PropertyType::ResponseTopic,
            9 => PropertyType::CorrelationData,
            11 => PropertyType::SubscriptionIdentifier,
            17 => PropertyType::SessionExpiryInterval,
            18 => PropertyType::AssignedClientIdentifier,
            19 => PropertyType::ServerKeepAlive,
            21 => PropertyType::AuthenticationMethod,
            22 => PropertyType::AuthenticationData,
            23 => PropertyType::RequestProblemInformation,
            24 => PropertyType::WillDelayInterval,
            25 => PropertyType::RequestResponseInformation,
            26 => PropertyType::ResponseInformation,
            28 => PropertyType::ServerReference,
            31 => PropertyType::ReasonString,
            33 => PropertyType::ReceiveMaximum,
            34 => PropertyType::TopicAliasMaximum,
            35 => PropertyType::TopicAlias,
            36 => PropertyType::MaximumQos,
            37 => PropertyType::RetainAvailable,
            38 => PropertyType::UserProperty,
            39 => PropertyType::MaximumPacketSize,
            40 => PropertyType::WildcardSubscriptionAvailable,
            41 => PropertyType::SubscriptionIdentifierAvailable,
            42 => PropertyType::SharedSubscriptionAvailable,
            num => return Err(Error::InvalidPropertyType(num)),
        };

        Ok(property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn properties_round_trip() {
        let props = properties![
            Property::SessionExpiryInterval(3600),
            Property::ReceiveMaximum(100),
            Property::UserProperty {
                name: "region".to_string(),
                value: "eu-west".to_string(),
            },
        ];

        let mut stream = BytesMut::new();
        let written = props.write(&mut stream).unwrap();
        assert_eq!(written, stream.len());

        let mut bytes = stream.freeze();
        let allow = [
            PropertyType::SessionExpiryInterval,
            PropertyType::ReceiveMaximum,
            PropertyType::UserProperty,
        ];
        let read = Properties::read(&mut bytes, &allow).unwrap();
        assert_eq!(read, props);
        assert_eq!(read.session_expiry_interval(), Some(3600));
        assert_eq!(read.receive_maximum(), Some(100));
    }

    #[test]
    fn disallowed_property_is_rejected() {
        let props = properties![Property::TopicAlias(10)];
        let mut stream = BytesMut::new();
        props.write(&mut stream).unwrap();

        let mut bytes = stream.freeze();
        let err = Properties::read(&mut bytes, &[PropertyType::ReceiveMaximum]).unwrap_err();
        assert!(matches!(err, Error::InvalidPropertyType(35)));
    }
}
