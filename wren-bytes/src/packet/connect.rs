use bytes::{Bytes, BytesMut};

use crate::parse::*;
use crate::{Error, Properties, QoS};

/// Connection request
///
/// The first packet that must be sent to a server after a client establishes a network connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    /// MQTT keep alive time
    pub keep_alive: u16,
    /// Clean session. Asks the broker to clear previous state
    pub clean_start: bool,
    /// Properties of the connect packet
    pub properties: Properties,
    /// Client Identifier - must be present in the payload
    pub client_id: String,
    /// Will message that broker needs to publish when the client disconnects
    pub last_will: Option<Box<LastWill>>,
    /// Login credentials
    pub login: Option<Box<Login>>,
}

impl Connect {
    pub fn new(keep_alive: u16, clean_start: bool, client_id: impl Into<String>) -> Self {
        Self {
            keep_alive,
            clean_start,
            properties: Properties::new(),
            client_id: client_id.into(),
            last_will: None,
            login: None,
        }
    }

    pub fn set_login<U: Into<String>, P: Into<String>>(&mut self, u: U, p: P) -> &mut Connect {
        self.login = Some(Box::new(Login::new(u, p)));
        self
    }
}

/// LastWill that broker forwards on behalf of the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub qos: QoS,
    pub retain: bool,
    pub properties: Properties,
    pub topic: String,
    pub payload: Bytes,
}

impl LastWill {
    pub fn new(
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
        qos: QoS,
        retain: bool,
    ) -> Self {
        Self {
            qos,
            retain,
            properties: Properties::new(),
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    fn flags(&self) -> u8 {
        let mut connect_flags = 0b100 | ((self.qos as u8) << 3);
        if self.retain {
            connect_flags |= 0b0010_0000;
        }
        connect_flags
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    pub username: String,
    pub password: String,
}

impl Login {
    pub fn new<U: Into<String>, P: Into<String>>(u: U, p: P) -> Login {
        Login {
            username: u.into(),
            password: p.into(),
        }
    }

    fn read(connect_flags: u8, bytes: &mut Bytes) -> Result<Option<Login>, Error> {
        let username = match connect_flags & 0b1000_0000 {
            0 => String::new(),
            _ => read_mqtt_string(bytes)?,
        };

        let password = match connect_flags & 0b0100_0000 {
            0 => String::new(),
            _ => read_mqtt_string(bytes)?,
        };

        if username.is_empty() && password.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Login { username, password }))
        }
    }

    fn write(&self, buffer: &mut BytesMut) -> u8 {
        let mut connect_flags = 0;
        if !self.username.is_empty() {
            connect_flags |= 0x80;
            write_mqtt_string(buffer, &self.username);
        }

        if !self.password.is_empty() {
            connect_flags |= 0x40;
            write_mqtt_string(buffer, &self.password);
        }

        connect_flags
    }

    fn len(&self) -> usize {
        let mut len = 0;

        if !self.username.is_empty() {
            len += 2 + self.username.len();
        }

        if !self.password.is_empty() {
            len += 2 + self.password.len();
        }

        len
    }
}

pub(crate) mod v4 {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::{Connect, LastWill, Login};
    use crate::{parse::*, Error, FixedHeader, Properties, QoS};

    pub fn read(_fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Connect, Error> {
        let protocol_name = read_mqtt_string(&mut bytes)?;
        if protocol_name != "MQTT" {
            return Err(Error::InvalidProtocol);
        }

        let protocol_level = read_u8(&mut bytes)?;
        if protocol_level != 4 {
            return Err(Error::InvalidProtocolLevel(protocol_level));
        }

        let connect_flags = read_u8(&mut bytes)?;
        let clean_session = (connect_flags & 0b10) != 0;
        let keep_alive = read_u16(&mut bytes)?;

        let client_id = read_mqtt_string(&mut bytes)?;
        let last_will = read_will(connect_flags, &mut bytes)?;
        let login = Login::read(connect_flags, &mut bytes)?;

        Ok(Connect {
            keep_alive,
            clean_start: clean_session,
            properties: Properties::new(),
            client_id,
            last_will,
            login: login.map(Box::new),
        })
    }

    pub fn write(packet: &Connect, buffer: &mut BytesMut) -> Result<usize, Error> {
        let base = buffer.len();
        // packet type and flags
        buffer.put_u8(0x10);
        // remaining length
        let len = len(packet)?;
        len.write(buffer);
        // protocol name
        write_mqtt_string(buffer, "MQTT");
        // protocol version
        buffer.put_u8(0x04);
        // connect flags, patched below once will and login are serialized
        let flags_index = buffer.len();
        let mut connect_flags = if packet.clean_start { 0b10 } else { 0 };
        buffer.put_u8(connect_flags);
        // keep alive time
        buffer.put_u16(packet.keep_alive);

        // client identifier
        write_mqtt_string(buffer, &packet.client_id);

        // last will message
        if let Some(w) = &packet.last_will {
            connect_flags |= w.flags();
            write_mqtt_string(buffer, &w.topic);
            write_mqtt_bytes(buffer, &w.payload);
        }

        // username and password
        if let Some(l) = &packet.login {
            connect_flags |= l.write(buffer);
        }

        buffer[flags_index] = connect_flags;
        Ok(buffer.len() - base)
    }

    pub fn len(packet: &Connect) -> Result<VarInt, Error> {
        let mut len = 6  // protocol name
                    + 1  // protocol version
                    + 1  // connect flags
                    + 2; // keep alive

        len += 2 + packet.client_id.len();

        if let Some(w) = &packet.last_will {
            len += 2 + w.topic.len() + 2 + w.payload.len();
        }

        if let Some(l) = &packet.login {
            len += l.len();
        }

        VarInt::new(len)
    }

    fn read_will(connect_flags: u8, bytes: &mut Bytes) -> Result<Option<Box<LastWill>>, Error> {
        match connect_flags & 0b100 {
            0 if (connect_flags & 0b0011_1000) != 0 => Err(Error::IncorrectPacketFormat),
            0 => Ok(None),
            _ => {
                let topic = read_mqtt_string(bytes)?;
                let payload = read_mqtt_bytes(bytes)?;
                let qos = QoS::try_from((connect_flags & 0b11000) >> 3)?;
                let retain = (connect_flags & 0b0010_0000) != 0;
                Ok(Some(Box::new(LastWill {
                    qos,
                    retain,
                    properties: Properties::new(),
                    topic,
                    payload,
                })))
            }
        }
    }
}

pub(crate) mod v5 {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::{Connect, LastWill, Login};
    use crate::property::PropertyType;
    use crate::{parse::*, Error, FixedHeader, Properties, QoS};

    const ALLOWED_PROPERTIES: &[PropertyType] = &[
        PropertyType::SessionExpiryInterval,
        PropertyType::ReceiveMaximum,
        PropertyType::MaximumPacketSize,
        PropertyType::TopicAliasMaximum,
        PropertyType::RequestResponseInformation,
        PropertyType::RequestProblemInformation,
        PropertyType::UserProperty,
        PropertyType::AuthenticationMethod,
        PropertyType::AuthenticationData,
    ];

    const ALLOWED_WILL_PROPERTIES: &[PropertyType] = &[
        PropertyType::WillDelayInterval,
        PropertyType::PayloadFormatIndicator,
        PropertyType::MessageExpiryInterval,
        PropertyType::ContentType,
        PropertyType::ResponseTopic,
        PropertyType::CorrelationData,
        PropertyType::UserProperty,
    ];

    pub fn read(_fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Connect, Error> {
        let protocol_name = read_mqtt_string(&mut bytes)?;
        if protocol_name != "MQTT" {
            return Err(Error::InvalidProtocol);
        }

        let protocol_level = read_u8(&mut bytes)?;
        if protocol_level != 5 {
            return Err(Error::InvalidProtocolLevel(protocol_level));
        }

        let connect_flags = read_u8(&mut bytes)?;
        let clean_start = (connect_flags & 0b10) != 0;
        let keep_alive = read_u16(&mut bytes)?;
        let properties = Properties::read(&mut bytes, ALLOWED_PROPERTIES)?;

        let client_id = read_mqtt_string(&mut bytes)?;
        let last_will = read_will(connect_flags, &mut bytes)?;
        let login = Login::read(connect_flags, &mut bytes)?;

        Ok(Connect {
            keep_alive,
            clean_start,
            properties,
            client_id,
            last_will,
            login: login.map(Box::new),
        })
    }

    pub fn write(packet: &Connect, buffer: &mut BytesMut) -> Result<usize, Error> {
        let base = buffer.len();
        // packet type and flags
        buffer.put_u8(0x10);
        // remaining length
        let len = len(packet)?;
        len.write(buffer);
        // protocol name
        write_mqtt_string(buffer, "MQTT");
        // protocol version
        buffer.put_u8(0x05);
        // connect flags, patched below once will and login are serialized
        let flags_index = buffer.len();
        let mut connect_flags = if packet.clean_start { 0b10 } else { 0 };
        buffer.put_u8(connect_flags);
        // keep alive time
        buffer.put_u16(packet.keep_alive);
        // properties
        packet.properties.write(buffer)?;

        // client identifier
        write_mqtt_string(buffer, &packet.client_id);

        // last will message
        if let Some(w) = &packet.last_will {
            connect_flags |= w.flags();
            w.properties.write(buffer)?;
            write_mqtt_string(buffer, &w.topic);
            write_mqtt_bytes(buffer, &w.payload);
        }

        // username and password
        if let Some(l) = &packet.login {
            connect_flags |= l.write(buffer);
        }

        buffer[flags_index] = connect_flags;
        Ok(buffer.len() - base)
    }

    pub fn len(packet: &Connect) -> Result<VarInt, Error> {
        let mut len = 6  // protocol name
                    + 1  // protocol version
                    + 1  // connect flags
                    + 2; // keep alive

        let properties_len = packet.properties.len()?;
        len += properties_len.length() + properties_len.value();

        len += 2 + packet.client_id.len();

        if let Some(w) = &packet.last_will {
            let will_properties_len = w.properties.len()?;
            len += will_properties_len.length() + will_properties_len.value();
            len += 2 + w.topic.len() + 2 + w.payload.len();
        }

        if let Some(l) = &packet.login {
            len += l.len();
        }

        VarInt::new(len)
    }

    fn read_will(connect_flags: u8, bytes: &mut Bytes) -> Result<Option<Box<LastWill>>, Error> {
        match connect_flags & 0b100 {
            0 if (connect_flags & 0b0011_1000) != 0 => Err(Error::IncorrectPacketFormat),
            0 => Ok(None),
            _ => {
                // Will properties come before the will topic and payload
                let properties = Properties::read(bytes, ALLOWED_WILL_PROPERTIES)?;
                let topic = read_mqtt_string(bytes)?;
                let payload = read_mqtt_bytes(bytes)?;
                let qos = QoS::try_from((connect_flags & 0b11000) >> 3)?;
                let retain = (connect_flags & 0b0010_0000) != 0;
                Ok(Some(Box::new(LastWill {
                    qos,
                    retain,
                    properties,
                    topic,
                    payload,
                })))
            }
        }
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
    fn length_calculation() {
        let mut dummy_bytes = BytesMut::new();
        let connect_props = properties![Property::UserProperty {
            name: USER_PROP_KEY.into(),
            value: USER_PROP_VAL.into(),
        }];
        let mut connect_pkt = Connect::new(5, true, "client");
        connect_pkt.properties = connect_props;

        let size_from_size = size_from_len(v5::len(&connect_pkt).unwrap());
        let size_from_write = v5::write(&connect_pkt, &mut dummy_bytes).unwrap();
        let size_from_bytes = dummy_bytes.len();

        assert_eq!(size_from_write, size_from_bytes);
        assert_eq!(size_from_size, size_from_bytes);
    }

    #[test]
    fn connect_with_will_and_login_round_trips() {
        let mut connect = Connect::new(30, false, "wren-1");
        connect.last_will = Some(Box::new(LastWill::new(
            "status/wren-1",
            &b"offline"[..],
            QoS::AtLeastOnce,
            true,
        )));
        connect.set_login("user", "pass");

        let mut buf = BytesMut::new();
        v4::write(&connect, &mut buf).unwrap();
        let packet = V4::read(&mut buf, 1024).unwrap();
        assert_eq!(packet, Packet::Connect(connect.clone()));

        let mut buf = BytesMut::new();
        v5::write(&connect, &mut buf).unwrap();
        let packet = V5::read(&mut buf, 1024).unwrap();
        assert_eq!(packet, Packet::Connect(connect));
    }

    #[test]
    fn reserved_will_bits_without_will_flag_are_rejected() {
        let mut buf = BytesMut::new();
        let connect = Connect::new(10, true, "c");
        v4::write(&connect, &mut buf).unwrap();
        // set a will QoS bit without the will flag
        buf[9] |= 0b0000_1000;
        assert!(matches!(
            V4::read(&mut buf, 1024),
            Err(Error::IncorrectPacketFormat)
        ));
    }
}
