use bytes::Bytes;

use crate::{Properties, QoS};

/// Publish message
///
/// Transports an application message in either direction. The dup, QoS and
/// retain flags live in the fixed header; a packet identifier is present
/// only when QoS > 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
    pub pkid: u16,
    pub properties: Properties,
    pub payload: Bytes,
}

impl Publish {
    pub fn new<T: Into<String>, P: Into<Bytes>>(topic: T, qos: QoS, payload: P) -> Self {
        Publish {
            dup: false,
            qos,
            retain: false,
            pkid: 0,
            topic: topic.into(),
            payload: payload.into(),
            properties: Properties::new(),
        }
    }
}

pub(crate) mod v4 {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::Publish;
    use crate::{parse::*, Error, FixedHeader, Properties, QoS};

    pub fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Publish, Error> {
        let dup = (fixed_header.flags() & 0b1000) != 0;
        let qos = QoS::try_from((fixed_header.flags() & 0b0110) >> 1)?;
        let retain = (fixed_header.flags() & 0b0001) != 0;

        let topic = read_mqtt_string(&mut bytes)?;

        // Packet identifier exists where QoS > 0
        let pkid = match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce | QoS::ExactlyOnce => read_u16(&mut bytes)?,
        };

        if qos != QoS::AtMostOnce && pkid == 0 {
            return Err(Error::PacketIdZero);
        }

        Ok(Publish {
            dup,
            qos,
            retain,
            pkid,
            topic,
            properties: Properties::new(),
            payload: bytes,
        })
    }

    pub fn write(packet: &Publish, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        let dup = packet.dup as u8;
        let qos = packet.qos as u8;
        let retain = packet.retain as u8;
        buffer.put_u8(0b0011_0000 | retain | (qos << 1) | (dup << 3));
        // remaining length
        let len = len(packet)?;
        len.write(buffer);
        // topic
        write_mqtt_string(buffer, &packet.topic);

        if packet.qos != QoS::AtMostOnce {
            if packet.pkid == 0 {
                return Err(Error::PacketIdZero);
            }

            buffer.put_u16(packet.pkid);
        }

        buffer.extend_from_slice(&packet.payload);

        Ok(1 + len.length() + len.value())
    }

    pub fn len(packet: &Publish) -> Result<VarInt, Error> {
        let mut len = 2 + packet.topic.len();
        if packet.qos != QoS::AtMostOnce && packet.pkid != 0 {
            // packet identifier is only present for QoS > 0
            len += 2;
        }

        len += packet.payload.len();
        VarInt::new(len)
    }
}

pub(crate) mod v5 {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::Publish;
    use crate::property::PropertyType;
    use crate::{parse::*, Error, FixedHeader, Properties, QoS};

    const ALLOWED_PROPERTIES: &[PropertyType] = &[
        PropertyType::PayloadFormatIndicator,
        PropertyType::MessageExpiryInterval,
        PropertyType::TopicAlias,
        PropertyType::ResponseTopic,
        PropertyType::CorrelationData,
        PropertyType::UserProperty,
        PropertyType::SubscriptionIdentifier,
        PropertyType::ContentType,
    ];

    pub fn read(fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Publish, Error> {
        let dup = (fixed_header.flags() & 0b1000) != 0;
        let qos = QoS::try_from((fixed_header.flags() & 0b0110) >> 1)?;
        let retain = (fixed_header.flags() & 0b0001) != 0;

        let topic = read_mqtt_string(&mut bytes)?;

        // Packet identifier exists where QoS > 0
        let pkid = match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce | QoS::ExactlyOnce => read_u16(&mut bytes)?,
        };

        if qos != QoS::AtMostOnce && pkid == 0 {
            return Err(Error::PacketIdZero);
        }

        let properties = Properties::read(&mut bytes, ALLOWED_PROPERTIES)?;
        Ok(Publish {
            dup,
            qos,
            retain,
            pkid,
            topic,
            properties,
            payload: bytes,
        })
    }

    pub fn write(packet: &Publish, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        let dup = packet.dup as u8;
        let qos = packet.qos as u8;
        let retain = packet.retain as u8;
        buffer.put_u8(0b0011_0000 | retain | (qos << 1) | (dup << 3));
        // remaining length
        let len = len(packet)?;
        len.write(buffer);
        // topic
        write_mqtt_string(buffer, &packet.topic);

        // packet identifier
        if packet.qos != QoS::AtMostOnce {
            if packet.pkid == 0 {
                return Err(Error::PacketIdZero);
            }

            buffer.put_u16(packet.pkid);
        }

        // properties
        packet.properties.write(buffer)?;

        buffer.extend_from_slice(&packet.payload);

        Ok(1 + len.length() + len.value())
    }

    pub fn len(packet: &Publish) -> Result<VarInt, Error> {
        let mut len = 2 + packet.topic.len();
        if packet.qos != QoS::AtMostOnce && packet.pkid != 0 {
            // packet identifier is only present for QoS > 0
            len += 2;
        }

        let properties_len = packet.properties.len()?;
        len += properties_len.length() + properties_len.value();

        len += packet.payload.len();
        VarInt::new(len)
    }
}

#[cfg(test)]
mod test {
    use bytes::{Bytes, BytesMut};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::packet::{
        size_from_len,
        tests::{USER_PROP_KEY, USER_PROP_VAL},
    };
    use crate::{properties, Packet, Property, Protocol, V4};

    #[test]
    fn qos1_publish_parsing_works() {
        let stream = &[
            0b0011_0010,
            11, // packet type, flags and remaining len
            0x00,
            0x03,
            b'a',
            b'/',
            b'b', // variable header. topic name = 'a/b'
            0x00,
            0x0a, // variable header. pkid = 10
            0xF1,
            0xF2,
            0xF3,
            0xF4, // publish payload
            0xDE,
            0xAD,
            0xBE,
            0xEF, // extra packets in the stream
        ];

        let mut stream = BytesMut::from(&stream[..]);
        let packet = V4::read(&mut stream, 128).unwrap();

        let payload = &[0xF1, 0xF2, 0xF3, 0xF4];
        assert_eq!(
            packet,
            Packet::Publish(Publish {
                dup: false,
                qos: QoS::AtLeastOnce,
                retain: false,
                topic: "a/b".to_owned(),
                pkid: 10,
                payload: Bytes::from(&payload[..]),
                properties: Properties::new(),
            })
        );
    }

    #[test]
    fn qos0_publish_encoding_works() {
        let publish = Publish::new("a/b", QoS::AtMostOnce, vec![0xE1, 0xE2, 0xE3, 0xE4]);

        let mut buf = BytesMut::new();
        v4::write(&publish, &mut buf).unwrap();

        assert_eq!(
            buf,
            vec![
                0b0011_0000,
                9,
                0x00,
                0x03,
                b'a',
                b'/',
                b'b',
                0xE1,
                0xE2,
                0xE3,
                0xE4
            ]
        );
    }

    #[test]
    fn qos1_publish_without_pkid_is_rejected() {
        let publish = Publish::new("a/b", QoS::AtLeastOnce, vec![0x01]);
        let mut buf = BytesMut::new();
        assert!(matches!(
            v4::write(&publish, &mut buf),
            Err(crate::Error::PacketIdZero)
        ));
    }

    #[test]
    fn length_calculation() {
        let mut dummy_bytes = BytesMut::new();
        let publish_props = properties![Property::UserProperty {
            name: USER_PROP_KEY.into(),
            value: USER_PROP_VAL.into(),
        }];

        let mut publish_pkt = Publish::new("hello/world", QoS::AtMostOnce, vec![1; 10]);
        publish_pkt.properties = publish_props;

        let size_from_size = size_from_len(v5::len(&publish_pkt).unwrap());
        let size_from_write = v5::write(&publish_pkt, &mut dummy_bytes).unwrap();
        let size_from_bytes = dummy_bytes.len();

        assert_eq!(size_from_write, size_from_bytes);
        assert_eq!(size_from_size, size_from_bytes);
    }
}
