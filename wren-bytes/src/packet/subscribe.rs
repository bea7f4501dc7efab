use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{parse::*, Error, Properties, QoS};

/// Subscribe request
///
/// Sent from the client to the server to create one or more subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub pkid: u16,
    pub properties: Properties,
    pub filters: Vec<Filter>,
}

impl Subscribe {
    pub fn new(filter: Filter) -> Self {
        Self {
            pkid: 0,
            filters: vec![filter],
            properties: Properties::new(),
        }
    }

    pub fn from_string<S: Into<String>>(path: S, qos: QoS) -> Subscribe {
        Subscribe::new(Filter::new(path.into(), qos))
    }

    pub fn new_many<F>(filters: F) -> Self
    where
        F: IntoIterator<Item = Filter>,
    {
        Self {
            pkid: 0,
            filters: filters.into_iter().collect(),
            properties: Properties::new(),
        }
    }
}

/// Subscription filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub path: String,
    pub qos: QoS,
    pub nolocal: bool,
    pub preserve_retain: bool,
    pub retain_forward_rule: RetainForwardRule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetainForwardRule {
    OnEverySubscribe,
    OnNewSubscribe,
    Never,
}

impl Filter {
    pub fn new(path: String, qos: QoS) -> Self {
        Self {
            path,
            qos,
            nolocal: false,
            preserve_retain: false,
            retain_forward_rule: RetainForwardRule::OnEverySubscribe,
        }
    }

    fn read(bytes: &mut Bytes) -> Result<Vec<Filter>, Error> {
        let mut filters = Vec::new();

        while bytes.has_remaining() {
            let path = read_mqtt_string(bytes)?;
            let options = read_u8(bytes)?;
            let requested_qos = options & 0b0000_0011;

            let nolocal = (options & 0b0000_0100) != 0;
            let preserve_retain = (options & 0b0000_1000) != 0;

            let retain_forward_rule = match (options >> 4) & 0b0000_0011 {
                0 => RetainForwardRule::OnEverySubscribe,
                1 => RetainForwardRule::OnNewSubscribe,
                2 => RetainForwardRule::Never,
                r => return Err(Error::InvalidRetainForwardRule(r)),
            };

            filters.push(Filter {
                path,
                qos: requested_qos.try_into()?,
                nolocal,
                preserve_retain,
                retain_forward_rule,
            });
        }

        Ok(filters)
    }

    fn write(&self, buffer: &mut BytesMut) {
        let mut options = self.qos as u8;

        if self.nolocal {
            options |= 0b0000_0100;
        }

        if self.preserve_retain {
            options |= 0b0000_1000;
        }

        options |= match self.retain_forward_rule {
            RetainForwardRule::OnEverySubscribe => 0b0000_0000,
            RetainForwardRule::OnNewSubscribe => 0b0001_0000,
            RetainForwardRule::Never => 0b0010_0000,
        };

        write_mqtt_string(buffer, self.path.as_str());
        buffer.put_u8(options);
    }

    fn len(&self) -> usize {
        // filter len + filter + options
        2 + self.path.len() + 1
    }
}

pub(crate) mod v4 {
    use bytes::{Buf, BufMut, Bytes, BytesMut};

    use super::{Filter, Subscribe};
    use crate::{parse::*, Error, FixedHeader, Properties};

    pub fn read(_fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Subscribe, Error> {
        let pkid = read_u16(&mut bytes)?;

        let mut filters = Vec::new();
        while bytes.has_remaining() {
            let path = read_mqtt_string(&mut bytes)?;
            let options = read_u8(&mut bytes)?;
            let requested_qos = options & 0b0000_0011;

            filters.push(Filter::new(path, requested_qos.try_into()?));
        }

        match filters.len() {
            0 => Err(Error::EmptySubscription),
            _ => Ok(Subscribe {
                pkid,
                filters,
                properties: Properties::new(),
            }),
        }
    }

    pub fn write(packet: &Subscribe, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        buffer.put_u8(0x82);
        // remaining length
        let len = len(packet)?;
        len.write(buffer);
        // packet identifier
        buffer.put_u16(packet.pkid);

        // topic filters
        for f in packet.filters.iter() {
            f.write(buffer);
        }

        Ok(1 + len.length() + len.value())
    }

    pub fn len(packet: &Subscribe) -> Result<VarInt, Error> {
        // pkid + filters
        let len = 2 + packet.filters.iter().fold(0, |s, t| s + t.len());
        VarInt::new(len)
    }
}

pub(crate) mod v5 {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::{Filter, Subscribe};
    use crate::property::PropertyType;
    use crate::{parse::*, Error, FixedHeader, Properties};

    const ALLOWED_PROPERTIES: &[PropertyType] = &[
        PropertyType::SubscriptionIdentifier,
        PropertyType::UserProperty,
    ];

    pub fn read(_fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Subscribe, Error> {
        let pkid = read_u16(&mut bytes)?;
        let properties = Properties::read(&mut bytes, ALLOWED_PROPERTIES)?;

        let filters = Filter::read(&mut bytes)?;

        match filters.len() {
            0 => Err(Error::EmptySubscription),
            _ => Ok(Subscribe {
                pkid,
                filters,
                properties,
            }),
        }
    }

    pub fn write(packet: &Subscribe, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        buffer.put_u8(0x82);
        // remaining length
        let len = len(packet)?;
        len.write(buffer);
        // packet identifier
        buffer.put_u16(packet.pkid);
        // properties
        packet.properties.write(buffer)?;

        // topic filters
        for f in packet.filters.iter() {
            f.write(buffer);
        }

        Ok(1 + len.length() + len.value())
    }

    pub fn len(packet: &Subscribe) -> Result<VarInt, Error> {
        let mut len = 2 + packet.filters.iter().fold(0, |s, t| s + t.len());

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
    use crate::{Packet, Protocol, V4, V5};

    #[test]
    fn subscribe_parsing_works() {
        let stream = &[
            0b1000_0010,
            20, // packet type, flags and remaining len
            0x01,
            0x04, // variable header. pkid = 260
            0x00,
            0x03,
            b'a',
            b'/',
            b'+', // payload. topic filter = 'a/+'
            0x00, // payload. qos = 0
            0x00,
            0x01,
            b'#', // payload. topic filter = '#'
            0x01, // payload. qos = 1
            0x00,
            0x05,
            b'a',
            b'/',
            b'b',
            b'/',
            b'c', // payload. topic filter = 'a/b/c'
            0x02, // payload. qos = 2
            0xDE,
            0xAD,
            0xBE,
            0xEF, // extra packets in the stream
        ];
        let mut stream = BytesMut::from(&stream[..]);
        let packet = V4::read(&mut stream, 128).unwrap();

        assert_eq!(
            packet,
            Packet::Subscribe(Subscribe {
                pkid: 260,
                filters: vec![
                    Filter::new("a/+".to_owned(), QoS::AtMostOnce),
                    Filter::new("#".to_owned(), QoS::AtLeastOnce),
                    Filter::new("a/b/c".to_owned(), QoS::ExactlyOnce)
                ],
                properties: Properties::new(),
            })
        );
    }

    #[test]
    fn subscription_options_round_trip() {
        let mut filter = Filter::new("a/b".to_owned(), QoS::AtLeastOnce);
        filter.nolocal = true;
        filter.preserve_retain = true;
        filter.retain_forward_rule = RetainForwardRule::Never;

        let mut subscribe = Subscribe::new(filter);
        subscribe.pkid = 9;

        let mut buf = BytesMut::new();
        v5::write(&subscribe, &mut buf).unwrap();
        let packet = V5::read(&mut buf, 128).unwrap();
        assert_eq!(packet, Packet::Subscribe(subscribe));
    }

    #[test]
    fn empty_subscription_is_rejected() {
        let stream = &[
            0b1000_0010,
            2, // packet type, flags and remaining len
            0x00,
            0x01, // pkid = 1, no filters
        ];
        let mut stream = BytesMut::from(&stream[..]);
        assert!(matches!(
            V4::read(&mut stream, 128),
            Err(Error::EmptySubscription)
        ));
    }
}
