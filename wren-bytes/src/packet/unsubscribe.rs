use crate::Properties;

/// Unsubscribe request
///
/// Sent by the client to the server to unsubscribe from topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    pub pkid: u16,
    pub properties: Properties,
    pub filters: Vec<String>,
}

impl Unsubscribe {
    pub fn new<S: Into<String>>(topic: S) -> Unsubscribe {
        Unsubscribe {
            pkid: 0,
            filters: vec![topic.into()],
            properties: Properties::new(),
        }
    }

    pub fn new_many<F: IntoIterator<Item = String>>(filters: F) -> Self {
        Self {
            pkid: 0,
            filters: filters.into_iter().collect(),
            properties: Properties::new(),
        }
    }
}

pub(crate) mod v4 {
    use bytes::{Buf, BufMut, Bytes, BytesMut};

    use super::Unsubscribe;
    use crate::{parse::*, Error, FixedHeader, Properties};

    pub fn read(_fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Unsubscribe, Error> {
        let pkid = read_u16(&mut bytes)?;

        if !bytes.has_remaining() {
            return Err(Error::MalformedPacket);
        }

        let mut filters = Vec::new();
        while bytes.has_remaining() {
            let topic_filter = read_mqtt_string(&mut bytes)?;
            filters.push(topic_filter);
        }

        Ok(Unsubscribe {
            pkid,
            filters,
            properties: Properties::new(),
        })
    }

    pub fn write(packet: &Unsubscribe, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        buffer.put_u8(0xA2);
        // remaining length
        let len = len(packet)?;
        len.write(buffer);
        // packet identifier
        buffer.put_u16(packet.pkid);

        // topic filters
        for topic in packet.filters.iter() {
            write_mqtt_string(buffer, topic.as_str());
        }

        Ok(1 + len.length() + len.value())
    }

    pub fn len(packet: &Unsubscribe) -> Result<VarInt, Error> {
        // pkid + length-prefixed filters
        let len = 2 + packet.filters.iter().fold(0, |s, t| s + 2 + t.len());
        VarInt::new(len)
    }
}

pub(crate) mod v5 {
    use bytes::{Buf, BufMut, Bytes, BytesMut};

    use super::Unsubscribe;
    use crate::property::PropertyType;
    use crate::{parse::*, Error, FixedHeader, Properties};

    const ALLOWED_PROPERTIES: &[PropertyType] = &[PropertyType::UserProperty];

    pub fn read(_fixed_header: FixedHeader, mut bytes: Bytes) -> Result<Unsubscribe, Error> {
        let pkid = read_u16(&mut bytes)?;
        let properties = Properties::read(&mut bytes, ALLOWED_PROPERTIES)?;

        if !bytes.has_remaining() {
            return Err(Error::MalformedPacket);
        }

        let mut filters = Vec::new();
        while bytes.has_remaining() {
            let filter = read_mqtt_string(&mut bytes)?;
            filters.push(filter);
        }

        Ok(Unsubscribe {
            pkid,
            filters,
            properties,
        })
    }

    pub fn write(packet: &Unsubscribe, buffer: &mut BytesMut) -> Result<usize, Error> {
        // packet type and flags
        buffer.put_u8(0xA2);
        // remaining length
        let len = len(packet)?;
        len.write(buffer);
        // packet identifier
        buffer.put_u16(packet.pkid);
        // properties
        packet.properties.write(buffer)?;

        // topic filters
        for filter in packet.filters.iter() {
            write_mqtt_string(buffer, filter);
        }

        Ok(1 + len.length() + len.value())
    }

    pub fn len(packet: &Unsubscribe) -> Result<VarInt, Error> {
        let mut len = 2 + packet.filters.iter().fold(0, |s, t| s + 2 + t.len());

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
    use crate::{properties, Property};

    #[test]
    fn length_calculation() {
        let mut dummy_bytes = BytesMut::new();
        let properties = properties![Property::UserProperty {
            name: USER_PROP_KEY.into(),
            value: USER_PROP_VAL.into(),
        }];

        let mut unsubscribe_pkt = Unsubscribe::new("hello/world");
        unsubscribe_pkt.pkid = 1;
        unsubscribe_pkt.properties = properties;

        let size_from_size = size_from_len(v5::len(&unsubscribe_pkt).unwrap());
        let size_from_write = v5::write(&unsubscribe_pkt, &mut dummy_bytes).unwrap();
        let size_from_bytes = dummy_bytes.len();

        assert_eq!(size_from_write, size_from_bytes);
        assert_eq!(size_from_size, size_from_bytes);
    }
}
