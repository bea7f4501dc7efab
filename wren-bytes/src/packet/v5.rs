use bytes::BytesMut;

use super::size_from_len;
use crate::packet::{
    auth, connack, connect, disconnect, ping, puback, pubcomp, publish, pubrec, pubrel, suback,
    subscribe, unsuback, unsubscribe,
};
use crate::{Error, FixedHeader, Packet, PacketType, Protocol};

/// Marker type for the MQTT 5.0 wire format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct V5;

impl Protocol for V5 {
    type Item = Packet;

    fn read(stream: &mut BytesMut, max_size: u32) -> Result<Packet, Error> {
        let fixed_header = FixedHeader::check(stream.iter(), max_size)?;
        let packet_type = fixed_header.packet_type()?;

        // Split off the packet and skip past the fixed header.
        let mut packet = stream.split_to(fixed_header.packet_size());
        let _ = packet.split_to(fixed_header.size());

        if fixed_header.remaining_len == 0 {
            // Only the packets without a variable header may be this short
            return match packet_type {
                PacketType::PingReq => Ok(Packet::PingReq(super::PingReq)),
                PacketType::PingResp => Ok(Packet::PingResp(super::PingResp)),
                PacketType::Disconnect => Ok(Packet::Disconnect(super::Disconnect::new())),
                _ => Err(Error::PayloadRequired),
            };
        }

        let packet = packet.freeze();
        let packet = match packet_type {
            PacketType::Connect => Packet::Connect(connect::v5::read(fixed_header, packet)?),
            PacketType::ConnAck => Packet::ConnAck(connack::v5::read(fixed_header, packet)?),
            PacketType::Publish => Packet::Publish(publish::v5::read(fixed_header, packet)?),
            PacketType::PubAck => Packet::PubAck(puback::v5::read(fixed_header, packet)?),
            PacketType::PubRec => Packet::PubRec(pubrec::v5::read(fixed_header, packet)?),
            PacketType::PubRel => Packet::PubRel(pubrel::v5::read(fixed_header, packet)?),
            PacketType::PubComp => Packet::PubComp(pubcomp::v5::read(fixed_header, packet)?),
            PacketType::Subscribe => Packet::Subscribe(subscribe::v5::read(fixed_header, packet)?),
            PacketType::SubAck => Packet::SubAck(suback::v5::read(fixed_header, packet)?),
            PacketType::Unsubscribe => {
                Packet::Unsubscribe(unsubscribe::v5::read(fixed_header, packet)?)
            }
            PacketType::UnsubAck => Packet::UnsubAck(unsuback::v5::read(fixed_header, packet)?),
            PacketType::PingReq => Packet::PingReq(ping::req::read(fixed_header, packet)?),
            PacketType::PingResp => Packet::PingResp(ping::resp::read(fixed_header, packet)?),
            PacketType::Disconnect => {
                Packet::Disconnect(disconnect::v5::read(fixed_header, packet)?)
            }
            PacketType::Auth => Packet::Auth(auth::v5::read(fixed_header, packet)?),
        };

        Ok(packet)
    }

    fn write(packet: Packet, stream: &mut BytesMut, max_size: u32) -> Result<usize, Error> {
        let size = size(&packet)?;
        if size > max_size as usize {
            return Err(Error::OutgoingPacketTooLarge {
                pkt_size: size as u32,
                max: max_size,
            });
        }

        match packet {
            Packet::Connect(p) => connect::v5::write(&p, stream),
            Packet::ConnAck(p) => connack::v5::write(&p, stream),
            Packet::Publish(p) => publish::v5::write(&p, stream),
            Packet::PubAck(p) => puback::v5::write(&p, stream),
            Packet::PubRec(p) => pubrec::v5::write(&p, stream),
            Packet::PubRel(p) => pubrel::v5::write(&p, stream),
            Packet::PubComp(p) => pubcomp::v5::write(&p, stream),
            Packet::Subscribe(p) => subscribe::v5::write(&p, stream),
            Packet::SubAck(p) => suback::v5::write(&p, stream),
            Packet::Unsubscribe(p) => unsubscribe::v5::write(&p, stream),
            Packet::UnsubAck(p) => unsuback::v5::write(&p, stream),
            Packet::PingReq(p) => ping::req::write(&p, stream),
            Packet::PingResp(p) => ping::resp::write(&p, stream),
            Packet::Disconnect(p) => disconnect::v5::write(&p, stream),
            Packet::Auth(p) => auth::v5::write(&p, stream),
        }
    }
}

/// The full on-wire size of the packet
fn size(packet: &Packet) -> Result<usize, Error> {
    let len = match packet {
        Packet::Connect(p) => connect::v5::len(p)?,
        Packet::ConnAck(p) => connack::v5::len(p)?,
        Packet::Publish(p) => publish::v5::len(p)?,
        Packet::PubAck(p) => puback::v5::len(p)?,
        Packet::PubRec(p) => pubrec::v5::len(p)?,
        Packet::PubRel(p) => pubrel::v5::len(p)?,
        Packet::PubComp(p) => pubcomp::v5::len(p)?,
        Packet::Subscribe(p) => subscribe::v5::len(p)?,
        Packet::SubAck(p) => suback::v5::len(p)?,
        Packet::Unsubscribe(p) => unsubscribe::v5::len(p)?,
        Packet::UnsubAck(p) => unsuback::v5::len(p)?,
        Packet::PingReq(p) => ping::req::len(p)?,
        Packet::PingResp(p) => ping::resp::len(p)?,
        Packet::Disconnect(p) => disconnect::v5::len(p)?,
        Packet::Auth(p) => auth::v5::len(p)?,
    };

    Ok(size_from_len(len))
}

#[cfg(test)]
mod test {
    use bytes::{Bytes, BytesMut};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{Publish, QoS};

    #[test]
    fn partial_packet_leaves_stream_untouched() {
        let mut publish = Publish::new("hello/world", QoS::AtLeastOnce, Bytes::from("payload"));
        publish.pkid = 7;

        let mut buffer = BytesMut::new();
        V5::write(Packet::Publish(publish), &mut buffer, 1024).unwrap();

        let mut partial = BytesMut::from(&buffer[..buffer.len() - 1]);
        let snapshot = partial.clone();
        let error = V5::read(&mut partial, 1024).unwrap_err();
        assert!(matches!(error, Error::InsufficientBytes(1)));
        assert_eq!(partial, snapshot);
    }

    #[test]
    fn incoming_size_limit_is_enforced() {
        let publish = Publish::new("hello/world", QoS::AtMostOnce, Bytes::from(vec![0u8; 256]));

        let mut buffer = BytesMut::new();
        V5::write(Packet::Publish(publish), &mut buffer, 1024).unwrap();

        let error = V5::read(&mut buffer, 64).unwrap_err();
        assert!(matches!(
            error,
            Error::PayloadSizeLimitExceeded { max: 64, .. }
        ));
    }
}
