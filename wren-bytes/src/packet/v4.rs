use bytes::BytesMut;

use super::size_from_len;
use crate::packet::{
    connack, connect, disconnect, ping, puback, pubcomp, publish, pubrec, pubrel, suback,
    subscribe, unsuback, unsubscribe,
};
use crate::{Error, FixedHeader, Packet, PacketType, Protocol};

/// Marker type for the MQTT 3.1.1 wire format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct V4;

impl Protocol for V4 {
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
            PacketType::Connect => Packet::Connect(connect::v4::read(fixed_header, packet)?),
            PacketType::ConnAck => Packet::ConnAck(connack::v4::read(fixed_header, packet)?),
            PacketType::Publish => Packet::Publish(publish::v4::read(fixed_header, packet)?),
            PacketType::PubAck => Packet::PubAck(puback::v4::read(fixed_header, packet)?),
            PacketType::PubRec => Packet::PubRec(pubrec::v4::read(fixed_header, packet)?),
            PacketType::PubRel => Packet::PubRel(pubrel::v4::read(fixed_header, packet)?),
            PacketType::PubComp => Packet::PubComp(pubcomp::v4::read(fixed_header, packet)?),
            PacketType::Subscribe => Packet::Subscribe(subscribe::v4::read(fixed_header, packet)?),
            PacketType::SubAck => Packet::SubAck(suback::v4::read(fixed_header, packet)?),
            PacketType::Unsubscribe => {
                Packet::Unsubscribe(unsubscribe::v4::read(fixed_header, packet)?)
            }
            PacketType::UnsubAck => Packet::UnsubAck(unsuback::v4::read(fixed_header, packet)?),
            PacketType::PingReq => Packet::PingReq(ping::req::read(fixed_header, packet)?),
            PacketType::PingResp => Packet::PingResp(ping::resp::read(fixed_header, packet)?),
            PacketType::Disconnect => {
                Packet::Disconnect(disconnect::v4::read(fixed_header, packet)?)
            }
            // AUTH is an MQTT 5 packet
            PacketType::Auth => return Err(Error::InvalidPacketType(15)),
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
            Packet::Connect(p) => connect::v4::write(&p, stream),
            Packet::ConnAck(p) => connack::v4::write(&p, stream),
            Packet::Publish(p) => publish::v4::write(&p, stream),
            Packet::PubAck(p) => puback::v4::write(&p, stream),
            Packet::PubRec(p) => pubrec::v4::write(&p, stream),
            Packet::PubRel(p) => pubrel::v4::write(&p, stream),
            Packet::PubComp(p) => pubcomp::v4::write(&p, stream),
            Packet::Subscribe(p) => subscribe::v4::write(&p, stream),
            Packet::SubAck(p) => suback::v4::write(&p, stream),
            Packet::Unsubscribe(p) => unsubscribe::v4::write(&p, stream),
            Packet::UnsubAck(p) => unsuback::v4::write(&p, stream),
            Packet::PingReq(p) => ping::req::write(&p, stream),
            Packet::PingResp(p) => ping::resp::write(&p, stream),
            Packet::Disconnect(p) => disconnect::v4::write(&p, stream),
            Packet::Auth(_) => Err(Error::InvalidPacketType(15)),
        }
    }
}

/// The full on-wire size of the packet
fn size(packet: &Packet) -> Result<usize, Error> {
    let len = match packet {
        Packet::Connect(p) => connect::v4::len(p)?,
        Packet::ConnAck(p) => connack::v4::len(p)?,
        Packet::Publish(p) => publish::v4::len(p)?,
        Packet::PubAck(p) => puback::v4::len(p)?,
        Packet::PubRec(p) => pubrec::v4::len(p)?,
        Packet::PubRel(p) => pubrel::v4::len(p)?,
        Packet::PubComp(p) => pubcomp::v4::len(p)?,
        Packet::Subscribe(p) => subscribe::v4::len(p)?,
        Packet::SubAck(p) => suback::v4::len(p)?,
        Packet::Unsubscribe(p) => unsubscribe::v4::len(p)?,
        Packet::UnsubAck(p) => unsuback::v4::len(p)?,
        Packet::PingReq(p) => ping::req::len(p)?,
        Packet::PingResp(p) => ping::resp::len(p)?,
        Packet::Disconnect(p) => disconnect::v4::len(p)?,
        Packet::Auth(_) => return Err(Error::InvalidPacketType(15)),
    };

    Ok(size_from_len(len))
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::packet::Auth;
    use crate::packet::AuthReasonCode;

    #[test]
    fn auth_packet_is_rejected() {
        let mut buffer = BytesMut::new();
        let auth = Packet::Auth(Auth::new(AuthReasonCode::Success));
        let error = V4::write(auth, &mut buffer, 1024).unwrap_err();
        assert!(matches!(error, Error::InvalidPacketType(15)));

        buffer.extend_from_slice(&[0xF0, 0x01, 0x00]);
        let error = V4::read(&mut buffer, 1024).unwrap_err();
        assert!(matches!(error, Error::InvalidPacketType(15)));
    }

    #[test]
    fn zero_length_body_requires_payload() {
        // SUBACK with remaining length zero
        let mut buffer = BytesMut::from(&[0x90, 0x00][..]);
        let error = V4::read(&mut buffer, 1024).unwrap_err();
        assert!(matches!(error, Error::PayloadRequired));
    }

    #[test]
    fn pingreq_round_trips() {
        let mut buffer = BytesMut::new();
        let written = V4::write(Packet::PingReq(crate::PingReq), &mut buffer, 1024).unwrap();
        assert_eq!(written, 2);
        assert_eq!(&buffer[..], &[0xC0, 0x00]);

        let packet = V4::read(&mut buffer, 1024).unwrap();
        assert_eq!(packet, Packet::PingReq(crate::PingReq));
        assert!(buffer.is_empty());
    }
}
