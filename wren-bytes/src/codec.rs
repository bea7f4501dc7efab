use std::marker::PhantomData;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::{Error, Protocol};

/// Frames MQTT packets on a byte stream, generic over the protocol version.
///
/// Decoding a partial packet yields `Ok(None)` and reserves capacity for the
/// missing bytes, leaving the buffered prefix untouched.
#[derive(Debug, Clone)]
pub struct Codec<P: Protocol> {
    /// Maximum packet size this side accepts
    pub max_incoming_size: u32,
    /// Maximum packet size the peer accepts
    pub max_outgoing_size: u32,
    protocol: PhantomData<P>,
}

impl<P: Protocol> Codec<P> {
    /// Creates a new codec with the given size limits
    pub fn new(max_incoming_size: u32, max_outgoing_size: u32) -> Self {
        Self {
            max_incoming_size,
            max_outgoing_size,
            protocol: PhantomData,
        }
    }
}

impl<P: Protocol> Decoder for Codec<P> {
    type Item = P::Item;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match P::read(src, self.max_incoming_size) {
            Ok(packet) => Ok(Some(packet)),
            Err(Error::InsufficientBytes(b)) => {
                // Not a full packet yet, wait for more bytes
                src.reserve(b);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl<P: Protocol<Item = Pkt>, Pkt> Encoder<Pkt> for Codec<P> {
    type Error = Error;

    fn encode(&mut self, item: Pkt, dst: &mut BytesMut) -> Result<(), Self::Error> {
        P::write(item, dst, self.max_outgoing_size)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use tokio_util::codec::{Decoder, Encoder};

    use super::Codec;
    use crate::{Error, Packet, Publish, QoS, V4, V5};

    #[test]
    fn outgoing_max_packet_size_check() {
        let mut buf = BytesMut::new();
        let mut codec = Codec::<V5>::new(100, 200);

        let mut small_publish = Publish::new("hello/world", QoS::AtLeastOnce, vec![1; 100]);
        small_publish.pkid = 1;
        codec
            .encode(Packet::Publish(small_publish), &mut buf)
            .unwrap();

        let large_publish = Publish::new("hello/world", QoS::AtLeastOnce, vec![1; 265]);
        match codec.encode(Packet::Publish(large_publish), &mut buf) {
            Err(Error::OutgoingPacketTooLarge {
                pkt_size: 282,
                max: 200,
            }) => {}
            _ => unreachable!(),
        }
    }

    #[test]
    fn decode_resumes_after_partial_input() {
        let mut encoder = Codec::<V4>::new(1024, 1024);
        let mut encoded = BytesMut::new();
        let mut publish = Publish::new("a/b", QoS::AtLeastOnce, vec![0xAB; 32]);
        publish.pkid = 7;
        encoder
            .encode(Packet::Publish(publish.clone()), &mut encoded)
            .unwrap();

        // Feed the packet one byte at a time. Every prefix must decode to
        // None without consuming input, the final byte completes the packet.
        let mut decoder = Codec::<V4>::new(1024, 1024);
        let mut buf = BytesMut::new();
        let total = encoded.len();
        for (i, byte) in encoded.iter().enumerate() {
            buf.extend_from_slice(&[*byte]);
            let decoded = decoder.decode(&mut buf).unwrap();
            if i + 1 < total {
                assert!(decoded.is_none());
                assert_eq!(buf.len(), i + 1);
            } else {
                assert_eq!(decoded, Some(Packet::Publish(publish.clone())));
                assert!(buf.is_empty());
            }
        }
    }

    #[test]
    fn decode_consumes_exactly_one_packet() {
        let mut codec = Codec::<V4>::new(1024, 1024);
        let mut buf = BytesMut::new();

        let first = Publish::new("x", QoS::AtMostOnce, vec![1, 2, 3]);
        let second = Publish::new("y", QoS::AtMostOnce, vec![4, 5, 6]);
        codec
            .encode(Packet::Publish(first.clone()), &mut buf)
            .unwrap();
        codec
            .encode(Packet::Publish(second.clone()), &mut buf)
            .unwrap();

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Packet::Publish(first))
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Packet::Publish(second))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }
}
