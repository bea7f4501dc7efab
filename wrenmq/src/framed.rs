use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use wren_bytes::{Codec, Error, Packet, Protocol};

use crate::state::{SessionState, StateError};

pub trait AsyncReadWrite: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T> AsyncReadWrite for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Network transforms packets <-> frames efficiently.
///
/// It takes advantage of pre-allocation and buffering when appropriate
/// to achieve performance.
pub struct Network<P: Protocol<Item = Packet>> {
    /// Frame MQTT packets from network connection
    framed: Framed<Box<dyn AsyncReadWrite>, Codec<P>>,
    /// Maximum number of packets drained per bulk read
    max_bulk_read: usize,
}

impl<P: Protocol<Item = Packet>> Network<P> {
    pub fn new(
        socket: impl AsyncReadWrite + 'static,
        max_incoming_size: u32,
        max_outgoing_size: u32,
    ) -> Self {
        let socket = Box::new(socket) as Box<dyn AsyncReadWrite>;
        let codec = Codec::new(max_incoming_size, max_outgoing_size);
        let framed = Framed::new(socket, codec);

        Self {
            framed,
            max_bulk_read: 10,
        }
    }

    /// Set the maximum size of outgoing packets.
    ///
    /// This information can be present in Connect/ConnAck packets.
    pub fn set_max_outgoing_size(&mut self, max_outgoing_size: u32) {
        self.framed.codec_mut().max_outgoing_size = max_outgoing_size;
    }

    /// Reads and returns a single packet from the network
    pub async fn read(&mut self) -> Result<P::Item, StateError> {
        match self.framed.next().await {
            Some(Ok(packet)) => Ok(packet),
            // the codec absorbs partial packets into Ok(None)
            Some(Err(Error::InsufficientBytes(_))) => unreachable!(),
            Some(Err(e)) => Err(StateError::Deserialization(e)),
            None => Err(StateError::ConnectionAborted),
        }
    }

    /// Read packets in bulk, feeding each through the session state.
    ///
    /// This allows replies to be written in bulk as well. Used after the
    /// connection is established to drain a burst of incoming packets.
    pub async fn readb(&mut self, state: &mut SessionState) -> Result<(), StateError> {
        // wait for the first read
        let mut res = self.framed.next().await;
        let mut count = 1;
        loop {
            match res {
                Some(Ok(packet)) => {
                    if let Some(outgoing) = state.handle_incoming_packet(packet)? {
                        self.write(outgoing).await?;
                    }

                    count += 1;
                    if count >= self.max_bulk_read {
                        break;
                    }
                }
                Some(Err(Error::InsufficientBytes(_))) => unreachable!(),
                Some(Err(e)) => return Err(StateError::Deserialization(e)),
                None => return Err(StateError::ConnectionAborted),
            }
            // do not wait for subsequent reads
            match self.framed.next().now_or_never() {
                Some(r) => res = r,
                _ => break,
            };
        }

        Ok(())
    }

    /// Serializes packet into write buffer
    pub async fn write(&mut self, packet: P::Item) -> Result<(), StateError> {
        self.framed
            .feed(packet)
            .await
            .map_err(StateError::Deserialization)
    }

    pub async fn flush(&mut self) -> Result<(), StateError> {
        self.framed
            .flush()
            .await
            .map_err(StateError::Deserialization)
    }
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;
    use tokio::io::AsyncWriteExt;
    use wren_bytes::{Publish, QoS, V4};

    use super::*;

    #[tokio::test]
    async fn read_resumes_after_a_partial_frame() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut network: Network<V4> = Network::new(client, 1024, 1024);

        let mut publish = Publish::new("hello/world", QoS::AtLeastOnce, &b"payload"[..]);
        publish.pkid = 9;
        let mut buffer = BytesMut::new();
        V4::write(Packet::Publish(publish.clone()), &mut buffer, 1024).unwrap();

        let (head, tail) = buffer.split_at(5);
        server.write_all(head).await.unwrap();
        // only a prefix arrived, the read must stay pending
        assert!(network.read().now_or_never().is_none());

        server.write_all(tail).await.unwrap();
        let packet = network.read().await.unwrap();
        assert_eq!(packet, Packet::Publish(publish));
    }

    #[tokio::test]
    async fn closed_socket_reports_an_aborted_connection() {
        let (client, server) = tokio::io::duplex(1024);
        let mut network: Network<V4> = Network::new(client, 1024, 1024);

        drop(server);
        match network.read().await {
            Err(StateError::ConnectionAborted) => (),
            other => panic!("Expected aborted connection, got {:?}", other),
        }
    }
}
