//! An asynchronous MQTT client engine for protocol versions 3.1.1 and 5.0.
//!
//! The engine is split into a cloneable request handle ([`AsyncClient`] or the
//! blocking [`Client`]) and an [`EventLoop`] that owns the session state and
//! the network connection. The event loop must be polled continuously; every
//! call to [`EventLoop::poll`] advances the connection and yields one
//! [`Event`].
//!
//! ```no_run
//! use wrenmq::{AsyncClient, OptionBuilder, QoS};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let options = OptionBuilder::new_tcp("localhost", 1883)
//!         .client_id("wrenmq-demo")
//!         .finalize();
//!
//!     let (client, mut eventloop) = AsyncClient::new(options, 10);
//!     client.subscribe("hello/world", QoS::AtLeastOnce).await.unwrap();
//!
//!     loop {
//!         let event = eventloop.poll().await;
//!         println!("{event:?}");
//!     }
//! }
//! ```

use wren_bytes::Publish;

mod bridge;
mod client;
mod eventloop;
mod framed;
mod options;
mod reconnect;
mod state;

pub use client::{
    AsyncClient, Client, ClientError, Connection, Iter, RecvError, RecvTimeoutError, TryRecvError,
};
pub use eventloop::{
    ConnectionError, ConnectionStatus, DisconnectReason, EventLoop, StatusUpdate,
};
pub use options::{MqttOptions, NetworkOptions, OptionBuilder};
pub use reconnect::ReconnectOptions;
pub use state::{SessionState, StateError, Subscription};

pub use wren_bytes::{
    Filter, LastWill, Login, Packet, Properties, Property, Publish as PublishPacket, QoS,
    RetainForwardRule, V4, V5,
};
// Both names are in common use.
pub use wren_bytes as bytes;

/// Requests sent from a client handle to the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// A packet to hand to the session state and put on the wire
    Packet(Packet),
    /// Replenish inbound delivery credit
    GrantCredit(usize),
    /// Stop surfacing incoming publishes to the application
    CancelDelivery,
}

/// Events which can be yielded by the event loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A packet received from the broker
    Incoming(Packet),
    /// An action taken by the event loop on behalf of the client
    Outgoing(Outgoing),
    /// A publish that was pending acknowledgement when the broker discarded
    /// the session. It was never confirmed delivered and will not be
    /// retransmitted.
    Undelivered(Publish),
}

/// Current outgoing activity on the event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outgoing {
    /// Publish packet with packet identifier. 0 implies QoS 0
    Publish(u16),
    /// Subscribe packet with packet identifier
    Subscribe(u16),
    /// Unsubscribe packet with packet identifier
    Unsubscribe(u16),
    /// PubAck packet with packet identifier
    PubAck(u16),
    /// PubRec packet with packet identifier
    PubRec(u16),
    /// PubRel packet with packet identifier
    PubRel(u16),
    /// PubComp packet with packet identifier
    PubComp(u16),
    /// Ping request packet
    PingReq,
    /// Disconnect packet
    Disconnect,
    /// A publish is parked until an acknowledgement frees a packet identifier
    AwaitAck,
}

/// Type aliases for MQTT 5.0 operation.
pub mod v5 {
    pub use wren_bytes::V5;

    pub type AsyncClient = crate::AsyncClient<V5>;
    pub type Client = crate::Client<V5>;
    pub type EventLoop = crate::EventLoop<V5>;
    pub type Connection = crate::Connection<V5>;
}
