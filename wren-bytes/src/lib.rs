//! MQTT wire format assembly and disassembly
//!
//! This crate converts between in-memory MQTT control packets and their
//! binary representation, for protocol version 4 (MQTT 3.1.1) and
//! version 5 (MQTT 5.0).
//!
//! Decoding is resumable: when a buffer holds less than one full packet,
//! reading fails with [`Error::InsufficientBytes`] without consuming any
//! input, so the caller can retry once more bytes arrive.

use bytes::BytesMut;

mod codec;
mod error;
mod header;
mod packet;
mod parse;
mod property;
mod reason;
pub mod topic;

pub use codec::Codec;
pub use error::Error;
pub use packet::*;
pub use parse::VarInt;
pub use property::{Properties, Property};

use header::FixedHeader;

/// A type that can serialize and deserialize MQTT packets from/to a stream of bytes.
pub trait Protocol {
    /// The type that is being serialized and deserialized
    type Item;

    /// Deserializes a packet from a stream of bytes
    fn read(stream: &mut BytesMut, max_size: u32) -> Result<Self::Item, Error>;

    /// Serializes the packet into a stream of bytes
    fn write(packet: Self::Item, stream: &mut BytesMut, max_size: u32) -> Result<usize, Error>;
}

/// The supported MQTT protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// MQTT 3.1.1
    V4,
    /// MQTT 5.0
    V5,
}

/// Quality of Service levels for packet delivery.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[allow(clippy::enum_variant_names)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            qos => Err(Error::InvalidQoS(qos)),
        }
    }
}
