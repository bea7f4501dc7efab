//! The MQTT control packet types
//!
//! The [`Packet`] enum consolidates all control packets into a single type,
//! which is what encoding takes and decoding produces. Each variant wraps a
//! packet struct defined in its own submodule and re-exported here.
//!
//! Version-specific wire details live in the submodules; the [`V4`] and
//! [`V5`] marker types select between them through the `Protocol` trait.

use crate::Error;

mod auth;
mod connack;
mod connect;
mod disconnect;
mod ping;
mod puback;
mod pubcomp;
mod publish;
mod pubrec;
mod pubrel;
mod suback;
mod subscribe;
mod unsuback;
mod unsubscribe;
mod v4;
mod v5;

pub use auth::{Auth, AuthReasonCode};
pub use connack::{ConnAck, ConnectReasonCode, ConnectReturnCode};
pub use connect::{Connect, LastWill, Login};
pub use disconnect::{Disconnect, DisconnectReasonCode};
pub use ping::{PingReq, PingResp};
pub use puback::{PubAck, PubAckReasonCode};
pub use pubcomp::{PubComp, PubCompReasonCode};
pub use publish::Publish;
pub use pubrec::{PubRec, PubRecReasonCode};
pub use pubrel::{PubRel, PubRelReasonCode};
pub use suback::{SubAck, SubscribeReasonCode};
pub use subscribe::{Filter, RetainForwardRule, Subscribe};
pub use unsuback::{UnsubAck, UnsubscribeReasonCode};
pub use unsubscribe::Unsubscribe;
pub use v4::V4;
pub use v5::V5;

/// MQTT Control Packet
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck(PubAck),
    PubRec(PubRec),
    PubRel(PubRel),
    PubComp(PubComp),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe),
    UnsubAck(UnsubAck),
    PingReq(PingReq),
    PingResp(PingResp),
    Disconnect(Disconnect),
    Auth(Auth),
}

impl Packet {
    /// The control packet type of this packet
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck(_) => PacketType::PubAck,
            Packet::PubRec(_) => PacketType::PubRec,
            Packet::PubRel(_) => PacketType::PubRel,
            Packet::PubComp(_) => PacketType::PubComp,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::UnsubAck(_) => PacketType::UnsubAck,
            Packet::PingReq(_) => PacketType::PingReq,
            Packet::PingResp(_) => PacketType::PingResp,
            Packet::Disconnect(_) => PacketType::Disconnect,
            Packet::Auth(_) => PacketType::Auth,
        }
    }
}

/// MQTT packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Connection request
    Connect = 1,
    /// Connect acknowledgment
    ConnAck,
    /// Publish message
    Publish,
    /// Publish acknowledgment (QoS 1)
    PubAck,
    /// Publish received (QoS 2 delivery part 1)
    PubRec,
    /// Publish release (QoS 2 delivery part 2)
    PubRel,
    /// Publish complete (QoS 2 delivery part 3)
    PubComp,
    /// Subscribe request
    Subscribe,
    /// Subscribe acknowledgment
    SubAck,
    /// Unsubscribe request
    Unsubscribe,
    /// Unsubscribe acknowledgment
    UnsubAck,
    /// PING request
    PingReq,
    /// PING response
    PingResp,
    /// Disconnect notification
    Disconnect,
    /// Authentication exchange
    Auth,
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::ConnAck),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::PubAck),
            5 => Ok(PacketType::PubRec),
            6 => Ok(PacketType::PubRel),
            7 => Ok(PacketType::PubComp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::SubAck),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::UnsubAck),
            12 => Ok(PacketType::PingReq),
            13 => Ok(PacketType::PingResp),
            14 => Ok(PacketType::Disconnect),
            15 => Ok(PacketType::Auth),
            x => Err(Error::InvalidPacketType(x)),
        }
    }
}

/// Get the packet size from the remaining length
fn size_from_len(len: crate::VarInt) -> usize {
    // control field + remaining length + variable header & payload
    1 + len.length() + len.value()
}

#[cfg(test)]
mod tests {
    // Shared by the packet submodule tests. The value is long enough to push
    // the remaining length field to two bytes.
    pub const USER_PROP_KEY: &str = "property";
    pub const USER_PROP_VAL: &str = "a value thats really long............................................................................................................";
}
