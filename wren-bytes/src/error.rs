/// Error during serialization or deserialization
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid connect reason code = {0}")]
    InvalidConnectReasonCode(u8),
    #[error("Invalid reason code = {0}")]
    InvalidReasonCode(u8),
    #[error("Invalid protocol name")]
    InvalidProtocol,
    #[error("Invalid protocol level = {0}")]
    InvalidProtocolLevel(u8),
    #[error("Invalid packet format")]
    IncorrectPacketFormat,
    #[error("Invalid packet type = {0}")]
    InvalidPacketType(u8),
    #[error("Invalid retain forward rule = {0}")]
    InvalidRetainForwardRule(u8),
    #[error("Invalid QoS level = {0}")]
    InvalidQoS(u8),
    #[error("Invalid subscribe reason code = {0}")]
    InvalidSubscribeReasonCode(u8),
    #[error("Packet has packet identifier zero")]
    PacketIdZero,
    #[error("Subscription filter list is empty")]
    EmptySubscription,
    #[error("Payload is too long")]
    PayloadTooLong,
    #[error("Payload is required")]
    PayloadRequired,
    #[error("String is not UTF-8 encoded = {0}")]
    Utf8Encoding(#[from] std::str::Utf8Error),
    #[error("String contains an embedded NUL character")]
    EmbeddedNul,
    #[error("Promised boundary crossed, length prefix claims {0} bytes")]
    BoundaryCrossed(usize),
    #[error("Packet is malformed")]
    MalformedPacket,
    #[error("Remaining length is malformed")]
    MalformedRemainingLength,
    #[error("Invalid property type = {0}")]
    InvalidPropertyType(u8),
    /// More bytes required to frame packet. Argument implies minimum
    /// additional bytes required to proceed further.
    #[error("Insufficient number of bytes to frame packet, {0} more bytes required")]
    InsufficientBytes(usize),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Incoming packet of {pkt_size:?} bytes exceeds the maximum packet size of {max:?}")]
    PayloadSizeLimitExceeded { pkt_size: u32, max: u32 },
    #[error("Cannot send packet of size {pkt_size:?}. It exceeds the broker's maximum packet size of {max:?}")]
    OutgoingPacketTooLarge { pkt_size: u32, max: u32 },
}
