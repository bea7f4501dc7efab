use std::time::Duration;

use wren_bytes::{LastWill, Login, Properties};

use crate::ReconnectOptions;

mod builder;
pub use builder::OptionBuilder;

/// Provides a way to configure low level network connection configurations
#[derive(Debug, Clone, Default)]
pub struct NetworkOptions {
    pub(crate) tcp_send_buffer_size: Option<u32>,
    pub(crate) tcp_recv_buffer_size: Option<u32>,
    pub(crate) tcp_nodelay: bool,
    pub(crate) conn_timeout: u64,
}

/// The options to use when connecting to the MQTT broker.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Client identifier
    pub(crate) client_id: String,
    /// Clean (or) persistent session
    pub(crate) clean_start: bool,
    /// Username and password to use when connecting to the broker
    pub(crate) credentials: Option<Login>,
    /// Last will that will be issued on unexpected disconnect
    pub(crate) last_will: Option<LastWill>,
    /// Properties to use when sending a connect packet
    pub(crate) properties: Properties,
}

/// Options to configure the MQTT client behaviour
///
/// Construct this using an [`OptionBuilder`].
#[derive(Debug, Clone)]
pub struct MqttOptions {
    /// Broker address that you want to connect to
    pub(crate) broker_addr: String,
    /// Broker port
    pub(crate) port: u16,
    /// Keep alive time to send ping request to the broker when the connection is idle
    pub(crate) keep_alive: Duration,
    /// Maximum size of an incoming packet
    ///
    /// This is used when verifying the remaining length of a packet
    pub(crate) max_packet_size_in: u32,
    /// The maximum number of incoming inflight QoS1/QoS2 messages
    pub(crate) receive_max_in: u16,
    /// Maximum size of an outgoing packet
    ///
    /// This is checked when sending a packet to the broker.
    /// This can be overridden by the server, if it sets a lower maximum packet size.
    pub(crate) max_packet_size_out: u32,
    /// The maximum number of outgoing inflight QoS1/QoS2 messages
    ///
    /// This can be overridden by the server, if it sets a lower receive maximum.
    pub(crate) receive_max_out: u16,
    /// Minimum delay time between consecutive outgoing packets
    /// while retransmitting pending packets
    pub(crate) pending_throttle: Duration,
    /// If set to `true` MQTT acknowledgements are not sent automatically.
    /// Every incoming publish packet must be manually acknowledged with `client.ack(...)` method.
    pub(crate) manual_acks: bool,
    /// Upper bound on inbound delivery credit.
    ///
    /// Incoming publishes consume one credit each; when it runs out the
    /// event loop stops reading from the socket until the application
    /// grants more.
    pub(crate) inbound_credit: usize,
    /// Automatic reconnect behaviour
    pub(crate) reconnect: ReconnectOptions,
    /// Configuration for MQTT connection
    pub(crate) connect_options: ConnectOptions,
    /// Configuration for network connection
    pub(crate) network_options: NetworkOptions,
}

impl MqttOptions {
    /// Broker address
    pub fn broker_address(&self) -> (&str, u16) {
        (&self.broker_addr, self.port)
    }

    pub fn last_will(&self) -> Option<&LastWill> {
        self.connect_options.last_will.as_ref()
    }

    /// Keep alive time
    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// Client identifier
    pub fn client_id(&self) -> &str {
        &self.connect_options.client_id
    }

    /// Maximum packet size
    pub fn max_packet_size(&self) -> u32 {
        self.max_packet_size_in
    }

    /// Clean session
    pub fn clean_session(&self) -> bool {
        self.connect_options.clean_start
    }

    /// Security options
    pub fn credentials(&self) -> Option<&Login> {
        self.connect_options.credentials.as_ref()
    }

    /// Get connection timeout in seconds
    pub fn connection_timeout(&self) -> u64 {
        self.network_options.conn_timeout
    }

    /// Outgoing message rate
    pub fn pending_throttle(&self) -> Duration {
        self.pending_throttle
    }

    /// Number of concurrent in flight messages
    pub fn inflight(&self) -> u16 {
        self.receive_max_in
    }

    /// get manual acknowledgements
    pub fn manual_acks(&self) -> bool {
        self.manual_acks
    }

    /// Upper bound on inbound delivery credit
    pub fn inbound_credit(&self) -> usize {
        self.inbound_credit
    }

    /// Automatic reconnect behaviour
    pub fn reconnect(&self) -> &ReconnectOptions {
        &self.reconnect
    }
}
