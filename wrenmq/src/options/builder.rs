use std::time::Duration;

use bytes::Bytes;
use wren_bytes::{LastWill, Login, Properties, Property};

use super::{ConnectOptions, MqttOptions, NetworkOptions};
use crate::ReconnectOptions;

/// Create [`MqttOptions`](super::MqttOptions) using a builder pattern.
pub struct OptionBuilder {
    // network options
    tcp_send_buffer_size: Option<u32>,
    tcp_recv_buffer_size: Option<u32>,
    tcp_nodelay: bool,
    conn_timeout: u64,
    // mqtt options
    broker_addr: String,
    port: u16,

    client_id: Option<String>,
    keep_alive: Duration,
    clean_start: bool,
    credentials: Option<Login>,
    last_will: Option<LastWill>,
    session_expiry_interval: Option<u32>,
    topic_alias_maximum: Option<u16>,
    request_response_information: Option<bool>,
    request_problem_information: Option<bool>,
    user_properties: Vec<(String, String)>,
    authentication_method: Option<String>,
    authentication_data: Option<Bytes>,

    max_packet_size_in: u32,
    max_packet_size_out: u32,
    receive_max_in: u16,
    receive_max_out: u16,
    pending_throttle: Duration,
    manual_acks: bool,
    inbound_credit: usize,
    reconnect: ReconnectOptions,
}

impl OptionBuilder {
    /// Create a new `OptionBuilder` for TCP connections
    pub fn new_tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            // default network options
            tcp_send_buffer_size: None,
            tcp_recv_buffer_size: None,
            tcp_nodelay: false,
            conn_timeout: 5,
            // default mqtt options
            broker_addr: host.into(),
            port,
            client_id: None,
            keep_alive: Duration::from_secs(60),
            clean_start: true,
            credentials: None,
            last_will: None,
            session_expiry_interval: None,
            topic_alias_maximum: None,
            request_response_information: None,
            request_problem_information: None,
            user_properties: Vec::new(),
            authentication_method: None,
            authentication_data: None,
            max_packet_size_in: 10 * 1024,
            max_packet_size_out: 10 * 1024,
            receive_max_in: 100,
            receive_max_out: 100,
            pending_throttle: Duration::from_micros(0),
            manual_acks: false,
            inbound_credit: usize::MAX,
            reconnect: ReconnectOptions::default(),
        }
    }

    pub fn finalize(self) -> MqttOptions {
        let client_id = self.client_id.unwrap_or_default();
        if client_id.is_empty() && !self.clean_start {
            // We do not panic or return an error,
            // but at least warn the user of this misconfiguration.
            log::warn!("An empty client id without a clean session will be rejected.");
        }

        let network_options = NetworkOptions {
            tcp_send_buffer_size: self.tcp_send_buffer_size,
            tcp_recv_buffer_size: self.tcp_recv_buffer_size,
            tcp_nodelay: self.tcp_nodelay,
            conn_timeout: self.conn_timeout,
        };

        let mut connect_properties = Properties::new();
        connect_properties.add(Property::ReceiveMaximum(self.receive_max_in));
        connect_properties.add(Property::MaximumPacketSize(self.max_packet_size_in));

        if let Some(interval) = self.session_expiry_interval {
            connect_properties.add(Property::SessionExpiryInterval(interval));
        }
        if let Some(x) = self.topic_alias_maximum {
            connect_properties.add(Property::TopicAliasMaximum(x));
        }
        if let Some(x) = self.request_response_information {
            connect_properties.add(Property::RequestResponseInformation(x));
        }
        if let Some(x) = self.request_problem_information {
            connect_properties.add(Property::RequestProblemInformation(x));
        }
        for (name, value) in self.user_properties {
            connect_properties.add(Property::UserProperty { name, value });
        }
        if let Some(x) = self.authentication_method {
            connect_properties.add(Property::AuthenticationMethod(x));
        }
        if let Some(x) = self.authentication_data {
            connect_properties.add(Property::AuthenticationData(x));
        }

        let connect_options = ConnectOptions {
            client_id,
            clean_start: self.clean_start,
            credentials: self.credentials,
            last_will: self.last_will,
            properties: connect_properties,
        };

        MqttOptions {
            broker_addr: self.broker_addr,
            port: self.port,
            keep_alive: self.keep_alive,
            max_packet_size_in: self.max_packet_size_in,
            max_packet_size_out: self.max_packet_size_out,
            receive_max_in: self.receive_max_in,
            receive_max_out: self.receive_max_out,
            pending_throttle: self.pending_throttle,
            manual_acks: self.manual_acks,
            inbound_credit: self.inbound_credit,
            reconnect: self.reconnect,
            connect_options,
            network_options,
        }
    }
}

// Network options
impl OptionBuilder {
    pub fn tcp_nodelay(mut self, nodelay: bool) -> Self {
        self.tcp_nodelay = nodelay;
        self
    }

    pub fn tcp_send_buffer_size(mut self, size: u32) -> Self {
        self.tcp_send_buffer_size = Some(size);
        self
    }

    pub fn tcp_recv_buffer_size(mut self, size: u32) -> Self {
        self.tcp_recv_buffer_size = Some(size);
        self
    }

    /// Set the connection timeout in seconds
    pub fn connection_timeout(mut self, timeout: u64) -> Self {
        self.conn_timeout = timeout;
        self
    }
}

// Connect options
impl OptionBuilder {
    /// Set the client identifier to use.
    ///
    /// A broker must support client identifiers of at least 23 bytes,
    /// using alphanumeric characters, but may support more.
    ///
    /// If this is not set, an empty client id will be used.
    /// A broker that supports this will generate a random identifier.
    ///
    /// This *must* be set when [clean_start](Self::clean_start) is `false`.
    pub fn client_id<S: Into<String>>(mut self, client_id: S) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the last will message.
    pub fn last_will(mut self, will: LastWill) -> Self {
        self.last_will = Some(will);
        self
    }

    /// Set the username and password to use for authentication.
    pub fn credentials<U, P>(mut self, username: U, password: P) -> Self
    where
        U: Into<String>,
        P: Into<String>,
    {
        self.credentials = Some(Login::new(username, password));
        self
    }

    /// `clean_start = true` removes all the state from queues & instructs the broker
    /// to clean all the client state when client disconnects.
    ///
    /// When set `false`, broker will hold the client state and performs pending
    /// operations on the client when reconnection with same `client_id`
    /// happens. Local queue state is also held to retransmit packets after reconnection.
    pub fn clean_start(mut self, clean_start: bool) -> Self {
        self.clean_start = clean_start;
        self
    }

    /// Set the `Session Expiry Interval` connect property.
    ///
    /// This specifies the duration in seconds for which the session
    /// should be maintained by the broker after the client disconnects.
    pub fn session_expiry_interval(mut self, interval: u32) -> Self {
        self.session_expiry_interval = Some(interval);
        self
    }

    /// Set the `Receive Maximum` connect property.
    ///
    /// This is a limit on the number of QoS 1 and QoS 2 publications
    /// that the client is willing to process concurrently.
    pub fn receive_maximum(mut self, recv_max: u16) -> Self {
        self.receive_max_in = recv_max;
        self
    }

    /// Set the `Maximum Packet Size` connect property.
    ///
    /// This puts a limit on the size of an incoming MQTT packet.
    /// This value will be capped to 256MB, which is the maximum allowed by the protocol.
    pub fn max_packet_size(mut self, max_size: u32) -> Self {
        self.max_packet_size_in = std::cmp::min(max_size, 256 * 1024 * 1024);
        self
    }

    /// Set the `Topic Alias Maximum` connect property.
    ///
    /// This is the highest value that the client will accept as a Topic Alias sent by the server.
    pub fn topic_alias_max(mut self, topic_alias_max: u16) -> Self {
        self.topic_alias_maximum = Some(topic_alias_max);
        self
    }

    /// Set the `Request Response Information` connect property.
    ///
    /// This requests the server to return *response information* in the connack packet.
    pub fn request_response_info(mut self) -> Self {
        self.request_response_information = Some(true);
        self
    }

    /// Set the `Request Problem Information` connect property.
    ///
    /// This indicate whether the *reason string* or *user properties* are sent in case of failures.
    /// When passing `true`, the server may include a *reason string* or *user properties*
    /// in any packet where it is allowed.
    /// When passing `false`, the server may only include a *reason string* or *user properties*
    /// in case of publish, connack or disconnect.
    pub fn request_problem_info(mut self, problem_info: bool) -> Self {
        self.request_problem_information = Some(problem_info);
        self
    }

    /// Set user properties to be used in connect packets.
    pub fn user_properties(mut self, user_properties: Vec<(String, String)>) -> Self {
        self.user_properties = user_properties;
        self
    }

    /// Set the `Authentication Method` connect property.
    pub fn authentication_method(mut self, method: String) -> Self {
        self.authentication_method = Some(method);
        self
    }

    /// Set the `Authentication Data` connect property.
    pub fn authentication_data(mut self, data: Bytes) -> Self {
        self.authentication_data = Some(data);
        self
    }
}

// MQTT options
impl OptionBuilder {
    /// Set the maximum time interval between message.
    ///
    /// If no other messages are being sent, ping requests are used to keep the connection alive.
    /// Setting this to zero disables this functionality.
    ///
    /// In MQTT 5.0, the server may override this value.
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        assert!(
            duration.is_zero() || duration >= Duration::from_secs(1),
            "Keep alives should be specified in seconds. Durations less than \
                a second are not allowed, except for Duration::ZERO."
        );

        self.keep_alive = duration;
        self
    }

    /// Set a limit on the size of outgoing packets.
    ///
    /// In MQTT 5.0, the server may override this if it sends a smaller 'Maximum Packet Size'.
    pub fn max_outgoing_size(mut self, outgoing: u32) -> Self {
        self.max_packet_size_out = outgoing;
        self
    }

    /// Set the maximum number of outgoing inflight QoS1/QoS2 messages.
    ///
    /// Space will be pre-allocated for this amount of packets,
    /// so it is important to select an appropriate value.
    /// In MQTT 5.0, the server may override this if it sends a smaller 'Receive Maximum'.
    pub fn outgoing_inflight(mut self, inflight: u16) -> Self {
        self.receive_max_out = inflight;
        self
    }

    /// Enables throttling for pending messages.
    ///
    /// The specified duration will be used as the time between sending pending packets.
    pub fn pending_throttle(mut self, duration: Duration) -> Self {
        self.pending_throttle = duration;
        self
    }

    /// Enable manual acknowledgements.
    ///
    /// When this is active, the client has to manually send acknowledgement
    /// messages for incoming publish packets.
    pub fn manual_acks(mut self, manual_acks: bool) -> Self {
        self.manual_acks = manual_acks;
        self
    }

    /// Set the upper bound on inbound delivery credit.
    ///
    /// Each incoming publish delivered to the application consumes one
    /// credit. When credit runs out the event loop parks further publishes
    /// and stops reading from the socket until
    /// [`grant_credit`](crate::AsyncClient::grant_credit) is called.
    ///
    /// The default is effectively unlimited.
    pub fn inbound_credit(mut self, credit: usize) -> Self {
        self.inbound_credit = credit;
        self
    }

    /// Configure automatic reconnects.
    pub fn reconnect(mut self, reconnect: ReconnectOptions) -> Self {
        self.reconnect = reconnect;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_client_id() {
        let options = OptionBuilder::new_tcp("localhost", 1883).finalize();
        assert!(options.client_id().is_empty());
    }

    #[test]
    fn connect_properties_carry_the_limits() {
        let options = OptionBuilder::new_tcp("localhost", 1883)
            .receive_maximum(20)
            .max_packet_size(2048)
            .session_expiry_interval(300)
            .finalize();

        let properties = &options.connect_options.properties;
        assert_eq!(properties.receive_maximum(), Some(20));
        assert_eq!(properties.maximum_packet_size(), Some(2048));
        assert_eq!(properties.session_expiry_interval(), Some(300));
    }

    #[test]
    fn reconnects_are_disabled_by_default() {
        let options = OptionBuilder::new_tcp("localhost", 1883).finalize();
        assert!(!options.reconnect().enabled);
    }
}
