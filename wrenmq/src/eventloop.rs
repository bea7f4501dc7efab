use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use flume::{bounded, Receiver, Sender};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::time::{self, error::Elapsed, Instant, Sleep};
use wren_bytes::{ConnAck, Connect, ConnectReasonCode, Packet, Protocol};

use crate::bridge::{Admission, CreditGate};
use crate::framed::Network;
use crate::reconnect::Backoff;
use crate::state::{SessionState, StateError};
use crate::{Event, MqttOptions, NetworkOptions, Request};

/// Critical errors during eventloop polling
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Mqtt state: {0}")]
    MqttState(#[from] StateError),
    #[error("Timeout")]
    Timeout(#[from] Elapsed),
    #[error("I/O: {0}")]
    Io(#[from] io::Error),
    #[error("Connection refused, return code: `{0:?}`")]
    ConnectionRefused(ConnectReasonCode),
    #[error("Expected ConnAck packet, received: {0:?}")]
    NotConnAck(Packet),
    #[error("Requests done")]
    RequestsDone,
}

/// Where the event loop currently is in the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No connection and no attempt in progress
    Disconnected,
    /// The transport connection is being established
    Connecting,
    /// The CONNECT packet went out, waiting for the CONNACK
    ConnAckPending,
    /// Fully connected
    Connected,
    /// A DISCONNECT packet was sent, waiting for the peer to close
    Disconnecting,
    /// Sleeping out the backoff delay before the next attempt
    ReconnectWait,
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client asked for the disconnect
    Graceful,
    /// The broker rejected the CONNECT packet
    ConnectRefused,
    /// The peer violated the protocol
    ProtocolError,
    /// An operation did not complete in time
    Timeout,
    /// The underlying transport failed
    Transport,
}

/// A connection lifecycle transition, observable through
/// [`EventLoop::status_updates`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: ConnectionStatus,
    /// Set when the transition was caused by a connection ending
    pub reason: Option<DisconnectReason>,
}

/// Eventloop with all the state of a connection
pub struct EventLoop<P: Protocol<Item = Packet> = wren_bytes::V4> {
    /// Options of the current mqtt connection
    options: MqttOptions,
    /// Current state of the connection
    state: SessionState,
    /// Network connection to the broker
    network: Option<Network<P>>,
    /// Request stream
    requests_rx: Receiver<Request>,
    /// Pending packets from last session
    pending: VecDeque<Packet>,
    /// Keep alive time
    keepalive_timeout: Option<Pin<Box<Sleep>>>,
    /// Inbound delivery credit
    gate: CreditGate,
    /// Reconnect backoff
    backoff: Backoff,
    /// Connection lifecycle
    status: ConnectionStatus,
    status_tx: Sender<StatusUpdate>,
    /// Kept so status updates never fail to send, even when no
    /// application receiver exists
    status_rx: Receiver<StatusUpdate>,
}

impl<P: Protocol<Item = Packet>> EventLoop<P> {
    /// New MQTT `EventLoop`
    pub(crate) fn new(options: MqttOptions, cap: usize) -> (Self, Sender<Request>) {
        let (requests_tx, requests_rx) = bounded(cap);
        let state = SessionState::new(
            options.client_id().to_owned(),
            options.receive_max_out,
            options.manual_acks,
        );
        let gate = CreditGate::new(options.inbound_credit);
        let backoff = Backoff::new(options.reconnect().clone());
        let (status_tx, status_rx) = flume::unbounded();

        let eventloop = Self {
            options,
            state,
            requests_rx,
            pending: VecDeque::new(),
            network: None,
            keepalive_timeout: None,
            gate,
            backoff,
            status: ConnectionStatus::Disconnected,
            status_tx,
            status_rx,
        };
        (eventloop, requests_tx)
    }

    /// The current position in the connection lifecycle.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// A stream of connection lifecycle transitions.
    ///
    /// Every state change is sent here, including the reason when a
    /// connection ends. The receiver can be cloned and moved to a task.
    pub fn status_updates(&self) -> Receiver<StatusUpdate> {
        self.status_rx.clone()
    }

    /// The session state, for inspecting inflight counts and the active
    /// subscription set.
    pub fn session(&self) -> &SessionState {
        &self.state
    }

    fn set_status(&mut self, status: ConnectionStatus, reason: Option<DisconnectReason>) {
        self.status = status;
        let _ = self.status_tx.send(StatusUpdate { status, reason });
    }

    /// Last session might contain packets which aren't acked. MQTT says these packets should be
    /// republished in the next session. Move pending messages from state to eventloop, drops the
    /// underlying network connection and clears the keepalive timeout if any.
    pub fn clean(&mut self) {
        self.network = None;
        self.keepalive_timeout = None;
        self.pending.extend(self.state.take_retransmission());

        // drain requests from channel which weren't yet received
        for request in self.requests_rx.drain() {
            match request {
                // Wait for publish retransmission, else the broker could be
                // confused by an ack for a publish it never re-delivered
                Request::Packet(Packet::PubAck(_)) | Request::Packet(Packet::PubRec(_)) => (),
                Request::Packet(packet) => self.pending.push_back(packet),
                Request::GrantCredit(n) => self.gate.grant(n),
                Request::CancelDelivery => self.gate.cancel(),
            }
        }
    }

    /// Yields the next notification or outgoing request and periodically
    /// pings the broker. When reconnects are enabled, continuing to poll
    /// rides out disconnections; otherwise the error is returned.
    /// **NOTE** Don't block this while iterating
    pub async fn poll(&mut self) -> Result<Event, ConnectionError> {
        loop {
            if self.network.is_none() {
                if let Err(e) = self.connect().await {
                    self.keepalive_timeout = None;
                    self.retry_or_bail(e).await?;
                    continue;
                }
            }

            match self.select().await {
                Ok(event) => return Ok(event),
                Err(e) => {
                    // Packets pending acknowledgement are republished on
                    // session resume. Move them from state to eventloop.
                    self.clean();
                    self.retry_or_bail(e).await?;
                }
            }
        }
    }

    /// Sleeps out the backoff delay when the error is retryable and
    /// reconnects are enabled, otherwise surfaces the error.
    async fn retry_or_bail(&mut self, error: ConnectionError) -> Result<(), ConnectionError> {
        let graceful = matches!(error, ConnectionError::RequestsDone)
            || (self.status == ConnectionStatus::Disconnecting
                && matches!(
                    error,
                    ConnectionError::MqttState(StateError::ConnectionAborted)
                ));
        if graceful {
            self.set_status(
                ConnectionStatus::Disconnected,
                Some(DisconnectReason::Graceful),
            );
            return Err(error);
        }

        let reason = classify(&error);
        self.backoff.note_disconnected();
        if self.backoff.enabled() {
            let delay = self.backoff.next_delay();
            log::warn!("Connection error: {error}, reconnecting in {delay:?}");
            self.set_status(ConnectionStatus::ReconnectWait, Some(reason));
            time::sleep(delay).await;
            return Ok(());
        }

        self.set_status(ConnectionStatus::Disconnected, Some(reason));
        Err(error)
    }

    async fn connect(&mut self) -> Result<(), ConnectionError> {
        let timeout = Duration::from_secs(self.options.connection_timeout());

        self.set_status(ConnectionStatus::Connecting, None);
        let mut network = match time::timeout(timeout, network_connect(&self.options)).await {
            Ok(inner) => inner?,
            Err(e) => return Err(ConnectionError::Timeout(e)),
        };

        self.set_status(ConnectionStatus::ConnAckPending, None);
        let connack =
            match time::timeout(timeout, mqtt_connect(&mut self.options, &mut network)).await {
                Ok(inner) => inner?,
                Err(e) => return Err(ConnectionError::Timeout(e)),
            };

        if self.keepalive_timeout.is_none() && !self.options.keep_alive.is_zero() {
            self.keepalive_timeout = Some(Box::pin(time::sleep(self.options.keep_alive)));
        }

        let session_present = connack.session_present;
        self.network = Some(network);
        self.state
            .handle_incoming_packet(Packet::ConnAck(connack))?;

        self.resume_pending(session_present);

        self.backoff.note_connected();
        self.set_status(ConnectionStatus::Connected, None);
        Ok(())
    }

    /// Reconciles the pending queue with the session the broker reports.
    ///
    /// Packets pending acknowledgement are only retransmitted into a session
    /// the broker kept. Without one, their delivery was never confirmed and
    /// never will be, so each publish is surfaced as [`Event::Undelivered`].
    /// An interrupted QoS 2 handshake is dropped since its publish already
    /// reached the broker. SUBSCRIBE and UNSUBSCRIBE requests queued while
    /// disconnected stay pending, they are valid against a fresh session.
    fn resume_pending(&mut self, session_present: bool) {
        if session_present {
            return;
        }

        let mut requeue = VecDeque::with_capacity(self.pending.len());
        for packet in self.pending.drain(..) {
            match packet {
                Packet::Publish(mut publish) => {
                    publish.pkid = 0;
                    publish.dup = false;
                    self.state.events.push_back(Event::Undelivered(publish));
                }
                Packet::PubRel(_) => (),
                packet => requeue.push_back(packet),
            }
        }
        self.pending = requeue;
    }

    /// The next buffered event, with incoming publishes routed through the
    /// credit gate.
    fn next_event(&mut self) -> Option<Event> {
        // a credit grant may have freed up a previously parked publish
        if let Some(publish) = self.gate.release() {
            return Some(Event::Incoming(Packet::Publish(publish)));
        }

        while let Some(event) = self.state.get_event() {
            match event {
                Event::Incoming(Packet::Publish(publish)) => match self.gate.admit(publish) {
                    Admission::Deliver(publish) => {
                        return Some(Event::Incoming(Packet::Publish(publish)));
                    }
                    Admission::Parked | Admission::Dropped => continue,
                },
                event => return Some(event),
            }
        }
        None
    }

    /// Select on network and requests and generate keepalive pings when necessary
    async fn select(&mut self) -> Result<Event, ConnectionError> {
        let network_timeout = Duration::from_secs(self.options.connection_timeout());

        loop {
            // Buffered events from previous polls, and parked publishes the
            // credit gate can now release, go out before a new poll.
            if let Some(event) = self.next_event() {
                return Ok(event);
            }

            let inflight_full = self.state.inflight() >= self.state.max_outgoing_inflight;
            let state_parked = self.state.has_parked();
            let gate_open = self.gate.ready();
            let network = self.network.as_mut().unwrap();

            let mut no_sleep = Box::pin(time::sleep(Duration::ZERO));
            tokio::select! {
                // Handles pending and new requests.
                // If available, prioritises pending requests from previous session.
                // Else, pulls next request from the user request channel.
                //
                // The conditions are for flow control: new requests are held
                // back while the outgoing inflight window is full or a publish
                // is already parked. The branch stays enabled while the credit
                // gate is closed, so that grant and cancel requests can still
                // come through on the same channel.
                o = Self::next_request(
                    &mut self.pending,
                    &self.requests_rx,
                    self.options.pending_throttle
                ), if !self.pending.is_empty() || (!inflight_full && !state_parked) || !gate_open => match o {
                    Ok(Request::Packet(request)) => {
                        if let Some(outgoing) = self.state.handle_outgoing_packet(request)? {
                            if matches!(outgoing, Packet::Disconnect(_)) {
                                self.status = ConnectionStatus::Disconnecting;
                                let _ = self.status_tx.send(StatusUpdate {
                                    status: self.status,
                                    reason: None,
                                });
                            }
                            network.write(outgoing).await?;
                            match time::timeout(network_timeout, network.flush()).await {
                                Ok(inner) => inner?,
                                Err(e) => return Err(ConnectionError::Timeout(e)),
                            };
                        }
                    }
                    Ok(Request::GrantCredit(n)) => self.gate.grant(n),
                    Ok(Request::CancelDelivery) => self.gate.cancel(),
                    Err(e) => return Err(e),
                },
                // Pull a bunch of packets from network, reply in bunch and
                // yield the first item. Disabled while parked publishes wait
                // for credit, which pushes backpressure onto the socket.
                o = network.readb(&mut self.state), if gate_open => {
                    o?;
                    // flush all the acks
                    match time::timeout(network_timeout, network.flush()).await {
                        Ok(inner) => inner?,
                        Err(e) => return Err(ConnectionError::Timeout(e)),
                    };
                },
                // We generate pings irrespective of network activity.
                // This keeps the ping logic simple.
                _ = self.keepalive_timeout.as_mut().unwrap_or(&mut no_sleep),
                    if self.keepalive_timeout.is_some() && !self.options.keep_alive.is_zero() => {
                    let timeout = self.keepalive_timeout.as_mut().unwrap();
                    timeout.as_mut().reset(Instant::now() + self.options.keep_alive);

                    let ping = Packet::PingReq(wren_bytes::PingReq);
                    if let Some(outgoing) = self.state.handle_outgoing_packet(ping)? {
                        network.write(outgoing).await?;
                    }
                    match time::timeout(network_timeout, network.flush()).await {
                        Ok(inner) => inner?,
                        Err(e) => return Err(ConnectionError::Timeout(e)),
                    };
                }
            }
        }
    }

    async fn next_request(
        pending: &mut VecDeque<Packet>,
        rx: &Receiver<Request>,
        pending_throttle: Duration,
    ) -> Result<Request, ConnectionError> {
        if !pending.is_empty() {
            time::sleep(pending_throttle).await;
            // We must call .pop_front() AFTER sleep() otherwise we would have
            // advanced the iterator but the future might be canceled before return
            Ok(Request::Packet(pending.pop_front().unwrap()))
        } else {
            match rx.recv_async().await {
                Ok(r) => Ok(r),
                Err(_) => Err(ConnectionError::RequestsDone),
            }
        }
    }
}

fn classify(error: &ConnectionError) -> DisconnectReason {
    match error {
        ConnectionError::ConnectionRefused(_) => DisconnectReason::ConnectRefused,
        ConnectionError::MqttState(StateError::ConnFail { .. }) => DisconnectReason::ConnectRefused,
        ConnectionError::Timeout(_) => DisconnectReason::Timeout,
        ConnectionError::Io(_) => DisconnectReason::Transport,
        ConnectionError::MqttState(StateError::ConnectionAborted) => DisconnectReason::Transport,
        ConnectionError::RequestsDone => DisconnectReason::Graceful,
        ConnectionError::MqttState(_) | ConnectionError::NotConnAck(_) => {
            DisconnectReason::ProtocolError
        }
    }
}

pub(crate) async fn socket_connect(
    host: String,
    network_options: &NetworkOptions,
) -> io::Result<TcpStream> {
    let addrs = lookup_host(host).await?;
    let mut last_err = None;

    for addr in addrs {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };

        socket.set_nodelay(network_options.tcp_nodelay)?;

        if let Some(send_buff_size) = network_options.tcp_send_buffer_size {
            socket.set_send_buffer_size(send_buff_size)?;
        }
        if let Some(recv_buffer_size) = network_options.tcp_recv_buffer_size {
            socket.set_recv_buffer_size(recv_buffer_size)?;
        }

        match socket.connect(addr).await {
            Ok(s) => return Ok(s),
            Err(e) => {
                last_err = Some(e);
            }
        };
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "could not resolve to any address",
        )
    }))
}

async fn network_connect<P: Protocol<Item = Packet>>(
    options: &MqttOptions,
) -> Result<Network<P>, ConnectionError> {
    let (host, port) = options.broker_address();
    let addr = format!("{host}:{port}");
    let tcp = socket_connect(addr, &options.network_options).await?;

    Ok(Network::new(
        tcp,
        options.max_packet_size_in,
        options.max_packet_size_out,
    ))
}

async fn mqtt_connect<P: Protocol<Item = Packet>>(
    options: &mut MqttOptions,
    network: &mut Network<P>,
) -> Result<ConnAck, ConnectionError> {
    let mut connect = Connect::new(
        options.keep_alive().as_secs() as u16,
        options.clean_session(),
        options.client_id(),
    );
    connect.last_will = options.last_will().cloned().map(Box::new);
    connect.login = options.credentials().cloned().map(Box::new);
    connect.properties = options.connect_options.properties.clone();

    // send mqtt connect packet
    network.write(Packet::Connect(connect)).await?;
    network.flush().await?;

    // validate connack
    match network.read().await? {
        Packet::ConnAck(connack) if connack.code == ConnectReasonCode::Success => {
            if let Some(keep_alive) = connack.properties.server_keep_alive() {
                log::debug!("Server overrides keep alive to {keep_alive}s");
                options.keep_alive = Duration::from_secs(keep_alive as u64);
            }
            if let Some(max_size) = connack.properties.maximum_packet_size() {
                log::debug!("Server sets maximum packet size of {max_size}");
                network.set_max_outgoing_size(max_size);
            }
            Ok(connack)
        }
        Packet::ConnAck(connack) => Err(ConnectionError::ConnectionRefused(connack.code)),
        packet => Err(ConnectionError::NotConnAck(packet)),
    }
}

#[cfg(test)]
mod test {
    use wren_bytes::{PubRel, Publish, QoS, Subscribe, V4};

    use super::*;
    use crate::{OptionBuilder, ReconnectOptions};

    fn publish(n: u8) -> Publish {
        Publish::new("hello/world", QoS::AtMostOnce, vec![n])
    }

    #[test]
    fn buffered_publishes_respect_the_credit_gate() {
        let options = OptionBuilder::new_tcp("localhost", 1883)
            .inbound_credit(1)
            .finalize();
        let (mut eventloop, _tx) = EventLoop::<V4>::new(options, 10);

        eventloop
            .state
            .events
            .push_back(Event::Incoming(Packet::Publish(publish(1))));
        eventloop
            .state
            .events
            .push_back(Event::Incoming(Packet::Publish(publish(2))));

        // one credit, one delivery
        assert_eq!(
            eventloop.next_event(),
            Some(Event::Incoming(Packet::Publish(publish(1))))
        );
        assert_eq!(eventloop.next_event(), None);
        assert!(!eventloop.gate.ready());

        // the grant releases the parked publish
        eventloop.gate.grant(1);
        assert_eq!(
            eventloop.next_event(),
            Some(Event::Incoming(Packet::Publish(publish(2))))
        );
        assert!(eventloop.gate.ready());
    }

    #[test]
    fn non_publish_events_bypass_the_gate() {
        let options = OptionBuilder::new_tcp("localhost", 1883)
            .inbound_credit(0)
            .finalize();
        let (mut eventloop, _tx) = EventLoop::<V4>::new(options, 10);

        eventloop
            .state
            .events
            .push_back(Event::Incoming(Packet::PingResp(wren_bytes::PingResp)));
        assert_eq!(
            eventloop.next_event(),
            Some(Event::Incoming(Packet::PingResp(wren_bytes::PingResp)))
        );
    }

    #[test]
    fn lost_session_requeues_subscribes_and_surfaces_publishes() {
        let options = OptionBuilder::new_tcp("localhost", 1883).finalize();
        let (mut eventloop, _tx) = EventLoop::<V4>::new(options, 10);

        let mut inflight = Publish::new("hello/world", QoS::AtLeastOnce, vec![7]);
        inflight.pkid = 2;
        inflight.dup = true;
        eventloop.pending.push_back(Packet::Publish(inflight));
        eventloop.pending.push_back(Packet::Subscribe(Subscribe::from_string(
            "hello/world",
            QoS::AtLeastOnce,
        )));
        eventloop.pending.push_back(Packet::PubRel(PubRel::new(3)));

        eventloop.resume_pending(false);

        // the subscribe goes out against the fresh session, the publish is
        // reported undelivered and the interrupted QoS 2 handshake is gone
        assert_eq!(eventloop.pending.len(), 1);
        assert!(matches!(eventloop.pending[0], Packet::Subscribe(_)));
        assert_eq!(
            eventloop.state.get_event(),
            Some(Event::Undelivered(Publish::new(
                "hello/world",
                QoS::AtLeastOnce,
                vec![7]
            )))
        );
        assert_eq!(eventloop.state.get_event(), None);
    }

    #[test]
    fn kept_session_leaves_pending_untouched() {
        let options = OptionBuilder::new_tcp("localhost", 1883).finalize();
        let (mut eventloop, _tx) = EventLoop::<V4>::new(options, 10);

        let mut inflight = Publish::new("hello/world", QoS::AtLeastOnce, vec![7]);
        inflight.pkid = 2;
        inflight.dup = true;
        eventloop.pending.push_back(Packet::Publish(inflight));
        eventloop.pending.push_back(Packet::PubRel(PubRel::new(3)));

        eventloop.resume_pending(true);

        assert_eq!(eventloop.pending.len(), 2);
        assert_eq!(eventloop.state.get_event(), None);
    }

    #[test]
    fn errors_map_to_disconnect_reasons() {
        let refused = ConnectionError::ConnectionRefused(ConnectReasonCode::NotAuthorized);
        assert_eq!(classify(&refused), DisconnectReason::ConnectRefused);

        let aborted = ConnectionError::MqttState(StateError::ConnectionAborted);
        assert_eq!(classify(&aborted), DisconnectReason::Transport);

        let unexpected = ConnectionError::NotConnAck(Packet::PingReq(wren_bytes::PingReq));
        assert_eq!(classify(&unexpected), DisconnectReason::ProtocolError);

        assert_eq!(
            classify(&ConnectionError::RequestsDone),
            DisconnectReason::Graceful
        );
    }

    #[test]
    fn status_transitions_are_observable() {
        let options = OptionBuilder::new_tcp("localhost", 1883)
            .reconnect(ReconnectOptions::default().enabled(true))
            .finalize();
        let (mut eventloop, _tx) = EventLoop::<V4>::new(options, 10);
        let updates = eventloop.status_updates();

        eventloop.set_status(ConnectionStatus::Connecting, None);
        eventloop.set_status(
            ConnectionStatus::ReconnectWait,
            Some(DisconnectReason::Transport),
        );

        assert_eq!(
            updates.try_recv().unwrap(),
            StatusUpdate {
                status: ConnectionStatus::Connecting,
                reason: None
            }
        );
        assert_eq!(
            updates.try_recv().unwrap(),
            StatusUpdate {
                status: ConnectionStatus::ReconnectWait,
                reason: Some(DisconnectReason::Transport)
            }
        );
        assert_eq!(eventloop.status(), ConnectionStatus::ReconnectWait);
    }
}
