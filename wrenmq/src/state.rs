use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use fixedbitset::FixedBitSet;
use wren_bytes::{
    ConnAck, ConnectReasonCode, Disconnect, DisconnectReasonCode, PingReq, PubAck,
    PubAckReasonCode, PubComp, PubCompReasonCode, PubRec, PubRecReasonCode, PubRel,
    PubRelReasonCode, Publish, SubAck, Subscribe, SubscribeReasonCode, UnsubAck, Unsubscribe,
    UnsubscribeReasonCode,
};
use wren_bytes::{Property, QoS};

use crate::{Event, Outgoing, Packet};

/// Errors during state handling
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Received an ack for a packet identifier that is not in flight
    #[error("Received unsolicited ack pkid: {0}")]
    Unsolicited(u16),
    /// Last pingreq isn't acked
    #[error("Last pingreq isn't acked")]
    AwaitPingResp,
    /// A parked publish was not unblocked by an acknowledgement in time
    #[error("No packet identifier was freed while a publish was parked")]
    AwaitAckTimeout,
    /// Every packet identifier is allocated
    #[error("All packet identifiers are in use")]
    PkidExhausted,
    /// Received a packet the client side of the protocol never expects
    #[error("Received an unexpected packet")]
    WrongPacket,
    #[error("A Subscribe packet must contain atleast one filter")]
    EmptySubscription,
    #[error("Mqtt serialization/deserialization error: {0}")]
    Deserialization(#[from] wren_bytes::Error),
    #[error("Cannot use topic alias '{alias:?}': greater than broker maximum '{max:?}'")]
    InvalidAlias { alias: u16, max: u16 },
    #[error("Server sent disconnect with reason `{reason_string:?}` and code '{reason_code:?}'")]
    ServerDisconnect {
        reason_code: DisconnectReasonCode,
        reason_string: Option<String>,
    },
    #[error("Connection failed with reason '{reason:?}'")]
    ConnFail { reason: ConnectReasonCode },
    #[error("Connection closed by peer abruptly")]
    ConnectionAborted,
}

/// An entry in the active subscription set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// The topic filter as sent in the SUBSCRIBE packet
    pub filter: String,
    /// The maximum QoS granted by the broker
    pub qos: QoS,
    /// The subscription identifier, if one was requested
    pub id: Option<u32>,
}

/// State of the mqtt connection.
// Methods only modify the state of the object, they never do network
// operations themselves. The event loop owns exactly one of these per session
// and feeds every incoming and outgoing packet through it.
//
// Outgoing publishes are kept in a slot per packet identifier so that acks
// resolve in O(1) no matter the order the broker sends them in. A separate
// queue remembers first-send order for retransmission after a reconnect.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Client identifier. An empty one may be replaced by the broker
    /// through the AssignedClientIdentifier connack property.
    client_id: String,
    /// Status of last ping
    pub await_pingresp: bool,
    /// Pings sent while a publish was parked waiting for a free identifier.
    /// Multiple pings without an ack freeing an identifier is an error.
    parked_ping_count: usize,
    /// Last incoming packet time
    last_incoming: Instant,
    /// Last outgoing packet time
    last_outgoing: Instant,
    /// Every packet identifier currently allocated and not yet acknowledged
    used_ids: FixedBitSet,
    /// Number of outgoing inflight publishes
    pub(crate) inflight: u16,
    /// Outgoing QoS 1, 2 publishes which aren't acked yet, indexed by pkid
    pub(crate) outgoing_pub: Vec<Option<Publish>>,
    /// Packet ids of released QoS 2 publishes
    pub(crate) outgoing_rel: FixedBitSet,
    /// Packet ids of inflight publishes and releases, in first-send order
    send_order: VecDeque<u16>,
    /// Packet ids of incoming QoS 2 publishes
    pub(crate) incoming_pub: FixedBitSet,
    /// Publishes parked because the inflight window was full
    pub(crate) parked: VecDeque<Publish>,
    /// Buffered events for the event loop to yield
    pub events: VecDeque<Event>,
    /// Indicates if acknowledgements should be sent immediately
    pub manual_acks: bool,
    /// Active subscriptions, keyed by topic filter
    subscriptions: HashMap<String, Subscription>,
    /// Filters and subscription id of SUBSCRIBE packets awaiting their SUBACK
    pending_sub: HashMap<u16, (Vec<wren_bytes::Filter>, Option<u32>)>,
    /// Filters of UNSUBSCRIBE packets awaiting their UNSUBACK
    pending_unsub: HashMap<u16, Vec<String>>,
    /// Map of alias_id->topic
    topic_aliases: HashMap<u16, String>,
    /// `topic_alias_maximum` received via the connack packet
    pub broker_topic_alias_max: u16,
    /// Maximum number of allowed inflight QoS1 & QoS2 requests
    pub(crate) max_outgoing_inflight: u16,
    /// Upper limit on the maximum number of allowed inflight QoS1 & QoS2 requests
    max_outgoing_inflight_upper_limit: u16,
}

impl SessionState {
    /// Creates new session state.
    ///
    /// The same state should be used during a connection for persistent
    /// sessions, while new state should be instantiated for clean sessions.
    pub fn new(client_id: String, max_inflight: u16, manual_acks: bool) -> Self {
        SessionState {
            client_id,
            await_pingresp: false,
            parked_ping_count: 0,
            last_incoming: Instant::now(),
            last_outgoing: Instant::now(),
            used_ids: FixedBitSet::with_capacity(u16::MAX as usize + 1),
            inflight: 0,
            // index 0 is wasted as 0 is not a valid packet id
            outgoing_pub: vec![None; max_inflight as usize + 1],
            outgoing_rel: FixedBitSet::with_capacity(max_inflight as usize + 1),
            send_order: VecDeque::new(),
            incoming_pub: FixedBitSet::with_capacity(u16::MAX as usize + 1),
            parked: VecDeque::new(),
            events: VecDeque::with_capacity(100),
            manual_acks,
            subscriptions: HashMap::new(),
            pending_sub: HashMap::new(),
            pending_unsub: HashMap::new(),
            topic_aliases: HashMap::new(),
            // Set via CONNACK
            broker_topic_alias_max: 0,
            max_outgoing_inflight: max_inflight,
            max_outgoing_inflight_upper_limit: max_inflight,
        }
    }

    /// Consolidates handling of all incoming mqtt packets. Returns the packet
    /// the event loop should put on the network in response, if any.
    /// E.g. for an incoming QoS1 publish, the publish is buffered as an event
    /// for the user and a PubAck is returned for the network.
    pub fn handle_incoming_packet(&mut self, packet: Packet) -> Result<Option<Packet>, StateError> {
        let mut packet = packet;
        let mut deliver = true;
        let outgoing = match &mut packet {
            Packet::PingResp(_) => self.handle_incoming_pingresp()?,
            Packet::Publish(publish) => {
                if publish.qos == QoS::ExactlyOnce
                    && self.incoming_pub.contains(publish.pkid as usize)
                {
                    // Retransmission of a QoS2 publish that is already
                    // recorded. Acknowledge it again but do not deliver it
                    // to the application a second time.
                    log::debug!("Duplicate incoming publish, pkid = {:?}", publish.pkid);
                    deliver = false;
                    if self.manual_acks {
                        None
                    } else {
                        self.outgoing_pubrec(PubRec::new(publish.pkid))?
                    }
                } else {
                    self.handle_incoming_publish(publish)?
                }
            }
            Packet::SubAck(suback) => self.handle_incoming_suback(suback)?,
            Packet::UnsubAck(unsuback) => self.handle_incoming_unsuback(unsuback)?,
            Packet::PubAck(puback) => self.handle_incoming_puback(puback)?,
            Packet::PubRec(pubrec) => self.handle_incoming_pubrec(pubrec)?,
            Packet::PubRel(pubrel) => self.handle_incoming_pubrel(pubrel)?,
            Packet::PubComp(pubcomp) => self.handle_incoming_pubcomp(pubcomp)?,
            Packet::ConnAck(connack) => self.handle_incoming_connack(connack)?,
            Packet::Disconnect(disconn) => self.handle_incoming_disconn(disconn)?,
            _ => {
                log::error!("Invalid incoming packet = {:?}", packet);
                return Err(StateError::WrongPacket);
            }
        };

        if deliver {
            self.events.push_back(Event::Incoming(packet));
        }
        self.last_incoming = Instant::now();
        Ok(outgoing)
    }

    /// Consolidates handling of all outgoing mqtt packet logic. Returns a
    /// packet which should be put on to the network by the eventloop.
    pub fn handle_outgoing_packet(
        &mut self,
        request: Packet,
    ) -> Result<Option<Packet>, StateError> {
        let packet = match request {
            Packet::Publish(publish) => self.outgoing_publish(publish)?,
            Packet::PubRel(pubrel) => self.outgoing_pubrel(pubrel)?,
            Packet::Subscribe(subscribe) => self.outgoing_subscribe(subscribe)?,
            Packet::Unsubscribe(unsubscribe) => self.outgoing_unsubscribe(unsubscribe)?,
            Packet::PingReq(_) => self.outgoing_ping()?,
            Packet::Disconnect(disconnect) => self.outgoing_disconnect(disconnect)?,
            Packet::PubAck(puback) => self.outgoing_puback(puback)?,
            Packet::PubRec(pubrec) => self.outgoing_pubrec(pubrec)?,
            _ => return Err(StateError::WrongPacket),
        };

        self.last_outgoing = Instant::now();
        Ok(packet)
    }

    /// Drains every unacknowledged outgoing packet for retransmission, in
    /// first-send order. Publishes that already went out once get the DUP
    /// flag; releases follow their position in the original send order.
    ///
    /// Clears all inflight bookkeeping. The caller queues the result ahead
    /// of any new application request.
    pub fn take_retransmission(&mut self) -> Vec<Packet> {
        let mut pending = Vec::with_capacity(self.send_order.len() + 1);
        for pkid in self.send_order.drain(..) {
            if let Some(mut publish) = self.outgoing_pub[pkid as usize].take() {
                publish.dup = true;
                pending.push(Packet::Publish(publish));
            } else if self.outgoing_rel.contains(pkid as usize) {
                pending.push(Packet::PubRel(PubRel::new(pkid)));
            }
        }
        self.outgoing_rel.clear();

        // Parked publishes never went on the wire. Send them as new.
        for mut publish in self.parked.drain(..) {
            publish.pkid = 0;
            pending.push(Packet::Publish(publish));
        }

        // forget packet ids of incoming qos2 publishes
        self.incoming_pub.clear();

        self.used_ids.clear();
        self.await_pingresp = false;
        self.parked_ping_count = 0;
        self.inflight = 0;
        pending
    }

    /// Get the next event to be processed by the event loop.
    pub fn get_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Is a publish parked waiting for an acknowledgement to free a packet
    /// identifier? New requests are held back until it is sent.
    pub fn has_parked(&self) -> bool {
        !self.parked.is_empty()
    }

    /// Number of outgoing inflight publish packets.
    pub fn inflight(&self) -> u16 {
        self.inflight
    }

    /// The client identifier in use for this session.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The currently active subscriptions, keyed by topic filter.
    pub fn subscriptions(&self) -> &HashMap<String, Subscription> {
        &self.subscriptions
    }

    fn handle_protocol_error(&mut self) -> Result<Option<Packet>, StateError> {
        // send DISCONNECT packet with REASON_CODE 0x82
        self.outgoing_disconnect(Disconnect {
            reason_code: DisconnectReasonCode::ProtocolError,
            properties: wren_bytes::Properties::new(),
        })
    }

    fn handle_incoming_suback(
        &mut self,
        suback: &mut SubAck,
    ) -> Result<Option<Packet>, StateError> {
        let Some((filters, id)) = self.pending_sub.remove(&suback.pkid) else {
            log::error!("Unsolicited suback packet: {:?}", suback.pkid);
            return Err(StateError::Unsolicited(suback.pkid));
        };
        self.release_pkid(suback.pkid);
        for (filter, reason) in filters.into_iter().zip(suback.reason_codes.iter()) {
            match reason {
                SubscribeReasonCode::Success(qos) => {
                    log::debug!("SubAck Pkid = {:?}, QoS = {:?}", suback.pkid, qos);
                    self.subscriptions.insert(
                        filter.path.clone(),
                        Subscription {
                            filter: filter.path,
                            qos: *qos,
                            id,
                        },
                    );
                }
                _ => {
                    log::warn!("SubAck Pkid = {:?}, Reason = {:?}", suback.pkid, reason);
                }
            }
        }
        Ok(None)
    }

    fn handle_incoming_unsuback(
        &mut self,
        unsuback: &mut UnsubAck,
    ) -> Result<Option<Packet>, StateError> {
        let Some(filters) = self.pending_unsub.remove(&unsuback.pkid) else {
            log::error!("Unsolicited unsuback packet: {:?}", unsuback.pkid);
            return Err(StateError::Unsolicited(unsuback.pkid));
        };
        self.release_pkid(unsuback.pkid);

        if unsuback.reason_codes.is_empty() {
            // Protocol version 4 carries no reason codes
            for filter in filters {
                self.subscriptions.remove(&filter);
            }
            return Ok(None);
        }

        for (filter, reason) in filters.into_iter().zip(unsuback.reason_codes.iter()) {
            if reason == &UnsubscribeReasonCode::Success {
                self.subscriptions.remove(&filter);
            } else {
                log::warn!("UnsubAck Pkid = {:?}, Reason = {:?}", unsuback.pkid, reason);
            }
        }
        Ok(None)
    }

    fn handle_incoming_connack(
        &mut self,
        connack: &mut ConnAck,
    ) -> Result<Option<Packet>, StateError> {
        if !connack.code.is_success() {
            return Err(StateError::ConnFail {
                reason: connack.code,
            });
        }

        if !connack.session_present {
            // the broker discarded the session, subscriptions are gone
            self.subscriptions.clear();
            self.topic_aliases.clear();
        }

        for property in &connack.properties {
            match property {
                Property::TopicAliasMaximum(max) => {
                    self.broker_topic_alias_max = *max;
                }
                Property::ReceiveMaximum(max) => {
                    self.max_outgoing_inflight =
                        (*max).min(self.max_outgoing_inflight_upper_limit);
                }
                Property::AssignedClientIdentifier(assigned) => {
                    if self.client_id.is_empty() {
                        log::debug!("Server assigned client id {assigned}");
                        assigned.clone_into(&mut self.client_id);
                    }
                }
                _ => {}
            }
        }
        Ok(None)
    }

    fn handle_incoming_disconn(
        &mut self,
        disconn: &mut Disconnect,
    ) -> Result<Option<Packet>, StateError> {
        let mut reason_string = None;
        for prop in &disconn.properties {
            if let Property::ReasonString(reason) = prop {
                reason_string = Some(reason.clone());
            }
        }
        Err(StateError::ServerDisconnect {
            reason_code: disconn.reason_code,
            reason_string,
        })
    }

    /// Results in a publish notification in all the QoS cases.
    ///
    /// Replies with a puback in case of QoS1 and replies with a pubrec in
    /// case of QoS2 while also recording the packet identifier.
    fn handle_incoming_publish(
        &mut self,
        publish: &mut Publish,
    ) -> Result<Option<Packet>, StateError> {
        for property in &publish.properties {
            // handle topic alias
            if let Property::TopicAlias(alias) = property {
                if !publish.topic.is_empty() {
                    self.topic_aliases.insert(*alias, publish.topic.clone());
                } else if let Some(topic) = self.topic_aliases.get(alias) {
                    topic.clone_into(&mut publish.topic);
                } else {
                    return self.handle_protocol_error();
                };
            }
        }

        match publish.qos {
            QoS::AtMostOnce => (),
            QoS::AtLeastOnce => {
                if !self.manual_acks {
                    let puback = PubAck::new(publish.pkid);
                    return self.outgoing_puback(puback);
                }
            }
            QoS::ExactlyOnce => {
                let pkid = publish.pkid;
                self.incoming_pub.insert(pkid as usize);

                if !self.manual_acks {
                    let pubrec = PubRec::new(pkid);
                    return self.outgoing_pubrec(pubrec);
                }
            }
        }
        Ok(None)
    }

    fn handle_incoming_puback(&mut self, puback: &PubAck) -> Result<Option<Packet>, StateError> {
        match self.outgoing_pub.get_mut(puback.pkid as usize) {
            Some(p) if p.is_some() => p.take(),
            _ => {
                log::error!("Unsolicited puback packet: {:?}", puback.pkid);
                return Err(StateError::Unsolicited(puback.pkid));
            }
        };

        self.settle(puback.pkid);

        if puback.reason != PubAckReasonCode::Success
            && puback.reason != PubAckReasonCode::NoMatchingSubscribers
        {
            log::warn!(
                "PubAck Pkid = {:?}, reason: {:?}",
                puback.pkid,
                puback.reason
            );
            return Ok(None);
        }

        Ok(self.unpark())
    }

    fn handle_incoming_pubrec(&mut self, pubrec: &PubRec) -> Result<Option<Packet>, StateError> {
        match self.outgoing_pub.get_mut(pubrec.pkid as usize) {
            Some(p) if p.is_some() => p.take(),
            _ => {
                log::error!("Unsolicited pubrec packet: {:?}", pubrec.pkid);
                return Err(StateError::Unsolicited(pubrec.pkid));
            }
        };

        if pubrec.reason != PubRecReasonCode::Success
            && pubrec.reason != PubRecReasonCode::NoMatchingSubscribers
        {
            log::warn!(
                "PubRec Pkid = {:?}, reason: {:?}",
                pubrec.pkid,
                pubrec.reason
            );
            // The broker will not complete this delivery, the id is free again
            self.settle(pubrec.pkid);
            return Ok(None);
        }

        // The identifier stays allocated until pubcomp, and keeps its place
        // in the send order so a reconnect retransmits the pubrel correctly.
        self.outgoing_rel.insert(pubrec.pkid as usize);
        let event = Event::Outgoing(Outgoing::PubRel(pubrec.pkid));
        self.events.push_back(event);

        Ok(Some(Packet::PubRel(PubRel::new(pubrec.pkid))))
    }

    fn handle_incoming_pubrel(&mut self, pubrel: &PubRel) -> Result<Option<Packet>, StateError> {
        if !self.incoming_pub.contains(pubrel.pkid as usize) {
            log::error!("Unsolicited pubrel packet: {:?}", pubrel.pkid);
            return Err(StateError::Unsolicited(pubrel.pkid));
        }
        self.incoming_pub.set(pubrel.pkid as usize, false);

        if pubrel.reason != PubRelReasonCode::Success {
            log::warn!(
                "PubRel Pkid = {:?}, reason: {:?}",
                pubrel.pkid,
                pubrel.reason
            );
            return Ok(None);
        }

        let event = Event::Outgoing(Outgoing::PubComp(pubrel.pkid));
        self.events.push_back(event);

        Ok(Some(Packet::PubComp(PubComp::new(pubrel.pkid))))
    }

    fn handle_incoming_pubcomp(&mut self, pubcomp: &PubComp) -> Result<Option<Packet>, StateError> {
        if !self.outgoing_rel.contains(pubcomp.pkid as usize) {
            log::error!("Unsolicited pubcomp packet: {:?}", pubcomp.pkid);
            return Err(StateError::Unsolicited(pubcomp.pkid));
        }
        self.outgoing_rel.set(pubcomp.pkid as usize, false);
        self.settle(pubcomp.pkid);

        if pubcomp.reason != PubCompReasonCode::Success {
            log::warn!(
                "PubComp Pkid = {:?}, reason: {:?}",
                pubcomp.pkid,
                pubcomp.reason
            );
            return Ok(None);
        }

        Ok(self.unpark())
    }

    fn handle_incoming_pingresp(&mut self) -> Result<Option<Packet>, StateError> {
        self.await_pingresp = false;
        Ok(None)
    }

    /// Allocates a packet identifier to QoS 1 and 2 publish packets and
    /// returns the publish wrapped in [Packet]. When no identifier in the
    /// inflight window is free, the publish is parked instead, which holds
    /// back further requests until an acknowledgement arrives.
    fn outgoing_publish(&mut self, mut publish: Publish) -> Result<Option<Packet>, StateError> {
        if publish.qos != QoS::AtMostOnce {
            if publish.pkid == 0 {
                match self.alloc_pkid(self.max_outgoing_inflight) {
                    Some(pkid) => publish.pkid = pkid,
                    None => {
                        log::info!("Inflight window full, parking publish");
                        self.parked.push_back(publish);
                        let event = Event::Outgoing(Outgoing::AwaitAck);
                        self.events.push_back(event);
                        return Ok(None);
                    }
                }
            } else {
                // Retransmission of a publish from a previous connection.
                // It keeps the identifier it first went out with.
                self.used_ids.insert(publish.pkid as usize);
            }

            self.outgoing_pub[publish.pkid as usize] = Some(publish.clone());
            self.send_order.push_back(publish.pkid);
            self.inflight += 1;
        };

        log::debug!(
            "Publish. Topic = {}, Pkid = {:?}, Payload Size = {:?}",
            publish.topic,
            publish.pkid,
            publish.payload.len()
        );

        for property in &publish.properties {
            if let Property::TopicAlias(alias) = property {
                if *alias > self.broker_topic_alias_max {
                    // We MUST NOT send a Topic Alias that is greater than the
                    // broker's Topic Alias Maximum.
                    return Err(StateError::InvalidAlias {
                        alias: *alias,
                        max: self.broker_topic_alias_max,
                    });
                }
            }
        }

        let event = Event::Outgoing(Outgoing::Publish(publish.pkid));
        self.events.push_back(event);

        Ok(Some(Packet::Publish(publish)))
    }

    /// Only reached for pubrel retransmission after a reconnect. The
    /// identifier was allocated in the previous connection.
    fn outgoing_pubrel(&mut self, pubrel: PubRel) -> Result<Option<Packet>, StateError> {
        self.used_ids.insert(pubrel.pkid as usize);
        self.outgoing_rel.insert(pubrel.pkid as usize);
        self.send_order.push_back(pubrel.pkid);
        self.inflight += 1;

        log::debug!("Pubrel. Pkid = {}", pubrel.pkid);

        let event = Event::Outgoing(Outgoing::PubRel(pubrel.pkid));
        self.events.push_back(event);

        Ok(Some(Packet::PubRel(pubrel)))
    }

    fn outgoing_puback(&mut self, puback: PubAck) -> Result<Option<Packet>, StateError> {
        let event = Event::Outgoing(Outgoing::PubAck(puback.pkid));
        self.events.push_back(event);

        Ok(Some(Packet::PubAck(puback)))
    }

    fn outgoing_pubrec(&mut self, pubrec: PubRec) -> Result<Option<Packet>, StateError> {
        let event = Event::Outgoing(Outgoing::PubRec(pubrec.pkid));
        self.events.push_back(event);

        Ok(Some(Packet::PubRec(pubrec)))
    }

    /// Check when the last control packet/pingreq packet was received and
    /// return the status which tells if keep alive time has exceeded.
    /// NOTE: status will be checked for zero keepalive times also
    fn outgoing_ping(&mut self) -> Result<Option<Packet>, StateError> {
        let elapsed_in = self.last_incoming.elapsed();
        let elapsed_out = self.last_outgoing.elapsed();

        if !self.parked.is_empty() {
            self.parked_ping_count += 1;
            if self.parked_ping_count >= 2 {
                return Err(StateError::AwaitAckTimeout);
            }
        }

        // raise error if last ping didn't receive ack
        if self.await_pingresp {
            return Err(StateError::AwaitPingResp);
        }

        self.await_pingresp = true;

        log::debug!(
            "Pingreq, last incoming packet before {:?}, last outgoing request before {:?}",
            elapsed_in,
            elapsed_out,
        );

        let event = Event::Outgoing(Outgoing::PingReq);
        self.events.push_back(event);

        Ok(Some(Packet::PingReq(PingReq)))
    }

    fn outgoing_subscribe(
        &mut self,
        mut subscription: Subscribe,
    ) -> Result<Option<Packet>, StateError> {
        if subscription.filters.is_empty() {
            return Err(StateError::EmptySubscription);
        }

        // Subscriptions are not flow controlled, they may use identifiers
        // beyond the publish inflight window.
        let Some(pkid) = self.alloc_pkid(u16::MAX) else {
            return Err(StateError::PkidExhausted);
        };
        subscription.pkid = pkid;
        let id = subscription_identifier(&subscription.properties);
        self.pending_sub
            .insert(pkid, (subscription.filters.clone(), id));

        log::debug!(
            "Subscribe. Topics = {:?}, Pkid = {:?}",
            subscription.filters,
            subscription.pkid
        );

        let event = Event::Outgoing(Outgoing::Subscribe(subscription.pkid));
        self.events.push_back(event);

        Ok(Some(Packet::Subscribe(subscription)))
    }

    fn outgoing_unsubscribe(
        &mut self,
        mut unsub: Unsubscribe,
    ) -> Result<Option<Packet>, StateError> {
        let Some(pkid) = self.alloc_pkid(u16::MAX) else {
            return Err(StateError::PkidExhausted);
        };
        unsub.pkid = pkid;
        self.pending_unsub.insert(pkid, unsub.filters.clone());

        log::debug!(
            "Unsubscribe. Topics = {:?}, Pkid = {:?}",
            unsub.filters,
            unsub.pkid
        );

        let event = Event::Outgoing(Outgoing::Unsubscribe(unsub.pkid));
        self.events.push_back(event);

        Ok(Some(Packet::Unsubscribe(unsub)))
    }

    fn outgoing_disconnect(
        &mut self,
        disconnect: Disconnect,
    ) -> Result<Option<Packet>, StateError> {
        log::debug!("Disconnect with reason {:?}", disconnect.reason_code);
        let event = Event::Outgoing(Outgoing::Disconnect);
        self.events.push_back(event);

        Ok(Some(Packet::Disconnect(disconnect)))
    }

    /// The smallest non-zero packet identifier that is not currently in use,
    /// up to and including `limit`.
    fn alloc_pkid(&mut self, limit: u16) -> Option<u16> {
        for pkid in 1..=limit {
            if !self.used_ids.contains(pkid as usize) {
                self.used_ids.insert(pkid as usize);
                return Some(pkid);
            }
        }
        None
    }

    fn release_pkid(&mut self, pkid: u16) {
        self.used_ids.set(pkid as usize, false);
    }

    /// An outgoing publish was fully acknowledged. Frees the identifier and
    /// drops its retransmission slot.
    fn settle(&mut self, pkid: u16) {
        self.release_pkid(pkid);
        self.send_order.retain(|&id| id != pkid);
        self.inflight -= 1;
    }

    /// Sends the oldest parked publish if an identifier is free again.
    fn unpark(&mut self) -> Option<Packet> {
        let mut publish = self.parked.pop_front()?;
        let Some(pkid) = self.alloc_pkid(self.max_outgoing_inflight) else {
            self.parked.push_front(publish);
            return None;
        };

        publish.pkid = pkid;
        self.outgoing_pub[pkid as usize] = Some(publish.clone());
        self.send_order.push_back(pkid);
        self.inflight += 1;
        self.parked_ping_count = 0;

        let event = Event::Outgoing(Outgoing::Publish(pkid));
        self.events.push_back(event);

        Some(Packet::Publish(publish))
    }
}

fn subscription_identifier(properties: &wren_bytes::Properties) -> Option<u32> {
    properties.iter().find_map(|p| match p {
        Property::SubscriptionIdentifier(id) => Some(u32::from(*id)),
        _ => None,
    })
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::Request;

    fn build_outgoing_publish(qos: QoS) -> Publish {
        let topic = "hello/world".to_owned();
        let payload = vec![1, 2, 3];

        let mut publish = Publish::new(topic, QoS::AtLeastOnce, payload);
        publish.qos = qos;
        publish
    }

    fn build_incoming_publish(qos: QoS, pkid: u16) -> Publish {
        let topic = "hello/world".to_owned();
        let payload = vec![1, 2, 3];

        let mut publish = Publish::new(topic, QoS::AtLeastOnce, payload);
        publish.pkid = pkid;
        publish.qos = qos;
        publish
    }

    fn build_state() -> SessionState {
        SessionState::new("test-client".to_owned(), u16::MAX, false)
    }

    #[test]
    fn pkid_allocation_picks_smallest_free_id() {
        let mut session = build_state();

        for expected in 1..=5u16 {
            let publish = build_outgoing_publish(QoS::AtLeastOnce);
            match session.outgoing_publish(publish).unwrap().unwrap() {
                Packet::Publish(publish) => assert_eq!(publish.pkid, expected),
                packet => panic!("Invalid network request: {:?}", packet),
            }
        }

        // freeing the middle id makes it the next one handed out
        session
            .handle_incoming_packet(Packet::PubAck(PubAck::new(3)))
            .unwrap();

        let publish = build_outgoing_publish(QoS::AtLeastOnce);
        match session.outgoing_publish(publish).unwrap().unwrap() {
            Packet::Publish(publish) => assert_eq!(publish.pkid, 3),
            packet => panic!("Invalid network request: {:?}", packet),
        }
    }

    #[test]
    fn outgoing_publish_should_set_pkid_and_add_publish_to_queue() {
        let mut session = build_state();

        // QoS 0 publish shouldn't be saved in queue
        let publish = build_outgoing_publish(QoS::AtMostOnce);
        session.outgoing_publish(publish).unwrap();
        assert_eq!(session.inflight, 0);

        // QoS 1 publish gets an id and is saved in the queue
        let publish = build_outgoing_publish(QoS::AtLeastOnce);
        session.outgoing_publish(publish.clone()).unwrap();
        assert_eq!(session.inflight, 1);
        assert!(session.outgoing_pub[1].is_some());

        session.outgoing_publish(publish).unwrap();
        assert_eq!(session.inflight, 2);
        assert!(session.outgoing_pub[2].is_some());

        // QoS 2 publishes work the same
        let publish = build_outgoing_publish(QoS::ExactlyOnce);
        session.outgoing_publish(publish.clone()).unwrap();
        assert_eq!(session.inflight, 3);

        session.outgoing_publish(publish).unwrap();
        assert_eq!(session.inflight, 4);
    }

    #[test]
    fn full_inflight_window_parks_the_publish() {
        let mut session = SessionState::new("test-client".to_owned(), 2, false);
        let publish = build_outgoing_publish(QoS::AtLeastOnce);

        assert!(session.outgoing_publish(publish.clone()).unwrap().is_some());
        assert!(session.outgoing_publish(publish.clone()).unwrap().is_some());
        assert_eq!(session.inflight, 2);

        // window full, the third publish is parked rather than sent
        assert!(session.outgoing_publish(publish.clone()).unwrap().is_none());
        assert!(session.has_parked());
        assert_eq!(session.inflight, 2);

        // an ack frees id 1 and releases the parked publish with it
        let out = session
            .handle_incoming_packet(Packet::PubAck(PubAck::new(1)))
            .unwrap();
        match out.unwrap() {
            Packet::Publish(publish) => assert_eq!(publish.pkid, 1),
            packet => panic!("Invalid network request: {:?}", packet),
        }
        assert!(!session.has_parked());
        assert_eq!(session.inflight, 2);
    }

    #[test]
    fn retransmission_keeps_first_send_order_and_sets_dup() {
        let mut session = build_state();

        for _ in 0..3 {
            let publish = build_outgoing_publish(QoS::AtLeastOnce);
            session.outgoing_publish(publish).unwrap();
        }
        let publish = build_outgoing_publish(QoS::ExactlyOnce);
        session.outgoing_publish(publish).unwrap();

        // ack the second publish, move the fourth into the release phase
        session
            .handle_incoming_packet(Packet::PubAck(PubAck::new(2)))
            .unwrap();
        session
            .handle_incoming_packet(Packet::PubRec(PubRec::new(4)))
            .unwrap();

        let pending = session.take_retransmission();
        let summary: Vec<_> = pending
            .iter()
            .map(|packet| match packet {
                Packet::Publish(p) => ("publish", p.pkid, p.dup),
                Packet::PubRel(p) => ("pubrel", p.pkid, false),
                packet => panic!("Invalid pending packet: {:?}", packet),
            })
            .collect();

        assert_eq!(
            summary,
            vec![("publish", 1, true), ("publish", 3, true), ("pubrel", 4, false)]
        );
        assert_eq!(session.inflight, 0);
    }

    #[test]
    fn retransmitted_publish_keeps_its_packet_id() {
        let mut session = build_state();

        let publish = build_outgoing_publish(QoS::AtLeastOnce);
        session.outgoing_publish(publish).unwrap();

        let pending = session.take_retransmission();
        assert_eq!(pending.len(), 1);

        // replay through the outgoing path, as the event loop does
        for packet in pending {
            session.handle_outgoing_packet(packet).unwrap();
        }
        let publish = session.outgoing_pub[1].as_ref().unwrap();
        assert_eq!(publish.pkid, 1);
        assert!(publish.dup);
    }

    #[test]
    fn incoming_publish_should_be_added_to_queue_correctly() {
        let mut session = build_state();

        // QoS0, 1, 2 Publishes
        let mut publish1 = build_incoming_publish(QoS::AtMostOnce, 1);
        let mut publish2 = build_incoming_publish(QoS::AtLeastOnce, 2);
        let mut publish3 = build_incoming_publish(QoS::ExactlyOnce, 3);

        session.handle_incoming_publish(&mut publish1).unwrap();
        session.handle_incoming_publish(&mut publish2).unwrap();
        session.handle_incoming_publish(&mut publish3).unwrap();

        // only qos2 publish should be added to queue
        assert!(session.incoming_pub.contains(3));
    }

    #[test]
    fn incoming_publish_should_be_acked() {
        let mut session = build_state();

        // QoS0, 1, 2 Publishes
        let mut publish1 = build_incoming_publish(QoS::AtMostOnce, 1);
        let mut publish2 = build_incoming_publish(QoS::AtLeastOnce, 2);
        let mut publish3 = build_incoming_publish(QoS::ExactlyOnce, 3);

        session.handle_incoming_publish(&mut publish1).unwrap();
        session.handle_incoming_publish(&mut publish2).unwrap();
        session.handle_incoming_publish(&mut publish3).unwrap();

        if let Event::Outgoing(Outgoing::PubAck(pkid)) = session.events[0] {
            assert_eq!(pkid, 2);
        } else {
            panic!("missing puback");
        }

        if let Event::Outgoing(Outgoing::PubRec(pkid)) = session.events[1] {
            assert_eq!(pkid, 3);
        } else {
            panic!("missing PubRec");
        }
    }

    #[test]
    fn incoming_publish_should_not_be_acked_with_manual_acks() {
        let mut session = build_state();
        session.manual_acks = true;

        // QoS0, 1, 2 Publishes
        let mut publish1 = build_incoming_publish(QoS::AtMostOnce, 1);
        let mut publish2 = build_incoming_publish(QoS::AtLeastOnce, 2);
        let mut publish3 = build_incoming_publish(QoS::ExactlyOnce, 3);

        session.handle_incoming_publish(&mut publish1).unwrap();
        session.handle_incoming_publish(&mut publish2).unwrap();
        session.handle_incoming_publish(&mut publish3).unwrap();

        assert!(session.incoming_pub.contains(3));
        assert!(session.events.is_empty());
    }

    #[test]
    fn duplicate_qos2_publish_is_acked_but_not_redelivered() {
        let mut session = build_state();

        let publish = build_incoming_publish(QoS::ExactlyOnce, 1);
        let out = session
            .handle_incoming_packet(Packet::Publish(publish.clone()))
            .unwrap();
        assert!(matches!(out, Some(Packet::PubRec(_))));
        assert!(matches!(
            session.get_event(),
            Some(Event::Outgoing(Outgoing::PubRec(1)))
        ));
        assert!(matches!(
            session.get_event(),
            Some(Event::Incoming(Packet::Publish(_)))
        ));

        // retransmission of the same pkid before pubrel
        let mut dup = publish;
        dup.dup = true;
        let out = session
            .handle_incoming_packet(Packet::Publish(dup))
            .unwrap();
        assert!(matches!(out, Some(Packet::PubRec(_))));

        // re-acked, but the application sees no second publish event
        assert!(matches!(
            session.get_event(),
            Some(Event::Outgoing(Outgoing::PubRec(1)))
        ));
        assert_eq!(session.get_event(), None);
    }

    #[test]
    fn incoming_puback_should_remove_correct_publish_from_queue() {
        let mut session = build_state();

        let publish1 = build_outgoing_publish(QoS::AtLeastOnce);
        let publish2 = build_outgoing_publish(QoS::ExactlyOnce);

        session.outgoing_publish(publish1).unwrap();
        session.outgoing_publish(publish2).unwrap();
        assert_eq!(session.inflight, 2);

        session.handle_incoming_puback(&PubAck::new(1)).unwrap();
        assert_eq!(session.inflight, 1);

        session.handle_incoming_puback(&PubAck::new(2)).unwrap();
        assert_eq!(session.inflight, 0);

        assert!(session.outgoing_pub[1].is_none());
        assert!(session.outgoing_pub[2].is_none());
    }

    #[test]
    fn unsolicited_puback_is_an_error() {
        let mut session = build_state();

        let got = session.handle_incoming_puback(&PubAck::new(101)).unwrap_err();

        match got {
            StateError::Unsolicited(pkid) => assert_eq!(pkid, 101),
            e => panic!("Unexpected error: {}", e),
        }
    }

    #[test]
    fn incoming_pubrec_should_release_publish_from_queue_and_add_relid_to_rel_queue() {
        let mut session = build_state();

        let publish1 = build_outgoing_publish(QoS::AtLeastOnce);
        let publish2 = build_outgoing_publish(QoS::ExactlyOnce);

        let _publish_out = session.outgoing_publish(publish1);
        let _publish_out = session.outgoing_publish(publish2);

        session.handle_incoming_pubrec(&PubRec::new(2)).unwrap();
        assert_eq!(session.inflight, 2);

        // check if the remaining element's pkid is 1
        let backup = session.outgoing_pub[1].clone();
        assert_eq!(backup.unwrap().pkid, 1);

        // check if the qos2 element's release pkid is 2
        assert!(session.outgoing_rel.contains(2));
    }

    #[test]
    fn incoming_pubrec_should_send_release_to_network_and_nothing_to_user() {
        let mut session = build_state();

        let publish = build_outgoing_publish(QoS::ExactlyOnce);
        match session.outgoing_publish(publish).unwrap().unwrap() {
            Packet::Publish(publish) => assert_eq!(publish.pkid, 1),
            packet => panic!("Invalid network request: {:?}", packet),
        }

        match session
            .handle_incoming_pubrec(&PubRec::new(1))
            .unwrap()
            .unwrap()
        {
            Packet::PubRel(pubrel) => assert_eq!(pubrel.pkid, 1),
            packet => panic!("Invalid network request: {:?}", packet),
        }
    }

    #[test]
    fn incoming_pubrel_should_send_comp_to_network_and_nothing_to_user() {
        let mut session = build_state();
        let mut publish = build_incoming_publish(QoS::ExactlyOnce, 1);

        match session.handle_incoming_publish(&mut publish).unwrap().unwrap() {
            Packet::PubRec(pubrec) => assert_eq!(pubrec.pkid, 1),
            packet => panic!("Invalid network request: {:?}", packet),
        }

        match session
            .handle_incoming_pubrel(&PubRel::new(1))
            .unwrap()
            .unwrap()
        {
            Packet::PubComp(pubcomp) => assert_eq!(pubcomp.pkid, 1),
            packet => panic!("Invalid network request: {:?}", packet),
        }
    }

    #[test]
    fn incoming_pubcomp_frees_the_packet_id() {
        let mut session = build_state();
        let publish = build_outgoing_publish(QoS::ExactlyOnce);

        session.outgoing_publish(publish).unwrap();
        session.handle_incoming_pubrec(&PubRec::new(1)).unwrap();

        session.handle_incoming_pubcomp(&PubComp::new(1)).unwrap();
        assert_eq!(session.inflight, 0);

        // the identifier can be allocated again
        let publish = build_outgoing_publish(QoS::AtLeastOnce);
        match session.outgoing_publish(publish).unwrap().unwrap() {
            Packet::Publish(publish) => assert_eq!(publish.pkid, 1),
            packet => panic!("Invalid network request: {:?}", packet),
        }
    }

    #[test]
    fn suback_records_the_granted_subscription() {
        let mut session = build_state();

        let subscribe = Subscribe::from_string("hello/+", QoS::AtLeastOnce);
        let out = session
            .handle_outgoing_packet(Packet::Subscribe(subscribe))
            .unwrap();
        let pkid = match out.unwrap() {
            Packet::Subscribe(subscribe) => subscribe.pkid,
            packet => panic!("Invalid network request: {:?}", packet),
        };

        let suback = SubAck::new(pkid, vec![SubscribeReasonCode::Success(QoS::AtLeastOnce)]);
        session
            .handle_incoming_packet(Packet::SubAck(suback))
            .unwrap();

        let subscription = session.subscriptions().get("hello/+").unwrap();
        assert_eq!(subscription.qos, QoS::AtLeastOnce);
    }

    #[test]
    fn unsuback_removes_the_subscription() {
        let mut session = build_state();

        let subscribe = Subscribe::from_string("hello/+", QoS::AtLeastOnce);
        let out = session
            .handle_outgoing_packet(Packet::Subscribe(subscribe))
            .unwrap();
        let pkid = match out.unwrap() {
            Packet::Subscribe(subscribe) => subscribe.pkid,
            packet => panic!("Invalid network request: {:?}", packet),
        };
        let suback = SubAck::new(pkid, vec![SubscribeReasonCode::Success(QoS::AtLeastOnce)]);
        session
            .handle_incoming_packet(Packet::SubAck(suback))
            .unwrap();

        let unsubscribe = Unsubscribe::new("hello/+");
        let out = session
            .handle_outgoing_packet(Packet::Unsubscribe(unsubscribe))
            .unwrap();
        let pkid = match out.unwrap() {
            Packet::Unsubscribe(unsubscribe) => unsubscribe.pkid,
            packet => panic!("Invalid network request: {:?}", packet),
        };

        // v4 unsuback without reason codes
        session
            .handle_incoming_packet(Packet::UnsubAck(UnsubAck::new(pkid)))
            .unwrap();
        assert!(session.subscriptions().is_empty());
    }

    #[test]
    fn outgoing_ping_handle_should_throw_errors_for_no_pingresp() {
        let mut session = build_state();
        session.outgoing_ping().unwrap();

        // network activity other than pingresp
        let publish = build_outgoing_publish(QoS::AtLeastOnce);
        session
            .handle_outgoing_packet(Packet::Publish(publish))
            .unwrap();
        session
            .handle_incoming_packet(Packet::PubAck(PubAck::new(1)))
            .unwrap();

        // should throw error because we didn't get pingresp for previous ping
        match session.outgoing_ping() {
            Ok(_) => panic!("Should throw pingresp await error"),
            Err(StateError::AwaitPingResp) => (),
            Err(e) => panic!("Should throw pingresp await error. Error = {:?}", e),
        }
    }

    #[test]
    fn outgoing_ping_handle_should_succeed_if_pingresp_is_received() {
        let mut session = build_state();

        // should ping
        session.outgoing_ping().unwrap();
        session
            .handle_incoming_packet(Packet::PingResp(wren_bytes::PingResp))
            .unwrap();

        // should ping
        session.outgoing_ping().unwrap();
    }

    #[test]
    fn two_pings_with_a_parked_publish_are_an_error() {
        let mut session = SessionState::new("test-client".to_owned(), 1, false);

        let publish = build_outgoing_publish(QoS::AtLeastOnce);
        session.outgoing_publish(publish.clone()).unwrap();
        session.outgoing_publish(publish).unwrap();
        assert!(session.has_parked());

        session.outgoing_ping().unwrap();
        session
            .handle_incoming_packet(Packet::PingResp(wren_bytes::PingResp))
            .unwrap();
        match session.outgoing_ping() {
            Err(StateError::AwaitAckTimeout) => (),
            other => panic!("Expected parked publish timeout, got {:?}", other),
        }
    }

    // Request is sent by clients, not handled by the state, but keep the
    // compiler honest about its shape here.
    #[test]
    fn request_wraps_packets() {
        let request = Request::Packet(Packet::PingReq(PingReq));
        assert_eq!(request, Request::Packet(Packet::PingReq(PingReq)));
    }
}
