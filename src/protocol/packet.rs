//! MQTT Packet Definitions
//!
//! Decoded packet types for MQTT v3.1 (protocol level 3) and v3.1.1
//! (protocol level 4).

use std::sync::Arc;

use bytes::Bytes;

use super::QoS;

/// MQTT control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum Packet {
    Connect(Box<Connect>),
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
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    /// Get packet type as u8
    pub fn packet_type(&self) -> u8 {
        match self {
            Packet::Connect(_) => 1,
            Packet::ConnAck(_) => 2,
            Packet::Publish(_) => 3,
            Packet::PubAck(_) => 4,
            Packet::PubRec(_) => 5,
            Packet::PubRel(_) => 6,
            Packet::PubComp(_) => 7,
            Packet::Subscribe(_) => 8,
            Packet::SubAck(_) => 9,
            Packet::Unsubscribe(_) => 10,
            Packet::UnsubAck(_) => 11,
            Packet::PingReq => 12,
            Packet::PingResp => 13,
            Packet::Disconnect => 14,
        }
    }
}

/// CONNECT packet (client -> server)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    /// Protocol level: 3 for MQTT 3.1, 4 for MQTT 3.1.1
    pub protocol_version: u8,
    /// Client identifier
    pub client_id: String,
    /// Clean session flag
    pub clean_session: bool,
    /// Keep alive interval in seconds (0 disables)
    pub keep_alive: u16,
    /// Username (present iff the user flag was set)
    pub username: Option<String>,
    /// Password (present iff the password flag was set)
    pub password: Option<Bytes>,
    /// Will message (present iff the will flag was set)
    pub will: Option<Will>,
}

impl Default for Connect {
    fn default() -> Self {
        Self {
            protocol_version: 4,
            client_id: String::new(),
            clean_session: true,
            keep_alive: 60,
            username: None,
            password: None,
            will: None,
        }
    }
}

/// Will message configuration carried on CONNECT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    /// Will topic
    pub topic: String,
    /// Will payload
    pub payload: Bytes,
    /// Will QoS
    pub qos: QoS,
    /// Will retain flag
    pub retain: bool,
}

/// CONNACK return codes (MQTT 3.1.1 §3.2.2.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectReturnCode {
    Accepted = 0,
    UnacceptableProtocolVersion = 1,
    IdentifierRejected = 2,
    ServerUnavailable = 3,
    BadUsernameOrPassword = 4,
    NotAuthorized = 5,
}

/// CONNACK packet (server -> client)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    /// Session present flag
    pub session_present: bool,
    /// Return code
    pub return_code: ConnectReturnCode,
}

impl ConnAck {
    pub fn new(return_code: ConnectReturnCode) -> Self {
        Self {
            session_present: false,
            return_code,
        }
    }

    pub fn accepted(session_present: bool) -> Self {
        Self {
            session_present,
            return_code: ConnectReturnCode::Accepted,
        }
    }
}

/// PUBACK packet (bidirectional, QoS 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubAck {
    /// Packet identifier
    pub packet_id: u16,
}

impl PubAck {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

/// PUBREC packet (bidirectional, QoS 2 step 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubRec {
    /// Packet identifier
    pub packet_id: u16,
}

impl PubRec {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

/// PUBREL packet (bidirectional, QoS 2 step 2)
///
/// Framed with QoS 1 flags on the wire; the transport encoder owns that
/// detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubRel {
    /// Packet identifier
    pub packet_id: u16,
}

impl PubRel {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

/// PUBCOMP packet (bidirectional, QoS 2 step 3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubComp {
    /// Packet identifier
    pub packet_id: u16,
}

impl PubComp {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

/// One topic-filter/QoS request inside a SUBSCRIBE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeTopic {
    /// Requested topic filter (may contain wildcards)
    pub topic_filter: String,
    /// Requested maximum QoS
    pub qos: QoS,
}

/// SUBSCRIBE packet (client -> server)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    /// Packet identifier
    pub packet_id: u16,
    /// Requested subscriptions, in packet order
    pub topics: Vec<SubscribeTopic>,
}

/// SUBACK entry: granted QoS or failure (0x80)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubAckCode {
    Granted(QoS),
    Failure,
}

impl SubAckCode {
    /// Wire value of the entry.
    pub fn as_u8(self) -> u8 {
        match self {
            SubAckCode::Granted(qos) => qos as u8,
            SubAckCode::Failure => 0x80,
        }
    }
}

/// SUBACK packet (server -> client)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    /// Packet identifier
    pub packet_id: u16,
    /// One entry per requested subscription, in request order
    pub return_codes: Vec<SubAckCode>,
}

/// UNSUBSCRIBE packet (client -> server)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    /// Packet identifier
    pub packet_id: u16,
    /// Topic filters to remove
    pub topic_filters: Vec<String>,
}

/// UNSUBACK packet (server -> client)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsubAck {
    /// Packet identifier
    pub packet_id: u16,
}

/// PUBLISH packet (bidirectional)
///
/// The topic uses `Arc<str>` so cloning during fan-out is O(1); the payload
/// is `Bytes`, so every subscriber gets an independent handle onto the same
/// immutable buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    /// Duplicate delivery flag
    pub dup: bool,
    /// Quality of service
    pub qos: QoS,
    /// Retain flag
    pub retain: bool,
    /// Topic name (never contains wildcards)
    pub topic: Arc<str>,
    /// Packet identifier (present only for QoS > 0)
    pub packet_id: Option<u16>,
    /// Payload
    pub payload: Bytes,
}

impl Default for Publish {
    fn default() -> Self {
        Self {
            dup: false,
            qos: QoS::AtMostOnce,
            retain: false,
            topic: Arc::from(""),
            packet_id: None,
            payload: Bytes::new(),
        }
    }
}
