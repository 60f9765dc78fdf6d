//! MQTT 3.1/3.1.1 packet model
//!
//! In-memory representation of the control packets the processor consumes
//! and produces. Framing (encode/decode) belongs to the transport layer;
//! this module only defines the decoded shapes.

mod packet;

pub use packet::{
    ConnAck, Connect, ConnectReturnCode, Packet, PubAck, PubComp, PubRec, PubRel, Publish, SubAck,
    SubAckCode, Subscribe, SubscribeTopic, UnsubAck, Unsubscribe, Will,
};

/// Quality of service levels, ordered `AtMostOnce < AtLeastOnce < ExactlyOnce`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    /// Convert from the 2-bit wire value.
    pub fn from_u8(value: u8) -> Option<QoS> {
        match value {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}
