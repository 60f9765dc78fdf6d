//! QoS acknowledgment handling (PUBACK, PUBREC, PUBREL, PUBCOMP)

use std::sync::Arc;

use tracing::{debug, warn};

use super::Processor;
use crate::protocol::{Packet, PubAck, PubComp, PubRec, PubRel};
use crate::transport::Channel;

impl Processor {
    /// PUBACK: a subscriber acknowledged a QoS 1 delivery.
    pub fn handle_pub_ack(&self, channel: &Arc<Channel>, msg: PubAck) {
        let Some(client_id) = channel.client_id() else {
            warn!("PUBACK on a channel without CONNECT");
            return;
        };
        let Some(session) = self.sessions.session_for_client(&client_id) else {
            debug!("PUBACK from <{}> with no session", client_id);
            return;
        };
        self.verify_to_activate(&client_id, &session);
        session.in_flight_acknowledged(msg.packet_id);
    }

    /// PUBREC: first acknowledgment of a broker-originated QoS 2 publish.
    /// Moves the id into the second phase and replies PUBREL.
    pub fn handle_pub_rec(&self, channel: &Arc<Channel>, msg: PubRec) {
        let Some(client_id) = channel.client_id() else {
            warn!("PUBREC on a channel without CONNECT");
            return;
        };
        let Some(session) = self.sessions.session_for_client(&client_id) else {
            debug!("PUBREC from <{}> with no session", client_id);
            return;
        };
        self.verify_to_activate(&client_id, &session);

        session.in_flight_acknowledged(msg.packet_id);
        session.second_phase_ack_waiting(msg.packet_id);
        channel.write(Packet::PubRel(PubRel::new(msg.packet_id)));
    }

    /// PUBREL: second phase of a client-originated QoS 2 publish. The
    /// message held since the PUBLISH is routed now, retained rules are
    /// applied, and the handshake completes with PUBCOMP.
    pub fn handle_pub_rel(&self, channel: &Arc<Channel>, msg: PubRel) {
        let Some(client_id) = channel.client_id() else {
            warn!("PUBREL on a channel without CONNECT");
            return;
        };
        debug!(
            "PUBREL from client <{}> for message id {}",
            client_id, msg.packet_id
        );

        if let Some(session) = self.sessions.session_for_client(&client_id) {
            self.verify_to_activate(&client_id, &session);
            match session.stored_message(msg.packet_id) {
                Some(mut stored) => {
                    self.route_to_subscribers(&mut stored);
                    if stored.retained {
                        self.apply_retained(&mut stored);
                    }
                }
                None => {
                    debug!(
                        "PUBREL from <{}> for unknown message id {}",
                        client_id, msg.packet_id
                    );
                }
            }
        } else {
            debug!("PUBREL from <{}> with no session", client_id);
        }

        channel.write(Packet::PubComp(PubComp::new(msg.packet_id)));
    }

    /// PUBCOMP: a subscriber completed a broker-originated QoS 2 handshake.
    pub fn handle_pub_comp(&self, channel: &Arc<Channel>, msg: PubComp) {
        let Some(client_id) = channel.client_id() else {
            warn!("PUBCOMP on a channel without CONNECT");
            return;
        };
        let Some(session) = self.sessions.session_for_client(&client_id) else {
            debug!("PUBCOMP from <{}> with no session", client_id);
            return;
        };
        self.verify_to_activate(&client_id, &session);
        session.second_phase_acknowledged(msg.packet_id);
    }
}
