//! PUBLISH packet handling

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{Processor, BROKER_SELF};
use crate::protocol::{Packet, PubAck, PubRec, Publish, QoS};
use crate::store::StoredMessage;
use crate::transport::Channel;

impl Processor {
    /// Handle an inbound PUBLISH from a connected client: initiate the QoS
    /// handshake, route (QoS 0/1 now, QoS 2 on PUBREL), then apply the
    /// retained rules and notify the interceptor.
    pub async fn handle_publish(&self, channel: &Arc<Channel>, msg: Publish) {
        let Some(client_id) = channel.client_id() else {
            warn!("PUBLISH on a channel without CONNECT, dropping");
            return;
        };
        info!(
            "PUBLISH from client <{}> on topic <{}> with QoS {:?}",
            client_id, msg.topic, msg.qos
        );

        let mut stored = StoredMessage {
            guid: None,
            client_id: client_id.clone(),
            topic: msg.topic.to_string(),
            qos: msg.qos,
            payload: msg.payload.clone(),
            retained: msg.retain,
            packet_id: msg.packet_id,
        };

        match msg.qos {
            QoS::AtMostOnce => {
                self.route_to_subscribers(&mut stored);
            }
            QoS::AtLeastOnce => {
                self.route_to_subscribers(&mut stored);
                if let Some(packet_id) = msg.packet_id {
                    debug!("replying with PUBACK to message id {}", packet_id);
                    channel.write(Packet::PubAck(PubAck::new(packet_id)));
                } else {
                    warn!("QoS 1 PUBLISH from <{}> without packet id", client_id);
                }
            }
            QoS::ExactlyOnce => {
                let Some(packet_id) = msg.packet_id else {
                    warn!("QoS 2 PUBLISH from <{}> without packet id", client_id);
                    return;
                };
                // Held until PUBREL; fan-out happens in the second phase.
                let guid = self.messages.store_publish_for_future(stored.clone());
                stored.guid = Some(guid);
                if let Some(session) = self.sessions.session_for_client(&client_id) {
                    self.verify_to_activate(&client_id, &session);
                    session.track_inbound(packet_id, guid);
                } else {
                    debug!("QoS 2 PUBLISH from <{}> with no session", client_id);
                }
                channel.write(Packet::PubRec(PubRec::new(packet_id)));
            }
        }

        if msg.retain {
            self.apply_retained(&mut stored);
        }
        self.interceptor.topic_published(&msg, &client_id).await;
    }

    /// Embedded publish for the hosting application: no credential or
    /// handshake phases, and the interceptor is not notified since the
    /// owner already knows what it published.
    pub fn publish_internal(&self, msg: Publish) {
        info!(
            "embedded PUBLISH on topic <{}> with QoS {:?}",
            msg.topic, msg.qos
        );

        let mut stored = StoredMessage {
            guid: None,
            client_id: BROKER_SELF.into(),
            topic: msg.topic.to_string(),
            qos: msg.qos,
            payload: msg.payload.clone(),
            retained: msg.retain,
            packet_id: Some(1),
        };
        if msg.qos == QoS::ExactlyOnce {
            stored.guid = Some(self.messages.store_publish_for_future(stored.clone()));
        }
        self.route_to_subscribers(&mut stored);

        if msg.retain {
            self.apply_retained(&mut stored);
        }
    }

    /// Retained-map transition for a publish carrying the retain flag.
    ///
    /// QoS 0 and empty payloads clear the topic's entry; otherwise the
    /// body is stored (if it was not already) and becomes the topic's
    /// retained message.
    pub(crate) fn apply_retained(&self, message: &mut StoredMessage) {
        if message.qos == QoS::AtMostOnce || message.payload.is_empty() {
            self.messages.clean_retained(&message.topic);
            return;
        }
        let guid = match message.guid {
            Some(guid) => guid,
            None => {
                let guid = self.messages.store_publish_for_future(message.clone());
                message.guid = Some(guid);
                guid
            }
        };
        self.messages.store_retained(&message.topic, guid);
    }
}
