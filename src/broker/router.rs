//! Fan-out routing

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};

use super::Processor;
use crate::protocol::{Packet, Publish, QoS};
use crate::store::StoredMessage;

impl Processor {
    /// Deliver a message to every subscription matching its topic.
    ///
    /// QoS >= 1 bodies are persisted first (assigning the guid used for
    /// inflight tracking and offline queueing). Each matched subscriber
    /// gets the lower of the publishing and requested QoS: active sessions
    /// receive a direct send (with a fresh packet id registered inflight
    /// when QoS > 0), inactive persistent sessions get the guid enqueued,
    /// everything else is dropped.
    pub(crate) fn route_to_subscribers(&self, message: &mut StoredMessage) {
        let publishing_qos = message.qos;
        if publishing_qos >= QoS::AtLeastOnce && message.guid.is_none() {
            message.guid = Some(self.messages.store_publish_for_future(message.clone()));
        }

        for sub in self.subscriptions.matches(&message.topic) {
            let effective_qos = publishing_qos.min(sub.requested_qos);
            let Some(target) = self.sessions.session_for_client(&sub.client_id) else {
                debug!("subscriber <{}> has no session, skipping", sub.client_id);
                continue;
            };
            self.verify_to_activate(&sub.client_id, &target);

            debug!(
                "republishing to client <{}> filter <{}> qos {:?}, active {}",
                sub.client_id,
                sub.topic_filter,
                effective_qos,
                target.is_active()
            );

            // Every subscriber gets its own handle onto the payload.
            let payload = message.payload.clone();
            if effective_qos == QoS::AtMostOnce {
                if target.is_active() {
                    self.direct_send(
                        &sub.client_id,
                        &message.topic,
                        effective_qos,
                        payload,
                        false,
                        None,
                    );
                }
                // QoS 0 is never stored per subscriber.
            } else if target.is_active() {
                let packet_id = target.next_packet_id();
                if let Some(guid) = message.guid {
                    target.in_flight_ack_waiting(guid, packet_id);
                }
                self.direct_send(
                    &sub.client_id,
                    &message.topic,
                    effective_qos,
                    payload,
                    false,
                    Some(packet_id),
                );
            } else if !target.is_clean_session() {
                if let Some(guid) = message.guid {
                    target.enqueue_to_deliver(guid);
                }
            }
        }
    }

    /// Write one PUBLISH to a client's registered channel. A client that
    /// disconnected while we were routing is a logged drop.
    pub(crate) fn direct_send(
        &self,
        client_id: &str,
        topic: &str,
        qos: QoS,
        payload: Bytes,
        retained: bool,
        packet_id: Option<u16>,
    ) {
        debug_assert!(qos != QoS::AtMostOnce || packet_id.is_none());
        trace!(
            "direct send to <{}> on topic <{}> qos {:?} retained {} packet id {:?}",
            client_id,
            topic,
            qos,
            retained,
            packet_id
        );

        let publish = Publish {
            dup: false,
            qos,
            retain: retained,
            topic: Arc::from(topic),
            packet_id: if qos == QoS::AtMostOnce { None } else { packet_id },
            payload,
        };

        let Some(descriptor) = self.connections.get(client_id) else {
            debug!(
                "client <{}> disconnected while publishing to it, dropping",
                client_id
            );
            return;
        };
        if !descriptor.channel.write(Packet::Publish(publish)) {
            debug!("channel for <{}> closed, dropping publish", client_id);
        }
    }
}
