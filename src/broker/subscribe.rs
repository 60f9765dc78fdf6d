//! SUBSCRIBE and UNSUBSCRIBE packet handling

use std::sync::Arc;

use tracing::{debug, warn};

use super::Processor;
use crate::protocol::{Packet, QoS, SubAck, SubAckCode, Subscribe, UnsubAck, Unsubscribe};
use crate::session::Session;
use crate::topic::{self, Subscription};
use crate::transport::Channel;

impl Processor {
    /// Handle SUBSCRIBE: register each filter on the session, answer with
    /// one SUBACK entry per request (granted QoS or failure), then replay
    /// retained messages for the accepted filters.
    pub async fn handle_subscribe(&self, channel: &Arc<Channel>, msg: Subscribe) {
        let Some(client_id) = channel.client_id() else {
            warn!("SUBSCRIBE on a channel without CONNECT");
            return;
        };
        debug!(
            "SUBSCRIBE client <{}> packet id {}",
            client_id, msg.packet_id
        );
        let Some(session) = self.sessions.session_for_client(&client_id) else {
            warn!("SUBSCRIBE from <{}> with no session", client_id);
            return;
        };
        self.verify_to_activate(&client_id, &session);

        let mut return_codes = Vec::with_capacity(msg.topics.len());
        let mut accepted = Vec::new();
        for request in &msg.topics {
            let subscription =
                Subscription::new(client_id.clone(), request.topic_filter.clone(), request.qos);
            if session.subscribe(&request.topic_filter, subscription.clone()) {
                return_codes.push(SubAckCode::Granted(request.qos));
                accepted.push(subscription);
            } else {
                return_codes.push(SubAckCode::Failure);
            }
        }

        debug!("SUBACK for packet id {}", msg.packet_id);
        channel.write(Packet::SubAck(SubAck {
            packet_id: msg.packet_id,
            return_codes,
        }));

        // Retained replay happens after the SUBACK is queued.
        for subscription in accepted {
            self.subscribe_single_topic(&session, subscription).await;
        }
    }

    /// Index one accepted subscription and replay the retained messages
    /// matching its filter, downgraded to the requested QoS.
    async fn subscribe_single_topic(&self, session: &Arc<Session>, subscription: Subscription) {
        self.subscriptions.add(subscription.clone());

        let filter = subscription.topic_filter.clone();
        let retained = self
            .messages
            .search_matching(&|topic| topic::match_topics(topic, &filter));
        for stored in retained {
            debug!(
                "replaying retained message on <{}> for filter <{}>",
                stored.topic, subscription.topic_filter
            );
            let effective_qos = stored.qos.min(subscription.requested_qos);
            let packet_id =
                (effective_qos != QoS::AtMostOnce).then(|| session.next_packet_id());
            self.direct_send(
                &subscription.client_id,
                &stored.topic,
                effective_qos,
                stored.payload.clone(),
                true,
                packet_id,
            );
        }

        self.interceptor.topic_subscribed(&subscription).await;
    }

    /// Handle UNSUBSCRIBE. An invalid filter is a protocol violation that
    /// closes the channel; unknown filters succeed silently.
    pub async fn handle_unsubscribe(&self, channel: &Arc<Channel>, msg: Unsubscribe) {
        let Some(client_id) = channel.client_id() else {
            warn!("UNSUBSCRIBE on a channel without CONNECT");
            return;
        };
        debug!(
            "UNSUBSCRIBE client <{}> topics {:?}",
            client_id, msg.topic_filters
        );
        let Some(session) = self.sessions.session_for_client(&client_id) else {
            warn!("UNSUBSCRIBE from <{}> with no session", client_id);
            return;
        };
        self.verify_to_activate(&client_id, &session);

        for filter in &msg.topic_filters {
            if !topic::validate(filter) {
                warn!(
                    "UNSUBSCRIBE with invalid topic filter <{}> from client <{}>",
                    filter, client_id
                );
                channel.close();
                return;
            }
            self.subscriptions.remove_subscription(filter, &client_id);
            session.unsubscribe_from(filter);
            self.interceptor.topic_unsubscribed(filter, &client_id).await;
        }

        debug!("replying with UNSUBACK to packet id {}", msg.packet_id);
        channel.write(Packet::UnsubAck(UnsubAck {
            packet_id: msg.packet_id,
        }));
    }
}
