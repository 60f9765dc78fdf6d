//! Disconnect, connection loss, and will publication

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{Processor, WillMessage};
use crate::protocol::QoS;
use crate::store::StoredMessage;
use crate::transport::Channel;

impl Processor {
    /// Graceful DISCONNECT: the will is discarded, the session leaves the
    /// connected state (purging itself when clean), and the channel closes.
    pub async fn handle_disconnect(&self, channel: &Arc<Channel>) {
        let Some(client_id) = channel.client_id() else {
            warn!("DISCONNECT on a channel without CONNECT");
            channel.close();
            return;
        };
        info!(
            "DISCONNECT client <{}> with clean session {}",
            client_id,
            channel.clean_session()
        );

        if let Some(session) = self.sessions.session_for_client(&client_id) {
            self.teardown_session(&client_id, &session);
        }
        self.connections.remove(client_id.as_ref());
        channel.close();
        self.wills.remove(client_id.as_ref());

        self.interceptor.client_disconnected(&client_id).await;
    }

    /// Transport-triggered connection loss.
    ///
    /// The registry entry is removed only while it still points at this
    /// channel, so a takeover that already swapped it is not clobbered. A
    /// stolen channel only deactivates its session and keeps the will with
    /// the new connection. Otherwise any pending will is published and the
    /// session leaves the connected state.
    pub fn handle_connection_lost(
        &self,
        client_id: &str,
        session_stolen: bool,
        channel: &Arc<Channel>,
    ) {
        let was_registered = self
            .connections
            .remove_if(client_id, |_, descriptor| {
                Arc::ptr_eq(&descriptor.channel, channel)
            })
            .is_some();

        // The tag on the channel is authoritative even when the caller
        // lost track of the takeover.
        if session_stolen || channel.is_session_stolen() {
            if let Some(session) = self.sessions.session_for_client(client_id) {
                session.deactivate();
            }
            info!("lost connection with client <{}> (session stolen)", client_id);
            return;
        }

        if let Some((_, will)) = self.wills.remove(client_id) {
            self.forward_publish_will(&will, client_id);
        }

        // Tear the session down only while this channel was still the
        // registered one; otherwise a newer connection owns it.
        if was_registered {
            if let Some(session) = self.sessions.session_for_client(client_id) {
                self.teardown_session(client_id, &session);
            }
        }
        info!("lost connection with client <{}>", client_id);
    }

    /// Publish a will testament on behalf of a client that dropped without
    /// DISCONNECT. A will with QoS > 0 gets a packet id from the client's
    /// session; retention applies when the will asked for it.
    pub(crate) fn forward_publish_will(&self, will: &WillMessage, client_id: &str) {
        debug!(
            "publishing will for client <{}> on topic <{}>",
            client_id, will.topic
        );
        let packet_id = if will.qos != QoS::AtMostOnce {
            self.sessions.next_packet_id(client_id)
        } else {
            None
        };

        let mut stored = StoredMessage {
            guid: None,
            client_id: client_id.into(),
            topic: will.topic.clone(),
            qos: will.qos,
            payload: will.payload.clone(),
            retained: will.retained,
            packet_id,
        };
        self.route_to_subscribers(&mut stored);

        if will.retained {
            self.apply_retained(&mut stored);
        }
    }
}
