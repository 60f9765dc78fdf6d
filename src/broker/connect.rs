//! CONNECT packet handling

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::{ConnectionDescriptor, Processor, WillMessage};
use crate::protocol::{ConnAck, Connect, ConnectReturnCode, Packet, QoS};
use crate::session::Session;
use crate::transport::Channel;

/// Idle timeout installed on the channel: ceil(1.5 x keep-alive).
/// A keep-alive of 0 disables idle detection.
fn idle_timeout(keep_alive: u16) -> Option<Duration> {
    (keep_alive > 0).then(|| Duration::from_secs((u64::from(keep_alive) * 3).div_ceil(2)))
}

impl Processor {
    /// Run the CONNECT acceptance sequence. Steps are ordered and
    /// short-circuiting: protocol version, client id, credentials,
    /// takeover, registration, will capture, session materialization,
    /// CONNACK and queued-message replay.
    pub async fn handle_connect(&self, channel: &Arc<Channel>, msg: Connect) {
        debug!("CONNECT for client <{}>", msg.client_id);

        if msg.protocol_version != 3 && msg.protocol_version != 4 {
            warn!(
                "CONNECT with unacceptable protocol version {}",
                msg.protocol_version
            );
            channel.write(Packet::ConnAck(ConnAck::new(
                ConnectReturnCode::UnacceptableProtocolVersion,
            )));
            channel.close();
            return;
        }

        if msg.client_id.is_empty() {
            warn!("CONNECT with empty client id rejected");
            channel.write(Packet::ConnAck(ConnAck::new(
                ConnectReturnCode::IdentifierRejected,
            )));
            channel.close();
            return;
        }

        if let Some(username) = &msg.username {
            // A user flag without a password flag is malformed; the auth
            // service is never consulted without a password.
            let Some(password) = &msg.password else {
                warn!("CONNECT from <{}> with username but no password", msg.client_id);
                self.failed_credentials(channel);
                return;
            };
            match self.auth.login(username, password).await {
                Ok(reply) if reply.is_accepted() => {
                    channel.set_username(username.clone());
                }
                Ok(_) => {
                    debug!("login rejected for user <{}>", username);
                    self.failed_credentials(channel);
                    channel.close();
                    return;
                }
                Err(e) => {
                    warn!("login failed for user <{}>: {}", username, e);
                    self.failed_credentials(channel);
                    channel.close();
                    return;
                }
            }
        } else if !self.allow_anonymous {
            debug!("anonymous CONNECT from <{}> refused", msg.client_id);
            self.failed_credentials(channel);
            return;
        }

        let client_id: Arc<str> = msg.client_id.as_str().into();

        // Takeover: a second CONNECT for a live client id steals the
        // session and closes the prior channel. Must not fail this CONNECT.
        if let Some(existing) = self.connections.get(&client_id) {
            info!(
                "existing connection with same client id <{}>, forcing close",
                client_id
            );
            let prior = existing.channel.clone();
            drop(existing);
            if let Some(prior_session) = self.sessions.session_for_client(&client_id) {
                prior_session.disconnect();
            }
            prior.mark_session_stolen();
            prior.close();
        }

        self.connections.insert(
            client_id.clone(),
            ConnectionDescriptor {
                client_id: client_id.clone(),
                channel: channel.clone(),
                clean_session: msg.clean_session,
            },
        );
        channel.set_client_id(client_id.clone());
        channel.set_clean_session(msg.clean_session);
        channel.set_keep_alive(msg.keep_alive);
        channel.set_idle_timeout(idle_timeout(msg.keep_alive));
        debug!("CONNECT with keep-alive {} s", msg.keep_alive);

        if let Some(will) = &msg.will {
            self.wills.insert(
                client_id.clone(),
                WillMessage {
                    topic: will.topic.clone(),
                    payload: will.payload.clone(),
                    retained: will.retain,
                    qos: will.qos,
                },
            );
        }

        let existing = self.sessions.session_for_client(&client_id);
        let session_present = existing.is_some() && !msg.clean_session;
        let session = match existing {
            Some(session) => {
                session.set_clean_session(msg.clean_session);
                if msg.clean_session {
                    session.clear();
                    self.subscriptions.remove_all(&client_id);
                }
                session
            }
            None => {
                info!("creating persistent session for client <{}>", client_id);
                self.sessions
                    .create_new_session(&client_id, msg.clean_session)
            }
        };

        channel.write(Packet::ConnAck(ConnAck::accepted(session_present)));
        self.interceptor.client_connected(&msg).await;

        session.activate();
        info!(
            "connected client <{}> with clean session {}",
            client_id, msg.clean_session
        );
        if !msg.clean_session {
            self.republish_stored(&session);
        }
    }

    fn failed_credentials(&self, channel: &Arc<Channel>) {
        channel.write(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::BadUsernameOrPassword,
        )));
    }

    /// Replay messages queued on the session while the client was offline,
    /// dequeuing each guid as it is dispatched.
    fn republish_stored(&self, session: &Arc<Session>) {
        let queued = session.stored_messages();
        if queued.is_empty() {
            trace!("no stored messages for client <{}>", session.client_id());
            return;
        }

        info!(
            "republishing {} stored messages to client <{}>",
            queued.len(),
            session.client_id()
        );
        for message in queued {
            let packet_id = match message.qos {
                QoS::AtMostOnce => None,
                _ => message.packet_id.or_else(|| Some(session.next_packet_id())),
            };
            self.direct_send(
                session.client_id(),
                &message.topic,
                message.qos,
                message.payload.clone(),
                false,
                packet_id,
            );
            if let Some(guid) = message.guid {
                session.remove_enqueued(guid);
            }
        }
    }
}
