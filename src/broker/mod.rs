//! Protocol processor
//!
//! Drives the broker-side MQTT state machine for every connected client:
//! the CONNECT acceptance sequence with session takeover, the three QoS
//! delivery handshakes, retained-message replay on subscribe, last-will
//! delivery on abnormal disconnect, and wildcard fan-out to subscribers.
//!
//! The transport layer calls one handler per decoded inbound packet and
//! drains each channel's outbound queue; per-channel calls are serialized
//! by the transport, handlers for distinct channels run concurrently.

mod connect;
mod disconnect;
mod publish;
mod qos;
mod router;
mod subscribe;

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;

use crate::auth::AuthService;
use crate::config::ProcessorConfig;
use crate::hooks::{Interceptor, NoopInterceptor};
use crate::protocol::{Packet, Publish, QoS};
use crate::session::{MemorySessionStore, Session, SessionStore};
use crate::store::{MemoryMessageStore, MessageStore};
use crate::topic::SubscriptionIndex;
use crate::transport::Channel;

/// Client id stamped on broker-originated (embedded) publishes.
pub const BROKER_SELF: &str = "BROKER_SELF";

/// Registry entry for one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    pub client_id: Arc<str>,
    pub channel: Arc<Channel>,
    pub clean_session: bool,
}

/// A will testament pending for a connected client.
#[derive(Debug, Clone)]
pub struct WillMessage {
    pub topic: String,
    pub payload: Bytes,
    pub retained: bool,
    pub qos: QoS,
}

/// The protocol processor.
///
/// Owns the two process-wide registries (connected clients and pending
/// wills) and delegates durable state to the store capabilities it was
/// constructed with.
pub struct Processor {
    connections: DashMap<Arc<str>, ConnectionDescriptor>,
    wills: DashMap<Arc<str>, WillMessage>,
    subscriptions: Arc<SubscriptionIndex>,
    messages: Arc<dyn MessageStore>,
    sessions: Arc<dyn SessionStore>,
    auth: Arc<dyn AuthService>,
    interceptor: Arc<dyn Interceptor>,
    allow_anonymous: bool,
}

impl Processor {
    pub fn new(
        subscriptions: Arc<SubscriptionIndex>,
        messages: Arc<dyn MessageStore>,
        sessions: Arc<dyn SessionStore>,
        auth: Arc<dyn AuthService>,
        interceptor: Arc<dyn Interceptor>,
        config: &ProcessorConfig,
    ) -> Self {
        Self {
            connections: DashMap::new(),
            wills: DashMap::new(),
            subscriptions,
            messages,
            sessions,
            auth,
            interceptor,
            allow_anonymous: config.allow_anonymous,
        }
    }

    /// Processor wired to fresh in-memory collaborators and a no-op
    /// interceptor. Credential logins are all rejected; combine with
    /// `allow_anonymous` or use [`Processor::new`] for a real auth service.
    pub fn in_memory(config: &ProcessorConfig) -> Self {
        let messages: Arc<dyn MessageStore> = Arc::new(MemoryMessageStore::new());
        let sessions = Arc::new(MemorySessionStore::new(
            messages.clone(),
            config.max_queued_messages,
        ));
        Self::new(
            Arc::new(SubscriptionIndex::new()),
            messages,
            sessions,
            Arc::new(crate::auth::StaticAuth::new()),
            Arc::new(NoopInterceptor),
            config,
        )
    }

    /// Write one PUBLISH to a connected client. Unknown clients are
    /// silently ignored.
    pub fn send_to_client(&self, client_id: &str, publish: Publish) {
        if let Some(descriptor) = self.connections.get(client_id) {
            if !descriptor.channel.write(Packet::Publish(publish)) {
                debug!("channel for <{}> gone, dropping direct message", client_id);
            }
        }
    }

    /// Number of currently connected clients.
    pub fn connected_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        self.connections.contains_key(client_id)
    }

    /// Channel currently registered for a client id.
    pub fn connected_channel(&self, client_id: &str) -> Option<Arc<Channel>> {
        self.connections
            .get(client_id)
            .map(|descriptor| descriptor.channel.clone())
    }

    /// Whether a will testament is pending for a client.
    pub fn has_will(&self, client_id: &str) -> bool {
        self.wills.contains_key(client_id)
    }

    /// Reactivate a session iff its client is currently registered.
    /// Guards against acting on a session whose client raced a disconnect.
    fn verify_to_activate(&self, client_id: &str, session: &Arc<Session>) {
        if self.connections.contains_key(client_id) {
            session.activate();
        }
    }

    /// Leave the connected state, dropping clean-session subscriptions
    /// from the index before the session purges itself.
    fn teardown_session(&self, client_id: &str, session: &Arc<Session>) {
        if session.is_clean_session() {
            self.subscriptions.remove_all(client_id);
        }
        session.disconnect();
    }
}
