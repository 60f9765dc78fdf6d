//! Client session state
//!
//! Per-client bookkeeping that outlives a single connection: registered
//! subscriptions, outbound inflight tracking for the QoS 1/2 handshakes,
//! messages held for the inbound QoS 2 second phase, and the guid queue for
//! deliveries that arrived while the client was offline.

use std::collections::VecDeque;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::store::{Guid, MessageStore, StoredMessage};
use crate::topic::{self, Subscription};

/// Lifecycle and delivery state for one client id.
///
/// Interior mutability keeps the handle clonable across handlers; all state
/// sits behind one mutex since every operation touches a single session.
pub struct Session {
    client_id: Arc<str>,
    store: Arc<dyn MessageStore>,
    inner: Mutex<SessionInner>,
}

struct SessionInner {
    clean_session: bool,
    active: bool,
    /// A purged clean session is reported as absent by the store.
    purged: bool,
    subscriptions: AHashMap<String, Subscription>,
    /// Outbound QoS > 0 publishes awaiting PUBACK/PUBREC, packet id -> guid.
    inflight: AHashMap<u16, Guid>,
    /// Outbound QoS 2 handshakes awaiting PUBCOMP.
    second_phase: AHashSet<u16>,
    /// Inbound QoS 2 publishes held until PUBREL, packet id -> guid.
    inbound: AHashMap<u16, Guid>,
    /// Guids queued for delivery on next activation, oldest first.
    enqueued: VecDeque<Guid>,
    max_enqueued: usize,
    next_packet_id: u16,
}

impl Session {
    fn new(
        client_id: Arc<str>,
        clean_session: bool,
        store: Arc<dyn MessageStore>,
        max_enqueued: usize,
    ) -> Self {
        Self {
            client_id,
            store,
            inner: Mutex::new(SessionInner {
                clean_session,
                active: false,
                purged: false,
                subscriptions: AHashMap::with_capacity(8),
                inflight: AHashMap::with_capacity(16),
                second_phase: AHashSet::with_capacity(8),
                inbound: AHashMap::with_capacity(8),
                enqueued: VecDeque::new(),
                max_enqueued,
                next_packet_id: 1,
            }),
        }
    }

    pub fn client_id(&self) -> &Arc<str> {
        &self.client_id
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    pub fn activate(&self) {
        self.inner.lock().active = true;
    }

    /// Drop out of the active state without touching session contents.
    pub fn deactivate(&self) {
        self.inner.lock().active = false;
    }

    /// Leave the connected state. A clean session is purged: its contents
    /// are dropped and the store stops reporting it.
    pub fn disconnect(&self) {
        let mut inner = self.inner.lock();
        inner.active = false;
        if inner.clean_session {
            inner.purge();
        }
    }

    pub fn is_clean_session(&self) -> bool {
        self.inner.lock().clean_session
    }

    pub fn set_clean_session(&self, clean_session: bool) {
        self.inner.lock().clean_session = clean_session;
    }

    /// Drop all stored state (subscriptions, handshakes, queued guids).
    /// Used when a clean-session client reconnects over a persistent
    /// session record.
    pub fn clear(&self) {
        self.inner.lock().wipe();
    }

    pub(crate) fn is_purged(&self) -> bool {
        self.inner.lock().purged
    }

    /// Register a subscription on the session. Rejects invalid filters.
    pub fn subscribe(&self, topic_filter: &str, subscription: Subscription) -> bool {
        if !topic::validate(topic_filter) {
            warn!(
                "session <{}> rejected subscription to invalid filter <{}>",
                self.client_id, topic_filter
            );
            return false;
        }
        self.inner
            .lock()
            .subscriptions
            .insert(topic_filter.to_string(), subscription);
        true
    }

    pub fn unsubscribe_from(&self, topic_filter: &str) {
        self.inner.lock().subscriptions.remove(topic_filter);
    }

    /// Snapshot of the registered subscriptions.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.inner.lock().subscriptions.values().cloned().collect()
    }

    /// Queue a guid for delivery once the client reconnects. Bounded with
    /// drop-oldest.
    pub fn enqueue_to_deliver(&self, guid: Guid) {
        let mut inner = self.inner.lock();
        if inner.enqueued.len() >= inner.max_enqueued {
            let dropped = inner.enqueued.pop_front();
            debug!(
                "session <{}> offline queue full, dropping oldest {:?}",
                self.client_id, dropped
            );
        }
        inner.enqueued.push_back(guid);
    }

    pub fn remove_enqueued(&self, guid: Guid) {
        self.inner.lock().enqueued.retain(|g| *g != guid);
    }

    /// Resolve the queued guids against the message store, oldest first.
    /// Guids whose body has disappeared are skipped.
    pub fn stored_messages(&self) -> Vec<StoredMessage> {
        let guids: Vec<Guid> = self.inner.lock().enqueued.iter().copied().collect();
        guids
            .iter()
            .filter_map(|guid| {
                let found = self.store.message_by_guid(guid);
                if found.is_none() {
                    trace!(
                        "session <{}> enqueued guid {} has no stored body",
                        self.client_id,
                        guid
                    );
                }
                found
            })
            .collect()
    }

    /// Next free packet identifier, skipping ids tied up in either
    /// handshake direction. Wraps 65535 -> 1; id 0 is never produced.
    pub fn next_packet_id(&self) -> u16 {
        let mut inner = self.inner.lock();
        loop {
            let id = inner.next_packet_id;
            inner.next_packet_id = inner.next_packet_id.wrapping_add(1);
            if inner.next_packet_id == 0 {
                inner.next_packet_id = 1;
            }
            if !inner.inflight.contains_key(&id)
                && !inner.second_phase.contains(&id)
                && !inner.inbound.contains_key(&id)
            {
                return id;
            }
        }
    }

    /// Track an outbound QoS > 0 publish awaiting its first acknowledgment.
    pub fn in_flight_ack_waiting(&self, guid: Guid, packet_id: u16) {
        self.inner.lock().inflight.insert(packet_id, guid);
    }

    /// First acknowledgment (PUBACK or PUBREC) for an outbound publish.
    /// Unknown ids are a logged no-op.
    pub fn in_flight_acknowledged(&self, packet_id: u16) -> Option<Guid> {
        let removed = self.inner.lock().inflight.remove(&packet_id);
        if removed.is_none() {
            debug!(
                "session <{}> ack for unknown inflight packet id {}",
                self.client_id, packet_id
            );
        }
        removed
    }

    /// Outbound QoS 2: PUBREL sent, awaiting PUBCOMP.
    pub fn second_phase_ack_waiting(&self, packet_id: u16) {
        self.inner.lock().second_phase.insert(packet_id);
    }

    /// Outbound QoS 2 handshake completed by PUBCOMP.
    pub fn second_phase_acknowledged(&self, packet_id: u16) {
        if !self.inner.lock().second_phase.remove(&packet_id) {
            debug!(
                "session <{}> PUBCOMP for unknown packet id {}",
                self.client_id, packet_id
            );
        }
    }

    /// Number of outbound publishes awaiting their first acknowledgment.
    pub fn inflight_count(&self) -> usize {
        self.inner.lock().inflight.len()
    }

    /// Number of outbound QoS 2 handshakes awaiting PUBCOMP.
    pub fn second_phase_count(&self) -> usize {
        self.inner.lock().second_phase.len()
    }

    /// Hold an inbound QoS 2 publish until its PUBREL arrives.
    pub fn track_inbound(&self, packet_id: u16, guid: Guid) {
        self.inner.lock().inbound.insert(packet_id, guid);
    }

    /// Resolve (and release) the inbound QoS 2 publish for a PUBREL. A
    /// retransmitted PUBREL finds nothing and completes with PUBCOMP alone.
    pub fn stored_message(&self, packet_id: u16) -> Option<StoredMessage> {
        let guid = self.inner.lock().inbound.remove(&packet_id)?;
        self.store.message_by_guid(&guid)
    }
}

impl SessionInner {
    fn wipe(&mut self) {
        self.subscriptions.clear();
        self.inflight.clear();
        self.second_phase.clear();
        self.inbound.clear();
        self.enqueued.clear();
    }

    fn purge(&mut self) {
        self.wipe();
        self.purged = true;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Session")
            .field("client_id", &self.client_id)
            .field("clean_session", &inner.clean_session)
            .field("active", &inner.active)
            .field("inflight", &inner.inflight.len())
            .field("enqueued", &inner.enqueued.len())
            .finish()
    }
}

/// Capability set over the session registry.
pub trait SessionStore: Send + Sync {
    /// Look up the session for a client id, if one exists.
    fn session_for_client(&self, client_id: &str) -> Option<Arc<Session>>;

    /// Create (and register) a fresh session, replacing any prior record.
    fn create_new_session(&self, client_id: &str, clean_session: bool) -> Arc<Session>;

    /// Allocate a packet id from a client's session, if it exists.
    fn next_packet_id(&self, client_id: &str) -> Option<u16>;
}

/// In-memory session registry.
pub struct MemorySessionStore {
    sessions: DashMap<Arc<str>, Arc<Session>>,
    store: Arc<dyn MessageStore>,
    max_enqueued: usize,
}

impl MemorySessionStore {
    pub fn new(store: Arc<dyn MessageStore>, max_enqueued: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            store,
            max_enqueued,
        }
    }

    /// Number of live (non-purged) sessions.
    pub fn len(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| !entry.value().is_purged())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn session_for_client(&self, client_id: &str) -> Option<Arc<Session>> {
        let session = {
            let entry = self.sessions.get(client_id)?;
            entry.value().clone()
        };
        if session.is_purged() {
            self.sessions.remove(client_id);
            return None;
        }
        Some(session)
    }

    fn create_new_session(&self, client_id: &str, clean_session: bool) -> Arc<Session> {
        let client_id: Arc<str> = client_id.into();
        let session = Arc::new(Session::new(
            client_id.clone(),
            clean_session,
            self.store.clone(),
            self.max_enqueued,
        ));
        self.sessions.insert(client_id, session.clone());
        session
    }

    fn next_packet_id(&self, client_id: &str) -> Option<u16> {
        self.session_for_client(client_id)
            .map(|session| session.next_packet_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::QoS;
    use crate::store::MemoryMessageStore;
    use bytes::Bytes;

    fn store() -> Arc<MemoryMessageStore> {
        Arc::new(MemoryMessageStore::new())
    }

    fn stored(topic: &str) -> StoredMessage {
        StoredMessage {
            guid: None,
            client_id: "pub".into(),
            topic: topic.to_string(),
            qos: QoS::AtLeastOnce,
            payload: Bytes::from_static(b"x"),
            retained: false,
            packet_id: None,
        }
    }

    #[test]
    fn test_packet_id_skips_ids_in_use() {
        let session = Session::new("c".into(), true, store(), 16);
        let g = Guid::generate();

        assert_eq!(session.next_packet_id(), 1);
        session.in_flight_ack_waiting(g, 2);
        assert_eq!(session.next_packet_id(), 3);

        session.in_flight_acknowledged(2);
        session.second_phase_ack_waiting(4);
        assert_eq!(session.next_packet_id(), 5);
    }

    #[test]
    fn test_packet_id_wraps_past_zero() {
        let session = Session::new("c".into(), true, store(), 16);
        session.inner.lock().next_packet_id = 65_535;
        assert_eq!(session.next_packet_id(), 65_535);
        assert_eq!(session.next_packet_id(), 1);
    }

    #[test]
    fn test_offline_queue_drop_oldest() {
        let messages = store();
        let session = Session::new("c".into(), false, messages.clone(), 2);

        let g1 = messages.store_publish_for_future(stored("t/1"));
        let g2 = messages.store_publish_for_future(stored("t/2"));
        let g3 = messages.store_publish_for_future(stored("t/3"));

        session.enqueue_to_deliver(g1);
        session.enqueue_to_deliver(g2);
        session.enqueue_to_deliver(g3);

        let queued = session.stored_messages();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].topic, "t/2");
        assert_eq!(queued[1].topic, "t/3");

        session.remove_enqueued(g2);
        assert_eq!(session.stored_messages().len(), 1);
    }

    #[test]
    fn test_subscribe_rejects_invalid_filter() {
        let session = Session::new("c".into(), true, store(), 16);
        let good = Subscription::new("c".into(), "a/+", QoS::AtMostOnce);
        let bad = Subscription::new("c".into(), "a/#/b", QoS::AtMostOnce);

        assert!(session.subscribe("a/+", good));
        assert!(!session.subscribe("a/#/b", bad));
        assert_eq!(session.subscriptions().len(), 1);
    }

    #[test]
    fn test_inbound_release_is_one_shot() {
        let messages = store();
        let session = Session::new("c".into(), true, messages.clone(), 16);
        let guid = messages.store_publish_for_future(stored("t/q2"));

        session.track_inbound(7, guid);
        let first = session.stored_message(7).unwrap();
        assert_eq!(first.topic, "t/q2");
        assert!(session.stored_message(7).is_none());
    }

    #[test]
    fn test_clean_session_purged_on_disconnect() {
        let sessions = MemorySessionStore::new(store(), 16);
        let session = sessions.create_new_session("c", true);
        session.activate();
        assert!(sessions.session_for_client("c").is_some());

        session.disconnect();
        assert!(sessions.session_for_client("c").is_none());
        assert_eq!(sessions.len(), 0);
    }

    #[test]
    fn test_persistent_session_survives_disconnect() {
        let sessions = MemorySessionStore::new(store(), 16);
        let session = sessions.create_new_session("c", false);
        session.activate();
        session.subscribe(
            "a/#",
            Subscription::new("c".into(), "a/#", QoS::AtLeastOnce),
        );

        session.disconnect();
        let resumed = sessions.session_for_client("c").unwrap();
        assert!(!resumed.is_active());
        assert_eq!(resumed.subscriptions().len(), 1);
    }
}
