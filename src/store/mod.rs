//! Message store
//!
//! Persistence seam for QoS 1/2 message bodies and the retained map. The
//! processor only sees the [`MessageStore`] capability; [`MemoryMessageStore`]
//! is the in-memory implementation used by tests and embedders that do not
//! need durability.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::protocol::QoS;

/// Store-assigned unique id of a stored message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid(Uuid);

impl Guid {
    pub fn generate() -> Self {
        Guid(Uuid::new_v4())
    }
}

impl std::fmt::Display for Guid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A message body held by the store, tagged with its publisher.
///
/// `guid` is `None` until the store assigns one in
/// [`MessageStore::store_publish_for_future`]. `packet_id` is the id the
/// publisher used, kept for replay of enqueued messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub guid: Option<Guid>,
    pub client_id: Arc<str>,
    pub topic: String,
    pub qos: QoS,
    pub payload: Bytes,
    pub retained: bool,
    pub packet_id: Option<u16>,
}

/// Capability set over message bodies and the retained map.
pub trait MessageStore: Send + Sync {
    /// Persist a message body, assigning its guid.
    fn store_publish_for_future(&self, message: StoredMessage) -> Guid;

    /// Fetch a previously stored body.
    fn message_by_guid(&self, guid: &Guid) -> Option<StoredMessage>;

    /// Make `guid` the retained message for `topic`.
    fn store_retained(&self, topic: &str, guid: Guid);

    /// Drop the retained entry for `topic`, if any.
    fn clean_retained(&self, topic: &str);

    /// Resolve every current retained entry whose topic satisfies the
    /// matcher. This is the source of retained replay on subscribe.
    fn search_matching(&self, matches: &dyn Fn(&str) -> bool) -> Vec<StoredMessage>;
}

/// In-memory message store: a guid-keyed body map plus the retained map.
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: DashMap<Guid, StoredMessage>,
    retained: DashMap<String, Guid>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of retained topics, for introspection and tests.
    pub fn retained_count(&self) -> usize {
        self.retained.len()
    }

    /// Guid currently retained for a topic, if any.
    pub fn retained_guid(&self, topic: &str) -> Option<Guid> {
        self.retained.get(topic).map(|entry| *entry.value())
    }
}

impl MessageStore for MemoryMessageStore {
    fn store_publish_for_future(&self, mut message: StoredMessage) -> Guid {
        let guid = Guid::generate();
        message.guid = Some(guid);
        self.messages.insert(guid, message);
        guid
    }

    fn message_by_guid(&self, guid: &Guid) -> Option<StoredMessage> {
        self.messages.get(guid).map(|entry| entry.value().clone())
    }

    fn store_retained(&self, topic: &str, guid: Guid) {
        debug!("retaining message {} on topic <{}>", guid, topic);
        self.retained.insert(topic.to_string(), guid);
    }

    fn clean_retained(&self, topic: &str) {
        self.retained.remove(topic);
    }

    fn search_matching(&self, matches: &dyn Fn(&str) -> bool) -> Vec<StoredMessage> {
        self.retained
            .iter()
            .filter(|entry| matches(entry.key()))
            .filter_map(|entry| self.message_by_guid(entry.value()))
            .collect()
    }
}
