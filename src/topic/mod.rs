//! Subscription index
//!
//! Wildcard matching of concrete topics against the set of active
//! subscriptions, backed by a topic trie keyed on filter levels.

mod trie;
pub mod validation;

pub use trie::TopicTrie;
pub use validation::{match_topics, validate_topic_filter, validate_topic_name};

use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::protocol::QoS;

/// One client's subscription to a topic filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub client_id: Arc<str>,
    pub topic_filter: String,
    pub requested_qos: QoS,
}

impl Subscription {
    pub fn new(client_id: Arc<str>, topic_filter: impl Into<String>, requested_qos: QoS) -> Self {
        Self {
            client_id,
            topic_filter: topic_filter.into(),
            requested_qos,
        }
    }
}

/// Quick validity check used where only a yes/no answer matters.
pub fn validate(filter: &str) -> bool {
    validate_topic_filter(filter).is_ok()
}

/// Thread-safe subscription index over a topic trie.
///
/// Each trie value is the list of subscribers sharing one filter; a client
/// appears at most once per filter (re-subscribing replaces the entry, per
/// MQTT 3.1.1 §3.8.4).
#[derive(Default)]
pub struct SubscriptionIndex {
    trie: RwLock<TopicTrie<Vec<Subscription>>>,
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription.
    pub fn add(&self, subscription: Subscription) {
        let mut trie = self.trie.write();
        if let Some(subs) = trie.get_mut(&subscription.topic_filter) {
            subs.retain(|s| s.client_id != subscription.client_id);
            subs.push(subscription);
        } else {
            let filter = subscription.topic_filter.clone();
            trie.insert(&filter, vec![subscription]);
        }
    }

    /// Remove one client's subscription to a filter. Unknown pairs are a
    /// silent no-op.
    pub fn remove_subscription(&self, topic_filter: &str, client_id: &str) {
        let mut trie = self.trie.write();
        let Some(subs) = trie.get_mut(topic_filter) else {
            return;
        };
        subs.retain(|s| s.client_id.as_ref() != client_id);
        if subs.is_empty() {
            trie.remove(topic_filter);
        }
    }

    /// Remove every subscription held by a client (clean-session teardown).
    pub fn remove_all(&self, client_id: &str) {
        self.trie.write().prune(|subs| {
            subs.retain(|s| s.client_id.as_ref() != client_id);
            subs.is_empty()
        });
    }

    /// All subscriptions whose filter matches the concrete topic.
    pub fn matches(&self, topic: &str) -> SmallVec<[Subscription; 16]> {
        let trie = self.trie.read();
        let mut found: SmallVec<[Subscription; 16]> = SmallVec::new();
        trie.matches(topic, |subs| found.extend(subs.iter().cloned()));
        found
    }
}
