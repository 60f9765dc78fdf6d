//! Lifecycle event interception
//!
//! Observers of broker lifecycle events: connects, disconnects, publishes,
//! subscription changes. All methods default to no-ops, so implementors
//! pick only the events they care about. Notifications are fire-and-forget;
//! an interceptor cannot veto anything.

use std::sync::Arc;

use async_trait::async_trait;

use crate::protocol::{Connect, Publish};
use crate::topic::Subscription;

/// Observer of broker lifecycle events.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// A client completed the CONNECT acceptance sequence.
    async fn client_connected(&self, _connect: &Connect) {}

    /// A client disconnected (gracefully or not).
    async fn client_disconnected(&self, _client_id: &str) {}

    /// A publish finished its handler (fan-out or handshake initiation).
    async fn topic_published(&self, _publish: &Publish, _client_id: &str) {}

    /// A subscription was accepted and indexed.
    async fn topic_subscribed(&self, _subscription: &Subscription) {}

    /// A topic filter was unsubscribed.
    async fn topic_unsubscribed(&self, _topic_filter: &str, _client_id: &str) {}
}

/// Interceptor that observes nothing.
#[derive(Default)]
pub struct NoopInterceptor;

#[async_trait]
impl Interceptor for NoopInterceptor {}

#[async_trait]
impl<T: Interceptor + ?Sized> Interceptor for Arc<T> {
    async fn client_connected(&self, connect: &Connect) {
        (**self).client_connected(connect).await;
    }

    async fn client_disconnected(&self, client_id: &str) {
        (**self).client_disconnected(client_id).await;
    }

    async fn topic_published(&self, publish: &Publish, client_id: &str) {
        (**self).topic_published(publish, client_id).await;
    }

    async fn topic_subscribed(&self, subscription: &Subscription) {
        (**self).topic_subscribed(subscription).await;
    }

    async fn topic_unsubscribed(&self, topic_filter: &str, client_id: &str) {
        (**self).topic_unsubscribed(topic_filter, client_id).await;
    }
}

/// Fans every event out to a list of interceptors, in registration order.
#[derive(Default)]
pub struct CompositeInterceptor {
    observers: Vec<Box<dyn Interceptor>>,
}

impl CompositeInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.observers.push(Box::new(interceptor));
        self
    }
}

#[async_trait]
impl Interceptor for CompositeInterceptor {
    async fn client_connected(&self, connect: &Connect) {
        for observer in &self.observers {
            observer.client_connected(connect).await;
        }
    }

    async fn client_disconnected(&self, client_id: &str) {
        for observer in &self.observers {
            observer.client_disconnected(client_id).await;
        }
    }

    async fn topic_published(&self, publish: &Publish, client_id: &str) {
        for observer in &self.observers {
            observer.topic_published(publish, client_id).await;
        }
    }

    async fn topic_subscribed(&self, subscription: &Subscription) {
        for observer in &self.observers {
            observer.topic_subscribed(subscription).await;
        }
    }

    async fn topic_unsubscribed(&self, topic_filter: &str, client_id: &str) {
        for observer in &self.observers {
            observer.topic_unsubscribed(topic_filter, client_id).await;
        }
    }
}
