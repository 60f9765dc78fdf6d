//! Shared test harness
//!
//! Wires a processor to in-memory collaborators and a recording
//! interceptor, and provides helpers for driving handlers and asserting on
//! a channel's outbound queue.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;

use tidemq::protocol::{ConnAck, Connect, ConnectReturnCode, Packet, Publish, QoS, Will};
use tidemq::topic::Subscription;
use tidemq::{
    Channel, Interceptor, MemoryMessageStore, MemorySessionStore, Processor, ProcessorConfig,
    StaticAuth,
};

/// Interceptor that records one line per notification.
#[derive(Default)]
pub struct RecordingInterceptor {
    pub events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Interceptor for RecordingInterceptor {
    async fn client_connected(&self, connect: &Connect) {
        self.events
            .lock()
            .push(format!("connected:{}", connect.client_id));
    }

    async fn client_disconnected(&self, client_id: &str) {
        self.events.lock().push(format!("disconnected:{}", client_id));
    }

    async fn topic_published(&self, publish: &Publish, client_id: &str) {
        self.events
            .lock()
            .push(format!("published:{}:{}", client_id, publish.topic));
    }

    async fn topic_subscribed(&self, subscription: &Subscription) {
        self.events.lock().push(format!(
            "subscribed:{}:{}",
            subscription.client_id, subscription.topic_filter
        ));
    }

    async fn topic_unsubscribed(&self, topic_filter: &str, client_id: &str) {
        self.events
            .lock()
            .push(format!("unsubscribed:{}:{}", client_id, topic_filter));
    }
}

pub struct Harness {
    pub processor: Processor,
    pub messages: Arc<MemoryMessageStore>,
    pub sessions: Arc<MemorySessionStore>,
    pub events: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    /// Harness with anonymous access and one known credential pair
    /// (alice / secret).
    pub fn new() -> Self {
        Self::with_config(ProcessorConfig::default())
    }

    pub fn with_config(config: ProcessorConfig) -> Self {
        // Log output shows up with --nocapture; repeat initialization is fine.
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let messages = Arc::new(MemoryMessageStore::new());
        let sessions = Arc::new(MemorySessionStore::new(
            messages.clone(),
            config.max_queued_messages,
        ));
        let events = Arc::new(Mutex::new(Vec::new()));
        let interceptor = RecordingInterceptor {
            events: events.clone(),
        };
        let processor = Processor::new(
            Arc::new(tidemq::SubscriptionIndex::new()),
            messages.clone(),
            sessions.clone(),
            Arc::new(StaticAuth::new().with_user("alice", "secret")),
            Arc::new(interceptor),
            &config,
        );
        Self {
            processor,
            messages,
            sessions,
            events,
        }
    }

    /// Open a channel and run a plain CONNECT through acceptance,
    /// swallowing the CONNACK.
    pub async fn connect(
        &self,
        client_id: &str,
        clean_session: bool,
    ) -> (Arc<Channel>, UnboundedReceiver<Packet>) {
        let connect = Connect {
            client_id: client_id.to_string(),
            clean_session,
            ..Connect::default()
        };
        self.connect_with(connect).await
    }

    /// Open a channel and run an arbitrary CONNECT, asserting acceptance.
    pub async fn connect_with(
        &self,
        connect: Connect,
    ) -> (Arc<Channel>, UnboundedReceiver<Packet>) {
        let (channel, mut rx) = Channel::open();
        self.processor.handle_connect(&channel, connect).await;
        let connack = expect_connack(&mut rx);
        assert_eq!(connack.return_code, ConnectReturnCode::Accepted);
        (channel, rx)
    }

    /// Subscribe one filter and assert the granted QoS.
    pub async fn subscribe(
        &self,
        channel: &Arc<Channel>,
        rx: &mut UnboundedReceiver<Packet>,
        filter: &str,
        qos: QoS,
    ) {
        use tidemq::protocol::{SubAckCode, Subscribe, SubscribeTopic};
        self.processor
            .handle_subscribe(
                channel,
                Subscribe {
                    packet_id: 10,
                    topics: vec![SubscribeTopic {
                        topic_filter: filter.to_string(),
                        qos,
                    }],
                },
            )
            .await;
        match recv(rx) {
            Packet::SubAck(suback) => {
                assert_eq!(suback.return_codes, vec![SubAckCode::Granted(qos)]);
            }
            other => panic!("expected SUBACK, got {:?}", other),
        }
    }
}

/// Next packet already queued on a channel; panics when the queue is empty.
pub fn recv(rx: &mut UnboundedReceiver<Packet>) -> Packet {
    rx.try_recv().expect("expected a queued packet")
}

pub fn expect_connack(rx: &mut UnboundedReceiver<Packet>) -> ConnAck {
    match recv(rx) {
        Packet::ConnAck(connack) => connack,
        other => panic!("expected CONNACK, got {:?}", other),
    }
}

pub fn expect_publish(rx: &mut UnboundedReceiver<Packet>) -> Publish {
    match recv(rx) {
        Packet::Publish(publish) => publish,
        other => panic!("expected PUBLISH, got {:?}", other),
    }
}

pub fn assert_no_packet(rx: &mut UnboundedReceiver<Packet>) {
    if let Ok(packet) = rx.try_recv() {
        panic!("expected no packet, got {:?}", packet);
    }
}

/// Build a PUBLISH with the given wire fields.
pub fn publish(
    topic: &str,
    qos: QoS,
    payload: &'static [u8],
    retain: bool,
    packet_id: Option<u16>,
) -> Publish {
    Publish {
        dup: false,
        qos,
        retain,
        topic: Arc::from(topic),
        packet_id,
        payload: Bytes::from_static(payload),
    }
}

/// Build a CONNECT carrying a will.
pub fn connect_with_will(client_id: &str, topic: &str, payload: &'static [u8], qos: QoS) -> Connect {
    Connect {
        client_id: client_id.to_string(),
        clean_session: true,
        will: Some(Will {
            topic: topic.to_string(),
            payload: Bytes::from_static(payload),
            qos,
            retain: false,
        }),
        ..Connect::default()
    }
}
