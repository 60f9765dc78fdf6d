//! Connection lifecycle: acceptance sequence, rejection paths, takeover,
//! and will handling on abnormal disconnect.

mod common;

use bytes::Bytes;
use common::*;
use tidemq::protocol::{Connect, ConnectReturnCode, QoS};
use tidemq::{Channel, ProcessorConfig};

#[tokio::test]
async fn test_rejects_unknown_protocol_version() {
    let harness = Harness::new();
    let (channel, mut rx) = Channel::open();

    let connect = Connect {
        protocol_version: 5,
        client_id: "c1".to_string(),
        ..Connect::default()
    };
    harness.processor.handle_connect(&channel, connect).await;

    let connack = expect_connack(&mut rx);
    assert_eq!(
        connack.return_code,
        ConnectReturnCode::UnacceptableProtocolVersion
    );
    assert!(channel.is_closed());
    assert!(!harness.processor.is_connected("c1"));
}

#[tokio::test]
async fn test_rejects_empty_client_id_and_stays_silent() {
    let harness = Harness::new();
    let (channel, mut rx) = Channel::open();

    let connect = Connect {
        client_id: String::new(),
        ..Connect::default()
    };
    harness.processor.handle_connect(&channel, connect).await;

    let connack = expect_connack(&mut rx);
    assert_eq!(connack.return_code, ConnectReturnCode::IdentifierRejected);
    assert!(channel.is_closed());
    // No connected notification for a rejected client id.
    assert!(harness.events.lock().is_empty());
}

#[tokio::test]
async fn test_rejects_bad_credentials() {
    let harness = Harness::new();
    let (channel, mut rx) = Channel::open();

    let connect = Connect {
        client_id: "c1".to_string(),
        username: Some("alice".to_string()),
        password: Some(Bytes::from_static(b"wrong")),
        ..Connect::default()
    };
    harness.processor.handle_connect(&channel, connect).await;

    let connack = expect_connack(&mut rx);
    assert_eq!(connack.return_code, ConnectReturnCode::BadUsernameOrPassword);
    assert!(channel.is_closed());
}

#[tokio::test]
async fn test_accepts_good_credentials_and_tags_username() {
    let harness = Harness::new();
    let connect = Connect {
        client_id: "c1".to_string(),
        username: Some("alice".to_string()),
        password: Some(Bytes::from_static(b"secret")),
        ..Connect::default()
    };
    let (channel, _rx) = harness.connect_with(connect).await;
    assert_eq!(channel.username().as_deref(), Some("alice"));
    assert!(harness.processor.is_connected("c1"));
}

#[tokio::test]
async fn test_username_without_password_is_rejected() {
    // Anonymous access is allowed, but a user flag without a password flag
    // is still a credential rejection and must not reach the auth service.
    let harness = Harness::new();
    let (channel, mut rx) = Channel::open();

    let connect = Connect {
        client_id: "c1".to_string(),
        username: Some("alice".to_string()),
        password: None,
        ..Connect::default()
    };
    harness.processor.handle_connect(&channel, connect).await;

    let connack = expect_connack(&mut rx);
    assert_eq!(connack.return_code, ConnectReturnCode::BadUsernameOrPassword);
    assert!(!channel.is_closed());
    assert!(!harness.processor.is_connected("c1"));
}

#[tokio::test]
async fn test_anonymous_refused_when_disallowed() {
    let harness = Harness::with_config(ProcessorConfig {
        allow_anonymous: false,
        ..ProcessorConfig::default()
    });
    let (channel, mut rx) = Channel::open();

    let connect = Connect {
        client_id: "c1".to_string(),
        ..Connect::default()
    };
    harness.processor.handle_connect(&channel, connect).await;

    let connack = expect_connack(&mut rx);
    assert_eq!(connack.return_code, ConnectReturnCode::BadUsernameOrPassword);
}

#[tokio::test]
async fn test_keep_alive_installs_idle_timeout() {
    let harness = Harness::new();
    let connect = Connect {
        client_id: "c1".to_string(),
        keep_alive: 10,
        ..Connect::default()
    };
    let (channel, _rx) = harness.connect_with(connect).await;
    assert_eq!(
        channel.idle_timeout(),
        Some(std::time::Duration::from_secs(15))
    );

    // Odd keep-alive rounds up.
    let connect = Connect {
        client_id: "c2".to_string(),
        keep_alive: 5,
        ..Connect::default()
    };
    let (channel, _rx) = harness.connect_with(connect).await;
    assert_eq!(
        channel.idle_timeout(),
        Some(std::time::Duration::from_secs(8))
    );

    // Zero disables idle detection.
    let connect = Connect {
        client_id: "c3".to_string(),
        keep_alive: 0,
        ..Connect::default()
    };
    let (channel, _rx) = harness.connect_with(connect).await;
    assert_eq!(channel.idle_timeout(), None);
}

#[tokio::test]
async fn test_takeover_steals_prior_channel_and_suppresses_will() {
    let harness = Harness::new();

    let (c1, mut rx1) = Channel::open();
    harness
        .processor
        .handle_connect(&c1, connect_with_will("x", "x/bye", b"gone", QoS::AtLeastOnce))
        .await;
    expect_connack(&mut rx1);

    // Watcher for the will topic.
    let (_fc, mut f_rx) = {
        let (channel, mut rx) = harness.connect("watcher", true).await;
        harness
            .subscribe(&channel, &mut rx, "x/#", QoS::AtLeastOnce)
            .await;
        (channel, rx)
    };

    // Second CONNECT for the same client id over a new channel.
    let (c2, mut rx2) = Channel::open();
    harness
        .processor
        .handle_connect(&c2, connect_with_will("x", "x/bye", b"gone", QoS::AtLeastOnce))
        .await;
    expect_connack(&mut rx2);

    assert!(c1.is_session_stolen());
    assert!(c1.is_closed());
    let registered = harness.processor.connected_channel("x").unwrap();
    assert!(std::sync::Arc::ptr_eq(&registered, &c2));

    // The stolen channel's connection-lost does not publish the will and
    // does not unregister the new channel.
    harness.processor.handle_connection_lost("x", true, &c1);
    assert!(harness.processor.is_connected("x"));
    assert_no_packet(&mut f_rx);
    assert!(harness.processor.has_will("x"));
}

#[tokio::test]
async fn test_will_published_on_lost_connection() {
    let harness = Harness::new();

    let (e_channel, mut e_rx) = Channel::open();
    harness
        .processor
        .handle_connect(
            &e_channel,
            connect_with_will("e", "e/bye", b"down", QoS::AtLeastOnce),
        )
        .await;
    expect_connack(&mut e_rx);
    assert!(harness.processor.has_will("e"));

    let (f_channel, mut f_rx) = harness.connect("f", true).await;
    harness
        .subscribe(&f_channel, &mut f_rx, "e/#", QoS::AtLeastOnce)
        .await;

    harness.processor.handle_connection_lost("e", false, &e_channel);

    let will = expect_publish(&mut f_rx);
    assert_eq!(will.topic.as_ref(), "e/bye");
    assert_eq!(will.qos, QoS::AtLeastOnce);
    assert_eq!(will.payload.as_ref(), b"down");
    assert!(will.packet_id.is_some());
    assert!(!will.retain);

    assert!(!harness.processor.has_will("e"));
    assert!(!harness.processor.is_connected("e"));
}

#[tokio::test]
async fn test_graceful_disconnect_discards_will() {
    let harness = Harness::new();

    let (e_channel, mut e_rx) = Channel::open();
    harness
        .processor
        .handle_connect(
            &e_channel,
            connect_with_will("e", "e/bye", b"down", QoS::AtLeastOnce),
        )
        .await;
    expect_connack(&mut e_rx);

    let (f_channel, mut f_rx) = harness.connect("f", true).await;
    harness
        .subscribe(&f_channel, &mut f_rx, "e/#", QoS::AtLeastOnce)
        .await;

    harness.processor.handle_disconnect(&e_channel).await;
    assert!(e_channel.is_closed());
    assert!(!harness.processor.is_connected("e"));
    assert!(!harness.processor.has_will("e"));
    assert_no_packet(&mut f_rx);

    assert!(harness
        .events
        .lock()
        .contains(&"disconnected:e".to_string()));
}

#[tokio::test]
async fn test_connection_lost_respects_newer_registration() {
    let harness = Harness::new();
    let (old_channel, _old_rx) = harness.connect("c", true).await;
    let (new_channel, mut new_rx) = Channel::open();

    // Takeover swaps the registry to the new channel.
    harness
        .processor
        .handle_connect(
            &new_channel,
            Connect {
                client_id: "c".to_string(),
                ..Connect::default()
            },
        )
        .await;
    expect_connack(&mut new_rx);

    // The old channel's lost event must not remove the new descriptor,
    // even without the stolen tag.
    harness
        .processor
        .handle_connection_lost("c", false, &old_channel);
    assert!(harness.processor.is_connected("c"));
}

#[tokio::test]
async fn test_connected_event_fires_on_accept() {
    let harness = Harness::new();
    let (_channel, _rx) = harness.connect("c1", true).await;
    assert_eq!(*harness.events.lock(), vec!["connected:c1".to_string()]);
    assert_eq!(harness.processor.connected_count(), 1);
}
