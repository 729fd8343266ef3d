//! Control channel behavior against an in-process broker.

use doorlink::config::DeviceConfig;
use doorlink::control::{BrokerFrame, ClientFrame, ControlChannel, READY_ANNOUNCEMENT};
use doorlink::identity::{DeviceId, LinkIdentity};
use doorlink::registry::CommandRegistry;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

fn test_identity() -> LinkIdentity {
    LinkIdentity::new(DeviceId::new([0, 1, 2, 3, 4, 5]), "doorbell/")
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        match timeout(Duration::from_secs(2), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return text,
            Ok(Some(Ok(_))) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

#[tokio::test]
async fn subscribes_announces_ready_once_and_dispatches_commands() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = DeviceConfig {
        broker_url: format!("ws://{addr}"),
        ..DeviceConfig::default()
    };
    let identity = test_identity();
    let cmd_topic = identity.cmd_topic().to_string();
    let data_topic = identity.data_topic().to_string();

    let hits = Arc::new(AtomicUsize::new(0));
    let mut registry = CommandRegistry::new();
    {
        let hits = Arc::clone(&hits);
        registry
            .register(
                "ring",
                Box::new(move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
    }

    let (_online_tx, online_rx) = watch::channel(true);
    let control = ControlChannel::start(&config, &identity, Arc::new(registry), online_rx);

    let (stream, _) = timeout(Duration::from_secs(2), listener.accept())
        .await
        .unwrap()
        .unwrap();
    let mut ws = accept_async(stream).await.unwrap();

    // The device subscribes to its command topic first.
    let frame: ClientFrame = serde_json::from_str(&next_text(&mut ws).await).unwrap();
    match &frame {
        ClientFrame::Subscribe { topic } => assert_eq!(topic, &cmd_topic),
        other => panic!("expected subscribe, got {other:?}"),
    }

    // Readiness arrives strictly after the subscription is acknowledged.
    let suback = BrokerFrame::SubAck {
        topic: cmd_topic.clone(),
    };
    ws.send(Message::Text(serde_json::to_string(&suback).unwrap()))
        .await
        .unwrap();
    let frame: ClientFrame = serde_json::from_str(&next_text(&mut ws).await).unwrap();
    match frame {
        ClientFrame::Publish { topic, payload } => {
            assert_eq!(topic, data_topic);
            assert_eq!(payload, READY_ANNOUNCEMENT);
        }
        other => panic!("expected ready publish, got {other:?}"),
    }

    // A well-formed command envelope reaches the registered action.
    let command = BrokerFrame::Message {
        topic: cmd_topic.clone(),
        payload: r#"{"cmd":"ring"}"#.into(),
    };
    ws.send(Message::Text(serde_json::to_string(&command).unwrap()))
        .await
        .unwrap();
    wait_for(|| hits.load(Ordering::SeqCst) == 1).await;

    // Malformed payloads are counted and never dispatched.
    let garbage = BrokerFrame::Message {
        topic: cmd_topic.clone(),
        payload: "not json".into(),
    };
    ws.send(Message::Text(serde_json::to_string(&garbage).unwrap()))
        .await
        .unwrap();
    wait_for(|| control.dropped_messages() == 1).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // Fire-and-forget publish lands on the data topic.
    control.publish(r#"{"status":"ring"}"#);
    let frame: ClientFrame = serde_json::from_str(&next_text(&mut ws).await).unwrap();
    match frame {
        ClientFrame::Publish { topic, payload } => {
            assert_eq!(topic, data_topic);
            assert_eq!(payload, r#"{"status":"ring"}"#);
        }
        other => panic!("expected publish, got {other:?}"),
    }

    // A duplicate acknowledgement never produces a second readiness
    // announcement within the same connect cycle.
    let suback = BrokerFrame::SubAck { topic: cmd_topic };
    ws.send(Message::Text(serde_json::to_string(&suback).unwrap()))
        .await
        .unwrap();
    match timeout(Duration::from_millis(200), ws.next()).await {
        Err(_) => {}
        Ok(msg) => panic!("unexpected frame after duplicate suback: {msg:?}"),
    }

    control.close();
}

#[tokio::test]
async fn does_not_connect_until_link_is_online() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = DeviceConfig {
        broker_url: format!("ws://{addr}"),
        ..DeviceConfig::default()
    };
    let identity = test_identity();
    let (online_tx, online_rx) = watch::channel(false);
    let control = ControlChannel::start(&config, &identity, Arc::new(CommandRegistry::new()), online_rx);

    // No connection attempt while the link is down.
    assert!(
        timeout(Duration::from_millis(200), listener.accept())
            .await
            .is_err(),
        "channel connected before the link was online"
    );

    online_tx.send(true).unwrap();
    let (stream, _) = timeout(Duration::from_secs(2), listener.accept())
        .await
        .expect("channel never connected")
        .unwrap();
    let mut ws = accept_async(stream).await.unwrap();
    let frame: ClientFrame = serde_json::from_str(&next_text(&mut ws).await).unwrap();
    assert!(matches!(frame, ClientFrame::Subscribe { .. }));

    control.close();
}
