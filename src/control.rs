//! Control channel — pub/sub client for command delivery and status
//!
//! Once the link is online the channel connects to the broker, subscribes to
//! the per-device command topic and, after the subscription is acknowledged,
//! announces readiness on the data topic. Inbound command envelopes are
//! parsed and dispatched through the [`CommandRegistry`]; outbound publishes
//! are fire-and-forget at the lowest delivery-assurance level.

use crate::config::DeviceConfig;
use crate::identity::LinkIdentity;
use crate::registry::CommandRegistry;
use anyhow::{anyhow, Result};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Readiness announcement, published once per successful connect cycle.
pub const READY_ANNOUNCEMENT: &str = r#"{"status":"ready"}"#;

/// Frames sent to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { topic: String },
    Publish { topic: String, payload: String },
}

/// Frames received from the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrokerFrame {
    #[serde(rename = "suback")]
    SubAck { topic: String },
    Message { topic: String, payload: String },
}

/// Command envelope carried on the command topic. Any other top-level shape
/// is rejected.
#[derive(Debug, Deserialize)]
struct CommandEnvelope {
    cmd: String,
}

/// Handle to the control channel task.
pub struct ControlChannel {
    publish_tx: mpsc::Sender<String>,
    dropped: Arc<AtomicU64>,
    shutdown_tx: watch::Sender<bool>,
}

impl ControlChannel {
    /// Spawn the channel task. The registry must be fully populated before
    /// this call; dispatch runs against it without locking.
    ///
    /// The broker client id is a fresh v4 UUID, generated once per boot and
    /// never persisted.
    pub fn start(
        config: &DeviceConfig,
        identity: &LinkIdentity,
        registry: Arc<CommandRegistry>,
        online: watch::Receiver<bool>,
    ) -> Self {
        let client_id = Uuid::new_v4();
        info!("control channel client id: {client_id}");

        let (publish_tx, publish_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dropped = Arc::new(AtomicU64::new(0));

        // A query string is only valid after a path; insert "/" when the
        // broker URL has none (e.g. "ws://host:port").
        let mut broker_url = config.broker_url.clone();
        if !broker_url.splitn(2, "://").last().unwrap_or("").contains('/') {
            broker_url.push('/');
        }
        let session = SessionConfig {
            url: format!("{broker_url}?client_id={client_id}"),
            cmd_topic: identity.cmd_topic().to_string(),
            data_topic: identity.data_topic().to_string(),
            retry_delay: config.channel_retry_delay,
        };
        tokio::spawn(channel_loop(
            session,
            registry,
            Arc::clone(&dropped),
            online,
            publish_rx,
            shutdown_rx,
        ));

        Self {
            publish_tx,
            dropped,
            shutdown_tx,
        }
    }

    /// Fire-and-forget publish on the device data topic. No acknowledgement,
    /// no retry; if the channel is down or the queue is full the message is
    /// lost, which is acceptable for status and telemetry.
    pub fn publish(&self, payload: impl Into<String>) {
        let _ = self.publish_tx.try_send(payload.into());
    }

    /// Count of inbound messages dropped as malformed.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Close the channel. Idempotent.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

struct SessionConfig {
    url: String,
    cmd_topic: String,
    data_topic: String,
    retry_delay: Duration,
}

enum SessionEnd {
    LinkDown,
    Shutdown,
}

async fn channel_loop(
    session: SessionConfig,
    registry: Arc<CommandRegistry>,
    dropped: Arc<AtomicU64>,
    mut online: watch::Receiver<bool>,
    mut publish_rx: mpsc::Receiver<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if !wait_online(&mut online, &mut shutdown_rx).await {
            return;
        }

        match run_session(
            &session,
            &registry,
            &dropped,
            &mut online,
            &mut publish_rx,
            &mut shutdown_rx,
        )
        .await
        {
            Ok(SessionEnd::Shutdown) => return,
            Ok(SessionEnd::LinkDown) => {
                info!("link down, control channel closed");
            }
            Err(e) => {
                warn!("control channel error: {e}");
                tokio::time::sleep(session.retry_delay).await;
            }
        }

        if *shutdown_rx.borrow() {
            return;
        }
    }
}

/// Block until the link is online; returns `false` on shutdown.
async fn wait_online(
    online: &mut watch::Receiver<bool>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        if *shutdown.borrow() {
            return false;
        }
        if *online.borrow() {
            return true;
        }
        tokio::select! {
            res = online.changed() => {
                if res.is_err() {
                    return false;
                }
            }
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    return false;
                }
            }
        }
    }
}

async fn run_session(
    session: &SessionConfig,
    registry: &CommandRegistry,
    dropped: &AtomicU64,
    online: &mut watch::Receiver<bool>,
    publish_rx: &mut mpsc::Receiver<String>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<SessionEnd> {
    let (ws, _) = connect_async(&session.url).await?;
    let (mut write, mut read) = ws.split();

    let subscribe = ClientFrame::Subscribe {
        topic: session.cmd_topic.clone(),
    };
    write
        .send(Message::Text(serde_json::to_string(&subscribe)?))
        .await?;
    info!("control channel connected, subscribing to {}", session.cmd_topic);

    // Readiness is announced once per connect cycle, strictly after the
    // broker acknowledges the subscription.
    let mut announced = false;

    loop {
        tokio::select! {
            msg = read.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(anyhow!("broker closed connection"));
                    }
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(_)) => continue,
                };
                match serde_json::from_str::<BrokerFrame>(&text) {
                    Ok(BrokerFrame::SubAck { topic }) if topic == session.cmd_topic => {
                        if !announced {
                            let ready = ClientFrame::Publish {
                                topic: session.data_topic.clone(),
                                payload: READY_ANNOUNCEMENT.into(),
                            };
                            write
                                .send(Message::Text(serde_json::to_string(&ready)?))
                                .await?;
                            announced = true;
                            info!("announced ready on {}", session.data_topic);
                        }
                    }
                    Ok(BrokerFrame::Message { topic, payload }) if topic == session.cmd_topic => {
                        handle_command_payload(&payload, registry, dropped);
                    }
                    Ok(frame) => debug!("ignoring broker frame for other topic: {frame:?}"),
                    Err(e) => warn!("unparseable broker frame: {e}"),
                }
            }
            Some(payload) = publish_rx.recv() => {
                let frame = ClientFrame::Publish {
                    topic: session.data_topic.clone(),
                    payload,
                };
                write.send(Message::Text(serde_json::to_string(&frame)?)).await?;
            }
            res = online.changed() => {
                if res.is_err() || !*online.borrow() {
                    return Ok(SessionEnd::LinkDown);
                }
            }
            res = shutdown_rx.changed() => {
                if res.is_err() || *shutdown_rx.borrow() {
                    return Ok(SessionEnd::Shutdown);
                }
            }
        }
    }
}

/// Parse a command envelope and dispatch it. Malformed payloads are counted
/// and dropped; they never reach the registry.
fn handle_command_payload(payload: &str, registry: &CommandRegistry, dropped: &AtomicU64) {
    match serde_json::from_str::<CommandEnvelope>(payload) {
        Ok(envelope) => {
            debug!("command received: {}", envelope.cmd);
            registry.dispatch(&envelope.cmd);
        }
        Err(e) => {
            dropped.fetch_add(1, Ordering::Relaxed);
            warn!("dropping malformed command envelope: {e}");
        }
    }
}
