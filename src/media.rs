//! Media relay — lossy duplex byte-stream channels for image and audio
//!
//! Two independent WebSocket channels off one backend host: image upload
//! (device to backend only) and duplex audio. Channels open only while the
//! link is online and become inert when it is not. Sends are deliberately
//! lossy: stale real-time media has no value, so there is no queueing beyond
//! a small handoff buffer and no retry.

use crate::config::DeviceConfig;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info};

/// URL suffix of the image upload endpoint.
pub const IMAGE_PATH: &str = "/ws/image";
/// URL suffix of the duplex audio endpoint.
pub const AUDIO_PATH: &str = "/ws/audio";

/// Sink for inbound audio frames. A single callback, registered at startup.
pub type AudioSink = Box<dyn Fn(&[u8]) + Send + Sync>;

/// One duplex media channel with connect/open/closed lifecycle.
pub struct MediaChannel {
    name: &'static str,
    open_rx: watch::Receiver<bool>,
    frame_tx: mpsc::Sender<Bytes>,
    flush_timeout: Duration,
    shutdown_tx: watch::Sender<bool>,
}

impl MediaChannel {
    fn start(
        name: &'static str,
        url: String,
        online: watch::Receiver<bool>,
        retry_delay: Duration,
        flush_timeout: Duration,
        sink: Option<AudioSink>,
    ) -> Self {
        let (open_tx, open_rx) = watch::channel(false);
        let (frame_tx, frame_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(channel_loop(
            name,
            url,
            online,
            open_tx,
            frame_rx,
            sink,
            retry_delay,
            shutdown_rx,
        ));

        Self {
            name,
            open_rx,
            frame_tx,
            flush_timeout,
            shutdown_tx,
        }
    }

    pub fn is_open(&self) -> bool {
        *self.open_rx.borrow()
    }

    /// Send a binary frame. Silently dropped when the channel is not open;
    /// when the writer is saturated the call gives up after the bounded
    /// flush wait without closing the channel.
    pub async fn send(&self, frame: Bytes) {
        if !self.is_open() {
            debug!("{} channel not open, dropping {}-byte frame", self.name, frame.len());
            return;
        }
        if self.frame_tx.send_timeout(frame, self.flush_timeout).await.is_err() {
            debug!("{} channel writer saturated, frame dropped", self.name);
        }
    }

    /// Close the channel. Idempotent.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// The two media sessions of the device. Image and audio are independent and
/// share no state.
pub struct MediaRelay {
    image: MediaChannel,
    audio: MediaChannel,
}

impl MediaRelay {
    /// Spawn both channel tasks. `audio_sink` receives inbound binary frames
    /// from the audio channel; the image channel is upload-only and its
    /// inbound direction is ignored.
    pub fn start(
        config: &DeviceConfig,
        online: watch::Receiver<bool>,
        audio_sink: AudioSink,
    ) -> Self {
        let base = format!("ws://{}:{}", config.media_host, config.media_port);
        Self {
            image: MediaChannel::start(
                "image",
                format!("{base}{IMAGE_PATH}"),
                online.clone(),
                config.channel_retry_delay,
                config.send_flush_timeout,
                None,
            ),
            audio: MediaChannel::start(
                "audio",
                format!("{base}{AUDIO_PATH}"),
                online,
                config.channel_retry_delay,
                config.send_flush_timeout,
                Some(audio_sink),
            ),
        }
    }

    pub async fn send_image(&self, frame: Bytes) {
        self.image.send(frame).await;
    }

    pub async fn send_audio_frame(&self, frame: Bytes) {
        self.audio.send(frame).await;
    }

    pub fn image_open(&self) -> bool {
        self.image.is_open()
    }

    pub fn audio_open(&self) -> bool {
        self.audio.is_open()
    }

    /// Close both channels. Idempotent.
    pub fn close(&self) {
        self.image.close();
        self.audio.close();
    }
}

#[allow(clippy::too_many_arguments)]
async fn channel_loop(
    name: &'static str,
    url: String,
    mut online: watch::Receiver<bool>,
    open_tx: watch::Sender<bool>,
    mut frame_rx: mpsc::Receiver<Bytes>,
    sink: Option<AudioSink>,
    retry_delay: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if !wait_online(&mut online, &mut shutdown_rx).await {
            return;
        }

        // Frames queued while the channel was down are stale; drop them.
        while frame_rx.try_recv().is_ok() {}

        match run_session(
            name,
            &url,
            &open_tx,
            &mut frame_rx,
            sink.as_ref(),
            &mut online,
            &mut shutdown_rx,
        )
        .await
        {
            Ok(SessionEnd::Shutdown) => {
                open_tx.send_replace(false);
                return;
            }
            Ok(SessionEnd::LinkDown) => {
                open_tx.send_replace(false);
                info!("{name} media channel closed, link down");
            }
            Err(e) => {
                open_tx.send_replace(false);
                debug!("{name} media channel: {e}");
                tokio::time::sleep(retry_delay).await;
            }
        }

        if *shutdown_rx.borrow() {
            return;
        }
    }
}

enum SessionEnd {
    LinkDown,
    Shutdown,
}

async fn run_session(
    name: &'static str,
    url: &str,
    open_tx: &watch::Sender<bool>,
    frame_rx: &mut mpsc::Receiver<Bytes>,
    sink: Option<&AudioSink>,
    online: &mut watch::Receiver<bool>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<SessionEnd> {
    let (ws, _) = connect_async(url).await?;
    info!("{name} media channel open");
    open_tx.send_replace(true);

    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            Some(frame) = frame_rx.recv() => {
                write.send(Message::Binary(frame.to_vec())).await?;
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        // Only the audio channel has a registered sink; the
                        // image channel ignores its inbound direction.
                        if let Some(sink) = sink {
                            sink(&data);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(anyhow!("server closed {name} channel"));
                    }
                    Some(Err(e)) => return Err(e.into()),
                    // Text and control frames carry nothing for us.
                    Some(Ok(_)) => {}
                }
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
