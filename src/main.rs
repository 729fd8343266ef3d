use anyhow::Result;
use bytes::Bytes;
use doorlink::config::DeviceConfig;
use doorlink::control::ControlChannel;
use doorlink::identity::{DeviceId, LinkIdentity};
use doorlink::link::sim::{SimProvisioner, SimRadio};
use doorlink::link::LinkSupervisor;
use doorlink::media::MediaRelay;
use doorlink::peripherals::{
    AudioCodec, ButtonAction, ButtonEvent, ButtonKind, Camera, Indicator, LogIndicator, SimCamera,
    SimCodec,
};
use doorlink::registry::CommandRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 20 ms of 16 kHz 16-bit mono audio.
const AUDIO_FRAME_BYTES: usize = 640;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = DeviceConfig::default();
    // Read from the radio MAC on real hardware.
    let identity = LinkIdentity::new(
        DeviceId::new([0x24, 0x0a, 0xc4, 0xab, 0xcd, 0x1f]),
        &config.topic_prefix,
    );

    info!("doorbell starting: {}", identity.device_id());
    info!("  broker: {}", config.broker_url);
    info!("  media: {}:{}", config.media_host, config.media_port);

    // Bring the link up first; everything downstream waits on it. This call
    // has no timeout: without a network the device has nothing else to do.
    let radio = Arc::new(SimRadio);
    let provisioner = Arc::new(SimProvisioner::provisioned());
    let link = LinkSupervisor::start(config.clone(), identity.clone(), radio, provisioner);
    link.wait_until_online().await;
    info!("link online");

    let camera: Arc<dyn Camera> = Arc::new(SimCamera);
    let indicator: Arc<dyn Indicator> = Arc::new(LogIndicator);
    let mut codec = SimCodec;

    // Inbound audio goes straight to the codec playback path.
    let (speaker_tx, mut speaker_rx) = mpsc::channel::<Vec<u8>>(8);
    let relay = Arc::new(MediaRelay::start(
        &config,
        link.online(),
        Box::new(move |frame| {
            let _ = speaker_tx.try_send(frame.to_vec());
        }),
    ));

    // Audio pump: captured frames up, backend frames down.
    let relay_clone = Arc::clone(&relay);
    tokio::spawn(async move {
        let mut buf = vec![0u8; AUDIO_FRAME_BYTES];
        let mut ticker = tokio::time::interval(Duration::from_millis(20));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match codec.read_frame(&mut buf) {
                        Ok(n) if n > 0 => {
                            relay_clone
                                .send_audio_frame(Bytes::copy_from_slice(&buf[..n]))
                                .await;
                        }
                        Ok(_) => {}
                        Err(e) => warn!("codec read failed: {e}"),
                    }
                }
                Some(frame) = speaker_rx.recv() => {
                    if let Err(e) = codec.write_frame(&frame) {
                        warn!("codec write failed: {e}");
                    }
                }
            }
        }
    });

    // The command surface is fixed at startup; registration must finish
    // before the control channel activates.
    let mut registry = CommandRegistry::new();
    {
        let ind = Arc::clone(&indicator);
        registry.register("indicator_on", Box::new(move || ind.set(true)))?;
        let ind = Arc::clone(&indicator);
        registry.register("indicator_off", Box::new(move || ind.set(false)))?;

        let cam = Arc::clone(&camera);
        let snapshot_relay = Arc::clone(&relay);
        registry.register(
            "snapshot",
            Box::new(move || match cam.capture() {
                Ok(frame) => {
                    let relay = Arc::clone(&snapshot_relay);
                    tokio::spawn(async move {
                        relay.send_image(frame).await;
                    });
                }
                Err(e) => warn!("capture failed: {e}"),
            }),
        )?;
    }
    let registry = Arc::new(registry);

    let control = ControlChannel::start(&config, &identity, registry, link.online());

    // A real build wires the GPIO button driver to this channel; nothing
    // feeds it in the simulation profile.
    let (_button_tx, mut button_rx) = mpsc::channel::<ButtonEvent>(8);

    loop {
        tokio::select! {
            Some(event) = button_rx.recv() => match (event.kind, event.action) {
                (ButtonKind::Front, ButtonAction::SingleClick) => {
                    info!("front button: erasing provisioning, restarting");
                    if let Err(e) = link.reset_provisioning().await {
                        error!("failed to erase provisioning: {e}");
                        continue;
                    }
                    // The process supervisor restarts us; the next boot
                    // re-enters the provisioning flow.
                    break;
                }
                (ButtonKind::Back, ButtonAction::SingleClick) => {
                    control.publish(r#"{"status":"ring"}"#);
                    match camera.capture() {
                        Ok(frame) => relay.send_image(frame).await,
                        Err(e) => warn!("capture failed: {e}"),
                    }
                }
                _ => {}
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    // Shutdown order: media channels, control channel, link. Each step is
    // idempotent if already torn down.
    relay.close();
    control.close();
    link.shutdown().await;
    Ok(())
}
