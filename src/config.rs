//! Configuration for the connectivity core

use std::time::Duration;

/// Settings shared by the link supervisor, control channel and media relay.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Pub/sub broker endpoint for the control channel.
    pub broker_url: String,
    /// Host serving the media relay endpoints.
    pub media_host: String,
    /// Shared port for the image and audio endpoints.
    pub media_port: u16,
    /// Prefix for the per-device command and data topics.
    pub topic_prefix: String,
    /// Product tag used in the provisioning service name.
    pub product_name: String,
    /// Pre-shared proof-of-possession string for provisioning.
    pub proof_of_possession: String,
    /// Bounded wait when handing a media frame to the transport writer.
    pub send_flush_timeout: Duration,
    /// Delay before a control/media channel reconnects while the link is up.
    pub channel_retry_delay: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            broker_url: "ws://127.0.0.1:1883/pubsub".into(),
            media_host: "127.0.0.1".into(),
            media_port: 8000,
            topic_prefix: "doorbell/".into(),
            product_name: "DOORBELL".into(),
            proof_of_possession: "doorbell_250305".into(),
            send_flush_timeout: Duration::from_millis(100),
            channel_retry_delay: Duration::from_millis(500),
        }
    }
}
