//! Stable device identity, topic derivation and provisioning advertisement

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hardware-derived identifier, read once at startup from the radio MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId([u8; 6]);

impl DeviceId {
    pub fn new(raw: [u8; 6]) -> Self {
        Self(raw)
    }

    /// Lowercase hyphen-delimited hex rendering used in topic names.
    pub fn hyphenated(&self) -> String {
        self.0
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join("-")
    }

    /// Uppercase hex of the last three bytes, used in the advertised
    /// provisioning name.
    pub fn short_suffix(&self) -> String {
        format!("{:02X}{:02X}{:02X}", self.0[3], self.0[4], self.0[5])
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hyphenated())
    }
}

/// Per-device naming derived once at startup; immutable for the process
/// lifetime.
#[derive(Debug, Clone)]
pub struct LinkIdentity {
    device_id: DeviceId,
    cmd_topic: String,
    data_topic: String,
}

impl LinkIdentity {
    pub fn new(device_id: DeviceId, topic_prefix: &str) -> Self {
        let id = device_id.hyphenated();
        Self {
            device_id,
            cmd_topic: format!("{topic_prefix}{id}/cmd"),
            data_topic: format!("{topic_prefix}{id}/data"),
        }
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    /// Topic the backend sends commands on.
    pub fn cmd_topic(&self) -> &str {
        &self.cmd_topic
    }

    /// Topic the device publishes status and telemetry on.
    pub fn data_topic(&self) -> &str {
        &self.data_topic
    }

    /// Name advertised during provisioning, e.g. `DOORBELL_ABC123`.
    pub fn service_name(&self, product: &str) -> String {
        format!("{product}_{}", self.device_id.short_suffix())
    }
}

/// Payload encoded as a QR code for out-of-band provisioning transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningQr {
    pub ver: String,
    pub name: String,
    pub pop: String,
    pub transport: String,
}

impl ProvisioningQr {
    pub fn new(name: &str, pop: &str) -> Self {
        Self {
            ver: "v1".into(),
            name: name.into(),
            pop: pop.into(),
            transport: "ble".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: [u8; 6] = [0x24, 0x0a, 0xc4, 0xab, 0xcd, 0x1f];

    #[test]
    fn device_id_renders_lowercase_hyphenated_hex() {
        let id = DeviceId::new(ID);
        assert_eq!(id.hyphenated(), "24-0a-c4-ab-cd-1f");
        assert_eq!(id.to_string(), "24-0a-c4-ab-cd-1f");
    }

    #[test]
    fn service_name_uses_last_three_bytes_uppercase() {
        let identity = LinkIdentity::new(DeviceId::new(ID), "doorbell/");
        assert_eq!(identity.service_name("DOORBELL"), "DOORBELL_ABCD1F");
    }

    #[test]
    fn topics_derive_from_prefix_and_device_id() {
        let identity = LinkIdentity::new(DeviceId::new(ID), "doorbell/");
        assert_eq!(identity.cmd_topic(), "doorbell/24-0a-c4-ab-cd-1f/cmd");
        assert_eq!(identity.data_topic(), "doorbell/24-0a-c4-ab-cd-1f/data");
    }

    #[test]
    fn qr_payload_matches_expected_shape() {
        let qr = ProvisioningQr::new("DOORBELL_ABCD1F", "doorbell_250305");
        let json = serde_json::to_string(&qr).unwrap();
        assert_eq!(
            json,
            r#"{"ver":"v1","name":"DOORBELL_ABCD1F","pop":"doorbell_250305","transport":"ble"}"#
        );
    }
}
