//! Simulation collaborators for development off-device
//!
//! A real build wires the platform's Wi-Fi and BLE-provisioning drivers to
//! the [`Radio`] and [`Provisioner`] traits; these stand-ins let the binary
//! run against local services.

use super::state::LinkEvent;
use super::supervisor::{Provisioner, Radio};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::info;

/// Radio that associates instantly and never drops.
#[derive(Default)]
pub struct SimRadio;

#[async_trait]
impl Radio for SimRadio {
    async fn associate(&self, events: mpsc::Sender<LinkEvent>) -> Result<()> {
        let _ = events.send(LinkEvent::AssociationSucceeded).await;
        let _ = events.send(LinkEvent::AddressAcquired).await;
        Ok(())
    }

    async fn disassociate(&self) {}
}

/// Provisioner backed by an in-memory credential flag. Provisioning
/// completes immediately after it starts.
pub struct SimProvisioner {
    credentials: AtomicBool,
}

impl SimProvisioner {
    pub fn provisioned() -> Self {
        Self {
            credentials: AtomicBool::new(true),
        }
    }

    pub fn unprovisioned() -> Self {
        Self {
            credentials: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Provisioner for SimProvisioner {
    async fn has_credentials(&self) -> Result<bool> {
        Ok(self.credentials.load(Ordering::SeqCst))
    }

    async fn start(
        &self,
        service_name: &str,
        _pop: &str,
        events: mpsc::Sender<LinkEvent>,
    ) -> Result<()> {
        info!("simulated provisioning as {service_name}");
        self.credentials.store(true, Ordering::SeqCst);
        let _ = events.send(LinkEvent::ProvisioningComplete).await;
        Ok(())
    }

    async fn teardown(&self) {}

    async fn erase_credentials(&self) -> Result<()> {
        self.credentials.store(false, Ordering::SeqCst);
        Ok(())
    }
}
