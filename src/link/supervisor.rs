//! Link supervision: drives the radio and provisioning collaborators
//!
//! The supervisor owns the [`LinkStateMachine`] and is the only writer of
//! [`ConnectionState`]. Collaborators report back by sending [`LinkEvent`]s
//! into its queue; readers observe state through `watch` channels.

use super::state::{ConnectionState, LinkAction, LinkEvent, LinkStateMachine};
use crate::config::DeviceConfig;
use crate::identity::{LinkIdentity, ProvisioningQr};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Wireless radio collaborator.
#[async_trait]
pub trait Radio: Send + Sync {
    /// Begin an association attempt, reporting outcomes on `events`
    /// ([`LinkEvent::AssociationSucceeded`], [`LinkEvent::AssociationFailed`],
    /// [`LinkEvent::AddressAcquired`], and later [`LinkEvent::LinkLost`]).
    async fn associate(&self, events: mpsc::Sender<LinkEvent>) -> Result<()>;

    /// Drop the association.
    async fn disassociate(&self);
}

/// Out-of-band provisioning collaborator. Credential storage is its concern,
/// not the core's.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn has_credentials(&self) -> Result<bool>;

    /// Start advertising under `service_name` with the pre-shared proof
    /// string, reporting [`LinkEvent::ProvisioningComplete`] on `events`.
    async fn start(
        &self,
        service_name: &str,
        pop: &str,
        events: mpsc::Sender<LinkEvent>,
    ) -> Result<()>;

    /// Stop advertising and release provisioning resources.
    async fn teardown(&self);

    /// Erase stored credentials. The caller is expected to restart the
    /// process afterwards; this does not force a state transition.
    async fn erase_credentials(&self) -> Result<()>;
}

/// Handle to the supervision task.
pub struct LinkSupervisor {
    event_tx: mpsc::Sender<LinkEvent>,
    state_rx: watch::Receiver<ConnectionState>,
    online_rx: watch::Receiver<bool>,
    provisioner: Arc<dyn Provisioner>,
}

impl LinkSupervisor {
    /// Spawn the supervision task. The boot-time credential probe decides
    /// whether the link provisions first or associates directly.
    pub fn start(
        config: DeviceConfig,
        identity: LinkIdentity,
        radio: Arc<dyn Radio>,
        provisioner: Arc<dyn Provisioner>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Unprovisioned);
        let (online_tx, online_rx) = watch::channel(false);

        let ctx = SupervisorCtx {
            config,
            identity,
            radio,
            provisioner: Arc::clone(&provisioner),
            event_tx: event_tx.clone(),
            state_tx,
            online_tx,
        };
        tokio::spawn(supervise(event_rx, ctx));

        Self {
            event_tx,
            state_rx,
            online_rx,
            provisioner,
        }
    }

    /// Sender collaborators and drivers use to report link events.
    pub fn event_sender(&self) -> mpsc::Sender<LinkEvent> {
        self.event_tx.clone()
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// `true` while the link is connected with an acquired address.
    pub fn online(&self) -> watch::Receiver<bool> {
        self.online_rx.clone()
    }

    /// Suspend the caller until the link first reports an acquired address.
    /// Deliberately has no timeout: the device has no fallback operating
    /// mode without a network, so startup waits as long as it takes.
    pub async fn wait_until_online(&self) {
        let mut rx = self.online_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Erase stored credentials. Expected to be followed by a full process
    /// restart; the current association is left untouched.
    pub async fn reset_provisioning(&self) -> Result<()> {
        self.provisioner.erase_credentials().await
    }

    /// Request orderly teardown. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.event_tx.send(LinkEvent::Shutdown).await;
    }
}

struct SupervisorCtx {
    config: DeviceConfig,
    identity: LinkIdentity,
    radio: Arc<dyn Radio>,
    provisioner: Arc<dyn Provisioner>,
    event_tx: mpsc::Sender<LinkEvent>,
    state_tx: watch::Sender<ConnectionState>,
    online_tx: watch::Sender<bool>,
}

async fn supervise(mut event_rx: mpsc::Receiver<LinkEvent>, ctx: SupervisorCtx) {
    let mut machine = LinkStateMachine::new();

    // Boot-time credential probe. A failed probe is treated as absent
    // credentials; provisioning from scratch always recovers.
    let first = match ctx.provisioner.has_credentials().await {
        Ok(true) => LinkEvent::CredentialsPresent,
        Ok(false) => LinkEvent::CredentialsAbsent,
        Err(e) => {
            warn!("credential probe failed ({e}), provisioning from scratch");
            LinkEvent::CredentialsAbsent
        }
    };
    info!(
        "stored credentials: {}",
        if first == LinkEvent::CredentialsPresent { "present" } else { "absent" }
    );
    apply_event(&mut machine, first, &ctx).await;

    while let Some(event) = event_rx.recv().await {
        let stop = event == LinkEvent::Shutdown;
        apply_event(&mut machine, event, &ctx).await;
        if stop {
            break;
        }
    }
}

async fn apply_event(machine: &mut LinkStateMachine, event: LinkEvent, ctx: &SupervisorCtx) {
    let prev = machine.state();
    let actions = machine.process_event(event);
    let state = machine.state();

    if state != prev {
        info!("link state: {prev:?} -> {state:?}");
        ctx.state_tx.send_replace(state);
        if state != ConnectionState::Connected {
            // Leaving Connected implicitly tears down dependent channels:
            // they observe this flag and close themselves.
            ctx.online_tx.send_replace(false);
        }
    } else if actions.is_empty() {
        debug!("ignoring {event:?} in state {state:?}");
    }

    for action in actions {
        match action {
            LinkAction::Associate => {
                if let Err(e) = ctx.radio.associate(ctx.event_tx.clone()).await {
                    warn!("association attempt failed to start: {e}");
                    let _ = ctx.event_tx.send(LinkEvent::AssociationFailed).await;
                }
            }
            LinkAction::StartProvisioning => {
                let name = ctx.identity.service_name(&ctx.config.product_name);
                let qr = ProvisioningQr::new(&name, &ctx.config.proof_of_possession);
                if let Ok(json) = serde_json::to_string(&qr) {
                    info!("scan to provision: {json}");
                }
                if let Err(e) = ctx
                    .provisioner
                    .start(&name, &ctx.config.proof_of_possession, ctx.event_tx.clone())
                    .await
                {
                    warn!("provisioning failed to start: {e}");
                }
            }
            LinkAction::TeardownProvisioning => ctx.provisioner.teardown().await,
            LinkAction::AnnounceOnline => {
                ctx.online_tx.send_replace(true);
            }
            LinkAction::Disassociate => ctx.radio.disassociate().await,
        }
    }
}
