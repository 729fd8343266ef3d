//! Link lifecycle state machine
//!
//! Pure transition logic: events in, new state plus side-effect actions out.
//! The supervisor executes the actions against the radio and provisioning
//! collaborators, which keeps this machine unit-testable without a network
//! stack.

/// Association lifecycle state. Exactly one value at a time, owned by the
/// link supervisor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unprovisioned,
    Provisioning,
    Connecting,
    Connected,
    Disconnected,
}

/// Events reported by the radio and provisioning collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Stored network credentials were found at startup.
    CredentialsPresent,
    /// No stored credentials; provisioning is required.
    CredentialsAbsent,
    /// The provisioning protocol completed and credentials are stored.
    ProvisioningComplete,
    /// The radio associated with the upstream network.
    AssociationSucceeded,
    /// An association attempt failed.
    AssociationFailed,
    /// The link has a routable address; downstream channels may start.
    AddressAcquired,
    /// An established link dropped.
    LinkLost,
    /// Orderly shutdown requested.
    Shutdown,
}

/// Side effects the supervisor must perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    /// Issue an association attempt. Emitted on every transition into
    /// `Connecting`.
    Associate,
    /// Start advertising for provisioning.
    StartProvisioning,
    /// Release the provisioning collaborator. Emitted exactly once, when
    /// leaving `Provisioning` (or when skipping it at a provisioned boot).
    TeardownProvisioning,
    /// Unblock callers waiting for the first address under `Connected`.
    AnnounceOnline,
    /// Drop the association.
    Disassociate,
}

#[derive(Debug)]
pub struct LinkStateMachine {
    state: ConnectionState,
}

impl Default for LinkStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStateMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Unprovisioned,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Apply `event`, returning the actions the supervisor must execute.
    /// Events that are invalid in the current state change nothing and
    /// return no actions.
    pub fn process_event(&mut self, event: LinkEvent) -> Vec<LinkAction> {
        use ConnectionState::*;
        use LinkAction::*;
        use LinkEvent::*;

        let (next, actions) = match (self.state, event) {
            (Unprovisioned, CredentialsAbsent) => (Provisioning, vec![StartProvisioning]),
            (Unprovisioned | Provisioning, CredentialsPresent) => {
                (Connecting, vec![TeardownProvisioning, Associate])
            }
            (Provisioning, ProvisioningComplete) => {
                (Connecting, vec![TeardownProvisioning, Associate])
            }
            (Connecting, AssociationSucceeded) => (Connected, vec![]),
            // Immediate retry, no backoff: an unattended device with no
            // network has no fallback mode, so it keeps trying forever.
            (Connecting, AssociationFailed) => (Connecting, vec![Associate]),
            (Connected, AddressAcquired) => (Connected, vec![AnnounceOnline]),
            (Connected, LinkLost) => (Connecting, vec![Associate]),
            (_, Shutdown) => (Disconnected, vec![Disassociate]),
            (state, _) => (state, vec![]),
        };

        self.state = next;
        actions
    }
}
