//! Link lifecycle management
//!
//! This module handles:
//! - The association lifecycle state machine (unprovisioned through
//!   connected, with automatic reconnection)
//! - The provisioning sub-flow and its one-shot teardown
//! - Supervision of the radio and provisioning collaborators

pub mod sim;
mod state;
mod supervisor;

pub use state::{ConnectionState, LinkAction, LinkEvent, LinkStateMachine};
pub use supervisor::{LinkSupervisor, Provisioner, Radio};
