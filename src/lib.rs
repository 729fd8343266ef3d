//! Connectivity and control-plane core for a networked doorbell
//!
//! The crate keeps the device's wireless uplink alive, exposes a small
//! command channel for remote control, and relays live media to a backend:
//!
//! - [`link`]: association lifecycle state machine, provisioning sub-flow
//!   and reconnect supervision
//! - [`registry`]: fixed-capacity table mapping command names to actions
//! - [`control`]: pub/sub command channel with readiness announcement
//! - [`media`]: lossy duplex image/audio channels
//! - [`peripherals`]: hardware collaborator traits
//!
//! Hardware drivers are external collaborators; the core reports failures
//! through `Result`s or best-effort drops and never aborts on its own.

pub mod config;
pub mod control;
pub mod identity;
pub mod link;
pub mod media;
pub mod peripherals;
pub mod registry;
