//! Fixed-capacity command table mapping command names to local actions
//!
//! The control surface of the device is set once during single-threaded
//! startup; there is no deletion. Dispatch runs from the control channel's
//! inbound callback against an effectively read-only table, so no locking
//! is needed as long as registration completes before channel activation.

use thiserror::Error;
use tracing::{debug, warn};

/// Number of command slots.
pub const REGISTRY_CAPACITY: usize = 10;
/// Maximum command name length in bytes.
pub const MAX_NAME_LEN: usize = 15;

/// A registered action. Any context the action needs is captured by the
/// closure at registration time.
pub type CommandAction = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// A new entry was added.
    Inserted,
    /// The name was already registered; its action was overwritten in place.
    Replaced,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("command table is full ({REGISTRY_CAPACITY} slots)")]
    Full,
    #[error("invalid command name: {0:?}")]
    InvalidName(String),
}

struct CommandEntry {
    name: String,
    action: CommandAction,
}

/// Append-only command table with insertion-order dispatch.
#[derive(Default)]
pub struct CommandRegistry {
    entries: Vec<CommandEntry>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(REGISTRY_CAPACITY),
        }
    }

    /// Register `action` under `name`.
    ///
    /// Re-registering an existing name overwrites its action in place and
    /// reports [`RegisterOutcome::Replaced`]. A full table fails with
    /// [`RegistryError::Full`] and leaves the table unchanged.
    pub fn register(
        &mut self,
        name: &str,
        action: CommandAction,
    ) -> Result<RegisterOutcome, RegistryError> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(RegistryError::InvalidName(name.into()));
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            warn!("command {name:?} already registered, overwriting");
            entry.action = action;
            return Ok(RegisterOutcome::Replaced);
        }
        if self.entries.len() >= REGISTRY_CAPACITY {
            warn!("command table full, cannot register {name:?}");
            return Err(RegistryError::Full);
        }
        self.entries.push(CommandEntry {
            name: name.into(),
            action,
        });
        Ok(RegisterOutcome::Inserted)
    }

    /// Invoke the action registered under `name`, scanning in insertion
    /// order. An unknown name is a no-op: remote parties may send commands
    /// this device does not implement.
    ///
    /// Returns whether an action ran.
    pub fn dispatch(&self, name: &str) -> bool {
        for entry in &self.entries {
            if entry.name == name {
                (entry.action)();
                return true;
            }
        }
        debug!("no action registered for command {name:?}");
        false
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(counter: &Arc<AtomicUsize>) -> CommandAction {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn dispatch_runs_only_the_matching_action() {
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let mut reg = CommandRegistry::new();
        assert_eq!(reg.register("a", counting(&a)), Ok(RegisterOutcome::Inserted));
        assert_eq!(reg.register("b", counting(&b)), Ok(RegisterOutcome::Inserted));

        assert!(reg.dispatch("a"));
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reregistering_replaces_in_place_without_growing() {
        let old = Arc::new(AtomicUsize::new(0));
        let new = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let mut reg = CommandRegistry::new();
        reg.register("a", counting(&old)).unwrap();
        reg.register("b", counting(&b)).unwrap();

        assert_eq!(reg.register("a", counting(&new)), Ok(RegisterOutcome::Replaced));
        assert_eq!(reg.len(), 2);

        assert!(reg.dispatch("a"));
        assert_eq!(old.load(Ordering::SeqCst), 0);
        assert_eq!(new.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn overflowing_capacity_leaves_the_table_unchanged() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut reg = CommandRegistry::new();
        for i in 0..REGISTRY_CAPACITY {
            reg.register(&format!("cmd{i}"), counting(&counter)).unwrap();
        }

        assert_eq!(reg.register("one_too_many", counting(&counter)), Err(RegistryError::Full));
        assert_eq!(reg.len(), REGISTRY_CAPACITY);

        // The original entries still dispatch.
        assert!(reg.dispatch("cmd0"));
        assert!(reg.dispatch("cmd9"));
        assert!(!reg.dispatch("one_too_many"));
    }

    #[test]
    fn unknown_command_is_a_silent_noop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut reg = CommandRegistry::new();
        reg.register("known", counting(&counter)).unwrap();

        assert!(!reg.dispatch("unknown"));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rejects_empty_and_oversized_names() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut reg = CommandRegistry::new();
        assert!(matches!(
            reg.register("", counting(&counter)),
            Err(RegistryError::InvalidName(_))
        ));
        assert!(matches!(
            reg.register("sixteen_byte_name", counting(&counter)),
            Err(RegistryError::InvalidName(_))
        ));
        assert!(reg.is_empty());
    }
}
