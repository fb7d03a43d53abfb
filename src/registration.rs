use std::{
    fmt,
    sync::{Arc, Weak},
};

use crate::{Label, internal::Registry};

pub type RegistrationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, cibus_macros::Label)]
pub enum RegistrationKind {
    /// Starts a job run per matching message.
    Trigger,
    /// Resolves a `waitForMessage` call with the first matching message.
    Wait,
    /// Stores the first matching message in a build variable.
    Subscribe,
}

impl RegistrationKind {
    /// Wait and Subscribe registrations consume at most one message.
    pub fn is_one_shot(&self) -> bool {
        !matches!(self, RegistrationKind::Trigger)
    }
}

impl fmt::Display for RegistrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Keeps a registration alive in the router.
///
/// Dropping the handle unregisters, so every exit path of a wait or a
/// trigger (success, timeout, cancellation, panic) releases its entry.
#[derive(Debug)]
pub struct RegistrationHandle {
    id: RegistrationId,
    kind: RegistrationKind,
    registry: Weak<Registry>,
}

impl RegistrationHandle {
    pub(crate) fn new(id: RegistrationId, kind: RegistrationKind, registry: &Arc<Registry>) -> Self {
        Self {
            id,
            kind,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn kind(&self) -> RegistrationKind {
        self.kind
    }

    /// Whether the router still holds this registration. One-shot
    /// registrations leave the registry as soon as they are satisfied.
    pub fn is_registered(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.contains(self.id))
    }

    /// Explicit form of dropping the handle.
    pub fn unregister(self) {}
}

impl Drop for RegistrationHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(self.id).is_some() {
                tracing::debug!(id = self.id, kind = %self.kind, "Unregistered");
            }
        }
    }
}
