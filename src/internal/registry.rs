use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::{mpsc, oneshot};

use crate::{Envelope, RegistrationId, RegistrationKind, Selector};

/// Where matched envelopes go.
#[derive(Debug)]
pub(crate) enum Target {
    /// Every match, in arrival order.
    Stream(mpsc::Sender<Arc<Envelope>>),
    /// The first match only; the slot is emptied by whoever delivers.
    Once(Mutex<Option<oneshot::Sender<Arc<Envelope>>>>),
}

#[derive(Debug)]
pub(crate) struct Registration {
    pub id: RegistrationId,
    pub provider: Arc<str>,
    pub selector: Selector,
    pub kind: RegistrationKind,
    pub target: Target,
}

impl Registration {
    pub fn accepts(&self, provider: &str, envelope: &Envelope) -> bool {
        &*self.provider == provider && self.selector.matches(envelope)
    }

    /// Claim the one-shot sender. Only the first caller gets it.
    pub fn take_once(&self) -> Option<oneshot::Sender<Arc<Envelope>>> {
        match &self.target {
            Target::Once(slot) => slot.lock().unwrap_or_else(|e| e.into_inner()).take(),
            Target::Stream(_) => None,
        }
    }
}

/// Registrations currently known to the router.
///
/// One lock guards insert, remove and snapshot. Matching runs on snapshots,
/// outside the lock.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    entries: RwLock<HashMap<RegistrationId, Arc<Registration>>>,
    last_id: AtomicU64,
}

impl Registry {
    pub fn next_id(&self) -> RegistrationId {
        self.last_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn insert(&self, registration: Registration) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(registration.id, Arc::new(registration));
    }

    pub fn remove(&self, id: RegistrationId) -> Option<Arc<Registration>> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
    }

    pub fn contains(&self, id: RegistrationId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Registrations ordered by id, so older registrations are served first.
    pub fn snapshot(&self) -> Vec<Arc<Registration>> {
        let mut snapshot: Vec<_> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        snapshot.sort_unstable_by_key(|r| r.id);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn once(registry: &Registry) -> (RegistrationId, oneshot::Receiver<Arc<Envelope>>) {
        let (tx, rx) = oneshot::channel();
        let id = registry.next_id();
        registry.insert(Registration {
            id,
            provider: Arc::from("test"),
            selector: Selector::all(),
            kind: RegistrationKind::Wait,
            target: Target::Once(Mutex::new(Some(tx))),
        });
        (id, rx)
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let registry = Registry::default();
        let a = registry.next_id();
        let b = registry.next_id();
        assert!(b > a);
    }

    #[test]
    fn test_snapshot_is_ordered_and_detached() {
        let registry = Registry::default();
        let (first, _rx1) = once(&registry);
        let (second, _rx2) = once(&registry);

        let snapshot = registry.snapshot();
        registry.remove(first);

        assert_eq!(
            snapshot.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![first, second]
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_take_once_only_succeeds_once() {
        let registry = Registry::default();
        let (id, _rx) = once(&registry);
        let registration = registry.snapshot().into_iter().find(|r| r.id == id).unwrap();
        assert!(registration.take_once().is_some());
        assert!(registration.take_once().is_none());
    }
}
