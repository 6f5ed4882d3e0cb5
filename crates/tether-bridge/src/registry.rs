//! Identity-keyed weak tables
//!
//! One table tracks object proxies, another trampolines. An entry never keeps
//! its target alive: it holds a `Weak` plus the token of the target that
//! registered it. Removal is conditional on that token, so a stale drop can
//! never remove the entry of a newer target registered under the same
//! identity, and "remove then notify the foreign side" happens at most once
//! per registration.
//!
//! Calls that must keep a target alive beyond their caller's reference pin it
//! in a separate strong set for their duration. Pins are keyed by
//! registration, so releasing one never touches a pin taken on a later
//! registration of the same identity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Lifecycle of one foreign identity as the bridge sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Never registered, or registered and already released. The table keeps
    /// no memory of released identities.
    Untracked,
    WeaklyTracked,
    /// Pinned by at least one in-flight operation
    StronglyHeld,
    /// The entry is present but its target has been dropped; the release is
    /// about to be issued
    Finalizing,
}

struct Slot<T> {
    token: u64,
    target: Weak<T>,
}

/// Outcome of publishing a freshly built target
pub(crate) enum Published<T> {
    Inserted,
    /// Inserted over a dead entry; that registration's release is still owed
    Replaced,
    /// Another live target won the race for the identity
    Existing(Arc<T>),
}

pub(crate) struct WeakTable<T> {
    entries: DashMap<i32, Slot<T>>,
    pinned: DashMap<(i32, u64), (Arc<T>, usize)>,
    next_token: AtomicU64,
}

impl<T> WeakTable<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            pinned: DashMap::new(),
            next_token: AtomicU64::new(1),
        }
    }

    pub fn next_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    /// Live target registered for `identity`
    pub fn lookup(&self, identity: i32) -> Option<Arc<T>> {
        self.entries.get(&identity).and_then(|slot| slot.target.upgrade())
    }

    /// Register `candidate` unless a live target already owns the identity.
    /// A dead entry is taken over.
    pub fn publish(&self, identity: i32, token: u64, candidate: &Arc<T>) -> Published<T> {
        let slot = Slot {
            token,
            target: Arc::downgrade(candidate),
        };
        match self.entries.entry(identity) {
            Entry::Occupied(mut occupied) => {
                if let Some(live) = occupied.get().target.upgrade() {
                    return Published::Existing(live);
                }
                occupied.insert(slot);
                Published::Replaced
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                Published::Inserted
            }
        }
    }

    /// Remove the entry registered with `token`.
    /// Returns `true` exactly once per registration.
    pub fn remove(&self, identity: i32, token: u64) -> bool {
        self.entries
            .remove_if(&identity, |_, slot| slot.token == token)
            .is_some()
    }

    /// Remove whatever entry `identity` has. Used for deterministic release.
    pub fn remove_any(&self, identity: i32) -> bool {
        self.entries.remove(&identity).is_some()
    }

    /// Pin the target registered with `token`
    pub fn hold(&self, identity: i32, token: u64, target: Arc<T>) {
        self.pinned
            .entry((identity, token))
            .and_modify(|(_, count)| *count += 1)
            .or_insert((target, 1));
    }

    pub fn unhold(&self, identity: i32, token: u64) {
        let key = (identity, token);
        let last = match self.pinned.get_mut(&key) {
            Some(mut pin) => {
                pin.1 = pin.1.saturating_sub(1);
                pin.1 == 0
            }
            None => false,
        };
        if last {
            // drop the strong reference outside the shard lock
            let released = self.pinned.remove_if(&key, |_, (_, count)| *count == 0);
            drop(released);
        }
    }

    pub fn state(&self, identity: i32) -> HandleState {
        let (token, alive) = match self.entries.get(&identity) {
            None => return HandleState::Untracked,
            Some(slot) => (slot.token, slot.target.strong_count() > 0),
        };
        if self.pinned.contains_key(&(identity, token)) {
            HandleState::StronglyHeld
        } else if alive {
            HandleState::WeaklyTracked
        } else {
            HandleState::Finalizing
        }
    }

    /// Number of registered identities, dead entries included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Remove every entry, returning the identities removed.
    /// Outstanding pins stay with their owners; they no longer match an entry.
    pub fn drain(&self) -> Vec<i32> {
        let registered: Vec<(i32, u64)> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().token))
            .collect();
        registered
            .into_iter()
            .filter(|(identity, token)| self.remove(*identity, *token))
            .map(|(identity, _)| identity)
            .collect()
    }
}
