//! Per-record bookkeeping that keeps sync cycles for one record serialized.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::orchestrator::Trigger;

#[derive(Debug, Default)]
struct Slot {
    running: bool,
    resolving: bool,
    /// Latest trigger that arrived while the slot was busy.
    deferred: Option<Trigger>,
}

/// Shared slot table, keyed by user id.
///
/// The lock is only held for bookkeeping, never across an await.
#[derive(Debug, Clone, Default)]
pub(crate) struct SyncSlots {
    inner: Arc<Mutex<HashMap<String, Slot>>>,
}

impl SyncSlots {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the slot for a cycle. When busy, the trigger is deferred instead.
    pub fn try_begin(&self, user_id: &str, trigger: Trigger) -> bool {
        let mut slots = self.lock();
        let slot = slots.entry(user_id.to_string()).or_default();
        if slot.running || slot.resolving {
            slot.deferred = Some(trigger);
            return false;
        }
        slot.running = true;
        true
    }

    /// Ends a cycle, or hands back a deferred trigger to run next.
    pub fn finish_or_next(&self, user_id: &str) -> Option<Trigger> {
        let mut slots = self.lock();
        let slot = slots.entry(user_id.to_string()).or_default();
        match slot.deferred.take() {
            Some(next) => Some(next),
            None => {
                slot.running = false;
                None
            }
        }
    }

    /// Marks a resolution as open. Fails if a cycle or another resolution holds the slot.
    pub fn begin_resolution(&self, user_id: &str) -> Option<ResolvingGuard> {
        let mut slots = self.lock();
        let slot = slots.entry(user_id.to_string()).or_default();
        if slot.running || slot.resolving {
            return None;
        }
        slot.resolving = true;
        Some(ResolvingGuard {
            slots: self.clone(),
            user_id: user_id.to_string(),
            keep_deferred: false,
        })
    }

    pub fn is_resolving(&self, user_id: &str) -> bool {
        self.lock().get(user_id).is_some_and(|slot| slot.resolving)
    }

    #[cfg(test)]
    pub fn is_running(&self, user_id: &str) -> bool {
        self.lock().get(user_id).is_some_and(|slot| slot.running)
    }

    /// Takes the trigger deferred while the slot was busy, if the slot is free now.
    pub fn take_deferred(&self, user_id: &str) -> Option<Trigger> {
        let mut slots = self.lock();
        let slot = slots.get_mut(user_id)?;
        if slot.running || slot.resolving {
            return None;
        }
        slot.deferred.take()
    }

    fn end_resolution(&self, user_id: &str, keep_deferred: bool) {
        if let Some(slot) = self.lock().get_mut(user_id) {
            slot.resolving = false;
            if !keep_deferred {
                slot.deferred = None;
            }
        }
    }
}

/// Held by an open resolution session; frees the slot when dropped.
///
/// Dropping the guard abandons the resolution and discards any trigger
/// deferred meanwhile. [`ResolvingGuard::release`] keeps it for
/// [`SyncSlots::take_deferred`].
#[derive(Debug)]
pub(crate) struct ResolvingGuard {
    slots: SyncSlots,
    user_id: String,
    keep_deferred: bool,
}

impl ResolvingGuard {
    pub fn release(mut self) {
        self.keep_deferred = true;
    }
}

impl Drop for ResolvingGuard {
    fn drop(&mut self) {
        self.slots.end_resolution(&self.user_id, self.keep_deferred);
    }
}
