//! Sync cycle orchestration.
//!
//! A cycle loads the local record, fetches the remote one, classifies the
//! pair with [`detect`] and then pushes, pulls or parks the record as
//! `Conflicted`. Cycles for one user never overlap: a trigger that arrives
//! while a cycle or a resolution holds the user's slot is deferred, and only
//! the latest deferred trigger runs once the slot frees up.

use std::fmt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::detector::{detect, Detection};
use super::error::SyncError;
use super::recency;
use super::resolver::{ConflictPrompt, ConflictResolver, Resolution, ResolutionSession};
use super::slots::SyncSlots;
use crate::clock::{next_local_stamp, Clock, SystemClock};
use crate::db::{DietStore, StoreError};
use crate::models::{Baseline, DietRecord, LocalDiet, RemoteDiet, SyncState};
use crate::remote::RemoteStore;

/// What started a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    AppStart,
    Reconnect,
    /// A local edit was saved durably.
    LocalEdit,
}

/// What a cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    UpToDate,
    Pushed,
    Pulled,
    Conflicted,
    /// The slot was busy; the trigger runs after the current holder finishes.
    Coalesced,
    Resolved(Resolution),
    /// An edit left the record as it was, so nothing was saved or synced.
    Unchanged,
    /// The cycle failed and left the stored record as it was.
    Retry(String),
}

/// Outcome of one [`SyncOrchestrator::sync`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// Persisted state after the cycle, `None` when no local record exists.
    pub state: Option<SyncState>,
    pub action: SyncAction,
    /// Set when the record is waiting for a resolution.
    pub prompt: Option<ConflictPrompt>,
}

impl SyncReport {
    fn new(state: Option<SyncState>, action: SyncAction) -> Self {
        Self {
            state,
            action,
            prompt: None,
        }
    }

    pub fn is_conflicted(&self) -> bool {
        self.state == Some(SyncState::Conflicted)
    }
}

/// Runs sync cycles and conflict resolutions for any number of users.
pub struct SyncOrchestrator<R, C = SystemClock> {
    store: DietStore,
    remote: R,
    clock: C,
    slots: SyncSlots,
    /// Serializes read-modify-write sequences on the local store.
    write_lock: Mutex<()>,
}

impl<R: RemoteStore> SyncOrchestrator<R, SystemClock> {
    pub fn new(store: DietStore, remote: R) -> Self {
        Self::with_clock(store, remote, SystemClock)
    }
}

impl<R: RemoteStore, C: Clock> SyncOrchestrator<R, C> {
    pub fn with_clock(store: DietStore, remote: R, clock: C) -> Self {
        Self {
            store,
            remote,
            clock,
            slots: SyncSlots::default(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &DietStore {
        &self.store
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Runs a cycle for `user_id`, or defers the trigger if one is in flight.
    ///
    /// Storage and network failures are reported as [`SyncAction::Retry`];
    /// they never change the persisted record or its state.
    pub async fn sync(&self, user_id: &str, trigger: Trigger) -> SyncReport {
        if !self.slots.try_begin(user_id, trigger) {
            debug!(user_id, ?trigger, "Sync slot busy, trigger deferred");
            let state = self.persisted_state(user_id).await;
            return SyncReport::new(state, SyncAction::Coalesced);
        }

        let mut trigger = trigger;
        loop {
            let report = self.run_cycle(user_id, trigger).await;
            match self.slots.finish_or_next(user_id) {
                Some(next) => {
                    debug!(user_id, ?next, "Running deferred trigger");
                    trigger = next;
                }
                None => return report,
            }
        }
    }

    async fn run_cycle(&self, user_id: &str, trigger: Trigger) -> SyncReport {
        debug!(user_id, ?trigger, "Starting sync cycle");

        match self.cycle(user_id).await {
            Ok(report) => {
                debug!(user_id, action = ?report.action, "Sync cycle finished");
                report
            }
            Err(e) => {
                warn!(user_id, error = %e, "Sync failed, will retry on next trigger");
                let state = self.persisted_state(user_id).await;
                SyncReport::new(state, SyncAction::Retry(e.to_string()))
            }
        }
    }

    async fn cycle(&self, user_id: &str) -> Result<SyncReport, SyncError> {
        let local = self.store.load(user_id).await?;
        let remote = self.remote.fetch(user_id).await?;

        if let Some(local) = local.as_ref().filter(|l| l.state == SyncState::Conflicted) {
            return self.refresh_conflict(user_id, local, remote).await;
        }

        let detection = detect(local.as_ref(), remote.as_ref());
        debug!(user_id, ?detection, "Detection");

        match (detection, local, remote) {
            (Detection::InSync, Some(local), _) => {
                if local.state != SyncState::Synced {
                    let (_write, current) = self.reload_locked(user_id).await?;
                    if let Some(mut current) =
                        current.filter(|c| c.local_stamp == local.local_stamp)
                    {
                        current.state = SyncState::Synced;
                        self.store.save(user_id, &current).await?;
                    }
                }
                Ok(SyncReport::new(Some(SyncState::Synced), SyncAction::UpToDate))
            }

            (Detection::PushLocal, Some(local), _) => {
                let stamp = self.remote.push(user_id, &local.record).await?;
                info!(user_id, updated_at = %stamp, "Pushed local diet");

                let (_write, current) = self.reload_locked(user_id).await?;
                let next = match current {
                    Some(current) if current.local_stamp != local.local_stamp => {
                        // Edited while the push was in flight; the newer edit goes out next cycle.
                        LocalDiet {
                            baseline: Baseline::exchanged(local.local_stamp, stamp),
                            state: SyncState::Unsynced,
                            conflict: None,
                            ..current
                        }
                    }
                    Some(current) => LocalDiet::synced(current.record, current.local_stamp, stamp),
                    None => LocalDiet::synced(local.record, local.local_stamp, stamp),
                };
                self.store.save(user_id, &next).await?;
                Ok(SyncReport::new(Some(next.state), SyncAction::Pushed))
            }

            (Detection::PullRemote, local, Some(remote)) => {
                let seen = local.as_ref().map(|l| l.local_stamp);
                let (_write, current) = self.reload_locked(user_id).await?;
                if current.as_ref().map(|c| c.local_stamp) != seen {
                    return Ok(SyncReport::new(
                        current.map(|c| c.state),
                        SyncAction::Retry("local record changed during sync".to_string()),
                    ));
                }

                let stamp = next_local_stamp(
                    &self.clock,
                    local
                        .iter()
                        .flat_map(|l| [Some(l.local_stamp), l.baseline.local]),
                );
                let pulled = LocalDiet::synced(remote.record, stamp, remote.stamp);
                self.store.save(user_id, &pulled).await?;
                info!(user_id, updated_at = %remote.stamp, "Pulled remote diet");
                Ok(SyncReport::new(Some(SyncState::Synced), SyncAction::Pulled))
            }

            (Detection::Conflicted, Some(_), Some(remote)) => {
                let (_write, current) = self.reload_locked(user_id).await?;
                let Some(mut current) = current else {
                    return Err(SyncError::NoRecord(user_id.to_string()));
                };
                let remote_stamp = remote.stamp;
                current.state = SyncState::Conflicted;
                current.conflict = Some(remote);
                self.store.save(user_id, &current).await?;
                info!(user_id, remote_updated_at = %remote_stamp, "Diet record conflicted");
                Ok(self.conflicted_report(&current))
            }

            (Detection::Empty, _, _) => Ok(SyncReport::new(None, SyncAction::UpToDate)),

            // detect() only returns these with the matching side present.
            (detection, _, _) => Err(SyncError::ApplyFailed(format!(
                "no record to apply {:?}",
                detection
            ))),
        }
    }

    /// A stored conflict is never settled by a cycle; only the candidate is refreshed.
    async fn refresh_conflict(
        &self,
        user_id: &str,
        local: &LocalDiet,
        remote: Option<RemoteDiet>,
    ) -> Result<SyncReport, SyncError> {
        let candidate_stamp = local.conflict.as_ref().map(|c| c.stamp);
        match remote {
            Some(remote) if Some(remote.stamp) != candidate_stamp => {
                let (_write, current) = self.reload_locked(user_id).await?;
                let Some(mut current) = current else {
                    return Err(SyncError::NoRecord(user_id.to_string()));
                };
                debug!(user_id, remote_updated_at = %remote.stamp, "Refreshing conflict candidate");
                current.conflict = Some(remote);
                self.store.save(user_id, &current).await?;
                Ok(self.conflicted_report(&current))
            }
            _ => Ok(self.conflicted_report(local)),
        }
    }

    fn conflicted_report(&self, local: &LocalDiet) -> SyncReport {
        SyncReport {
            state: Some(SyncState::Conflicted),
            action: SyncAction::Conflicted,
            prompt: Some(ConflictPrompt::new(
                local,
                local.conflict.as_ref(),
                self.clock.now_ms(),
            )),
        }
    }

    async fn reload_locked(
        &self,
        user_id: &str,
    ) -> Result<(MutexGuard<'_, ()>, Option<LocalDiet>), SyncError> {
        let guard = self.write_lock.lock().await;
        let current = self.store.load(user_id).await?;
        Ok((guard, current))
    }

    async fn persisted_state(&self, user_id: &str) -> Option<SyncState> {
        match self.store.load(user_id).await {
            Ok(diet) => diet.map(|d| d.state),
            Err(_) => None,
        }
    }

    /// Applies `edit` to the user's record, saves it, then syncs.
    ///
    /// The edit is durable once this returns `Ok`, whatever the sync outcome.
    /// Refused while a resolution for the record is open.
    pub async fn edit<F, T>(&self, user_id: &str, edit: F) -> Result<(T, SyncReport), SyncError>
    where
        F: FnOnce(&mut DietRecord) -> T,
    {
        let value = {
            let _write = self.write_lock.lock().await;
            if self.slots.is_resolving(user_id) {
                return Err(SyncError::ResolutionPending(user_id.to_string()));
            }
            let (value, saved) = save_local_edit(&self.store, &self.clock, user_id, edit).await?;
            if saved.is_none() {
                let state = self.persisted_state(user_id).await;
                return Ok((value, SyncReport::new(state, SyncAction::Unchanged)));
            }
            value
        };

        let report = self.sync(user_id, Trigger::LocalEdit).await;
        Ok((value, report))
    }

    /// Opens the decision for a `Conflicted` record.
    pub async fn open_resolution(&self, user_id: &str) -> Result<ResolutionSession, SyncError> {
        let _write = self.write_lock.lock().await;
        let guard = match self.slots.begin_resolution(user_id) {
            Some(guard) => guard,
            None if self.slots.is_resolving(user_id) => {
                return Err(SyncError::ResolutionPending(user_id.to_string()))
            }
            None => return Err(SyncError::Busy(user_id.to_string())),
        };

        let local = self
            .store
            .load(user_id)
            .await?
            .ok_or_else(|| SyncError::NoRecord(user_id.to_string()))?;
        ResolutionSession::open(user_id, local, self.clock.now_ms(), guard)
    }

    /// Applies `choice`. On failure the session stays open for another attempt.
    pub async fn resolve(
        &self,
        session: &mut ResolutionSession,
        choice: Resolution,
    ) -> Result<SyncReport, SyncError> {
        let resolver = ConflictResolver::new(&self.store, &self.remote, &self.clock);
        let state = resolver.apply(session, choice).await?;

        if let Some(next) = self.slots.take_deferred(session.user_id()) {
            debug!(user_id = session.user_id(), ?next, "Running trigger deferred during resolution");
            self.sync(session.user_id(), next).await;
        }

        Ok(SyncReport::new(Some(state), SyncAction::Resolved(choice)))
    }

    /// The record as collaborators may consume it: unavailable while a resolution is open.
    pub async fn finalized_record(&self, user_id: &str) -> Result<Option<DietRecord>, SyncError> {
        if self.slots.is_resolving(user_id) {
            return Err(SyncError::ResolutionPending(user_id.to_string()));
        }
        Ok(self.store.load_record(user_id).await?)
    }

    pub async fn status(&self, user_id: &str) -> Result<SyncStatus, SyncError> {
        let mut status = SyncStatus::load(&self.store, &self.clock, user_id).await?;
        status.resolving = self.slots.is_resolving(user_id);
        Ok(status)
    }
}

/// Saves a local edit with a fresh local stamp, without syncing.
///
/// Creates a record with the default meal types if the user has none yet.
/// Returns `None` instead of the saved diet when `edit` left the record
/// unchanged; nothing is written then.
pub async fn save_local_edit<C, F, T>(
    store: &DietStore,
    clock: &C,
    user_id: &str,
    edit: F,
) -> Result<(T, Option<LocalDiet>), StoreError>
where
    C: Clock,
    F: FnOnce(&mut DietRecord) -> T,
{
    let (value, diet) = match store.load(user_id).await? {
        Some(mut diet) => {
            let before = diet.record.clone();
            let value = edit(&mut diet.record);
            if diet.record == before {
                return Ok((value, None));
            }
            diet.local_stamp =
                next_local_stamp(clock, [Some(diet.local_stamp), diet.baseline.local]);
            diet.state = diet.state.after_local_edit();
            (value, diet)
        }
        None => {
            let before = DietRecord::new();
            let mut record = before.clone();
            let value = edit(&mut record);
            if record == before {
                return Ok((value, None));
            }
            (value, LocalDiet::unsynced(record, next_local_stamp(clock, [None])))
        }
    };

    store.save(user_id, &diet).await?;
    debug!(user_id, local_updated_at_ms = diet.local_stamp.millis(), "Saved local edit");
    Ok((value, Some(diet)))
}

/// Local view of a record's sync bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    pub state: Option<SyncState>,
    pub pending_changes: bool,
    pub resolving: bool,
    pub baseline: Baseline,
    pub local_label: String,
    pub last_exchange_label: String,
    pub prompt: Option<ConflictPrompt>,
}

impl SyncStatus {
    pub async fn load<C: Clock>(
        store: &DietStore,
        clock: &C,
        user_id: &str,
    ) -> Result<Self, StoreError> {
        let now_ms = clock.now_ms();

        let Some(diet) = store.load(user_id).await? else {
            return Ok(Self {
                state: None,
                pending_changes: false,
                resolving: false,
                baseline: Baseline::default(),
                local_label: recency::UNKNOWN.to_string(),
                last_exchange_label: recency::UNKNOWN.to_string(),
                prompt: None,
            });
        };

        let prompt = (diet.state == SyncState::Conflicted)
            .then(|| ConflictPrompt::new(&diet, diet.conflict.as_ref(), now_ms));

        Ok(Self {
            state: Some(diet.state),
            pending_changes: diet.has_local_changes(),
            resolving: false,
            baseline: diet.baseline,
            local_label: recency::local_label(Some(diet.local_stamp), now_ms),
            last_exchange_label: recency::remote_label(diet.baseline.remote, now_ms),
            prompt,
        })
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(state) = self.state else {
            return writeln!(f, "State:            no local record");
        };

        writeln!(f, "State:            {}", state)?;
        writeln!(f, "Local changes:    {}", if self.pending_changes { "yes" } else { "no" })?;
        writeln!(f, "Local version:    {}", self.local_label)?;
        writeln!(f, "Last exchange:    {}", self.last_exchange_label)?;
        match self.baseline.remote {
            Some(stamp) => writeln!(f, "Baseline:         {}", stamp)?,
            None => writeln!(f, "Baseline:         {}", recency::UNKNOWN)?,
        }
        if self.resolving {
            writeln!(f, "Resolution in progress")?;
        }
        Ok(())
    }
}
