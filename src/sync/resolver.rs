//! Conflict resolution.
//!
//! A conflicted record offers exactly two outcomes, [`Resolution::UseRemote`]
//! and [`Resolution::KeepLocal`], both whole-record. A [`ResolutionSession`]
//! stays open until one of them has been applied: it cannot be dismissed, and
//! a failed attempt leaves it open for a retry of either choice.

use std::fmt;

use super::error::SyncError;
use super::recency;
use super::slots::ResolvingGuard;
use crate::clock::{next_local_stamp, Clock};
use crate::db::DietStore;
use crate::models::{LocalDiet, RemoteDiet, RemoteStamp, SyncState};
use crate::remote::RemoteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Replace the local record with the remote one.
    UseRemote,
    /// Push the local record over the remote one.
    KeepLocal,
}

impl Resolution {
    pub const ALL: [Resolution; 2] = [Resolution::UseRemote, Resolution::KeepLocal];

    pub fn label(self) -> &'static str {
        match self {
            Resolution::UseRemote => "Usar versão do servidor",
            Resolution::KeepLocal => "Manter versão deste dispositivo",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::UseRemote => write!(f, "use-remote"),
            Resolution::KeepLocal => write!(f, "keep-local"),
        }
    }
}

/// What the conflict dialog needs to render.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictPrompt {
    pub open: bool,
    pub remote_updated_at: Option<RemoteStamp>,
    pub local_updated_at_ms: Option<i64>,
    pub remote_label: String,
    pub local_label: String,
}

impl ConflictPrompt {
    pub fn new(local: &LocalDiet, remote: Option<&RemoteDiet>, now_ms: i64) -> Self {
        let remote_updated_at = remote.map(|r| r.stamp);
        Self {
            open: local.state.durable() == SyncState::Conflicted,
            remote_updated_at,
            local_updated_at_ms: Some(local.local_stamp.millis()),
            remote_label: recency::remote_label(remote_updated_at, now_ms),
            local_label: recency::local_label(Some(local.local_stamp), now_ms),
        }
    }

    pub fn actions(&self) -> [Resolution; 2] {
        Resolution::ALL
    }
}

impl fmt::Display for ConflictPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Conflito de sincronização")?;
        writeln!(
            f,
            "Sua dieta foi alterada neste dispositivo e no servidor desde a última sincronização."
        )?;
        writeln!(f)?;
        writeln!(f, "  Servidor:          {}", self.remote_label)?;
        writeln!(f, "  Este dispositivo:  {}", self.local_label)?;
        writeln!(f)?;
        for action in self.actions() {
            writeln!(f, "  [{}] {}", action, action.label())?;
        }
        Ok(())
    }
}

/// An open decision for one conflicted record.
///
/// Holds both candidate versions. Dropping an unfinished session leaves the
/// persisted record `Conflicted`, so the decision is asked again later.
#[derive(Debug)]
pub struct ResolutionSession {
    user_id: String,
    local: LocalDiet,
    remote: RemoteDiet,
    state: SyncState,
    prompt: ConflictPrompt,
    guard: Option<ResolvingGuard>,
}

impl ResolutionSession {
    pub(crate) fn open(
        user_id: &str,
        local: LocalDiet,
        now_ms: i64,
        guard: ResolvingGuard,
    ) -> Result<Self, SyncError> {
        let remote = match (&local.state, &local.conflict) {
            (SyncState::Conflicted, Some(remote)) => remote.clone(),
            _ => {
                guard.release();
                return Err(SyncError::NotConflicted(user_id.to_string()));
            }
        };

        let prompt = ConflictPrompt::new(&local, Some(&remote), now_ms);
        let mut session = Self {
            user_id: user_id.to_string(),
            local,
            remote,
            state: SyncState::Conflicted,
            prompt,
            guard: Some(guard),
        };
        session.transition(SyncState::Resolving);
        Ok(session)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn prompt(&self) -> &ConflictPrompt {
        &self.prompt
    }

    pub fn local(&self) -> &LocalDiet {
        &self.local
    }

    pub fn remote(&self) -> &RemoteDiet {
        &self.remote
    }

    pub fn is_open(&self) -> bool {
        self.guard.is_some()
    }

    /// Closing without a decision is refused while the session is open.
    pub fn dismiss(&self) -> Result<(), SyncError> {
        if self.is_open() {
            return Err(SyncError::ResolutionPending(self.user_id.clone()));
        }
        Ok(())
    }

    fn transition(&mut self, next: SyncState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }

    fn fail(&mut self, error: SyncError) -> SyncError {
        tracing::warn!(user_id = %self.user_id, error = %error, "Resolution attempt failed");
        self.transition(SyncState::Error);
        error
    }

    fn complete(&mut self) {
        self.transition(SyncState::Synced);
        self.prompt.open = false;
        if let Some(guard) = self.guard.take() {
            guard.release();
        }
    }
}

/// Applies a user's choice to both stores.
pub struct ConflictResolver<'a, R, C> {
    store: &'a DietStore,
    remote: &'a R,
    clock: &'a C,
}

impl<'a, R: RemoteStore, C: Clock> ConflictResolver<'a, R, C> {
    pub fn new(store: &'a DietStore, remote: &'a R, clock: &'a C) -> Self {
        Self {
            store,
            remote,
            clock,
        }
    }

    pub async fn apply(
        &self,
        session: &mut ResolutionSession,
        choice: Resolution,
    ) -> Result<SyncState, SyncError> {
        if !session.is_open() {
            return Err(SyncError::NotConflicted(session.user_id.clone()));
        }
        if session.state == SyncState::Error {
            session.transition(SyncState::Resolving);
        }

        let result = match choice {
            Resolution::UseRemote => self.use_remote(session).await,
            Resolution::KeepLocal => self.keep_local(session).await,
        };

        match result {
            Ok(()) => {
                session.complete();
                tracing::info!(user_id = %session.user_id, choice = %choice, "Conflict resolved");
                Ok(SyncState::Synced)
            }
            Err(e) => Err(session.fail(e)),
        }
    }

    /// Overwrites the local record and baseline with the remote version.
    async fn use_remote(&self, session: &ResolutionSession) -> Result<(), SyncError> {
        let local = &session.local;
        let stamp = next_local_stamp(self.clock, [Some(local.local_stamp), local.baseline.local]);
        let resolved = LocalDiet::synced(session.remote.record.clone(), stamp, session.remote.stamp);

        self.store
            .save(&session.user_id, &resolved)
            .await
            .map_err(|e| SyncError::ApplyFailed(e.to_string()))
    }

    /// Pushes the local record and adopts the server's stamp as the new baseline.
    async fn keep_local(&self, session: &ResolutionSession) -> Result<(), SyncError> {
        let local = &session.local;
        let remote_stamp = self.remote.push(&session.user_id, &local.record).await?;
        let resolved = LocalDiet::synced(local.record.clone(), local.local_stamp, remote_stamp);

        self.store
            .save(&session.user_id, &resolved)
            .await
            .map_err(|e| SyncError::ApplyFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use crate::db::init_db;
    use crate::models::{DietRecord, LocalStamp, MealItem};
    use crate::remote::memory::MemoryRemote;
    use crate::sync::slots::SyncSlots;
    use tempfile::TempDir;
    use uuid::Uuid;

    struct TestContext {
        store: DietStore,
        remote: MemoryRemote,
        clock: ManualClock,
        slots: SyncSlots,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        TestContext {
            store: DietStore::new(pool),
            remote: MemoryRemote::new(),
            clock: ManualClock::at(1_700_000_100_000),
            slots: SyncSlots::default(),
            _temp_dir: temp_dir,
        }
    }

    fn record_with(food: &str) -> DietRecord {
        let mut record = DietRecord::new();
        let dinner = record.meal_types[2].id;
        record.meal_items.push(MealItem::new(dinner, food, 1.0, "prato"));
        // Orphaned item that must survive every resolution.
        record
            .meal_items
            .push(MealItem::new(Uuid::new_v4(), "suplemento", 2.0, "cápsulas"));
        record
    }

    /// Persists a conflicted local record and returns an open session for it.
    async fn conflicted_session(ctx: &TestContext) -> ResolutionSession {
        let remote_record = record_with("sopa");
        let remote_stamp = ctx.remote.put("ana", remote_record.clone());

        let mut local = LocalDiet::unsynced(record_with("lasanha"), LocalStamp(1_700_000_000_000));
        local.baseline.remote = Some("2023-11-10T00:00:00.000Z".parse().unwrap());
        local.state = SyncState::Conflicted;
        local.conflict = Some(RemoteDiet {
            record: remote_record,
            stamp: remote_stamp,
        });
        ctx.store.save("ana", &local).await.unwrap();

        let guard = ctx.slots.begin_resolution("ana").unwrap();
        ResolutionSession::open("ana", local, ctx.clock.now_ms(), guard).unwrap()
    }

    #[tokio::test]
    async fn test_open_requires_conflict() {
        let ctx = setup().await;
        let local = LocalDiet::unsynced(DietRecord::new(), LocalStamp(1));
        let guard = ctx.slots.begin_resolution("ana").unwrap();

        let result = ResolutionSession::open("ana", local, 0, guard);
        assert!(matches!(result, Err(SyncError::NotConflicted(_))));
        assert!(!ctx.slots.is_resolving("ana"));
    }

    #[tokio::test]
    async fn test_session_offers_two_choices_and_cannot_be_dismissed() {
        let ctx = setup().await;
        let session = conflicted_session(&ctx).await;

        assert_eq!(session.state(), SyncState::Resolving);
        assert!(session.prompt().open);
        assert_eq!(
            session.prompt().actions(),
            [Resolution::UseRemote, Resolution::KeepLocal]
        );
        assert_eq!(
            session.prompt().local_updated_at_ms,
            Some(1_700_000_000_000)
        );
        assert_eq!(session.prompt().local_label, "atualizado há 1 minuto");
        assert!(matches!(
            session.dismiss(),
            Err(SyncError::ResolutionPending(_))
        ));
    }

    #[tokio::test]
    async fn test_use_remote_overwrites_local() {
        let ctx = setup().await;
        let mut session = conflicted_session(&ctx).await;
        let remote = session.remote().clone();
        let resolver = ConflictResolver::new(&ctx.store, &ctx.remote, &ctx.clock);

        let state = resolver
            .apply(&mut session, Resolution::UseRemote)
            .await
            .unwrap();
        assert_eq!(state, SyncState::Synced);
        assert!(!session.is_open());
        assert!(session.dismiss().is_ok());
        assert!(!ctx.slots.is_resolving("ana"));

        let stored = ctx.store.load("ana").await.unwrap().unwrap();
        assert_eq!(stored.record, remote.record);
        assert_eq!(stored.state, SyncState::Synced);
        assert_eq!(stored.baseline.remote, Some(remote.stamp));
        assert_eq!(stored.baseline.local, Some(stored.local_stamp));
        assert!(stored.conflict.is_none());
        assert_eq!(stored.record.orphaned_items().len(), 1);
        assert_eq!(ctx.remote.push_count(), 0);
    }

    #[tokio::test]
    async fn test_keep_local_pushes_and_adopts_server_stamp() {
        let ctx = setup().await;
        let mut session = conflicted_session(&ctx).await;
        let local_record = session.local().record.clone();
        let resolver = ConflictResolver::new(&ctx.store, &ctx.remote, &ctx.clock);

        resolver
            .apply(&mut session, Resolution::KeepLocal)
            .await
            .unwrap();

        let remote = ctx.remote.get("ana").unwrap();
        assert_eq!(remote.record, local_record);

        let stored = ctx.store.load("ana").await.unwrap().unwrap();
        assert_eq!(stored.record, local_record);
        assert_eq!(stored.baseline.remote, Some(remote.stamp));
        assert_eq!(stored.baseline.local, Some(LocalStamp(1_700_000_000_000)));
        assert_eq!(stored.state, SyncState::Synced);
    }

    #[tokio::test]
    async fn test_keep_local_offline_stays_conflicted_then_retry_succeeds() {
        let ctx = setup().await;
        let mut session = conflicted_session(&ctx).await;
        let local_record = session.local().record.clone();
        let resolver = ConflictResolver::new(&ctx.store, &ctx.remote, &ctx.clock);

        ctx.remote.set_offline(true);
        let result = resolver.apply(&mut session, Resolution::KeepLocal).await;
        assert!(matches!(result, Err(SyncError::RemoteUnavailable(_))));
        assert_eq!(session.state(), SyncState::Error);
        assert!(session.is_open());

        let stored = ctx.store.load("ana").await.unwrap().unwrap();
        assert_eq!(stored.state, SyncState::Conflicted);
        assert_eq!(stored.record, local_record);

        ctx.remote.set_offline(false);
        let state = resolver
            .apply(&mut session, Resolution::KeepLocal)
            .await
            .unwrap();
        assert_eq!(state, SyncState::Synced);
        assert_eq!(ctx.remote.get("ana").unwrap().record, local_record);
    }

    #[tokio::test]
    async fn test_failed_apply_allows_the_other_choice() {
        let ctx = setup().await;
        let mut session = conflicted_session(&ctx).await;
        let resolver = ConflictResolver::new(&ctx.store, &ctx.remote, &ctx.clock);

        ctx.remote.set_offline(true);
        assert!(resolver
            .apply(&mut session, Resolution::KeepLocal)
            .await
            .is_err());

        let state = resolver
            .apply(&mut session, Resolution::UseRemote)
            .await
            .unwrap();
        assert_eq!(state, SyncState::Synced);
    }

    #[tokio::test]
    async fn test_use_remote_storage_failure_is_apply_failed() {
        let ctx = setup().await;
        let mut session = conflicted_session(&ctx).await;
        let resolver = ConflictResolver::new(&ctx.store, &ctx.remote, &ctx.clock);

        sqlx::query("CREATE TRIGGER fail_diets BEFORE UPDATE ON diets BEGIN SELECT RAISE(ABORT, 'disk full'); END")
            .execute(ctx.store.pool())
            .await
            .unwrap();

        let result = resolver.apply(&mut session, Resolution::UseRemote).await;
        assert!(matches!(result, Err(SyncError::ApplyFailed(_))));
        assert_eq!(session.state(), SyncState::Error);

        let stored = ctx.store.load("ana").await.unwrap().unwrap();
        assert_eq!(stored.state, SyncState::Conflicted);
        assert_eq!(stored.record, session.local().record);
    }

    #[tokio::test]
    async fn test_completed_session_rejects_further_choices() {
        let ctx = setup().await;
        let mut session = conflicted_session(&ctx).await;
        let resolver = ConflictResolver::new(&ctx.store, &ctx.remote, &ctx.clock);

        resolver
            .apply(&mut session, Resolution::UseRemote)
            .await
            .unwrap();
        let again = resolver.apply(&mut session, Resolution::KeepLocal).await;
        assert!(matches!(again, Err(SyncError::NotConflicted(_))));
        assert_eq!(ctx.remote.push_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_session_leaves_record_conflicted() {
        let ctx = setup().await;
        let session = conflicted_session(&ctx).await;
        drop(session);

        assert!(!ctx.slots.is_resolving("ana"));
        let stored = ctx.store.load("ana").await.unwrap().unwrap();
        assert_eq!(stored.state, SyncState::Conflicted);
        assert!(stored.conflict.is_some());
    }

    #[test]
    fn test_prompt_display() {
        let mut local = LocalDiet::unsynced(DietRecord::new(), LocalStamp(1_700_000_000_000));
        local.state = SyncState::Conflicted;
        let prompt = ConflictPrompt::new(&local, None, 1_700_000_000_000 + 3 * 3_600_000);

        assert!(prompt.open);
        assert_eq!(prompt.remote_label, "(desconhecido)");
        let output = prompt.to_string();
        assert!(output.contains("atualizado há 3 horas"));
        assert!(output.contains("[use-remote] Usar versão do servidor"));
        assert!(output.contains("[keep-local] Manter versão deste dispositivo"));
    }
}
