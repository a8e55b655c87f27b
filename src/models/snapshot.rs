use super::diet_record::DietRecord;
use super::sync_state::SyncState;
use super::version_stamp::{Baseline, LocalStamp, RemoteStamp};

/// The remote copy of a diet record and the stamp the server gave it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDiet {
    pub record: DietRecord,
    pub stamp: RemoteStamp,
}

/// Everything the device persists about one user's diet record.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDiet {
    pub record: DietRecord,
    /// Stamp of the latest local mutation.
    pub local_stamp: LocalStamp,
    pub baseline: Baseline,
    pub state: SyncState,
    /// Remote candidate kept while `Conflicted`, so the choice survives restarts.
    pub conflict: Option<RemoteDiet>,
}

impl LocalDiet {
    /// A record that only exists on this device.
    pub fn unsynced(record: DietRecord, local_stamp: LocalStamp) -> Self {
        Self {
            record,
            local_stamp,
            baseline: Baseline::default(),
            state: SyncState::Unsynced,
            conflict: None,
        }
    }

    /// A record whose local and remote copies were just exchanged.
    pub fn synced(record: DietRecord, local_stamp: LocalStamp, remote_stamp: RemoteStamp) -> Self {
        Self {
            record,
            local_stamp,
            baseline: Baseline::exchanged(local_stamp, remote_stamp),
            state: SyncState::Synced,
            conflict: None,
        }
    }

    /// Whether the record changed locally since the last exchange.
    pub fn has_local_changes(&self) -> bool {
        self.baseline.local != Some(self.local_stamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsynced_has_local_changes() {
        let diet = LocalDiet::unsynced(DietRecord::new(), LocalStamp(10));
        assert!(diet.has_local_changes());
        assert_eq!(diet.state, SyncState::Unsynced);
    }

    #[test]
    fn test_synced_has_no_local_changes() {
        let stamp = RemoteStamp::from_millis(1_700_000_000_000).unwrap();
        let diet = LocalDiet::synced(DietRecord::new(), LocalStamp(10), stamp);
        assert!(!diet.has_local_changes());
        assert_eq!(diet.baseline.remote, Some(stamp));
    }
}
