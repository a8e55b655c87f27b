//! Three-way conflict detection.
//!
//! Each side's current stamp is compared with the [`Baseline`] remembered at
//! the last exchange. Stamps from different clocks are never compared with
//! each other, so clock skew between device and server cannot pick a winner.
//!
//! [`Baseline`]: crate::models::Baseline

use crate::models::{LocalDiet, RemoteDiet};

/// What a sync cycle should do with a local/remote pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// Neither side has a record.
    Empty,
    /// Both sides still match the baseline.
    InSync,
    /// Local is authoritative: push it.
    PushLocal,
    /// Remote is authoritative: pull it.
    PullRemote,
    /// Both sides changed independently since the last exchange.
    Conflicted,
}

pub fn detect(local: Option<&LocalDiet>, remote: Option<&RemoteDiet>) -> Detection {
    let (local, remote) = match (local, remote) {
        (None, None) => return Detection::Empty,
        (Some(_), None) => return Detection::PushLocal,
        (None, Some(_)) => return Detection::PullRemote,
        (Some(local), Some(remote)) => (local, remote),
    };

    let remote_unchanged = local.baseline.remote == Some(remote.stamp);

    if !local.has_local_changes() {
        if remote_unchanged {
            return Detection::InSync;
        }
        return Detection::PullRemote;
    }

    if remote_unchanged {
        return Detection::PushLocal;
    }

    Detection::Conflicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Baseline, DietRecord, LocalStamp, RemoteStamp};

    fn stamp(iso: &str) -> RemoteStamp {
        iso.parse().unwrap()
    }

    fn local(stamp_ms: i64, baseline: Baseline) -> LocalDiet {
        let mut diet = LocalDiet::unsynced(DietRecord::new(), LocalStamp(stamp_ms));
        diet.baseline = baseline;
        diet
    }

    fn remote(at: &str) -> RemoteDiet {
        RemoteDiet {
            record: DietRecord::new(),
            stamp: stamp(at),
        }
    }

    #[test]
    fn test_nothing_anywhere() {
        assert_eq!(detect(None, None), Detection::Empty);
    }

    #[test]
    fn test_no_remote_record_local_wins() {
        let diet = local(1_700_000_000_000, Baseline::default());
        assert_eq!(detect(Some(&diet), None), Detection::PushLocal);
    }

    #[test]
    fn test_no_local_record_pulls() {
        let remote = remote("2023-11-14T22:13:20.000Z");
        assert_eq!(detect(None, Some(&remote)), Detection::PullRemote);
    }

    #[test]
    fn test_local_unchanged_remote_moved_pulls() {
        let baseline = Baseline::exchanged(LocalStamp(1_000), stamp("2023-11-10T00:00:00.000Z"));
        let diet = local(1_000, baseline);
        let remote = remote("2023-11-14T22:13:20.000Z");
        assert_eq!(detect(Some(&diet), Some(&remote)), Detection::PullRemote);
    }

    #[test]
    fn test_remote_matches_baseline_local_wins() {
        // Local stamps that look far older or far newer than the server's must not matter.
        for local_ms in [1, 1_700_000_000_001, 4_000_000_000_000] {
            let baseline =
                Baseline::exchanged(LocalStamp(0), stamp("2023-11-10T00:00:00.000Z"));
            let diet = local(local_ms, baseline);
            let remote = remote("2023-11-10T00:00:00.000Z");
            assert_eq!(detect(Some(&diet), Some(&remote)), Detection::PushLocal);
        }
    }

    #[test]
    fn test_both_unchanged_in_sync() {
        let baseline = Baseline::exchanged(LocalStamp(1_000), stamp("2023-11-10T00:00:00.000Z"));
        let diet = local(1_000, baseline);
        let remote = remote("2023-11-10T00:00:00.000Z");
        assert_eq!(detect(Some(&diet), Some(&remote)), Detection::InSync);
    }

    #[test]
    fn test_both_changed_is_conflicted_regardless_of_magnitude() {
        let baseline = Baseline::exchanged(LocalStamp(1_000), stamp("2023-11-10T00:00:00.000Z"));
        let remote = remote("2023-11-14T22:13:20.000Z");

        // Device clock behind, equal to, and ahead of the server instant.
        for local_ms in [1_001, 1_700_000_000_000, 1_900_000_000_000] {
            let diet = local(local_ms, baseline);
            assert_eq!(detect(Some(&diet), Some(&remote)), Detection::Conflicted);
        }
    }

    #[test]
    fn test_scenario_local_edit_and_remote_edit() {
        let baseline = Baseline {
            local: Some(LocalStamp(1_699_574_400_000)),
            remote: Some(stamp("2023-11-10T00:00:00.000Z")),
        };
        let diet = local(1_700_000_000_000, baseline);
        let remote = remote("2023-11-14T22:13:20.000Z");
        assert_eq!(detect(Some(&diet), Some(&remote)), Detection::Conflicted);
    }

    #[test]
    fn test_never_exchanged_but_remote_exists_is_conflicted() {
        let diet = local(1_700_000_000_000, Baseline::default());
        let remote = remote("2023-11-14T22:13:20.000Z");
        assert_eq!(detect(Some(&diet), Some(&remote)), Detection::Conflicted);
    }
}
