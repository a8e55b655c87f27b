use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a diet record stands relative to its remote copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Local changes not pushed yet.
    Unsynced,
    Synced,
    /// Both sides changed since the last exchange.
    Conflicted,
    /// A user decision is in progress. Never persisted.
    Resolving,
    /// The last resolution attempt failed. Never persisted.
    Error,
}

impl SyncState {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: SyncState) -> bool {
        use SyncState::*;

        matches!(
            (self, next),
            (Unsynced, Unsynced | Synced | Conflicted)
                | (Synced, Synced | Unsynced | Conflicted)
                | (Conflicted, Conflicted | Resolving)
                | (Resolving, Synced | Error)
                | (Error, Resolving | Conflicted)
        )
    }

    /// The state written to disk. In-flight resolution states persist as
    /// `Conflicted` so the decision is asked again after a restart.
    pub fn durable(self) -> SyncState {
        match self {
            SyncState::Resolving | SyncState::Error => SyncState::Conflicted,
            other => other,
        }
    }

    /// State after a local edit has been saved.
    pub fn after_local_edit(self) -> SyncState {
        match self {
            SyncState::Synced => SyncState::Unsynced,
            other => other.durable(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Unsynced => "unsynced",
            SyncState::Synced => "synced",
            SyncState::Conflicted => "conflicted",
            SyncState::Resolving => "resolving",
            SyncState::Error => "error",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unsynced" => Ok(SyncState::Unsynced),
            "synced" => Ok(SyncState::Synced),
            "conflicted" => Ok(SyncState::Conflicted),
            "resolving" => Ok(SyncState::Resolving),
            "error" => Ok(SyncState::Error),
            _ => Err(format!("Invalid sync state '{}'", s)),
        }
    }
}
