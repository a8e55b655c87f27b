//! Server-side diet record storage.
//!
//! One JSON file per user:
//! ```text
//! <DATA_DIR>/
//!   <user_id>.json
//! ```
//!
//! Writes go through a temp file and a rename, so a crash never leaves a
//! half-written record behind.

use chrono::{DateTime, Duration, DurationRound, Utc};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::PathBuf;

use crate::models::{is_valid_user_id, DietRecord, RemoteStamp};
use crate::remote::RemoteDietRecord;

/// Errors that can occur during server storage operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerStorageError {
    #[error("I/O error for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse diet record {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid user ID: {0}")]
    InvalidUserId(String),
}

/// File-backed storage for the remote copy of each user's diet record.
#[derive(Debug, Clone)]
pub struct DietStorage {
    data_dir: PathBuf,
}

impl DietStorage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Validates a user ID to prevent path traversal attacks.
    fn validate_user_id(user_id: &str) -> Result<(), ServerStorageError> {
        if !is_valid_user_id(user_id) {
            return Err(ServerStorageError::InvalidUserId(user_id.to_string()));
        }
        Ok(())
    }

    fn record_path(&self, user_id: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", user_id))
    }

    /// Returns `Ok(None)` if the user has no record yet.
    pub fn load(&self, user_id: &str) -> Result<Option<RemoteDietRecord>, ServerStorageError> {
        Self::validate_user_id(user_id)?;

        let path = self.record_path(user_id);

        match File::open(&path) {
            Ok(mut file) => {
                let mut contents = String::new();
                file.read_to_string(&mut contents)
                    .map_err(|source| ServerStorageError::Io {
                        path: path.clone(),
                        source,
                    })?;

                let record = serde_json::from_str(&contents).map_err(|e| {
                    ServerStorageError::Parse {
                        path,
                        reason: e.to_string(),
                    }
                })?;

                Ok(Some(record))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ServerStorageError::Io { path, source }),
        }
    }

    /// Overwrites the user's record and stamps it.
    ///
    /// The stamp is the current time, bumped past the previous stamp when
    /// the wall clock has not moved forward.
    pub fn save(
        &self,
        user_id: &str,
        record: DietRecord,
        now: DateTime<Utc>,
    ) -> Result<RemoteDietRecord, ServerStorageError> {
        let previous = self.load(user_id)?.map(|r| r.updated_at);
        let stored = RemoteDietRecord::new(record, next_remote_stamp(now, previous));

        fs::create_dir_all(&self.data_dir).map_err(|source| ServerStorageError::Io {
            path: self.data_dir.clone(),
            source,
        })?;

        let path = self.record_path(user_id);
        let temp_path = path.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(&stored).map_err(|e| ServerStorageError::Parse {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let mut file = File::create(&temp_path).map_err(|source| ServerStorageError::Io {
            path: temp_path.clone(),
            source,
        })?;
        file.write_all(&bytes)
            .and_then(|_| file.sync_all())
            .map_err(|source| ServerStorageError::Io {
                path: temp_path.clone(),
                source,
            })?;

        fs::rename(&temp_path, &path).map_err(|source| ServerStorageError::Io { path, source })?;

        Ok(stored)
    }
}

/// Millisecond-precision stamp strictly after `previous`.
pub fn next_remote_stamp(now: DateTime<Utc>, previous: Option<RemoteStamp>) -> RemoteStamp {
    let now = now
        .duration_trunc(Duration::milliseconds(1))
        .unwrap_or(now);

    match previous {
        Some(prev) if prev.instant() >= now => {
            RemoteStamp::new(prev.instant() + Duration::milliseconds(1))
        }
        _ => RemoteStamp::new(now),
    }
}
