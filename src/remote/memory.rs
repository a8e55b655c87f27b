//! In-memory remote store for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{RemoteError, RemoteStore};
use crate::models::{DietRecord, RemoteDiet, RemoteStamp};

/// Behaves like the backend: assigns increasing stamps on push and can be
/// switched offline.
#[derive(Debug)]
pub struct MemoryRemote {
    records: Mutex<HashMap<String, RemoteDiet>>,
    next_ms: AtomicI64,
    offline: AtomicBool,
    pushes: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            next_ms: AtomicI64::new(1_700_000_000_000),
            offline: AtomicBool::new(false),
            pushes: AtomicUsize::new(0),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Simulates a write from another device.
    pub fn put(&self, user_id: &str, record: DietRecord) -> RemoteStamp {
        let stamp = self.assign_stamp();
        self.records
            .lock()
            .unwrap()
            .insert(user_id.to_string(), RemoteDiet { record, stamp });
        stamp
    }

    /// Stores a record under a fixed stamp. Later pushes still get newer stamps.
    pub fn put_with_stamp(&self, user_id: &str, record: DietRecord, stamp: RemoteStamp) {
        self.next_ms
            .fetch_max(stamp.instant().timestamp_millis() + 60_000, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .insert(user_id.to_string(), RemoteDiet { record, stamp });
    }

    pub fn get(&self, user_id: &str) -> Option<RemoteDiet> {
        self.records.lock().unwrap().get(user_id).cloned()
    }

    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    fn assign_stamp(&self) -> RemoteStamp {
        let ms = self.next_ms.fetch_add(60_000, Ordering::SeqCst);
        RemoteStamp::from_millis(ms).unwrap()
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

impl RemoteStore for MemoryRemote {
    async fn fetch(&self, user_id: &str) -> Result<Option<RemoteDiet>, RemoteError> {
        self.check_online()?;
        Ok(self.get(user_id))
    }

    async fn push(&self, user_id: &str, record: &DietRecord) -> Result<RemoteStamp, RemoteError> {
        self.check_online()?;
        self.pushes.fetch_add(1, Ordering::SeqCst);
        Ok(self.put(user_id, record.clone()))
    }
}
