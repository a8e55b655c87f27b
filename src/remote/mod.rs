//! Remote store client: fetches and pushes the backend copy of a diet record.
//!
//! The server assigns every remote stamp. Clients send a bare [`DietRecord`]
//! and receive a [`RemoteDietRecord`] carrying the new `updatedAt`.

mod client;
#[cfg(test)]
pub(crate) mod memory;

pub use client::HttpRemoteClient;

use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{DietRecord, MealItem, MealType, RemoteDiet, RemoteStamp};

/// Errors from the remote store. A missing record is not an error.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Server unreachable: {0}")]
    Unavailable(String),

    #[error("Server rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),
}

/// Backend copy of a diet record as exchanged over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDietRecord {
    pub id: Uuid,
    pub meal_types: Vec<MealType>,
    pub meal_items: Vec<MealItem>,
    pub updated_at: RemoteStamp,
}

impl RemoteDietRecord {
    pub fn new(record: DietRecord, updated_at: RemoteStamp) -> Self {
        Self {
            id: record.id,
            meal_types: record.meal_types,
            meal_items: record.meal_items,
            updated_at,
        }
    }
}

impl From<RemoteDietRecord> for RemoteDiet {
    fn from(wire: RemoteDietRecord) -> Self {
        RemoteDiet {
            record: DietRecord {
                id: wire.id,
                meal_types: wire.meal_types,
                meal_items: wire.meal_items,
            },
            stamp: wire.updated_at,
        }
    }
}

/// Fetch/push access to the backend diet records.
pub trait RemoteStore: Send + Sync {
    /// Returns `Ok(None)` when the user has no remote record yet.
    fn fetch(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<RemoteDiet>, RemoteError>> + Send;

    /// Overwrites the remote record and returns the stamp the server assigned.
    fn push(
        &self,
        user_id: &str,
        record: &DietRecord,
    ) -> impl Future<Output = Result<RemoteStamp, RemoteError>> + Send;
}
