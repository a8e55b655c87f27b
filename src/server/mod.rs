//! Reference backend for diet records: file storage plus HTTP routes.

pub mod routes;
pub mod storage;

pub use routes::{router, ApiKeyStore, AppState, AuthUser};
pub use storage::{next_remote_stamp, DietStorage, ServerStorageError};
