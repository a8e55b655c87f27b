//! Offline-first sync for per-user diet records.
//!
//! Each device keeps its own copy of a user's [`models::DietRecord`] in
//! SQLite and exchanges it with a backend that stamps every write. Divergence
//! is detected against the last exchanged pair of stamps, and a record edited
//! on both sides is resolved by the user as a whole: keep this device's
//! version or take the server's.

pub mod clock;
pub mod config;
pub mod db;
pub mod models;
pub mod remote;
pub mod server;
pub mod sync;
