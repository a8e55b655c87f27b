//! Detection, resolution and scheduling of diet record syncs.
//!
//! [`SyncOrchestrator`] is the entry point: it runs cycles on [`Trigger`]s,
//! accepts local edits, and opens [`ResolutionSession`]s for records left
//! `Conflicted`.

pub mod detector;
mod error;
pub mod orchestrator;
pub mod recency;
pub mod resolver;
mod slots;

pub use detector::{detect, Detection};
pub use error::SyncError;
pub use orchestrator::{
    save_local_edit, SyncAction, SyncOrchestrator, SyncReport, SyncStatus, Trigger,
};
pub use resolver::{ConflictPrompt, ConflictResolver, Resolution, ResolutionSession};
