//! branchnote core library.
//!
//! Concurrent note editing on top of a branch/commit/merge store: every edit
//! runs on its own isolation branch, is reconciled with trunk by three-way
//! merge, and is either promoted to trunk or handed back as an annotated
//! conflict. This crate holds configuration, the versioned store backends,
//! the conflict annotator, the staleness gate, the edit workflow and the
//! note service that serializes them per repository.

pub mod config;
pub mod conflict;
pub mod errors;
pub mod models;
pub mod service;
pub mod staleness;
pub mod store;
pub mod validation;
pub mod workflow;

// Re-exports for convenience.
pub use config::AppConfig;
pub use errors::{NoteError, StoreError, ValidationError};
pub use service::NoteService;
pub use store::{GitStoreProvider, MemoryStoreProvider, StoreProvider, VersionedStore};
pub use workflow::{EditWorkflow, WorkflowState};
