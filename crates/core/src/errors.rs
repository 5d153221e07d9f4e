//! Error types for the branchnote core library.
//!
//! Each layer has its own error type derived with `thiserror`. [`NoteError`]
//! is the taxonomy surfaced to callers of the note service; the store,
//! validation and configuration errors convert into it where needed.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Note service errors
// ---------------------------------------------------------------------------

/// Errors produced by the edit workflow and the note service.
#[derive(Debug, Error)]
pub enum NoteError {
    /// An isolation branch for this note is already live.
    #[error("branch already exists: {0}")]
    BranchAlreadyExists(String),

    /// The branch named by the caller does not exist.
    #[error("branch does not exist: {0}")]
    BranchNotFound(String),

    /// The note is absent from the requested branch or version.
    #[error("note '{path}' not found in '{reference}'")]
    NoteNotFound { path: String, reference: String },

    /// The submitted version token does not match the store.
    #[error("stale state on branch '{branch}': {detail}")]
    StaleState { branch: String, detail: String },

    /// A branch that was already reconciled with trunk failed to merge into
    /// trunk. The repository is left as-is for inspection.
    #[error("unexpected conflicts while merging '{branch}' into '{trunk}'")]
    UnexpectedConflict { branch: String, trunk: String },

    /// The named branch holds another note's edit and cannot serve as a base.
    #[error("branch '{branch}' belongs to another note's edit, not '{path}'")]
    ForeignBranch { branch: String, path: String },

    /// The workflow tried to delete the trunk branch.
    #[error("refusing to delete protected branch '{0}'")]
    ProtectedBranch(String),

    /// Request input failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    /// The underlying store call failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The repository lock could not be acquired in time.
    #[error("repository '{repo}' is busy (lock not acquired within {secs}s)")]
    LockTimeout { repo: String, secs: u64 },

    /// A blocking task failed to complete.
    #[error("internal error: {0}")]
    Internal(String),
}

impl NoteError {
    /// `true` for server faults that must be logged and reported as 5xx.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedConflict { .. }
                | Self::ProtectedBranch(_)
                | Self::Store(_)
                | Self::Internal(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors from the versioned store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The repository path does not exist or is not a repository.
    #[error("repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A ref (branch name or version token) could not be resolved.
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// The path is absent at the given ref or in the working tree.
    #[error("path '{path}' not found in '{reference}'")]
    PathNotFound { path: String, reference: String },

    /// A branch with this name already exists.
    #[error("branch already exists: {0}")]
    BranchExists(String),

    /// The working tree has uncommitted changes or an unfinished merge.
    #[error("working tree is dirty: {0}")]
    DirtyWorkTree(String),

    /// The branch to delete is the current checkout.
    #[error("branch '{0}' is checked out")]
    BranchCheckedOut(String),

    /// A non-forced branch deletion found unmerged commits.
    #[error("branch '{0}' is not fully merged")]
    NotFullyMerged(String),

    /// Stored content is not valid UTF-8 text.
    #[error("content at '{0}' is not valid UTF-8")]
    InvalidContent(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// Generic I/O wrapper.
    #[error("store I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// Rejections from request validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required parameter '{0}'")]
    Missing(&'static str),

    #[error("'{0}' must not be empty")]
    Empty(&'static str),

    #[error("'{field}' exceeds {limit} bytes")]
    TooLong { field: &'static str, limit: usize },

    #[error("path must be relative: {0}")]
    AbsolutePath(String),

    #[error("path must not contain '.' or '..' segments: {0}")]
    Traversal(String),

    #[error("path must not contain empty segments: {0}")]
    DoubledSeparator(String),

    #[error("'{field}' contains forbidden character {ch:?}")]
    ForbiddenCharacter { field: &'static str, ch: char },

    #[error("'{0}' contains control characters")]
    ControlCharacter(&'static str),

    #[error("reserved file name: {0}")]
    ReservedName(String),

    #[error("note path must not start with '{0}'")]
    ReservedPrefix(&'static str),

    #[error("path clashes with existing note '{0}'")]
    PathClash(String),

    #[error("content exceeds {limit} bytes")]
    ContentTooLarge { limit: usize },

    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid version token: {0}")]
    InvalidVersionToken(String),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
