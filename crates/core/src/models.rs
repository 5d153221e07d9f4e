//! Domain model types used throughout branchnote.
//!
//! These types bridge the edit workflow, the versioned store, and the web API.

use serde::{Deserialize, Serialize};

/// Prefix shared by every isolation branch.
pub const ISOLATION_PREFIX: &str = "user-";

/// Prefix of deletion-isolation branches (a sub-namespace of [`ISOLATION_PREFIX`]).
pub const DELETE_ISOLATION_PREFIX: &str = "user-delete-";

/// Note paths may not start with this, or an edit branch of the note would
/// share its name with a deletion branch.
pub const RESERVED_NOTE_PREFIX: &str = "delete-";

// ---------------------------------------------------------------------------
// Version token
// ---------------------------------------------------------------------------

/// Opaque identifier of a commit, used both as a point-in-time reference
/// and as the optimistic-concurrency token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

/// The role a branch plays for a given note.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BranchRole {
    /// The canonical branch.
    Trunk,
    /// An isolation or conflict branch that belongs to a different note.
    Isolation,
    /// An isolation branch that survived a conflicted merge.
    Conflict,
    /// Any other branch.
    Other,
}

impl BranchRole {
    /// Classify a client-supplied branch name relative to `note_path`.
    ///
    /// Outside a running workflow, a live isolation branch of the note can
    /// only exist because its merge conflicted, so it classifies as
    /// [`BranchRole::Conflict`]. Any other name in the isolation namespace
    /// is [`BranchRole::Isolation`].
    pub fn classify(name: &str, trunk: &str, note_path: &str) -> Self {
        if name == trunk {
            return Self::Trunk;
        }
        match IsolationKind::parse(name) {
            Some((_, owner)) if owner == note_path => Self::Conflict,
            Some(_) => Self::Isolation,
            None => Self::Other,
        }
    }
}

impl std::fmt::Display for BranchRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trunk => write!(f, "trunk"),
            Self::Isolation => write!(f, "isolation"),
            Self::Conflict => write!(f, "conflict"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A branch name together with its role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub role: BranchRole,
}

impl Branch {
    pub fn new(name: impl Into<String>, role: BranchRole) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }

    pub fn trunk(name: impl Into<String>) -> Self {
        Self::new(name, BranchRole::Trunk)
    }
}

/// Which kind of edit an isolation branch carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IsolationKind {
    /// Create or update.
    Edit,
    /// Deletion.
    Delete,
}

impl IsolationKind {
    pub const ALL: [IsolationKind; 2] = [IsolationKind::Edit, IsolationKind::Delete];

    /// Deterministic isolation branch name for `note_path`.
    pub fn branch_name(self, note_path: &str) -> String {
        match self {
            Self::Edit => format!("{ISOLATION_PREFIX}{note_path}"),
            Self::Delete => format!("{DELETE_ISOLATION_PREFIX}{note_path}"),
        }
    }

    /// Split an isolation branch name back into its kind and note path.
    ///
    /// Deletion names are checked first because they share the edit prefix.
    /// Unambiguous as long as no note path starts with
    /// [`RESERVED_NOTE_PREFIX`].
    pub fn parse(branch_name: &str) -> Option<(Self, &str)> {
        if let Some(path) = branch_name.strip_prefix(DELETE_ISOLATION_PREFIX) {
            return Some((Self::Delete, path));
        }
        branch_name
            .strip_prefix(ISOLATION_PREFIX)
            .map(|path| (Self::Edit, path))
    }
}

// ---------------------------------------------------------------------------
// Workflow outcomes
// ---------------------------------------------------------------------------

/// Result of an edit as seen by the client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EditStatus {
    /// The change reached trunk.
    Merged,
    /// The change conflicted with trunk and waits on a conflict branch.
    Conflict,
}

/// What a create/update/delete run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditOutcome {
    pub status: EditStatus,
    /// Note content after the run (annotated when conflicted, `None` when
    /// the note no longer exists on the reported branch).
    pub note: Option<String>,
    /// Trunk on success, the conflict branch otherwise.
    pub branch: Branch,
    pub version: VersionToken,
}

impl EditOutcome {
    pub fn is_conflict(&self) -> bool {
        self.status == EditStatus::Conflict
    }
}

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

/// A note read from a branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteView {
    pub note: String,
    pub readonly: bool,
    pub branch: Branch,
    pub version: VersionToken,
}

/// Note paths present on a branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteListing {
    pub branch_name: String,
    pub notes: Vec<String>,
}

/// A conflict branch awaiting resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConflict {
    pub branch_name: String,
    pub note_path: String,
    pub kind: IsolationKind,
    pub version: VersionToken,
}
