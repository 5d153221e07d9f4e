//! Optimistic-concurrency check for edits that name a branch and version.
//!
//! Conflict branches demand an exact match with their tip, since the client
//! must have seen the markers it is resolving. Any other branch only uses
//! the token to pick the commit a new isolation branch starts from; the
//! token must still belong to that branch's history. Isolation branches of
//! other notes are never accepted as a base.

use tracing::{debug, warn};

use crate::errors::{NoteError, StoreError};
use crate::models::{Branch, BranchRole, VersionToken};
use crate::store::VersionedStore;

/// What the gate allows the workflow to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Reuse the existing conflict branch, which is at the submitted token.
    Resume(Branch),
    /// Start a fresh isolation branch at `from`, a commit of `base`.
    Isolate { base: Branch, from: VersionToken },
}

pub struct StalenessGate;

impl StalenessGate {
    /// Classify `branch_name` for an edit of `note_path`, rejecting missing
    /// branches and branches that carry another note's edit.
    pub fn base_branch(
        store: &dyn VersionedStore,
        branch_name: &str,
        note_path: &str,
    ) -> Result<Branch, NoteError> {
        if !store.branch_exists(branch_name)? {
            return Err(NoteError::BranchNotFound(branch_name.to_string()));
        }
        let role = BranchRole::classify(branch_name, store.trunk(), note_path);
        if role == BranchRole::Isolation {
            warn!(branch = branch_name, path = note_path, "branch belongs to another note");
            return Err(NoteError::ForeignBranch {
                branch: branch_name.to_string(),
                path: note_path.to_string(),
            });
        }
        Ok(Branch::new(branch_name, role))
    }

    /// Compare `token` against the state of `branch_name` for an edit of
    /// `note_path`.
    pub fn check(
        store: &dyn VersionedStore,
        branch_name: &str,
        token: &VersionToken,
        note_path: &str,
    ) -> Result<GateDecision, NoteError> {
        let branch = Self::base_branch(store, branch_name, note_path)?;
        let tip = store.resolve_version(branch_name)?;
        let submitted = match store.resolve_version(token.as_str()) {
            Ok(resolved) => resolved,
            Err(StoreError::RefNotFound(_)) => {
                warn!(branch = branch_name, token = %token, "unknown version token");
                return Err(NoteError::StaleState {
                    branch: branch_name.to_string(),
                    detail: format!("version {token} does not exist"),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if branch.role == BranchRole::Conflict {
            if submitted != tip {
                warn!(branch = branch_name, submitted = %submitted, tip = %tip, "stale conflict resolution");
                return Err(NoteError::StaleState {
                    branch: branch_name.to_string(),
                    detail: format!("expected version {tip}, got {token}"),
                });
            }
            debug!(branch = branch_name, "resuming conflict branch");
            return Ok(GateDecision::Resume(branch));
        }

        if !store.is_ancestor(&submitted, &tip)? {
            warn!(branch = branch_name, submitted = %submitted, "token is not in branch history");
            return Err(NoteError::StaleState {
                branch: branch_name.to_string(),
                detail: format!("version {token} is not part of '{branch_name}'"),
            });
        }
        debug!(branch = branch_name, from = %submitted, "isolating from version");
        Ok(GateDecision::Isolate {
            base: branch,
            from: submitted,
        })
    }
}
