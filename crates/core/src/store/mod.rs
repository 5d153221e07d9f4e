//! Versioned store abstraction.
//!
//! The edit workflow drives a single-checkout, branch-and-commit store
//! through [`VersionedStore`]. [`GitStore`] is the production
//! implementation on top of `git2`; [`MemoryStore`] keeps the commit graph
//! in memory and is used wherever a real repository is unnecessary.

pub mod git;
pub mod memory;

use std::path::PathBuf;

use crate::errors::StoreError;
use crate::models::VersionToken;

pub use git::{GitStore, StoreSignature};
pub use memory::MemoryStore;

/// Branch/commit/merge primitives over one repository checkout.
///
/// Implementations are stateful: branch operations, writes and commits all
/// act on the current checkout, so callers must serialize access.
pub trait VersionedStore {
    /// Name of the trunk branch.
    fn trunk(&self) -> &str;

    /// Create `name` at the current checkout and check it out.
    fn create_branch(&mut self, name: &str) -> Result<(), StoreError>;

    /// Check out a branch (attached) or a version token (detached).
    ///
    /// Refuses to discard uncommitted changes or an unfinished merge.
    fn checkout(&mut self, reference: &str) -> Result<(), StoreError>;

    /// Delete a local branch. Without `force`, the branch must be merged
    /// into the current checkout.
    fn delete_branch(&mut self, name: &str, force: bool) -> Result<(), StoreError>;

    fn branch_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Name of the checked-out branch, or `None` when detached.
    fn current_branch(&self) -> Result<Option<String>, StoreError>;

    fn list_branches(&self) -> Result<Vec<String>, StoreError>;

    /// Materialize `text` at `path` in the working tree, creating parent
    /// directories as needed.
    fn write_content(&mut self, path: &str, text: &str) -> Result<(), StoreError>;

    /// Read `path` from the working tree.
    fn read_content(&self, path: &str) -> Result<String, StoreError>;

    /// Remove `path` from the working tree.
    fn remove_content(&mut self, path: &str) -> Result<(), StoreError>;

    /// Stage the working-tree state of `path` and commit it on the current
    /// checkout. Completes an in-progress merge when one is pending.
    fn commit_path(&mut self, path: &str, message: &str) -> Result<VersionToken, StoreError>;

    /// Three-way merge `reference` into the current checkout.
    ///
    /// Returns `true` when conflicting regions remain in the working tree;
    /// a clean merge is committed before returning `false`.
    fn merge(&mut self, reference: &str) -> Result<bool, StoreError>;

    /// Abandon an unfinished merge and any uncommitted changes, restoring
    /// the working tree to the current checkout. Branches are untouched.
    fn reset_worktree(&mut self) -> Result<(), StoreError>;

    /// Content of `path` at `reference`.
    fn show(&self, path: &str, reference: &str) -> Result<String, StoreError>;

    fn file_exists(&self, path: &str, reference: &str) -> Result<bool, StoreError>;

    /// All file paths at `reference`, sorted.
    fn list_files(&self, reference: &str) -> Result<Vec<String>, StoreError>;

    /// Resolve a branch name or token to the commit it designates.
    fn resolve_version(&self, reference: &str) -> Result<VersionToken, StoreError>;

    /// `true` if `ancestor` equals `descendant` or is reachable from it.
    fn is_ancestor(
        &self,
        ancestor: &VersionToken,
        descendant: &VersionToken,
    ) -> Result<bool, StoreError>;
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Opens the store behind a repository name.
pub trait StoreProvider: Send + Sync {
    fn open(&self, repo: &str) -> Result<Box<dyn VersionedStore + Send>, StoreError>;
}

/// Opens (and optionally initializes) git repositories under a data root.
#[derive(Debug, Clone)]
pub struct GitStoreProvider {
    root: PathBuf,
    trunk: String,
    signature: StoreSignature,
    create_missing: bool,
}

impl GitStoreProvider {
    pub fn new(
        root: impl Into<PathBuf>,
        trunk: impl Into<String>,
        signature: StoreSignature,
        create_missing: bool,
    ) -> Self {
        Self {
            root: root.into(),
            trunk: trunk.into(),
            signature,
            create_missing,
        }
    }

    pub fn repo_path(&self, repo: &str) -> PathBuf {
        self.root.join(repo)
    }
}

impl StoreProvider for GitStoreProvider {
    fn open(&self, repo: &str) -> Result<Box<dyn VersionedStore + Send>, StoreError> {
        let path = self.repo_path(repo);
        let store = if self.create_missing {
            GitStore::open_or_init(&path, &self.trunk, self.signature.clone())?
        } else {
            GitStore::open(&path, &self.trunk, self.signature.clone())?
        };
        Ok(Box::new(store))
    }
}

/// Hands out a fresh [`MemoryStore`] per repository.
#[derive(Debug, Clone)]
pub struct MemoryStoreProvider {
    trunk: String,
}

impl MemoryStoreProvider {
    pub fn new(trunk: impl Into<String>) -> Self {
        Self {
            trunk: trunk.into(),
        }
    }
}

impl StoreProvider for MemoryStoreProvider {
    fn open(&self, _repo: &str) -> Result<Box<dyn VersionedStore + Send>, StoreError> {
        Ok(Box::new(MemoryStore::new(&self.trunk)))
    }
}
