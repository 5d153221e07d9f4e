//! [`VersionedStore`] over a local git repository via `git2`.

use std::fs;
use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{
    BranchType, Commit, ErrorCode, ObjectType, Oid, Repository, RepositoryInitOptions,
    RepositoryState, ResetType, Signature, StatusOptions, TreeWalkMode, TreeWalkResult,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::VersionedStore;
use crate::errors::StoreError;
use crate::models::VersionToken;

/// Placeholder committed into fresh repositories so trunk has a root commit.
pub const KEEP_FILE: &str = ".gitkeep";

/// Author and committer identity for store commits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreSignature {
    pub name: String,
    pub email: String,
}

impl Default for StoreSignature {
    fn default() -> Self {
        Self {
            name: "branchnote".into(),
            email: "branchnote@localhost".into(),
        }
    }
}

/// A git working-tree checkout driven through `git2`.
pub struct GitStore {
    repo: Repository,
    repo_path: PathBuf,
    trunk: String,
    signature: StoreSignature,
}

impl GitStore {
    /// Open an existing repository at `repo_path`.
    pub fn open<P: AsRef<Path>>(
        repo_path: P,
        trunk: &str,
        signature: StoreSignature,
    ) -> Result<Self, StoreError> {
        let path = repo_path.as_ref();
        info!(path = %path.display(), "opening note repository");
        let repo = Repository::open(path)
            .map_err(|_| StoreError::RepositoryNotFound(path.display().to_string()))?;
        if repo.is_bare() {
            return Err(StoreError::RepositoryNotFound(path.display().to_string()));
        }
        Ok(Self {
            repo,
            repo_path: path.to_path_buf(),
            trunk: trunk.to_string(),
            signature,
        })
    }

    /// Open the repository at `repo_path`, creating it with an initial
    /// commit on `trunk` if it does not exist yet. Safe to call repeatedly.
    #[instrument(skip_all, fields(path = %repo_path.as_ref().display()))]
    pub fn open_or_init<P: AsRef<Path>>(
        repo_path: P,
        trunk: &str,
        signature: StoreSignature,
    ) -> Result<Self, StoreError> {
        let path = repo_path.as_ref();
        let mut store = match Repository::open(path) {
            Ok(repo) => Self {
                repo,
                repo_path: path.to_path_buf(),
                trunk: trunk.to_string(),
                signature,
            },
            Err(_) => {
                info!("initializing note repository");
                fs::create_dir_all(path)?;
                let mut opts = RepositoryInitOptions::new();
                opts.initial_head(trunk);
                let repo = Repository::init_opts(path, &opts)?;
                Self {
                    repo,
                    repo_path: path.to_path_buf(),
                    trunk: trunk.to_string(),
                    signature,
                }
            }
        };

        if matches!(store.repo.head(), Err(ref e) if e.code() == ErrorCode::UnbornBranch) {
            fs::write(path.join(KEEP_FILE), "")?;
            let oid = store.commit_path(KEEP_FILE, "Initial commit")?;
            info!(sha = %oid, "created initial commit");
        }
        Ok(store)
    }

    fn signature(&self) -> Result<Signature<'static>, StoreError> {
        Ok(Signature::now(&self.signature.name, &self.signature.email)?)
    }

    fn head_commit(&self) -> Result<Commit<'_>, StoreError> {
        Ok(self.repo.head()?.peel_to_commit()?)
    }

    /// Resolve a local branch name first, then anything `revparse` accepts.
    fn find_commit(&self, reference: &str) -> Result<Commit<'_>, StoreError> {
        if let Ok(branch) = self.repo.find_branch(reference, BranchType::Local) {
            return Ok(branch.get().peel_to_commit()?);
        }
        self.repo
            .revparse_single(reference)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|_| StoreError::RefNotFound(reference.to_string()))
    }

    fn is_dirty(&self) -> Result<bool, StoreError> {
        if self.repo.state() != RepositoryState::Clean {
            return Ok(true);
        }
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).include_ignored(false);
        Ok(!self.repo.statuses(Some(&mut opts))?.is_empty())
    }

    fn parse_oid(token: &VersionToken) -> Result<Oid, StoreError> {
        Oid::from_str(token.as_str()).map_err(|_| StoreError::RefNotFound(token.to_string()))
    }
}

impl VersionedStore for GitStore {
    fn trunk(&self) -> &str {
        &self.trunk
    }

    #[instrument(skip(self))]
    fn create_branch(&mut self, name: &str) -> Result<(), StoreError> {
        if self.branch_exists(name)? {
            return Err(StoreError::BranchExists(name.to_string()));
        }
        let head = self.head_commit()?;
        let branch = self.repo.branch(name, &head, false)?;
        let refname = branch
            .get()
            .name()
            .ok_or_else(|| StoreError::RefNotFound(name.to_string()))?
            .to_string();
        self.repo.set_head(&refname)?;
        info!(name, from = %head.id(), "created branch");
        Ok(())
    }

    #[instrument(skip(self))]
    fn checkout(&mut self, reference: &str) -> Result<(), StoreError> {
        if self.is_dirty()? {
            return Err(StoreError::DirtyWorkTree(format!(
                "cannot check out '{reference}'"
            )));
        }
        let mut opts = CheckoutBuilder::new();
        opts.safe();
        if let Ok(branch) = self.repo.find_branch(reference, BranchType::Local) {
            let refname = branch
                .get()
                .name()
                .ok_or_else(|| StoreError::RefNotFound(reference.to_string()))?
                .to_string();
            let commit = branch.get().peel_to_commit()?;
            self.repo.checkout_tree(commit.as_object(), Some(&mut opts))?;
            self.repo.set_head(&refname)?;
        } else {
            let commit = self.find_commit(reference)?;
            self.repo.checkout_tree(commit.as_object(), Some(&mut opts))?;
            self.repo.set_head_detached(commit.id())?;
        }
        debug!(reference, "checked out");
        Ok(())
    }

    #[instrument(skip(self))]
    fn delete_branch(&mut self, name: &str, force: bool) -> Result<(), StoreError> {
        if self.current_branch()?.as_deref() == Some(name) {
            return Err(StoreError::BranchCheckedOut(name.to_string()));
        }
        let mut branch = self
            .repo
            .find_branch(name, BranchType::Local)
            .map_err(|_| StoreError::RefNotFound(name.to_string()))?;
        if !force {
            let tip = branch.get().peel_to_commit()?.id();
            let head = self.head_commit()?.id();
            if tip != head && !self.repo.graph_descendant_of(head, tip)? {
                return Err(StoreError::NotFullyMerged(name.to_string()));
            }
        }
        branch.delete()?;
        info!(name, "deleted branch");
        Ok(())
    }

    fn branch_exists(&self, name: &str) -> Result<bool, StoreError> {
        match self.repo.find_branch(name, BranchType::Local) {
            Ok(_) => Ok(true),
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn current_branch(&self) -> Result<Option<String>, StoreError> {
        match self.repo.head() {
            Ok(head) if head.is_branch() => Ok(head.shorthand().map(str::to_string)),
            Ok(_) => Ok(None),
            Err(e) if e.code() == ErrorCode::UnbornBranch => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_branches(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for branch_result in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch_result?;
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn write_content(&mut self, path: &str, text: &str) -> Result<(), StoreError> {
        let full_path = self.repo_path.join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full_path, text)?;
        debug!(path, bytes = text.len(), "wrote note");
        Ok(())
    }

    fn read_content(&self, path: &str) -> Result<String, StoreError> {
        fs::read_to_string(self.repo_path.join(path)).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::PathNotFound {
                path: path.to_string(),
                reference: "working tree".into(),
            },
            std::io::ErrorKind::InvalidData => StoreError::InvalidContent(path.to_string()),
            _ => StoreError::IoError(e),
        })
    }

    fn remove_content(&mut self, path: &str) -> Result<(), StoreError> {
        fs::remove_file(self.repo_path.join(path)).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::PathNotFound {
                path: path.to_string(),
                reference: "working tree".into(),
            },
            _ => StoreError::IoError(e),
        })?;
        debug!(path, "removed note");
        Ok(())
    }

    #[instrument(skip(self, message))]
    fn commit_path(&mut self, path: &str, message: &str) -> Result<VersionToken, StoreError> {
        let mut merge_heads = Vec::new();
        if self.repo.state() == RepositoryState::Merge {
            self.repo.mergehead_foreach(|oid| {
                merge_heads.push(*oid);
                true
            })?;
        }

        let mut index = self.repo.index()?;
        let rel = Path::new(path);
        if self.repo_path.join(rel).exists() {
            index.add_path(rel)?;
        } else {
            index.remove_path(rel)?;
        }
        if index.has_conflicts() {
            return Err(StoreError::DirtyWorkTree(
                "unresolved conflicts remain outside the committed path".into(),
            ));
        }
        index.write()?;
        let tree = self.repo.find_tree(index.write_tree()?)?;
        let sig = self.signature()?;

        let mut parents = Vec::new();
        match self.repo.head() {
            Ok(head) => parents.push(head.peel_to_commit()?),
            Err(e) if e.code() == ErrorCode::UnbornBranch => {}
            Err(e) => return Err(e.into()),
        }
        for oid in merge_heads {
            parents.push(self.repo.find_commit(oid)?);
        }
        let parent_refs: Vec<&Commit<'_>> = parents.iter().collect();

        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)?;
        self.repo.cleanup_state()?;
        info!(sha = %oid, parents = parent_refs.len(), "created commit");
        Ok(VersionToken::new(oid.to_string()))
    }

    #[instrument(skip(self))]
    fn merge(&mut self, reference: &str) -> Result<bool, StoreError> {
        let their_commit = self.find_commit(reference)?;
        let annotated = self.repo.find_annotated_commit(their_commit.id())?;
        let (analysis, _) = self.repo.merge_analysis(&[&annotated])?;

        if analysis.is_up_to_date() {
            debug!("already up to date");
            return Ok(false);
        }

        if analysis.is_fast_forward() {
            let head = self.repo.head()?;
            if head.is_branch() {
                let refname = head
                    .name()
                    .ok_or_else(|| StoreError::RefNotFound("HEAD".into()))?
                    .to_string();
                self.repo
                    .find_reference(&refname)?
                    .set_target(their_commit.id(), &format!("fast-forward to {reference}"))?;
            } else {
                self.repo.set_head_detached(their_commit.id())?;
            }
            self.repo
                .checkout_head(Some(CheckoutBuilder::new().force()))?;
            debug!(to = %their_commit.id(), "fast-forwarded");
            return Ok(false);
        }

        let mut checkout = CheckoutBuilder::new();
        checkout
            .safe()
            .allow_conflicts(true)
            .conflict_style_merge(true)
            .our_label("HEAD")
            .their_label(reference);
        self.repo.merge(&[&annotated], None, Some(&mut checkout))?;

        let mut index = self.repo.index()?;
        if index.has_conflicts() {
            warn!(reference, "merge left conflicts in the working tree");
            return Ok(true);
        }

        let tree = self.repo.find_tree(index.write_tree()?)?;
        let head_commit = self.head_commit()?;
        let sig = self.signature()?;
        let message = format!("Merge {reference}");
        let oid = self.repo.commit(
            Some("HEAD"),
            &sig,
            &sig,
            &message,
            &tree,
            &[&head_commit, &their_commit],
        )?;
        self.repo.cleanup_state()?;
        info!(sha = %oid, reference, "created merge commit");
        Ok(false)
    }

    fn reset_worktree(&mut self) -> Result<(), StoreError> {
        let head = self.head_commit()?;
        self.repo.reset(head.as_object(), ResetType::Hard, None)?;
        self.repo.cleanup_state()?;
        let mut opts = CheckoutBuilder::new();
        opts.force().remove_untracked(true);
        self.repo.checkout_head(Some(&mut opts))?;
        warn!(head = %head.id(), "working tree reset");
        Ok(())
    }

    fn show(&self, path: &str, reference: &str) -> Result<String, StoreError> {
        let tree = self.find_commit(reference)?.tree()?;
        let not_found = || StoreError::PathNotFound {
            path: path.to_string(),
            reference: reference.to_string(),
        };
        let entry = tree.get_path(Path::new(path)).map_err(|_| not_found())?;
        let blob = entry
            .to_object(&self.repo)?
            .peel_to_blob()
            .map_err(|_| not_found())?;
        String::from_utf8(blob.content().to_vec())
            .map_err(|_| StoreError::InvalidContent(path.to_string()))
    }

    fn file_exists(&self, path: &str, reference: &str) -> Result<bool, StoreError> {
        let tree = self.find_commit(reference)?.tree()?;
        match tree.get_path(Path::new(path)) {
            Ok(entry) => Ok(entry.kind() == Some(ObjectType::Blob)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list_files(&self, reference: &str) -> Result<Vec<String>, StoreError> {
        let tree = self.find_commit(reference)?.tree()?;
        let mut files = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    files.push(format!("{root}{name}"));
                }
            }
            TreeWalkResult::Ok
        })?;
        files.sort();
        Ok(files)
    }

    fn resolve_version(&self, reference: &str) -> Result<VersionToken, StoreError> {
        Ok(VersionToken::new(self.find_commit(reference)?.id().to_string()))
    }

    fn is_ancestor(
        &self,
        ancestor: &VersionToken,
        descendant: &VersionToken,
    ) -> Result<bool, StoreError> {
        let ancestor = Self::parse_oid(ancestor)?;
        let descendant = Self::parse_oid(descendant)?;
        if ancestor == descendant {
            return Ok(true);
        }
        Ok(self.repo.graph_descendant_of(descendant, ancestor)?)
    }
}
