//! Note service: the operations exposed to the HTTP layer.
//!
//! Each repository gets one store and one async mutex. Every operation,
//! reads included, holds that mutex for its whole duration and runs its
//! store calls on the blocking pool, so workflow runs against one checkout
//! never interleave while different repositories proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::config::AppConfig;
use crate::errors::NoteError;
use crate::models::{
    BranchRole, Branch, EditOutcome, IsolationKind, NoteListing, NoteView, PendingConflict,
    VersionToken,
};
use crate::store::git::KEEP_FILE;
use crate::store::{StoreProvider, VersionedStore};
use crate::validation;
use crate::workflow::EditWorkflow;

type SharedStore = Arc<tokio::sync::Mutex<Box<dyn VersionedStore + Send>>>;

pub struct NoteService {
    config: AppConfig,
    provider: Arc<dyn StoreProvider>,
    repos: Mutex<HashMap<String, SharedStore>>,
}

impl NoteService {
    pub fn new(config: AppConfig, provider: Arc<dyn StoreProvider>) -> Self {
        info!(
            trunk = %config.store.trunk_branch,
            default_repo = %config.store.default_repo,
            "initializing note service"
        );
        Self {
            config,
            provider,
            repos: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The repository a request addresses, falling back to the default.
    pub fn repo_or_default<'r>(&'r self, repo: Option<&'r str>) -> &'r str {
        match repo {
            Some(name) if !name.is_empty() => name,
            _ => &self.config.store.default_repo,
        }
    }

    // -----------------------------------------------------------------------
    // Repository access
    // -----------------------------------------------------------------------

    fn cached(&self, repo: &str) -> Result<Option<SharedStore>, NoteError> {
        let repos = self
            .repos
            .lock()
            .map_err(|_| NoteError::Internal("repository registry poisoned".into()))?;
        Ok(repos.get(repo).cloned())
    }

    async fn store_for(&self, repo: &str) -> Result<SharedStore, NoteError> {
        validation::validate_repo_name(repo)?;
        if let Some(store) = self.cached(repo)? {
            return Ok(store);
        }

        let provider = Arc::clone(&self.provider);
        let name = repo.to_string();
        let opened = tokio::task::spawn_blocking(move || provider.open(&name))
            .await
            .map_err(|e| NoteError::Internal(format!("store open task failed: {e}")))??;

        let mut repos = self
            .repos
            .lock()
            .map_err(|_| NoteError::Internal("repository registry poisoned".into()))?;
        let store = repos
            .entry(repo.to_string())
            .or_insert_with(|| {
                info!(repo, "repository opened");
                Arc::new(tokio::sync::Mutex::new(opened))
            })
            .clone();
        Ok(store)
    }

    /// Run `op` with exclusive access to the repository's store.
    async fn with_store<T, F>(&self, repo: &str, op: F) -> Result<T, NoteError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn VersionedStore) -> Result<T, NoteError> + Send + 'static,
    {
        let store = self.store_for(repo).await?;
        let secs = self.config.store.lock_timeout_secs;
        let guard = tokio::time::timeout(Duration::from_secs(secs), store.lock_owned())
            .await
            .map_err(|_| {
                warn!(repo, secs, "timed out waiting for repository lock");
                NoteError::LockTimeout {
                    repo: repo.to_string(),
                    secs,
                }
            })?;
        debug!(repo, "repository lock acquired");

        tokio::task::spawn_blocking(move || {
            let mut guard = guard;
            op(&mut **guard)
        })
        .await
        .map_err(|e| NoteError::Internal(format!("store task failed: {e}")))?
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Open (initializing if configured) `repo` and return its trunk version.
    #[instrument(skip(self))]
    pub async fn ensure_repository(&self, repo: &str) -> Result<VersionToken, NoteError> {
        let version = self
            .with_store(repo, |store| {
                let trunk = store.trunk().to_string();
                Ok(store.resolve_version(&trunk)?)
            })
            .await?;
        info!(repo, version = %version, "repository ready");
        Ok(version)
    }

    #[instrument(skip(self))]
    pub async fn get_note(
        &self,
        repo: &str,
        note_path: &str,
        branch_name: &str,
    ) -> Result<NoteView, NoteError> {
        validation::validate_note_path(note_path, &self.config.limits)?;
        validation::validate_branch_name(branch_name)?;

        let path = note_path.to_string();
        let branch = branch_name.to_string();
        self.with_store(repo, move |store| {
            if !store.branch_exists(&branch)? {
                return Err(NoteError::BranchNotFound(branch));
            }
            if !store.file_exists(&path, &branch)? {
                return Err(NoteError::NoteNotFound {
                    path,
                    reference: branch,
                });
            }
            let note = store.show(&path, &branch)?;
            let version = store.resolve_version(&branch)?;
            let role = BranchRole::classify(&branch, store.trunk(), &path);
            Ok(NoteView {
                note,
                readonly: false,
                branch: Branch::new(branch, role),
                version,
            })
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn get_note_names(
        &self,
        repo: &str,
        branch_name: &str,
    ) -> Result<NoteListing, NoteError> {
        validation::validate_branch_name(branch_name)?;

        let branch = branch_name.to_string();
        self.with_store(repo, move |store| {
            if !store.branch_exists(&branch)? {
                return Err(NoteError::BranchNotFound(branch));
            }
            let notes = store
                .list_files(&branch)?
                .into_iter()
                .filter(|path| path != KEEP_FILE)
                .collect();
            Ok(NoteListing {
                branch_name: branch,
                notes,
            })
        })
        .await
    }

    /// Every isolation branch still alive, i.e. every unresolved conflict.
    #[instrument(skip(self))]
    pub async fn list_conflicts(&self, repo: &str) -> Result<Vec<PendingConflict>, NoteError> {
        self.with_store(repo, |store| {
            let mut pending = Vec::new();
            for name in store.list_branches()? {
                if name == store.trunk() {
                    continue;
                }
                let Some((kind, path)) = IsolationKind::parse(&name) else {
                    continue;
                };
                let note_path = path.to_string();
                pending.push(PendingConflict {
                    version: store.resolve_version(&name)?,
                    branch_name: name,
                    note_path,
                    kind,
                });
            }
            Ok(pending)
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Edits
    // -----------------------------------------------------------------------

    #[instrument(skip(self, note_value))]
    pub async fn create_note(
        &self,
        repo: &str,
        note_path: &str,
        note_value: &str,
    ) -> Result<EditOutcome, NoteError> {
        validation::validate_note_path(note_path, &self.config.limits)?;
        validation::validate_content(note_value, &self.config.limits, false)?;

        let path = note_path.to_string();
        let content = note_value.to_string();
        self.with_store(repo, move |store| {
            EditWorkflow::new(store).create(&path, &content)
        })
        .await
    }

    #[instrument(skip(self, note_value))]
    pub async fn update_note(
        &self,
        repo: &str,
        branch_name: &str,
        version_token: &str,
        note_path: &str,
        note_value: &str,
    ) -> Result<EditOutcome, NoteError> {
        validation::validate_note_path(note_path, &self.config.limits)?;
        validation::validate_branch_name(branch_name)?;
        validation::validate_version_token(version_token)?;
        validation::validate_content(note_value, &self.config.limits, true)?;

        let branch = branch_name.to_string();
        let token = VersionToken::new(version_token);
        let path = note_path.to_string();
        let content = note_value.to_string();
        self.with_store(repo, move |store| {
            EditWorkflow::new(store).update(&branch, &token, &path, &content)
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete_note(
        &self,
        repo: &str,
        branch_name: &str,
        version_token: Option<&str>,
        note_path: &str,
    ) -> Result<EditOutcome, NoteError> {
        validation::validate_note_path(note_path, &self.config.limits)?;
        validation::validate_branch_name(branch_name)?;
        let token = match version_token {
            Some(token) => {
                validation::validate_version_token(token)?;
                Some(VersionToken::new(token))
            }
            None => None,
        };

        let branch = branch_name.to_string();
        let path = note_path.to_string();
        self.with_store(repo, move |store| {
            EditWorkflow::new(store).delete(&branch, token.as_ref(), &path)
        })
        .await
    }
}
