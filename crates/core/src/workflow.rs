//! Branch-scoped edit workflow.
//!
//! Every create, update and delete runs the same state machine against one
//! repository checkout:
//!
//! ```text
//! Start -> IsolationReady -> Written -> MergeAttempted
//!       -> { CleanMerge | Conflict } -> TrunkReconciled -> Closed
//! ```
//!
//! The change is committed on an isolation branch, trunk is merged into it,
//! and only a clean result is promoted to trunk. A conflicting result is
//! annotated, committed on the isolation branch and handed back; that branch
//! stays alive until a later update resolves it. Every run leaves trunk
//! checked out with a clean working tree, whatever the outcome, and a run
//! that fails before merging discards the isolation branch it created.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::conflict::ConflictAnnotator;
use crate::errors::{NoteError, ValidationError};
use crate::models::{
    Branch, BranchRole, EditOutcome, EditStatus, IsolationKind, VersionToken,
    RESERVED_NOTE_PREFIX,
};
use crate::staleness::{GateDecision, StalenessGate};
use crate::store::VersionedStore;

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// States of one workflow run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Start,
    IsolationReady,
    Written,
    MergeAttempted,
    CleanMerge,
    Conflict,
    TrunkReconciled,
    Closed,
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::IsolationReady => write!(f, "isolation_ready"),
            Self::Written => write!(f, "written"),
            Self::MergeAttempted => write!(f, "merge_attempted"),
            Self::CleanMerge => write!(f, "clean_merge"),
            Self::Conflict => write!(f, "conflict"),
            Self::TrunkReconciled => write!(f, "trunk_reconciled"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// One edit run over a store the caller has exclusive access to.
pub struct EditWorkflow<'a> {
    store: &'a mut dyn VersionedStore,
    trunk: String,
    state: WorkflowState,
    /// Isolation branch created by this run, if any.
    created: Option<String>,
}

impl<'a> EditWorkflow<'a> {
    pub fn new(store: &'a mut dyn VersionedStore) -> Self {
        let trunk = store.trunk().to_string();
        Self {
            store,
            trunk,
            state: WorkflowState::Start,
            created: None,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Create `path` with `content`, starting from the trunk tip.
    pub fn create(&mut self, path: &str, content: &str) -> Result<EditOutcome, NoteError> {
        info!(path, "creating note");
        let result = self.try_create(path, content);
        self.finish(path, result)
    }

    /// Update `path` from the state the client saw: `token` on `branch_name`.
    pub fn update(
        &mut self,
        branch_name: &str,
        token: &VersionToken,
        path: &str,
        content: &str,
    ) -> Result<EditOutcome, NoteError> {
        info!(path, branch = branch_name, token = %token, "updating note");
        let result = self.try_update(branch_name, token, path, content);
        self.finish(path, result)
    }

    /// Delete `path` as seen on `branch_name`, at `token` when given.
    ///
    /// Resolving a pending conflict by deletion requires the conflict
    /// branch's current token.
    pub fn delete(
        &mut self,
        branch_name: &str,
        token: Option<&VersionToken>,
        path: &str,
    ) -> Result<EditOutcome, NoteError> {
        info!(path, branch = branch_name, "deleting note");
        let result = self.try_delete(branch_name, token, path);
        self.finish(path, result)
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    fn try_create(&mut self, path: &str, content: &str) -> Result<EditOutcome, NoteError> {
        let isolation = isolation_name(IsolationKind::Edit, path)?;
        self.ensure_absent(&isolation)?;
        self.ensure_placeable(path, &self.trunk)?;
        self.store.checkout(&self.trunk)?;
        self.store.create_branch(&isolation)?;
        self.created = Some(isolation.clone());
        self.enter(WorkflowState::IsolationReady);

        self.store.write_content(path, content)?;
        self.enter(WorkflowState::Written);
        self.store.commit_path(path, &format!("update {path}"))?;

        self.reconcile(&isolation, path, &format!("conflict with {path}"))
    }

    fn try_update(
        &mut self,
        branch_name: &str,
        token: &VersionToken,
        path: &str,
        content: &str,
    ) -> Result<EditOutcome, NoteError> {
        let decision = StalenessGate::check(&*self.store, branch_name, token, path)?;
        self.ensure_placeable(path, &start_reference(&decision))?;
        let work = self.prepare(decision, IsolationKind::Edit, path)?;

        self.store.write_content(path, content)?;
        self.enter(WorkflowState::Written);
        self.store.commit_path(path, &format!("update {path}"))?;

        self.reconcile(&work, path, &format!("conflict with {path}"))
    }

    fn try_delete(
        &mut self,
        branch_name: &str,
        token: Option<&VersionToken>,
        path: &str,
    ) -> Result<EditOutcome, NoteError> {
        let decision = match token {
            Some(token) => StalenessGate::check(&*self.store, branch_name, token, path)?,
            None => {
                let base = StalenessGate::base_branch(&*self.store, branch_name, path)?;
                if base.role == BranchRole::Conflict {
                    return Err(ValidationError::Missing("version_token").into());
                }
                GateDecision::Isolate {
                    from: self.store.resolve_version(branch_name)?,
                    base,
                }
            }
        };

        let reference = start_reference(&decision);
        let resuming = matches!(decision, GateDecision::Resume(_));
        let present = self.store.file_exists(path, &reference)?;
        if !present && !resuming {
            warn!(path, branch = branch_name, "delete of missing note");
            return Err(NoteError::NoteNotFound {
                path: path.to_string(),
                reference: branch_name.to_string(),
            });
        }

        let work = self.prepare(decision, IsolationKind::Delete, path)?;
        if present {
            self.store.remove_content(path)?;
            self.enter(WorkflowState::Written);
            self.store.commit_path(path, &format!("deleted {path}"))?;
        } else {
            // The conflict branch already lacks the note; promoting it is the
            // deletion.
            debug!(path, branch = %work, "note already absent on conflict branch");
            self.enter(WorkflowState::Written);
        }

        self.reconcile(&work, path, &format!("conflict with deletion of {path}"))
    }

    /// Check out the branch the change is written on and return its name.
    fn prepare(
        &mut self,
        decision: GateDecision,
        kind: IsolationKind,
        path: &str,
    ) -> Result<String, NoteError> {
        let work = match decision {
            GateDecision::Resume(branch) => {
                self.store.checkout(&branch.name)?;
                info!(branch = %branch.name, "resuming conflict branch");
                branch.name
            }
            GateDecision::Isolate { base, from } => {
                let isolation = isolation_name(kind, path)?;
                self.ensure_absent(&isolation)?;
                self.store.checkout(from.as_str())?;
                self.store.create_branch(&isolation)?;
                self.created = Some(isolation.clone());
                info!(branch = %isolation, base = %base.name, from = %from, "isolation branch ready");
                isolation
            }
        };
        self.enter(WorkflowState::IsolationReady);
        Ok(work)
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    /// Merge trunk into `work`, then promote `work` to trunk or keep it as a
    /// conflict branch.
    fn reconcile(
        &mut self,
        work: &str,
        path: &str,
        conflict_message: &str,
    ) -> Result<EditOutcome, NoteError> {
        self.enter(WorkflowState::MergeAttempted);
        if self.store.merge(&self.trunk)? {
            return self.keep_conflict(work, path, conflict_message);
        }
        self.enter(WorkflowState::CleanMerge);

        self.store.checkout(&self.trunk)?;
        if self.store.merge(work)? {
            error!(branch = work, trunk = %self.trunk, "reconciled branch conflicts with trunk");
            return Err(NoteError::UnexpectedConflict {
                branch: work.to_string(),
                trunk: self.trunk.clone(),
            });
        }
        self.enter(WorkflowState::TrunkReconciled);

        if work == self.trunk {
            return Err(NoteError::ProtectedBranch(work.to_string()));
        }
        self.store.delete_branch(work, false)?;

        let version = self.store.resolve_version(&self.trunk)?;
        let note = self.read_optional(path, &self.trunk)?;
        self.enter(WorkflowState::Closed);
        info!(path, branch = work, version = %version, "change merged into trunk");
        Ok(EditOutcome {
            status: EditStatus::Merged,
            note,
            branch: Branch::trunk(self.trunk.clone()),
            version,
        })
    }

    fn keep_conflict(
        &mut self,
        work: &str,
        path: &str,
        message: &str,
    ) -> Result<EditOutcome, NoteError> {
        self.enter(WorkflowState::Conflict);
        let regions = ConflictAnnotator::annotate_file(&mut *self.store, path)?;
        let version = self.store.commit_path(path, message)?;
        let note = self.read_optional(path, work)?;

        self.store.checkout(&self.trunk)?;
        self.enter(WorkflowState::TrunkReconciled);
        self.enter(WorkflowState::Closed);
        warn!(path, branch = work, regions = regions.len(), "change conflicts with trunk");
        Ok(EditOutcome {
            status: EditStatus::Conflict,
            note,
            branch: Branch::new(work, BranchRole::Conflict),
            version,
        })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn ensure_absent(&self, branch: &str) -> Result<(), NoteError> {
        if self.store.branch_exists(branch)? {
            warn!(branch, "isolation branch already exists");
            return Err(NoteError::BranchAlreadyExists(branch.to_string()));
        }
        Ok(())
    }

    /// Reject `path` when it would turn an existing note at `reference` into
    /// a directory, or an existing directory into a note.
    fn ensure_placeable(&self, path: &str, reference: &str) -> Result<(), NoteError> {
        let nested = format!("{path}/");
        for file in self.store.list_files(reference)? {
            let clashes = file.starts_with(&nested)
                || path
                    .strip_prefix(file.as_str())
                    .is_some_and(|rest| rest.starts_with('/'));
            if clashes {
                warn!(path, existing = %file, "note path clashes with an existing note");
                return Err(ValidationError::PathClash(file).into());
            }
        }
        Ok(())
    }

    fn read_optional(&self, path: &str, reference: &str) -> Result<Option<String>, NoteError> {
        if self.store.file_exists(path, reference)? {
            Ok(Some(self.store.show(path, reference)?))
        } else {
            Ok(None)
        }
    }

    fn enter(&mut self, next: WorkflowState) {
        debug!(from = %self.state, to = %next, "workflow transition");
        self.state = next;
    }

    /// Return the checkout to a clean trunk after a failed run.
    ///
    /// An isolation branch this run created is dropped if no merge touched it
    /// yet. Resumed conflict branches, and anything that reached a merge, are
    /// left in place for inspection.
    fn finish(
        &mut self,
        path: &str,
        result: Result<EditOutcome, NoteError>,
    ) -> Result<EditOutcome, NoteError> {
        let err = match result {
            Ok(outcome) => return Ok(outcome),
            Err(err) => err,
        };
        if err.is_fatal() {
            error!(path, state = %self.state, error = %err, "edit workflow failed");
        } else {
            debug!(path, state = %self.state, error = %err, "edit rejected");
        }

        let on_trunk = matches!(self.store.current_branch(), Ok(Some(ref b)) if *b == self.trunk);
        if self.state != WorkflowState::Start {
            if let Err(e) = self.store.reset_worktree() {
                warn!(error = %e, "failed to reset working tree");
            }
        }
        if !on_trunk || self.state != WorkflowState::Start {
            if let Err(e) = self.store.checkout(&self.trunk) {
                warn!(error = %e, trunk = %self.trunk, "failed to return to trunk");
            }
        }

        let unmerged = matches!(
            self.state,
            WorkflowState::IsolationReady | WorkflowState::Written
        );
        if let Some(branch) = self.created.take().filter(|_| unmerged) {
            match self.store.delete_branch(&branch, true) {
                Ok(()) => info!(branch = %branch, "discarded unmerged isolation branch"),
                Err(e) => warn!(branch = %branch, error = %e, "failed to discard isolation branch"),
            }
        }
        Err(err)
    }
}

/// Isolation branch name for `path`, refusing paths whose branch would read
/// back as a different note's branch.
fn isolation_name(kind: IsolationKind, path: &str) -> Result<String, NoteError> {
    let name = kind.branch_name(path);
    if IsolationKind::parse(&name) != Some((kind, path)) {
        return Err(ValidationError::ReservedPrefix(RESERVED_NOTE_PREFIX).into());
    }
    Ok(name)
}

/// The commit or branch the written change starts from.
fn start_reference(decision: &GateDecision) -> String {
    match decision {
        GateDecision::Resume(branch) => branch.name.clone(),
        GateDecision::Isolate { from, .. } => from.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::store::MemoryStore;

    fn seeded(text: &str) -> (MemoryStore, VersionToken) {
        let mut store = MemoryStore::new("master");
        let outcome = EditWorkflow::new(&mut store).create("a.txt", text).unwrap();
        (store, outcome.version)
    }

    #[test]
    fn test_create_merges_and_removes_isolation_branch() {
        let mut store = MemoryStore::new("master");
        let mut workflow = EditWorkflow::new(&mut store);
        let outcome = workflow.create("a.txt", "v1\n").unwrap();
        assert_eq!(workflow.state(), WorkflowState::Closed);

        assert_eq!(outcome.status, EditStatus::Merged);
        assert_eq!(outcome.note.as_deref(), Some("v1\n"));
        assert_eq!(outcome.branch, Branch::trunk("master"));
        assert_eq!(outcome.version, store.resolve_version("master").unwrap());
        assert_eq!(store.show("a.txt", "master").unwrap(), "v1\n");
        assert!(!store.branch_exists("user-a.txt").unwrap());
        assert_eq!(store.current_branch().unwrap().as_deref(), Some("master"));
    }

    #[test]
    fn test_create_rejects_live_isolation_branch() {
        let (mut store, _) = seeded("v1\n");
        store.create_branch("user-b.txt").unwrap();
        store.checkout("master").unwrap();

        let mut workflow = EditWorkflow::new(&mut store);
        let err = workflow.create("b.txt", "x\n").unwrap_err();
        assert!(matches!(err, NoteError::BranchAlreadyExists(ref b) if b == "user-b.txt"));
        assert_eq!(workflow.state(), WorkflowState::Start);
        assert!(!store.file_exists("b.txt", "master").unwrap());
    }

    #[test]
    fn test_competing_updates_conflict_and_resolve() {
        let (mut store, t0) = seeded("v1\n");

        let first = EditWorkflow::new(&mut store)
            .update("master", &t0, "a.txt", "v2\n")
            .unwrap();
        assert_eq!(first.status, EditStatus::Merged);

        let second = EditWorkflow::new(&mut store)
            .update("master", &t0, "a.txt", "v3\n")
            .unwrap();
        assert!(second.is_conflict());
        assert_eq!(second.branch, Branch::new("user-a.txt", BranchRole::Conflict));
        let note = second.note.clone().unwrap();
        assert!(note.contains("BRANCHNOTE_CONFLICT_MARKER <<<<<<< "));
        assert!(note.contains("BRANCHNOTE_CONFLICT_MARKER =======\n"));
        assert!(note.contains("BRANCHNOTE_CONFLICT_MARKER >>>>>>> "));
        assert!(note.contains("v2\n") && note.contains("v3\n"));
        assert_eq!(store.show("a.txt", "master").unwrap(), "v2\n");
        assert_eq!(second.version, store.resolve_version("user-a.txt").unwrap());
        assert_eq!(store.current_branch().unwrap().as_deref(), Some("master"));

        // A stale token against the conflict branch is refused.
        let err = EditWorkflow::new(&mut store)
            .update("user-a.txt", &t0, "a.txt", "v4\n")
            .unwrap_err();
        assert!(matches!(err, NoteError::StaleState { .. }));

        // Another edit from trunk must wait for the conflict to be resolved.
        let err = EditWorkflow::new(&mut store)
            .update("master", &first.version, "a.txt", "v5\n")
            .unwrap_err();
        assert!(matches!(err, NoteError::BranchAlreadyExists(_)));

        let resolved = EditWorkflow::new(&mut store)
            .update("user-a.txt", &second.version, "a.txt", "v2 and v3\n")
            .unwrap();
        assert_eq!(resolved.status, EditStatus::Merged);
        assert_eq!(resolved.note.as_deref(), Some("v2 and v3\n"));
        assert!(!store.branch_exists("user-a.txt").unwrap());
        assert_eq!(store.show("a.txt", "master").unwrap(), "v2 and v3\n");
    }

    #[test]
    fn test_update_from_history_merges_disjoint_edits() {
        let (mut store, t0) = seeded("one\ntwo\nthree\nfour\nfive\n");
        EditWorkflow::new(&mut store)
            .update("master", &t0, "a.txt", "ONE\ntwo\nthree\nfour\nfive\n")
            .unwrap();

        let outcome = EditWorkflow::new(&mut store)
            .update("master", &t0, "a.txt", "one\ntwo\nthree\nfour\nFIVE\n")
            .unwrap();
        assert_eq!(outcome.status, EditStatus::Merged);
        assert_eq!(
            store.show("a.txt", "master").unwrap(),
            "ONE\ntwo\nthree\nfour\nFIVE\n"
        );
    }

    #[test]
    fn test_update_unknown_branch() {
        let (mut store, t0) = seeded("v1\n");
        let err = EditWorkflow::new(&mut store)
            .update("nope", &t0, "a.txt", "v2\n")
            .unwrap_err();
        assert!(matches!(err, NoteError::BranchNotFound(_)));
    }

    #[test]
    fn test_delete_missing_note_creates_no_branch() {
        let (mut store, _) = seeded("v1\n");
        let err = EditWorkflow::new(&mut store)
            .delete("master", None, "missing.txt")
            .unwrap_err();
        assert!(matches!(err, NoteError::NoteNotFound { ref path, .. } if path == "missing.txt"));
        assert_eq!(store.list_branches().unwrap(), vec!["master".to_string()]);
    }

    #[test]
    fn test_delete_removes_note_from_trunk() {
        let (mut store, _) = seeded("v1\n");
        let outcome = EditWorkflow::new(&mut store)
            .delete("master", None, "a.txt")
            .unwrap();
        assert_eq!(outcome.status, EditStatus::Merged);
        assert_eq!(outcome.note, None);
        assert!(!store.file_exists("a.txt", "master").unwrap());
        assert!(!store.branch_exists("user-delete-a.txt").unwrap());
    }

    #[test]
    fn test_delete_of_modified_note_conflicts_and_resolves() {
        let (mut store, t0) = seeded("v1\n");
        EditWorkflow::new(&mut store)
            .update("master", &t0, "a.txt", "v2\n")
            .unwrap();

        let outcome = EditWorkflow::new(&mut store)
            .delete("master", Some(&t0), "a.txt")
            .unwrap();
        assert!(outcome.is_conflict());
        assert_eq!(outcome.branch.name, "user-delete-a.txt");
        assert_eq!(outcome.note.as_deref(), Some("v2\n"));
        assert_eq!(store.show("a.txt", "master").unwrap(), "v2\n");

        let err = EditWorkflow::new(&mut store)
            .delete("user-delete-a.txt", None, "a.txt")
            .unwrap_err();
        assert!(matches!(
            err,
            NoteError::InvalidInput(ValidationError::Missing("version_token"))
        ));

        let resolved = EditWorkflow::new(&mut store)
            .delete("user-delete-a.txt", Some(&outcome.version), "a.txt")
            .unwrap();
        assert_eq!(resolved.status, EditStatus::Merged);
        assert!(!store.file_exists("a.txt", "master").unwrap());
        assert!(!store.branch_exists("user-delete-a.txt").unwrap());
    }

    // -----------------------------------------------------------------------
    // Fatal path
    // -----------------------------------------------------------------------

    #[derive(Clone, Copy, PartialEq)]
    enum Fault {
        None,
        /// Report a conflict on the merge into trunk, which an honest store
        /// never does after the branch absorbed trunk.
        ConflictOnPromotion,
        /// Fail every working-tree write.
        WriteFails,
    }

    struct Faulty {
        inner: MemoryStore,
        fault: Fault,
    }

    impl Faulty {
        fn new(fault: Fault) -> Self {
            Self {
                inner: MemoryStore::new("master"),
                fault,
            }
        }
    }

    impl VersionedStore for Faulty {
        fn trunk(&self) -> &str {
            self.inner.trunk()
        }
        fn create_branch(&mut self, name: &str) -> Result<(), StoreError> {
            self.inner.create_branch(name)
        }
        fn checkout(&mut self, reference: &str) -> Result<(), StoreError> {
            self.inner.checkout(reference)
        }
        fn delete_branch(&mut self, name: &str, force: bool) -> Result<(), StoreError> {
            self.inner.delete_branch(name, force)
        }
        fn branch_exists(&self, name: &str) -> Result<bool, StoreError> {
            self.inner.branch_exists(name)
        }
        fn current_branch(&self) -> Result<Option<String>, StoreError> {
            self.inner.current_branch()
        }
        fn list_branches(&self) -> Result<Vec<String>, StoreError> {
            self.inner.list_branches()
        }
        fn write_content(&mut self, path: &str, text: &str) -> Result<(), StoreError> {
            if self.fault == Fault::WriteFails {
                return Err(StoreError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.inner.write_content(path, text)
        }
        fn read_content(&self, path: &str) -> Result<String, StoreError> {
            self.inner.read_content(path)
        }
        fn remove_content(&mut self, path: &str) -> Result<(), StoreError> {
            self.inner.remove_content(path)
        }
        fn commit_path(&mut self, path: &str, message: &str) -> Result<VersionToken, StoreError> {
            self.inner.commit_path(path, message)
        }
        fn merge(&mut self, reference: &str) -> Result<bool, StoreError> {
            if self.fault == Fault::ConflictOnPromotion
                && self.inner.current_branch()?.as_deref() == Some(self.inner.trunk())
            {
                return Ok(true);
            }
            self.inner.merge(reference)
        }
        fn reset_worktree(&mut self) -> Result<(), StoreError> {
            self.inner.reset_worktree()
        }
        fn show(&self, path: &str, reference: &str) -> Result<String, StoreError> {
            self.inner.show(path, reference)
        }
        fn file_exists(&self, path: &str, reference: &str) -> Result<bool, StoreError> {
            self.inner.file_exists(path, reference)
        }
        fn list_files(&self, reference: &str) -> Result<Vec<String>, StoreError> {
            self.inner.list_files(reference)
        }
        fn resolve_version(&self, reference: &str) -> Result<VersionToken, StoreError> {
            self.inner.resolve_version(reference)
        }
        fn is_ancestor(
            &self,
            ancestor: &VersionToken,
            descendant: &VersionToken,
        ) -> Result<bool, StoreError> {
            self.inner.is_ancestor(ancestor, descendant)
        }
    }

    #[test]
    fn test_unexpected_conflict_keeps_branch_for_inspection() {
        let mut store = Faulty::new(Fault::ConflictOnPromotion);
        let err = EditWorkflow::new(&mut store)
            .create("a.txt", "v1\n")
            .unwrap_err();
        assert!(matches!(err, NoteError::UnexpectedConflict { ref branch, .. } if branch == "user-a.txt"));
        assert!(err.is_fatal());

        assert!(store.branch_exists("user-a.txt").unwrap());
        assert!(!store.file_exists("a.txt", "master").unwrap());
        assert_eq!(store.current_branch().unwrap().as_deref(), Some("master"));
        // The checkout is usable again.
        store.checkout("user-a.txt").unwrap();
    }

    #[test]
    fn test_failed_write_discards_new_isolation_branch() {
        let mut store = Faulty::new(Fault::WriteFails);
        let mut workflow = EditWorkflow::new(&mut store);
        let err = workflow.create("a.txt", "v1\n").unwrap_err();
        assert!(matches!(err, NoteError::Store(StoreError::IoError(_))));
        assert_eq!(workflow.state(), WorkflowState::IsolationReady);

        assert_eq!(store.list_branches().unwrap(), vec!["master".to_string()]);
        assert_eq!(store.current_branch().unwrap().as_deref(), Some("master"));

        // Nothing blocks a retry once the store recovers.
        store.fault = Fault::None;
        let outcome = EditWorkflow::new(&mut store).create("a.txt", "v1\n").unwrap();
        assert_eq!(outcome.status, EditStatus::Merged);
    }

    #[test]
    fn test_failed_write_keeps_resumed_conflict_branch() {
        let mut store = Faulty::new(Fault::None);
        let t0 = EditWorkflow::new(&mut store)
            .create("a.txt", "v1\n")
            .unwrap()
            .version;
        EditWorkflow::new(&mut store)
            .update("master", &t0, "a.txt", "v2\n")
            .unwrap();
        let conflict = EditWorkflow::new(&mut store)
            .update("master", &t0, "a.txt", "v3\n")
            .unwrap();
        assert!(conflict.is_conflict());

        store.fault = Fault::WriteFails;
        let err = EditWorkflow::new(&mut store)
            .update("user-a.txt", &conflict.version, "a.txt", "fixed\n")
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            store.resolve_version("user-a.txt").unwrap(),
            conflict.version
        );
        assert_eq!(store.current_branch().unwrap().as_deref(), Some("master"));
    }

    #[test]
    fn test_path_clash_is_rejected_before_branching() {
        let (mut store, _) = seeded("v1\n");
        let err = EditWorkflow::new(&mut store)
            .create("a.txt/b.txt", "x\n")
            .unwrap_err();
        assert!(matches!(
            err,
            NoteError::InvalidInput(ValidationError::PathClash(ref f)) if f == "a.txt"
        ));

        EditWorkflow::new(&mut store).create("dir/b.txt", "x\n").unwrap();
        let err = EditWorkflow::new(&mut store).create("dir", "x\n").unwrap_err();
        assert!(matches!(
            err,
            NoteError::InvalidInput(ValidationError::PathClash(ref f)) if f == "dir/b.txt"
        ));
        assert_eq!(store.list_branches().unwrap(), vec!["master".to_string()]);
    }

    #[test]
    fn test_other_notes_conflict_branch_is_not_a_base() {
        let mut store = MemoryStore::new("master");
        let t0 = EditWorkflow::new(&mut store).create("b.txt", "v1\n").unwrap().version;
        EditWorkflow::new(&mut store).create("a.txt", "a1\n").unwrap();
        EditWorkflow::new(&mut store)
            .update("master", &t0, "b.txt", "v2\n")
            .unwrap();
        let conflict = EditWorkflow::new(&mut store)
            .update("master", &t0, "b.txt", "v3\n")
            .unwrap();
        assert!(conflict.is_conflict());

        let err = EditWorkflow::new(&mut store)
            .update("user-b.txt", &conflict.version, "a.txt", "a2\n")
            .unwrap_err();
        assert!(matches!(err, NoteError::ForeignBranch { ref branch, .. } if branch == "user-b.txt"));
        let err = EditWorkflow::new(&mut store)
            .delete("user-b.txt", None, "a.txt")
            .unwrap_err();
        assert!(matches!(err, NoteError::ForeignBranch { .. }));

        assert_eq!(store.show("b.txt", "master").unwrap(), "v2\n");
        assert_eq!(store.show("a.txt", "master").unwrap(), "a1\n");
        assert!(store.branch_exists("user-b.txt").unwrap());
    }

    #[test]
    fn test_reserved_prefix_never_names_a_branch() {
        let mut store = MemoryStore::new("master");
        let err = EditWorkflow::new(&mut store)
            .create("delete-a.txt", "x\n")
            .unwrap_err();
        assert!(matches!(
            err,
            NoteError::InvalidInput(ValidationError::ReservedPrefix(_))
        ));
        assert_eq!(store.list_branches().unwrap(), vec!["master".to_string()]);
    }
}
