//! In-memory [`VersionedStore`].
//!
//! Keeps a commit graph, branch table, and a single working tree in memory.
//! Commit ids are SHA-256 digests of the parents, tree and message. Text
//! merges use `diffy` and produce standard conflict markers.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::git::KEEP_FILE;
use super::VersionedStore;
use crate::errors::StoreError;
use crate::models::VersionToken;

type Tree = BTreeMap<String, String>;

#[derive(Debug, Clone)]
struct CommitNode {
    parents: Vec<String>,
    tree: Tree,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Head {
    Branch(String),
    Detached(String),
}

/// A versioned store that lives entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    trunk: String,
    commits: HashMap<String, CommitNode>,
    branches: BTreeMap<String, String>,
    head: Head,
    worktree: Tree,
    merge_head: Option<String>,
    conflicted: BTreeSet<String>,
    sequence: u64,
}

impl MemoryStore {
    /// Create a store whose `trunk` holds a single initial commit.
    pub fn new(trunk: &str) -> Self {
        let mut store = Self {
            trunk: trunk.to_string(),
            commits: HashMap::new(),
            branches: BTreeMap::new(),
            head: Head::Branch(trunk.to_string()),
            worktree: Tree::new(),
            merge_head: None,
            conflicted: BTreeSet::new(),
            sequence: 0,
        };
        let mut tree = Tree::new();
        tree.insert(KEEP_FILE.to_string(), String::new());
        let root = store.record_commit(Vec::new(), tree.clone(), "Initial commit");
        store.branches.insert(trunk.to_string(), root);
        store.worktree = tree;
        store
    }

    fn record_commit(&mut self, parents: Vec<String>, tree: Tree, message: &str) -> String {
        self.sequence += 1;
        let mut hasher = Sha256::new();
        hasher.update(self.sequence.to_le_bytes());
        for parent in &parents {
            hasher.update(parent.as_bytes());
        }
        for (path, text) in &tree {
            hasher.update(path.as_bytes());
            hasher.update([0]);
            hasher.update(text.as_bytes());
            hasher.update([0]);
        }
        hasher.update(message.as_bytes());
        let id = hex::encode(hasher.finalize());
        self.commits.insert(id.clone(), CommitNode { parents, tree });
        debug!(id = %id, message, "recorded commit");
        id
    }

    fn head_id(&self) -> &str {
        match &self.head {
            Head::Branch(name) => self.branches.get(name).map(String::as_str).unwrap_or(""),
            Head::Detached(id) => id,
        }
    }

    fn head_tree(&self) -> Tree {
        self.commits
            .get(self.head_id())
            .map(|c| c.tree.clone())
            .unwrap_or_default()
    }

    fn advance_head(&mut self, id: String) {
        match &self.head {
            Head::Branch(name) => {
                self.branches.insert(name.clone(), id);
            }
            Head::Detached(_) => self.head = Head::Detached(id),
        }
    }

    fn resolve(&self, reference: &str) -> Result<String, StoreError> {
        if reference == "HEAD" {
            return Ok(self.head_id().to_string());
        }
        if let Some(id) = self.branches.get(reference) {
            return Ok(id.clone());
        }
        if self.commits.contains_key(reference) {
            return Ok(reference.to_string());
        }
        // Unambiguous abbreviated ids resolve like git short hashes.
        if reference.len() >= 4 {
            let mut matches = self.commits.keys().filter(|id| id.starts_with(reference));
            if let (Some(id), None) = (matches.next(), matches.next()) {
                return Ok(id.clone());
            }
        }
        Err(StoreError::RefNotFound(reference.to_string()))
    }

    fn tree_at(&self, reference: &str) -> Result<&Tree, StoreError> {
        let id = self.resolve(reference)?;
        self.commits
            .get(&id)
            .map(|c| &c.tree)
            .ok_or(StoreError::RefNotFound(id))
    }

    /// Every commit reachable from `id`, `id` included.
    fn ancestors(&self, id: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([id.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.commits.get(&current) {
                queue.extend(node.parents.iter().cloned());
            }
        }
        seen
    }

    /// Nearest common ancestor, searching breadth-first from `theirs`.
    fn merge_base(&self, ours: &str, theirs: &str) -> Option<String> {
        let ours_ancestors = self.ancestors(ours);
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([theirs.to_string()]);
        while let Some(current) = queue.pop_front() {
            if ours_ancestors.contains(&current) {
                return Some(current);
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.commits.get(&current) {
                queue.extend(node.parents.iter().cloned());
            }
        }
        None
    }

    fn is_dirty(&self) -> bool {
        self.merge_head.is_some() || self.worktree != self.head_tree()
    }

    fn path_not_found(path: &str, reference: &str) -> StoreError {
        StoreError::PathNotFound {
            path: path.to_string(),
            reference: reference.to_string(),
        }
    }
}

/// Three-way merge of one path. Returns the working-tree content (if any)
/// and whether the path conflicted.
fn merge_entry(
    base: Option<&String>,
    ours: Option<&String>,
    theirs: Option<&String>,
) -> (Option<String>, bool) {
    if ours == theirs || theirs == base {
        return (ours.cloned(), false);
    }
    if ours == base {
        return (theirs.cloned(), false);
    }
    match (ours, theirs) {
        (Some(ours), Some(theirs)) => {
            let ancestor = base.map(String::as_str).unwrap_or("");
            let mut opts = diffy::MergeOptions::new();
            opts.set_conflict_style(diffy::ConflictStyle::Merge);
            match opts.merge(ancestor, ours, theirs) {
                Ok(merged) => (Some(merged), false),
                Err(conflicted) => (Some(conflicted), true),
            }
        }
        // Modified on one side, deleted on the other: keep the modification.
        (Some(kept), None) | (None, Some(kept)) => (Some(kept.clone()), true),
        (None, None) => (None, false),
    }
}

impl VersionedStore for MemoryStore {
    fn trunk(&self) -> &str {
        &self.trunk
    }

    fn create_branch(&mut self, name: &str) -> Result<(), StoreError> {
        if self.branches.contains_key(name) {
            return Err(StoreError::BranchExists(name.to_string()));
        }
        let at = self.head_id().to_string();
        self.branches.insert(name.to_string(), at.clone());
        self.head = Head::Branch(name.to_string());
        info!(name, from = %at, "created branch");
        Ok(())
    }

    fn checkout(&mut self, reference: &str) -> Result<(), StoreError> {
        if self.is_dirty() {
            return Err(StoreError::DirtyWorkTree(format!(
                "cannot check out '{reference}'"
            )));
        }
        self.head = if self.branches.contains_key(reference) {
            Head::Branch(reference.to_string())
        } else {
            Head::Detached(self.resolve(reference)?)
        };
        self.worktree = self.head_tree();
        debug!(reference, "checked out");
        Ok(())
    }

    fn delete_branch(&mut self, name: &str, force: bool) -> Result<(), StoreError> {
        if self.head == Head::Branch(name.to_string()) {
            return Err(StoreError::BranchCheckedOut(name.to_string()));
        }
        let tip = self
            .branches
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::RefNotFound(name.to_string()))?;
        if !force && !self.ancestors(self.head_id()).contains(&tip) {
            return Err(StoreError::NotFullyMerged(name.to_string()));
        }
        self.branches.remove(name);
        info!(name, "deleted branch");
        Ok(())
    }

    fn branch_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.branches.contains_key(name))
    }

    fn current_branch(&self) -> Result<Option<String>, StoreError> {
        Ok(match &self.head {
            Head::Branch(name) => Some(name.clone()),
            Head::Detached(_) => None,
        })
    }

    fn list_branches(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.branches.keys().cloned().collect())
    }

    fn write_content(&mut self, path: &str, text: &str) -> Result<(), StoreError> {
        self.worktree.insert(path.to_string(), text.to_string());
        Ok(())
    }

    fn read_content(&self, path: &str) -> Result<String, StoreError> {
        self.worktree
            .get(path)
            .cloned()
            .ok_or_else(|| Self::path_not_found(path, "working tree"))
    }

    fn remove_content(&mut self, path: &str) -> Result<(), StoreError> {
        self.worktree
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Self::path_not_found(path, "working tree"))
    }

    fn commit_path(&mut self, path: &str, message: &str) -> Result<VersionToken, StoreError> {
        self.conflicted.remove(path);
        if !self.conflicted.is_empty() {
            return Err(StoreError::DirtyWorkTree(
                "unresolved conflicts remain outside the committed path".into(),
            ));
        }

        // A pending merge stages its whole result; otherwise only `path`.
        let mut parents = vec![self.head_id().to_string()];
        let tree = match self.merge_head.take() {
            Some(merge_head) => {
                parents.push(merge_head);
                self.worktree.clone()
            }
            None => {
                let mut tree = self.head_tree();
                match self.worktree.get(path) {
                    Some(text) => tree.insert(path.to_string(), text.clone()),
                    None => tree.remove(path),
                };
                tree
            }
        };
        let id = self.record_commit(parents, tree, message);
        self.advance_head(id.clone());
        Ok(VersionToken::new(id))
    }

    fn merge(&mut self, reference: &str) -> Result<bool, StoreError> {
        let theirs = self.resolve(reference)?;
        let ours = self.head_id().to_string();

        if self.ancestors(&ours).contains(&theirs) {
            debug!("already up to date");
            return Ok(false);
        }
        if self.is_dirty() {
            return Err(StoreError::DirtyWorkTree(format!("cannot merge '{reference}'")));
        }
        if self.ancestors(&theirs).contains(&ours) {
            self.advance_head(theirs.clone());
            self.worktree = self.head_tree();
            debug!(to = %theirs, "fast-forwarded");
            return Ok(false);
        }

        let base = self
            .merge_base(&ours, &theirs)
            .and_then(|id| self.commits.get(&id))
            .map(|c| c.tree.clone())
            .unwrap_or_default();
        let ours_tree = self.head_tree();
        let theirs_tree = self.tree_at(&theirs)?.clone();

        let paths: BTreeSet<&String> = base
            .keys()
            .chain(ours_tree.keys())
            .chain(theirs_tree.keys())
            .collect();

        let mut merged = Tree::new();
        let mut conflicts = BTreeSet::new();
        for path in paths {
            let (content, conflicted) =
                merge_entry(base.get(path), ours_tree.get(path), theirs_tree.get(path));
            if let Some(content) = content {
                merged.insert(path.clone(), content);
            }
            if conflicted {
                conflicts.insert(path.clone());
            }
        }

        if conflicts.is_empty() {
            let id = self.record_commit(vec![ours, theirs], merged, &format!("Merge {reference}"));
            self.advance_head(id);
            self.worktree = self.head_tree();
            return Ok(false);
        }

        warn!(reference, paths = ?conflicts, "merge left conflicts in the working tree");
        self.worktree = merged;
        self.merge_head = Some(theirs);
        self.conflicted = conflicts;
        Ok(true)
    }

    fn reset_worktree(&mut self) -> Result<(), StoreError> {
        self.merge_head = None;
        self.conflicted.clear();
        self.worktree = self.head_tree();
        warn!(head = %self.head_id(), "working tree reset");
        Ok(())
    }

    fn show(&self, path: &str, reference: &str) -> Result<String, StoreError> {
        self.tree_at(reference)?
            .get(path)
            .cloned()
            .ok_or_else(|| Self::path_not_found(path, reference))
    }

    fn file_exists(&self, path: &str, reference: &str) -> Result<bool, StoreError> {
        Ok(self.tree_at(reference)?.contains_key(path))
    }

    fn list_files(&self, reference: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.tree_at(reference)?.keys().cloned().collect())
    }

    fn resolve_version(&self, reference: &str) -> Result<VersionToken, StoreError> {
        self.resolve(reference).map(VersionToken::new)
    }

    fn is_ancestor(
        &self,
        ancestor: &VersionToken,
        descendant: &VersionToken,
    ) -> Result<bool, StoreError> {
        for token in [ancestor, descendant] {
            if !self.commits.contains_key(token.as_str()) {
                return Err(StoreError::RefNotFound(token.to_string()));
            }
        }
        Ok(self.ancestors(descendant.as_str()).contains(ancestor.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(path: &str, text: &str) -> (MemoryStore, VersionToken) {
        let mut store = MemoryStore::new("master");
        store.write_content(path, text).unwrap();
        let token = store.commit_path(path, "add").unwrap();
        (store, token)
    }

    #[test]
    fn test_round_trip() {
        let (store, token) = store_with("notes/a.txt", "hello\nworld");
        assert_eq!(store.show("notes/a.txt", "master").unwrap(), "hello\nworld");
        assert_eq!(store.resolve_version("master").unwrap(), token);
        assert_eq!(token.as_str().len(), 64);
        assert_eq!(
            store.list_files("master").unwrap(),
            vec![KEEP_FILE.to_string(), "notes/a.txt".to_string()]
        );
    }

    #[test]
    fn test_fast_forward_and_branch_deletion() {
        let (mut store, _) = store_with("a.txt", "v0\n");
        store.create_branch("feature").unwrap();
        store.write_content("a.txt", "v1\n").unwrap();
        let tip = store.commit_path("a.txt", "edit").unwrap();

        store.checkout("master").unwrap();
        assert_eq!(store.read_content("a.txt").unwrap(), "v0\n");
        assert!(matches!(
            store.delete_branch("feature", false),
            Err(StoreError::NotFullyMerged(_))
        ));
        assert!(!store.merge("feature").unwrap());
        assert_eq!(store.resolve_version("master").unwrap(), tip);
        store.delete_branch("feature", false).unwrap();
        assert_eq!(store.list_branches().unwrap(), vec!["master".to_string()]);
    }

    #[test]
    fn test_conflicting_merge_and_resolution_commit() {
        let (mut store, base) = store_with("a.txt", "v0\n");
        store.create_branch("side").unwrap();
        store.write_content("a.txt", "v2\n").unwrap();
        store.commit_path("a.txt", "side edit").unwrap();

        store.checkout(base.as_str()).unwrap();
        store.checkout("master").unwrap();
        store.write_content("a.txt", "v1\n").unwrap();
        let trunk_tip = store.commit_path("a.txt", "trunk edit").unwrap();

        store.checkout("side").unwrap();
        assert!(store.merge("master").unwrap());
        let text = store.read_content("a.txt").unwrap();
        assert!(text.contains("<<<<<<< ours\nv2\n=======\nv1\n>>>>>>> theirs"));
        assert!(matches!(
            store.checkout("master"),
            Err(StoreError::DirtyWorkTree(_))
        ));

        let resolved = store.commit_path("a.txt", "conflict").unwrap();
        assert!(store.is_ancestor(&trunk_tip, &resolved).unwrap());
        // Trunk is now part of the side branch history.
        assert!(!store.merge("master").unwrap());
    }

    #[test]
    fn test_non_overlapping_merge_is_committed() {
        let (mut store, _) = store_with("a.txt", "a\n");
        store.create_branch("side").unwrap();
        store.write_content("b.txt", "b\n").unwrap();
        store.commit_path("b.txt", "add b").unwrap();
        store.checkout("master").unwrap();
        store.write_content("a.txt", "A\n").unwrap();
        store.commit_path("a.txt", "edit a").unwrap();

        assert!(!store.merge("side").unwrap());
        assert_eq!(store.show("a.txt", "master").unwrap(), "A\n");
        assert_eq!(store.show("b.txt", "master").unwrap(), "b\n");
    }

    #[test]
    fn test_modify_delete_conflict_keeps_modification() {
        let (mut store, _) = store_with("a.txt", "v0\n");
        store.create_branch("delete").unwrap();
        store.remove_content("a.txt").unwrap();
        store.commit_path("a.txt", "delete").unwrap();
        assert!(!store.file_exists("a.txt", "delete").unwrap());

        store.checkout("master").unwrap();
        store.write_content("a.txt", "v1\n").unwrap();
        store.commit_path("a.txt", "edit").unwrap();

        store.checkout("delete").unwrap();
        assert!(store.merge("master").unwrap());
        assert_eq!(store.read_content("a.txt").unwrap(), "v1\n");
    }

    #[test]
    fn test_detached_checkout_and_unknown_refs() {
        let (mut store, first) = store_with("a.txt", "v0\n");
        store.write_content("a.txt", "v1\n").unwrap();
        let second = store.commit_path("a.txt", "edit").unwrap();

        store.checkout(first.as_str()).unwrap();
        assert_eq!(store.current_branch().unwrap(), None);
        assert_eq!(store.read_content("a.txt").unwrap(), "v0\n");
        assert!(store.is_ancestor(&first, &second).unwrap());
        assert!(!store.is_ancestor(&second, &first).unwrap());
        assert!(matches!(
            store.checkout("missing"),
            Err(StoreError::RefNotFound(_))
        ));
        assert!(matches!(
            store.is_ancestor(&VersionToken::new("abcd"), &first),
            Err(StoreError::RefNotFound(_))
        ));
        assert_eq!(store.resolve_version(&second.as_str()[..12]).unwrap(), second);
    }

    #[test]
    fn test_reset_worktree_abandons_merge() {
        let (mut store, _) = store_with("a.txt", "base\n");
        store.create_branch("feature").unwrap();
        store.write_content("a.txt", "feature\n").unwrap();
        store.commit_path("a.txt", "feature").unwrap();
        store.checkout("master").unwrap();
        store.write_content("a.txt", "master\n").unwrap();
        store.commit_path("a.txt", "master").unwrap();

        assert!(store.merge("feature").unwrap());
        store.reset_worktree().unwrap();
        assert_eq!(store.read_content("a.txt").unwrap(), "master\n");
        store.checkout("feature").unwrap();
    }
}
