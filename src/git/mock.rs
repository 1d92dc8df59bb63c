//! git::mock
//!
//! In-memory version-control engine for deterministic testing.
//!
//! # Design
//!
//! `MockVcs` implements the full [`Vcs`] trait over in-memory maps: an
//! object store addressed by SHA-256 of the serialized object, a ref table,
//! HEAD, upstream config, an index tree and a working copy of plain byte
//! buffers with their file modes. Tree
//! merges go through [`crate::git::merge::merge_tree_entries`], so conflict
//! rendering matches the real engine.
//!
//! Failures can be injected with [`FailOn`] to exercise crash and recovery
//! paths, and every mutation is recorded as a [`MockOperation`].
//!
//! # Example
//!
//! ```
//! use tbd::git::mock::MockVcs;
//! use tbd::git::Vcs;
//!
//! let vcs = MockVcs::new();
//! let c1 = vcs.commit_files("main", &[("a.txt", Some("one\n"))], "first");
//! assert_eq!(vcs.resolve_revision("main").unwrap(), Some(c1));
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};

use super::merge::merge_tree_entries;
use super::traits::{CommitInfo, MergeLabels, TreeEntries, TreeEntry, TreeMerge, Vcs, MODE_FILE};
use super::GitError;
use crate::core::types::{BranchName, Oid, RefName, RepoPath};

/// Mock engine for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone)]
pub struct MockVcs {
    inner: Arc<Mutex<MockVcsInner>>,
    work_dir: PathBuf,
}

#[derive(Debug, Clone)]
enum Object {
    Blob(Vec<u8>),
    Tree(TreeEntries),
    Commit(CommitInfo),
}

#[derive(Debug, Default)]
struct MockVcsInner {
    objects: HashMap<Oid, Object>,
    refs: BTreeMap<String, Oid>,
    head: Option<BranchName>,
    upstreams: HashMap<BranchName, BranchName>,
    files: BTreeMap<RepoPath, Vec<u8>>,
    modes: BTreeMap<RepoPath, u32>,
    index: Option<Oid>,
    /// Distinguishes commits with identical content, like a timestamp.
    commit_seq: u64,
    commits_created: usize,
    fail_on: Option<FailOn>,
    operations: Vec<MockOperation>,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    /// Fail `create_commit` once this many commits have been created
    /// since the failure was configured.
    CreateCommitAfter(usize),
    /// Fail ref updates and deletions for refs starting with this prefix.
    RefUpdate(String),
    /// Fail working-copy writes.
    WorkFileWrite,
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    UpdateRef { name: String, target: Oid },
    DeleteRef { name: String },
    SetHead { branch: BranchName },
    CreateCommit { message: String, parents: Vec<Oid> },
    WriteWorkFile { path: RepoPath },
    RemoveWorkFile { path: RepoPath },
    ResetIndex { tree: Option<Oid> },
}

fn hash_object(kind: &str, body: &[u8]) -> Result<Oid, GitError> {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(body);
    Ok(Oid::new(hex::encode(hasher.finalize()))?)
}

fn injected(what: &str) -> GitError {
    GitError::Internal {
        message: format!("injected failure: {what}"),
    }
}

impl Default for MockVcs {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVcs {
    /// Create an empty repository whose HEAD points at an unborn `main`.
    pub fn new() -> Self {
        let inner = MockVcsInner {
            head: BranchName::new("main").ok(),
            ..MockVcsInner::default()
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            work_dir: PathBuf::from("/mock/repo"),
        }
    }

    /// Configure the mock to fail on a specific operation.
    pub fn fail_on(&self, fail_on: FailOn) {
        let mut inner = self.inner.lock().unwrap();
        inner.commits_created = 0;
        inner.fail_on = Some(fail_on);
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        self.inner.lock().unwrap().fail_on = None;
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.inner.lock().unwrap().operations.clone()
    }

    // =========================================================================
    // Test helpers
    // =========================================================================

    /// Commit files on top of `branch` and advance it, without touching the
    /// working copy. `None` content deletes the file.
    ///
    /// # Panics
    ///
    /// Panics on invalid names; this is a test helper.
    pub fn commit_files(&self, branch: &str, files: &[(&str, Option<&str>)], message: &str) -> Oid {
        self.commit_files_with_mode(branch, files, MODE_FILE, message)
    }

    /// [`MockVcs::commit_files`] with every written file given `mode`.
    pub fn commit_files_with_mode(
        &self,
        branch: &str,
        files: &[(&str, Option<&str>)],
        mode: u32,
        message: &str,
    ) -> Oid {
        let branch = BranchName::new(branch).expect("valid branch name");
        let refname = RefName::for_branch(&branch);
        let parent = self.read_ref(&refname).expect("read branch");
        let mut entries = match &parent {
            Some(parent) => {
                let tree = self.commit_info(parent).expect("parent commit").tree;
                self.tree_entries(&tree).expect("parent tree")
            }
            None => TreeEntries::new(),
        };
        for (path, content) in files {
            let path = RepoPath::new(*path).expect("valid path");
            match content {
                Some(content) => {
                    let oid = self.write_blob(content.as_bytes()).expect("write blob");
                    entries.insert(path, TreeEntry { oid, mode });
                }
                None => {
                    entries.remove(&path);
                }
            }
        }
        let tree = self.write_tree(&entries).expect("write tree");
        let parents: Vec<Oid> = parent.into_iter().collect();
        let commit = self.create_commit(&tree, &parents, message).expect("create commit");
        self.set_ref(&refname, &commit, "mock commit").expect("move branch");
        commit
    }

    /// Write every file of `commit`'s tree into the working copy, replacing
    /// its previous content.
    pub fn checkout_commit_files(&self, commit: &Oid) {
        let tree = self.commit_info(commit).expect("commit").tree;
        let entries = self.tree_entries(&tree).expect("tree");
        let mut inner = self.inner.lock().unwrap();
        inner.files.clear();
        inner.modes.clear();
        for (path, entry) in entries {
            if let Some(Object::Blob(content)) = inner.objects.get(&entry.oid).cloned() {
                inner.modes.insert(path.clone(), entry.mode);
                inner.files.insert(path, content);
            }
        }
        inner.index = Some(tree);
    }

    /// Set a working-copy file. A new file gets [`MODE_FILE`]; an existing
    /// one keeps its mode.
    pub fn set_work_file(&self, path: &str, content: &str) {
        let path = RepoPath::new(path).expect("valid path");
        let mut inner = self.inner.lock().unwrap();
        inner.modes.entry(path.clone()).or_insert(MODE_FILE);
        inner.files.insert(path, content.as_bytes().to_vec());
    }

    /// Change the mode of an existing working-copy file, like `chmod`.
    pub fn set_work_file_mode(&self, path: &str, mode: u32) {
        let path = RepoPath::new(path).expect("valid path");
        let mut inner = self.inner.lock().unwrap();
        if inner.files.contains_key(&path) {
            inner.modes.insert(path, mode);
        }
    }

    /// Remove a working-copy file.
    pub fn delete_work_file(&self, path: &str) {
        let path = RepoPath::new(path).expect("valid path");
        let mut inner = self.inner.lock().unwrap();
        inner.files.remove(&path);
        inner.modes.remove(&path);
    }

    /// Tree the index was last reset to.
    pub fn index_tree(&self) -> Option<Oid> {
        self.inner.lock().unwrap().index.clone()
    }

    /// Read a working-copy file as text.
    pub fn work_file(&self, path: &str) -> Option<String> {
        let path = RepoPath::new(path).expect("valid path");
        self.inner
            .lock()
            .unwrap()
            .files
            .get(&path)
            .map(|c| String::from_utf8_lossy(c).into_owned())
    }

    /// Content of `path` in `commit`'s tree, as text.
    pub fn file_at(&self, commit: &Oid, path: &str) -> Option<String> {
        let path = RepoPath::new(path).expect("valid path");
        let tree = self.commit_info(commit).ok()?.tree;
        let entry = self.tree_entries(&tree).ok()?.remove(&path)?;
        let content = self.read_blob(&entry.oid).ok()?;
        Some(String::from_utf8_lossy(&content).into_owned())
    }

    /// Create a branch at `target` without switching to it.
    pub fn create_branch_at(&self, branch: &str, target: &Oid) {
        let branch = BranchName::new(branch).expect("valid branch name");
        self.set_ref(&RefName::for_branch(&branch), target, "mock branch")
            .expect("create branch");
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn store(&self, kind: &str, body: Vec<u8>, object: Object) -> Result<Oid, GitError> {
        let oid = hash_object(kind, &body)?;
        self.inner.lock().unwrap().objects.entry(oid.clone()).or_insert(object);
        Ok(oid)
    }

    fn commit_parents(&self, oid: &Oid) -> Result<Vec<Oid>, GitError> {
        Ok(self.commit_info(oid)?.parents)
    }

    /// All ancestors of `start`, itself included.
    fn ancestors(&self, start: &Oid) -> Result<HashSet<Oid>, GitError> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start.clone()]);
        while let Some(oid) = queue.pop_front() {
            if seen.insert(oid.clone()) {
                queue.extend(self.commit_parents(&oid)?);
            }
        }
        Ok(seen)
    }

    fn check_ref_failure(inner: &MockVcsInner, name: &str) -> Result<(), GitError> {
        if let Some(FailOn::RefUpdate(prefix)) = &inner.fail_on {
            if name.starts_with(prefix.as_str()) {
                return Err(injected(name));
            }
        }
        Ok(())
    }

    fn resolve_base(&self, base: &str) -> Result<Option<Oid>, GitError> {
        if base == "HEAD" || base == "@" {
            let head = self.inner.lock().unwrap().head.clone();
            return match head {
                Some(branch) => self.read_ref(&RefName::for_branch(&branch)),
                None => Ok(None),
            };
        }
        if let Ok(branch) = BranchName::new(base) {
            if let Some(oid) = self.read_ref(&RefName::for_branch(&branch))? {
                return Ok(Some(oid));
            }
        }
        if let Ok(tag) = RefName::for_tag(base) {
            if let Some(oid) = self.read_ref(&tag)? {
                return Ok(Some(oid));
            }
        }
        if base.len() < 4 || !base.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(None);
        }
        let inner = self.inner.lock().unwrap();
        let mut matches = inner
            .objects
            .iter()
            .filter(|(oid, object)| matches!(object, Object::Commit(_)) && oid.matches_prefix(base))
            .map(|(oid, _)| oid.clone());
        match (matches.next(), matches.next()) {
            (Some(oid), None) => Ok(Some(oid)),
            _ => Ok(None),
        }
    }
}

impl Vcs for MockVcs {
    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    // =========================================================================
    // References
    // =========================================================================

    fn read_ref(&self, name: &RefName) -> Result<Option<Oid>, GitError> {
        Ok(self.inner.lock().unwrap().refs.get(name.as_str()).cloned())
    }

    fn update_ref_cas(
        &self,
        name: &RefName,
        new: &Oid,
        expected_old: Option<&Oid>,
        _message: &str,
    ) -> Result<(), GitError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_ref_failure(&inner, name.as_str())?;
        let current = inner.refs.get(name.as_str());
        if current != expected_old {
            return Err(GitError::CasFailed {
                refname: name.to_string(),
                expected: expected_old.map_or("<none>".to_string(), Oid::to_string),
                actual: current.map_or("<none>".to_string(), Oid::to_string),
            });
        }
        inner.refs.insert(name.to_string(), new.clone());
        inner.operations.push(MockOperation::UpdateRef {
            name: name.to_string(),
            target: new.clone(),
        });
        Ok(())
    }

    fn delete_ref_cas(&self, name: &RefName, expected_old: &Oid) -> Result<(), GitError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_ref_failure(&inner, name.as_str())?;
        match inner.refs.get(name.as_str()) {
            None => {
                return Err(GitError::RefNotFound {
                    refname: name.to_string(),
                })
            }
            Some(actual) if actual != expected_old => {
                return Err(GitError::CasFailed {
                    refname: name.to_string(),
                    expected: expected_old.to_string(),
                    actual: actual.to_string(),
                })
            }
            _ => {}
        }
        inner.refs.remove(name.as_str());
        inner.operations.push(MockOperation::DeleteRef {
            name: name.to_string(),
        });
        Ok(())
    }

    fn set_ref(&self, name: &RefName, target: &Oid, _message: &str) -> Result<(), GitError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_ref_failure(&inner, name.as_str())?;
        inner.refs.insert(name.to_string(), target.clone());
        inner.operations.push(MockOperation::UpdateRef {
            name: name.to_string(),
            target: target.clone(),
        });
        Ok(())
    }

    fn delete_ref(&self, name: &RefName) -> Result<(), GitError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_ref_failure(&inner, name.as_str())?;
        if inner.refs.remove(name.as_str()).is_some() {
            inner.operations.push(MockOperation::DeleteRef {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(RefName, Oid)>, GitError> {
        let inner = self.inner.lock().unwrap();
        inner
            .refs
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, oid)| Ok((RefName::new(name.clone())?, oid.clone())))
            .collect()
    }

    fn current_branch(&self) -> Result<Option<BranchName>, GitError> {
        Ok(self.inner.lock().unwrap().head.clone())
    }

    fn set_head(&self, branch: &BranchName) -> Result<(), GitError> {
        let mut inner = self.inner.lock().unwrap();
        inner.head = Some(branch.clone());
        inner.operations.push(MockOperation::SetHead {
            branch: branch.clone(),
        });
        Ok(())
    }

    fn upstream(&self, branch: &BranchName) -> Result<Option<BranchName>, GitError> {
        Ok(self.inner.lock().unwrap().upstreams.get(branch).cloned())
    }

    fn set_upstream(
        &self,
        branch: &BranchName,
        upstream: Option<&BranchName>,
    ) -> Result<(), GitError> {
        let mut inner = self.inner.lock().unwrap();
        match upstream {
            Some(upstream) => inner.upstreams.insert(branch.clone(), upstream.clone()),
            None => inner.upstreams.remove(branch),
        };
        Ok(())
    }

    // =========================================================================
    // History
    // =========================================================================

    fn commit_info(&self, oid: &Oid) -> Result<CommitInfo, GitError> {
        match self.inner.lock().unwrap().objects.get(oid) {
            Some(Object::Commit(info)) => Ok(info.clone()),
            _ => Err(GitError::ObjectNotFound {
                oid: oid.to_string(),
            }),
        }
    }

    fn resolve_revision(&self, spec: &str) -> Result<Option<Oid>, GitError> {
        let split = spec.find(['~', '^']).unwrap_or(spec.len());
        let (base, mut suffix) = spec.split_at(split);
        let Some(mut oid) = self.resolve_base(base)? else {
            return Ok(None);
        };

        while let Some(op) = suffix.chars().next() {
            let rest = &suffix[1..];
            let digits = rest.chars().take_while(char::is_ascii_digit).count();
            let n: usize = if digits == 0 {
                1
            } else {
                match rest[..digits].parse() {
                    Ok(n) => n,
                    Err(_) => return Ok(None),
                }
            };
            suffix = &rest[digits..];

            match op {
                '~' => {
                    for _ in 0..n {
                        match self.commit_parents(&oid)?.into_iter().next() {
                            Some(parent) => oid = parent,
                            None => return Ok(None),
                        }
                    }
                }
                '^' if n == 0 => {}
                '^' => match self.commit_parents(&oid)?.into_iter().nth(n - 1) {
                    Some(parent) => oid = parent,
                    None => return Ok(None),
                },
                _ => return Ok(None),
            }
        }
        Ok(Some(oid))
    }

    fn ancestry_diff(&self, from: Option<&Oid>, to: &Oid) -> Result<Vec<Oid>, GitError> {
        let hidden = match from {
            Some(from) => self.ancestors(from)?,
            None => HashSet::new(),
        };

        // Iterative post-order DFS: parents are emitted before children.
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(to.clone(), false)];
        while let Some((oid, expanded)) = stack.pop() {
            if hidden.contains(&oid) {
                continue;
            }
            if expanded {
                out.push(oid);
                continue;
            }
            if !visited.insert(oid.clone()) {
                continue;
            }
            stack.push((oid.clone(), true));
            for parent in self.commit_parents(&oid)?.into_iter().rev() {
                if !visited.contains(&parent) {
                    stack.push((parent, false));
                }
            }
        }
        Ok(out)
    }

    fn merge_base(&self, a: &Oid, b: &Oid) -> Result<Option<Oid>, GitError> {
        let of_a = self.ancestors(a)?;
        let mut queue = VecDeque::from([b.clone()]);
        let mut seen = HashSet::new();
        let mut common = Vec::new();
        while let Some(oid) = queue.pop_front() {
            if !seen.insert(oid.clone()) {
                continue;
            }
            if of_a.contains(&oid) {
                common.push(oid);
                continue;
            }
            queue.extend(self.commit_parents(&oid)?);
        }
        // Best common ancestor: one that no other candidate descends from.
        for candidate in &common {
            let mut dominated = false;
            for other in &common {
                if other != candidate && self.ancestors(other)?.contains(candidate) {
                    dominated = true;
                    break;
                }
            }
            if !dominated {
                return Ok(Some(candidate.clone()));
            }
        }
        Ok(None)
    }

    // =========================================================================
    // Objects
    // =========================================================================

    fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>, GitError> {
        match self.inner.lock().unwrap().objects.get(oid) {
            Some(Object::Blob(content)) => Ok(content.clone()),
            _ => Err(GitError::ObjectNotFound {
                oid: oid.to_string(),
            }),
        }
    }

    fn write_blob(&self, content: &[u8]) -> Result<Oid, GitError> {
        self.store("blob", content.to_vec(), Object::Blob(content.to_vec()))
    }

    fn tree_entries(&self, tree: &Oid) -> Result<TreeEntries, GitError> {
        match self.inner.lock().unwrap().objects.get(tree) {
            Some(Object::Tree(entries)) => Ok(entries.clone()),
            _ => Err(GitError::ObjectNotFound {
                oid: tree.to_string(),
            }),
        }
    }

    fn write_tree(&self, entries: &TreeEntries) -> Result<Oid, GitError> {
        let mut body = String::new();
        for (path, entry) in entries {
            body.push_str(&format!("{:o} {} {}\n", entry.mode, entry.oid, path));
        }
        self.store("tree", body.into_bytes(), Object::Tree(entries.clone()))
    }

    fn create_commit(
        &self,
        tree: &Oid,
        parents: &[Oid],
        message: &str,
    ) -> Result<Oid, GitError> {
        let seq = {
            let mut inner = self.inner.lock().unwrap();
            if let Some(FailOn::CreateCommitAfter(n)) = inner.fail_on {
                if inner.commits_created >= n {
                    return Err(injected("create_commit"));
                }
            }
            if !matches!(inner.objects.get(tree), Some(Object::Tree(_))) {
                return Err(GitError::ObjectNotFound {
                    oid: tree.to_string(),
                });
            }
            inner.commits_created += 1;
            inner.commit_seq += 1;
            inner.operations.push(MockOperation::CreateCommit {
                message: message.to_string(),
                parents: parents.to_vec(),
            });
            inner.commit_seq
        };

        let parent_list: Vec<&str> = parents.iter().map(Oid::as_str).collect();
        let body = format!("{}\n{}\n{}\n{}", tree, parent_list.join(" "), seq, message);
        let oid = hash_object("commit", body.as_bytes())?;
        let info = CommitInfo {
            oid: oid.clone(),
            summary: message.lines().next().unwrap_or("").to_string(),
            message: message.to_string(),
            parents: parents.to_vec(),
            tree: tree.clone(),
        };
        self.inner
            .lock()
            .unwrap()
            .objects
            .insert(oid.clone(), Object::Commit(info));
        Ok(oid)
    }

    // =========================================================================
    // Merges
    // =========================================================================

    fn three_way_merge_trees(
        &self,
        base: Option<&Oid>,
        ours: &Oid,
        theirs: &Oid,
        labels: &MergeLabels<'_>,
    ) -> Result<TreeMerge, GitError> {
        let base = match base {
            Some(base) => self.tree_entries(base)?,
            None => TreeEntries::new(),
        };
        let ours = self.tree_entries(ours)?;
        let theirs = self.tree_entries(theirs)?;
        let (merged, conflicts) = merge_tree_entries(self, &base, &ours, &theirs, labels)?;
        let tree = self.write_tree(&merged)?;
        if conflicts.is_empty() {
            Ok(TreeMerge::Clean(tree))
        } else {
            Ok(TreeMerge::Conflicted {
                tree,
                paths: conflicts,
            })
        }
    }

    // =========================================================================
    // Working copy
    // =========================================================================

    fn read_work_file(&self, path: &RepoPath) -> Result<Option<Vec<u8>>, GitError> {
        Ok(self.inner.lock().unwrap().files.get(path).cloned())
    }

    fn work_file_mode(&self, path: &RepoPath) -> Result<Option<u32>, GitError> {
        Ok(self.inner.lock().unwrap().modes.get(path).copied())
    }

    fn write_work_file(&self, path: &RepoPath, content: &[u8], mode: u32) -> Result<(), GitError> {
        let mut inner = self.inner.lock().unwrap();
        if matches!(inner.fail_on, Some(FailOn::WorkFileWrite)) {
            return Err(injected(path.as_str()));
        }
        inner.files.insert(path.clone(), content.to_vec());
        inner.modes.insert(path.clone(), mode);
        inner
            .operations
            .push(MockOperation::WriteWorkFile { path: path.clone() });
        Ok(())
    }

    fn remove_work_file(&self, path: &RepoPath) -> Result<(), GitError> {
        let mut inner = self.inner.lock().unwrap();
        inner.modes.remove(path);
        if inner.files.remove(path).is_some() {
            inner
                .operations
                .push(MockOperation::RemoveWorkFile { path: path.clone() });
        }
        Ok(())
    }

    fn work_files(&self) -> Result<BTreeSet<RepoPath>, GitError> {
        Ok(self.inner.lock().unwrap().files.keys().cloned().collect())
    }

    fn reset_index(&self, tree: Option<&Oid>) -> Result<(), GitError> {
        let mut inner = self.inner.lock().unwrap();
        inner.index = tree.cloned();
        inner.operations.push(MockOperation::ResetIndex {
            tree: tree.cloned(),
        });
        Ok(())
    }
}
