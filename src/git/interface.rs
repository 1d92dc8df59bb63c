//! git::interface
//!
//! [`Vcs`] implementation backed by a real repository through git2.
//!
//! This is the **single doorway** to git2 in tbd. All object, ref and
//! working-copy access for a real repository flows through [`Git`], which
//! normalizes git2 failures into [`GitError`] categories.
//!
//! # Error Handling
//!
//! - [`GitError::NotARepo`]: Not inside a Git repository
//! - [`GitError::RefNotFound`]: Requested ref does not exist
//! - [`GitError::CasFailed`]: Compare-and-swap precondition failed
//! - [`GitError::ObjectNotFound`]: Object id names nothing
//! - [`GitError::AccessError`]: Filesystem failure in the working copy
//!
//! # Example
//!
//! ```ignore
//! use tbd::git::{Git, Vcs};
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("."))?;
//! let branch = git.current_branch()?;
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::merge::{merge_blobs, BlobMerge};
use super::traits::{
    CommitInfo, MergeLabels, TreeEntries, TreeEntry, TreeMerge, Vcs, MODE_EXECUTABLE, MODE_FILE,
};
use crate::core::types::{BranchName, Oid, RefName, RepoPath, TypeError};

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not inside a Git repository.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was searched
        path: PathBuf,
    },

    /// Repository is bare (no working directory).
    #[error("bare repository not supported")]
    BareRepo,

    /// Requested ref does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The ref that was not found
        refname: String,
    },

    /// Compare-and-swap precondition failed.
    ///
    /// The ref moved since it was read. Nothing was written.
    #[error("CAS failed for {refname}: expected {expected}, found {actual}")]
    CasFailed {
        /// The ref being updated
        refname: String,
        /// The expected old value
        expected: String,
        /// The actual current value
        actual: String,
    },

    /// Object not found in repository.
    #[error("object not found: {oid}")]
    ObjectNotFound {
        /// The OID that was not found
        oid: String,
    },

    /// Invalid object id format.
    #[error("invalid object id: {oid}")]
    InvalidOid {
        /// The invalid OID string
        oid: String,
    },

    /// Invalid ref name format.
    #[error("invalid ref name: {message}")]
    InvalidRefName {
        /// Description of the problem
        message: String,
    },

    /// Path cannot be represented in a tree.
    #[error("invalid path: {message}")]
    InvalidPath {
        /// Description of the problem
        message: String,
    },

    /// Permission or filesystem error.
    #[error("repository access error: {message}")]
    AccessError {
        /// Description of the error
        message: String,
    },

    /// Internal git2 error, or an injected failure in tests.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    /// Create a GitError from a git2::Error with richer context.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => {
                if context.starts_with("refs/") || context.contains("ref") {
                    GitError::RefNotFound {
                        refname: context.to_string(),
                    }
                } else {
                    GitError::ObjectNotFound {
                        oid: context.to_string(),
                    }
                }
            }
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: context.to_string(),
            },
            git2::ErrorCode::Locked => GitError::AccessError {
                message: format!("repository is locked: {}", err.message()),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }

    fn from_io(err: std::io::Error, path: &Path) -> Self {
        GitError::AccessError {
            message: format!("{}: {}", path.display(), err),
        }
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => GitError::RefNotFound {
                refname: err.message().to_string(),
            },
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: err.message().to_string(),
            },
            _ => GitError::Internal {
                message: err.message().to_string(),
            },
        }
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidOid(msg) => GitError::InvalidOid { oid: msg },
            TypeError::InvalidRefName(msg) => GitError::InvalidRefName { message: msg },
            TypeError::InvalidBranchName(msg) => GitError::InvalidRefName { message: msg },
            TypeError::InvalidPath(msg) => GitError::InvalidPath { message: msg },
        }
    }
}

/// Information about a Git repository.
#[derive(Debug, Clone)]
pub struct RepoInfo {
    /// Path to .git directory
    pub git_dir: PathBuf,
    /// Path to working directory
    pub work_dir: PathBuf,
}

fn to_git2(oid: &Oid) -> Result<git2::Oid, GitError> {
    git2::Oid::from_str(oid.as_str()).map_err(|e| GitError::from_git2(e, oid.as_str()))
}

fn from_git2_oid(oid: git2::Oid) -> Result<Oid, GitError> {
    Ok(Oid::new(oid.to_string())?)
}

/// Identity used for commits when Git config has none.
#[derive(Debug, Clone)]
struct Identity {
    name: String,
    email: String,
}

/// A repository with a working copy.
///
/// Ref updates that must not race use [`Vcs::update_ref_cas`]; the
/// working-copy methods operate on files under [`Vcs::work_dir`].
pub struct Git {
    /// The underlying git2 repository
    repo: git2::Repository,
    /// Canonical working directory, without trailing separator
    work_dir: PathBuf,
    fallback_identity: Option<Identity>,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .field("work_dir", &self.work_dir)
            .finish()
    }
}

impl Git {
    // =========================================================================
    // Repository Opening and Info
    // =========================================================================

    /// Open the repository containing `path`.
    ///
    /// Uses `git2::Repository::discover`, so `path` can be any directory
    /// within the repository.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if no repository is found
    /// - [`GitError::BareRepo`] if the repository has no working directory
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::discover(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;
        Self::from_repository(repo)
    }

    /// Create a repository at `path` whose HEAD points at `initial_branch`.
    ///
    /// The branch is unborn until the first commit.
    pub fn init(path: &Path, initial_branch: &BranchName) -> Result<Self, GitError> {
        fs::create_dir_all(path).map_err(|e| GitError::from_io(e, path))?;
        let mut opts = git2::RepositoryInitOptions::new();
        opts.initial_head(initial_branch.as_str());
        let repo = git2::Repository::init_opts(path, &opts)
            .map_err(|e| GitError::from_git2(e, &path.display().to_string()))?;
        Self::from_repository(repo)
    }

    fn from_repository(repo: git2::Repository) -> Result<Self, GitError> {
        if repo.is_bare() {
            return Err(GitError::BareRepo);
        }
        let raw = repo.workdir().ok_or(GitError::BareRepo)?;
        let work_dir = fs::canonicalize(raw).unwrap_or_else(|_| raw.to_path_buf());
        Ok(Self {
            repo,
            work_dir,
            fallback_identity: None,
        })
    }

    /// Commit as `name <email>` when Git config defines no identity.
    pub fn with_fallback_identity(mut self, name: Option<&str>, email: Option<&str>) -> Self {
        if let (Some(name), Some(email)) = (name, email) {
            self.fallback_identity = Some(Identity {
                name: name.to_string(),
                email: email.to_string(),
            });
        }
        self
    }

    /// Get repository information (git_dir and work_dir paths).
    pub fn info(&self) -> Result<RepoInfo, GitError> {
        Ok(RepoInfo {
            git_dir: self.repo.path().to_path_buf(),
            work_dir: self.work_dir.clone(),
        })
    }

    /// Get direct access to the .git directory path.
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    fn signature(&self) -> Result<git2::Signature<'static>, GitError> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig.to_owned()),
            Err(_) => {
                let (name, email) = match &self.fallback_identity {
                    Some(id) => (id.name.as_str(), id.email.as_str()),
                    None => ("tbd", "tbd@localhost"),
                };
                debug!(name, email, "no git identity configured, using fallback");
                git2::Signature::now(name, email).map_err(|e| GitError::from_git2(e, "signature"))
            }
        }
    }

    fn find_tree(&self, oid: &Oid) -> Result<git2::Tree<'_>, GitError> {
        self.repo
            .find_tree(to_git2(oid)?)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))
    }

    fn empty_tree(&self) -> Result<git2::Tree<'_>, GitError> {
        let oid = self.repo.treebuilder(None)?.write()?;
        Ok(self.repo.find_tree(oid)?)
    }

    /// Raw target of a ref, resolving symbolic refs.
    fn try_resolve_ref_raw(&self, refname: &str) -> Result<Option<String>, GitError> {
        match self.repo.find_reference(refname) {
            Ok(reference) => {
                let resolved = reference.resolve().unwrap_or(reference);
                let oid = resolved.target().ok_or_else(|| GitError::Internal {
                    message: format!("ref {} has no target", refname),
                })?;
                Ok(Some(oid.to_string()))
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, refname)),
        }
    }

    fn branch_config_key(branch: &BranchName, field: &str) -> String {
        format!("branch.{}.{}", branch, field)
    }

    fn collect_work_files(
        &self,
        dir: &Path,
        prefix: &str,
        out: &mut BTreeSet<RepoPath>,
    ) -> Result<(), GitError> {
        let entries = fs::read_dir(dir).map_err(|e| GitError::from_io(e, dir))?;
        for entry in entries {
            let entry = entry.map_err(|e| GitError::from_io(e, dir))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name == ".git" {
                continue;
            }
            let relative = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{prefix}/{name}")
            };
            let file_type = entry.file_type().map_err(|e| GitError::from_io(e, dir))?;
            let candidate = if file_type.is_dir() {
                format!("{relative}/")
            } else {
                relative.clone()
            };
            if self.repo.is_path_ignored(Path::new(&candidate)).unwrap_or(false) {
                continue;
            }
            if file_type.is_dir() {
                self.collect_work_files(&entry.path(), &relative, out)?;
            } else if let Ok(path) = RepoPath::new(relative) {
                out.insert(path);
            }
        }
        Ok(())
    }
}

impl Vcs for Git {
    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    // =========================================================================
    // References
    // =========================================================================

    fn read_ref(&self, name: &RefName) -> Result<Option<Oid>, GitError> {
        self.try_resolve_ref_raw(name.as_str())?
            .map(|raw| Oid::new(raw).map_err(GitError::from))
            .transpose()
    }

    fn update_ref_cas(
        &self,
        name: &RefName,
        new: &Oid,
        expected_old: Option<&Oid>,
        message: &str,
    ) -> Result<(), GitError> {
        let refname = name.as_str();
        let current = self.try_resolve_ref_raw(refname)?;

        match (expected_old, current.as_ref()) {
            (Some(expected), Some(actual)) if expected.as_str() != actual => {
                return Err(GitError::CasFailed {
                    refname: refname.to_string(),
                    expected: expected.to_string(),
                    actual: actual.clone(),
                });
            }
            (Some(expected), None) => {
                return Err(GitError::CasFailed {
                    refname: refname.to_string(),
                    expected: expected.to_string(),
                    actual: "<none>".to_string(),
                });
            }
            (None, Some(actual)) => {
                return Err(GitError::CasFailed {
                    refname: refname.to_string(),
                    expected: "<none>".to_string(),
                    actual: actual.clone(),
                });
            }
            _ => {}
        }

        self.repo
            .reference(refname, to_git2(new)?, true, message)
            .map_err(|e| GitError::from_git2(e, refname))?;
        Ok(())
    }

    fn delete_ref_cas(&self, name: &RefName, expected_old: &Oid) -> Result<(), GitError> {
        let refname = name.as_str();
        match self.try_resolve_ref_raw(refname)? {
            None => {
                return Err(GitError::RefNotFound {
                    refname: refname.to_string(),
                })
            }
            Some(actual) if actual != expected_old.as_str() => {
                return Err(GitError::CasFailed {
                    refname: refname.to_string(),
                    expected: expected_old.to_string(),
                    actual,
                });
            }
            _ => {}
        }
        self.repo
            .find_reference(refname)
            .and_then(|mut r| r.delete())
            .map_err(|e| GitError::from_git2(e, refname))
    }

    fn set_ref(&self, name: &RefName, target: &Oid, message: &str) -> Result<(), GitError> {
        self.repo
            .reference(name.as_str(), to_git2(target)?, true, message)
            .map_err(|e| GitError::from_git2(e, name.as_str()))?;
        Ok(())
    }

    fn delete_ref(&self, name: &RefName) -> Result<(), GitError> {
        match self.repo.find_reference(name.as_str()) {
            Ok(mut reference) => reference
                .delete()
                .map_err(|e| GitError::from_git2(e, name.as_str())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(()),
            Err(e) => Err(GitError::from_git2(e, name.as_str())),
        }
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(RefName, Oid)>, GitError> {
        let refs = self
            .repo
            .references_glob(&format!("{}*", prefix))
            .map_err(|e| GitError::Internal {
                message: e.message().to_string(),
            })?;

        let mut entries = Vec::new();
        for reference in refs {
            let reference = reference.map_err(|e| GitError::Internal {
                message: e.message().to_string(),
            })?;
            // Skip refs with non-UTF8 or invalid names
            let Some(ref_name) = reference.name().and_then(|n| RefName::new(n).ok()) else {
                continue;
            };
            let Some(target) = reference.target() else {
                continue;
            };
            entries.push((ref_name, from_git2_oid(target)?));
        }
        entries.sort();
        Ok(entries)
    }

    fn current_branch(&self) -> Result<Option<BranchName>, GitError> {
        // Read HEAD's symbolic target directly so an unborn branch still
        // reports its name.
        let head = self
            .repo
            .find_reference("HEAD")
            .map_err(|e| GitError::from_git2(e, "HEAD"))?;
        match head.symbolic_target() {
            Some(target) => match target.strip_prefix(RefName::BRANCH_PREFIX) {
                Some(name) => Ok(Some(BranchName::new(name)?)),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    fn set_head(&self, branch: &BranchName) -> Result<(), GitError> {
        let refname = RefName::for_branch(branch);
        self.repo
            .set_head(refname.as_str())
            .map_err(|e| GitError::from_git2(e, refname.as_str()))
    }

    fn upstream(&self, branch: &BranchName) -> Result<Option<BranchName>, GitError> {
        let config = self.repo.config()?;
        let merge = match config.get_string(&Self::branch_config_key(branch, "merge")) {
            Ok(merge) => merge,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let Some(name) = merge.strip_prefix(RefName::BRANCH_PREFIX) else {
            return Ok(None);
        };
        let remote = config
            .get_string(&Self::branch_config_key(branch, "remote"))
            .unwrap_or_else(|_| ".".to_string());
        let upstream = if remote == "." {
            name.to_string()
        } else {
            format!("{remote}/{name}")
        };
        Ok(Some(BranchName::new(upstream)?))
    }

    fn set_upstream(
        &self,
        branch: &BranchName,
        upstream: Option<&BranchName>,
    ) -> Result<(), GitError> {
        let mut config = self.repo.config()?;
        let remote_key = Self::branch_config_key(branch, "remote");
        let merge_key = Self::branch_config_key(branch, "merge");
        match upstream {
            Some(upstream) => {
                config.set_str(&remote_key, ".")?;
                config.set_str(&merge_key, RefName::for_branch(upstream).as_str())?;
            }
            None => {
                for key in [&remote_key, &merge_key] {
                    match config.remove(key) {
                        Ok(()) => {}
                        Err(e) if e.code() == git2::ErrorCode::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // History
    // =========================================================================

    fn commit_info(&self, oid: &Oid) -> Result<CommitInfo, GitError> {
        let commit = self
            .repo
            .find_commit(to_git2(oid)?)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;

        let parents = commit
            .parent_ids()
            .map(from_git2_oid)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CommitInfo {
            oid: oid.clone(),
            summary: commit.summary().unwrap_or("").to_string(),
            message: commit.message().unwrap_or("").to_string(),
            parents,
            tree: from_git2_oid(commit.tree_id())?,
        })
    }

    fn resolve_revision(&self, spec: &str) -> Result<Option<Oid>, GitError> {
        let object = match self.repo.revparse_single(spec) {
            Ok(object) => object,
            Err(e)
                if matches!(
                    e.code(),
                    git2::ErrorCode::NotFound
                        | git2::ErrorCode::InvalidSpec
                        | git2::ErrorCode::Ambiguous
                        | git2::ErrorCode::UnbornBranch
                ) =>
            {
                return Ok(None)
            }
            Err(e) => return Err(GitError::from_git2(e, spec)),
        };
        match object.peel_to_commit() {
            Ok(commit) => Ok(Some(from_git2_oid(commit.id())?)),
            Err(_) => Ok(None),
        }
    }

    fn ancestry_diff(&self, from: Option<&Oid>, to: &Oid) -> Result<Vec<Oid>, GitError> {
        let mut walk = self.repo.revwalk()?;
        walk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::REVERSE)?;
        walk.push(to_git2(to)?)?;
        if let Some(from) = from {
            walk.hide(to_git2(from)?)?;
        }
        walk.map(|oid| from_git2_oid(oid?)).collect()
    }

    fn merge_base(&self, a: &Oid, b: &Oid) -> Result<Option<Oid>, GitError> {
        match self.repo.merge_base(to_git2(a)?, to_git2(b)?) {
            Ok(oid) => Ok(Some(from_git2_oid(oid)?)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, "merge-base")),
        }
    }

    fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, GitError> {
        if ancestor == descendant {
            return Ok(true);
        }
        self.repo
            .graph_descendant_of(to_git2(descendant)?, to_git2(ancestor)?)
            .map_err(|e| GitError::from_git2(e, "ancestry"))
    }

    // =========================================================================
    // Objects
    // =========================================================================

    fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>, GitError> {
        let blob = self
            .repo
            .find_blob(to_git2(oid)?)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;
        Ok(blob.content().to_vec())
    }

    fn write_blob(&self, content: &[u8]) -> Result<Oid, GitError> {
        let oid = self
            .repo
            .blob(content)
            .map_err(|e| GitError::from_git2(e, "write blob"))?;
        from_git2_oid(oid)
    }

    fn tree_entries(&self, tree: &Oid) -> Result<TreeEntries, GitError> {
        let tree = self.find_tree(tree)?;
        let mut entries = TreeEntries::new();
        let mut failure = None;
        let walked = tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() != Some(git2::ObjectType::Blob) {
                return git2::TreeWalkResult::Ok;
            }
            let Some(name) = entry.name() else {
                return git2::TreeWalkResult::Skip;
            };
            let parsed = RepoPath::new(format!("{root}{name}"))
                .map_err(GitError::from)
                .and_then(|path| Ok((path, from_git2_oid(entry.id())?)));
            match parsed {
                Ok((path, oid)) => {
                    entries.insert(
                        path,
                        TreeEntry {
                            oid,
                            mode: entry.filemode() as u32,
                        },
                    );
                    git2::TreeWalkResult::Ok
                }
                Err(e) => {
                    failure = Some(e);
                    git2::TreeWalkResult::Abort
                }
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }
        walked?;
        Ok(entries)
    }

    fn write_tree(&self, entries: &TreeEntries) -> Result<Oid, GitError> {
        let mut index = git2::Index::new()?;
        for (path, entry) in entries {
            index.add(&index_entry(path, entry)?)?;
        }
        let oid = index
            .write_tree_to(&self.repo)
            .map_err(|e| GitError::from_git2(e, "write tree"))?;
        from_git2_oid(oid)
    }

    fn create_commit(
        &self,
        tree: &Oid,
        parents: &[Oid],
        message: &str,
    ) -> Result<Oid, GitError> {
        let tree = self.find_tree(tree)?;
        let parents = parents
            .iter()
            .map(|p| {
                self.repo
                    .find_commit(to_git2(p)?)
                    .map_err(|e| GitError::from_git2(e, p.as_str()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
        let sig = self.signature()?;
        let oid = self
            .repo
            .commit(None, &sig, &sig, message, &tree, &parent_refs)
            .map_err(|e| GitError::from_git2(e, "commit"))?;
        from_git2_oid(oid)
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
        let ancestor = match base {
            Some(base) => self.find_tree(base)?,
            None => self.empty_tree()?,
        };
        let our_tree = self.find_tree(ours)?;
        let their_tree = self.find_tree(theirs)?;

        let mut index = self
            .repo
            .merge_trees(&ancestor, &our_tree, &their_tree, None)
            .map_err(|e| GitError::from_git2(e, "merge trees"))?;

        if !index.has_conflicts() {
            let oid = index.write_tree_to(&self.repo)?;
            return Ok(TreeMerge::Clean(from_git2_oid(oid)?));
        }

        let conflicts = index
            .conflicts()?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| GitError::from_git2(e, "merge conflicts"))?;

        let mut paths = BTreeSet::new();
        for conflict in conflicts {
            let sides = [&conflict.ancestor, &conflict.our, &conflict.their];
            let Some(raw_path) = sides.iter().find_map(|s| s.as_ref().map(|e| e.path.clone()))
            else {
                continue;
            };
            let path_str = String::from_utf8(raw_path).map_err(|_| GitError::InvalidPath {
                message: "conflicting path is not valid UTF-8".into(),
            })?;
            let path = RepoPath::new(path_str.clone())?;

            let content = |entry: &Option<git2::IndexEntry>| -> Result<Option<Vec<u8>>, GitError> {
                entry
                    .as_ref()
                    .map(|e| -> Result<Vec<u8>, GitError> {
                        Ok(self.repo.find_blob(e.id)?.content().to_vec())
                    })
                    .transpose()
            };
            let mode = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .map(|e| e.mode)
                .unwrap_or(MODE_FILE);

            index.conflict_remove(Path::new(&path_str))?;
            let merged = merge_blobs(
                content(&conflict.ancestor)?.as_deref(),
                content(&conflict.our)?.as_deref(),
                content(&conflict.their)?.as_deref(),
                labels,
            );
            let (bytes, conflicted) = match merged {
                BlobMerge::Clean(Some(bytes)) => (bytes, false),
                BlobMerge::Clean(None) => continue,
                BlobMerge::Conflict(bytes) => (bytes, true),
            };
            let oid = self.write_blob(&bytes)?;
            index.add(&index_entry(&path, &TreeEntry { oid, mode })?)?;
            if conflicted {
                paths.insert(path);
            }
        }

        let tree = from_git2_oid(index.write_tree_to(&self.repo)?)?;
        debug!(conflicts = paths.len(), "tree merge finished");
        if paths.is_empty() {
            Ok(TreeMerge::Clean(tree))
        } else {
            Ok(TreeMerge::Conflicted { tree, paths })
        }
    }

    // =========================================================================
    // Working copy
    // =========================================================================

    fn read_work_file(&self, path: &RepoPath) -> Result<Option<Vec<u8>>, GitError> {
        let full = path.to_fs_path(&self.work_dir);
        if full.is_dir() {
            return Ok(None);
        }
        match fs::read(&full) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GitError::from_io(e, &full)),
        }
    }

    fn work_file_mode(&self, path: &RepoPath) -> Result<Option<u32>, GitError> {
        let full = path.to_fs_path(&self.work_dir);
        let meta = match fs::metadata(&full) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(GitError::from_io(e, &full)),
        };
        Ok(file_mode(&meta))
    }

    fn write_work_file(&self, path: &RepoPath, content: &[u8], mode: u32) -> Result<(), GitError> {
        let full = path.to_fs_path(&self.work_dir);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| GitError::from_io(e, parent))?;
        }
        fs::write(&full, content).map_err(|e| GitError::from_io(e, &full))?;
        set_file_mode(&full, mode)
    }

    fn remove_work_file(&self, path: &RepoPath) -> Result<(), GitError> {
        let full = path.to_fs_path(&self.work_dir);
        match fs::remove_file(&full) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(GitError::from_io(e, &full)),
        }
        // Prune directories left empty, stopping at the root.
        let mut dir = full.parent();
        while let Some(d) = dir {
            if d == self.work_dir || fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
        Ok(())
    }

    fn work_files(&self) -> Result<BTreeSet<RepoPath>, GitError> {
        let mut files = BTreeSet::new();
        self.collect_work_files(&self.work_dir, "", &mut files)?;
        Ok(files)
    }

    fn reset_index(&self, tree: Option<&Oid>) -> Result<(), GitError> {
        let mut index = self.repo.index()?;
        match tree {
            Some(tree) => {
                let tree = self.repo.find_tree(to_git2(tree)?)?;
                index.read_tree(&tree)?;
            }
            None => index.clear()?,
        }
        index.write()?;
        debug!(entries = index.len(), "reset index");
        Ok(())
    }
}

#[cfg(unix)]
fn file_mode(meta: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    if meta.permissions().mode() & 0o111 != 0 {
        Some(MODE_EXECUTABLE)
    } else {
        Some(MODE_FILE)
    }
}

#[cfg(not(unix))]
fn file_mode(_meta: &fs::Metadata) -> Option<u32> {
    None
}

/// Set or clear the executable bits to match a git mode. Execute is granted
/// wherever read is, as git does on checkout.
#[cfg(unix)]
fn set_file_mode(full: &Path, mode: u32) -> Result<(), GitError> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(full)
        .map_err(|e| GitError::from_io(e, full))?
        .permissions();
    let current = perms.mode();
    let wanted = if mode == MODE_EXECUTABLE {
        current | ((current & 0o444) >> 2)
    } else {
        current & !0o111
    };
    if wanted != current {
        perms.set_mode(wanted);
        fs::set_permissions(full, perms).map_err(|e| GitError::from_io(e, full))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_file_mode(_full: &Path, _mode: u32) -> Result<(), GitError> {
    Ok(())
}

fn index_entry(path: &RepoPath, entry: &TreeEntry) -> Result<git2::IndexEntry, GitError> {
    let path_bytes = path.as_str().as_bytes().to_vec();
    Ok(git2::IndexEntry {
        ctime: git2::IndexTime::new(0, 0),
        mtime: git2::IndexTime::new(0, 0),
        dev: 0,
        ino: 0,
        mode: entry.mode,
        uid: 0,
        gid: 0,
        file_size: 0,
        id: to_git2(&entry.oid)?,
        flags: path_bytes.len().min(0xfff) as u16,
        flags_extended: 0,
        path: path_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    mod git_error {
        use super::*;

        #[test]
        fn error_display_formatting() {
            let err = GitError::CasFailed {
                refname: "refs/tbd/state/main".into(),
                expected: "abc".into(),
                actual: "def".into(),
            };
            let msg = err.to_string();
            assert!(msg.contains("refs/tbd/state/main"));
            assert!(msg.contains("abc"));
            assert!(msg.contains("def"));

            let err = GitError::NotARepo {
                path: PathBuf::from("/tmp/x"),
            };
            assert!(err.to_string().contains("/tmp/x"));
        }

        #[test]
        fn type_errors_map_to_categories() {
            let err: GitError = TypeError::InvalidPath("bad".into()).into();
            assert!(matches!(err, GitError::InvalidPath { .. }));
            let err: GitError = TypeError::InvalidBranchName("bad".into()).into();
            assert!(matches!(err, GitError::InvalidRefName { .. }));
        }

        #[test]
        fn not_found_context_selects_variant() {
            let raw = git2::Error::new(
                git2::ErrorCode::NotFound,
                git2::ErrorClass::Reference,
                "missing",
            );
            assert!(matches!(
                GitError::from_git2(raw, "refs/heads/x"),
                GitError::RefNotFound { .. }
            ));
            let raw = git2::Error::new(
                git2::ErrorCode::NotFound,
                git2::ErrorClass::Odb,
                "missing",
            );
            assert!(matches!(
                GitError::from_git2(raw, "abc123"),
                GitError::ObjectNotFound { .. }
            ));
        }
    }

    #[test]
    fn index_entry_carries_path_and_mode() {
        let path = RepoPath::new("dir/file.txt").unwrap();
        let entry = TreeEntry {
            oid: Oid::new("a".repeat(40)).unwrap(),
            mode: MODE_EXECUTABLE,
        };
        let raw = index_entry(&path, &entry).unwrap();
        assert_eq!(raw.path, b"dir/file.txt".to_vec());
        assert_eq!(raw.mode, 0o100755);
        assert_eq!(raw.flags as usize, "dir/file.txt".len());
    }
}
