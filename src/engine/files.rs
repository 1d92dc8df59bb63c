//! engine::files
//!
//! File-level operations against committed content: restoring files from a
//! commit and diffing tracked files against the reference tree.

use std::collections::BTreeSet;

use diffy::DiffOptions;
use tracing::{debug, info};

use super::status::FileChange;
use super::{expand_path, worktree, Engine, EngineError, Expansion, PathOutcome};
use crate::core::types::RepoPath;
use crate::git::{TreeEntries, Vcs};

/// Body of a [`FileDiff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffBody {
    /// Unified diff of the two texts, with `a/` and `b/` headers.
    Text(String),
    /// One side is not text.
    Binary,
}

/// How one tracked file differs from the reference tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    /// Path.
    pub path: RepoPath,
    /// Kind of change.
    pub change: FileChange,
    /// Old and new mode when the mode changed.
    pub mode_change: Option<(u32, u32)>,
    /// Content difference.
    pub body: DiffBody,
}

fn as_text(content: &[u8]) -> Option<&str> {
    if content.contains(&0) {
        return None;
    }
    std::str::from_utf8(content).ok()
}

fn render_patch(path: &RepoPath, change: FileChange, old: &str, new: &str) -> String {
    let mut options = DiffOptions::new();
    let original = match change {
        FileChange::Added => "/dev/null".to_string(),
        _ => format!("a/{}", path),
    };
    let modified = match change {
        FileChange::Deleted => "/dev/null".to_string(),
        _ => format!("b/{}", path),
    };
    options
        .set_original_filename(original)
        .set_modified_filename(modified);
    options.create_patch(old, new).to_string()
}

impl<'a, V: Vcs + ?Sized> Engine<'a, V> {
    /// Restore files from `revision` (HEAD by default) into the working
    /// copy. Directories expand to the files below them in that commit.
    ///
    /// Working-copy content of the restored files is overwritten; tracking
    /// is left alone.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidCommit`] if `revision` names no commit. A path
    /// missing from the commit fails on its own outcome.
    pub fn checkout_paths(
        &self,
        paths: &[RepoPath],
        revision: Option<&str>,
    ) -> Result<Vec<PathOutcome>, EngineError> {
        let revision = revision.unwrap_or("HEAD");
        let commit = self
            .vcs
            .resolve_revision(revision)?
            .ok_or_else(|| EngineError::InvalidCommit(revision.to_string()))?;
        let entries = worktree::commit_entries(self.vcs, Some(&commit))?;
        let nothing = BTreeSet::new();

        let mut outcomes = Vec::new();
        for path in paths {
            let files = match expand_path(path, &entries, &nothing) {
                Expansion::File(file) => vec![file],
                Expansion::Dir(files) => files,
                Expansion::Missing => {
                    outcomes.push(PathOutcome::failed(
                        path.clone(),
                        EngineError::FileNotFound(format!("{} at {}", path, revision)),
                    ));
                    continue;
                }
            };
            for file in files {
                let result = self.restore_file(&file, &entries);
                outcomes.push(match result {
                    Ok(()) => PathOutcome::ok(file),
                    Err(e) => PathOutcome::failed(file, e),
                });
            }
        }

        info!(
            commit = %commit.short(7),
            restored = outcomes.iter().filter(|o| o.result.is_ok()).count(),
            "checked out files"
        );
        Ok(outcomes)
    }

    fn restore_file(&self, path: &RepoPath, entries: &TreeEntries) -> Result<(), EngineError> {
        let entry = entries
            .get(path)
            .ok_or_else(|| EngineError::FileNotFound(path.to_string()))?;
        let content = self.vcs.read_blob(&entry.oid)?;
        self.vcs.write_work_file(path, &content, entry.mode)?;
        Ok(())
    }

    /// Diff tracked files against the reference tree: all modified tracked
    /// files, or those named by `paths`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::FileNotFound`] for a path that names nothing
    /// - [`EngineError::NotTracked`] for an untracked file
    pub fn diff(&self, paths: &[RepoPath]) -> Result<Vec<FileDiff>, EngineError> {
        let branch = self.current_branch()?;
        let state = self.states().load(&branch)?.state;
        let tip = self.branch_tip(&branch)?;
        let reference = self.reference_entries(&state, tip.as_ref())?;
        let record = self.tracking().load()?.record;
        let work = self.vcs.work_files()?;
        let tracked = record.tracked_paths(&reference, &work);

        let selected: BTreeSet<RepoPath> = if paths.is_empty() {
            tracked
        } else {
            let mut selected = BTreeSet::new();
            for path in paths {
                match expand_path(path, &reference, &work) {
                    Expansion::File(file) if tracked.contains(&file) => {
                        selected.insert(file);
                    }
                    Expansion::File(file) => return Err(EngineError::NotTracked(file)),
                    Expansion::Dir(files) => {
                        selected.extend(files.into_iter().filter(|f| tracked.contains(f)));
                    }
                    Expansion::Missing => {
                        return Err(EngineError::FileNotFound(path.to_string()))
                    }
                }
            }
            selected
        };

        let mut diffs = Vec::new();
        for path in selected {
            if !worktree::is_modified(self.vcs, &path, &reference)? {
                continue;
            }
            diffs.push(self.file_diff(path, &reference)?);
        }
        debug!(branch = %branch, files = diffs.len(), "diff");
        Ok(diffs)
    }

    fn file_diff(&self, path: RepoPath, reference: &TreeEntries) -> Result<FileDiff, EngineError> {
        let before = reference.get(&path);
        let old = match before {
            Some(entry) => self.vcs.read_blob(&entry.oid)?,
            None => Vec::new(),
        };
        let new = self.vcs.read_work_file(&path)?;
        let change = match (before, &new) {
            (None, _) => FileChange::Added,
            (Some(_), None) => FileChange::Deleted,
            (Some(_), Some(_)) => FileChange::Modified,
        };

        let mode_change = match (before, self.vcs.work_file_mode(&path)?) {
            (Some(entry), Some(mode)) if entry.mode != mode => Some((entry.mode, mode)),
            _ => None,
        };

        let new = new.unwrap_or_default();
        let body = match (as_text(&old), as_text(&new)) {
            (Some(old), Some(new)) => DiffBody::Text(render_patch(&path, change, old, new)),
            _ => DiffBody::Binary,
        };
        Ok(FileDiff {
            path,
            change,
            mode_change,
            body,
        })
    }
}
