//! git::merge
//!
//! Content-level three-way merging shared by both engines.
//!
//! Uses the `diffy` crate for line-based merges. The git2 engine only calls
//! [`merge_blobs`] to render conflicting files (git2 decides *which* paths
//! conflict); the mock engine merges whole trees with
//! [`merge_tree_entries`].

use std::collections::BTreeSet;

use tracing::debug;

use super::traits::{MergeLabels, TreeEntries, TreeEntry, Vcs};
use super::GitError;
use crate::core::types::RepoPath;

/// Outcome of merging one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobMerge {
    /// Merged content; `None` means the file is deleted.
    Clean(Option<Vec<u8>>),
    /// Content to leave in the working copy, with conflict markers where
    /// both sides could be rendered as text.
    Conflict(Vec<u8>),
}

/// Merge three versions of a file. Absent versions are `None`.
pub fn merge_blobs(
    base: Option<&[u8]>,
    ours: Option<&[u8]>,
    theirs: Option<&[u8]>,
    labels: &MergeLabels<'_>,
) -> BlobMerge {
    if ours == theirs {
        return BlobMerge::Clean(ours.map(<[u8]>::to_vec));
    }
    if base == ours {
        return BlobMerge::Clean(theirs.map(<[u8]>::to_vec));
    }
    if base == theirs {
        return BlobMerge::Clean(ours.map(<[u8]>::to_vec));
    }

    let (ours, theirs) = match (ours, theirs) {
        (Some(ours), Some(theirs)) => (ours, theirs),
        // Modified on one side, deleted on the other: keep what survives.
        (Some(present), None) | (None, Some(present)) => {
            return BlobMerge::Conflict(present.to_vec())
        }
        (None, None) => return BlobMerge::Clean(None),
    };

    let texts = (
        std::str::from_utf8(base.unwrap_or_default()),
        std::str::from_utf8(ours),
        std::str::from_utf8(theirs),
    );
    let (base_text, ours_text, theirs_text) = match texts {
        (Ok(b), Ok(o), Ok(t)) => (b, o, t),
        _ => {
            debug!("binary content differs on both sides");
            return BlobMerge::Conflict(ours.to_vec());
        }
    };

    let markers = marker_len([base_text, ours_text, theirs_text]);
    match line_merge(base_text, ours_text, theirs_text, markers) {
        Ok(merged) => BlobMerge::Clean(Some(merged.into_bytes())),
        Err(_) => {
            // Render again with every side newline-terminated so markers
            // start on their own line.
            let rendered = match line_merge(
                &terminated(base_text),
                &terminated(ours_text),
                &terminated(theirs_text),
                markers,
            ) {
                Ok(merged) | Err(merged) => merged,
            };
            BlobMerge::Conflict(relabel(&rendered, labels, markers).into_bytes())
        }
    }
}

const DEFAULT_MARKER_LEN: usize = 7;

/// Length of the conflict markers to render: the default, or one longer
/// than any marker-like run already starting a line of the inputs, so that
/// markers left in committed content are never mistaken for new ones.
fn marker_len(texts: [&str; 3]) -> usize {
    let mut len = DEFAULT_MARKER_LEN;
    for line in texts.iter().flat_map(|text| text.lines()) {
        let Some(first) = line.chars().next() else {
            continue;
        };
        if matches!(first, '<' | '=' | '>') {
            let run = line.chars().take_while(|c| *c == first).count();
            if run >= len {
                len = run + 1;
            }
        }
    }
    len
}

fn line_merge(base: &str, ours: &str, theirs: &str, markers: usize) -> Result<String, String> {
    diffy::MergeOptions::new()
        .set_conflict_style(diffy::ConflictStyle::Merge)
        .set_conflict_marker_length(markers)
        .merge(base, ours, theirs)
}

fn terminated(text: &str) -> String {
    if text.is_empty() || text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{text}\n")
    }
}

/// Replace the generic labels of the markers diffy rendered at length
/// `markers`. Other lines pass through untouched.
fn relabel(rendered: &str, labels: &MergeLabels<'_>, markers: usize) -> String {
    let ours_marker = format!("{} ours", "<".repeat(markers));
    let theirs_marker = format!("{} theirs", ">".repeat(markers));
    let mut out = String::with_capacity(rendered.len());
    for line in rendered.split_inclusive('\n') {
        let (body, newline) = match line.strip_suffix('\n') {
            Some(body) => (body, "\n"),
            None => (line, ""),
        };
        if body == ours_marker {
            out.push_str(&format!("{} {}{newline}", "<".repeat(markers), labels.ours));
        } else if body == theirs_marker {
            out.push_str(&format!("{} {}{newline}", ">".repeat(markers), labels.theirs));
        } else {
            out.push_str(line);
        }
    }
    out
}

/// Mode of a merged entry: a side that changed the mode wins.
fn merged_mode(base: Option<&TreeEntry>, ours: Option<&TreeEntry>, theirs: Option<&TreeEntry>) -> u32 {
    match (ours, theirs) {
        (Some(o), Some(t)) if base.map(|b| b.mode) == Some(o.mode) => t.mode,
        (Some(o), _) => o.mode,
        (None, Some(t)) => t.mode,
        (None, None) => super::traits::MODE_FILE,
    }
}

/// Merge flattened trees path by path.
///
/// Returns the merged entries and the set of conflicting paths. Conflicting
/// files are present in the result with their rendered content.
pub fn merge_tree_entries<V: Vcs + ?Sized>(
    vcs: &V,
    base: &TreeEntries,
    ours: &TreeEntries,
    theirs: &TreeEntries,
    labels: &MergeLabels<'_>,
) -> Result<(TreeEntries, BTreeSet<RepoPath>), GitError> {
    let paths: BTreeSet<&RepoPath> = base.keys().chain(ours.keys()).chain(theirs.keys()).collect();

    let mut merged = TreeEntries::new();
    let mut conflicts = BTreeSet::new();

    for path in paths {
        let (b, o, t) = (base.get(path), ours.get(path), theirs.get(path));

        // Same blob on both sides, or only one side touched it.
        let same = |x: Option<&TreeEntry>, y: Option<&TreeEntry>| x.map(|e| &e.oid) == y.map(|e| &e.oid);
        if same(o, t) || same(b, t) {
            if let Some(entry) = o {
                merged.insert(path.clone(), entry.clone());
            }
            continue;
        }
        if same(b, o) {
            if let Some(entry) = t {
                merged.insert(path.clone(), entry.clone());
            }
            continue;
        }

        let read = |entry: Option<&TreeEntry>| -> Result<Option<Vec<u8>>, GitError> {
            entry.map(|e| vcs.read_blob(&e.oid)).transpose()
        };
        let (bc, oc, tc) = (read(b)?, read(o)?, read(t)?);
        let mode = merged_mode(b, o, t);

        match merge_blobs(bc.as_deref(), oc.as_deref(), tc.as_deref(), labels) {
            BlobMerge::Clean(Some(content)) => {
                let oid = vcs.write_blob(&content)?;
                merged.insert(path.clone(), TreeEntry { oid, mode });
            }
            BlobMerge::Clean(None) => {}
            BlobMerge::Conflict(content) => {
                let oid = vcs.write_blob(&content)?;
                merged.insert(path.clone(), TreeEntry { oid, mode });
                conflicts.insert(path.clone());
            }
        }
    }

    Ok((merged, conflicts))
}
