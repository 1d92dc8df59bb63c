//! diff command - Show changes to tracked files

use std::path::PathBuf;

use anyhow::Result;

use super::{verbosity, Repo};
use crate::engine::{Context, DiffBody, FileDiff};
use crate::ui::output;

/// Show how tracked files differ from the last commit.
pub fn diff(ctx: &Context, paths: &[PathBuf]) -> Result<()> {
    let repo = Repo::open(ctx)?;
    let paths = repo.repo_paths(paths)?;
    let diffs = repo.engine().diff(&paths)?;
    let verbosity = verbosity(ctx);

    if diffs.is_empty() {
        output::print("No files to diff", verbosity);
        return Ok(());
    }
    for diff in &diffs {
        output::print(format_diff(diff), verbosity);
    }
    Ok(())
}

fn format_diff(diff: &FileDiff) -> String {
    let mut out = format!("Diff of file \"{}\" ({})\n", diff.path, diff.change.label());
    if let Some((old, new)) = diff.mode_change {
        out.push_str(&format!("old mode {:o}\nnew mode {:o}\n", old, new));
    }
    match &diff.body {
        DiffBody::Text(patch) => out.push_str(patch),
        DiffBody::Binary => out.push_str("Binary files differ\n"),
    }
    out.trim_end_matches('\n').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RepoPath;
    use crate::engine::FileChange;

    #[test]
    fn diff_blocks() {
        let text = FileDiff {
            path: RepoPath::new("a.txt").unwrap(),
            change: FileChange::Modified,
            mode_change: None,
            body: DiffBody::Text("--- a/a.txt\n+++ b/a.txt\n@@ -1 +1 @@\n-x\n+y\n".into()),
        };
        assert_eq!(
            format_diff(&text),
            "Diff of file \"a.txt\" (modified)\n--- a/a.txt\n+++ b/a.txt\n@@ -1 +1 @@\n-x\n+y"
        );

        let binary = FileDiff {
            path: RepoPath::new("run").unwrap(),
            change: FileChange::Modified,
            mode_change: Some((0o100644, 0o100755)),
            body: DiffBody::Binary,
        };
        assert_eq!(
            format_diff(&binary),
            "Diff of file \"run\" (modified)\nold mode 100644\nnew mode 100755\nBinary files differ"
        );
    }
}
