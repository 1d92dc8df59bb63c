//! history command - Show the commits of the current branch

use anyhow::Result;

use super::{verbosity, Repo};
use crate::engine::Context;
use crate::ui::output;

/// Show first-parent history, newest first.
pub fn history(ctx: &Context, limit: Option<usize>, verbose: bool) -> Result<()> {
    let repo = Repo::open(ctx)?;
    let commits = repo.engine().history(limit)?;
    let verbosity = verbosity(ctx);

    if commits.is_empty() {
        output::print("No commits yet", verbosity);
        return Ok(());
    }

    for info in &commits {
        if verbose {
            output::print(format!("commit {}", info.oid), verbosity);
            if info.parents.len() > 1 {
                let parents: Vec<&str> = info.parents.iter().map(output::format_oid).collect();
                output::print(format!("Merge: {}", parents.join(" ")), verbosity);
            }
            output::print("", verbosity);
            for line in info.message.lines() {
                output::print(format!("    {}", line), verbosity);
            }
            output::print("", verbosity);
        } else {
            output::print(
                format!("{} {}", output::format_oid(&info.oid), info.summary),
                verbosity,
            );
        }
    }
    Ok(())
}
