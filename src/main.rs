//! tbd binary entry point.

use std::process::ExitCode;

use tbd::cli;
use tbd::cli::commands::PathFailures;
use tbd::core::config::ConfigError;
use tbd::engine::error::{EXIT_ERRORS_FOUND, EXIT_INTERNAL_ERROR};
use tbd::engine::EngineError;
use tbd::ui::output;

fn main() -> ExitCode {
    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => ExitCode::from(report(&err) as u8),
    }
}

/// Print `err` and pick the exit code.
fn report(err: &anyhow::Error) -> i32 {
    if let Some(engine_err) = err.chain().find_map(|e| e.downcast_ref::<EngineError>()) {
        if engine_err.is_internal() {
            eprintln!("internal error: {:#}", err);
        } else {
            output::error(format!("{:#}", err));
        }
        if let Some(hint) = hint_for(engine_err) {
            eprintln!("hint: {}", hint);
        }
        return engine_err.exit_code();
    }
    if err.downcast_ref::<PathFailures>().is_some() {
        // Each failed path was printed as it happened.
        return EXIT_ERRORS_FOUND;
    }
    if err.chain().any(|e| e.is::<ConfigError>()) {
        output::error(format!("{:#}", err));
        return EXIT_ERRORS_FOUND;
    }
    eprintln!("internal error: {:#}", err);
    EXIT_INTERNAL_ERROR
}

fn hint_for(err: &EngineError) -> Option<&'static str> {
    match err {
        EngineError::NotInRepo { .. } => Some("run `tbd init` to create a repository"),
        EngineError::Conflict { .. } => Some(
            "fix the conflicts, mark the files with `tbd resolve` and `tbd commit`, \
             or give up with `--abort`",
        ),
        EngineError::UnresolvedConflicts(_) => Some("mark fixed files with `tbd resolve`"),
        EngineError::NoUpstream(_) => {
            Some("name a source branch or set one with `tbd branch --set-upstream`")
        }
        EngineError::UnmergedBranch { .. } => Some("use `--force` to delete it anyway"),
        _ => None,
    }
}
