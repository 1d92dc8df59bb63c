//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--cwd <path>`: Run as if in that directory
//! - `--debug`: Enable debug logging
//! - `--interactive` / `--no-interactive`: Control prompts
//! - `--quiet` / `-q`: Minimal output

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// tbd - version control with explicit tracking, built on Git
#[derive(Parser, Debug)]
#[command(name = "tbd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run as if tbd was started in this directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output; implies --no-interactive
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable interactive prompts
    #[arg(long = "interactive", global = true, conflicts_with = "no_interactive")]
    pub interactive_flag: bool,

    /// Disable interactive prompts
    #[arg(long, global = true)]
    pub no_interactive: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    /// Interactive mode requested on the command line.
    ///
    /// `None` when no flag decides it; configuration and the terminal do.
    pub fn interactive(&self) -> Option<bool> {
        if self.interactive_flag {
            Some(true)
        } else if self.no_interactive || self.quiet {
            Some(false)
        } else {
            None
        }
    }
}

/// Shell for completion generation.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty repository
    #[command(
        long_about = "Create an empty repository.\n\n\
            Initializes a Git repository at PATH (the current directory by default) \
            with an unborn `main` branch and writes the default tbd configuration."
    )]
    Init {
        /// Directory to initialize
        path: Option<PathBuf>,
    },

    /// Start tracking changes to files
    #[command(
        long_about = "Start tracking changes to files.\n\n\
            Tracked files are committed by `tbd commit` without further arguments. \
            Files that are part of the branch's history are tracked unless untracked \
            explicitly. A directory stands for the files below it.",
        after_help = "\
EXAMPLES:
    tbd track notes.txt
    tbd track src/"
    )]
    Track {
        /// Files or directories to track
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },

    /// Stop tracking changes to files
    Untrack {
        /// Files or directories to untrack
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },

    /// Show the status of the repository
    Status,

    /// Show changes to tracked files
    #[command(
        long_about = "Show changes to tracked files.\n\n\
            Without paths, every tracked file that differs from the last commit \
            is shown. During a fuse or merge, files are compared with the tree \
            the operation left."
    )]
    Diff {
        /// Files or directories to diff
        #[arg(value_name = "PATH")]
        paths: Vec<PathBuf>,
    },

    /// Restore files from a commit
    #[command(
        long_about = "Restore files from a commit.\n\n\
            Overwrites the working-copy content of each file with its content \
            at COMMIT (HEAD by default). A directory stands for the files below it.",
        after_help = "\
EXAMPLES:
    tbd checkout notes.txt
    tbd checkout src/ --cp HEAD~2"
    )]
    Checkout {
        /// Files or directories to restore
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,

        /// Commit to restore from
        #[arg(long = "commit-point", visible_alias = "cp", value_name = "COMMIT")]
        commit_point: Option<String>,
    },

    /// Record changes in the local repository
    #[command(
        long_about = "Record changes in the local repository.\n\n\
            Without paths, every modified tracked file is committed. Paths given \
            directly replace that set; --include and --exclude adjust it.\n\n\
            During a fuse or merge, a commit seals the step whose conflicts were \
            resolved and lets the operation continue.",
        after_help = "\
EXAMPLES:
    tbd commit -m 'fix parser'
    tbd commit -m 'only docs' docs/
    tbd commit -m 'with new file' -i new.rs
    tbd commit -m 'not yet' -e wip.rs"
    )]
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: String,

        /// Commit only these files
        #[arg(value_name = "PATH")]
        only: Vec<PathBuf>,

        /// Also commit these files
        #[arg(short, long, num_args = 1.., value_name = "PATH")]
        include: Vec<PathBuf>,

        /// Leave these files out
        #[arg(short, long, num_args = 1.., value_name = "PATH")]
        exclude: Vec<PathBuf>,
    },

    /// List, create, delete or configure branches
    #[command(
        after_help = "\
EXAMPLES:
    tbd branch
    tbd branch -c feature
    tbd branch -c hotfix --divergent-point HEAD~2
    tbd branch -d old
    tbd branch --set-upstream main"
    )]
    Branch {
        /// Create a branch
        #[arg(short, long, value_name = "NAME")]
        create: Option<String>,

        /// Commit the new branch starts at (HEAD by default)
        #[arg(long, visible_alias = "dp", value_name = "COMMIT", requires = "create")]
        divergent_point: Option<String>,

        /// Delete branches
        #[arg(short, long, num_args = 1.., value_name = "NAME")]
        delete: Vec<String>,

        /// Delete even if commits would be lost
        #[arg(long, requires = "delete")]
        force: bool,

        /// Set the upstream of the current branch
        #[arg(long, value_name = "BRANCH", conflicts_with = "unset_upstream")]
        set_upstream: Option<String>,

        /// Unset the upstream of the current branch
        #[arg(long)]
        unset_upstream: bool,

        /// Show tips and upstreams
        #[arg(short, long)]
        verbose: bool,
    },

    /// List, create or delete tags
    #[command(
        after_help = "\
EXAMPLES:
    tbd tag
    tbd tag -c v1.0
    tbd tag -c v0.9 --commit HEAD~3
    tbd tag -d v0.9"
    )]
    Tag {
        /// Create a tag
        #[arg(short, long, value_name = "NAME", conflicts_with = "delete")]
        create: Option<String>,

        /// Commit the new tag points at (HEAD by default)
        #[arg(long, value_name = "COMMIT", requires = "create")]
        commit: Option<String>,

        /// Delete tags
        #[arg(short, long, num_args = 1.., value_name = "NAME")]
        delete: Vec<String>,
    },

    /// Switch branches
    #[command(
        long_about = "Switch branches.\n\n\
            Uncommitted changes stay with the branch they were made on and come \
            back when switching back to it, as does a pending fuse or merge. \
            --move-over carries the changes to the target branch instead."
    )]
    Switch {
        /// Branch to switch to
        branch: String,

        /// Move uncommitted changes to the target branch
        #[arg(short, long)]
        move_over: bool,
    },

    /// Fuse commits of another branch into the current branch
    #[command(
        long_about = "Fuse commits of another branch into the current branch.\n\n\
            Replays the commits of SRC (the upstream by default) that the current \
            branch doesn't have, oldest first. Each commit that conflicts stops the \
            fuse: fix the files, mark them with `tbd resolve` and `tbd commit`.",
        after_help = "\
EXAMPLES:
    tbd fuse main
    tbd fuse topic -o 1a2b3c4
    tbd fuse topic -e 1a2b3c4 5d6e7f8
    tbd fuse topic --insertion-point dp
    tbd fuse --abort"
    )]
    Fuse {
        /// Source branch
        src: Option<String>,

        /// Fuse only these commits
        #[arg(short, long, num_args = 1.., value_name = "COMMIT", conflicts_with = "exclude")]
        only: Vec<String>,

        /// Fuse every commit but these
        #[arg(short, long, num_args = 1.., value_name = "COMMIT")]
        exclude: Vec<String>,

        /// Where fused commits go: HEAD, dp (divergent point) or a commit
        #[arg(long, visible_alias = "ip", value_name = "COMMIT")]
        insertion_point: Option<String>,

        /// Abort the fuse in progress
        #[arg(short, long, conflicts_with_all = ["src", "continue_op"])]
        abort: bool,

        /// Resume an interrupted fuse
        #[arg(long = "continue", conflicts_with = "src")]
        continue_op: bool,
    },

    /// Merge another branch into the current branch
    Merge {
        /// Source branch
        src: Option<String>,

        /// Abort the merge in progress
        #[arg(short, long, conflicts_with = "src")]
        abort: bool,
    },

    /// Mark files with conflicts as resolved
    Resolve {
        /// Files to mark
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },

    /// Show the commit history of the current branch
    History {
        /// Show at most this many commits
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Show full messages and parents
        #[arg(short, long)]
        verbose: bool,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn commit_requires_message() {
        assert!(Cli::try_parse_from(["tbd", "commit"]).is_err());
        let cli = Cli::try_parse_from(["tbd", "commit", "-m", "msg", "a", "b", "-e", "c"]).unwrap();
        match cli.command {
            Command::Commit {
                message,
                only,
                exclude,
                ..
            } => {
                assert_eq!(message, "msg");
                assert_eq!(only.len(), 2);
                assert_eq!(exclude, vec![PathBuf::from("c")]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn fuse_flags() {
        let cli =
            Cli::try_parse_from(["tbd", "fuse", "topic", "-o", "abc1", "def2", "--ip", "dp"]).unwrap();
        match cli.command {
            Command::Fuse {
                src,
                only,
                insertion_point,
                ..
            } => {
                assert_eq!(src.as_deref(), Some("topic"));
                assert_eq!(only, vec!["abc1", "def2"]);
                assert_eq!(insertion_point.as_deref(), Some("dp"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(Cli::try_parse_from(["tbd", "fuse", "topic", "--abort"]).is_err());
        assert!(Cli::try_parse_from(["tbd", "fuse", "-o", "a", "-e", "b"]).is_err());
    }

    #[test]
    fn checkout_and_tag_flags() {
        let cli = Cli::try_parse_from(["tbd", "checkout", "a.txt", "--cp", "HEAD~1"]).unwrap();
        match cli.command {
            Command::Checkout {
                paths,
                commit_point,
            } => {
                assert_eq!(paths, vec![PathBuf::from("a.txt")]);
                assert_eq!(commit_point.as_deref(), Some("HEAD~1"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(Cli::try_parse_from(["tbd", "checkout"]).is_err());

        let cli = Cli::try_parse_from(["tbd", "tag", "-d", "t1", "t2"]).unwrap();
        match cli.command {
            Command::Tag { create, delete, .. } => {
                assert_eq!(create, None);
                assert_eq!(delete, vec!["t1", "t2"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(Cli::try_parse_from(["tbd", "tag", "--commit", "HEAD"]).is_err());
        assert!(Cli::try_parse_from(["tbd", "tag", "-c", "a", "-d", "b"]).is_err());
    }

    #[test]
    fn interactive_flags() {
        let cli = Cli::try_parse_from(["tbd", "-q", "status"]).unwrap();
        assert_eq!(cli.interactive(), Some(false));
        let cli = Cli::try_parse_from(["tbd", "status", "--interactive"]).unwrap();
        assert_eq!(cli.interactive(), Some(true));
        let cli = Cli::try_parse_from(["tbd", "status"]).unwrap();
        assert_eq!(cli.interactive(), None);
    }
}
