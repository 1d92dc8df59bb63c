//! Integration tests for the command handlers.
//!
//! Each test builds a real repository with the `git` CLI, runs tbd command
//! handlers against it and inspects the result with `git` again.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use tbd::cli::commands::{self, BranchAction, TagAction};
use tbd::engine::{Context, EngineError};
use tbd::git::Git;

// =============================================================================
// Test Fixtures
// =============================================================================

/// Run a git command in the specified directory.
fn run_git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .expect("failed to run git");
    assert!(status.success(), "git {:?} failed", args);
}

/// Run a git command and return its trimmed stdout.
fn git_output(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(output.status.success(), "git {:?} failed", args);
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

/// Test fixture that creates a real git repository.
struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Create a new test repository with an initial commit on main.
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");

        run_git(dir.path(), &["init", "-b", "main"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "user.name", "Test User"]);

        std::fs::write(dir.path().join("README.md"), "# Test Repo\n").unwrap();
        run_git(dir.path(), &["add", "README.md"]);
        run_git(dir.path(), &["commit", "-m", "Initial commit"]);

        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn context(&self) -> Context {
        Context {
            cwd: Some(self.path().to_path_buf()),
            debug: false,
            quiet: true,
            interactive: Some(false),
        }
    }

    fn write(&self, file: &str, content: &str) {
        let path = self.path().join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn read(&self, file: &str) -> String {
        std::fs::read_to_string(self.path().join(file)).unwrap()
    }

    /// Commit a file with the git CLI. Only used before tbd touches the
    /// working copy.
    fn git_commit(&self, file: &str, content: &str, message: &str) {
        self.write(file, content);
        run_git(self.path(), &["add", file]);
        run_git(self.path(), &["commit", "-m", message]);
    }

    fn rev(&self, rev: &str) -> String {
        git_output(self.path(), &["rev-parse", rev])
    }

    fn subject(&self, rev: &str) -> String {
        git_output(self.path(), &["log", "-1", "--format=%s", rev])
    }

    fn show(&self, rev: &str, file: &str) -> String {
        git_output(self.path(), &["show", &format!("{}:{}", rev, file)])
    }

    /// Diverge main and feature on README.md.
    fn conflicting_branches(&self) {
        run_git(self.path(), &["checkout", "-q", "-b", "feature"]);
        self.git_commit("README.md", "feature\n", "feature change");
        run_git(self.path(), &["checkout", "-q", "main"]);
        self.git_commit("README.md", "main\n", "main change");
    }

    fn commit(&self, message: &str) -> anyhow::Result<()> {
        commands::commit(&self.context(), message, &[], &[], &[])
    }
}

fn paths(items: &[&str]) -> Vec<PathBuf> {
    items.iter().map(|s| PathBuf::from(*s)).collect()
}

fn engine_error(err: &anyhow::Error) -> &EngineError {
    err.downcast_ref::<EngineError>()
        .unwrap_or_else(|| panic!("not an engine error: {:#}", err))
}

// =============================================================================
// init
// =============================================================================

#[test]
fn init_creates_repository_once() {
    let dir = TempDir::new().unwrap();
    let ctx = Context {
        cwd: Some(dir.path().to_path_buf()),
        quiet: true,
        ..Context::default()
    };

    commands::init(&ctx, Some(Path::new("repo"))).unwrap();
    let repo = dir.path().join("repo");
    let git = Git::open(&repo).unwrap();
    assert!(git.git_dir().join("tbd/config.toml").exists());
    assert_eq!(git_output(&repo, &["symbolic-ref", "HEAD"]), "refs/heads/main");

    let err = commands::init(&ctx, Some(Path::new("repo"))).unwrap_err();
    assert!(matches!(engine_error(&err), EngineError::AlreadyARepo { .. }));
}

#[test]
fn commands_outside_a_repository_fail() {
    let dir = TempDir::new().unwrap();
    let ctx = Context {
        cwd: Some(dir.path().to_path_buf()),
        quiet: true,
        ..Context::default()
    };
    let err = commands::status(&ctx).unwrap_err();
    assert!(matches!(engine_error(&err), EngineError::NotInRepo { .. }));
}

// =============================================================================
// Tracking and commits
// =============================================================================

#[test]
fn tracked_files_are_committed_untracked_are_not() {
    let repo = TestRepo::new();
    let ctx = repo.context();
    repo.write("notes.txt", "notes\n");
    repo.write("scratch.txt", "scratch\n");
    repo.write("README.md", "# Changed\n");

    commands::track(&ctx, &paths(&["notes.txt"])).unwrap();
    repo.commit("add notes").unwrap();

    assert_eq!(repo.subject("main"), "add notes");
    assert_eq!(repo.show("main", "notes.txt"), "notes");
    assert_eq!(repo.show("main", "README.md"), "# Changed");
    let files = git_output(repo.path(), &["ls-tree", "--name-only", "main"]);
    assert!(!files.contains("scratch.txt"));
}

#[test]
fn tracking_twice_reports_failure() {
    let repo = TestRepo::new();
    let ctx = repo.context();
    repo.write("a.txt", "a\n");

    commands::track(&ctx, &paths(&["a.txt"])).unwrap();
    let err = commands::track(&ctx, &paths(&["a.txt", "missing.txt"])).unwrap_err();
    let failures = err.downcast_ref::<commands::PathFailures>().unwrap();
    assert_eq!(failures.failed, 2);
}

#[test]
fn untracked_file_stays_out_of_commits() {
    let repo = TestRepo::new();
    let ctx = repo.context();
    repo.git_commit("config.local", "v1\n", "add local config");
    repo.write("config.local", "v2\n");
    repo.write("README.md", "updated\n");

    commands::untrack(&ctx, &paths(&["config.local"])).unwrap();
    repo.commit("update readme").unwrap();

    assert_eq!(repo.show("main", "config.local"), "v1");
    assert_eq!(repo.show("main", "README.md"), "updated");
    assert_eq!(repo.read("config.local"), "v2\n");
}

#[test]
fn commit_with_nothing_to_commit_fails() {
    let repo = TestRepo::new();
    let err = repo.commit("empty").unwrap_err();
    assert!(matches!(engine_error(&err), EngineError::NothingToCommit));
}

#[test]
fn commit_only_and_exclude_select_paths() {
    let repo = TestRepo::new();
    let ctx = repo.context();
    repo.git_commit("a.txt", "a\n", "add a");
    repo.write("a.txt", "a2\n");
    repo.write("README.md", "readme2\n");

    commands::commit(&ctx, "only a", &paths(&["a.txt"]), &[], &[]).unwrap();
    assert_eq!(repo.show("main", "a.txt"), "a2");
    assert_eq!(repo.show("main", "README.md"), "# Test Repo");

    repo.write("a.txt", "a3\n");
    commands::commit(&ctx, "all but a", &[], &[], &paths(&["a.txt"])).unwrap();
    assert_eq!(repo.show("main", "a.txt"), "a2");
    assert_eq!(repo.show("main", "README.md"), "readme2");
}

#[test]
fn paths_resolve_against_the_working_directory() {
    let repo = TestRepo::new();
    repo.write("src/lib.rs", "fn main() {}\n");
    let ctx = Context {
        cwd: Some(repo.path().join("src")),
        ..repo.context()
    };

    commands::track(&ctx, &paths(&["lib.rs"])).unwrap();
    commands::commit(&ctx, "add lib", &[], &[], &[]).unwrap();
    assert_eq!(repo.show("main", "src/lib.rs"), "fn main() {}");
}

// =============================================================================
// Fuse and merge
// =============================================================================

#[test]
fn fuse_fast_forwards() {
    let repo = TestRepo::new();
    run_git(repo.path(), &["checkout", "-q", "-b", "feature"]);
    repo.git_commit("feature.txt", "f\n", "feature work");
    run_git(repo.path(), &["checkout", "-q", "main"]);

    commands::fuse(&repo.context(), Some("feature".into()), vec![], vec![], None).unwrap();

    assert_eq!(repo.rev("main"), repo.rev("feature"));
    assert_eq!(repo.read("feature.txt"), "f\n");
}

#[test]
fn fuse_replays_onto_divergent_branch() {
    let repo = TestRepo::new();
    run_git(repo.path(), &["checkout", "-q", "-b", "feature"]);
    repo.git_commit("one.txt", "1\n", "one");
    repo.git_commit("two.txt", "2\n", "two");
    run_git(repo.path(), &["checkout", "-q", "main"]);
    repo.git_commit("main.txt", "m\n", "main work");
    let main_tip = repo.rev("main");

    let one = repo.rev("feature~1");
    commands::fuse(&repo.context(), Some("feature".into()), vec![], vec![one], None).unwrap();

    assert_eq!(repo.subject("main"), "two");
    assert_eq!(repo.rev("main~1"), main_tip);
    assert!(!repo.path().join("one.txt").exists());
    assert_eq!(repo.read("two.txt"), "2\n");
}

#[test]
fn fuse_conflict_resolve_commit_cycle() {
    let repo = TestRepo::new();
    let ctx = repo.context();
    repo.conflicting_branches();
    let main_tip = repo.rev("main");

    let err = commands::fuse(&ctx, Some("feature".into()), vec![], vec![], None).unwrap_err();
    assert!(matches!(engine_error(&err), EngineError::Conflict { .. }));
    let content = repo.read("README.md");
    assert!(content.contains("<<<<<<< HEAD"));
    assert!(content.contains("main"));
    assert!(content.contains("feature"));
    assert_eq!(repo.rev("main"), main_tip);

    let err = repo.commit("too early").unwrap_err();
    assert!(matches!(engine_error(&err), EngineError::UnresolvedConflicts(_)));

    repo.write("README.md", "main and feature\n");
    commands::resolve(&ctx, &paths(&["README.md"])).unwrap();
    repo.commit("combine readme").unwrap();

    assert_eq!(repo.subject("main"), "combine readme");
    assert_eq!(repo.rev("main~1"), main_tip);
    assert_eq!(repo.show("main", "README.md"), "main and feature");
}

#[test]
fn each_conflicting_commit_needs_its_own_cycle() {
    let repo = TestRepo::new();
    let ctx = repo.context();
    run_git(repo.path(), &["checkout", "-q", "-b", "feature"]);
    repo.git_commit("README.md", "f1\n", "first feature change");
    repo.git_commit("README.md", "f2\n", "second feature change");
    run_git(repo.path(), &["checkout", "-q", "main"]);
    repo.git_commit("README.md", "main\n", "main change");
    let main_tip = repo.rev("main");

    let err = commands::fuse(&ctx, Some("feature".into()), vec![], vec![], None).unwrap_err();
    assert!(matches!(engine_error(&err), EngineError::Conflict { .. }));
    repo.write("README.md", "m1\n");
    commands::resolve(&ctx, &paths(&["README.md"])).unwrap();

    let err = repo.commit("first resolution").unwrap_err();
    assert!(matches!(engine_error(&err), EngineError::Conflict { .. }));
    assert_eq!(repo.rev("main"), main_tip);
    assert!(repo.read("README.md").contains("<<<<<<< HEAD"));

    repo.write("README.md", "m2\n");
    commands::resolve(&ctx, &paths(&["README.md"])).unwrap();
    repo.commit("second resolution").unwrap();

    assert_eq!(repo.subject("main"), "second resolution");
    assert_eq!(repo.subject("main~1"), "first resolution");
    assert_eq!(repo.rev("main~2"), main_tip);
    assert_eq!(repo.show("main~1", "README.md"), "m1");
    assert_eq!(repo.show("main", "README.md"), "m2");
}

#[test]
fn fuse_abort_restores_branch() {
    let repo = TestRepo::new();
    let ctx = repo.context();
    repo.conflicting_branches();
    let main_tip = repo.rev("main");

    commands::fuse(&ctx, Some("feature".into()), vec![], vec![], None).unwrap_err();
    commands::abort(&ctx).unwrap();

    assert_eq!(repo.rev("main"), main_tip);
    assert_eq!(repo.read("README.md"), "main\n");
    let err = commands::abort(&ctx).unwrap_err();
    assert!(matches!(engine_error(&err), EngineError::NoFuseInProgress(_)));
}

#[test]
fn fuse_without_source_uses_upstream() {
    let repo = TestRepo::new();
    let ctx = repo.context();
    let err = commands::fuse(&ctx, None, vec![], vec![], None).unwrap_err();
    assert!(matches!(engine_error(&err), EngineError::NoUpstream(_)));

    run_git(repo.path(), &["checkout", "-q", "-b", "feature"]);
    repo.git_commit("f.txt", "f\n", "feature");
    run_git(repo.path(), &["checkout", "-q", "main"]);

    commands::branch(&ctx, BranchAction::SetUpstream(Some("feature".into()))).unwrap();
    commands::fuse(&ctx, None, vec![], vec![], None).unwrap();
    assert_eq!(repo.rev("main"), repo.rev("feature"));
}

#[test]
fn merge_creates_two_parent_commit() {
    let repo = TestRepo::new();
    run_git(repo.path(), &["checkout", "-q", "-b", "feature"]);
    repo.git_commit("f.txt", "f\n", "feature");
    run_git(repo.path(), &["checkout", "-q", "main"]);
    repo.git_commit("m.txt", "m\n", "main");

    commands::merge(&repo.context(), Some("feature")).unwrap();

    let parents = git_output(repo.path(), &["rev-list", "--parents", "-n", "1", "main"]);
    assert_eq!(parents.split_whitespace().count(), 3);
    assert_eq!(repo.subject("main"), "Merge branch 'feature'");
    assert_eq!(repo.read("f.txt"), "f\n");
    assert_eq!(repo.read("m.txt"), "m\n");
}

#[test]
fn uncommitted_changes_conflict_after_the_last_resolution() {
    let repo = TestRepo::new();
    let ctx = repo.context();
    repo.git_commit("a.txt", "a\n", "add a");
    run_git(repo.path(), &["checkout", "-q", "-b", "feature"]);
    repo.git_commit("README.md", "f1\n", "will conflict 0");
    repo.write("a.txt", "feature a\n");
    run_git(repo.path(), &["add", "a.txt"]);
    repo.git_commit("README.md", "f2\n", "will conflict 1");
    run_git(repo.path(), &["checkout", "-q", "main"]);
    repo.git_commit("README.md", "main\n", "main change");
    repo.write("a.txt", "uncommitted\n");

    let err = commands::fuse(&ctx, Some("feature".into()), vec![], vec![], None).unwrap_err();
    assert!(matches!(engine_error(&err), EngineError::Conflict { .. }));
    repo.write("README.md", "m1\n");
    commands::resolve(&ctx, &paths(&["README.md"])).unwrap();
    let err = repo.commit("ci 0").unwrap_err();
    assert!(matches!(engine_error(&err), EngineError::Conflict { .. }));

    repo.write("README.md", "m2\n");
    commands::resolve(&ctx, &paths(&["README.md"])).unwrap();
    let err = repo.commit("ci 1").unwrap_err();
    assert!(format!("{:#}", err).contains("failed to apply"));
    assert!(matches!(engine_error(&err), EngineError::ApplyFailed { .. }));

    assert_eq!(repo.subject("main"), "ci 1");
    assert_eq!(repo.subject("main~1"), "ci 0");
    let content = repo.read("a.txt");
    assert!(content.contains("Stashed changes"));
    assert!(content.contains("uncommitted"));
    assert!(content.contains("feature a"));
    assert_eq!(
        git_output(repo.path(), &["rev-parse", "--verify", "-q", "refs/tbd/stash/main/fuse"]).len(),
        40
    );
}

#[test]
fn merge_with_conflicting_uncommitted_changes() {
    let repo = TestRepo::new();
    repo.git_commit("a.txt", "contents 1\n", "add a");
    run_git(repo.path(), &["checkout", "-q", "-b", "feature"]);
    repo.git_commit("a.txt", "contents 2\n", "change a");
    run_git(repo.path(), &["checkout", "-q", "main"]);
    repo.git_commit("m.txt", "m\n", "main");
    repo.write("a.txt", "uncommitted\n");

    let err = commands::merge(&repo.context(), Some("feature")).unwrap_err();
    assert!(format!("{:#}", err).contains("failed to apply"));
    assert!(matches!(engine_error(&err), EngineError::ApplyFailed { .. }));

    assert_eq!(repo.subject("main"), "Merge branch 'feature'");
    let content = repo.read("a.txt");
    assert!(content.contains("uncommitted"));
    assert!(content.contains("contents 2"));
}

// =============================================================================
// Branches
// =============================================================================

#[test]
fn switch_keeps_changes_with_their_branch() {
    let repo = TestRepo::new();
    let ctx = repo.context();
    commands::branch(
        &ctx,
        BranchAction::Create {
            name: "feature".into(),
            divergent_point: None,
        },
    )
    .unwrap();
    repo.write("README.md", "work in progress\n");

    commands::switch(&ctx, "feature", false).unwrap();
    assert_eq!(repo.read("README.md"), "# Test Repo\n");
    assert_eq!(git_output(repo.path(), &["symbolic-ref", "HEAD"]), "refs/heads/feature");

    commands::switch(&ctx, "main", false).unwrap();
    assert_eq!(repo.read("README.md"), "work in progress\n");
}

#[test]
fn switch_preserves_pending_fuse() {
    let repo = TestRepo::new();
    let ctx = repo.context();
    repo.conflicting_branches();

    commands::fuse(&ctx, Some("feature".into()), vec![], vec![], None).unwrap_err();
    commands::switch(&ctx, "feature", false).unwrap();
    assert_eq!(repo.read("README.md"), "feature\n");

    commands::switch(&ctx, "main", false).unwrap();
    assert!(repo.read("README.md").contains("<<<<<<< HEAD"));
    repo.write("README.md", "settled\n");
    commands::resolve(&ctx, &paths(&["README.md"])).unwrap();
    repo.commit("settle").unwrap();
    assert_eq!(repo.show("main", "README.md"), "settled");
}

#[test]
fn branch_delete_requires_force_for_unmerged_work() {
    let repo = TestRepo::new();
    let ctx = repo.context();
    run_git(repo.path(), &["checkout", "-q", "-b", "feature"]);
    repo.git_commit("f.txt", "f\n", "feature");
    run_git(repo.path(), &["checkout", "-q", "main"]);

    let delete = |force| BranchAction::Delete {
        names: vec!["feature".into()],
        force,
    };
    commands::branch(&ctx, delete(false)).unwrap_err();
    commands::branch(&ctx, delete(true)).unwrap();
    let branches = git_output(repo.path(), &["branch", "--list", "feature"]);
    assert!(branches.is_empty());
}

#[test]
fn history_lists_commits() {
    let repo = TestRepo::new();
    repo.git_commit("a.txt", "a\n", "second");
    commands::history(&repo.context(), Some(1), false).unwrap();
    commands::history(&repo.context(), None, true).unwrap();
}

#[test]
fn checkout_restores_files_from_a_commit_point() {
    let repo = TestRepo::new();
    let ctx = repo.context();
    repo.git_commit("README.md", "second\n", "second");
    repo.write("README.md", "scratch\n");

    commands::checkout(&ctx, &paths(&["README.md"]), Some("HEAD~1")).unwrap();
    assert_eq!(repo.read("README.md"), "# Test Repo\n");
    commands::checkout(&ctx, &paths(&["README.md"]), None).unwrap();
    assert_eq!(repo.read("README.md"), "second\n");

    let err = commands::checkout(&ctx, &paths(&["README.md"]), Some("nope")).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::InvalidCommit(_))
    ));
}

#[test]
fn tag_create_and_delete() {
    let repo = TestRepo::new();
    let ctx = repo.context();
    let head = repo.rev("HEAD");

    commands::tag(
        &ctx,
        TagAction::Create {
            name: "v1".into(),
            commit: None,
        },
    )
    .unwrap();
    assert_eq!(repo.rev("v1"), head);
    commands::tag(&ctx, TagAction::List).unwrap();

    let err = commands::tag(
        &ctx,
        TagAction::Create {
            name: "v1".into(),
            commit: None,
        },
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::TagExists(_))
    ));

    commands::tag(
        &ctx,
        TagAction::Delete {
            names: vec!["v1".into()],
        },
    )
    .unwrap();
    assert!(git_output(repo.path(), &["tag", "--list"]).is_empty());
    commands::tag(
        &ctx,
        TagAction::Delete {
            names: vec!["v1".into()],
        },
    )
    .unwrap_err();
}

#[test]
fn diff_rejects_missing_paths() {
    let repo = TestRepo::new();
    let ctx = repo.context();
    commands::diff(&ctx, &[]).unwrap();
    repo.write("README.md", "changed\n");
    commands::diff(&ctx, &paths(&["README.md"])).unwrap();

    let err = commands::diff(&ctx, &paths(&["file"])).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::FileNotFound(_))
    ));
}
