//! End-to-end tests of the `tbd` binary: output, exit codes and a full
//! fuse cycle driven through the command line.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn tbd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tbd").unwrap();
    cmd.current_dir(dir)
        .env_remove("TBD_CONFIG")
        .env_remove("TBD_LOG")
        .arg("--no-interactive");
    cmd
}

/// A repository created by `tbd init` with one committed file.
fn repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    tbd(dir.path()).arg("init").assert().success();
    git(dir.path(), &["config", "user.email", "test@example.com"]);
    git(dir.path(), &["config", "user.name", "Test User"]);
    std::fs::write(dir.path().join("a.txt"), "base\n").unwrap();
    tbd(dir.path()).args(["track", "a.txt"]).assert().success();
    tbd(dir.path())
        .args(["commit", "-m", "base"])
        .assert()
        .success();
    dir
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(output.status.success(), "git {:?} failed", args);
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

#[test]
fn help_flag_works() {
    let dir = TempDir::new().unwrap();
    tbd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("fuse"));
}

#[test]
fn unknown_flag_exits_with_usage_error() {
    let dir = TempDir::new().unwrap();
    tbd(dir.path()).args(["commit", "--bogus"]).assert().code(2);
}

#[test]
fn outside_a_repository_exits_4_with_hint() {
    let dir = TempDir::new().unwrap();
    tbd(dir.path())
        .arg("status")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("not in a tbd repository"))
        .stderr(predicate::str::contains("tbd init"));
}

#[test]
fn init_then_status() {
    let dir = TempDir::new().unwrap();
    tbd(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized empty tbd repository"));
    tbd(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("On branch main, no commits yet"));
    tbd(dir.path()).arg("init").assert().code(1);
}

#[test]
fn track_reports_each_path() {
    let dir = repo();
    std::fs::write(dir.path().join("b.txt"), "b\n").unwrap();
    tbd(dir.path())
        .args(["track", "b.txt", "ghost.txt"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("The file b.txt is now a tracked file"))
        .stderr(predicate::str::contains("ghost.txt doesn't exist"));
}

#[test]
fn status_lists_changes() {
    let dir = repo();
    std::fs::write(dir.path().join("a.txt"), "changed\n").unwrap();
    std::fs::write(dir.path().join("new.txt"), "new\n").unwrap();
    tbd(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("modified: a.txt"))
        .stdout(predicate::str::contains("Untracked files:"))
        .stdout(predicate::str::contains("new.txt"));
}

#[test]
fn fuse_conflict_cycle() {
    let dir = repo();
    let path = dir.path();
    tbd(path).args(["branch", "-c", "topic"]).assert().success();
    std::fs::write(path.join("a.txt"), "main\n").unwrap();
    tbd(path).args(["commit", "-m", "main side"]).assert().success();

    tbd(path).args(["switch", "topic"]).assert().success();
    std::fs::write(path.join("a.txt"), "topic\n").unwrap();
    tbd(path).args(["commit", "-m", "topic side"]).assert().success();
    tbd(path).args(["switch", "main"]).assert().success();

    tbd(path)
        .args(["fuse", "topic"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("conflicts while applying"))
        .stderr(predicate::str::contains("tbd resolve"));
    tbd(path)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Fuse of topic in progress"))
        .stdout(predicate::str::contains("conflicted: a.txt"));
    tbd(path)
        .args(["commit", "-m", "early"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unresolved conflicts in a.txt"));

    std::fs::write(path.join("a.txt"), "both\n").unwrap();
    tbd(path)
        .args(["resolve", "a.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("File a.txt marked as resolved"));
    tbd(path)
        .args(["commit", "-m", "both sides"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Finished fuse of topic into main"));

    assert_eq!(git(path, &["log", "-1", "--format=%s", "main"]), "both sides");
    assert_eq!(git(path, &["show", "main:a.txt"]), "both");
    tbd(path)
        .args(["history", "-n", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("both sides"))
        .stdout(predicate::str::contains("main side"));
}

#[test]
fn fuse_abort_via_cli() {
    let dir = repo();
    let path = dir.path();
    tbd(path).args(["branch", "-c", "topic"]).assert().success();
    std::fs::write(path.join("a.txt"), "main\n").unwrap();
    tbd(path).args(["commit", "-m", "main side"]).assert().success();
    tbd(path).args(["switch", "topic"]).assert().success();
    std::fs::write(path.join("a.txt"), "topic\n").unwrap();
    tbd(path).args(["commit", "-m", "topic side"]).assert().success();
    tbd(path).args(["switch", "main"]).assert().success();

    tbd(path).args(["fuse", "topic"]).assert().code(1);
    tbd(path)
        .args(["fuse", "--abort"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Aborted fuse of topic"));
    assert_eq!(std::fs::read_to_string(path.join("a.txt")).unwrap(), "main\n");
}

#[test]
fn branch_listing_marks_current() {
    let dir = repo();
    tbd(dir.path()).args(["branch", "-c", "topic"]).assert().success();
    tbd(dir.path())
        .arg("branch")
        .assert()
        .success()
        .stdout(predicate::str::contains("* main"))
        .stdout(predicate::str::contains("  topic"));
}

#[test]
fn completion_generates_script() {
    let dir = TempDir::new().unwrap();
    tbd(dir.path())
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tbd"));
}

#[test]
fn diff_shows_tracked_changes() {
    let dir = repo();
    tbd(dir.path())
        .arg("diff")
        .assert()
        .success()
        .stdout(predicate::str::contains("No files to diff"));
    tbd(dir.path())
        .args(["diff", "file"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("doesn't exist"));

    std::fs::write(dir.path().join("a.txt"), "contents\n").unwrap();
    let all = tbd(dir.path()).arg("diff").assert().success();
    let one = tbd(dir.path()).args(["diff", "a.txt"]).assert().success();
    let all = String::from_utf8(all.get_output().stdout.clone()).unwrap();
    let one = String::from_utf8(one.get_output().stdout.clone()).unwrap();
    assert!(all.contains("+contents"));
    assert_eq!(all, one);
}

#[test]
fn tags_are_created_listed_and_deleted() {
    let dir = repo();
    tbd(dir.path()).args(["tag", "-c", "tag2"]).assert().success();
    tbd(dir.path()).args(["tag", "-c", "tag1"]).assert().success();
    tbd(dir.path())
        .args(["tag", "-c", "tag1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("tag tag1 already exists"));
    tbd(dir.path())
        .args(["tag", "-c", "evil*named*tag"])
        .assert()
        .code(1);

    let listed = tbd(dir.path()).arg("tag").assert().success();
    let listed = String::from_utf8(listed.get_output().stdout.clone()).unwrap();
    let (first, second) = (listed.find("tag1").unwrap(), listed.find("tag2").unwrap());
    assert!(first < second);
    assert_eq!(git(dir.path(), &["tag", "--list"]), "tag1\ntag2");

    tbd(dir.path()).args(["tag", "-d", "tag1"]).assert().success();
    tbd(dir.path())
        .arg("tag")
        .assert()
        .success()
        .stdout(predicate::str::contains("tag1").not());
}

#[test]
fn checkout_restores_committed_content() {
    let dir = repo();
    std::fs::write(dir.path().join("a.txt"), "second\n").unwrap();
    tbd(dir.path())
        .args(["commit", "-m", "second"])
        .assert()
        .success();
    std::fs::write(dir.path().join("a.txt"), "scratch\n").unwrap();

    tbd(dir.path())
        .args(["checkout", "a.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("File a.txt checked out from HEAD"));
    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "second\n");

    tbd(dir.path())
        .args(["checkout", "a.txt", "--cp", "HEAD~1"])
        .assert()
        .success();
    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "base\n");

    tbd(dir.path())
        .args(["checkout", "ghost.txt"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ghost.txt at HEAD doesn't exist"));
}
