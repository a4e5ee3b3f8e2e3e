use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::Path;
use std::process::Command;

use asat_core::{ChangeKind, GitContext, GitError, GitWorkingCopy};
use tempfile::tempdir;

#[test]
fn head_commit_hash_matches_expected_sha_in_git_repo() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();

    fs::write(workspace.join("pom.xml"), "<project/>\n")?;
    init_git_repo(workspace)?;
    let expected = commit_all(workspace, "initial commit")?.to_ascii_lowercase();

    let context = GitContext::open(workspace)?;
    assert_eq!(context.head_commit_hash()?, expected);
    assert_eq!(context.resolve_revision("HEAD")?, expected);
    Ok(())
}

#[test]
fn non_git_workspace_is_rejected() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    assert!(GitContext::open(temp.path()).is_err());
    Ok(())
}

#[test]
fn reachable_revisions_carry_parents_and_timestamps() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;

    fs::write(workspace.join("a.txt"), "one\n")?;
    let first = commit_all_at(workspace, "first", "2020-01-01T00:00:00Z")?;
    fs::write(workspace.join("a.txt"), "two\n")?;
    let second = commit_all_at(workspace, "second", "2020-01-02T00:00:00Z")?;

    let context = GitContext::open(workspace)?;
    let revisions = context.revisions_reachable_from(&second)?;
    let by_hash: BTreeMap<_, _> = revisions
        .into_iter()
        .map(|revision| (revision.hash.clone(), revision))
        .collect();

    assert_eq!(by_hash.len(), 2);
    let root = by_hash.get(&first).ok_or("first commit missing")?;
    assert!(root.is_origin());
    let tip = by_hash.get(&second).ok_or("second commit missing")?;
    assert_eq!(tip.parents, vec![first.clone()]);
    assert_eq!(tip.timestamp - root.timestamp, 24 * 60 * 60);
    Ok(())
}

#[test]
fn changed_paths_report_modifications_and_renames() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;

    fs::create_dir_all(workspace.join("src"))?;
    fs::write(workspace.join("src/A.java"), "class A {}\n")?;
    fs::write(
        workspace.join("src/B.java"),
        "class B {\n  int a;\n  int b;\n  int c;\n}\n",
    )?;
    let first = commit_all(workspace, "first")?;

    fs::write(workspace.join("src/A.java"), "class A { int x; }\n")?;
    run_git(workspace, &["mv", "src/B.java", "src/C.java"])?;
    let second = commit_all(workspace, "second")?;

    let working_copy = GitWorkingCopy::new(workspace);
    let changes = working_copy.changed_paths(Some(&first), &second)?;

    let modified = changes
        .iter()
        .find(|change| change.path == "src/A.java")
        .ok_or("modification missing")?;
    assert_eq!(modified.kind, ChangeKind::Modified);
    assert_eq!(modified.previous_path(), "src/A.java");

    let renamed = changes
        .iter()
        .find(|change| change.path == "src/C.java")
        .ok_or("rename missing")?;
    assert_eq!(renamed.kind, ChangeKind::Renamed);
    assert_eq!(renamed.previous_path(), "src/B.java");

    let root_changes = working_copy.changed_paths(None, &first)?;
    assert!(
        root_changes
            .iter()
            .all(|change| change.kind == ChangeKind::Added)
    );
    assert_eq!(root_changes.len(), 2);
    Ok(())
}

#[test]
fn checkout_session_restores_branch_and_removes_created_files() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;

    fs::write(workspace.join("pom.xml"), "<project>1</project>\n")?;
    let first = commit_all(workspace, "first")?;
    fs::write(workspace.join("pom.xml"), "<project>2</project>\n")?;
    let second = commit_all(workspace, "second")?;

    let working_copy = GitWorkingCopy::new(workspace);
    {
        let mut session = working_copy.checkout(&first)?;
        assert_eq!(
            fs::read_to_string(workspace.join("pom.xml"))?,
            "<project>1</project>\n"
        );
        fs::write(workspace.join("pom.xml"), "<project>edited</project>\n")?;
        fs::write(workspace.join("scratch.xml"), "<x/>\n")?;
        session.track_created(workspace.join("scratch.xml"));
    }

    assert_eq!(run_git(workspace, &["rev-parse", "HEAD"])?, second);
    assert_eq!(
        fs::read_to_string(workspace.join("pom.xml"))?,
        "<project>2</project>\n"
    );
    assert!(!workspace.join("scratch.xml").exists());

    let session = working_copy.checkout(&first)?;
    session.finish()?;
    assert_eq!(run_git(workspace, &["rev-parse", "HEAD"])?, second);
    Ok(())
}

#[test]
fn checkout_refuses_uncommitted_tracked_edits() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;

    fs::write(workspace.join("Notes.java"), "class A {}\n")?;
    let first = commit_all(workspace, "first")?;
    fs::write(workspace.join("Notes.java"), "class A { int precious; }\n")?;
    fs::write(workspace.join("untracked.txt"), "scratch\n")?;

    let working_copy = GitWorkingCopy::new(workspace);
    let err = match working_copy.checkout(&first) {
        Ok(_) => return Err("checkout should refuse a dirty working copy".into()),
        Err(err) => err,
    };
    assert!(matches!(err, GitError::DirtyWorkingCopy { ref paths, .. } if paths == "Notes.java"));
    assert_eq!(
        fs::read_to_string(workspace.join("Notes.java"))?,
        "class A { int precious; }\n"
    );

    run_git(workspace, &["checkout", "--", "Notes.java"])?;
    working_copy.ensure_clean()?;
    working_copy.checkout(&first)?.finish()?;
    assert!(workspace.join("untracked.txt").exists());
    Ok(())
}

fn run_git(workspace: &Path, args: &[&str]) -> Result<String, Box<dyn Error>> {
    let output = Command::new("git")
        .args(args)
        .current_dir(workspace)
        .output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("git {:?} failed: {}", args, stderr.trim()).into());
    }

    Ok(String::from_utf8(output.stdout)?.trim().to_owned())
}

fn init_git_repo(workspace: &Path) -> Result<(), Box<dyn Error>> {
    run_git(workspace, &["init"])?;
    run_git(workspace, &["config", "user.name", "Asat Test"])?;
    run_git(workspace, &["config", "user.email", "asat-test@example.com"])?;
    Ok(())
}

fn commit_all(workspace: &Path, message: &str) -> Result<String, Box<dyn Error>> {
    run_git(workspace, &["add", "."])?;
    run_git(workspace, &["commit", "-m", message])?;
    run_git(workspace, &["rev-parse", "--verify", "HEAD"])
}

fn commit_all_at(workspace: &Path, message: &str, date: &str) -> Result<String, Box<dyn Error>> {
    run_git(workspace, &["add", "."])?;

    let output = Command::new("git")
        .env("GIT_AUTHOR_DATE", date)
        .env("GIT_COMMITTER_DATE", date)
        .args(["commit", "-m", message])
        .current_dir(workspace)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("git commit failed: {}", stderr.trim()).into());
    }

    run_git(workspace, &["rev-parse", "--verify", "HEAD"])
}
