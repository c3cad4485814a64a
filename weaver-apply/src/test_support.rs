//! Test-only helpers for throwaway git repositories.

use std::path::Path;
use std::process::Command;

/// Run git in `dir`, panicking with stderr on failure. Returns stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Initialize a repository on `main` with a local identity and one commit
/// containing `README.md`.
pub fn init_repo(dir: &Path) {
    git(dir, &["init", "-q"]);
    git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(dir, &["config", "user.email", "weaver@example.com"]);
    git(dir, &["config", "user.name", "Weaver Tests"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
    std::fs::write(dir.join("README.md"), "# fixture\n").expect("write README");
    commit_all(dir, "initial");
}

/// Stage everything and commit.
pub fn commit_all(dir: &Path, message: &str) {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", message]);
}

/// Local branch names, sorted.
pub fn branches(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = git(dir, &["branch", "--format=%(refname:short)"])
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    names.sort();
    names
}
