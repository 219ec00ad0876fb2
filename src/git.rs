//! Thin wrapper over the `git` CLI: `is_git_repo`, `pull`, `create_worktree`,
//! `remove_worktree`, extended with the rest of the `GitService` contract (§6): repo root,
//! current branch, worktree listing, and merge operations, plus a `GitService`
//! trait so the factory/merge coordinator can be exercised against a fake in
//! tests, matching §6's explicit "collaborator contract" framing.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git command failed: {0}")]
    CommandFailed(String),
    #[error("failed to spawn git: {0}")]
    Io(#[from] std::io::Error),
}

fn run(args: &[&str], cwd: &Path) -> Result<String, GitError> {
    let output = Command::new("git").args(args).current_dir(cwd).output()?;
    if !output.status.success() {
        return Err(GitError::CommandFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn run_ok(args: &[&str], cwd: &Path) -> bool {
    Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Narrow collaborator contract consumed by the worktree factory and merge
/// coordinator (§6). The default implementation (`RealGitService`) shells out
/// to `git`; tests may substitute a fake.
pub trait GitService {
    fn get_repo_root(&self, path: &Path) -> Result<PathBuf, GitError>;
    fn get_current_branch(&self, path: &Path) -> Result<String, GitError>;
    fn create_worktree(&self, repo_path: &Path, branch: &str, worktree_path: &Path) -> Result<(), GitError>;
    fn remove_worktree(&self, repo_path: &Path, worktree_path: &Path) -> Result<(), GitError>;
    fn list_worktrees(&self, repo_path: &Path) -> Result<Vec<PathBuf>, GitError>;
    fn merge(&self, repo_path: &Path, branch: &str) -> Result<MergeOutcome, GitError>;
    /// Re-runs the merge with `-X ours`, so conflicting hunks resolve in
    /// favor of the tree already on `HEAD` rather than `branch`. Used by the
    /// `preferPrimary` conflict strategy once a plain `merge` has reported
    /// `Conflict` and aborted back to a clean tree.
    fn merge_prefer_ours(&self, repo_path: &Path, branch: &str) -> Result<MergeOutcome, GitError>;
    fn reset_hard(&self, repo_path: &Path, target: &str) -> Result<(), GitError>;
    fn current_tip(&self, repo_path: &Path) -> Result<String, GitError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    Conflict { files: Vec<String> },
    NoOp,
}

pub struct RealGitService;

impl GitService for RealGitService {
    fn get_repo_root(&self, path: &Path) -> Result<PathBuf, GitError> {
        Ok(PathBuf::from(run(&["rev-parse", "--show-toplevel"], path)?))
    }

    fn get_current_branch(&self, path: &Path) -> Result<String, GitError> {
        run(&["rev-parse", "--abbrev-ref", "HEAD"], path)
    }

    fn create_worktree(&self, repo_path: &Path, branch: &str, worktree_path: &Path) -> Result<(), GitError> {
        if let Some(parent) = worktree_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let branch_exists = run_ok(&["rev-parse", "--verify", branch], repo_path);
        let worktree_path_str = worktree_path.to_string_lossy().to_string();
        if branch_exists {
            run(&["worktree", "add", &worktree_path_str, branch], repo_path)?;
        } else {
            run(&["worktree", "add", "-b", branch, &worktree_path_str], repo_path)?;
        }
        Ok(())
    }

    fn remove_worktree(&self, repo_path: &Path, worktree_path: &Path) -> Result<(), GitError> {
        let worktree_path_str = worktree_path.to_string_lossy().to_string();
        run(&["worktree", "remove", "--force", &worktree_path_str], repo_path)?;
        Ok(())
    }

    fn list_worktrees(&self, repo_path: &Path) -> Result<Vec<PathBuf>, GitError> {
        let out = run(&["worktree", "list", "--porcelain"], repo_path)?;
        let mut paths = Vec::new();
        for line in out.lines() {
            if let Some(path) = line.strip_prefix("worktree ") {
                paths.push(PathBuf::from(path));
            }
        }
        Ok(paths)
    }

    fn merge(&self, repo_path: &Path, branch: &str) -> Result<MergeOutcome, GitError> {
        let output = Command::new("git")
            .args(["merge", branch, "--no-edit"])
            .current_dir(repo_path)
            .output()?;

        if output.status.success() {
            return Ok(MergeOutcome::Merged);
        }

        let conflicted = run(&["diff", "--name-only", "--diff-filter=U"], repo_path).unwrap_or_default();
        if conflicted.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitError::CommandFailed(stderr.trim().to_string()));
        }

        let files = conflicted.lines().map(str::to_string).collect();
        let _ = Command::new("git")
            .args(["merge", "--abort"])
            .current_dir(repo_path)
            .output();
        Ok(MergeOutcome::Conflict { files })
    }

    fn merge_prefer_ours(&self, repo_path: &Path, branch: &str) -> Result<MergeOutcome, GitError> {
        let output = Command::new("git")
            .args(["merge", branch, "--no-edit", "-X", "ours"])
            .current_dir(repo_path)
            .output()?;

        if output.status.success() {
            return Ok(MergeOutcome::Merged);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(GitError::CommandFailed(stderr.trim().to_string()))
    }

    fn reset_hard(&self, repo_path: &Path, target: &str) -> Result<(), GitError> {
        run(&["reset", "--hard", target], repo_path)?;
        Ok(())
    }

    fn current_tip(&self, repo_path: &Path) -> Result<String, GitError> {
        run(&["rev-parse", "HEAD"], repo_path)
    }
}

pub fn is_git_repo(path: &Path) -> bool {
    run_ok(&["rev-parse", "--is-inside-work-tree"], path)
}

pub fn has_remote(path: &Path) -> bool {
    run(&["remote"], path).map(|out| !out.is_empty()).unwrap_or(false)
}

pub fn pull(path: &Path) -> Result<(), GitError> {
    if !has_remote(path) {
        return Ok(());
    }
    run(&["pull", "--rebase", "--autostash"], path)?;
    Ok(())
}
