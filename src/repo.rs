//! Repo detection and the recent-repos list, plus the branch/worktree-path
//! naming helpers shared by the worktree factory. Detection probes the git
//! CLI directly; the recent-repos list is persisted as JSON via a
//! temp-file-in-same-dir-then-rename write.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::types::ActionType;

const MAX_RECENT_REPOS: usize = 10;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("path not found: {0}")]
    PathNotFound(PathBuf),
    #[error("not a git repository: {0}")]
    NotAGitRepo(PathBuf),
    #[error("git command failed: {0}")]
    GitCommandFailed(String),
    #[error("failed to persist recent repos: {0}")]
    PersistenceFailed(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub root: PathBuf,
    pub current_branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentRepo {
    pub path: PathBuf,
    pub last_opened_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionResult {
    pub is_git_repo: bool,
    pub repo_info: Option<RepoInfo>,
    pub recent_repos: Vec<RecentRepo>,
}

fn run_git(args: &[&str], cwd: &Path) -> Result<String, RepoError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| RepoError::GitCommandFailed(e.to_string()))?;
    if !output.status.success() {
        return Err(RepoError::GitCommandFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Persists the recent-repos list as JSON at a fixed path, round-tripped
/// via temp-file-then-rename.
pub struct RepoDetector {
    store_path: PathBuf,
}

impl RepoDetector {
    pub fn new(store_path: PathBuf) -> Self {
        RepoDetector { store_path }
    }

    /// Default store location, `~/.crossroads/recent-repos.json`.
    pub fn default_store_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        PathBuf::from(home).join(".crossroads/recent-repos.json")
    }

    fn load_recent(&self) -> Vec<RecentRepo> {
        let Ok(content) = std::fs::read_to_string(&self.store_path) else {
            return Vec::new();
        };
        let repos: Vec<RecentRepo> = serde_json::from_str(&content).unwrap_or_default();
        repos.into_iter().filter(|r| r.path.exists()).collect()
    }

    fn save_recent(&self, repos: &[RecentRepo]) -> Result<(), RepoError> {
        if let Some(parent) = self.store_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(repos).expect("RecentRepo always serializes");
        let tmp = self.store_path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.store_path)?;
        Ok(())
    }

    /// Resolves `path` to a git repo root and current branch. On success,
    /// moves `path` (canonicalized) to the front of the recent-repos list,
    /// deduplicated, truncated to [`MAX_RECENT_REPOS`]. On failure, the
    /// recent-repos list is returned unmodified and `is_git_repo=false`.
    pub fn detect_repository(&self, path: &Path) -> Result<DetectionResult, RepoError> {
        if !path.exists() {
            return Err(RepoError::PathNotFound(path.to_path_buf()));
        }

        let recent_repos = self.load_recent();

        let root = match run_git(&["rev-parse", "--show-toplevel"], path) {
            Ok(root) => PathBuf::from(root),
            Err(_) => {
                return Ok(DetectionResult {
                    is_git_repo: false,
                    repo_info: None,
                    recent_repos,
                });
            }
        };

        let current_branch = run_git(&["rev-parse", "--abbrev-ref", "HEAD"], path)?;

        let mut repos = recent_repos;
        repos.retain(|r| r.path != root);
        repos.insert(
            0,
            RecentRepo {
                path: root.clone(),
                last_opened_at: chrono::Utc::now(),
            },
        );
        repos.truncate(MAX_RECENT_REPOS);
        self.save_recent(&repos)?;

        Ok(DetectionResult {
            is_git_repo: true,
            repo_info: Some(RepoInfo { root, current_branch }),
            recent_repos: repos,
        })
    }
}

fn slugify(raw: &str) -> String {
    let lower: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let collapsed: String = lower
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    collapsed
}

fn branch_prefix(action: ActionType) -> &'static str {
    match action {
        ActionType::Implement => "feat",
        ActionType::Review => "review",
        ActionType::IntegrationTest => "test",
        ActionType::Write => "docs",
        ActionType::Custom => "task",
    }
}

/// `<prefix>/<slug>-<ts%10000>`, matching `^(feat|review|test|docs|task)/[a-z0-9-]+-\d{1,4}$`.
pub fn generate_branch_name(action: ActionType, base_name: &str) -> String {
    let prefix = branch_prefix(action);
    let slug = slugify(base_name);
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() % 10_000)
        .unwrap_or(0);
    format!("{prefix}/{slug}-{ts}")
}

/// `~/.xroads/worktrees/<repoBasename>/<branch-with-/→->`. Vestigial: the
/// worktree factory computes its own canonical root (see `worktree::worktree_root`)
/// and only reuses this for branch/slug naming.
pub fn generate_worktree_path(repo_path: &Path, branch_name: &str) -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    let repo_basename = repo_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "repo".to_string());
    let sanitized_branch = branch_name.replace('/', "-");
    PathBuf::from(home)
        .join(".xroads/worktrees")
        .join(repo_basename)
        .join(sanitized_branch)
}

/// Deterministic per-repo hash used by the worktree factory's canonical root.
pub fn repo_path_hash(repo_path: &Path) -> String {
    let standardized = repo_path.to_string_lossy().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(standardized.as_bytes());
    format!("{:x}", hasher.finalize())
}
