//! Allocates deterministic worktree paths, creates them via git, seeds
//! notes, and sweeps orphaned directories — one worktree per task group,
//! created sequentially.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::git::{GitError, GitService};
use crate::notes::{self, NotesError};
use crate::types::{AgentType, TaskGroup, WorktreeAssignment};

#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Notes(#[from] NotesError),
    #[error("failed to create worktree root: {0}")]
    Io(#[from] std::io::Error),
}

fn slugify(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let trimmed = replaced.trim_matches('-');
    let collapsed: Vec<&str> = trimmed.split('-').filter(|s| !s.is_empty()).collect();
    collapsed.join("-")
}

/// `agent/<agent-raw>-<slug(group.id)>`; if the slug is empty, falls back to
/// replacing `/` with `-` in the original group id.
pub fn branch_name_for(agent: AgentType, group_id: &str) -> String {
    let slug = slugify(group_id);
    if slug.is_empty() {
        format!("agent/{}-{}", agent.raw_name(), group_id.replace('/', "-"))
    } else {
        format!("agent/{}-{}", agent.raw_name(), slug)
    }
}

/// `~/.crossroads/worktrees/<sha256(lowercased-standardized-repoPath)>/`.
pub fn worktree_root(repo_path: &Path) -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    let hash = crate::repo::repo_path_hash(repo_path);
    PathBuf::from(home).join(".crossroads/worktrees").join(hash)
}

fn sweep_dir(dir: &Path, registered: &[PathBuf], removed: &mut Vec<PathBuf>) -> Result<(), WorktreeError> {
    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if registered.iter().any(|w| w == &path) {
            continue;
        }
        if registered.iter().any(|w| w.starts_with(&path)) {
            sweep_dir(&path, registered, removed)?;
        } else {
            std::fs::remove_dir_all(&path)?;
            removed.push(path);
        }
    }
    Ok(())
}

pub struct WorktreeFactory<'a> {
    git: &'a dyn GitService,
}

impl<'a> WorktreeFactory<'a> {
    pub fn new(git: &'a dyn GitService) -> Self {
        WorktreeFactory { git }
    }

    /// Removes any directory under the repo's worktree root that is not
    /// itself a registered git worktree and does not contain one further
    /// down (scenario S6). Branch names are namespaced (`agent/<...>`), so
    /// registered worktrees sit two levels below `root`; a plain depth-1
    /// `read_dir` would see only the `agent/` namespace directory itself —
    /// never a full registered path — and sweep it away wholesale. Walking
    /// down to each registered path's ancestors instead leaves live
    /// worktrees untouched while still reaching orphans at any depth.
    pub fn sweep_orphans(&self, repo_path: &Path) -> Result<Vec<PathBuf>, WorktreeError> {
        let root = worktree_root(repo_path);
        if !root.exists() {
            return Ok(Vec::new());
        }

        let registered = self.git.list_worktrees(repo_path)?;
        let mut removed = Vec::new();
        sweep_dir(&root, &registered, &mut removed)?;
        Ok(removed)
    }

    /// Creates one worktree per task group, sequentially (§5: "worktree
    /// creation within one call is sequential to avoid git index
    /// contention"). Worktree root is ensured and swept first.
    pub fn create_worktrees_for_tasks(
        &self,
        task_groups: &[TaskGroup],
        repo_path: &Path,
    ) -> Result<Vec<WorktreeAssignment>, WorktreeError> {
        let root = worktree_root(repo_path);
        std::fs::create_dir_all(&root)?;
        self.sweep_orphans(repo_path)?;

        let mut assignments = Vec::with_capacity(task_groups.len());
        for group in task_groups {
            let branch_name = branch_name_for(group.preferred_agent, &group.id);
            let worktree_path = root.join(&branch_name);

            if let Some(parent) = worktree_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.git.create_worktree(repo_path, &branch_name, &worktree_path)?;
            notes::sync_notes_to_worktree(repo_path, &worktree_path, &branch_name)?;

            assignments.push(WorktreeAssignment {
                id: uuid::Uuid::new_v4(),
                task_group: group.clone(),
                agent_type: group.preferred_agent,
                branch_name,
                worktree_path,
            });
        }

        Ok(assignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::RealGitService;
    use std::process::Command;

    fn init_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        Command::new("git").arg("init").current_dir(dir.path()).output().unwrap();
        Command::new("git")
            .args(["config", "user.email", "t@example.com"])
            .current_dir(dir.path())
            .output()
            .unwrap();
        Command::new("git")
            .args(["config", "user.name", "tester"])
            .current_dir(dir.path())
            .output()
            .unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        Command::new("git").args(["add", "."]).current_dir(dir.path()).output().unwrap();
        Command::new("git")
            .args(["commit", "-m", "initial"])
            .current_dir(dir.path())
            .output()
            .unwrap();
        dir
    }

    fn group(id: &str, agent: AgentType) -> TaskGroup {
        TaskGroup {
            id: id.into(),
            preferred_agent: agent,
            story_ids: vec![id.into()],
            estimated_complexity: 1,
        }
    }

    #[test]
    fn branch_name_matches_expected_shape() {
        assert_eq!(branch_name_for(AgentType::Claude, "US-1"), "agent/claude-us-1");
    }

    #[test]
    fn branch_name_falls_back_when_slug_empty() {
        assert_eq!(branch_name_for(AgentType::Codex, "---"), "agent/codex----");
    }

    #[test]
    fn creates_one_worktree_per_group_with_notes_seeded() {
        std::env::set_var("HOME", tempfile::tempdir().unwrap().into_path());
        let repo = init_repo();
        let git = RealGitService;
        let factory = WorktreeFactory::new(&git);

        let groups = vec![group("US-1", AgentType::Claude)];
        let assignments = factory.create_worktrees_for_tasks(&groups, repo.path()).unwrap();

        assert_eq!(assignments.len(), 1);
        assert!(assignments[0].worktree_path.join("notes/decisions.md").exists());
        assert_eq!(assignments[0].branch_name, "agent/claude-us-1");
    }

    #[test]
    fn sweep_removes_unregistered_directories() {
        std::env::set_var("HOME", tempfile::tempdir().unwrap().into_path());
        let repo = init_repo();
        let git = RealGitService;
        let factory = WorktreeFactory::new(&git);

        let groups = vec![group("US-1", AgentType::Claude)];
        factory.create_worktrees_for_tasks(&groups, repo.path()).unwrap();

        let root = worktree_root(repo.path());
        let stale = root.join("stale-dir");
        std::fs::create_dir_all(&stale).unwrap();

        let removed = factory.sweep_orphans(repo.path()).unwrap();
        assert_eq!(removed, vec![stale.clone()]);
        assert!(!stale.exists());
    }

    #[test]
    fn sweep_leaves_registered_worktree_nested_under_agent_namespace_untouched() {
        std::env::set_var("HOME", tempfile::tempdir().unwrap().into_path());
        let repo = init_repo();
        let git = RealGitService;
        let factory = WorktreeFactory::new(&git);

        let groups = vec![group("US-1", AgentType::Claude)];
        let assignments = factory.create_worktrees_for_tasks(&groups, repo.path()).unwrap();
        let live_worktree = assignments[0].worktree_path.clone();

        let removed = factory.sweep_orphans(repo.path()).unwrap();
        assert!(removed.is_empty());
        assert!(live_worktree.exists());
        assert!(live_worktree.join("notes/decisions.md").exists());
    }

    #[test]
    fn worktree_root_is_deterministic() {
        let a = worktree_root(Path::new("/repos/demo"));
        let b = worktree_root(Path::new("/repos/demo"));
        assert_eq!(a, b);
    }
}
