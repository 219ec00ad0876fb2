//! Owns the top-level [`OrchestratorState`] state machine and ties the
//! pipeline together: PRD analysis, worktree creation, agent launch
//! batching under `maxParallelAgents`, progress monitoring, and merge
//! coordination. Agent launches are claimed in batches of at most
//! `max_parallel_agents` at a time (`ready_batches`); progress monitoring is
//! a synchronous per-call snapshot (`monitor_once`) paired with an async
//! sleep helper (`poll_delay`) so callers can drive their own poll loop.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::event_bus::EventBus;
use crate::git::GitService;
use crate::merge;
use crate::prd;
use crate::splitter;
use crate::types::{
    AgentEvent, AgentState, AgentStatusSnapshot, AgentType, ConflictStrategy, MergeResult,
    OrchestratorConfig, OrchestratorState, PRDDocument, TaskAssignment, TaskGroup, WorktreeAssignment,
};
use crate::worktree::WorktreeFactory;

/// One poll of the monitoring loop: the agents' self-reported status
/// snapshots, any events published since the last poll, and the current
/// top-level state — the merged stream §4.M calls for, delivered one tick
/// at a time rather than as a single combinator type.
pub struct MonitorTick {
    pub snapshots: Vec<AgentStatusSnapshot>,
    pub events: Vec<AgentEvent>,
    pub state: OrchestratorState,
}

/// Process-wide singleton per §5: one logical thread of execution, its
/// state and config behind their own locks so reads never block on an
/// in-flight transition longer than it takes to swap the tag.
pub struct Orchestrator<'a> {
    git: &'a dyn GitService,
    event_bus: &'a EventBus,
    state: Mutex<OrchestratorState>,
    config: Mutex<OrchestratorConfig>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(git: &'a dyn GitService, event_bus: &'a EventBus, config: OrchestratorConfig) -> Self {
        Orchestrator {
            git,
            event_bus,
            state: Mutex::new(OrchestratorState::Idle),
            config: Mutex::new(config),
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state.lock().expect("orchestrator state lock poisoned").clone()
    }

    fn set_state(&self, state: OrchestratorState) {
        *self.state.lock().expect("orchestrator state lock poisoned") = state;
    }

    pub fn config(&self) -> OrchestratorConfig {
        self.config.lock().expect("orchestrator config lock poisoned").clone()
    }

    pub fn update_config(&self, config: OrchestratorConfig) {
        *self.config.lock().expect("orchestrator config lock poisoned") = config;
    }

    /// Idle -> Analyzing -> Idle. Parses and validates the PRD, then splits
    /// it into task groups against the caller's available agent set.
    pub fn analyze_prd(
        &self,
        prd_path: &Path,
        available_agents: &[AgentType],
    ) -> Result<(PRDDocument, Vec<TaskGroup>), OrchestratorError> {
        self.set_state(OrchestratorState::Analyzing);

        let result = (|| {
            let doc = prd::parse_file(prd_path)?;
            let groups = splitter::split(&doc, available_agents)?;
            Ok((doc, groups))
        })();

        match result {
            Ok(ok) => {
                self.set_state(OrchestratorState::Idle);
                Ok(ok)
            }
            Err(err) => {
                self.set_state(OrchestratorState::Error { message: format!("{err}") });
                Err(err)
            }
        }
    }

    /// Idle -> Distributing -> Idle. Creates one worktree per task group.
    pub fn create_worktrees(
        &self,
        repo_path: &Path,
        task_groups: &[TaskGroup],
    ) -> Result<Vec<WorktreeAssignment>, OrchestratorError> {
        self.set_state(OrchestratorState::Distributing);

        let factory = WorktreeFactory::new(self.git);
        match factory.create_worktrees_for_tasks(task_groups, repo_path) {
            Ok(assignments) => {
                self.set_state(OrchestratorState::Idle);
                Ok(assignments)
            }
            Err(err) => {
                let message = err.to_string();
                self.set_state(OrchestratorState::Error { message: message.clone() });
                Err(OrchestratorError::Worktree(message))
            }
        }
    }

    /// Admits `assignments` into launch batches under the current
    /// `maxParallelAgents` cap (§4.M's `assignTasks`), preserving input
    /// order within each batch. Batch 0 is the set a caller may launch
    /// right away; later batches are the ready queue, admitted as earlier
    /// ones free a slot.
    pub fn assign_tasks(&self, assignments: &[WorktreeAssignment]) -> Vec<TaskAssignment> {
        let max_parallel_agents = self.config().max_parallel_agents;
        ready_batches(assignments, max_parallel_agents)
            .into_iter()
            .enumerate()
            .flat_map(|(batch, group)| {
                group.into_iter().map(move |assignment| TaskAssignment { assignment: assignment.clone(), batch })
            })
            .collect()
    }

    /// Transitions to Monitoring and stays there for the duration of the
    /// caller's polling loop; the caller calls [`Orchestrator::monitor_once`]
    /// repeatedly (matching `run_orchestration`'s sleep-then-poll shape)
    /// until it decides to move on (e.g. all assignments finished).
    pub fn begin_monitoring(&self) {
        self.set_state(OrchestratorState::Monitoring);
    }

    /// Reads every assignment's status file and drains events published
    /// since the bus was last subscribed to by the caller. Callers typically
    /// sleep a couple of seconds between ticks, as `run_orchestration` does.
    pub fn monitor_once(&self, assignments: &[WorktreeAssignment]) -> MonitorTick {
        let snapshots = assignments
            .iter()
            .filter_map(|a| read_status_snapshot(&a.worktree_path))
            .collect();
        let events = self.event_bus.recent_events(64);
        MonitorTick { snapshots, events, state: self.state() }
    }

    /// Idle/Monitoring -> Merging -> Complete|Error. Delegates plan
    /// construction and execution to [`merge`], selecting `autoMerge` and
    /// `conflictStrategy` from the current config.
    pub fn coordinate_merge(
        &self,
        repo_path: &Path,
        base_branch: &str,
        assignments: &[WorktreeAssignment],
    ) -> Result<MergeResult, OrchestratorError> {
        self.set_state(OrchestratorState::Merging);
        let config = self.config();
        let plan = merge::build_plan(base_branch, assignments);

        match merge::coordinate_merge(self.git, repo_path, &plan, config.conflict_strategy, config.auto_merge) {
            Ok(result) => {
                if result.success {
                    self.set_state(OrchestratorState::Complete);
                } else {
                    self.set_state(OrchestratorState::Error {
                        message: format!("{} conflict(s) left unresolved", result.conflicts.len()),
                    });
                }
                Ok(result)
            }
            Err(err) => {
                self.set_state(OrchestratorState::Error { message: err.to_string() });
                Err(OrchestratorError::Merge(err.to_string()))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Prd(#[from] prd::PrdError),
    #[error(transparent)]
    Split(#[from] splitter::TaskSplitError),
    #[error("worktree error: {0}")]
    Worktree(String),
    #[error("merge error: {0}")]
    Merge(String),
}

/// Splits `assignments` into batches no larger than `max_parallel_agents`,
/// preserving input order, so a caller launches at most that many agents
/// concurrently.
pub fn ready_batches(assignments: &[WorktreeAssignment], max_parallel_agents: u32) -> Vec<Vec<&WorktreeAssignment>> {
    let cap = max_parallel_agents.max(1) as usize;
    assignments.chunks(cap).map(|chunk| chunk.iter().collect()).collect()
}

fn status_file_path(worktree_path: &Path) -> PathBuf {
    worktree_path.join(".crossroads/status.json")
}

pub fn read_status_snapshot(worktree_path: &Path) -> Option<AgentStatusSnapshot> {
    let content = std::fs::read_to_string(status_file_path(worktree_path)).ok()?;
    serde_json::from_str(&content).ok()
}

/// Used by launched agents (or, in tests, by simulating one) to report
/// status. Writes atomically so a monitor poll never observes a half-written
/// file.
pub fn write_status_snapshot(worktree_path: &Path, snapshot: &AgentStatusSnapshot) -> std::io::Result<()> {
    let path = status_file_path(worktree_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// Thin sleep wrapper so `monitor_once` callers can match
/// `run_orchestration`'s 2-second poll cadence without importing `tokio`
/// themselves outside async contexts.
pub async fn poll_delay() {
    tokio::time::sleep(Duration::from_secs(2)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::RealGitService;
    use crate::types::AgentEventKind;
    use std::process::Command;
    use uuid::Uuid;

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

    fn prd_file(dir: &Path) -> PathBuf {
        let path = dir.join("prd.json");
        std::fs::write(
            &path,
            r#"{"feature_name":"F","description":"","user_stories":[
                {"id":"US-1","title":"T1","priority":"high","depends_on":[]},
                {"id":"US-2","title":"T2","priority":"low","depends_on":["US-1"]}
            ]}"#,
        )
        .unwrap();
        path
    }

    fn assignment(worktree_path: PathBuf) -> WorktreeAssignment {
        WorktreeAssignment {
            id: Uuid::new_v4(),
            task_group: TaskGroup {
                id: "US-1".into(),
                preferred_agent: AgentType::Claude,
                story_ids: vec!["US-1".into()],
                estimated_complexity: 10,
            },
            agent_type: AgentType::Claude,
            branch_name: "agent/claude-us-1".into(),
            worktree_path,
        }
    }

    #[test]
    fn analyze_prd_returns_to_idle_on_success() {
        let dir = init_repo();
        let path = prd_file(dir.path());
        let git = RealGitService;
        let bus = EventBus::new();
        let orchestrator = Orchestrator::new(&git, &bus, OrchestratorConfig::default());

        let (doc, groups) = orchestrator.analyze_prd(&path, &[AgentType::Claude]).unwrap();
        assert_eq!(doc.user_stories.len(), 2);
        assert_eq!(groups.len(), 1);
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    }

    #[test]
    fn analyze_prd_enters_error_state_on_invalid_file() {
        let git = RealGitService;
        let bus = EventBus::new();
        let orchestrator = Orchestrator::new(&git, &bus, OrchestratorConfig::default());

        let result = orchestrator.analyze_prd(Path::new("/does/not/exist.json"), &[]);
        assert!(result.is_err());
        assert!(matches!(orchestrator.state(), OrchestratorState::Error { .. }));
    }

    #[test]
    fn create_worktrees_returns_to_idle_on_success() {
        std::env::set_var("HOME", tempfile::tempdir().unwrap().into_path());
        let dir = init_repo();
        let git = RealGitService;
        let bus = EventBus::new();
        let orchestrator = Orchestrator::new(&git, &bus, OrchestratorConfig::default());

        let groups = vec![TaskGroup {
            id: "US-1".into(),
            preferred_agent: AgentType::Claude,
            story_ids: vec!["US-1".into()],
            estimated_complexity: 10,
        }];
        let assignments = orchestrator.create_worktrees(dir.path(), &groups).unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    }

    #[test]
    fn ready_batches_respects_max_parallel_agents() {
        let assignments = vec![
            assignment(PathBuf::from("/a")),
            assignment(PathBuf::from("/b")),
            assignment(PathBuf::from("/c")),
        ];
        let batches = ready_batches(&assignments, 2);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 1);
    }

    #[test]
    fn assign_tasks_tags_batches_by_max_parallel_agents() {
        let git = RealGitService;
        let bus = EventBus::new();
        let mut config = OrchestratorConfig::default();
        config.max_parallel_agents = 2;
        let orchestrator = Orchestrator::new(&git, &bus, config);

        let assignments =
            vec![assignment(PathBuf::from("/a")), assignment(PathBuf::from("/b")), assignment(PathBuf::from("/c"))];
        let tagged = orchestrator.assign_tasks(&assignments);
        assert_eq!(tagged.iter().map(|t| t.batch).collect::<Vec<_>>(), vec![0, 0, 1]);
        assert_eq!(tagged[2].assignment.worktree_path, PathBuf::from("/c"));
    }

    #[test]
    fn monitor_once_reads_written_status_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let assignment = assignment(dir.path().to_path_buf());
        let snapshot = AgentStatusSnapshot {
            agent_id: Uuid::new_v4(),
            agent_type: Some(AgentType::Claude),
            worktree_path: Some(dir.path().to_path_buf()),
            state: AgentState::Working,
            current_story_id: Some("US-1".into()),
            progress: 0.5,
            message: "implementing".into(),
            timestamp: chrono::Utc::now(),
        };
        write_status_snapshot(&assignment.worktree_path, &snapshot).unwrap();

        let git = RealGitService;
        let bus = EventBus::new();
        bus.publish(AgentEvent {
            id: Uuid::new_v4(),
            agent_id: snapshot.agent_id,
            agent_type: Some(AgentType::Claude),
            kind: AgentEventKind::StoryStarted,
            story_id: Some("US-1".into()),
            file_path: None,
            message: "started".into(),
            timestamp: chrono::Utc::now(),
        });
        let orchestrator = Orchestrator::new(&git, &bus, OrchestratorConfig::default());
        orchestrator.begin_monitoring();

        let tick = orchestrator.monitor_once(std::slice::from_ref(&assignment));
        assert_eq!(tick.snapshots.len(), 1);
        assert_eq!(tick.snapshots[0].current_story_id.as_deref(), Some("US-1"));
        assert_eq!(tick.events.len(), 1);
        assert_eq!(tick.state, OrchestratorState::Monitoring);
    }

    #[test]
    fn coordinate_merge_with_auto_merge_disabled_completes_as_no_op() {
        let dir = init_repo();
        let git = RealGitService;
        let bus = EventBus::new();
        let mut config = OrchestratorConfig::default();
        config.auto_merge = false;
        let orchestrator = Orchestrator::new(&git, &bus, config);

        let result = orchestrator.coordinate_merge(dir.path(), "main", &[]).unwrap();
        assert!(result.success);
        assert_eq!(orchestrator.state(), OrchestratorState::Complete);
    }

    #[test]
    fn coordinate_merge_with_conflict_enters_error_state() {
        let dir = init_repo();
        let git = RealGitService;
        let worktree = dir.path().join("wt-a");
        git.create_worktree(dir.path(), "agent/a", &worktree).unwrap();
        std::fs::write(worktree.join("a.txt"), "from branch").unwrap();
        Command::new("git").args(["add", "."]).current_dir(&worktree).output().unwrap();
        Command::new("git")
            .args(["commit", "-m", "conflicting"])
            .current_dir(&worktree)
            .output()
            .unwrap();
        std::fs::write(dir.path().join("a.txt"), "from base").unwrap();
        Command::new("git").args(["add", "."]).current_dir(dir.path()).output().unwrap();
        Command::new("git")
            .args(["commit", "-m", "base change"])
            .current_dir(dir.path())
            .output()
            .unwrap();

        let bus = EventBus::new();
        let mut config = OrchestratorConfig::default();
        config.conflict_strategy = ConflictStrategy::ManualReview;
        let orchestrator = Orchestrator::new(&git, &bus, config);

        let assignments = vec![WorktreeAssignment {
            id: Uuid::new_v4(),
            task_group: TaskGroup {
                id: "US-1".into(),
                preferred_agent: AgentType::Claude,
                story_ids: vec!["US-1".into()],
                estimated_complexity: 1,
            },
            agent_type: AgentType::Claude,
            branch_name: "agent/a".into(),
            worktree_path: worktree,
        }];
        let result = orchestrator.coordinate_merge(dir.path(), "main", &assignments).unwrap();
        assert!(!result.success);
        assert!(matches!(orchestrator.state(), OrchestratorState::Error { .. }));
    }
}
