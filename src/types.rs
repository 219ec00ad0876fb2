//! Shared data model for the orchestration pipeline.
//!
//! Everything here is plain data: the components in other modules operate on
//! these types but do not own them. Kept in one file since the surface is
//! large enough across components (F through O) that it
//! earns its own module.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed set of supported CLI agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Claude,
    Gemini,
    Codex,
}

impl AgentType {
    pub const ALL: [AgentType; 3] = [AgentType::Claude, AgentType::Gemini, AgentType::Codex];

    /// Human-facing display name, e.g. for status lines.
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentType::Claude => "Claude",
            AgentType::Gemini => "Gemini",
            AgentType::Codex => "Codex",
        }
    }

    /// Raw lowercase name used in branch names and env vars.
    pub fn raw_name(&self) -> &'static str {
        match self {
            AgentType::Claude => "claude",
            AgentType::Gemini => "gemini",
            AgentType::Codex => "codex",
        }
    }

    /// Executable name expected on PATH.
    pub fn executable_name(&self) -> &'static str {
        match self {
            AgentType::Claude => "claude",
            AgentType::Gemini => "gemini",
            AgentType::Codex => "codex",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.raw_name())
    }
}

/// The closed set of built-in action kinds, plus `Custom` for user-registered
/// actions (see [`CustomAction`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    Implement,
    Review,
    IntegrationTest,
    Write,
    Custom,
}

impl ActionType {
    pub const BUILT_INS: [ActionType; 4] = [
        ActionType::Implement,
        ActionType::Review,
        ActionType::IntegrationTest,
        ActionType::Write,
    ];

    pub fn category(&self) -> &'static str {
        match self {
            ActionType::Implement => "code",
            ActionType::Review => "review",
            ActionType::IntegrationTest => "test",
            ActionType::Write => "docs",
            ActionType::Custom => "other",
        }
    }
}

/// A user-registered action not in the built-in [`ActionType`] set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomAction {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon_hint: String,
    pub required_skills: Vec<String>,
    pub compatible_clis: BTreeSet<AgentType>,
}

impl CustomAction {
    /// Empty `compatible_clis` means "all CLIs".
    pub fn supports(&self, cli: AgentType) -> bool {
        self.compatible_clis.is_empty() || self.compatible_clis.contains(&cli)
    }
}

/// Where a [`Skill`] definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillOrigin {
    Bundled,
    User,
}

/// A named, versioned prompt template plus its tool requirements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub description: String,
    pub prompt_template: String,
    pub required_tools: BTreeSet<String>,
    pub version: String,
    pub compatible_clis: BTreeSet<AgentType>,
    pub category: String,
    pub author: String,
    #[serde(default = "default_origin")]
    pub origin: SkillOrigin,
}

fn default_origin() -> SkillOrigin {
    SkillOrigin::User
}

impl Skill {
    pub fn supports(&self, cli: AgentType) -> bool {
        self.compatible_clis.is_empty() || self.compatible_clis.contains(&cli)
    }

    /// Substitute the `{{context}}` placeholder with `context`.
    pub fn render(&self, context: &str) -> String {
        self.prompt_template.replace("{{context}}", context)
    }
}

/// Priority of a [`PRDUserStory`]; ordered low < medium < high < critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Weight used for sorting and `TaskGroup.estimatedComplexity`.
    pub fn weight(&self) -> u32 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 5,
            Priority::High => 10,
            Priority::Critical => 20,
        }
    }

    pub fn parse(raw: &str) -> Option<Priority> {
        match raw.to_ascii_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            "critical" => Some(Priority::Critical),
            _ => None,
        }
    }
}

/// One user story inside a [`PRDDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PRDUserStory {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub priority: Priority,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub estimated_complexity: Option<String>,
    #[serde(default)]
    pub unit_test: Option<String>,
}

/// A parsed, validated product requirements document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PRDDocument {
    pub feature_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub template_type: Option<String>,
    pub user_stories: Vec<PRDUserStory>,
    #[serde(default)]
    pub vision: Option<String>,
    #[serde(default)]
    pub success_metrics: Vec<String>,
}

/// A cluster of stories assigned to a single agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGroup {
    pub id: String,
    pub preferred_agent: AgentType,
    pub story_ids: Vec<String>,
    pub estimated_complexity: u32,
}

/// An immutable binding of one [`TaskGroup`] to one agent, branch, and worktree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeAssignment {
    pub id: Uuid,
    pub task_group: TaskGroup,
    pub agent_type: AgentType,
    pub branch_name: String,
    pub worktree_path: std::path::PathBuf,
}

/// One [`WorktreeAssignment`] admitted into a launch batch by
/// [`crate::orchestrator::Orchestrator::assign_tasks`]. `batch` is the
/// admission round under `maxParallelAgents`: batch 0 may launch
/// immediately, later batches wait for an earlier one to free a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub assignment: WorktreeAssignment,
    pub batch: usize,
}

/// A live (or once-live) launched agent process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSession {
    pub id: Uuid,
    pub process_id: u32,
    pub agent_type: AgentType,
    pub branch_name: String,
    pub worktree_path: std::path::PathBuf,
    pub stories: Vec<String>,
    pub started_at: DateTime<Utc>,
}

/// The kind of lifecycle event an agent may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgentEventKind {
    StoryStarted,
    StoryCompleted,
    Blocked,
    NeedsHelp,
    FileModified,
}

/// One event published to the [`crate::event_bus::EventBus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub agent_type: Option<AgentType>,
    pub kind: AgentEventKind,
    pub story_id: Option<String>,
    pub file_path: Option<std::path::PathBuf>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// The coarse state an agent reports via its status file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Idle,
    Working,
    NeedsInput,
    Blocked,
    Finished,
    Error,
}

/// A point-in-time read of an agent's self-reported status file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusSnapshot {
    pub agent_id: Uuid,
    pub agent_type: Option<AgentType>,
    pub worktree_path: Option<std::path::PathBuf>,
    pub state: AgentState,
    pub current_story_id: Option<String>,
    pub progress: f32,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// The orchestrator's top-level lifecycle state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum OrchestratorState {
    Idle,
    Analyzing,
    Distributing,
    Monitoring,
    Merging,
    Complete,
    Error { message: String },
}

impl OrchestratorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrchestratorState::Complete | OrchestratorState::Error { .. })
    }
}

/// How the merge coordinator resolves conflicting hunks across branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictStrategy {
    ManualReview,
    PreferPrimary,
    FailFast,
}

impl Default for ConflictStrategy {
    fn default() -> Self {
        ConflictStrategy::ManualReview
    }
}

/// Orchestrator-wide tunables, persisted as TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_parallel_agents: u32,
    pub auto_merge: bool,
    pub conflict_strategy: ConflictStrategy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            max_parallel_agents: 2,
            auto_merge: true,
            conflict_strategy: ConflictStrategy::ManualReview,
        }
    }
}

/// Where one step of a [`MergePlan`] stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStepStatus {
    Pending,
    Ready,
    Blocked,
}

/// One branch merge, ordered topologically by cluster dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergePlanStep {
    pub assignment_id: Uuid,
    pub branch_name: String,
    pub depends_on: Vec<Uuid>,
    pub status: MergeStepStatus,
}

/// A single conflicting file found while merging one branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConflict {
    pub branch_name: String,
    pub file_path: std::path::PathBuf,
    pub detail: String,
}

/// The full plan produced by the merge coordinator before execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergePlan {
    pub base_branch: String,
    pub steps: Vec<MergePlanStep>,
}

/// The outcome of running a [`MergePlan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResult {
    pub base_branch: String,
    pub merged_branches: Vec<String>,
    pub conflicts: Vec<MergeConflict>,
    pub success: bool,
    pub rolled_back: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_weight_ordering() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert!(Priority::High < Priority::Critical);
        assert_eq!(Priority::Critical.weight(), 20);
    }

    #[test]
    fn priority_parse_case_insensitive() {
        assert_eq!(Priority::parse("HIGH"), Some(Priority::High));
        assert_eq!(Priority::parse("bogus"), None);
    }

    #[test]
    fn custom_action_empty_clis_supports_all() {
        let action = CustomAction {
            id: "a".into(),
            name: "A".into(),
            description: "".into(),
            icon_hint: "".into(),
            required_skills: vec![],
            compatible_clis: BTreeSet::new(),
        };
        assert!(action.supports(AgentType::Codex));
    }

    #[test]
    fn skill_render_substitutes_context() {
        let skill = Skill {
            id: "s".into(),
            name: "S".into(),
            description: "".into(),
            prompt_template: "Do: {{context}}".into(),
            required_tools: BTreeSet::new(),
            version: "1.0.0".into(),
            compatible_clis: BTreeSet::new(),
            category: "code".into(),
            author: "core".into(),
            origin: SkillOrigin::Bundled,
        };
        assert_eq!(skill.render("build X"), "Do: build X");
    }

    #[test]
    fn orchestrator_state_terminal() {
        assert!(OrchestratorState::Complete.is_terminal());
        assert!(OrchestratorState::Error { message: "x".into() }.is_terminal());
        assert!(!OrchestratorState::Monitoring.is_terminal());
    }

    #[test]
    fn orchestrator_config_defaults() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.max_parallel_agents, 2);
        assert!(cfg.auto_merge);
        assert_eq!(cfg.conflict_strategy, ConflictStrategy::ManualReview);
    }
}
