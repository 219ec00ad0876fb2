mod actions;
mod brief;
mod config;
mod config_checker;
mod event_bus;
mod git;
mod history;
mod launcher;
mod merge;
mod notes;
mod orchestrator;
mod prd;
mod repo;
mod skills;
mod splitter;
mod tui;
mod types;
mod worktree;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use uuid::Uuid;

use config_checker::ConfigChecker;
use event_bus::EventBus;
use git::{GitService, RealGitService};
use history::{HistoryService, OrchestrationRecord};
use orchestrator::Orchestrator;
use repo::RepoDetector;
use types::{AgentType, OrchestratorConfig, PRDDocument, TaskGroup, WorktreeAssignment};

#[derive(Parser)]
#[command(name = "crossroads", about = "Orchestrate parallel AI coding-agent CLIs across git worktrees")]
struct Cli {
    /// Repository root (default: current directory)
    #[arg(short, long, default_value = ".")]
    repo: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a PRD and print the task groups it would split into
    Analyze {
        /// Path to the PRD JSON file
        prd: PathBuf,
        /// Comma-separated agent types to consider (default: all available)
        #[arg(long)]
        agents: Option<String>,
    },
    /// Analyze a PRD and create one worktree per task group
    Worktrees {
        prd: PathBuf,
        #[arg(long)]
        agents: Option<String>,
    },
    /// Create worktrees (if needed) and launch an agent in each
    Launch {
        prd: PathBuf,
        #[arg(long)]
        agents: Option<String>,
    },
    /// Open the interactive multi-pane monitor over the repo's worktrees
    Watch {
        prd: PathBuf,
        #[arg(long)]
        agents: Option<String>,
    },
    /// Merge every agent branch back into the base branch
    Merge {
        /// Base branch to merge into (default: the repo's current branch)
        #[arg(long)]
        base: Option<String>,
    },
    /// Show repo detection, tool availability, and live agent status
    Status,
    /// Show the most recent orchestration runs
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Probe git and every supported agent CLI
    Doctor,
    /// List recently opened repos
    Repos,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let repo_path = cli.repo.clone();

    let result = match cli.command {
        Commands::Analyze { prd, agents } => cmd_analyze(&repo_path, &prd, &agents),
        Commands::Worktrees { prd, agents } => cmd_worktrees(&repo_path, &prd, &agents),
        Commands::Launch { prd, agents } => cmd_launch(&repo_path, &prd, &agents),
        Commands::Watch { prd, agents } => cmd_watch(&repo_path, &prd, &agents).await,
        Commands::Merge { base } => cmd_merge(&repo_path, base.as_deref()),
        Commands::Status => cmd_status(&repo_path),
        Commands::History { limit } => cmd_history(limit),
        Commands::Doctor => cmd_doctor(),
        Commands::Repos => cmd_repos(&repo_path),
    };

    if let Err(message) = result {
        eprintln!("Error: {message}");
        std::process::exit(1);
    }
}

fn parse_agents(raw: &Option<String>) -> Vec<AgentType> {
    match raw {
        None => Vec::new(),
        Some(s) => s
            .split(',')
            .filter_map(|token| {
                let token = token.trim().to_lowercase();
                AgentType::ALL.iter().copied().find(|a| a.raw_name() == token)
            })
            .collect(),
    }
}

fn available_agents(checker: &mut ConfigChecker, requested: Vec<AgentType>) -> Vec<AgentType> {
    if !requested.is_empty() {
        return requested;
    }
    checker
        .check_all(false)
        .tools
        .iter()
        .filter_map(|t| AgentType::ALL.iter().copied().find(|a| a.executable_name() == t.name && t.available))
        .collect()
}

fn analyze(prd_path: &Path, agents: &Option<String>) -> Result<(PRDDocument, Vec<TaskGroup>), String> {
    let git = RealGitService;
    let bus = EventBus::new();
    let orchestrator = Orchestrator::new(&git, &bus, OrchestratorConfig::default());

    let mut checker = ConfigChecker::new();
    let requested = available_agents(&mut checker, parse_agents(agents));

    orchestrator.analyze_prd(prd_path, &requested).map_err(|e| e.to_string())
}

fn cmd_analyze(_repo_path: &Path, prd_path: &Path, agents: &Option<String>) -> Result<(), String> {
    let (doc, groups) = analyze(prd_path, agents)?;
    println!("{} ({} stories) -> {} task group(s)", doc.feature_name, doc.user_stories.len(), groups.len());
    for group in &groups {
        println!(
            "  {:<10} agent={:<8} stories=[{}] complexity={}",
            group.id,
            group.preferred_agent,
            group.story_ids.join(", "),
            group.estimated_complexity
        );
    }
    Ok(())
}

fn create_worktrees(repo_path: &Path, task_groups: &[TaskGroup]) -> Result<Vec<WorktreeAssignment>, String> {
    let git = RealGitService;
    let bus = EventBus::new();
    let orchestrator = Orchestrator::new(&git, &bus, OrchestratorConfig::default());
    orchestrator.create_worktrees(repo_path, task_groups).map_err(|e| e.to_string())
}

fn print_assignments(assignments: &[WorktreeAssignment]) {
    for assignment in assignments {
        println!(
            "  {:<10} agent={:<8} branch={:<30} worktree={}",
            assignment.task_group.id,
            assignment.agent_type,
            assignment.branch_name,
            assignment.worktree_path.display()
        );
    }
}

fn cmd_worktrees(repo_path: &Path, prd_path: &Path, agents: &Option<String>) -> Result<(), String> {
    let (_, groups) = analyze(prd_path, agents)?;
    let assignments = create_worktrees(repo_path, &groups)?;
    println!("Created {} worktree(s):", assignments.len());
    print_assignments(&assignments);
    Ok(())
}

/// Finds worktrees already registered under this repo's canonical root and
/// reconstructs their [`WorktreeAssignment`]s from the branch-name convention
/// `worktree::branch_name_for` produces, so `watch`/`merge`/`status` can
/// re-attach to a run started by an earlier `worktrees`/`launch` invocation.
fn discover_assignments(repo_path: &Path) -> Vec<WorktreeAssignment> {
    let git = RealGitService;
    let root = worktree::worktree_root(repo_path);
    let Ok(registered) = git.list_worktrees(repo_path) else {
        return Vec::new();
    };

    registered
        .into_iter()
        .filter(|path| path.starts_with(&root))
        .filter_map(|worktree_path| {
            let relative = worktree_path.strip_prefix(&root).ok()?;
            let branch_name = relative.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/");
            let last = branch_name.rsplit('/').next().unwrap_or(&branch_name).to_string();
            let agent_type = AgentType::ALL.iter().copied().find(|a| last.starts_with(a.raw_name())).unwrap_or(AgentType::Claude);

            Some(WorktreeAssignment {
                id: Uuid::new_v4(),
                task_group: TaskGroup {
                    id: branch_name.clone(),
                    preferred_agent: agent_type,
                    story_ids: Vec::new(),
                    estimated_complexity: 0,
                },
                agent_type,
                branch_name,
                worktree_path,
            })
        })
        .collect()
}

fn cmd_launch(repo_path: &Path, prd_path: &Path, agents: &Option<String>) -> Result<(), String> {
    let (doc, groups) = analyze(prd_path, agents)?;
    let mut assignments = discover_assignments(repo_path);
    if assignments.is_empty() {
        assignments = create_worktrees(repo_path, &groups)?;
    }

    let git = RealGitService;
    let bus = EventBus::new();
    let config = config::load(repo_path).map_err(|e| e.to_string())?;
    let orchestrator = Orchestrator::new(&git, &bus, config);
    let pty_runner = launcher::PortablePtyRunner::new();

    let mut current_batch = None;
    for task in orchestrator.assign_tasks(&assignments) {
        if current_batch != Some(task.batch) {
            println!("batch {}:", task.batch);
            current_batch = Some(task.batch);
        }
        let assignment = &task.assignment;
        let session_id = Uuid::new_v4().to_string();
        match launcher::launch_agent(
            &pty_runner,
            assignment,
            &doc,
            &session_id,
            "Start with the highest-priority assigned story.",
            Box::new(|chunk| {
                use std::io::Write;
                let _ = std::io::stdout().write_all(&chunk);
            }),
        ) {
            Ok(session) => println!("Launched {} on {} (pid {})", session.agent_type, session.branch_name, session.process_id),
            Err(e) => eprintln!("Failed to launch {} on {}: {e}", assignment.agent_type, assignment.branch_name),
        }
    }

    Ok(())
}

async fn cmd_watch(repo_path: &Path, prd_path: &Path, agents: &Option<String>) -> Result<(), String> {
    let (doc, groups) = analyze(prd_path, agents)?;
    let mut assignments = discover_assignments(repo_path);
    if assignments.is_empty() {
        assignments = create_worktrees(repo_path, &groups)?;
    }

    tui::run_tui(&assignments, &doc).await.map_err(|e| e.to_string())
}

fn cmd_merge(repo_path: &Path, base: Option<&str>) -> Result<(), String> {
    let git = RealGitService;
    let base_branch = match base {
        Some(b) => b.to_string(),
        None => git.get_current_branch(repo_path).map_err(|e| e.to_string())?,
    };

    let assignments = discover_assignments(repo_path);
    if assignments.is_empty() {
        println!("No worktrees found under this repo's canonical root; nothing to merge.");
        return Ok(());
    }

    let bus = EventBus::new();
    let config = config::load(repo_path).map_err(|e| e.to_string())?;
    let orchestrator = Orchestrator::new(&git, &bus, config);

    let started_at = chrono::Utc::now();
    let result = orchestrator.coordinate_merge(repo_path, &base_branch, &assignments).map_err(|e| e.to_string())?;

    println!("Merge into {}: {}", result.base_branch, if result.success { "success" } else { "failed" });
    for branch in &result.merged_branches {
        println!("  merged {branch}");
    }
    for conflict in &result.conflicts {
        println!("  conflict in {} ({}): {}", conflict.branch_name, conflict.file_path.display(), conflict.detail);
    }
    if result.rolled_back {
        println!("  rolled back to pre-run tip");
    }

    let history = HistoryService::new(HistoryService::default_path());
    let record = OrchestrationRecord {
        id: Uuid::new_v4(),
        repo_path: repo_path.to_path_buf(),
        feature_name: base_branch,
        final_state: orchestrator.state(),
        merge_result: Some(result),
        started_at,
        finished_at: chrono::Utc::now(),
    };
    history.append(record).map_err(|e| e.to_string())?;

    Ok(())
}

fn cmd_status(repo_path: &Path) -> Result<(), String> {
    let detector = RepoDetector::new(RepoDetector::default_store_path());
    let detection = detector.detect_repository(repo_path).map_err(|e| e.to_string())?;

    if !detection.is_git_repo {
        println!("{} is not a git repository.", repo_path.display());
        return Ok(());
    }
    let info = detection.repo_info.expect("is_git_repo implies repo_info is set");
    println!("Repo: {} (branch {})", info.root.display(), info.current_branch);

    let assignments = discover_assignments(repo_path);
    if assignments.is_empty() {
        println!("No active worktree assignments.");
        return Ok(());
    }

    println!("Agents:");
    for assignment in &assignments {
        match orchestrator::read_status_snapshot(&assignment.worktree_path) {
            Some(snapshot) => println!(
                "  {:<30} {:?} story={} progress={:.0}% — {}",
                assignment.branch_name,
                snapshot.state,
                snapshot.current_story_id.as_deref().unwrap_or("-"),
                snapshot.progress * 100.0,
                snapshot.message
            ),
            None => println!("  {:<30} no status reported yet", assignment.branch_name),
        }
    }
    Ok(())
}

fn cmd_history(limit: usize) -> Result<(), String> {
    let history = HistoryService::new(HistoryService::default_path());
    let records = history.load();
    for record in records.into_iter().take(limit) {
        println!(
            "{} {:<20} {:?} {}",
            record.finished_at.format("%Y-%m-%d %H:%M"),
            record.feature_name,
            record.final_state,
            record.repo_path.display()
        );
    }
    Ok(())
}

fn cmd_doctor() -> Result<(), String> {
    let mut checker = ConfigChecker::new();
    let status = checker.check_all(true);
    for tool in &status.tools {
        let mark = if tool.available { "ok" } else { "missing" };
        let detail = tool
            .version
            .clone()
            .or_else(|| tool.path.as_ref().map(|p| p.display().to_string()))
            .unwrap_or_default();
        println!("  {:<10} {:<8} {}", tool.name, mark, detail);
    }
    println!("{}", status.summary);
    Ok(())
}

fn cmd_repos(repo_path: &Path) -> Result<(), String> {
    let detector = RepoDetector::new(RepoDetector::default_store_path());
    let detection = detector.detect_repository(repo_path).map_err(|e| e.to_string())?;
    for recent in &detection.recent_repos {
        println!("{}  {}", recent.last_opened_at.format("%Y-%m-%d %H:%M"), recent.path.display());
    }
    Ok(())
}
