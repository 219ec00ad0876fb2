//! Prepares worktree artifacts and launches a CLI agent in a PTY, opening the
//! PTY via `portable_pty` and building per-backend launch arguments through
//! one [`Adapter`] per [`AgentType`].

use std::collections::HashMap;
use std::io::{Read as _, Write as _};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::brief;
use crate::notes::{self, NotesError};
use crate::types::{AgentSession, AgentType, PRDDocument, WorktreeAssignment};

#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("failed to write AGENT.md: {0}")]
    InstructionsWriteFailed(std::io::Error),
    #[error("failed to prepare notes directory: {0}")]
    NotesDirectoryFailed(#[from] NotesError),
    #[error("adapter unavailable for {0}: executable not found on PATH")]
    AdapterUnavailable(AgentType),
    #[error("pty launch failed: {0}")]
    PtyLaunchFailed(String),
}

/// Per-CLI executable resolution, launch arguments, and instruction
/// formatting. One variant per [`AgentType`] (§9's "adapter polymorphism").
pub trait Adapter {
    fn agent_type(&self) -> AgentType;
    fn is_available(&self) -> bool {
        which(self.agent_type().executable_name()).is_some()
    }
    fn launch_arguments(&self, worktree_path: &Path) -> Vec<String>;
    fn format_command(&self, instructions: &str) -> String;
}

fn which(executable: &str) -> Option<std::path::PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(executable))
        .find(|candidate| candidate.is_file())
}

struct ClaudeAdapter;
impl Adapter for ClaudeAdapter {
    fn agent_type(&self) -> AgentType {
        AgentType::Claude
    }
    fn launch_arguments(&self, _worktree_path: &Path) -> Vec<String> {
        vec!["--dangerously-skip-permissions".into()]
    }
    fn format_command(&self, instructions: &str) -> String {
        format!("{instructions}\n")
    }
}

struct GeminiAdapter;
impl Adapter for GeminiAdapter {
    fn agent_type(&self) -> AgentType {
        AgentType::Gemini
    }
    fn launch_arguments(&self, _worktree_path: &Path) -> Vec<String> {
        vec!["--yolo".into()]
    }
    fn format_command(&self, instructions: &str) -> String {
        format!("{instructions}\n")
    }
}

struct CodexAdapter;
impl Adapter for CodexAdapter {
    fn agent_type(&self) -> AgentType {
        AgentType::Codex
    }
    fn launch_arguments(&self, _worktree_path: &Path) -> Vec<String> {
        vec!["--full-auto".into()]
    }
    fn format_command(&self, instructions: &str) -> String {
        format!("{instructions}\n")
    }
}

pub fn adapter_for(agent_type: AgentType) -> Box<dyn Adapter> {
    match agent_type {
        AgentType::Claude => Box::new(ClaudeAdapter),
        AgentType::Gemini => Box::new(GeminiAdapter),
        AgentType::Codex => Box::new(CodexAdapter),
    }
}

/// Narrow collaborator contract for PTY process launch (§6:
/// `PTYProcessRunner`). A real implementation backs onto `portable_pty`;
/// tests substitute a fake.
pub trait PtyRunner {
    fn launch(
        &self,
        exe: &str,
        args: &[String],
        cwd: &Path,
        env: &[(String, String)],
        on_output: Box<dyn FnMut(Vec<u8>) + Send>,
    ) -> Result<u32, LauncherError>;

    fn send_input(&self, process_id: u32, text: &str) -> Result<(), LauncherError>;
}

/// Backs onto `portable_pty`: opens a PTY via `native_pty_system()`, spawns
/// the child, and feeds output through a reader loop. Each launch's writer
/// half of the PTY is retained here keyed by `process_id` so a later
/// `send_input` call can still reach the child's stdin.
pub struct PortablePtyRunner {
    writers: Mutex<HashMap<u32, Box<dyn Write + Send>>>,
}

impl PortablePtyRunner {
    pub fn new() -> Self {
        PortablePtyRunner { writers: Mutex::new(HashMap::new()) }
    }
}

impl Default for PortablePtyRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl PtyRunner for PortablePtyRunner {
    fn launch(
        &self,
        exe: &str,
        args: &[String],
        cwd: &Path,
        env: &[(String, String)],
        mut on_output: Box<dyn FnMut(Vec<u8>) + Send>,
    ) -> Result<u32, LauncherError> {
        use portable_pty::{native_pty_system, CommandBuilder, PtySize};

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize { rows: 40, cols: 120, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| LauncherError::PtyLaunchFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(exe);
        cmd.args(args);
        cmd.cwd(cwd);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| LauncherError::PtyLaunchFailed(e.to_string()))?;
        let process_id = child.process_id().unwrap_or(0);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| LauncherError::PtyLaunchFailed(e.to_string()))?;
        self.writers
            .lock()
            .expect("pty writer map lock poisoned")
            .insert(process_id, writer);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| LauncherError::PtyLaunchFailed(e.to_string()))?;
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => on_output(buf[..n].to_vec()),
                    Err(_) => break,
                }
            }
        });

        Ok(process_id)
    }

    fn send_input(&self, process_id: u32, text: &str) -> Result<(), LauncherError> {
        let mut writers = self.writers.lock().expect("pty writer map lock poisoned");
        let writer = writers
            .get_mut(&process_id)
            .ok_or_else(|| LauncherError::PtyLaunchFailed(format!("no PTY writer registered for process {process_id}")))?;
        writer.write_all(text.as_bytes()).map_err(|e| LauncherError::PtyLaunchFailed(e.to_string()))?;
        writer.flush().map_err(|e| LauncherError::PtyLaunchFailed(e.to_string()))
    }
}

/// Single public operation per §4.K. `pty_runner` is the PTY collaborator;
/// `on_output` receives raw PTY bytes as they arrive.
pub fn launch_agent(
    pty_runner: &dyn PtyRunner,
    assignment: &WorktreeAssignment,
    prd: &PRDDocument,
    session_id: &str,
    instructions: &str,
    on_output: Box<dyn FnMut(Vec<u8>) + Send>,
) -> Result<AgentSession, LauncherError> {
    std::fs::create_dir_all(&assignment.worktree_path)
        .map_err(LauncherError::InstructionsWriteFailed)?;
    notes::ensure_canonical_notes(&assignment.worktree_path)?;

    let brief = brief::generate_brief(assignment, prd, instructions);
    let agent_md = assignment.worktree_path.join("AGENT.md");
    let tmp = assignment.worktree_path.join("AGENT.md.tmp");
    std::fs::write(&tmp, &brief).map_err(LauncherError::InstructionsWriteFailed)?;
    std::fs::rename(&tmp, &agent_md).map_err(LauncherError::InstructionsWriteFailed)?;

    let adapter = adapter_for(assignment.agent_type);
    if !adapter.is_available() {
        return Err(LauncherError::AdapterUnavailable(assignment.agent_type));
    }

    let mut env: Vec<(String, String)> = std::env::vars().collect();
    env.push(("CROSSROADS_SESSION_ID".into(), session_id.to_string()));
    env.push(("CROSSROADS_AGENT_TYPE".into(), assignment.agent_type.raw_name().to_string()));
    env.push(("CROSSROADS_BRANCH".into(), assignment.branch_name.clone()));
    env.push((
        "CROSSROADS_ASSIGNED_STORIES".into(),
        assignment.task_group.story_ids.join(","),
    ));
    env.push(("CROSSROADS_ASSIGNMENT_ID".into(), assignment.id.to_string()));

    let args = adapter.launch_arguments(&assignment.worktree_path);
    let process_id = pty_runner.launch(
        adapter.agent_type().executable_name(),
        &args,
        &assignment.worktree_path,
        &env,
        on_output,
    )?;

    std::thread::sleep(Duration::from_millis(500));
    pty_runner.send_input(process_id, &adapter.format_command(instructions))?;

    Ok(AgentSession {
        id: Uuid::new_v4(),
        process_id,
        agent_type: assignment.agent_type,
        branch_name: assignment.branch_name.clone(),
        worktree_path: assignment.worktree_path.clone(),
        stories: assignment.task_group.story_ids.clone(),
        started_at: chrono::Utc::now(),
    })
}
