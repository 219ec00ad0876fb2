//! Loads bundled + user skill definitions with per-CLI compatibility
//! filtering: a fixed set of skills built into the binary, overlaid with
//! user-authored ones discovered by directory walk. Each of the nine bundled
//! skills is a [`crate::types::Skill`] record (prompt template, required tools,
//! compatible CLIs) rather than a folder of markdown files, and user
//! overrides come from individual `*.skill.json` files instead of a
//! `.claude/skills/` sync target.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::{AgentType, Skill, SkillOrigin};

#[derive(Debug, Error, Clone)]
pub enum SkillLoadError {
    #[error("{path}: invalid JSON: {cause}")]
    InvalidJson { path: PathBuf, cause: String },
    #[error("{path}: not found")]
    NotFound { path: PathBuf },
}

fn clis(names: &[AgentType]) -> BTreeSet<AgentType> {
    names.iter().copied().collect()
}

fn tools(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn bundled_skills() -> Vec<Skill> {
    vec![
        Skill {
            id: "commit".into(),
            name: "Commit".into(),
            description: "Stage and commit the current worktree's changes with a descriptive message".into(),
            prompt_template: "Review the working tree diff and write a commit for it.\n\n{{context}}".into(),
            required_tools: tools(&["git"]),
            version: "1.0.0".into(),
            compatible_clis: BTreeSet::new(),
            category: "other".into(),
            author: "core".into(),
            origin: SkillOrigin::Bundled,
        },
        Skill {
            id: "code-writer".into(),
            name: "Code Writer".into(),
            description: "Implement a user story end to end, including tests".into(),
            prompt_template: "Implement the following story. Write tests alongside the implementation.\n\n{{context}}".into(),
            required_tools: tools(&["fs", "git"]),
            version: "1.0.0".into(),
            compatible_clis: BTreeSet::new(),
            category: "code".into(),
            author: "core".into(),
            origin: SkillOrigin::Bundled,
        },
        Skill {
            id: "code-reviewer".into(),
            name: "Code Reviewer".into(),
            description: "Review a branch's diff for correctness, style, and missed edge cases".into(),
            prompt_template: "Review the diff below for correctness and style issues.\n\n{{context}}".into(),
            required_tools: tools(&["git"]),
            version: "1.0.0".into(),
            compatible_clis: BTreeSet::new(),
            category: "review".into(),
            author: "core".into(),
            origin: SkillOrigin::Bundled,
        },
        Skill {
            id: "prd".into(),
            name: "PRD Author".into(),
            description: "Draft or refine a product requirements document from a feature description".into(),
            prompt_template: "Draft a PRD with user stories, priorities, and dependencies for:\n\n{{context}}".into(),
            required_tools: tools(&["fs"]),
            version: "1.0.0".into(),
            compatible_clis: clis(&[AgentType::Claude, AgentType::Gemini]),
            category: "docs".into(),
            author: "core".into(),
            origin: SkillOrigin::Bundled,
        },
        Skill {
            id: "doc-generator".into(),
            name: "Doc Generator".into(),
            description: "Generate or update project documentation for recently changed code".into(),
            prompt_template: "Generate documentation covering the changes below.\n\n{{context}}".into(),
            required_tools: tools(&["fs"]),
            version: "1.0.0".into(),
            compatible_clis: BTreeSet::new(),
            category: "docs".into(),
            author: "core".into(),
            origin: SkillOrigin::Bundled,
        },
        Skill {
            id: "lint".into(),
            name: "Lint".into(),
            description: "Run and fix lint findings for the files touched in this worktree".into(),
            prompt_template: "Run the project's linter and fix reported issues.\n\n{{context}}".into(),
            required_tools: tools(&["fs", "shell"]),
            version: "1.0.0".into(),
            compatible_clis: BTreeSet::new(),
            category: "other".into(),
            author: "core".into(),
            origin: SkillOrigin::Bundled,
        },
        Skill {
            id: "integration-test".into(),
            name: "Integration Test".into(),
            description: "Write or extend integration tests covering a cluster's stories".into(),
            prompt_template: "Write integration tests covering the stories below.\n\n{{context}}".into(),
            required_tools: tools(&["fs", "shell"]),
            version: "1.0.0".into(),
            compatible_clis: BTreeSet::new(),
            category: "test".into(),
            author: "core".into(),
            origin: SkillOrigin::Bundled,
        },
        Skill {
            id: "e2e-test".into(),
            name: "End-to-End Test".into(),
            description: "Write or extend end-to-end tests exercising the user-visible flow".into(),
            prompt_template: "Write end-to-end tests exercising the flow below.\n\n{{context}}".into(),
            required_tools: tools(&["fs", "shell"]),
            version: "1.0.0".into(),
            compatible_clis: BTreeSet::new(),
            category: "test".into(),
            author: "core".into(),
            origin: SkillOrigin::Bundled,
        },
        Skill {
            id: "perf-test".into(),
            name: "Performance Test".into(),
            description: "Write or run a performance benchmark for a hot path".into(),
            prompt_template: "Write a benchmark for the hot path below and report timings.\n\n{{context}}".into(),
            required_tools: tools(&["fs", "shell"]),
            version: "1.0.0".into(),
            compatible_clis: clis(&[AgentType::Claude, AgentType::Codex]),
            category: "test".into(),
            author: "core".into(),
            origin: SkillOrigin::Bundled,
        },
    ]
}

/// Loads bundled skills plus `~/.xroads/skills/*.skill.json` overrides.
/// A process-wide singleton per §5 — callers share one instance behind a
/// mutex.
pub struct SkillRegistry {
    user_skills_dir: PathBuf,
    skills: Vec<Skill>,
    load_errors: Vec<SkillLoadError>,
}

impl SkillRegistry {
    pub fn default_user_skills_dir() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        PathBuf::from(home).join(".xroads/skills")
    }

    pub fn new(user_skills_dir: PathBuf) -> Self {
        let mut registry = SkillRegistry {
            user_skills_dir,
            skills: Vec::new(),
            load_errors: Vec::new(),
        };
        registry.initialize();
        registry
    }

    /// Loads bundled skills, then scans for user overrides. Malformed files
    /// produce a [`SkillLoadError`] but never abort loading.
    pub fn initialize(&mut self) {
        let mut by_id = std::collections::BTreeMap::new();
        for skill in bundled_skills() {
            by_id.insert(skill.id.clone(), skill);
        }

        self.load_errors.clear();
        if let Ok(entries) = std::fs::read_dir(&self.user_skills_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !is_skill_json(&path) {
                    continue;
                }
                match std::fs::read_to_string(&path) {
                    Ok(content) => match serde_json::from_str::<Skill>(&content) {
                        Ok(mut skill) => {
                            skill.origin = SkillOrigin::User;
                            by_id.insert(skill.id.clone(), skill);
                        }
                        Err(e) => self.load_errors.push(SkillLoadError::InvalidJson {
                            path: path.clone(),
                            cause: e.to_string(),
                        }),
                    },
                    Err(_) => self.load_errors.push(SkillLoadError::NotFound { path: path.clone() }),
                }
            }
        }

        self.skills = by_id.into_values().collect();
        self.skills.sort_by(|a, b| a.id.cmp(&b.id));
    }

    pub fn reload(&mut self) {
        self.initialize();
    }

    pub fn get_load_errors(&self) -> &[SkillLoadError] {
        &self.load_errors
    }

    pub fn by_id(&self, id: &str) -> Option<&Skill> {
        self.skills.iter().find(|s| s.id == id)
    }

    pub fn by_ids(&self, ids: &[String]) -> Vec<&Skill> {
        let mut found: Vec<&Skill> = self.skills.iter().filter(|s| ids.contains(&s.id)).collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    pub fn compatible_with(&self, cli: AgentType) -> Vec<&Skill> {
        let mut found: Vec<&Skill> = self.skills.iter().filter(|s| s.supports(cli)).collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    pub fn by_category(&self, category: &str) -> Vec<&Skill> {
        let mut found: Vec<&Skill> = self.skills.iter().filter(|s| s.category == category).collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    pub fn all(&self) -> &[Skill] {
        &self.skills
    }
}

fn is_skill_json(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(".skill.json"))
        .unwrap_or(false)
}
