//! Decodes PRD JSON and validates it: unique story ids, resolvable
//! dependencies, acyclic dependency graph, via a three-stage pipeline (id
//! uniqueness → dependency resolution → DFS cycle detection).

use std::collections::{HashMap, HashSet};
use std::path::Path;

use thiserror::Error;

use crate::types::{PRDDocument, PRDUserStory, Priority};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrdError {
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("duplicate story id: {0}")]
    DuplicateStoryId(String),
    #[error("story {story} depends on missing story {dep}")]
    MissingDependency { story: String, dep: String },
    #[error("unsupported priority: {0}")]
    UnsupportedPriority(String),
    #[error("circular dependency: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
}

/// Raw, pre-validation wire shape (snake_case per §6); `priority` is left as
/// a string so unsupported values produce `UnsupportedPriority` instead of a
/// generic deserialize failure.
#[derive(Debug, serde::Deserialize)]
struct RawStory {
    id: String,
    title: String,
    #[serde(default)]
    description: String,
    priority: String,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    acceptance_criteria: Vec<String>,
    #[serde(default)]
    estimated_complexity: Option<String>,
    #[serde(default)]
    unit_test: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct RawPrd {
    feature_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    template_type: Option<String>,
    user_stories: Vec<RawStory>,
    #[serde(default)]
    vision: Option<String>,
    #[serde(default)]
    success_metrics: Vec<String>,
}

pub fn parse_file(path: &Path) -> Result<PRDDocument, PrdError> {
    let content = std::fs::read_to_string(path)
        .map_err(|_| PrdError::FileNotFound(path.display().to_string()))?;
    parse_str(&content)
}

/// Pure function: byte-identical input yields an equal document or the same
/// error (property 1).
pub fn parse_str(content: &str) -> Result<PRDDocument, PrdError> {
    let raw: RawPrd = serde_json::from_str(content).map_err(|e| PrdError::InvalidData(e.to_string()))?;

    let mut seen_ids = HashSet::new();
    let mut stories = Vec::with_capacity(raw.user_stories.len());
    for story in &raw.user_stories {
        if !seen_ids.insert(story.id.clone()) {
            return Err(PrdError::DuplicateStoryId(story.id.clone()));
        }
        let priority = Priority::parse(&story.priority)
            .ok_or_else(|| PrdError::UnsupportedPriority(story.priority.clone()))?;
        stories.push(PRDUserStory {
            id: story.id.clone(),
            title: story.title.clone(),
            description: story.description.clone(),
            priority,
            depends_on: story.depends_on.clone(),
            acceptance_criteria: story.acceptance_criteria.clone(),
            estimated_complexity: story.estimated_complexity.clone(),
            unit_test: story.unit_test.clone(),
        });
    }

    for story in &stories {
        for dep in &story.depends_on {
            if !seen_ids.contains(dep) {
                return Err(PrdError::MissingDependency {
                    story: story.id.clone(),
                    dep: dep.clone(),
                });
            }
        }
    }

    detect_cycle(&stories)?;

    Ok(PRDDocument {
        feature_name: raw.feature_name,
        description: raw.description,
        template_type: raw.template_type,
        user_stories: stories,
        vision: raw.vision,
        success_metrics: raw.success_metrics,
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting,
    Done,
}

/// DFS cycle detection. The reported cycle begins at the re-encountered node
/// in the current DFS path and ends with that node again, e.g. `[B, C, B]`.
fn detect_cycle(stories: &[PRDUserStory]) -> Result<(), PrdError> {
    let by_id: HashMap<&str, &PRDUserStory> = stories.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut state: HashMap<&str, VisitState> = HashMap::new();

    for story in stories {
        if state.contains_key(story.id.as_str()) {
            continue;
        }
        let mut path: Vec<&str> = Vec::new();
        if let Some(cycle) = visit(story.id.as_str(), &by_id, &mut state, &mut path) {
            return Err(PrdError::CircularDependency { cycle });
        }
    }
    Ok(())
}

fn visit<'a>(
    id: &'a str,
    by_id: &HashMap<&'a str, &'a PRDUserStory>,
    state: &mut HashMap<&'a str, VisitState>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    state.insert(id, VisitState::Visiting);
    path.push(id);

    if let Some(story) = by_id.get(id) {
        for dep in &story.depends_on {
            let dep = dep.as_str();
            match state.get(dep) {
                Some(VisitState::Visiting) => {
                    let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(dep.to_string());
                    return Some(cycle);
                }
                Some(VisitState::Done) => continue,
                None => {
                    if let Some(cycle) = visit(dep, by_id, state, path) {
                        return Some(cycle);
                    }
                }
            }
        }
    }

    path.pop();
    state.insert(id, VisitState::Done);
    None
}
