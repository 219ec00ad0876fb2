//! Clusters PRD stories by dependency closure and picks an agent per
//! cluster, via a BFS transitive closure over the dependency graph, undirected
//! connectivity over the full dependency graph instead of a BFS bounded by a
//! single review-type milestone.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use crate::types::{AgentType, PRDDocument, PRDUserStory, Priority, TaskGroup};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskSplitError {
    #[error("no agents available")]
    NoAgentsAvailable,
}

fn undirected_adjacency(stories: &[PRDUserStory]) -> HashMap<&str, HashSet<&str>> {
    let mut adjacency: HashMap<&str, HashSet<&str>> = HashMap::new();
    for story in stories {
        adjacency.entry(story.id.as_str()).or_default();
        for dep in &story.depends_on {
            adjacency.entry(story.id.as_str()).or_default().insert(dep.as_str());
            adjacency.entry(dep.as_str()).or_default().insert(story.id.as_str());
        }
    }
    adjacency
}

fn connected_component<'a>(
    seed: &'a str,
    adjacency: &HashMap<&'a str, HashSet<&'a str>>,
) -> Vec<&'a str> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(seed);
    visited.insert(seed);
    let mut members = Vec::new();

    while let Some(current) = queue.pop_front() {
        members.push(current);
        if let Some(neighbors) = adjacency.get(current) {
            for &n in neighbors {
                if visited.insert(n) {
                    queue.push_back(n);
                }
            }
        }
    }
    members
}

struct AgentPicker<'a> {
    available: &'a [AgentType],
    high_priority_cursor: usize,
}

impl<'a> AgentPicker<'a> {
    fn new(available: &'a [AgentType]) -> Self {
        AgentPicker { available, high_priority_cursor: 0 }
    }

    fn pick(&mut self, max_priority: Priority) -> AgentType {
        match max_priority {
            Priority::Critical => {
                if self.available.contains(&AgentType::Claude) {
                    AgentType::Claude
                } else {
                    self.available[0]
                }
            }
            Priority::High => {
                let high_priority_agents: Vec<AgentType> = self
                    .available
                    .iter()
                    .copied()
                    .filter(|a| *a != AgentType::Codex)
                    .collect();
                let pool = if high_priority_agents.is_empty() {
                    self.available.to_vec()
                } else {
                    high_priority_agents
                };
                let chosen = pool[self.high_priority_cursor % pool.len()];
                self.high_priority_cursor += 1;
                chosen
            }
            Priority::Medium | Priority::Low => {
                if self.available.contains(&AgentType::Codex) {
                    AgentType::Codex
                } else {
                    self.available[0]
                }
            }
        }
    }
}

/// Clusters `doc`'s stories by dependency closure and assigns a preferred
/// agent to each cluster. `available` is the caller's candidate set;
/// defaults to all [`AgentType`]s when empty. Fails only when both
/// `available` and the default set are empty, which cannot happen since
/// `AgentType::ALL` is non-empty — kept for parity with §4.G's stated error.
pub fn split(doc: &PRDDocument, available: &[AgentType]) -> Result<Vec<TaskGroup>, TaskSplitError> {
    let agents: Vec<AgentType> = if available.is_empty() {
        AgentType::ALL.to_vec()
    } else {
        available.to_vec()
    };
    if agents.is_empty() {
        return Err(TaskSplitError::NoAgentsAvailable);
    }

    let mut sorted_stories: Vec<&PRDUserStory> = doc.user_stories.iter().collect();
    sorted_stories.sort_by(|a, b| b.priority.weight().cmp(&a.priority.weight()));

    let adjacency = undirected_adjacency(&doc.user_stories);
    let by_id: HashMap<&str, &PRDUserStory> = doc.user_stories.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut assigned: HashSet<&str> = HashSet::new();
    let mut groups = Vec::new();
    let mut picker = AgentPicker::new(&agents);

    for story in sorted_stories {
        if assigned.contains(story.id.as_str()) {
            continue;
        }
        let member_ids = connected_component(story.id.as_str(), &adjacency);
        for id in &member_ids {
            assigned.insert(id);
        }

        let max_priority = member_ids
            .iter()
            .filter_map(|id| by_id.get(id))
            .map(|s| s.priority)
            .max()
            .unwrap_or(Priority::Low);

        let mut story_ids: Vec<String> = member_ids.iter().map(|s| s.to_string()).collect();
        story_ids.sort();

        let estimated_complexity: u32 = member_ids
            .iter()
            .filter_map(|id| by_id.get(id))
            .map(|s| s.priority.weight())
            .sum();

        groups.push(TaskGroup {
            id: story.id.clone(),
            preferred_agent: picker.pick(max_priority),
            story_ids,
            estimated_complexity,
        });
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(id: &str, priority: Priority, deps: &[&str]) -> PRDUserStory {
        PRDUserStory {
            id: id.into(),
            title: id.into(),
            description: "".into(),
            priority,
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            acceptance_criteria: vec![],
            estimated_complexity: None,
            unit_test: None,
        }
    }

    fn doc(stories: Vec<PRDUserStory>) -> PRDDocument {
        PRDDocument {
            feature_name: "F".into(),
            description: "".into(),
            template_type: None,
            user_stories: stories,
            vision: None,
            success_metrics: vec![],
        }
    }

    #[test]
    fn single_agent_clusters_dependent_stories_together() {
        let prd = doc(vec![
            story("US-1", Priority::High, &[]),
            story("US-2", Priority::Medium, &["US-1"]),
        ]);
        let groups = split(&prd, &[AgentType::Claude]).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, "US-1");
        assert_eq!(groups[0].preferred_agent, AgentType::Claude);
        assert_eq!(groups[0].story_ids, vec!["US-1".to_string(), "US-2".to_string()]);
    }

    #[test]
    fn groups_partition_story_set_without_duplicates_or_omissions() {
        let prd = doc(vec![
            story("A", Priority::Critical, &[]),
            story("B", Priority::High, &[]),
            story("C", Priority::Medium, &["B"]),
        ]);
        let groups = split(&prd, &[AgentType::Claude, AgentType::Gemini, AgentType::Codex]).unwrap();
        let mut all_ids: Vec<&String> = groups.iter().flat_map(|g| g.story_ids.iter()).collect();
        all_ids.sort();
        assert_eq!(all_ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn agent_selection_matches_scenario_s4() {
        let prd = doc(vec![
            story("crit", Priority::Critical, &[]),
            story("high1", Priority::High, &[]),
            story("high2", Priority::High, &[]),
            story("med", Priority::Medium, &[]),
        ]);
        let agents = [AgentType::Claude, AgentType::Gemini, AgentType::Codex];
        let groups = split(&prd, &agents).unwrap();

        let crit = groups.iter().find(|g| g.id == "crit").unwrap();
        assert_eq!(crit.preferred_agent, AgentType::Claude);

        let high1 = groups.iter().find(|g| g.id == "high1").unwrap();
        let high2 = groups.iter().find(|g| g.id == "high2").unwrap();
        let high_agents: HashSet<AgentType> = [high1.preferred_agent, high2.preferred_agent].into_iter().collect();
        assert_eq!(high_agents, [AgentType::Claude, AgentType::Gemini].into_iter().collect());

        let med = groups.iter().find(|g| g.id == "med").unwrap();
        assert_eq!(med.preferred_agent, AgentType::Codex);
    }

    #[test]
    fn empty_available_defaults_to_all_agent_types() {
        let prd = doc(vec![story("A", Priority::Low, &[])]);
        let groups = split(&prd, &[]).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].preferred_agent, AgentType::Codex);
    }

    #[test]
    fn estimated_complexity_sums_member_weights() {
        let prd = doc(vec![
            story("A", Priority::Critical, &[]),
            story("B", Priority::Low, &["A"]),
        ]);
        let groups = split(&prd, &[AgentType::Claude]).unwrap();
        assert_eq!(groups[0].estimated_complexity, Priority::Critical.weight() + Priority::Low.weight());
    }
}
