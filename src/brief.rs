//! Renders the per-agent markdown brief (`AGENT.md`): a pure string-building
//! function assembling fixed sections joined by `\n` — Session Overview,
//! Stories, Coordination, Completion Criteria (§4.J).

use crate::types::{PRDDocument, WorktreeAssignment};

/// Renders the brief for `assignment` against `prd`. `launch_instructions`
/// is the caller-supplied free text appended as the final section. Output is
/// trimmed of surrounding whitespace.
pub fn generate_brief(assignment: &WorktreeAssignment, prd: &PRDDocument, launch_instructions: &str) -> String {
    let mut sections = Vec::new();

    sections.push(format!("# Agent Brief — {}", prd.feature_name));

    let story_ids = assignment.task_group.story_ids.join(", ");
    sections.push(format!(
        "## Session Overview\n\n- Feature: {}\n- Branch: {}\n- Worktree: {}\n- Stories Assigned: {}",
        prd.feature_name,
        assignment.branch_name,
        assignment.worktree_path.display(),
        story_ids,
    ));

    let mut stories_section = String::from("## Stories\n");
    for story_id in &assignment.task_group.story_ids {
        let Some(story) = prd.user_stories.iter().find(|s| &s.id == story_id) else {
            continue;
        };
        stories_section.push_str(&format!(
            "\n### {} — {}\n\n- Priority: {:?}\n- Depends on: {}\n\n{}\n",
            story.id,
            story.title,
            story.priority,
            if story.depends_on.is_empty() { "none".to_string() } else { story.depends_on.join(", ") },
            story.description,
        ));
    }
    sections.push(stories_section.trim_end().to_string());

    sections.push(
        "## Coordination\n\n\
        - Report progress by writing `.crossroads/status.json` in this worktree after every meaningful step.\n\
        - Publish lifecycle events (story started/completed, blocked, needs-help) so the orchestrator can observe them.\n\
        - Record non-obvious decisions in `notes/decisions.md`, gotchas in `notes/learnings.md`, and anything blocking you in `notes/blockers.md`.\n\
        - Do not touch files outside this worktree; other agents are working in sibling worktrees on the same repository."
            .to_string(),
    );

    sections.push(
        "## Completion Criteria\n\n\
        All assigned stories are implemented, their acceptance criteria are met, and the working tree is committed \
        on this branch with no uncommitted changes remaining."
            .to_string(),
    );

    if !launch_instructions.trim().is_empty() {
        sections.push(launch_instructions.trim().to_string());
    }

    sections.join("\n\n").trim().to_string() + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentType, Priority, PRDUserStory, TaskGroup};
    use std::path::PathBuf;

    fn sample_prd() -> PRDDocument {
        PRDDocument {
            feature_name: "F".into(),
            description: "desc".into(),
            template_type: None,
            user_stories: vec![
                PRDUserStory {
                    id: "US-1".into(),
                    title: "T1".into(),
                    description: "Do the thing".into(),
                    priority: Priority::High,
                    depends_on: vec![],
                    acceptance_criteria: vec![],
                    estimated_complexity: None,
                    unit_test: None,
                },
                PRDUserStory {
                    id: "US-2".into(),
                    title: "T2".into(),
                    description: "Do the other thing".into(),
                    priority: Priority::Medium,
                    depends_on: vec!["US-1".into()],
                    acceptance_criteria: vec![],
                    estimated_complexity: None,
                    unit_test: None,
                },
            ],
            vision: None,
            success_metrics: vec![],
        }
    }

    fn sample_assignment() -> WorktreeAssignment {
        WorktreeAssignment {
            id: uuid::Uuid::new_v4(),
            task_group: TaskGroup {
                id: "US-1".into(),
                preferred_agent: AgentType::Claude,
                story_ids: vec!["US-1".into(), "US-2".into()],
                estimated_complexity: 15,
            },
            agent_type: AgentType::Claude,
            branch_name: "agent/claude-us-1".into(),
            worktree_path: PathBuf::from("/tmp/worktree"),
        }
    }

    #[test]
    fn brief_contains_stories_assigned_line() {
        let brief = generate_brief(&sample_assignment(), &sample_prd(), "");
        assert!(brief.contains("Stories Assigned: US-1, US-2"));
    }

    #[test]
    fn brief_includes_each_assigned_story_title_and_description() {
        let brief = generate_brief(&sample_assignment(), &sample_prd(), "");
        assert!(brief.contains("US-1 — T1"));
        assert!(brief.contains("Do the thing"));
        assert!(brief.contains("US-2 — T2"));
        assert!(brief.contains("Depends on: US-1"));
    }

    #[test]
    fn brief_has_coordination_and_completion_sections() {
        let brief = generate_brief(&sample_assignment(), &sample_prd(), "");
        assert!(brief.contains("## Coordination"));
        assert!(brief.contains("## Completion Criteria"));
    }

    #[test]
    fn brief_appends_launch_instructions_when_present() {
        let brief = generate_brief(&sample_assignment(), &sample_prd(), "Start with US-1.");
        assert!(brief.trim_end().ends_with("Start with US-1."));
    }

    #[test]
    fn brief_is_trimmed_with_single_trailing_newline() {
        let brief = generate_brief(&sample_assignment(), &sample_prd(), "  ");
        assert!(!brief.starts_with('\n'));
        assert!(brief.ends_with('\n'));
        assert!(!brief.ends_with("\n\n"));
    }
}
