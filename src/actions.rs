//! Per-CLI action availability, plus user-registered custom actions,
//! mirroring this crate's bundled/override split in `skills.rs`, narrowed
//! down to the simpler built-in/override model §4.D
//! describes.

use std::collections::BTreeMap;

use crate::types::{ActionType, AgentType, CustomAction};

/// Process-wide registry of action availability per CLI, plus custom actions.
/// A single logical thread of execution per §5 — callers share one instance
/// behind a mutex.
#[derive(Debug, Default)]
pub struct ActionRegistry {
    overrides: BTreeMap<AgentType, Vec<ActionType>>,
    custom_actions: BTreeMap<String, CustomAction>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the override set for `cli` if one was registered (sorted by
    /// raw value), else all built-in [`ActionType`]s.
    pub fn actions(&self, cli: AgentType) -> Vec<ActionType> {
        match self.overrides.get(&cli) {
            Some(set) => {
                let mut sorted = set.clone();
                sorted.sort();
                sorted
            }
            None => ActionType::BUILT_INS.to_vec(),
        }
    }

    pub fn set_override(&mut self, cli: AgentType, actions: Vec<ActionType>) {
        self.overrides.insert(cli, actions);
    }

    /// True for any built-in action present in `actions(cli)`; for
    /// `ActionType::Custom`, true iff at least one custom action is
    /// registered (custom actions are CLI-filtered separately via
    /// [`ActionRegistry::custom_actions_for`]).
    pub fn is_action_available(&self, action: ActionType, cli: AgentType) -> bool {
        if action == ActionType::Custom {
            return !self.custom_actions.is_empty();
        }
        self.actions(cli).contains(&action)
    }

    /// Idempotent by id: registering the same id again replaces the entry.
    pub fn register_custom_action(&mut self, action: CustomAction) {
        self.custom_actions.insert(action.id.clone(), action);
    }

    pub fn custom_action(&self, id: &str) -> Option<&CustomAction> {
        self.custom_actions.get(id)
    }

    pub fn custom_actions_for(&self, cli: AgentType) -> Vec<&CustomAction> {
        self.custom_actions.values().filter(|a| a.supports(cli)).collect()
    }

    /// Clears both overrides and custom actions.
    pub fn reset(&mut self) {
        self.overrides.clear();
        self.custom_actions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn sample_action(id: &str, clis: BTreeSet<AgentType>) -> CustomAction {
        CustomAction {
            id: id.into(),
            name: id.into(),
            description: "".into(),
            icon_hint: "".into(),
            required_skills: vec![],
            compatible_clis: clis,
        }
    }

    #[test]
    fn default_actions_are_all_built_ins() {
        let registry = ActionRegistry::new();
        let actions = registry.actions(AgentType::Claude);
        assert_eq!(actions.len(), ActionType::BUILT_INS.len());
    }

    #[test]
    fn override_replaces_built_ins_for_that_cli_only() {
        let mut registry = ActionRegistry::new();
        registry.set_override(AgentType::Codex, vec![ActionType::Review]);
        assert_eq!(registry.actions(AgentType::Codex), vec![ActionType::Review]);
        assert_eq!(registry.actions(AgentType::Claude).len(), ActionType::BUILT_INS.len());
    }

    #[test]
    fn custom_action_available_iff_any_registered() {
        let mut registry = ActionRegistry::new();
        assert!(!registry.is_action_available(ActionType::Custom, AgentType::Claude));
        registry.register_custom_action(sample_action("a1", BTreeSet::new()));
        assert!(registry.is_action_available(ActionType::Custom, AgentType::Claude));
    }

    #[test]
    fn register_custom_action_is_idempotent_by_id() {
        let mut registry = ActionRegistry::new();
        registry.register_custom_action(sample_action("dup", BTreeSet::new()));
        registry.register_custom_action(sample_action("dup", BTreeSet::new()));
        assert_eq!(registry.custom_actions_for(AgentType::Claude).len(), 1);
    }

    #[test]
    fn custom_actions_filtered_by_cli() {
        let mut registry = ActionRegistry::new();
        let mut only_claude = BTreeSet::new();
        only_claude.insert(AgentType::Claude);
        registry.register_custom_action(sample_action("claude-only", only_claude));
        assert_eq!(registry.custom_actions_for(AgentType::Claude).len(), 1);
        assert_eq!(registry.custom_actions_for(AgentType::Gemini).len(), 0);
    }

    #[test]
    fn reset_clears_everything() {
        let mut registry = ActionRegistry::new();
        registry.set_override(AgentType::Claude, vec![ActionType::Write]);
        registry.register_custom_action(sample_action("x", BTreeSet::new()));
        registry.reset();
        assert_eq!(registry.actions(AgentType::Claude).len(), ActionType::BUILT_INS.len());
        assert!(!registry.is_action_available(ActionType::Custom, AgentType::Claude));
    }
}
