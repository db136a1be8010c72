//! Selection state and pose gating.
//!
//! While an entity is selected (e.g. being dragged), pose updates for it and
//! for anything scoped under its name are not applied.

use crate::entity::EntityId;
use crate::message::SelectionMsg;
use crate::registry::EntityRegistry;

/// The currently selected entity, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    selected: Option<(EntityId, String)>,
}

impl SelectionState {
    /// Nothing selected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the selected entity.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.selected.as_ref().map(|(_, name)| name.as_str())
    }

    /// Handle of the selected entity.
    #[must_use]
    pub fn id(&self) -> Option<EntityId> {
        self.selected.as_ref().map(|(id, _)| *id)
    }

    /// Apply a selection message against the registry.
    ///
    /// Selecting an unknown name clears the selection.
    pub fn apply(&mut self, msg: &SelectionMsg, registry: &EntityRegistry) {
        if !msg.selected {
            if msg.name.is_empty() || self.name() == Some(msg.name.as_str()) {
                self.clear();
            }
            return;
        }

        match registry.resolve(&msg.name) {
            Some(id) => {
                let name = registry
                    .get(id)
                    .map_or_else(|| msg.name.clone(), |e| e.name.clone());
                tracing::debug!("Selected {name}");
                self.selected = Some((id, name));
            }
            None => {
                tracing::debug!("Selection target {} not found, clearing", msg.name);
                self.clear();
            }
        }
    }

    /// Clear the selection.
    pub fn clear(&mut self) {
        self.selected = None;
    }

    /// Clear the selection if it names one of `removed`.
    pub fn on_removed(&mut self, removed: &[String]) {
        if self
            .name()
            .is_some_and(|name| removed.iter().any(|r| r == name))
        {
            tracing::debug!("Selected entity removed, clearing selection");
            self.clear();
        }
    }

    /// Whether pose updates for `name` must be suppressed.
    #[must_use]
    pub fn gates(&self, name: &str) -> bool {
        self.name().is_some_and(|selected| name.starts_with(selected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;

    fn registry_with(names: &[&str]) -> EntityRegistry {
        let mut registry = EntityRegistry::new("default");
        let root = registry.root();
        for name in names {
            registry
                .upsert(
                    name,
                    root,
                    EntityKind::Visual {
                        geometry: None,
                        material: None,
                    },
                )
                .expect("upsert");
        }
        registry
    }

    fn select(name: &str, selected: bool) -> SelectionMsg {
        SelectionMsg {
            name: name.to_string(),
            selected,
        }
    }

    #[test]
    fn test_gates_by_prefix() {
        let registry = registry_with(&["box1", "box10"]);
        let mut selection = SelectionState::new();
        selection.apply(&select("box1", true), &registry);

        assert!(selection.gates("box1"));
        assert!(selection.gates("box1::link"));
        assert!(!selection.gates("sphere"));
    }

    #[test]
    fn test_unknown_target_clears() {
        let registry = registry_with(&["box1"]);
        let mut selection = SelectionState::new();
        selection.apply(&select("box1", true), &registry);
        selection.apply(&select("missing", true), &registry);
        assert!(selection.name().is_none());
    }

    #[test]
    fn test_deselect_only_matching_name() {
        let registry = registry_with(&["box1", "box2"]);
        let mut selection = SelectionState::new();
        selection.apply(&select("box1", true), &registry);

        selection.apply(&select("box2", false), &registry);
        assert_eq!(selection.name(), Some("box1"));

        selection.apply(&select("box1", false), &registry);
        assert!(selection.name().is_none());
    }

    #[test]
    fn test_cleared_when_entity_removed() {
        let registry = registry_with(&["box1"]);
        let mut selection = SelectionState::new();
        selection.apply(&select("box1", true), &registry);

        selection.on_removed(&["other".to_string()]);
        assert!(selection.name().is_some());
        selection.on_removed(&["box1".to_string()]);
        assert!(selection.name().is_none());
    }
}
