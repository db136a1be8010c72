//! Entity registry - the name-keyed, hierarchically owned scene store.

use std::collections::{HashMap, HashSet};

use slotmap::SlotMap;

use crate::entity::{derived_suffixes, Entity, EntityId, EntityKind, WORLD_ROOT};
use crate::{SyncError, SyncResult};

/// Outcome of [`EntityRegistry::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    /// A new entity was created.
    Created(EntityId),
    /// An existing entity's payload was replaced.
    Updated(EntityId),
}

impl Upserted {
    /// Handle of the affected entity.
    #[must_use]
    pub const fn id(self) -> EntityId {
        match self {
            Self::Created(id) | Self::Updated(id) => id,
        }
    }

    /// Whether a new entity was created.
    #[must_use]
    pub const fn is_created(self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Store of live entities.
///
/// Entities live in an arena and own their children by handle, so removing
/// a parent frees its whole subtree without a separate reachability sweep.
/// The registry is not synchronized; only the reconciler thread touches it.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    entities: SlotMap<EntityId, Entity>,
    names: HashMap<String, EntityId>,
    root: EntityId,
    world_name: String,
}

impl EntityRegistry {
    /// Create a registry holding only the world root.
    #[must_use]
    pub fn new(world_name: impl Into<String>) -> Self {
        let mut entities = SlotMap::with_key();
        let root = entities
            .insert_with_key(|id| Entity::new(id, WORLD_ROOT.to_string(), EntityKind::World, None));
        let mut names = HashMap::new();
        names.insert(WORLD_ROOT.to_string(), root);
        Self {
            entities,
            names,
            root,
            world_name: world_name.into(),
        }
    }

    /// Handle of the world root.
    #[must_use]
    pub const fn root(&self) -> EntityId {
        self.root
    }

    /// Name of the mirrored world.
    #[must_use]
    pub fn world_name(&self) -> &str {
        &self.world_name
    }

    /// Find an entity by its exact name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    /// Find an entity by name, falling back to `"<world>::<name>"`.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<EntityId> {
        self.lookup(name)
            .or_else(|| self.lookup(&format!("{}::{name}", self.world_name)))
    }

    /// Whether an entity with this exact name is live.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Get an entity by handle.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Get a mutable entity by handle.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    /// Get an entity by exact name.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Entity> {
        self.lookup(name).and_then(|id| self.entities.get(id))
    }

    /// Create `name` under `parent`, or replace its payload if it exists.
    ///
    /// Updating never moves an entity to another parent, so an entity can
    /// never become its own ancestor.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RootProtected`] for the root name,
    /// [`SyncError::ParentMissing`] if `parent` is not live, and
    /// [`SyncError::NameOutsideParent`] if an ordinary visual is not nested
    /// under its parent's name.
    pub fn upsert(
        &mut self,
        name: &str,
        parent: EntityId,
        kind: EntityKind,
    ) -> SyncResult<Upserted> {
        if name == WORLD_ROOT {
            return Err(SyncError::RootProtected(name.to_string()));
        }

        if let Some(id) = self.lookup(name) {
            if let Some(entity) = self.entities.get_mut(id) {
                entity.kind = kind;
            }
            return Ok(Upserted::Updated(id));
        }

        let parent_name = self
            .entities
            .get(parent)
            .map(|p| p.name.clone())
            .ok_or_else(|| SyncError::ParentMissing {
                name: name.to_string(),
                parent: format!("{parent:?}"),
            })?;

        if matches!(kind, EntityKind::Visual { .. })
            && parent != self.root
            && !is_nested(name, &parent_name)
        {
            return Err(SyncError::NameOutsideParent {
                name: name.to_string(),
                parent: parent_name,
            });
        }

        let id = self
            .entities
            .insert_with_key(|id| Entity::new(id, name.to_string(), kind, Some(parent)));
        self.names.insert(name.to_string(), id);
        if let Some(parent) = self.entities.get_mut(parent) {
            parent.children.push(id);
        }
        tracing::trace!("Registered entity {name} under {parent_name}");
        Ok(Upserted::Created(id))
    }

    /// Remove an entity and everything derived from it.
    ///
    /// The cascade covers owned descendants and helpers keyed by a derived
    /// suffix (e.g. `link1_COM_VISUAL__`), recursively. Returns the removed
    /// names in removal order; empty if `name` is unknown or the root.
    pub fn remove(&mut self, name: &str) -> Vec<String> {
        let Some(start) = self.lookup(name) else {
            return Vec::new();
        };
        if start == self.root {
            tracing::warn!("Refusing to remove the world root");
            return Vec::new();
        }

        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if id == self.root || !seen.insert(id) {
                continue;
            }
            let Some(entity) = self.entities.get(id) else {
                continue;
            };
            order.push(id);
            stack.extend(entity.children.iter().rev().copied());
            for suffix in derived_suffixes() {
                if let Some(derived) = self.lookup(&format!("{}{suffix}", entity.name)) {
                    stack.push(derived);
                }
            }
        }

        for &id in &order {
            let parent = self.entities.get(id).and_then(Entity::parent);
            if let Some(parent) = parent.filter(|p| !seen.contains(p)) {
                if let Some(parent) = self.entities.get_mut(parent) {
                    parent.children.retain(|child| *child != id);
                }
            }
        }

        order
            .into_iter()
            .filter_map(|id| self.entities.remove(id))
            .map(|entity| {
                self.names.remove(&entity.name);
                entity.name
            })
            .collect()
    }

    /// Remove every entity except the world root.
    pub fn clear(&mut self) {
        let root = self.root;
        self.entities.retain(|id, _| id == root);
        self.names.retain(|_, id| *id == root);
        if let Some(root) = self.entities.get_mut(root) {
            root.children.clear();
        }
    }

    /// Direct children of `id` in creation order.
    pub fn children(&self, id: EntityId) -> impl Iterator<Item = &Entity> {
        self.entities
            .get(id)
            .map(|e| e.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.entities.get(*child))
    }

    /// All descendants of `id` in pre-order, excluding `id` itself.
    #[must_use]
    pub fn descendants(&self, id: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut stack: Vec<EntityId> = self
            .entities
            .get(id)
            .map(|e| e.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            if let Some(entity) = self.entities.get(next) {
                out.push(next);
                stack.extend(entity.children.iter().rev().copied());
            }
        }
        out
    }

    /// Parent chain of `id`, nearest first, ending at the root.
    #[must_use]
    pub fn ancestors(&self, id: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut current = self.entities.get(id).and_then(Entity::parent);
        while let Some(parent) = current {
            if out.len() > self.entities.len() {
                tracing::error!("Parent cycle detected above entity {id:?}");
                break;
            }
            out.push(parent);
            current = self.entities.get(parent).and_then(Entity::parent);
        }
        out
    }

    /// Full name of an entity's parent.
    #[must_use]
    pub fn parent_name(&self, id: EntityId) -> Option<&str> {
        self.entities
            .get(id)
            .and_then(Entity::parent)
            .and_then(|p| self.entities.get(p))
            .map(|p| p.name.as_str())
    }

    /// All live entities, root included, in arena order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Number of live entities, not counting the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len() - 1
    }

    /// Whether only the root is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_nested(name: &str, parent: &str) -> bool {
    name.strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with("::"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{COM_SUFFIX, JOINT_SUFFIX};
    use crate::message::{InertialMsg, JointMsg};

    fn visual() -> EntityKind {
        EntityKind::Visual {
            geometry: None,
            material: None,
        }
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut registry = EntityRegistry::new("default");
        let root = registry.root();

        let first = registry.upsert("box1", root, visual()).expect("create");
        let second = registry
            .upsert(
                "box1",
                root,
                EntityKind::Visual {
                    geometry: None,
                    material: Some("Gazebo/Red".to_string()),
                },
            )
            .expect("update");

        assert!(first.is_created());
        assert_eq!(second, Upserted::Updated(first.id()));
        assert_eq!(registry.len(), 1);
        let entity = registry.get_by_name("box1").expect("box1");
        assert!(matches!(
            &entity.kind,
            EntityKind::Visual { material: Some(m), .. } if m == "Gazebo/Red"
        ));
    }

    #[test]
    fn test_child_must_be_nested_under_parent() {
        let mut registry = EntityRegistry::new("default");
        let root = registry.root();
        let model = registry.upsert("model", root, visual()).expect("model").id();

        assert!(registry.upsert("model::link", model, visual()).is_ok());
        let err = registry.upsert("other", model, visual()).unwrap_err();
        assert!(matches!(err, SyncError::NameOutsideParent { .. }));
    }

    #[test]
    fn test_shared_prefix_is_not_nesting() {
        let mut registry = EntityRegistry::new("default");
        let root = registry.root();
        let box1 = registry.upsert("box1", root, visual()).expect("box1").id();

        let err = registry.upsert("box10", box1, visual()).unwrap_err();
        assert!(matches!(err, SyncError::NameOutsideParent { .. }));
        assert!(registry.upsert("box1::link", box1, visual()).is_ok());
    }

    #[test]
    fn test_missing_parent_is_rejected() {
        let mut registry = EntityRegistry::new("default");
        let root = registry.root();
        let model = registry.upsert("model", root, visual()).expect("model").id();
        registry.remove("model");

        let err = registry.upsert("model::link", model, visual()).unwrap_err();
        assert!(matches!(err, SyncError::ParentMissing { .. }));
        assert!(!registry.contains("model::link"));
    }

    #[test]
    fn test_root_is_protected() {
        let mut registry = EntityRegistry::new("default");
        let root = registry.root();
        assert!(registry.upsert(WORLD_ROOT, root, visual()).is_err());
        assert!(registry.remove(WORLD_ROOT).is_empty());
        assert!(registry.get(root).is_some());
    }

    #[test]
    fn test_remove_cascades_to_children_and_helpers() {
        let mut registry = EntityRegistry::new("default");
        let root = registry.root();
        let link = registry.upsert("link1", root, visual()).expect("link").id();
        registry
            .upsert("link1::visual", link, visual())
            .expect("child");
        registry
            .upsert(
                &format!("link1{COM_SUFFIX}"),
                link,
                EntityKind::CenterOfMass(InertialMsg::default()),
            )
            .expect("com");
        // Joint helpers hang off the joint's child link, not the source name.
        let other = registry.upsert("link2", root, visual()).expect("link2").id();
        registry
            .upsert(
                &format!("link1{JOINT_SUFFIX}"),
                other,
                EntityKind::JointVisual(JointMsg::default()),
            )
            .expect("joint");

        let removed = registry.remove("link1");

        assert_eq!(removed.first().map(String::as_str), Some("link1"));
        assert_eq!(removed.len(), 4);
        assert!(!registry.contains("link1::visual"));
        assert!(!registry.contains("link1_COM_VISUAL__"));
        assert!(!registry.contains("link1_JOINT_VISUAL__"));
        assert!(registry.contains("link2"));
        assert!(registry.get(other).expect("link2").children().is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_detaches_from_parent() {
        let mut registry = EntityRegistry::new("default");
        let root = registry.root();
        let model = registry.upsert("m", root, visual()).expect("m").id();
        registry.upsert("m::a", model, visual()).expect("a");
        registry.upsert("m::b", model, visual()).expect("b");

        registry.remove("m::a");

        let names: Vec<_> = registry.children(model).map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["m::b"]);
    }

    #[test]
    fn test_resolve_falls_back_to_world_scope() {
        let mut registry = EntityRegistry::new("default");
        let root = registry.root();
        registry.upsert("default::box", root, visual()).expect("box");

        assert!(registry.lookup("box").is_none());
        assert!(registry.resolve("box").is_some());
    }

    #[test]
    fn test_ancestors_end_at_root() {
        let mut registry = EntityRegistry::new("default");
        let root = registry.root();
        let a = registry.upsert("a", root, visual()).expect("a").id();
        let b = registry.upsert("a::b", a, visual()).expect("b").id();
        let c = registry.upsert("a::b::c", b, visual()).expect("c").id();

        assert_eq!(registry.ancestors(c), vec![b, a, root]);
        assert_eq!(registry.descendants(a), vec![b, c]);
        assert_eq!(registry.parent_name(c), Some("a::b"));
    }

    #[test]
    fn test_clear_keeps_root() {
        let mut registry = EntityRegistry::new("default");
        let root = registry.root();
        registry.upsert("a", root, visual()).expect("a");
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.contains(WORLD_ROOT));
        assert_eq!(registry.children(root).count(), 0);
    }
}
