//! Serialized view of the mirror shared with HTTP readers and snapshots on disk.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::entity::{DisplayFlags, Entity, EntityKind};
use crate::message::MessageKind;
use crate::reconciler::Reconciler;
use crate::registry::EntityRegistry;
use crate::settings::SceneSettings;
use crate::Pose;

/// Document-friendly entity description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDocument {
    /// Scoped name.
    pub name: String,
    /// Parent name; `None` for children of the world root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Payload.
    pub kind: EntityKind,
    /// Pose relative to the parent.
    pub pose: Pose,
    /// Visibility flag.
    pub visible: bool,
    /// Transparency in `[0, 1]`.
    #[serde(default)]
    pub transparency: f64,
    /// Debug display toggles.
    #[serde(default)]
    pub display: DisplayFlags,
    /// Names of owned children.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

impl EntityDocument {
    fn from_entity(entity: &Entity, registry: &EntityRegistry) -> Self {
        let parent = entity
            .parent()
            .filter(|id| *id != registry.root())
            .and_then(|id| registry.get(id))
            .map(|p| p.name.clone());
        Self {
            name: entity.name.clone(),
            parent,
            kind: entity.kind.clone(),
            pose: entity.pose,
            visible: entity.visible,
            transparency: entity.transparency,
            display: entity.display,
            children: registry.children(entity.id).map(|c| c.name.clone()).collect(),
        }
    }
}

/// Canonical mirror document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    /// Mirrored world.
    pub world: String,
    /// Tick the document was taken after.
    pub tick: u64,
    /// Timestamp in milliseconds.
    pub timestamp: u64,
    /// Scene-wide settings.
    pub settings: SceneSettings,
    /// Selected entity name.
    #[serde(default)]
    pub selected: Option<String>,
    /// Entities, parents before children.
    pub entities: Vec<EntityDocument>,
    /// Pending messages per kind.
    #[serde(default)]
    pub pending: BTreeMap<MessageKind, usize>,
}

impl SceneDocument {
    /// Build a document from a reconciler's current state.
    #[must_use]
    pub fn from_reconciler(reconciler: &Reconciler, timestamp: u64) -> Self {
        let registry = reconciler.registry();
        let entities = registry
            .descendants(registry.root())
            .into_iter()
            .filter_map(|id| registry.get(id))
            .map(|entity| EntityDocument::from_entity(entity, registry))
            .collect();
        Self {
            world: registry.world_name().to_string(),
            tick: reconciler.tick_count(),
            timestamp,
            settings: reconciler.settings().clone(),
            selected: reconciler.selection().name().map(str::to_string),
            entities,
            pending: reconciler.pending_counts(),
        }
    }

    /// Find an entity by exact name.
    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&EntityDocument> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Total pending messages.
    #[must_use]
    pub fn pending_total(&self) -> usize {
        self.pending.values().sum()
    }
}

impl Reconciler {
    /// Snapshot the mirror as a [`SceneDocument`].
    #[must_use]
    pub fn document(&self) -> SceneDocument {
        SceneDocument::from_reconciler(self, current_timestamp_ms())
    }
}

/// Get the current Unix timestamp in milliseconds.
pub(crate) fn current_timestamp_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| {
        #[allow(clippy::cast_possible_truncation)]
        {
            d.as_millis() as u64
        }
    })
}
