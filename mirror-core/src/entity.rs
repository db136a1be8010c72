//! Registry entities - the mirrored scene nodes.

use serde::{Deserialize, Serialize};

use crate::message::{Geometry, InertialMsg, JointMsg, LightMsg, SensorKind, SkeletonPoseMsg};
use crate::Pose;

slotmap::new_key_type! {
    /// Stable arena handle for an entity.
    ///
    /// Handles are never reused for a different entity while the old one
    /// could still be referenced; a stale handle simply fails to resolve.
    pub struct EntityId;
}

/// Name of the root entity every unparented entity hangs from.
pub const WORLD_ROOT: &str = "__world_node__";

/// Suffix of the center-of-mass helper derived from a link.
pub const COM_SUFFIX: &str = "_COM_VISUAL__";

/// Suffix of the helper derived from a joint.
pub const JOINT_SUFFIX: &str = "_JOINT_VISUAL__";

/// Suffixes of the helpers derived from sensors.
pub const SENSOR_SUFFIXES: [&str; 5] = [
    "_GUIONLY_laser_vis",
    "_GUIONLY_camera_vis",
    "_GUIONLY_contact_vis",
    "_GUIONLY_rfid_vis",
    "_GUIONLY_rfidtag_vis",
];

/// Name marker of collision debug visuals.
pub const COLLISION_MARKER: &str = "__COLLISION_VISUAL__";

/// Name marker of skeleton debug visuals.
pub const SKELETON_MARKER: &str = "__SKELETON_VISUAL__";

/// Every suffix whose entity is derived from (and removed with) a source name.
pub fn derived_suffixes() -> impl Iterator<Item = &'static str> {
    [COM_SUFFIX, JOINT_SUFFIX]
        .into_iter()
        .chain(SENSOR_SUFFIXES)
}

/// Kind-specific payload of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityKind {
    /// The scene root.
    World,
    /// A visual created from a visual message.
    Visual {
        /// Shape, if one was sent.
        geometry: Option<Geometry>,
        /// Material script name.
        material: Option<String>,
    },
    /// A light.
    Light(LightMsg),
    /// Joint axis helper.
    JointVisual(JointMsg),
    /// Center-of-mass helper.
    CenterOfMass(InertialMsg),
    /// Sensor visualization helper.
    SensorVisual {
        /// Sensor type.
        sensor: SensorKind,
        /// Topic the helper listens on.
        topic: String,
    },
    /// Texture projector.
    Projector {
        /// Projected texture.
        texture: String,
        /// Field of view in radians.
        fov: f64,
    },
}

impl EntityKind {
    /// Short label for logs and documents.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::World => "world",
            Self::Visual { .. } => "visual",
            Self::Light(_) => "light",
            Self::JointVisual(_) => "joint_visual",
            Self::CenterOfMass(_) => "center_of_mass",
            Self::SensorVisual { .. } => "sensor_visual",
            Self::Projector { .. } => "projector",
        }
    }

    /// Whether this payload is a helper derived from another entity's name.
    #[must_use]
    pub const fn is_helper(&self) -> bool {
        matches!(
            self,
            Self::JointVisual(_)
                | Self::CenterOfMass(_)
                | Self::SensorVisual { .. }
                | Self::Projector { .. }
        )
    }
}

/// Per-entity debug display toggles set by requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisplayFlags {
    /// Collision visuals shown.
    pub collision: bool,
    /// Joint helpers shown.
    pub joints: bool,
    /// Center-of-mass helpers shown.
    pub com: bool,
    /// Skeleton shown.
    pub skeleton: bool,
}

/// A live entity in the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Arena handle.
    pub id: EntityId,
    /// Unique scoped name.
    pub name: String,
    /// Payload.
    pub kind: EntityKind,
    /// Pose relative to the parent.
    pub pose: Pose,
    /// Whether the entity is drawn.
    pub visible: bool,
    /// Transparency in `[0, 1]`.
    pub transparency: f64,
    /// Debug display toggles.
    pub display: DisplayFlags,
    /// Latest skeleton pose for animated models.
    pub skeleton: Option<SkeletonPoseMsg>,
    pub(crate) parent: Option<EntityId>,
    pub(crate) children: Vec<EntityId>,
}

impl Entity {
    pub(crate) fn new(
        id: EntityId,
        name: String,
        kind: EntityKind,
        parent: Option<EntityId>,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            pose: Pose::default(),
            visible: true,
            transparency: 0.0,
            display: DisplayFlags::default(),
            skeleton: None,
            parent,
            children: Vec::new(),
        }
    }

    /// Owning parent, `None` only for the world root.
    #[must_use]
    pub const fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    /// Owned children in creation order.
    #[must_use]
    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    /// Whether this is a collision debug visual.
    #[must_use]
    pub fn is_collision_visual(&self) -> bool {
        self.name.contains(COLLISION_MARKER)
    }

    /// Whether this is a skeleton debug visual.
    #[must_use]
    pub fn is_skeleton_visual(&self) -> bool {
        self.name.contains(SKELETON_MARKER)
    }
}
