//! Wire messages delivered by the simulation.
//!
//! Every topic carries one case of [`Message`]. Payloads are already
//! deserialized by the transport; the mirror only inspects their fields.

use serde::{Deserialize, Serialize};

use crate::{Color, Pose, Vector3};

/// A message received from (or sent to) the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Message {
    /// Full scene description.
    Scene(SceneMsg),
    /// A model and everything it contains.
    Model(ModelMsg),
    /// A single link.
    Link(LinkMsg),
    /// Create, update or delete a visual.
    Visual(VisualMsg),
    /// Pose update for one named entity.
    Pose(PoseMsg),
    /// Bone poses for an animated model.
    SkeletonPose(SkeletonPoseMsg),
    /// Create or update a light.
    Light(LightMsg),
    /// Joint between two links.
    Joint(JointMsg),
    /// Sensor attached to a link.
    Sensor(SensorMsg),
    /// User selection change.
    Selection(SelectionMsg),
    /// Generic request verb.
    Request(RequestMsg),
    /// Answer to a request.
    Response(ResponseMsg),
}

impl Message {
    /// The queue this message belongs to.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Scene(_) => MessageKind::Scene,
            Self::Model(_) => MessageKind::Model,
            Self::Link(_) => MessageKind::Link,
            Self::Visual(_) => MessageKind::Visual,
            Self::Pose(_) => MessageKind::Pose,
            Self::SkeletonPose(_) => MessageKind::SkeletonPose,
            Self::Light(_) => MessageKind::Light,
            Self::Joint(_) => MessageKind::Joint,
            Self::Sensor(_) => MessageKind::Sensor,
            Self::Selection(_) => MessageKind::Selection,
            Self::Request(_) => MessageKind::Request,
            Self::Response(_) => MessageKind::Response,
        }
    }
}

/// Discriminant of [`Message`], used for queues, logs and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// [`Message::Scene`].
    Scene,
    /// [`Message::Model`].
    Model,
    /// [`Message::Link`].
    Link,
    /// [`Message::Visual`].
    Visual,
    /// [`Message::Pose`].
    Pose,
    /// [`Message::SkeletonPose`].
    SkeletonPose,
    /// [`Message::Light`].
    Light,
    /// [`Message::Joint`].
    Joint,
    /// [`Message::Sensor`].
    Sensor,
    /// [`Message::Selection`].
    Selection,
    /// [`Message::Request`].
    Request,
    /// [`Message::Response`].
    Response,
}

impl MessageKind {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Model => "model",
            Self::Link => "link",
            Self::Visual => "visual",
            Self::Pose => "pose",
            Self::SkeletonPose => "skeleton_pose",
            Self::Light => "light",
            Self::Joint => "joint",
            Self::Sensor => "sensor",
            Self::Selection => "selection",
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full scene description, usually the answer to `scene_info`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneMsg {
    /// Scene (world) name.
    #[serde(default)]
    pub name: Option<String>,
    /// Ambient light color.
    #[serde(default)]
    pub ambient: Option<Color>,
    /// Background color.
    #[serde(default)]
    pub background: Option<Color>,
    /// Whether shadows are enabled.
    #[serde(default)]
    pub shadows: Option<bool>,
    /// Whether the ground grid is shown.
    #[serde(default)]
    pub grid: Option<bool>,
    /// Fog settings.
    #[serde(default)]
    pub fog: Option<FogMsg>,
    /// Sky settings.
    #[serde(default)]
    pub sky: Option<SkyMsg>,
    /// Models in the scene.
    #[serde(default)]
    pub models: Vec<ModelMsg>,
    /// Lights in the scene.
    #[serde(default)]
    pub lights: Vec<LightMsg>,
    /// Joints not owned by a model message.
    #[serde(default)]
    pub joints: Vec<JointMsg>,
}

/// Fog falloff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FogKind {
    /// Fog disabled.
    #[default]
    None,
    /// Linear falloff between `start` and `end`.
    Linear,
    /// Exponential falloff.
    Exponential,
    /// Squared exponential falloff.
    Exponential2,
}

/// Fog fields; absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FogMsg {
    /// Falloff type.
    #[serde(default)]
    pub kind: Option<FogKind>,
    /// Fog color.
    #[serde(default)]
    pub color: Option<Color>,
    /// Density for exponential fog.
    #[serde(default)]
    pub density: Option<f64>,
    /// Linear fog start distance.
    #[serde(default)]
    pub start: Option<f64>,
    /// Linear fog end distance.
    #[serde(default)]
    pub end: Option<f64>,
}

/// Sky fields; absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkyMsg {
    /// Time of day in hours.
    #[serde(default)]
    pub time: Option<f64>,
    /// Sunrise hour.
    #[serde(default)]
    pub sunrise: Option<f64>,
    /// Sunset hour.
    #[serde(default)]
    pub sunset: Option<f64>,
    /// Wind speed.
    #[serde(default)]
    pub wind_speed: Option<f64>,
    /// Wind direction in radians.
    #[serde(default)]
    pub wind_direction: Option<f64>,
    /// Cloud ambient color.
    #[serde(default)]
    pub cloud_ambient: Option<Color>,
    /// Humidity in `[0, 1]`.
    #[serde(default)]
    pub humidity: Option<f64>,
    /// Mean cloud size in `[0, 1]`.
    #[serde(default)]
    pub mean_cloud_size: Option<f64>,
}

/// A model with its links, joints and top-level visuals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMsg {
    /// Model name.
    pub name: String,
    /// Model pose.
    #[serde(default)]
    pub pose: Pose,
    /// Links, by short or scoped name.
    #[serde(default)]
    pub links: Vec<LinkMsg>,
    /// Joints between the links.
    #[serde(default)]
    pub joints: Vec<JointMsg>,
    /// Visuals attached directly to the model.
    #[serde(default)]
    pub visuals: Vec<VisualMsg>,
}

/// Mass properties of a link.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InertialMsg {
    /// Mass in kilograms.
    pub mass: f64,
    /// Center of mass relative to the link.
    #[serde(default)]
    pub pose: Pose,
}

/// A collision element; only its debug visuals matter here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollisionMsg {
    /// Collision name.
    pub name: String,
    /// Debug visuals for the collision shape.
    #[serde(default)]
    pub visuals: Vec<VisualMsg>,
}

/// Texture projector attached to a link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectorMsg {
    /// Projector name, scoped under the link.
    pub name: String,
    /// Projected texture.
    #[serde(default)]
    pub texture: String,
    /// Field of view in radians.
    #[serde(default)]
    pub fov: f64,
    /// Pose relative to the link.
    #[serde(default)]
    pub pose: Pose,
}

/// A link of a model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkMsg {
    /// Link name.
    pub name: String,
    /// Link pose relative to the model.
    #[serde(default)]
    pub pose: Pose,
    /// Mass properties.
    #[serde(default)]
    pub inertial: Option<InertialMsg>,
    /// Visuals of the link.
    #[serde(default)]
    pub visuals: Vec<VisualMsg>,
    /// Collision elements.
    #[serde(default)]
    pub collisions: Vec<CollisionMsg>,
    /// Sensors mounted on the link.
    #[serde(default)]
    pub sensors: Vec<SensorMsg>,
    /// Projectors mounted on the link.
    #[serde(default)]
    pub projectors: Vec<ProjectorMsg>,
}

/// Shape of a visual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    /// Axis aligned box.
    Box {
        /// Edge lengths.
        size: Vector3,
    },
    /// Sphere.
    Sphere {
        /// Radius.
        radius: f64,
    },
    /// Cylinder along Z.
    Cylinder {
        /// Radius.
        radius: f64,
        /// Length.
        length: f64,
    },
    /// Infinite plane drawn with a finite size.
    Plane {
        /// Plane normal.
        normal: Vector3,
        /// Drawn extent (x, y).
        size: [f64; 2],
    },
    /// Mesh asset.
    Mesh {
        /// Asset URI.
        uri: String,
        /// Scale factor.
        #[serde(default = "Geometry::unit_scale")]
        scale: Vector3,
    },
    /// Terrain heightmap.
    Heightmap {
        /// Height image URI.
        uri: String,
        /// Terrain extent.
        size: Vector3,
    },
    /// Extruded image.
    Image {
        /// Image URI.
        uri: String,
        /// Extrusion height.
        height: f64,
    },
    /// A geometry kind this mirror does not know.
    #[serde(other)]
    Unknown,
}

impl Geometry {
    const fn unit_scale() -> Vector3 {
        Vector3::new(1.0, 1.0, 1.0)
    }
}

/// Create, update or delete a visual.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualMsg {
    /// Scoped visual name.
    pub name: String,
    /// Parent entity. Absent or equal to the world name attaches to the root.
    #[serde(default)]
    pub parent_name: Option<String>,
    /// Pose relative to the parent.
    #[serde(default)]
    pub pose: Option<Pose>,
    /// Shape.
    #[serde(default)]
    pub geometry: Option<Geometry>,
    /// Material script name.
    #[serde(default)]
    pub material: Option<String>,
    /// Transparency in `[0, 1]`.
    #[serde(default)]
    pub transparency: Option<f64>,
    /// Explicit visibility.
    #[serde(default)]
    pub visible: Option<bool>,
    /// Remove the visual instead of upserting it.
    #[serde(default)]
    pub delete_me: bool,
}

/// Pose update for a named entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseMsg {
    /// Target entity name.
    pub name: String,
    /// New pose.
    #[serde(flatten)]
    pub pose: Pose,
}

impl PoseMsg {
    /// Create a pose update.
    #[must_use]
    pub fn new(name: impl Into<String>, pose: Pose) -> Self {
        Self {
            name: name.into(),
            pose,
        }
    }
}

/// Bone poses for an animated (skinned) model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkeletonPoseMsg {
    /// Model owning the skeleton.
    pub model_name: String,
    /// One pose per bone, by bone entity name.
    #[serde(default)]
    pub bone_poses: Vec<PoseMsg>,
}

/// Light type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightKind {
    /// Omnidirectional point light.
    #[default]
    Point,
    /// Cone light.
    Spot,
    /// Sun-like light.
    Directional,
}

/// Create or update a light.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LightMsg {
    /// Light name.
    pub name: String,
    /// Light type.
    #[serde(default)]
    pub kind: LightKind,
    /// Light pose.
    #[serde(default)]
    pub pose: Pose,
    /// Diffuse color.
    #[serde(default)]
    pub diffuse: Color,
    /// Specular color.
    #[serde(default)]
    pub specular: Color,
    /// Direction for spot and directional lights.
    #[serde(default)]
    pub direction: Option<Vector3>,
    /// Attenuation range.
    #[serde(default)]
    pub range: f64,
    /// Whether the light casts shadows.
    #[serde(default)]
    pub cast_shadows: bool,
}

/// Joint type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointKind {
    /// Single rotational axis.
    #[default]
    Revolute,
    /// Two rotational axes.
    Revolute2,
    /// Single translational axis.
    Prismatic,
    /// Ball joint.
    Ball,
    /// Universal joint.
    Universal,
    /// Screw joint.
    Screw,
}

/// Joint between a parent and a child link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JointMsg {
    /// Joint name.
    pub name: String,
    /// Parent link name.
    #[serde(default)]
    pub parent: String,
    /// Child link name, or `world`.
    pub child: String,
    /// Joint type.
    #[serde(default)]
    pub kind: JointKind,
    /// First axis.
    #[serde(default)]
    pub axis1: Option<Vector3>,
    /// Second axis.
    #[serde(default)]
    pub axis2: Option<Vector3>,
    /// Anchor pose relative to the child.
    #[serde(default)]
    pub pose: Pose,
}

/// Sensor type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Laser range finder.
    Ray,
    /// Camera.
    Camera,
    /// Contact sensor.
    Contact,
    /// RFID reader.
    Rfid,
    /// RFID tag.
    #[serde(rename = "rfidtag")]
    RfidTag,
    /// Anything else; never visualized.
    #[default]
    #[serde(other)]
    Other,
}

/// Sensor attached to a link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorMsg {
    /// Sensor name.
    pub name: String,
    /// Sensor type.
    #[serde(default)]
    pub kind: SensorKind,
    /// Parent link name.
    #[serde(default)]
    pub parent: String,
    /// Topic the sensor publishes on.
    #[serde(default)]
    pub topic: String,
    /// Whether the sensor asks to be drawn.
    #[serde(default)]
    pub visualize: bool,
    /// Pose relative to the parent.
    #[serde(default)]
    pub pose: Pose,
    /// Camera image size (width, height).
    #[serde(default)]
    pub image_size: Option<(u32, u32)>,
}

/// Selection change from the user interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionMsg {
    /// Entity name.
    pub name: String,
    /// Selected or deselected.
    pub selected: bool,
}

/// Generic request verb.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMsg {
    /// Request id, echoed by the response.
    #[serde(default)]
    pub id: u64,
    /// Verb, e.g. `entity_delete`.
    pub verb: String,
    /// Verb argument, usually an entity name.
    #[serde(default)]
    pub data: String,
    /// Numeric argument.
    #[serde(default)]
    pub dbl_data: Option<f64>,
}

impl RequestMsg {
    /// Create a request with a string argument.
    #[must_use]
    pub fn new(id: u64, verb: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id,
            verb: verb.into(),
            data: data.into(),
            dbl_data: None,
        }
    }

    /// Attach a numeric argument.
    #[must_use]
    pub fn with_dbl(mut self, value: f64) -> Self {
        self.dbl_data = Some(value);
        self
    }
}

/// Payload carried by a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ResponsePayload {
    /// No payload.
    #[default]
    None,
    /// Scene description.
    Scene(SceneMsg),
    /// Light description.
    Light(LightMsg),
}

/// Answer to a [`RequestMsg`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMsg {
    /// Id of the request being answered.
    pub id: u64,
    /// Verb of the request being answered.
    pub request: String,
    /// `success` or `failure`.
    pub response: String,
    /// Attached data.
    #[serde(default)]
    pub payload: ResponsePayload,
}
