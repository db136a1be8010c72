//! Message intake - the thread-safe staging buffer fed by transport callbacks.
//!
//! Producers on any thread call [`MessageIntake::enqueue`]. The reconciler
//! calls [`MessageIntake::drain`] once per tick, which swaps every queue out
//! under the lock and hands back an [`IntakeBatch`] to work on unlocked.

use std::sync::{Arc, Mutex, PoisonError};

use crate::message::{
    JointMsg, LightMsg, LinkMsg, Message, ModelMsg, PoseMsg, RequestMsg, SceneMsg, SelectionMsg,
    SensorMsg, SkeletonPoseMsg, VisualMsg,
};

/// Messages staged since the last drain, one queue per kind.
///
/// Each queue keeps arrival order. There is no ordering across kinds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntakeBatch {
    /// Scene messages.
    pub scenes: Vec<SceneMsg>,
    /// Model messages.
    pub models: Vec<ModelMsg>,
    /// Link messages.
    pub links: Vec<LinkMsg>,
    /// Visual messages.
    pub visuals: Vec<VisualMsg>,
    /// Pose messages, at most one per target name.
    pub poses: Vec<PoseMsg>,
    /// Skeleton pose messages, at most one per model.
    pub skeleton_poses: Vec<SkeletonPoseMsg>,
    /// Light messages.
    pub lights: Vec<LightMsg>,
    /// Joint messages.
    pub joints: Vec<JointMsg>,
    /// Sensor messages.
    pub sensors: Vec<SensorMsg>,
    /// Latest selection change.
    pub selection: Option<SelectionMsg>,
    /// Request messages.
    pub requests: Vec<RequestMsg>,
}

impl IntakeBatch {
    /// Total number of staged messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scenes.len()
            + self.models.len()
            + self.links.len()
            + self.visuals.len()
            + self.poses.len()
            + self.skeleton_poses.len()
            + self.lights.len()
            + self.joints.len()
            + self.sensors.len()
            + usize::from(self.selection.is_some())
            + self.requests.len()
    }

    /// Whether nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, message: Message) {
        match message {
            Message::Scene(msg) => self.scenes.push(msg),
            Message::Model(msg) => self.models.push(msg),
            Message::Link(msg) => self.links.push(msg),
            Message::Visual(msg) => self.visuals.push(msg),
            Message::Pose(msg) => {
                // Only the newest pose per entity matters.
                self.poses.retain(|p| p.name != msg.name);
                self.poses.push(msg);
            }
            Message::SkeletonPose(msg) => {
                self.skeleton_poses
                    .retain(|p| p.model_name != msg.model_name);
                self.skeleton_poses.push(msg);
            }
            Message::Light(msg) => self.lights.push(msg),
            Message::Joint(msg) => self.joints.push(msg),
            Message::Sensor(msg) => self.sensors.push(msg),
            Message::Selection(msg) => self.selection = Some(msg),
            Message::Request(msg) => self.requests.push(msg),
            Message::Response(msg) => {
                tracing::debug!("Dropping response {} at intake; responses are not staged", msg.id);
            }
        }
    }
}

/// Shared staging buffer.
///
/// Cloning is cheap and every clone feeds the same queues. A single coarse
/// lock guards all kinds; it is held only for an append or a drain.
///
/// # Example
///
/// ```
/// use mirror_core::{Message, MessageIntake, PoseMsg, Pose};
///
/// let intake = MessageIntake::new();
/// intake.enqueue(Message::Pose(PoseMsg::new("box1", Pose::from_position(1.0, 2.0, 3.0))));
///
/// let batch = intake.drain();
/// assert_eq!(batch.poses.len(), 1);
/// assert!(intake.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageIntake {
    queues: Arc<Mutex<IntakeBatch>>,
}

impl MessageIntake {
    /// Create an empty intake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a message for the next tick.
    pub fn enqueue(&self, message: Message) {
        let kind = message.kind();
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues.push(message);
        tracing::trace!("Staged {kind} message ({} staged)", queues.len());
    }

    /// Take everything staged so far, leaving the queues empty.
    #[must_use]
    pub fn drain(&self) -> IntakeBatch {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *queues)
    }

    /// Number of staged messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
