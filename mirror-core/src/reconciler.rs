//! Reconciler - the per-tick driver that applies staged messages in
//! dependency order.
//!
//! ## Tick order
//!
//! ```text
//!  1. scene      settings; explodes into models, lights, joints
//!  2. model      explodes into visuals, joints, links, sensors, poses
//!  3. sensor     helper visuals           (deferred until parent exists)
//!  4. light      create or update         (never deferred)
//!  5. visual     shortest name first      (deferred until parent exists)
//!  6. pose       selection gated          (retained until target exists)
//!  7. skeleton   selection gated          (retained until model exists)
//!  8. request    processed once
//!  9. joint      joint helper             (deferred until child exists)
//! 10. link       center of mass, projectors (deferred until link exists)
//! 11. selection  latest change wins
//! ```
//!
//! Each stage sees entities created by the earlier ones in the same tick.

use std::collections::BTreeMap;

use crate::config::SyncConfig;
use crate::entity::{
    DisplayFlags, Entity, EntityId, EntityKind, COLLISION_MARKER, COM_SUFFIX, JOINT_SUFFIX,
    SKELETON_MARKER, WORLD_ROOT,
};
use crate::intake::{IntakeBatch, MessageIntake};
use crate::message::{
    Geometry, JointMsg, LightMsg, LinkMsg, Message, MessageKind, ModelMsg, PoseMsg, RequestMsg,
    ResponseMsg, ResponsePayload, SceneMsg, SensorKind, SensorMsg, SkeletonPoseMsg, VisualMsg,
};
use crate::pending::{Attempt, PendingQueue, ProcessStats};
use crate::registry::{EntityRegistry, Upserted};
use crate::request::RequestVerb;
use crate::selection::SelectionState;
use crate::settings::{Heightmap, SceneSettings};
use crate::transport::{topics, Outbound};
use crate::{Pose, SyncError};

/// Joint child name that refers to the world root.
const WORLD_CHILD: &str = "world";

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Messages drained from the intake.
    pub drained: usize,
    /// Applied/deferred counts per kind.
    pub stats: BTreeMap<MessageKind, ProcessStats>,
    /// Entities created this tick.
    pub created: Vec<String>,
    /// Entities removed this tick, cascades included.
    pub removed: Vec<String>,
    /// Pending messages dropped by the expiry policy.
    pub expired: usize,
    /// Messages to publish on behalf of the mirror.
    pub outbound: Vec<Outbound>,
}

impl TickReport {
    fn new(tick: u64, drained: usize) -> Self {
        Self {
            tick,
            drained,
            ..Self::default()
        }
    }

    fn record(&mut self, kind: MessageKind, stats: ProcessStats) {
        let entry = self.stats.entry(kind).or_default();
        entry.applied += stats.applied;
        entry.deferred += stats.deferred;
    }

    /// Messages applied across all kinds.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.stats.values().map(|s| s.applied).sum()
    }

    /// Messages deferred across all kinds.
    #[must_use]
    pub fn deferred(&self) -> usize {
        self.stats.values().map(|s| s.deferred).sum()
    }
}

/// Owner of the entity registry and the pending sets.
///
/// Not shared between threads; drive it from the render/update thread and
/// publish [`SceneDocument`](crate::SceneDocument) snapshots for readers.
#[derive(Debug)]
pub struct Reconciler {
    config: SyncConfig,
    registry: EntityRegistry,
    selection: SelectionState,
    settings: SceneSettings,
    tick: u64,
    models: PendingQueue<ModelMsg>,
    sensors: PendingQueue<SensorMsg>,
    lights: PendingQueue<LightMsg>,
    visuals: PendingQueue<VisualMsg>,
    poses: PendingQueue<PoseMsg>,
    skeleton_poses: PendingQueue<SkeletonPoseMsg>,
    joints: PendingQueue<JointMsg>,
    links: PendingQueue<LinkMsg>,
    report: TickReport,
}

impl Reconciler {
    /// Create a reconciler with an empty registry.
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        let registry = EntityRegistry::new(config.world_name.clone());
        Self {
            config,
            registry,
            selection: SelectionState::new(),
            settings: SceneSettings::default(),
            tick: 0,
            models: PendingQueue::new(),
            sensors: PendingQueue::new(),
            lights: PendingQueue::new(),
            visuals: PendingQueue::new(),
            poses: PendingQueue::new(),
            skeleton_poses: PendingQueue::new(),
            joints: PendingQueue::new(),
            links: PendingQueue::new(),
            report: TickReport::default(),
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The mirrored entities.
    #[must_use]
    pub const fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Current selection.
    #[must_use]
    pub const fn selection(&self) -> &SelectionState {
        &self.selection
    }

    /// Current scene settings.
    #[must_use]
    pub const fn settings(&self) -> &SceneSettings {
        &self.settings
    }

    /// Number of ticks run so far.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Pending messages per kind.
    #[must_use]
    pub fn pending_counts(&self) -> BTreeMap<MessageKind, usize> {
        [
            (MessageKind::Model, self.models.len()),
            (MessageKind::Sensor, self.sensors.len()),
            (MessageKind::Light, self.lights.len()),
            (MessageKind::Visual, self.visuals.len()),
            (MessageKind::Pose, self.poses.len()),
            (MessageKind::SkeletonPose, self.skeleton_poses.len()),
            (MessageKind::Joint, self.joints.len()),
            (MessageKind::Link, self.links.len()),
        ]
        .into_iter()
        .collect()
    }

    /// Total pending messages.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending_counts().values().sum()
    }

    /// Names that pending messages are waiting on, with the waiting kind.
    #[must_use]
    pub fn waiting_on(&self) -> Vec<(MessageKind, String)> {
        fn collect<T>(
            kind: MessageKind,
            queue: &PendingQueue<T>,
            out: &mut Vec<(MessageKind, String)>,
        ) {
            out.extend(
                queue
                    .iter()
                    .filter_map(|e| e.waiting_on.clone())
                    .map(|name| (kind, name)),
            );
        }
        let mut out = Vec::new();
        collect(MessageKind::Sensor, &self.sensors, &mut out);
        collect(MessageKind::Visual, &self.visuals, &mut out);
        collect(MessageKind::Pose, &self.poses, &mut out);
        collect(MessageKind::SkeletonPose, &self.skeleton_poses, &mut out);
        collect(MessageKind::Joint, &self.joints, &mut out);
        collect(MessageKind::Link, &self.links, &mut out);
        out
    }

    /// Drain the intake and reconcile.
    pub fn tick(&mut self, intake: &MessageIntake) -> TickReport {
        let batch = intake.drain();
        self.apply_batch(batch)
    }

    /// Reconcile an already drained batch together with everything pending.
    pub fn apply_batch(&mut self, batch: IntakeBatch) -> TickReport {
        self.tick += 1;
        let tick = self.tick;
        let _span = tracing::debug_span!("reconcile", tick).entered();
        self.report = TickReport::new(tick, batch.len());

        let IntakeBatch {
            scenes,
            models,
            links,
            visuals,
            poses,
            skeleton_poses,
            lights,
            joints,
            sensors,
            selection,
            requests,
        } = batch;

        self.models.extend(models, tick);
        self.sensors.extend(sensors, tick);
        self.lights.extend(lights, tick);
        self.visuals.extend(visuals, tick);
        for pose in poses {
            let name = pose.name.clone();
            self.poses.replace(pose, tick, |p| p.name == name);
        }
        for skeleton in skeleton_poses {
            let model = skeleton.model_name.clone();
            self.skeleton_poses
                .replace(skeleton, tick, |p| p.model_name == model);
        }
        self.joints.extend(joints, tick);
        self.links.extend(links, tick);

        // 1. Scenes are always applied.
        for scene in &scenes {
            self.apply_scene(scene);
        }
        self.report.record(
            MessageKind::Scene,
            ProcessStats {
                applied: scenes.len(),
                deferred: 0,
            },
        );

        // 2. Models
        let mut queue = std::mem::take(&mut self.models);
        let stats = queue.process(|m| self.apply_model(m));
        restore(&mut self.models, queue);
        self.report.record(MessageKind::Model, stats);

        // 3. Sensors
        let mut queue = std::mem::take(&mut self.sensors);
        let stats = queue.process(|m| self.apply_sensor(m));
        restore(&mut self.sensors, queue);
        self.report.record(MessageKind::Sensor, stats);

        // 4. Lights
        let mut queue = std::mem::take(&mut self.lights);
        let stats = queue.process(|m| self.apply_light(m));
        restore(&mut self.lights, queue);
        self.report.record(MessageKind::Light, stats);

        // 5. Visuals, parents (shorter names) before children.
        let mut queue = std::mem::take(&mut self.visuals);
        queue.sort_by_key(|v| v.name.len());
        let stats = queue.process(|m| self.apply_visual(m));
        restore(&mut self.visuals, queue);
        self.report.record(MessageKind::Visual, stats);

        // 6. Poses
        let mut queue = std::mem::take(&mut self.poses);
        let stats = queue.process(|m| self.apply_pose(m));
        restore(&mut self.poses, queue);
        self.report.record(MessageKind::Pose, stats);

        // 7. Skeleton poses
        let mut queue = std::mem::take(&mut self.skeleton_poses);
        let stats = queue.process(|m| self.apply_skeleton_pose(m));
        restore(&mut self.skeleton_poses, queue);
        self.report.record(MessageKind::SkeletonPose, stats);

        // 8. Requests are never retried.
        for request in &requests {
            self.apply_request(request);
        }
        self.report.record(
            MessageKind::Request,
            ProcessStats {
                applied: requests.len(),
                deferred: 0,
            },
        );

        // 9. Joints
        let mut queue = std::mem::take(&mut self.joints);
        let stats = queue.process(|m| self.apply_joint(m));
        restore(&mut self.joints, queue);
        self.report.record(MessageKind::Joint, stats);

        // 10. Links
        let mut queue = std::mem::take(&mut self.links);
        let stats = queue.process(|m| self.apply_link(m));
        restore(&mut self.links, queue);
        self.report.record(MessageKind::Link, stats);

        // 11. Selection
        if let Some(selection) = selection {
            self.selection.apply(&selection, &self.registry);
            self.report.record(
                MessageKind::Selection,
                ProcessStats {
                    applied: 1,
                    deferred: 0,
                },
            );
        }

        if let Some(max_age) = self.config.max_pending_ticks {
            self.expire_pending(tick, max_age);
        }

        let report = std::mem::take(&mut self.report);
        if report.drained > 0 || !report.removed.is_empty() {
            tracing::debug!(
                "Tick {tick}: drained {}, applied {}, deferred {}, created {}, removed {}",
                report.drained,
                report.applied(),
                report.deferred(),
                report.created.len(),
                report.removed.len()
            );
        }
        report
    }

    /// Drop every entity, pending message and setting.
    pub fn clear(&mut self) {
        self.registry.clear();
        self.selection.clear();
        self.settings = SceneSettings::default();
        self.models.clear();
        self.sensors.clear();
        self.lights.clear();
        self.visuals.clear();
        self.poses.clear();
        self.skeleton_poses.clear();
        self.joints.clear();
        self.links.clear();
        tracing::info!("Mirror cleared");
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    fn apply_scene(&mut self, scene: &SceneMsg) {
        if let Some(name) = scene.name.as_deref() {
            if name != self.registry.world_name() {
                tracing::debug!(
                    "Scene {name} differs from mirrored world {}",
                    self.registry.world_name()
                );
            }
        }
        self.settings.apply(scene);

        for model in &scene.models {
            self.queue_explosion_pose(PoseMsg::new(&model.name, model.pose));
            self.explode_model(model);
        }
        self.lights.extend(scene.lights.iter().cloned(), self.tick);
        self.joints.extend(scene.joints.iter().cloned(), self.tick);
    }

    fn apply_model(&mut self, model: &ModelMsg) -> Attempt {
        if model.name.is_empty() {
            tracing::warn!("Skipping model message without a name");
            return Attempt::Applied;
        }
        self.explode_model(model);
        Attempt::Applied
    }

    fn explode_model(&mut self, model: &ModelMsg) {
        let tick = self.tick;
        self.visuals.extend(model.visuals.iter().cloned(), tick);
        self.joints.extend(model.joints.iter().cloned(), tick);

        for link in &model.links {
            let link_name = scoped_link_name(&model.name, &link.name);
            self.queue_explosion_pose(PoseMsg::new(&link_name, link.pose));

            if link.inertial.is_some() || !link.projectors.is_empty() {
                let mut scoped = link.clone();
                scoped.name.clone_from(&link_name);
                self.links.push_back(scoped, tick);
            }

            self.visuals.extend(link.visuals.iter().cloned(), tick);
            for collision in &link.collisions {
                self.visuals.extend(collision.visuals.iter().cloned(), tick);
            }
            self.sensors.extend(link.sensors.iter().cloned(), tick);
        }
        tracing::trace!("Exploded model {}", model.name);
    }

    /// Queue a pose derived from a scene/model description.
    ///
    /// Goes to the front and yields to any standalone pose already queued
    /// for the same entity, which is newer.
    fn queue_explosion_pose(&mut self, pose: PoseMsg) {
        let name = pose.name.clone();
        self.poses
            .push_front_unless(pose, self.tick, |p| p.name == name);
    }

    fn apply_sensor(&mut self, sensor: &SensorMsg) -> Attempt {
        if !self.config.enable_visualizations || !sensor.visualize {
            return Attempt::Applied;
        }

        let (suffix, needs_topic) = match sensor.kind {
            SensorKind::Ray => ("_GUIONLY_laser_vis", true),
            SensorKind::Camera => ("_GUIONLY_camera_vis", false),
            SensorKind::Contact => ("_GUIONLY_contact_vis", true),
            SensorKind::Rfid => ("_GUIONLY_rfid_vis", true),
            SensorKind::RfidTag => ("_GUIONLY_rfidtag_vis", true),
            SensorKind::Other => return Attempt::Applied,
        };
        if needs_topic && sensor.topic.is_empty() {
            return Attempt::Applied;
        }

        let name = format!("{}{suffix}", sensor.name);
        if sensor.kind == SensorKind::Ray && self.registry.contains(&name) {
            return Attempt::Applied;
        }

        let parent = if sensor.kind == SensorKind::Contact {
            self.registry.root()
        } else {
            match self.registry.resolve(&sensor.parent) {
                Some(id) => id,
                None => return Attempt::Deferred(sensor.parent.clone()),
            }
        };

        if sensor.kind == SensorKind::Camera
            && !sensor.image_size.is_some_and(|(w, h)| w > 0 && h > 0)
        {
            // Rendering unavailable on the simulation side.
            return Attempt::Applied;
        }

        let kind = EntityKind::SensorVisual {
            sensor: sensor.kind,
            topic: sensor.topic.clone(),
        };
        let pose = (sensor.kind == SensorKind::Camera).then_some(sensor.pose);
        self.upsert_helper(&name, parent, kind, pose, true);
        Attempt::Applied
    }

    fn apply_light(&mut self, light: &LightMsg) -> Attempt {
        let root = self.registry.root();
        match self
            .registry
            .upsert(&light.name, root, EntityKind::Light(light.clone()))
        {
            Ok(upserted) => {
                if let Some(entity) = self.registry.get_mut(upserted.id()) {
                    entity.pose = light.pose;
                }
                self.record_upsert(&light.name, upserted);
            }
            Err(err) => tracing::warn!("Skipping light {}: {err}", light.name),
        }
        Attempt::Applied
    }

    fn apply_visual(&mut self, visual: &VisualMsg) -> Attempt {
        if visual.delete_me {
            if self.registry.lookup(&visual.name) == Some(self.registry.root()) {
                tracing::warn!("Ignoring delete for the world root");
                return Attempt::Applied;
            }
            let removed = self.registry.remove(&visual.name);
            if removed.is_empty() {
                // The create may still be waiting on its parent.
                tracing::debug!("Delete for {} waits until it exists", visual.name);
                return Attempt::Deferred(visual.name.clone());
            }
            self.note_removed(removed);
            return Attempt::Applied;
        }

        if matches!(visual.geometry, Some(Geometry::Unknown)) {
            tracing::warn!(
                "Skipping visual: {}",
                SyncError::UnknownGeometry(visual.name.clone())
            );
            return Attempt::Applied;
        }

        if let Some(id) = self.registry.lookup(&visual.name) {
            if let Some(entity) = self.registry.get_mut(id) {
                update_visual(entity, visual);
            }
            return Attempt::Applied;
        }

        if let Some(Geometry::Heightmap { uri, size }) = &visual.geometry {
            if !visual.name.contains(COLLISION_MARKER) && self.settings.heightmap.is_none() {
                tracing::info!("Loaded heightmap from {}", visual.name);
                self.settings.heightmap = Some(Heightmap {
                    visual: visual.name.clone(),
                    uri: uri.clone(),
                    size: *size,
                });
            }
            return Attempt::Applied;
        }

        let parent = match visual.parent_name.as_deref() {
            Some(parent) if parent != self.registry.world_name() && parent != WORLD_ROOT => {
                match self.registry.resolve(parent) {
                    Some(id) => id,
                    None => return Attempt::Deferred(parent.to_string()),
                }
            }
            _ => self.registry.root(),
        };

        let kind = EntityKind::Visual {
            geometry: visual.geometry.clone(),
            material: visual.material.clone(),
        };
        match self.registry.upsert(&visual.name, parent, kind) {
            Ok(upserted) => {
                if let Some(entity) = self.registry.get_mut(upserted.id()) {
                    update_visual(entity, visual);
                    if visual.name.contains(COLLISION_MARKER)
                        || visual.name.contains(SKELETON_MARKER)
                    {
                        entity.visible = false;
                    }
                }
                self.record_upsert(&visual.name, upserted);
            }
            Err(err) => tracing::warn!("Skipping visual {}: {err}", visual.name),
        }
        Attempt::Applied
    }

    fn apply_pose(&mut self, pose: &PoseMsg) -> Attempt {
        let Some(id) = self.registry.resolve(&pose.name) else {
            return Attempt::Deferred(pose.name.clone());
        };
        if let Some(entity) = self.registry.get_mut(id) {
            if self.selection.gates(&entity.name) {
                tracing::trace!("Pose for selected {} suppressed", entity.name);
            } else {
                entity.pose = pose.pose;
            }
        }
        Attempt::Applied
    }

    fn apply_skeleton_pose(&mut self, skeleton: &SkeletonPoseMsg) -> Attempt {
        let model = self.registry.resolve(&skeleton.model_name);
        let gated = match model.and_then(|id| self.registry.get(id)) {
            Some(entity) => self.selection.gates(&entity.name),
            None => self.selection.gates(&skeleton.model_name),
        };

        if !gated {
            for bone in &skeleton.bone_poses {
                if let Some(entity) = self
                    .registry
                    .resolve(&bone.name)
                    .and_then(|id| self.registry.get_mut(id))
                {
                    entity.pose = bone.pose;
                }
            }
        }

        match model.and_then(|id| self.registry.get_mut(id)) {
            Some(entity) => {
                entity.skeleton = Some(skeleton.clone());
                Attempt::Applied
            }
            None => Attempt::Deferred(skeleton.model_name.clone()),
        }
    }

    fn apply_request(&mut self, request: &RequestMsg) {
        let verb = match request.verb.parse::<RequestVerb>() {
            Ok(verb) => verb,
            Err(err) => {
                tracing::warn!("Ignoring request {}: {err}", request.id);
                return;
            }
        };
        tracing::debug!("Request {} {verb} [{}]", request.id, request.data);

        match verb {
            RequestVerb::SceneInfo => {}
            RequestVerb::EntityInfo => self.answer_entity_info(request),
            RequestVerb::EntityDelete => {
                let name = self
                    .registry
                    .resolve(&request.data)
                    .and_then(|id| self.registry.get(id))
                    .map(|e| e.name.clone());
                match name {
                    Some(name) => {
                        let removed = self.registry.remove(&name);
                        self.note_removed(removed);
                    }
                    None => tracing::warn!("Unable to find entity [{}] to delete", request.data),
                }
            }
            RequestVerb::ShowCollision | RequestVerb::HideCollision => self.toggle_helpers(
                &request.data,
                verb == RequestVerb::ShowCollision,
                |flags, show| flags.collision = show,
                Entity::is_collision_visual,
            ),
            RequestVerb::ShowJoints | RequestVerb::HideJoints => self.toggle_helpers(
                &request.data,
                verb == RequestVerb::ShowJoints,
                |flags, show| flags.joints = show,
                |e| matches!(e.kind, EntityKind::JointVisual(_)),
            ),
            RequestVerb::ShowCom | RequestVerb::HideCom => self.toggle_helpers(
                &request.data,
                verb == RequestVerb::ShowCom,
                |flags, show| flags.com = show,
                |e| matches!(e.kind, EntityKind::CenterOfMass(_)),
            ),
            RequestVerb::ShowSkeleton => {
                let show = request
                    .dbl_data
                    .is_some_and(|v| (v - 1.0).abs() < f64::EPSILON);
                self.toggle_helpers(
                    &request.data,
                    show,
                    |flags, show| flags.skeleton = show,
                    Entity::is_skeleton_visual,
                );
            }
            RequestVerb::SetTransparency => {
                let Some(id) = self.registry.resolve(&request.data) else {
                    tracing::warn!("Unable to find entity [{}] for {verb}", request.data);
                    return;
                };
                let value = request.dbl_data.unwrap_or(0.0).clamp(0.0, 1.0);
                for target in std::iter::once(id).chain(self.registry.descendants(id)) {
                    if let Some(entity) = self.registry.get_mut(target) {
                        entity.transparency = value;
                    }
                }
            }
        }
    }

    fn answer_entity_info(&mut self, request: &RequestMsg) {
        let light = self
            .registry
            .resolve(&request.data)
            .and_then(|id| self.registry.get(id))
            .and_then(|entity| match &entity.kind {
                EntityKind::Light(light) => Some(LightMsg {
                    pose: entity.pose,
                    ..light.clone()
                }),
                _ => None,
            });

        let (response, payload) = match light {
            Some(light) => ("success", ResponsePayload::Light(light)),
            None => ("failure", ResponsePayload::None),
        };
        self.report.outbound.push(Outbound::new(
            topics::RESPONSE,
            Message::Response(ResponseMsg {
                id: request.id,
                request: request.verb.clone(),
                response: response.to_string(),
                payload,
            }),
        ));
    }

    fn apply_joint(&mut self, joint: &JointMsg) -> Attempt {
        let parent = if joint.child == WORLD_CHILD {
            self.registry.root()
        } else {
            match self.registry.resolve(&joint.child) {
                Some(id) => id,
                None => return Attempt::Deferred(joint.child.clone()),
            }
        };

        let name = format!("{}{JOINT_SUFFIX}", joint.name);
        self.upsert_helper(
            &name,
            parent,
            EntityKind::JointVisual(joint.clone()),
            Some(joint.pose),
            false,
        );
        Attempt::Applied
    }

    fn apply_link(&mut self, link: &LinkMsg) -> Attempt {
        let Some(id) = self.registry.resolve(&link.name) else {
            return Attempt::Deferred(link.name.clone());
        };
        let link_name = self
            .registry
            .get(id)
            .map_or_else(|| link.name.clone(), |e| e.name.clone());

        if let Some(inertial) = link.inertial {
            let com = format!("{link_name}{COM_SUFFIX}");
            if !self.registry.contains(&com) {
                self.upsert_helper(
                    &com,
                    id,
                    EntityKind::CenterOfMass(inertial),
                    Some(inertial.pose),
                    false,
                );
            }
        }

        for projector in &link.projectors {
            let name = format!("{link_name}::{}", projector.name);
            if !self.registry.contains(&name) {
                let kind = EntityKind::Projector {
                    texture: projector.texture.clone(),
                    fov: projector.fov,
                };
                self.upsert_helper(&name, id, kind, Some(projector.pose), true);
            }
        }
        Attempt::Applied
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Create a derived helper entity. Re-creating one replaces its payload.
    fn upsert_helper(
        &mut self,
        name: &str,
        parent: EntityId,
        kind: EntityKind,
        pose: Option<Pose>,
        visible: bool,
    ) {
        match self.registry.upsert(name, parent, kind) {
            Ok(upserted) => {
                if let Some(entity) = self.registry.get_mut(upserted.id()) {
                    if let Some(pose) = pose {
                        entity.pose = pose;
                    }
                    if upserted.is_created() {
                        entity.visible = visible;
                    }
                }
                if !upserted.is_created() {
                    tracing::warn!("Duplicate helper {name}; keeping the later payload");
                }
                self.record_upsert(name, upserted);
            }
            Err(err) => tracing::warn!("Skipping helper {name}: {err}"),
        }
    }

    fn record_upsert(&mut self, name: &str, upserted: Upserted) {
        if upserted.is_created() {
            self.report.created.push(name.to_string());
        }
    }

    fn note_removed(&mut self, removed: Vec<String>) {
        self.selection.on_removed(&removed);
        tracing::debug!("Removed {} entities: {:?}", removed.len(), removed);
        self.report.removed.extend(removed);
    }

    fn toggle_helpers(
        &mut self,
        name: &str,
        show: bool,
        flag: impl Fn(&mut DisplayFlags, bool),
        target: impl Fn(&Entity) -> bool,
    ) {
        let Some(id) = self.registry.resolve(name) else {
            tracing::warn!("Unable to find entity [{name}]");
            return;
        };
        if let Some(entity) = self.registry.get_mut(id) {
            flag(&mut entity.display, show);
        }
        for descendant in self.registry.descendants(id) {
            if let Some(entity) = self.registry.get_mut(descendant) {
                if target(entity) {
                    entity.visible = show;
                }
            }
        }
    }

    fn expire_pending(&mut self, tick: u64, max_age: u64) {
        fn expire<T>(
            queue: &mut PendingQueue<T>,
            kind: MessageKind,
            tick: u64,
            max_age: u64,
        ) -> usize {
            let expired = queue.expire(tick, max_age);
            for entry in &expired {
                tracing::warn!(
                    "Dropping {kind} message after {} attempts; still waiting on {}",
                    entry.attempts,
                    entry.waiting_on.as_deref().unwrap_or("nothing")
                );
            }
            expired.len()
        }

        let mut expired = 0;
        expired += expire(&mut self.models, MessageKind::Model, tick, max_age);
        expired += expire(&mut self.sensors, MessageKind::Sensor, tick, max_age);
        expired += expire(&mut self.lights, MessageKind::Light, tick, max_age);
        expired += expire(&mut self.visuals, MessageKind::Visual, tick, max_age);
        expired += expire(&mut self.poses, MessageKind::Pose, tick, max_age);
        expired += expire(&mut self.skeleton_poses, MessageKind::SkeletonPose, tick, max_age);
        expired += expire(&mut self.joints, MessageKind::Joint, tick, max_age);
        expired += expire(&mut self.links, MessageKind::Link, tick, max_age);
        self.report.expired = expired;
    }
}

/// Put the survivors of a stage back, ahead of anything queued meanwhile.
fn restore<T>(slot: &mut PendingQueue<T>, mut survivors: PendingQueue<T>) {
    survivors.append(slot);
    *slot = survivors;
}

fn scoped_link_name(model: &str, link: &str) -> String {
    if link
        .strip_prefix(model)
        .is_some_and(|rest| rest.starts_with("::"))
    {
        link.to_string()
    } else {
        format!("{model}::{link}")
    }
}

fn update_visual(entity: &mut Entity, visual: &VisualMsg) {
    if let EntityKind::Visual { geometry, material } = &mut entity.kind {
        if visual.geometry.is_some() {
            geometry.clone_from(&visual.geometry);
        }
        if visual.material.is_some() {
            material.clone_from(&visual.material);
        }
    }
    if let Some(pose) = visual.pose {
        entity.pose = pose;
    }
    if let Some(transparency) = visual.transparency {
        entity.transparency = transparency.clamp(0.0, 1.0);
    }
    if let Some(visible) = visual.visible {
        entity.visible = visible;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_link_name() {
        assert_eq!(scoped_link_name("box", "link"), "box::link");
        assert_eq!(scoped_link_name("box", "box::link"), "box::link");
        assert_eq!(scoped_link_name("box", "boxer::link"), "box::boxer::link");
    }

    #[test]
    fn test_empty_tick_reports_nothing() {
        let mut reconciler = Reconciler::new(SyncConfig::default());
        let report = reconciler.apply_batch(IntakeBatch::default());
        assert_eq!(report.tick, 1);
        assert_eq!(report.drained, 0);
        assert_eq!(report.applied(), 0);
        assert_eq!(reconciler.pending_len(), 0);
    }

    #[test]
    fn test_update_visual_merges_present_fields() {
        let mut registry = EntityRegistry::new("default");
        let root = registry.root();
        let id = registry
            .upsert(
                "box",
                root,
                EntityKind::Visual {
                    geometry: Some(Geometry::Sphere { radius: 1.0 }),
                    material: Some("Gazebo/Grey".into()),
                },
            )
            .expect("box")
            .id();
        let entity = registry.get_mut(id).expect("entity");

        update_visual(
            entity,
            &VisualMsg {
                name: "box".into(),
                material: Some("Gazebo/Red".into()),
                transparency: Some(2.0),
                ..VisualMsg::default()
            },
        );

        assert!(matches!(
            &entity.kind,
            EntityKind::Visual {
                geometry: Some(Geometry::Sphere { .. }),
                material: Some(m),
            } if m == "Gazebo/Red"
        ));
        assert!((entity.transparency - 1.0).abs() < f64::EPSILON);
    }
}
