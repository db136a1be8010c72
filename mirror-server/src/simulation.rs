//! Built-in demo simulation for `--demo`.
//!
//! Answers `scene_info` with a small world and then streams traffic the way
//! a real simulator does: continuous poses, plus models that appear and
//! disappear with their messages deliberately out of order.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use mirror_core::{
    topics, CollisionMsg, Color, Geometry, InertialMsg, JointKind, JointMsg, LightKind, LightMsg,
    LinkMsg, LocalBus, Message, ModelMsg, Outbound, Pose, PoseMsg, RequestVerb, ResponseMsg,
    ResponsePayload, SceneMsg, SensorKind, SensorMsg, SkyMsg, SubscriptionId, Transport,
    Vector3, VisualMsg,
};
use tokio::sync::watch;

/// Steps between crate spawns.
const SPAWN_EVERY: u64 = 20;

/// Spawned crates kept alive at once.
const MAX_CRATES: usize = 3;

fn visual(name: &str, parent: &str, geometry: Option<Geometry>) -> VisualMsg {
    VisualMsg {
        name: name.to_string(),
        parent_name: Some(parent.to_string()),
        geometry,
        ..VisualMsg::default()
    }
}

/// The demo world: ground, a box with a laser, a two-link arm and a sun.
#[must_use]
pub fn demo_scene(world: &str) -> SceneMsg {
    let ground = ModelMsg {
        name: "ground_plane".into(),
        visuals: vec![visual("ground_plane", world, None)],
        links: vec![LinkMsg {
            name: "link".into(),
            visuals: vec![
                visual("ground_plane::link", "ground_plane", None),
                visual(
                    "ground_plane::link::visual",
                    "ground_plane::link",
                    Some(Geometry::Plane {
                        normal: Vector3::new(0.0, 0.0, 1.0),
                        size: [100.0, 100.0],
                    }),
                ),
            ],
            ..LinkMsg::default()
        }],
        ..ModelMsg::default()
    };

    let cube = ModelMsg {
        name: "box".into(),
        pose: Pose::from_position(2.0, 0.0, 0.5),
        visuals: vec![visual("box", world, None)],
        links: vec![LinkMsg {
            name: "link".into(),
            inertial: Some(InertialMsg {
                mass: 1.0,
                pose: Pose::default(),
            }),
            visuals: vec![
                visual("box::link", "box", None),
                visual(
                    "box::link::visual",
                    "box::link",
                    Some(Geometry::Box {
                        size: Vector3::new(1.0, 1.0, 1.0),
                    }),
                ),
            ],
            collisions: vec![CollisionMsg {
                name: "collision".into(),
                visuals: vec![visual(
                    "box::link::collision__COLLISION_VISUAL__",
                    "box::link",
                    Some(Geometry::Box {
                        size: Vector3::new(1.0, 1.0, 1.0),
                    }),
                )],
            }],
            sensors: vec![SensorMsg {
                name: "box::link::laser".into(),
                kind: SensorKind::Ray,
                parent: "box::link".into(),
                topic: "~/box/link/laser/scan".into(),
                visualize: true,
                ..SensorMsg::default()
            }],
            ..LinkMsg::default()
        }],
        ..ModelMsg::default()
    };

    let arm = ModelMsg {
        name: "arm".into(),
        pose: Pose::from_position(-2.0, 0.0, 0.0),
        visuals: vec![visual("arm", world, None)],
        links: vec![
            LinkMsg {
                name: "base".into(),
                visuals: vec![visual("arm::base", "arm", None)],
                ..LinkMsg::default()
            },
            LinkMsg {
                name: "upper".into(),
                pose: Pose::from_position(0.0, 0.0, 1.0),
                inertial: Some(InertialMsg {
                    mass: 0.5,
                    pose: Pose::from_position(0.0, 0.0, 0.5),
                }),
                visuals: vec![
                    visual("arm::upper", "arm", None),
                    visual(
                        "arm::upper::visual",
                        "arm::upper",
                        Some(Geometry::Cylinder {
                            radius: 0.1,
                            length: 1.0,
                        }),
                    ),
                ],
                ..LinkMsg::default()
            },
        ],
        joints: vec![JointMsg {
            name: "arm::shoulder".into(),
            parent: "arm::base".into(),
            child: "arm::upper".into(),
            kind: JointKind::Revolute,
            axis1: Some(Vector3::new(0.0, 1.0, 0.0)),
            ..JointMsg::default()
        }],
    };

    SceneMsg {
        name: Some(world.to_string()),
        ambient: Some(Color::new(0.4, 0.4, 0.4, 1.0)),
        shadows: Some(true),
        sky: Some(SkyMsg {
            time: Some(14.0),
            ..SkyMsg::default()
        }),
        models: vec![ground, cube, arm],
        lights: vec![LightMsg {
            name: "sun".into(),
            kind: LightKind::Directional,
            pose: Pose::from_position(0.0, 0.0, 10.0),
            diffuse: Color::new(0.8, 0.8, 0.8, 1.0),
            direction: Some(Vector3::new(-0.5, 0.1, -0.9)),
            cast_shadows: true,
            ..LightMsg::default()
        }],
        ..SceneMsg::default()
    }
}

/// Answer `scene_info` requests on `bus` with [`demo_scene`].
pub fn install_responder(bus: &Arc<LocalBus>, world: &str) -> SubscriptionId {
    let weak: Weak<LocalBus> = Arc::downgrade(bus);
    let world = world.to_string();
    bus.subscribe(
        topics::REQUEST,
        Arc::new(move |message| {
            let Message::Request(request) = message else {
                return;
            };
            if request.verb != RequestVerb::SceneInfo.as_str() {
                return;
            }
            let Some(bus) = weak.upgrade() else {
                return;
            };
            tracing::debug!("Demo simulation answering scene request {}", request.id);
            bus.publish(
                topics::RESPONSE,
                Message::Response(ResponseMsg {
                    id: request.id,
                    request: request.verb,
                    response: "success".into(),
                    payload: ResponsePayload::Scene(demo_scene(&world)),
                }),
            );
        }),
    )
}

/// Deterministic traffic generator.
#[derive(Debug, Default)]
pub struct DemoSimulation {
    step: u64,
    spawned: u64,
    live: VecDeque<String>,
}

impl DemoSimulation {
    /// Start at step zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the messages for the next step.
    #[allow(clippy::cast_precision_loss)]
    pub fn step(&mut self) -> Vec<Outbound> {
        self.step += 1;
        let t = self.step as f64 * 0.05;
        let mut out = vec![Outbound::new(
            topics::POSE,
            Message::Pose(PoseMsg::new(
                "box",
                Pose::from_position(2.0 * t.cos(), 2.0 * t.sin(), 0.5),
            )),
        )];

        if self.step % SPAWN_EVERY == 0 {
            self.spawned += 1;
            let name = format!("crate_{}", self.spawned);
            let x = (self.spawned % 5) as f64 - 2.0;
            // Child first, pose before either: the mirror has to hold both.
            out.push(Outbound::new(
                topics::POSE,
                Message::Pose(PoseMsg::new(&name, Pose::from_position(x, 3.0, 0.25))),
            ));
            out.push(Outbound::new(
                topics::VISUAL,
                Message::Visual(visual(
                    &format!("{name}::link"),
                    &name,
                    Some(Geometry::Box {
                        size: Vector3::new(0.5, 0.5, 0.5),
                    }),
                )),
            ));
            out.push(Outbound::new(
                topics::VISUAL,
                Message::Visual(VisualMsg {
                    name: name.clone(),
                    ..VisualMsg::default()
                }),
            ));
            self.live.push_back(name);

            if self.live.len() > MAX_CRATES {
                if let Some(oldest) = self.live.pop_front() {
                    out.push(Outbound::new(
                        topics::VISUAL,
                        Message::Visual(VisualMsg {
                            name: oldest,
                            delete_me: true,
                            ..VisualMsg::default()
                        }),
                    ));
                }
            }
        }
        out
    }

    /// Crates currently alive in the simulation.
    #[must_use]
    pub fn live(&self) -> impl Iterator<Item = &str> {
        self.live.iter().map(String::as_str)
    }
}

/// Publish simulation steps on `bus` every `period` until shutdown.
pub async fn run(bus: Arc<LocalBus>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut simulation = DemoSimulation::new();
    let mut interval = tokio::time::interval(period);
    tracing::info!("Demo simulation running every {period:?}");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                for item in simulation.step() {
                    bus.publish(&item.topic, item.message);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::info!("Demo simulation stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_core::{MessageIntake, Reconciler, SceneClient, SyncConfig};

    #[test]
    fn test_spawns_out_of_order_and_retires_oldest() {
        let mut simulation = DemoSimulation::new();
        let mut all = Vec::new();
        for _ in 0..SPAWN_EVERY * 5 {
            all.extend(simulation.step());
        }

        let deletes = all
            .iter()
            .filter(|o| matches!(&o.message, Message::Visual(v) if v.delete_me))
            .count();
        assert_eq!(deletes, 2);
        assert_eq!(
            simulation.live().collect::<Vec<_>>(),
            vec!["crate_3", "crate_4", "crate_5"]
        );
    }

    #[test]
    fn test_demo_world_reconciles_without_leftovers() {
        let bus = Arc::new(LocalBus::new());
        install_responder(&bus, "default");
        let intake = MessageIntake::new();
        let client = SceneClient::connect(bus.clone(), intake.clone(), "default");
        let mut reconciler = Reconciler::new(SyncConfig::default());

        client.request_scene();
        let mut simulation = DemoSimulation::new();
        for _ in 0..SPAWN_EVERY * 5 {
            for item in simulation.step() {
                bus.publish(&item.topic, item.message);
            }
            reconciler.tick(&intake);
        }

        let registry = reconciler.registry();
        for name in [
            "ground_plane::link::visual",
            "box::link_COM_VISUAL__",
            "box::link::laser_GUIONLY_laser_vis",
            "arm::shoulder_JOINT_VISUAL__",
            "sun",
            "crate_5::link",
        ] {
            assert!(registry.contains(name), "missing {name}");
        }
        assert!(!registry.contains("crate_1"));
        assert!(!registry.contains("crate_1::link"));
        assert_eq!(reconciler.pending_len(), 0);
    }
}
