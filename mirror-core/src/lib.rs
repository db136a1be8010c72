//! # Scene Mirror Core
//!
//! Incremental scene-graph synchronization: keeps a local mirror of a
//! simulated world consistent with a stream of out-of-order update messages.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │        Transport (LocalBus, ...)            │
//! │   topic callbacks on any thread             │
//! ├─────────────────────────────────────────────┤
//! │  MessageIntake   (Arc<Mutex<..>>)           │
//! │  - per-kind queues                          │
//! │  - latest pose per name                     │
//! ├─────────────────────────────────────────────┤
//! │  Reconciler      (owning thread, per tick)  │
//! │  - dependency-ordered stages                │
//! │  - PendingQueue retries                     │
//! │  - SelectionState gating                    │
//! ├─────────────────────────────────────────────┤
//! │  EntityRegistry  │  SnapshotStore           │
//! │  - slotmap arena │  - SceneDocument for     │
//! │  - name index    │    other threads         │
//! └─────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod entity;
pub mod error;
pub mod intake;
pub mod message;
pub mod pending;
pub mod reconciler;
pub mod registry;
pub mod request;
pub mod schema;
pub mod selection;
pub mod settings;
pub mod store;
pub mod transport;
pub mod types;

pub use config::SyncConfig;
pub use entity::{DisplayFlags, Entity, EntityId, EntityKind, WORLD_ROOT};
pub use error::{SyncError, SyncResult};
pub use intake::{IntakeBatch, MessageIntake};
pub use message::{
    CollisionMsg, FogKind, FogMsg, Geometry, InertialMsg, JointKind, JointMsg, LightKind,
    LightMsg, LinkMsg, Message, MessageKind, ModelMsg, PoseMsg, ProjectorMsg, RequestMsg,
    ResponseMsg, ResponsePayload, SceneMsg, SelectionMsg, SensorKind, SensorMsg,
    SkeletonPoseMsg, SkyMsg, VisualMsg,
};
pub use pending::{Attempt, PendingEntry, PendingQueue, ProcessStats};
pub use reconciler::{Reconciler, TickReport};
pub use registry::{EntityRegistry, Upserted};
pub use request::RequestVerb;
pub use schema::{EntityDocument, SceneDocument};
pub use selection::SelectionState;
pub use settings::{Fog, Heightmap, SceneSettings, Sky};
pub use store::SnapshotStore;
pub use transport::{
    topic_for, topics, LocalBus, MessageHandler, Outbound, SceneClient, SubscriptionId,
    Transport,
};
pub use types::{Color, Pose, Quaternion, Vector3};

/// Scene mirror core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
