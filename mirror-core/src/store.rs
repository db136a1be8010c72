//! Shared snapshot storage for readers on other threads.
//!
//! The reconciler is owned by a single thread. After each tick that changed
//! something it publishes a [`SceneDocument`] here; HTTP handlers and tools
//! read the latest one without touching the reconciler.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::schema::{EntityDocument, SceneDocument};
use crate::{SyncError, SyncResult};

/// Thread-safe holder of the latest [`SceneDocument`].
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    latest: Arc<RwLock<Option<Arc<SceneDocument>>>>,
    /// Optional data directory for filesystem snapshots.
    data_dir: Option<PathBuf>,
}

impl SnapshotStore {
    /// Create an empty store without persistence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that can write snapshots to `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] if the directory cannot be created.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> SyncResult<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self {
            latest: Arc::default(),
            data_dir: Some(data_dir),
        })
    }

    /// Replace the latest document.
    pub fn publish(&self, document: SceneDocument) {
        let mut latest = self
            .latest
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *latest = Some(Arc::new(document));
    }

    /// The latest published document.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<SceneDocument>> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Look up one entity in the latest document.
    #[must_use]
    pub fn entity(&self, name: &str) -> Option<EntityDocument> {
        self.latest()
            .and_then(|doc| doc.entity(name).cloned())
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write the latest document to `<data_dir>/<world>.json`.
    ///
    /// Returns the written path, or `None` without a data directory or a
    /// published document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn persist(&self) -> SyncResult<Option<PathBuf>> {
        let (Some(data_dir), Some(doc)) = (self.data_dir.as_ref(), self.latest()) else {
            return Ok(None);
        };
        let json = serde_json::to_string_pretty(doc.as_ref())?;
        let path = snapshot_path(data_dir, &doc.world);
        std::fs::write(&path, json)?;
        tracing::debug!("Snapshot of {} written to {}", doc.world, path.display());
        Ok(Some(path))
    }

    /// Read a persisted snapshot for `world` and publish it.
    ///
    /// # Errors
    ///
    /// Returns an error if no data directory is configured, or the file
    /// doesn't exist or can't be parsed.
    pub fn load_from_disk(&self, world: &str) -> SyncResult<Arc<SceneDocument>> {
        let data_dir = self
            .data_dir
            .as_ref()
            .ok_or_else(|| SyncError::Config("No data directory configured".into()))?;
        let contents = std::fs::read_to_string(snapshot_path(data_dir, world))?;
        let doc: SceneDocument = serde_json::from_str(&contents)?;
        self.publish(doc);
        self.latest()
            .ok_or_else(|| SyncError::EntityNotFound(world.to_string()))
    }
}

fn snapshot_path(data_dir: &Path, world: &str) -> PathBuf {
    data_dir.join(format!("{}.json", sanitize_filename(world)))
}

/// Replace anything that is not alphanumeric, `-`, or `_` with `_`.
fn sanitize_filename(world: &str) -> String {
    world
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::reconciler::Reconciler;

    fn document(world: &str) -> SceneDocument {
        let config = SyncConfig {
            world_name: world.to_string(),
            ..SyncConfig::default()
        };
        Reconciler::new(config).document()
    }

    #[test]
    fn test_empty_store() {
        let store = SnapshotStore::new();
        assert!(store.latest().is_none());
        assert!(store.entity("box").is_none());
        assert!(matches!(store.persist(), Ok(None)));
    }

    #[test]
    fn test_publish_replaces_latest() {
        let store = SnapshotStore::new();
        store.publish(document("first"));
        store.publish(document("second"));
        assert_eq!(store.latest().map(|d| d.world.clone()), Some("second".into()));
    }

    #[test]
    fn test_clones_share_state() {
        let store = SnapshotStore::new();
        let reader = store.clone();
        store.publish(document("default"));
        assert!(reader.latest().is_some());
    }

    #[test]
    fn test_persistence_save_and_load() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = SnapshotStore::with_data_dir(dir.path()).expect("store");
        store.publish(document("my world"));

        let path = store.persist().expect("persist").expect("path");
        assert!(path.ends_with("my_world.json"));

        let fresh = SnapshotStore::with_data_dir(dir.path()).expect("store");
        let loaded = fresh.load_from_disk("my world").expect("load");
        assert_eq!(loaded.world, "my world");
    }

    #[test]
    fn test_load_missing_world_fails() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = SnapshotStore::with_data_dir(dir.path()).expect("store");
        assert!(matches!(store.load_from_disk("nope"), Err(SyncError::Io(_))));
        assert!(SnapshotStore::new().load_from_disk("nope").is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("shapes-1_a"), "shapes-1_a");
        assert_eq!(sanitize_filename("../etc"), "___etc");
    }
}
