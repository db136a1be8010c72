//! Mirror configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{SyncError, SyncResult};

/// Default world name.
pub const DEFAULT_WORLD: &str = "default";

/// Settings for a [`Reconciler`](crate::Reconciler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Name of the mirrored world. Visuals parented to it attach to the root.
    pub world_name: String,
    /// Create sensor visualization entities.
    pub enable_visualizations: bool,
    /// Drop pending messages older than this many ticks. `None` retries forever.
    pub max_pending_ticks: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            world_name: DEFAULT_WORLD.to_string(),
            enable_visualizations: true,
            max_pending_ticks: None,
        }
    }
}

impl SyncConfig {
    /// Build a config from environment variables or defaults.
    ///
    /// Environment variables:
    /// - `SCENE_MIRROR_WORLD`: world name (default: `default`)
    /// - `SCENE_MIRROR_VISUALIZATIONS`: `true`/`false` (default: `true`)
    /// - `SCENE_MIRROR_MAX_PENDING_TICKS`: expiry age in ticks (default: unset)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let world_name = std::env::var("SCENE_MIRROR_WORLD")
            .ok()
            .filter(|w| !w.is_empty())
            .unwrap_or(defaults.world_name);
        let enable_visualizations = std::env::var("SCENE_MIRROR_VISUALIZATIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.enable_visualizations);
        let max_pending_ticks = std::env::var("SCENE_MIRROR_MAX_PENDING_TICKS")
            .ok()
            .and_then(|v| v.parse().ok());
        Self {
            world_name,
            enable_visualizations,
            max_pending_ticks,
        }
    }

    /// Load a config from a JSON file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read, parsed, or fails
    /// [`validate`](Self::validate).
    pub fn from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] for an empty world name or a zero expiry.
    pub fn validate(&self) -> SyncResult<()> {
        if self.world_name.trim().is_empty() {
            return Err(SyncError::Config("world_name must not be empty".into()));
        }
        if self.max_pending_ticks == Some(0) {
            return Err(SyncError::Config(
                "max_pending_ticks must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_retry_forever() {
        let config = SyncConfig::default();
        assert_eq!(config.world_name, DEFAULT_WORLD);
        assert!(config.enable_visualizations);
        assert!(config.max_pending_ticks.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"world_name": "shapes", "max_pending_ticks": 600}}"#).expect("write");

        let config = SyncConfig::from_file(file.path()).expect("load");
        assert_eq!(config.world_name, "shapes");
        assert_eq!(config.max_pending_ticks, Some(600));
        assert!(config.enable_visualizations);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = SyncConfig {
            max_pending_ticks: Some(0),
            ..SyncConfig::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"world_name": " "}}"#).expect("write");
        assert!(SyncConfig::from_file(file.path()).is_err());
    }
}
