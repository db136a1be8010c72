//! Command-line arguments.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mirror_core::{SyncConfig, SyncResult};

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 9474;

/// Command-line arguments for scene-mirror.
#[derive(Debug, Clone, Parser)]
#[command(name = "scene-mirror")]
#[command(about = "Mirror a simulated scene graph from out-of-order update messages")]
#[command(version)]
pub struct CliArgs {
    /// HTTP port (bound on localhost only)
    #[arg(long, env = "SCENE_MIRROR_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Reconciliation ticks per second
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub tick_hz: u32,

    /// JSON config file; CLI flags override its values
    #[arg(long, env = "SCENE_MIRROR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Name of the mirrored world
    #[arg(long)]
    pub world: Option<String>,

    /// Drop pending messages older than this many ticks
    #[arg(long)]
    pub max_pending_ticks: Option<u64>,

    /// Do not create sensor visualizations
    #[arg(long)]
    pub no_visualizations: bool,

    /// Run the built-in demo simulation on the local bus
    #[arg(long)]
    pub demo: bool,

    /// Directory for snapshot files written on shutdown
    #[arg(long, env = "SCENE_MIRROR_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

impl CliArgs {
    /// Resolve the mirror configuration.
    ///
    /// Starts from the config file if given, otherwise from `SCENE_MIRROR_*`
    /// environment variables, then applies flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file can't be loaded or the result is
    /// invalid.
    pub fn sync_config(&self) -> SyncResult<SyncConfig> {
        let mut config = match &self.config {
            Some(path) => SyncConfig::from_file(path)?,
            None => SyncConfig::from_env(),
        };
        if let Some(world) = &self.world {
            config.world_name.clone_from(world);
        }
        if self.max_pending_ticks.is_some() {
            config.max_pending_ticks = self.max_pending_ticks;
        }
        if self.no_visualizations {
            config.enable_visualizations = false;
        }
        config.validate()?;
        Ok(config)
    }

    /// Interval between ticks.
    #[must_use]
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(1) / self.tick_hz.max(1)
    }
}
