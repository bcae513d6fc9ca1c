//! Streaming configuration.
//!
//! [`StreamingConfig`] is the single configuration surface for a world: grid
//! geometry, streaming radius, scheduler admission control, LOD range and
//! pool warm-up. It can be built in code with the `with_*` setters or loaded
//! from an INI file (see [`StreamingConfig::load`]).
//!
//! # File Format
//!
//! ```ini
//! [world]
//! seed = hello
//! chunk_size = 32
//! resolution = 2
//! max_lod_level = 4
//!
//! [streaming]
//! load_radius = 10
//! tick_interval_ms = 500
//! lod_distance_step = 2.0
//! retain_radius = 20
//!
//! [scheduler]
//! max_concurrent_tasks = 32
//! tick_interval_ms = 16
//! reprioritize_threshold = 0.5
//!
//! [pools]
//! prewarm = 10
//! ```

mod file;
mod seed;

pub use seed::{hash_seed, SEED_RANGE};

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// =============================================================================
// Defaults
// =============================================================================

/// Default chunk edge length in world units.
pub const DEFAULT_CHUNK_SIZE: u32 = 32;

/// Default heightmap subdivisions per world unit.
pub const DEFAULT_RESOLUTION: u32 = 2;

/// Default highest (coarsest) level of detail.
pub const DEFAULT_MAX_LOD_LEVEL: u8 = 4;

/// Upper bound accepted for `max_lod_level`.
pub const MAX_SUPPORTED_LOD_LEVEL: u8 = 8;

/// Default streaming radius in chunks.
pub const DEFAULT_LOAD_RADIUS: f32 = 10.0;

/// Upper bound accepted for `load_radius`, in chunks.
pub const MAX_SUPPORTED_LOAD_RADIUS: f32 = 64.0;

/// Default streaming controller cadence.
pub const DEFAULT_STREAMING_TICK_MS: u64 = 500;

/// Default distance (in chunks) covered by one LOD step.
pub const DEFAULT_LOD_DISTANCE_STEP: f32 = 2.0;

/// Default number of tasks allowed to execute at once.
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 32;

/// Default scheduler drain cadence.
pub const DEFAULT_SCHEDULER_TICK_MS: u64 = 16;

/// Default priority change (in chunks) that forces a pending task to be re-sorted.
pub const DEFAULT_REPRIORITIZE_THRESHOLD: f32 = 0.5;

/// Default number of instances created per pool at startup.
pub const DEFAULT_POOL_PREWARM: usize = 10;

/// Default world seed string.
pub const DEFAULT_SEED: &str = "default";

// =============================================================================
// Errors
// =============================================================================

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid INI.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A key holds a value of the wrong shape.
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    /// The configuration is well-formed but semantically invalid.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Sections
// =============================================================================

/// World geometry and generation settings.
#[derive(Clone, Debug, PartialEq)]
pub struct WorldConfig {
    /// Chunk edge length in world units.
    pub chunk_size: u32,

    /// Heightmap subdivisions per world unit.
    pub resolution: u32,

    /// Highest level of detail a build may use.
    pub max_lod_level: u8,

    /// Seed string, hashed into noise offsets by the generator passes.
    pub seed: String,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            resolution: DEFAULT_RESOLUTION,
            max_lod_level: DEFAULT_MAX_LOD_LEVEL,
            seed: DEFAULT_SEED.to_string(),
        }
    }
}

impl WorldConfig {
    /// Number of heightmap samples along one chunk edge.
    pub fn samples_per_edge(&self) -> usize {
        (self.chunk_size * self.resolution) as usize + 1
    }
}

/// Streaming controller settings.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamingSection {
    /// Chunks within this distance of the observer are kept resident.
    pub load_radius: f32,

    /// How often the controller recomputes the desired set.
    pub tick_interval: Duration,

    /// Distance in chunks covered by each level of detail.
    pub lod_distance_step: f32,

    /// Generated chunks farther than this are evicted from the store.
    ///
    /// `None` means twice the load radius.
    pub retain_radius: Option<f32>,
}

impl Default for StreamingSection {
    fn default() -> Self {
        Self {
            load_radius: DEFAULT_LOAD_RADIUS,
            tick_interval: Duration::from_millis(DEFAULT_STREAMING_TICK_MS),
            lod_distance_step: DEFAULT_LOD_DISTANCE_STEP,
            retain_radius: None,
        }
    }
}

/// Scheduler settings.
#[derive(Clone, Debug, PartialEq)]
pub struct SchedulerConfig {
    /// Hard ceiling on tasks admitted from the pending set.
    pub max_concurrent_tasks: usize,

    /// Drain-and-dispatch cadence.
    pub tick_interval: Duration,

    /// Minimum priority change before a pending task is re-sorted.
    pub reprioritize_threshold: f32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            tick_interval: Duration::from_millis(DEFAULT_SCHEDULER_TICK_MS),
            reprioritize_threshold: DEFAULT_REPRIORITIZE_THRESHOLD,
        }
    }
}

/// Resource pool settings.
#[derive(Clone, Debug, PartialEq)]
pub struct PoolConfig {
    /// Instances created per pool when it is registered.
    pub prewarm: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            prewarm: DEFAULT_POOL_PREWARM,
        }
    }
}

// =============================================================================
// Streaming Config
// =============================================================================

/// Complete configuration for one streamed world.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamingConfig {
    pub world: WorldConfig,
    pub streaming: StreamingSection,
    pub scheduler: SchedulerConfig,
    pub pools: PoolConfig,
}

impl StreamingConfig {
    /// Creates a configuration with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the chunk edge length.
    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.world.chunk_size = chunk_size;
        self
    }

    /// Set the heightmap resolution.
    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.world.resolution = resolution;
        self
    }

    /// Set the world seed.
    pub fn with_seed(mut self, seed: impl Into<String>) -> Self {
        self.world.seed = seed.into();
        self
    }

    /// Set the maximum level of detail.
    pub fn with_max_lod_level(mut self, level: u8) -> Self {
        self.world.max_lod_level = level;
        self
    }

    /// Set the streaming radius.
    pub fn with_load_radius(mut self, radius: f32) -> Self {
        self.streaming.load_radius = radius;
        self
    }

    /// Set the chunk store retain radius.
    pub fn with_retain_radius(mut self, radius: f32) -> Self {
        self.streaming.retain_radius = Some(radius);
        self
    }

    /// Set the distance covered by each LOD step.
    pub fn with_lod_distance_step(mut self, step: f32) -> Self {
        self.streaming.lod_distance_step = step;
        self
    }

    /// Set the streaming tick interval.
    pub fn with_streaming_tick(mut self, interval: Duration) -> Self {
        self.streaming.tick_interval = interval;
        self
    }

    /// Set the scheduler concurrency ceiling.
    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.scheduler.max_concurrent_tasks = max;
        self
    }

    /// Set the scheduler tick interval.
    pub fn with_scheduler_tick(mut self, interval: Duration) -> Self {
        self.scheduler.tick_interval = interval;
        self
    }

    /// Set the number of instances pre-warmed per pool.
    pub fn with_pool_prewarm(mut self, prewarm: usize) -> Self {
        self.pools.prewarm = prewarm;
        self
    }

    /// Effective retain radius for the chunk store.
    pub fn retain_radius(&self) -> f32 {
        self.streaming
            .retain_radius
            .unwrap_or(self.streaming.load_radius * 2.0)
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be at least 1".into()));
        }
        if self.world.resolution == 0 {
            return Err(ConfigError::Invalid("resolution must be at least 1".into()));
        }
        if self.world.max_lod_level > MAX_SUPPORTED_LOD_LEVEL {
            return Err(ConfigError::Invalid(format!(
                "max_lod_level must be at most {}",
                MAX_SUPPORTED_LOD_LEVEL
            )));
        }
        if !self.streaming.load_radius.is_finite() || self.streaming.load_radius < 0.0 {
            return Err(ConfigError::Invalid(
                "load_radius must be a non-negative number".into(),
            ));
        }
        if self.streaming.load_radius > MAX_SUPPORTED_LOAD_RADIUS {
            return Err(ConfigError::Invalid(format!(
                "load_radius must be at most {}",
                MAX_SUPPORTED_LOAD_RADIUS
            )));
        }
        if self.retain_radius() < self.streaming.load_radius {
            return Err(ConfigError::Invalid(
                "retain_radius must not be smaller than load_radius".into(),
            ));
        }
        let step = self.streaming.lod_distance_step;
        if step.is_nan() || step <= 0.0 {
            return Err(ConfigError::Invalid(
                "lod_distance_step must be positive".into(),
            ));
        }
        if self.scheduler.max_concurrent_tasks == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_tasks must be at least 1".into(),
            ));
        }
        if self.scheduler.tick_interval.is_zero() || self.streaming.tick_interval.is_zero() {
            return Err(ConfigError::Invalid("tick intervals must be non-zero".into()));
        }
        if self.scheduler.reprioritize_threshold < 0.0 {
            return Err(ConfigError::Invalid(
                "reprioritize_threshold must be non-negative".into(),
            ));
        }
        Ok(())
    }
}
