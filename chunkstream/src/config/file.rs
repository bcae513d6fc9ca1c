//! INI file loading and rendering for [`StreamingConfig`].

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};

use super::{ConfigError, StreamingConfig};

impl StreamingConfig {
    /// Loads a configuration file, starting from defaults.
    ///
    /// Missing sections and keys keep their default values; unknown keys are
    /// ignored. The result is validated before it is returned.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini_str(&text)
    }

    /// Parses configuration from INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = StreamingConfig::default();

        if let Some(section) = ini.section(Some("world")) {
            read(section, "world.chunk_size", "chunk_size", &mut config.world.chunk_size)?;
            read(section, "world.resolution", "resolution", &mut config.world.resolution)?;
            read(
                section,
                "world.max_lod_level",
                "max_lod_level",
                &mut config.world.max_lod_level,
            )?;
            if let Some(seed) = section.get("seed") {
                config.world.seed = seed.trim().to_string();
            }
        }

        if let Some(section) = ini.section(Some("streaming")) {
            read(
                section,
                "streaming.load_radius",
                "load_radius",
                &mut config.streaming.load_radius,
            )?;
            read_millis(
                section,
                "streaming.tick_interval_ms",
                "tick_interval_ms",
                &mut config.streaming.tick_interval,
            )?;
            read(
                section,
                "streaming.lod_distance_step",
                "lod_distance_step",
                &mut config.streaming.lod_distance_step,
            )?;
            if let Some(raw) = section.get("retain_radius") {
                config.streaming.retain_radius =
                    Some(parse("streaming.retain_radius", raw)?);
            }
        }

        if let Some(section) = ini.section(Some("scheduler")) {
            read(
                section,
                "scheduler.max_concurrent_tasks",
                "max_concurrent_tasks",
                &mut config.scheduler.max_concurrent_tasks,
            )?;
            read_millis(
                section,
                "scheduler.tick_interval_ms",
                "tick_interval_ms",
                &mut config.scheduler.tick_interval,
            )?;
            read(
                section,
                "scheduler.reprioritize_threshold",
                "reprioritize_threshold",
                &mut config.scheduler.reprioritize_threshold,
            )?;
        }

        if let Some(section) = ini.section(Some("pools")) {
            read(section, "pools.prewarm", "prewarm", &mut config.pools.prewarm)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Renders the configuration as INI text that [`from_ini_str`] accepts.
    ///
    /// [`from_ini_str`]: StreamingConfig::from_ini_str
    pub fn to_ini_string(&self) -> String {
        let mut ini = Ini::new();
        ini.with_section(Some("world"))
            .set("seed", self.world.seed.as_str())
            .set("chunk_size", self.world.chunk_size.to_string())
            .set("resolution", self.world.resolution.to_string())
            .set("max_lod_level", self.world.max_lod_level.to_string());

        let mut streaming = ini.with_section(Some("streaming"));
        streaming
            .set("load_radius", self.streaming.load_radius.to_string())
            .set(
                "tick_interval_ms",
                self.streaming.tick_interval.as_millis().to_string(),
            )
            .set(
                "lod_distance_step",
                self.streaming.lod_distance_step.to_string(),
            );
        if let Some(retain) = self.streaming.retain_radius {
            streaming.set("retain_radius", retain.to_string());
        }

        ini.with_section(Some("scheduler"))
            .set(
                "max_concurrent_tasks",
                self.scheduler.max_concurrent_tasks.to_string(),
            )
            .set(
                "tick_interval_ms",
                self.scheduler.tick_interval.as_millis().to_string(),
            )
            .set(
                "reprioritize_threshold",
                self.scheduler.reprioritize_threshold.to_string(),
            );

        ini.with_section(Some("pools"))
            .set("prewarm", self.pools.prewarm.to_string());

        let mut out = Vec::new();
        if ini.write_to(&mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        })
}

fn read<T: FromStr>(
    section: &Properties,
    full_key: &str,
    key: &str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(raw) = section.get(key) {
        *target = parse(full_key, raw)?;
    }
    Ok(())
}

fn read_millis(
    section: &Properties,
    full_key: &str,
    key: &str,
    target: &mut Duration,
) -> Result<(), ConfigError> {
    if let Some(raw) = section.get(key) {
        *target = Duration::from_millis(parse(full_key, raw)?);
    }
    Ok(())
}
