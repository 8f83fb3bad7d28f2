//! Model: ParserConfig and its sections.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Algo, ConfigError, DialectKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub algo: String,
    pub dialect: Option<String>,
    /// Instance id stamped on records; `<algo>@unknown` when unset.
    pub instance: Option<String>,
    pub category: String,
    /// Key under which annotations are grouped in documents and envelopes.
    pub annotation_profile: String,
    pub output: OutputConfig,
    pub replay: ReplayConfig,
    pub live: LiveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeMode {
    /// Pace by original spacing; lines are written verbatim.
    Original,
    /// Rebase the earliest original timestamp onto replay start.
    Realtime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub speed: f64,
    pub repeat: u32,
    pub time_mode: TimeMode,
    pub work_dir: PathBuf,
    pub file_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub data_root: PathBuf,
    pub poll_interval_ms: u64,
    pub from_start: bool,
    pub shutdown_grace_ms: u64,
    pub read_chunk_bytes: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            algo: "finder".to_string(),
            dialect: None,
            instance: None,
            category: "live".to_string(),
            annotation_profile: "time_vs_magnitude".to_string(),
            output: OutputConfig::default(),
            replay: ReplayConfig::default(),
            live: LiveConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            repeat: 1,
            time_mode: TimeMode::Original,
            work_dir: PathBuf::from("tmp"),
            file_prefix: "fake_".to_string(),
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            poll_interval_ms: 100,
            from_start: false,
            shutdown_grace_ms: 500,
            read_chunk_bytes: 8 * 1024 * 1024,
        }
    }
}

impl ParserConfig {
    pub fn for_algo(algo: Algo) -> Self {
        Self {
            algo: algo.as_str().to_string(),
            ..Self::default()
        }
    }

    pub fn algo(&self) -> Result<Algo, ConfigError> {
        self.algo.parse()
    }

    pub fn dialect_kind(&self) -> Result<DialectKind, ConfigError> {
        DialectKind::resolve(self.algo()?, self.dialect.as_deref())
    }

    pub fn instance_or_default(&self) -> Result<String, ConfigError> {
        match self.instance.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Ok(format!("{}@unknown", self.algo()?)),
        }
    }

    /// Validate before any parsing starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dialect_kind()?;
        if self.annotation_profile.trim().is_empty() {
            return Err(ConfigError::Invalid("annotation_profile must not be empty".into()));
        }
        self.replay.validate()?;
        self.live.validate()?;
        Ok(())
    }
}

impl ReplayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repeat == 0 {
            return Err(ConfigError::Invalid("replay.repeat must be >= 1".into()));
        }
        if self.file_prefix.contains(std::path::MAIN_SEPARATOR) {
            return Err(ConfigError::Invalid("replay.file_prefix must not contain a path separator".into()));
        }
        Ok(())
    }

    /// `speed <= 0` (or NaN) means real speed; tiny speeds are clamped to 0.001.
    pub fn normalized_speed(&self) -> f64 {
        normalize_speed(self.speed)
    }
}

pub(crate) fn normalize_speed(speed: f64) -> f64 {
    if !speed.is_finite() || speed <= 0.0 {
        1.0
    } else if speed < 0.001 {
        0.001
    } else {
        speed
    }
}

impl LiveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("live.poll_interval_ms must be > 0".into()));
        }
        if self.read_chunk_bytes == 0 {
            return Err(ConfigError::Invalid("live.read_chunk_bytes must be > 0".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
