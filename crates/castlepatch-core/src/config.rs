//! Patcher configuration.
//!
//! Loaded from a TOML file; every field has a default, so an empty file is a
//! valid configuration.
//!
//! ```toml
//! artifact_dir = "C:/castlepatch"
//! launch_delay_secs = 10
//!
//! [heuristics]
//! loose_fallback = false
//!
//! [[limits]]
//! category = "team"
//! values = [4]
//! replacement = 24
//! needles = ["CurrentTeamInfos"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::limits::{
    ContextRule, DEFAULT_WINDOW_RADIUS, HeuristicSettings, LimitCategory, LimitSignature,
    default_signatures,
};
use crate::scan::{BytePattern, Endian, IntWidth};

/// Default artifact directory name under the local data dir
const ARTIFACT_DIR_NAME: &str = "castlepatch";

/// Replacement for one built-in limit signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOverride {
    pub category: LimitCategory,
    /// Plausible current values, in priority order
    pub values: Vec<i64>,
    /// Integer width in bits
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default)]
    pub big_endian: bool,
    pub replacement: i64,
    pub needles: Vec<String>,
    #[serde(default = "default_window_radius")]
    pub window_radius: usize,
}

fn default_width() -> u32 {
    32
}

fn default_window_radius() -> usize {
    DEFAULT_WINDOW_RADIUS
}

impl LimitOverride {
    pub fn to_signature(&self) -> Result<LimitSignature> {
        let width = IntWidth::from_bits(self.width).ok_or_else(|| {
            Error::Config(format!(
                "{}: unsupported width {} (expected 8, 16, 32 or 64)",
                self.category, self.width
            ))
        })?;
        let endian = if self.big_endian {
            Endian::Big
        } else {
            Endian::Little
        };
        if self.values.is_empty() {
            return Err(Error::Config(format!("{}: no values given", self.category)));
        }
        if self.needles.iter().all(|n| n.is_empty()) {
            return Err(Error::Config(format!(
                "{}: at least one non-empty needle is required",
                self.category
            )));
        }

        let encode = |value: i64| {
            BytePattern::from_int(value, width, endian)
                .map_err(|e| Error::Config(format!("{}: {}", self.category, e)))
        };

        Ok(LimitSignature {
            category: self.category,
            patterns: self
                .values
                .iter()
                .map(|&v| encode(v))
                .collect::<Result<Vec<_>>>()?,
            replacement: encode(self.replacement)?,
            context: self
                .needles
                .iter()
                .filter(|n| !n.is_empty())
                .map(|n| ContextRule::new(n, self.window_radius))
                .collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    /// Directory for session logs, backups and reports
    pub artifact_dir: PathBuf,
    /// Wait after launch before the first session attempt
    pub launch_delay_secs: u64,
    /// Extra session attempts when the main module is not yet loaded
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
    /// Deadline for a single OS call against the target
    pub os_call_timeout_ms: u64,
    /// Owned bytes per module read
    pub chunk_size: usize,
    pub heuristics: HeuristicSettings,
    pub limits: Vec<LimitOverride>,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            launch_delay_secs: 10,
            retry_attempts: 2,
            retry_delay_secs: 5,
            os_call_timeout_ms: 2000,
            chunk_size: 4096,
            heuristics: HeuristicSettings::default(),
            limits: Vec::new(),
        }
    }
}

fn default_artifact_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(ARTIFACT_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(ARTIFACT_DIR_NAME))
}

impl FromStr for PatchConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: PatchConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

impl PatchConfig {
    pub fn builder() -> PatchConfigBuilder {
        PatchConfigBuilder::default()
    }

    /// Load and validate a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: PatchConfig = content.parse()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, otherwise the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                debug!("No configuration file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than zero".into()));
        }
        if self.os_call_timeout_ms == 0 {
            return Err(Error::Config(
                "os_call_timeout_ms must be greater than zero".into(),
            ));
        }
        for (i, limit) in self.limits.iter().enumerate() {
            if self.limits[..i].iter().any(|l| l.category == limit.category) {
                return Err(Error::Config(format!(
                    "limit '{}' is defined more than once",
                    limit.category
                )));
            }
            limit.to_signature()?;
        }
        Ok(())
    }

    /// Built-in signatures with any `[[limits]]` overrides applied
    pub fn signatures(&self) -> Result<Vec<LimitSignature>> {
        default_signatures()
            .into_iter()
            .map(|builtin| {
                match self.limits.iter().find(|l| l.category == builtin.category) {
                    Some(limit) => {
                        debug!("Using configured signature for {}", limit.category);
                        limit.to_signature()
                    }
                    None => Ok(builtin),
                }
            })
            .collect()
    }

    pub fn launch_delay(&self) -> Duration {
        Duration::from_secs(self.launch_delay_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn os_call_timeout(&self) -> Duration {
        Duration::from_millis(self.os_call_timeout_ms)
    }
}

/// Builder for PatchConfig
#[derive(Debug, Clone, Default)]
pub struct PatchConfigBuilder {
    artifact_dir: Option<PathBuf>,
    launch_delay: Option<Duration>,
    retry_attempts: Option<u32>,
    retry_delay: Option<Duration>,
    os_call_timeout: Option<Duration>,
    chunk_size: Option<usize>,
    heuristics: Option<HeuristicSettings>,
    limits: Vec<LimitOverride>,
}

impl PatchConfigBuilder {
    pub fn artifact_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.artifact_dir = Some(path.into());
        self
    }

    pub fn launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = Some(delay);
        self
    }

    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn os_call_timeout(mut self, timeout: Duration) -> Self {
        self.os_call_timeout = Some(timeout);
        self
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size);
        self
    }

    pub fn heuristics(mut self, heuristics: HeuristicSettings) -> Self {
        self.heuristics = Some(heuristics);
        self
    }

    pub fn limit(mut self, limit: LimitOverride) -> Self {
        self.limits.push(limit);
        self
    }

    pub fn build(self) -> PatchConfig {
        let default = PatchConfig::default();
        PatchConfig {
            artifact_dir: self.artifact_dir.unwrap_or(default.artifact_dir),
            launch_delay_secs: self
                .launch_delay
                .map_or(default.launch_delay_secs, |d| d.as_secs()),
            retry_attempts: self.retry_attempts.unwrap_or(default.retry_attempts),
            retry_delay_secs: self
                .retry_delay
                .map_or(default.retry_delay_secs, |d| d.as_secs()),
            os_call_timeout_ms: self
                .os_call_timeout
                .map_or(default.os_call_timeout_ms, |d| d.as_millis() as u64),
            chunk_size: self.chunk_size.unwrap_or(default.chunk_size),
            heuristics: self.heuristics.unwrap_or(default.heuristics),
            limits: self.limits,
        }
    }
}
