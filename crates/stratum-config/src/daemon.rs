use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Contents of `stratum.yaml`
///
/// Every field has a default, so an empty file (or no file) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Directory holding `state.json` and published outputs
    pub state_dir: PathBuf,

    /// Strategy record; `<state_dir>/strategies.yaml` when unset
    pub strategy_config: Option<PathBuf>,

    /// Region used when a tier entry leaves it empty
    pub default_region: String,

    /// Prefix for infrastructure names
    pub name_prefix: String,

    /// Maximum concurrent reconciliations
    pub workers: usize,

    pub poll_interval_secs: u64,

    /// Host name local backends publish in connection output
    pub local_host: String,

    pub intervals: IntervalConfig,
}

/// Requeue intervals in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    /// Strategy config missing for the tier
    pub pending_secs: u64,
    /// Transient errors
    pub transient_secs: u64,
    /// External operation still running
    pub in_progress_secs: u64,
    /// Drift check once Complete
    pub steady_secs: u64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            pending_secs: 60,
            transient_secs: 30,
            in_progress_secs: 60,
            steady_secs: 300,
        }
    }
}

impl IntervalConfig {
    pub fn pending(&self) -> Duration {
        Duration::from_secs(self.pending_secs)
    }

    pub fn transient(&self) -> Duration {
        Duration::from_secs(self.transient_secs)
    }

    pub fn in_progress(&self) -> Duration {
        Duration::from_secs(self.in_progress_secs)
    }

    pub fn steady(&self) -> Duration {
        Duration::from_secs(self.steady_secs)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            strategy_config: None,
            default_region: "eu-west-1".to_string(),
            name_prefix: "stratum".to_string(),
            workers: 4,
            poll_interval_secs: 5,
            local_host: "localhost".to_string(),
            intervals: IntervalConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Parse and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DaemonConfig = if content.trim().is_empty() {
            DaemonConfig::default()
        } else {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        };
        config.validate()?;
        Ok(config)
    }

    /// The discovered config file, or defaults when there is none
    pub fn load_or_default() -> Result<(Self, Option<PathBuf>)> {
        match crate::find_config_file()? {
            Some(path) => Ok((Self::load(&path)?, Some(path))),
            None => Ok((Self::default(), None)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be at least 1".into(),
            ));
        }
        if self.name_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("name_prefix must not be empty".into()));
        }
        Ok(())
    }

    pub fn strategy_config_path(&self) -> PathBuf {
        self.strategy_config
            .clone()
            .unwrap_or_else(|| self.state_dir.join("strategies.yaml"))
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.state_dir.join("outputs")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("stratum"))
        .unwrap_or_else(|| PathBuf::from(".stratum"))
}
