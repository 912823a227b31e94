//! Tiered strategy configuration
//!
//! The shared configuration record maps a resource kind to its tiers:
//!
//! ```yaml
//! postgres:
//!   production:
//!     strategy: aws
//!     region: eu-west-1
//!     config:
//!       db_instance_class: db.t3.medium
//!   development:
//!     strategy: local
//! blobstorage:
//!   production:
//!     strategy: aws
//! credentialset:
//!   production:
//!     strategy: aws
//!     region: us-east-1
//! ```

use crate::error::{CloudError, Result};
use crate::model::ResourceKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;

/// Region used when a tier entry leaves it empty
pub const DEFAULT_REGION: &str = "eu-west-1";

/// Resolved configuration for one (kind, tier) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Strategy name providers match on (e.g. "aws", "local")
    pub strategy: String,

    #[serde(default)]
    pub region: String,

    /// Opaque provider-specific configuration
    #[serde(default)]
    pub config: serde_json::Value,
}

impl StrategyConfig {
    pub fn new(strategy: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            region: region.into(),
            config: serde_json::Value::Null,
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Decode the provider blob, falling back to defaults when it is absent.
    pub fn provider_config<T>(&self) -> Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        if self.config.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.config.clone()).map_err(|e| {
            CloudError::InvalidConfig(format!(
                "invalid {} strategy config: {}",
                self.strategy, e
            ))
        })
    }
}

/// kind -> tier -> config
pub type StrategyMapping = HashMap<ResourceKind, HashMap<String, StrategyConfig>>;

/// Outcome of a resolution that reached the config record
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Ready(StrategyConfig),
    /// No entry for the tier yet; configuration may arrive later
    Pending,
}

/// Where the shared strategy record lives
#[async_trait]
pub trait StrategySource: Send + Sync {
    /// Load the whole record; a missing record is `ConfigUnavailable`
    async fn load(&self) -> Result<StrategyMapping>;
}

/// Strategy record stored as a YAML or JSON file
pub struct FileStrategySource {
    path: PathBuf,
}

impl FileStrategySource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StrategySource for FileStrategySource {
    async fn load(&self) -> Result<StrategyMapping> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CloudError::ConfigUnavailable(format!(
                    "strategy config {} does not exist",
                    self.path.display()
                )));
            }
            Err(e) => {
                return Err(CloudError::ConfigUnavailable(format!(
                    "failed to read strategy config {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let is_json = self
            .path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let mapping = if is_json {
            serde_json::from_str(&content).map_err(|e| {
                CloudError::InvalidConfig(format!("{}: {}", self.path.display(), e))
            })?
        } else {
            serde_yaml::from_str(&content).map_err(|e| {
                CloudError::InvalidConfig(format!("{}: {}", self.path.display(), e))
            })?
        };
        Ok(mapping)
    }
}

/// In-process strategy record, `None` until populated
#[derive(Default)]
pub struct MemoryStrategySource {
    mapping: RwLock<Option<StrategyMapping>>,
}

impl MemoryStrategySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(mapping: StrategyMapping) -> Self {
        Self {
            mapping: RwLock::new(Some(mapping)),
        }
    }

    /// Insert or replace a tier entry, creating the record if needed
    pub async fn set(&self, kind: ResourceKind, tier: impl Into<String>, config: StrategyConfig) {
        let mut guard = self.mapping.write().await;
        guard
            .get_or_insert_with(HashMap::new)
            .entry(kind)
            .or_default()
            .insert(tier.into(), config);
    }

    pub async fn remove_tier(&self, kind: ResourceKind, tier: &str) {
        let mut guard = self.mapping.write().await;
        if let Some(tiers) = guard.as_mut().and_then(|m| m.get_mut(&kind)) {
            tiers.remove(tier);
        }
    }

    pub async fn clear(&self) {
        *self.mapping.write().await = None;
    }
}

#[async_trait]
impl StrategySource for MemoryStrategySource {
    async fn load(&self) -> Result<StrategyMapping> {
        self.mapping
            .read()
            .await
            .clone()
            .ok_or_else(|| CloudError::ConfigUnavailable("strategy config not populated".into()))
    }
}

/// Resolves `(kind, tier)` to a strategy config
pub struct StrategyResolver {
    source: std::sync::Arc<dyn StrategySource>,
    default_region: String,
}

impl StrategyResolver {
    pub fn new(source: std::sync::Arc<dyn StrategySource>) -> Self {
        Self {
            source,
            default_region: DEFAULT_REGION.to_string(),
        }
    }

    pub fn with_default_region(mut self, region: impl Into<String>) -> Self {
        self.default_region = region.into();
        self
    }

    pub fn default_region(&self) -> &str {
        &self.default_region
    }

    /// Resolve the config for a request's kind and tier.
    ///
    /// Snapshot kinds are looked up under their primary's kind.
    pub async fn resolve(&self, kind: ResourceKind, tier: &str) -> Result<Resolution> {
        let mapping = self.source.load().await?;
        let config_kind = kind.config_kind();

        let Some(mut config) = mapping
            .get(&config_kind)
            .and_then(|tiers| tiers.get(tier))
            .cloned()
        else {
            tracing::debug!(kind = %config_kind, tier, "No strategy entry for tier");
            return Ok(Resolution::Pending);
        };

        if config.region.is_empty() {
            tracing::debug!(
                kind = %config_kind,
                tier,
                "Region not set in strategy config, using default region {}",
                self.default_region
            );
            config.region = self.default_region.clone();
        }

        Ok(Resolution::Ready(config))
    }
}
