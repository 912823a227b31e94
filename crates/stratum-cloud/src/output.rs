//! Output sinks for connection data

use crate::error::{CloudError, Result};
use crate::model::OutputData;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;

/// Secret-like store keyed by a request's output reference
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Replace the data held under `output_ref`
    async fn publish(&self, output_ref: &str, data: &OutputData) -> Result<()>;

    /// Remove the data held under `output_ref`; absent data is not an error
    async fn clear(&self, output_ref: &str) -> Result<()>;

    async fn read(&self, output_ref: &str) -> Result<Option<OutputData>>;
}

#[derive(Default)]
pub struct MemoryOutputSink {
    outputs: RwLock<HashMap<String, OutputData>>,
}

impl MemoryOutputSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutputSink for MemoryOutputSink {
    async fn publish(&self, output_ref: &str, data: &OutputData) -> Result<()> {
        self.outputs
            .write()
            .await
            .insert(output_ref.to_string(), data.clone());
        Ok(())
    }

    async fn clear(&self, output_ref: &str) -> Result<()> {
        self.outputs.write().await.remove(output_ref);
        Ok(())
    }

    async fn read(&self, output_ref: &str) -> Result<Option<OutputData>> {
        Ok(self.outputs.read().await.get(output_ref).cloned())
    }
}

/// One JSON file per output reference under a directory
pub struct FileOutputSink {
    dir: PathBuf,
}

impl FileOutputSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, output_ref: &str) -> Result<PathBuf> {
        let valid = !output_ref.is_empty()
            && output_ref
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !output_ref.starts_with('.');
        if !valid {
            return Err(CloudError::InvalidConfig(format!(
                "invalid output reference: {:?}",
                output_ref
            )));
        }
        Ok(self.dir.join(format!("{}.json", output_ref)))
    }
}

#[async_trait]
impl OutputSink for FileOutputSink {
    async fn publish(&self, output_ref: &str, data: &OutputData) -> Result<()> {
        let path = self.path_for(output_ref)?;
        fs::create_dir_all(&self.dir).await?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(data)?).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }
        fs::rename(&tmp, &path).await?;

        tracing::debug!(output_ref, keys = data.len(), "Published output");
        Ok(())
    }

    async fn clear(&self, output_ref: &str) -> Result<()> {
        let path = self.path_for(output_ref)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(output_ref, "Cleared output");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, output_ref: &str) -> Result<Option<OutputData>> {
        let path = self.path_for(output_ref)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
