//! Persisted request records
//!
//! Records live either in memory or in `<state_dir>/state.json`. Every write
//! bumps the record version; status writes are conditional on the version
//! the writer last read.

use crate::error::{CloudError, Result};
use crate::model::{ResourceRecord, ResourceRequest, ResourceStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;

const STATE_VERSION: u32 = 1;
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

const LOCK_ATTEMPTS: u32 = 20;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(50);
const LOCK_STALE_AFTER_SECS: i64 = 60;

/// Storage for request records.
///
/// `apply` and `request_deletion` are the caller's side (desired state);
/// `update_status` is the engine's side.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<ResourceRecord>>;

    async fn list(&self) -> Result<Vec<ResourceRecord>>;

    /// Create or update a request's desired state
    async fn apply(&self, request: ResourceRequest) -> Result<ResourceRecord>;

    /// Mark a request for deletion
    async fn request_deletion(&self, name: &str) -> Result<ResourceRecord>;

    /// Conditionally replace the status, returning the new version.
    ///
    /// Fails with `CloudError::Conflict` when the record changed since
    /// `expected_version` was read.
    async fn update_status(
        &self,
        name: &str,
        expected_version: u64,
        status: &ResourceStatus,
    ) -> Result<u64>;

    /// Discard a record; refused while its finalizer is set
    async fn remove(&self, name: &str) -> Result<()>;
}

/// All records, as persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Records indexed by request name
    pub resources: HashMap<String, ResourceRecord>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: HashMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ResourceRecord> {
        self.resources.get(name)
    }

    /// Records sorted by name
    pub fn records(&self) -> Vec<ResourceRecord> {
        let mut records: Vec<_> = self.resources.values().cloned().collect();
        records.sort_by(|a, b| a.request.name.cmp(&b.request.name));
        records
    }

    pub fn apply(&mut self, request: ResourceRequest) -> Result<ResourceRecord> {
        let record = match self.resources.remove(&request.name) {
            Some(mut existing) => {
                if existing.request.kind != request.kind {
                    let kind = existing.request.kind;
                    self.resources.insert(existing.request.name.clone(), existing);
                    return Err(CloudError::InvalidConfig(format!(
                        "{} is a {} request; kind cannot change to {}",
                        request.name, kind, request.kind
                    )));
                }
                let deletion_requested =
                    existing.request.deletion_requested || request.deletion_requested;
                let created_at = existing.request.created_at;
                existing.request = ResourceRequest {
                    deletion_requested,
                    created_at,
                    ..request
                };
                existing.version += 1;
                existing
            }
            None => ResourceRecord::new(request),
        };
        self.resources
            .insert(record.request.name.clone(), record.clone());
        self.updated_at = Utc::now();
        Ok(record)
    }

    pub fn request_deletion(&mut self, name: &str) -> Result<ResourceRecord> {
        let record = self
            .resources
            .get_mut(name)
            .ok_or_else(|| CloudError::ResourceNotFound(name.to_string()))?;
        if !record.request.deletion_requested {
            record.request.deletion_requested = true;
            record.version += 1;
            self.updated_at = Utc::now();
        }
        Ok(record.clone())
    }

    pub fn update_status(
        &mut self,
        name: &str,
        expected_version: u64,
        status: &ResourceStatus,
    ) -> Result<u64> {
        let record = self
            .resources
            .get_mut(name)
            .ok_or_else(|| CloudError::ResourceNotFound(name.to_string()))?;
        if record.version != expected_version {
            return Err(CloudError::Conflict {
                name: name.to_string(),
                expected: expected_version,
                actual: record.version,
            });
        }
        record.status = status.clone();
        record.version += 1;
        self.updated_at = Utc::now();
        Ok(record.version)
    }

    pub fn remove(&mut self, name: &str) -> Result<()> {
        match self.resources.get(name) {
            None => Ok(()),
            Some(record) if record.status.finalizer => Err(CloudError::StateError(format!(
                "{} still owes external cleanup (finalizer present)",
                name
            ))),
            Some(_) => {
                self.resources.remove(name);
                self.updated_at = Utc::now();
                Ok(())
            }
        }
    }
}

/// Records held in process memory
#[derive(Default)]
pub struct MemoryStatusStore {
    state: Mutex<GlobalState>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn get(&self, name: &str) -> Result<Option<ResourceRecord>> {
        Ok(self.state.lock().await.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<ResourceRecord>> {
        Ok(self.state.lock().await.records())
    }

    async fn apply(&self, request: ResourceRequest) -> Result<ResourceRecord> {
        self.state.lock().await.apply(request)
    }

    async fn request_deletion(&self, name: &str) -> Result<ResourceRecord> {
        self.state.lock().await.request_deletion(name)
    }

    async fn update_status(
        &self,
        name: &str,
        expected_version: u64,
        status: &ResourceStatus,
    ) -> Result<u64> {
        self.state
            .lock()
            .await
            .update_status(name, expected_version, status)
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.state.lock().await.remove(name)
    }
}

/// Records persisted as `state.json` under a state directory.
///
/// Each mutation runs load-modify-save under a lock file so that the daemon
/// and one-shot CLI invocations can share the directory.
pub struct FileStatusStore {
    state_dir: PathBuf,
    guard: Mutex<()>,
}

impl FileStatusStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
            guard: Mutex::new(()),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir.join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir).await?;
            tracing::debug!("Created state directory: {}", self.state_dir.display());
        }
        Ok(())
    }

    /// Load the current state
    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(GlobalState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: GlobalState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    async fn save(&self, state: &GlobalState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        if path.exists() {
            fs::copy(&path, self.backup_path()).await?;
        }

        let tmp = self.state_dir.join(format!("{}.tmp", STATE_FILE));
        let content = serde_json::to_string_pretty(state)?;
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        tracing::debug!("Saved state with {} records", state.resources.len());
        Ok(())
    }

    /// Run a mutation under the process guard and the lock file
    async fn mutate<T>(&self, f: impl FnOnce(&mut GlobalState) -> Result<T>) -> Result<T> {
        let _guard = self.guard.lock().await;
        let lock = self.acquire_lock().await?;

        let outcome = async {
            let mut state = self.load().await?;
            let value = f(&mut state)?;
            self.save(&state).await?;
            Ok(value)
        }
        .await;

        lock.release().await?;
        outcome
    }

    async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;
        let lock_path = self.lock_path();

        for _ in 0..LOCK_ATTEMPTS {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .await
            {
                Ok(_) => {
                    let info = LockInfo {
                        holder: holder_name(),
                        acquired_at: Utc::now(),
                    };
                    fs::write(&lock_path, serde_json::to_string_pretty(&info)?).await?;
                    return Ok(StateLock {
                        lock_path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.remove_stale_lock(&lock_path).await? {
                        continue;
                    }
                    tokio::time::sleep(LOCK_RETRY_DELAY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CloudError::Timeout(format!(
            "state lock {} is held by another process",
            lock_path.display()
        )))
    }

    async fn remove_stale_lock(&self, lock_path: &Path) -> Result<bool> {
        let Ok(content) = fs::read_to_string(lock_path).await else {
            return Ok(false);
        };
        let Ok(info) = serde_json::from_str::<LockInfo>(&content) else {
            return Ok(false);
        };
        let age = Utc::now().signed_duration_since(info.acquired_at);
        if age.num_seconds() < LOCK_STALE_AFTER_SECS {
            return Ok(false);
        }
        tracing::warn!("Removing stale lock from {}", info.holder);
        fs::remove_file(lock_path).await?;
        Ok(true)
    }
}

fn holder_name() -> String {
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{}:{}", host, std::process::id())
}

#[async_trait]
impl StatusStore for FileStatusStore {
    async fn get(&self, name: &str) -> Result<Option<ResourceRecord>> {
        Ok(self.load().await?.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<ResourceRecord>> {
        Ok(self.load().await?.records())
    }

    async fn apply(&self, request: ResourceRequest) -> Result<ResourceRecord> {
        self.mutate(|state| state.apply(request)).await
    }

    async fn request_deletion(&self, name: &str) -> Result<ResourceRecord> {
        self.mutate(|state| state.request_deletion(name)).await
    }

    async fn update_status(
        &self,
        name: &str,
        expected_version: u64,
        status: &ResourceStatus,
    ) -> Result<u64> {
        self.mutate(|state| state.update_status(name, expected_version, status))
            .await
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.mutate(|state| state.remove(name)).await
    }
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the state lock file
struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            // Synchronous cleanup in drop - not ideal but necessary
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
