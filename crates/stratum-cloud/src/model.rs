//! Resource requests and their engine-owned status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Connection data a provider hands back once a resource is ready
pub type OutputData = BTreeMap<String, String>;

/// Kind of external resource a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Managed Postgres database (primary resource)
    Postgres,
    /// Point-in-time snapshot of a Postgres primary
    PostgresSnapshot,
    /// Object store bucket
    #[serde(rename = "blobstorage")]
    BlobStorage,
    /// SMTP credentials for a mail relay
    #[serde(rename = "credentialset")]
    CredentialSet,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Postgres => "postgres",
            ResourceKind::PostgresSnapshot => "postgres_snapshot",
            ResourceKind::BlobStorage => "blobstorage",
            ResourceKind::CredentialSet => "credentialset",
        }
    }

    /// Kind whose strategy config entries this kind is resolved against.
    ///
    /// Snapshots live next to their primary, so they share its tiers.
    pub fn config_kind(&self) -> ResourceKind {
        match self {
            ResourceKind::PostgresSnapshot => ResourceKind::Postgres,
            other => *other,
        }
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self, ResourceKind::PostgresSnapshot)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle phase of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Pending,
    InProgress,
    Complete,
    Failed,
    DeleteInProgress,
    Deleted,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Pending => write!(f, "pending"),
            Phase::InProgress => write!(f, "in progress"),
            Phase::Complete => write!(f, "complete"),
            Phase::Failed => write!(f, "failed"),
            Phase::DeleteInProgress => write!(f, "delete in progress"),
            Phase::Deleted => write!(f, "deleted"),
        }
    }
}

/// Desired state for one resource instance, owned by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Unique request name
    pub name: String,

    pub kind: ResourceKind,

    /// Tier selecting a named strategy
    pub tier: String,

    /// Deletion intent, set once and never cleared
    #[serde(default)]
    pub deletion_requested: bool,

    /// Where connection output should be published
    #[serde(default)]
    pub output_ref: Option<String>,

    /// Name of the primary request (snapshot kinds only)
    #[serde(default)]
    pub primary_ref: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ResourceRequest {
    pub fn new(name: impl Into<String>, kind: ResourceKind, tier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            tier: tier.into(),
            deletion_requested: false,
            output_ref: None,
            primary_ref: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_output_ref(mut self, output_ref: impl Into<String>) -> Self {
        self.output_ref = Some(output_ref.into());
        self
    }

    pub fn with_primary(mut self, primary: impl Into<String>) -> Self {
        self.primary_ref = Some(primary.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Engine-owned observed state of a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub phase: Phase,

    /// Human-readable last observed condition
    #[serde(default)]
    pub message: String,

    /// Provider bound to this request
    #[serde(default)]
    pub provider: Option<String>,

    /// Strategy name resolved at binding time
    #[serde(default)]
    pub strategy: Option<String>,

    /// Region resolved at binding time
    #[serde(default)]
    pub region: Option<String>,

    /// Identifier of the external resource, set once
    #[serde(default)]
    pub external_id: Option<String>,

    /// Output reference currently holding valid published data
    #[serde(default)]
    pub output_ref: Option<String>,

    /// External cleanup is owed while this is set
    #[serde(default)]
    pub finalizer: bool,
}

impl ResourceStatus {
    pub fn set_phase(&mut self, phase: Phase, message: impl Into<String>) {
        self.phase = phase;
        self.message = message.into();
    }

    /// Records the external identifier unless one is already recorded.
    pub fn record_external_id(&mut self, id: impl Into<String>) {
        if self.external_id.is_none() {
            self.external_id = Some(id.into());
        }
    }
}

/// Persisted unit: request, status and the revision used for conditional writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub request: ResourceRequest,

    #[serde(default)]
    pub status: ResourceStatus,

    /// Bumped on every write
    #[serde(default)]
    pub version: u64,
}

impl ResourceRecord {
    pub fn new(request: ResourceRequest) -> Self {
        Self {
            request,
            status: ResourceStatus::default(),
            version: 1,
        }
    }

    pub fn name(&self) -> &str {
        &self.request.name
    }

    /// True once the caller may discard the record.
    pub fn is_removable(&self) -> bool {
        self.request.deletion_requested
            && self.status.phase == Phase::Deleted
            && !self.status.finalizer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&ResourceKind::BlobStorage).unwrap();
        assert_eq!(json, "\"blobstorage\"");
        let kind: ResourceKind = serde_json::from_str("\"postgres_snapshot\"").unwrap();
        assert_eq!(kind, ResourceKind::PostgresSnapshot);
        let kind: ResourceKind = serde_yaml::from_str("credentialset").unwrap();
        assert_eq!(kind, ResourceKind::CredentialSet);
        assert_eq!(kind.to_string(), "credentialset");
    }

    #[test]
    fn test_snapshot_resolves_against_primary_config() {
        assert_eq!(
            ResourceKind::PostgresSnapshot.config_kind(),
            ResourceKind::Postgres
        );
        assert_eq!(ResourceKind::BlobStorage.config_kind(), ResourceKind::BlobStorage);
    }

    #[test]
    fn test_external_id_is_set_once() {
        let mut status = ResourceStatus::default();
        status.record_external_id("first");
        status.record_external_id("second");
        assert_eq!(status.external_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_request_from_yaml_defaults() {
        let yaml = r#"
name: orders-db
kind: postgres
tier: production
output_ref: orders-db-credentials
"#;
        let request: ResourceRequest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(request.kind, ResourceKind::Postgres);
        assert!(!request.deletion_requested);
        assert_eq!(request.output_ref.as_deref(), Some("orders-db-credentials"));
        assert!(request.primary_ref.is_none());
    }

    #[test]
    fn test_removable_requires_deleted_without_finalizer() {
        let mut record = ResourceRecord::new(ResourceRequest::new(
            "bucket",
            ResourceKind::BlobStorage,
            "development",
        ));
        record.request.deletion_requested = true;
        record.status.set_phase(Phase::Deleted, "gone");
        record.status.finalizer = true;
        assert!(!record.is_removable());
        record.status.finalizer = false;
        assert!(record.is_removable());
    }
}
