//! Provider capability trait

use crate::error::Result;
use crate::model::{OutputData, Phase, ResourceRecord, ResourceRequest, ResourceStatus};
use crate::strategy::StrategyConfig;
use async_trait::async_trait;
use std::time::Duration;

/// A backend able to create and delete one kind of external resource.
///
/// Both operations are invoked repeatedly for the same request and must be
/// idempotent: `create` looks the resource up under its deterministic name
/// before creating anything, and `delete` succeeds when the resource is
/// already gone.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Returns the provider name (e.g., "aws-rds", "local-postgres")
    fn name(&self) -> &str;

    /// Whether this provider implements the named strategy
    fn supports_strategy(&self, strategy: &str) -> bool;

    /// How long to wait before the next reconciliation of a request
    fn reconcile_interval(&self, status: &ResourceStatus) -> Duration;

    /// Converge toward an existing, ready external resource
    async fn create(&self, ctx: &ProvisionContext<'_>) -> Result<CreateOutcome>;

    /// Converge toward the external resource being absent
    async fn delete(&self, ctx: &ProvisionContext<'_>) -> Result<DeleteOutcome>;
}

/// Everything a provider may consult during one call
#[derive(Debug, Clone, Copy)]
pub struct ProvisionContext<'a> {
    pub request: &'a ResourceRequest,
    pub status: &'a ResourceStatus,
    pub config: &'a StrategyConfig,
    /// Primary record, present for snapshot kinds
    pub primary: Option<&'a ResourceRecord>,
    /// Output this request last published, if it is still in place
    pub published: Option<&'a OutputData>,
}

impl<'a> ProvisionContext<'a> {
    pub fn new(
        request: &'a ResourceRequest,
        status: &'a ResourceStatus,
        config: &'a StrategyConfig,
    ) -> Self {
        Self {
            request,
            status,
            config,
            primary: None,
            published: None,
        }
    }

    pub fn with_primary(mut self, primary: &'a ResourceRecord) -> Self {
        self.primary = Some(primary);
        self
    }

    pub fn with_published(mut self, published: &'a OutputData) -> Self {
        self.published = Some(published);
        self
    }
}

/// An external resource confirmed ready
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProvisionedInstance {
    pub external_id: String,
    /// Connection data to publish
    pub output: OutputData,
}

impl ProvisionedInstance {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            output: OutputData::new(),
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.output.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// The external operation is still converging
    InProgress { message: String },
    Ready {
        instance: ProvisionedInstance,
        message: String,
    },
}

impl CreateOutcome {
    pub fn in_progress(message: impl Into<String>) -> Self {
        CreateOutcome::InProgress {
            message: message.into(),
        }
    }

    pub fn ready(instance: ProvisionedInstance, message: impl Into<String>) -> Self {
        CreateOutcome::Ready {
            instance,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    /// The external resource is confirmed absent
    Gone { message: String },
    /// Deletion was issued or is still running
    InProgress { message: String },
}

impl DeleteOutcome {
    pub fn gone(message: impl Into<String>) -> Self {
        DeleteOutcome::Gone {
            message: message.into(),
        }
    }

    pub fn in_progress(message: impl Into<String>) -> Self {
        DeleteOutcome::InProgress {
            message: message.into(),
        }
    }
}

/// Requeue intervals providers hand back to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileIntervals {
    /// Used while a request has not reached Complete
    pub in_progress: Duration,
    /// Drift and health recheck once Complete
    pub steady: Duration,
}

impl Default for ReconcileIntervals {
    fn default() -> Self {
        Self {
            in_progress: Duration::from_secs(60),
            steady: Duration::from_secs(300),
        }
    }
}

impl ReconcileIntervals {
    pub fn for_status(&self, status: &ResourceStatus) -> Duration {
        if status.phase == Phase::Complete {
            self.steady
        } else {
            self.in_progress
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_depends_on_phase() {
        let intervals = ReconcileIntervals::default();
        let mut status = ResourceStatus::default();
        assert_eq!(intervals.for_status(&status), Duration::from_secs(60));

        status.set_phase(Phase::Complete, "ready");
        assert_eq!(intervals.for_status(&status), Duration::from_secs(300));

        status.set_phase(Phase::DeleteInProgress, "deleting");
        assert_eq!(intervals.for_status(&status), Duration::from_secs(60));
    }
}
