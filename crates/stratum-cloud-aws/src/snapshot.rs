//! RDS Postgres snapshot provider
//!
//! The snapshot name is generated and persisted by the engine before this
//! provider is first called; the provider only maps the observed snapshot
//! state onto create/delete outcomes.

use crate::api::{AwsClients, STATUS_AVAILABLE, STATUS_DELETING};
use crate::error::AwsError;
use crate::postgres::{AWS_STRATEGY, instance_identifier};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use stratum_cloud::{
    CreateOutcome, DeleteOutcome, ProvisionContext, ProvisionedInstance, ReconcileIntervals,
    ResourceProvider, ResourceStatus, Result,
};
use tracing::info;

pub const PROVIDER_NAME: &str = "aws-rds-snapshots";

pub struct AwsPostgresSnapshotProvider {
    clients: Arc<dyn AwsClients>,
    name_prefix: String,
    intervals: ReconcileIntervals,
}

impl AwsPostgresSnapshotProvider {
    pub fn new(clients: Arc<dyn AwsClients>) -> Self {
        Self {
            clients,
            name_prefix: "stratum".to_string(),
            intervals: ReconcileIntervals::default(),
        }
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn with_intervals(mut self, intervals: ReconcileIntervals) -> Self {
        self.intervals = intervals;
        self
    }
}

#[async_trait]
impl ResourceProvider for AwsPostgresSnapshotProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports_strategy(&self, strategy: &str) -> bool {
        strategy == AWS_STRATEGY
    }

    fn reconcile_interval(&self, status: &ResourceStatus) -> Duration {
        self.intervals.for_status(status)
    }

    async fn create(&self, ctx: &ProvisionContext<'_>) -> Result<CreateOutcome> {
        let snapshot_name = ctx
            .status
            .external_id
            .clone()
            .ok_or_else(|| AwsError::MissingSnapshotName(ctx.request.name.clone()))?;
        let rds = self.clients.rds(&ctx.config.region).await?;

        // An existing snapshot no longer depends on its primary
        let Some(snapshot) = rds.describe_snapshot(&snapshot_name).await? else {
            let primary = ctx
                .primary
                .ok_or_else(|| AwsError::MissingPrimary(ctx.request.name.clone()))?;
            let instance =
                instance_identifier(&self.name_prefix, &primary.request, &primary.status);
            info!(snapshot = %snapshot_name, instance = %instance, "Creating RDS snapshot");
            rds.create_snapshot(&instance, &snapshot_name).await?;
            return Ok(CreateOutcome::in_progress("snapshot started"));
        };

        if snapshot.status == STATUS_AVAILABLE {
            let instance = ProvisionedInstance::new(&snapshot.identifier)
                .with_output("snapshot_id", snapshot.identifier.as_str());
            return Ok(CreateOutcome::ready(instance, "snapshot created"));
        }

        let message = format!("current snapshot status : {}", snapshot.status);
        info!(snapshot = %snapshot_name, "{}", message);
        Ok(CreateOutcome::in_progress(message))
    }

    async fn delete(&self, ctx: &ProvisionContext<'_>) -> Result<DeleteOutcome> {
        // Never named means never created
        let Some(snapshot_name) = ctx.status.external_id.as_deref() else {
            return Ok(DeleteOutcome::gone("snapshot deleted"));
        };
        let rds = self.clients.rds(&ctx.config.region).await?;

        let Some(snapshot) = rds.describe_snapshot(snapshot_name).await? else {
            return Ok(DeleteOutcome::gone("snapshot deleted"));
        };
        if snapshot.status == STATUS_DELETING {
            return Ok(DeleteOutcome::in_progress("snapshot deletion in progress"));
        }

        info!(snapshot = %snapshot_name, "Deleting RDS snapshot");
        rds.delete_snapshot(snapshot_name).await?;
        Ok(DeleteOutcome::in_progress("snapshot deletion started"))
    }
}
