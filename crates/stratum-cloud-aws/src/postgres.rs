//! RDS Postgres provider

use crate::api::{AwsClients, CreateDbInstance, STATUS_AVAILABLE, STATUS_DELETING};
use crate::config::RdsStrategyConfig;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use stratum_cloud::naming::{DEFAULT_IDENTIFIER_LENGTH, infra_name};
use stratum_cloud::{
    CreateOutcome, DeleteOutcome, ProvisionContext, ProvisionedInstance, ReconcileIntervals,
    ResourceProvider, ResourceRequest, ResourceStatus, Result,
};
use tracing::{debug, info};

pub const PROVIDER_NAME: &str = "aws-rds";
pub const AWS_STRATEGY: &str = "aws";

/// Identifier of the RDS instance backing a Postgres request
pub fn instance_identifier(prefix: &str, request: &ResourceRequest, status: &ResourceStatus) -> String {
    status
        .external_id
        .clone()
        .unwrap_or_else(|| infra_name(prefix, &request.name, DEFAULT_IDENTIFIER_LENGTH))
}

pub struct AwsPostgresProvider {
    clients: Arc<dyn AwsClients>,
    name_prefix: String,
    intervals: ReconcileIntervals,
}

impl AwsPostgresProvider {
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
impl ResourceProvider for AwsPostgresProvider {
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
        let rds_config: RdsStrategyConfig = ctx.config.provider_config()?;
        let identifier = instance_identifier(&self.name_prefix, ctx.request, ctx.status);
        let rds = self.clients.rds(&ctx.config.region).await?;

        let Some(instance) = rds.describe_instance(&identifier).await? else {
            info!(
                instance = %identifier,
                class = %rds_config.db_instance_class,
                region = %ctx.config.region,
                "Creating RDS instance"
            );
            rds.create_instance(&CreateDbInstance {
                identifier: identifier.clone(),
                instance_class: rds_config.db_instance_class,
                engine_version: rds_config.engine_version,
                allocated_storage: rds_config.allocated_storage,
                database: rds_config.database,
                username: rds_config.username,
                multi_az: rds_config.multi_az,
            })
            .await?;
            return Ok(CreateOutcome::in_progress("rds instance creation started"));
        };

        debug!(instance = %identifier, status = %instance.status, "Found RDS instance");
        if instance.status != STATUS_AVAILABLE {
            return Ok(CreateOutcome::in_progress(format!(
                "rds instance status : {}",
                instance.status
            )));
        }

        let (Some(address), Some(port)) = (instance.address.as_ref(), instance.port) else {
            return Ok(CreateOutcome::in_progress("waiting for rds endpoint"));
        };

        let mut provisioned = ProvisionedInstance::new(&identifier)
            .with_output("host", address.as_str())
            .with_output("port", port.to_string())
            .with_output(
                "database",
                instance.database.clone().unwrap_or_else(|| rds_config.database.clone()),
            )
            .with_output(
                "username",
                instance.username.clone().unwrap_or_else(|| rds_config.username.clone()),
            );
        if let Some(arn) = instance.secret_arn.as_ref() {
            provisioned = provisioned.with_output("credentials_secret_arn", arn.as_str());
        }

        Ok(CreateOutcome::ready(provisioned, "rds instance available"))
    }

    async fn delete(&self, ctx: &ProvisionContext<'_>) -> Result<DeleteOutcome> {
        let identifier = instance_identifier(&self.name_prefix, ctx.request, ctx.status);
        let rds = self.clients.rds(&ctx.config.region).await?;

        let Some(instance) = rds.describe_instance(&identifier).await? else {
            return Ok(DeleteOutcome::gone("rds instance deleted"));
        };

        if instance.status == STATUS_DELETING {
            return Ok(DeleteOutcome::in_progress("rds instance deletion in progress"));
        }

        info!(instance = %identifier, "Deleting RDS instance");
        rds.delete_instance(&identifier).await?;
        Ok(DeleteOutcome::in_progress("rds instance deletion started"))
    }
}
