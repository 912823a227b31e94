//! S3 blob storage provider

use crate::api::AwsClients;
use crate::postgres::AWS_STRATEGY;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use stratum_cloud::naming::{DEFAULT_IDENTIFIER_LENGTH, infra_name};
use stratum_cloud::{
    CreateOutcome, DeleteOutcome, ProvisionContext, ProvisionedInstance, ReconcileIntervals,
    ResourceProvider, ResourceStatus, Result,
};
use tracing::info;

pub const PROVIDER_NAME: &str = "aws-s3";

pub struct AwsBlobStorageProvider {
    clients: Arc<dyn AwsClients>,
    name_prefix: String,
    intervals: ReconcileIntervals,
}

impl AwsBlobStorageProvider {
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

    fn bucket_name(&self, ctx: &ProvisionContext<'_>) -> String {
        ctx.status.external_id.clone().unwrap_or_else(|| {
            infra_name(&self.name_prefix, &ctx.request.name, DEFAULT_IDENTIFIER_LENGTH)
        })
    }
}

#[async_trait]
impl ResourceProvider for AwsBlobStorageProvider {
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
        let bucket = self.bucket_name(ctx);
        let region = &ctx.config.region;
        let s3 = self.clients.s3(region).await?;

        if !s3.bucket_exists(&bucket).await? {
            info!(bucket = %bucket, region = %region, "Creating S3 bucket");
            s3.create_bucket(&bucket, region).await?;
        }

        let instance = ProvisionedInstance::new(&bucket)
            .with_output("bucket_name", bucket.as_str())
            .with_output("bucket_region", region.as_str());
        Ok(CreateOutcome::ready(instance, "bucket available"))
    }

    async fn delete(&self, ctx: &ProvisionContext<'_>) -> Result<DeleteOutcome> {
        let bucket = self.bucket_name(ctx);
        let s3 = self.clients.s3(&ctx.config.region).await?;

        if !s3.bucket_exists(&bucket).await? {
            return Ok(DeleteOutcome::gone("bucket deleted"));
        }

        // A bucket must be empty before it can be deleted
        let page = s3.list_objects(&bucket).await?;
        if !page.keys.is_empty() {
            info!(bucket = %bucket, objects = page.keys.len(), "Emptying S3 bucket");
            s3.delete_objects(&bucket, &page.keys).await?;
        }
        if page.truncated {
            return Ok(DeleteOutcome::in_progress("emptying bucket"));
        }

        info!(bucket = %bucket, "Deleting S3 bucket");
        s3.delete_bucket(&bucket).await?;
        Ok(DeleteOutcome::in_progress("bucket deletion started"))
    }
}
