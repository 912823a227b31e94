//! AWS providers for Stratum
//!
//! Implements [`stratum_cloud::ResourceProvider`] for the `aws` strategy:
//!
//! - `aws-rds`: Postgres on RDS, master password managed in Secrets Manager
//! - `aws-rds-snapshots`: manual RDS snapshots of a provisioned Postgres
//! - `aws-s3`: S3 buckets
//! - `aws-ses-smtp`: SES SMTP credentials backed by a per-request IAM user
//!
//! # Requirements
//!
//! Credentials are taken from the default AWS provider chain; the region
//! comes from the resolved strategy config.
//!
//! # Example
//!
//! ```ignore
//! use stratum_cloud_aws::{SdkClients, providers};
//! use std::sync::Arc;
//!
//! for (kind, provider) in providers(Arc::new(SdkClients::new()), "stratum", Default::default()) {
//!     registry.register(kind, provider);
//! }
//! ```

pub mod api;
pub mod blobstorage;
pub mod config;
pub mod credentials;
pub mod error;
pub mod postgres;
pub mod sdk;
pub mod snapshot;

#[cfg(test)]
mod testing;

pub use api::AwsClients;
pub use blobstorage::AwsBlobStorageProvider;
pub use config::{RdsStrategyConfig, SmtpStrategyConfig};
pub use credentials::AwsSmtpCredentialProvider;
pub use error::{AwsError, Result};
pub use postgres::AwsPostgresProvider;
pub use sdk::SdkClients;
pub use snapshot::AwsPostgresSnapshotProvider;

use std::sync::Arc;
use stratum_cloud::{ReconcileIntervals, ResourceKind, ResourceProvider};

/// Every AWS provider, keyed by the kind it serves
pub fn providers(
    clients: Arc<dyn AwsClients>,
    name_prefix: &str,
    intervals: ReconcileIntervals,
) -> Vec<(ResourceKind, Arc<dyn ResourceProvider>)> {
    let postgres: Arc<dyn ResourceProvider> = Arc::new(
        AwsPostgresProvider::new(clients.clone())
            .with_name_prefix(name_prefix)
            .with_intervals(intervals),
    );
    let snapshots: Arc<dyn ResourceProvider> = Arc::new(
        AwsPostgresSnapshotProvider::new(clients.clone())
            .with_name_prefix(name_prefix)
            .with_intervals(intervals),
    );
    let buckets: Arc<dyn ResourceProvider> = Arc::new(
        AwsBlobStorageProvider::new(clients.clone())
            .with_name_prefix(name_prefix)
            .with_intervals(intervals),
    );
    let smtp: Arc<dyn ResourceProvider> = Arc::new(
        AwsSmtpCredentialProvider::new(clients)
            .with_name_prefix(name_prefix)
            .with_intervals(intervals),
    );

    vec![
        (ResourceKind::Postgres, postgres),
        (ResourceKind::PostgresSnapshot, snapshots),
        (ResourceKind::BlobStorage, buckets),
        (ResourceKind::CredentialSet, smtp),
    ]
}
