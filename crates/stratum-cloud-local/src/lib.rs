//! Local providers for Stratum
//!
//! Serves the `local` strategy with Docker containers so development tiers
//! get real endpoints without a cloud account:
//!
//! - `local-postgres`: a `postgres` container
//! - `local-blobstorage`: a MinIO container with one bucket
//!
//! Credentials are generated when the container is created and read back
//! from its environment on every reconcile.
//!
//! Credential sets have no local backend; a `credentialset` request on a
//! `local` tier fails as an unsupported strategy.

pub mod api;
pub mod docker;
pub mod error;
pub mod provider;
pub mod template;

pub use api::{ContainerApi, ContainerInfo, ContainerSpec};
pub use docker::DockerApi;
pub use error::{LocalError, Result};
pub use provider::{LOCAL_STRATEGY, LocalProvider};
pub use template::{LocalService, LocalStrategyConfig};

use std::sync::Arc;
use stratum_cloud::{ReconcileIntervals, ResourceKind, ResourceProvider};

/// Every local provider, keyed by the kind it serves
pub fn providers(
    api: Arc<dyn ContainerApi>,
    name_prefix: &str,
    host: &str,
    intervals: ReconcileIntervals,
) -> Vec<(ResourceKind, Arc<dyn ResourceProvider>)> {
    let postgres: Arc<dyn ResourceProvider> = Arc::new(
        LocalProvider::postgres(api.clone())
            .with_name_prefix(name_prefix)
            .with_host(host)
            .with_intervals(intervals),
    );
    let buckets: Arc<dyn ResourceProvider> = Arc::new(
        LocalProvider::blob_storage(api)
            .with_name_prefix(name_prefix)
            .with_host(host)
            .with_intervals(intervals),
    );

    vec![
        (ResourceKind::Postgres, postgres),
        (ResourceKind::BlobStorage, buckets),
    ]
}
