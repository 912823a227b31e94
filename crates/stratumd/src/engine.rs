//! Wires stores, resolver and backends into a reconciler

use anyhow::Context;
use std::sync::Arc;
use stratum_cloud::{
    FileOutputSink, FileStatusStore, FileStrategySource, ReconcileIntervals, StatusStore,
    StrategyResolver,
};
use stratum_cloud_local::DockerApi;
use stratum_config::DaemonConfig;
use stratum_controller::{ProviderRegistry, Reconciler, ReconcilerSettings, WorkerConfig};
use tracing::{debug, warn};

pub struct Engine {
    pub store: Arc<dyn StatusStore>,
    pub reconciler: Arc<Reconciler>,
}

impl Engine {
    pub fn build(config: &DaemonConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.state_dir).with_context(|| {
            format!(
                "failed to create state directory {}",
                config.state_dir.display()
            )
        })?;

        let store: Arc<dyn StatusStore> = Arc::new(FileStatusStore::new(&config.state_dir));
        let outputs = Arc::new(FileOutputSink::new(config.outputs_dir()));
        let source = Arc::new(FileStrategySource::new(config.strategy_config_path()));
        let resolver =
            StrategyResolver::new(source).with_default_region(config.default_region.clone());

        let registry = build_registry(config);
        let settings = ReconcilerSettings {
            pending_requeue: config.intervals.pending(),
            transient_requeue: config.intervals.transient(),
            name_prefix: config.name_prefix.clone(),
        };

        let reconciler = Reconciler::new(store.clone(), outputs, resolver, registry)
            .with_settings(settings);

        Ok(Self {
            store,
            reconciler: Arc::new(reconciler),
        })
    }
}

pub fn worker_config(config: &DaemonConfig) -> WorkerConfig {
    WorkerConfig {
        concurrency: config.workers,
        poll_interval: config.poll_interval(),
        error_requeue: config.intervals.transient(),
    }
}

/// Cloud providers are registered ahead of local ones so they win when a
/// strategy name is served by both.
fn build_registry(config: &DaemonConfig) -> ProviderRegistry {
    let intervals = ReconcileIntervals {
        in_progress: config.intervals.in_progress(),
        steady: config.intervals.steady(),
    };
    let mut registry = ProviderRegistry::new();

    #[cfg(feature = "aws")]
    {
        let clients = Arc::new(stratum_cloud_aws::SdkClients::new());
        for (kind, provider) in stratum_cloud_aws::providers(clients, &config.name_prefix, intervals)
        {
            registry.register(kind, provider);
        }
        debug!("AWS providers registered");
    }

    match DockerApi::connect() {
        Ok(api) => {
            let providers = stratum_cloud_local::providers(
                Arc::new(api),
                &config.name_prefix,
                &config.local_host,
                intervals,
            );
            for (kind, provider) in providers {
                registry.register(kind, provider);
            }
            debug!("Local providers registered");
        }
        Err(e) => warn!(error = %e, "Local providers unavailable"),
    }

    registry
}
