//! Local container providers

use crate::api::ContainerApi;
use crate::template::{LocalService, LocalStrategyConfig};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use stratum_cloud::naming::{DEFAULT_IDENTIFIER_LENGTH, infra_name};
use stratum_cloud::{
    CreateOutcome, DeleteOutcome, ProvisionContext, ProvisionedInstance, ReconcileIntervals,
    ResourceProvider, ResourceStatus, Result,
};
use tracing::{debug, info};

pub const LOCAL_STRATEGY: &str = "local";

/// Runs one [`LocalService`] per request as a container named
/// `<prefix>-<request name>`.
pub struct LocalProvider {
    name: &'static str,
    service: LocalService,
    api: Arc<dyn ContainerApi>,
    name_prefix: String,
    host: String,
    intervals: ReconcileIntervals,
}

impl LocalProvider {
    pub fn postgres(api: Arc<dyn ContainerApi>) -> Self {
        Self::new("local-postgres", LocalService::Postgres, api)
    }

    pub fn blob_storage(api: Arc<dyn ContainerApi>) -> Self {
        Self::new("local-blobstorage", LocalService::Minio, api)
    }

    fn new(name: &'static str, service: LocalService, api: Arc<dyn ContainerApi>) -> Self {
        Self {
            name,
            service,
            api,
            name_prefix: "stratum".to_string(),
            host: "localhost".to_string(),
            // Containers converge in seconds
            intervals: ReconcileIntervals {
                in_progress: Duration::from_secs(10),
                steady: Duration::from_secs(300),
            },
        }
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Host name placed in connection output
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_intervals(mut self, intervals: ReconcileIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    fn container_name(&self, ctx: &ProvisionContext<'_>) -> String {
        ctx.status.external_id.clone().unwrap_or_else(|| {
            infra_name(&self.name_prefix, &ctx.request.name, DEFAULT_IDENTIFIER_LENGTH)
        })
    }
}

#[async_trait]
impl ResourceProvider for LocalProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn supports_strategy(&self, strategy: &str) -> bool {
        strategy == LOCAL_STRATEGY
    }

    fn reconcile_interval(&self, status: &ResourceStatus) -> Duration {
        self.intervals.for_status(status)
    }

    async fn create(&self, ctx: &ProvisionContext<'_>) -> Result<CreateOutcome> {
        let local_config: LocalStrategyConfig = ctx.config.provider_config()?;
        let container = self.container_name(ctx);
        let port = self.service.container_port();

        let Some(info) = self.api.inspect(&container, port).await? else {
            let spec = self
                .service
                .spec(&container, &ctx.request.name, local_config.image.as_deref());
            info!(container = %container, image = %spec.image, "Creating container");
            self.api.create_and_start(&spec).await?;
            return Ok(CreateOutcome::in_progress("container created"));
        };

        if !info.running {
            info!(container = %container, "Starting stopped container");
            self.api.start(&container).await?;
            return Ok(CreateOutcome::in_progress("container starting"));
        }
        if !info.is_ready() {
            debug!(container = %container, "Container not healthy yet");
            return Ok(CreateOutcome::in_progress("waiting for container health"));
        }

        let output = self.service.output(&self.host, &info)?;
        let instance = ProvisionedInstance {
            external_id: container,
            output,
        };
        Ok(CreateOutcome::ready(instance, "container ready"))
    }

    async fn delete(&self, ctx: &ProvisionContext<'_>) -> Result<DeleteOutcome> {
        let container = self.container_name(ctx);

        if self
            .api
            .inspect(&container, self.service.container_port())
            .await?
            .is_none()
        {
            return Ok(DeleteOutcome::gone("container removed"));
        }

        info!(container = %container, "Removing container");
        self.api.remove(&container).await?;
        Ok(DeleteOutcome::in_progress("container removal started"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ContainerInfo, ContainerSpec};
    use crate::error::{LocalError, Result as LocalResult};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use stratum_cloud::{ResourceKind, ResourceRequest, StrategyConfig};

    #[derive(Default)]
    struct FakeContainers {
        containers: Mutex<HashMap<String, ContainerInfo>>,
        creates: Mutex<Vec<ContainerSpec>>,
        down: Mutex<bool>,
    }

    impl FakeContainers {
        fn set_health(&self, name: &str, healthy: bool) {
            if let Some(info) = self.containers.lock().unwrap().get_mut(name) {
                info.healthy = Some(healthy);
            }
        }

        fn stop(&self, name: &str) {
            if let Some(info) = self.containers.lock().unwrap().get_mut(name) {
                info.running = false;
            }
        }

        fn creates(&self) -> usize {
            self.creates.lock().unwrap().len()
        }

        fn check_daemon(&self) -> LocalResult<()> {
            if *self.down.lock().unwrap() {
                return Err(LocalError::DockerConnectionFailed("Connection refused".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ContainerApi for FakeContainers {
        async fn inspect(&self, name: &str, _port: u16) -> LocalResult<Option<ContainerInfo>> {
            self.check_daemon()?;
            Ok(self
                .containers
                .lock()
                .unwrap()
                .get(name)
                .cloned())
        }

        async fn create_and_start(&self, spec: &ContainerSpec) -> LocalResult<()> {
            self.check_daemon()?;
            self.creates.lock().unwrap().push(spec.clone());
            let info = ContainerInfo {
                name: spec.name.clone(),
                running: true,
                healthy: spec.healthcheck.as_ref().map(|_| false),
                env: spec.env.iter().cloned().collect(),
                host_port: Some(55432),
            };
            self.containers
                .lock()
                .unwrap()
                .insert(spec.name.clone(), info);
            Ok(())
        }

        async fn start(&self, name: &str) -> LocalResult<()> {
            match self.containers.lock().unwrap().get_mut(name) {
                Some(info) => {
                    info.running = true;
                    Ok(())
                }
                None => Err(LocalError::ContainerNotFound {
                    container: name.to_string(),
                }),
            }
        }

        async fn remove(&self, name: &str) -> LocalResult<()> {
            self.containers.lock().unwrap().remove(name);
            Ok(())
        }
    }

    fn request() -> ResourceRequest {
        ResourceRequest::new("orders", ResourceKind::Postgres, "development")
    }

    #[tokio::test]
    async fn test_postgres_container_lifecycle() {
        let api = Arc::new(FakeContainers::default());
        let provider = LocalProvider::postgres(api.clone());
        let request = request();
        let status = ResourceStatus::default();
        let config = StrategyConfig::new("local", "");
        let ctx = ProvisionContext::new(&request, &status, &config);

        assert_eq!(
            provider.create(&ctx).await.unwrap(),
            CreateOutcome::in_progress("container created")
        );
        assert_eq!(
            provider.create(&ctx).await.unwrap(),
            CreateOutcome::in_progress("waiting for container health")
        );

        api.set_health("stratum-orders", true);
        let CreateOutcome::Ready { instance, message } = provider.create(&ctx).await.unwrap()
        else {
            panic!("expected ready outcome");
        };
        assert_eq!(message, "container ready");
        assert_eq!(instance.external_id, "stratum-orders");
        assert_eq!(instance.output["port"], "55432");

        // Credentials come from the container, so repeated reads agree
        let created = api.creates.lock().unwrap()[0].clone();
        let password = created
            .env
            .iter()
            .find(|(k, _)| k == "POSTGRES_PASSWORD")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert_eq!(instance.output["password"], password);
        assert_eq!(api.creates(), 1);
    }

    #[tokio::test]
    async fn test_stopped_container_is_restarted() {
        let api = Arc::new(FakeContainers::default());
        let provider = LocalProvider::blob_storage(api.clone());
        let request = ResourceRequest::new("assets", ResourceKind::BlobStorage, "development");
        let status = ResourceStatus::default();
        let config = StrategyConfig::new("local", "");
        let ctx = ProvisionContext::new(&request, &status, &config);

        provider.create(&ctx).await.unwrap();
        api.stop("stratum-assets");

        assert_eq!(
            provider.create(&ctx).await.unwrap(),
            CreateOutcome::in_progress("container starting")
        );
        assert!(matches!(
            provider.create(&ctx).await.unwrap(),
            CreateOutcome::Ready { .. }
        ));
        assert_eq!(api.creates(), 1);
    }

    #[tokio::test]
    async fn test_image_override_from_strategy_config() {
        let api = Arc::new(FakeContainers::default());
        let provider = LocalProvider::postgres(api.clone()).with_name_prefix("dev");
        let request = request();
        let status = ResourceStatus::default();
        let config = StrategyConfig::new("local", "")
            .with_config(serde_json::json!({ "image": "postgres:15" }));

        provider
            .create(&ProvisionContext::new(&request, &status, &config))
            .await
            .unwrap();

        let created = api.creates.lock().unwrap()[0].clone();
        assert_eq!(created.name, "dev-orders");
        assert_eq!(created.image, "postgres:15");
    }

    #[tokio::test]
    async fn test_delete_removes_then_reports_gone() {
        let api = Arc::new(FakeContainers::default());
        let provider = LocalProvider::postgres(api.clone());
        let request = request();
        let status = ResourceStatus::default();
        let config = StrategyConfig::new("local", "");
        let ctx = ProvisionContext::new(&request, &status, &config);

        assert_eq!(
            provider.delete(&ctx).await.unwrap(),
            DeleteOutcome::gone("container removed")
        );

        provider.create(&ctx).await.unwrap();
        assert_eq!(
            provider.delete(&ctx).await.unwrap(),
            DeleteOutcome::in_progress("container removal started")
        );
        assert_eq!(
            provider.delete(&ctx).await.unwrap(),
            DeleteOutcome::gone("container removed")
        );
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_transient() {
        let api = Arc::new(FakeContainers::default());
        *api.down.lock().unwrap() = true;
        let provider = LocalProvider::postgres(api.clone());
        let request = request();
        let status = ResourceStatus::default();
        let config = StrategyConfig::new("local", "");

        let err = provider
            .create(&ProvisionContext::new(&request, &status, &config))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
