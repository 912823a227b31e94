//! Docker-backed [`ContainerApi`]

// bollard 0.19 still accepts the deprecated option structs
#![allow(deprecated)]

use crate::api::{ContainerApi, ContainerInfo, ContainerSpec};
use crate::error::{LocalError, Result};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{Config, CreateContainerOptions, RemoveContainerOptions};
use bollard::image::CreateImageOptions;
use bollard::models::{HealthConfig, HealthStatusEnum, HostConfig, PortBinding};
use futures_util::StreamExt;
use std::collections::HashMap;
use tracing::{debug, info};

const HEALTHCHECK_INTERVAL_NS: i64 = 5_000_000_000;

pub struct DockerApi {
    docker: Docker,
}

impl DockerApi {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| LocalError::DockerConnectionFailed(e.to_string()))?;
        Ok(Self::new(docker))
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let (from_image, tag) = match image.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') => (name.to_string(), tag.to_string()),
            _ => (image.to_string(), "latest".to_string()),
        };
        info!(image = %image, "Pulling image");

        let options = CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            progress.map_err(|e| LocalError::ImagePullFailed {
                image: image.to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn container_config(spec: &ContainerSpec) -> Config<String> {
        let container_port = format!("{}/tcp", spec.container_port);
        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(container_port.clone(), HashMap::new());

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            container_port,
            Some(vec![PortBinding {
                host_ip: Some("127.0.0.1".to_string()),
                host_port: None,
            }]),
        );

        Config {
            image: Some(spec.image.clone()),
            env: Some(
                spec.env
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect(),
            ),
            cmd: spec.cmd.clone(),
            exposed_ports: Some(exposed_ports),
            labels: Some(spec.labels.clone()),
            healthcheck: spec.healthcheck.as_ref().map(|command| HealthConfig {
                test: Some(vec!["CMD-SHELL".to_string(), command.clone()]),
                interval: Some(HEALTHCHECK_INTERVAL_NS),
                retries: Some(12),
                ..Default::default()
            }),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ContainerApi for DockerApi {
    async fn inspect(&self, name: &str, container_port: u16) -> Result<Option<ContainerInfo>> {
        let inspect = match self
            .docker
            .inspect_container(name, None::<bollard::query_parameters::InspectContainerOptions>)
            .await
        {
            Ok(inspect) => inspect,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state = inspect.state.unwrap_or_default();
        let healthy = state
            .health
            .and_then(|h| h.status)
            .filter(|s| *s != HealthStatusEnum::NONE && *s != HealthStatusEnum::EMPTY)
            .map(|s| s == HealthStatusEnum::HEALTHY);

        let env = inspect
            .config
            .and_then(|c| c.env)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|kv| {
                kv.split_once('=')
                    .map(|(k, v)| (k.to_string(), v.to_string()))
            })
            .collect();

        let host_port = inspect
            .network_settings
            .and_then(|n| n.ports)
            .and_then(|ports| ports.get(&format!("{}/tcp", container_port)).cloned())
            .flatten()
            .and_then(|bindings| bindings.into_iter().find_map(|b| b.host_port))
            .and_then(|port| port.parse().ok());

        Ok(Some(ContainerInfo {
            name: name.to_string(),
            running: state.running.unwrap_or(false),
            healthy,
            env,
            host_port,
        }))
    }

    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<()> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let config = Self::container_config(spec);

        let response = match self
            .docker
            .create_container(Some(options.clone()), config.clone())
            .await
        {
            Ok(response) => response,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                // Image not present locally
                self.pull_image(&spec.image).await?;
                self.docker.create_container(Some(options), config).await?
            }
            Err(e) => return Err(e.into()),
        };
        debug!(container = %spec.name, id = %response.id, "Container created");

        self.start(&spec.name).await
    }

    async fn start(&self, name: &str) -> Result<()> {
        match self
            .docker
            .start_container(name, None::<bollard::query_parameters::StartContainerOptions>)
            .await
        {
            Ok(_) => Ok(()),
            // Already running
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(LocalError::ContainerNotFound {
                container: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        match self.docker.remove_container(name, Some(options)).await {
            Ok(_) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
