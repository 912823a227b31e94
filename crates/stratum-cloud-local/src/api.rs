//! Container operations the local providers need

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Desired container
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<(String, String)>,
    /// Port published on an ephemeral host port
    pub container_port: u16,
    pub cmd: Option<Vec<String>>,
    /// `CMD-SHELL` health check command
    pub healthcheck: Option<String>,
    pub labels: HashMap<String, String>,
}

/// Observed container
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContainerInfo {
    pub name: String,
    pub running: bool,
    /// None when the container has no health check
    pub healthy: Option<bool>,
    pub env: HashMap<String, String>,
    /// Host port bound to the spec's container port
    pub host_port: Option<u16>,
}

impl ContainerInfo {
    /// Running, and healthy if a health check is configured
    pub fn is_ready(&self) -> bool {
        self.running && self.healthy.unwrap_or(true)
    }
}

#[async_trait]
pub trait ContainerApi: Send + Sync {
    /// None when no container has this name
    async fn inspect(&self, name: &str, container_port: u16) -> Result<Option<ContainerInfo>>;

    /// Pull the image if needed, create the container and start it
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<()>;

    async fn start(&self, name: &str) -> Result<()>;

    /// Force-remove; an absent container is not an error
    async fn remove(&self, name: &str) -> Result<()>;
}
