//! Container templates for the local services

use crate::api::{ContainerInfo, ContainerSpec};
use crate::error::{LocalError, Result};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use stratum_cloud::OutputData;

pub const POSTGRES_IMAGE: &str = "postgres:16-alpine";
pub const MINIO_IMAGE: &str = "bitnami/minio:latest";

const POSTGRES_PORT: u16 = 5432;
const MINIO_PORT: u16 = 9000;
const PASSWORD_LENGTH: usize = 24;

/// `config` section of a `local` tier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalStrategyConfig {
    /// Image override
    pub image: Option<String>,
}

/// Services the local backend can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalService {
    Postgres,
    Minio,
}

impl LocalService {
    pub fn default_image(&self) -> &'static str {
        match self {
            LocalService::Postgres => POSTGRES_IMAGE,
            LocalService::Minio => MINIO_IMAGE,
        }
    }

    pub fn container_port(&self) -> u16 {
        match self {
            LocalService::Postgres => POSTGRES_PORT,
            LocalService::Minio => MINIO_PORT,
        }
    }

    /// Container for `request_name`, with freshly generated credentials
    pub fn spec(&self, container: &str, request_name: &str, image: Option<&str>) -> ContainerSpec {
        let mut labels = HashMap::new();
        labels.insert("stratum.request".to_string(), request_name.to_string());
        labels.insert("stratum.service".to_string(), self.label().to_string());

        let image = image.unwrap_or(self.default_image()).to_string();
        let password = generate_password();

        match self {
            LocalService::Postgres => ContainerSpec {
                name: container.to_string(),
                image,
                env: vec![
                    env("POSTGRES_USER", "postgres"),
                    env("POSTGRES_PASSWORD", &password),
                    env("POSTGRES_DB", &database_name(request_name)),
                ],
                container_port: POSTGRES_PORT,
                cmd: None,
                healthcheck: Some("pg_isready -U postgres".to_string()),
                labels,
            },
            LocalService::Minio => ContainerSpec {
                name: container.to_string(),
                image,
                env: vec![
                    env("MINIO_ROOT_USER", "stratum"),
                    env("MINIO_ROOT_PASSWORD", &password),
                    env("MINIO_DEFAULT_BUCKETS", container),
                ],
                container_port: MINIO_PORT,
                cmd: None,
                healthcheck: None,
                labels,
            },
        }
    }

    /// Connection output, read back from the running container
    pub fn output(&self, host: &str, info: &ContainerInfo) -> Result<OutputData> {
        let port = info
            .host_port
            .ok_or_else(|| LocalError::DockerApiError(format!("{} has no published port", info.name)))?;

        let mut output = OutputData::new();
        match self {
            LocalService::Postgres => {
                output.insert("host".to_string(), host.to_string());
                output.insert("port".to_string(), port.to_string());
                output.insert("database".to_string(), read_env(info, "POSTGRES_DB")?);
                output.insert("username".to_string(), read_env(info, "POSTGRES_USER")?);
                output.insert("password".to_string(), read_env(info, "POSTGRES_PASSWORD")?);
            }
            LocalService::Minio => {
                output.insert("endpoint".to_string(), format!("http://{}:{}", host, port));
                output.insert("bucket_name".to_string(), read_env(info, "MINIO_DEFAULT_BUCKETS")?);
                output.insert("access_key_id".to_string(), read_env(info, "MINIO_ROOT_USER")?);
                output.insert(
                    "secret_access_key".to_string(),
                    read_env(info, "MINIO_ROOT_PASSWORD")?,
                );
            }
        }
        Ok(output)
    }

    fn label(&self) -> &'static str {
        match self {
            LocalService::Postgres => "postgres",
            LocalService::Minio => "minio",
        }
    }
}

fn env(key: &str, value: &str) -> (String, String) {
    (key.to_string(), value.to_string())
}

fn read_env(info: &ContainerInfo, variable: &str) -> Result<String> {
    info.env
        .get(variable)
        .cloned()
        .ok_or_else(|| LocalError::MissingCredential {
            container: info.name.clone(),
            variable: variable.to_string(),
        })
}

/// Postgres identifiers cannot contain dashes without quoting
fn database_name(request_name: &str) -> String {
    request_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}
