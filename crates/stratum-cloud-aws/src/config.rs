//! Provider-specific strategy config blobs

use serde::{Deserialize, Serialize};

/// `config` section of an `aws` Postgres tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RdsStrategyConfig {
    pub db_instance_class: String,
    /// GiB
    pub allocated_storage: i32,
    /// Engine default when unset
    pub engine_version: Option<String>,
    pub multi_az: bool,
    pub database: String,
    pub username: String,
}

impl Default for RdsStrategyConfig {
    fn default() -> Self {
        Self {
            db_instance_class: "db.t3.small".to_string(),
            allocated_storage: 20,
            engine_version: None,
            multi_az: false,
            database: "postgres".to_string(),
            username: "postgres".to_string(),
        }
    }
}

/// `config` section of an `aws` credentialset tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpStrategyConfig {
    /// Overrides the regional SES endpoint
    pub host: Option<String>,
    pub port: u16,
}

impl Default for SmtpStrategyConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
        }
    }
}

/// SES SMTP endpoint serving `region`
pub fn ses_smtp_endpoint(region: &str) -> Option<&'static str> {
    match region {
        "us-east-1" => Some("email-smtp.us-east-1.amazonaws.com"),
        "us-west-2" => Some("email-smtp.us-west-2.amazonaws.com"),
        "eu-west-1" => Some("email-smtp.eu-west-1.amazonaws.com"),
        _ => None,
    }
}
