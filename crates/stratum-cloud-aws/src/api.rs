//! Narrow views of the RDS, S3 and IAM APIs the providers use
//!
//! Providers talk to these traits rather than the SDK clients so that the
//! create/delete logic can be exercised against in-memory fakes.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// RDS instance status meaning the instance accepts connections
pub const STATUS_AVAILABLE: &str = "available";

/// RDS status while an instance or snapshot is being removed
pub const STATUS_DELETING: &str = "deleting";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DbInstance {
    pub identifier: String,
    pub status: String,
    pub address: Option<String>,
    pub port: Option<i32>,
    pub database: Option<String>,
    pub username: Option<String>,
    /// Secrets Manager ARN holding the managed master password
    pub secret_arn: Option<String>,
}

/// Parameters for a new Postgres instance
#[derive(Debug, Clone, PartialEq)]
pub struct CreateDbInstance {
    pub identifier: String,
    pub instance_class: String,
    pub engine_version: Option<String>,
    pub allocated_storage: i32,
    pub database: String,
    pub username: String,
    pub multi_az: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DbSnapshot {
    pub identifier: String,
    pub status: String,
}

/// One page of object keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    /// More keys remain after this page
    pub truncated: bool,
}

/// A freshly created IAM access key; the secret is only ever returned here
#[derive(Debug, Clone, PartialEq)]
pub struct AccessKey {
    pub id: String,
    pub secret: String,
}

#[async_trait]
pub trait RdsApi: Send + Sync {
    /// None when no instance has this identifier
    async fn describe_instance(&self, identifier: &str) -> Result<Option<DbInstance>>;

    async fn create_instance(&self, input: &CreateDbInstance) -> Result<()>;

    /// Issue deletion; an absent instance is not an error
    async fn delete_instance(&self, identifier: &str) -> Result<()>;

    async fn describe_snapshot(&self, identifier: &str) -> Result<Option<DbSnapshot>>;

    async fn create_snapshot(&self, instance: &str, snapshot: &str) -> Result<()>;

    /// Issue deletion; an absent snapshot is not an error
    async fn delete_snapshot(&self, identifier: &str) -> Result<()>;
}

#[async_trait]
pub trait S3Api: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<()>;

    async fn list_objects(&self, bucket: &str) -> Result<ObjectPage>;

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()>;

    async fn delete_bucket(&self, bucket: &str) -> Result<()>;
}

#[async_trait]
pub trait IamApi: Send + Sync {
    async fn user_exists(&self, user: &str) -> Result<bool>;

    async fn create_user(&self, user: &str) -> Result<()>;

    /// Create or replace an inline policy
    async fn put_user_policy(&self, user: &str, policy: &str, document: &str) -> Result<()>;

    /// An absent policy is not an error
    async fn delete_user_policy(&self, user: &str, policy: &str) -> Result<()>;

    /// Access key ids of the user
    async fn list_access_keys(&self, user: &str) -> Result<Vec<String>>;

    async fn create_access_key(&self, user: &str) -> Result<AccessKey>;

    async fn delete_access_key(&self, user: &str, key_id: &str) -> Result<()>;

    /// An absent user is not an error
    async fn delete_user(&self, user: &str) -> Result<()>;
}

/// Hands out API clients bound to a region
#[async_trait]
pub trait AwsClients: Send + Sync {
    async fn rds(&self, region: &str) -> Result<Arc<dyn RdsApi>>;

    async fn s3(&self, region: &str) -> Result<Arc<dyn S3Api>>;

    /// IAM is global; the region only selects the SDK config
    async fn iam(&self, region: &str) -> Result<Arc<dyn IamApi>>;
}
