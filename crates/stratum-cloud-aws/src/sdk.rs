//! AWS SDK backed implementations of the API traits

use crate::api::{
    AccessKey, AwsClients, CreateDbInstance, DbInstance, DbSnapshot, IamApi, ObjectPage, RdsApi,
    S3Api,
};
use crate::error::{AwsError, Result};
use async_trait::async_trait;
use aws_sdk_rds::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Region every S3 bucket is created in without a location constraint
const S3_DEFAULT_REGION: &str = "us-east-1";

/// Timeouts and connection failures are retried by the engine; everything
/// else is reported through `wrap`.
fn sdk_error<E, R>(err: SdkError<E, R>, wrap: fn(String) -> AwsError) -> AwsError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::TimeoutError(_) => AwsError::Timeout(message),
        SdkError::DispatchFailure(_) => AwsError::Unreachable(message),
        _ => wrap(message),
    }
}

/// SDK clients, one shared config per region.
///
/// Credentials come from the default provider chain (environment, profile,
/// instance role).
#[derive(Default)]
pub struct SdkClients {
    configs: Mutex<HashMap<String, aws_config::SdkConfig>>,
}

impl SdkClients {
    pub fn new() -> Self {
        Self::default()
    }

    async fn config(&self, region: &str) -> aws_config::SdkConfig {
        let mut configs = self.configs.lock().await;
        if let Some(config) = configs.get(region) {
            return config.clone();
        }

        let config = aws_config::from_env()
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        tracing::info!(region = %region, "AWS SDK config loaded");
        configs.insert(region.to_string(), config.clone());
        config
    }
}

#[async_trait]
impl AwsClients for SdkClients {
    async fn rds(&self, region: &str) -> Result<Arc<dyn RdsApi>> {
        let config = self.config(region).await;
        Ok(Arc::new(SdkRds {
            client: aws_sdk_rds::Client::new(&config),
        }))
    }

    async fn s3(&self, region: &str) -> Result<Arc<dyn S3Api>> {
        let config = self.config(region).await;
        Ok(Arc::new(SdkS3 {
            client: aws_sdk_s3::Client::new(&config),
        }))
    }

    async fn iam(&self, region: &str) -> Result<Arc<dyn IamApi>> {
        let config = self.config(region).await;
        Ok(Arc::new(SdkIam {
            client: aws_sdk_iam::Client::new(&config),
        }))
    }
}

pub struct SdkRds {
    client: aws_sdk_rds::Client,
}

#[async_trait]
impl RdsApi for SdkRds {
    async fn describe_instance(&self, identifier: &str) -> Result<Option<DbInstance>> {
        let output = match self
            .client
            .describe_db_instances()
            .db_instance_identifier(identifier)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_db_instance_not_found_fault()) =>
            {
                return Ok(None);
            }
            Err(e) => return Err(sdk_error(e, AwsError::Rds)),
        };

        let instance = output
            .db_instances()
            .iter()
            .find(|i| i.db_instance_identifier() == Some(identifier))
            .map(|i| DbInstance {
                identifier: identifier.to_string(),
                status: i.db_instance_status().unwrap_or_default().to_string(),
                address: i.endpoint().and_then(|e| e.address()).map(str::to_string),
                port: i.endpoint().and_then(|e| e.port()),
                database: i.db_name().map(str::to_string),
                username: i.master_username().map(str::to_string),
                secret_arn: i
                    .master_user_secret()
                    .and_then(|s| s.secret_arn())
                    .map(str::to_string),
            });
        Ok(instance)
    }

    async fn create_instance(&self, input: &CreateDbInstance) -> Result<()> {
        self.client
            .create_db_instance()
            .db_instance_identifier(&input.identifier)
            .db_instance_class(&input.instance_class)
            .engine("postgres")
            .set_engine_version(input.engine_version.clone())
            .allocated_storage(input.allocated_storage)
            .db_name(&input.database)
            .master_username(&input.username)
            .manage_master_user_password(true)
            .multi_az(input.multi_az)
            .storage_encrypted(true)
            .publicly_accessible(false)
            .send()
            .await
            .map_err(|e| sdk_error(e, AwsError::Rds))?;
        Ok(())
    }

    async fn delete_instance(&self, identifier: &str) -> Result<()> {
        match self
            .client
            .delete_db_instance()
            .db_instance_identifier(identifier)
            .skip_final_snapshot(true)
            .delete_automated_backups(true)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_db_instance_not_found_fault()) =>
            {
                Ok(())
            }
            Err(e) => Err(sdk_error(e, AwsError::Rds)),
        }
    }

    async fn describe_snapshot(&self, identifier: &str) -> Result<Option<DbSnapshot>> {
        let output = match self
            .client
            .describe_db_snapshots()
            .db_snapshot_identifier(identifier)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_db_snapshot_not_found_fault()) =>
            {
                return Ok(None);
            }
            Err(e) => return Err(sdk_error(e, AwsError::Rds)),
        };

        let snapshot = output
            .db_snapshots()
            .iter()
            .find(|s| s.db_snapshot_identifier() == Some(identifier))
            .map(|s| DbSnapshot {
                identifier: identifier.to_string(),
                status: s.status().unwrap_or_default().to_string(),
            });
        Ok(snapshot)
    }

    async fn create_snapshot(&self, instance: &str, snapshot: &str) -> Result<()> {
        self.client
            .create_db_snapshot()
            .db_instance_identifier(instance)
            .db_snapshot_identifier(snapshot)
            .send()
            .await
            .map_err(|e| sdk_error(e, AwsError::Rds))?;
        Ok(())
    }

    async fn delete_snapshot(&self, identifier: &str) -> Result<()> {
        match self
            .client
            .delete_db_snapshot()
            .db_snapshot_identifier(identifier)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_db_snapshot_not_found_fault()) =>
            {
                Ok(())
            }
            Err(e) => Err(sdk_error(e, AwsError::Rds)),
        }
    }
}

pub struct SdkS3 {
    client: aws_sdk_s3::Client,
}

#[async_trait]
impl S3Api for SdkS3 {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(sdk_error(e, AwsError::S3)),
        }
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if region != S3_DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        request
            .send()
            .await
            .map_err(|e| sdk_error(e, AwsError::S3))?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<ObjectPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error(e, AwsError::S3))?;

        Ok(ObjectPage {
            keys: output
                .contents()
                .iter()
                .filter_map(|o| o.key().map(str::to_string))
                .collect(),
            truncated: output.is_truncated().unwrap_or(false),
        })
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()> {
        for key in keys {
            self.client
                .delete_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| sdk_error(e, AwsError::S3))?;
        }
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error(e, AwsError::S3))?;
        Ok(())
    }
}

pub struct SdkIam {
    client: aws_sdk_iam::Client,
}

#[async_trait]
impl IamApi for SdkIam {
    async fn user_exists(&self, user: &str) -> Result<bool> {
        match self.client.get_user().user_name(user).send().await {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_no_such_entity_exception()) =>
            {
                Ok(false)
            }
            Err(e) => Err(sdk_error(e, AwsError::Iam)),
        }
    }

    async fn create_user(&self, user: &str) -> Result<()> {
        self.client
            .create_user()
            .user_name(user)
            .send()
            .await
            .map_err(|e| sdk_error(e, AwsError::Iam))?;
        Ok(())
    }

    async fn put_user_policy(&self, user: &str, policy: &str, document: &str) -> Result<()> {
        self.client
            .put_user_policy()
            .user_name(user)
            .policy_name(policy)
            .policy_document(document)
            .send()
            .await
            .map_err(|e| sdk_error(e, AwsError::Iam))?;
        Ok(())
    }

    async fn delete_user_policy(&self, user: &str, policy: &str) -> Result<()> {
        match self
            .client
            .delete_user_policy()
            .user_name(user)
            .policy_name(policy)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_no_such_entity_exception()) =>
            {
                Ok(())
            }
            Err(e) => Err(sdk_error(e, AwsError::Iam)),
        }
    }

    async fn list_access_keys(&self, user: &str) -> Result<Vec<String>> {
        let output = self
            .client
            .list_access_keys()
            .user_name(user)
            .send()
            .await
            .map_err(|e| sdk_error(e, AwsError::Iam))?;

        Ok(output
            .access_key_metadata()
            .iter()
            .filter_map(|k| k.access_key_id().map(str::to_string))
            .collect())
    }

    async fn create_access_key(&self, user: &str) -> Result<AccessKey> {
        let output = self
            .client
            .create_access_key()
            .user_name(user)
            .send()
            .await
            .map_err(|e| sdk_error(e, AwsError::Iam))?;

        let key = output
            .access_key()
            .ok_or_else(|| AwsError::Iam(format!("no access key returned for {}", user)))?;
        Ok(AccessKey {
            id: key.access_key_id().to_string(),
            secret: key.secret_access_key().to_string(),
        })
    }

    async fn delete_access_key(&self, user: &str, key_id: &str) -> Result<()> {
        self.client
            .delete_access_key()
            .user_name(user)
            .access_key_id(key_id)
            .send()
            .await
            .map_err(|e| sdk_error(e, AwsError::Iam))?;
        Ok(())
    }

    async fn delete_user(&self, user: &str) -> Result<()> {
        match self.client.delete_user().user_name(user).send().await {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_no_such_entity_exception()) =>
            {
                Ok(())
            }
            Err(e) => Err(sdk_error(e, AwsError::Iam)),
        }
    }
}
