//! In-memory fakes of the RDS, S3 and IAM APIs

use crate::api::{
    AccessKey, AwsClients, CreateDbInstance, DbInstance, DbSnapshot, IamApi, ObjectPage, RdsApi,
    S3Api, STATUS_AVAILABLE, STATUS_DELETING,
};
use crate::error::{AwsError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use stratum_cloud::{ProvisionContext, ResourceRequest, ResourceStatus, StrategyConfig};

pub fn context<'a>(
    request: &'a ResourceRequest,
    status: &'a ResourceStatus,
    config: &'a StrategyConfig,
) -> ProvisionContext<'a> {
    ProvisionContext::new(request, status, config)
}

pub struct FakeAws {
    pub rds: Arc<FakeRds>,
    pub s3: Arc<FakeS3>,
    pub iam: Arc<FakeIam>,
    regions: Mutex<Vec<String>>,
}

impl FakeAws {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rds: Arc::new(FakeRds::default()),
            s3: Arc::new(FakeS3::default()),
            iam: Arc::new(FakeIam::default()),
            regions: Mutex::new(Vec::new()),
        })
    }

    /// Regions clients were requested for, in order
    pub fn regions(&self) -> Vec<String> {
        self.regions.lock().unwrap().clone()
    }
}

#[async_trait]
impl AwsClients for FakeAws {
    async fn rds(&self, region: &str) -> Result<Arc<dyn RdsApi>> {
        self.regions.lock().unwrap().push(region.to_string());
        Ok(self.rds.clone())
    }

    async fn s3(&self, region: &str) -> Result<Arc<dyn S3Api>> {
        self.regions.lock().unwrap().push(region.to_string());
        Ok(self.s3.clone())
    }

    async fn iam(&self, region: &str) -> Result<Arc<dyn IamApi>> {
        self.regions.lock().unwrap().push(region.to_string());
        Ok(self.iam.clone())
    }
}

#[derive(Default)]
pub struct FakeRds {
    instances: Mutex<HashMap<String, DbInstance>>,
    snapshots: Mutex<HashMap<String, DbSnapshot>>,
    /// (instance, snapshot) pairs passed to create_snapshot
    snapshot_sources: Mutex<Vec<(String, String)>>,
    instance_creates: AtomicUsize,
    instance_deletes: AtomicUsize,
    snapshot_deletes: AtomicUsize,
    timeout: AtomicBool,
}

impl FakeRds {
    pub fn make_available(&self, identifier: &str) {
        self.instances.lock().unwrap().insert(
            identifier.to_string(),
            DbInstance {
                identifier: identifier.to_string(),
                status: STATUS_AVAILABLE.to_string(),
                address: Some(format!("{}.rds.test", identifier)),
                port: Some(5432),
                database: Some("postgres".to_string()),
                username: Some("postgres".to_string()),
                secret_arn: Some(format!(
                    "arn:aws:secretsmanager:eu-west-1:000000000000:secret:{}",
                    identifier
                )),
            },
        );
    }

    pub fn set_snapshot_status(&self, identifier: &str, status: &str) {
        self.snapshots.lock().unwrap().insert(
            identifier.to_string(),
            DbSnapshot {
                identifier: identifier.to_string(),
                status: status.to_string(),
            },
        );
    }

    /// Complete every pending deletion
    pub fn finish_deletions(&self) {
        self.instances
            .lock()
            .unwrap()
            .retain(|_, i| i.status != STATUS_DELETING);
        self.snapshots
            .lock()
            .unwrap()
            .retain(|_, s| s.status != STATUS_DELETING);
    }

    pub fn fail_with_timeout(&self) {
        self.timeout.store(true, Ordering::SeqCst);
    }

    pub fn instance_creates(&self) -> usize {
        self.instance_creates.load(Ordering::SeqCst)
    }

    pub fn instance_deletes(&self) -> usize {
        self.instance_deletes.load(Ordering::SeqCst)
    }

    pub fn snapshot_deletes(&self) -> usize {
        self.snapshot_deletes.load(Ordering::SeqCst)
    }

    pub fn snapshot_sources(&self) -> Vec<(String, String)> {
        self.snapshot_sources.lock().unwrap().clone()
    }

    fn check_timeout(&self) -> Result<()> {
        if self.timeout.load(Ordering::SeqCst) {
            return Err(AwsError::Timeout("rds endpoint did not answer".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RdsApi for FakeRds {
    async fn describe_instance(&self, identifier: &str) -> Result<Option<DbInstance>> {
        self.check_timeout()?;
        Ok(self.instances.lock().unwrap().get(identifier).cloned())
    }

    async fn create_instance(&self, input: &CreateDbInstance) -> Result<()> {
        self.check_timeout()?;
        self.instance_creates.fetch_add(1, Ordering::SeqCst);
        self.instances.lock().unwrap().insert(
            input.identifier.clone(),
            DbInstance {
                identifier: input.identifier.clone(),
                status: "creating".to_string(),
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn delete_instance(&self, identifier: &str) -> Result<()> {
        self.check_timeout()?;
        self.instance_deletes.fetch_add(1, Ordering::SeqCst);
        if let Some(instance) = self.instances.lock().unwrap().get_mut(identifier) {
            instance.status = STATUS_DELETING.to_string();
        }
        Ok(())
    }

    async fn describe_snapshot(&self, identifier: &str) -> Result<Option<DbSnapshot>> {
        self.check_timeout()?;
        Ok(self.snapshots.lock().unwrap().get(identifier).cloned())
    }

    async fn create_snapshot(&self, instance: &str, snapshot: &str) -> Result<()> {
        self.check_timeout()?;
        self.snapshot_sources
            .lock()
            .unwrap()
            .push((instance.to_string(), snapshot.to_string()));
        self.set_snapshot_status(snapshot, "creating");
        Ok(())
    }

    async fn delete_snapshot(&self, identifier: &str) -> Result<()> {
        self.check_timeout()?;
        self.snapshot_deletes.fetch_add(1, Ordering::SeqCst);
        if let Some(snapshot) = self.snapshots.lock().unwrap().get_mut(identifier) {
            snapshot.status = STATUS_DELETING.to_string();
        }
        Ok(())
    }
}

/// Buckets with their region and object keys; listing pages hold two keys
#[derive(Default)]
pub struct FakeS3 {
    buckets: Mutex<HashMap<String, (String, Vec<String>)>>,
    bucket_creates: AtomicUsize,
}

impl FakeS3 {
    pub fn put_objects(&self, bucket: &str, keys: &[&str]) {
        if let Some((_, objects)) = self.buckets.lock().unwrap().get_mut(bucket) {
            objects.extend(keys.iter().map(|k| k.to_string()));
        }
    }

    pub fn bucket_region(&self, bucket: &str) -> Option<String> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .map(|(region, _)| region.clone())
    }

    pub fn bucket_creates(&self) -> usize {
        self.bucket_creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl S3Api for FakeS3 {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.buckets.lock().unwrap().contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<()> {
        self.bucket_creates.fetch_add(1, Ordering::SeqCst);
        self.buckets
            .lock()
            .unwrap()
            .insert(bucket.to_string(), (region.to_string(), Vec::new()));
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<ObjectPage> {
        let buckets = self.buckets.lock().unwrap();
        let Some((_, objects)) = buckets.get(bucket) else {
            return Err(AwsError::S3(format!("NoSuchBucket: {}", bucket)));
        };
        Ok(ObjectPage {
            keys: objects.iter().take(2).cloned().collect(),
            truncated: objects.len() > 2,
        })
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()> {
        if let Some((_, objects)) = self.buckets.lock().unwrap().get_mut(bucket) {
            objects.retain(|k| !keys.contains(k));
        }
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let mut buckets = self.buckets.lock().unwrap();
        match buckets.get(bucket) {
            Some((_, objects)) if !objects.is_empty() => {
                Err(AwsError::S3(format!("BucketNotEmpty: {}", bucket)))
            }
            _ => {
                buckets.remove(bucket);
                Ok(())
            }
        }
    }
}

#[derive(Default)]
pub struct FakeIamUser {
    pub policies: HashMap<String, String>,
    pub keys: Vec<String>,
}

/// Users with their inline policies and access key ids; keys are numbered
#[derive(Default)]
pub struct FakeIam {
    users: Mutex<HashMap<String, FakeIamUser>>,
    key_creates: AtomicUsize,
}

impl FakeIam {
    pub fn user_exists(&self, user: &str) -> bool {
        self.users.lock().unwrap().contains_key(user)
    }

    pub fn keys(&self, user: &str) -> Vec<String> {
        self.users
            .lock()
            .unwrap()
            .get(user)
            .map(|u| u.keys.clone())
            .unwrap_or_default()
    }

    pub fn policy(&self, user: &str, policy: &str) -> Option<String> {
        self.users
            .lock()
            .unwrap()
            .get(user)
            .and_then(|u| u.policies.get(policy).cloned())
    }

    pub fn key_creates(&self) -> usize {
        self.key_creates.load(Ordering::SeqCst)
    }

    fn with_user<T>(&self, user: &str, f: impl FnOnce(&mut FakeIamUser) -> T) -> Result<T> {
        let mut users = self.users.lock().unwrap();
        let Some(entry) = users.get_mut(user) else {
            return Err(AwsError::Iam(format!("NoSuchEntity: {}", user)));
        };
        Ok(f(entry))
    }
}

#[async_trait]
impl IamApi for FakeIam {
    async fn user_exists(&self, user: &str) -> Result<bool> {
        Ok(self.users.lock().unwrap().contains_key(user))
    }

    async fn create_user(&self, user: &str) -> Result<()> {
        let mut users = self.users.lock().unwrap();
        if users.contains_key(user) {
            return Err(AwsError::Iam(format!("EntityAlreadyExists: {}", user)));
        }
        users.insert(user.to_string(), FakeIamUser::default());
        Ok(())
    }

    async fn put_user_policy(&self, user: &str, policy: &str, document: &str) -> Result<()> {
        self.with_user(user, |u| {
            u.policies.insert(policy.to_string(), document.to_string());
        })
    }

    async fn delete_user_policy(&self, user: &str, policy: &str) -> Result<()> {
        let mut users = self.users.lock().unwrap();
        if let Some(u) = users.get_mut(user) {
            u.policies.remove(policy);
        }
        Ok(())
    }

    async fn list_access_keys(&self, user: &str) -> Result<Vec<String>> {
        self.with_user(user, |u| u.keys.clone())
    }

    async fn create_access_key(&self, user: &str) -> Result<AccessKey> {
        let n = self.key_creates.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("AKIAFAKE{:04}", n);
        self.with_user(user, |u| u.keys.push(id.clone()))?;
        Ok(AccessKey {
            id,
            secret: format!("secret-{}", n),
        })
    }

    async fn delete_access_key(&self, user: &str, key_id: &str) -> Result<()> {
        self.with_user(user, |u| u.keys.retain(|k| k != key_id))
    }

    async fn delete_user(&self, user: &str) -> Result<()> {
        let mut users = self.users.lock().unwrap();
        match users.get(user) {
            Some(u) if !u.keys.is_empty() || !u.policies.is_empty() => {
                Err(AwsError::Iam(format!("DeleteConflict: {}", user)))
            }
            _ => {
                users.remove(user);
                Ok(())
            }
        }
    }
}
