#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stratum_cloud::{
    CloudError, CreateOutcome, DeleteOutcome, MemoryOutputSink, MemoryStatusStore,
    MemoryStrategySource, OutputData, OutputSink, ProvisionContext, ProvisionedInstance,
    ReconcileIntervals, ResourceKind, ResourceProvider, ResourceRecord, ResourceRequest,
    ResourceStatus, Result, StatusStore, StrategyConfig, StrategyResolver,
};
use stratum_controller::{ProviderRegistry, Reconciler};

/// Scripted answer to one `create` call
#[derive(Debug, Clone)]
pub enum CreateStep {
    InProgress(&'static str),
    Ready,
    Fail(&'static str),
    Timeout,
}

/// Scripted answer to one `delete` call
#[derive(Debug, Clone)]
pub enum DeleteStep {
    Gone,
    InProgress(&'static str),
    Fail(&'static str),
}

/// What the provider saw in the store at the moment it was called
#[derive(Debug, Clone)]
pub struct Observation {
    pub finalizer: bool,
    pub external_id: Option<String>,
}

/// Provider answering from a script. Once a script runs dry, create answers
/// Ready and delete answers Gone.
pub struct ScriptedProvider {
    name: String,
    strategy: String,
    creates: Mutex<VecDeque<CreateStep>>,
    deletes: Mutex<VecDeque<DeleteStep>>,
    pub create_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    observations: Mutex<Vec<Observation>>,
    regions: Mutex<Vec<String>>,
    last_published: Mutex<Option<OutputData>>,
    store: Mutex<Option<Arc<dyn StatusStore>>>,
}

impl ScriptedProvider {
    pub fn new(name: &str, strategy: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            strategy: strategy.to_string(),
            creates: Mutex::new(VecDeque::new()),
            deletes: Mutex::new(VecDeque::new()),
            create_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            observations: Mutex::new(Vec::new()),
            regions: Mutex::new(Vec::new()),
            last_published: Mutex::new(None),
            store: Mutex::new(None),
        })
    }

    pub fn script_create(&self, steps: &[CreateStep]) {
        self.creates.lock().unwrap().extend(steps.iter().cloned());
    }

    pub fn script_delete(&self, steps: &[DeleteStep]) {
        self.deletes.lock().unwrap().extend(steps.iter().cloned());
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.observations.lock().unwrap().clone()
    }

    /// Region handed to every create and delete call, in order
    pub fn regions(&self) -> Vec<String> {
        self.regions.lock().unwrap().clone()
    }

    /// Previously published output handed to the latest create call
    pub fn last_published(&self) -> Option<OutputData> {
        self.last_published.lock().unwrap().clone()
    }

    /// Record the persisted record state on every call
    pub fn observe(&self, store: Arc<dyn StatusStore>) {
        *self.store.lock().unwrap() = Some(store);
    }

    async fn record_observation(&self, name: &str) {
        let store = self.store.lock().unwrap().clone();
        if let Some(store) = store {
            let record = store.get(name).await.unwrap().unwrap();
            self.observations.lock().unwrap().push(Observation {
                finalizer: record.status.finalizer,
                external_id: record.status.external_id,
            });
        }
    }
}

#[async_trait]
impl ResourceProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_strategy(&self, strategy: &str) -> bool {
        strategy == self.strategy
    }

    fn reconcile_interval(&self, status: &ResourceStatus) -> Duration {
        ReconcileIntervals::default().for_status(status)
    }

    async fn create(&self, ctx: &ProvisionContext<'_>) -> Result<CreateOutcome> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.regions.lock().unwrap().push(ctx.config.region.clone());
        *self.last_published.lock().unwrap() = ctx.published.cloned();
        self.record_observation(&ctx.request.name).await;

        let step = self.creates.lock().unwrap().pop_front();
        match step.unwrap_or(CreateStep::Ready) {
            CreateStep::InProgress(message) => Ok(CreateOutcome::in_progress(message)),
            CreateStep::Fail(message) => Err(CloudError::ApiError(message.to_string())),
            CreateStep::Timeout => Err(CloudError::Timeout("backend timed out".into())),
            CreateStep::Ready => {
                let id = ctx
                    .status
                    .external_id
                    .clone()
                    .unwrap_or_else(|| format!("ext-{}", ctx.request.name));
                let instance = ProvisionedInstance::new(id)
                    .with_output("host", format!("{}.internal", ctx.request.name))
                    .with_output("port", "5432");
                Ok(CreateOutcome::ready(instance, "ready"))
            }
        }
    }

    async fn delete(&self, ctx: &ProvisionContext<'_>) -> Result<DeleteOutcome> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.regions.lock().unwrap().push(ctx.config.region.clone());
        self.record_observation(&ctx.request.name).await;

        let step = self.deletes.lock().unwrap().pop_front();
        match step.unwrap_or(DeleteStep::Gone) {
            DeleteStep::Gone => Ok(DeleteOutcome::gone("deleted")),
            DeleteStep::InProgress(message) => Ok(DeleteOutcome::in_progress(message)),
            DeleteStep::Fail(message) => Err(CloudError::ApiError(message.to_string())),
        }
    }
}

type WritePredicate = Box<dyn Fn(&ResourceStatus) -> bool + Send + Sync>;

/// Memory store whose status writes can be made to fail
pub struct FlakyStore {
    inner: MemoryStatusStore,
    fail_when: Mutex<Option<WritePredicate>>,
    conflict_when: Mutex<Option<WritePredicate>>,
    conflicts: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStatusStore::new(),
            fail_when: Mutex::new(None),
            conflict_when: Mutex::new(None),
            conflicts: AtomicUsize::new(0),
        })
    }

    /// Reject every status write matching `predicate`
    pub fn fail_writes_when(
        &self,
        predicate: impl Fn(&ResourceStatus) -> bool + Send + Sync + 'static,
    ) {
        *self.fail_when.lock().unwrap() = Some(Box::new(predicate));
    }

    /// Answer every status write matching `predicate` with a version conflict
    pub fn conflict_writes_when(
        &self,
        predicate: impl Fn(&ResourceStatus) -> bool + Send + Sync + 'static,
    ) {
        *self.conflict_when.lock().unwrap() = Some(Box::new(predicate));
    }

    pub fn heal(&self) {
        *self.fail_when.lock().unwrap() = None;
        *self.conflict_when.lock().unwrap() = None;
    }

    /// Answer the next `n` status writes with a version conflict
    pub fn conflict_next(&self, n: usize) {
        self.conflicts.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl StatusStore for FlakyStore {
    async fn get(&self, name: &str) -> Result<Option<ResourceRecord>> {
        self.inner.get(name).await
    }

    async fn list(&self) -> Result<Vec<ResourceRecord>> {
        self.inner.list().await
    }

    async fn apply(&self, request: ResourceRequest) -> Result<ResourceRecord> {
        self.inner.apply(request).await
    }

    async fn request_deletion(&self, name: &str) -> Result<ResourceRecord> {
        self.inner.request_deletion(name).await
    }

    async fn update_status(
        &self,
        name: &str,
        expected_version: u64,
        status: &ResourceStatus,
    ) -> Result<u64> {
        let conflicting = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
            || self
                .conflict_when
                .lock()
                .unwrap()
                .as_ref()
                .is_some_and(|predicate| predicate(status));
        if conflicting {
            return Err(CloudError::Conflict {
                name: name.to_string(),
                expected: expected_version,
                actual: expected_version + 1,
            });
        }

        let rejected = self
            .fail_when
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|predicate| predicate(status));
        if rejected {
            return Err(CloudError::StateError("simulated crash".into()));
        }
        self.inner.update_status(name, expected_version, status).await
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.inner.remove(name).await
    }
}

/// Output sink that can be made to reject publishes
pub struct FlakySink {
    inner: MemoryOutputSink,
    reject_publish: Mutex<bool>,
}

impl FlakySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryOutputSink::new(),
            reject_publish: Mutex::new(false),
        })
    }

    pub fn reject_publish(&self, reject: bool) {
        *self.reject_publish.lock().unwrap() = reject;
    }
}

#[async_trait]
impl OutputSink for FlakySink {
    async fn publish(&self, output_ref: &str, data: &OutputData) -> Result<()> {
        if *self.reject_publish.lock().unwrap() {
            return Err(CloudError::ApiError("secret store unavailable".into()));
        }
        self.inner.publish(output_ref, data).await
    }

    async fn clear(&self, output_ref: &str) -> Result<()> {
        self.inner.clear(output_ref).await
    }

    async fn read(&self, output_ref: &str) -> Result<Option<OutputData>> {
        self.inner.read(output_ref).await
    }
}

/// Reconciler wired to in-memory stores
pub struct Harness {
    pub store: Arc<FlakyStore>,
    pub outputs: Arc<FlakySink>,
    pub strategies: Arc<MemoryStrategySource>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub fn new(providers: &[(ResourceKind, Arc<ScriptedProvider>)]) -> Self {
        let store = FlakyStore::new();
        let outputs = FlakySink::new();
        let strategies = Arc::new(MemoryStrategySource::new());

        let mut registry = ProviderRegistry::new();
        for (kind, provider) in providers {
            provider.observe(store.clone());
            registry.register(*kind, provider.clone());
        }

        let reconciler = Reconciler::new(
            store.clone(),
            outputs.clone(),
            StrategyResolver::new(strategies.clone()),
            registry,
        );

        Self {
            store,
            outputs,
            strategies,
            reconciler: Arc::new(reconciler),
        }
    }

    pub async fn configure(&self, kind: ResourceKind, tier: &str, strategy: &str) {
        self.strategies
            .set(kind, tier, StrategyConfig::new(strategy, ""))
            .await;
    }

    pub async fn configure_region(
        &self,
        kind: ResourceKind,
        tier: &str,
        strategy: &str,
        region: &str,
    ) {
        self.strategies
            .set(kind, tier, StrategyConfig::new(strategy, region))
            .await;
    }

    pub async fn apply(&self, request: ResourceRequest) -> ResourceRecord {
        self.store.apply(request).await.unwrap()
    }

    pub async fn record(&self, name: &str) -> ResourceRecord {
        self.store.get(name).await.unwrap().unwrap()
    }

    pub async fn output(&self, output_ref: &str) -> Option<OutputData> {
        self.outputs.read(output_ref).await.unwrap()
    }
}

pub fn postgres(name: &str) -> ResourceRequest {
    ResourceRequest::new(name, ResourceKind::Postgres, "production")
        .with_output_ref(format!("{}-conn", name))
}
