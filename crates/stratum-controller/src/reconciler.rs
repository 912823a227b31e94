//! Resource reconciliation state machine
//!
//! Each call to [`Reconciler::reconcile`] reads the persisted record, decides
//! from that record plus a live provider query, writes the resulting status
//! with a conditional write and tells the scheduler when to come back. No
//! decision depends on anything remembered from an earlier call.
//!
//! Precedence on every invocation:
//!
//! 1. deletion requested → deletion protocol
//! 2. resolve strategy config (pending tiers wait, store errors requeue)
//! 3. bind the first provider supporting the strategy (permanent)
//! 4. snapshot kinds: gate on the primary's phase
//! 5. persist binding and finalizer, then delegate to the provider's create

use crate::action::Action;
use crate::registry::ProviderRegistry;
use std::sync::Arc;
use std::time::Duration;
use stratum_cloud::{
    CreateOutcome, OutputSink, Phase, ProvisionContext, ResourceProvider, ResourceRecord,
    ResourceRequest, ResourceStatus, Resolution, Result, StatusStore, StrategyConfig,
    StrategyResolver,
};
use tracing::{Instrument, debug, info, warn};

/// Engine-level timings and naming
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Requeue while a tier has no strategy entry
    pub pending_requeue: Duration,
    /// Requeue after transient infrastructure errors
    pub transient_requeue: Duration,
    /// Prefix for names the engine generates
    pub name_prefix: String,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            pending_requeue: Duration::from_secs(60),
            transient_requeue: Duration::from_secs(30),
            name_prefix: "stratum".to_string(),
        }
    }
}

pub struct Reconciler {
    pub(crate) store: Arc<dyn StatusStore>,
    pub(crate) outputs: Arc<dyn OutputSink>,
    pub(crate) resolver: StrategyResolver,
    pub(crate) registry: ProviderRegistry,
    pub(crate) settings: ReconcilerSettings,
}

/// Status being worked on, plus the version and content last persisted
pub(crate) struct Tracked {
    pub(crate) name: String,
    pub(crate) version: u64,
    pub(crate) status: ResourceStatus,
    pub(crate) persisted: ResourceStatus,
}

impl Tracked {
    fn new(record: &ResourceRecord) -> Self {
        Self {
            name: record.request.name.clone(),
            version: record.version,
            status: record.status.clone(),
            persisted: record.status.clone(),
        }
    }

    fn is_dirty(&self) -> bool {
        self.status != self.persisted
    }
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn StatusStore>,
        outputs: Arc<dyn OutputSink>,
        resolver: StrategyResolver,
        registry: ProviderRegistry,
    ) -> Self {
        Self {
            store,
            outputs,
            resolver,
            registry,
            settings: ReconcilerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ReconcilerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn StatusStore> {
        &self.store
    }

    /// Reconcile one request by name.
    ///
    /// Errors are only returned for store failures that are not write
    /// conflicts; everything else is recorded in the request's status.
    pub async fn reconcile(&self, name: &str) -> Result<Action> {
        self.reconcile_versioned(name).await.map(|(action, _)| action)
    }

    /// Like [`Reconciler::reconcile`], also returning the record version the
    /// call left behind (None when the record does not exist).
    pub(crate) async fn reconcile_versioned(&self, name: &str) -> Result<(Action, Option<u64>)> {
        let Some(record) = self.store.get(name).await? else {
            debug!(name, "Request no longer exists");
            return Ok((Action::await_change(), None));
        };

        let span = tracing::info_span!(
            "reconcile",
            name = %record.request.name,
            kind = %record.request.kind
        );
        let mut tracked = Tracked::new(&record);

        let outcome = async {
            if record.request.deletion_requested {
                self.reconcile_deletion(&record.request, &mut tracked).await
            } else {
                self.reconcile_provisioning(&record.request, &mut tracked)
                    .await
            }
        }
        .instrument(span)
        .await;

        match outcome {
            Ok(action) => Ok((action, Some(tracked.version))),
            Err(e) if e.is_transient() => {
                warn!(name, error = %e, "Transient error, will retry");
                Ok((
                    Action::requeue(self.settings.transient_requeue),
                    Some(tracked.version),
                ))
            }
            Err(e) => Err(e),
        }
    }

    async fn reconcile_provisioning(
        &self,
        request: &ResourceRequest,
        tracked: &mut Tracked,
    ) -> Result<Action> {
        let config = match self.resolver.resolve(request.kind, &request.tier).await {
            Ok(Resolution::Ready(config)) => config,
            Ok(Resolution::Pending) => {
                if tracked.status.strategy.is_some() {
                    warn!(tier = %request.tier, "Strategy entry of a bound request disappeared");
                    return Ok(Action::requeue(self.settings.pending_requeue));
                }
                let message = format!("waiting for strategy config for tier '{}'", request.tier);
                self.transition(tracked, Phase::Pending, message).await?;
                return Ok(Action::requeue(self.settings.pending_requeue));
            }
            Err(e) => {
                warn!(error = %e, "Failed to resolve strategy config");
                return Ok(Action::requeue(self.settings.transient_requeue));
            }
        };

        if let Some(frozen) = tracked.status.strategy.clone() {
            if frozen != config.strategy {
                let message = format!(
                    "strategy changed from '{}' to '{}'; changing strategy is not supported",
                    frozen, config.strategy
                );
                self.fail(request, tracked, message).await?;
                return Ok(Action::await_change());
            }
        }

        // Region is frozen at binding, like the strategy
        if let Some(frozen) = tracked.status.region.clone() {
            if frozen != config.region {
                let message = format!(
                    "region changed from '{}' to '{}'; changing region is not supported",
                    frozen, config.region
                );
                self.fail(request, tracked, message).await?;
                return Ok(Action::await_change());
            }
        }

        let Some(provider) = self.bind_provider(request, tracked, &config).await? else {
            return Ok(Action::await_change());
        };
        if tracked.status.region.is_none() {
            tracked.status.region = Some(config.region.clone());
        }

        let primary = if request.kind.is_snapshot() {
            match self
                .snapshot_precondition(request, tracked, provider.as_ref())
                .await?
            {
                crate::snapshot::SnapshotGate::Proceed(primary) => primary,
                crate::snapshot::SnapshotGate::Hold(action) => return Ok(action),
            }
        } else {
            None
        };

        // The finalizer must be durable before anything external can exist
        tracked.status.finalizer = true;
        if tracked.is_dirty() {
            self.persist(tracked).await?;
        }

        let published = match tracked.status.output_ref.as_deref() {
            Some(output_ref) => self.outputs.read(output_ref).await?,
            None => None,
        };

        let outcome = {
            let mut ctx = ProvisionContext::new(request, &tracked.status, &config);
            if let Some(primary) = primary.as_ref() {
                ctx = ctx.with_primary(primary);
            }
            if let Some(published) = published.as_ref() {
                ctx = ctx.with_published(published);
            }
            provider.create(&ctx).await
        };

        match outcome {
            Err(e) if e.is_transient() => {
                warn!(provider = provider.name(), error = %e, "Transient provider error");
                Ok(Action::requeue(self.settings.transient_requeue))
            }
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "Provider create failed");
                self.fail(request, tracked, e.to_string()).await?;
                Ok(Action::requeue(provider.reconcile_interval(&tracked.status)))
            }
            Ok(CreateOutcome::InProgress { message }) => {
                debug!(provider = provider.name(), %message, "Resource still converging");
                self.transition(tracked, Phase::InProgress, message).await?;
                Ok(Action::requeue(provider.reconcile_interval(&tracked.status)))
            }
            Ok(CreateOutcome::Ready { instance, message }) => {
                self.complete(request, tracked, provider.as_ref(), instance, message)
                    .await
            }
        }
    }

    /// Look up the bound provider, or bind the first one supporting the
    /// strategy. Returns None after recording a terminal failure.
    pub(crate) async fn bind_provider(
        &self,
        request: &ResourceRequest,
        tracked: &mut Tracked,
        config: &StrategyConfig,
    ) -> Result<Option<Arc<dyn ResourceProvider>>> {
        if let Some(bound) = tracked.status.provider.clone() {
            return match self.registry.get(request.kind, &bound) {
                Some(provider) => Ok(Some(provider)),
                None => {
                    let message = format!("provider '{}' is not registered", bound);
                    self.fail(request, tracked, message).await?;
                    Ok(None)
                }
            };
        }

        match self.registry.select(request.kind, &config.strategy) {
            Some(provider) => {
                info!(
                    provider = provider.name(),
                    strategy = %config.strategy,
                    "Bound provider"
                );
                tracked.status.provider = Some(provider.name().to_string());
                tracked.status.strategy = Some(config.strategy.clone());
                Ok(Some(provider))
            }
            None => {
                warn!(strategy = %config.strategy, "No provider supports strategy");
                self.fail(request, tracked, "unsupported deployment strategy")
                    .await?;
                Ok(None)
            }
        }
    }

    /// Set the phase and persist when anything changed
    pub(crate) async fn transition(
        &self,
        tracked: &mut Tracked,
        phase: Phase,
        message: impl Into<String>,
    ) -> Result<()> {
        let previous = tracked.persisted.phase;
        tracked.status.set_phase(phase, message);
        if !tracked.is_dirty() {
            return Ok(());
        }
        self.persist(tracked).await?;
        if previous != phase {
            info!(from = %previous, to = %phase, message = %tracked.status.message, "Phase changed");
        }
        Ok(())
    }

    /// Conditional write of the tracked status
    pub(crate) async fn persist(&self, tracked: &mut Tracked) -> Result<()> {
        tracked.version = self
            .store
            .update_status(&tracked.name, tracked.version, &tracked.status)
            .await?;
        tracked.persisted = tracked.status.clone();
        Ok(())
    }
}
