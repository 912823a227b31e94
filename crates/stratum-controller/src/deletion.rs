//! Finalizer-guarded deletion
//!
//! The finalizer is cleared only after the provider confirms the external
//! resource is gone. Every other outcome keeps it, so the record cannot be
//! discarded while something external may still exist.

use crate::action::Action;
use crate::reconciler::{Reconciler, Tracked};
use stratum_cloud::{
    DeleteOutcome, Phase, ProvisionContext, ResourceRequest, Resolution, Result,
};
use tracing::{debug, info, warn};

impl Reconciler {
    pub(crate) async fn reconcile_deletion(
        &self,
        request: &ResourceRequest,
        tracked: &mut Tracked,
    ) -> Result<Action> {
        if !tracked.status.finalizer {
            if tracked.status.phase != Phase::Deleted {
                debug!("No finalizer, nothing external to clean up");
                self.invalidate_output(request, tracked).await?;
                self.transition(tracked, Phase::Deleted, "deleted").await?;
            }
            return Ok(Action::await_change());
        }

        let mut config = match self.resolver.resolve(request.kind, &request.tier).await {
            Ok(Resolution::Ready(config)) => config,
            Ok(Resolution::Pending) => {
                warn!(tier = %request.tier, "No strategy config for tier, cannot delete yet");
                return Ok(Action::requeue(self.settings.pending_requeue));
            }
            Err(e) => {
                warn!(error = %e, "Failed to resolve strategy config");
                return Ok(Action::requeue(self.settings.transient_requeue));
            }
        };

        // Delete where the resource was created, not where the tier points now
        if let Some(region) = tracked.status.region.clone() {
            if region != config.region {
                debug!(frozen = %region, resolved = %config.region, "Deleting in frozen region");
                config.region = region;
            }
        }

        let Some(provider) = self.bind_provider(request, tracked, &config).await? else {
            return Ok(Action::await_change());
        };

        let primary = match request.primary_ref.as_deref() {
            Some(primary_ref) if request.kind.is_snapshot() => self.store.get(primary_ref).await?,
            _ => None,
        };

        let outcome = {
            let mut ctx = ProvisionContext::new(request, &tracked.status, &config);
            if let Some(primary) = primary.as_ref() {
                ctx = ctx.with_primary(primary);
            }
            provider.delete(&ctx).await
        };

        match outcome {
            Err(e) if e.is_transient() => {
                warn!(provider = provider.name(), error = %e, "Transient provider error");
                Ok(Action::requeue(self.settings.transient_requeue))
            }
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "Provider delete failed");
                self.fail(request, tracked, e.to_string()).await?;
                Ok(Action::requeue(provider.reconcile_interval(&tracked.status)))
            }
            Ok(DeleteOutcome::InProgress { message }) => {
                self.transition(tracked, Phase::DeleteInProgress, message)
                    .await?;
                Ok(Action::requeue(provider.reconcile_interval(&tracked.status)))
            }
            Ok(DeleteOutcome::Gone { message }) => {
                self.invalidate_output(request, tracked).await?;
                tracked.status.finalizer = false;
                self.transition(tracked, Phase::Deleted, message).await?;
                info!(provider = provider.name(), "External resource gone, finalizer removed");
                Ok(Action::await_change())
            }
        }
    }
}
