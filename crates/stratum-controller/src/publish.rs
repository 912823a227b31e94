//! Output propagation
//!
//! Connection output is published before a request is marked Complete and
//! withdrawn whenever it stops being valid (Failed, Deleted).

use crate::action::Action;
use crate::reconciler::{Reconciler, Tracked};
use stratum_cloud::{Phase, ProvisionedInstance, ResourceProvider, ResourceRequest, Result};
use tracing::{debug, info, warn};

impl Reconciler {
    /// Publish the instance output, then record Complete.
    ///
    /// A publish failure turns into Failed; the request never reaches
    /// Complete without its output in place. Output is written before the
    /// status, so when the Complete write itself fails the fresh output is
    /// withdrawn again unless an earlier Complete status already covers it.
    pub(crate) async fn complete(
        &self,
        request: &ResourceRequest,
        tracked: &mut Tracked,
        provider: &dyn ResourceProvider,
        instance: ProvisionedInstance,
        message: String,
    ) -> Result<Action> {
        if let Some(output_ref) = request.output_ref.as_deref() {
            if let Err(e) = self.outputs.publish(output_ref, &instance.output).await {
                warn!(output_ref, error = %e, "Failed to publish output");
                self.fail(request, tracked, format!("failed to publish output: {}", e))
                    .await?;
                return Ok(Action::requeue(provider.reconcile_interval(&tracked.status)));
            }
            info!(output_ref, keys = instance.output.len(), "Published output");
        }

        // Output moved to a new reference: the old one is stale
        if let Some(previous) = tracked.status.output_ref.clone() {
            if request.output_ref.as_deref() != Some(previous.as_str()) {
                self.outputs.clear(&previous).await?;
            }
        }

        let covered = tracked.persisted.phase == Phase::Complete
            && tracked.persisted.output_ref == request.output_ref;
        tracked.status.output_ref = request.output_ref.clone();
        tracked.status.record_external_id(instance.external_id);
        if let Err(e) = self.transition(tracked, Phase::Complete, message).await {
            if !covered {
                self.withdraw(request).await;
            }
            return Err(e);
        }
        Ok(Action::requeue(provider.reconcile_interval(&tracked.status)))
    }

    /// Best-effort removal of output that no persisted status points at
    async fn withdraw(&self, request: &ResourceRequest) {
        let Some(output_ref) = request.output_ref.as_deref() else {
            return;
        };
        match self.outputs.clear(output_ref).await {
            Ok(()) => debug!(output_ref, "Withdrew output after failed status write"),
            Err(e) => warn!(output_ref, error = %e, "Failed to withdraw output"),
        }
    }

    /// Withdraw published output and record Failed
    pub(crate) async fn fail(
        &self,
        request: &ResourceRequest,
        tracked: &mut Tracked,
        message: impl Into<String>,
    ) -> Result<()> {
        self.invalidate_output(request, tracked).await?;
        self.transition(tracked, Phase::Failed, message).await
    }

    /// Clear every output reference this request may have published to
    pub(crate) async fn invalidate_output(
        &self,
        request: &ResourceRequest,
        tracked: &mut Tracked,
    ) -> Result<()> {
        let published = tracked.status.output_ref.take();
        let mut refs: Vec<String> = published.into_iter().collect();
        if let Some(requested) = request.output_ref.clone() {
            if !refs.contains(&requested) {
                refs.push(requested);
            }
        }

        for output_ref in &refs {
            self.outputs.clear(output_ref).await?;
        }
        Ok(())
    }
}
