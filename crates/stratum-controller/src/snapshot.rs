//! Snapshot sub-flow
//!
//! A snapshot waits for its primary to settle, and gets a deterministic
//! timestamp-derived name that is persisted before the provider ever sees it.

use crate::action::Action;
use crate::reconciler::{Reconciler, Tracked};
use stratum_cloud::naming::{DEFAULT_IDENTIFIER_LENGTH, timestamped_infra_name};
use stratum_cloud::{Phase, ResourceProvider, ResourceRecord, ResourceRequest, Result};
use tracing::debug;

pub(crate) enum SnapshotGate {
    /// Continue with the primary, if it still exists
    Proceed(Option<ResourceRecord>),
    /// Status already written; return this action
    Hold(Action),
}

impl Reconciler {
    pub(crate) async fn snapshot_precondition(
        &self,
        request: &ResourceRequest,
        tracked: &mut Tracked,
        provider: &dyn ResourceProvider,
    ) -> Result<SnapshotGate> {
        let primary = match request.primary_ref.as_deref() {
            Some(primary_ref) => self.store.get(primary_ref).await?,
            None => None,
        };

        // A finished snapshot stays valid whatever its primary does next
        if tracked.status.phase == Phase::Complete {
            return Ok(SnapshotGate::Proceed(primary));
        }

        let Some(primary) = primary else {
            let message = format!(
                "primary resource '{}' not found",
                request.primary_ref.as_deref().unwrap_or_default()
            );
            self.fail(request, tracked, message).await?;
            return Ok(SnapshotGate::Hold(Action::requeue(
                provider.reconcile_interval(&tracked.status),
            )));
        };

        match primary.status.phase {
            Phase::Pending | Phase::InProgress => {
                debug!(primary = %primary.request.name, phase = %primary.status.phase, "Primary not ready");
                self.transition(tracked, Phase::InProgress, "waiting for primary resource")
                    .await?;
                return Ok(SnapshotGate::Hold(Action::requeue(
                    provider.reconcile_interval(&tracked.status),
                )));
            }
            Phase::DeleteInProgress => {
                self.fail(request, tracked, "cannot snapshot while primary is being deleted")
                    .await?;
                return Ok(SnapshotGate::Hold(Action::requeue(
                    provider.reconcile_interval(&tracked.status),
                )));
            }
            _ => {}
        }

        if tracked.status.external_id.is_none() {
            let name = timestamped_infra_name(
                &self.settings.name_prefix,
                &request.name,
                request.created_at,
                DEFAULT_IDENTIFIER_LENGTH,
            );
            debug!(snapshot = %name, "Generated snapshot name");
            tracked.status.record_external_id(name);
        }

        Ok(SnapshotGate::Proceed(Some(primary)))
    }
}
