//! What the scheduler should do after a reconciliation

use std::time::Duration;

/// Requeue decision returned by every reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    requeue_after: Option<Duration>,
}

impl Action {
    /// Reconcile again after `duration`
    pub fn requeue(duration: Duration) -> Self {
        Self {
            requeue_after: Some(duration),
        }
    }

    /// Only reconcile again when the request itself changes
    pub fn await_change() -> Self {
        Self {
            requeue_after: None,
        }
    }

    pub fn requeue_after(&self) -> Option<Duration> {
        self.requeue_after
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.requeue_after {
            Some(d) => write!(f, "requeue after {}s", d.as_secs()),
            None => write!(f, "await change"),
        }
    }
}
