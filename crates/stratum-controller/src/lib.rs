//! Stratum Controller
//!
//! The reconciliation engine: a level-triggered state machine that drives
//! each resource request from creation to readiness to deletion through the
//! providers registered for its kind, and a worker pool that runs it.
//!
//! ```text
//!  StatusStore ──poll──▶ Controller ──▶ Reconciler ──▶ ResourceProvider
//!       ▲                                   │
//!       └──────── conditional write ────────┤
//!                                           └──▶ OutputSink
//! ```

pub mod action;
mod deletion;
mod publish;
pub mod reconciler;
pub mod registry;
mod snapshot;
pub mod worker;

pub use action::Action;
pub use reconciler::{Reconciler, ReconcilerSettings};
pub use registry::ProviderRegistry;
pub use worker::{Controller, WorkerConfig};
