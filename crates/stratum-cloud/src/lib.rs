//! Stratum Cloud Resources
//!
//! This crate holds the pieces every Stratum component shares: the resource
//! request model, the provider abstraction, the tiered strategy resolver and
//! the stores that persist request status and published outputs.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                stratumd (run/apply)              │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │              stratum-controller                  │
//! │    reconcile state machine / worker pool         │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                stratum-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Provider Abstraction             │   │
//! │  │  trait ResourceProvider { ... }           │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │  Strategies  │  │ Status/Output│            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │   aws (SDK)   │ │ local (Docker)│
//! │   providers   │ │   providers   │
//! └───────────────┘ └───────────────┘
//! ```

pub mod error;
pub mod model;
pub mod naming;
pub mod output;
pub mod provider;
pub mod state;
pub mod strategy;

// Re-exports
pub use error::{CloudError, Result};
pub use model::{OutputData, Phase, ResourceKind, ResourceRecord, ResourceRequest, ResourceStatus};
pub use output::{FileOutputSink, MemoryOutputSink, OutputSink};
pub use provider::{
    CreateOutcome, DeleteOutcome, ProvisionContext, ProvisionedInstance, ReconcileIntervals,
    ResourceProvider,
};
pub use state::{FileStatusStore, GlobalState, MemoryStatusStore, StatusStore};
pub use strategy::{
    DEFAULT_REGION, FileStrategySource, MemoryStrategySource, Resolution, StrategyConfig,
    StrategyMapping, StrategyResolver, StrategySource,
};
