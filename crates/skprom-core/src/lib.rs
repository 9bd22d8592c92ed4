//! skprom-core — Signal K delta ingestion for the Prometheus bridge.
//!
//! Turns hierarchical Signal K deltas into flat, latest-value samples.
//!
//! # Architecture
//!
//! ```text
//! DeltaSource (DeltaBus)
//!   └── handler → DeltaProcessor::process()
//!                   ├── flatten()            nested value → dotted leaves
//!                   ├── PathFilter           include / exclude by exact path
//!                   └── SampleStore::upsert  latest write wins per identity
//!
//! SampleStore::snapshot_and_evict() ← renderer (skprom-metrics)
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod filter;
pub mod flatten;
pub mod processor;
pub mod store;
pub mod types;

pub use bus::{DeltaBus, DeltaHandler, DeltaSource, Subscription};
pub use config::{ContextScope, DaemonConfig, ExporterConfig, HttpConfig, MetricNaming, SignalKConfig};
pub use error::{ConfigError, ConfigResult};
pub use filter::{FilterMode, PathFilter};
pub use flatten::{FlattenMode, Leaf, LeafKind, flatten, parse_timestamp_millis};
pub use processor::DeltaProcessor;
pub use store::SampleStore;
pub use types::*;
