//! skprom-metrics — Prometheus exposition for Signal K samples.
//!
//! # Architecture
//!
//! ```text
//! Exporter
//!   ├── start() → builds ExporterState, subscribes to a DeltaSource
//!   ├── stop()  → drops the subscription, clears the store
//!   └── render() → snapshot_and_evict() → render_prometheus()
//! ```

pub mod exporter;
pub mod prometheus;

pub use exporter::Exporter;
pub use prometheus::{PROMETHEUS_CONTENT_TYPE, metric_name, render_prometheus, render_store};
