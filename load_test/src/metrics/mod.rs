//! Run metrics: session and request counters, latencies and host load.

pub mod collector;
pub mod reporter;
pub mod transport;
pub mod types;

pub use collector::{LatencyStats, MetricsCollector};
pub use transport::InstrumentedTransport;
pub use types::{PhaseMetrics, RequestMetrics, SessionMetrics, SystemMetrics, TestMetrics};
