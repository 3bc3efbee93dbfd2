//! Metrics collector - thread-safe collection with latency tracking

use super::types::TestMetrics;
use hdrhistogram::Histogram;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

#[derive(Clone)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<TestMetrics>>,
    session_latencies: Arc<RwLock<Histogram<u64>>>,
    request_latencies: Arc<RwLock<Histogram<u64>>>,
    system: Arc<RwLock<System>>,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        // 3 significant digits
        let session_hist = Histogram::new(3).expect("Failed to create session histogram");
        let request_hist = Histogram::new(3).expect("Failed to create request histogram");

        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );

        Self {
            metrics: Arc::new(RwLock::new(TestMetrics::default())),
            session_latencies: Arc::new(RwLock::new(session_hist)),
            request_latencies: Arc::new(RwLock::new(request_hist)),
            system: Arc::new(RwLock::new(system)),
            start_time: Instant::now(),
        }
    }

    pub fn phase_started(&self, phase: &str) {
        let mut metrics = self.metrics.write();
        metrics.current_phase = Some(phase.to_string());
        metrics.phase_mut(phase);
    }

    pub fn session_started(&self, phase: &str) {
        let mut metrics = self.metrics.write();
        metrics.sessions.started += 1;
        metrics.sessions.in_flight += 1;
        let sessions = metrics.phase_mut(phase);
        sessions.started += 1;
        sessions.in_flight += 1;
    }

    pub fn session_completed(&self, phase: &str, duration_ms: u64) {
        let mut metrics = self.metrics.write();
        metrics.sessions.completed += 1;
        metrics.sessions.in_flight = metrics.sessions.in_flight.saturating_sub(1);
        let sessions = metrics.phase_mut(phase);
        sessions.completed += 1;
        sessions.in_flight = sessions.in_flight.saturating_sub(1);
        drop(metrics);

        if let Some(mut hist) = self.session_latencies.try_write() {
            let _ = hist.record(duration_ms);
        }
    }

    pub fn session_failed(&self, phase: &str, duration_ms: u64) {
        let mut metrics = self.metrics.write();
        metrics.sessions.failed += 1;
        metrics.sessions.in_flight = metrics.sessions.in_flight.saturating_sub(1);
        let sessions = metrics.phase_mut(phase);
        sessions.failed += 1;
        sessions.in_flight = sessions.in_flight.saturating_sub(1);
        drop(metrics);

        // Failed sessions still count towards latency
        if let Some(mut hist) = self.session_latencies.try_write() {
            let _ = hist.record(duration_ms);
        }
    }

    /// Records one request; `status` is `None` when no response arrived.
    pub fn request_finished(&self, name: &str, status: Option<u16>, duration_ms: u64) {
        let mut metrics = self.metrics.write();
        metrics.requests.record(status);
        metrics
            .requests_by_name
            .entry(name.to_string())
            .or_default()
            .record(status);
        drop(metrics);

        if let Some(mut hist) = self.request_latencies.try_write() {
            let _ = hist.record(duration_ms);
        }
    }

    pub fn records_sent(&self, count: usize) {
        self.metrics.write().records_sent += count;
    }

    /// Update system metrics (CPU, memory)
    pub fn update_system_metrics(&self) {
        let mut system = self.system.write();
        system.refresh_cpu_all();
        system.refresh_memory();

        let mut metrics = self.metrics.write();
        metrics.system.cpu_usage = system.global_cpu_usage();
        metrics.system.memory_used_mb = system.used_memory() / 1024 / 1024;
        metrics.system.memory_total_mb = system.total_memory() / 1024 / 1024;
    }

    pub fn get_snapshot(&self) -> TestMetrics {
        self.metrics.read().clone()
    }

    pub fn get_session_latency_percentiles(&self) -> LatencyStats {
        LatencyStats::from_histogram(&self.session_latencies.read())
    }

    pub fn get_request_latency_percentiles(&self) -> LatencyStats {
        LatencyStats::from_histogram(&self.request_latencies.read())
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("elapsed_seconds", &self.elapsed_seconds())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct LatencyStats {
    pub min: u64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub max: u64,
    pub mean: f64,
    pub count: u64,
}

impl LatencyStats {
    fn from_histogram(hist: &Histogram<u64>) -> Self {
        Self {
            min: hist.min(),
            p50: hist.value_at_quantile(0.50),
            p95: hist.value_at_quantile(0.95),
            p99: hist.value_at_quantile(0.99),
            max: hist.max(),
            mean: hist.mean(),
            count: hist.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_are_counted_per_phase_and_in_total() {
        let collector = MetricsCollector::new();
        collector.phase_started("setup");
        collector.session_started("setup");
        collector.session_completed("setup", 12);
        collector.phase_started("registration");
        collector.session_started("registration");
        collector.session_started("registration");
        collector.session_failed("registration", 30);

        let snapshot = collector.get_snapshot();
        assert_eq!(snapshot.current_phase.as_deref(), Some("registration"));
        assert_eq!(snapshot.sessions.started, 3);
        assert_eq!(snapshot.sessions.in_flight, 1);
        let registration = snapshot.phase("registration").cloned().unwrap_or_default();
        assert_eq!((registration.started, registration.failed, registration.in_flight), (2, 1, 1));
        assert_eq!(collector.get_session_latency_percentiles().count, 2);
    }

    #[test]
    fn requests_are_counted_by_name() {
        let collector = MetricsCollector::new();
        collector.request_finished("Get project", Some(404), 3);
        collector.request_finished("Create project", Some(201), 5);
        collector.request_finished("Get project", Some(200), 2);

        let snapshot = collector.get_snapshot();
        assert_eq!(snapshot.requests.sent, 3);
        assert_eq!(snapshot.requests_by_name["Get project"].sent, 2);
        assert_eq!(snapshot.requests_by_name["Get project"].client_errors, 1);
        let latency = collector.get_request_latency_percentiles();
        assert_eq!((latency.count, latency.max), (3, 5));
    }
}
