//! Metric types

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetrics {
    pub started: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_flight: usize,
}

impl SessionMetrics {
    pub fn success_rate(&self) -> Option<f64> {
        let finished = self.completed + self.failed;
        (finished > 0).then(|| self.completed as f64 / finished as f64 * 100.0)
    }
}

/// Session counters of one phase, in run order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseMetrics {
    pub name: String,
    pub sessions: SessionMetrics,
}

/// Counters of one request name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetrics {
    pub sent: usize,
    /// Answered with a status below 400.
    pub ok: usize,
    pub client_errors: usize,
    pub server_errors: usize,
    /// No response at all.
    pub transport_errors: usize,
}

impl RequestMetrics {
    pub fn record(&mut self, status: Option<u16>) {
        self.sent += 1;
        match status {
            Some(s) if s < 400 => self.ok += 1,
            Some(s) if s < 500 => self.client_errors += 1,
            Some(_) => self.server_errors += 1,
            None => self.transport_errors += 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SystemMetrics {
    pub cpu_usage: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
}

#[derive(Debug, Clone, Default)]
pub struct TestMetrics {
    pub current_phase: Option<String>,
    pub sessions: SessionMetrics,
    pub phases: Vec<PhaseMetrics>,
    pub requests: RequestMetrics,
    pub requests_by_name: BTreeMap<String, RequestMetrics>,
    pub records_sent: usize,
    pub system: SystemMetrics,
}

impl TestMetrics {
    pub fn phase(&self, name: &str) -> Option<&SessionMetrics> {
        self.phases.iter().find(|p| p.name == name).map(|p| &p.sessions)
    }

    pub(crate) fn phase_mut(&mut self, name: &str) -> &mut SessionMetrics {
        let index = match self.phases.iter().position(|p| p.name == name) {
            Some(index) => index,
            None => {
                self.phases.push(PhaseMetrics {
                    name: name.to_string(),
                    sessions: SessionMetrics::default(),
                });
                self.phases.len() - 1
            }
        };
        &mut self.phases[index].sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_status_classes() {
        let mut metrics = RequestMetrics::default();
        for status in [Some(200), Some(201), Some(404), Some(409), Some(503), None] {
            metrics.record(status);
        }
        assert_eq!(
            metrics,
            RequestMetrics {
                sent: 6,
                ok: 2,
                client_errors: 2,
                server_errors: 1,
                transport_errors: 1,
            }
        );
    }

    #[test]
    fn phases_keep_run_order() {
        let mut metrics = TestMetrics::default();
        metrics.phase_mut("setup").started += 1;
        metrics.phase_mut("registration").started += 1;
        metrics.phase_mut("setup").completed += 1;
        let names: Vec<_> = metrics.phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["setup", "registration"]);
        assert_eq!(metrics.phase("setup").map(|s| s.completed), Some(1));
        assert!(metrics.phase("ingestion").is_none());
    }
}
