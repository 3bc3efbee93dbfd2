//! Ordered phases with barrier semantics.
//!
//! A phase starts only after every session of the previous phase finished,
//! so whatever a phase writes to the registry cache is visible to the next.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use loadtest_core::{LoadTestError, LoadTestResult};

use crate::context::RunContext;
use crate::injection::{inject, InjectionOutcome, InjectionProfile, SessionFuture};
use crate::metrics::MetricsCollector;
use crate::scenarios::Scenario;
use crate::session::SessionContext;

/// What a phase does once its sessions start failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Failed sessions are counted and the phase runs to its end.
    #[default]
    Continue,
    /// Stop injecting after this many failed sessions and end the run once
    /// the running ones finished.
    AbortAfter { failures: usize },
}

impl FailurePolicy {
    pub fn should_abort(&self, failed: usize) -> bool {
        match *self {
            FailurePolicy::Continue => false,
            FailurePolicy::AbortAfter { failures } => failed >= failures.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    pub name: String,
    pub scenario: Scenario,
    pub injection: InjectionProfile,
    pub failure_policy: FailurePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub name: String,
    pub outcome: InjectionOutcome,
    pub elapsed: Duration,
}

/// Runs phases in order, each session built by `runner`.
///
/// Returns [`LoadTestError::PhaseAborted`] when a phase hit its failure
/// policy; later phases are not started.
pub async fn run_phases<R>(
    phases: &[Phase],
    metrics: &MetricsCollector,
    mut runner: R,
) -> LoadTestResult<Vec<PhaseReport>>
where
    R: FnMut(&Phase, SessionContext) -> SessionFuture,
{
    for phase in phases {
        phase.injection.validate()?;
    }

    let mut reports = Vec::with_capacity(phases.len());
    for phase in phases {
        tracing::info!(phase = %phase.name, scenario = %phase.scenario, "phase starting");
        metrics.phase_started(&phase.name);
        let started = Instant::now();

        let outcome = inject(&phase.name, &phase.injection, phase.failure_policy, metrics, |index| {
            runner(phase, SessionContext::new(phase.name.as_str(), index))
        })
        .await;

        tracing::info!(
            phase = %phase.name,
            started = outcome.started,
            completed = outcome.completed,
            failed = outcome.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "phase finished"
        );

        if outcome.aborted {
            return Err(LoadTestError::PhaseAborted {
                phase: phase.name.clone(),
                failures: outcome.failed,
            });
        }
        reports.push(PhaseReport {
            name: phase.name.clone(),
            outcome,
            elapsed: started.elapsed(),
        });
    }
    Ok(reports)
}

/// Runs the scenarios of a [`RunContext`].
#[derive(Debug, Clone)]
pub struct PhaseOrchestrator {
    context: Arc<RunContext>,
}

impl PhaseOrchestrator {
    pub fn new(context: Arc<RunContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.context
    }

    pub async fn run(&self, phases: &[Phase]) -> LoadTestResult<Vec<PhaseReport>> {
        let metrics = self.context.metrics.clone();
        run_phases(phases, &metrics, |phase, mut session| {
            let context = self.context.clone();
            let scenario = phase.scenario;
            async move { scenario.run(&context, &mut session).await }.boxed()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadtest_core::{is_phase_aborted, DataError};
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Start(String),
        End(String),
    }

    fn phase(name: &str, scenario: Scenario, sessions: usize, failure_policy: FailurePolicy) -> Phase {
        Phase {
            name: name.to_string(),
            scenario,
            injection: InjectionProfile::at_once(sessions),
            failure_policy,
        }
    }

    fn recording(events: Arc<Mutex<Vec<Event>>>) -> impl FnMut(&Phase, SessionContext) -> SessionFuture {
        move |_, session| {
            let events = events.clone();
            async move {
                let phase = session.phase().to_string();
                events.lock().push(Event::Start(phase.clone()));
                // later sessions finish first
                let delay = 50 - 10 * session.index() as u64;
                tokio::time::sleep(Duration::from_millis(delay)).await;
                events.lock().push(Event::End(phase.clone()));
                if phase == "discovery" {
                    return Err(DataError::new(session.label(), "registered subject").into());
                }
                Ok(())
            }
            .boxed()
        }
    }

    #[test]
    fn abort_threshold() {
        assert!(!FailurePolicy::Continue.should_abort(100));
        assert!(FailurePolicy::AbortAfter { failures: 1 }.should_abort(1));
        assert!(!FailurePolicy::AbortAfter { failures: 3 }.should_abort(2));
        assert!(FailurePolicy::AbortAfter { failures: 0 }.should_abort(1));
    }

    #[tokio::test(start_paused = true)]
    async fn phases_are_separated_by_a_barrier() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let phases = [
            phase("setup", Scenario::Setup, 1, FailurePolicy::AbortAfter { failures: 1 }),
            phase("registration", Scenario::Registration, 4, FailurePolicy::Continue),
            phase("ingestion", Scenario::Ingestion, 3, FailurePolicy::Continue),
        ];

        let reports = run_phases(&phases, &MetricsCollector::new(), recording(events.clone()))
            .await
            .unwrap();

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[1].outcome.completed, 4);
        let events = events.lock();
        let last_registration_end = events
            .iter()
            .rposition(|e| *e == Event::End("registration".into()))
            .unwrap();
        let first_ingestion_start = events
            .iter()
            .position(|e| *e == Event::Start("ingestion".into()))
            .unwrap();
        assert!(last_registration_end < first_ingestion_start);
        assert_eq!(events.len(), 2 * (1 + 4 + 3));
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_phase_ends_the_run() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let phases = [
            phase("discovery", Scenario::Discovery, 1, FailurePolicy::AbortAfter { failures: 1 }),
            phase("ingestion", Scenario::Ingestion, 3, FailurePolicy::Continue),
        ];

        let err = run_phases(&phases, &MetricsCollector::new(), recording(events.clone()))
            .await
            .unwrap_err();

        assert!(is_phase_aborted(&err));
        assert!(!events.lock().contains(&Event::Start("ingestion".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_under_continue_do_not_stop_the_run() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let phases = [
            phase("discovery", Scenario::Discovery, 2, FailurePolicy::Continue),
            phase("ingestion", Scenario::Ingestion, 1, FailurePolicy::Continue),
        ];

        let reports = run_phases(&phases, &MetricsCollector::new(), recording(events))
            .await
            .unwrap();
        assert_eq!(reports[0].outcome.failed, 2);
        assert_eq!(reports[1].outcome.completed, 1);
    }

    #[tokio::test]
    async fn invalid_profile_is_rejected_before_any_session() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let phases = [Phase {
            injection: InjectionProfile::Closed(Vec::new()),
            ..phase("ingestion", Scenario::Ingestion, 1, FailurePolicy::Continue)
        }];

        assert!(run_phases(&phases, &MetricsCollector::new(), recording(events.clone()))
            .await
            .is_err());
        assert!(events.lock().is_empty());
    }
}
