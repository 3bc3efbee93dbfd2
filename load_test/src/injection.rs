//! Injection profiles and the executors that start sessions from them.
//!
//! An open profile schedules session arrivals regardless of how many are
//! still running. A closed profile keeps the number of running sessions at a
//! target that varies over time; sessions above the target are left to
//! finish on their own.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval, Instant, MissedTickBehavior};

use loadtest_core::{LoadTestError, LoadTestResult};

use crate::metrics::MetricsCollector;
use crate::orchestrator::FailurePolicy;

/// Period at which the closed executor compares running sessions to target.
pub const CLOSED_TICK: Duration = Duration::from_millis(100);

/// Upper bound on the sessions one open profile may schedule.
pub const MAX_OPEN_ARRIVALS: usize = 10_000_000;

/// Upper bound on the length of one profile.
pub const MAX_PROFILE_SECONDS: u64 = 30 * 24 * 3600;

/// Upper bound on the levels of one increment step.
pub const MAX_INCREMENT_LEVELS: usize = 10_000;

/// One session of a phase, started with its index in the phase.
pub type SessionFuture = BoxFuture<'static, LoadTestResult<()>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenStep {
    AtOnce { users: usize },
    RampUsers { users: usize, seconds: u64 },
    ConstantRate { rate: f64, seconds: u64 },
    RampRate { from: f64, to: f64, seconds: u64 },
    Nothing { seconds: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClosedStep {
    ConstantConcurrent {
        users: usize,
        seconds: u64,
    },
    RampConcurrent {
        from: usize,
        to: usize,
        seconds: u64,
    },
    IncrementConcurrent {
        increment: usize,
        times: usize,
        level_seconds: u64,
        #[serde(default)]
        ramp_seconds: u64,
        #[serde(default)]
        start_from: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", content = "steps", rename_all = "snake_case")]
pub enum InjectionProfile {
    Open(Vec<OpenStep>),
    Closed(Vec<ClosedStep>),
}

impl InjectionProfile {
    pub fn at_once(users: usize) -> Self {
        InjectionProfile::Open(vec![OpenStep::AtOnce { users }])
    }

    /// Levels `start_from + i * increment` for `i in 0..times`.
    pub fn increment_concurrent(
        increment: usize,
        times: usize,
        level_seconds: u64,
        ramp_seconds: u64,
        start_from: usize,
    ) -> Self {
        InjectionProfile::Closed(vec![ClosedStep::IncrementConcurrent {
            increment,
            times,
            level_seconds,
            ramp_seconds,
            start_from,
        }])
    }

    pub fn validate(&self) -> LoadTestResult<()> {
        let invalid = |message: String| Err(LoadTestError::InvalidArgument(message));
        match self {
            InjectionProfile::Open(steps) if steps.is_empty() => invalid("open profile without steps".into()),
            InjectionProfile::Closed(steps) if steps.is_empty() => invalid("closed profile without steps".into()),
            InjectionProfile::Open(steps) => {
                let mut arrivals = 0.0;
                let mut seconds = 0u64;
                for step in steps {
                    match step {
                        OpenStep::ConstantRate { rate, .. } if !rate.is_finite() || *rate < 0.0 => {
                            return invalid(format!("arrival rate must be >= 0, got {}", rate));
                        }
                        OpenStep::RampRate { from, to, .. }
                            if !from.is_finite() || !to.is_finite() || *from < 0.0 || *to < 0.0 =>
                        {
                            return invalid(format!("arrival rates must be >= 0, got {} to {}", from, to));
                        }
                        _ => {}
                    }
                    arrivals += step.expected_arrivals();
                    seconds = seconds.saturating_add(step.seconds());
                }
                if arrivals > MAX_OPEN_ARRIVALS as f64 {
                    return invalid(format!(
                        "open profile schedules about {} sessions, more than {}",
                        arrivals.ceil(),
                        MAX_OPEN_ARRIVALS
                    ));
                }
                check_length(seconds)
            }
            InjectionProfile::Closed(steps) => {
                for step in steps {
                    if let ClosedStep::IncrementConcurrent { times, .. } = step {
                        if *times > MAX_INCREMENT_LEVELS {
                            return invalid(format!("{} increment levels, more than {}", times, MAX_INCREMENT_LEVELS));
                        }
                    }
                }
                let seconds = steps
                    .iter()
                    .fold(0u64, |total, step| total.saturating_add(step.seconds()));
                check_length(seconds)
            }
        }
    }

    pub fn plan(&self) -> InjectionPlan {
        match self {
            InjectionProfile::Open(steps) => InjectionPlan::Open(OpenPlan::from_steps(steps)),
            InjectionProfile::Closed(steps) => InjectionPlan::Closed(ClosedPlan::from_steps(steps)),
        }
    }
}

fn check_length(seconds: u64) -> LoadTestResult<()> {
    if seconds > MAX_PROFILE_SECONDS {
        return Err(LoadTestError::InvalidArgument(format!(
            "profile lasts {}s, more than {}s",
            seconds, MAX_PROFILE_SECONDS
        )));
    }
    Ok(())
}

impl OpenStep {
    fn seconds(&self) -> u64 {
        match *self {
            OpenStep::AtOnce { .. } => 0,
            OpenStep::RampUsers { seconds, .. }
            | OpenStep::ConstantRate { seconds, .. }
            | OpenStep::RampRate { seconds, .. }
            | OpenStep::Nothing { seconds } => seconds,
        }
    }

    fn expected_arrivals(&self) -> f64 {
        match *self {
            OpenStep::AtOnce { users } | OpenStep::RampUsers { users, .. } => users as f64,
            OpenStep::ConstantRate { rate, seconds } => rate * seconds as f64,
            OpenStep::RampRate { from, to, seconds } => (from + to) / 2.0 * seconds as f64,
            OpenStep::Nothing { .. } => 0.0,
        }
    }
}

impl ClosedStep {
    fn seconds(&self) -> u64 {
        match *self {
            ClosedStep::ConstantConcurrent { seconds, .. } | ClosedStep::RampConcurrent { seconds, .. } => seconds,
            ClosedStep::IncrementConcurrent {
                times,
                level_seconds,
                ramp_seconds,
                ..
            } => {
                let times = times as u64;
                times
                    .saturating_mul(level_seconds)
                    .saturating_add(times.saturating_sub(1).saturating_mul(ramp_seconds))
            }
        }
    }
}

impl fmt::Display for OpenStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenStep::AtOnce { users } => write!(f, "{} users at once", users),
            OpenStep::RampUsers { users, seconds } => write!(f, "{} users over {}s", users, seconds),
            OpenStep::ConstantRate { rate, seconds } => write!(f, "{} users/s for {}s", rate, seconds),
            OpenStep::RampRate { from, to, seconds } => {
                write!(f, "{} to {} users/s over {}s", from, to, seconds)
            }
            OpenStep::Nothing { seconds } => write!(f, "pause {}s", seconds),
        }
    }
}

/// Arrival offsets of an open profile, relative to the phase start.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPlan {
    steps: Vec<OpenStep>,
    arrivals: Vec<Duration>,
    duration: Duration,
}

impl OpenPlan {
    pub fn from_steps(steps: &[OpenStep]) -> Self {
        let mut arrivals = Vec::new();
        let mut offset = Duration::ZERO;
        for step in steps {
            let (step_arrivals, length) = open_step_arrivals(step);
            arrivals.extend(step_arrivals.into_iter().map(|a| offset + a));
            offset += length;
        }
        Self {
            steps: steps.to_vec(),
            arrivals,
            duration: offset,
        }
    }

    pub fn arrivals(&self) -> &[Duration] {
        &self.arrivals
    }

    pub fn users(&self) -> usize {
        self.arrivals.len()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

fn open_step_arrivals(step: &OpenStep) -> (Vec<Duration>, Duration) {
    match *step {
        OpenStep::AtOnce { users } => (vec![Duration::ZERO; users], Duration::ZERO),
        OpenStep::RampUsers { users, seconds } => {
            let length = Duration::from_secs(seconds);
            let arrivals = (0..users)
                .map(|i| length.mul_f64(i as f64 / users as f64))
                .collect();
            (arrivals, length)
        }
        OpenStep::ConstantRate { rate, seconds } => ramp_rate_arrivals(rate, rate, seconds),
        OpenStep::RampRate { from, to, seconds } => ramp_rate_arrivals(from, to, seconds),
        OpenStep::Nothing { seconds } => (Vec::new(), Duration::from_secs(seconds)),
    }
}

/// Arrival n happens when the integrated rate reaches n.
fn ramp_rate_arrivals(from: f64, to: f64, seconds: u64) -> (Vec<Duration>, Duration) {
    let length = Duration::from_secs(seconds);
    let total = seconds as f64;
    if total <= 0.0 || (from <= 0.0 && to <= 0.0) {
        return (Vec::new(), length);
    }
    // rate(t) = from + slope * t, cumulative(t) = from * t + slope * t^2 / 2
    let slope = (to - from) / total;
    let expected = ((from + to) / 2.0 * total).ceil() as usize;
    let mut arrivals = Vec::with_capacity(expected.min(MAX_OPEN_ARRIVALS));
    for n in 0..=expected {
        let n = n as f64;
        let at = if slope.abs() < f64::EPSILON {
            n / from
        } else {
            let discriminant = from * from + 2.0 * slope * n;
            if discriminant < 0.0 {
                break;
            }
            (discriminant.sqrt() - from) / slope
        };
        if !at.is_finite() || at >= total {
            break;
        }
        arrivals.push(Duration::from_secs_f64(at.max(0.0)));
    }
    (arrivals, length)
}

/// A stretch of a closed profile; `from == to` holds a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosedStage {
    pub from: usize,
    pub to: usize,
    pub duration: Duration,
}

impl ClosedStage {
    pub fn hold(users: usize, duration: Duration) -> Self {
        Self {
            from: users,
            to: users,
            duration,
        }
    }

    pub fn ramp(from: usize, to: usize, duration: Duration) -> Self {
        Self { from, to, duration }
    }

    pub fn is_hold(&self) -> bool {
        self.from == self.to
    }

    fn target_at(&self, offset: Duration) -> usize {
        if self.is_hold() || self.duration.is_zero() {
            return self.to;
        }
        let fraction = (offset.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0);
        let delta = self.to as f64 - self.from as f64;
        (self.from as f64 + delta * fraction).round() as usize
    }
}

impl fmt::Display for ClosedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_hold() {
            write!(f, "hold {} users for {}s", self.to, self.duration.as_secs())
        } else {
            write!(f, "ramp {} -> {} users over {}s", self.from, self.to, self.duration.as_secs())
        }
    }
}

/// Target concurrency of a closed profile over time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedPlan {
    stages: Vec<ClosedStage>,
}

impl ClosedPlan {
    pub fn from_steps(steps: &[ClosedStep]) -> Self {
        let mut stages = Vec::new();
        for step in steps {
            match *step {
                ClosedStep::ConstantConcurrent { users, seconds } => {
                    stages.push(ClosedStage::hold(users, Duration::from_secs(seconds)));
                }
                ClosedStep::RampConcurrent { from, to, seconds } => {
                    stages.push(ClosedStage::ramp(from, to, Duration::from_secs(seconds)));
                }
                ClosedStep::IncrementConcurrent {
                    increment,
                    times,
                    level_seconds,
                    ramp_seconds,
                    start_from,
                } => {
                    let mut previous: Option<usize> = None;
                    for i in 0..times {
                        let level = start_from + i * increment;
                        if let Some(previous) = previous {
                            if ramp_seconds > 0 {
                                stages.push(ClosedStage::ramp(previous, level, Duration::from_secs(ramp_seconds)));
                            }
                        }
                        stages.push(ClosedStage::hold(level, Duration::from_secs(level_seconds)));
                        previous = Some(level);
                    }
                }
            }
        }
        Self { stages }
    }

    pub fn stages(&self) -> &[ClosedStage] {
        &self.stages
    }

    /// Held levels and how long each lasts.
    pub fn levels(&self) -> Vec<(usize, Duration)> {
        self.stages
            .iter()
            .filter(|s| s.is_hold())
            .map(|s| (s.to, s.duration))
            .collect()
    }

    pub fn duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    pub fn max_users(&self) -> usize {
        self.stages.iter().map(|s| s.from.max(s.to)).max().unwrap_or(0)
    }

    /// Target at `elapsed` since the phase start, `None` once the plan ended.
    pub fn target_at(&self, elapsed: Duration) -> Option<usize> {
        let mut start = Duration::ZERO;
        for stage in &self.stages {
            let end = start + stage.duration;
            if elapsed < end {
                return Some(stage.target_at(elapsed - start));
            }
            start = end;
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InjectionPlan {
    Open(OpenPlan),
    Closed(ClosedPlan),
}

impl InjectionPlan {
    pub fn duration(&self) -> Duration {
        match self {
            InjectionPlan::Open(plan) => plan.duration(),
            InjectionPlan::Closed(plan) => plan.duration(),
        }
    }
}

impl fmt::Display for InjectionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionPlan::Open(plan) => {
                writeln!(
                    f,
                    "open model: {} sessions over {}s",
                    plan.users(),
                    plan.duration().as_secs()
                )?;
                for step in &plan.steps {
                    writeln!(f, "  - {}", step)?;
                }
            }
            InjectionPlan::Closed(plan) => {
                writeln!(
                    f,
                    "closed model: up to {} concurrent sessions over {}s",
                    plan.max_users(),
                    plan.duration().as_secs()
                )?;
                for stage in plan.stages() {
                    writeln!(f, "  - {}", stage)?;
                }
            }
        }
        Ok(())
    }
}

/// Counts of one phase's injection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectionOutcome {
    pub started: usize,
    pub completed: usize,
    pub failed: usize,
    pub max_in_flight: usize,
    /// Injection stopped early under the failure policy.
    pub aborted: bool,
}

type Finished = (usize, u64, LoadTestResult<()>);

struct Injector<'a, F> {
    phase: &'a str,
    policy: FailurePolicy,
    metrics: &'a MetricsCollector,
    factory: F,
    sessions: JoinSet<Finished>,
    outcome: InjectionOutcome,
}

/// Starts the sessions of one phase and waits for every one of them.
pub async fn inject<F>(
    phase: &str,
    profile: &InjectionProfile,
    policy: FailurePolicy,
    metrics: &MetricsCollector,
    factory: F,
) -> InjectionOutcome
where
    F: FnMut(usize) -> SessionFuture,
{
    let mut injector = Injector {
        phase,
        policy,
        metrics,
        factory,
        sessions: JoinSet::new(),
        outcome: InjectionOutcome::default(),
    };
    match profile.plan() {
        InjectionPlan::Open(plan) => injector.run_open(&plan).await,
        InjectionPlan::Closed(plan) => injector.run_closed(&plan).await,
    }
    injector.drain().await;
    injector.outcome
}

impl<F> Injector<'_, F>
where
    F: FnMut(usize) -> SessionFuture,
{
    async fn run_open(&mut self, plan: &OpenPlan) {
        let start = Instant::now();
        for offset in plan.arrivals() {
            self.reap_until(start + *offset).await;
            if self.outcome.aborted {
                return;
            }
            self.spawn();
        }
        // trailing pauses
        self.reap_until(start + plan.duration()).await;
    }

    async fn run_closed(&mut self, plan: &ClosedPlan) {
        let start = Instant::now();
        let mut ticker = interval(CLOSED_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            while let Some(joined) = self.sessions.try_join_next() {
                self.record(joined);
            }
            if self.outcome.aborted {
                return;
            }
            let Some(target) = plan.target_at(start.elapsed()) else {
                return;
            };
            for _ in self.sessions.len()..target {
                self.spawn();
            }
        }
    }

    async fn reap_until(&mut self, deadline: Instant) {
        loop {
            if self.sessions.is_empty() {
                tokio::time::sleep_until(deadline).await;
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return,
                Some(joined) = self.sessions.join_next() => {
                    self.record(joined);
                    if self.outcome.aborted {
                        return;
                    }
                }
            }
        }
    }

    async fn drain(&mut self) {
        if !self.sessions.is_empty() {
            tracing::info!(
                phase = self.phase,
                in_flight = self.sessions.len(),
                "injection finished, waiting for running sessions"
            );
        }
        while let Some(joined) = self.sessions.join_next().await {
            self.record(joined);
        }
    }

    fn spawn(&mut self) {
        let index = self.outcome.started;
        self.outcome.started += 1;
        self.metrics.session_started(self.phase);

        let session = (self.factory)(index);
        self.sessions.spawn(async move {
            let start = Instant::now();
            let result = session.await;
            (index, start.elapsed().as_millis() as u64, result)
        });
        self.outcome.max_in_flight = self.outcome.max_in_flight.max(self.sessions.len());
    }

    fn record(&mut self, joined: Result<Finished, JoinError>) {
        match joined {
            Ok((_, duration_ms, Ok(()))) => {
                self.outcome.completed += 1;
                self.metrics.session_completed(self.phase, duration_ms);
            }
            Ok((index, duration_ms, Err(e))) => {
                tracing::error!(phase = self.phase, session = index, error = %e, "session failed");
                self.outcome.failed += 1;
                self.metrics.session_failed(self.phase, duration_ms);
            }
            Err(e) => {
                tracing::error!(phase = self.phase, error = %e, "session task panicked");
                self.outcome.failed += 1;
                self.metrics.session_failed(self.phase, 0);
            }
        }

        if !self.outcome.aborted && self.policy.should_abort(self.outcome.failed) {
            tracing::warn!(
                phase = self.phase,
                failed = self.outcome.failed,
                "failure threshold reached, injection stopped"
            );
            self.outcome.aborted = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use loadtest_core::DataError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn sleeping(duration: Duration) -> impl FnMut(usize) -> SessionFuture {
        move |_| {
            async move {
                tokio::time::sleep(duration).await;
                Ok(())
            }
            .boxed()
        }
    }

    #[test]
    fn increment_profile_expands_to_levels_and_ramps() {
        let plan = match InjectionProfile::increment_concurrent(5, 5, 60, 10, 5).plan() {
            InjectionPlan::Closed(plan) => plan,
            other => panic!("unexpected plan {:?}", other),
        };

        let levels: Vec<_> = plan.levels().into_iter().map(|(users, _)| users).collect();
        assert_eq!(levels, [5, 10, 15, 20, 25]);
        assert!(plan.levels().iter().all(|(_, d)| *d == secs(60)));

        let ramps: Vec<_> = plan.stages().iter().filter(|s| !s.is_hold()).collect();
        assert_eq!(ramps.len(), 4);
        assert_eq!(*ramps[0], ClosedStage::ramp(5, 10, secs(10)));
        assert_eq!(plan.duration(), secs(5 * 60 + 4 * 10));
    }

    #[test]
    fn closed_target_follows_levels_and_ramps() {
        let plan = ClosedPlan::from_steps(&[ClosedStep::IncrementConcurrent {
            increment: 5,
            times: 5,
            level_seconds: 60,
            ramp_seconds: 10,
            start_from: 5,
        }]);
        assert_eq!(plan.target_at(secs(0)), Some(5));
        assert_eq!(plan.target_at(secs(59)), Some(5));
        assert_eq!(plan.target_at(secs(65)), Some(8));
        assert_eq!(plan.target_at(secs(70)), Some(10));
        assert_eq!(plan.target_at(secs(339)), Some(25));
        assert_eq!(plan.target_at(secs(340)), None);
    }

    #[test]
    fn increment_without_ramps_jumps_between_levels() {
        let plan = ClosedPlan::from_steps(&[ClosedStep::IncrementConcurrent {
            increment: 2,
            times: 3,
            level_seconds: 10,
            ramp_seconds: 0,
            start_from: 0,
        }]);
        assert_eq!(plan.levels(), vec![(0, secs(10)), (2, secs(10)), (4, secs(10))]);
        assert_eq!(plan.stages().len(), 3);
    }

    #[test]
    fn open_steps_schedule_arrivals() {
        let plan = OpenPlan::from_steps(&[
            OpenStep::AtOnce { users: 2 },
            OpenStep::RampUsers { users: 10, seconds: 10 },
            OpenStep::Nothing { seconds: 5 },
            OpenStep::ConstantRate { rate: 2.0, seconds: 3 },
        ]);
        assert_eq!(plan.users(), 2 + 10 + 6);
        assert_eq!(plan.duration(), secs(18));
        assert_eq!(plan.arrivals()[..3], [secs(0), secs(0), secs(0)]);
        assert_eq!(plan.arrivals()[11], secs(9));
        // constant rate starts after the pause
        assert_eq!(plan.arrivals()[12], secs(15));
        assert!(plan.arrivals().windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn ramp_rate_integrates_the_rate() {
        let plan = OpenPlan::from_steps(&[OpenStep::RampRate {
            from: 0.0,
            to: 10.0,
            seconds: 10,
        }]);
        assert_eq!(plan.users(), 50);
        // arrivals get denser towards the end
        let first_gap = plan.arrivals()[1] - plan.arrivals()[0];
        let last_gap = plan.arrivals()[49] - plan.arrivals()[48];
        assert!(first_gap > last_gap);
        assert!(plan.arrivals().iter().all(|a| *a < secs(10)));
    }

    #[test]
    fn profiles_read_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            injection: InjectionProfile,
        }
        let parsed: Wrapper = toml::from_str(
            r#"
            [injection]
            model = "closed"
            steps = [
                { type = "increment_concurrent", increment = 5, times = 5, level_seconds = 60, ramp_seconds = 10, start_from = 5 },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(parsed.injection, InjectionProfile::increment_concurrent(5, 5, 60, 10, 5));
    }

    #[test]
    fn oversized_profiles_are_rejected() {
        let flood = InjectionProfile::Open(vec![OpenStep::ConstantRate {
            rate: 1e12,
            seconds: 60,
        }]);
        assert!(flood.validate().is_err());

        let endless = InjectionProfile::Open(vec![
            OpenStep::Nothing { seconds: u64::MAX },
            OpenStep::Nothing { seconds: u64::MAX },
        ]);
        assert!(endless.validate().is_err());

        let levels = InjectionProfile::increment_concurrent(1, usize::MAX, 0, 0, 0);
        assert!(levels.validate().is_err());

        let long = InjectionProfile::increment_concurrent(5, 1000, 3600, 0, 5);
        assert!(long.validate().is_err());

        assert!(InjectionProfile::increment_concurrent(50, 10, 120, 30, 50).validate().is_ok());
    }

    #[test]
    fn negative_rates_are_rejected() {
        let profile = InjectionProfile::Open(vec![OpenStep::ConstantRate { rate: -1.0, seconds: 1 }]);
        assert!(profile.validate().is_err());
        assert!(InjectionProfile::Closed(Vec::new()).validate().is_err());
        assert!(InjectionProfile::at_once(1).validate().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_executor_holds_concurrency_at_target() {
        let metrics = MetricsCollector::new();
        let profile = InjectionProfile::Closed(vec![ClosedStep::ConstantConcurrent { users: 3, seconds: 5 }]);

        let outcome = inject("ingestion", &profile, FailurePolicy::Continue, &metrics, sleeping(secs(1))).await;

        assert_eq!(outcome.max_in_flight, 3);
        assert!(outcome.started > 3);
        assert_eq!(outcome.completed, outcome.started);
        assert_eq!(metrics.get_snapshot().phase("ingestion").map(|s| s.in_flight), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn ramp_down_lets_running_sessions_finish() {
        let metrics = MetricsCollector::new();
        let profile = InjectionProfile::Closed(vec![ClosedStep::RampConcurrent { from: 4, to: 0, seconds: 2 }]);
        let start = Instant::now();

        let outcome = inject("ingestion", &profile, FailurePolicy::Continue, &metrics, sleeping(secs(5))).await;

        assert_eq!(outcome.started, 4);
        assert_eq!(outcome.completed, 4);
        assert!(start.elapsed() >= secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn open_executor_starts_every_arrival() {
        let metrics = MetricsCollector::new();
        let profile = InjectionProfile::Open(vec![OpenStep::RampUsers { users: 5, seconds: 10 }]);
        let start = Instant::now();

        let outcome = inject("registration", &profile, FailurePolicy::Continue, &metrics, sleeping(secs(30))).await;

        assert_eq!(outcome.started, 5);
        assert_eq!(outcome.max_in_flight, 5);
        assert!(start.elapsed() >= secs(8 + 30));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_stop_injection_under_abort_policy() {
        let metrics = MetricsCollector::new();
        let profile = InjectionProfile::Open(vec![OpenStep::RampUsers { users: 10, seconds: 10 }]);
        let failing = |index: usize| -> SessionFuture {
            async move { Err(DataError::new(format!("session {}", index), "login").into()) }.boxed()
        };

        let outcome = inject(
            "discovery",
            &profile,
            FailurePolicy::AbortAfter { failures: 2 },
            &metrics,
            failing,
        )
        .await;

        assert!(outcome.aborted);
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.started, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn continue_policy_runs_every_session() {
        let metrics = MetricsCollector::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let factory = move |index: usize| -> SessionFuture {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if index % 2 == 0 {
                    Err(DataError::new("ingestion", "token").into())
                } else {
                    Ok(())
                }
            }
            .boxed()
        };

        let outcome = inject("ingestion", &InjectionProfile::at_once(6), FailurePolicy::Continue, &metrics, factory).await;

        assert!(!outcome.aborted);
        assert_eq!((outcome.completed, outcome.failed), (3, 3));
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }
}
