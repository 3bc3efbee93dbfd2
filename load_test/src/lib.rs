//! Multi-phase load test of the RADAR-base platform.
//!
//! A run sequences four phases: setup of the project, registration of the
//! participants, discovery of the topic schemas and ingestion of synthetic
//! questionnaires. Each phase injects sessions with its own profile and
//! starts only after the previous one finished.

pub mod cli;
pub mod config;
pub mod context;
pub mod feeds;
pub mod injection;
pub mod metrics;
pub mod orchestrator;
pub mod scenarios;
pub mod session;

pub use config::RunConfig;
pub use context::RunContext;
pub use feeds::{Feed, FeedStrategy, SubjectRecord, TopicRecord};
pub use injection::{ClosedStep, InjectionOutcome, InjectionPlan, InjectionProfile, OpenStep};
pub use metrics::MetricsCollector;
pub use orchestrator::{run_phases, FailurePolicy, Phase, PhaseOrchestrator, PhaseReport};
pub use scenarios::Scenario;
pub use session::SessionContext;
