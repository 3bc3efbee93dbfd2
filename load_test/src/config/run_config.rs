//! Run configuration read from a TOML file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use loadtest_client::{BrokerCredentials, ClientCredentials, ClientOptions, RetryOptions};
use loadtest_codec::{DEFAULT_API_VERSION, DEFAULT_MAX_JITTER_SECONDS, DEFAULT_STEP_SECONDS, MIN_STEP_SECONDS};
use loadtest_core::{LoadTestError, LoadTestResult, WireFormat};

use super::injection_profiles::{get_ingestion_profile, DEFAULT_INGESTION_PROFILE};
use crate::feeds::FeedStrategy;
use crate::injection::InjectionProfile;
use crate::orchestrator::{FailurePolicy, Phase};
use crate::scenarios::Scenario;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Base URL all three services live under.
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
    pub credentials: CredentialsConfig,
    pub organization_name: String,
    pub project_name: String,
    /// Subjects registered in the registration phase.
    pub participants: usize,
    pub data: DataConfig,
    pub feeds: FeedsConfig,
    pub phases: PhasesConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
            request_timeout_secs: 30,
            retry: RetryConfig::default(),
            credentials: CredentialsConfig::default(),
            organization_name: "radar-load-test".to_string(),
            project_name: "radar-load-test".to_string(),
            participants: 10,
            data: DataConfig::default(),
            feeds: FeedsConfig::default(),
            phases: PhasesConfig::default(),
        }
    }
}

/// Retries of idempotent requests on connection failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// 1 disables retries.
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
    pub backoff_coefficient: f64,
    pub maximum_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_interval_ms: 200,
            backoff_coefficient: 2.0,
            maximum_interval_ms: 5_000,
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialsConfig {
    pub client_id: String,
    pub client_secret: String,
    pub admin_username: String,
    pub admin_password: String,
    /// App client subjects are paired with.
    pub pairing_client_id: String,
    pub pairing_client_secret: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            client_id: "ManagementPortalapp".to_string(),
            client_secret: String::new(),
            admin_username: "admin".to_string(),
            admin_password: "admin".to_string(),
            pairing_client_id: "aRMT".to_string(),
            pairing_client_secret: String::new(),
        }
    }
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("client_id", &self.client_id)
            .field("admin_username", &self.admin_username)
            .field("pairing_client_id", &self.pairing_client_id)
            .finish_non_exhaustive()
    }
}

/// Shape of the ingested data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    pub topic: String,
    pub format: WireFormat,
    pub api_version: u32,
    /// Registry version of the key and value subjects.
    pub schema_version: u32,
    /// Questionnaires per gateway request.
    pub messages_per_request: usize,
    pub answers_per_message: usize,
    pub step_seconds: f64,
    pub max_jitter_seconds: u32,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            topic: "questionnaire_response".to_string(),
            format: WireFormat::Json,
            api_version: DEFAULT_API_VERSION,
            schema_version: 1,
            messages_per_request: 10,
            answers_per_message: 10,
            step_seconds: DEFAULT_STEP_SECONDS,
            max_jitter_seconds: DEFAULT_MAX_JITTER_SECONDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedsConfig {
    /// CSV with an `externalId` column.
    pub subjects: PathBuf,
    pub subjects_strategy: FeedStrategy,
    /// CSV with a `topic` column.
    pub topics: PathBuf,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            subjects: PathBuf::from("users.csv"),
            subjects_strategy: FeedStrategy::Queue,
            topics: PathBuf::from("topics.csv"),
        }
    }
}

/// Optional overrides of one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhaseConfig {
    pub enabled: bool,
    pub injection: Option<InjectionProfile>,
    /// Named profile, used when `injection` is absent.
    pub profile: Option<String>,
    pub failure_policy: Option<FailurePolicy>,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            injection: None,
            profile: None,
            failure_policy: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhasesConfig {
    pub setup: PhaseConfig,
    pub registration: PhaseConfig,
    pub discovery: PhaseConfig,
    pub ingestion: PhaseConfig,
}

impl RunConfig {
    /// Reads the file at `path`, or the defaults when there is none.
    pub fn load(path: Option<&Path>) -> LoadTestResult<Self> {
        let config = match path {
            Some(path) => {
                let source = std::fs::read_to_string(path)
                    .map_err(|e| LoadTestError::Config(format!("cannot read {}: {}", path.display(), e)))?;
                Self::parse(&source)?
            }
            None => Self::default(),
        };
        Ok(config)
    }

    pub fn parse(source: &str) -> LoadTestResult<Self> {
        toml::from_str(source).map_err(|e| LoadTestError::Config(e.to_string()))
    }

    pub fn validate(&self) -> LoadTestResult<()> {
        let invalid = |message: &str| Err(LoadTestError::Config(message.to_string()));
        if self.participants == 0 {
            return invalid("participants must be at least 1");
        }
        if self.data.api_version == 0 {
            return invalid("data.api_version must be at least 1");
        }
        if !self.data.step_seconds.is_finite() || self.data.step_seconds <= 0.0 {
            return invalid("data.step_seconds must be positive");
        }
        if self.data.step_seconds < MIN_STEP_SECONDS {
            return invalid("data.step_seconds is below the timestamp resolution");
        }
        if self.data.topic.is_empty() {
            return invalid("data.topic must not be empty");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if self.request_timeout_secs == 0 {
            return invalid("request_timeout_secs must be at least 1");
        }
        if !self.retry.backoff_coefficient.is_finite() || self.retry.backoff_coefficient < 1.0 {
            return invalid("retry.backoff_coefficient must be a finite number of at least 1");
        }
        if self.retry.initial_interval_ms > self.retry.maximum_interval_ms {
            return invalid("retry.initial_interval_ms must not exceed retry.maximum_interval_ms");
        }
        for phase in self.phases() {
            phase
                .injection
                .validate()
                .map_err(|e| LoadTestError::Config(format!("phase {}: {}", phase.name, e)))?;
        }
        Ok(())
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.base_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            retry: RetryOptions {
                max_attempts: self.retry.max_attempts,
                initial_interval: Duration::from_millis(self.retry.initial_interval_ms),
                backoff_coefficient: self.retry.backoff_coefficient,
                maximum_interval: Duration::from_millis(self.retry.maximum_interval_ms),
            },
            ..ClientOptions::default()
        }
    }

    pub fn broker_credentials(&self) -> BrokerCredentials {
        let credentials = &self.credentials;
        BrokerCredentials {
            admin_client: ClientCredentials::new(&credentials.client_id, &credentials.client_secret),
            admin_username: credentials.admin_username.clone(),
            admin_password: credentials.admin_password.clone(),
            pairing_client: ClientCredentials::new(
                &credentials.pairing_client_id,
                &credentials.pairing_client_secret,
            ),
        }
    }

    /// Enabled phases in run order, with defaults filled in.
    pub fn phases(&self) -> Vec<Phase> {
        let phases = &self.phases;
        [
            (Scenario::Setup, &phases.setup, InjectionProfile::at_once(1), FailurePolicy::AbortAfter { failures: 1 }),
            (
                Scenario::Registration,
                &phases.registration,
                InjectionProfile::at_once(self.participants),
                FailurePolicy::Continue,
            ),
            (Scenario::Discovery, &phases.discovery, InjectionProfile::at_once(1), FailurePolicy::AbortAfter { failures: 1 }),
            (
                Scenario::Ingestion,
                &phases.ingestion,
                get_ingestion_profile(DEFAULT_INGESTION_PROFILE),
                FailurePolicy::Continue,
            ),
        ]
        .into_iter()
        .filter(|(_, config, _, _)| config.enabled)
        .map(|(scenario, config, default_injection, default_policy)| Phase {
            name: scenario.name().to_string(),
            scenario,
            injection: config
                .injection
                .clone()
                .or_else(|| config.profile.as_deref().map(get_ingestion_profile))
                .unwrap_or(default_injection),
            failure_policy: config.failure_policy.unwrap_or(default_policy),
        })
        .collect()
    }
}
