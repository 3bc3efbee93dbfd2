//! State shared by every session of a run.

use std::sync::Arc;

use loadtest_client::{BoxedTransport, PlatformClients, ReqwestTransport, ResourceEnsurer, TokenBroker};
use loadtest_codec::{PayloadEncoder, QuestionnaireGenerator};
use loadtest_core::{LoadTestError, LoadTestResult, RegistryCache};

use crate::config::RunConfig;
use crate::feeds::{Feed, FeedStrategy, SubjectRecord, TopicRecord};
use crate::metrics::{InstrumentedTransport, MetricsCollector};

/// Everything a session can reach besides its own [`SessionContext`].
///
/// Built once at run start; the registry cache lives exactly as long as the
/// run does.
///
/// [`SessionContext`]: crate::session::SessionContext
pub struct RunContext {
    pub config: RunConfig,
    pub cache: Arc<RegistryCache>,
    pub clients: PlatformClients,
    pub broker: TokenBroker,
    pub ensurer: ResourceEnsurer,
    pub encoder: PayloadEncoder,
    pub generator: QuestionnaireGenerator,
    pub subjects: Feed<SubjectRecord>,
    pub topics: Feed<TopicRecord>,
    pub metrics: MetricsCollector,
}

impl RunContext {
    /// Context over the given transport. Requests are counted in `metrics`.
    pub fn new(
        config: RunConfig,
        transport: BoxedTransport,
        subjects: Feed<SubjectRecord>,
        topics: Feed<TopicRecord>,
        metrics: MetricsCollector,
    ) -> LoadTestResult<Self> {
        config.validate()?;
        if subjects.len() < config.participants {
            return Err(LoadTestError::Config(format!(
                "{} participants requested but feed {} holds {} subjects",
                config.participants,
                subjects.name(),
                subjects.len()
            )));
        }
        let subjects = subjects.truncate(config.participants);
        if !topics.records().iter().any(|t| t.topic == config.data.topic) {
            tracing::warn!(
                topic = %config.data.topic,
                feed = topics.name(),
                "ingestion topic is not in the topics feed, its schemas will not be resolved"
            );
        }

        let options = config.client_options();
        let transport: BoxedTransport = Arc::new(InstrumentedTransport::new(transport, metrics.clone()));
        let clients = PlatformClients::new(transport, &options);
        let cache = Arc::new(RegistryCache::new());
        let broker = TokenBroker::new(clients.management.clone(), cache.clone(), config.broker_credentials());
        let generator = QuestionnaireGenerator::new(config.data.step_seconds, config.data.max_jitter_seconds)?;

        Ok(Self {
            ensurer: ResourceEnsurer::new(cache.clone()),
            encoder: PayloadEncoder::new(config.data.api_version),
            cache,
            clients,
            broker,
            generator,
            subjects,
            topics,
            metrics,
            config,
        })
    }

    /// Context over HTTP, with the feeds read from the configured files.
    pub fn from_config(config: RunConfig, metrics: MetricsCollector) -> LoadTestResult<Self> {
        let subjects = Feed::from_path(&config.feeds.subjects, config.feeds.subjects_strategy)?;
        let topics = Feed::from_path(&config.feeds.topics, FeedStrategy::Queue)?;
        let transport: BoxedTransport = Arc::new(ReqwestTransport::new(config.client_options())?);
        Self::new(config, transport, subjects, topics, metrics)
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("base_url", &self.config.base_url)
            .field("subjects", &self.subjects.len())
            .field("topics", &self.topics.len())
            .finish_non_exhaustive()
    }
}
