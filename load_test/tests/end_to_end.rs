//! Full runs against the in-memory platform.

use std::sync::Arc;

use load_test::{
    Feed, FeedStrategy, InjectionProfile, MetricsCollector, PhaseOrchestrator, RunConfig, RunContext,
    SubjectRecord, TopicRecord,
};
use loadtest_core::{is_phase_aborted, LoadTestError, ResourceKind, WireFormat};
use loadtest_testsuite::{
    admin_client, pairing_client, FakePlatform, EVOLVED_QUESTIONNAIRE_SCHEMA, QUESTIONNAIRE_TOPIC,
};

fn config(participants: usize, format: WireFormat) -> RunConfig {
    let mut config = RunConfig::default();
    config.participants = participants;
    config.credentials.client_secret = admin_client().client_secret;
    config.credentials.pairing_client_secret = pairing_client().client_secret;
    config.data.format = format;
    config.data.messages_per_request = 2;
    config.data.answers_per_message = 3;
    config.phases.ingestion.injection = Some(InjectionProfile::at_once(6));
    config
}

fn context(platform: &Arc<FakePlatform>, config: RunConfig) -> Arc<RunContext> {
    let subjects = (0..config.participants)
        .map(|i| SubjectRecord {
            external_id: format!("participant-{}", i),
        })
        .collect();
    let topics = vec![TopicRecord {
        topic: QUESTIONNAIRE_TOPIC.to_string(),
    }];
    Arc::new(
        RunContext::new(
            config,
            platform.clone(),
            Feed::new("users", subjects, FeedStrategy::Queue),
            Feed::new("topics", topics, FeedStrategy::Queue),
            MetricsCollector::new(),
        )
        .unwrap(),
    )
}

async fn run(context: &Arc<RunContext>) -> Result<Vec<load_test::PhaseReport>, LoadTestError> {
    let phases = context.config.phases();
    PhaseOrchestrator::new(context.clone()).run(&phases).await
}

async fn full_run(format: WireFormat) {
    let platform = Arc::new(FakePlatform::new());
    let context = context(&platform, config(3, format));

    let reports = run(&context).await.unwrap();

    let names: Vec<_> = reports.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["setup", "registration", "discovery", "ingestion"]);
    assert!(reports.iter().all(|r| r.outcome.failed == 0));
    assert_eq!(reports[1].outcome.completed, 3);

    // one organization, one project, three source types, three sources per subject
    assert_eq!(platform.entity_count(), (1, 1, 3, 9, 3));
    assert_eq!(context.cache.subject_count(), 3);
    assert_eq!(platform.request_count("Refresh token"), 2 * 3);

    let ids = context.cache.schema_ids(QUESTIONNAIRE_TOPIC).unwrap();
    assert_eq!(Some(ids.key), platform.schema_id(QUESTIONNAIRE_TOPIC, loadtest_core::Direction::Key));
    assert_eq!(Some(ids.value), platform.schema_id(QUESTIONNAIRE_TOPIC, loadtest_core::Direction::Value));

    let batches = platform.received();
    assert_eq!(batches.len(), 6);
    assert!(batches.iter().all(|b| b.format == format && b.records == 2));
    for batch in &batches {
        let login = batch.user_id.as_deref().unwrap();
        let registered = (0..3).any(|i| context.cache.login(&format!("participant-{}", i)).as_deref() == Some(login));
        assert!(registered, "batch from unregistered login {}", login);
    }
    assert_eq!(platform.records_received(QUESTIONNAIRE_TOPIC), 12);

    let metrics = context.metrics.get_snapshot();
    assert_eq!(metrics.records_sent, 12);
    assert_eq!(metrics.requests_by_name["Create organization"].sent, 1);
    assert_eq!(metrics.requests_by_name[&format!("Send {} data", format)].ok, 6);
    assert_eq!(metrics.phase("ingestion").map(|s| s.completed), Some(6));
}

#[tokio::test]
async fn json_run_ingests_every_batch() {
    full_run(WireFormat::Json).await;
}

#[tokio::test]
async fn binary_run_ingests_every_batch() {
    full_run(WireFormat::Binary).await;
}

async fn evolved_schema_run(format: WireFormat) {
    let platform = Arc::new(
        FakePlatform::new().with_value_schema(QUESTIONNAIRE_TOPIC, EVOLVED_QUESTIONNAIRE_SCHEMA),
    );
    let context = context(&platform, config(2, format));

    let reports = run(&context).await.unwrap();

    assert!(reports.iter().all(|r| r.outcome.failed == 0));
    let value_id = platform.schema_id(QUESTIONNAIRE_TOPIC, loadtest_core::Direction::Value);
    assert_eq!(context.cache.schema_ids(QUESTIONNAIRE_TOPIC).ok().map(|ids| ids.value), value_id);

    let batches = platform.received();
    assert_eq!(batches.len(), 6);
    for value in batches.iter().flat_map(|b| &b.values) {
        let apache_avro::types::Value::Record(fields) = value else {
            panic!("value is not a record: {:?}", value);
        };
        assert!(fields.contains(&(
            "studyArm".to_string(),
            apache_avro::types::Value::String("control".to_string())
        )));
    }
    assert_eq!(platform.records_received(QUESTIONNAIRE_TOPIC), 12);
}

#[tokio::test]
async fn binary_run_encodes_against_the_registry_schema() {
    evolved_schema_run(WireFormat::Binary).await;
}

#[tokio::test]
async fn json_run_is_accepted_by_an_evolved_registry_schema() {
    evolved_schema_run(WireFormat::Json).await;
}

#[tokio::test]
async fn setup_failure_aborts_the_run() {
    let platform = Arc::new(FakePlatform::new());
    platform.fail_requests("Create organization", 500, 1);
    let context = context(&platform, config(2, WireFormat::Json));

    let err = run(&context).await.unwrap_err();

    assert!(is_phase_aborted(&err));
    match err {
        LoadTestError::PhaseAborted { phase, failures } => {
            assert_eq!(phase, "setup");
            assert_eq!(failures, 1);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(platform.request_count("Get subject"), 0);
    assert_eq!(platform.entity_count().4, 0);
}

#[tokio::test]
async fn failed_registration_leaves_the_others_ingesting() {
    let platform = Arc::new(FakePlatform::new());
    platform.fail_requests("Create new subject", 500, 1);
    let context = context(&platform, config(3, WireFormat::Json));

    let reports = run(&context).await.unwrap();

    assert_eq!(reports[1].outcome.failed, 1);
    assert_eq!(reports[1].outcome.completed, 2);
    assert_eq!(context.cache.subject_count(), 2);
    assert_eq!(reports[3].outcome.failed, 0);
    assert_eq!(platform.received().len(), 6);
}

#[tokio::test]
async fn second_run_reuses_existing_entities() {
    let platform = Arc::new(FakePlatform::new());
    run(&context(&platform, config(2, WireFormat::Json))).await.unwrap();
    let entities = platform.entity_count();

    let rerun = context(&platform, config(2, WireFormat::Json));
    run(&rerun).await.unwrap();

    assert_eq!(platform.entity_count(), entities);
    assert_eq!(platform.request_count("Create organization"), 1);
    assert_eq!(platform.request_count("Create new subject"), 2);
    assert_eq!(rerun.cache.resource_count(ResourceKind::Source), 6);
    assert_eq!(platform.received().len(), 12);
}

#[tokio::test]
async fn ingestion_without_discovery_fails_every_session() {
    let platform = Arc::new(FakePlatform::new());
    let mut config = config(2, WireFormat::Binary);
    config.phases.discovery.enabled = false;
    let context = context(&platform, config);

    let reports = run(&context).await.unwrap();

    let ingestion = &reports[2];
    assert_eq!(ingestion.name, "ingestion");
    assert_eq!((ingestion.outcome.completed, ingestion.outcome.failed), (0, 6));
    assert!(platform.received().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn expired_tokens_are_rotated_once_per_use() {
    let platform = Arc::new(FakePlatform::new().with_token_ttl(0));
    let context = context(&platform, config(3, WireFormat::Json));

    let reports = run(&context).await.unwrap();

    assert!(reports.iter().all(|r| r.outcome.failed == 0));
    // registration, discovery, then one per ingestion session
    assert_eq!(platform.request_count("Refresh token"), 2 * 3 + 1 + 6);
}

#[test]
fn default_plan_lists_the_ingestion_ramp() {
    let phases = RunConfig::default().phases();
    let plan = phases[3].injection.plan().to_string();
    assert!(plan.starts_with("closed model: up to 25 concurrent sessions over 340s"));
    assert!(plan.contains("ramp 5 -> 10 users over 10s"));
    assert!(plan.contains("hold 25 users for 60s"));
}
