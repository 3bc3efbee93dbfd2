use std::sync::Arc;
use std::time::Duration;

use loadtest_client::{
    BoxedTransport, BrokerCredentials, ClientOptions, ManagementClient, TokenBroker,
};
use loadtest_core::{is_protocol_error, Created, RegistryCache, TokenPair};
use loadtest_testsuite::{admin_client, pairing_client, FakePlatform, ADMIN_PASSWORD, ADMIN_USERNAME};
use serde_json::json;

fn credentials() -> BrokerCredentials {
    BrokerCredentials {
        admin_client: admin_client(),
        admin_username: ADMIN_USERNAME.to_string(),
        admin_password: ADMIN_PASSWORD.to_string(),
        pairing_client: pairing_client(),
    }
}

async fn subject_login(management: &ManagementClient, admin: &str, external_id: &str) -> String {
    match management
        .create_subject(admin, external_id, json!({"externalId": external_id}))
        .await
        .unwrap()
    {
        Created::Created(dto) => dto.identifier().unwrap(),
        Created::Conflict => panic!("subject {} already exists", external_id),
    }
}

#[tokio::test]
async fn refresh_chain_rotates_and_rejects_spent_tokens() {
    let platform = Arc::new(FakePlatform::new());
    let transport: BoxedTransport = platform.clone();
    let options = ClientOptions::default();
    let management = ManagementClient::new(transport, &options);
    let cache = Arc::new(RegistryCache::new());
    let broker = TokenBroker::new(management.clone(), cache.clone(), credentials());

    let admin = broker.admin_token().await.unwrap();
    let login = subject_login(&management, &admin, "ext-1").await;

    let token_name = management
        .pair_client(&admin, &pairing_client().client_id, &login)
        .await
        .unwrap();
    assert_eq!(token_name, "mt-123");
    let first_refresh = management.meta_token(&admin, &token_name).await.unwrap();
    assert_eq!(first_refresh, "rt-1");

    let pair = management.refresh_grant(&pairing_client(), "rt-1").await.unwrap();
    assert_eq!(pair, TokenPair::new("at-1", "rt-2"));
    let pair = management.refresh_grant(&pairing_client(), "rt-2").await.unwrap();
    assert_eq!(pair, TokenPair::new("at-2", "rt-3"));

    let err = management.refresh_grant(&pairing_client(), "rt-1").await.unwrap_err();
    assert!(is_protocol_error(&err));
    assert_eq!(err.status(), Some(400));

    // meta-tokens are single use as well
    assert!(management.meta_token(&admin, "mt-123").await.is_err());
}

#[tokio::test]
async fn registration_caches_the_latest_pair() {
    let platform = Arc::new(FakePlatform::new());
    let options = ClientOptions::default();
    let management = ManagementClient::new(platform.clone(), &options);
    let cache = Arc::new(RegistryCache::new());
    let broker = TokenBroker::new(management.clone(), cache.clone(), credentials());

    let admin = broker.admin_token().await.unwrap();
    let login = subject_login(&management, &admin, "ext-1").await;

    let pair = broker.register_subject_tokens(&admin, &login).await.unwrap();
    assert_eq!(pair, TokenPair::new("at-2", "rt-3"));
    assert_eq!(cache.tokens(&login), Some(pair));
    assert_eq!(broker.access_token(&login).await.unwrap(), "at-2");
    assert_eq!(platform.request_count("Refresh token"), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rotation_never_spends_a_refresh_token_twice() {
    let platform = Arc::new(
        FakePlatform::new()
            .with_token_ttl(0)
            .with_latency(Duration::from_millis(2)),
    );
    let options = ClientOptions::default();
    let management = ManagementClient::new(platform.clone(), &options);
    let cache = Arc::new(RegistryCache::new());
    let broker = Arc::new(TokenBroker::new(management.clone(), cache.clone(), credentials()));

    let admin = broker.admin_token().await.unwrap();
    let login = subject_login(&management, &admin, "ext-1").await;
    broker.register_subject_tokens(&admin, &login).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let broker = broker.clone();
        let login = login.clone();
        handles.push(tokio::spawn(async move { broker.access_token(&login).await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    // two grants during registration, one per expired access
    assert_eq!(platform.request_count("Refresh token"), 2 + 8);
}

#[tokio::test]
async fn access_token_without_registration_is_a_data_error() {
    let platform = Arc::new(FakePlatform::new());
    let options = ClientOptions::default();
    let broker = TokenBroker::new(
        ManagementClient::new(platform, &options),
        Arc::new(RegistryCache::new()),
        credentials(),
    );
    let err = broker.access_token("nobody").await.unwrap_err();
    assert!(loadtest_core::is_data_error(&err));
}
