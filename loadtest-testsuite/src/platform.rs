//! In-memory platform implementing the HTTP seam.
//!
//! Tokens are issued from deterministic counters: the first pairing yields
//! meta-token `mt-123`, its exchange yields `rt-1`, and every refresh grant
//! yields the next `at-N`/`rt-N` pair. Meta-tokens and refresh tokens can
//! only be spent once.

use apache_avro::types::Value as AvroValue;
use apache_avro::Schema;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use loadtest_client::{ClientCredentials, ClientOptions, HttpRequest, HttpResponse, HttpTransport, Method, RequestBody};
use loadtest_codec::{
    decode_json_records, decode_record_set, decode_record_set_values, parse_json_envelope, schemas,
};
use loadtest_core::{Direction, LoadTestResult, WireFormat};

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin";
pub const QUESTIONNAIRE_TOPIC: &str = "questionnaire_response";

/// The questionnaire schema with one more field, defaulted, that the
/// generated records do not carry.
pub const EVOLVED_QUESTIONNAIRE_SCHEMA: &str = r#"{
  "namespace": "org.radarcns.active.questionnaire",
  "type": "record",
  "name": "Questionnaire",
  "fields": [
    {"name": "time", "type": "double"},
    {"name": "timeCompleted", "type": "double"},
    {"name": "timeNotification", "type": ["null", "double"], "default": null},
    {"name": "name", "type": "string"},
    {"name": "version", "type": "string"},
    {"name": "answers", "type": {
      "type": "array",
      "items": {
        "name": "Answer",
        "type": "record",
        "fields": [
          {"name": "questionId", "type": ["null", "string"], "default": null},
          {"name": "value", "type": ["int", "string", "double"]},
          {"name": "startTime", "type": "double"},
          {"name": "endTime", "type": "double"}
        ]
      }
    }},
    {"name": "studyArm", "type": "string", "default": "control"}
  ]
}"#;

pub fn admin_client() -> ClientCredentials {
    ClientCredentials::new("ManagementPortalapp", "mp-secret")
}

pub fn pairing_client() -> ClientCredentials {
    ClientCredentials::new("aRMT", "armt-secret")
}

/// One accepted gateway request.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedBatch {
    pub topic: String,
    pub format: WireFormat,
    pub user_id: Option<String>,
    pub records: usize,
    /// Values decoded with the registry schema the batch named.
    pub values: Vec<AvroValue>,
}

#[derive(Debug, Clone)]
struct RegisteredSchema {
    id: i32,
    version: i32,
    source: String,
}

#[derive(Debug, Clone, Copy)]
struct InjectedFailure {
    status: u16,
    remaining: usize,
}

#[derive(Debug, Default)]
struct PlatformState {
    next_id: i64,
    organizations: HashMap<String, Value>,
    projects: HashMap<String, Value>,
    source_types: Vec<Value>,
    sources: Vec<Value>,
    subjects: Vec<Value>,
    admin_tokens: HashSet<String>,
    /// token name -> login
    meta_tokens: HashMap<String, String>,
    /// live refresh token -> login
    refresh_tokens: HashMap<String, String>,
    /// access token -> login
    access_tokens: HashMap<String, String>,
    meta_seq: u64,
    refresh_seq: u64,
    access_seq: u64,
    admin_seq: u64,
    topics: HashSet<String>,
    subject_versions: HashMap<(String, i32), RegisteredSchema>,
    schemas: HashMap<i32, String>,
    next_schema_id: i32,
    received: Vec<ReceivedBatch>,
}

impl PlatformState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory management portal, schema registry and gateway.
pub struct FakePlatform {
    options: ClientOptions,
    state: Mutex<PlatformState>,
    requests: DashMap<String, usize>,
    failures: DashMap<String, InjectedFailure>,
    latency: Option<Duration>,
    token_ttl: Option<i64>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePlatform {
    /// Platform with the questionnaire topic registered.
    pub fn new() -> Self {
        let platform = Self {
            options: ClientOptions::default(),
            state: Mutex::new(PlatformState::default()),
            requests: DashMap::new(),
            failures: DashMap::new(),
            latency: None,
            token_ttl: None,
        };
        platform.register_topic(
            QUESTIONNAIRE_TOPIC,
            schemas::OBSERVATION_KEY_SCHEMA,
            schemas::QUESTIONNAIRE_SCHEMA,
        );
        platform
    }

    /// Delays every response.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Access tokens expire this many seconds after issue.
    pub fn with_token_ttl(mut self, seconds: i64) -> Self {
        self.token_ttl = Some(seconds);
        self
    }

    /// Registers version 1 of the key and value subjects of a topic.
    pub fn register_topic(&self, topic: &str, key_schema: &str, value_schema: &str) {
        let mut state = self.state.lock();
        state.topics.insert(topic.to_string());
        for (direction, source) in [(Direction::Key, key_schema), (Direction::Value, value_schema)] {
            state.next_schema_id += 1;
            let id = state.next_schema_id;
            state.schemas.insert(id, source.to_string());
            state.subject_versions.insert(
                (direction.subject(topic), 1),
                RegisteredSchema {
                    id,
                    version: 1,
                    source: source.to_string(),
                },
            );
        }
    }

    /// Serves `value_schema`, under a fresh id, as version 1 of the value
    /// subject of `topic`.
    pub fn with_value_schema(self, topic: &str, value_schema: &str) -> Self {
        {
            let mut state = self.state.lock();
            state.next_schema_id += 1;
            let id = state.next_schema_id;
            state.schemas.insert(id, value_schema.to_string());
            state.topics.insert(topic.to_string());
            state.subject_versions.insert(
                (Direction::Value.subject(topic), 1),
                RegisteredSchema {
                    id,
                    version: 1,
                    source: value_schema.to_string(),
                },
            );
        }
        self
    }

    /// Answers the next `times` requests named `request_name` with `status`.
    pub fn fail_requests(&self, request_name: &str, status: u16, times: usize) {
        self.failures.insert(
            request_name.to_string(),
            InjectedFailure {
                status,
                remaining: times,
            },
        );
    }

    pub fn request_count(&self, request_name: &str) -> usize {
        self.requests.get(request_name).map(|c| *c).unwrap_or(0)
    }

    /// Subject logins that were paired, by external id.
    pub fn subject_login(&self, external_id: &str) -> Option<String> {
        let state = self.state.lock();
        state
            .subjects
            .iter()
            .find(|s| s["externalId"] == external_id)
            .and_then(|s| s["login"].as_str().map(str::to_string))
    }

    pub fn entity_count(&self) -> (usize, usize, usize, usize, usize) {
        let state = self.state.lock();
        (
            state.organizations.len(),
            state.projects.len(),
            state.source_types.len(),
            state.sources.len(),
            state.subjects.len(),
        )
    }

    pub fn received(&self) -> Vec<ReceivedBatch> {
        self.state.lock().received.clone()
    }

    pub fn records_received(&self, topic: &str) -> usize {
        self.state
            .lock()
            .received
            .iter()
            .filter(|b| b.topic == topic)
            .map(|b| b.records)
            .sum()
    }

    /// Schema id bound to a subject version, as the registry reports it.
    pub fn schema_id(&self, topic: &str, direction: Direction) -> Option<i32> {
        self.state
            .lock()
            .subject_versions
            .get(&(direction.subject(topic), 1))
            .map(|s| s.id)
    }

    fn injected_failure(&self, name: &str) -> Option<u16> {
        let mut entry = self.failures.get_mut(name)?;
        if entry.remaining == 0 {
            return None;
        }
        entry.remaining -= 1;
        Some(entry.status)
    }

    fn route(&self, request: &HttpRequest) -> HttpResponse {
        let path = request.path.as_str();
        if let Some(rest) = path.strip_prefix(self.options.management_path.as_str()) {
            return self.management(request, rest);
        }
        if let Some(rest) = path.strip_prefix(self.options.schema_registry_path.as_str()) {
            return self.registry(request, rest);
        }
        if let Some(rest) = path.strip_prefix(self.options.gateway_path.as_str()) {
            return self.gateway(request, rest);
        }
        not_found()
    }

    fn management(&self, request: &HttpRequest, path: &str) -> HttpResponse {
        if path == "/oauth/token" && request.method == Method::Post {
            return self.token(request);
        }
        if !self.is_admin(request) {
            return HttpResponse::json_body(401, &json!({"error": "unauthorized"}));
        }
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let mut state = self.state.lock();
        match (request.method, segments.as_slice()) {
            (Method::Get, ["api", "organizations", name]) => match state.organizations.get(*name) {
                Some(org) => HttpResponse::json_body(200, org),
                None => not_found(),
            },
            (Method::Post, ["api", "organizations"]) => {
                create_keyed(&mut state, request, "name", |s| &mut s.organizations)
            }
            (Method::Get, ["api", "projects", name]) => match state.projects.get(*name) {
                Some(project) => HttpResponse::json_body(200, project),
                None => not_found(),
            },
            (Method::Post, ["api", "projects"]) => {
                create_keyed(&mut state, request, "projectName", |s| &mut s.projects)
            }
            (Method::Get, ["api", "source-types"]) => {
                HttpResponse::json_body(200, &Value::Array(state.source_types.clone()))
            }
            (Method::Post, ["api", "source-types"]) => {
                create_listed(&mut state, request, "name", |body, _| body, |s| &mut s.source_types)
            }
            (Method::Get, ["api", "sources"]) => {
                HttpResponse::json_body(200, &Value::Array(state.sources.clone()))
            }
            (Method::Post, ["api", "sources"]) => create_listed(
                &mut state,
                request,
                "sourceName",
                |mut body, id| {
                    body["sourceId"] = Value::from(format!("src-{}", id));
                    body
                },
                |s| &mut s.sources,
            ),
            (Method::Get, ["api", "subjects"]) => {
                let external_id = request.query_value("externalId").unwrap_or_default();
                let matches: Vec<Value> = state
                    .subjects
                    .iter()
                    .filter(|s| s["externalId"] == external_id)
                    .cloned()
                    .collect();
                HttpResponse::json_body(200, &Value::Array(matches))
            }
            (Method::Post, ["api", "subjects"]) => create_listed(
                &mut state,
                request,
                "externalId",
                |mut body, id| {
                    body["login"] = Value::from(format!("login-{}", id));
                    body
                },
                |s| &mut s.subjects,
            ),
            (Method::Get, ["api", "oauth-clients", "pair"]) => {
                let login = request.query_value("login").unwrap_or_default().to_string();
                let known = state.subjects.iter().any(|s| s["login"] == login.as_str());
                if !known || request.query_value("clientId") != Some(pairing_client().client_id.as_str()) {
                    return not_found();
                }
                let name = format!("mt-{}", 123 + state.meta_seq);
                state.meta_seq += 1;
                state.meta_tokens.insert(name.clone(), login);
                HttpResponse::json_body(200, &json!({"tokenName": name, "tokenUrl": format!("/api/meta-token/{}", name)}))
            }
            (Method::Get, ["api", "meta-token", name]) => match state.meta_tokens.remove(*name) {
                Some(login) => {
                    state.refresh_seq += 1;
                    let refresh = format!("rt-{}", state.refresh_seq);
                    state.refresh_tokens.insert(refresh.clone(), login);
                    HttpResponse::json_body(200, &json!({"refreshToken": refresh}))
                }
                None => not_found(),
            },
            _ => not_found(),
        }
    }

    fn token(&self, request: &HttpRequest) -> HttpResponse {
        let basic = request.header_value("Authorization").unwrap_or_default();
        let mut state = self.state.lock();
        match request.form_value("grant_type") {
            Some("password") => {
                let valid = basic == admin_client().basic_header()
                    && request.form_value("username") == Some(ADMIN_USERNAME)
                    && request.form_value("password") == Some(ADMIN_PASSWORD);
                if !valid {
                    return HttpResponse::json_body(401, &json!({"error": "invalid_client"}));
                }
                state.admin_seq += 1;
                let token = format!("admin-at-{}", state.admin_seq);
                state.admin_tokens.insert(token.clone());
                HttpResponse::json_body(200, &json!({"access_token": token, "token_type": "bearer"}))
            }
            Some("refresh_token") => {
                if basic != pairing_client().basic_header() {
                    return HttpResponse::json_body(401, &json!({"error": "invalid_client"}));
                }
                let presented = request.form_value("refresh_token").unwrap_or_default();
                let Some(login) = state.refresh_tokens.remove(presented) else {
                    return HttpResponse::json_body(400, &json!({"error": "invalid_grant"}));
                };
                state.access_seq += 1;
                state.refresh_seq += 1;
                let access = format!("at-{}", state.access_seq);
                let refresh = format!("rt-{}", state.refresh_seq);
                state.access_tokens.insert(access.clone(), login.clone());
                state.refresh_tokens.insert(refresh.clone(), login);
                let mut body = json!({"access_token": access, "refresh_token": refresh, "token_type": "bearer"});
                if let Some(ttl) = self.token_ttl {
                    body["expires_in"] = Value::from(ttl);
                }
                HttpResponse::json_body(200, &body)
            }
            _ => HttpResponse::json_body(400, &json!({"error": "unsupported_grant_type"})),
        }
    }

    fn registry(&self, request: &HttpRequest, path: &str) -> HttpResponse {
        if self.bearer_login(request).is_none() && !self.is_admin(request) {
            return HttpResponse::json_body(401, &json!({"error": "unauthorized"}));
        }
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let state = self.state.lock();
        match segments.as_slice() {
            ["subjects", subject, "versions", version] => {
                let Ok(version) = version.parse::<i32>() else {
                    return not_found();
                };
                match state.subject_versions.get(&(subject.to_string(), version)) {
                    // Schema left out so clients fetch it by id.
                    Some(s) => HttpResponse::json_body(
                        200,
                        &json!({"subject": subject, "version": s.version, "id": s.id}),
                    ),
                    None => not_found(),
                }
            }
            ["schemas", "ids", id] => match id.parse::<i32>().ok().and_then(|id| state.schemas.get(&id)) {
                Some(source) => HttpResponse::json_body(200, &json!({"schema": source})),
                None => not_found(),
            },
            _ => not_found(),
        }
    }

    fn gateway(&self, request: &HttpRequest, path: &str) -> HttpResponse {
        let Some(login) = self.bearer_login(request) else {
            return HttpResponse::json_body(401, &json!({"error_code": 401}));
        };
        let Some(topic) = path.strip_prefix("/topics/") else {
            return not_found();
        };
        if !self.state.lock().topics.contains(topic) {
            return not_found();
        }
        match (request.method, &request.body) {
            (Method::Get, _) => HttpResponse::json_body(200, &json!({"name": topic})),
            (Method::Post, RequestBody::Bytes { content_type, data }) => {
                match self.accept_payload(topic, content_type, data) {
                    Ok(batch) if batch.user_id.as_deref().map_or(true, |u| u == login) => {
                        let records = batch.records;
                        self.state.lock().received.push(batch);
                        HttpResponse::json_body(200, &json!({"offsets": records}))
                    }
                    Ok(_) => HttpResponse::json_body(403, &json!({"error_code": 403})),
                    Err(status) => HttpResponse::json_body(status, &json!({"error_code": status})),
                }
            }
            _ => HttpResponse::json_body(415, &json!({"error_code": 415})),
        }
    }

    fn accept_payload(&self, topic: &str, content_type: &str, data: &[u8]) -> Result<ReceivedBatch, u16> {
        let json_type = WireFormat::Json.content_type(2);
        let format = if content_type.starts_with("application/vnd.kafka.json.") {
            WireFormat::Json
        } else if content_type.starts_with("application/vnd.radarbase.avro.") {
            WireFormat::Binary
        } else {
            tracing::warn!(content_type, expected = %json_type, "unsupported content type");
            return Err(415);
        };
        let state = self.state.lock();
        let schema_by_id = |id: i32| -> Result<Schema, u16> {
            let source = state.schemas.get(&id).ok_or(422u16)?;
            Schema::parse_str(source).map_err(|_| 422)
        };
        let by_version = |direction: Direction, version: i32| -> Result<Schema, u16> {
            let registered = state
                .subject_versions
                .get(&(direction.subject(topic), version))
                .ok_or(422u16)?;
            Schema::parse_str(&registered.source).map_err(|_| 422)
        };

        match format {
            WireFormat::Json => {
                let envelope = parse_json_envelope(data).map_err(|_| 422u16)?;
                let key_schema = schema_by_id(envelope.key_schema_id)?;
                let value_schema = schema_by_id(envelope.value_schema_id)?;
                let records = decode_json_records(&envelope, &key_schema, &value_schema).map_err(|_| 422u16)?;
                let user_id = records.first().and_then(|(key, _)| user_id_of(key));
                Ok(ReceivedBatch {
                    topic: topic.to_string(),
                    format,
                    user_id,
                    records: records.len(),
                    values: records.into_iter().map(|(_, value)| value).collect(),
                })
            }
            WireFormat::Binary => {
                let set = decode_record_set(data).map_err(|_| 422u16)?;
                by_version(Direction::Key, set.key_schema_version)?;
                let value_schema = by_version(Direction::Value, set.value_schema_version)?;
                let values = decode_record_set_values(&set, &value_schema).map_err(|_| 422u16)?;
                Ok(ReceivedBatch {
                    topic: topic.to_string(),
                    format,
                    user_id: set.user_id.clone(),
                    records: values.len(),
                    values,
                })
            }
        }
    }

    fn bearer(request: &HttpRequest) -> Option<&str> {
        request.header_value("Authorization")?.strip_prefix("Bearer ")
    }

    fn is_admin(&self, request: &HttpRequest) -> bool {
        Self::bearer(request).is_some_and(|t| self.state.lock().admin_tokens.contains(t))
    }

    fn bearer_login(&self, request: &HttpRequest) -> Option<String> {
        let token = Self::bearer(request)?;
        self.state.lock().access_tokens.get(token).cloned()
    }
}

fn user_id_of(key: &AvroValue) -> Option<String> {
    match key {
        AvroValue::Record(fields) => fields.iter().find_map(|(name, value)| match (name.as_str(), value) {
            ("userId", AvroValue::String(s)) => Some(s.clone()),
            _ => None,
        }),
        _ => None,
    }
}

fn not_found() -> HttpResponse {
    HttpResponse::json_body(404, &json!({"error": "not found"}))
}

fn json_body(request: &HttpRequest) -> Option<Value> {
    match &request.body {
        RequestBody::Json(body) => Some(body.clone()),
        _ => None,
    }
}

/// Creates an entity stored in a map keyed by `key_field`.
fn create_keyed(
    state: &mut PlatformState,
    request: &HttpRequest,
    key_field: &str,
    table: impl Fn(&mut PlatformState) -> &mut HashMap<String, Value>,
) -> HttpResponse {
    let Some(mut body) = json_body(request) else {
        return HttpResponse::json_body(400, &json!({"error": "json body required"}));
    };
    let Some(key) = body[key_field].as_str().map(str::to_string) else {
        return HttpResponse::json_body(400, &json!({"error": format!("{} required", key_field)}));
    };
    if table(state).contains_key(&key) {
        return HttpResponse::json_body(409, &json!({"error": "already exists"}));
    }
    body["id"] = Value::from(state.allocate_id());
    table(state).insert(key, body.clone());
    HttpResponse::json_body(201, &body)
}

/// Creates an entity stored in a list, unique on `key_field`.
fn create_listed(
    state: &mut PlatformState,
    request: &HttpRequest,
    key_field: &str,
    decorate: impl FnOnce(Value, i64) -> Value,
    table: impl Fn(&mut PlatformState) -> &mut Vec<Value>,
) -> HttpResponse {
    let Some(mut body) = json_body(request) else {
        return HttpResponse::json_body(400, &json!({"error": "json body required"}));
    };
    let Some(key) = body[key_field].as_str().map(str::to_string) else {
        return HttpResponse::json_body(400, &json!({"error": format!("{} required", key_field)}));
    };
    if table(state).iter().any(|item| item[key_field] == key.as_str()) {
        return HttpResponse::json_body(409, &json!({"error": "already exists"}));
    }
    let id = state.allocate_id();
    body["id"] = Value::from(id);
    let body = decorate(body, id);
    table(state).push(body.clone());
    HttpResponse::json_body(201, &body)
}

#[async_trait]
impl HttpTransport for FakePlatform {
    async fn execute(&self, request: HttpRequest) -> LoadTestResult<HttpResponse> {
        *self.requests.entry(request.name.clone()).or_insert(0) += 1;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(status) = self.injected_failure(&request.name) {
            tracing::debug!(request = %request.name, status, "injected failure");
            return Ok(HttpResponse::json_body(status, &json!({"error": "injected"})));
        }
        let response = self.route(&request);
        tracing::debug!(request = %request.name, path = %request.path, status = response.status, "fake platform");
        Ok(response)
    }
}

impl std::fmt::Debug for FakePlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakePlatform")
            .field("latency", &self.latency)
            .field("token_ttl", &self.token_ttl)
            .finish_non_exhaustive()
    }
}
