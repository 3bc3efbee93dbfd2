//! Core types for the ingestion load test.
//!
//! Resources exchanged with the management portal, schema bindings from the
//! registry, OAuth token pairs and the wire formats of the gateway.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of management-portal entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Organization,
    Project,
    SourceType,
    Source,
    Subject,
}

impl ResourceKind {
    /// Field of the DTO that identifies a found entity. An empty or missing
    /// value means the lookup found nothing.
    pub fn identifying_field(&self) -> &'static str {
        match self {
            ResourceKind::Organization => "name",
            ResourceKind::Project => "projectName",
            ResourceKind::SourceType => "name",
            ResourceKind::Source => "sourceId",
            ResourceKind::Subject => "login",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Organization => write!(f, "organization"),
            ResourceKind::Project => write!(f, "project"),
            ResourceKind::SourceType => write!(f, "source-type"),
            ResourceKind::Source => write!(f, "source"),
            ResourceKind::Subject => write!(f, "subject"),
        }
    }
}

/// Opaque serialized backend entity keyed by its natural name.
///
/// The JSON body is kept as returned by the server so that it can be
/// embedded verbatim in later request bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDto {
    pub kind: ResourceKind,
    pub natural_key: String,
    pub body: Arc<serde_json::Value>,
}

impl ResourceDto {
    pub fn new(kind: ResourceKind, natural_key: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            kind,
            natural_key: natural_key.into(),
            body: Arc::new(body),
        }
    }

    /// String (or number rendered as string) value of a top-level field.
    pub fn field(&self, name: &str) -> Option<String> {
        match self.body.get(name)? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn identifier(&self) -> Option<String> {
        self.field(self.kind.identifying_field())
    }

    pub fn json(&self) -> &serde_json::Value {
        &self.body
    }
}

/// Outcome of a lookup by natural key.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(ResourceDto),
    NotFound,
}

impl Lookup {
    /// Classifies a 200 body: found only when the identifying field of
    /// `kind` is present and non-empty.
    pub fn from_body(kind: ResourceKind, natural_key: &str, body: serde_json::Value) -> Self {
        let dto = ResourceDto::new(kind, natural_key, body);
        match dto.identifier() {
            Some(_) => Lookup::Found(dto),
            None => Lookup::NotFound,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

/// Outcome of a create request.
#[derive(Debug, Clone, PartialEq)]
pub enum Created {
    Created(ResourceDto),
    /// 409: another session created the entity first.
    Conflict,
}

/// Which half of a Kafka record a schema describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Key,
    Value,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Key => "key",
            Direction::Value => "value",
        }
    }

    /// Schema registry subject name for a topic.
    pub fn subject(&self, topic: &str) -> String {
        format!("{}-{}", topic, self.as_str())
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Key and value schema ids of one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaIds {
    pub key: i32,
    pub value: i32,
}

/// A registry schema resolved by id.
#[derive(Debug, Clone)]
pub struct SchemaMetadata {
    pub id: i32,
    pub version: i32,
    pub schema: apache_avro::Schema,
}

/// OAuth token pair of one login. Always replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp when the access token expires, if the server said.
    pub expires_at: Option<i64>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Check if the access token is expired or will expire within the buffer period
    pub fn is_expired(&self, buffer_seconds: i64) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        expires_at - buffer_seconds <= now
    }
}

/// Request body encoding accepted by the ingestion gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    #[default]
    Json,
    Binary,
}

impl WireFormat {
    pub fn content_type(&self, api_version: u32) -> String {
        match self {
            WireFormat::Json => {
                format!("application/vnd.kafka.json.v{}+json; charset=utf-8", api_version)
            }
            WireFormat::Binary => {
                format!("application/vnd.radarbase.avro.v{}+binary", api_version)
            }
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireFormat::Json => write!(f, "json"),
            WireFormat::Binary => write!(f, "binary"),
        }
    }
}
