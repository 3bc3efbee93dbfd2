//! Schema registry lookups.

use apache_avro::Schema;
use serde::Deserialize;

use loadtest_core::{DataError, Direction, ExpectedStatus, LoadTestResult, SchemaMetadata};

use crate::options::ClientOptions;
use crate::transport::{BoxedTransport, HttpRequest};

/// Subject version as returned by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubjectVersion {
    pub id: Option<i32>,
    pub version: Option<i32>,
    pub schema: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SchemaById {
    schema: Option<String>,
}

#[derive(Clone)]
pub struct SchemaRegistryClient {
    transport: BoxedTransport,
    prefix: String,
}

impl SchemaRegistryClient {
    pub fn new(transport: BoxedTransport, options: &ClientOptions) -> Self {
        Self {
            transport,
            prefix: options.schema_registry_path.trim_end_matches('/').to_string(),
        }
    }

    /// `GET /subjects/{topic}-{direction}/versions/{version}`.
    pub async fn subject_version(
        &self,
        token: &str,
        topic: &str,
        direction: Direction,
        version: u32,
    ) -> LoadTestResult<SubjectVersion> {
        let name = match direction {
            Direction::Key => "GetKeySchemaId",
            Direction::Value => "GetValueSchemaId",
        };
        let request = HttpRequest::get(
            name,
            format!(
                "{}/subjects/{}/versions/{}",
                self.prefix,
                direction.subject(topic),
                version
            ),
        )
        .bearer(token);
        let response = self
            .transport
            .execute(request)
            .await?
            .expect(name, &ExpectedStatus::one(200))?;
        response.json(name)
    }

    /// `GET /schemas/ids/{id}`.
    pub async fn schema_by_id(&self, token: &str, id: i32) -> LoadTestResult<Schema> {
        const OPERATION: &str = "Get schema by id";
        let request = HttpRequest::get(OPERATION, format!("{}/schemas/ids/{}", self.prefix, id)).bearer(token);
        let response = self
            .transport
            .execute(request)
            .await?
            .expect(OPERATION, &ExpectedStatus::one(200))?;
        let body: SchemaById = response.json(OPERATION)?;
        let source = body
            .schema
            .ok_or_else(|| DataError::new(OPERATION, format!("schema of id {}", id)))?;
        Ok(Schema::parse_str(&source)?)
    }

    /// Resolves a subject version into its id, version and parsed schema.
    /// The schema is fetched by id when the version response omits it.
    pub async fn resolve(
        &self,
        token: &str,
        topic: &str,
        direction: Direction,
        version: u32,
    ) -> LoadTestResult<SchemaMetadata> {
        let subject = self.subject_version(token, topic, direction, version).await?;
        let id = subject
            .id
            .ok_or_else(|| DataError::new("Get schema id", format!("id of {}", direction.subject(topic))))?;
        let schema = match subject.schema {
            Some(source) => Schema::parse_str(&source)?,
            None => self.schema_by_id(token, id).await?,
        };
        Ok(SchemaMetadata {
            id,
            version: subject.version.unwrap_or(version as i32),
            schema,
        })
    }
}

impl std::fmt::Debug for SchemaRegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistryClient")
            .field("prefix", &self.prefix)
            .finish()
    }
}
