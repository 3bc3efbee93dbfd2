//! Run-wide registry cache shared by all virtual sessions.
//!
//! The cache is created at run start and dropped at run end. Readers never
//! wait for a value to appear: the phase barrier guarantees that values
//! written in one phase exist before a dependent phase starts, so an absent
//! value is reported as a [`DataError`].

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;

use crate::error::{DataError, LoadTestResult};
use crate::types::{Direction, ResourceDto, ResourceKind, SchemaIds, SchemaMetadata, TokenPair};

/// Concurrency-safe maps linking natural keys to resources, schema ids and
/// token pairs.
///
/// - resources, schema bindings and schemas are write-once/read-many;
/// - token pairs are last-writer-wins.
#[derive(Debug, Default)]
pub struct RegistryCache {
    resources: DashMap<(ResourceKind, String), ResourceDto>,
    schema_ids: DashMap<(String, Direction), i32>,
    schemas: DashMap<i32, Arc<SchemaMetadata>>,
    tokens: DashMap<String, TokenPair>,
    logins: DashMap<String, String>,
}

impl RegistryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(&self, kind: ResourceKind, key: &str) -> Option<ResourceDto> {
        self.resources
            .get(&(kind, key.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn require_resource(&self, kind: ResourceKind, key: &str) -> LoadTestResult<ResourceDto> {
        self.resource(kind, key)
            .ok_or_else(|| DataError::new("registry cache", format!("{} '{}'", kind, key)).into())
    }

    /// Stores a resource unless one is already cached under the same key.
    /// Returns the DTO that is cached after the call.
    pub fn insert_resource(&self, dto: ResourceDto) -> ResourceDto {
        match self.resources.entry((dto.kind, dto.natural_key.clone())) {
            Entry::Occupied(existing) => {
                tracing::debug!(kind = %dto.kind, key = %dto.natural_key, "resource already cached");
                existing.get().clone()
            }
            Entry::Vacant(slot) => slot.insert(dto).value().clone(),
        }
    }

    pub fn resource_count(&self, kind: ResourceKind) -> usize {
        self.resources.iter().filter(|entry| entry.key().0 == kind).count()
    }

    /// Binds a schema id to a topic direction. Rebinding the same id is a
    /// no-op; rebinding a different id is rejected.
    pub fn bind_schema(&self, topic: &str, direction: Direction, schema_id: i32) -> LoadTestResult<()> {
        match self.schema_ids.entry((topic.to_string(), direction)) {
            Entry::Occupied(existing) if *existing.get() == schema_id => Ok(()),
            Entry::Occupied(existing) => Err(DataError::new(
                "bind schema",
                format!(
                    "{} already bound to schema {}, refusing {}",
                    direction.subject(topic),
                    existing.get(),
                    schema_id
                ),
            )
            .into()),
            Entry::Vacant(slot) => {
                slot.insert(schema_id);
                Ok(())
            }
        }
    }

    pub fn schema_id(&self, topic: &str, direction: Direction) -> Option<i32> {
        self.schema_ids
            .get(&(topic.to_string(), direction))
            .map(|entry| *entry.value())
    }

    /// Key and value schema ids of a topic; either one missing is a data error.
    pub fn schema_ids(&self, topic: &str) -> LoadTestResult<SchemaIds> {
        let lookup = |direction: Direction| {
            self.schema_id(topic, direction).ok_or_else(|| {
                DataError::new("registry cache", format!("schema id for {}", direction.subject(topic)))
            })
        };
        Ok(SchemaIds {
            key: lookup(Direction::Key)?,
            value: lookup(Direction::Value)?,
        })
    }

    pub fn insert_schema(&self, metadata: SchemaMetadata) -> Arc<SchemaMetadata> {
        self.schemas
            .entry(metadata.id)
            .or_insert_with(|| Arc::new(metadata))
            .value()
            .clone()
    }

    pub fn schema(&self, id: i32) -> Option<Arc<SchemaMetadata>> {
        self.schemas.get(&id).map(|entry| entry.value().clone())
    }

    pub fn require_schema(&self, id: i32) -> LoadTestResult<Arc<SchemaMetadata>> {
        self.schema(id)
            .ok_or_else(|| DataError::new("registry cache", format!("schema with id {}", id)).into())
    }

    /// Overwrites the token pair of a login.
    pub fn store_tokens(&self, login: &str, tokens: TokenPair) {
        self.tokens.insert(login.to_string(), tokens);
    }

    pub fn tokens(&self, login: &str) -> Option<TokenPair> {
        self.tokens.get(login).map(|entry| entry.value().clone())
    }

    pub fn register_subject(&self, external_id: &str, login: &str) {
        self.logins.insert(external_id.to_string(), login.to_string());
    }

    pub fn login(&self, external_id: &str) -> Option<String> {
        self.logins.get(external_id).map(|entry| entry.value().clone())
    }

    pub fn subject_count(&self) -> usize {
        self.logins.len()
    }

    /// Uniformly samples a registered (externalId, login) pair.
    pub fn random_subject<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(String, String)> {
        let subjects: Vec<(String, String)> = self
            .logins
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        subjects.choose(rng).cloned()
    }
}
