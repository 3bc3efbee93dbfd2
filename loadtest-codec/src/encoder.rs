//! Wire envelopes accepted by the ingestion gateway.
//!
//! - JSON: `{"key_schema_id", "value_schema_id", "records": [{"key", "value"}]}`
//!   with key and value in Avro JSON encoding.
//! - Binary: one `RecordSet` Avro datum whose `data` items are values encoded
//!   with the registry schema of the value schema id.

use apache_avro::types::Value;
use apache_avro::{from_avro_datum, to_avro_datum, Schema};
use serde::{Deserialize, Serialize};

use loadtest_core::{LoadTestResult, RegistryCache, SchemaIds, WireFormat};

use crate::avro_json;
use crate::model::{AvroRecord, ObservationKey, RecordSet};

pub const DEFAULT_API_VERSION: u32 = 2;

/// Serialized request body with its content type.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPayload {
    pub format: WireFormat,
    pub content_type: String,
    pub body: Vec<u8>,
    /// Number of values carried in the body.
    pub records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonEnvelope {
    pub key_schema_id: i32,
    pub value_schema_id: i32,
    pub records: Vec<JsonRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRecord {
    pub key: serde_json::Value,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy)]
pub struct PayloadEncoder {
    api_version: u32,
}

impl Default for PayloadEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_API_VERSION)
    }
}

impl PayloadEncoder {
    pub fn new(api_version: u32) -> Self {
        Self { api_version }
    }

    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    /// Encodes values for `topic` using the schema ids bound in the cache.
    pub fn encode_for_topic<V: AvroRecord>(
        &self,
        format: WireFormat,
        topic: &str,
        cache: &RegistryCache,
        key: &ObservationKey,
        values: &[V],
    ) -> LoadTestResult<EncodedPayload> {
        let ids = cache.schema_ids(topic)?;
        self.encode(format, ids, cache, key, values)
    }

    pub fn encode<V: AvroRecord>(
        &self,
        format: WireFormat,
        ids: SchemaIds,
        cache: &RegistryCache,
        key: &ObservationKey,
        values: &[V],
    ) -> LoadTestResult<EncodedPayload> {
        let body = match format {
            WireFormat::Json => self.encode_json(ids, key, values)?,
            WireFormat::Binary => self.encode_binary(ids, cache, key, values)?,
        };
        tracing::debug!(%format, bytes = body.len(), records = values.len(), "encoded payload");
        Ok(EncodedPayload {
            format,
            content_type: format.content_type(self.api_version),
            body,
            records: values.len(),
        })
    }

    fn encode_json<V: AvroRecord>(
        &self,
        ids: SchemaIds,
        key: &ObservationKey,
        values: &[V],
    ) -> LoadTestResult<Vec<u8>> {
        let key_json = avro_json::to_json(ObservationKey::schema(), &key.to_avro())?;
        let records = values
            .iter()
            .map(|value| {
                Ok(JsonRecord {
                    key: key_json.clone(),
                    value: avro_json::to_json(V::schema(), &value.to_avro())?,
                })
            })
            .collect::<LoadTestResult<Vec<_>>>()?;
        let envelope = JsonEnvelope {
            key_schema_id: ids.key,
            value_schema_id: ids.value,
            records,
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    fn encode_binary<V: AvroRecord>(
        &self,
        ids: SchemaIds,
        cache: &RegistryCache,
        key: &ObservationKey,
        values: &[V],
    ) -> LoadTestResult<Vec<u8>> {
        let key_schema = cache.require_schema(ids.key)?;
        let value_schema = cache.require_schema(ids.value)?;

        let data = values
            .iter()
            .map(|value| {
                let resolved = value.to_avro().resolve(&value_schema.schema)?;
                Ok(to_avro_datum(&value_schema.schema, resolved)?)
            })
            .collect::<LoadTestResult<Vec<_>>>()?;

        let record_set = RecordSet {
            key_schema_version: key_schema.version,
            value_schema_version: value_schema.version,
            project_id: key.project_id.clone(),
            user_id: Some(key.user_id.clone()),
            source_id: key.source_id.clone(),
            data,
        };
        Ok(to_avro_datum(RecordSet::schema(), record_set.to_avro())?)
    }
}

pub fn parse_json_envelope(body: &[u8]) -> LoadTestResult<JsonEnvelope> {
    Ok(serde_json::from_slice(body)?)
}

/// Decodes every key and value of a JSON envelope with the given schemas.
pub fn decode_json_records(
    envelope: &JsonEnvelope,
    key_schema: &Schema,
    value_schema: &Schema,
) -> LoadTestResult<Vec<(Value, Value)>> {
    envelope
        .records
        .iter()
        .map(|record| {
            Ok((
                avro_json::from_json(key_schema, &record.key)?,
                avro_json::from_json(value_schema, &record.value)?,
            ))
        })
        .collect()
}

pub fn decode_record_set(body: &[u8]) -> LoadTestResult<RecordSet> {
    let value = from_avro_datum(RecordSet::schema(), &mut &body[..], None)?;
    RecordSet::from_avro(&value)
}

/// Decodes the values of a record set with the schema they were written in.
pub fn decode_record_set_values(set: &RecordSet, value_schema: &Schema) -> LoadTestResult<Vec<Value>> {
    set.data
        .iter()
        .map(|bytes| Ok(from_avro_datum(value_schema, &mut bytes.as_slice(), None)?))
        .collect()
}
