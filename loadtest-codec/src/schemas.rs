//! Compile-time Avro schemas of the records sent to the gateway.

use apache_avro::Schema;
use std::sync::OnceLock;

pub const OBSERVATION_KEY_SCHEMA: &str = r#"{
  "namespace": "org.radarcns.kafka",
  "type": "record",
  "name": "ObservationKey",
  "doc": "Key of an observation.",
  "fields": [
    {"name": "projectId", "type": ["null", "string"], "default": null},
    {"name": "userId", "type": "string"},
    {"name": "sourceId", "type": "string"}
  ]
}"#;

pub const QUESTIONNAIRE_SCHEMA: &str = r#"{
  "namespace": "org.radarcns.active.questionnaire",
  "type": "record",
  "name": "Questionnaire",
  "doc": "General schema for questionnaire responses.",
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
    }}
  ]
}"#;

pub const RECORD_SET_SCHEMA: &str = r#"{
  "namespace": "org.radarcns.kafka",
  "type": "record",
  "name": "RecordSet",
  "doc": "Set of records from a single source, values encoded with the registry schema.",
  "fields": [
    {"name": "keySchemaVersion", "type": "int"},
    {"name": "valueSchemaVersion", "type": "int"},
    {"name": "projectId", "type": ["null", "string"], "default": null},
    {"name": "userId", "type": ["null", "string"], "default": null},
    {"name": "sourceId", "type": "string"},
    {"name": "data", "type": {"type": "array", "items": "bytes"}}
  ]
}"#;

fn parse(cell: &'static OnceLock<Schema>, source: &str) -> &'static Schema {
    cell.get_or_init(|| Schema::parse_str(source).expect("compile-time schema must be valid Avro"))
}

pub fn observation_key() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    parse(&SCHEMA, OBSERVATION_KEY_SCHEMA)
}

pub fn questionnaire() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    parse(&SCHEMA, QUESTIONNAIRE_SCHEMA)
}

pub fn record_set() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    parse(&SCHEMA, RECORD_SET_SCHEMA)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_time_schemas_parse() {
        for source in [OBSERVATION_KEY_SCHEMA, QUESTIONNAIRE_SCHEMA, RECORD_SET_SCHEMA] {
            Schema::parse_str(source).unwrap();
        }
        assert!(matches!(questionnaire(), Schema::Record(_)));
    }
}
