//! Avro JSON encoding of values, as expected by the Kafka REST JSON API.
//!
//! Differs from plain JSON in two places: a non-null union value is wrapped
//! in a single-entry object keyed by the branch type name, and bytes are
//! rendered as a string of code points 0-255.

use apache_avro::schema::{RecordField, UnionSchema};
use apache_avro::types::Value;
use apache_avro::Schema;
use loadtest_core::{LoadTestError, LoadTestResult};
use serde_json::{Map, Number, Value as Json};
use std::collections::HashMap;

fn codec_error(msg: impl Into<String>) -> LoadTestError {
    LoadTestError::Codec(msg.into())
}

/// Name of a union branch in Avro JSON.
fn branch_name(schema: &Schema) -> String {
    match schema {
        Schema::Null => "null".to_string(),
        Schema::Boolean => "boolean".to_string(),
        Schema::Int => "int".to_string(),
        Schema::Long => "long".to_string(),
        Schema::Float => "float".to_string(),
        Schema::Double => "double".to_string(),
        Schema::Bytes => "bytes".to_string(),
        Schema::String => "string".to_string(),
        Schema::Array(_) => "array".to_string(),
        Schema::Map(_) => "map".to_string(),
        Schema::Record(record) => record.name.fullname(None),
        Schema::Enum(enum_schema) => enum_schema.name.fullname(None),
        Schema::Fixed(fixed) => fixed.name.fullname(None),
        Schema::Ref { name } => name.fullname(None),
        other => format!("{:?}", other),
    }
}

fn bytes_to_json(bytes: &[u8]) -> Json {
    Json::String(bytes.iter().map(|b| char::from(*b)).collect())
}

fn bytes_from_json(json: &Json) -> LoadTestResult<Vec<u8>> {
    let text = json
        .as_str()
        .ok_or_else(|| codec_error("bytes must be a JSON string"))?;
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).map_err(|_| codec_error("bytes code point above 255")))
        .collect()
}

fn float_to_json(value: f64) -> LoadTestResult<Json> {
    Number::from_f64(value)
        .map(Json::Number)
        .ok_or_else(|| codec_error(format!("{} has no JSON representation", value)))
}

/// Renders `value` in the Avro JSON encoding of `schema`.
pub fn to_json(schema: &Schema, value: &Value) -> LoadTestResult<Json> {
    match (schema, value) {
        (Schema::Null, Value::Null) => Ok(Json::Null),
        (Schema::Boolean, Value::Boolean(b)) => Ok(Json::Bool(*b)),
        (Schema::Int, Value::Int(v)) => Ok(Json::from(*v)),
        (Schema::Long, Value::Long(v)) => Ok(Json::from(*v)),
        (Schema::Long, Value::Int(v)) => Ok(Json::from(i64::from(*v))),
        (Schema::Float, Value::Float(v)) => float_to_json(f64::from(*v)),
        (Schema::Double, Value::Double(v)) => float_to_json(*v),
        (Schema::Double, Value::Float(v)) => float_to_json(f64::from(*v)),
        (Schema::String, Value::String(s)) => Ok(Json::String(s.clone())),
        (Schema::Bytes, Value::Bytes(bytes)) => Ok(bytes_to_json(bytes)),
        (Schema::Fixed(_), Value::Fixed(_, bytes)) => Ok(bytes_to_json(bytes)),
        (Schema::Enum(_), Value::Enum(_, symbol)) => Ok(Json::String(symbol.clone())),
        (Schema::Array(array), Value::Array(items)) => items
            .iter()
            .map(|item| to_json(&array.items, item))
            .collect::<LoadTestResult<Vec<_>>>()
            .map(Json::Array),
        (Schema::Map(map), Value::Map(entries)) => {
            let mut object = Map::new();
            for (key, item) in entries {
                object.insert(key.clone(), to_json(&map.types, item)?);
            }
            Ok(Json::Object(object))
        }
        (Schema::Record(record), Value::Record(fields)) => record_to_json(&record.fields, fields),
        (Schema::Union(union), value) => union_to_json(union, value),
        (schema, value) => Err(codec_error(format!(
            "value {:?} does not match schema {}",
            value,
            branch_name(schema)
        ))),
    }
}

fn record_to_json(schema_fields: &[RecordField], fields: &[(String, Value)]) -> LoadTestResult<Json> {
    let mut object = Map::new();
    for schema_field in schema_fields {
        let value = fields
            .iter()
            .find(|(name, _)| *name == schema_field.name)
            .map(|(_, value)| value)
            .ok_or_else(|| codec_error(format!("record is missing field '{}'", schema_field.name)))?;
        object.insert(schema_field.name.clone(), to_json(&schema_field.schema, value)?);
    }
    Ok(Json::Object(object))
}

fn union_to_json(union: &UnionSchema, value: &Value) -> LoadTestResult<Json> {
    let (index, inner) = match value {
        Value::Union(index, inner) => (*index as usize, inner.as_ref()),
        Value::Null => {
            let index = union
                .variants()
                .iter()
                .position(|variant| matches!(variant, Schema::Null))
                .ok_or_else(|| codec_error("null value for a union without a null branch"))?;
            (index, value)
        }
        other => return Err(codec_error(format!("expected a union value, got {:?}", other))),
    };
    let variant = union
        .variants()
        .get(index)
        .ok_or_else(|| codec_error(format!("union branch {} out of range", index)))?;
    if matches!(variant, Schema::Null) {
        return Ok(Json::Null);
    }
    let mut object = Map::new();
    object.insert(branch_name(variant), to_json(variant, inner)?);
    Ok(Json::Object(object))
}

/// Parses the Avro JSON encoding of `schema` back into an Avro value.
pub fn from_json(schema: &Schema, json: &Json) -> LoadTestResult<Value> {
    let mismatch = || codec_error(format!("JSON {} does not match schema {}", json, branch_name(schema)));
    match schema {
        Schema::Null => json.is_null().then_some(Value::Null).ok_or_else(mismatch),
        Schema::Boolean => json.as_bool().map(Value::Boolean).ok_or_else(mismatch),
        Schema::Int => json
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Value::Int)
            .ok_or_else(mismatch),
        Schema::Long => json.as_i64().map(Value::Long).ok_or_else(mismatch),
        Schema::Float => json.as_f64().map(|v| Value::Float(v as f32)).ok_or_else(mismatch),
        Schema::Double => json.as_f64().map(Value::Double).ok_or_else(mismatch),
        Schema::String => json
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(mismatch),
        Schema::Bytes => bytes_from_json(json).map(Value::Bytes),
        Schema::Fixed(fixed) => {
            let bytes = bytes_from_json(json)?;
            if bytes.len() != fixed.size {
                return Err(mismatch());
            }
            Ok(Value::Fixed(fixed.size, bytes))
        }
        Schema::Enum(enum_schema) => {
            let symbol = json.as_str().ok_or_else(mismatch)?;
            let index = enum_schema
                .symbols
                .iter()
                .position(|s| s == symbol)
                .ok_or_else(mismatch)?;
            Ok(Value::Enum(index as u32, symbol.to_string()))
        }
        Schema::Array(array) => json
            .as_array()
            .ok_or_else(mismatch)?
            .iter()
            .map(|item| from_json(&array.items, item))
            .collect::<LoadTestResult<Vec<_>>>()
            .map(Value::Array),
        Schema::Map(map) => {
            let object = json.as_object().ok_or_else(mismatch)?;
            let mut entries = HashMap::with_capacity(object.len());
            for (key, item) in object {
                entries.insert(key.clone(), from_json(&map.types, item)?);
            }
            Ok(Value::Map(entries))
        }
        Schema::Record(record) => {
            let object = json.as_object().ok_or_else(mismatch)?;
            let mut fields = Vec::with_capacity(record.fields.len());
            for schema_field in &record.fields {
                let value = match object.get(&schema_field.name) {
                    Some(item) => from_json(&schema_field.schema, item)?,
                    None => field_default(schema_field)?,
                };
                fields.push((schema_field.name.clone(), value));
            }
            Ok(Value::Record(fields))
        }
        Schema::Union(union) => union_from_json(union, json),
        _ => Err(codec_error(format!("unsupported schema {}", branch_name(schema)))),
    }
}

/// Value of a field left out of a JSON record. A union default is a bare
/// value of its first branch.
fn field_default(field: &RecordField) -> LoadTestResult<Value> {
    let first_null = matches!(&field.schema, Schema::Union(u) if u.variants().first() == Some(&Schema::Null));
    match (&field.default, &field.schema) {
        (Some(default), Schema::Union(union)) => {
            let first = union
                .variants()
                .first()
                .ok_or_else(|| codec_error(format!("field '{}' has an empty union", field.name)))?;
            Ok(Value::Union(0, Box::new(from_json(first, default)?)))
        }
        (Some(default), schema) => from_json(schema, default),
        (None, _) if first_null => Ok(Value::Union(0, Box::new(Value::Null))),
        (None, _) => Err(codec_error(format!("JSON record is missing field '{}'", field.name))),
    }
}

fn union_from_json(union: &UnionSchema, json: &Json) -> LoadTestResult<Value> {
    if json.is_null() {
        let index = union
            .variants()
            .iter()
            .position(|variant| matches!(variant, Schema::Null))
            .ok_or_else(|| codec_error("null for a union without a null branch"))?;
        return Ok(Value::Union(index as u32, Box::new(Value::Null)));
    }
    let object = json
        .as_object()
        .filter(|object| object.len() == 1)
        .ok_or_else(|| codec_error(format!("union value {} must be a single-entry object", json)))?;
    let (name, inner) = object
        .iter()
        .next()
        .ok_or_else(|| codec_error("empty union object"))?;
    let (index, variant) = union
        .variants()
        .iter()
        .enumerate()
        .find(|(_, variant)| branch_name(variant) == *name)
        .ok_or_else(|| codec_error(format!("union has no branch named '{}'", name)))?;
    Ok(Value::Union(index as u32, Box::new(from_json(variant, inner)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AvroRecord, ObservationKey};
    use serde_json::json;

    #[test]
    fn observation_key_wraps_union_branch() {
        let key = ObservationKey::new("radar", "sub-1", "src-1");
        let rendered = to_json(ObservationKey::schema(), &key.to_avro()).unwrap();
        assert_eq!(
            rendered,
            json!({"projectId": {"string": "radar"}, "userId": "sub-1", "sourceId": "src-1"})
        );
    }

    #[test]
    fn null_union_branch_renders_as_json_null() {
        let key = ObservationKey {
            project_id: None,
            user_id: "sub-1".to_string(),
            source_id: "src-1".to_string(),
        };
        let rendered = to_json(ObservationKey::schema(), &key.to_avro()).unwrap();
        assert_eq!(rendered["projectId"], Json::Null);

        let parsed = from_json(ObservationKey::schema(), &rendered).unwrap();
        assert_eq!(ObservationKey::from_avro(&parsed).unwrap(), key);
    }

    #[test]
    fn bytes_round_trip_through_latin1_string() {
        let bytes = vec![0u8, 127, 128, 255];
        let rendered = to_json(&Schema::Bytes, &Value::Bytes(bytes.clone())).unwrap();
        assert_eq!(from_json(&Schema::Bytes, &rendered).unwrap(), Value::Bytes(bytes));
    }

    #[test]
    fn unknown_union_branch_is_rejected() {
        let json = json!({"projectId": {"long": 3}, "userId": "u", "sourceId": "s"});
        assert!(from_json(ObservationKey::schema(), &json).is_err());
    }

    #[test]
    fn mismatched_value_is_rejected() {
        assert!(to_json(&Schema::String, &Value::Int(3)).is_err());
    }

    #[test]
    fn absent_fields_take_their_defaults() {
        let schema = Schema::parse_str(
            r#"{"type": "record", "name": "Note", "fields": [
                {"name": "text", "type": "string"},
                {"name": "arm", "type": "string", "default": "control"},
                {"name": "score", "type": ["int", "null"], "default": 7},
                {"name": "tag", "type": ["null", "string"], "default": null}
            ]}"#,
        )
        .unwrap();

        let parsed = from_json(&schema, &json!({"text": "hi"})).unwrap();
        assert_eq!(
            parsed,
            Value::Record(vec![
                ("text".to_string(), Value::String("hi".to_string())),
                ("arm".to_string(), Value::String("control".to_string())),
                ("score".to_string(), Value::Union(0, Box::new(Value::Int(7)))),
                ("tag".to_string(), Value::Union(0, Box::new(Value::Null))),
            ])
        );

        let err = from_json(&schema, &json!({"arm": "treatment"})).unwrap_err();
        assert!(err.to_string().contains("text"));
    }
}
