//! Records sent to the ingestion gateway and their Avro value mapping.

use apache_avro::types::Value;
use apache_avro::Schema;
use loadtest_core::{LoadTestError, LoadTestResult};

use crate::schemas;

/// A Rust type with a compile-time Avro schema.
pub trait AvroRecord: Sized {
    fn schema() -> &'static Schema;

    /// Avro value conforming to [`AvroRecord::schema`].
    fn to_avro(&self) -> Value;

    fn from_avro(value: &Value) -> LoadTestResult<Self>;
}

/// Key of every observation: project, user and source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationKey {
    pub project_id: Option<String>,
    pub user_id: String,
    pub source_id: String,
}

impl ObservationKey {
    pub fn new(project_id: impl Into<String>, user_id: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            user_id: user_id.into(),
            source_id: source_id.into(),
        }
    }
}

impl AvroRecord for ObservationKey {
    fn schema() -> &'static Schema {
        schemas::observation_key()
    }

    fn to_avro(&self) -> Value {
        Value::Record(vec![
            ("projectId".to_string(), optional_string(&self.project_id)),
            ("userId".to_string(), Value::String(self.user_id.clone())),
            ("sourceId".to_string(), Value::String(self.source_id.clone())),
        ])
    }

    fn from_avro(value: &Value) -> LoadTestResult<Self> {
        let fields = record_fields(value, "ObservationKey")?;
        Ok(Self {
            project_id: as_optional_string(field(fields, "projectId")?)?,
            user_id: as_string(field(fields, "userId")?)?,
            source_id: as_string(field(fields, "sourceId")?)?,
        })
    }
}

/// Value branch of an answer: `["int", "string", "double"]`.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerValue {
    Int(i32),
    String(String),
    Double(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub question_id: Option<String>,
    pub value: AnswerValue,
    pub start_time: f64,
    pub end_time: f64,
}

impl Answer {
    fn to_avro(&self) -> Value {
        let value = match &self.value {
            AnswerValue::Int(v) => Value::Union(0, Box::new(Value::Int(*v))),
            AnswerValue::String(v) => Value::Union(1, Box::new(Value::String(v.clone()))),
            AnswerValue::Double(v) => Value::Union(2, Box::new(Value::Double(*v))),
        };
        Value::Record(vec![
            ("questionId".to_string(), optional_string(&self.question_id)),
            ("value".to_string(), value),
            ("startTime".to_string(), Value::Double(self.start_time)),
            ("endTime".to_string(), Value::Double(self.end_time)),
        ])
    }

    fn from_avro(value: &Value) -> LoadTestResult<Self> {
        let fields = record_fields(value, "Answer")?;
        let value = match unwrap_union(field(fields, "value")?) {
            Value::Int(v) => AnswerValue::Int(*v),
            Value::String(v) => AnswerValue::String(v.clone()),
            Value::Double(v) => AnswerValue::Double(*v),
            other => return Err(unexpected("Answer.value", other)),
        };
        Ok(Self {
            question_id: as_optional_string(field(fields, "questionId")?)?,
            value,
            start_time: as_double(field(fields, "startTime")?)?,
            end_time: as_double(field(fields, "endTime")?)?,
        })
    }
}

/// One completed questionnaire with its answers.
#[derive(Debug, Clone, PartialEq)]
pub struct Questionnaire {
    pub time: f64,
    pub time_completed: f64,
    pub time_notification: Option<f64>,
    pub name: String,
    pub version: String,
    pub answers: Vec<Answer>,
}

impl Questionnaire {
    /// Answer timestamps strictly increase by `step`, and `time` and
    /// `time_completed` bound every answer.
    pub fn check_timeline(&self, step: f64) -> LoadTestResult<()> {
        let defect = |msg: String| Err(LoadTestError::GeneratorDefect(msg));
        for pair in self.answers.windows(2) {
            let delta = pair[1].start_time - pair[0].start_time;
            let tolerance = f64::EPSILON * 64.0 * pair[1].start_time.abs().max(1.0);
            if delta <= 0.0 || (delta - step).abs() > tolerance {
                return defect(format!("answer step {} differs from {}", delta, step));
            }
        }
        for answer in &self.answers {
            if answer.start_time < self.time || answer.end_time > self.time_completed {
                return defect(format!(
                    "answer at {} outside questionnaire [{}, {}]",
                    answer.start_time, self.time, self.time_completed
                ));
            }
        }
        if let (Some(first), Some(last)) = (self.answers.first(), self.answers.last()) {
            if first.start_time != self.time || last.end_time != self.time_completed {
                return defect("questionnaire bounds differ from first/last answer".to_string());
            }
        }
        Ok(())
    }
}

impl AvroRecord for Questionnaire {
    fn schema() -> &'static Schema {
        schemas::questionnaire()
    }

    fn to_avro(&self) -> Value {
        let notification = match self.time_notification {
            Some(t) => Value::Union(1, Box::new(Value::Double(t))),
            None => Value::Union(0, Box::new(Value::Null)),
        };
        Value::Record(vec![
            ("time".to_string(), Value::Double(self.time)),
            ("timeCompleted".to_string(), Value::Double(self.time_completed)),
            ("timeNotification".to_string(), notification),
            ("name".to_string(), Value::String(self.name.clone())),
            ("version".to_string(), Value::String(self.version.clone())),
            (
                "answers".to_string(),
                Value::Array(self.answers.iter().map(Answer::to_avro).collect()),
            ),
        ])
    }

    fn from_avro(value: &Value) -> LoadTestResult<Self> {
        let fields = record_fields(value, "Questionnaire")?;
        let time_notification = match unwrap_union(field(fields, "timeNotification")?) {
            Value::Null => None,
            other => Some(as_double(other)?),
        };
        let answers = match field(fields, "answers")? {
            Value::Array(items) => items.iter().map(Answer::from_avro).collect::<LoadTestResult<_>>()?,
            other => return Err(unexpected("Questionnaire.answers", other)),
        };
        Ok(Self {
            time: as_double(field(fields, "time")?)?,
            time_completed: as_double(field(fields, "timeCompleted")?)?,
            time_notification,
            name: as_string(field(fields, "name")?)?,
            version: as_string(field(fields, "version")?)?,
            answers,
        })
    }
}

/// Aggregated binary envelope: values of a single source, each already
/// encoded with the registry's value schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet {
    pub key_schema_version: i32,
    pub value_schema_version: i32,
    pub project_id: Option<String>,
    pub user_id: Option<String>,
    pub source_id: String,
    pub data: Vec<Vec<u8>>,
}

impl AvroRecord for RecordSet {
    fn schema() -> &'static Schema {
        schemas::record_set()
    }

    fn to_avro(&self) -> Value {
        Value::Record(vec![
            ("keySchemaVersion".to_string(), Value::Int(self.key_schema_version)),
            ("valueSchemaVersion".to_string(), Value::Int(self.value_schema_version)),
            ("projectId".to_string(), optional_string(&self.project_id)),
            ("userId".to_string(), optional_string(&self.user_id)),
            ("sourceId".to_string(), Value::String(self.source_id.clone())),
            (
                "data".to_string(),
                Value::Array(self.data.iter().cloned().map(Value::Bytes).collect()),
            ),
        ])
    }

    fn from_avro(value: &Value) -> LoadTestResult<Self> {
        let fields = record_fields(value, "RecordSet")?;
        let data = match field(fields, "data")? {
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Bytes(bytes) => Ok(bytes.clone()),
                    other => Err(unexpected("RecordSet.data", other)),
                })
                .collect::<LoadTestResult<_>>()?,
            other => return Err(unexpected("RecordSet.data", other)),
        };
        Ok(Self {
            key_schema_version: as_int(field(fields, "keySchemaVersion")?)?,
            value_schema_version: as_int(field(fields, "valueSchemaVersion")?)?,
            project_id: as_optional_string(field(fields, "projectId")?)?,
            user_id: as_optional_string(field(fields, "userId")?)?,
            source_id: as_string(field(fields, "sourceId")?)?,
            data,
        })
    }
}

fn optional_string(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::Union(1, Box::new(Value::String(s.clone()))),
        None => Value::Union(0, Box::new(Value::Null)),
    }
}

fn unexpected(location: &str, value: &Value) -> LoadTestError {
    LoadTestError::Codec(format!("unexpected avro value at {}: {:?}", location, value))
}

fn record_fields<'a>(value: &'a Value, name: &str) -> LoadTestResult<&'a [(String, Value)]> {
    match value {
        Value::Record(fields) => Ok(fields),
        other => Err(unexpected(name, other)),
    }
}

fn field<'a>(fields: &'a [(String, Value)], name: &str) -> LoadTestResult<&'a Value> {
    fields
        .iter()
        .find(|(field_name, _)| field_name == name)
        .map(|(_, value)| value)
        .ok_or_else(|| LoadTestError::Codec(format!("missing avro field '{}'", name)))
}

fn unwrap_union(value: &Value) -> &Value {
    match value {
        Value::Union(_, inner) => inner,
        other => other,
    }
}

fn as_string(value: &Value) -> LoadTestResult<String> {
    match unwrap_union(value) {
        Value::String(s) => Ok(s.clone()),
        other => Err(unexpected("string field", other)),
    }
}

fn as_optional_string(value: &Value) -> LoadTestResult<Option<String>> {
    match unwrap_union(value) {
        Value::Null => Ok(None),
        other => as_string(other).map(Some),
    }
}

fn as_double(value: &Value) -> LoadTestResult<f64> {
    match unwrap_union(value) {
        Value::Double(v) => Ok(*v),
        Value::Float(v) => Ok(f64::from(*v)),
        other => Err(unexpected("double field", other)),
    }
}

fn as_int(value: &Value) -> LoadTestResult<i32> {
    match unwrap_union(value) {
        Value::Int(v) => Ok(*v),
        other => Err(unexpected("int field", other)),
    }
}
