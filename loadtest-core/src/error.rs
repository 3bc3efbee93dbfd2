//! Error types for the ingestion load test.
//!
//! Every step of a virtual session either succeeds or fails with one of the
//! errors below. A failure aborts the remaining steps of that session only.

use std::fmt;
use thiserror::Error;

/// Connection-level failure: refused connection, reset, timeout.
#[derive(Debug, Clone, Error)]
#[error("TransportError: operation={operation}, timed_out={timed_out}, message={message}")]
pub struct TransportError {
    pub operation: String,
    pub message: String,
    pub timed_out: bool,
}

impl TransportError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            timed_out: true,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

/// The server answered with a status the calling step does not accept.
#[derive(Debug, Clone, Error)]
#[error("ProtocolError: operation={operation}, expected={expected}, actual={actual}, body={body}")]
pub struct ProtocolError {
    pub operation: String,
    pub expected: ExpectedStatus,
    pub actual: u16,
    pub body: String,
}

/// Maximum number of response body bytes kept in a [`ProtocolError`].
const BODY_EXCERPT_LEN: usize = 256;

impl ProtocolError {
    pub fn new(
        operation: impl Into<String>,
        expected: ExpectedStatus,
        actual: u16,
        body: &[u8],
    ) -> Self {
        let mut body = String::from_utf8_lossy(body).into_owned();
        if body.len() > BODY_EXCERPT_LEN {
            let mut cut = BODY_EXCERPT_LEN;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Self {
            operation: operation.into(),
            expected,
            actual,
            body,
        }
    }

    pub fn actual(&self) -> u16 {
        self.actual
    }
}

/// Statuses a step was prepared to handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedStatus(pub Vec<u16>);

impl ExpectedStatus {
    pub fn one(status: u16) -> Self {
        Self(vec![status])
    }

    pub fn any_of(statuses: &[u16]) -> Self {
        Self(statuses.to_vec())
    }

    /// The 2xx class.
    pub fn success() -> Self {
        Self(Vec::new())
    }

    pub fn accepts(&self, status: u16) -> bool {
        if self.0.is_empty() {
            (200..300).contains(&status)
        } else {
            self.0.contains(&status)
        }
    }
}

impl fmt::Display for ExpectedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "2xx");
        }
        let joined: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", joined.join("|"))
    }
}

/// A value the step depends on is absent: a response field, a cached entry,
/// a session field or a feed record.
#[derive(Debug, Clone, Error)]
#[error("DataError: operation={operation}, missing={missing}")]
pub struct DataError {
    pub operation: String,
    pub missing: String,
}

impl DataError {
    pub fn new(operation: impl Into<String>, missing: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            missing: missing.into(),
        }
    }
}

/// Main error type for the load test.
#[derive(Debug, Error)]
pub enum LoadTestError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Data(#[from] DataError),

    /// The synthetic data generator produced an invalid record. Never
    /// expected at runtime.
    #[error("Generator defect: {0}")]
    GeneratorDefect(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Phase '{phase}' aborted after {failures} failed sessions")]
    PhaseAborted { phase: String, failures: usize },
}

impl LoadTestError {
    /// Only connection-level failures may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoadTestError::Transport(_))
    }

    /// HTTP status of a protocol error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            LoadTestError::Protocol(e) => Some(e.actual),
            _ => None,
        }
    }
}

impl From<apache_avro::Error> for LoadTestError {
    fn from(err: apache_avro::Error) -> Self {
        LoadTestError::Codec(err.to_string())
    }
}

impl From<serde_json::Error> for LoadTestError {
    fn from(err: serde_json::Error) -> Self {
        LoadTestError::Codec(err.to_string())
    }
}

pub type LoadTestResult<T> = Result<T, LoadTestError>;

/// Helper functions to check error types
pub fn is_transport_error(err: &LoadTestError) -> bool {
    matches!(err, LoadTestError::Transport(_))
}

pub fn is_protocol_error(err: &LoadTestError) -> bool {
    matches!(err, LoadTestError::Protocol(_))
}

pub fn is_data_error(err: &LoadTestError) -> bool {
    matches!(err, LoadTestError::Data(_))
}

pub fn is_phase_aborted(err: &LoadTestError) -> bool {
    matches!(err, LoadTestError::PhaseAborted { .. })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_status_success_class() {
        let expected = ExpectedStatus::success();
        assert!(expected.accepts(200));
        assert!(expected.accepts(204));
        assert!(!expected.accepts(404));
        assert_eq!(expected.to_string(), "2xx");
    }

    #[test]
    fn expected_status_explicit_list() {
        let expected = ExpectedStatus::any_of(&[200, 404]);
        assert!(expected.accepts(404));
        assert!(!expected.accepts(201));
        assert_eq!(expected.to_string(), "200|404");
    }

    #[test]
    fn protocol_error_truncates_body() {
        let body = "é".repeat(400);
        let err = ProtocolError::new("Create project", ExpectedStatus::one(201), 500, body.as_bytes());
        assert!(err.body.len() <= BODY_EXCERPT_LEN);
        assert_eq!(err.actual(), 500);
    }

    #[test]
    fn only_transport_errors_are_retryable() {
        let transport: LoadTestError = TransportError::timeout("GET", "deadline").into();
        let data: LoadTestError = DataError::new("Send data", "sourceId").into();
        assert!(transport.is_retryable());
        assert!(!data.is_retryable());
        assert!(is_data_error(&data));
    }
}
