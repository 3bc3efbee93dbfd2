//! Per-session state threaded through a scenario's steps.

use loadtest_core::{DataError, LoadTestResult, SchemaIds, TokenPair};

/// State of one virtual session.
///
/// Created when the session starts and dropped when it ends. Steps fill the
/// fields in order; reading a field an earlier step should have set is a
/// [`DataError`].
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    phase: String,
    index: usize,
    pub external_id: Option<String>,
    pub login: Option<String>,
    pub admin_token: Option<String>,
    pub tokens: Option<TokenPair>,
    pub source_id: Option<String>,
    pub topic: Option<String>,
    pub schema_ids: Option<SchemaIds>,
}

impl SessionContext {
    pub fn new(phase: impl Into<String>, index: usize) -> Self {
        Self {
            phase: phase.into(),
            index,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn label(&self) -> String {
        format!("{} session {}", self.phase, self.index)
    }

    fn require<'a, T>(&self, value: &'a Option<T>, field: &str) -> LoadTestResult<&'a T> {
        value
            .as_ref()
            .ok_or_else(|| DataError::new(self.label(), field).into())
    }

    pub fn require_external_id(&self) -> LoadTestResult<&str> {
        self.require(&self.external_id, "externalId").map(String::as_str)
    }

    pub fn require_login(&self) -> LoadTestResult<&str> {
        self.require(&self.login, "login").map(String::as_str)
    }

    pub fn require_admin_token(&self) -> LoadTestResult<&str> {
        self.require(&self.admin_token, "admin access token").map(String::as_str)
    }

    pub fn require_tokens(&self) -> LoadTestResult<&TokenPair> {
        self.require(&self.tokens, "token pair")
    }

    pub fn require_source_id(&self) -> LoadTestResult<&str> {
        self.require(&self.source_id, "sourceId").map(String::as_str)
    }

    pub fn require_topic(&self) -> LoadTestResult<&str> {
        self.require(&self.topic, "topic").map(String::as_str)
    }

    pub fn require_schema_ids(&self) -> LoadTestResult<SchemaIds> {
        self.require(&self.schema_ids, "schema ids").copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadtest_core::{is_data_error, LoadTestError};

    #[test]
    fn missing_field_names_session_and_field() {
        let session = SessionContext::new("ingestion", 7);
        let err = session.require_login().unwrap_err();
        assert!(is_data_error(&err));
        match err {
            LoadTestError::Data(e) => {
                assert_eq!(e.operation, "ingestion session 7");
                assert_eq!(e.missing, "login");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn set_fields_are_returned() {
        let mut session = SessionContext::new("registration", 0);
        session.login = Some("login-3".to_string());
        session.schema_ids = Some(SchemaIds { key: 1, value: 2 });
        assert_eq!(session.require_login().unwrap(), "login-3");
        assert_eq!(session.require_schema_ids().unwrap(), SchemaIds { key: 1, value: 2 });
        assert!(session.require_source_id().is_err());
    }
}
