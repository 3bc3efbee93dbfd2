//! Client options.

use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry of idempotent requests on transport failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    /// Total attempts including the first one. 1 disables retries.
    pub max_attempts: u32,
    pub initial_interval: Duration,
    /// Backoff coefficient (e.g., 2.0 for exponential)
    pub backoff_coefficient: f64,
    pub maximum_interval: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: Duration::from_millis(200),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(5),
        }
    }
}

impl RetryOptions {
    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_coefficient.max(1.0).powi(exponent);
        let seconds = (self.initial_interval.as_secs_f64() * factor).min(self.maximum_interval.as_secs_f64());
        Duration::try_from_secs_f64(seconds)
            .unwrap_or(self.maximum_interval)
            .min(self.maximum_interval)
    }
}

/// Client configuration options
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub management_path: String,
    pub schema_registry_path: String,
    pub gateway_path: String,
    pub request_timeout: Duration,
    pub retry: RetryOptions,
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
            management_path: "/managementportal".to_string(),
            schema_registry_path: "/schema".to_string(),
            gateway_path: "/kafka".to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryOptions::default(),
            user_agent: format!("radar-load-test/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_until_capped() {
        let retry = RetryOptions {
            max_attempts: 5,
            initial_interval: Duration::from_millis(100),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_millis(300),
        };
        assert_eq!(retry.backoff(1), Duration::from_millis(100));
        assert_eq!(retry.backoff(2), Duration::from_millis(200));
        assert_eq!(retry.backoff(3), Duration::from_millis(300));
        assert_eq!(retry.backoff(9), Duration::from_millis(300));
    }

    #[test]
    fn backoff_stays_capped_for_huge_attempt_counts() {
        let retry = RetryOptions {
            max_attempts: 100,
            ..RetryOptions::default()
        };
        assert_eq!(retry.backoff(80), retry.maximum_interval);
        assert_eq!(retry.backoff(u32::MAX), retry.maximum_interval);

        let nan = RetryOptions {
            backoff_coefficient: f64::NAN,
            ..RetryOptions::default()
        };
        assert!(nan.backoff(3) <= nan.maximum_interval);
    }
}
