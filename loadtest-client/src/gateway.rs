//! Ingestion gateway (Kafka REST proxy) endpoints.

use loadtest_codec::EncodedPayload;
use loadtest_core::{ExpectedStatus, LoadTestResult};

use crate::options::ClientOptions;
use crate::transport::{BoxedTransport, HttpRequest};

#[derive(Clone)]
pub struct GatewayClient {
    transport: BoxedTransport,
    prefix: String,
}

impl GatewayClient {
    pub fn new(transport: BoxedTransport, options: &ClientOptions) -> Self {
        Self {
            transport,
            prefix: options.gateway_path.trim_end_matches('/').to_string(),
        }
    }

    /// Succeeds when the topic exists (200).
    pub async fn topic_exists(&self, token: &str, topic: &str) -> LoadTestResult<()> {
        const OPERATION: &str = "Check topic exists";
        let request = HttpRequest::get(OPERATION, format!("{}/topics/{}", self.prefix, topic)).bearer(token);
        self.transport
            .execute(request)
            .await?
            .expect(OPERATION, &ExpectedStatus::one(200))?;
        Ok(())
    }

    /// Posts an encoded payload to a topic. Returns the response status.
    pub async fn send(&self, token: &str, topic: &str, payload: &EncodedPayload) -> LoadTestResult<u16> {
        let name = format!("Send {} data", payload.format);
        let request = HttpRequest::post(name.clone(), format!("{}/topics/{}", self.prefix, topic))
            .bearer(token)
            .bytes(payload.content_type.clone(), payload.body.clone());
        let response = self
            .transport
            .execute(request)
            .await?
            .expect(&name, &ExpectedStatus::success())?;
        tracing::debug!(topic, records = payload.records, status = response.status, "payload accepted");
        Ok(response.status)
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("prefix", &self.prefix)
            .finish()
    }
}
