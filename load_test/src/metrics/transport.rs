//! Transport decorator feeding the request counters.

use async_trait::async_trait;
use std::time::Instant;

use loadtest_client::{BoxedTransport, HttpRequest, HttpResponse, HttpTransport};
use loadtest_core::LoadTestResult;

use super::collector::MetricsCollector;

/// Wraps a transport and records every request by name.
#[derive(Clone)]
pub struct InstrumentedTransport {
    inner: BoxedTransport,
    collector: MetricsCollector,
}

impl InstrumentedTransport {
    pub fn new(inner: BoxedTransport, collector: MetricsCollector) -> Self {
        Self { inner, collector }
    }
}

#[async_trait]
impl HttpTransport for InstrumentedTransport {
    async fn execute(&self, request: HttpRequest) -> LoadTestResult<HttpResponse> {
        let name = request.name.clone();
        let start = Instant::now();
        let result = self.inner.execute(request).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        let status = result.as_ref().ok().map(|response| response.status);
        self.collector.request_finished(&name, status, duration_ms);
        result
    }
}
