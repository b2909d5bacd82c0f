use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use tracing::{debug, error};

use crate::client::error::AttemptError;
use crate::observability::TraceContext;
use crate::resilience::retry::{retry_with_backoff, RetryConfig, RetryExhausted};

/// A body-less downstream request
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
}

impl CallRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Carry the caller's trace context on every attempt
    pub fn with_context(mut self, ctx: &TraceContext) -> Self {
        ctx.inject(&mut self.headers);
        self
    }
}

/// Executes one request with bounded retry and constant backoff
#[derive(Debug, Clone)]
pub struct HttpCaller {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl HttpCaller {
    /// Connections are not kept alive between calls, every attempt dials afresh
    pub fn new(retry: RetryConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(Self::with_client(client, retry))
    }

    pub fn with_client(client: reqwest::Client, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Returns the body of the first 2xx response, or the last failure once the budget is spent
    pub async fn execute(&self, request: &CallRequest) -> Result<Bytes, RetryExhausted<AttemptError>> {
        retry_with_backoff(&self.retry, move |attempt| self.attempt(request, attempt)).await
    }

    async fn attempt(&self, request: &CallRequest, attempt: u32) -> Result<Bytes, AttemptError> {
        debug!(attempt, method = %request.method, url = %request.url, "Calling downstream");

        let response = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone())
            .send()
            .await
            .map_err(AttemptError::from_send)?;

        let status = response.status().as_u16();
        if !(200..299).contains(&status) {
            error!(attempt, status, url = %request.url, "Downstream returned an error status");
            return Err(AttemptError::Status(status));
        }

        response.bytes().await.map_err(AttemptError::Body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use wiremock::{matchers::*, Mock, MockServer, ResponseTemplate};

    fn caller() -> HttpCaller {
        HttpCaller::new(RetryConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_execute_returns_body_on_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"quote":"X"}"#))
            .expect(1)
            .mount(&mock_server)
            .await;

        let request = CallRequest::get(format!("{}/api/quote", mock_server.uri()));
        let body = caller().execute(&request).await.unwrap();
        assert_eq!(body.as_ref(), br#"{"quote":"X"}"#);
    }

    #[tokio::test]
    async fn test_execute_succeeds_on_third_attempt() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let started = Instant::now();
        let request = CallRequest::get(format!("{}/flaky", mock_server.uri()));
        let body = caller().execute(&request).await.unwrap();

        assert_eq!(body.as_ref(), b"ok");
        assert!(started.elapsed() >= Duration::from_millis(200));
        let received = mock_server.received_requests().await.unwrap();
        assert_eq!(received.len(), 3);
    }

    #[tokio::test]
    async fn test_execute_gives_up_after_three_attempts() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&mock_server)
            .await;

        let request = CallRequest::get(format!("{}/down", mock_server.uri()));
        let exhausted = caller().execute(&request).await.unwrap_err();

        assert_eq!(exhausted.attempts, 3);
        assert!(matches!(exhausted.last, AttemptError::Status(503)));
    }

    #[tokio::test]
    async fn test_status_299_is_a_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(299))
            .mount(&mock_server)
            .await;

        let caller = HttpCaller::new(RetryConfig::new(1, Duration::ZERO)).unwrap();
        let exhausted = caller
            .execute(&CallRequest::get(mock_server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(exhausted.last, AttemptError::Status(299)));
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let caller = HttpCaller::new(RetryConfig::new(2, Duration::from_millis(10))).unwrap();
        let exhausted = caller
            .execute(&CallRequest::get("http://127.0.0.1:1/api/quote"))
            .await
            .unwrap_err();

        assert_eq!(exhausted.attempts, 2);
        assert!(exhausted.last.is_unreachable());
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_retried() {
        let exhausted = caller()
            .execute(&CallRequest::get("not a url"))
            .await
            .unwrap_err();

        assert_eq!(exhausted.attempts, 1);
        assert!(matches!(exhausted.last, AttemptError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_trace_headers_reach_downstream() {
        let mock_server = MockServer::start().await;
        let ctx = TraceContext::with_correlation_id("corr-1");
        Mock::given(method("GET"))
            .and(header("x-correlation-id", "corr-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let request = CallRequest::get(mock_server.uri()).with_context(&ctx);
        assert!(caller().execute(&request).await.is_ok());
    }
}
