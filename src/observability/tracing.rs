use reqwest::header::{HeaderMap, HeaderValue};
use uuid::Uuid;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Opaque tracing carrier handed from the request handler down to downstream calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    correlation_id: String,
    request_id: String,
}

impl TraceContext {
    /// Start a fresh trace
    pub fn new() -> Self {
        Self::with_correlation_id(Uuid::new_v4().to_string())
    }

    /// Continue the trace `correlation_id` with a new request id
    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Write the carrier into outgoing headers. Ids that are not valid header values are skipped.
    pub fn inject(&self, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&self.correlation_id) {
            headers.insert(CORRELATION_ID_HEADER, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.request_id) {
            headers.insert(REQUEST_ID_HEADER, value);
        }
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}
