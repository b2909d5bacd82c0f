use std::sync::Arc;

use bytes::Bytes;
use reqwest::Method;
use tracing::{debug, warn};

use crate::client::caller::{CallRequest, HttpCaller};
use crate::resilience::{CallError, CircuitBreakerRegistry, FailureKind};

/// Downstream calls through a named circuit, with retries inside each admitted call
pub struct ResilientClient {
    registry: Arc<CircuitBreakerRegistry>,
    caller: HttpCaller,
}

impl ResilientClient {
    pub fn new(registry: Arc<CircuitBreakerRegistry>, caller: HttpCaller) -> Self {
        Self { registry, caller }
    }

    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    /// Call `url` through the circuit `breaker_name`.
    ///
    /// Returns the complete response body or an error, never both.
    pub async fn call_using_circuit_breaker(
        &self,
        breaker_name: &str,
        url: &str,
        method: Method,
    ) -> Result<Bytes, CallError> {
        self.perform_request(breaker_name, CallRequest::new(method, url))
            .await
    }

    /// Like [`call_using_circuit_breaker`](Self::call_using_circuit_breaker) for a prepared
    /// request, e.g. one carrying trace headers
    pub async fn perform_request(
        &self,
        breaker_name: &str,
        request: CallRequest,
    ) -> Result<Bytes, CallError> {
        let caller = &self.caller;
        let request = &request;

        let result = self
            .registry
            .call(
                breaker_name,
                move || async move {
                    caller
                        .execute(request)
                        .await
                        .map_err(|exhausted| CallError::from_attempts(exhausted.attempts, exhausted.last))
                },
                |err| {
                    let state = self.registry.get(breaker_name).map(|c| c.state());
                    debug!(
                        circuit = %breaker_name,
                        error = %err,
                        state = ?state,
                        "In fallback function for breaker"
                    );
                    Err(err)
                },
            )
            .await;

        if result.is_ok() {
            debug!(circuit = %breaker_name, "Call in breaker successful");
        }
        result
    }
}

/// Turn a failed protected call into `fallback()`. Every error kind degrades the same way;
/// the kind only decides how loudly it is logged.
pub fn fallback_on_error<T>(
    breaker_name: &str,
    result: Result<T, CallError>,
    fallback: impl FnOnce() -> T,
) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            match err.kind() {
                FailureKind::CircuitOpen => {
                    debug!(circuit = %breaker_name, "Circuit open, serving fallback")
                }
                kind @ (FailureKind::MaxConcurrency
                | FailureKind::Timeout
                | FailureKind::ExhaustedRetries
                | FailureKind::Unreachable) => {
                    warn!(circuit = %breaker_name, %kind, error = %err, "Serving fallback")
                }
            }
            fallback()
        }
    }
}
