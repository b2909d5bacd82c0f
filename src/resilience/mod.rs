pub mod circuit_breaker;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitConfig, CircuitState};
pub use error::{CallError, FailureKind};
pub use metrics::{CircuitSnapshot, Outcome};
pub use registry::CircuitBreakerRegistry;
pub use retry::{retry_with_backoff, RetryConfig, RetryExhausted, RetryableError};
