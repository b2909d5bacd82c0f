pub mod middleware;
pub mod tracing;

pub use middleware::{trace_context, RequestTracingMiddleware};
pub use tracing::TraceContext;
