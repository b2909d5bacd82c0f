use poem::{Endpoint, Middleware, Request, Result as PoemResult};
use tracing::{info_span, Instrument};

use super::tracing::{TraceContext, CORRELATION_ID_HEADER};

/// Attaches a [`TraceContext`] to every incoming request
pub struct RequestTracingMiddleware;

impl<E: Endpoint> Middleware<E> for RequestTracingMiddleware {
    type Output = RequestTracingEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        RequestTracingEndpoint { ep }
    }
}

/// Endpoint wrapper that adds request tracing
pub struct RequestTracingEndpoint<E> {
    ep: E,
}

#[poem::async_trait]
impl<E: Endpoint> Endpoint for RequestTracingEndpoint<E> {
    type Output = E::Output;

    async fn call(&self, mut req: Request) -> PoemResult<Self::Output> {
        let ctx = req
            .header(CORRELATION_ID_HEADER)
            .map(TraceContext::with_correlation_id)
            .unwrap_or_default();

        let span = info_span!(
            "http_request",
            request_id = %ctx.request_id(),
            correlation_id = %ctx.correlation_id(),
            method = %req.method(),
            path = %req.uri().path(),
        );

        req.extensions_mut().insert(ctx);
        self.ep.call(req).instrument(span).await
    }
}

/// Trace context attached by [`RequestTracingMiddleware`], or a fresh one
pub fn trace_context(req: &Request) -> TraceContext {
    req.extensions()
        .get::<TraceContext>()
        .cloned()
        .unwrap_or_default()
}
