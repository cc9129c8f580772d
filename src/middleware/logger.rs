use crate::context::Context;
use crate::middleware::{Middleware, MiddlewareResult, Next};
use std::time::Instant;

/// Emits one `tracing` event per request with method, path, status and latency.
#[derive(Clone, Copy, Debug, Default)]
pub struct Logger;

impl Middleware for Logger {
    fn call(&self, ctx: Context, next: Next) -> MiddlewareResult {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.method();
            let path = ctx.path().to_string();

            let result = next.handle(ctx).await;

            let elapsed_us = start.elapsed().as_micros() as u64;
            match &result {
                Ok(response) => tracing::info!(
                    method = %method,
                    path = %path,
                    status = response.status,
                    elapsed_us,
                    "request completed"
                ),
                Err(err) => tracing::warn!(
                    method = %method,
                    path = %path,
                    status = err.status_code(),
                    elapsed_us,
                    error = %err,
                    "request failed"
                ),
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use crate::http::{Request, Response};

    #[tokio::test]
    async fn logging_does_not_alter_the_outcome() {
        let ok = Logger
            .call(
                Context::detached(Request::get("/hello")),
                Next::handler(|_ctx: Context| async { Response::text("hi") }),
            )
            .await
            .unwrap();
        assert_eq!(ok.body_string(), "hi");

        let err = Logger
            .call(
                Context::detached(Request::get("/missing")),
                Next::handler(|_ctx: Context| async { Err::<Response, _>(ServerError::NotFound) }),
            )
            .await;
        assert!(matches!(err, Err(ServerError::NotFound)));
    }
}
