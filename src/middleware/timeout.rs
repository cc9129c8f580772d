use crate::context::Context;
use crate::error::ServerError;
use crate::middleware::{Middleware, MiddlewareResult, Next};
use std::time::Duration;

/// Fails the request with 408 when the inner chain takes longer than `limit`.
///
/// On expiry the inner future is dropped, which cancels the handler at its
/// next `.await` and releases its context.
#[derive(Clone, Copy, Debug)]
pub struct Timeout {
    limit: Duration,
}

impl Timeout {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }
}

impl Middleware for Timeout {
    fn call(&self, ctx: Context, next: Next) -> MiddlewareResult {
        let limit = self.limit;
        Box::pin(async move {
            let path = ctx.path().to_string();
            match tokio::time::timeout(limit, next.handle(ctx)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(path = %path, limit_ms = limit.as_millis() as u64, "request timed out");
                    Err(ServerError::Timeout)
                }
            }
        })
    }
}
