use crate::context::Context;
use crate::error::ServerError;
use crate::middleware::{Middleware, MiddlewareResult, Next};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;

/// Turns a panic anywhere below it into `ServerError::Panic`, which the error
/// boundary reports as a plain 500.
#[derive(Clone, Copy, Debug, Default)]
pub struct Recovery;

impl Middleware for Recovery {
    fn call(&self, ctx: Context, next: Next) -> MiddlewareResult {
        Box::pin(async move {
            let method = ctx.method();
            let path = ctx.path().to_string();
            // The inner call runs inside the async block so a panic while
            // building the future is caught as well.
            let result = AssertUnwindSafe(async move { next.handle(ctx).await })
                .catch_unwind()
                .await;
            result.unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                tracing::error!(method = %method, path = %path, panic = %message, "recovered from panic");
                Err(ServerError::Panic(message))
            })
        })
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "Unknown panic".to_string()
    }
}
