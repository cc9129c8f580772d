use crate::context::Context;
use crate::error::ServerError;
use crate::middleware::{Middleware, MiddlewareResult, Next};
use std::sync::Arc;

/// Data-bag key under which an accepted token is exposed to inner handlers.
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Rejects requests whose `Authorization` header is missing or fails `validate`.
///
/// A leading `Bearer ` is stripped before the token reaches the validator.
#[derive(Clone)]
pub struct Auth {
    validate: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl Auth {
    pub fn new<F>(validate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            validate: Arc::new(validate),
        }
    }
}

impl Middleware for Auth {
    fn call(&self, mut ctx: Context, next: Next) -> MiddlewareResult {
        let validate = Arc::clone(&self.validate);
        Box::pin(async move {
            let token = match ctx.header("authorization").map(str::trim) {
                Some(value) if !value.is_empty() => {
                    value.strip_prefix("Bearer ").unwrap_or(value).trim().to_string()
                }
                _ => {
                    return Err(ServerError::Unauthorized("Authentication required".into()));
                }
            };

            if !validate(&token) {
                tracing::debug!(path = %ctx.path(), "rejected authentication token");
                return Err(ServerError::Unauthorized("Invalid authentication token".into()));
            }

            ctx.set_data(AUTH_TOKEN_KEY, token);
            next.handle(ctx).await
        })
    }
}
