use crate::context::Context;
use crate::error::ServerResult;
use crate::http::Response;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

pub type HttpResponse = ServerResult<Response>;

pub type HandlerFuture = BoxFuture<'static, HttpResponse>;

/// Terminal request handler: takes the request context, produces the response.
///
/// Implemented for every `Fn(Context) -> impl Future<Output = HttpResponse>`,
/// so plain async closures can be registered directly.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> HandlerFuture;
}

impl<F, R> Handler for F
where
    F: Fn(Context) -> R + Send + Sync + 'static,
    R: Future<Output = HttpResponse> + Send + 'static,
{
    fn call(&self, ctx: Context) -> HandlerFuture {
        Box::pin((self)(ctx))
    }
}

pub type BoxedHandler = Arc<dyn Handler>;
