//! The request handler seam between the connection loop and application code.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::ctx::RequestCtx;

/// Serves one request by filling in the native response on `ctx`.
///
/// The handler may set a full body, register a body stream callback, or hijack
/// the connection; the connection acts on whichever it finds once `call` returns.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: &mut RequestCtx);
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn call(&self, ctx: &mut RequestCtx) {
        (**self).call(ctx).await;
    }
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut RequestCtx) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn call(&self, ctx: &mut RequestCtx) {
        (self.f)(ctx).await;
    }
}

/// Wraps a closure that fills in the response synchronously or through a
/// `'static` future (the context borrow cannot be held across the future).
pub fn make_handler<F, Fut>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut RequestCtx) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    HandlerFn { f }
}
