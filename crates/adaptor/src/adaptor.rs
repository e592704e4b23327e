use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use http::header::{self, HeaderValue};
use mime::Mime;
use tandem_http::ctx::RequestCtx;
use tandem_http::handler::Handler;
use tracing::warn;

use crate::config::AdaptorConfig;
use crate::request::{SyncHandler, project_request};
use crate::runner::HandlerRunner;

static TEXT_PLAIN: Mime = mime::TEXT_PLAIN_UTF_8;

/// Serves engine requests with a [`SyncHandler`].
///
/// ```no_run
/// use std::io::Write;
/// use tandem_adaptor::{Adaptor, Request, ResponseBridge};
/// use tandem_http::server::Server;
///
/// # async fn run() {
/// let adaptor = Adaptor::new(|w: &mut ResponseBridge, _req: Request| {
///     w.write_all(b"hello from a blocking handler").unwrap();
/// });
/// Server::builder().address("127.0.0.1:8080").unwrap().build().unwrap().start(adaptor).await.unwrap();
/// # }
/// ```
#[derive(Debug)]
pub struct Adaptor<H> {
    handler: Arc<H>,
    runner: HandlerRunner,
}

impl<H: SyncHandler> Adaptor<H> {
    pub fn new(handler: H) -> Self {
        Self::with_config(handler, AdaptorConfig::default())
    }

    pub fn with_config(handler: H, config: AdaptorConfig) -> Self {
        Self { handler: Arc::new(handler), runner: HandlerRunner::new(config) }
    }
}

#[async_trait]
impl<H: SyncHandler> Handler for Adaptor<H> {
    async fn call(&self, ctx: &mut RequestCtx) {
        let request = match project_request(ctx) {
            Ok(request) => request,
            Err(e) => {
                warn!(cause = %e, "reject request");
                ctx.set_status(StatusCode::BAD_REQUEST);
                ctx.set_header(header::CONTENT_TYPE, [HeaderValue::from_static(TEXT_PLAIN.as_ref())]);
                ctx.set_body(Bytes::from_static(b"400 Bad Request"));
                return;
            }
        };

        self.runner.run(Arc::clone(&self.handler), request, ctx).await;
    }
}
