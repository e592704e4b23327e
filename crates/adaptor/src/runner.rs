//! Runs a [`SyncHandler`] on a blocking thread and turns the mode its response
//! settles into back into the engine's native response.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use http::header::{self, HeaderValue};
use http::StatusCode;
use mime::Mime;
use tandem_http::ctx::{BodySink, RequestCtx};
use tokio::runtime::Handle;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, trace};

use crate::bridge::{Committed, Mode, ModeSignal, ResponseBridge, Streaming};
use crate::config::AdaptorConfig;
use crate::pipe::PipeReader;
use crate::pool::{BRIDGE_POOL, SCRATCH_POOL};
use crate::request::{Request, SyncHandler};
use crate::sniff::{self, SNIFF_LEN};

static OCTET_STREAM: Mime = mime::APPLICATION_OCTET_STREAM;

/// Runs `handler` with the default [`AdaptorConfig`].
pub async fn run_handler<H: SyncHandler + ?Sized>(handler: Arc<H>, request: Request, ctx: &mut RequestCtx) {
    HandlerRunner::default().run(handler, request, ctx).await;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HandlerRunner {
    config: AdaptorConfig,
}

impl HandlerRunner {
    pub fn new(config: AdaptorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdaptorConfig {
        &self.config
    }

    /// Serves `request` with `handler` and fills in the response on `ctx`.
    ///
    /// Returns once the response mode is settled. A streamed response keeps
    /// going in the body stream callback registered on `ctx`; a hijacked one on
    /// the handler thread.
    ///
    /// # Panics
    ///
    /// Re-raises the handler's panic if it panicked before committing a response.
    pub async fn run<H: SyncHandler + ?Sized>(&self, handler: Arc<H>, request: Request, ctx: &mut RequestCtx) {
        let (signal, mode_rx) = ModeSignal::new();
        let mut buffers = BRIDGE_POOL.acquire();
        buffers.body.reserve(self.config.initial_body_capacity());
        let handle = Handle::current();

        let join = task::spawn_blocking(move || {
            let mut bridge = ResponseBridge::new(buffers, signal, handle);
            match panic::catch_unwind(AssertUnwindSafe(|| handler.serve(&mut bridge, request))) {
                Ok(()) => bridge.finish(),
                Err(payload) => bridge.fail(payload),
            }
        });

        match mode_rx.await {
            Ok(Mode::Done(mut committed)) => {
                let body = committed.buffers.body.split().freeze();
                trace!(status = %committed.status, len = body.len(), "buffered response");
                project_head(ctx, &committed, &body);
                ctx.set_body(body);
                wait_handler(join).await;
            }

            Ok(Mode::Flushed(Streaming { committed, reader, ready })) => {
                trace!(status = %committed.status, "streamed response");
                project_head(ctx, &committed, &committed.buffers.body);
                let chunk_size = self.config.stream_chunk_size();
                ctx.set_body_stream_callback(move |sink| drain(committed, reader, sink, join, chunk_size));
                ready.close();
            }

            Ok(Mode::Hijacked(conn_tx)) => {
                trace!("hijacked response");
                ctx.hijack_connection(
                    move |conn| {
                        if conn_tx.send(conn).is_err() {
                            debug!("handler gone before taking the hijacked connection");
                        }
                    },
                    || trace!("hijacked connection released"),
                );
                // the handler thread owns the connection from here on
                drop(join);
            }

            Ok(Mode::Panicked(payload)) => {
                wait_handler(join).await;
                panic::resume_unwind(payload);
            }

            Err(_) => {
                error!("handler thread ended without settling a response");
                ctx.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                wait_handler(join).await;
            }
        }
    }
}

/// Copies status and headers onto the native response. `Content-Length` is
/// left to the engine; a missing `Content-Type` is sniffed from `prefix`.
fn project_head(ctx: &mut RequestCtx, committed: &Committed, prefix: &[u8]) {
    ctx.set_status(committed.status);

    let headers = &committed.buffers.headers;
    for name in headers.keys() {
        if name == header::CONTENT_LENGTH {
            continue;
        }
        ctx.set_header(name.clone(), headers.get_all(name).iter().cloned());
    }

    if !headers.contains_key(header::CONTENT_TYPE) {
        let content_type = if prefix.is_empty() {
            HeaderValue::from_static(OCTET_STREAM.as_ref())
        } else {
            HeaderValue::from_static(sniff::detect_content_type(&prefix[..prefix.len().min(SNIFF_LEN)]))
        };
        ctx.set_header(header::CONTENT_TYPE, [content_type]);
    }
}

/// Body stream callback of a flushed response: the bytes buffered before the
/// flush, then the pipe in chunks of at most `chunk_size`, until the handler
/// closes it or the connection stops taking data.
async fn drain(mut committed: Committed, mut reader: PipeReader, mut sink: BodySink, join: JoinHandle<()>, chunk_size: usize) {
    let prelude = committed.buffers.body.split().freeze();

    if sink.write(prelude).await.is_ok() {
        let mut scratch = SCRATCH_POOL.acquire();
        loop {
            let Some(chunk) = reader.read_chunk(&mut scratch, chunk_size).await else {
                trace!("response stream ended");
                break;
            };
            if sink.write(chunk).await.is_err() {
                trace!("body sink closed, stop draining");
                break;
            }
        }
    } else {
        trace!("body sink closed before the buffered prefix was sent");
    }

    // a handler still writing sees a broken pipe
    drop(reader);
    wait_handler(join).await;
    drop(committed);
}

async fn wait_handler(join: JoinHandle<()>) {
    if let Err(e) = join.await {
        error!(cause = %e, "handler thread failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::panic_message;
    use crate::error::HijackError;
    use crate::request::project_request;
    use bytes::Bytes;
    use futures::FutureExt;
    use http::{HeaderMap, Method, Version};
    use http_body_util::BodyExt;
    use std::io::{ErrorKind, Read, Write};
    use std::mem;
    use std::sync::mpsc;
    use tandem_http::ctx::{ConnInfo, ResponseBody, body_sink};
    use tandem_http::protocol::RequestHeader;

    fn ctx_with_body(body: Bytes) -> RequestCtx {
        let header = RequestHeader::new(Method::POST, Bytes::from_static(b"/"), Version::HTTP_11, HeaderMap::new());
        RequestCtx::new(header, body, Arc::new(ConnInfo::default()))
    }

    async fn serve_with<H: SyncHandler>(handler: H, body: Bytes) -> RequestCtx {
        let mut ctx = ctx_with_body(body);
        let request = project_request(&ctx).unwrap();
        run_handler(Arc::new(handler), request, &mut ctx).await;
        ctx
    }

    async fn serve<H: SyncHandler>(handler: H) -> RequestCtx {
        serve_with(handler, Bytes::new()).await
    }

    fn full_body(ctx: &RequestCtx) -> Bytes {
        match &ctx.response().body {
            ResponseBody::Full(bytes) => bytes.clone(),
            ResponseBody::Stream(_) => panic!("expected a buffered body"),
        }
    }

    async fn stream_body(ctx: &mut RequestCtx) -> Bytes {
        let ResponseBody::Stream(callback) = mem::replace(&mut ctx.response_mut().body, ResponseBody::Full(Bytes::new())) else {
            panic!("expected a streamed body");
        };
        let (sink, body) = body_sink();
        let (collected, ()) = tokio::join!(body.collect(), callback(sink));
        collected.unwrap().to_bytes()
    }

    fn response_header<'a>(ctx: &'a RequestCtx, name: header::HeaderName) -> Option<&'a str> {
        ctx.response().headers.get(name).and_then(|value| value.to_str().ok())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn buffered_response_defaults_to_ok() {
        let ctx = serve(|w: &mut ResponseBridge, _req: Request| {
            w.write_all(b"hello ").unwrap();
            w.write_all(b"world").unwrap();
        })
        .await;

        assert_eq!(ctx.response().status, StatusCode::OK);
        assert_eq!(full_body(&ctx).as_ref(), b"hello world");
        assert_eq!(response_header(&ctx, header::CONTENT_TYPE), Some("text/plain; charset=utf-8"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_status_wins() {
        let ctx = serve(|w: &mut ResponseBridge, _req: Request| {
            w.write_status(201);
            w.write_status(404);
            assert_eq!(w.status(), StatusCode::CREATED);
        })
        .await;

        assert_eq!(ctx.response().status, StatusCode::CREATED);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn out_of_range_status_panics() {
        for code in [99, 1000] {
            let result = AssertUnwindSafe(serve(move |w: &mut ResponseBridge, _req: Request| w.write_status(code))).catch_unwind().await;
            let payload = result.unwrap_err();
            assert_eq!(panic_message(payload.as_ref()), format!("invalid status code {code}"));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panic_after_partial_output_propagates() {
        let result = AssertUnwindSafe(serve(|w: &mut ResponseBridge, _req: Request| {
            w.write_all(b"partial").unwrap();
            panic!("boom");
        }))
        .catch_unwind()
        .await;

        let payload = result.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panic_after_flush_keeps_stream() {
        let mut ctx = serve(|w: &mut ResponseBridge, _req: Request| {
            w.write_all(b"a").unwrap();
            w.flush().unwrap();
            w.write_all(b"b").unwrap();
            panic!("handler failed after flush");
        })
        .await;

        assert_eq!(ctx.response().status, StatusCode::OK);
        assert_eq!(stream_body(&mut ctx).await.as_ref(), b"ab");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn content_length_is_never_forwarded() {
        let ctx = serve(|w: &mut ResponseBridge, _req: Request| {
            w.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from_static("2"));
            w.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            w.headers_mut().append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
            w.headers_mut().append(header::SET_COOKIE, HeaderValue::from_static("b=2"));
            w.write_all(b"{}").unwrap();
        })
        .await;

        assert!(!ctx.response().headers.contains_key(header::CONTENT_LENGTH));
        assert_eq!(response_header(&ctx, header::CONTENT_TYPE), Some("application/json"));
        let cookies: Vec<_> = ctx.response().headers.get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_body_is_octet_stream() {
        let ctx = serve(|_w: &mut ResponseBridge, _req: Request| {}).await;

        assert!(full_body(&ctx).is_empty());
        assert_eq!(response_header(&ctx, header::CONTENT_TYPE), Some("application/octet-stream"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn handler_reads_request_body() {
        let ctx = serve_with(
            |w: &mut ResponseBridge, mut req: Request| {
                let mut body = Vec::new();
                req.body.read_to_end(&mut body).unwrap();
                assert_eq!(req.content_length, body.len() as u64);
                w.write_all(&body).unwrap();
            },
            Bytes::from_static(b"\x89PNG\x0D\x0A\x1A\x0A...."),
        )
        .await;

        assert_eq!(response_header(&ctx, header::CONTENT_TYPE), Some("image/png"));
        assert_eq!(full_body(&ctx).len(), 12);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flushed_html_prefix_is_sniffed() {
        let mut ctx = serve(|w: &mut ResponseBridge, _req: Request| {
            w.write_status(202);
            w.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from_static("100"));
            w.write_all(b"<html><body>").unwrap();
            w.flush().unwrap();
            w.flush().unwrap();
            w.write_all(b"streamed").unwrap();
            w.flush().unwrap();
            w.write_all(b"</body></html>").unwrap();
        })
        .await;

        assert_eq!(ctx.response().status, StatusCode::ACCEPTED);
        assert_eq!(response_header(&ctx, header::CONTENT_TYPE), Some("text/html; charset=utf-8"));
        assert!(!ctx.response().headers.contains_key(header::CONTENT_LENGTH));
        assert_eq!(stream_body(&mut ctx).await.as_ref(), b"<html><body>streamed</body></html>");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flush_without_prefix_streams_everything() {
        let mut ctx = serve(|w: &mut ResponseBridge, _req: Request| {
            w.flush().unwrap();
            // the head is committed: these go nowhere
            w.headers_mut().insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            w.write_status(500);
            assert_eq!(w.status(), StatusCode::OK);
            for i in 0..100 {
                writeln!(w, "line {i}").unwrap();
            }
            w.close();
            assert_eq!(w.write(b"late").unwrap_err().kind(), ErrorKind::BrokenPipe);
        })
        .await;

        assert_eq!(ctx.response().status, StatusCode::OK);
        assert_eq!(response_header(&ctx, header::CONTENT_TYPE), Some("application/octet-stream"));
        assert!(!ctx.response().headers.contains_key(header::CACHE_CONTROL));

        let expected: String = (0..100).map(|i| format!("line {i}\n")).collect();
        assert_eq!(stream_body(&mut ctx).await.as_ref(), expected.as_bytes());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn committed_headers_stay_readable() {
        let (tx, rx) = mpsc::channel();
        let mut ctx = serve(move |w: &mut ResponseBridge, _req: Request| {
            w.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/csv"));
            w.flush().unwrap();
            tx.send(w.headers().get(header::CONTENT_TYPE).cloned()).unwrap();
        })
        .await;

        assert_eq!(response_header(&ctx, header::CONTENT_TYPE), Some("text/csv"));
        assert!(stream_body(&mut ctx).await.is_empty());
        assert_eq!(rx.recv().unwrap(), Some(HeaderValue::from_static("text/csv")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn hijack_after_flush_is_rejected() {
        let (tx, rx) = mpsc::channel();
        let mut ctx = serve(move |w: &mut ResponseBridge, _req: Request| {
            w.write_all(b"a").unwrap();
            w.flush().unwrap();
            tx.send(matches!(w.hijack(), Err(HijackError::Streaming))).unwrap();
            w.write_all(b"b").unwrap();
        })
        .await;

        assert_eq!(stream_body(&mut ctx).await.as_ref(), b"ab");
        assert!(rx.recv().unwrap());
        assert!(!ctx.is_hijacked());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn writes_fail_once_consumer_is_gone() {
        let (tx, rx) = mpsc::channel();
        let mut ctx = serve(move |w: &mut ResponseBridge, _req: Request| {
            w.flush().unwrap();
            let mut result = Ok(());
            // the first chunk may still fit into the pipe
            for _ in 0..3 {
                result = w.write_all(&[b'x'; 1024]);
                if result.is_err() {
                    break;
                }
            }
            tx.send(result.map_err(|e| e.kind())).unwrap();
        })
        .await;

        // the engine drops the body callback without running it
        ctx.response_mut().body = ResponseBody::Full(Bytes::new());

        let result = task::spawn_blocking(move || rx.recv().unwrap()).await.unwrap();
        assert_eq!(result, Err(ErrorKind::BrokenPipe));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn small_chunk_size_splits_stream() {
        let mut ctx = ctx_with_body(Bytes::new());
        let request = project_request(&ctx).unwrap();
        let runner = HandlerRunner::new(AdaptorConfig::builder().stream_chunk_size(3).build());
        let handler = Arc::new(|w: &mut ResponseBridge, _req: Request| {
            w.flush().unwrap();
            w.write_all(b"abcdefgh").unwrap();
        });
        runner.run(handler, request, &mut ctx).await;

        let ResponseBody::Stream(callback) = mem::replace(&mut ctx.response_mut().body, ResponseBody::Full(Bytes::new())) else {
            panic!("expected a streamed body");
        };
        let (sink, mut body) = body_sink();
        let collect = async move {
            let mut chunks = Vec::new();
            while let Some(frame) = body.frame().await {
                chunks.push(frame.unwrap().into_data().unwrap());
            }
            chunks
        };
        let (chunks, ()) = tokio::join!(collect, callback(sink));

        assert!(chunks.iter().all(|chunk| chunk.len() <= 3));
        assert_eq!(chunks.concat(), b"abcdefgh");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_streams_keep_their_bytes() {
        let mut tasks = Vec::new();
        for seed in 0..32u64 {
            tasks.push(tokio::spawn(async move {
                let mut rng = fastrand::Rng::with_seed(seed);
                let payload: Bytes = (0..rng.usize(0..64 * 1024)).map(|_| rng.u8(..)).collect::<Vec<_>>().into();

                let mut ctx = serve_with(
                    move |w: &mut ResponseBridge, mut req: Request| {
                        let mut rng = fastrand::Rng::with_seed(seed ^ 0x5eed);
                        let mut payload = Vec::new();
                        req.body.read_to_end(&mut payload).unwrap();

                        let mut rest = &payload[..];
                        let mut flushed = false;
                        while !rest.is_empty() {
                            let (chunk, tail) = rest.split_at(rng.usize(1..=rest.len().min(5000)));
                            w.write_all(chunk).unwrap();
                            if !flushed || rng.bool() {
                                w.flush().unwrap();
                                flushed = true;
                            }
                            rest = tail;
                        }
                        w.flush().unwrap();
                    },
                    payload.clone(),
                )
                .await;

                assert_eq!(stream_body(&mut ctx).await, payload);
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
    }
}
