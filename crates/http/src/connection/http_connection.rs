use std::fmt::Display;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use http::{Response, StatusCode, Version};
use http_body::Body;
use http_body_util::{BodyExt, Empty, Full};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, trace};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::ctx::{ConnInfo, HijackRequest, HijackedConn, RequestCtx, ResponseBody, body_sink};
use crate::handler::Handler;
use crate::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, RequestHeader, ResponseHead, SendError};

/// Read buffer capacity of a connection
pub const DEFAULT_READ_BUFFER: usize = 8 * 1024;

/// Largest request body the engine buffers before answering 413
pub const DEFAULT_MAX_BODY_SIZE: usize = 4 * 1024 * 1024;

/// Per-connection limits.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    pub read_buffer: usize,
    pub max_body_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { read_buffer: DEFAULT_READ_BUFFER, max_body_size: DEFAULT_MAX_BODY_SIZE }
    }
}

type OutMessage = Message<(ResponseHead, PayloadSize), Bytes>;

/// What the connection does after a request has been answered.
enum Next {
    KeepAlive,
    Close,
    Hijack(HijackRequest),
}

/// An HTTP/1.1 connection that reads requests, buffers their bodies, runs the
/// handler on a [`RequestCtx`] and writes back the native response.
///
/// The connection is persistent unless the request asks otherwise. A handler
/// that hijacks the connection ends the request loop; the raw reader and
/// writer are handed over and the connection task lives on until the hijacked
/// connection is released.
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
    conn_info: Arc<ConnInfo>,
    max_body_size: usize,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_config(reader, writer, ConnInfo::default(), ConnectionConfig::default())
    }

    pub fn with_config(reader: R, writer: W, conn_info: ConnInfo, config: ConnectionConfig) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), config.read_buffer),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
            conn_info: Arc::new(conn_info),
            max_body_size: config.max_body_size,
        }
    }

    pub async fn process<H: Handler + ?Sized>(mut self, handler: &H) -> Result<(), HttpError> {
        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Header((header, payload_size)))) => match self.do_process(header, payload_size, handler).await? {
                    Next::KeepAlive => {}
                    Next::Close => {
                        info!("request asked to close, connection shutdown");
                        return self.shutdown().await;
                    }
                    Next::Hijack(hijack) => return self.hand_over(hijack).await,
                },

                Some(Ok(Message::Payload(_))) => {
                    error!("receive payload item while waiting for a request head");
                    self.send_error_response(StatusCode::BAD_REQUEST).await?;
                    return Err(ParseError::invalid_body("need header while receive body").into());
                }

                Some(Err(e)) => {
                    error!(cause = %e, "can't receive next request");
                    self.send_error_response(status_for(&e)).await?;
                    return Err(e.into());
                }

                None => {
                    info!("cant read more request, break this connection down");
                    return Ok(());
                }
            }
        }
    }

    async fn do_process<H: Handler + ?Sized>(
        &mut self,
        header: RequestHeader,
        payload_size: PayloadSize,
        handler: &H,
    ) -> Result<Next, HttpError> {
        if header.expects_continue() && !payload_size.is_empty() {
            let writer = self.framed_write.get_mut();
            writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.map_err(SendError::io)?;
            writer.flush().await.map_err(SendError::io)?;
            debug!("receive expect request header, sent continue response");
        }

        let body = match self.read_body().await {
            Ok(body) => body,
            Err(e) => {
                error!(cause = %e, "can't receive request body");
                self.send_error_response(status_for(&e)).await?;
                return Err(e.into());
            }
        };

        let keep_alive = header.is_keep_alive();
        // HTTP/1.0 peers can't decode chunked framing
        let chunked = header.version() != Version::HTTP_10;
        let mut ctx = RequestCtx::new(header, body, Arc::clone(&self.conn_info));
        handler.call(&mut ctx).await;

        if let Some(hijack) = ctx.take_hijack() {
            return Ok(Next::Hijack(hijack));
        }

        let native = ctx.take_response();
        let mut response = Response::new(());
        *response.status_mut() = native.status;
        *response.headers_mut() = native.headers;

        match native.body {
            ResponseBody::Full(bytes) => {
                let (parts, ()) = response.into_parts();
                self.do_send_response(Response::from_parts(parts, Full::new(bytes)), chunked).await?;
            }
            ResponseBody::Stream(callback) => {
                let (sink, sink_body) = body_sink();
                let (parts, ()) = response.into_parts();
                let (sent, ()) = tokio::join!(self.do_send_response(Response::from_parts(parts, sink_body), chunked), callback(sink));
                sent?;
                if !chunked {
                    // the body ended with the connection
                    return Ok(Next::Close);
                }
            }
        }

        Ok(if keep_alive { Next::KeepAlive } else { Next::Close })
    }

    async fn read_body(&mut self) -> Result<Bytes, ParseError> {
        let mut body = BytesMut::new();
        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Payload(PayloadItem::Chunk(chunk)))) => {
                    let current_size = body.len() + chunk.len();
                    crate::ensure!(current_size <= self.max_body_size, ParseError::too_large_body(current_size, self.max_body_size));
                    body.extend_from_slice(&chunk);
                }
                Some(Ok(Message::Payload(PayloadItem::Eof))) => return Ok(body.freeze()),
                Some(Ok(Message::Header(_))) => return Err(ParseError::invalid_body("receive request head while reading body")),
                Some(Err(e)) => return Err(e),
                None => return Err(ParseError::invalid_body("connection closed while reading body")),
            }
        }
    }

    /// Hands the raw connection to the hijacker and waits for it to be released.
    async fn hand_over(mut self, hijack: HijackRequest) -> Result<(), HttpError> {
        SinkExt::<OutMessage>::flush(&mut self.framed_write).await?;

        let leftover = self.framed_read.read_buffer_mut().split().freeze();
        let reader = self.framed_read.into_inner();
        let writer = self.framed_write.into_inner();

        let (release_tx, release_rx) = oneshot::channel();
        let HijackRequest { on_hijack, on_release } = hijack;

        trace!(leftover = leftover.len(), "hand connection over to the hijacker");
        on_hijack(HijackedConn::new(leftover, Box::new(reader), Box::new(writer), release_tx));

        // resolves with Err as well when the hijacker drops the conn without using it
        let _ = release_rx.await;
        on_release();
        info!("hijacked connection released");
        Ok(())
    }

    async fn shutdown(mut self) -> Result<(), HttpError> {
        SinkExt::<OutMessage>::flush(&mut self.framed_write).await?;
        self.framed_write.get_mut().shutdown().await.map_err(SendError::io)?;
        Ok(())
    }

    async fn send_error_response(&mut self, status: StatusCode) -> Result<(), HttpError> {
        let mut response = Response::new(Empty::<Bytes>::new());
        *response.status_mut() = status;
        self.do_send_response(response, true).await
    }

    /// Sends a response, streaming its body. A body of unknown length goes out
    /// chunked, or unframed up to the connection close when `chunked` is false.
    async fn do_send_response<T>(&mut self, response: Response<T>, chunked: bool) -> Result<(), HttpError>
    where
        T: Body<Data = Bytes> + Unpin,
        T::Error: Display,
    {
        let (header_parts, mut body) = response.into_parts();

        let payload_size = match body.size_hint().exact() {
            Some(0) => PayloadSize::Empty,
            Some(length) => PayloadSize::Length(length),
            None if chunked => PayloadSize::Chunked,
            None => PayloadSize::UntilClose,
        };

        let header = OutMessage::Header((ResponseHead::from_parts(header_parts, ()), payload_size));
        if payload_size.is_empty() {
            // a head-only response goes out right away
            self.framed_write.send(header).await?;
            return Ok(());
        }
        self.framed_write.feed(header).await?;

        loop {
            match body.frame().await {
                Some(Ok(frame)) => {
                    let Ok(data) = frame.into_data() else {
                        debug!("skip non-data response frame");
                        continue;
                    };
                    // each chunk is flushed, so a streamed chunk reaches the peer immediately
                    self.framed_write.send(Message::Payload(PayloadItem::Chunk(data))).await?;
                }
                Some(Err(e)) => return Err(SendError::invalid_body(format!("resolve response body error: {e}")).into()),
                None => {
                    self.framed_write.send(Message::Payload(PayloadItem::<Bytes>::Eof)).await?;
                    return Ok(());
                }
            }
        }
    }
}

fn status_for(e: &ParseError) -> StatusCode {
    match e {
        ParseError::TooLargeBody { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        ParseError::TooLargeHeader { .. } | ParseError::TooManyHeaders { .. } => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
        _ => StatusCode::BAD_REQUEST,
    }
}
