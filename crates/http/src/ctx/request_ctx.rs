use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Version};

use crate::ctx::{BodySink, HijackRequest, HijackedConn};
use crate::protocol::RequestHeader;

/// Facts about the TLS session a connection runs over.
///
/// The engine does not terminate TLS itself; a listener that does can attach
/// this to [`ConnInfo`] so handlers can see it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsInfo {
    pub server_name: Option<String>,
    pub alpn_protocol: Option<Vec<u8>>,
    pub version: Option<String>,
}

/// Per-connection facts shared by every request of that connection.
#[derive(Debug, Clone, Default)]
pub struct ConnInfo {
    pub remote_addr: Option<SocketAddr>,
    pub local_addr: Option<SocketAddr>,
    pub tls: Option<TlsInfo>,
}

impl ConnInfo {
    pub fn new(remote_addr: SocketAddr, local_addr: SocketAddr) -> Self {
        Self { remote_addr: Some(remote_addr), local_addr: Some(local_addr), tls: None }
    }

    pub fn with_tls(mut self, tls: TlsInfo) -> Self {
        self.tls = Some(tls);
        self
    }
}

pub type StreamCallback = Box<dyn FnOnce(BodySink) -> BoxFuture<'static, ()> + Send>;

/// How the native response body is produced.
pub enum ResponseBody {
    Full(Bytes),
    Stream(StreamCallback),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            ResponseBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// The response a handler builds on the context; sent by the connection after
/// the handler returns.
#[derive(Debug)]
pub struct NativeResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl Default for NativeResponse {
    fn default() -> Self {
        Self { status: StatusCode::OK, headers: HeaderMap::new(), body: ResponseBody::Full(Bytes::new()) }
    }
}

/// One request as seen by a [`Handler`](crate::handler::Handler): the parsed head,
/// the fully buffered body, the connection it arrived on, and the native
/// response being built for it.
#[derive(Debug)]
pub struct RequestCtx {
    header: RequestHeader,
    body: Bytes,
    conn: Arc<ConnInfo>,
    response: NativeResponse,
    hijack: Option<HijackRequest>,
}

impl RequestCtx {
    pub fn new(header: RequestHeader, body: Bytes, conn: Arc<ConnInfo>) -> Self {
        Self { header, body, conn, response: NativeResponse::default(), hijack: None }
    }

    pub fn method(&self) -> &Method {
        self.header.method()
    }

    /// The raw request-target.
    pub fn request_uri(&self) -> &Bytes {
        self.header.request_uri()
    }

    pub fn version(&self) -> Version {
        self.header.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.header.headers()
    }

    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.conn.remote_addr
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.conn.local_addr
    }

    pub fn tls(&self) -> Option<&TlsInfo> {
        self.conn.tls.as_ref()
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.response.status = status;
    }

    /// Replaces every value of `name` with `values`.
    pub fn set_header<I>(&mut self, name: HeaderName, values: I)
    where
        I: IntoIterator<Item = HeaderValue>,
    {
        self.response.headers.remove(&name);
        for value in values {
            self.response.headers.append(name.clone(), value);
        }
    }

    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.response.headers.append(name, value);
    }

    pub fn set_body(&mut self, body: Bytes) {
        self.response.body = ResponseBody::Full(body);
    }

    /// Streams the response body from `callback`, which receives the sink once the
    /// response head is on its way. The response is sent chunked.
    pub fn set_body_stream_callback<F, Fut>(&mut self, callback: F)
    where
        F: FnOnce(BodySink) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.response.body = ResponseBody::Stream(Box::new(move |sink| Box::pin(callback(sink))));
    }

    /// Takes the connection away from the engine.
    ///
    /// No response is sent for this request. Once the handler returns, the
    /// connection is handed to `on_hijack`; after the [`HijackedConn`] is shut
    /// down or dropped, `on_release` runs and the connection task ends.
    pub fn hijack_connection<H, R>(&mut self, on_hijack: H, on_release: R)
    where
        H: FnOnce(HijackedConn) + Send + 'static,
        R: FnOnce() + Send + 'static,
    {
        self.hijack = Some(HijackRequest { on_hijack: Box::new(on_hijack), on_release: Box::new(on_release) });
    }

    pub fn is_hijacked(&self) -> bool {
        self.hijack.is_some()
    }

    pub fn response(&self) -> &NativeResponse {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut NativeResponse {
        &mut self.response
    }

    pub(crate) fn take_hijack(&mut self) -> Option<HijackRequest> {
        self.hijack.take()
    }

    pub(crate) fn take_response(&mut self) -> NativeResponse {
        std::mem::take(&mut self.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;

    fn ctx() -> RequestCtx {
        let header = RequestHeader::new(Method::GET, Bytes::from_static(b"/"), Version::HTTP_11, HeaderMap::new());
        RequestCtx::new(header, Bytes::new(), Arc::new(ConnInfo::default()))
    }

    #[test]
    fn set_header_replaces_all_values() {
        let mut ctx = ctx();
        ctx.append_header(header::VARY, HeaderValue::from_static("a"));
        ctx.append_header(header::VARY, HeaderValue::from_static("b"));
        ctx.set_header(header::VARY, [HeaderValue::from_static("c"), HeaderValue::from_static("d")]);

        let values: Vec<_> = ctx.response().headers.get_all(header::VARY).iter().collect();
        assert_eq!(values, vec!["c", "d"]);
    }

    #[test]
    fn defaults_to_empty_ok() {
        let mut ctx = ctx();
        assert!(!ctx.is_hijacked());

        let response = ctx.take_response();
        assert_eq!(response.status, StatusCode::OK);
        assert!(matches!(response.body, ResponseBody::Full(ref body) if body.is_empty()));
    }
}
