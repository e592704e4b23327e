//! The request as a synchronous handler sees it, and its projection from the
//! engine's native request context.

use std::net::SocketAddr;

use bytes::buf::Reader;
use bytes::{Buf, Bytes};
use http::{Extensions, HeaderMap, Method, Uri, Version, header};
use tandem_http::ctx::{RequestCtx, TlsInfo};

use crate::bridge::ResponseBridge;
use crate::error::ProjectionError;

/// A request with its body already buffered.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    /// The request-target exactly as received
    pub request_uri: String,
    /// Always HTTP/1.1
    pub version: Version,
    /// Every header field except `Transfer-Encoding`
    pub headers: HeaderMap,
    /// `Transfer-Encoding` values in the order received
    pub transfer_encoding: Vec<String>,
    pub content_length: u64,
    /// The `Host` header, else the authority of the request-target, else empty
    pub host: String,
    pub remote_addr: Option<SocketAddr>,
    pub local_addr: Option<SocketAddr>,
    pub tls: Option<TlsInfo>,
    pub body: Reader<Bytes>,
    pub extensions: Extensions,
}

/// A blocking handler: writes its response to the bridge and returns.
///
/// It runs on a thread of its own and may block freely, flush mid-response to
/// start streaming, or hijack the connection.
pub trait SyncHandler: Send + Sync + 'static {
    fn serve(&self, w: &mut ResponseBridge, req: Request);
}

impl<F> SyncHandler for F
where
    F: Fn(&mut ResponseBridge, Request) + Send + Sync + 'static,
{
    fn serve(&self, w: &mut ResponseBridge, req: Request) {
        self(w, req);
    }
}

/// Builds the synchronous view of the request in `ctx`.
///
/// Fails when the request-target is not a URI (or is authority-only outside
/// `CONNECT`); such a request must be answered with 400 without running the handler.
pub fn project_request(ctx: &RequestCtx) -> Result<Request, ProjectionError> {
    let target = ctx.request_uri();
    if target.is_empty() {
        return Err(ProjectionError::malformed_request_line("empty request target"));
    }

    let uri = Uri::from_maybe_shared(target.clone()).map_err(ProjectionError::malformed_request_line)?;
    if uri.scheme().is_none() && uri.path_and_query().is_none() && ctx.method() != Method::CONNECT {
        return Err(ProjectionError::malformed_request_line("authority-form target outside CONNECT"));
    }

    let mut headers = HeaderMap::with_capacity(ctx.headers().len());
    let mut transfer_encoding = Vec::new();
    for (name, value) in ctx.headers() {
        if name == header::TRANSFER_ENCODING {
            transfer_encoding.push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        } else {
            headers.append(name, value.clone());
        }
    }

    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .or_else(|| uri.authority().map(|authority| authority.as_str().to_owned()))
        .unwrap_or_default();

    let body = ctx.body().clone();

    Ok(Request {
        method: ctx.method().clone(),
        request_uri: String::from_utf8_lossy(target).into_owned(),
        uri,
        version: Version::HTTP_11,
        headers,
        transfer_encoding,
        content_length: body.len() as u64,
        host,
        remote_addr: ctx.remote_addr(),
        local_addr: ctx.local_addr(),
        tls: ctx.tls().cloned(),
        body: body.reader(),
        extensions: Extensions::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use std::io::Read;
    use std::sync::Arc;
    use tandem_http::ctx::ConnInfo;
    use tandem_http::protocol::RequestHeader;

    fn ctx(method: Method, target: &'static str, headers: HeaderMap, body: &'static [u8]) -> RequestCtx {
        let header = RequestHeader::new(method, Bytes::from_static(target.as_bytes()), Version::HTTP_10, headers);
        let conn = ConnInfo::new("10.0.0.2:5000".parse().unwrap(), "10.0.0.1:80".parse().unwrap())
            .with_tls(TlsInfo { server_name: Some("example.com".into()), ..TlsInfo::default() });
        RequestCtx::new(header, Bytes::from_static(body), Arc::new(conn))
    }

    #[test]
    fn projects_request_line_headers_and_body() {
        let mut headers = HeaderMap::new();
        headers.append(header::HOST, HeaderValue::from_static("example.com"));
        headers.append(header::ACCEPT, HeaderValue::from_static("text/html"));
        headers.append(header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.append(header::TRANSFER_ENCODING, HeaderValue::from_static("gzip"));
        headers.append(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

        let mut req = project_request(&ctx(Method::POST, "/search?q=rust", headers, b"payload")).unwrap();

        assert_eq!(req.method, Method::POST);
        assert_eq!(req.version, Version::HTTP_11);
        assert_eq!(req.request_uri, "/search?q=rust");
        assert_eq!(req.uri.path(), "/search");
        assert_eq!(req.uri.query(), Some("q=rust"));
        assert_eq!(req.host, "example.com");
        assert_eq!(req.content_length, 7);
        assert_eq!(req.remote_addr, Some("10.0.0.2:5000".parse().unwrap()));
        assert_eq!(req.local_addr, Some("10.0.0.1:80".parse().unwrap()));
        assert_eq!(req.tls.as_ref().and_then(|tls| tls.server_name.as_deref()), Some("example.com"));

        let accepts: Vec<_> = req.headers.get_all(header::ACCEPT).iter().collect();
        assert_eq!(accepts, vec!["text/html", "*/*"]);
        assert!(!req.headers.contains_key(header::TRANSFER_ENCODING));
        assert_eq!(req.transfer_encoding, vec!["gzip", "chunked"]);

        let mut body = String::new();
        req.body.read_to_string(&mut body).unwrap();
        assert_eq!(body, "payload");
    }

    #[test]
    fn host_falls_back_to_target_authority() {
        let req = project_request(&ctx(Method::GET, "http://example.org:8080/x", HeaderMap::new(), b"")).unwrap();
        assert_eq!(req.host, "example.org:8080");

        let req = project_request(&ctx(Method::GET, "/x", HeaderMap::new(), b"")).unwrap();
        assert_eq!(req.host, "");
    }

    #[test]
    fn malformed_targets_are_rejected() {
        for target in ["", "http://[::1", "example.com:443"] {
            let result = project_request(&ctx(Method::GET, target, HeaderMap::new(), b""));
            assert!(matches!(result, Err(ProjectionError::MalformedRequestLine { .. })), "target {target:?}");
        }

        assert!(project_request(&ctx(Method::CONNECT, "example.com:443", HeaderMap::new(), b"")).is_ok());
        assert!(project_request(&ctx(Method::OPTIONS, "*", HeaderMap::new(), b"")).is_ok());
    }
}
