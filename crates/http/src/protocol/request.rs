//! Parsed request head.
//!
//! The request-target is kept as the raw bytes received on the wire. Turning it
//! into a [`Uri`] is left to the consumer, so a target the engine can frame but
//! not interpret still reaches the handler layer, which decides how to reject it.

use bytes::Bytes;
use http::{HeaderMap, Method, Uri, Version, header};

use crate::protocol::ParseError;

/// The head of an HTTP/1.x request: method, raw target, version and header fields.
#[derive(Debug, Clone)]
pub struct RequestHeader {
    method: Method,
    target: Bytes,
    version: Version,
    headers: HeaderMap,
}

impl RequestHeader {
    pub fn new(method: Method, target: Bytes, version: Version, headers: HeaderMap) -> Self {
        Self { method, target, version, headers }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The raw request-target exactly as received.
    pub fn request_uri(&self) -> &Bytes {
        &self.target
    }

    /// Parses the raw request-target.
    pub fn uri(&self) -> Result<Uri, ParseError> {
        Uri::from_maybe_shared(self.target.clone()).map_err(ParseError::invalid_uri)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Determines if this request requires a body based on its HTTP method.
    ///
    /// Returns false for GET, HEAD, DELETE, OPTIONS and CONNECT.
    pub fn need_body(&self) -> bool {
        !matches!(self.method, Method::GET | Method::HEAD | Method::DELETE | Method::OPTIONS | Method::CONNECT)
    }

    /// Whether the client sent `Expect: 100-continue`.
    pub fn expects_continue(&self) -> bool {
        self.headers.get(header::EXPECT).is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"))
    }

    /// Whether the connection may serve another request after this one.
    ///
    /// HTTP/1.1 is persistent unless `Connection: close`; HTTP/1.0 only with
    /// `Connection: keep-alive`.
    pub fn is_keep_alive(&self) -> bool {
        let has_token = |token: &str| {
            self.headers
                .get_all(header::CONNECTION)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .flat_map(|value| value.split(','))
                .any(|item| item.trim().eq_ignore_ascii_case(token))
        };

        match self.version {
            Version::HTTP_11 => !has_token("close"),
            _ => has_token("keep-alive"),
        }
    }
}
