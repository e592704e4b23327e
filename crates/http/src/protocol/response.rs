//! HTTP response head.

use http::Response;

/// The head of a response before a body is attached: `http::Response<()>`.
pub type ResponseHead = Response<()>;
