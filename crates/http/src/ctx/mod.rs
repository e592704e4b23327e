//! The native per-request context handed to a [`Handler`](crate::handler::Handler).
//!
//! - [`RequestCtx`]: request head, fully buffered body, connection facts and the
//!   native response the handler fills in
//! - [`BodySink`]: write end of a streamed response body
//! - [`HijackedConn`]: the raw connection, once a handler took it over

mod body_sink;
mod hijack;
mod request_ctx;

pub use body_sink::{BodySink, SinkBody, SinkClosed, body_sink};
pub use hijack::{HijackRequest, HijackedConn};
pub use request_ctx::{ConnInfo, NativeResponse, RequestCtx, ResponseBody, StreamCallback, TlsInfo};
