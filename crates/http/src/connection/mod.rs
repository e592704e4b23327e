//! The per-connection request loop.
//!
//! [`HttpConnection`] reads requests off a byte stream, buffers each body up to
//! a configured limit, answers `Expect: 100-continue`, runs the handler on a
//! [`RequestCtx`](crate::ctx::RequestCtx) and writes the native response back
//! with fixed-length or chunked framing. A handler may instead take over the
//! connection, in which case the loop ends and the raw stream is handed over.

mod http_connection;

pub use http_connection::{ConnectionConfig, DEFAULT_MAX_BODY_SIZE, DEFAULT_READ_BUFFER, HttpConnection};
