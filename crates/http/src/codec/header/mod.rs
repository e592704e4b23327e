//! Request head decoding and response head encoding.
//!
//! - [`HeaderDecoder`]: request line and header fields, payload framing detection
//! - [`HeaderEncoder`]: status line and header fields, framing headers

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub use header_encoder::HeaderEncoder;
pub(crate) use header_encoder::FastWrite;
