//! Payload framing: `Content-Length` and `Transfer-Encoding: chunked`.
//!
//! - [`PayloadDecoder`]: request bodies, driven by the framing detected in the head
//! - [`PayloadEncoder`]: response bodies, driven by the framing the connection chose

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
