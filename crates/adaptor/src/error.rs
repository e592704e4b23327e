use std::io;
use thiserror::Error;

/// The native request could not be turned into a [`Request`](crate::Request).
#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error("malformed request line: {reason}")]
    MalformedRequestLine { reason: String },
}

impl ProjectionError {
    pub fn malformed_request_line<S: ToString>(str: S) -> Self {
        Self::MalformedRequestLine { reason: str.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum HijackError {
    #[error("connection has already been hijacked")]
    AlreadyHijacked,

    #[error("response is already streaming, the connection can't be hijacked")]
    Streaming,

    #[error("connection closed before it could be hijacked")]
    ConnectionClosed,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}
