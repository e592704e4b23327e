//! Core HTTP protocol types shared by the codec and the connection layer.
//!
//! - [`Message`], [`PayloadItem`], [`PayloadSize`]: the framing units exchanged
//!   between the codec and the connection
//! - [`RequestHeader`]: parsed request head, keeping the raw request-target
//! - [`ResponseHead`]: response head before a body is attached
//! - [`HttpError`], [`ParseError`], [`SendError`]: engine errors

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHeader;

mod response;
pub use response::ResponseHead;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
