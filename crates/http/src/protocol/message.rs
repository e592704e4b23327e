use bytes::{Buf, Bytes};

/// One decoded (or to-be-encoded) unit of an HTTP/1.1 message.
///
/// `T` is the head type (request head on the decoding side, response head plus
/// [`PayloadSize`] on the encoding side), `Data` the payload chunk type.
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    /// The message head
    Header(T),
    /// A chunk of payload data or the EOF marker
    Payload(PayloadItem<Data>),
}

/// An item of the payload stream, produced by the payload decoders and consumed
/// by the payload encoders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    Chunk(Data),
    Eof,
}

/// How the payload of a message is framed on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// `Content-Length` framing
    Length(u64),
    /// `Transfer-Encoding: chunked` framing
    Chunked,
    /// no payload at all
    Empty,
    /// payload ends when the connection closes, for peers without chunked support
    UntilClose,
}

impl PayloadSize {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_until_close(&self) -> bool {
        matches!(self, PayloadSize::UntilClose)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    /// Frames a body whose full length is known up front.
    pub fn for_len(len: usize) -> Self {
        if len == 0 { PayloadSize::Empty } else { PayloadSize::Length(len as u64) }
    }
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}
