use bytes::{Bytes, BytesMut};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use http::{Response, StatusCode};
use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};
use tandem_http::{
    codec::{RequestDecoder, ResponseEncoder},
    connection::HttpConnection,
    ctx::RequestCtx,
    handler::make_handler,
    protocol::{Message, PayloadItem, PayloadSize, ResponseHead},
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::codec::{Decoder, Encoder};

// Reads a fixed request, then EOF; swallows every write
struct MockIO {
    read_data: Bytes,
}

impl AsyncRead for MockIO {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let amt = self.read_data.len().min(buf.remaining());
        let data = self.read_data.split_to(amt);
        buf.put_slice(&data);
        Poll::Ready(Ok(()))
    }
}

struct Discard;

impl AsyncWrite for Discard {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<Result<usize, io::Error>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }
}

fn bench_request_decoder(c: &mut Criterion) {
    let request = b"GET /index.html?a=1 HTTP/1.1\r\nHost: localhost\r\nAccept: */*\r\nUser-Agent: bench\r\n\r\n";

    c.bench_function("decode_simple_request", |b| {
        b.iter(|| {
            let mut decoder = RequestDecoder::new();
            let mut bytes = BytesMut::from(&request[..]);
            black_box(decoder.decode(&mut bytes).unwrap());
        });
    });

    let chunked = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";

    c.bench_function("decode_chunked_request", |b| {
        b.iter(|| {
            let mut decoder = RequestDecoder::new();
            let mut bytes = BytesMut::from(&chunked[..]);
            while let Some(message) = decoder.decode(&mut bytes).unwrap() {
                if matches!(message, Message::Payload(PayloadItem::Eof)) {
                    break;
                }
                black_box(message);
            }
        });
    });
}

fn bench_response_encoder(c: &mut Criterion) {
    c.bench_function("encode_simple_response", |b| {
        b.iter(|| {
            let mut encoder = ResponseEncoder::new();
            let mut bytes = BytesMut::new();
            let response: ResponseHead = Response::builder().status(StatusCode::OK).header("Content-Type", "text/plain").body(()).unwrap();
            let head = Message::<_, Bytes>::Header((response, PayloadSize::Length(12)));
            encoder.encode(head, &mut bytes).unwrap();
            encoder.encode(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"Hello World!"))), &mut bytes).unwrap();
            encoder.encode(Message::Payload(PayloadItem::<Bytes>::Eof), &mut bytes).unwrap();
            black_box(bytes);
        });
    });
}

fn bench_http_connection(c: &mut Criterion) {
    let request = Bytes::from_static(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
    let handler = make_handler(|ctx: &mut RequestCtx| {
        ctx.set_body(Bytes::from_static(b"Hello World!"));
        std::future::ready(())
    });
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

    c.bench_function("process_simple_request", |b| {
        b.to_async(&runtime).iter(|| async {
            let connection = HttpConnection::new(MockIO { read_data: request.clone() }, Discard);
            black_box(connection.process(&handler).await.unwrap());
        });
    });
}

criterion_group!(benches, bench_request_decoder, bench_response_encoder, bench_http_connection);
criterion_main!(benches);
