//! Blocking handlers on the async engine.
//!
//! curl -v http://127.0.0.1:8080/
//! curl -vN http://127.0.0.1:8080/countdown

use std::io::Write;
use std::thread::sleep;
use std::time::Duration;

use http::header::CONTENT_TYPE;
use tandem_adaptor::{Adaptor, Request, ResponseBridge};
use tandem_http::server::Server;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

fn serve(w: &mut ResponseBridge, req: Request) {
    let result = match req.uri.path() {
        "/countdown" => countdown(w),
        _ => write!(w, "<!DOCTYPE html><p>hello {} from a blocking handler</p>", req.remote_addr.map(|a| a.to_string()).unwrap_or_default()),
    };

    if let Err(e) = result {
        error!(cause = %e, "write response error");
    }
}

fn countdown(w: &mut ResponseBridge) -> std::io::Result<()> {
    w.headers_mut().insert(CONTENT_TYPE, mime::TEXT_PLAIN_UTF_8.as_ref().parse().unwrap());
    for i in (1..=5).rev() {
        writeln!(w, "{i}...")?;
        w.flush()?;
        sleep(Duration::from_millis(500));
    }
    writeln!(w, "liftoff")
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!(port = 8080, "start listening");
    let server = Server::builder().address("127.0.0.1:8080").and_then(|builder| builder.build()).expect("valid server config");

    if let Err(e) = server.start(Adaptor::new(serve)).await {
        error!(cause = %e, "server stopped");
    }
}
