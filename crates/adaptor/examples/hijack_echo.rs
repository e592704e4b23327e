//! A line echo protocol behind an HTTP request, by hijacking the connection.
//!
//! printf 'GET / HTTP/1.1\r\nHost: x\r\n\r\nhello\nquit\n' | nc 127.0.0.1 8081

use std::io::{BufRead, Write};

use tandem_adaptor::{Adaptor, HijackError, Request, ResponseBridge};
use tandem_http::server::Server;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

fn echo(w: &mut ResponseBridge, _req: Request) {
    if let Err(e) = try_echo(w) {
        error!(cause = %e, "echo session error");
    }
}

fn try_echo(w: &mut ResponseBridge) -> Result<(), HijackError> {
    w.write_all(b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: echo\r\nConnection: Upgrade\r\n\r\n")?;
    let mut conn = w.hijack()?;
    conn.flush()?;

    let mut line = String::new();
    loop {
        line.clear();
        if conn.read_line(&mut line)? == 0 || line.trim_end() == "quit" {
            break;
        }
        conn.write_all(line.as_bytes())?;
        conn.flush()?;
    }

    info!("echo session finished");
    conn.close()?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!(port = 8081, "start listening");
    let server = Server::builder().address("127.0.0.1:8081").and_then(|builder| builder.build()).expect("valid server config");

    if let Err(e) = server.start(Adaptor::new(echo)).await {
        error!(cause = %e, "server stopped");
    }
}
