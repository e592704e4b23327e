//! TCP accept loop running one [`HttpConnection`] task per connection.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::connection::{ConnectionConfig, DEFAULT_MAX_BODY_SIZE, DEFAULT_READ_BUFFER, HttpConnection};
use crate::ctx::ConnInfo;
use crate::handler::Handler;

#[derive(Debug)]
pub struct ServerBuilder {
    address: Option<Vec<SocketAddr>>,
    read_buffer: usize,
    max_body_size: usize,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { address: None, read_buffer: DEFAULT_READ_BUFFER, max_body_size: DEFAULT_MAX_BODY_SIZE }
    }

    pub fn address<A: ToSocketAddrs>(mut self, address: A) -> Result<Self, ServerBuildError> {
        let address = address.to_socket_addrs().map_err(|source| ServerBuildError::InvalidAddress { source })?.collect::<Vec<_>>();
        self.address = Some(address);
        Ok(self)
    }

    pub fn read_buffer(mut self, read_buffer: usize) -> Self {
        self.read_buffer = read_buffer;
        self
    }

    pub fn max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn build(self) -> Result<Server, ServerBuildError> {
        let address = self.address.filter(|address| !address.is_empty()).ok_or(ServerBuildError::MissingAddress)?;
        let config = ConnectionConfig { read_buffer: self.read_buffer, max_body_size: self.max_body_size };
        Ok(Server { address, config })
    }
}

#[derive(Debug)]
pub struct Server {
    address: Vec<SocketAddr>,
    config: ConnectionConfig,
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("address must be set")]
    MissingAddress,
    #[error("invalid address: {source}")]
    InvalidAddress { source: io::Error },
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("bind server error: {source}")]
    Bind { source: io::Error },
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub async fn start<H: Handler + 'static>(self, handler: H) -> Result<(), ServerError> {
        info!("start listening at {:?}", self.address);
        let tcp_listener = TcpListener::bind(self.address.as_slice()).await.map_err(|source| {
            error!(cause = %source, "bind server error");
            ServerError::Bind { source }
        })?;

        serve(tcp_listener, self.config, handler).await;
        Ok(())
    }
}

/// Accepts connections from `tcp_listener` forever.
///
/// A connection task that panics is logged here and does not affect the
/// listener or other connections.
pub async fn serve<H: Handler + 'static>(tcp_listener: TcpListener, config: ConnectionConfig, handler: H) {
    let handler = Arc::new(handler);
    loop {
        let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
            Ok(stream_and_addr) => stream_and_addr,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        let local_addr = match tcp_stream.local_addr() {
            Ok(local_addr) => local_addr,
            Err(e) => {
                warn!(cause = %e, "failed to read local address");
                continue;
            }
        };

        let handler = Arc::clone(&handler);

        tokio::spawn(async move {
            let (reader, writer) = tcp_stream.into_split();
            let connection = HttpConnection::with_config(reader, writer, ConnInfo::new(remote_addr, local_addr), config);

            match AssertUnwindSafe(connection.process(handler.as_ref())).catch_unwind().await {
                Ok(Ok(())) => {
                    info!(%remote_addr, "finished process, connection shutdown");
                }
                Ok(Err(e)) => {
                    error!(%remote_addr, cause = %e, "service has error, connection shutdown");
                }
                Err(payload) => {
                    let cause = payload
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_owned())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_owned());
                    error!(%remote_addr, %cause, "connection task panicked");
                }
            }
        });
    }
}
