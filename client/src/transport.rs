//! Remote-call channel between a session and the server.

use log::{debug, info};
use shared::framing::{read_packet, write_packet};
use shared::{Packet, SyncError};
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;

/// A request/response channel to the sync server.
///
/// `call` takes `&mut self`, so a transport can never have two requests in
/// flight. Failures of the channel itself must come back as
/// `SyncError::Transport` or `SyncError::Timeout`; a refusal from the server
/// is a normal `Packet::Rejected` response.
pub trait Transport {
    fn call(&mut self, request: &Packet) -> impl Future<Output = Result<Packet, SyncError>> + Send;
}

/// Framed bincode over one reused TCP connection.
///
/// The connection is dialed on the first call. Any transport failure drops
/// it, and the next call dials again.
pub struct TcpTransport {
    server_addr: String,
    stream: Option<TcpStream>,
    call_timeout: Option<Duration>,
}

impl TcpTransport {
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            stream: None,
            call_timeout: None,
        }
    }

    /// Bounds each call, dial included. Without a timeout a stalled server
    /// blocks the caller indefinitely.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn dial(&self) -> Result<TcpStream, SyncError> {
        info!("Dialing {}", self.server_addr);
        let stream = TcpStream::connect(self.server_addr.as_str()).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// The stream is taken for the duration of the exchange and only put
    /// back once a full response has been read.
    async fn exchange(&mut self, request: &Packet) -> Result<Packet, SyncError> {
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => self.dial().await?,
        };

        write_packet(&mut stream, request).await?;
        let response = read_packet(&mut stream).await?;
        self.stream = Some(stream);
        Ok(response)
    }
}

impl Transport for TcpTransport {
    async fn call(&mut self, request: &Packet) -> Result<Packet, SyncError> {
        let result = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.exchange(request)).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::Timeout(limit)),
            },
            None => self.exchange(request).await,
        };

        if let Err(e) = &result {
            debug!("Call to {} failed: {}", self.server_addr, e);
        }
        result
    }
}
