//! Per-connection request lifecycle.
//!
//! # Data Flow
//! 1. Read one request head off the socket
//! 2. Resolve the Host header against the app's route table
//! 3. Hand the request and a `ResponseStream` to the winning handler
//! 4. Watch the read half: a peer close before completion is an abort
//!
//! Connections are single-shot: every response carries `Connection: close`
//! and the socket is torn down once the stream completes.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, BufReader};

use crate::app::App;
use crate::http::request::{read_request, RequestError};
use crate::http::response::{write_simple_response, ResponseStream};

/// Monotonic identifier for log correlation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Drive one accepted socket to completion.
pub(crate) async fn serve<S>(socket: S, app: App, peer: SocketAddr, secure: bool)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let id = ConnectionId::next();
    let (read_half, write_half) = tokio::io::split(socket);
    let mut reader = BufReader::new(read_half);

    let request = match read_request(&mut reader, secure, peer).await {
        Ok(request) => request,
        Err(RequestError::UnexpectedEof) => {
            // Health probes and port scanners; nothing to answer.
            tracing::debug!(connection = %id, peer = %peer, "Peer closed before sending a request");
            return;
        }
        Err(err) => {
            tracing::debug!(connection = %id, peer = %peer, error = %err, "Rejecting malformed request");
            let mut sink = write_half;
            let _ = write_simple_response(&mut sink, 400, b"Bad Request").await;
            return;
        }
    };

    let domain = request.domain().to_string();
    let Some(handler) = app.resolve(&domain) else {
        tracing::debug!(connection = %id, host = %domain, "No route for host");
        let mut sink = write_half;
        let _ = write_simple_response(&mut sink, 404, b"Not Found").await;
        return;
    };

    tracing::debug!(
        connection = %id,
        peer = %peer,
        host = %domain,
        method = %request.method(),
        path = %request.path(),
        "Dispatching request"
    );

    let stream = ResponseStream::new(write_half);
    handler(request, stream.clone());

    // The handler may keep writing from other tasks; stay on the read half
    // so a peer disconnect turns into an abort instead of wasted writes.
    let mut drain = [0u8; 1024];
    loop {
        tokio::select! {
            _ = stream.wait_complete() => break,
            read = reader.read(&mut drain) => match read {
                Ok(0) | Err(_) => {
                    stream.trigger_abort();
                    stream.wait_complete().await;
                    break;
                }
                // Pipelined bytes are ignored; this connection serves one
                // request.
                Ok(_) => {}
            },
        }
    }

    tracing::trace!(connection = %id, bytes = stream.bytes_flushed(), "Connection finished");
}
