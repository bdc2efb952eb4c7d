//! Socket listeners: plain and TLS accept loops.
//!
//! # Responsibilities
//! - Bind TCP listeners and run their accept loops
//! - Wrap accepted sockets in TLS when configured
//! - Cap concurrent connections per listener
//! - Expose a handle for inspection and shutdown
//!
//! # Design Decisions
//! - One accept loop task per listener; each connection gets its own task
//! - Connection limits use a semaphore acquired before `accept`, so an
//!   overloaded listener stops pulling from the backlog instead of
//!   accepting and dropping
//! - The TLS handshake runs inside the connection task, never in the
//!   accept loop

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};

use crate::app::App;
use crate::net::connection;
use crate::net::tls::{load_tls_acceptor, TlsError, TlsOptions};

/// Default cap on concurrent connections per listener.
const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// Errors raised while bringing a listener up.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The TCP bind itself failed (port in use, privileges).
    #[error("failed to bind port {port}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// TLS material could not be loaded.
    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// Plain-HTTP listener factory.
pub struct HttpProtocol;

impl HttpProtocol {
    /// Start describing a plain listener on `port` (0 picks an ephemeral
    /// port, useful in tests).
    pub fn listen(port: u16) -> Binder {
        Binder::new(port, None)
    }
}

/// HTTPS listener factory carrying its TLS material.
pub struct HttpsProtocol {
    options: TlsOptions,
}

impl HttpsProtocol {
    pub fn new(options: TlsOptions) -> Self {
        Self { options }
    }

    pub fn listen(self, port: u16) -> Binder {
        Binder::new(port, Some(self.options))
    }
}

/// Lightweight view of an accepted socket, handed to the connection hook.
#[derive(Debug, Clone, Copy)]
pub struct SocketHandle {
    peer: SocketAddr,
    secure: bool,
}

impl SocketHandle {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn secure(&self) -> bool {
        self.secure
    }
}

/// Builder for one listener; consumed by [`Binder::bind`].
pub struct Binder {
    port: u16,
    tls: Option<TlsOptions>,
    max_connections: usize,
    on_listen: Option<Box<dyn FnOnce(SocketAddr) + Send>>,
    on_connection: Option<Arc<dyn Fn(&SocketHandle) + Send + Sync>>,
}

impl Binder {
    fn new(port: u16, tls: Option<TlsOptions>) -> Self {
        Self {
            port,
            tls,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            on_listen: None,
            on_connection: None,
        }
    }

    /// Cap concurrent connections for this listener.
    pub fn max_connections(mut self, limit: usize) -> Self {
        self.max_connections = limit.max(1);
        self
    }

    /// Invoked once with the bound address, before the first accept.
    pub fn on_listen<F: FnOnce(SocketAddr) + Send + 'static>(mut self, hook: F) -> Self {
        self.on_listen = Some(Box::new(hook));
        self
    }

    /// Invoked for every accepted socket, before the request is read.
    pub fn on_connection<F: Fn(&SocketHandle) + Send + Sync + 'static>(mut self, hook: F) -> Self {
        self.on_connection = Some(Arc::new(hook));
        self
    }

    /// Bind the socket and spawn the accept loop serving `app`.
    pub async fn bind(self, app: &App) -> Result<Listener, ListenerError> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port));
        let socket = TcpListener::bind(addr).await.map_err(|source| ListenerError::Bind {
            port: self.port,
            source,
        })?;
        let local_addr = socket.local_addr().map_err(|source| ListenerError::Bind {
            port: self.port,
            source,
        })?;

        let acceptor = match &self.tls {
            Some(options) => Some(load_tls_acceptor(options)?),
            None => None,
        };
        let secure = acceptor.is_some();

        tracing::info!(
            addr = %local_addr,
            secure,
            max_connections = self.max_connections,
            "Listener bound"
        );
        if let Some(hook) = self.on_listen {
            hook(local_addr);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);
        tokio::spawn(accept_loop(
            socket,
            app.clone(),
            acceptor,
            self.on_connection,
            self.max_connections,
            Arc::clone(&shutdown_tx),
            shutdown_rx,
        ));

        let listener = Listener {
            inner: Arc::new(ListenerInner {
                local_addr,
                secure,
                shutdown: shutdown_tx,
            }),
        };
        app.attach_listener(listener.clone());
        Ok(listener)
    }
}

struct ListenerInner {
    local_addr: SocketAddr,
    secure: bool,
    shutdown: Arc<watch::Sender<bool>>,
}

/// Handle to a running listener.
#[derive(Clone)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

impl Listener {
    /// The address actually bound, with the resolved port.
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn secure(&self) -> bool {
        self.inner.secure
    }

    /// Stop accepting. Connections already being served run to completion.
    pub fn close(&self) {
        let _ = self.inner.shutdown.send(true);
    }
}

#[allow(clippy::too_many_arguments)]
async fn accept_loop(
    socket: TcpListener,
    app: App,
    acceptor: Option<tokio_rustls::TlsAcceptor>,
    on_connection: Option<Arc<dyn Fn(&SocketHandle) + Send + Sync>>,
    max_connections: usize,
    // Held so the channel only closes on an explicit `close()`.
    _shutdown_tx: Arc<watch::Sender<bool>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let limiter = Arc::new(Semaphore::new(max_connections));
    let secure = acceptor.is_some();

    loop {
        let permit = tokio::select! {
            permit = Arc::clone(&limiter).acquire_owned() => {
                permit.expect("connection limiter closed")
            }
            _ = shutdown_rx.changed() => break,
        };

        let (stream, peer) = tokio::select! {
            accepted = socket.accept() => match accepted {
                Ok(pair) => pair,
                Err(err) => {
                    // Transient accept errors (EMFILE and friends); keep going.
                    tracing::warn!(error = %err, "Accept failed");
                    continue;
                }
            },
            _ = shutdown_rx.changed() => break,
        };

        let handle = SocketHandle { peer, secure };
        if let Some(hook) = &on_connection {
            hook(&handle);
        }

        let app = app.clone();
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => connection::serve(tls_stream, app, peer, true).await,
                    Err(err) => {
                        tracing::debug!(peer = %peer, error = %err, "TLS handshake failed");
                    }
                },
                None => connection::serve(stream, app, peer, false).await,
            }
        });
    }

    tracing::info!("Listener closed");
}
