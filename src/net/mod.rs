//! Network edge: listeners, TLS, and per-connection serving.
//!
//! # Data Flow
//! ```text
//! Binder::bind -> accept loop -> (TLS handshake) -> connection::serve
//!                                  -> request parse -> host resolve
//!                                  -> handler(Request, ResponseStream)
//! ```

pub(crate) mod connection;
pub mod listener;
pub mod tls;

pub use listener::{Binder, HttpProtocol, HttpsProtocol, Listener, ListenerError, SocketHandle};
pub use tls::{TlsError, TlsOptions};
