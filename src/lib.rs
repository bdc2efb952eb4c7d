//! Virtual-host routing engine with streaming responses.
//!
//! Dispatches HTTP requests by Host header against wildcard host patterns
//! and hands the winning handler a backpressure-aware response stream.

pub mod app;
pub mod config;
pub mod http;
pub mod markup;
pub mod net;
pub mod observability;
pub mod routing;

pub use app::{App, Handler};
pub use http::{Request, ResponseStream, StreamError};
pub use net::{Binder, HttpProtocol, HttpsProtocol, Listener, ListenerError, TlsOptions};
pub use routing::InvalidPatternError;
