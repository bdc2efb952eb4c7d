//! Application: one route table plus the listeners serving it.
//!
//! # Responsibilities
//! - Own the route table and expose registration in handler form
//! - Resolve incoming hosts for the connection layer
//! - Track bound listeners so the whole app can be closed at once
//!
//! # Design Decisions
//! - Handlers are `Arc<dyn Fn>` so the same handler can serve many
//!   concurrent connections without cloning user state
//! - `App` is a cheap `Clone`; every accept loop and connection task holds
//!   one

use std::path::Path;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::http::{Request, ResponseStream};
use crate::markup::{MarkupParser, RenderContext};
use crate::net::Listener;
use crate::routing::{InvalidPatternError, RouteTable};

/// A request handler. Invoked once per matched request; may hand the stream
/// to other tasks and return immediately.
pub type Handler = Arc<dyn Fn(Request, ResponseStream) + Send + Sync>;

struct AppInner {
    table: RouteTable<Handler>,
    listeners: Mutex<Vec<Listener>>,
}

/// The routing application.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl App {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AppInner {
                table: RouteTable::new(),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register `handler` for hosts matching `pattern`.
    ///
    /// Group alternation (`{a,b}.host`) registers every expanded pattern
    /// under the same handler.
    pub fn route<F>(&self, pattern: &str, handler: F) -> Result<(), InvalidPatternError>
    where
        F: Fn(Request, ResponseStream) + Send + Sync + 'static,
    {
        self.inner.table.register(pattern, Arc::new(handler))
    }

    /// Register a fixed response body for hosts matching `pattern`.
    pub fn route_static(
        &self,
        pattern: &str,
        body: impl Into<Bytes>,
    ) -> Result<(), InvalidPatternError> {
        let body: Bytes = body.into();
        self.route(pattern, move |_req, res| {
            res.end(Some(&body));
        })
    }

    /// Render a markup source file once and serve the result.
    pub fn route_rendered<P: MarkupParser>(
        &self,
        pattern: &str,
        parser: &P,
        source: &Path,
    ) -> Result<(), InvalidPatternError> {
        let ctx = RenderContext::for_host(pattern);
        match parser.from_file(source, &ctx) {
            Ok(rendered) => {
                self.route_static(pattern, rendered.to_string().into_bytes())
            }
            Err(err) => {
                tracing::error!(
                    pattern = %pattern,
                    source = %source.display(),
                    error = %err,
                    "Markup render failed; serving 500"
                );
                self.route(pattern, |_req, res| {
                    res.write_status(500);
                    res.end(Some(b"Internal Server Error"));
                })
            }
        }
    }

    /// Remove every route registered under `pattern` (after expansion).
    pub fn unroute(&self, pattern: &str) -> Result<(), InvalidPatternError> {
        self.inner.table.unregister(pattern)
    }

    /// Resolve a host to its handler. `None` is the 404 outcome.
    pub fn resolve(&self, host: &str) -> Option<Handler> {
        self.inner.table.resolve(host)
    }

    /// Number of installed routes (after group expansion).
    pub fn route_count(&self) -> usize {
        self.inner.table.len()
    }

    pub(crate) fn attach_listener(&self, listener: Listener) {
        self.inner
            .listeners
            .lock()
            .expect("listener registry poisoned")
            .push(listener);
    }

    /// Addresses of every listener bound to this app.
    pub fn listener_addrs(&self) -> Vec<std::net::SocketAddr> {
        self.inner
            .listeners
            .lock()
            .expect("listener registry poisoned")
            .iter()
            .map(Listener::local_addr)
            .collect()
    }

    /// Close every listener. In-flight connections run to completion.
    pub fn close(&self) {
        for listener in self
            .inner
            .listeners
            .lock()
            .expect("listener registry poisoned")
            .iter()
        {
            listener.close();
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
