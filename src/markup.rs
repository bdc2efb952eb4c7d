//! Boundary trait for external markup renderers.
//!
//! The engine does not render markup itself; a parser implementation is
//! injected where pages are registered (`App::route_rendered`).

use std::fmt;
use std::io;
use std::path::Path;

/// Context handed to the parser alongside the source text.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    host: String,
}

impl RenderContext {
    /// Context for a page served under `host`.
    pub fn for_host(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// The host pattern the page is registered under.
    pub fn host(&self) -> &str {
        &self.host
    }
}

/// A rendered document, ready to serve as a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered(String);

impl Rendered {
    pub fn new(html: String) -> Self {
        Self(html)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Implemented by markup renderers plugged into the engine.
pub trait MarkupParser {
    /// Render an in-memory markup string.
    fn from_markdown_string(&self, text: &str, ctx: &RenderContext) -> io::Result<Rendered>;

    /// Render a markup source file.
    fn from_file(&self, path: &Path, ctx: &RenderContext) -> io::Result<Rendered>;
}
