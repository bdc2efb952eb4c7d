//! Route table: ordered (pattern, handler) storage and best-match lookup.
//!
//! # Responsibilities
//! - Register parsed patterns with their handlers
//! - Resolve an incoming host to at most one handler
//! - Publish changes atomically so readers never see a half-built table
//!
//! # Design Decisions
//! - Registration is expected at startup but may overlap with resolution;
//!   every mutation builds a fresh snapshot and swaps it in via `arc-swap`
//! - All-literal patterns get an exact-match map in front of the scan
//! - Selection is deterministic: specificity rank, then registration order

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use arc_swap::ArcSwap;

use super::pattern::{expand, host_labels, strip_port, InvalidPatternError, Pattern};

/// One registered route.
#[derive(Debug, Clone)]
pub struct Route<H> {
    pattern: Pattern,
    handler: H,
}

impl<H> Route<H> {
    /// The pattern this route was registered under.
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// The handler bound to this route.
    pub fn handler(&self) -> &H {
        &self.handler
    }
}

#[derive(Debug)]
struct Snapshot<H> {
    routes: Vec<Route<H>>,
    /// Exact-host fast path: normalized host text of all-literal patterns.
    exact: HashMap<String, usize>,
}

impl<H> Snapshot<H> {
    fn empty() -> Self {
        Self {
            routes: Vec::new(),
            exact: HashMap::new(),
        }
    }

    fn reindex(routes: Vec<Route<H>>) -> Self {
        let mut exact = HashMap::new();
        for (i, route) in routes.iter().enumerate() {
            if route.pattern.is_exact() {
                // First registration wins, like every other tie.
                exact.entry(route.pattern.exact_key()).or_insert(i);
            }
        }
        Self { routes, exact }
    }
}

/// Collection of routes bound to an app, shared across connections.
///
/// Generic over the handler so the dispatch logic is testable with plain
/// values; the app instantiates it with its boxed handler type.
pub struct RouteTable<H> {
    snapshot: ArcSwap<Snapshot<H>>,
    /// Serializes writers; readers go through the snapshot only.
    write_lock: Mutex<()>,
}

impl<H: Clone> RouteTable<H> {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::empty()),
            write_lock: Mutex::new(()),
        }
    }

    /// Parse and append routes for `pattern_text`.
    ///
    /// Group alternation may expand one call into several routes. The call
    /// is atomic: if any expanded pattern is invalid, nothing is registered.
    pub fn register(&self, pattern_text: &str, handler: H) -> Result<(), InvalidPatternError> {
        let mut parsed = Vec::new();
        for expanded in expand(pattern_text)? {
            parsed.push(Pattern::parse(&expanded)?);
        }

        let _guard = self.write_lock.lock().expect("route table writer poisoned");
        let mut routes = self.snapshot.load().routes.clone();
        for pattern in parsed {
            tracing::debug!(pattern = %pattern.text(), "Route registered");
            routes.push(Route {
                pattern,
                handler: handler.clone(),
            });
        }
        self.snapshot.store(Arc::new(Snapshot::reindex(routes)));
        Ok(())
    }

    /// Remove every route registered under `pattern_text` (after expansion).
    pub fn unregister(&self, pattern_text: &str) -> Result<(), InvalidPatternError> {
        let mut removed = Vec::new();
        for expanded in expand(pattern_text)? {
            removed.push(Pattern::parse(&expanded)?.text().to_string());
        }

        let _guard = self.write_lock.lock().expect("route table writer poisoned");
        let routes: Vec<Route<H>> = self
            .snapshot
            .load()
            .routes
            .iter()
            .filter(|r| !removed.iter().any(|t| t == r.pattern.text()))
            .cloned()
            .collect();
        self.snapshot.store(Arc::new(Snapshot::reindex(routes)));
        Ok(())
    }

    /// Resolve a Host header value to the best-matching handler.
    ///
    /// Selection is a total function: at most one route wins. `None` is the
    /// 404 outcome; there is no other rejection mechanism.
    pub fn resolve(&self, host: &str) -> Option<H> {
        let snapshot = self.snapshot.load();

        let normalized = {
            let bare = strip_port(host);
            bare.strip_suffix('.').unwrap_or(bare).to_ascii_lowercase()
        };
        if let Some(&i) = snapshot.exact.get(&normalized) {
            return Some(snapshot.routes[i].handler.clone());
        }

        let labels = host_labels(host);
        snapshot
            .routes
            .iter()
            .enumerate()
            .filter(|(_, route)| route.pattern.matches(&labels))
            .min_by_key(|(i, route)| (route.pattern.rank(), *i))
            .map(|(_, route)| route.handler.clone())
    }

    /// Number of installed routes (after expansion).
    pub fn len(&self) -> usize {
        self.snapshot.load().routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<H: Clone> Default for RouteTable<H> {
    fn default() -> Self {
        Self::new()
    }
}
