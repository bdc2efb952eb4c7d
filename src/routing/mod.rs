//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (startup, occasionally at runtime):
//!     pattern text
//!     → pattern.rs (group expansion, parse into segments)
//!     → table.rs (append route, rebuild snapshot, atomic publish)
//!
//! Incoming request:
//!     Host header
//!     → table.rs (exact map, then ranked wildcard scan)
//!     → Return: handler or None (the 404 outcome)
//! ```
//!
//! # Design Decisions
//! - Patterns are immutable once registered
//! - Deterministic: same host always resolves to the same route
//! - Readers are lock-free; writers swap whole snapshots

pub mod pattern;
pub mod table;

pub use pattern::{InvalidPatternError, Pattern, Segment};
pub use table::{Route, RouteTable};
