//! Observability: structured logging setup.

pub mod logging;
