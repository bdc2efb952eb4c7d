//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → request.rs (bounded head read, host extraction)
//!     → [routing layer resolves the handler]
//!     → response.rs (per-request stream: write/end/cork/abort/file)
//!     → Send to client
//! ```

pub mod request;
pub mod response;

pub use request::{Request, RequestError};
pub use response::{ResponseStream, StreamError, HIGH_WATER_MARK};
