//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!
//! Request pipeline:
//!     → tower-http TraceLayer spans, tagged with x-request-id
//! ```

pub mod logging;

pub use logging::init_logging;
