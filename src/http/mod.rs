//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper connection, Axum router, request ID, tracing)
//!     → static_files.rs (map path to file under the document root)
//!     → on failure: fallback.rs
//!         → redirect (routing layer decides target)
//!         → custom error document (served by static_files.rs)
//!         → plain status with reason phrase
//!     → Send to client
//! ```

pub mod fallback;
pub mod server;
pub mod static_files;

pub use fallback::{plain_status, ErrorFallback, FallbackError};
pub use server::HttpServer;
pub use static_files::{FileError, FileServer, StaticFiles};
