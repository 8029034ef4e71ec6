//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (server.rs):
//!     Resolve document root → Bind listener → Spawn accept loop
//!
//! Shutdown (shutdown.rs, server.rs):
//!     trigger() → accept loop exits, listener dropped → close_all()
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → binary calls shutdown()
//! ```
//!
//! # Design Decisions
//! - Listener starts last (traffic only when the router is ready)
//! - Ordered shutdown: stop accept, then close connections

pub mod server;
pub mod shutdown;
pub mod signals;

pub use server::{ServerError, SiteServer};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::wait_for_termination;
