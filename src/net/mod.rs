//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop)
//!     → connection.rs (registry entry, kill switch, idle timeout)
//!     → Hand off to HTTP layer
//!
//! Shutdown:
//!     listener dropped → registry.close_all() → every connection task ends
//! ```
//!
//! # Design Decisions
//! - Each connection tracked for forced shutdown
//! - Closed connections remove themselves from the registry

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionRegistry, KillSwitch, IDLE_TIMEOUT};
pub use listener::{BindError, Listener, ListenerError};
