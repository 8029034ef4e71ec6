//! Redirect routing subsystem.
//!
//! # Data Flow
//! ```text
//! Failed request target (path + query)
//!     → redirect.rs (ordered rule scan)
//!     → matcher.rs (glob OR parameter pattern, captures)
//!     → template.rs (substitute captures into destination)
//!     → Return: Redirect { status, location } or no match
//!
//! Rule Compilation (at startup):
//!     ServeConfig.redirects (ordered)
//!     → Compile both pattern dialects
//!     → Freeze as immutable RedirectTable
//! ```
//!
//! # Design Decisions
//! - Rules compiled at startup, immutable at runtime
//! - Deterministic: same input always matches same rule
//! - First match wins (declaration order)

pub mod matcher;
pub mod redirect;
pub mod template;

pub use matcher::{Captures, Matcher, PatternMatcher};
pub use redirect::{Redirect, RedirectTable, DEFAULT_REDIRECT_STATUS};
