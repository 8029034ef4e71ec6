//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML/JSON) or programmatic ServeConfig
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServeConfig (validated, immutable)
//!     → shared via Arc with the request pipeline
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the server starts
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Redirect order is the declaration order of the file (IndexMap)

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::ObservabilityConfig;
pub use schema::RedirectSpec;
pub use schema::RedirectTarget;
pub use schema::ServeConfig;
pub use validation::{validate_config, ValidationError};
