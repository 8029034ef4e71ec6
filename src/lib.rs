//! Development static-site server library.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::schema::ServeConfig;
pub use http::HttpServer;
pub use lifecycle::{ServerError, Shutdown, SiteServer};
