//! site-serve: development server for a static site build.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ net::listener ─▶ http::server ─▶ http::static_files ─▶ file
//!                         │                                  │
//!                         ▼                                  ▼ (lookup failed)
//!                  net::connection                     http::fallback
//!                  (registry, kill)                          │
//!                                           ┌────────────────┼──────────────┐
//!                                           ▼                ▼              ▼
//!                                   routing::redirect   error document   plain status
//!
//!     Cross-cutting: config, observability, lifecycle (start / shutdown)
//! ```

use std::path::PathBuf;

use clap::Parser;

use site_serve::config::{load_config, ServeConfig};
use site_serve::lifecycle::{wait_for_termination, SiteServer};
use site_serve::observability::init_logging;

#[derive(Parser)]
#[command(name = "site-serve")]
#[command(about = "Serve a static site build with redirects and custom error pages", long_about = None)]
struct Cli {
    /// Configuration file (TOML, or JSON by extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to serve when the config has no document root
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Log every served file
    #[arg(short, long)]
    verbose: bool,

    #[arg(long)]
    log_level: Option<String>,

    /// `pretty` or `compact`
    #[arg(long)]
    log_format: Option<String>,
}

impl Cli {
    /// Flags given on the command line override the config file.
    fn apply(&self, config: &mut ServeConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.verbose {
            config.verbose = true;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.observability.log_format = format.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SiteServer::defaults(),
    };
    cli.apply(&mut config);

    init_logging(&config.observability);
    tracing::info!("site-serve v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::debug!(
        bind_address = %config.bind_address(),
        redirects = config.redirects.len(),
        error_files = config.http_error_files.len(),
        "Configuration loaded"
    );

    let server = SiteServer::new(config);
    server.start(&cli.root).await?;

    wait_for_termination().await;
    server.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
