//! Server lifecycle: start and shutdown of one site server.
//!
//! # Responsibilities
//! - Resolve the document root from configuration or the caller
//! - Bind the listener and spawn the accept loop
//! - Keep `start` idempotent while listening
//! - Tear down: stop accepting, drop the listener, force-close connections
//!
//! # Design Decisions
//! - Fail fast: a bind failure is returned to the caller, never retried
//! - Shutdown does not drain; open connections are terminated
//! - A handle that was shut down stays shut down

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::ServeConfig;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::net::{BindError, ConnectionRegistry, Listener};

/// Errors returned by [`SiteServer::start`].
#[derive(Debug, Error)]
pub enum ServerError {
    /// Another process already listens on the configured address.
    #[error("Address {address} already in use")]
    AddrInUse {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Binding failed for another reason.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The working directory needed to resolve a relative root is unavailable.
    #[error("Cannot resolve document root: {0}")]
    CurrentDir(#[source] io::Error),

    /// `start` was called after `shutdown`.
    #[error("Server has been shut down")]
    ShutDown,
}

impl ServerError {
    pub fn is_addr_in_use(&self) -> bool {
        matches!(self, Self::AddrInUse { .. })
    }
}

impl From<BindError> for ServerError {
    fn from(err: BindError) -> Self {
        match err {
            BindError::AddrInUse { address, source } => Self::AddrInUse { address, source },
            BindError::Io { address, source } => Self::Bind { address, source },
        }
    }
}

struct Running {
    local_addr: SocketAddr,
    document_root: PathBuf,
    shutdown: Shutdown,
    accept_task: JoinHandle<()>,
}

enum State {
    NotStarted,
    Listening(Running),
    ShutDown,
}

/// A development server for one static site.
pub struct SiteServer {
    config: Arc<ServeConfig>,
    connections: ConnectionRegistry,
    state: Mutex<State>,
}

impl SiteServer {
    /// Create a server handle; nothing is bound until [`start`](Self::start).
    pub fn new(config: ServeConfig) -> Self {
        Self {
            config: Arc::new(config),
            connections: ConnectionRegistry::new(),
            state: Mutex::new(State::NotStarted),
        }
    }

    /// The default configuration.
    pub fn defaults() -> ServeConfig {
        ServeConfig::default()
    }

    /// The configuration this server was created with.
    pub fn config(&self) -> &ServeConfig {
        &self.config
    }

    /// Registry of the currently open client connections.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Bound address, while listening.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.state.lock().await {
            State::Listening(running) => Some(running.local_addr),
            _ => None,
        }
    }

    /// Document root being served, while listening.
    pub async fn document_root(&self) -> Option<PathBuf> {
        match &*self.state.lock().await {
            State::Listening(running) => Some(running.document_root.clone()),
            _ => None,
        }
    }

    /// Start serving `build_output` (or the configured `document_root`).
    ///
    /// Returns the bound address. Calling this again while listening returns
    /// the same address without binding a second listener.
    pub async fn start(&self, build_output: impl AsRef<Path>) -> Result<SocketAddr, ServerError> {
        let mut state = self.state.lock().await;
        match &*state {
            State::Listening(running) => return Ok(running.local_addr),
            State::ShutDown => return Err(ServerError::ShutDown),
            State::NotStarted => {}
        }

        let document_root = resolve_root(&self.config, build_output.as_ref())?;
        let listener = Listener::bind(&self.config.host, self.config.port).await?;
        let local_addr = listener.local_addr();

        let server = HttpServer::new(&self.config, document_root.clone());
        let shutdown = Shutdown::new();
        let accept_task = tokio::spawn(server.run(
            listener,
            self.connections.clone(),
            shutdown.subscribe(),
        ));

        tracing::info!(
            "serving {} at http://{}:{}",
            document_root.display(),
            self.config.host,
            local_addr.port()
        );

        *state = State::Listening(Running {
            local_addr,
            document_root,
            shutdown,
            accept_task,
        });
        Ok(local_addr)
    }

    /// Stop accepting, release the listener and terminate open connections.
    ///
    /// Returns once the accept loop has ended. Calling this more than once,
    /// or before `start`, only marks the handle as shut down.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, State::ShutDown);

        if let State::Listening(running) = previous {
            running.shutdown.trigger();
            if let Err(e) = running.accept_task.await {
                tracing::error!(error = %e, "Accept loop ended abnormally");
            }
            let closed = self.connections.close_all();
            tracing::info!(
                address = %running.local_addr,
                closed_connections = closed,
                "Server shut down"
            );
        }
    }
}

/// `document_root` from the config wins over `build_output`; relative paths
/// are taken from the working directory.
fn resolve_root(config: &ServeConfig, build_output: &Path) -> Result<PathBuf, ServerError> {
    let root = config.document_root.as_deref().unwrap_or(build_output);
    if root.is_absolute() {
        return Ok(root.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(ServerError::CurrentDir)?;
    Ok(cwd.join(root))
}
