//! HTTP server setup and connection handling.
//!
//! # Responsibilities
//! - Create the Axum Router with the static-file handler
//! - Wire up middleware (request ID, tracing)
//! - Run the accept loop until shutdown is signalled
//! - Serve each connection over HTTP/1.1 with an idle timeout
//! - Hand failed lookups to the error fallback
//!
//! # Design Decisions
//! - Connections are driven by hyper directly so each one can be registered
//!   and force-closed; Axum only provides the service
//! - Every request goes through a single fallback handler (no route table)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
    Router,
};
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpStream;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServeConfig;
use crate::http::fallback::ErrorFallback;
use crate::http::static_files::{FileServer, StaticFiles};
use crate::lifecycle::ShutdownSignal;
use crate::net::{ConnectionRegistry, Listener, IDLE_TIMEOUT};
use crate::routing::RedirectTable;

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Application state injected into the handler.
pub struct AppState {
    pub files: Arc<StaticFiles>,
    pub fallback: ErrorFallback<StaticFiles>,
    pub verbose: bool,
}

/// HTTP server for a static site.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a server that serves `document_root` according to `config`.
    pub fn new(config: &ServeConfig, document_root: impl Into<PathBuf>) -> Self {
        let files = Arc::new(StaticFiles::from_config(document_root, config));
        let redirects = Arc::new(RedirectTable::from_config(&config.redirects));
        let fallback = ErrorFallback::new(
            redirects,
            config.http_error_files.clone(),
            Arc::clone(&files),
        );

        let state = Arc::new(AppState {
            files,
            fallback,
            verbose: config.verbose,
        });

        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: Arc<AppState>) -> Router {
        Router::new()
            .fallback(serve_handler)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// The request router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Accept connections until `shutdown` fires.
    ///
    /// Every accepted connection is registered in `registry` before its task
    /// starts. The listener is dropped when this returns.
    pub async fn run(self, listener: Listener, registry: ConnectionRegistry, mut shutdown: ShutdownSignal) {
        tracing::debug!(address = %listener.local_addr(), "HTTP server starting");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer, &registry),
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        tracing::debug!(address = %listener.local_addr(), "HTTP server stopped accepting");
    }

    fn spawn_connection(&self, stream: TcpStream, peer: std::net::SocketAddr, registry: &ConnectionRegistry) {
        let (guard, kill) = registry.register(peer);
        let service = TowerToHyperService::new(self.router.clone());

        tokio::spawn(async move {
            let _guard = guard;

            let mut builder = http1::Builder::new();
            builder.timer(TokioTimer::new()).header_read_timeout(IDLE_TIMEOUT);
            let connection = builder.serve_connection(TokioIo::new(stream), service);

            tokio::select! {
                result = connection => {
                    if let Err(e) = result {
                        tracing::debug!(peer_addr = %peer, error = %e, "Connection ended with error");
                    }
                }
                _ = kill.fired() => {
                    tracing::debug!(peer_addr = %peer, "Connection terminated by shutdown");
                }
            }
        });
    }
}

/// Serves every request: static file first, error fallback otherwise.
async fn serve_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, _body) = request.into_parts();

    match state.files.serve(&parts).await {
        Ok(response) => {
            if state.verbose {
                tracing::info!(
                    method = %parts.method,
                    path = %parts.uri,
                    status = response.status().as_u16(),
                    "Served"
                );
            }
            response
        }
        Err(error) => match state.fallback.dispatch(&parts, error).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, StatusCode};
    use indexmap::IndexMap;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::config::RedirectTarget;

    fn site() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::write(dir.path().join("404.html"), "<h1>missing</h1>").unwrap();
        dir
    }

    async fn send(server: &HttpServer, method: Method, uri: &str) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        server.router().oneshot(request).await.unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_serves_index_with_request_id() {
        let dir = site();
        let server = HttpServer::new(&ServeConfig::default(), dir.path());

        let response = send(&server, Method::GET, "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(body_string(response).await, "<h1>home</h1>");
    }

    #[tokio::test]
    async fn test_missing_file_uses_error_document() {
        let dir = site();
        let mut config = ServeConfig::default();
        config.http_error_files.insert(404, "/404.html".into());
        let server = HttpServer::new(&config, dir.path());

        let response = send(&server, Method::GET, "/lostfile.txt").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(response).await, "<h1>missing</h1>");
    }

    #[tokio::test]
    async fn test_redirect_with_params() {
        let dir = site();
        let mut redirects = IndexMap::new();
        redirects.insert(
            "/docs/:section/:page".to_string(),
            RedirectTarget::from("/manual/:page/:section"),
        );
        let config = ServeConfig {
            redirects,
            ..ServeConfig::default()
        };
        let server = HttpServer::new(&config, dir.path());

        let response = send(&server, Method::GET, "/docs/intro/setup").await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[header::LOCATION], "/manual/setup/intro");
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let dir = site();
        let server = HttpServer::new(&ServeConfig::default(), dir.path());

        let response = send(&server, Method::POST, "/index.html").await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body_string(response).await, "Method Not Allowed");
    }
}
