//! Failed-lookup handling.
//!
//! # Responsibilities
//! - Decide, once per failed file lookup, what the client receives
//! - Priority: configured redirect → custom error document → generic status
//! - Log every routing decision
//!
//! # Design Decisions
//! - Single pass: exactly one branch produces the response, no retries
//! - A redirect wins over an error document for the same request
//! - An error document that cannot be served fails that request only (500)

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::http::static_files::{FileError, FileServer};
use crate::routing::{Redirect, RedirectTable};

/// A failure that escapes the fallback pipeline.
#[derive(Debug, Error)]
pub enum FallbackError {
    /// The configured error document itself could not be served.
    #[error("custom error document `{document}` for status {status} could not be served: {source}")]
    ErrorDocument {
        status: StatusCode,
        document: String,
        #[source]
        source: FileError,
    },
}

impl IntoResponse for FallbackError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Request failed");
        plain_status(StatusCode::INTERNAL_SERVER_ERROR, HeaderMap::new())
    }
}

/// Dispatches failed file lookups to redirect, error document or plain status.
pub struct ErrorFallback<F> {
    redirects: Arc<RedirectTable>,
    error_files: BTreeMap<u16, String>,
    files: Arc<F>,
}

impl<F: FileServer> ErrorFallback<F> {
    pub fn new(
        redirects: Arc<RedirectTable>,
        error_files: BTreeMap<u16, String>,
        files: Arc<F>,
    ) -> Self {
        Self {
            redirects,
            error_files,
            files,
        }
    }

    /// Produce the response for a request whose file lookup failed with `error`.
    pub async fn dispatch(&self, request: &Parts, error: FileError) -> Result<Response, FallbackError> {
        let target = request
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| request.uri.path());

        if let Some(redirect) = self.redirects.resolve(target) {
            match redirect_response(&redirect) {
                Some(response) => {
                    tracing::info!(
                        status = redirect.status.as_u16(),
                        path = %target,
                        location = %redirect.location,
                        "Redirecting"
                    );
                    return Ok(response);
                }
                None => tracing::warn!(
                    path = %target,
                    location = %redirect.location,
                    "Redirect location is not a valid header value"
                ),
            }
        }

        let status = error.status();
        if let Some(document) = self.error_files.get(&status.as_u16()) {
            tracing::info!(
                status = status.as_u16(),
                path = %target,
                document = %document,
                "Serving custom error document"
            );
            return self
                .files
                .serve_file(document, status, request)
                .await
                .map_err(|source| FallbackError::ErrorDocument {
                    status,
                    document: document.clone(),
                    source,
                });
        }

        tracing::warn!(status = status.as_u16(), path = %target, error = %error, "Request failed");
        Ok(plain_status(status, error.headers()))
    }
}

fn redirect_response(redirect: &Redirect) -> Option<Response> {
    let location = HeaderValue::from_bytes(redirect.location.as_bytes()).ok()?;
    let mut headers = HeaderMap::new();
    headers.insert(header::LOCATION, location);
    Some(plain_status(redirect.status, headers))
}

/// `status` with its reason phrase as a plain-text body.
pub fn plain_status(status: StatusCode, headers: HeaderMap) -> Response {
    let reason = status.canonical_reason().unwrap_or_default();
    let mut response = Response::new(Body::from(reason));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response.headers_mut().extend(headers);
    response
}
