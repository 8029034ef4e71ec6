//! Static file serving from the document root.
//!
//! # Responsibilities
//! - Map request paths to files under the document root
//! - Index file fallback and optional directory listings
//! - Cache headers (`Cache-Control`, `ETag`, `Last-Modified`) and 304s
//! - Precompressed `.gz` siblings for clients accepting gzip
//! - Report failures as a status (plus headers) instead of a response, so
//!   the caller decides what the client sees
//!
//! # Design Decisions
//! - Only GET and HEAD are served; anything else is a 405 with `Allow`
//! - `..` components are rejected before touching the filesystem
//! - Files are read whole: this serves a development build, not media

use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::Response;
use thiserror::Error;

use crate::config::ServeConfig;

/// Errors that can occur when serving static files.
#[derive(Debug, Error)]
pub enum FileError {
    /// The request path could not be decoded.
    #[error("Malformed path: {0}")]
    BadRequest(String),

    /// The requested file was not found.
    #[error("File not found: {0}")]
    NotFound(String),

    /// The path is forbidden (e.g., directory traversal attempt).
    #[error("Forbidden path: {0}")]
    Forbidden(String),

    /// Method not allowed (e.g., POST to static file).
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(Method),

    /// I/O error while reading file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FileError {
    /// Returns the HTTP status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Headers the client must see alongside the status.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Self::MethodNotAllowed(_) = self {
            headers.insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
        }
        headers
    }

    fn from_io(err: io::Error, request_path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(request_path.to_string()),
            io::ErrorKind::PermissionDenied => Self::Forbidden(request_path.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// The file-serving collaborator used by the request pipeline.
///
/// `serve` answers a request from the document root. `serve_file` serves a
/// specific root-relative file with a given status (custom error documents).
pub trait FileServer: Send + Sync + 'static {
    fn serve(&self, request: &Parts) -> impl Future<Output = Result<Response, FileError>> + Send;

    fn serve_file(
        &self,
        path: &str,
        status: StatusCode,
        request: &Parts,
    ) -> impl Future<Output = Result<Response, FileError>> + Send;
}

/// Static file server bound to one document root.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    index_file: String,
    cache_max_age: u64,
    headers: HeaderMap,
    gzip: bool,
    list_directories: bool,
}

impl StaticFiles {
    /// Creates a static file server for `root` with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index_file: "index.html".to_string(),
            cache_max_age: 0,
            headers: HeaderMap::new(),
            gzip: false,
            list_directories: false,
        }
    }

    /// Creates a file server for `root` from the serving options of `config`.
    ///
    /// Header entries that are not valid HTTP headers are skipped (validation
    /// reports them when the config is loaded from a file).
    pub fn from_config(root: impl Into<PathBuf>, config: &ServeConfig) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "Ignoring invalid custom header"),
            }
        }

        Self::new(root)
            .index(config.index_file.clone())
            .cache_max_age(config.cache)
            .headers(headers)
            .gzip(config.gzip)
            .list_directories(config.list_directories)
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index_file = index.into();
        self
    }

    pub fn cache_max_age(mut self, seconds: u64) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn gzip(mut self, enabled: bool) -> Self {
        self.gzip = enabled;
        self
    }

    pub fn list_directories(mut self, enabled: bool) -> Self {
        self.list_directories = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Decode and sanitize a request path into a file path under the root.
    fn resolve_path(&self, request_path: &str) -> Result<PathBuf, FileError> {
        let decoded = urlencoding::decode(request_path)
            .map_err(|_| FileError::BadRequest(request_path.to_string()))?;
        if decoded.contains('\0') {
            return Err(FileError::BadRequest(request_path.to_string()));
        }

        let relative = decoded.trim_start_matches('/');
        let mut path = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(FileError::Forbidden(request_path.to_string()));
                }
            }
        }
        Ok(path)
    }

    async fn serve_path(
        &self,
        path: &Path,
        status: StatusCode,
        request: &Parts,
        request_path: &str,
    ) -> Result<Response, FileError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| FileError::from_io(e, request_path))?;
        if !metadata.is_file() {
            return Err(FileError::NotFound(request_path.to_string()));
        }

        let etag = metadata
            .modified()
            .ok()
            .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
            .map(|age| format!("\"{:x}-{:x}\"", metadata.len(), age.as_secs()));
        let last_modified = metadata.modified().ok().map(httpdate::fmt_http_date);

        let mut builder = Response::builder().status(status);
        if let Some(etag) = &etag {
            if status == StatusCode::OK && if_none_match(&request.headers, etag) {
                return Ok(self.finish(
                    Response::builder()
                        .status(StatusCode::NOT_MODIFIED)
                        .header(header::ETAG, etag.as_str()),
                    Body::empty(),
                ));
            }
            builder = builder.header(header::ETAG, etag.as_str());
        }
        if let Some(last_modified) = last_modified {
            builder = builder.header(header::LAST_MODIFIED, last_modified);
        }

        let mime = mime_guess::from_path(path).first_or_octet_stream();
        builder = builder.header(header::CONTENT_TYPE, mime.as_ref());

        let bytes = match self.precompressed(path, &request.headers).await {
            Some(compressed) => {
                builder = builder
                    .header(header::CONTENT_ENCODING, "gzip")
                    .header(header::VARY, "Accept-Encoding");
                compressed
            }
            None => tokio::fs::read(path)
                .await
                .map_err(|e| FileError::from_io(e, request_path))?,
        };
        builder = builder.header(header::CONTENT_LENGTH, bytes.len());

        let body = if request.method == Method::HEAD {
            Body::empty()
        } else {
            Body::from(bytes)
        };
        Ok(self.finish(builder, body))
    }

    /// Contents of `<path>.gz` when gzip is enabled and the client accepts it.
    async fn precompressed(&self, path: &Path, headers: &HeaderMap) -> Option<Vec<u8>> {
        if !self.gzip || !accepts_gzip(headers) {
            return None;
        }
        let mut gz = path.as_os_str().to_owned();
        gz.push(".gz");
        tokio::fs::read(PathBuf::from(gz)).await.ok()
    }

    async fn list_directory(
        &self,
        dir: &Path,
        request: &Parts,
        request_path: &str,
    ) -> Result<Response, FileError> {
        let mut reader = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| FileError::from_io(e, request_path))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            entries.push(name);
        }
        entries.sort();

        let base = if request_path.ends_with('/') {
            request_path.to_string()
        } else {
            format!("{}/", request_path)
        };
        let title = escape_html(&base);
        let mut html = format!(
            "<!DOCTYPE html>\n<html><head><title>Index of {0}</title></head>\n<body><h1>Index of {0}</h1>\n<ul>\n",
            title
        );
        for name in &entries {
            let href = urlencoding::encode(name.trim_end_matches('/')).into_owned();
            let slash = if name.ends_with('/') { "/" } else { "" };
            html.push_str(&format!(
                "<li><a href=\"{}{}{}\">{}</a></li>\n",
                escape_html(&base),
                href,
                slash,
                escape_html(name)
            ));
        }
        html.push_str("</ul></body></html>\n");

        let builder = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
            .header(header::CONTENT_LENGTH, html.len());
        let body = if request.method == Method::HEAD {
            Body::empty()
        } else {
            Body::from(html)
        };
        Ok(self.finish(builder, body))
    }

    /// Apply the shared headers and build the response.
    fn finish(&self, builder: axum::http::response::Builder, body: Body) -> Response {
        let cache_control = format!("max-age={}", self.cache_max_age);
        let mut response = builder
            .header(header::CACHE_CONTROL, cache_control)
            .body(body)
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to build file response");
                let mut fallback = Response::new(Body::empty());
                *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            });
        for (name, value) in &self.headers {
            response.headers_mut().insert(name.clone(), value.clone());
        }
        response
    }
}

impl FileServer for StaticFiles {
    async fn serve(&self, request: &Parts) -> Result<Response, FileError> {
        if request.method != Method::GET && request.method != Method::HEAD {
            return Err(FileError::MethodNotAllowed(request.method.clone()));
        }

        let request_path = request.uri.path();
        let path = self.resolve_path(request_path)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| FileError::from_io(e, request_path))?;

        if metadata.is_dir() {
            let index = path.join(&self.index_file);
            if tokio::fs::metadata(&index).await.map(|m| m.is_file()).unwrap_or(false) {
                return self.serve_path(&index, StatusCode::OK, request, request_path).await;
            }
            if self.list_directories {
                return self.list_directory(&path, request, request_path).await;
            }
            return Err(FileError::NotFound(request_path.to_string()));
        }

        self.serve_path(&path, StatusCode::OK, request, request_path).await
    }

    async fn serve_file(
        &self,
        path: &str,
        status: StatusCode,
        request: &Parts,
    ) -> Result<Response, FileError> {
        let resolved = self.resolve_path(path)?;
        self.serve_path(&resolved, status, request, path).await
    }
}

fn if_none_match(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(',').any(|tag| tag.trim() == etag || tag.trim() == "*"))
        .unwrap_or(false)
}

fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value.split(',').any(|coding| {
                let mut parts = coding.trim().split(';');
                let name = parts.next().unwrap_or("").trim();
                let refused = parts.any(|p| matches!(p.trim(), "q=0" | "q=0.0" | "q=0.00" | "q=0.000"));
                name.eq_ignore_ascii_case("gzip") && !refused
            })
        })
        .unwrap_or(false)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::Request;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        fs::write(dir.path().join("style.css"), "body {}").unwrap();
        fs::write(dir.path().join("404.html"), "custom not found").unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/readme.txt"), "read me").unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        dir
    }

    fn parts(method: Method, uri: &str) -> Parts {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_serve_file_with_headers() {
        let dir = create_test_dir();
        let mut extra = HeaderMap::new();
        extra.insert("x-served-by", HeaderValue::from_static("site-serve"));
        let files = StaticFiles::new(dir.path()).cache_max_age(60).headers(extra);

        let response = files.serve(&parts(Method::GET, "/style.css")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "max-age=60");
        assert_eq!(response.headers()["x-served-by"], "site-serve");
        assert!(response.headers().contains_key(header::ETAG));
        assert!(response.headers().contains_key(header::LAST_MODIFIED));
        assert_eq!(body_string(response).await, "body {}");
    }

    #[tokio::test]
    async fn test_directory_serves_index() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());
        let response = files.serve(&parts(Method::GET, "/")).await.unwrap();
        assert_eq!(body_string(response).await, "<h1>home</h1>");
    }

    #[tokio::test]
    async fn test_custom_index_file() {
        let dir = create_test_dir();
        fs::write(dir.path().join("docs/index.txt"), "docs index").unwrap();
        let files = StaticFiles::new(dir.path()).index("index.txt");
        let response = files.serve(&parts(Method::GET, "/docs/")).await.unwrap();
        assert_eq!(body_string(response).await, "docs index");
    }

    #[tokio::test]
    async fn test_directory_without_index() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());
        let err = files.serve(&parts(Method::GET, "/empty/")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let listing = StaticFiles::new(dir.path()).list_directories(true);
        let response = listing.serve(&parts(Method::GET, "/docs")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains("Index of /docs/"));
        assert!(html.contains("href=\"/docs/readme.txt\""));
    }

    #[tokio::test]
    async fn test_not_found_and_traversal() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());

        let err = files.serve(&parts(Method::GET, "/lostfile.txt")).await.unwrap_err();
        assert!(matches!(err, FileError::NotFound(_)));

        let err = files.serve(&parts(Method::GET, "/docs/%2e%2e/%2e%2e/etc/passwd")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_method_not_allowed_carries_allow_header() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());
        let err = files.serve(&parts(Method::POST, "/index.html")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(err.headers()[header::ALLOW], "GET, HEAD");
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());
        let response = files.serve(&parts(Method::HEAD, "/index.html")).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "13");
        assert_eq!(body_string(response).await, "");
    }

    #[tokio::test]
    async fn test_if_none_match_returns_304() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());
        let first = files.serve(&parts(Method::GET, "/index.html")).await.unwrap();
        let etag = first.headers()[header::ETAG].clone();

        let mut request = parts(Method::GET, "/index.html");
        request.headers.insert(header::IF_NONE_MATCH, etag);
        let second = files.serve(&request).await.unwrap();
        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn test_gzip_sibling() {
        let dir = create_test_dir();
        fs::write(dir.path().join("style.css.gz"), [0x1f, 0x8b, 0x08]).unwrap();

        let mut request = parts(Method::GET, "/style.css");
        request
            .headers
            .insert(header::ACCEPT_ENCODING, HeaderValue::from_static("br, gzip"));

        let plain = StaticFiles::new(dir.path());
        let response = plain.serve(&request).await.unwrap();
        assert!(!response.headers().contains_key(header::CONTENT_ENCODING));

        let gzip = StaticFiles::new(dir.path()).gzip(true);
        let response = gzip.serve(&request).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "3");
    }

    #[tokio::test]
    async fn test_serve_file_keeps_status() {
        let dir = create_test_dir();
        let files = StaticFiles::new(dir.path());
        let request = parts(Method::GET, "/missing");
        let response = files
            .serve_file("/404.html", StatusCode::NOT_FOUND, &request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(response).await, "custom not found");

        let err = files
            .serve_file("/nope.html", StatusCode::NOT_FOUND, &request)
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::NotFound(_)));
    }

    #[test]
    fn test_accepts_gzip() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_gzip(&headers));
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip;q=0"));
        assert!(!accepts_gzip(&headers));
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("deflate, GZIP;q=0.8"));
        assert!(accepts_gzip(&headers));
    }
}
