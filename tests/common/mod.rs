//! Shared fixtures for integration tests.

use std::net::SocketAddr;
use std::path::Path;

use site_serve::config::loader::parse_json;
use site_serve::{ServeConfig, SiteServer};
use tempfile::TempDir;

pub const INDEX_HTML: &str = "<!DOCTYPE html><h1>index</h1>\n";
pub const NOT_FOUND_HTML: &str = "<!DOCTYPE html><h1>custom not found</h1>\n";

/// A document root with an index page, a 404 page and a nested directory.
pub fn site() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "index.html", INDEX_HTML);
    write(dir.path(), "404.html", NOT_FOUND_HTML);
    write(dir.path(), "docs/index.txt", "docs index\n");
    write(dir.path(), "docs/guide.txt", "guide\n");
    dir
}

pub fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

/// Parse `json` as a config bound to an ephemeral loopback port.
#[allow(dead_code)]
pub fn config(json: &str) -> ServeConfig {
    ServeConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..parse_json(json).unwrap()
    }
}

/// Start a server for `config` serving `root`.
pub async fn start(config: ServeConfig, root: &Path) -> (SiteServer, SocketAddr) {
    let server = SiteServer::new(config);
    let addr = server.start(root).await.unwrap();
    (server, addr)
}

/// HTTP client that reports redirects instead of following them.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
