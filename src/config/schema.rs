//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.
//! Keys may be written in snake_case or in the camelCase spelling used by
//! site build tools (`indexFile`, `httpErrorFiles`, ...).

use std::collections::BTreeMap;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Root configuration for the development server.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServeConfig {
    /// `Cache-Control: max-age` applied to served files, in seconds.
    pub cache: u64,

    /// TCP port to listen on (0 picks an ephemeral port).
    pub port: u16,

    /// Host name or address to bind.
    pub host: String,

    /// Log every successfully served request.
    pub verbose: bool,

    /// Render an HTML listing for directories without an index file.
    #[serde(alias = "listDirectories")]
    pub list_directories: bool,

    /// File served for directory paths.
    #[serde(alias = "indexFile")]
    pub index_file: String,

    /// Serve precompressed `.gz` siblings to clients accepting gzip.
    pub gzip: bool,

    /// Extra response headers applied to every served file.
    pub headers: IndexMap<String, String>,

    /// Explicit document root; overrides the build output directory.
    #[serde(alias = "documentRoot")]
    pub document_root: Option<PathBuf>,

    /// Documents served (with the original status) for failed lookups.
    #[serde(
        alias = "httpErrorFiles",
        deserialize_with = "deserialize_status_keys",
        serialize_with = "serialize_status_keys"
    )]
    pub http_error_files: BTreeMap<u16, String>,

    /// Redirect rules, evaluated in declaration order.
    pub redirects: IndexMap<String, RedirectTarget>,

    /// Logging settings for the binary.
    pub observability: ObservabilityConfig,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            cache: 0,
            port: 8080,
            host: "localhost".to_string(),
            verbose: false,
            list_directories: false,
            index_file: "index.html".to_string(),
            gzip: false,
            headers: IndexMap::new(),
            document_root: None,
            http_error_files: BTreeMap::new(),
            redirects: IndexMap::new(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ServeConfig {
    /// The `host:port` pair the listener binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Destination of a redirect rule.
///
/// Either a bare template string (status 301) or a record carrying the
/// template in `path` and an optional status code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RedirectTarget {
    /// `"/old" = "/new"`
    Path(String),
    /// `"/old" = { path = "/new", status_code = 302 }`
    Detailed(RedirectSpec),
}

impl From<&str> for RedirectTarget {
    fn from(path: &str) -> Self {
        RedirectTarget::Path(path.to_string())
    }
}

/// Record form of a redirect destination.
///
/// `path` is optional at the schema level so that a rule missing it can be
/// reported and skipped at request time instead of failing the whole file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RedirectSpec {
    /// Destination template.
    #[serde(default)]
    pub path: Option<String>,

    /// Response status (default 301).
    #[serde(default, alias = "statusCode")]
    pub status_code: Option<u16>,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Output format: `pretty` or `compact`.
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
        }
    }
}

// TOML only allows string keys, so status codes travel as "404".
fn deserialize_status_keys<'de, D>(deserializer: D) -> Result<BTreeMap<u16, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, path)| {
            key.trim()
                .parse::<u16>()
                .map(|code| (code, path))
                .map_err(|_| de::Error::custom(format!("invalid status code key `{}`", key)))
        })
        .collect()
}

fn serialize_status_keys<S>(map: &BTreeMap<u16, String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(map.iter().map(|(code, path)| (code.to_string(), path)))
}
