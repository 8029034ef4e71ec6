//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (status codes, header names)
//! - Reject empty patterns and paths
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServeConfig → Result<(), Vec<ValidationError>>
//! - A redirect record without `path` is NOT rejected here: it is reported
//!   and skipped per request, so one bad rule does not take the server down

use axum::http::{HeaderName, HeaderValue, StatusCode};
use thiserror::Error;

use crate::config::schema::{RedirectTarget, ServeConfig};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("index_file must not be empty")]
    EmptyIndexFile,

    #[error("redirect pattern must not be empty")]
    EmptyRedirectPattern,

    #[error("redirect `{pattern}` has invalid status code {code}")]
    InvalidRedirectStatus { pattern: String, code: u16 },

    #[error("http_error_files key {code} is not a valid status code")]
    InvalidErrorStatus { code: u16 },

    #[error("http_error_files entry for {code} has an empty path")]
    EmptyErrorFile { code: u16 },

    #[error("header `{name}` is not a valid header name or value")]
    InvalidHeader { name: String },
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ServeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.index_file.trim().is_empty() {
        errors.push(ValidationError::EmptyIndexFile);
    }

    for (pattern, target) in &config.redirects {
        if pattern.is_empty() {
            errors.push(ValidationError::EmptyRedirectPattern);
        }
        if let RedirectTarget::Detailed(spec) = target {
            if let Some(code) = spec.status_code {
                if StatusCode::from_u16(code).is_err() {
                    errors.push(ValidationError::InvalidRedirectStatus {
                        pattern: pattern.clone(),
                        code,
                    });
                }
            }
        }
    }

    for (code, path) in &config.http_error_files {
        if StatusCode::from_u16(*code).is_err() {
            errors.push(ValidationError::InvalidErrorStatus { code: *code });
        }
        if path.trim().is_empty() {
            errors.push(ValidationError::EmptyErrorFile { code: *code });
        }
    }

    for (name, value) in &config.headers {
        let valid = HeaderName::from_bytes(name.as_bytes()).is_ok()
            && HeaderValue::from_str(value).is_ok();
        if !valid {
            errors.push(ValidationError::InvalidHeader { name: name.clone() });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
