//! Error types for steer-dns.

use thiserror::Error;

/// Errors that can occur while probing, reconciling, or administering state.
#[derive(Debug, Error)]
pub enum SteerError {
    /// IO error (state files, template, subprocess plumbing).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error (DNS provider, Telegram, liveness probe).
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed persisted document or API payload.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid or missing configuration (env var, template token, settings).
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// DNS provider rejected a request with a non-success status.
    #[error("DNS provider returned {status}: {body}")]
    Provider {
        /// HTTP status code of the failed call.
        status: u16,
        /// Response body, truncated for logging.
        body: String,
    },

    /// No zone in the provider account matches the requested domain.
    #[error("no zone found for domain {0}")]
    ZoneNotFound(String),

    /// Referenced candidate ID does not exist.
    #[error("unknown candidate id {0}")]
    UnknownCandidate(String),

    /// The probe-proxy binary is not installed.
    #[error("xray-not-found")]
    ProbeBinaryMissing,
}

impl SteerError {
    /// Build a provider error, truncating the response body for logs.
    pub fn provider(status: u16, body: &str) -> Self {
        let mut body = body.to_string();
        if body.len() > 200 {
            let mut cut = 200;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        SteerError::Provider { status, body }
    }
}
