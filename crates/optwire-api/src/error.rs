use thiserror::Error;

use crate::envelope::ResponseEnvelope;

/// Top-level error type for the `optwire-api` crate.
///
/// Covers registry misses, directory resolution, transport, and
/// application-level failures. Variants that originate from a completed
/// HTTP exchange carry the full `{data, status, headers}` envelope so the
/// failure continuation sees the same shape as the success one.
#[derive(Debug, Error)]
pub enum Error {
    // ── Registry ────────────────────────────────────────────────────
    /// No client factory was registered under this name.
    #[error("Api client for \"{name}\" is not available")]
    UnknownApi { name: String },

    // ── Directory resolution ────────────────────────────────────────
    /// The directory request for an API failed. The next call retries.
    #[error("Could not fetch the API directory for \"{api}\": {source}")]
    DirectoryFetch {
        api: String,
        #[source]
        source: Box<Error>,
    },

    /// Neither an explicit URL nor a directory entry exists for the target.
    #[error("Could not find a valid url for \"{target}\" (api \"{api}\")")]
    NoBaseUrl { api: String, target: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response.
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
        response: Box<ResponseEnvelope>,
    },

    /// 2xx response whose body carries an error flag (or no body at all).
    #[error("Application error: {message}")]
    Application {
        message: String,
        response: Box<ResponseEnvelope>,
    },

    // ── Authentication ──────────────────────────────────────────────
    /// The authentication hook could not complete (token exchange failed).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Configuration ───────────────────────────────────────────────
    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or HTTP client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Data ────────────────────────────────────────────────────────
    /// A payload did not have the expected shape.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` for misconfiguration that retrying cannot fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownApi { .. } | Self::NoBaseUrl { .. } | Self::InvalidUrl(_) | Self::Tls(_)
        )
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::DirectoryFetch { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// The response envelope behind this failure, if one was received.
    pub fn response(&self) -> Option<&ResponseEnvelope> {
        match self {
            Self::Status { response, .. } | Self::Application { response, .. } => Some(response),
            Self::DirectoryFetch { source, .. } => source.response(),
            _ => None,
        }
    }

    /// HTTP status code, if the failure came from a completed exchange.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => self.response().map(|r| r.status),
        }
    }
}
