//! CLI error types with miette diagnostics.
//!
//! Maps dispatcher, engine and config errors into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use optwire_api::Error as ApiError;
use optwire_config::ConfigError;
use optwire_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Request to '{api}' failed")]
    #[diagnostic(
        code(optwire::connection_failed),
        help(
            "Check that the backend is running and reachable.\n\
             Try: optwire directory {api} -vv"
        )
    )]
    ConnectionFailed {
        api: String,
        #[source]
        source: ApiError,
    },

    #[error("Could not fetch the directory of '{api}'")]
    #[diagnostic(
        code(optwire::directory),
        help("The API root must answer GET with a JSON object of `name: url` entries.")
    )]
    Directory {
        api: String,
        #[source]
        source: ApiError,
    },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(optwire::auth_failed),
        help("Verify the [apis.<name>.auth] section of your config.")
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for api '{api}'")]
    #[diagnostic(
        code(optwire::no_credentials),
        help(
            "Set auth.username plus one of auth.password_env, auth.password,\n\
             or a keyring entry 'optwire' / '{api}/password'."
        )
    )]
    NoCredentials { api: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(optwire::not_found),
        help("Run: optwire {list_command} to see what is configured")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error ({code}): {message}")]
    #[diagnostic(code(optwire::api_error))]
    Api { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(optwire::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration could not be loaded")]
    #[diagnostic(
        code(optwire::config),
        help("Check the file at: {path}")
    )]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(optwire::json), help("Check the --body value and try again."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Directory { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Wrap a dispatcher error raised while talking to `api`.
    pub fn api(api: &str, err: ApiError) -> Self {
        match err {
            ApiError::UnknownApi { name } => Self::NotFound {
                resource_type: "api".into(),
                identifier: name,
                list_command: "apis".into(),
            },
            ApiError::DirectoryFetch { .. } => Self::Directory {
                api: api.into(),
                source: err,
            },
            ApiError::NoBaseUrl { target, .. } => Self::NotFound {
                resource_type: "directory entry".into(),
                identifier: target,
                list_command: format!("directory {api}"),
            },
            ApiError::Authentication { message } => Self::AuthFailed { message },
            ApiError::Status {
                status, message, ..
            } => Self::Api {
                code: status.to_string(),
                message,
            },
            ApiError::Application { message, .. } => Self::Api {
                code: "application".into(),
                message,
            },
            ApiError::Deserialization { message, .. } => Self::Api {
                code: "payload".into(),
                message,
            },
            ApiError::InvalidUrl(e) => Self::Validation {
                field: "url".into(),
                reason: e.to_string(),
            },
            other => Self::ConnectionFailed {
                api: api.into(),
                source: other,
            },
        }
    }

    pub fn config(path: &std::path::Path, err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { api } => Self::NoCredentials { api },
            ConfigError::UnknownField { name } => Self::NotFound {
                resource_type: "field".into(),
                identifier: name,
                list_command: "config show".into(),
            },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::Api(e) => Self::api("(config)", e),
            other => Self::Config {
                path: path.display().to_string(),
                source: other,
            },
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Api(e) => Self::api("(field)", e),
            CoreError::InvalidAttribute { name, message } => Self::Validation {
                field: name,
                reason: message,
            },
            other => Self::Api {
                code: "engine".into(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_api_maps_to_not_found() {
        let err = CliError::api(
            "main",
            ApiError::UnknownApi {
                name: "main".into(),
            },
        );
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);
    }

    #[test]
    fn auth_errors_exit_with_auth_code() {
        let err = CliError::api(
            "main",
            ApiError::Authentication {
                message: "denied".into(),
            },
        );
        assert_eq!(err.exit_code(), exit_code::AUTH);
        assert_eq!(
            CliError::config(
                std::path::Path::new("/x"),
                ConfigError::NoCredentials { api: "main".into() }
            )
            .exit_code(),
            exit_code::AUTH
        );
    }
}
