//! Configuration for optwire.
//!
//! TOML API profiles and field definitions, credential resolution
//! (env + keyring + plaintext), and construction of an
//! [`ApiRegistry`](optwire_api::ApiRegistry) from them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;
use url::Url;

use optwire_api::{
    ApiDescriptor, ApiFlavor, ApiRegistry, Authenticator, HeaderAuth, NoAuth, RequestOptions,
    TlsMode, TokenExchange, TransportConfig,
};
use optwire_core::FieldConfig;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for api '{api}'")]
    NoCredentials { api: String },

    #[error("unknown field '{name}'")]
    UnknownField { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Api(#[from] optwire_api::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend APIs.
    #[serde(default)]
    pub apis: BTreeMap<String, ApiProfile>,

    /// Named remote-backed fields.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldConfig>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    pub user_agent: Option<String>,

    /// Accept invalid TLS certificates (self-signed dev servers).
    #[serde(default)]
    pub insecure: bool,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            user_agent: None,
            insecure: false,
            ca_cert: None,
        }
    }
}

fn default_timeout() -> u64 {
    30
}

/// One named backend API.
#[derive(Debug, Deserialize, Serialize)]
pub struct ApiProfile {
    /// API root. A GET to it returns the API's directory.
    pub url: String,

    #[serde(default)]
    pub flavor: ApiFlavor,

    /// Static headers sent with every call.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub auth: AuthConfig,
}

/// How calls to an API authenticate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    None,
    /// Attach `auth.headers` (CSRF token, API key, ...).
    Headers,
    /// Exchange username/password for a bearer token.
    Token,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,

    /// Token endpoint; relative URLs are joined against the API root.
    pub token_url: Option<String>,

    pub username: Option<String>,

    /// Password in plaintext; keyring or env var take precedence.
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Headers for `mode = "headers"`.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Config {
    /// The named field definition.
    pub fn field(&self, name: &str) -> Result<FieldConfig, ConfigError> {
        let field = self
            .fields
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownField { name: name.into() })?;
        field
            .validate()
            .map_err(|e| invalid(format!("fields.{name}"), e.to_string()))?;
        Ok(field)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "optwire", "optwire").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("optwire");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from defaults, the TOML file, and environment.
///
/// `path` overrides the platform config location. A missing file is not
/// an error; defaults and environment still apply.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    debug!(path = %path.display(), "loading config");

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("OPTWIRE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the token-exchange password of `api`.
///
/// Order: `password_env` variable, keyring entry `optwire/<api>/password`,
/// plaintext `password`.
pub fn resolve_password(auth: &AuthConfig, api: &str) -> Result<SecretString, ConfigError> {
    // 1. Env var named by the profile
    if let Some(ref env_name) = auth.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new("optwire", &format!("{api}/password")) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = auth.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials { api: api.into() })
}

fn header_map(headers: &BTreeMap<String, String>, field: &str) -> Result<HeaderMap, ConfigError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| invalid(format!("{field}.{name}"), e.to_string()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| invalid(format!("{field}.{name}"), e.to_string()))?;
        map.insert(header, value);
    }
    Ok(map)
}

/// Build the authentication hook configured for `api`.
pub fn build_authenticator(
    api: &str,
    profile: &ApiProfile,
    root: &Url,
) -> Result<Arc<dyn Authenticator>, ConfigError> {
    let auth = &profile.auth;
    match auth.mode {
        AuthMode::None => Ok(Arc::new(NoAuth)),
        AuthMode::Headers => {
            let headers = header_map(&auth.headers, &format!("apis.{api}.auth.headers"))?;
            Ok(Arc::new(HeaderAuth::new(headers)))
        }
        AuthMode::Token => {
            let raw = auth
                .token_url
                .as_deref()
                .ok_or_else(|| invalid(format!("apis.{api}.auth.token_url"), "required for token auth"))?;
            let token_url = Url::parse(raw)
                .or_else(|_| root.join(raw))
                .map_err(|e| invalid(format!("apis.{api}.auth.token_url"), e.to_string()))?;
            let username = auth
                .username
                .clone()
                .ok_or_else(|| ConfigError::NoCredentials { api: api.into() })?;
            let password = resolve_password(auth, api)?;
            let credentials = json!({
                "username": username,
                "password": password.expose_secret(),
            });
            Ok(Arc::new(TokenExchange::new(token_url, credentials)))
        }
    }
}

// ── Registry construction ───────────────────────────────────────────

/// Transport settings from `[defaults]`.
pub fn transport_config(defaults: &Defaults) -> TransportConfig {
    let tls = if defaults.insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = defaults.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    let mut transport = TransportConfig {
        tls,
        timeout: Duration::from_secs(defaults.timeout),
        ..TransportConfig::default()
    };
    if let Some(ref agent) = defaults.user_agent {
        transport.user_agent.clone_from(agent);
    }
    transport
}

/// Translate one API profile into a registry factory.
pub fn api_descriptor(name: &str, profile: &ApiProfile) -> Result<ApiDescriptor, ConfigError> {
    let root = Url::parse(&profile.url)
        .map_err(|e| invalid(format!("apis.{name}.url"), format!("{e}: {}", profile.url)))?;

    let defaults = RequestOptions {
        headers: header_map(&profile.headers, &format!("apis.{name}.headers"))?,
        ..RequestOptions::default()
    };
    let authenticator = build_authenticator(name, profile, &root)?;

    Ok(ApiDescriptor::new(root)
        .with_flavor(profile.flavor)
        .with_defaults(defaults)
        .with_authenticator(authenticator))
}

/// Build a registry with one factory per configured API.
pub fn build_registry(config: &Config) -> Result<ApiRegistry, ConfigError> {
    let transport = transport_config(&config.defaults).build_transport()?;
    let registry = ApiRegistry::new(Arc::new(transport));
    for (name, profile) in &config.apis {
        registry.register(name.clone(), api_descriptor(name, profile)?);
    }
    debug!(apis = config.apis.len(), "registry built");
    Ok(registry)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn profile(url: &str) -> ApiProfile {
        ApiProfile {
            url: url.into(),
            flavor: ApiFlavor::Rest,
            headers: BTreeMap::new(),
            auth: AuthConfig::default(),
        }
    }

    #[test]
    fn transport_follows_tls_defaults() {
        let insecure = Defaults {
            insecure: true,
            ..Defaults::default()
        };
        assert!(matches!(
            transport_config(&insecure).tls,
            TlsMode::DangerAcceptInvalid
        ));

        let custom = Defaults {
            ca_cert: Some("/etc/ca.pem".into()),
            user_agent: Some("tests/1".into()),
            timeout: 5,
            ..Defaults::default()
        };
        let transport = transport_config(&custom);
        assert!(matches!(transport.tls, TlsMode::CustomCa(_)));
        assert_eq!(transport.user_agent, "tests/1");
        assert_eq!(transport.timeout, Duration::from_secs(5));
    }

    #[test]
    fn password_env_wins_over_plaintext() {
        let Ok(path) = std::env::var("PATH") else {
            return;
        };
        let auth = AuthConfig {
            password_env: Some("PATH".into()),
            password: Some("plaintext".into()),
            ..AuthConfig::default()
        };
        let resolved = resolve_password(&auth, "env-test").unwrap();
        assert_eq!(resolved.expose_secret(), path);
    }

    #[test]
    fn missing_password_is_no_credentials() {
        let auth = AuthConfig {
            password_env: Some("OPTWIRE_TEST_UNSET_PASSWORD_VAR".into()),
            ..AuthConfig::default()
        };
        let err = resolve_password(&auth, "optwire-test-no-such-api").unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials { .. }));
    }

    #[test]
    fn token_auth_requires_token_url() {
        let mut p = profile("http://api.test/");
        p.auth.mode = AuthMode::Token;
        p.auth.username = Some("ann".into());
        p.auth.password = Some("pw".into());
        let err = api_descriptor("main", &p).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "apis.main.auth.token_url"));

        p.auth.token_url = Some("/_token".into());
        assert!(api_descriptor("main", &p).is_ok());
    }

    #[test]
    fn invalid_url_and_headers_are_rejected() {
        assert!(matches!(
            api_descriptor("main", &profile("not a url")),
            Err(ConfigError::Validation { .. })
        ));

        let mut p = profile("http://api.test/");
        p.headers.insert("bad header".into(), "x".into());
        assert!(matches!(
            api_descriptor("main", &p),
            Err(ConfigError::Validation { .. })
        ));
    }
}
