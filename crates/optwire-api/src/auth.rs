// Authentication hooks.
//
// A hook runs exactly once per call, after the URL is resolved and before
// the transport sends the request. It may issue one request of its own
// (token exchange) but goes straight to the transport to do so, so there
// is no recursion back into the dispatcher.

use std::fmt;

use futures_util::future::BoxFuture;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use crate::envelope::{TransportRequest, Verb};
use crate::error::Error;
use crate::transport::Transport;

/// What a hook can see besides the request it decorates.
pub struct AuthContext<'a> {
    /// Name of the API the call belongs to.
    pub api: &'a str,
    /// Transport for the hook's own request, if it needs one.
    pub transport: &'a dyn Transport,
}

/// Per-call authentication hook (`applyAuthHeaders`).
pub trait Authenticator: Send + Sync + fmt::Debug {
    fn authenticate<'a>(
        &'a self,
        ctx: AuthContext<'a>,
        request: &'a mut TransportRequest,
    ) -> BoxFuture<'a, Result<(), Error>>;
}

// ── No authentication ────────────────────────────────────────────────

/// Leaves requests untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl Authenticator for NoAuth {
    fn authenticate<'a>(
        &'a self,
        _ctx: AuthContext<'a>,
        _request: &'a mut TransportRequest,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async { Ok(()) })
    }
}

// ── Static header bag ────────────────────────────────────────────────

/// Attaches a fixed header bag (CSRF token, API key, ...) to every call.
///
/// Values are marked sensitive so they never show up in debug output.
#[derive(Clone, Default)]
pub struct HeaderAuth {
    headers: HeaderMap,
}

impl HeaderAuth {
    pub fn new(mut headers: HeaderMap) -> Self {
        for value in headers.values_mut() {
            value.set_sensitive(true);
        }
        Self { headers }
    }

    /// Convenience for the common single CSRF header case.
    pub fn csrf(header: &'static str, token: &SecretString) -> Result<Self, Error> {
        let value =
            HeaderValue::from_str(token.expose_secret()).map_err(|e| Error::Authentication {
                message: format!("invalid CSRF header value: {e}"),
            })?;
        let mut headers = HeaderMap::new();
        headers.insert(header, value);
        Ok(Self::new(headers))
    }
}

impl fmt::Debug for HeaderAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderAuth")
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Authenticator for HeaderAuth {
    fn authenticate<'a>(
        &'a self,
        _ctx: AuthContext<'a>,
        request: &'a mut TransportRequest,
    ) -> BoxFuture<'a, Result<(), Error>> {
        for (name, value) in &self.headers {
            request.headers.insert(name.clone(), value.clone());
        }
        Box::pin(async { Ok(()) })
    }
}

// ── Token exchange ───────────────────────────────────────────────────

/// Exchanges credentials for a bearer token on first use.
///
/// The token is cached for the lifetime of the hook. A failed exchange
/// leaves the cache empty, so the next call tries again.
pub struct TokenExchange {
    token_url: Url,
    credentials: Value,
    token: OnceCell<SecretString>,
}

impl TokenExchange {
    /// `credentials` is POSTed as the JSON body of the exchange request.
    pub fn new(token_url: Url, credentials: Value) -> Self {
        Self {
            token_url,
            credentials,
            token: OnceCell::new(),
        }
    }

    /// Use an already known token; no exchange request will be made.
    pub fn with_token(token_url: Url, token: SecretString) -> Self {
        Self {
            token_url,
            credentials: Value::Null,
            token: OnceCell::new_with(Some(token)),
        }
    }

    /// Whether a token has been obtained.
    pub fn has_token(&self) -> bool {
        self.token.initialized()
    }

    async fn exchange(&self, ctx: &AuthContext<'_>) -> Result<SecretString, Error> {
        info!(api = ctx.api, url = %self.token_url, "Fetching authentication token");
        let request = TransportRequest::new(Verb::Post, self.token_url.clone())
            .with_data(Some(self.credentials.clone()));
        let response = ctx.transport.execute(request).await?;

        if !response.is_success() {
            return Err(Error::Authentication {
                message: format!("token endpoint returned HTTP {}", response.status),
            });
        }

        response
            .data
            .get("token")
            .and_then(Value::as_str)
            .map(|token| SecretString::from(token.to_owned()))
            .ok_or_else(|| Error::Authentication {
                message: "token endpoint response has no token".into(),
            })
    }
}

impl fmt::Debug for TokenExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenExchange")
            .field("token_url", &self.token_url.as_str())
            .field("has_token", &self.has_token())
            .finish_non_exhaustive()
    }
}

impl Authenticator for TokenExchange {
    fn authenticate<'a>(
        &'a self,
        ctx: AuthContext<'a>,
        request: &'a mut TransportRequest,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let token = self.token.get_or_try_init(|| self.exchange(&ctx)).await?;
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|e| Error::Authentication {
                    message: format!("invalid token header value: {e}"),
                })?;
            value.set_sensitive(true);
            request.headers.insert(AUTHORIZATION, value);
            debug!(api = ctx.api, "bearer token attached");
            Ok(())
        })
    }
}
