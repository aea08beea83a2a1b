// Request dispatcher.
//
// `ApiClient` resolves the base URL of each call (fetching and caching the
// API's directory on first use), runs the authentication hook, sends the
// request through the transport, and normalizes the outcome so that a
// transport failure and an error-flagged body both land on the failure side.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{AuthContext, Authenticator, NoAuth};
use crate::directory::{self, Directory, DirectoryEntries};
use crate::envelope::{
    RequestEnvelope, RequestOptions, ResponseEnvelope, TransportRequest, Verb, is_truthy,
};
use crate::error::Error;
use crate::transport::Transport;

/// Directory resolution progress of one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// No directory yet (initial state, and after a failed fetch).
    Unresolved,
    /// A directory fetch is in progress.
    Resolving,
    /// The directory is cached; calls go straight to the transport.
    Resolved,
}

/// How the final URL is derived from base URL and sub-path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFlavor {
    /// `{base}/{path}`.
    #[default]
    Rest,
    /// `{base}/{path}.json`, for APIs served as static JSON files.
    StaticJson,
}

/// A client for one named backend API.
///
/// Created once per name by the registry and shared behind an `Arc`.
pub struct ApiClient {
    name: String,
    root: Url,
    flavor: ApiFlavor,
    defaults: RequestOptions,
    authenticator: Arc<dyn Authenticator>,
    transport: Arc<dyn Transport>,
    directory: Arc<Directory>,
    state: RwLock<ResolutionState>,
}

impl ApiClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// `root` is the API's own base endpoint: calls without a named target
    /// go there, and a GET to it returns the API's directory.
    pub fn new(name: impl Into<String>, root: Url, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            root,
            flavor: ApiFlavor::default(),
            defaults: RequestOptions::default(),
            authenticator: Arc::new(NoAuth),
            transport,
            directory: Arc::new(Directory::new()),
            state: RwLock::new(ResolutionState::Unresolved),
        }
    }

    pub fn with_flavor(mut self, flavor: ApiFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    pub fn with_defaults(mut self, defaults: RequestOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Share a directory cache (normally the registry's).
    pub fn with_directory(mut self, directory: Arc<Directory>) -> Self {
        if directory.contains(&self.name) {
            self.set_state(ResolutionState::Resolved);
        }
        self.directory = directory;
        self
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Url {
        &self.root
    }

    pub fn flavor(&self) -> ApiFlavor {
        self.flavor
    }

    pub fn defaults(&self) -> &RequestOptions {
        &self.defaults
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    pub fn resolution_state(&self) -> ResolutionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Base URL for `target` if the directory is already cached.
    pub fn resolved_url(&self, target: &str) -> Option<Url> {
        self.directory.lookup(&self.name, target)
    }

    fn set_state(&self, next: ResolutionState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            debug!(api = %self.name, from = ?*state, to = ?next, "resolution state");
            *state = next;
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Dispatch one call. Exactly one of `Ok` / `Err` is produced per call.
    pub async fn dispatch(&self, request: RequestEnvelope) -> Result<ResponseEnvelope, Error> {
        let RequestEnvelope {
            verb,
            options,
            data,
        } = request;
        let options = options.merged_over(&self.defaults);

        let base = self.resolve_base(&options).await?;
        let url = self.build_url(&base, options.path.as_deref())?;

        let mut transport_request = TransportRequest::new(verb, url).with_data(data);
        transport_request.headers = options.headers;
        transport_request.timeout = options.timeout;

        self.authenticator
            .authenticate(
                AuthContext {
                    api: &self.name,
                    transport: self.transport.as_ref(),
                },
                &mut transport_request,
            )
            .await?;

        info!(
            api = %self.name,
            "Executing HTTP {} request @ {}",
            transport_request.verb,
            transport_request.url
        );
        let response = self.transport.execute(transport_request).await?;
        normalize(verb, response)
    }

    /// Resolve the base URL for a call.
    ///
    /// Explicit URLs win; calls without a target use the API root; named
    /// targets go through the directory, fetching it first if needed.
    async fn resolve_base(&self, options: &RequestOptions) -> Result<Url, Error> {
        if let Some(url) = &options.url {
            return Ok(url.clone());
        }
        let Some(target) = options.target.as_deref() else {
            return Ok(self.root.clone());
        };

        let entries = self.resolve_directory().await?;
        self.lookup(&entries, target)
    }

    /// The API's directory, fetched on first use and cached afterwards.
    ///
    /// Concurrent callers share one fetch. A failed fetch leaves the client
    /// unresolved so the next call retries.
    pub async fn resolve_directory(&self) -> Result<Arc<DirectoryEntries>, Error> {
        if let Some(entries) = self.directory.get(&self.name) {
            self.set_state(ResolutionState::Resolved);
            return Ok(entries);
        }

        let lock = self.directory.resolution_lock(&self.name);
        let _guard = lock.lock().await;

        // Another caller may have resolved while we waited.
        if let Some(entries) = self.directory.get(&self.name) {
            self.set_state(ResolutionState::Resolved);
            return Ok(entries);
        }

        self.set_state(ResolutionState::Resolving);
        match self.fetch_directory().await {
            Ok(entries) => {
                let entries = self.directory.insert(&self.name, entries);
                self.set_state(ResolutionState::Resolved);
                Ok(entries)
            }
            Err(err) => {
                self.set_state(ResolutionState::Unresolved);
                warn!(api = %self.name, error = %err, "directory fetch failed");
                Err(Error::DirectoryFetch {
                    api: self.name.clone(),
                    source: Box::new(err),
                })
            }
        }
    }

    async fn fetch_directory(&self) -> Result<DirectoryEntries, Error> {
        info!(api = %self.name, url = %self.root, "Fetching api info");
        let request = TransportRequest::new(Verb::Get, self.root.clone());
        let response = self.transport.execute(request).await?;
        // A plain-text 2xx body is not a directory; keep it out of the cache.
        if response.is_success() {
            if let Value::String(text) = &response.data {
                return Err(Error::Deserialization {
                    message: "directory payload is not JSON".into(),
                    body: text.clone(),
                });
            }
        }
        let response = normalize(Verb::Get, response)?;
        directory::parse_entries(&self.root, &response.data).map_err(|message| {
            Error::Deserialization {
                message,
                body: response.data.to_string(),
            }
        })
    }

    fn lookup(&self, entries: &DirectoryEntries, target: &str) -> Result<Url, Error> {
        directory::lookup_in(entries, target).ok_or_else(|| Error::NoBaseUrl {
            api: self.name.clone(),
            target: target.to_owned(),
        })
    }

    /// Append the optional sub-path according to the API flavor.
    fn build_url(&self, base: &Url, path: Option<&str>) -> Result<Url, Error> {
        let base_str = base.as_str().trim_end_matches('/');
        let mut full = match path.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
            Some(path) => format!("{base_str}/{path}"),
            None if self.flavor == ApiFlavor::StaticJson => base_str.to_owned(),
            None => return Ok(base.clone()),
        };
        if self.flavor == ApiFlavor::StaticJson && !full.ends_with(".json") {
            full.push_str(".json");
        }
        Ok(Url::parse(&full)?)
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("name", &self.name)
            .field("root", &self.root.as_str())
            .field("flavor", &self.flavor)
            .field("state", &self.resolution_state())
            .finish_non_exhaustive()
    }
}

// ── Outcome normalization ────────────────────────────────────────────

/// Route a raw transport response to the success or failure side.
///
/// - non-2xx: failure, string bodies coerced to `{error: true, message}`
/// - 2xx with a truthy `error` flag: failure
/// - 2xx with no body (other than HEAD / 204): failure
/// - 2xx plain-text body: success, wrapped as `{message}`
pub(crate) fn normalize(verb: Verb, mut response: ResponseEnvelope) -> Result<ResponseEnvelope, Error> {
    if !response.is_success() {
        if let Value::String(text) = &response.data {
            let text = text.clone();
            response.data = json!({"error": true, "message": text});
        }
        let message = response.message().map_or_else(
            || format!("request failed with status {}", response.status),
            str::to_owned,
        );
        return Err(Error::Status {
            status: response.status,
            message,
            response: Box::new(response),
        });
    }

    if let Value::String(text) = &response.data {
        let text = text.clone();
        response.data = json!({"message": text});
        return Ok(response);
    }

    if response.data.is_null() {
        if verb == Verb::Head || response.status == 204 {
            return Ok(response);
        }
        return Err(Error::Application {
            message: "empty response".into(),
            response: Box::new(response),
        });
    }

    if response.data.get("error").is_some_and(is_truthy) {
        let message = response.message().unwrap_or("error flag set").to_owned();
        return Err(Error::Application {
            message,
            response: Box::new(response),
        });
    }
    Ok(response)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::transport::HttpTransport;
    use reqwest::header::HeaderMap;

    fn envelope(data: Value, status: u16) -> ResponseEnvelope {
        ResponseEnvelope::new(data, status, HeaderMap::new())
    }

    fn client(flavor: ApiFlavor) -> ApiClient {
        ApiClient::new(
            "static",
            Url::parse("http://api.test/data").unwrap(),
            Arc::new(HttpTransport::default()),
        )
        .with_flavor(flavor)
    }

    #[test]
    fn non_success_string_body_is_coerced() {
        let err = normalize(Verb::Get, envelope(json!("Forbidden"), 403)).unwrap_err();
        let response = err.response().unwrap();
        assert_eq!(response.data, json!({"error": true, "message": "Forbidden"}));
        assert!(matches!(err, Error::Status { status: 403, .. }));
    }

    #[test]
    fn error_flag_on_success_routes_to_failure() {
        let err = normalize(
            Verb::Get,
            envelope(json!({"error": true, "message": "bad filter"}), 200),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Application { ref message, .. } if message == "bad filter"));
    }

    #[test]
    fn plain_success_passes_through() {
        let ok = normalize(Verb::Get, envelope(json!({"result": [1]}), 200)).unwrap();
        assert_eq!(ok.data, json!({"result": [1]}));

        let text = normalize(Verb::Post, envelope(json!("created"), 201)).unwrap();
        assert_eq!(text.data, json!({"message": "created"}));
    }

    #[test]
    fn empty_body_fails_except_head_and_no_content() {
        assert!(normalize(Verb::Get, envelope(Value::Null, 200)).is_err());
        assert!(normalize(Verb::Head, envelope(Value::Null, 200)).is_ok());
        assert!(normalize(Verb::Delete, envelope(Value::Null, 204)).is_ok());
    }

    #[test]
    fn rest_urls_join_sub_paths() {
        let c = client(ApiFlavor::Rest);
        let base = Url::parse("http://api.test/users/").unwrap();
        assert_eq!(
            c.build_url(&base, Some("/42/")).unwrap().as_str(),
            "http://api.test/users/42"
        );
        assert_eq!(c.build_url(&base, None).unwrap(), base);
    }

    #[test]
    fn static_json_urls_get_json_suffix() {
        let c = client(ApiFlavor::StaticJson);
        let base = Url::parse("http://api.test/data").unwrap();
        assert_eq!(
            c.build_url(&base, Some("pages/home")).unwrap().as_str(),
            "http://api.test/data/pages/home.json"
        );
        assert_eq!(
            c.build_url(&base, Some("sitemap.json")).unwrap().as_str(),
            "http://api.test/data/sitemap.json"
        );
        assert_eq!(
            c.build_url(&base, None).unwrap().as_str(),
            "http://api.test/data.json"
        );
    }
}
