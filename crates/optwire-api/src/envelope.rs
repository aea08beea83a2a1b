// Request and response envelopes.
//
// A `RequestEnvelope` is built per call and never mutated after dispatch.
// The dispatcher lowers it into a `TransportRequest` once the base URL is
// known; the transport answers with a `ResponseEnvelope` that both the
// success and the failure continuation receive.

use std::time::Duration;

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// Query parameters or body data, as a flat JSON object.
pub type Params = Map<String, Value>;

// ── Verb ─────────────────────────────────────────────────────────────

/// HTTP verb of a dispatched call.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Verb {
    Get,
    Head,
    Delete,
    Post,
    Put,
    Patch,
}

impl Verb {
    /// Whether call data travels as a JSON body (write verbs) rather than
    /// as query parameters (read verbs).
    pub fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }

    pub(crate) fn method(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Head => reqwest::Method::HEAD,
            Self::Delete => reqwest::Method::DELETE,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
        }
    }
}

// ── Per-call options ─────────────────────────────────────────────────

/// Options a caller can set per call or as client-wide defaults.
///
/// Merging follows "overrides win": a `Some` field in the override
/// replaces the default, header bags are unioned with override values
/// taking precedence.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Explicit URL. Skips directory resolution entirely.
    pub url: Option<Url>,
    /// Logical name to look up in the API's directory.
    pub target: Option<String>,
    /// Sub-path appended to the resolved base URL.
    pub path: Option<String>,
    /// Extra headers for this call.
    pub headers: HeaderMap,
    /// Per-call timeout, overriding the transport default.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn target(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Merge `self` (the overrides) over `base` (the defaults).
    pub fn merged_over(&self, base: &Self) -> Self {
        let mut headers = base.headers.clone();
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }
        Self {
            url: self.url.clone().or_else(|| base.url.clone()),
            target: self.target.clone().or_else(|| base.target.clone()),
            path: self.path.clone().or_else(|| base.path.clone()),
            headers,
            timeout: self.timeout.or(base.timeout),
        }
    }
}

/// One dispatched call: verb, options, and query or body data.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub verb: Verb,
    pub options: RequestOptions,
    pub data: Option<Value>,
}

impl RequestEnvelope {
    pub fn new(verb: Verb, options: RequestOptions, data: Option<Value>) -> Self {
        Self {
            verb,
            options,
            data,
        }
    }
}

// ── Transport request ────────────────────────────────────────────────

/// A fully resolved request handed to the [`Transport`](crate::Transport).
///
/// Authentication hooks receive a mutable reference to this before it is
/// sent, so they can attach headers.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub verb: Verb,
    pub url: Url,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: HeaderMap,
    pub timeout: Option<Duration>,
}

impl TransportRequest {
    pub fn new(verb: Verb, url: Url) -> Self {
        Self {
            verb,
            url,
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
            timeout: None,
        }
    }

    /// Attach call data as query parameters or JSON body depending on the verb.
    pub fn with_data(mut self, data: Option<Value>) -> Self {
        match data {
            None | Some(Value::Null) => {}
            Some(value) if self.verb.carries_body() => self.body = Some(value),
            Some(Value::Object(params)) => self.query = query_pairs(&params),
            Some(other) => self.query = vec![("q".into(), scalar_to_string(&other))],
        }
        self
    }
}

// ── Response envelope ────────────────────────────────────────────────

/// `{data, status, headers}`, the shape both continuations receive.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub data: Value,
    pub status: u16,
    pub headers: HeaderMap,
}

impl ResponseEnvelope {
    pub fn new(data: Value, status: u16, headers: HeaderMap) -> Self {
        Self {
            data,
            status,
            headers,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The `message` field of the body, if present.
    pub fn message(&self) -> Option<&str> {
        self.data.get("message").and_then(Value::as_str)
    }

    /// Deserialize the body into a typed value.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, crate::Error> {
        serde_json::from_value(self.data.clone()).map_err(|e| crate::Error::Deserialization {
            message: e.to_string(),
            body: self.data.to_string(),
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Encode a params bag as query pairs.
///
/// Strings go verbatim, numbers and booleans via display, arrays become
/// repeated keys, nulls are skipped, nested objects are JSON-encoded.
pub fn query_pairs(params: &Params) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len());
    for (key, value) in params {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                pairs.extend(
                    items
                        .iter()
                        .filter(|item| !item.is_null())
                        .map(|item| (key.clone(), scalar_to_string(item))),
                );
            }
            other => pairs.push((key.clone(), scalar_to_string(other))),
        }
    }
    pairs
}

/// Render a JSON value the way it should appear in a query string or
/// as option text.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Loose truthiness used for the application-level `error` flag.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    #[test]
    fn query_pairs_flattens_arrays_and_skips_nulls() {
        let params = json!({
            "limit": 25,
            "offset": 0,
            "tag": ["a", "b"],
            "deleted": null,
            "active": true,
            "name": "ann"
        });
        let Value::Object(params) = params else {
            unreachable!()
        };
        let mut pairs = query_pairs(&params);
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("active".to_string(), "true".to_string()),
                ("limit".to_string(), "25".to_string()),
                ("name".to_string(), "ann".to_string()),
                ("offset".to_string(), "0".to_string()),
                ("tag".to_string(), "a".to_string()),
                ("tag".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn write_verbs_carry_body_read_verbs_carry_query() {
        let url = Url::parse("http://api.test/users").unwrap();
        let get = TransportRequest::new(Verb::Get, url.clone()).with_data(Some(json!({"limit": 5})));
        assert_eq!(get.query, vec![("limit".to_string(), "5".to_string())]);
        assert!(get.body.is_none());

        let post = TransportRequest::new(Verb::Post, url).with_data(Some(json!({"name": "x"})));
        assert!(post.query.is_empty());
        assert_eq!(post.body, Some(json!({"name": "x"})));
    }

    #[test]
    fn overrides_take_precedence_over_defaults() {
        let mut defaults = RequestOptions::target("users_url").with_path("list");
        defaults
            .headers
            .insert("x-client", HeaderValue::from_static("default"));
        defaults
            .headers
            .insert("x-keep", HeaderValue::from_static("kept"));

        let mut overrides = RequestOptions::default().with_path("search");
        overrides
            .headers
            .insert("x-client", HeaderValue::from_static("override"));

        let merged = overrides.merged_over(&defaults);
        assert_eq!(merged.target.as_deref(), Some("users_url"));
        assert_eq!(merged.path.as_deref(), Some("search"));
        assert_eq!(merged.headers["x-client"], "override");
        assert_eq!(merged.headers["x-keep"], "kept");
    }

    #[test]
    fn verb_parses_case_insensitively() {
        assert_eq!("get".parse::<Verb>().unwrap(), Verb::Get);
        assert_eq!("PATCH".parse::<Verb>().unwrap(), Verb::Patch);
        assert_eq!(Verb::Delete.to_string(), "DELETE");
    }

    #[test]
    fn truthiness_matches_loose_semantics() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!("yes")));
        assert!(is_truthy(&json!(1)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&Value::Null));
    }
}
