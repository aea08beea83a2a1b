// ── Remote field configuration ──
//
// A `FieldConfig` is extracted once when a field binds, either from a
// config file or from the view's attributes. The paging engine never looks
// at raw attributes after that.

use std::collections::HashMap;

use optwire_api::{Params, RequestOptions, scalar_to_string};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::format::format_string;

pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Where an option's display text comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "source")]
pub enum NameSource {
    /// Read one field of the record.
    #[serde(rename = "field")]
    Field(String),
    /// Substitute `{field}` placeholders of a template.
    #[serde(rename = "formatString")]
    FormatString(String),
}

impl Default for NameSource {
    fn default() -> Self {
        Self::Field("id".into())
    }
}

impl NameSource {
    pub fn display_text(&self, record: &Value) -> String {
        match self {
            Self::Field(field) => record.get(field).map(scalar_to_string).unwrap_or_default(),
            Self::FormatString(template) => format_string(template, record),
        }
    }
}

/// Texts of the synthetic sentinel entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Placeholders {
    pub loading: String,
    pub select: String,
    pub not_found: String,
    pub error: String,
}

impl Default for Placeholders {
    fn default() -> Self {
        Self {
            loading: "Loading...".into(),
            select: "Please select...".into(),
            not_found: "Cannot find value".into(),
            error: "(error loading options)".into(),
        }
    }
}

/// Typed configuration of one remote-backed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Registry name of the API serving the options.
    pub api: String,
    /// Directory entry to resolve; `None` uses the API root.
    pub target: Option<String>,
    /// Sub-path below the resolved base URL.
    pub path: Option<String>,
    /// Record field holding the option id, also the search filter key.
    pub lookup_key: String,
    pub name_source: NameSource,
    /// Fixed query parameters sent with every fetch.
    pub params: Params,
    pub page_size: u32,
    pub offset: u32,
    pub multiple: bool,
    pub searchable: bool,
    pub infinite: bool,
    /// Filter key used by multi-value fields when searching.
    pub multi_search_key: String,
    /// Payload key of the record list.
    pub result_key: String,
    /// Payload key of the server-reported total.
    pub total_key: String,
    /// Show a loading sentinel while a continuation page is fetched.
    pub show_loading_more: bool,
    pub placeholders: Placeholders,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            api: String::new(),
            target: None,
            path: None,
            lookup_key: "id".into(),
            name_source: NameSource::default(),
            params: Params::new(),
            page_size: DEFAULT_PAGE_SIZE,
            offset: 0,
            multiple: false,
            searchable: true,
            infinite: true,
            multi_search_key: "name".into(),
            result_key: "result".into(),
            total_key: "total".into(),
            show_loading_more: true,
            placeholders: Placeholders::default(),
        }
    }
}

/// Shape of the `remote-options` attribute.
#[derive(Deserialize)]
struct RemoteOptions {
    api: String,
    name: Option<String>,
    path: Option<String>,
}

impl FieldConfig {
    pub fn new(api: impl Into<String>) -> Self {
        Self {
            api: api.into(),
            ..Self::default()
        }
    }

    /// Parse view attributes.
    ///
    /// Understood names: `remote-options` (JSON `{api, name, path}`),
    /// `remote-options-id`, `remote-options-value` (JSON name source),
    /// `remote-options-params` (JSON object), `multiple`, `page-size`,
    /// `offset`. Unknown attributes are ignored.
    pub fn from_attributes<'a, I>(attrs: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let attrs: HashMap<&str, &str> = attrs.into_iter().collect();

        let raw = attrs
            .get("remote-options")
            .ok_or_else(|| invalid("remote-options", "attribute is required"))?;
        let remote: RemoteOptions =
            serde_json::from_str(raw).map_err(|e| invalid("remote-options", e))?;

        let mut config = Self::new(remote.api);
        config.target = remote.name;
        config.path = remote.path;

        if let Some(id) = attrs.get("remote-options-id") {
            config.lookup_key = (*id).to_owned();
        }
        if let Some(raw) = attrs.get("remote-options-value") {
            config.name_source =
                serde_json::from_str(raw).map_err(|e| invalid("remote-options-value", e))?;
        }
        if let Some(raw) = attrs.get("remote-options-params") {
            config.params =
                serde_json::from_str(raw).map_err(|e| invalid("remote-options-params", e))?;
        }
        if let Some(raw) = attrs.get("multiple") {
            config.multiple = !matches!(raw.trim(), "false" | "0");
        }
        if let Some(raw) = attrs.get("page-size") {
            config.page_size = raw.trim().parse().map_err(|e| invalid("page-size", e))?;
        }
        if let Some(raw) = attrs.get("offset") {
            config.offset = raw.trim().parse().map_err(|e| invalid("offset", e))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot page with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.api.trim().is_empty() {
            return Err(invalid("api", "must name a registered API"));
        }
        if self.page_size == 0 {
            return Err(invalid("page-size", "must be greater than zero"));
        }
        if self.lookup_key.is_empty() {
            return Err(invalid("remote-options-id", "must not be empty"));
        }
        Ok(())
    }

    /// Per-call options pointing the dispatcher at this field's endpoint.
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            target: self.target.clone(),
            path: self.path.clone(),
            ..RequestOptions::default()
        }
    }

    /// Query key a search term is sent under.
    pub fn search_key(&self, is_multi: bool) -> &str {
        if is_multi {
            &self.multi_search_key
        } else {
            &self.lookup_key
        }
    }
}

fn invalid(name: &str, message: impl ToString) -> CoreError {
    CoreError::InvalidAttribute {
        name: name.to_owned(),
        message: message.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn attributes_build_a_typed_config() {
        let config = FieldConfig::from_attributes([
            (
                "remote-options",
                r#"{"api": "main", "name": "users_url", "path": "active"}"#,
            ),
            ("remote-options-id", "uuid"),
            (
                "remote-options-value",
                r#"{"type": "formatString", "source": "{first} {last}"}"#,
            ),
            ("remote-options-params", r#"{"role": "admin"}"#),
            ("multiple", ""),
            ("page-size", "10"),
            ("class", "ignored"),
        ])
        .unwrap();

        assert_eq!(config.api, "main");
        assert_eq!(config.target.as_deref(), Some("users_url"));
        assert_eq!(config.path.as_deref(), Some("active"));
        assert_eq!(config.lookup_key, "uuid");
        assert_eq!(
            config.name_source,
            NameSource::FormatString("{first} {last}".into())
        );
        assert_eq!(config.params["role"], "admin");
        assert!(config.multiple);
        assert_eq!(config.page_size, 10);
        assert_eq!(config.offset, 0);
    }

    #[test]
    fn defaults_match_the_common_case() {
        let config =
            FieldConfig::from_attributes([("remote-options", r#"{"api": "main"}"#)]).unwrap();
        assert_eq!(config.lookup_key, "id");
        assert_eq!(config.name_source, NameSource::Field("id".into()));
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert!(config.searchable && config.infinite && !config.multiple);
        assert_eq!(config.placeholders.loading, "Loading...");
    }

    #[test]
    fn bad_attributes_are_rejected() {
        let missing = FieldConfig::from_attributes([("multiple", "")]);
        assert!(matches!(missing, Err(CoreError::InvalidAttribute { ref name, .. }) if name == "remote-options"));

        let bad_json = FieldConfig::from_attributes([
            ("remote-options", r#"{"api": "main"}"#),
            ("remote-options-params", "{not json"),
        ]);
        assert!(bad_json.is_err());

        let zero_page = FieldConfig::from_attributes([
            ("remote-options", r#"{"api": "main"}"#),
            ("page-size", "0"),
        ]);
        assert!(zero_page.is_err());
    }

    #[test]
    fn name_sources_derive_display_text() {
        let record = json!({"id": 7, "name": "Ann", "email": "ann@example.com"});
        assert_eq!(NameSource::Field("name".into()).display_text(&record), "Ann");
        assert_eq!(NameSource::Field("missing".into()).display_text(&record), "");
        assert_eq!(
            NameSource::FormatString("{name} <{email}>".into()).display_text(&record),
            "Ann <ann@example.com>"
        );
    }

    #[test]
    fn deserializes_with_partial_keys() {
        let config: FieldConfig = serde_json::from_value(json!({
            "api": "main",
            "name_source": {"type": "field", "source": "name"},
            "page_size": 50
        }))
        .unwrap();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.result_key, "result");
        assert_eq!(config.search_key(false), "id");
        assert_eq!(config.search_key(true), "name");
    }
}
