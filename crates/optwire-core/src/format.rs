// Display-text templates.

use std::sync::LazyLock;

use optwire_api::scalar_to_string;
use regex::{Captures, Regex};
use serde_json::Value;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern should compile"));

/// Substitute `{field}` placeholders with values from `record`.
///
/// Unknown fields render as the empty string.
pub fn format_string(template: &str, record: &Value) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            record.get(&caps[1]).map(scalar_to_string).unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_known_fields() {
        let record = json!({"first": "Ann", "last": "Lee", "age": 31});
        assert_eq!(format_string("{first} {last} ({age})", &record), "Ann Lee (31)");
    }

    #[test]
    fn unknown_fields_render_empty() {
        let record = json!({"first": "Ann"});
        assert_eq!(format_string("{first}/{missing}", &record), "Ann/");
        assert_eq!(format_string("no placeholders", &record), "no placeholders");
    }
}
