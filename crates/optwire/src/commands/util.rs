//! Shared helpers for command handlers.

use serde_json::{Map, Value};

use crate::error::CliError;

/// Parse one `KEY=VALUE` argument. Values that parse as JSON scalars
/// (numbers, booleans, null) keep their type; anything else is a string.
pub fn parse_param(raw: &str) -> Result<(String, Value), CliError> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(CliError::Validation {
            field: "param".into(),
            reason: format!("expected KEY=VALUE, got '{raw}'"),
        });
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(CliError::Validation {
            field: "param".into(),
            reason: format!("empty key in '{raw}'"),
        });
    }

    let value = match serde_json::from_str::<Value>(value) {
        Ok(v @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => v,
        _ => Value::String(value.to_owned()),
    };
    Ok((key.to_owned(), value))
}

/// Combine a JSON `--body` with `--param` pairs. Params override body keys.
/// Returns `None` when neither was given.
pub fn request_data(params: &[String], body: Option<&str>) -> Result<Option<Value>, CliError> {
    let mut data = match body {
        Some(raw) => match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => map,
            _ if !params.is_empty() => {
                return Err(CliError::Validation {
                    field: "body".into(),
                    reason: "must be a JSON object when combined with --param".into(),
                });
            }
            other => return Ok(Some(other)),
        },
        None if params.is_empty() => return Ok(None),
        None => Map::new(),
    };

    for raw in params {
        let (key, value) = parse_param(raw)?;
        data.insert(key, value);
    }
    Ok(Some(Value::Object(data)))
}
