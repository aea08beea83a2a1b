// Bound value of a field: one id, or a set of ids for multi-value fields.

use serde::Serialize;

/// Id carried by the "please select" placeholder row.
pub const PLACEHOLDER_ID: &str = "";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Selection {
    Single(Option<String>),
    Multi(Vec<String>),
}

impl Selection {
    pub fn new(multiple: bool) -> Self {
        if multiple {
            Self::Multi(Vec::new())
        } else {
            Self::Single(None)
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, Self::Multi(_))
    }

    /// The single bound value, if any. Always `None` for multi-value fields.
    pub fn single(&self) -> Option<&str> {
        match self {
            Self::Single(value) => value.as_deref().filter(|v| *v != PLACEHOLDER_ID),
            Self::Multi(_) => None,
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(value) => value.as_deref().into_iter().collect(),
            Self::Multi(values) => values.iter().map(String::as_str).collect(),
        }
    }

    /// Select `id`. Returns whether the selection changed.
    ///
    /// On a multi-value field, selecting the placeholder removes it instead
    /// of adding it.
    pub fn select(&mut self, id: &str) -> bool {
        match self {
            Self::Single(value) => {
                let next = (id != PLACEHOLDER_ID).then(|| id.to_owned());
                let changed = *value != next;
                *value = next;
                changed
            }
            Self::Multi(values) => {
                if id == PLACEHOLDER_ID {
                    let before = values.len();
                    values.retain(|v| v != PLACEHOLDER_ID);
                    return values.len() != before;
                }
                if values.iter().any(|v| v == id) {
                    return false;
                }
                values.push(id.to_owned());
                true
            }
        }
    }

    /// Remove `id` from the selection.
    pub fn deselect(&mut self, id: &str) -> bool {
        match self {
            Self::Single(value) if value.as_deref() == Some(id) => {
                *value = None;
                true
            }
            Self::Single(_) => false,
            Self::Multi(values) => {
                let before = values.len();
                values.retain(|v| v != id);
                values.len() != before
            }
        }
    }

    /// Handle the placeholder row being picked on a multi-value field.
    ///
    /// Never adds anything; drops `value` if it is the placeholder id and
    /// somehow made it into the selection. Returns whether anything changed.
    pub fn deselect_placeholder(&mut self, value: &str) -> bool {
        if value != PLACEHOLDER_ID {
            return false;
        }
        match self {
            Self::Multi(values) => {
                let before = values.len();
                values.retain(|v| v != PLACEHOLDER_ID);
                values.len() != before
            }
            Self::Single(_) => false,
        }
    }
}
