// ── Core error types ──
//
// Errors surfaced by the paging engine and field lifecycle. Fetch failures
// never escape as panics: the engine degrades the option buffer and hands
// the error back in its outcome.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Paging ───────────────────────────────────────────────────────
    /// A `load_more` for this field is still unresolved.
    #[error("A page fetch is already in flight for field \"{field}\"")]
    FetchInFlight { field: String },

    /// Every record the server reported has been loaded.
    #[error("All options for field \"{field}\" are loaded")]
    Exhausted { field: String },

    /// The field was configured without the requested capability.
    #[error("Field \"{field}\" is not {capability}")]
    CapabilityDisabled {
        field: String,
        capability: &'static str,
    },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid attribute \"{name}\": {message}")]
    InvalidAttribute { name: String, message: String },

    // ── API errors ───────────────────────────────────────────────────
    #[error(transparent)]
    Api(#[from] optwire_api::Error),
}

impl CoreError {
    /// Whether this is a no-op rejection (guard or exhaustion) rather than
    /// a real failure.
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::FetchInFlight { .. } | Self::Exhausted { .. })
    }
}
