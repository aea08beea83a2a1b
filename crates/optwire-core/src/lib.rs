// optwire-core: paging, search and scroll-intent state machines for
// remote-backed option fields, built on optwire-api.

pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod field;
pub mod format;
pub mod scroll;
pub mod selection;

// ── Primary re-exports ──────────────────────────────────────────────
pub use buffer::{OptionBuffer, OptionEntry, OptionSnapshot, OptionStream, SelectOption};
pub use config::{FieldConfig, NameSource, Placeholders};
pub use engine::{FetchKind, LoadFuture, LoadOutcome, OptionsEngine, PageConfig};
pub use error::CoreError;
pub use field::RemoteField;
pub use format::format_string;
pub use scroll::{ScrollConfig, ScrollIntent, ScrollIntentDetector, ScrollMetrics, should_fetch};
pub use selection::Selection;
