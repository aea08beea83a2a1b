// ── Option buffer ──
//
// The ordered option list of one field plus its synthetic sentinels.
// Layout is always `[choices..., loading?, status?]`; sentinels are never
// selectable. Every mutation publishes a fresh snapshot through a `watch`
// channel that the view layer subscribes to.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use serde::Serialize;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// One selectable option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub id: String,
    pub name: String,
}

impl SelectOption {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One rendered row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptionEntry {
    Choice(SelectOption),
    Loading { text: String },
    Status { text: String },
}

impl OptionEntry {
    pub fn is_selectable(&self) -> bool {
        matches!(self, Self::Choice(_))
    }

    pub fn choice(&self) -> Option<&SelectOption> {
        match self {
            Self::Choice(option) => Some(option),
            _ => None,
        }
    }

    /// Text shown for this row.
    pub fn text(&self) -> &str {
        match self {
            Self::Choice(option) => &option.name,
            Self::Loading { text } | Self::Status { text } => text,
        }
    }
}

/// Immutable view of the buffer at one point in time.
pub type OptionSnapshot = Arc<Vec<OptionEntry>>;

/// Ordered choices plus at most one loading and one status sentinel.
#[derive(Debug)]
pub struct OptionBuffer {
    choices: Vec<SelectOption>,
    loading: Option<String>,
    status: Option<String>,
    tx: watch::Sender<OptionSnapshot>,
}

impl Default for OptionBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl OptionBuffer {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            choices: Vec::new(),
            loading: None,
            status: None,
            tx,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn choices(&self) -> &[SelectOption] {
        &self.choices
    }

    /// Number of selectable entries (sentinels excluded).
    pub fn choice_count(&self) -> usize {
        self.choices.len()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.choices.iter().any(|c| c.id == id)
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_some()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Build the rendered row list.
    pub fn entries(&self) -> Vec<OptionEntry> {
        let mut entries: Vec<OptionEntry> =
            self.choices.iter().cloned().map(OptionEntry::Choice).collect();
        if let Some(text) = &self.loading {
            entries.push(OptionEntry::Loading { text: text.clone() });
        }
        if let Some(text) = &self.status {
            entries.push(OptionEntry::Status { text: text.clone() });
        }
        entries
    }

    pub fn snapshot(&self) -> OptionSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> OptionStream {
        OptionStream::new(self.tx.subscribe())
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Replace everything with a single loading sentinel.
    pub fn show_loading(&mut self, text: &str) {
        self.choices.clear();
        self.loading = Some(text.to_owned());
        self.status = None;
        self.publish();
    }

    /// Replace the contents with `choices` and an optional status sentinel.
    pub fn replace(&mut self, choices: Vec<SelectOption>, status: Option<String>) {
        self.choices = choices;
        self.loading = None;
        self.status = status;
        self.publish();
    }

    /// Append choices after the existing ones.
    pub fn append(&mut self, choices: impl IntoIterator<Item = SelectOption>) {
        self.choices.extend(choices);
        self.publish();
    }

    /// Insert one choice at the tail of the choices (before sentinels),
    /// unless its id is already present. Returns whether it was inserted.
    pub fn splice_tail(&mut self, choice: SelectOption) -> bool {
        if self.contains_id(&choice.id) {
            return false;
        }
        self.choices.push(choice);
        self.publish();
        true
    }

    /// Add a trailing loading sentinel (continuation fetch).
    pub fn push_loading(&mut self, text: &str) {
        self.loading = Some(text.to_owned());
        self.publish();
    }

    pub fn clear_loading(&mut self) {
        if self.loading.take().is_some() {
            self.publish();
        }
    }

    pub fn set_status(&mut self, status: Option<String>) {
        self.status = status;
        self.publish();
    }

    /// Degrade after a failed fetch.
    ///
    /// With nothing loaded yet, the buffer becomes a single error row.
    /// Otherwise loaded choices stay and the status row shows the error.
    pub fn fail(&mut self, text: &str) {
        self.loading = None;
        self.status = Some(text.to_owned());
        self.publish();
    }

    fn publish(&self) {
        self.tx.send_replace(Arc::new(self.entries()));
    }
}

// ── Subscription ─────────────────────────────────────────────────────

/// A subscription to one field's option list.
///
/// Point-in-time access via `current`/`latest`, change notification via
/// `changed()` or by converting into a `Stream`.
pub struct OptionStream {
    current: OptionSnapshot,
    receiver: watch::Receiver<OptionSnapshot>,
}

impl OptionStream {
    pub(crate) fn new(receiver: watch::Receiver<OptionSnapshot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot captured at creation (or at the last `changed()`).
    pub fn current(&self) -> &OptionSnapshot {
        &self.current
    }

    /// Latest published snapshot.
    pub fn latest(&self) -> OptionSnapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once the buffer is gone.
    pub async fn changed(&mut self) -> Option<OptionSnapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    pub fn into_stream(self) -> OptionWatchStream {
        OptionWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding each published snapshot.
pub struct OptionWatchStream {
    inner: WatchStream<OptionSnapshot>,
}

impl Stream for OptionWatchStream {
    type Item = OptionSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
