// ── Paging / search engine ──
//
// One engine per bound field. It owns the field's page cursor, option
// buffer and bound value. Every operation claims state at call time
// (generation bump, in-flight guard, loading sentinel) and returns a
// future that performs the fetch and applies the result. A result whose
// generation is no longer current is dropped without touching the buffer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use optwire_api::{ApiHandle, Error as ApiError, Params, ResponseEnvelope, scalar_to_string};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::buffer::{OptionBuffer, OptionSnapshot, OptionStream, SelectOption};
use crate::config::FieldConfig;
use crate::error::CoreError;
use crate::selection::Selection;

/// Future returned by every engine operation.
pub type LoadFuture = BoxFuture<'static, Result<LoadOutcome, CoreError>>;

/// Paging, filter and concurrency state of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageConfig {
    /// Bumped on every reset; results from older generations are discarded.
    pub generation: u64,
    /// Offset of the last successfully loaded page.
    pub offset: u32,
    /// Server-reported record count.
    pub running_total: Option<u64>,
    /// Reconciled value that continuation pages must not add again.
    pub excluded_value: Option<String>,
    /// Active search filter as `(query key, term)`.
    pub filter: Option<(String, String)>,
    pub in_flight: bool,
    pub exhausted: bool,
}

/// Which operation issued a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FetchKind {
    Initial,
    Search,
    More,
}

/// How a fetch ended. Fetch failures are reported here, not as `Err`:
/// the buffer has already been degraded to show them.
#[derive(Debug)]
pub enum LoadOutcome {
    Applied {
        kind: FetchKind,
        generation: u64,
        /// Choices added to the buffer.
        added: usize,
        total: Option<u64>,
        exhausted: bool,
        /// Whether an out-of-page bound value was spliced in.
        reconciled: bool,
    },
    /// A newer reset superseded this fetch.
    Discarded { kind: FetchKind, generation: u64 },
    Failed {
        kind: FetchKind,
        generation: u64,
        error: ApiError,
    },
}

impl LoadOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self, Self::Discarded { .. })
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

// ── Engine ───────────────────────────────────────────────────────────

/// Paging and search state machine for one remote-backed field.
///
/// Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct OptionsEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    field: String,
    config: FieldConfig,
    api: ApiHandle,
    state: Mutex<EngineState>,
}

struct EngineState {
    page: PageConfig,
    buffer: OptionBuffer,
    selection: Selection,
}

/// A claimed fetch: what to send and where the cursor goes on success.
struct Fetch {
    kind: FetchKind,
    generation: u64,
    params: Value,
    offset: u32,
}

/// Parsed server page.
struct Page {
    options: Vec<SelectOption>,
    records: usize,
    total: Option<u64>,
}

impl OptionsEngine {
    pub fn new(field: impl Into<String>, config: FieldConfig, api: ApiHandle) -> Self {
        let page = PageConfig {
            generation: 0,
            offset: config.offset,
            running_total: None,
            excluded_value: None,
            filter: None,
            in_flight: false,
            exhausted: false,
        };
        let selection = Selection::new(config.multiple);
        Self {
            inner: Arc::new(EngineInner {
                field: field.into(),
                config,
                api,
                state: Mutex::new(EngineState {
                    page,
                    buffer: OptionBuffer::new(),
                    selection,
                }),
            }),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn field(&self) -> &str {
        &self.inner.field
    }

    pub fn config(&self) -> &FieldConfig {
        &self.inner.config
    }

    pub fn page(&self) -> PageConfig {
        self.inner.lock().page.clone()
    }

    pub fn snapshot(&self) -> OptionSnapshot {
        self.inner.lock().buffer.snapshot()
    }

    pub fn choices(&self) -> Vec<SelectOption> {
        self.inner.lock().buffer.choices().to_vec()
    }

    pub fn subscribe(&self) -> OptionStream {
        self.inner.lock().buffer.subscribe()
    }

    // ── Bound value ──────────────────────────────────────────────────

    pub fn selection(&self) -> Selection {
        self.inner.lock().selection.clone()
    }

    /// Set the bound value of a single-value field (ignored on multi-value
    /// fields; use [`select`](Self::select) there).
    pub fn set_value(&self, value: Option<&str>) {
        let mut state = self.inner.lock();
        if let Selection::Single(current) = &mut state.selection {
            *current = value.map(str::to_owned);
        }
    }

    pub fn select(&self, id: &str) -> bool {
        self.inner.lock().selection.select(id)
    }

    pub fn deselect(&self, id: &str) -> bool {
        self.inner.lock().selection.deselect(id)
    }

    /// The placeholder row was picked on a multi-value field: a removal,
    /// never an addition.
    pub fn on_multi_value_deselect_placeholder(&self, value: &str) -> bool {
        self.inner.lock().selection.deselect_placeholder(value)
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Reset to the first page with no filter and fetch it.
    ///
    /// If the bound value is not on that page, it is fetched separately and
    /// spliced in.
    pub fn initial_load(&self) -> LoadFuture {
        let fetch = self.begin_reset(FetchKind::Initial, None);
        self.run(fetch)
    }

    /// Same as [`initial_load`](Self::initial_load).
    pub fn reset_to_first_page(&self) -> LoadFuture {
        self.initial_load()
    }

    /// Replace the buffer with the first page matching `term`.
    ///
    /// An empty term behaves exactly like `initial_load`. Multi-value
    /// fields filter on `multi_search_key`, others on `lookup_key`.
    pub fn search(&self, term: &str, is_multi: bool) -> LoadFuture {
        if term.is_empty() {
            return self.initial_load();
        }
        if !self.inner.config.searchable {
            return rejected(CoreError::CapabilityDisabled {
                field: self.inner.field.clone(),
                capability: "searchable",
            });
        }
        let key = self.inner.config.search_key(is_multi).to_owned();
        let fetch = self.begin_reset(FetchKind::Search, Some((key, term.to_owned())));
        self.run(fetch)
    }

    /// Fetch the next page and append it.
    ///
    /// Rejects immediately, leaving everything untouched, while another
    /// fetch for this field is in flight or once every record is loaded.
    pub fn load_more(&self) -> LoadFuture {
        let config = &self.inner.config;
        if !config.infinite {
            return rejected(CoreError::CapabilityDisabled {
                field: self.inner.field.clone(),
                capability: "infinite",
            });
        }

        let fetch = {
            let mut guard = self.inner.lock();
            let state = &mut *guard;
            if state.page.in_flight {
                debug!(field = %self.inner.field, "load more ignored: fetch in flight");
                return rejected(CoreError::FetchInFlight {
                    field: self.inner.field.clone(),
                });
            }
            if state.page.exhausted
                || reached(state.buffer.choice_count(), state.page.running_total)
            {
                state.page.exhausted = true;
                return rejected(CoreError::Exhausted {
                    field: self.inner.field.clone(),
                });
            }

            state.page.in_flight = true;
            let offset = state.page.offset.saturating_add(config.page_size);
            if config.show_loading_more {
                state.buffer.push_loading(&config.placeholders.loading);
            }
            debug!(
                field = %self.inner.field,
                generation = state.page.generation,
                offset,
                "loading next page"
            );
            Fetch {
                kind: FetchKind::More,
                generation: state.page.generation,
                params: self.inner.params(offset, state.page.filter.as_ref()),
                offset,
            }
        };
        self.run(fetch)
    }

    /// Invalidate every pending fetch. Their results will be discarded.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        state.page.generation += 1;
        state.page.in_flight = false;
        debug!(field = %self.inner.field, generation = state.page.generation, "engine closed");
    }

    // ── Internals ────────────────────────────────────────────────────

    fn begin_reset(&self, kind: FetchKind, filter: Option<(String, String)>) -> Fetch {
        let config = &self.inner.config;
        let mut guard = self.inner.lock();
        let state = &mut *guard;

        let page = &mut state.page;
        page.generation += 1;
        page.offset = config.offset;
        page.filter = filter;
        page.running_total = None;
        page.excluded_value = None;
        page.exhausted = false;
        page.in_flight = true;

        state.buffer.show_loading(&config.placeholders.loading);
        debug!(
            field = %self.inner.field,
            %kind,
            generation = page.generation,
            offset = page.offset,
            "page reset"
        );

        Fetch {
            kind,
            generation: page.generation,
            params: self.inner.params(page.offset, page.filter.as_ref()),
            offset: page.offset,
        }
    }

    fn run(&self, fetch: Fetch) -> LoadFuture {
        let inner = Arc::clone(&self.inner);
        let claim = PageClaim {
            inner: Arc::clone(&inner),
            generation: fetch.generation,
        };
        let call = inner
            .api
            .get(inner.config.request_options(), Some(fetch.params.clone()));

        async move {
            let result = call.await;
            let mut outcome = inner.apply(&fetch, result);

            if fetch.kind == FetchKind::Initial && outcome.is_applied() {
                if let Some(value) = inner.reconcile_target(fetch.generation) {
                    let spliced = inner.reconcile(fetch.generation, value).await;
                    if let LoadOutcome::Applied { reconciled, .. } = &mut outcome {
                        *reconciled = spliced;
                    }
                }
            }

            drop(claim);
            Ok(outcome)
        }
        .boxed()
    }
}

impl std::fmt::Debug for OptionsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionsEngine")
            .field("field", &self.inner.field)
            .field("page", &self.page())
            .finish_non_exhaustive()
    }
}

impl EngineInner {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Query for one page: fixed params, active filter, limit and offset.
    fn params(&self, offset: u32, filter: Option<&(String, String)>) -> Value {
        let mut params = self.config.params.clone();
        if let Some((key, term)) = filter {
            params.insert(key.clone(), Value::String(term.clone()));
        }
        params.insert("limit".into(), json!(self.config.page_size));
        params.insert("offset".into(), json!(offset));
        Value::Object(params)
    }

    fn status_text(&self, kind: FetchKind, empty: bool) -> Option<String> {
        let placeholders = &self.config.placeholders;
        if self.config.multiple {
            None
        } else if kind == FetchKind::Search && empty {
            Some(placeholders.not_found.clone())
        } else {
            Some(placeholders.select.clone())
        }
    }

    fn option_from(&self, record: &Value) -> SelectOption {
        let id = record
            .get(&self.config.lookup_key)
            .map(scalar_to_string)
            .unwrap_or_default();
        SelectOption::new(id, self.config.name_source.display_text(record))
    }

    fn parse_page(&self, response: &ResponseEnvelope) -> Result<Page, ApiError> {
        let data = &response.data;
        let records = data
            .get(&self.config.result_key)
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::Deserialization {
                message: format!("payload has no \"{}\" list", self.config.result_key),
                body: data.to_string(),
            })?;
        let total = data
            .get(&self.config.total_key)
            .and_then(|v| v.as_u64().or_else(|| v.as_str()?.parse().ok()));

        Ok(Page {
            options: records.iter().map(|r| self.option_from(r)).collect(),
            records: records.len(),
            total,
        })
    }

    /// Apply a finished fetch to the buffer, unless it went stale.
    fn apply(&self, fetch: &Fetch, result: Result<ResponseEnvelope, ApiError>) -> LoadOutcome {
        let page = result.and_then(|response| self.parse_page(&response));

        let mut guard = self.lock();
        let state = &mut *guard;
        if state.page.generation != fetch.generation {
            debug!(
                field = %self.field,
                kind = %fetch.kind,
                stale = fetch.generation,
                current = state.page.generation,
                "discarding stale page"
            );
            return LoadOutcome::Discarded {
                kind: fetch.kind,
                generation: fetch.generation,
            };
        }

        let page = match page {
            Ok(page) => page,
            Err(error) => {
                warn!(field = %self.field, kind = %fetch.kind, error = %error, "option fetch failed");
                state.buffer.fail(&self.config.placeholders.error);
                return LoadOutcome::Failed {
                    kind: fetch.kind,
                    generation: fetch.generation,
                    error,
                };
            }
        };

        let added = match fetch.kind {
            FetchKind::Initial | FetchKind::Search => {
                let added = page.options.len();
                let status = self.status_text(fetch.kind, page.records == 0);
                state.buffer.replace(page.options, status);
                state.page.running_total = page.total;
                added
            }
            FetchKind::More => {
                let excluded = state.page.excluded_value.clone();
                let fresh: Vec<SelectOption> = page
                    .options
                    .into_iter()
                    .filter(|o| excluded.as_deref() != Some(o.id.as_str()))
                    .collect();
                let added = fresh.len();
                state.buffer.clear_loading();
                state.buffer.append(fresh);
                // Clears an error row left by an earlier failed page.
                state.buffer.set_status(self.status_text(fetch.kind, false));
                if page.total.is_some() {
                    state.page.running_total = page.total;
                }
                added
            }
        };

        state.page.offset = fetch.offset;
        state.page.exhausted =
            page.records == 0 || reached(state.buffer.choice_count(), state.page.running_total);
        debug!(
            field = %self.field,
            kind = %fetch.kind,
            generation = fetch.generation,
            offset = state.page.offset,
            added,
            total = ?state.page.running_total,
            exhausted = state.page.exhausted,
            "page applied"
        );

        LoadOutcome::Applied {
            kind: fetch.kind,
            generation: fetch.generation,
            added,
            total: state.page.running_total,
            exhausted: state.page.exhausted,
            reconciled: false,
        }
    }

    /// The bound value to reconcile after an initial load, if it is missing
    /// from the buffer.
    fn reconcile_target(&self, generation: u64) -> Option<String> {
        if self.config.multiple {
            return None;
        }
        let state = self.lock();
        if state.page.generation != generation {
            return None;
        }
        let value = state.selection.single()?;
        (!state.buffer.contains_id(value)).then(|| value.to_owned())
    }

    /// Point-lookup `value` and splice it at the tail of the buffer.
    async fn reconcile(&self, generation: u64, value: String) -> bool {
        let mut params: Params = self.config.params.clone();
        params.insert(self.config.lookup_key.clone(), Value::String(value.clone()));
        params.insert("limit".into(), json!(1));
        params.insert("offset".into(), json!(0));

        debug!(field = %self.field, value = %value, "reconciling bound value");
        let result = self
            .api
            .get(self.config.request_options(), Some(Value::Object(params)))
            .await;

        let option = match result.and_then(|response| self.parse_page(&response)) {
            Ok(page) => page.options.into_iter().find(|o| o.id == value),
            Err(error) => {
                warn!(field = %self.field, error = %error, "bound value lookup failed");
                return false;
            }
        };
        let Some(option) = option else {
            debug!(field = %self.field, value = %value, "bound value not found upstream");
            return false;
        };

        let mut guard = self.lock();
        let state = &mut *guard;
        if state.page.generation != generation {
            return false;
        }
        if state.buffer.splice_tail(option) {
            state.page.excluded_value = Some(value);
            true
        } else {
            false
        }
    }
}

/// Holds the in-flight flag for one fetch.
///
/// Released when the fetch future finishes or is dropped, but only if no
/// reset has claimed the page since.
struct PageClaim {
    inner: Arc<EngineInner>,
    generation: u64,
}

impl Drop for PageClaim {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        if state.page.generation == self.generation {
            state.page.in_flight = false;
        }
    }
}

fn rejected(err: CoreError) -> LoadFuture {
    future::ready(Err(err)).boxed()
}

fn reached(count: usize, total: Option<u64>) -> bool {
    total.is_some_and(|total| u64::try_from(count).unwrap_or(u64::MAX) >= total)
}
