// ── Bound field lifecycle ──
//
// Wires one field's paging engine to its scroll detector: bind builds the
// engine and runs the first load, the first rendered rows attach the
// detector, and each debounced intent drives `load_more`.

use optwire_api::ApiRegistry;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::buffer::OptionStream;
use crate::config::FieldConfig;
use crate::engine::{LoadFuture, LoadOutcome, OptionsEngine};
use crate::error::CoreError;
use crate::scroll::{ScrollConfig, ScrollIntent, ScrollIntentDetector, ScrollMetrics};

/// A remote-backed field bound to a view.
#[derive(Debug)]
pub struct RemoteField {
    engine: OptionsEngine,
    detector: ScrollIntentDetector,
    cancel: CancellationToken,
    listener: Option<JoinHandle<()>>,
}

impl RemoteField {
    /// Resolve the field's API, build its state and run the initial load.
    ///
    /// `value` is the currently bound value (or values, for multi-value
    /// fields); a single value missing from the first page is reconciled.
    pub async fn bind(
        registry: &ApiRegistry,
        name: &str,
        config: FieldConfig,
        value: &[&str],
    ) -> Result<(Self, LoadOutcome), CoreError> {
        Self::bind_with(registry, name, config, value, ScrollConfig::default()).await
    }

    pub async fn bind_with(
        registry: &ApiRegistry,
        name: &str,
        config: FieldConfig,
        value: &[&str],
        scroll: ScrollConfig,
    ) -> Result<(Self, LoadOutcome), CoreError> {
        config.validate()?;
        let api = registry.get(&config.api, None)?;
        let engine = OptionsEngine::new(name, config, api);
        if engine.config().multiple {
            for id in value {
                engine.select(id);
            }
        } else {
            engine.set_value(value.first().copied());
        }

        info!(field = name, api = %engine.config().api, "field bound");
        let field = Self {
            engine,
            detector: ScrollIntentDetector::new(scroll),
            cancel: CancellationToken::new(),
            listener: None,
        };
        let outcome = field.engine.initial_load().await?;
        Ok((field, outcome))
    }

    pub fn engine(&self) -> &OptionsEngine {
        &self.engine
    }

    pub fn options(&self) -> OptionStream {
        self.engine.subscribe()
    }

    pub fn search(&self, term: &str) -> LoadFuture {
        self.engine.search(term, self.engine.config().multiple)
    }

    pub fn load_more(&self) -> LoadFuture {
        self.engine.load_more()
    }

    pub fn select(&self, id: &str) -> bool {
        self.engine.select(id)
    }

    /// The view rendered `rows` rows. Attaches the scroll detector the
    /// first time there is at least one. Returns whether it attached.
    pub fn on_rows_rendered(&mut self, rows: usize) -> bool {
        if !self.engine.config().infinite {
            return false;
        }
        let Some(intents) = self.detector.attach(rows) else {
            return false;
        };
        self.listener = Some(tokio::spawn(intent_listener(
            self.engine.clone(),
            intents,
            self.cancel.clone(),
        )));
        true
    }

    /// Feed one scroll sample to the detector.
    pub fn on_scroll(&self, metrics: ScrollMetrics) -> bool {
        self.detector.observe(metrics)
    }

    pub fn is_scroll_attached(&self) -> bool {
        self.detector.is_attached()
    }

    /// Detach the detector, stop the intent listener and invalidate
    /// pending fetches.
    pub fn unbind(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.detector.detach();
        self.cancel.cancel();
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        self.engine.close();
        debug!(field = self.engine.field(), "field unbound");
    }
}

impl Drop for RemoteField {
    fn drop(&mut self) {
        if !self.cancel.is_cancelled() {
            self.release();
        }
    }
}

/// Drive `load_more` from scroll intents until cancelled.
async fn intent_listener(
    engine: OptionsEngine,
    mut intents: mpsc::Receiver<ScrollIntent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            intent = intents.recv() => {
                let Some(ScrollIntent) = intent else { break };
                match engine.load_more().await {
                    Ok(outcome) => debug!(field = engine.field(), ?outcome, "scroll load finished"),
                    Err(e) if e.is_noop() => debug!(field = engine.field(), reason = %e, "scroll load skipped"),
                    Err(e) => debug!(field = engine.field(), error = %e, "scroll load rejected"),
                }
            }
        }
    }
}
