// ── Scroll-intent detection ──
//
// Turns a high-rate stream of scroll samples into at most one "fetch more"
// intent per quiet window. Threshold math is a pure function; debouncing
// runs on a background task owned by the detector.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Detector tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollConfig {
    /// Fraction of the container height that counts as "near the end".
    pub distance: f64,
    /// Crossing samples closer together than this coalesce into one intent.
    pub quiet_window: Duration,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            distance: 0.3,
            quiet_window: Duration::from_millis(200),
        }
    }
}

/// Geometry of the list container at one scroll position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    /// Visible height of the container.
    pub container_height: f64,
    /// Bottom edge of the last rendered row, relative to the container's
    /// visible top.
    pub last_row_bottom: f64,
}

/// Request for the next page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollIntent;

/// Whether the remaining scroll distance is within `distance` of the end.
pub fn should_fetch(metrics: ScrollMetrics, distance: f64) -> bool {
    let remaining = metrics.last_row_bottom - metrics.container_height;
    remaining <= metrics.container_height * distance + 1.0
}

/// Debounced scroll-intent detector for one list container.
///
/// Starts detached. [`attach`](Self::attach) spawns the debounce task, so
/// it must be called from inside a Tokio runtime.
#[derive(Debug)]
pub struct ScrollIntentDetector {
    config: ScrollConfig,
    attached: Option<Attached>,
}

#[derive(Debug)]
struct Attached {
    crossings: mpsc::UnboundedSender<()>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ScrollIntentDetector {
    pub fn new(config: ScrollConfig) -> Self {
        Self {
            config,
            attached: None,
        }
    }

    pub fn config(&self) -> ScrollConfig {
        self.config
    }

    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    /// Attach to a container that has `rendered_rows` rows.
    ///
    /// Returns the intent receiver on the first successful attach; `None`
    /// while the list is still empty or when already attached.
    pub fn attach(&mut self, rendered_rows: usize) -> Option<mpsc::Receiver<ScrollIntent>> {
        if rendered_rows == 0 || self.attached.is_some() {
            return None;
        }

        let (crossings_tx, crossings_rx) = mpsc::unbounded_channel();
        let (intents_tx, intents_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(debounce_task(
            crossings_rx,
            intents_tx,
            self.config.quiet_window,
            cancel.clone(),
        ));

        debug!(rendered_rows, "scroll detector attached");
        self.attached = Some(Attached {
            crossings: crossings_tx,
            cancel,
            task,
        });
        Some(intents_rx)
    }

    /// Feed one scroll sample. Returns whether it crossed the threshold.
    pub fn observe(&self, metrics: ScrollMetrics) -> bool {
        let Some(attached) = &self.attached else {
            return false;
        };
        let crossed = should_fetch(metrics, self.config.distance);
        trace!(?metrics, crossed, "scroll sample");
        if crossed {
            let _ = attached.crossings.send(());
        }
        crossed
    }

    /// Stop the debounce task and release the container.
    pub fn detach(&mut self) {
        if let Some(attached) = self.attached.take() {
            attached.cancel.cancel();
            attached.task.abort();
            debug!("scroll detector detached");
        }
    }
}

impl Default for ScrollIntentDetector {
    fn default() -> Self {
        Self::new(ScrollConfig::default())
    }
}

impl Drop for ScrollIntentDetector {
    fn drop(&mut self) {
        self.detach();
    }
}

// ── Background task ──────────────────────────────────────────────────

/// Trailing debounce: each crossing re-arms the deadline; one intent fires
/// once the window passes quietly.
async fn debounce_task(
    mut crossings: mpsc::UnboundedReceiver<()>,
    intents: mpsc::Sender<ScrollIntent>,
    quiet_window: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            crossing = crossings.recv() => {
                if crossing.is_none() {
                    return;
                }
            }
        }

        let mut deadline = Instant::now() + quiet_window;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                crossing = crossings.recv() => match crossing {
                    Some(()) => deadline = Instant::now() + quiet_window,
                    None => return,
                },
                () = tokio::time::sleep_until(deadline) => break,
            }
        }

        match intents.try_send(ScrollIntent) {
            Ok(()) => trace!("scroll intent emitted"),
            // An undelivered intent is still pending; one is enough.
            Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => return,
        }
    }
}
