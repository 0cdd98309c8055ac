//! One-shot exposure tracking.
use std::collections::HashSet;
use std::sync::Mutex;

use serde::Serialize;

use crate::Variant;

/// An exposure event: a user was served a particular variant. Needs to be
/// delivered to analytics storage for experiment analysis.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposureEvent {
    /// The flag key the variant was requested under.
    pub flag_key: String,
    /// Identity of the served variant: its key, falling back to its value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    /// Key of the experiment the variant belongs to, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_key: Option<String>,
    /// When the exposure happened.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// A sink for exposure events, e.g. an analytics pipeline. Exposure delivery
/// is fire-and-forget from the SDK's perspective.
pub trait ExposureSink {
    /// Deliver `event`.
    ///
    /// # Errors
    ///
    /// This method should not return errors and should not panic.
    /// Transmission failures must be handled (and logged) internally;
    /// exposure is best-effort telemetry, never a correctness-critical path.
    ///
    /// # Notes
    ///
    /// Called on the thread that resolved the variant, so it should not
    /// block.
    fn send_exposure(&self, event: ExposureEvent);
}

pub(crate) struct NoopExposureSink;
impl ExposureSink for NoopExposureSink {
    fn send_exposure(&self, _event: ExposureEvent) {}
}

impl<T: Fn(ExposureEvent)> ExposureSink for T {
    fn send_exposure(&self, event: ExposureEvent) {
        self(event);
    }
}

/// Deduplicates exposures: at most one event per distinct
/// `(flag key, variant identity)` pair per client lifetime. `clear` resets
/// the window, so re-serving the same variant afterwards emits a new event.
pub(crate) struct ExposureTracker {
    sink: Box<dyn ExposureSink + Send + Sync>,
    seen: Mutex<HashSet<(String, String)>>,
}

impl ExposureTracker {
    pub(crate) fn new(sink: Box<dyn ExposureSink + Send + Sync>) -> ExposureTracker {
        ExposureTracker {
            sink,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Record an exposure of `variant` under `flag_key`. A `None` variant is
    /// a no-op, as exposure requires a resolved variant. Never fails the
    /// caller.
    pub(crate) fn track(&self, flag_key: &str, variant: Option<&Variant>) {
        let Some(variant) = variant else {
            return;
        };

        let identity = variant.identity().to_owned();
        {
            let mut seen = self
                .seen
                .lock()
                .expect("thread holding exposure lock should not panic");
            if !seen.insert((flag_key.to_owned(), identity)) {
                // Already tracked this variant for this flag.
                return;
            }
        }

        let event = ExposureEvent {
            flag_key: flag_key.to_owned(),
            variant: variant.key.clone().or_else(|| variant.value.clone()),
            experiment_key: variant.exp_key.clone(),
            timestamp: chrono::Utc::now(),
        };
        log::trace!(target: "experiment",
                    event:serde;
                    "tracking exposure");
        self.sink.send_exposure(event);
    }

    /// Forget every tracked exposure.
    pub(crate) fn clear(&self) {
        self.seen
            .lock()
            .expect("thread holding exposure lock should not panic")
            .clear();
    }
}
