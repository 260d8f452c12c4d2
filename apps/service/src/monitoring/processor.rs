use std::sync::Arc;

use tracing::{debug, warn};

use super::types::{CheckOutcome, CheckSpec, CheckState, LogRecord};
use crate::clock::Clock;
use crate::notify::Notifier;
use crate::storage::{CheckStore, LogSink};

/// Up iff the probe got a response whose status is one of the check's success codes
pub fn derive_state(spec: &CheckSpec, outcome: &CheckOutcome) -> CheckState {
    match (&outcome.error, outcome.response_code) {
        (None, Some(code)) if spec.success_codes.contains(&code) => CheckState::Up,
        _ => CheckState::Down,
    }
}

/// A first-ever evaluation never alerts, whatever state it lands in.
pub fn alert_warranted(spec: &CheckSpec, new_state: CheckState) -> bool {
    spec.has_been_checked() && spec.state != new_state
}

/// Human-readable text sent to the owner on a state change
pub fn alert_message(spec: &CheckSpec) -> String {
    format!(
        "Alert: your check for {} {} is currently {}",
        spec.method.as_str().to_uppercase(),
        spec.target(),
        spec.state
    )
}

/// Result of processing one outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    /// The check with its new state and evaluation time
    pub spec: CheckSpec,
    pub alerted: bool,
}

/// Turns probe outcomes into state changes, log records and alerts
pub struct OutcomeProcessor {
    store: Arc<dyn CheckStore>,
    sink: Arc<dyn LogSink>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl OutcomeProcessor {
    pub fn new(
        store: Arc<dyn CheckStore>,
        sink: Arc<dyn LogSink>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, sink, notifier, clock }
    }

    /// Derive the new state, then persist, log and notify in that order.
    ///
    /// Each effect is attempted even when an earlier one failed; failures are
    /// logged and never returned.
    pub async fn process(&self, spec: CheckSpec, outcome: CheckOutcome) -> Processed {
        let state = derive_state(&spec, &outcome);
        let alerted = alert_warranted(&spec, state);
        let now = self.clock.now();

        let mut updated = spec.clone();
        updated.state = state;
        updated.last_checked = Some(now);

        if let Err(e) = self.store.write_check(&updated.id, &updated).await {
            warn!(check = %updated.id, "Failed to save check state: {e}");
        }

        let record = LogRecord { check: spec, outcome, state, alert: alerted, time: now };
        if let Err(e) = self.sink.append(&updated.id, &record).await {
            warn!(check = %updated.id, "Failed to append check log: {e}");
        }

        if alerted {
            let message = alert_message(&updated);
            match self.notifier.send(&updated.owner_id, &message).await {
                Ok(()) => debug!(check = %updated.id, "Owner notified: {message}"),
                Err(e) => debug!(check = %updated.id, "Dropping failed notification: {e}"),
            }
        } else {
            debug!(check = %updated.id, %state, "Check outcome has not changed, no alert needed");
        }

        Processed { spec: updated, alerted }
    }
}
