use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::debug;

use super::checker::{ProbeRequest, ProbeTransport};
use super::types::{CheckOutcome, CheckSpec};
use crate::clock::Clock;

/// One-shot slot that accepts exactly one outcome.
///
/// The probe and the timer each hold a reference and race to resolve it; the
/// sender is taken out on the first call so every later call is a no-op.
pub struct OutcomeSlot {
    sender: Mutex<Option<oneshot::Sender<CheckOutcome>>>,
}

impl OutcomeSlot {
    pub fn new() -> (Self, oneshot::Receiver<CheckOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { sender: Mutex::new(Some(tx)) }, rx)
    }

    /// Deliver `outcome` if nothing was delivered yet. Returns whether this
    /// call won.
    pub fn resolve(&self, outcome: CheckOutcome) -> bool {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        match sender {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }
}

/// Check executor - runs one probe per call, bounded by the check's timeout
pub struct CheckExecutor {
    transport: Arc<dyn ProbeTransport>,
    clock: Arc<dyn Clock>,
}

impl CheckExecutor {
    pub fn new(transport: Arc<dyn ProbeTransport>, clock: Arc<dyn Clock>) -> Self {
        Self { transport, clock }
    }

    /// Probe `spec` and return its outcome.
    ///
    /// Whichever of response, transport failure or timeout comes first is the
    /// outcome; the other task is aborted once the slot is resolved.
    pub async fn execute(&self, spec: &CheckSpec) -> CheckOutcome {
        let (slot, rx) = OutcomeSlot::new();
        let slot = Arc::new(slot);

        let probe = {
            let slot = Arc::clone(&slot);
            let transport = Arc::clone(&self.transport);
            let request = ProbeRequest::from(spec);
            tokio::spawn(async move {
                let reply = transport.probe(&request).await;
                if !slot.resolve(reply.into()) {
                    debug!("Discarding probe reply for {} that arrived after the timeout", request.target());
                }
            })
        };

        let timer = {
            let slot = Arc::clone(&slot);
            let clock = Arc::clone(&self.clock);
            let limit = spec.timeout();
            tokio::spawn(async move {
                clock.sleep(limit).await;
                slot.resolve(CheckOutcome::timeout());
            })
        };

        // Both tasks only drop their sender without sending if they panicked.
        let outcome = rx
            .await
            .unwrap_or_else(|_| CheckOutcome::transport_error("probe task ended without an outcome"));

        probe.abort();
        timer.abort();

        debug!(check = %spec.id, target = %spec.target(), ?outcome, "Probe finished");
        outcome
    }
}
