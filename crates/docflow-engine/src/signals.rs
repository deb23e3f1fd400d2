//! Named signal channels for running workflows.
//!
//! A workflow registers a named channel when it starts; out-of-band callers
//! (the review HTTP endpoint) deliver payloads to it by workflow id. Delivery
//! enqueues without blocking, so signals sent while the workflow is between
//! suspension points are buffered, not lost.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;
use tokio::sync::mpsc;

use docflow_core::types::ReviewDecisionSignal;

/// Receiving half handed to the workflow.
pub type SignalReceiver = mpsc::UnboundedReceiver<ReviewDecisionSignal>;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("no workflow listening on {signal:?} for {workflow_id}")]
    NotRegistered { workflow_id: String, signal: String },

    #[error("signal channel {signal:?} for {workflow_id} is closed")]
    Closed { workflow_id: String, signal: String },
}

/// Registry of `(workflow_id, signal_name)` channels.
#[derive(Default)]
pub struct SignalHub {
    channels: RwLock<HashMap<(String, String), mpsc::UnboundedSender<ReviewDecisionSignal>>>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel, replacing any stale registration for the same key.
    pub fn register(&self, workflow_id: &str, signal: &str) -> SignalReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut channels) = self.channels.write() {
            channels.insert((workflow_id.to_string(), signal.to_string()), tx);
        }
        rx
    }

    pub fn deregister(&self, workflow_id: &str, signal: &str) {
        if let Ok(mut channels) = self.channels.write() {
            channels.remove(&(workflow_id.to_string(), signal.to_string()));
        }
    }

    /// Deliver a payload to a registered workflow.
    pub fn deliver(
        &self,
        workflow_id: &str,
        signal: &str,
        payload: ReviewDecisionSignal,
    ) -> Result<(), SignalError> {
        let sender = self
            .channels
            .read()
            .ok()
            .and_then(|channels| {
                channels
                    .get(&(workflow_id.to_string(), signal.to_string()))
                    .cloned()
            })
            .ok_or_else(|| SignalError::NotRegistered {
                workflow_id: workflow_id.to_string(),
                signal: signal.to_string(),
            })?;

        sender.send(payload).map_err(|_| SignalError::Closed {
            workflow_id: workflow_id.to_string(),
            signal: signal.to_string(),
        })
    }
}
