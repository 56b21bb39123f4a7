use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Fire-and-forget progress notification emitted between scan iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub current: usize,
    pub total: usize,
}

/// Sender half of the progress channel. Emission never blocks and never
/// fails: a gone receiver just drops the event.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<UnboundedSender<ScanProgress>>,
}

impl ProgressSink {
    /// A sink that discards every event.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A connected sink plus the receiver for the controller side.
    pub fn channel() -> (Self, UnboundedReceiver<ScanProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn emit(&self, current: usize, total: usize) {
        if let Some(tx) = &self.tx {
            // At-most-once, fire-and-forget: a closed receiver is not an error.
            let _ = tx.send(ScanProgress { current, total });
        }
    }
}

/// Cooperative cancellation token.
///
/// Polled by the orchestrator between iterations, never preemptive: an
/// in-flight selection and its settle wait complete before the flag is
/// checked.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the scan stop at the next iteration boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear the flag; called at the start of every scan.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
