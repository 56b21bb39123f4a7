//! Control channel between a UI surface and the page agent.
//!
//! Requests are a tagged JSON union (`"action"` discriminator) so they stay
//! wire-compatible with a message-passing UI. The transport itself is an
//! in-process request/reply channel: each request carries a one-shot reply
//! slot, and the agent loop in [`crate::controller`] serves the receiving
//! end.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, ScanError};
use crate::product::{ProductSnapshot, ScanResult};

/// A command sent to the page agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ControlRequest {
    /// Read the current selection's snapshot without touching the page.
    ExtractCurrentPrice,
    /// Run the full variation scan.
    ScanAllVariations,
    /// Count the variation controls currently on the page.
    GetVariationCount,
    /// Request the running scan stop at the next iteration boundary.
    StopScan,
}

/// Terminal outcome of a scan request.
///
/// A scan that ran to completion (or was cooperatively stopped) reports
/// `success: true` even when nothing was recorded; `success: false` is
/// reserved for whole-scan failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<ScanResult>,
    pub total_scanned: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ScanResponse {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            results: Vec::new(),
            total_scanned: 0,
            message: Some(message.into()),
        }
    }
}

/// Variation control counts per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariationCount {
    pub count: usize,
    pub colors: usize,
    pub sizes: usize,
}

/// A reply to a [`ControlRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ControlResponse {
    Price { snapshot: ProductSnapshot },
    Scan(ScanResponse),
    VariationCount(VariationCount),
    Stopped { stopping: bool },
}

type Envelope = (ControlRequest, oneshot::Sender<ControlResponse>);

/// Requesting half of the control channel.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::UnboundedSender<Envelope>,
}

/// Receiving half, served by the agent loop.
pub type ControlReceiver = mpsc::UnboundedReceiver<Envelope>;

/// Create a connected request/reply channel pair.
pub fn control_channel() -> (ControlHandle, ControlReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ControlHandle { tx }, rx)
}

impl ControlHandle {
    /// Send one request and wait for its reply.
    pub async fn request(&self, request: ControlRequest) -> Result<ControlResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((request, reply_tx))
            .map_err(|_| ScanError::ChannelClosed("agent is gone".to_string()))?;
        reply_rx
            .await
            .map_err(|_| ScanError::ChannelClosed("agent dropped the request".to_string()))
    }
}
