use thiserror::Error;

/// Errors produced by the scan core and its collaborators.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Discovery found no selectable variation controls on the page.
    #[error("no variations found on this page")]
    NoVariationsFound,

    /// A structural query matched nothing where an element was required.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// A DOM interaction (activate, set-selected) could not be delivered.
    #[error("interaction with '{target}' failed: {reason}")]
    InteractionFailed { target: String, reason: String },

    /// A scan is already running for this parent product.
    #[error("scan already in progress for product {0}")]
    ScanInProgress(String),

    /// The durable store rejected a read or write.
    #[error("storage operation failed: {0}")]
    StorageFailed(String),

    /// The control channel to the page context is gone.
    #[error("control channel closed: {0}")]
    ChannelClosed(String),

    /// A persisted value could not be (de)serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The real-browser backend failed to launch, connect or evaluate.
    #[cfg(feature = "chrome")]
    #[error("browser error: {0}")]
    Browser(String),
}

/// Result type alias for scan operations.
pub type Result<T> = std::result::Result<T, ScanError>;
