use std::time::Duration;

/// Tunable scan parameters.
///
/// The settle intervals are heuristics tuned to typical page latency, not a
/// correctness guarantee; the orchestrator never reads the page before the
/// interval for the preceding interaction has elapsed.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// The single size token the catalog defines as valid. Size candidates
    /// indicating a different quantity-with-unit are decoys and filtered out.
    pub canonical_size: String,

    /// Wait after selecting a color. Color changes trigger the heaviest
    /// re-render, so this is the longest interval.
    pub color_settle: Duration,

    /// Wait after selecting a size.
    pub size_settle: Duration,

    /// Wait after re-selecting the canonical size following a color change.
    pub reselect_settle: Duration,

    /// Short wait for the re-selection to take effect before re-querying
    /// availability.
    pub post_reselect_settle: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            canonical_size: "14oz".to_string(),
            color_settle: Duration::from_millis(800),
            size_settle: Duration::from_millis(500),
            reselect_settle: Duration::from_millis(600),
            post_reselect_settle: Duration::from_millis(300),
        }
    }
}

impl ScanOptions {
    pub fn new(canonical_size: impl Into<String>) -> Self {
        Self { canonical_size: canonical_size.into(), ..Self::default() }
    }

    /// Builder method: set the canonical size token.
    pub fn canonical_size(mut self, token: impl Into<String>) -> Self {
        self.canonical_size = token.into();
        self
    }

    /// Builder method: set the color settle interval.
    pub fn color_settle(mut self, interval: Duration) -> Self {
        self.color_settle = interval;
        self
    }

    /// Builder method: set the size settle interval.
    pub fn size_settle(mut self, interval: Duration) -> Self {
        self.size_settle = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builder() {
        let opts = ScanOptions::new("12oz")
            .color_settle(Duration::from_millis(100))
            .size_settle(Duration::from_millis(50));

        assert_eq!(opts.canonical_size, "12oz");
        assert_eq!(opts.color_settle, Duration::from_millis(100));
        assert_eq!(opts.size_settle, Duration::from_millis(50));
        assert_eq!(opts.reselect_settle, Duration::from_millis(600));
    }

    #[test]
    fn test_color_settle_longer_than_size() {
        let opts = ScanOptions::default();
        assert!(opts.color_settle > opts.size_settle);
    }
}
