//! Scan orchestration.
//!
//! One scan is one sequential cooperative task: it suspends only for settle
//! intervals after DOM interactions, polls its [`CancelToken`] between
//! iterations, and contains every per-option fault at the loop boundary so a
//! bad combination never aborts the whole scan.
//!
//! The target page's selection model cascades: changing one axis can silently
//! reset the other to its own default. Selected state is therefore treated as
//! untrustworthy after any interaction: the canonical size is pre-selected
//! before each color change, re-acquired and re-selected afterwards, and the
//! observed label is reconciled against the expected one before any result is
//! recorded.

pub mod driver;
pub mod progress;

pub use driver::SelectionDriver;
pub use progress::{CancelToken, ProgressSink, ScanProgress};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ScanOptions;
use crate::discover::{Discoverer, SizeFilter};
use crate::error::{Result, ScanError};
use crate::extract::SnapshotExtractor;
use crate::page::PageInspector;
use crate::product::{Money, OptionKind, ProductSnapshot, ScanResult, VariationOption};

/// Outcome of a completed (or cooperatively stopped) scan. Stopping is not an
/// error: partial results are returned as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub results: Vec<ScanResult>,
    pub total_scanned: usize,
    /// True when the scan exited at an iteration boundary because the cancel
    /// token was set.
    pub stopped: bool,
}

/// Drives discovery, selection and extraction across the full combination
/// space of a product page.
pub struct Orchestrator<'a, I> {
    page: &'a I,
    options: ScanOptions,
    cancel: CancelToken,
    progress: ProgressSink,
}

impl<'a, I: PageInspector> Orchestrator<'a, I> {
    pub fn new(page: &'a I, options: ScanOptions) -> Self {
        Self { page, options, cancel: CancelToken::new(), progress: ProgressSink::disabled() }
    }

    /// Builder method: share a cancellation token with a controller.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Builder method: emit progress events into a sink.
    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = sink;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the full scan. Fails only for whole-scan conditions (no variation
    /// controls found); per-option faults are logged and skipped.
    pub async fn scan(&self) -> Result<ScanReport> {
        self.cancel.reset();

        let filter = SizeFilter::new(&self.options.canonical_size);
        let discoverer = Discoverer::new(self.page, filter);
        let extractor = SnapshotExtractor::new(self.page);

        let discovered = discoverer.discover();
        if discovered.is_empty() {
            return Err(ScanError::NoVariationsFound);
        }

        let initial = extractor.snapshot();
        let (colors, sizes): (Vec<_>, Vec<_>) =
            discovered.into_iter().partition(|o| o.kind == OptionKind::Color);

        if !colors.is_empty() && !sizes.is_empty() {
            log::debug!(
                "scanning {} x {} = {} combinations",
                colors.len(),
                sizes.len(),
                colors.len() * sizes.len()
            );
            self.scan_combinations(&discoverer, &extractor, &colors, &sizes).await
        } else {
            let single_axis = if colors.is_empty() { sizes } else { colors };
            log::debug!("scanning {} single-axis variations", single_axis.len());
            self.scan_single_axis(&extractor, &single_axis, &initial).await
        }
    }

    async fn scan_combinations(
        &self,
        discoverer: &Discoverer<'a, I>,
        extractor: &SnapshotExtractor<'a, I>,
        colors: &[VariationOption],
        sizes: &[VariationOption],
    ) -> Result<ScanReport> {
        let driver = SelectionDriver::new(self.page);
        // The allowlist already reduced sizes to the canonical token; the
        // first survivor is the target for every color.
        let target = &sizes[0];
        log::debug!("target size for all combinations: '{}'", target.name);

        let mut results = Vec::new();
        let mut stopped = false;

        for (index, color) in colors.iter().enumerate() {
            self.progress.emit(index + 1, colors.len());
            if self.cancel.is_cancelled() {
                log::debug!("scan stopped before color '{}'", color.name);
                stopped = true;
                break;
            }
            if let Err(err) = self
                .scan_color(&driver, discoverer, extractor, color, target, &mut results)
                .await
            {
                log::warn!("error scanning color '{}': {}", color.name, err);
            }
        }

        Ok(ScanReport { total_scanned: results.len(), results, stopped })
    }

    async fn scan_color(
        &self,
        driver: &SelectionDriver<'a, I>,
        discoverer: &Discoverer<'a, I>,
        extractor: &SnapshotExtractor<'a, I>,
        color: &VariationOption,
        target: &VariationOption,
        results: &mut Vec<ScanResult>,
    ) -> Result<()> {
        // Pre-selection guard: land on the canonical size first so the color
        // change is less likely to default to a decoy size. The captured
        // handle may already be stale; that is fine, the re-selection below
        // uses a fresh one.
        if let Err(err) = driver.select(target) {
            log::debug!("pre-selection of '{}' failed: {}", target.name, err);
        }
        self.settle(self.options.size_settle).await;

        driver.select(color)?;
        self.settle(self.options.color_settle).await;

        // Re-acquire size controls from the live DOM; descriptors captured
        // before the color change may be detached now.
        let fresh = discoverer.discover_sizes();
        let Some(candidate) = fresh.iter().find(|s| s.name == target.name && s.available) else {
            log::warn!(
                "size '{}' has no enabled control for color '{}', skipping color",
                target.name,
                color.name
            );
            return Ok(());
        };
        driver.select(candidate)?;
        self.settle(self.options.reselect_settle).await;
        self.settle(self.options.post_reselect_settle).await;

        // Availability can still flip once the re-selection settles.
        let confirmed = discoverer.discover_sizes();
        if !confirmed.iter().any(|s| s.name == target.name && s.available) {
            log::warn!(
                "size '{}' reported unavailable for color '{}' after re-selection, skipping color",
                target.name,
                color.name
            );
            return Ok(());
        }

        let snapshot = extractor.snapshot();
        let expected = format!("{} - {}", color.name, target.name);
        let observed = snapshot.variation_label.clone();
        log::debug!("expected '{}', observed '{}'", expected, observed);

        if !observed.is_empty() && !observed.contains(&target.name) {
            // Auto-substitution: the page switched sizes, so this color does
            // not stock the canonical size. No result, true or false.
            log::warn!(
                "page substituted a different size in '{}' for color '{}', discarding",
                observed,
                color.name
            );
            return Ok(());
        }
        let filter = discoverer.filter();
        if filter.excludes(&observed) || filter.excludes(&target.name) {
            log::warn!("allowlist rejected label '{}', discarding", observed);
            return Ok(());
        }
        if let Some(checked) = extractor.checked_size_label() {
            if filter.excludes(&checked) {
                log::warn!(
                    "currently selected control reports decoy size '{}', discarding",
                    checked
                );
                return Ok(());
            }
        }

        match snapshot.price.clone() {
            Some(price) if !price.raw.is_empty() => {
                log::debug!("recorded '{}' at {}", expected, price.raw);
                results.push(ScanResult::priced(expected, price, snapshot));
            }
            _ => log::warn!("no price found for '{}'", expected),
        }
        Ok(())
    }

    async fn scan_single_axis(
        &self,
        extractor: &SnapshotExtractor<'a, I>,
        options: &[VariationOption],
        initial: &ProductSnapshot,
    ) -> Result<ScanReport> {
        let driver = SelectionDriver::new(self.page);
        let mut results = Vec::new();
        let mut stopped = false;

        for (index, option) in options.iter().enumerate() {
            if self.cancel.is_cancelled() {
                log::debug!("scan stopped before variation '{}'", option.name);
                stopped = true;
                break;
            }

            if !option.available {
                // Known unavailable at discovery time: record out-of-stock
                // without touching the page.
                log::debug!("variation '{}' unavailable at discovery", option.name);
                results.push(ScanResult::out_of_stock(option.name.clone(), initial.clone()));
                self.progress.emit(index + 1, options.len());
                continue;
            }

            if let Err(err) = self.scan_single_option(&driver, extractor, option, &mut results).await {
                log::warn!("error scanning variation '{}': {}", option.name, err);
            }
            self.progress.emit(index + 1, options.len());
        }

        Ok(ScanReport { total_scanned: results.len(), results, stopped })
    }

    async fn scan_single_option(
        &self,
        driver: &SelectionDriver<'a, I>,
        extractor: &SnapshotExtractor<'a, I>,
        option: &VariationOption,
        results: &mut Vec<ScanResult>,
    ) -> Result<()> {
        driver.select(option)?;
        self.settle(self.options.color_settle).await;

        let snapshot = extractor.snapshot();
        let observed = snapshot.variation_label.clone();

        if !observed.is_empty() && !observed.contains(&option.name) {
            // The page substituted a different option: the requested one is
            // effectively out of stock. Record it under the observed label.
            log::warn!(
                "page substituted '{}' for '{}', recording as out of stock",
                observed,
                option.name
            );
            results.push(ScanResult::out_of_stock(observed, snapshot));
            return Ok(());
        }

        let label = if observed.is_empty() { option.name.clone() } else { observed };
        let price = snapshot
            .price
            .clone()
            .filter(|p| !p.raw.is_empty())
            .or_else(|| {
                option.price_hint.as_deref().map(|hint| {
                    log::debug!("using inline price hint '{}' for '{}'", hint, label);
                    Money::parse(hint)
                })
            });

        match price {
            Some(price) => results.push(ScanResult::priced(label, price, snapshot)),
            None => log::warn!("no price found for variation '{}'", label),
        }
        Ok(())
    }

    async fn settle(&self, interval: Duration) {
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_report_serde() {
        let report = ScanReport { results: Vec::new(), total_scanned: 0, stopped: false };
        let json = serde_json::to_string(&report).unwrap();
        let back: ScanReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report, back);
    }
}
