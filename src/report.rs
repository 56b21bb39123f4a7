//! Result post-processing.
//!
//! The orchestrator already filters decoy sizes during discovery; compiling a
//! report re-applies the allowlist over the recorded labels, then orders by
//! price. The cheapest flag is only ever awarded to an in-stock result with a
//! parseable price.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::discover::SizeFilter;
use crate::product::ScanResult;
use crate::store::HistoryEntry;

/// A scan's results ordered for presentation, cheapest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceReport {
    pub results: Vec<ScanResult>,
    /// Index into `results` of the cheapest in-stock entry, when one exists.
    pub cheapest: Option<usize>,
}

impl PriceReport {
    /// Filter, order and flag a batch of scan results.
    pub fn compile(results: Vec<ScanResult>, filter: &SizeFilter) -> Self {
        let mut results: Vec<ScanResult> = results
            .into_iter()
            .filter(|r| {
                let keep = !filter.excludes(&r.variation_label);
                if !keep {
                    log::warn!("dropping off-allowlist result '{}'", r.variation_label);
                }
                keep
            })
            .collect();
        sort_by_price(&mut results);

        // After sorting, the cheapest eligible result is the first one that
        // is in stock with a parsed price.
        let cheapest = results
            .iter()
            .position(|r| !r.is_out_of_stock() && r.price.sort_key().is_finite());
        Self { results, cheapest }
    }

    pub fn cheapest_result(&self) -> Option<&ScanResult> {
        self.cheapest.map(|i| &self.results[i])
    }
}

/// Stable ascending price order; out-of-stock and unparsable entries keep
/// their relative order at the end.
pub fn sort_by_price(results: &mut [ScanResult]) {
    results.sort_by(|a, b| {
        a.price
            .sort_key()
            .partial_cmp(&b.price.sort_key())
            .unwrap_or(Ordering::Equal)
    });
}

/// One line of a product's price timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub scanned_at: chrono::DateTime<chrono::Utc>,
    pub result_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cheapest_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cheapest_price: Option<String>,
}

/// Condense stored scans into one summary line each, oldest first.
pub fn summarize_history(entries: &[HistoryEntry]) -> Vec<HistorySummary> {
    entries
        .iter()
        .map(|entry| {
            let cheapest = entry
                .results
                .iter()
                .filter(|r| !r.is_out_of_stock() && r.price.sort_key().is_finite())
                .min_by(|a, b| {
                    a.price
                        .sort_key()
                        .partial_cmp(&b.price.sort_key())
                        .unwrap_or(Ordering::Equal)
                });
            HistorySummary {
                scanned_at: entry.scanned_at,
                result_count: entry.results.len(),
                cheapest_label: cheapest.map(|r| r.variation_label.clone()),
                cheapest_price: cheapest.and_then(|r| match &r.price {
                    crate::product::PriceTag::Listed(money) => Some(money.raw.clone()),
                    crate::product::PriceTag::OutOfStock => None,
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::{Money, ProductSnapshot};
    use chrono::Utc;

    fn snapshot(label: &str) -> ProductSnapshot {
        ProductSnapshot {
            title: "Vacuum Bottle".to_string(),
            price: None,
            variation_label: label.to_string(),
            item_id: None,
            parent_id: None,
            captured_at: Utc::now(),
            source_url: String::new(),
        }
    }

    fn priced(label: &str, price: &str) -> ScanResult {
        ScanResult::priced(label, Money::parse(price), snapshot(label))
    }

    #[test]
    fn test_report_sorted_cheapest_first() {
        let filter = SizeFilter::new("14oz");
        let report = PriceReport::compile(
            vec![
                priced("Black - 14oz", "$13.49"),
                priced("White - 14oz", "$12.99"),
                priced("Red - 14oz", "$15.00"),
            ],
            &filter,
        );
        assert_eq!(report.results[0].variation_label, "White - 14oz");
        assert_eq!(report.cheapest, Some(0));
    }

    #[test]
    fn test_cheapest_never_out_of_stock_or_unparsable() {
        let filter = SizeFilter::new("14oz");
        let report = PriceReport::compile(
            vec![
                ScanResult::out_of_stock("White - 14oz", snapshot("White - 14oz")),
                priced("Black - 14oz", "price unavailable"),
                priced("Red - 14oz", "$15.00"),
            ],
            &filter,
        );
        assert_eq!(
            report.cheapest_result().map(|r| r.variation_label.as_str()),
            Some("Red - 14oz")
        );
    }

    #[test]
    fn test_cheapest_absent_when_nothing_eligible() {
        let filter = SizeFilter::new("14oz");
        let report = PriceReport::compile(
            vec![ScanResult::out_of_stock("White - 14oz", snapshot("White - 14oz"))],
            &filter,
        );
        assert!(report.cheapest_result().is_none());
    }

    #[test]
    fn test_allowlist_reapplied_on_labels() {
        let filter = SizeFilter::new("14oz");
        let report = PriceReport::compile(
            vec![priced("White - 7oz", "$6.99"), priced("White - 14oz", "$12.99")],
            &filter,
        );
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].variation_label, "White - 14oz");
    }

    #[test]
    fn test_unparsable_sorted_last() {
        let mut results = vec![
            priced("A - 14oz", "N/A"),
            priced("B - 14oz", "$9.99"),
        ];
        sort_by_price(&mut results);
        assert_eq!(results[0].variation_label, "B - 14oz");
    }

    #[test]
    fn test_summarize_history() {
        let entry = HistoryEntry {
            scanned_at: Utc::now(),
            title: "Vacuum Bottle".to_string(),
            results: vec![
                priced("Black - 14oz", "$13.49"),
                priced("White - 14oz", "$12.99"),
                ScanResult::out_of_stock("Red - 14oz", snapshot("Red - 14oz")),
            ],
            total_scanned: 3,
        };
        let summary = summarize_history(&[entry]);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].result_count, 3);
        assert_eq!(summary[0].cheapest_label.as_deref(), Some("White - 14oz"));
        assert_eq!(summary[0].cheapest_price.as_deref(), Some("$12.99"));
    }
}
