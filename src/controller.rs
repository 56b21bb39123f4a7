//! Page agent: serves control requests against one product page.
//!
//! The agent owns the cancel token and the history store. A scan claims the
//! per-product session marker before its first suspension point, releases it
//! on every exit path, and persists the compiled results under the parent
//! product code.

use crate::channel::{
    ControlReceiver, ControlRequest, ControlResponse, ScanResponse, VariationCount,
};
use crate::config::ScanOptions;
use crate::discover::{Discoverer, SizeFilter};
use crate::error::Result;
use crate::extract::SnapshotExtractor;
use crate::ident;
use crate::page::PageInspector;
use crate::product::{OptionKind, ProductId};
use crate::report::{summarize_history, HistorySummary, PriceReport};
use crate::scan::{CancelToken, Orchestrator, ProgressSink};
use crate::store::{HistoryEntry, HistoryStore, KeyValueStore};

pub struct ScanController<'a, I, S> {
    page: &'a I,
    history: HistoryStore<S>,
    options: ScanOptions,
    cancel: CancelToken,
    progress: ProgressSink,
}

impl<'a, I: PageInspector, S: KeyValueStore> ScanController<'a, I, S> {
    pub fn new(page: &'a I, store: S, options: ScanOptions) -> Self {
        Self {
            page,
            history: HistoryStore::new(store),
            options,
            cancel: CancelToken::new(),
            progress: ProgressSink::disabled(),
        }
    }

    /// Builder method: emit scan progress into a sink.
    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = sink;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn history(&self) -> &HistoryStore<S> {
        &self.history
    }

    /// Serve requests until the channel closes.
    ///
    /// Everything runs on one cooperative task; while a scan is in flight the
    /// loop keeps draining the channel so a stop request still lands.
    pub async fn serve(&self, rx: &mut ControlReceiver) {
        while let Some((request, reply)) = rx.recv().await {
            if request != ControlRequest::ScanAllVariations {
                let _ = reply.send(self.quick(request));
                continue;
            }

            let scan = self.scan_all();
            tokio::pin!(scan);
            let outcome = loop {
                tokio::select! {
                    outcome = &mut scan => break outcome,
                    next = rx.recv() => match next {
                        Some((ControlRequest::ScanAllVariations, busy_reply)) => {
                            let _ = busy_reply.send(ControlResponse::Scan(
                                ScanResponse::failure("a scan is already running"),
                            ));
                        }
                        Some((concurrent, concurrent_reply)) => {
                            let _ = concurrent_reply.send(self.quick(concurrent));
                        }
                        None => break (&mut scan).await,
                    },
                }
            };
            let response = match outcome {
                Ok(response) => response,
                Err(err) => ScanResponse::failure(err.to_string()),
            };
            let _ = reply.send(ControlResponse::Scan(response));
        }
    }

    /// Handle a single request outside the serve loop.
    pub async fn handle(&self, request: ControlRequest) -> ControlResponse {
        if request != ControlRequest::ScanAllVariations {
            return self.quick(request);
        }
        match self.scan_all().await {
            Ok(response) => ControlResponse::Scan(response),
            Err(err) => ControlResponse::Scan(ScanResponse::failure(err.to_string())),
        }
    }

    fn quick(&self, request: ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::ExtractCurrentPrice => ControlResponse::Price {
                snapshot: SnapshotExtractor::new(self.page).snapshot(),
            },
            ControlRequest::GetVariationCount => {
                ControlResponse::VariationCount(self.variation_count())
            }
            ControlRequest::StopScan => {
                self.stop();
                ControlResponse::Stopped { stopping: true }
            }
            ControlRequest::ScanAllVariations => {
                ControlResponse::Scan(ScanResponse::failure("scan must be awaited"))
            }
        }
    }

    /// Request the running scan stop at the next iteration boundary.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn variation_count(&self) -> VariationCount {
        let filter = SizeFilter::new(&self.options.canonical_size);
        let discovered = Discoverer::new(self.page, filter).discover();
        let colors = discovered.iter().filter(|o| o.kind == OptionKind::Color).count();
        VariationCount { count: discovered.len(), colors, sizes: discovered.len() - colors }
    }

    /// Run the full scan, guarded by the per-product session marker.
    pub async fn scan_all(&self) -> Result<ScanResponse> {
        let parent = ident::resolve_parent_id(self.page);
        // The session is claimed before the first suspension point, so two
        // overlapping requests cannot both pass the guard.
        if let Some(parent) = &parent {
            self.history.begin_session(parent)?;
        } else {
            log::warn!("no product code resolved; scanning without session guard or history");
        }

        let orchestrator = Orchestrator::new(self.page, self.options.clone())
            .with_cancel(self.cancel.clone())
            .with_progress(self.progress.clone());
        let outcome = orchestrator.scan().await;

        if let Some(parent) = &parent {
            if let Err(err) = self.history.end_session(parent) {
                log::error!("failed to release scan session for {}: {}", parent, err);
            }
        }
        let report = outcome?;

        let filter = SizeFilter::new(&self.options.canonical_size);
        let compiled = PriceReport::compile(report.results, &filter);

        if let Some(parent) = &parent {
            if !compiled.results.is_empty() {
                self.persist(parent, &compiled);
            }
        }

        // Completing with nothing recorded (every combination skipped) is
        // still a successful scan; failures surface through the Err path.
        Ok(ScanResponse {
            success: true,
            total_scanned: compiled.results.len(),
            message: report.stopped.then(|| "scan stopped before completion".to_string()),
            results: compiled.results,
        })
    }

    fn persist(&self, parent: &ProductId, compiled: &PriceReport) {
        let title = compiled
            .results
            .first()
            .map(|r| r.snapshot.title.clone())
            .unwrap_or_default();
        let entry = HistoryEntry {
            scanned_at: chrono::Utc::now(),
            title,
            results: compiled.results.clone(),
            total_scanned: compiled.results.len(),
        };
        // A storage fault must not lose the scan response.
        if let Err(err) = self.history.append(parent, entry) {
            log::error!("failed to persist scan for {}: {}", parent, err);
        }
    }

    /// Most recent persisted results for this page's parent product.
    /// Read-only; calling it repeatedly never mutates stored state.
    pub fn restore_last_results(&self) -> Result<Option<HistoryEntry>> {
        match ident::resolve_parent_id(self.page) {
            Some(parent) => self.history.last_scan(&parent),
            None => Ok(None),
        }
    }

    /// Summarized timeline for this page's parent product, oldest first.
    pub fn history_summaries(&self) -> Result<Vec<HistorySummary>> {
        match ident::resolve_parent_id(self.page) {
            Some(parent) => Ok(summarize_history(&self.history.history(&parent)?)),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::fake::FakeProductPage;
    use crate::store::MemoryStore;

    fn single_axis_page() -> FakeProductPage {
        FakeProductPage::builder()
            .title("Vacuum Bottle")
            .url("https://shop.example/dp/B00EXAMPLE?th=1")
            .color("White")
            .color("Black")
            .single_price("White", "$10.00")
            .single_price("Black", "$11.00")
            .build()
    }

    #[tokio::test]
    async fn test_variation_count() {
        let page = single_axis_page();
        let controller = ScanController::new(&page, MemoryStore::new(), ScanOptions::default());

        let response = controller.handle(ControlRequest::GetVariationCount).await;
        assert_eq!(
            response,
            ControlResponse::VariationCount(VariationCount { count: 2, colors: 2, sizes: 0 })
        );
    }

    #[tokio::test]
    async fn test_extract_current_price() {
        let page = single_axis_page();
        let controller = ScanController::new(&page, MemoryStore::new(), ScanOptions::default());

        let ControlResponse::Price { snapshot } =
            controller.handle(ControlRequest::ExtractCurrentPrice).await
        else {
            panic!("expected price response");
        };
        assert_eq!(snapshot.title, "Vacuum Bottle");
        assert_eq!(snapshot.price.unwrap().raw, "$10.00");
    }

    #[tokio::test]
    async fn test_stop_sets_cancel_token() {
        let page = single_axis_page();
        let controller = ScanController::new(&page, MemoryStore::new(), ScanOptions::default());

        let response = controller.handle(ControlRequest::StopScan).await;
        assert_eq!(response, ControlResponse::Stopped { stopping: true });
        assert!(controller.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_scan_rejected_while_session_held() {
        let page = single_axis_page();
        let controller = ScanController::new(&page, MemoryStore::new(), ScanOptions::default());
        let parent = ProductId::new("B00EXAMPLE").unwrap();
        controller.history().begin_session(&parent).unwrap();

        let response = controller.scan_all().await.unwrap_err();
        assert!(matches!(response, crate::error::ScanError::ScanInProgress(_)));
        // The foreign session is left in place.
        assert!(controller.history().is_scanning(&parent).unwrap());
    }
}
