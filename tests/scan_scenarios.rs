//! End-to-end scan scenarios against the catalog-backed fake page.

use price_scout::channel::{control_channel, ControlRequest, ControlResponse};
use price_scout::page::fake::{FakeProductPage, SizeLayout};
use price_scout::product::PriceTag;
use price_scout::store::MemoryStore;
use price_scout::{Orchestrator, ProgressSink, ScanController, ScanError, ScanOptions};

fn options() -> ScanOptions {
    let _ = env_logger::builder().is_test(true).try_init();
    ScanOptions::new("14oz")
}

fn two_axis_page() -> FakeProductPage {
    FakeProductPage::builder()
        .title("Vacuum Bottle")
        .url("https://shop.example/dp/B00EXAMPLE?th=1")
        .color("White")
        .color("Black")
        .color("Red")
        .size("14oz")
        .size("7oz")
        .price("White", "14oz", "$12.99")
        .price("White", "7oz", "$6.99")
        .price("Black", "14oz", "$13.49")
        .build()
}

#[tokio::test(start_paused = true)]
async fn scans_every_color_at_the_canonical_size() {
    let page = two_axis_page();
    let report = Orchestrator::new(&page, options()).scan().await.unwrap();

    assert!(!report.stopped);
    assert_eq!(report.total_scanned, 2);
    let labels: Vec<_> = report.results.iter().map(|r| r.variation_label.as_str()).collect();
    assert_eq!(labels, vec!["White - 14oz", "Black - 14oz"]);
    assert_eq!(report.results[0].price, PriceTag::Listed(price_scout::Money::parse("$12.99")));
    assert_eq!(report.results[1].price, PriceTag::Listed(price_scout::Money::parse("$13.49")));
}

#[tokio::test(start_paused = true)]
async fn decoy_sizes_never_appear_in_results() {
    let page = two_axis_page();
    let report = Orchestrator::new(&page, options()).scan().await.unwrap();

    for result in &report.results {
        assert!(!result.variation_label.contains("7oz"), "decoy leaked: {}", result.variation_label);
    }
    // Red stocks nothing at the canonical size and is skipped entirely.
    assert!(!report.results.iter().any(|r| r.variation_label.starts_with("Red")));
}

#[tokio::test(start_paused = true)]
async fn color_stocking_only_the_decoy_size_records_nothing() {
    let page = FakeProductPage::builder()
        .title("Vacuum Bottle")
        .color("Blue")
        .size("14oz")
        .size("7oz")
        .price("Blue", "7oz", "$6.99")
        .build();

    let report = Orchestrator::new(&page, options()).scan().await.unwrap();
    assert!(report.results.is_empty());
}

#[tokio::test(start_paused = true)]
async fn silent_size_substitution_is_discarded_not_recorded() {
    // Selecting 14oz lands on 7oz; both combinations are stocked, so the
    // page shows a valid-looking price for the wrong size.
    let page = FakeProductPage::builder()
        .title("Vacuum Bottle")
        .color("Purple")
        .size("14oz")
        .size("7oz")
        .price("Purple", "14oz", "$12.99")
        .price("Purple", "7oz", "$5.00")
        .substitute("14oz", "7oz")
        .build();

    let report = Orchestrator::new(&page, options()).scan().await.unwrap();
    assert!(report.results.is_empty(), "substituted price must not be recorded");
}

#[tokio::test(start_paused = true)]
async fn push_button_size_controls_are_driven() {
    let page = FakeProductPage::builder()
        .title("Vacuum Bottle")
        .color("White")
        .color("Black")
        .size("14oz")
        .size("7oz")
        .size_layout(SizeLayout::PushButtons)
        .price("White", "14oz", "$12.99")
        .price("Black", "14oz", "$13.49")
        .build();

    let report = Orchestrator::new(&page, options()).scan().await.unwrap();
    let labels: Vec<_> = report.results.iter().map(|r| r.variation_label.as_str()).collect();
    assert_eq!(labels, vec!["White - 14oz", "Black - 14oz"]);
}

#[tokio::test(start_paused = true)]
async fn single_axis_scan_records_out_of_stock_without_interaction() {
    let page = FakeProductPage::builder()
        .title("Vacuum Bottle")
        .color("White")
        .color("Black")
        .color("Red")
        .single_price("White", "$10.00")
        .single_price("Black", "$11.00")
        .unavailable("Red")
        .build();

    let before = page.interaction_count();
    let report = Orchestrator::new(&page, options()).scan().await.unwrap();

    assert_eq!(report.total_scanned, 3);
    assert_eq!(report.results[0].price, PriceTag::Listed(price_scout::Money::parse("$10.00")));
    assert_eq!(report.results[1].price, PriceTag::Listed(price_scout::Money::parse("$11.00")));
    assert_eq!(report.results[2].variation_label, "Red");
    assert!(report.results[2].is_out_of_stock());
    // Two selections only; the unavailable option is never touched.
    assert_eq!(page.interaction_count() - before, 2);
}

#[tokio::test(start_paused = true)]
async fn single_axis_substitution_recorded_as_out_of_stock() {
    let page = FakeProductPage::builder()
        .title("Vacuum Bottle")
        .color("Green")
        .single_price("Green", "$9.99")
        .substitute("Green", "White")
        .color("White")
        .single_price("White", "$10.99")
        .build();

    let report = Orchestrator::new(&page, options()).scan().await.unwrap();
    let substituted = report
        .results
        .iter()
        .find(|r| r.is_out_of_stock())
        .expect("substituted option should be recorded out of stock");
    assert_eq!(substituted.variation_label, "White");
}

#[tokio::test(start_paused = true)]
async fn inline_price_hint_used_when_main_price_missing() {
    let page = FakeProductPage::builder()
        .title("Vacuum Bottle")
        .color("White")
        .single_price("White", "$10.00")
        .color_with_hint("Travel", "$4.99")
        .hint_only("Travel")
        .build();

    let report = Orchestrator::new(&page, options()).scan().await.unwrap();
    let travel = report
        .results
        .iter()
        .find(|r| r.variation_label == "Travel")
        .expect("hint-only option should be recorded");
    assert_eq!(travel.price, PriceTag::Listed(price_scout::Money::parse("$4.99")));
}

#[tokio::test(start_paused = true)]
async fn truncated_buybox_price_resolved_to_full_value() {
    let page = FakeProductPage::builder()
        .title("Vacuum Bottle")
        .color("White")
        .single_price("White", "$12.99")
        .truncated_buybox()
        .build();

    let report = Orchestrator::new(&page, options()).scan().await.unwrap();
    assert_eq!(report.results[0].price, PriceTag::Listed(price_scout::Money::parse("$12.99")));
}

#[tokio::test(start_paused = true)]
async fn standalone_size_buttons_scanned_single_axis() {
    let page = FakeProductPage::builder()
        .title("Vacuum Bottle")
        .size("14oz")
        .size("7oz")
        .size_layout(SizeLayout::Standalone)
        .single_price("14oz", "$12.99")
        .single_price("7oz", "$6.99")
        .build();

    let report = Orchestrator::new(&page, options()).scan().await.unwrap();
    assert_eq!(report.total_scanned, 1);
    assert_eq!(report.results[0].variation_label, "14oz");
    assert_eq!(report.results[0].price, PriceTag::Listed(price_scout::Money::parse("$12.99")));
}

#[tokio::test(start_paused = true)]
async fn dropdown_size_controls_scanned_single_axis() {
    let page = FakeProductPage::builder()
        .title("Vacuum Bottle")
        .size("14oz")
        .size("7oz")
        .size_layout(SizeLayout::DropDown)
        .single_price("14oz", "$12.99")
        .single_price("7oz", "$6.99")
        .build();

    let report = Orchestrator::new(&page, options()).scan().await.unwrap();
    assert_eq!(report.total_scanned, 1);
    assert_eq!(report.results[0].variation_label, "14oz");
}

#[tokio::test(start_paused = true)]
async fn empty_page_reports_no_variations() {
    let page = FakeProductPage::builder().title("Vacuum Bottle").build();
    let err = Orchestrator::new(&page, options()).scan().await.unwrap_err();
    assert!(matches!(err, ScanError::NoVariationsFound));
}

#[tokio::test(start_paused = true)]
async fn stop_request_yields_partial_results() {
    let page = two_axis_page();
    let (sink, mut rx) = ProgressSink::channel();
    let orchestrator = Orchestrator::new(&page, options()).with_progress(sink);
    let cancel = orchestrator.cancel_token();

    let stopper = async {
        let first = rx.recv().await.expect("first progress event");
        assert_eq!((first.current, first.total), (1, 3));
        cancel.cancel();
    };
    let (report, ()) = tokio::join!(orchestrator.scan(), stopper);
    let report = report.unwrap();

    assert!(report.stopped);
    assert!(report.total_scanned <= 1);
}

#[tokio::test(start_paused = true)]
async fn progress_events_cover_every_option() {
    let page = FakeProductPage::builder()
        .title("Vacuum Bottle")
        .color("White")
        .color("Black")
        .single_price("White", "$10.00")
        .single_price("Black", "$11.00")
        .build();

    let (sink, mut rx) = ProgressSink::channel();
    Orchestrator::new(&page, options())
        .with_progress(sink)
        .scan()
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push((event.current, event.total));
    }
    assert_eq!(events, vec![(1, 2), (2, 2)]);
}

#[tokio::test(start_paused = true)]
async fn snapshots_resolve_identifiers_from_metadata() {
    let page = FakeProductPage::builder()
        .title("Vacuum Bottle")
        .url("https://shop.example/dp/B0CHILD111?th=1")
        .metadata("ue_pti", "B0PARENT11")
        .color("White")
        .single_price("White", "$10.00")
        .build();

    let report = Orchestrator::new(&page, options()).scan().await.unwrap();
    let snapshot = &report.results[0].snapshot;
    assert_eq!(snapshot.item_id.as_ref().map(|id| id.as_str()), Some("B0CHILD111"));
    assert_eq!(snapshot.parent_id.as_ref().map(|id| id.as_str()), Some("B0PARENT11"));
}

#[tokio::test(start_paused = true)]
async fn controller_scan_persists_history_and_restores() {
    let page = two_axis_page();
    let controller = ScanController::new(&page, MemoryStore::new(), options());

    let response = controller.scan_all().await.unwrap();
    assert!(response.success);
    assert_eq!(response.total_scanned, 2);
    // Compiled output is cheapest-first.
    assert_eq!(response.results[0].variation_label, "White - 14oz");

    let restored = controller.restore_last_results().unwrap().expect("history entry");
    assert_eq!(restored.results.len(), 2);
    assert_eq!(restored.title, "Vacuum Bottle");

    // Restoration is read-only: repeating it changes nothing.
    let again = controller.restore_last_results().unwrap().expect("history entry");
    assert_eq!(restored, again);
    assert_eq!(controller.history_summaries().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn completed_scan_with_no_recorded_results_still_succeeds() {
    // The only color stocks only the decoy size, so every combination is
    // skipped. That is a successful scan with an empty result set, not a
    // failure.
    let page = FakeProductPage::builder()
        .title("Vacuum Bottle")
        .url("https://shop.example/dp/B00EXAMPLE?th=1")
        .color("Blue")
        .size("14oz")
        .size("7oz")
        .price("Blue", "7oz", "$6.99")
        .build();
    let controller = ScanController::new(&page, MemoryStore::new(), options());

    let response = controller.scan_all().await.unwrap();
    assert!(response.success);
    assert_eq!(response.total_scanned, 0);
    assert!(response.results.is_empty());
    // Nothing is persisted for an empty scan.
    assert!(controller.restore_last_results().unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn controller_serve_answers_scan_requests() {
    let page = two_axis_page();
    let controller = ScanController::new(&page, MemoryStore::new(), options());
    let (handle, mut rx) = control_channel();

    let client = async move {
        let count = handle.request(ControlRequest::GetVariationCount).await.unwrap();
        let ControlResponse::VariationCount(count) = count else {
            panic!("expected count response");
        };
        assert_eq!(count.colors, 3);
        assert_eq!(count.sizes, 1);

        let scan = handle.request(ControlRequest::ScanAllVariations).await.unwrap();
        let ControlResponse::Scan(scan) = scan else {
            panic!("expected scan response");
        };
        assert!(scan.success);
        assert_eq!(scan.total_scanned, 2);
    };
    tokio::join!(controller.serve(&mut rx), client);
}
