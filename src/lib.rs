//! # price-scout
//!
//! A variation-scan engine for retail product pages: it discovers every
//! selectable color/size combination, drives the page through each one,
//! extracts the displayed price, and persists a bounded price history keyed
//! by the parent product code.
//!
//! ## Features
//!
//! - **Snapshot extraction**: title, price and selected-variation label read
//!   from the live page, resilient to split and per-swatch price displays
//! - **Option discovery**: swatch lists, push buttons, standalone span
//!   buttons and drop-downs, with a size allowlist that filters decoy listings
//! - **Scan orchestration**: a cooperative state machine with settle
//!   intervals, re-selection guards against silent size substitution, and
//!   per-option fault containment
//! - **Progress and control**: fire-and-forget progress events plus a
//!   cooperative stop token
//! - **Price history**: per-product timelines bounded to the most recent
//!   scans, behind a pluggable key-value store
//!
//! ## Usage
//!
//! ```rust,no_run
//! use price_scout::{Orchestrator, ScanOptions};
//! use price_scout::page::fake::FakeProductPage;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> price_scout::Result<()> {
//! let page = FakeProductPage::builder()
//!     .title("Vacuum Bottle")
//!     .color("White")
//!     .color("Black")
//!     .size("14oz")
//!     .price("White", "14oz", "$12.99")
//!     .price("Black", "14oz", "$13.49")
//!     .build();
//!
//! let report = Orchestrator::new(&page, ScanOptions::new("14oz")).scan().await?;
//! for result in &report.results {
//!     println!("{}: {:?}", result.variation_label, result.price);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Against a real page, enable the `chrome` feature and open the page through
//! [`page::chrome::ChromeSession`]; every scan component is generic over
//! [`page::PageInspector`].
//!
//! ## Module Overview
//!
//! - [`page`]: page inspection capability, typed locators, fake and
//!   real-browser backends
//! - [`extract`]: product snapshot extraction
//! - [`discover`]: variation option discovery and the size allowlist
//! - [`scan`]: orchestrator, selection driver, progress and cancellation
//! - [`store`]: price history and the scan-session guard
//! - [`report`]: result ordering, cheapest flagging and history summaries
//! - [`channel`] / [`controller`]: request/reply control surface and the
//!   agent loop that serves it

pub mod channel;
pub mod config;
pub mod controller;
pub mod discover;
pub mod error;
pub mod extract;
pub mod ident;
pub mod page;
pub mod product;
pub mod report;
pub mod scan;
pub mod selectors;
pub mod store;

pub use channel::{control_channel, ControlHandle, ControlRequest, ControlResponse, ScanResponse};
pub use config::ScanOptions;
pub use controller::ScanController;
pub use discover::{Discoverer, SizeFilter};
pub use error::{Result, ScanError};
pub use extract::SnapshotExtractor;
pub use page::{Locator, NodeHandle, PageInspector, Step};
pub use product::{Money, PriceTag, ProductId, ProductSnapshot, ScanResult, VariationOption};
pub use report::PriceReport;
pub use scan::{CancelToken, Orchestrator, ProgressSink, ScanProgress, ScanReport};
pub use store::{HistoryEntry, HistoryStore, KeyValueStore, MemoryStore, ProductHistory};
