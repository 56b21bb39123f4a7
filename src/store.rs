//! Durable state: price history and the scan-session guard.
//!
//! The backing store is a JSON key-value surface behind [`KeyValueStore`];
//! extension storage, a file, or the in-memory [`MemoryStore`] all fit it.
//! History is keyed by the parent product code, so every variant page of one
//! product appends to the same timeline.
//!
//! Writers always re-read the stored map before mutating it. The store is the
//! single source of truth; nothing here caches across calls.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ScanError};
use crate::product::{ProductId, ScanResult};

/// Store key holding the per-product scan-session map.
pub const SCANNING_STATE_KEY: &str = "scanningState";

/// Store key holding the per-product history map.
pub const PRICE_HISTORY_KEY: &str = "priceHistory";

/// Oldest entries are evicted once a product's timeline exceeds this.
pub const MAX_HISTORY_ENTRIES: usize = 50;

/// A session older than this is considered abandoned and may be replaced.
pub const SESSION_TTL: Duration = Duration::from_secs(10 * 60);

/// Minimal JSON key-value persistence capability.
pub trait KeyValueStore {
    fn read(&self, key: &str) -> Result<Option<Value>>;
    fn write(&self, key: &str, value: Value) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory [`KeyValueStore`], used in tests and as a scratch backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<IndexMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, IndexMap<String, Value>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries().get(key).cloned())
    }

    fn write(&self, key: &str, value: Value) -> Result<()> {
        self.entries().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries().shift_remove(key);
        Ok(())
    }
}

/// One completed scan as it is persisted in a product's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub scanned_at: DateTime<Utc>,
    #[serde(default)]
    pub title: String,
    pub results: Vec<ScanResult>,
    pub total_scanned: usize,
}

/// Marker for a scan currently running against one parent product, persisted
/// as `{isScanning, startTime}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSession {
    pub is_scanning: bool,
    pub start_time: DateTime<Utc>,
}

impl ScanSession {
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.start_time);
        age.to_std().map_or(true, |age| age > SESSION_TTL)
    }
}

/// Everything persisted for one parent product under the history key: the
/// display title, the bounded scan timeline, and the most recent result set
/// for quick restoration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductHistory {
    #[serde(default)]
    pub product_title: String,
    #[serde(default)]
    pub scans: Vec<HistoryEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub last_scan_results: Vec<ScanResult>,
}

/// History and session operations over a [`KeyValueStore`].
pub struct HistoryStore<S> {
    store: S,
}

impl<S: KeyValueStore> HistoryStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Claim the scan session for a product.
    ///
    /// Fails with [`ScanError::ScanInProgress`] when a live session already
    /// exists; a session past [`SESSION_TTL`] counts as abandoned and is
    /// silently replaced.
    pub fn begin_session(&self, parent: &ProductId) -> Result<()> {
        let mut sessions = self.sessions()?;
        let now = Utc::now();
        if let Some(existing) = sessions.get(parent.as_str()) {
            if existing.is_scanning {
                if !existing.is_stale(now) {
                    return Err(ScanError::ScanInProgress(parent.to_string()));
                }
                log::warn!("replacing abandoned scan session for {}", parent);
            }
        }
        sessions.insert(parent.to_string(), ScanSession { is_scanning: true, start_time: now });
        self.write_sessions(&sessions)
    }

    /// Release the scan session for a product. Safe to call when no session
    /// exists.
    pub fn end_session(&self, parent: &ProductId) -> Result<()> {
        let mut sessions = self.sessions()?;
        if sessions.shift_remove(parent.as_str()).is_some() {
            self.write_sessions(&sessions)?;
        }
        Ok(())
    }

    /// Whether a live (non-stale) session exists for a product.
    pub fn is_scanning(&self, parent: &ProductId) -> Result<bool> {
        let sessions = self.sessions()?;
        let now = Utc::now();
        Ok(sessions
            .get(parent.as_str())
            .is_some_and(|s| s.is_scanning && !s.is_stale(now)))
    }

    /// Append one scan to a product's timeline, evicting the oldest entries
    /// beyond [`MAX_HISTORY_ENTRIES`].
    pub fn append(&self, parent: &ProductId, entry: HistoryEntry) -> Result<()> {
        let mut timelines = self.timelines()?;
        let record = timelines.entry(parent.to_string()).or_default();
        if !entry.title.is_empty() {
            record.product_title = entry.title.clone();
        }
        record.last_scan_results = entry.results.clone();
        record.scans.push(entry);
        if record.scans.len() > MAX_HISTORY_ENTRIES {
            let excess = record.scans.len() - MAX_HISTORY_ENTRIES;
            record.scans.drain(..excess);
        }
        let value = serde_json::to_value(&timelines)?;
        self.store.write(PRICE_HISTORY_KEY, value)
    }

    /// Full persisted record for a product.
    pub fn product_history(&self, parent: &ProductId) -> Result<Option<ProductHistory>> {
        Ok(self.timelines()?.shift_remove(parent.as_str()))
    }

    /// Full timeline for a product, oldest first.
    pub fn history(&self, parent: &ProductId) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .timelines()?
            .shift_remove(parent.as_str())
            .map(|record| record.scans)
            .unwrap_or_default())
    }

    /// Most recent scan for a product, if any.
    pub fn last_scan(&self, parent: &ProductId) -> Result<Option<HistoryEntry>> {
        Ok(self.history(parent)?.pop())
    }

    fn sessions(&self) -> Result<IndexMap<String, ScanSession>> {
        match self.store.read(SCANNING_STATE_KEY)? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(IndexMap::new()),
        }
    }

    fn write_sessions(&self, sessions: &IndexMap<String, ScanSession>) -> Result<()> {
        let value = serde_json::to_value(sessions)?;
        self.store.write(SCANNING_STATE_KEY, value)
    }

    fn timelines(&self) -> Result<IndexMap<String, ProductHistory>> {
        match self.store.read(PRICE_HISTORY_KEY)? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(IndexMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::Money;
    use chrono::Duration as ChronoDuration;

    fn parent() -> ProductId {
        ProductId::new("B00PARENT0").unwrap()
    }

    fn entry(label: &str, price: &str) -> HistoryEntry {
        let snapshot = crate::product::ProductSnapshot {
            title: "Vacuum Bottle".to_string(),
            price: Some(Money::parse(price)),
            variation_label: label.to_string(),
            item_id: None,
            parent_id: ProductId::new("B00PARENT0"),
            captured_at: Utc::now(),
            source_url: String::new(),
        };
        HistoryEntry {
            scanned_at: Utc::now(),
            title: "Vacuum Bottle".to_string(),
            results: vec![ScanResult::priced(label, Money::parse(price), snapshot)],
            total_scanned: 1,
        }
    }

    #[test]
    fn test_session_guard_rejects_concurrent_scan() {
        let store = HistoryStore::new(MemoryStore::new());
        store.begin_session(&parent()).unwrap();
        assert!(store.is_scanning(&parent()).unwrap());

        let err = store.begin_session(&parent()).unwrap_err();
        assert!(matches!(err, ScanError::ScanInProgress(_)));

        store.end_session(&parent()).unwrap();
        assert!(!store.is_scanning(&parent()).unwrap());
        store.begin_session(&parent()).unwrap();
    }

    #[test]
    fn test_sessions_are_per_product() {
        let store = HistoryStore::new(MemoryStore::new());
        let other = ProductId::new("B00OTHER00").unwrap();
        store.begin_session(&parent()).unwrap();
        store.begin_session(&other).unwrap();
        store.end_session(&parent()).unwrap();
        assert!(store.is_scanning(&other).unwrap());
    }

    #[test]
    fn test_stale_session_is_replaced() {
        let store = HistoryStore::new(MemoryStore::new());
        let stale = ScanSession {
            is_scanning: true,
            start_time: Utc::now() - ChronoDuration::minutes(30),
        };
        let mut sessions = IndexMap::new();
        sessions.insert(parent().to_string(), stale);
        store
            .store()
            .write(SCANNING_STATE_KEY, serde_json::to_value(&sessions).unwrap())
            .unwrap();

        assert!(!store.is_scanning(&parent()).unwrap());
        store.begin_session(&parent()).unwrap();
        assert!(store.is_scanning(&parent()).unwrap());
    }

    #[test]
    fn test_history_append_and_read_back() {
        let store = HistoryStore::new(MemoryStore::new());
        store.append(&parent(), entry("White - 14oz", "$12.99")).unwrap();
        store.append(&parent(), entry("White - 14oz", "$11.99")).unwrap();

        let history = store.history(&parent()).unwrap();
        assert_eq!(history.len(), 2);
        let last = store.last_scan(&parent()).unwrap().unwrap();
        assert_eq!(last.results[0].snapshot.price.as_ref().unwrap().raw, "$11.99");

        let record = store.product_history(&parent()).unwrap().unwrap();
        assert_eq!(record.product_title, "Vacuum Bottle");
        assert_eq!(record.last_scan_results.len(), 1);
        assert_eq!(record.last_scan_results[0].snapshot.price.as_ref().unwrap().raw, "$11.99");
    }

    #[test]
    fn test_persisted_wire_shapes() {
        let store = HistoryStore::new(MemoryStore::new());
        store.begin_session(&parent()).unwrap();
        let sessions = store.store().read(SCANNING_STATE_KEY).unwrap().unwrap();
        assert_eq!(sessions[parent().as_str()]["isScanning"], true);
        assert!(sessions[parent().as_str()].get("startTime").is_some());

        store.append(&parent(), entry("White - 14oz", "$12.99")).unwrap();
        let history = store.store().read(PRICE_HISTORY_KEY).unwrap().unwrap();
        let record = &history[parent().as_str()];
        assert_eq!(record["productTitle"], "Vacuum Bottle");
        assert_eq!(record["scans"].as_array().unwrap().len(), 1);
        assert_eq!(record["lastScanResults"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_history_bounded_oldest_evicted() {
        let store = HistoryStore::new(MemoryStore::new());
        for i in 0..(MAX_HISTORY_ENTRIES + 5) {
            store
                .append(&parent(), entry("White - 14oz", &format!("${}.00", i)))
                .unwrap();
        }
        let history = store.history(&parent()).unwrap();
        assert_eq!(history.len(), MAX_HISTORY_ENTRIES);
        // The five oldest entries are gone.
        assert_eq!(history[0].results[0].snapshot.price.as_ref().unwrap().raw, "$5.00");
    }

    #[test]
    fn test_history_isolated_per_product() {
        let store = HistoryStore::new(MemoryStore::new());
        let other = ProductId::new("B00OTHER00").unwrap();
        store.append(&parent(), entry("White - 14oz", "$12.99")).unwrap();
        assert!(store.history(&other).unwrap().is_empty());
    }
}
