//! Product snapshot extraction.
//!
//! [`SnapshotExtractor::snapshot`] is a total function of DOM state: absent
//! fields default to empty/`None`, and it never fails. Price extraction walks
//! the ordered structural candidates, rejecting per-swatch price fragments
//! and whole-number displays without a sibling full price, before falling
//! back to a full-text currency scan.

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;

use crate::ident;
use crate::page::{PageInspector, Step};
use crate::product::{Money, OptionKind, ProductSnapshot};
use crate::selectors;

fn currency_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\d+(?:,\d{3})*\.\d{2}").expect("valid regex"))
}

fn listed_price_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$[\d.,]+").expect("valid regex"))
}

fn noise_phrase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)See available options?|FREE Delivery|Only \d+ left in stock|In Stock|per count")
            .expect("valid regex")
    })
}

fn paren_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\([^)]*\)").expect("valid regex"))
}

fn ws_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

fn quantity_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\d+(?:\.\d+)?(oz|ml|l|g|kg|lb)$").expect("valid regex"))
}

/// Cut raw control text at the first embedded comment or style marker.
fn cut_markup_noise(raw: &str) -> &str {
    let mut end = raw.len();
    for marker in ["/*", "<!--", "<style", "<STYLE"] {
        if let Some(pos) = raw.find(marker) {
            end = end.min(pos);
        }
    }
    &raw[..end]
}

/// Clean a button/list label: drop embedded comments, prices, stock and
/// delivery chatter, parentheticals; collapse whitespace; and when the first
/// word is a quantity-with-unit token, reduce to just that token.
pub(crate) fn clean_control_label(raw: &str) -> String {
    let cut = cut_markup_noise(raw);
    let cut = listed_price_re().replace_all(cut, "");
    let cut = noise_phrase_re().replace_all(&cut, "");
    let cut = paren_re().replace_all(&cut, "");
    let cleaned = ws_re().replace_all(cut.trim(), " ").into_owned();

    if let Some(first) = cleaned.split_whitespace().next() {
        if quantity_word_re().is_match(first) {
            return first.to_string();
        }
    }
    cleaned
}

/// Label of a standalone span button: text before any embedded comment,
/// first word only.
pub(crate) fn standalone_button_label(raw: &str) -> String {
    cut_markup_noise(raw)
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_string()
}

/// Extracts a [`ProductSnapshot`] from the current page state.
pub struct SnapshotExtractor<'a, I> {
    page: &'a I,
}

impl<'a, I: PageInspector> SnapshotExtractor<'a, I> {
    pub fn new(page: &'a I) -> Self {
        Self { page }
    }

    /// Capture a snapshot of the page as it stands right now.
    pub fn snapshot(&self) -> ProductSnapshot {
        let url = self.page.page_url();
        let price = self.price_text().map(|raw| Money::parse(&raw));

        ProductSnapshot {
            title: self.title(),
            price,
            variation_label: self.variation_label(),
            item_id: ident::item_id_from_url(&url),
            parent_id: ident::resolve_parent_id(self.page),
            captured_at: Utc::now(),
            source_url: url,
        }
    }

    fn title(&self) -> String {
        for candidate in selectors::title_candidates() {
            if let Some(text) = self.page.query(&candidate).and_then(|n| self.page.text(n)) {
                let text = text.trim();
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
        String::new()
    }

    /// The main selected price, as formatted text.
    pub fn price_text(&self) -> Option<String> {
        for candidate in selectors::price_candidates() {
            for node in self.page.query_all(&candidate) {
                if self.in_rejected_region(node) {
                    log::debug!("skipping price inside variation region ({})", candidate);
                    continue;
                }
                let Some(text) = self.page.text(node) else { continue };
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                // A price without a fractional component is a truncated
                // display; only the sibling full-price fragment is trusted.
                if !text.contains('.') {
                    if let Some(full) = self.full_price_near(node) {
                        log::debug!("resolved truncated price '{}' to '{}'", text, full);
                        return Some(full);
                    }
                    log::debug!("skipping incomplete price '{}'", text);
                    continue;
                }
                log::debug!("price '{}' from candidate {}", text, candidate);
                return Some(text.to_string());
            }
        }
        self.fallback_price_scan()
    }

    fn in_rejected_region(&self, node: crate::page::NodeHandle) -> bool {
        selectors::price_rejection_ancestors()
            .iter()
            .any(|step| self.page.closest(node, step).is_some())
    }

    fn full_price_near(&self, node: crate::page::NodeHandle) -> Option<String> {
        let wrapper = self.page.closest(node, &selectors::price_wrapper())?;
        let fragment = self
            .page
            .query_within(wrapper, &selectors::full_price_fragment())
            .into_iter()
            .next()?;
        let text = self.page.text(fragment)?.trim().to_string();
        (!text.is_empty()).then_some(text)
    }

    fn fallback_price_scan(&self) -> Option<String> {
        log::debug!("no structural price candidate matched, scanning price-ish containers");
        for locator in selectors::priceish_containers() {
            for node in self.page.query_all(&locator) {
                if self.in_rejected_region(node) {
                    continue;
                }
                if let Some(text) = self.page.text(node) {
                    if let Some(found) = currency_re().find(&text) {
                        log::debug!("price '{}' from full-text scan", found.as_str());
                        return Some(found.as_str().to_string());
                    }
                }
            }
        }
        None
    }

    /// The currently selected variation, joining the color and size tokens
    /// that are present with `" - "`.
    pub fn variation_label(&self) -> String {
        let mut tokens = Vec::new();
        if let Some(color) = self.axis_token(OptionKind::Color) {
            tokens.push(color);
        }
        let size = self
            .axis_token(OptionKind::Size)
            .or_else(|| self.standalone_size_token());
        if let Some(size) = size {
            tokens.push(size);
        }
        tokens.join(" - ")
    }

    fn axis_token(&self, kind: OptionKind) -> Option<String> {
        for candidate in selectors::selected_label_candidates(kind) {
            let Some(node) = self.page.query(&candidate) else { continue };
            let mut text = self.page.text(node).unwrap_or_default().trim().to_string();

            // List items usually carry the clean name in their title
            // attribute rather than in contaminated text content.
            let item = if self.page.tag_name(node).as_deref() == Some("li") {
                Some(node)
            } else {
                self.page.closest(node, &Step::tag("li"))
            };
            if let Some(title) = item.and_then(|li| self.page.attribute(li, "title")) {
                if !title.trim().is_empty() {
                    text = title.trim().to_string();
                }
            }

            if !text.is_empty() && !text.starts_with('{') && !text.starts_with('[') {
                return Some(text);
            }
        }
        None
    }

    fn standalone_size_token(&self) -> Option<String> {
        for candidate in selectors::selected_standalone_size() {
            let Some(node) = self.page.query(&candidate) else { continue };

            // The match may be the inner selected span; resolve to the
            // standalone button that carries the prefixed id.
            let button = if self
                .page
                .attribute(node, "id")
                .is_some_and(|id| id.starts_with(selectors::STANDALONE_SIZE_PREFIX))
            {
                node
            } else {
                match self.page.closest(
                    node,
                    &Step::default().with_id_prefix(selectors::STANDALONE_SIZE_PREFIX),
                ) {
                    Some(button) => button,
                    None => continue,
                }
            };

            let label = self
                .page
                .query_within(button, &selectors::button_text())
                .into_iter()
                .next()
                .and_then(|inner| self.page.text(inner))
                .map(|raw| standalone_button_label(&raw))
                .unwrap_or_default();

            if !label.is_empty() {
                return Some(label);
            }
        }
        None
    }

    /// Label of the size control the page currently reports selected, for
    /// final corroboration before trusting an extraction.
    pub fn checked_size_label(&self) -> Option<String> {
        for candidate in selectors::checked_size_controls() {
            let Some(node) = self.page.query(&candidate) else { continue };

            let mut label = None;
            for ancestor in selectors::button_label_ancestors() {
                if let Some(holder) = self.page.closest(node, &ancestor) {
                    label = self
                        .page
                        .attribute(holder, "title")
                        .filter(|t| !t.trim().is_empty())
                        .or_else(|| self.page.text(holder))
                        .filter(|t| !t.trim().is_empty());
                    if label.is_some() {
                        break;
                    }
                }
            }
            let label = label
                .or_else(|| self.page.attribute(node, "value"))
                .or_else(|| self.page.attribute(node, "aria-label"));

            if let Some(raw) = label {
                let cleaned = clean_control_label(&raw);
                if !cleaned.is_empty() {
                    return Some(cleaned);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_control_label_strips_noise() {
        assert_eq!(clean_control_label("  14oz   /* Temporary CSS for swatch */"), "14oz");
        assert_eq!(clean_control_label("14oz $39.99 FREE Delivery"), "14oz");
        assert_eq!(clean_control_label("White (limited edition)"), "White");
        assert_eq!(clean_control_label("12oz Only 3 left in stock"), "12oz");
        assert_eq!(clean_control_label("See available options"), "");
    }

    #[test]
    fn test_clean_control_label_quantity_first_word() {
        assert_eq!(clean_control_label("14oz per count In Stock"), "14oz");
        // Non-quantity labels keep their full cleaned text.
        assert_eq!(clean_control_label("Matte   Black"), "Matte Black");
    }

    #[test]
    fn test_standalone_button_label() {
        assert_eq!(standalone_button_label("    7oz      /* Temporary CSS */"), "7oz");
        assert_eq!(standalone_button_label("14oz"), "14oz");
        assert_eq!(standalone_button_label("   "), "");
    }

    #[test]
    fn test_currency_regex() {
        assert_eq!(currency_re().find("was $1,299.99 today").unwrap().as_str(), "$1,299.99");
        assert!(currency_re().find("$25 flat").is_none());
    }
}
