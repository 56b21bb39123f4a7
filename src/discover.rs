//! Variation option discovery.
//!
//! Enumerates every selectable color and size control in the live DOM and
//! normalizes each into a [`VariationOption`]. Size candidates pass through
//! the [`SizeFilter`] allowlist: the catalog defines exactly one canonical
//! quantity-with-unit token, and the page exposes decoy/legacy sizes that
//! must never be scanned or reported.
//!
//! Discovered handles point into live page state; after any selection that
//! may re-render, call [`Discoverer::discover_sizes`] again instead of
//! reusing old descriptors.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::extract::{clean_control_label, standalone_button_label};
use crate::page::{Locator, NodeHandle, PageInspector, Step};
use crate::product::{ControlStyle, OptionKind, VariationOption};
use crate::selectors;

fn quantity_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*-?\s*(oz|ounce|ml|l|g|kg|lb)\b").expect("valid regex")
    })
}

fn normalize_unit(unit: &str) -> String {
    let unit = unit.to_ascii_lowercase();
    if unit == "ounce" { "oz".to_string() } else { unit }
}

/// Allowlist filter around the single canonical size token.
///
/// A candidate is excluded when its text mentions any quantity-with-unit
/// token that differs from the canonical one, even if superficially valid.
#[derive(Debug, Clone)]
pub struct SizeFilter {
    canonical: Option<(f64, String)>,
}

impl SizeFilter {
    pub fn new(canonical_token: &str) -> Self {
        let canonical = quantity_token_re().captures(canonical_token).and_then(|c| {
            let quantity = c.get(1)?.as_str().parse::<f64>().ok()?;
            Some((quantity, normalize_unit(c.get(2)?.as_str())))
        });
        if canonical.is_none() {
            log::warn!(
                "canonical size '{}' has no quantity-with-unit token; allowlist disabled",
                canonical_token
            );
        }
        Self { canonical }
    }

    /// Whether this text names a size the catalog does not carry.
    pub fn excludes(&self, text: &str) -> bool {
        let Some((quantity, unit)) = &self.canonical else { return false };
        for capture in quantity_token_re().captures_iter(text) {
            let found_quantity = capture
                .get(1)
                .and_then(|m| m.as_str().parse::<f64>().ok());
            let found_unit = capture.get(2).map(|m| normalize_unit(m.as_str()));
            match (found_quantity, found_unit) {
                (Some(q), Some(u)) if q == *quantity && u == *unit => {}
                (Some(_), Some(_)) => {
                    log::debug!("filtering decoy size: '{}'", text);
                    return true;
                }
                _ => {}
            }
        }
        false
    }
}

/// Enumerates variation controls from the live DOM.
pub struct Discoverer<'a, I> {
    page: &'a I,
    filter: SizeFilter,
}

impl<'a, I: PageInspector> Discoverer<'a, I> {
    pub fn new(page: &'a I, filter: SizeFilter) -> Self {
        Self { page, filter }
    }

    pub fn filter(&self) -> &SizeFilter {
        &self.filter
    }

    /// All selectable variation options in document order per axis.
    pub fn discover(&self) -> Vec<VariationOption> {
        let mut options = Vec::new();
        options.extend(self.swatch_options(OptionKind::Color));
        options.extend(self.swatch_options(OptionKind::Size));
        options.extend(self.size_button_options());
        options.extend(self.dropdown_entries(OptionKind::Color, false));
        options.extend(self.dropdown_entries(OptionKind::Size, false));

        let colors = options.iter().filter(|o| o.kind == OptionKind::Color).count();
        let sizes = options.len() - colors;
        log::debug!("discovered {} colors and {} sizes after filtering", colors, sizes);
        options
    }

    /// Re-acquire size options from the live DOM, in the same precedence
    /// order as initial discovery: swatch items, then buttons, then enabled
    /// drop-down entries.
    pub fn discover_sizes(&self) -> Vec<VariationOption> {
        let swatches = self.swatch_options(OptionKind::Size);
        if !swatches.is_empty() {
            return swatches;
        }
        let buttons = self.size_button_options();
        if !buttons.is_empty() {
            return buttons;
        }
        self.dropdown_entries(OptionKind::Size, true)
    }

    fn swatch_options(&self, kind: OptionKind) -> Vec<VariationOption> {
        let mut out = Vec::new();
        for (ordinal, node) in self.page.query_all(&selectors::swatch_items(kind)).into_iter().enumerate() {
            let name = self
                .page
                .attribute(node, "title")
                .or_else(|| self.page.attribute(node, "data-defaultasin"))
                .or_else(|| self.page.text(node).map(|t| t.trim().to_string()))
                .unwrap_or_default();
            if name.is_empty() || self.page.has_class(node, "unselectable") {
                continue;
            }
            if kind == OptionKind::Size && self.filter.excludes(&name) {
                continue;
            }

            out.push(VariationOption {
                name,
                kind,
                available: self.control_available(node),
                handle: node,
                style: ControlStyle::ListItem,
                ordinal,
                price_hint: self.price_hint(node),
            });
        }
        out
    }

    fn size_button_options(&self) -> Vec<VariationOption> {
        let mut nodes = Vec::new();
        let mut seen = HashSet::new();
        for locator in selectors::size_buttons_in_container() {
            for node in self.page.query_all(&locator) {
                if seen.insert(node) {
                    nodes.push(node);
                }
            }
        }

        let standalone = nodes.is_empty();
        if standalone {
            nodes = self.page.query_all(&selectors::standalone_size_buttons());
            log::debug!("found {} standalone size buttons", nodes.len());
        }

        let mut out = Vec::new();
        for (ordinal, node) in nodes.into_iter().enumerate() {
            let (name, style) = if standalone && self.is_standalone_span(node) {
                (self.standalone_label(node), ControlStyle::StandaloneButton)
            } else {
                (self.contained_button_label(node), ControlStyle::PushButton)
            };

            if name.is_empty() || self.filter.excludes(&name) {
                continue;
            }

            out.push(VariationOption {
                name,
                kind: OptionKind::Size,
                available: !self.button_disabled(node),
                handle: node,
                style,
                ordinal,
                price_hint: None,
            });
        }
        out
    }

    fn is_standalone_span(&self, node: NodeHandle) -> bool {
        self.page.tag_name(node).as_deref() == Some("span")
            && self
                .page
                .attribute(node, "id")
                .is_some_and(|id| id.starts_with(selectors::STANDALONE_SIZE_PREFIX))
    }

    fn standalone_label(&self, node: NodeHandle) -> String {
        let from_inner = self
            .page
            .query_within(node, &selectors::button_text())
            .into_iter()
            .next()
            .and_then(|inner| self.page.text(inner))
            .map(|raw| standalone_button_label(&raw))
            .unwrap_or_default();
        if !from_inner.is_empty() {
            return from_inner;
        }

        // Fallback: the inner input's aria-labelledby names the label element.
        self.page
            .query_within(node, &Locator::new(Step::tag("input")))
            .into_iter()
            .next()
            .and_then(|input| self.page.attribute(input, "aria-labelledby"))
            .and_then(|label_id| self.page.query(&Locator::id(label_id)))
            .and_then(|label| self.page.text(label))
            .map(|t| t.trim().to_string())
            .unwrap_or_default()
    }

    fn contained_button_label(&self, node: NodeHandle) -> String {
        let mut raw = None;
        for ancestor in selectors::button_label_ancestors() {
            if let Some(holder) = self.page.closest(node, &ancestor) {
                raw = self
                    .page
                    .attribute(holder, "title")
                    .filter(|t| !t.trim().is_empty())
                    .or_else(|| self.page.text(holder))
                    .filter(|t| !t.trim().is_empty());
                if raw.is_some() {
                    break;
                }
            }
        }
        let raw = raw
            .or_else(|| self.page.attribute(node, "value"))
            .or_else(|| self.page.attribute(node, "aria-label"))
            .unwrap_or_default();
        clean_control_label(&raw)
    }

    fn button_disabled(&self, node: NodeHandle) -> bool {
        self.page.attribute(node, "disabled").is_some()
            || self.page.attribute(node, "aria-disabled").as_deref() == Some("true")
            || self.page.has_class(node, "a-button-unavailable")
            || self.page.has_class(node, "a-button-disabled")
    }

    fn dropdown_entries(&self, kind: OptionKind, enabled_only: bool) -> Vec<VariationOption> {
        let mut out = Vec::new();
        for (ordinal, node) in self
            .page
            .query_all(&selectors::dropdown_options(kind))
            .into_iter()
            .enumerate()
        {
            let value = self.page.attribute(node, "value").unwrap_or_default();
            if value.is_empty() {
                continue;
            }
            let name = self.page.text(node).map(|t| t.trim().to_string()).unwrap_or_default();
            let disabled = self.page.attribute(node, "disabled").is_some();
            if enabled_only && disabled {
                continue;
            }
            if kind == OptionKind::Size && self.filter.excludes(&name) {
                continue;
            }

            out.push(VariationOption {
                name,
                kind,
                available: !disabled,
                handle: node,
                style: ControlStyle::DropDown,
                ordinal,
                price_hint: None,
            });
        }
        out
    }

    fn control_available(&self, node: NodeHandle) -> bool {
        if self.page.has_class(node, "unselectable") || self.page.has_class(node, "unavailable") {
            return false;
        }
        if self.page.attribute(node, "aria-disabled").as_deref() == Some("true") {
            return false;
        }
        if let Some(item) = self.page.closest(node, &Step::tag("li")) {
            if self.page.has_class(item, "unselectable") || self.page.has_class(item, "unavailable") {
                return false;
            }
        }
        true
    }

    fn price_hint(&self, node: NodeHandle) -> Option<String> {
        for locator in selectors::swatch_price_hints() {
            if let Some(text) = self
                .page
                .query_within(node, &locator)
                .into_iter()
                .next()
                .and_then(|hint| self.page.text(hint))
            {
                let text = text.trim().to_string();
                if !text.is_empty() {
                    return Some(text);
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
    fn test_size_filter_excludes_other_quantities() {
        let filter = SizeFilter::new("14oz");
        assert!(filter.excludes("7oz"));
        assert!(filter.excludes("7 oz"));
        assert!(filter.excludes("7-oz"));
        assert!(filter.excludes("7.0oz"));
        assert!(filter.excludes("(7 oz)"));
        assert!(filter.excludes("12 ounce"));
        assert!(!filter.excludes("14oz"));
        assert!(!filter.excludes("14 oz"));
        assert!(!filter.excludes("White"));
    }

    #[test]
    fn test_size_filter_excludes_other_units() {
        let filter = SizeFilter::new("14oz");
        assert!(filter.excludes("400ml"));
        assert!(filter.excludes("14 ml"));
    }

    #[test]
    fn test_size_filter_mixed_text() {
        let filter = SizeFilter::new("14oz");
        assert!(filter.excludes("White - 7oz"));
        assert!(!filter.excludes("White - 14oz"));
    }

    #[test]
    fn test_size_filter_unparsable_canonical_is_permissive() {
        let filter = SizeFilter::new("One Size");
        assert!(!filter.excludes("7oz"));
        assert!(!filter.excludes("Large"));
    }
}
