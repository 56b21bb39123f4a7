//! Product identifier resolution.
//!
//! History and in-progress-scan state are keyed by the parent product code,
//! so every variant page of one product must resolve to the same value. The
//! parent is resolved through an ordered fallback chain; the variant's own
//! code is the last resort.

use std::sync::OnceLock;

use regex::Regex;

use crate::page::PageInspector;
use crate::product::ProductId;
use crate::selectors;

fn dp_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/dp/([A-Z0-9]{10})").expect("valid regex"))
}

fn cross_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)twister[_-]?([A-Z0-9]{10})").expect("valid regex"))
}

fn parent_param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)[?&]parent[_-]?asin=([A-Z0-9]{10})").expect("valid regex"))
}

/// Code of the variant currently loaded, from the page URL.
pub fn item_id_from_url(url: &str) -> Option<ProductId> {
    dp_code_re()
        .captures(url)
        .and_then(|c| ProductId::new(c.get(1)?.as_str()))
}

/// Parent code carried in the URL's cross-reference parameter, when present.
pub fn parent_id_from_url(url: &str) -> Option<ProductId> {
    let capture = |re: &Regex| {
        re.captures(url)
            .and_then(|c| c.get(1).map(|m| m.as_str().to_uppercase()))
            .and_then(|code| ProductId::new(&code))
    };
    capture(cross_ref_re()).or_else(|| capture(parent_param_re()))
}

/// Resolve the parent product code through the full fallback chain:
/// cross-reference URL parameter, page metadata, DOM attribute, canonical
/// link, and finally the variant's own code.
pub fn resolve_parent_id<I: PageInspector>(page: &I) -> Option<ProductId> {
    let url = page.page_url();

    if let Some(id) = parent_id_from_url(&url) {
        log::debug!("parent id from cross-reference parameter: {}", id);
        return Some(id);
    }

    if let Some(id) = page
        .metadata(selectors::PARENT_ID_METADATA_KEY)
        .and_then(|v| ProductId::new(v.trim()))
    {
        log::debug!("parent id from page metadata: {}", id);
        return Some(id);
    }

    if let Some(id) = page
        .query(&selectors::parent_id_attribute())
        .and_then(|node| page.attribute(node, "data-parent-asin"))
        .and_then(|v| ProductId::new(v.trim()))
    {
        log::debug!("parent id from DOM attribute: {}", id);
        return Some(id);
    }

    if let Some(id) = page
        .query(&selectors::canonical_link())
        .and_then(|node| page.attribute(node, "href"))
        .and_then(|href| item_id_from_url(&href))
    {
        log::debug!("parent id from canonical link: {}", id);
        return Some(id);
    }

    let fallback = item_id_from_url(&url);
    if let Some(id) = &fallback {
        log::debug!("no parent code found, using variant code {}", id);
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_from_url() {
        let id = item_id_from_url("https://shop.example/dp/B00EXAMPLE?th=1");
        assert_eq!(id, ProductId::new("B00EXAMPLE"));

        assert!(item_id_from_url("https://shop.example/gp/help").is_none());
        assert!(item_id_from_url("https://shop.example/dp/short").is_none());
    }

    #[test]
    fn test_parent_id_from_cross_reference() {
        let id = parent_id_from_url("https://shop.example/dp/B00CHILD00?twister_B00PARENT0");
        assert_eq!(id, ProductId::new("B00PARENT0"));

        let id = parent_id_from_url("https://shop.example/dp/B00CHILD00?parent_asin=B00PARENT0");
        assert_eq!(id, ProductId::new("B00PARENT0"));

        assert!(parent_id_from_url("https://shop.example/dp/B00CHILD00").is_none());
    }
}
