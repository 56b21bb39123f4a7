//! Structural contract with the target site's product-page markup.
//!
//! Every query the extractor and discoverer issue is defined here as a
//! [`Locator`] constructor, ordered most-reliable-first where order matters.
//! The rest of the crate depends on these shapes, not on raw selector
//! strings.

use crate::page::{AttrMatch, Locator, Step};
use crate::product::OptionKind;

/// Page-metadata key that exposes the parent product code.
pub const PARENT_ID_METADATA_KEY: &str = "ue_pti";

/// Id prefix of the non-standard standalone size-button layout.
pub const STANDALONE_SIZE_PREFIX: &str = "size_name_";

fn axis_container(kind: OptionKind) -> &'static str {
    match kind {
        OptionKind::Color => "variation_color_name",
        OptionKind::Size => "variation_size_name",
    }
}

/// Title candidates, most specific first.
pub fn title_candidates() -> Vec<Locator> {
    vec![Locator::id("productTitle"), Locator::id("title")]
}

/// Main-price candidates in reliability order: buying-box prices first (they
/// update fastest after a selection), generic price blocks last.
pub fn price_candidates() -> Vec<Locator> {
    let offscreen = || Step::class("a-offscreen");
    let a_price = || Step::class("a-price");
    vec![
        Locator::id("corePriceDisplay_desktop_feature_div").descendant(a_price()).descendant(offscreen()),
        Locator::id("corePrice_desktop").descendant(a_price()).descendant(offscreen()),
        Locator::new(Step::class("priceToPay")).descendant(offscreen()),
        Locator::id("apex_desktop").descendant(a_price()).descendant(offscreen()),
        Locator::id("buybox").descendant(a_price()).descendant(offscreen()),
        Locator::new(Step::default().with_attr(
            "data-csa-c-content-id",
            AttrMatch::Exact("price-inside-buybox".to_string()),
        ))
        .descendant(offscreen()),
        Locator::id("apex_desktop_newAccordionRow").descendant(a_price()).descendant(offscreen()),
        Locator::id("corePrice_feature_div").descendant(a_price()).descendant(offscreen()),
        Locator::id("price_inside_buybox"),
        Locator::id("priceblock_ourprice"),
        Locator::id("priceblock_dealprice"),
    ]
}

/// Ancestors that disqualify a price match: per-swatch and per-variation
/// price fragments must never be read as the main selected price.
pub fn price_rejection_ancestors() -> Vec<Step> {
    vec![
        Step::default().with_attr("id", AttrMatch::Contains("variation".to_string())),
        Step::default().with_attr("class", AttrMatch::Contains("variation".to_string())),
        Step::tag("li").with_attr("data-defaultasin", AttrMatch::Present),
        Step::class("twister-plus-buying-options-price-data"),
    ]
}

/// Wrapper around a split price display; its offscreen child carries the full
/// formatted value when the visible text lacks a fractional component.
pub fn price_wrapper() -> Step {
    Step::class("a-price")
}

/// Offscreen full-price fragment inside a [`price_wrapper`].
pub fn full_price_fragment() -> Locator {
    Locator::new(Step::class("a-offscreen"))
}

/// Containers examined by the full-text currency fallback.
pub fn priceish_containers() -> Vec<Locator> {
    vec![
        Locator::new(Step::default().with_attr("class", AttrMatch::Contains("price".to_string()))),
        Locator::new(Step::default().with_attr("id", AttrMatch::Contains("price".to_string()))),
    ]
}

/// Selected-option candidates for one axis, most specific first.
pub fn selected_label_candidates(kind: OptionKind) -> Vec<Locator> {
    let container = axis_container(kind);
    vec![
        Locator::id(container).descendant(Step::class("selection")),
        Locator::id(container).descendant(Step::tag("li").with_class("swatchselect")),
        Locator::id(container).descendant(Step::tag("li").with_class("selected")),
        Locator::id(container)
            .descendant(Step::tag("li").with_attr("class", AttrMatch::Contains("select".to_string()))),
        Locator::id(container)
            .descendant(Step::tag("select"))
            .descendant(Step::tag("option").checked()),
    ]
}

/// Selected standalone size button (span-button layout).
pub fn selected_standalone_size() -> Vec<Locator> {
    vec![
        Locator::new(
            Step::default()
                .with_id_prefix(STANDALONE_SIZE_PREFIX)
                .with_class("a-button-selected"),
        ),
        Locator::new(Step::default().with_id_prefix(STANDALONE_SIZE_PREFIX))
            .descendant(Step::class("a-button-selected")),
    ]
}

/// Swatch list items for one axis.
pub fn swatch_items(kind: OptionKind) -> Locator {
    Locator::id(axis_container(kind)).descendant(Step::tag("li"))
}

/// Push-button size controls inside the axis container.
pub fn size_buttons_in_container() -> Vec<Locator> {
    let container = axis_container(OptionKind::Size);
    vec![
        Locator::id(container)
            .descendant(Step::tag("input").with_attr("type", AttrMatch::Exact("radio".to_string()))),
        Locator::id(container).descendant(Step::tag("button")),
        Locator::id(container).descendant(Step::class("a-button-input")),
    ]
}

/// Standalone span-button size controls, excluding announcement shadows.
pub fn standalone_size_buttons() -> Locator {
    Locator::new(
        Step::default()
            .with_id_prefix(STANDALONE_SIZE_PREFIX)
            .with_attr("id", AttrMatch::NotSuffix("-announce".to_string())),
    )
}

/// Drop-down options for one axis.
pub fn dropdown_options(kind: OptionKind) -> Locator {
    Locator::id(axis_container(kind))
        .descendant(Step::tag("select"))
        .descendant(Step::tag("option"))
}

/// Any variation control for one axis (presence probe).
pub fn axis_present(kind: OptionKind) -> Vec<Locator> {
    vec![
        Locator::id(axis_container(kind)).descendant(Step::tag("li")),
        Locator::id(axis_container(kind)).descendant(Step::tag("select")),
    ]
}

/// Per-option inline price fragments inside a swatch.
pub fn swatch_price_hints() -> Vec<Locator> {
    vec![
        Locator::new(Step::class("a-button-text")).descendant(Step::class("a-size-base")),
        Locator::new(Step::class("twister-plus-buying-options-price-data")),
    ]
}

/// Inner label of a button control.
pub fn button_text() -> Locator {
    Locator::new(Step::class("a-button-text"))
}

/// Ancestors that carry a button's label when the control itself has none.
pub fn button_label_ancestors() -> Vec<Step> {
    vec![
        Step::tag("li"),
        Step::class("a-button-group"),
        Step::default().with_attr("data-csa-c-element-id", AttrMatch::Present),
    ]
}

/// The size control the page currently reports as selected, for final
/// corroboration before trusting an extraction.
pub fn checked_size_controls() -> Vec<Locator> {
    let container = axis_container(OptionKind::Size);
    vec![
        Locator::id(container).descendant(
            Step::tag("input")
                .with_attr("type", AttrMatch::Exact("radio".to_string()))
                .checked(),
        ),
        Locator::id(container).descendant(Step::class("a-button-selected")),
    ]
}

/// Element exposing the parent product code as a data attribute.
pub fn parent_id_attribute() -> Locator {
    Locator::new(Step::default().with_attr("data-parent-asin", AttrMatch::Present))
}

/// Canonical link element.
pub fn canonical_link() -> Locator {
    Locator::new(
        Step::tag("link").with_attr("rel", AttrMatch::Exact("canonical".to_string())),
    )
}
