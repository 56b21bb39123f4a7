use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::page::NodeHandle;

/// Stable 10-character alphanumeric product code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Validate and wrap a raw code. Codes are exactly ten uppercase
    /// alphanumeric characters.
    pub fn new(raw: &str) -> Option<Self> {
        let valid = raw.len() == 10
            && raw.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A price as read off the page: the raw text plus its parsed numeric value.
///
/// Unparsable prices keep `numeric: None` and sort after everything else so
/// they can never be reported as cheapest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub raw: String,
    pub numeric: Option<f64>,
}

impl Money {
    /// Parse a formatted price string ("$1,299.99" and similar).
    pub fn parse(raw: &str) -> Self {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
        let numeric = digits.parse::<f64>().ok().filter(|n| n.is_finite());
        Self { raw: raw.trim().to_string(), numeric }
    }

    /// Key for price ordering; unparsable values sort last.
    pub fn sort_key(&self) -> f64 {
        self.numeric.unwrap_or(f64::INFINITY)
    }
}

const OUT_OF_STOCK: &str = "out-of-stock";

/// Price field of a scan result: either a listed price or the out-of-stock
/// marker (serialized as the string `"out-of-stock"`).
#[derive(Debug, Clone, PartialEq)]
pub enum PriceTag {
    Listed(Money),
    OutOfStock,
}

impl PriceTag {
    pub fn sort_key(&self) -> f64 {
        match self {
            PriceTag::Listed(money) => money.sort_key(),
            PriceTag::OutOfStock => f64::INFINITY,
        }
    }
}

impl Serialize for PriceTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PriceTag::Listed(money) => money.serialize(serializer),
            PriceTag::OutOfStock => serializer.serialize_str(OUT_OF_STOCK),
        }
    }
}

impl<'de> Deserialize<'de> for PriceTag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) if s == OUT_OF_STOCK => Ok(PriceTag::OutOfStock),
            other => serde_json::from_value::<Money>(other)
                .map(PriceTag::Listed)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Structured snapshot of the page at one instant. Pure function of DOM
/// state; never mutated after capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,

    /// Currently selected variation, e.g. "White - 14oz". Empty when no
    /// variation controls are present.
    #[serde(default)]
    pub variation_label: String,

    /// Code of the variant currently loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<ProductId>,

    /// Code shared by all variants of the parent product. History is keyed
    /// by this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ProductId>,

    pub captured_at: DateTime<Utc>,

    pub source_url: String,
}

/// Which variation axis an option belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Color,
    Size,
}

/// The markup shape of a variation control, which determines how the driver
/// interacts with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlStyle {
    /// Swatch list item; activated by click.
    ListItem,
    /// Radio/button inside the axis container; activated by click.
    PushButton,
    /// Span button identified only by an id prefix; a plain activation is not
    /// always honored by this layout.
    StandaloneButton,
    /// `<option>` entry; selected and change-notified.
    DropDown,
}

/// One selectable variation control, normalized from the live DOM.
///
/// `handle` points into live page state and may go stale after any re-render;
/// discovery must be re-run rather than reusing old descriptors.
#[derive(Debug, Clone)]
pub struct VariationOption {
    pub name: String,
    pub kind: OptionKind,
    pub available: bool,
    pub handle: NodeHandle,
    pub style: ControlStyle,
    pub ordinal: usize,
    /// Per-option inline price fragment, used as a fallback when main-price
    /// extraction comes up empty after selection.
    pub price_hint: Option<String>,
}

/// One recorded outcome for an attempted variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub variation_label: String,
    pub price: PriceTag,
    pub available: bool,
    pub snapshot: ProductSnapshot,
}

impl ScanResult {
    pub fn priced(label: impl Into<String>, price: Money, snapshot: ProductSnapshot) -> Self {
        Self { variation_label: label.into(), price: PriceTag::Listed(price), available: true, snapshot }
    }

    pub fn out_of_stock(label: impl Into<String>, snapshot: ProductSnapshot) -> Self {
        Self { variation_label: label.into(), price: PriceTag::OutOfStock, available: false, snapshot }
    }

    pub fn is_out_of_stock(&self) -> bool {
        !self.available || self.price == PriceTag::OutOfStock
    }
}
