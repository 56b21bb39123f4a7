//! Page inspection capability.
//!
//! The scan core never touches a rendering engine directly: everything it
//! needs from the page goes through the [`PageInspector`] trait: structural
//! queries, text/attribute reads, closest-ancestor lookups, and the two
//! mutation primitives ("activate" and "set-selected-and-notify"). This keeps
//! the orchestrator testable against [`fake::FakeProductPage`] and lets the
//! `chrome` feature supply a real-browser adapter.

pub mod fake;
pub mod locator;

#[cfg(feature = "chrome")]
pub mod chrome;

pub use locator::{AttrMatch, Locator, Step};

use crate::error::Result;

/// Opaque, non-owning reference to a live element.
///
/// Handles are only valid until the page re-renders the region they point
/// into; after any selection that may re-render, callers must re-query rather
/// than reuse a captured handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub(crate) u64);

/// The primitive capabilities the scan core depends on.
///
/// Implementations are free to resolve queries lazily; a stale handle must
/// simply stop matching (reads return `None`, mutations return an error)
/// rather than resolve to a different element.
pub trait PageInspector {
    /// All elements matching a structural query, in document order.
    fn query_all(&self, locator: &Locator) -> Vec<NodeHandle>;

    /// Elements matching a query scoped to the subtree under `node`.
    fn query_within(&self, node: NodeHandle, locator: &Locator) -> Vec<NodeHandle>;

    /// Full text content of an element, or `None` if the handle is stale.
    fn text(&self, node: NodeHandle) -> Option<String>;

    /// Attribute value of an element.
    fn attribute(&self, node: NodeHandle, name: &str) -> Option<String>;

    /// Lowercase tag name of an element.
    fn tag_name(&self, node: NodeHandle) -> Option<String>;

    /// Nearest ancestor (including the node itself) matching a step.
    fn closest(&self, node: NodeHandle, step: &Step) -> Option<NodeHandle>;

    /// Invoke the platform "activate" action (click) on an element.
    fn activate(&self, node: NodeHandle) -> Result<()>;

    /// Mark a list-style entry selected and emit a change notification on its
    /// containing control.
    fn select_and_notify(&self, node: NodeHandle) -> Result<()>;

    /// Location of the current page.
    fn page_url(&self) -> String;

    /// A page-level metadata value (script-exposed globals and the like).
    fn metadata(&self, key: &str) -> Option<String>;

    /// First element matching a query.
    fn query(&self, locator: &Locator) -> Option<NodeHandle> {
        self.query_all(locator).into_iter().next()
    }

    /// Whether an element carries a specific class.
    fn has_class(&self, node: NodeHandle, class: &str) -> bool {
        self.attribute(node, "class")
            .is_some_and(|c| c.split_whitespace().any(|x| x == class))
    }
}
