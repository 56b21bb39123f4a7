//! In-memory product page double.
//!
//! [`FakeProductPage`] models a product page as a small catalog (axes,
//! per-combination stock, substitution rules) and re-renders an element tree
//! from that state after every interaction. The tree mirrors the markup
//! shapes in [`crate::selectors`], so extraction and discovery run the exact
//! same queries against it as against a real page.
//!
//! Handle staleness is modeled per region: color controls keep their identity
//! across renders, while size-region handles are invalidated whenever the
//! selected color changes, matching the re-render behavior of the live site.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Result, ScanError};
use crate::page::{Locator, NodeHandle, PageInspector, Step};
use crate::page::locator::AttrMatch;
use crate::product::OptionKind;

/// Markup shape used for the size axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeLayout {
    /// Swatch list items inside the size container.
    SwatchList,
    /// Radio-backed push buttons inside the size container.
    PushButtons,
    /// Prefix-id span buttons outside any axis container.
    Standalone,
    /// A `<select>` element inside the size container.
    DropDown,
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    hint: Option<String>,
    selectable: bool,
}

#[derive(Debug, Clone)]
struct Element {
    handle: u64,
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    parent: Option<usize>,
    action: Option<(OptionKind, String)>,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }
}

struct Rendered {
    elements: Vec<Element>,
    index_of: HashMap<u64, usize>,
}

/// Accumulates one render pass. Owns the key-to-handle map while building so
/// state methods stay callable mid-render; the map is handed back afterwards.
struct TreeBuilder {
    elements: Vec<Element>,
    keys: HashMap<String, u64>,
    next: u64,
}

impl TreeBuilder {
    fn push(
        &mut self,
        parent: Option<usize>,
        key: String,
        tag: &str,
        attrs: Vec<(String, String)>,
        text: &str,
        action: Option<(OptionKind, String)>,
    ) -> usize {
        let next = &mut self.next;
        let handle = *self.keys.entry(key).or_insert_with(|| {
            let h = *next;
            *next += 1;
            h
        });
        self.elements.push(Element {
            handle,
            tag: tag.to_string(),
            attrs,
            text: text.to_string(),
            parent,
            action,
        });
        self.elements.len() - 1
    }
}

fn attr(name: &str, value: impl Into<String>) -> (String, String) {
    (name.to_string(), value.into())
}

struct PageState {
    title: String,
    url: String,
    metadata: HashMap<String, String>,
    canonical: Option<String>,
    parent_attr: Option<String>,

    colors: Vec<Entry>,
    sizes: Vec<Entry>,
    size_layout: SizeLayout,

    /// Two-axis stock: price per (color, size) combination. A combination
    /// absent from this map is not carried.
    prices: HashMap<(String, String), String>,
    /// Single-axis stock: price per option name.
    single_prices: HashMap<String, String>,
    /// Single-axis options that select fine but render no main price block.
    hint_only: HashSet<String>,
    /// Selecting the key lands on the value instead.
    substitutions: HashMap<String, String>,

    selected_color: Option<String>,
    selected_size: Option<String>,
    truncated_price: bool,

    /// Bumped on every color change; size-region element keys embed it, so
    /// size handles captured before the change dangle afterwards.
    color_gen: u64,
    next_handle: u64,
    handle_keys: HashMap<String, u64>,
    interactions: u64,
    rendered: Option<Rendered>,
}

impl PageState {
    fn two_axis(&self) -> bool {
        !self.colors.is_empty() && !self.sizes.is_empty()
    }

    fn stocked(&self, color: &str, size: &str) -> bool {
        self.prices.contains_key(&(color.to_string(), size.to_string()))
    }

    fn color_available(&self, entry: &Entry) -> bool {
        if self.two_axis() {
            self.sizes.iter().any(|s| self.stocked(&entry.name, &s.name))
        } else {
            entry.selectable
        }
    }

    fn size_available(&self, entry: &Entry) -> bool {
        if self.two_axis() {
            self.selected_color
                .as_deref()
                .is_some_and(|c| self.stocked(c, &entry.name))
        } else {
            entry.selectable
        }
    }

    fn current_price(&self) -> Option<String> {
        if self.two_axis() {
            let color = self.selected_color.as_deref()?;
            let size = self.selected_size.as_deref()?;
            return self.prices.get(&(color.to_string(), size.to_string())).cloned();
        }
        let selected = if self.colors.is_empty() {
            self.selected_size.as_deref()?
        } else {
            self.selected_color.as_deref()?
        };
        if self.hint_only.contains(selected) {
            return None;
        }
        self.single_prices.get(selected).cloned()
    }

    fn apply_select(&mut self, kind: OptionKind, name: &str) {
        self.interactions += 1;
        let actual = self
            .substitutions
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string());
        match kind {
            OptionKind::Color => {
                self.selected_color = Some(actual.clone());
                self.color_gen += 1;
                if self.two_axis() {
                    let keeps = self
                        .selected_size
                        .as_deref()
                        .is_some_and(|s| self.stocked(&actual, s));
                    if !keeps {
                        // Auto-substitution: the page defaults to whatever
                        // size this color actually carries.
                        self.selected_size = self
                            .sizes
                            .iter()
                            .map(|e| e.name.clone())
                            .find(|s| self.stocked(&actual, s));
                    }
                }
            }
            OptionKind::Size => self.selected_size = Some(actual),
        }
        self.rendered = None;
    }

    fn render(&mut self) {
        if self.rendered.is_some() {
            return;
        }
        let mut b = TreeBuilder {
            elements: Vec::new(),
            keys: std::mem::take(&mut self.handle_keys),
            next: self.next_handle,
        };

        let html = b.push(None, "html".into(), "html", vec![], "", None);
        let head = b.push(Some(html), "head".into(), "head", vec![], "", None);
        if let Some(href) = &self.canonical {
            b.push(
                Some(head),
                "canonical".into(),
                "link",
                vec![attr("rel", "canonical"), attr("href", href.clone())],
                "",
                None,
            );
        }
        let body = b.push(Some(html), "body".into(), "body", vec![], "", None);
        b.push(
            Some(body),
            "title".into(),
            "span",
            vec![attr("id", "productTitle")],
            &self.title,
            None,
        );
        if let Some(parent) = &self.parent_attr {
            b.push(
                Some(body),
                "parent-attr".into(),
                "div",
                vec![attr("data-parent-asin", parent.clone())],
                "",
                None,
            );
        }

        if !self.colors.is_empty() {
            let container = b.push(
                Some(body),
                "color-axis".into(),
                "div",
                vec![attr("id", "variation_color_name")],
                "",
                None,
            );
            if let Some(selected) = self.selected_color.clone() {
                b.push(
                    Some(container),
                    "color-selection".into(),
                    "span",
                    vec![attr("class", "selection")],
                    &selected,
                    None,
                );
            }
            let list = b.push(Some(container), "color-list".into(), "ul", vec![], "", None);
            for entry in &self.colors {
                let mut class = String::from("swatch");
                if self.selected_color.as_deref() == Some(entry.name.as_str()) {
                    class.push_str(" swatchselect");
                }
                if !self.color_available(entry) {
                    class.push_str(" unavailable");
                }
                let li = b.push(
                    Some(list),
                    format!("color:{}", entry.name),
                    "li",
                    vec![attr("title", entry.name.clone()), attr("class", class)],
                    "",
                    Some((OptionKind::Color, entry.name.clone())),
                );
                if let Some(hint) = &entry.hint {
                    let wrap = b.push(
                        Some(li),
                        format!("color-hint-wrap:{}", entry.name),
                        "span",
                        vec![attr("class", "a-button-text")],
                        "",
                        None,
                    );
                    b.push(
                        Some(wrap),
                        format!("color-hint:{}", entry.name),
                        "span",
                        vec![attr("class", "a-size-base")],
                        hint,
                        None,
                    );
                }
            }
        }

        if !self.sizes.is_empty() {
            self.render_size_axis(&mut b, body);
        }
        self.render_price(&mut b, body);

        let index_of = b
            .elements
            .iter()
            .enumerate()
            .map(|(i, e)| (e.handle, i))
            .collect();
        self.handle_keys = b.keys;
        self.next_handle = b.next;
        self.rendered = Some(Rendered { elements: b.elements, index_of });
    }

    fn render_size_axis(&self, b: &mut TreeBuilder, body: usize) {
        let generation = self.color_gen;
        let sizes = self.sizes.clone();

        if self.size_layout == SizeLayout::Standalone {
            for (i, entry) in sizes.iter().enumerate() {
                let selected = self.selected_size.as_deref() == Some(entry.name.as_str());
                let mut class = String::from("a-button a-button-toggle");
                if selected {
                    class.push_str(" a-button-selected");
                }
                if !self.size_available(entry) {
                    class.push_str(" a-button-unavailable");
                }
                let button = b.push(
                    Some(body),
                    format!("size-standalone:{}:{}", generation, entry.name),
                    "span",
                    vec![attr("id", format!("size_name_{}", i)), attr("class", class)],
                    "",
                    Some((OptionKind::Size, entry.name.clone())),
                );
                b.push(
                    Some(button),
                    format!("size-standalone-text:{}:{}", generation, entry.name),
                    "span",
                    vec![attr("class", "a-button-text")],
                    &entry.name,
                    None,
                );
                b.push(
                    Some(button),
                    format!("size-standalone-announce:{}:{}", generation, entry.name),
                    "span",
                    vec![attr("id", format!("size_name_{}-announce", i))],
                    &entry.name,
                    None,
                );
            }
            return;
        }

        let container = b.push(
            Some(body),
            "size-axis".into(),
            "div",
            vec![attr("id", "variation_size_name")],
            "",
            None,
        );
        match self.size_layout {
            SizeLayout::SwatchList => {
                if let Some(selected) = self.selected_size.clone() {
                    b.push(
                        Some(container),
                        "size-selection".into(),
                        "span",
                        vec![attr("class", "selection")],
                        &selected,
                        None,
                    );
                }
                let list = b.push(Some(container), "size-list".into(), "ul", vec![], "", None);
                for entry in &sizes {
                    let mut class = String::from("swatch");
                    if self.selected_size.as_deref() == Some(entry.name.as_str()) {
                        class.push_str(" swatchselect");
                    }
                    if !self.size_available(entry) {
                        class.push_str(" unavailable");
                    }
                    b.push(
                        Some(list),
                        format!("size:{}:{}", generation, entry.name),
                        "li",
                        vec![attr("title", entry.name.clone()), attr("class", class)],
                        "",
                        Some((OptionKind::Size, entry.name.clone())),
                    );
                }
            }
            SizeLayout::PushButtons => {
                if let Some(selected) = self.selected_size.clone() {
                    b.push(
                        Some(container),
                        "size-selection".into(),
                        "span",
                        vec![attr("class", "selection")],
                        &selected,
                        None,
                    );
                }
                for entry in &sizes {
                    let selected = self.selected_size.as_deref() == Some(entry.name.as_str());
                    let available = self.size_available(entry);
                    let group = b.push(
                        Some(container),
                        format!("size-group:{}:{}", generation, entry.name),
                        "span",
                        vec![
                            attr("class", "a-button-group"),
                            attr("data-csa-c-element-id", entry.name.clone()),
                        ],
                        "",
                        None,
                    );
                    let mut class = String::from("a-button a-button-toggle");
                    if selected {
                        class.push_str(" a-button-selected");
                    }
                    if !available {
                        class.push_str(" a-button-unavailable");
                    }
                    let button = b.push(
                        Some(group),
                        format!("size-btn:{}:{}", generation, entry.name),
                        "span",
                        vec![attr("class", class)],
                        "",
                        None,
                    );
                    let mut input_attrs = vec![
                        attr("class", "a-button-input"),
                        attr("type", "radio"),
                        attr("name", "size_name"),
                    ];
                    if selected {
                        input_attrs.push(attr("checked", "checked"));
                    }
                    if !available {
                        input_attrs.push(attr("disabled", "disabled"));
                    }
                    b.push(
                        Some(button),
                        format!("size-input:{}:{}", generation, entry.name),
                        "input",
                        input_attrs,
                        "",
                        Some((OptionKind::Size, entry.name.clone())),
                    );
                    b.push(
                        Some(button),
                        format!("size-btn-text:{}:{}", generation, entry.name),
                        "span",
                        vec![attr("class", "a-button-text")],
                        &entry.name,
                        None,
                    );
                }
            }
            SizeLayout::DropDown => {
                let select = b.push(
                    Some(container),
                    "size-select".into(),
                    "select",
                    vec![attr("name", "dropdown_selected_size_name")],
                    "",
                    None,
                );
                b.push(
                    Some(select),
                    "size-opt-placeholder".into(),
                    "option",
                    vec![attr("value", "")],
                    "Select Size",
                    None,
                );
                for (i, entry) in sizes.iter().enumerate() {
                    let mut attrs = vec![attr("value", (i + 1).to_string())];
                    if self.selected_size.as_deref() == Some(entry.name.as_str()) {
                        attrs.push(attr("selected", "selected"));
                    }
                    if !self.size_available(entry) {
                        attrs.push(attr("disabled", "disabled"));
                    }
                    b.push(
                        Some(select),
                        format!("size-opt:{}:{}", generation, entry.name),
                        "option",
                        attrs,
                        &entry.name,
                        Some((OptionKind::Size, entry.name.clone())),
                    );
                }
            }
            SizeLayout::Standalone => unreachable!(),
        }
    }

    fn render_price(&self, b: &mut TreeBuilder, body: usize) {
        let Some(price) = self.current_price() else { return };

        if self.truncated_price {
            // Split display: the visible block shows only the whole-dollar
            // part, the full value lives in an offscreen sibling.
            let whole = price.split('.').next().unwrap_or(&price).to_string();
            let wrap = b.push(
                Some(body),
                "price-wrap".into(),
                "span",
                vec![attr("class", "a-price")],
                "",
                None,
            );
            b.push(
                Some(wrap),
                "price-visible".into(),
                "span",
                vec![attr("id", "price_inside_buybox")],
                &whole,
                None,
            );
            b.push(
                Some(wrap),
                "price-offscreen".into(),
                "span",
                vec![attr("class", "a-offscreen")],
                &price,
                None,
            );
            return;
        }

        let block = b.push(
            Some(body),
            "price-block".into(),
            "div",
            vec![attr("id", "corePriceDisplay_desktop_feature_div")],
            "",
            None,
        );
        let wrap = b.push(
            Some(block),
            "price-wrap".into(),
            "span",
            vec![attr("class", "a-price")],
            "",
            None,
        );
        b.push(
            Some(wrap),
            "price-offscreen".into(),
            "span",
            vec![attr("class", "a-offscreen")],
            &price,
            None,
        );
    }
}

fn step_matches(element: &Element, step: &Step) -> bool {
    if let Some(tag) = &step.tag {
        if element.tag != *tag {
            return false;
        }
    }
    if let Some(id) = &step.id {
        if element.attr("id") != Some(id.as_str()) {
            return false;
        }
    }
    for class in &step.classes {
        let found = element
            .attr("class")
            .is_some_and(|c| c.split_whitespace().any(|x| x == class));
        if !found {
            return false;
        }
    }
    for (name, matcher) in &step.attrs {
        let value = element.attr(name);
        let ok = match matcher {
            AttrMatch::Present => value.is_some(),
            AttrMatch::Exact(v) => value == Some(v.as_str()),
            AttrMatch::Prefix(v) => value.is_some_and(|x| x.starts_with(v.as_str())),
            AttrMatch::Suffix(v) => value.is_some_and(|x| x.ends_with(v.as_str())),
            AttrMatch::Contains(v) => value.is_some_and(|x| x.contains(v.as_str())),
            AttrMatch::NotSuffix(v) => value.map_or(true, |x| !x.ends_with(v.as_str())),
        };
        if !ok {
            return false;
        }
    }
    // The rendered tree records selection state as checked/selected
    // attributes, so the pseudo-state maps onto their presence.
    if step.checked && element.attr("checked").is_none() && element.attr("selected").is_none() {
        return false;
    }
    true
}

fn matches_chain(elements: &[Element], index: usize, steps: &[Step]) -> bool {
    let Some((last, rest)) = steps.split_last() else { return true };
    if !step_matches(&elements[index], last) {
        return false;
    }
    if rest.is_empty() {
        return true;
    }
    let mut parent = elements[index].parent;
    while let Some(p) = parent {
        if matches_chain(elements, p, rest) {
            return true;
        }
        parent = elements[p].parent;
    }
    false
}

fn is_descendant(elements: &[Element], index: usize, ancestor: usize) -> bool {
    let mut parent = elements[index].parent;
    while let Some(p) = parent {
        if p == ancestor {
            return true;
        }
        parent = elements[p].parent;
    }
    false
}

/// Builder for [`FakeProductPage`].
#[derive(Default)]
pub struct FakePageBuilder {
    title: String,
    url: String,
    metadata: HashMap<String, String>,
    canonical: Option<String>,
    parent_attr: Option<String>,
    colors: Vec<Entry>,
    sizes: Vec<Entry>,
    size_layout: Option<SizeLayout>,
    prices: HashMap<(String, String), String>,
    single_prices: HashMap<String, String>,
    hint_only: HashSet<String>,
    substitutions: HashMap<String, String>,
    truncated_price: bool,
}

impl FakePageBuilder {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn canonical(mut self, href: impl Into<String>) -> Self {
        self.canonical = Some(href.into());
        self
    }

    pub fn parent_attr(mut self, id: impl Into<String>) -> Self {
        self.parent_attr = Some(id.into());
        self
    }

    pub fn color(mut self, name: impl Into<String>) -> Self {
        self.colors.push(Entry { name: name.into(), hint: None, selectable: true });
        self
    }

    pub fn color_with_hint(mut self, name: impl Into<String>, hint: impl Into<String>) -> Self {
        self.colors.push(Entry { name: name.into(), hint: Some(hint.into()), selectable: true });
        self
    }

    pub fn size(mut self, name: impl Into<String>) -> Self {
        self.sizes.push(Entry { name: name.into(), hint: None, selectable: true });
        self
    }

    pub fn size_layout(mut self, layout: SizeLayout) -> Self {
        self.size_layout = Some(layout);
        self
    }

    /// Two-axis stock: the given combination is carried at this price.
    pub fn price(
        mut self,
        color: impl Into<String>,
        size: impl Into<String>,
        price: impl Into<String>,
    ) -> Self {
        self.prices.insert((color.into(), size.into()), price.into());
        self
    }

    /// Single-axis stock: the named option is carried at this price.
    pub fn single_price(mut self, name: impl Into<String>, price: impl Into<String>) -> Self {
        self.single_prices.insert(name.into(), price.into());
        self
    }

    /// Single-axis option that selects fine but renders no main price block.
    pub fn hint_only(mut self, name: impl Into<String>) -> Self {
        self.hint_only.insert(name.into());
        self
    }

    /// Mark a single-axis option's control disabled.
    pub fn unavailable(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        for entry in self.colors.iter_mut().chain(self.sizes.iter_mut()) {
            if entry.name == name {
                entry.selectable = false;
            }
        }
        self
    }

    /// Selecting `from` lands on `to` instead.
    pub fn substitute(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.substitutions.insert(from.into(), to.into());
        self
    }

    /// Render the split price display whose visible part lacks cents.
    pub fn truncated_buybox(mut self) -> Self {
        self.truncated_price = true;
        self
    }

    pub fn build(self) -> FakeProductPage {
        let mut state = PageState {
            title: self.title,
            url: self.url,
            metadata: self.metadata,
            canonical: self.canonical,
            parent_attr: self.parent_attr,
            colors: self.colors,
            sizes: self.sizes,
            size_layout: self.size_layout.unwrap_or(SizeLayout::SwatchList),
            prices: self.prices,
            single_prices: self.single_prices,
            hint_only: self.hint_only,
            substitutions: self.substitutions,
            selected_color: None,
            selected_size: None,
            truncated_price: self.truncated_price,
            color_gen: 0,
            next_handle: 1,
            handle_keys: HashMap::new(),
            interactions: 0,
            rendered: None,
        };

        if state.two_axis() {
            state.selected_color = state
                .colors
                .iter()
                .find(|c| state.color_available(c))
                .or_else(|| state.colors.first())
                .map(|c| c.name.clone());
            state.selected_size = state.selected_color.clone().and_then(|c| {
                state.sizes.iter().map(|s| s.name.clone()).find(|s| state.stocked(&c, s))
            });
        } else if !state.colors.is_empty() {
            state.selected_color =
                state.colors.iter().find(|c| c.selectable).map(|c| c.name.clone());
        } else {
            state.selected_size =
                state.sizes.iter().find(|s| s.selectable).map(|s| s.name.clone());
        }

        FakeProductPage { state: Mutex::new(state) }
    }
}

/// Catalog-backed [`PageInspector`] implementation for tests.
pub struct FakeProductPage {
    state: Mutex<PageState>,
}

impl FakeProductPage {
    pub fn builder() -> FakePageBuilder {
        FakePageBuilder::default()
    }

    /// Currently selected (color, size) pair.
    pub fn selected(&self) -> (Option<String>, Option<String>) {
        let state = self.lock();
        (state.selected_color.clone(), state.selected_size.clone())
    }

    /// Number of selection interactions delivered so far.
    pub fn interaction_count(&self) -> u64 {
        self.lock().interactions
    }

    fn lock(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn trigger(&self, node: NodeHandle) -> Result<()> {
        let mut state = self.lock();
        state.render();
        let rendered = state.rendered.as_ref();
        let element = rendered
            .and_then(|r| r.index_of.get(&node.0).copied())
            .and_then(|i| rendered.map(|r| r.elements[i].clone()));
        let Some(element) = element else {
            return Err(ScanError::ElementNotFound(format!("stale handle {}", node.0)));
        };
        let Some((kind, name)) = element.action else {
            return Err(ScanError::InteractionFailed {
                target: element.tag,
                reason: "element is not a variation control".to_string(),
            });
        };
        state.apply_select(kind, &name);
        Ok(())
    }
}

impl PageInspector for FakeProductPage {
    fn query_all(&self, locator: &Locator) -> Vec<NodeHandle> {
        let mut state = self.lock();
        state.render();
        let Some(rendered) = state.rendered.as_ref() else { return Vec::new() };
        (0..rendered.elements.len())
            .filter(|&i| matches_chain(&rendered.elements, i, locator.steps()))
            .map(|i| NodeHandle(rendered.elements[i].handle))
            .collect()
    }

    fn query_within(&self, node: NodeHandle, locator: &Locator) -> Vec<NodeHandle> {
        let mut state = self.lock();
        state.render();
        let Some(rendered) = state.rendered.as_ref() else { return Vec::new() };
        let Some(&scope) = rendered.index_of.get(&node.0) else { return Vec::new() };
        (0..rendered.elements.len())
            .filter(|&i| {
                is_descendant(&rendered.elements, i, scope)
                    && matches_chain(&rendered.elements, i, locator.steps())
            })
            .map(|i| NodeHandle(rendered.elements[i].handle))
            .collect()
    }

    fn text(&self, node: NodeHandle) -> Option<String> {
        let mut state = self.lock();
        state.render();
        let rendered = state.rendered.as_ref()?;
        let index = *rendered.index_of.get(&node.0)?;
        let mut pieces = Vec::new();
        if !rendered.elements[index].text.is_empty() {
            pieces.push(rendered.elements[index].text.clone());
        }
        for i in 0..rendered.elements.len() {
            if is_descendant(&rendered.elements, i, index)
                && !rendered.elements[i].text.is_empty()
            {
                pieces.push(rendered.elements[i].text.clone());
            }
        }
        Some(pieces.join(" "))
    }

    fn attribute(&self, node: NodeHandle, name: &str) -> Option<String> {
        let mut state = self.lock();
        state.render();
        let rendered = state.rendered.as_ref()?;
        let index = *rendered.index_of.get(&node.0)?;
        rendered.elements[index].attr(name).map(str::to_string)
    }

    fn tag_name(&self, node: NodeHandle) -> Option<String> {
        let mut state = self.lock();
        state.render();
        let rendered = state.rendered.as_ref()?;
        let index = *rendered.index_of.get(&node.0)?;
        Some(rendered.elements[index].tag.clone())
    }

    fn closest(&self, node: NodeHandle, step: &Step) -> Option<NodeHandle> {
        let mut state = self.lock();
        state.render();
        let rendered = state.rendered.as_ref()?;
        let mut current = Some(*rendered.index_of.get(&node.0)?);
        while let Some(i) = current {
            if step_matches(&rendered.elements[i], step) {
                return Some(NodeHandle(rendered.elements[i].handle));
            }
            current = rendered.elements[i].parent;
        }
        None
    }

    fn activate(&self, node: NodeHandle) -> Result<()> {
        self.trigger(node)
    }

    fn select_and_notify(&self, node: NodeHandle) -> Result<()> {
        self.trigger(node)
    }

    fn page_url(&self) -> String {
        self.lock().url.clone()
    }

    fn metadata(&self, key: &str) -> Option<String> {
        self.lock().metadata.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_axis_page() -> FakeProductPage {
        FakeProductPage::builder()
            .title("Vacuum Bottle")
            .url("https://shop.example/dp/B00EXAMPLE?th=1")
            .color("White")
            .color("Black")
            .size("14oz")
            .size("7oz")
            .price("White", "14oz", "$12.99")
            .price("White", "7oz", "$6.99")
            .price("Black", "7oz", "$7.49")
            .build()
    }

    #[test]
    fn test_query_by_id() {
        let page = two_axis_page();
        let title = page.query(&Locator::id("productTitle")).unwrap();
        assert_eq!(page.text(title).as_deref(), Some("Vacuum Bottle"));
    }

    #[test]
    fn test_swatch_query_in_document_order() {
        let page = two_axis_page();
        let swatches = page.query_all(
            &Locator::id("variation_color_name").descendant(Step::tag("li")),
        );
        let names: Vec<_> = swatches
            .iter()
            .map(|&n| page.attribute(n, "title").unwrap())
            .collect();
        assert_eq!(names, vec!["White", "Black"]);
    }

    #[test]
    fn test_color_change_substitutes_size_and_invalidates_handles() {
        let page = two_axis_page();
        assert_eq!(page.selected(), (Some("White".into()), Some("14oz".into())));

        let size_lis = page.query_all(
            &Locator::id("variation_size_name").descendant(Step::tag("li")),
        );
        assert_eq!(size_lis.len(), 2);

        let black = page
            .query_all(&Locator::id("variation_color_name").descendant(Step::tag("li")))[1];
        page.activate(black).unwrap();

        // Black carries only 7oz, so the page lands there.
        assert_eq!(page.selected(), (Some("Black".into()), Some("7oz".into())));
        // Size handles captured before the color change are stale now.
        assert!(page.text(size_lis[0]).is_none());
        assert!(page.activate(size_lis[0]).is_err());
        // Color handles survive.
        assert!(page.text(black).is_some());
    }

    #[test]
    fn test_price_follows_selection() {
        let page = two_axis_page();
        let price = page
            .query(
                &Locator::id("corePriceDisplay_desktop_feature_div")
                    .descendant(Step::class("a-offscreen")),
            )
            .unwrap();
        assert_eq!(page.text(price).as_deref(), Some("$12.99"));
    }

    #[test]
    fn test_substitution_rule() {
        let page = FakeProductPage::builder()
            .color("Green")
            .color("White")
            .single_price("Green", "$9.99")
            .single_price("White", "$10.99")
            .substitute("Green", "White")
            .build();

        let green = page
            .query_all(&Locator::id("variation_color_name").descendant(Step::tag("li")))[0];
        page.activate(green).unwrap();
        assert_eq!(page.selected().0.as_deref(), Some("White"));
    }

    #[test]
    fn test_checked_pseudo_follows_dropdown_selection() {
        let page = FakeProductPage::builder()
            .size("14oz")
            .size("7oz")
            .size_layout(SizeLayout::DropDown)
            .single_price("14oz", "$12.99")
            .single_price("7oz", "$6.99")
            .build();
        let checked = Locator::id("variation_size_name")
            .descendant(Step::tag("select"))
            .descendant(Step::tag("option").checked());

        let node = page.query(&checked).unwrap();
        assert_eq!(page.text(node).as_deref(), Some("14oz"));

        let options = page.query_all(
            &Locator::id("variation_size_name")
                .descendant(Step::tag("select"))
                .descendant(Step::tag("option")),
        );
        // options[0] is the placeholder entry.
        page.select_and_notify(options[2]).unwrap();

        let node = page.query(&checked).unwrap();
        assert_eq!(page.text(node).as_deref(), Some("7oz"));
    }

    #[test]
    fn test_activate_non_control_fails() {
        let page = two_axis_page();
        let title = page.query(&Locator::id("productTitle")).unwrap();
        assert!(page.activate(title).is_err());
    }
}
