use std::fmt;

/// How an attribute value must relate to a pattern for a [`Step`] to match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrMatch {
    /// Attribute exists, any value.
    Present,
    /// Attribute equals the value exactly.
    Exact(String),
    /// Attribute starts with the value.
    Prefix(String),
    /// Attribute ends with the value.
    Suffix(String),
    /// Attribute contains the value as a substring.
    Contains(String),
    /// Attribute is absent or does not end with the value.
    NotSuffix(String),
}

/// One structural constraint in a query: tag, id, classes and attribute tests
/// that must all hold on a single element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Step {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<(String, AttrMatch)>,
    /// Require the element's live checked/selected state. Rendered as the
    /// `:checked` pseudo-class; on a real page selection lives in element
    /// properties, not markup attributes.
    pub checked: bool,
}

impl Step {
    /// Constrain by tag name.
    pub fn tag(tag: impl Into<String>) -> Self {
        Self { tag: Some(tag.into()), ..Self::default() }
    }

    /// Constrain by element id.
    pub fn id(id: impl Into<String>) -> Self {
        Self { id: Some(id.into()), ..Self::default() }
    }

    /// Constrain by class membership (no tag requirement).
    pub fn class(class: impl Into<String>) -> Self {
        Self::default().with_class(class)
    }

    /// Builder method: require an additional class.
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    /// Builder method: require an attribute test.
    pub fn with_attr(mut self, name: impl Into<String>, matcher: AttrMatch) -> Self {
        self.attrs.push((name.into(), matcher));
        self
    }

    /// Builder method: require the id to start with a prefix.
    pub fn with_id_prefix(self, prefix: impl Into<String>) -> Self {
        self.with_attr("id", AttrMatch::Prefix(prefix.into()))
    }

    /// Builder method: require the element to be in its checked/selected
    /// state.
    pub fn checked(mut self) -> Self {
        self.checked = true;
        self
    }

    /// Render this step as a CSS compound selector.
    pub fn to_css(&self) -> String {
        let mut out = String::new();
        if let Some(tag) = &self.tag {
            out.push_str(tag);
        }
        if let Some(id) = &self.id {
            out.push('#');
            out.push_str(id);
        }
        for class in &self.classes {
            out.push('.');
            out.push_str(class);
        }
        for (name, matcher) in &self.attrs {
            match matcher {
                AttrMatch::Present => out.push_str(&format!("[{}]", name)),
                AttrMatch::Exact(v) => out.push_str(&format!("[{}=\"{}\"]", name, v)),
                AttrMatch::Prefix(v) => out.push_str(&format!("[{}^=\"{}\"]", name, v)),
                AttrMatch::Suffix(v) => out.push_str(&format!("[{}$=\"{}\"]", name, v)),
                AttrMatch::Contains(v) => out.push_str(&format!("[{}*=\"{}\"]", name, v)),
                AttrMatch::NotSuffix(v) => out.push_str(&format!(":not([{}$=\"{}\"])", name, v)),
            }
        }
        if self.checked {
            out.push_str(":checked");
        }
        if out.is_empty() {
            out.push('*');
        }
        out
    }
}

/// A structural query: a chain of [`Step`]s related by descent, matched
/// root-to-leaf. The typed form keeps fake inspectors free of CSS parsing;
/// real-browser adapters render it with [`Locator::to_css`].
#[derive(Debug, Clone, PartialEq)]
pub struct Locator {
    steps: Vec<Step>,
}

impl Locator {
    pub fn new(step: Step) -> Self {
        Self { steps: vec![step] }
    }

    /// Shorthand for a single-step id query.
    pub fn id(id: impl Into<String>) -> Self {
        Self::new(Step::id(id))
    }

    /// Builder method: append a descendant step.
    pub fn descendant(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Render the full query as a CSS selector.
    pub fn to_css(&self) -> String {
        self.steps.iter().map(Step::to_css).collect::<Vec<_>>().join(" ")
    }
}

impl From<Step> for Locator {
    fn from(step: Step) -> Self {
        Locator::new(step)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_css())
    }
}
