use crate::error::Result;
use crate::page::PageInspector;
use crate::product::{ControlStyle, VariationOption};

/// Performs the DOM interaction that selects a variation option.
///
/// Best-effort and side-effecting: success is verified later by
/// re-extraction, not by this call. Waiting out the settle interval is the
/// caller's responsibility.
pub struct SelectionDriver<'a, I> {
    page: &'a I,
}

impl<'a, I: PageInspector> SelectionDriver<'a, I> {
    pub fn new(page: &'a I) -> Self {
        Self { page }
    }

    pub fn select(&self, option: &VariationOption) -> Result<()> {
        log::debug!("selecting {:?} option '{}'", option.kind, option.name);
        match option.style {
            ControlStyle::DropDown => self.page.select_and_notify(option.handle),
            ControlStyle::StandaloneButton => {
                // A plain activation is not always honored by this layout:
                // also attempt the low-level state toggle with a synthetic
                // change notification.
                let activated = self.page.activate(option.handle);
                let toggled = self.page.select_and_notify(option.handle);
                if activated.is_err() && toggled.is_err() {
                    return activated;
                }
                Ok(())
            }
            ControlStyle::ListItem | ControlStyle::PushButton => self.page.activate(option.handle),
        }
    }
}
