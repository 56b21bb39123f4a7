//! Real-browser [`PageInspector`] backend over a Chrome DevTools session.
//!
//! Elements are addressed as (selector, index) pairs resolved freshly on
//! every call, so a handle whose element left the document simply stops
//! matching. Queries render the typed [`Locator`] to CSS and evaluate it in
//! the page; interactions dispatch real click/change events so the page's own
//! listeners run.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use headless_chrome::{Browser, Tab};

use crate::error::{Result, ScanError};
use crate::page::{Locator, NodeHandle, PageInspector, Step};

/// Launch configuration for a scan browser.
#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub chrome_path: Option<PathBuf>,
    pub sandbox: bool,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1280,
            window_height: 1024,
            chrome_path: None,
            sandbox: true,
        }
    }
}

impl ChromeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: toggle headless mode.
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Builder method: set the window size.
    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.window_width = width;
        self.window_height = height;
        self
    }
}

/// Owns the browser process for the lifetime of a scan.
pub struct ChromeSession {
    browser: Browser,
}

impl ChromeSession {
    /// Launch a fresh browser instance.
    pub fn launch(options: ChromeOptions) -> Result<Self> {
        let mut launch_opts = headless_chrome::LaunchOptions::default();

        // Keep the automation banner and flag off so the target site serves
        // the same markup it serves a regular browser.
        launch_opts.ignore_default_args.push(OsStr::new("--enable-automation"));
        launch_opts.args.push(OsStr::new("--disable-blink-features=AutomationControlled"));

        // A full combination scan can outlive the default 30s idle timeout.
        launch_opts.idle_browser_timeout = Duration::from_secs(60 * 60);

        launch_opts.headless = options.headless;
        launch_opts.window_size = Some((options.window_width, options.window_height));
        launch_opts.sandbox = options.sandbox;
        if let Some(path) = options.chrome_path {
            launch_opts.path = Some(path);
        }

        let browser =
            Browser::new(launch_opts).map_err(|e| ScanError::Browser(e.to_string()))?;
        Ok(Self { browser })
    }

    /// Connect to an already-running browser over its WebSocket endpoint.
    pub fn connect(ws_url: impl Into<String>) -> Result<Self> {
        let browser =
            Browser::connect(ws_url.into()).map_err(|e| ScanError::Browser(e.to_string()))?;
        Ok(Self { browser })
    }

    /// Open a product page in a new tab and wait for it to settle.
    pub fn open(&self, url: &str) -> Result<ChromePage> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| ScanError::Browser(format!("failed to create tab: {}", e)))?;
        tab.navigate_to(url)
            .map_err(|e| ScanError::Browser(format!("failed to navigate to {}: {}", url, e)))?;
        tab.wait_until_navigated()
            .map_err(|e| ScanError::Browser(format!("navigation timeout: {}", e)))?;
        Ok(ChromePage::new(tab))
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }
}

struct HandleEntry {
    css: String,
    index: usize,
}

/// One product-page tab exposed through the inspection trait.
pub struct ChromePage {
    tab: Arc<Tab>,
    handles: Mutex<HandleTable>,
}

#[derive(Default)]
struct HandleTable {
    next: u64,
    entries: HashMap<u64, HandleEntry>,
}

fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

impl ChromePage {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab, handles: Mutex::new(HandleTable::default()) }
    }

    fn handles(&self) -> MutexGuard<'_, HandleTable> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn register(&self, css: &str, index: usize) -> NodeHandle {
        let mut table = self.handles();
        table.next += 1;
        let id = table.next;
        table.entries.insert(id, HandleEntry { css: css.to_string(), index });
        NodeHandle(id)
    }

    fn entry(&self, node: NodeHandle) -> Option<(String, usize)> {
        let table = self.handles();
        table.entries.get(&node.0).map(|e| (e.css.clone(), e.index))
    }

    fn eval(&self, expression: &str) -> Result<serde_json::Value> {
        let object = self
            .tab
            .evaluate(expression, false)
            .map_err(|e| ScanError::Browser(format!("evaluation failed: {}", e)))?;
        Ok(object.value.unwrap_or(serde_json::Value::Null))
    }

    /// Evaluate an expression against a resolved element, returning `None`
    /// when the handle no longer resolves or the value is null.
    fn eval_on(&self, node: NodeHandle, body: &str) -> Option<serde_json::Value> {
        let (css, index) = self.entry(node)?;
        let expression = format!(
            "(function() {{ const el = document.querySelectorAll({})[{}]; if (!el) return null; {} }})()",
            js_str(&css),
            index,
            body
        );
        match self.eval(&expression) {
            Ok(serde_json::Value::Null) => None,
            Ok(value) => Some(value),
            Err(err) => {
                log::debug!("element evaluation failed: {}", err);
                None
            }
        }
    }
}

impl PageInspector for ChromePage {
    fn query_all(&self, locator: &Locator) -> Vec<NodeHandle> {
        let css = locator.to_css();
        let expression =
            format!("document.querySelectorAll({}).length", js_str(&css));
        let count = match self.eval(&expression) {
            Ok(value) => value.as_u64().unwrap_or(0) as usize,
            Err(err) => {
                log::debug!("query '{}' failed: {}", css, err);
                0
            }
        };
        (0..count).map(|i| self.register(&css, i)).collect()
    }

    fn query_within(&self, node: NodeHandle, locator: &Locator) -> Vec<NodeHandle> {
        let sub = locator.to_css();
        // Scoped matches are a subset of the document-wide matches, so each
        // one can be re-addressed by its document-wide index.
        let body = format!(
            "const all = Array.from(document.querySelectorAll({sub})); \
             const found = []; \
             el.querySelectorAll({sub}).forEach(m => {{ \
                 const j = all.indexOf(m); if (j >= 0) found.push(j); \
             }}); \
             return JSON.stringify(found);",
            sub = js_str(&sub)
        );
        let Some(value) = self.eval_on(node, &body) else { return Vec::new() };
        let indices: Vec<usize> = value
            .as_str()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();
        indices.into_iter().map(|i| self.register(&sub, i)).collect()
    }

    fn text(&self, node: NodeHandle) -> Option<String> {
        self.eval_on(node, "return el.textContent;")
            .and_then(|v| v.as_str().map(str::to_string))
    }

    fn attribute(&self, node: NodeHandle, name: &str) -> Option<String> {
        let body = format!("return el.getAttribute({});", js_str(name));
        self.eval_on(node, &body)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    fn tag_name(&self, node: NodeHandle) -> Option<String> {
        self.eval_on(node, "return el.tagName.toLowerCase();")
            .and_then(|v| v.as_str().map(str::to_string))
    }

    fn closest(&self, node: NodeHandle, step: &Step) -> Option<NodeHandle> {
        let css = step.to_css();
        let body = format!(
            "const a = el.closest({css}); if (!a) return null; \
             return Array.prototype.indexOf.call(document.querySelectorAll({css}), a);",
            css = js_str(&css)
        );
        let index = self.eval_on(node, &body)?.as_u64()? as usize;
        Some(self.register(&css, index))
    }

    fn activate(&self, node: NodeHandle) -> Result<()> {
        let body = "el.scrollIntoView({block: 'center'}); el.click(); return true;";
        match self.eval_on(node, body) {
            Some(_) => Ok(()),
            None => Err(ScanError::InteractionFailed {
                target: self
                    .entry(node)
                    .map(|(css, i)| format!("{}[{}]", css, i))
                    .unwrap_or_else(|| "stale handle".to_string()),
                reason: "element did not resolve for activation".to_string(),
            }),
        }
    }

    fn select_and_notify(&self, node: NodeHandle) -> Result<()> {
        let body = "\
            if (el.tagName === 'OPTION') { \
                const sel = el.closest('select'); if (!sel) return null; \
                sel.value = el.value; \
                sel.dispatchEvent(new Event('change', {bubbles: true})); \
                return true; \
            } \
            el.click(); \
            el.dispatchEvent(new Event('change', {bubbles: true})); \
            return true;";
        match self.eval_on(node, body) {
            Some(_) => Ok(()),
            None => Err(ScanError::InteractionFailed {
                target: self
                    .entry(node)
                    .map(|(css, i)| format!("{}[{}]", css, i))
                    .unwrap_or_else(|| "stale handle".to_string()),
                reason: "element did not resolve for selection".to_string(),
            }),
        }
    }

    fn page_url(&self) -> String {
        self.tab.get_url()
    }

    fn metadata(&self, key: &str) -> Option<String> {
        let expression = format!(
            "(function() {{ const v = window[{}]; return v == null ? null : String(v); }})()",
            js_str(key)
        );
        self.eval(&expression)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
    }
}
