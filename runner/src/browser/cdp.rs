//! # Chrome DevTools Protocol driver
//!
//! Drives a local Chrome/Chromium through `chromiumoxide`. Locators are
//! resolved in the page by an injected script that computes ARIA roles
//! (explicit or implicit), accessible names, normalized text and visibility
//! for every match, and hands the snapshots back as JSON.
//!
//! Clicks go through real input events: the target match is tagged with a
//! one-off data attribute, found with a CSS selector and clicked at its
//! center, then untagged.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{BrowserConfig, BrowserDriver, BrowserLauncher, DriverError, ElementSnapshot, PageActivity};
use crate::protocol::Locator;

const TARGET_ATTRIBUTE: &str = "data-ui-harness-target";

// ============================================================================
// PAGE SCRIPTS
// ============================================================================

const RESOLVER_PRELUDE: &str = r#"
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
  const fold = (s) => norm(s).toLowerCase();

  const implicitRole = (el) => {
    const explicit = el.getAttribute('role');
    if (explicit && explicit.trim()) return explicit.trim().split(/\s+/)[0];
    const tag = el.tagName.toLowerCase();
    switch (tag) {
      case 'button': return 'button';
      case 'a': case 'area': return el.hasAttribute('href') ? 'link' : null;
      case 'nav': return 'navigation';
      case 'main': return 'main';
      case 'header': return 'banner';
      case 'footer': return 'contentinfo';
      case 'aside': return 'complementary';
      case 'form': return 'form';
      case 'ul': case 'ol': case 'menu': return 'list';
      case 'li': return 'listitem';
      case 'dialog': return 'dialog';
      case 'table': return 'table';
      case 'tr': return 'row';
      case 'td': return 'cell';
      case 'th': return 'columnheader';
      case 'textarea': return 'textbox';
      case 'progress': return 'progressbar';
      case 'option': return 'option';
      case 'h1': case 'h2': case 'h3': case 'h4': case 'h5': case 'h6': return 'heading';
      case 'img': return el.getAttribute('alt') === '' ? 'presentation' : 'img';
      case 'select': return (el.multiple || el.size > 1) ? 'listbox' : 'combobox';
      case 'input': {
        const type = (el.getAttribute('type') || 'text').toLowerCase();
        if (['button', 'submit', 'reset', 'image'].includes(type)) return 'button';
        if (type === 'checkbox') return 'checkbox';
        if (type === 'radio') return 'radio';
        if (type === 'range') return 'slider';
        if (type === 'number') return 'spinbutton';
        if (type === 'search') return 'searchbox';
        if (['text', 'email', 'tel', 'url', 'password'].includes(type)) return 'textbox';
        return null;
      }
    }
    return null;
  };

  const textOf = (el) => {
    let out = '';
    for (const node of el.childNodes) {
      if (node.nodeType === Node.TEXT_NODE) {
        out += node.textContent;
      } else if (node.nodeType === Node.ELEMENT_NODE) {
        if (node.getAttribute('aria-hidden') === 'true') continue;
        const tag = node.tagName.toLowerCase();
        if (tag === 'script' || tag === 'style') continue;
        if (tag === 'img') { out += ' ' + (node.getAttribute('alt') || '') + ' '; continue; }
        out += ' ' + textOf(node) + ' ';
      }
    }
    return out;
  };

  const accessibleName = (el) => {
    const labelledBy = el.getAttribute('aria-labelledby');
    if (labelledBy) {
      const joined = norm(labelledBy.split(/\s+/)
        .map((id) => document.getElementById(id))
        .filter(Boolean)
        .map(textOf)
        .join(' '));
      if (joined) return joined;
    }
    const label = norm(el.getAttribute('aria-label'));
    if (label) return label;
    if (el.labels && el.labels.length) {
      const fromLabels = norm(Array.from(el.labels).map(textOf).join(' '));
      if (fromLabels) return fromLabels;
    }
    const tag = el.tagName.toLowerCase();
    if (tag === 'input' && ['button', 'submit', 'reset'].includes((el.type || '').toLowerCase())) {
      return norm(el.value);
    }
    if (tag === 'img' || tag === 'area') {
      const alt = norm(el.getAttribute('alt'));
      if (alt) return alt;
    }
    const text = norm(textOf(el));
    if (text) return text;
    return norm(el.getAttribute('title'));
  };

  const hiddenFromTree = (el) => {
    for (let n = el; n && n.getAttribute; n = n.parentElement) {
      if (n.getAttribute('aria-hidden') === 'true') return true;
    }
    return false;
  };

  const isVisible = (el) => {
    const rect = el.getBoundingClientRect();
    if (rect.width === 0 && rect.height === 0) return false;
    const style = window.getComputedStyle(el);
    return style.visibility !== 'hidden' && style.display !== 'none';
  };

  const matchesText = (actual, wanted, exact) =>
    exact ? norm(actual) === norm(wanted) : fold(actual).includes(fold(wanted));

  const SKIPPED_TAGS = ['html', 'head', 'script', 'style', 'title', 'meta', 'link', 'noscript'];

  const resolve = (loc, roots) => {
    const found = [];
    const seen = new Set();
    const add = (el) => { if (!seen.has(el)) { seen.add(el); found.push(el); } };
    for (const root of roots) {
      switch (loc.by) {
        case 'role':
          for (const el of root.querySelectorAll('*')) {
            if (implicitRole(el) !== loc.role || hiddenFromTree(el)) continue;
            if (loc.name != null && !matchesText(accessibleName(el), loc.name, !!loc.exact)) continue;
            add(el);
          }
          break;
        case 'text': {
          const hits = Array.from(root.querySelectorAll('*')).filter((el) =>
            !SKIPPED_TAGS.includes(el.tagName.toLowerCase()) &&
            matchesText(textOf(el), loc.text, !!loc.exact));
          for (const el of hits) {
            if (!hits.some((other) => other !== el && el.contains(other))) add(el);
          }
          break;
        }
        case 'css':
          for (const el of root.querySelectorAll(loc.selector)) {
            if (loc.has_text != null && !fold(el.textContent).includes(fold(loc.has_text))) continue;
            add(el);
          }
          break;
        case 'within':
          for (const el of resolve(loc.child, resolve(loc.parent, [root]))) add(el);
          break;
      }
    }
    return found.sort((a, b) =>
      a === b ? 0 : (a.compareDocumentPosition(b) & Node.DOCUMENT_POSITION_FOLLOWING ? -1 : 1));
  };

  const snapshot = (el) => {
    const attributes = {};
    for (const attr of el.attributes) attributes[attr.name] = attr.value;
    return {
      tag: el.tagName.toLowerCase(),
      role: implicitRole(el),
      name: accessibleName(el),
      text: norm(el.textContent),
      attributes,
      visible: isVisible(el),
      outer_html: el.outerHTML,
      inner_html: el.innerHTML,
    };
  };
"#;

const ACTIVITY_SCRIPT: &str = r#"JSON.stringify({
  ready: document.readyState === 'complete',
  resources: performance.getEntriesByType('resource').length
})"#;

fn resolver_script(locator: &Locator, tail: &str) -> Result<String, DriverError> {
    let locator_json =
        serde_json::to_string(locator).map_err(|e| DriverError::Script(e.to_string()))?;
    Ok(format!(
        "(() => {{\n{prelude}\n  const matches = resolve({locator_json}, [document]);\n  {tail}\n}})()",
        prelude = RESOLVER_PRELUDE,
        locator_json = locator_json,
        tail = tail,
    ))
}

fn query_script(locator: &Locator) -> Result<String, DriverError> {
    resolver_script(locator, "return JSON.stringify(matches.map(snapshot));")
}

fn mark_script(locator: &Locator, index: usize, token: &str) -> Result<String, DriverError> {
    let tail = format!(
        "document.querySelectorAll('[{attr}]').forEach((e) => e.removeAttribute('{attr}'));\n  \
         const target = matches[{index}];\n  \
         if (!target) return false;\n  \
         target.setAttribute('{attr}', '{token}');\n  \
         return true;",
        attr = TARGET_ATTRIBUTE,
        index = index,
        token = token,
    );
    resolver_script(locator, &tail)
}

fn unmark_script(token: &str) -> String {
    format!(
        "document.querySelectorAll('[{attr}=\"{token}\"]').forEach((e) => e.removeAttribute('{attr}'))",
        attr = TARGET_ATTRIBUTE,
        token = token,
    )
}

// ============================================================================
// LAUNCHER
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct CdpLauncher;

#[async_trait]
impl BrowserLauncher for CdpLauncher {
    async fn launch(&self, config: &BrowserConfig) -> Result<Box<dyn BrowserDriver>, DriverError> {
        let mut builder = CdpConfig::builder()
            .window_size(config.viewport_width, config.viewport_height)
            .viewport(None)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = &config.executable {
            builder = builder.chrome_executable(path);
        }
        let cdp_config = builder.build().map_err(DriverError::Launch)?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    debug!("cdp handler loop ended");
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(DriverError::Launch(format!("could not open page: {}", e)));
            }
        };

        info!(
            headless = config.headless,
            width = config.viewport_width,
            height = config.viewport_height,
            "chrome launched"
        );

        Ok(Box::new(CdpDriver {
            page,
            browser: Mutex::new(Some(browser)),
            handler_task: Mutex::new(Some(handler_task)),
        }))
    }
}

// ============================================================================
// DRIVER
// ============================================================================

pub struct CdpDriver {
    page: Page,
    browser: Mutex<Option<Browser>>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
}

impl CdpDriver {
    async fn eval_json<T: DeserializeOwned>(&self, script: &str) -> Result<T, DriverError> {
        let raw: String = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?
            .into_value()
            .map_err(|e| DriverError::Script(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| DriverError::Script(e.to_string()))
    }

    async fn eval_bool(&self, script: &str) -> Result<bool, DriverError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?
            .into_value()
            .map_err(|e| DriverError::Script(e.to_string()))
    }
}

#[async_trait]
impl BrowserDriver for CdpDriver {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        self.page
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|e| DriverError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    async fn activity(&self) -> Result<PageActivity, DriverError> {
        self.eval_json(ACTIVITY_SCRIPT).await
    }

    async fn query(&self, locator: &Locator) -> Result<Vec<ElementSnapshot>, DriverError> {
        self.eval_json(&query_script(locator)?).await
    }

    async fn click(&self, locator: &Locator, index: usize) -> Result<(), DriverError> {
        let token = Uuid::new_v4().simple().to_string();
        if !self.eval_bool(&mark_script(locator, index, &token)?).await? {
            return Err(DriverError::Detached {
                locator: locator.to_string(),
                index,
            });
        }

        let selector = format!("[{}=\"{}\"]", TARGET_ATTRIBUTE, token);
        let clicked = match self.page.find_element(selector).await {
            Ok(element) => element
                .click()
                .await
                .map(|_| ())
                .map_err(|e| DriverError::Interaction(e.to_string())),
            Err(e) => Err(DriverError::Interaction(e.to_string())),
        };

        // The click may have navigated or removed the element; cleanup is best effort.
        if let Err(e) = self.page.evaluate(unmark_script(&token)).await {
            debug!(error = %e, "could not remove click marker");
        }
        clicked
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.page
            .content()
            .await
            .map_err(|e| DriverError::Script(e.to_string()))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(false)
                    .build(),
            )
            .await
            .map_err(|e| DriverError::Screenshot(e.to_string()))
    }

    async fn close(&self) -> Result<(), DriverError> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Err(DriverError::Closed);
        };

        let result = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| DriverError::Interaction(format!("closing chrome: {}", e)));
        if let Err(e) = browser.wait().await {
            warn!(error = %e, "chrome process did not exit cleanly");
        }
        if let Some(task) = self.handler_task.lock().await.take() {
            task.abort();
        }
        result
    }
}
