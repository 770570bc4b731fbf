use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::element::Element;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::BrowserSection;

use super::adapter::{AdapterFactory, AutomationAdapter, ElementRef, Selector};
use super::error::{AdapterError, AdapterResult};

const CLICK_SCRIPT: &str = "function() { this.click(); }";
const SCROLL_INTO_VIEW_SCRIPT: &str =
    "function() { this.scrollIntoView({ block: 'center', inline: 'center' }); }";
const VISIBLE_SCRIPT: &str = "function() { const r = this.getBoundingClientRect(); return r.width > 0 && r.height > 0; }";
const CHECKED_SCRIPT: &str = "function() { return this.checked === true; }";
const MATCH_ATTR: &str = "data-courtbook-match";

#[derive(Debug, Clone, Default)]
pub struct LaunchOverrides {
    pub headless: Option<bool>,
}

/// Starts a Chromium instance per run. Headed by default: the operator logs
/// in by hand inside the launched window.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    config: Arc<BrowserSection>,
    overrides: LaunchOverrides,
}

impl ChromiumLauncher {
    pub fn new(config: BrowserSection) -> Self {
        Self {
            config: Arc::new(config),
            overrides: LaunchOverrides::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: LaunchOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn headless(&self) -> bool {
        self.overrides.headless.unwrap_or(self.config.headless)
    }

    pub async fn launch(&self) -> AdapterResult<ChromiumSession> {
        let headless = self.headless();
        let chromium_config = self.build_chromium_config(headless)?;
        info!(
            headless,
            width = self.config.window_size[0],
            height = self.config.window_size[1],
            "Launching Chromium instance"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| AdapterError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "Chromium handler reported error");
                }
            }
        });

        let page = browser
            .new_page(CreateTargetParams::new("about:blank"))
            .await?;

        Ok(ChromiumSession {
            browser,
            page,
            handler_task: Some(handler_task),
            elements: Vec::new(),
            query_seq: 0,
            poll_interval: self.config.poll_interval(),
        })
    }

    pub fn launch_args(&self) -> Vec<String> {
        let [width, height] = self.config.window_size;
        let mut args = vec![
            format!("--window-size={width},{height}"),
            "--no-first-run".to_string(),
            "--disable-features=AutomationControlled".to_string(),
            "--disable-background-timer-throttling".to_string(),
            "--password-store=basic".to_string(),
        ];
        if self.config.disable_gpu {
            args.push("--disable-gpu".into());
        }
        if let Some(lang) = &self.config.lang {
            args.push(format!("--lang={lang}"));
        }
        args
    }

    fn build_chromium_config(&self, headless: bool) -> AdapterResult<ChromiumConfig> {
        let [width, height] = self.config.window_size;
        let mut builder = ChromiumConfig::builder().viewport(ChromiumViewport {
            width,
            height,
            device_scale_factor: None,
            emulating_mobile: false,
            is_landscape: width >= height,
            has_touch: false,
        });

        if let Some(executable) = &self.config.executable_path {
            builder = builder.chrome_executable(executable);
        }
        if let Some(dir) = self.config.user_data_dir() {
            builder = builder.user_data_dir(dir);
        }
        if !headless {
            builder = builder.with_head();
        }
        if !self.config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = self.config.request_timeout_seconds {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }

        builder = builder.args(self.launch_args());
        builder.build().map_err(AdapterError::Configuration)
    }
}

#[async_trait]
impl AdapterFactory for ChromiumLauncher {
    async fn open(&self) -> AdapterResult<Box<dyn AutomationAdapter>> {
        let session = self.launch().await?;
        Ok(Box::new(session))
    }
}

/// One browser, one tab. Element handles index into `elements`, which lives
/// as long as the session.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: Option<JoinHandle<()>>,
    elements: Vec<Element>,
    query_seq: u64,
    poll_interval: Duration,
}

impl fmt::Debug for ChromiumSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChromiumSession")
            .field("elements", &self.elements.len())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl ChromiumSession {
    fn element(&self, handle: ElementRef) -> AdapterResult<&Element> {
        self.elements
            .get(handle.id())
            .ok_or_else(|| AdapterError::NotFound(format!("stale element handle {}", handle.id())))
    }

    fn register(&mut self, element: Element) -> ElementRef {
        self.elements.push(element);
        ElementRef::new(self.elements.len() - 1)
    }

    /// Resolves `selector` in one round trip for plain CSS. Text selectors are
    /// filtered inside the page first, then only the marked matches are
    /// resolved.
    async fn query(
        &mut self,
        selector: &Selector,
        within: Option<ElementRef>,
    ) -> AdapterResult<Vec<Element>> {
        let css = if selector.needs_text() {
            self.query_seq += 1;
            let token = self.query_seq.to_string();
            let body = mark_text_matches_body(selector, &token)?;
            let marked = match within {
                Some(parent) => {
                    let script = format!("function() {{ const root = this; {body} }}");
                    let returns = self.element(parent)?.call_js_fn(script, false).await?;
                    returns.result.value.and_then(|value| value.as_u64())
                }
                None => {
                    let script = format!("(() => {{ const root = document; {body} }})()");
                    let evaluated = self.page.evaluate(script).await?;
                    evaluated.value().and_then(|value| value.as_u64())
                }
            };
            if marked.unwrap_or(0) == 0 {
                return Ok(Vec::new());
            }
            format!("[{MATCH_ATTR}=\"{token}\"]")
        } else {
            selector.css_part().to_string()
        };
        let found = match within {
            Some(parent) => self.element(parent)?.find_elements(css).await?,
            None => self.page.find_elements(css).await?,
        };
        Ok(found)
    }

    async fn eval_bool(&self, handle: ElementRef, script: &str) -> AdapterResult<bool> {
        let returns = self.element(handle)?.call_js_fn(script, false).await?;
        Ok(returns
            .result
            .value
            .and_then(|value| value.as_bool())
            .unwrap_or(false))
    }

    async fn poll_for(
        &mut self,
        selector: &Selector,
        timeout: Duration,
        require_visible: bool,
    ) -> AdapterResult<ElementRef> {
        let deadline = Instant::now() + timeout;
        loop {
            let registered = self.elements.len();
            match self.find_first(selector, None).await {
                Ok(handle) => {
                    if !require_visible || self.eval_bool(handle, VISIBLE_SCRIPT).await? {
                        return Ok(handle);
                    }
                }
                Err(AdapterError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
            self.elements.truncate(registered);
            if Instant::now() >= deadline {
                return Err(AdapterError::Timeout(selector.to_string()));
            }
            sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl AutomationAdapter for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> AdapterResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(AdapterError::Configuration)?;
        self.page
            .goto(params)
            .await
            .map_err(|err| AdapterError::Navigation(format!("{url}: {err}")))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|err| AdapterError::Navigation(format!("{url}: {err}")))?;
        self.elements.clear();
        Ok(())
    }

    async fn reload(&mut self) -> AdapterResult<()> {
        self.page
            .reload()
            .await
            .map_err(|err| AdapterError::Navigation(format!("reload: {err}")))?;
        self.elements.clear();
        Ok(())
    }

    async fn find_all(
        &mut self,
        selector: &Selector,
        within: Option<ElementRef>,
    ) -> AdapterResult<Vec<ElementRef>> {
        let found = self.query(selector, within).await?;
        Ok(found
            .into_iter()
            .map(|element| self.register(element))
            .collect())
    }

    async fn find_first(
        &mut self,
        selector: &Selector,
        within: Option<ElementRef>,
    ) -> AdapterResult<ElementRef> {
        match self.query(selector, within).await?.into_iter().next() {
            Some(element) => Ok(self.register(element)),
            None => Err(AdapterError::NotFound(selector.to_string())),
        }
    }

    async fn text(&mut self, element: ElementRef) -> AdapterResult<String> {
        let text = self.element(element)?.inner_text().await?;
        Ok(text.unwrap_or_default().trim().to_string())
    }

    async fn attribute(
        &mut self,
        element: ElementRef,
        name: &str,
    ) -> AdapterResult<Option<String>> {
        Ok(self.element(element)?.attribute(name).await?)
    }

    async fn is_checked(&mut self, element: ElementRef) -> AdapterResult<bool> {
        self.eval_bool(element, CHECKED_SCRIPT).await
    }

    async fn click(&mut self, element: ElementRef) -> AdapterResult<()> {
        self.element(element)?.call_js_fn(CLICK_SCRIPT, false).await?;
        Ok(())
    }

    async fn scroll_into_view(&mut self, element: ElementRef) -> AdapterResult<()> {
        self.element(element)?
            .call_js_fn(SCROLL_INTO_VIEW_SCRIPT, false)
            .await?;
        Ok(())
    }

    async fn scroll_to_top(&mut self) -> AdapterResult<()> {
        self.page.evaluate("window.scrollTo(0, 0);").await?;
        Ok(())
    }

    async fn wait_until_clickable(
        &mut self,
        selector: &Selector,
        timeout: Duration,
    ) -> AdapterResult<ElementRef> {
        self.poll_for(selector, timeout, true).await
    }

    async fn wait_until_present(
        &mut self,
        selector: &Selector,
        timeout: Duration,
    ) -> AdapterResult<ElementRef> {
        self.poll_for(selector, timeout, false).await
    }

    async fn close(&mut self) -> AdapterResult<()> {
        info!("Shutting down Chromium instance");
        self.elements.clear();
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "Failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Browser handler join error");
            }
        }
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!("ChromiumSession dropped without explicit close");
            }
        }
    }
}

/// Script body that tags every `css` match under `root` whose own text nodes
/// (not descendants') satisfy the selector, and returns the match count.
fn mark_text_matches_body(selector: &Selector, token: &str) -> AdapterResult<String> {
    let (text, exact) = match selector {
        Selector::Css(_) => {
            return Err(AdapterError::Configuration(format!(
                "{selector} has no text to match"
            )))
        }
        Selector::ExactText { text, .. } => (text, true),
        Selector::ContainsText { text, .. } => (text, false),
    };
    let encode = |value: &str| {
        serde_json::to_string(value).map_err(|err| AdapterError::Configuration(err.to_string()))
    };
    let css = encode(selector.css_part())?;
    let text = encode(text)?;
    let attr = encode(MATCH_ATTR)?;
    let token = encode(token)?;
    Ok(format!(
        "const attr = {attr}; \
         document.querySelectorAll('[' + attr + ']').forEach(el => el.removeAttribute(attr)); \
         let count = 0; \
         for (const el of root.querySelectorAll({css})) {{ \
           const own = Array.from(el.childNodes) \
             .filter(node => node.nodeType === Node.TEXT_NODE) \
             .map(node => node.textContent) \
             .join('') \
             .trim(); \
           if ({exact} ? own === {text} : own.includes({text})) {{ \
             el.setAttribute(attr, {token}); \
             count += 1; \
           }} \
         }} \
         return count;"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_args_follow_browser_section() {
        let launcher = ChromiumLauncher::new(BrowserSection {
            disable_gpu: true,
            lang: Some("zh-CN".into()),
            window_size: [1280, 800],
            ..BrowserSection::default()
        });
        let args = launcher.launch_args();
        assert!(args.contains(&"--window-size=1280,800".to_string()));
        assert!(args.contains(&"--disable-gpu".to_string()));
        assert!(args.contains(&"--lang=zh-CN".to_string()));
    }

    #[test]
    fn text_filter_script_checks_own_text_only() {
        let body =
            mark_text_matches_body(&Selector::exact_text("div, span", "07/20"), "3").unwrap();
        assert!(body.contains("node.nodeType === Node.TEXT_NODE"));
        assert!(body.contains("querySelectorAll(\"div, span\")"));
        assert!(body.contains("true ? own === \"07/20\""));
        assert!(body.contains("el.setAttribute(attr, \"3\")"));

        let contains = mark_text_matches_body(
            &Selector::contains_text("button.btn-primary", "提交\"订单"),
            "4",
        )
        .unwrap();
        assert!(contains.contains("false ? own === \"提交\\\"订单\""));
        assert!(mark_text_matches_body(&Selector::css(".item"), "5").is_err());
    }

    #[test]
    fn overrides_take_precedence_over_config() {
        let launcher = ChromiumLauncher::new(BrowserSection::default());
        assert!(!launcher.headless());
        let launcher = launcher.with_overrides(LaunchOverrides {
            headless: Some(true),
        });
        assert!(launcher.headless());
    }
}
