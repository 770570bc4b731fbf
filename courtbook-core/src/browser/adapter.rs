use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use super::error::{AdapterError, AdapterResult};

/// Opaque handle to an element resolved by an adapter. Only meaningful to the
/// adapter instance that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementRef(usize);

impl ElementRef {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn id(self) -> usize {
        self.0
    }
}

/// Element query. Text variants compare against the element's own trimmed
/// text nodes, so a wrapper around the labelled element never matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Css(String),
    ExactText { css: String, text: String },
    ContainsText { css: String, text: String },
}

impl Selector {
    pub fn css(css: impl Into<String>) -> Self {
        Selector::Css(css.into())
    }

    pub fn exact_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Selector::ExactText {
            css: css.into(),
            text: text.into(),
        }
    }

    pub fn contains_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Selector::ContainsText {
            css: css.into(),
            text: text.into(),
        }
    }

    pub fn css_part(&self) -> &str {
        match self {
            Selector::Css(css)
            | Selector::ExactText { css, .. }
            | Selector::ContainsText { css, .. } => css,
        }
    }

    pub fn needs_text(&self) -> bool {
        !matches!(self, Selector::Css(_))
    }

    /// `own_text` is the concatenation of the element's direct text nodes.
    pub fn matches_text(&self, own_text: &str) -> bool {
        match self {
            Selector::Css(_) => true,
            Selector::ExactText { text, .. } => own_text.trim() == text.as_str(),
            Selector::ContainsText { text, .. } => own_text.trim().contains(text.as_str()),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(css) => write!(f, "`{css}`"),
            Selector::ExactText { css, text } => write!(f, "`{css}` with text \"{text}\""),
            Selector::ContainsText { css, text } => {
                write!(f, "`{css}` containing \"{text}\"")
            }
        }
    }
}

/// Capabilities the booking steps need from a live page. Calls are sequential
/// from the owning worker; implementations never see concurrent use.
#[async_trait]
pub trait AutomationAdapter: Send {
    async fn navigate(&mut self, url: &str) -> AdapterResult<()>;

    async fn reload(&mut self) -> AdapterResult<()> {
        Ok(())
    }

    /// All matches in document order, optionally scoped to a parent element.
    async fn find_all(
        &mut self,
        selector: &Selector,
        within: Option<ElementRef>,
    ) -> AdapterResult<Vec<ElementRef>>;

    async fn find_first(
        &mut self,
        selector: &Selector,
        within: Option<ElementRef>,
    ) -> AdapterResult<ElementRef> {
        self.find_all(selector, within)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::NotFound(selector.to_string()))
    }

    async fn text(&mut self, element: ElementRef) -> AdapterResult<String>;

    async fn attribute(&mut self, element: ElementRef, name: &str)
        -> AdapterResult<Option<String>>;

    async fn is_checked(&mut self, element: ElementRef) -> AdapterResult<bool> {
        Ok(self.attribute(element, "checked").await?.is_some())
    }

    async fn click(&mut self, element: ElementRef) -> AdapterResult<()>;

    async fn scroll_into_view(&mut self, element: ElementRef) -> AdapterResult<()>;

    async fn scroll_to_top(&mut self) -> AdapterResult<()> {
        Ok(())
    }

    /// Waits for a visible match. A disabled control still counts as
    /// clickable; callers inspect `disabled` themselves.
    async fn wait_until_clickable(
        &mut self,
        selector: &Selector,
        timeout: Duration,
    ) -> AdapterResult<ElementRef>;

    async fn wait_until_present(
        &mut self,
        selector: &Selector,
        timeout: Duration,
    ) -> AdapterResult<ElementRef>;

    /// Releases the underlying session. Called once on every run exit path.
    async fn close(&mut self) -> AdapterResult<()> {
        Ok(())
    }
}

/// Produces one exclusively-owned adapter per run.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn open(&self) -> AdapterResult<Box<dyn AutomationAdapter>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_selectors_compare_trimmed_text() {
        let exact = Selector::exact_text("div", "07/20");
        assert!(exact.matches_text("  07/20\n"));
        assert!(!exact.matches_text("07/201"));
        let contains = Selector::contains_text("button", "提交订单");
        assert!(contains.matches_text("确认 提交订单"));
        assert!(Selector::css(".item").matches_text("anything"));
        assert!(!Selector::css(".item").needs_text());
    }

    #[test]
    fn display_names_the_query() {
        assert_eq!(
            Selector::exact_text("span", "07/20").to_string(),
            "`span` with text \"07/20\""
        );
    }
}
