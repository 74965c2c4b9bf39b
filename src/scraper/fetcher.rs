//! Page fetcher abstraction.
//!
//! The crawler drives one stateful browsing session through [`PageFetcher`].
//! Element-presence waits are strict and fail with [`FetchError::Timeout`];
//! count-stabilization waits are advisory and only log when they give up.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::FetchError;

/// How an element is addressed on the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Locator::XPath(expression.into())
    }

    /// XPath matching an anchor whose text contains `text`
    pub fn link_text(text: &str) -> Self {
        Locator::XPath(format!("//a[contains(text(), '{}')]", text))
    }

    /// JavaScript expression evaluating to the number of matching elements
    pub fn count_script(&self) -> String {
        match self {
            Locator::Css(selector) => format!(
                "document.querySelectorAll({}).length",
                js_string(selector)
            ),
            Locator::XPath(expression) => format!(
                "document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null).snapshotLength",
                js_string(expression)
            ),
        }
    }

    /// JavaScript expression evaluating to the first matching element or null
    pub fn element_script(&self) -> String {
        match self {
            Locator::Css(selector) => format!("document.querySelector({})", js_string(selector)),
            Locator::XPath(expression) => format!(
                "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
                js_string(expression)
            ),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "css `{}`", selector),
            Locator::XPath(expression) => write!(f, "xpath `{}`", expression),
        }
    }
}

/// Quote a string as a JavaScript literal
pub(crate) fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Bounded polling parameters shared by all waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl WaitPolicy {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Poll `probe` until it reports true. Times out with an error.
    pub async fn until<F, Fut>(&self, what: &str, mut probe: F) -> Result<(), FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, FetchError>>,
    {
        let deadline = Instant::now() + self.timeout;
        loop {
            if probe().await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(FetchError::Timeout {
                    what: what.to_string(),
                    secs: self.timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Poll `count` until two consecutive non-zero readings agree.
    ///
    /// Gives up with a warning at the deadline and returns the last reading.
    pub async fn stable_count<F, Fut>(&self, what: &str, mut count: F) -> Result<usize, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<usize, FetchError>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut previous = None;
        loop {
            let current = count().await?;
            if current > 0 && previous == Some(current) {
                debug!("{} settled at {}", what, current);
                return Ok(current);
            }
            if Instant::now() >= deadline {
                warn!(
                    "Count of {} did not settle within {}s, proceeding with {}",
                    what,
                    self.timeout.as_secs(),
                    current
                );
                return Ok(current);
            }
            previous = Some(current);
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// One stateful browsing session
#[async_trait]
pub trait PageFetcher: Send {
    /// Load a URL in the current window
    async fn navigate(&mut self, url: &str) -> Result<(), FetchError>;

    /// Click the first element matching the locator
    async fn click(&mut self, locator: &Locator) -> Result<(), FetchError>;

    /// Wait until an element matching the locator exists
    async fn wait_for_element(&mut self, locator: &Locator) -> Result<(), FetchError>;

    /// Wait until the number of matching elements stops changing.
    ///
    /// Advisory: returns the last count even when it never settled.
    async fn wait_for_stable_count(&mut self, locator: &Locator) -> Result<usize, FetchError>;

    /// Wait until the document has finished loading
    async fn wait_for_ready(&mut self) -> Result<(), FetchError>;

    /// Choose an option of a `<select>` by value
    async fn select_option(&mut self, locator: &Locator, value: &str) -> Result<(), FetchError>;

    /// Serialized DOM of the current page
    async fn current_html(&mut self) -> Result<String, FetchError>;

    /// Go one step back in the session history
    async fn back(&mut self) -> Result<(), FetchError>;

    /// Make the window at `index` the current one
    async fn switch_window(&mut self, index: usize) -> Result<(), FetchError>;

    /// Run an inline script such as a `doAction(...)` handler
    async fn run_script(&mut self, script: &str) -> Result<(), FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn policy() -> WaitPolicy {
        WaitPolicy::new(Duration::from_secs(5), Duration::from_secs(1))
    }

    #[test]
    fn test_count_scripts_quote_selectors() {
        let css = Locator::css("th.race_num[scope='row']");
        assert_eq!(
            css.count_script(),
            "document.querySelectorAll(\"th.race_num[scope='row']\").length"
        );

        let xpath = Locator::link_text("検索");
        assert_eq!(xpath, Locator::XPath("//a[contains(text(), '検索')]".to_string()));
        assert!(xpath.element_script().contains("singleNodeValue"));
        assert!(xpath.count_script().contains("snapshotLength"));
    }

    #[test]
    fn test_js_string_escapes() {
        assert_eq!(js_string("a\"b"), "\"a\\\"b\"");
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_succeeds() {
        let polls = Cell::new(0);
        policy()
            .until("element", || {
                polls.set(polls.get() + 1);
                let ready = polls.get() >= 3;
                async move { Ok(ready) }
            })
            .await
            .unwrap();
        assert_eq!(polls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_times_out() {
        let err = policy()
            .until("#kaisaiY_list", || async { Ok(false) })
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { secs: 5, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_count_settles() {
        let readings = [0, 3, 7, 7, 9];
        let polls = Cell::new(0);
        let count = policy()
            .stable_count("rows", || {
                let reading = readings[polls.get()];
                polls.set(polls.get() + 1);
                async move { Ok(reading) }
            })
            .await
            .unwrap();
        assert_eq!(count, 7);
        assert_eq!(polls.get(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_count_is_advisory() {
        let polls = Cell::new(0);
        let count = policy()
            .stable_count("rows", || {
                polls.set(polls.get() + 1);
                let reading = polls.get();
                async move { Ok(reading) }
            })
            .await
            .unwrap();
        assert!(count > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_page_never_settles() {
        let count = policy()
            .stable_count("rows", || async { Ok(0) })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
