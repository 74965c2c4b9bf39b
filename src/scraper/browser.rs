//! Browser automation using chromiumoxide.

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::fetcher::{js_string, Locator, PageFetcher, WaitPolicy};
use crate::config::ChromeConfig;
use crate::error::FetchError;

/// [`PageFetcher`] backed by one Chrome tab
pub struct ChromeFetcher {
    browser: Browser,
    page: Page,
    handle: tokio::task::JoinHandle<()>,
    wait: WaitPolicy,
    /// Pause after every action so the page can start reacting
    settle: Duration,
}

impl ChromeFetcher {
    /// Launch a browser and open a blank tab
    pub async fn launch(config: &ChromeConfig) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .chrome_executable(&config.executable)
            .no_sandbox()
            .disable_default_args()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-software-rasterizer")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--mute-audio")
            .window_size(1920, 1080);
        if config.headless {
            builder = builder.arg("--headless=new");
        }
        let browser_config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to launch browser: {}", e))?;

        let handle = tokio::spawn(async move {
            let errors = drive_handler(&mut handler).await;
            debug!(errors, "Browser event loop ended");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create new page: {}", e))?;
        info!(executable = %config.executable, headless = config.headless, "Browser ready");

        Ok(Self {
            browser,
            page,
            handle,
            wait: config.wait_policy(),
            settle: config.settle_delay(),
        })
    }

    /// Close the browser
    pub async fn close(mut self) -> Result<()> {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        self.handle.abort();
        Ok(())
    }
}

/// Poll the CDP event stream until the connection closes.
///
/// Returns the number of errors seen; each one is logged and the loop goes on.
async fn drive_handler<S, E>(events: &mut S) -> usize
where
    S: Stream<Item = Result<(), E>> + Unpin,
    E: fmt::Display,
{
    let mut errors = 0;
    while let Some(event) = events.next().await {
        if let Err(e) = event {
            errors += 1;
            warn!("Browser connection error: {}", e);
        }
    }
    errors
}

async fn evaluate<T: DeserializeOwned>(page: &Page, script: String) -> Result<T, FetchError> {
    let result = page.evaluate(script.clone()).await?;
    result
        .into_value::<T>()
        .map_err(|e| FetchError::Script(format!("{}: {}", script, e)))
}

async fn count_elements(page: &Page, locator: &Locator) -> Result<usize, FetchError> {
    evaluate(page, locator.count_script()).await
}

#[async_trait]
impl PageFetcher for ChromeFetcher {
    async fn navigate(&mut self, url: &str) -> Result<(), FetchError> {
        debug!("Navigating to {}", url);
        self.page.goto(url).await?;
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    async fn click(&mut self, locator: &Locator) -> Result<(), FetchError> {
        debug!("Clicking {}", locator);
        let element = match locator {
            Locator::Css(selector) => self.page.find_element(selector.as_str()).await?,
            Locator::XPath(expression) => self.page.find_xpath(expression.as_str()).await?,
        };
        element.click().await?;
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    async fn wait_for_element(&mut self, locator: &Locator) -> Result<(), FetchError> {
        let page = self.page.clone();
        let page = &page;
        self.wait
            .until(&locator.to_string(), || async move {
                Ok(count_elements(page, locator).await? > 0)
            })
            .await
    }

    async fn wait_for_stable_count(&mut self, locator: &Locator) -> Result<usize, FetchError> {
        let page = self.page.clone();
        let page = &page;
        self.wait
            .stable_count(&locator.to_string(), || async move {
                count_elements(page, locator).await
            })
            .await
    }

    async fn wait_for_ready(&mut self) -> Result<(), FetchError> {
        let page = self.page.clone();
        let page = &page;
        self.wait
            .until("document ready", || async move {
                let state: String = evaluate(page, "document.readyState".to_string()).await?;
                Ok(state == "complete")
            })
            .await
    }

    async fn select_option(&mut self, locator: &Locator, value: &str) -> Result<(), FetchError> {
        let script = format!(
            "(() => {{ const el = {}; if (!el) return false; el.value = {}; \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()",
            locator.element_script(),
            js_string(value)
        );
        let found: bool = evaluate(&self.page, script).await?;
        if !found {
            return Err(FetchError::Script(format!("no element for {}", locator)));
        }
        debug!("Selected {} in {}", value, locator);
        Ok(())
    }

    async fn current_html(&mut self) -> Result<String, FetchError> {
        Ok(self.page.content().await?)
    }

    async fn back(&mut self) -> Result<(), FetchError> {
        let depth: usize = evaluate(&self.page, "window.history.length".to_string()).await?;
        if depth <= 1 {
            return Err(FetchError::EmptyHistory);
        }
        self.page.evaluate("window.history.back()".to_string()).await?;
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    async fn switch_window(&mut self, index: usize) -> Result<(), FetchError> {
        let pages = self.browser.pages().await?;
        self.page = pages
            .into_iter()
            .nth(index)
            .ok_or(FetchError::NoWindow(index))?;
        Ok(())
    }

    async fn run_script(&mut self, script: &str) -> Result<(), FetchError> {
        debug!("Running script {}", script);
        // Handlers are copied from onclick attributes and may start with `return`
        self.page
            .evaluate(format!("(function() {{ {} }})()", script))
            .await?;
        tokio::time::sleep(self.settle).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_drive_handler_counts_errors() {
        let mut events = stream::iter(vec![
            Ok(()),
            Err("websocket closed"),
            Ok(()),
            Err("bad frame"),
        ]);
        assert_eq!(drive_handler(&mut events).await, 2);

        let mut quiet = stream::iter(Vec::<Result<(), String>>::new());
        assert_eq!(drive_handler(&mut quiet).await, 0);
    }
}
