//! Rendered fetch strategy
//!
//! Pages that come back thin from a plain GET are often built client-side.
//! A [`PageRenderer`] loads such a page in a browser context and returns the
//! resulting DOM as HTML. The headless Chrome implementation is only compiled
//! with the `headless` feature.

use crate::crawler::fetcher::FetchError;
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// DOM captured by a renderer
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Serialized DOM after client-side scripts ran
    pub html: String,

    /// URL the browser ended on, when it differs from the request
    pub final_url: Option<Url>,
}

/// Executes a page's client-side logic and captures the resulting DOM
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &Url, timeout: Duration) -> Result<RenderedPage, FetchError>;
}

#[cfg(feature = "headless")]
pub use headless::HeadlessRenderer;

#[cfg(feature = "headless")]
mod headless {
    use super::{PageRenderer, RenderedPage};
    use crate::crawler::fetcher::FetchError;
    use crate::CrawlError;
    use async_trait::async_trait;
    use headless_chrome::{Browser, LaunchOptions, Tab};
    use std::sync::Arc;
    use std::time::Duration;
    use url::Url;

    /// Closes its tab when dropped, on success and on every error path
    ///
    /// A render abandoned by the outer timeout keeps running on its blocking
    /// thread until the tab's own timeout fires, then closes the tab here.
    struct TabGuard(Arc<Tab>);

    impl Drop for TabGuard {
        fn drop(&mut self) {
            if let Err(e) = self.0.close(true) {
                tracing::debug!("Failed to close render tab: {}", e);
            }
        }
    }

    /// Renders pages in a shared headless Chrome instance
    pub struct HeadlessRenderer {
        browser: Arc<Browser>,
    }

    impl HeadlessRenderer {
        /// Launches a headless browser
        ///
        /// Set `IN_DOCKER` to disable the Chrome sandbox inside containers.
        pub fn launch() -> Result<Self, CrawlError> {
            let in_docker = std::env::var("IN_DOCKER").is_ok();
            let options = LaunchOptions::default_builder()
                .headless(true)
                .sandbox(!in_docker)
                .idle_browser_timeout(Duration::from_secs(120))
                .build()
                .map_err(|e| CrawlError::Render(e.to_string()))?;
            let browser = Browser::new(options).map_err(|e| CrawlError::Render(e.to_string()))?;
            tracing::info!("Launched headless browser for rendered fetches");

            Ok(Self {
                browser: Arc::new(browser),
            })
        }

        #[cfg(test)]
        pub(crate) fn open_tab_count(&self) -> usize {
            self.browser
                .get_tabs()
                .lock()
                .map(|tabs| tabs.len())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl PageRenderer for HeadlessRenderer {
        async fn render(&self, url: &Url, timeout: Duration) -> Result<RenderedPage, FetchError> {
            let browser = Arc::clone(&self.browser);
            let target = url.to_string();

            // headless_chrome is blocking; keep it off the async workers
            let task = tokio::task::spawn_blocking(move || -> anyhow::Result<(String, String)> {
                let guard = TabGuard(browser.new_tab()?);
                let tab = &guard.0;
                tab.set_default_timeout(timeout);
                tab.navigate_to(&target)?;
                tab.wait_until_navigated()?;
                let html = tab.get_content()?;
                let final_url = tab.get_url();
                Ok((html, final_url))
            });

            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(Ok((html, final_url)))) => Ok(RenderedPage {
                    html,
                    final_url: Url::parse(&final_url).ok(),
                }),
                Ok(Ok(Err(e))) => Err(FetchError::Transient(format!("render failed: {}", e))),
                Ok(Err(e)) => Err(FetchError::Permanent(format!("render task failed: {}", e))),
                Err(_) => Err(FetchError::Transient("render timed out".to_string())),
            }
        }
    }
}
