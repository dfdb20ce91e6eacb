use crate::cdp::CdpClient;
use crate::inject::{self, evaluate};
use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::network::ClearBrowserCookiesParams;
use chromiumoxide::cdp::browser_protocol::browser::EventDownloadWillBegin;
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use pilot_engine::backend::{
    Backend, BackendError, DownloadInfo, Locator, NavigationResult, SessionConfig,
};
use pilot_engine::protocol::BrowserKind;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct HeadlessBackend {
    client: Option<CdpClient>,
    downloads_dir: PathBuf,
}

impl HeadlessBackend {
    pub fn new(downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: None,
            downloads_dir: downloads_dir.into(),
        }
    }

    pub fn get_client(&self) -> Option<&CdpClient> {
        self.client.as_ref()
    }

    fn page(&self) -> Result<&Page, BackendError> {
        self.client
            .as_ref()
            .map(|c| &c.page)
            .ok_or(BackendError::NotReady)
    }

    async fn get_navigation_result(page: &Page) -> Result<NavigationResult, BackendError> {
        let title = page
            .get_title()
            .await
            .unwrap_or_default()
            .unwrap_or_default();
        let url = page
            .url()
            .await
            .map_err(|e| BackendError::Navigation(e.to_string()))?
            .unwrap_or_default();
        Ok(NavigationResult {
            url,
            title,
            status: 200,
        })
    }

    /// Tags the element matching `locator` and returns its reference.
    async fn tag(&self, locator: &Locator) -> Result<String, BackendError> {
        let page = self.page()?;
        let expression = inject::find_expression(locator)?;
        let value = inject::script_result(evaluate(page, &expression).await?)?;
        match value {
            serde_json::Value::String(reference) => Ok(reference),
            _ => Err(BackendError::ElementNotFound {
                locator: locator.to_string(),
            }),
        }
    }

    async fn element(&self, locator: &Locator) -> Result<(String, Element), BackendError> {
        let reference = self.tag(locator).await?;
        let element = self
            .page()?
            .find_element(inject::ref_selector(&reference))
            .await
            .map_err(|_| BackendError::ElementNotFound {
                locator: locator.to_string(),
            })?;
        Ok((reference, element))
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new("downloads")
    }
}

fn classify_navigation(e: impl std::fmt::Display) -> BackendError {
    let message = e.to_string();
    if message.contains("ERR_INTERNET_DISCONNECTED")
        || message.contains("ERR_NAME_NOT_RESOLVED")
        || message.contains("ERR_CONNECTION")
    {
        BackendError::Network(message)
    } else {
        BackendError::Navigation(message)
    }
}

#[async_trait]
impl Backend for HeadlessBackend {
    async fn launch(&mut self, config: &SessionConfig) -> Result<(), BackendError> {
        if config.browser != BrowserKind::Chromium {
            warn!(
                browser = config.browser.as_str(),
                "Only Chromium is supported by this driver, falling back to Chromium"
            );
        }
        info!(headless = config.headless, "Launching headless backend (Chromium)");
        let client = CdpClient::launch(config.headless, &self.downloads_dir)
            .await
            .map_err(|e| BackendError::Launch(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        if let Some(client) = self.client.take() {
            client
                .close()
                .await
                .map_err(|e| BackendError::Other(e.to_string()))?;
        }
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.client.is_some()
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError> {
        let page = self.page()?;
        info!("Navigating to: {}", url);
        page.goto(url).await.map_err(classify_navigation)?;
        Self::get_navigation_result(page).await
    }

    async fn current_url(&mut self) -> Result<String, BackendError> {
        Ok(self
            .page()?
            .url()
            .await
            .map_err(|e| BackendError::Other(format!("Reading URL failed: {}", e)))?
            .unwrap_or_default())
    }

    /// Polls until the element exists. The caller bounds the wait.
    async fn wait_for(&mut self, locator: &Locator) -> Result<(), BackendError> {
        loop {
            match self.tag(locator).await {
                Ok(_) => return Ok(()),
                Err(BackendError::ElementNotFound { .. }) => tokio::time::sleep(POLL_INTERVAL).await,
                Err(e) => return Err(e),
            }
        }
    }

    async fn fill(&mut self, locator: &Locator, value: &str) -> Result<(), BackendError> {
        let reference = self.tag(locator).await?;
        let expression = inject::fill_expression(&reference, value)?;
        inject::script_result(evaluate(self.page()?, &expression).await?)?;
        Ok(())
    }

    async fn press(&mut self, locator: &Locator, key: &str) -> Result<(), BackendError> {
        let (_, element) = self.element(locator).await?;
        element
            .focus()
            .await
            .map_err(|e| BackendError::Other(format!("focus failed: {}", e)))?;
        element
            .press_key(key)
            .await
            .map_err(|e| BackendError::Other(format!("press '{}' failed: {}", key, e)))?;
        Ok(())
    }

    async fn click(&mut self, locator: &Locator) -> Result<(), BackendError> {
        let (_, element) = self.element(locator).await?;
        element
            .scroll_into_view()
            .await
            .map_err(|e| BackendError::Other(format!("scroll failed: {}", e)))?;
        element
            .click()
            .await
            .map_err(|e| BackendError::Other(format!("click failed: {}", e)))?;
        Ok(())
    }

    async fn select_option(&mut self, locator: &Locator, label: &str) -> Result<(), BackendError> {
        let reference = self.tag(locator).await?;
        let expression = inject::select_expression(&reference, label)?;
        inject::script_result(evaluate(self.page()?, &expression).await?)?;
        Ok(())
    }

    async fn wait_for_url(&mut self, fragment: &str) -> Result<(), BackendError> {
        loop {
            if self.current_url().await?.contains(fragment) {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn screenshot(&mut self, full_page: bool) -> Result<Vec<u8>, BackendError> {
        self.page()?
            .screenshot(ScreenshotParams::builder().full_page(full_page).build())
            .await
            .map_err(|e| BackendError::Other(format!("Screenshot failed: {}", e)))
    }

    async fn execute_script(&mut self, script: &str) -> Result<serde_json::Value, BackendError> {
        evaluate(self.page()?, script).await
    }

    async fn expect_download(&mut self, trigger: &Locator) -> Result<DownloadInfo, BackendError> {
        let mut downloads = self
            .page()?
            .event_listener::<EventDownloadWillBegin>()
            .await
            .map_err(|e| BackendError::Other(format!("Download listener failed: {}", e)))?;

        self.click(trigger).await?;

        let event = downloads
            .next()
            .await
            .ok_or_else(|| BackendError::Other("Download event stream closed".into()))?;
        debug!(url = %event.url, "Download will begin");
        Ok(DownloadInfo {
            suggested_filename: event.suggested_filename.clone(),
            url: Some(event.url.clone()),
        })
    }

    async fn refresh(&mut self) -> Result<NavigationResult, BackendError> {
        let page = self.page()?;
        page.reload()
            .await
            .map_err(|e| BackendError::Navigation(format!("refresh failed: {}", e)))?;
        Self::get_navigation_result(page).await
    }

    async fn clear_cookies(&mut self) -> Result<(), BackendError> {
        self.page()?
            .execute(ClearBrowserCookiesParams::default())
            .await
            .map_err(|e| BackendError::Other(format!("clear cookies failed: {}", e)))?;
        Ok(())
    }

    async fn scroll_into_view(&mut self, locator: &Locator) -> Result<(), BackendError> {
        let (_, element) = self.element(locator).await?;
        element
            .scroll_into_view()
            .await
            .map_err(|e| BackendError::Other(format!("scroll failed: {}", e)))?;
        Ok(())
    }
}
