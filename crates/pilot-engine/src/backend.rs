use async_trait::async_trait;
pub use pilot_common::error::BackendError;
pub use pilot_common::protocol::{
    DownloadInfo, ElementDescriptor, Locator, NavigationResult, SessionConfig,
};

/// Collects the visible interactive elements of the current page.
pub const COLLECT_ELEMENTS_SCRIPT: &str = r#"
(() => {
  const nodes = document.querySelectorAll(
    'input, textarea, select, button, a[href], [role="button"], [contenteditable="true"]'
  );
  const out = [];
  for (const el of nodes) {
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    if (rect.width === 0 || rect.height === 0) continue;
    if (style.visibility === 'hidden' || style.display === 'none') continue;
    out.push({
      index: out.length,
      tagName: el.tagName,
      id: el.id || '',
      className: typeof el.className === 'string' ? el.className : '',
      text: (el.innerText || el.value || '').trim().slice(0, 100),
      type: el.getAttribute('type') || '',
      name: el.getAttribute('name') || '',
      placeholder: el.getAttribute('placeholder') || '',
      ariaLabel: el.getAttribute('aria-label') || ''
    });
  }
  return out;
})()
"#;

/// The session driver every browser integration implements.
///
/// One instance drives one browser session. Methods return structured
/// `BackendError`s; drivers that only have opaque text use `Other`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Launch the browser session.
    async fn launch(&mut self, config: &SessionConfig) -> Result<(), BackendError>;

    /// Close the session and release its resources.
    async fn close(&mut self) -> Result<(), BackendError>;

    /// Check if the backend is ready to accept commands.
    async fn is_ready(&self) -> bool;

    /// Navigate to a URL and wait for the load to finish.
    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError>;

    async fn current_url(&mut self) -> Result<String, BackendError>;

    /// Wait until the located element is present and visible.
    async fn wait_for(&mut self, locator: &Locator) -> Result<(), BackendError>;

    async fn fill(&mut self, locator: &Locator, value: &str) -> Result<(), BackendError>;

    /// Press a single key on the located element.
    async fn press(&mut self, locator: &Locator, key: &str) -> Result<(), BackendError>;

    async fn click(&mut self, locator: &Locator) -> Result<(), BackendError>;

    /// Select an option of a `<select>` by its visible label.
    async fn select_option(&mut self, locator: &Locator, label: &str)
    -> Result<(), BackendError>;

    /// Wait until the current URL contains `fragment`.
    async fn wait_for_url(&mut self, fragment: &str) -> Result<(), BackendError>;

    /// Capture a PNG screenshot.
    async fn screenshot(&mut self, full_page: bool) -> Result<Vec<u8>, BackendError>;

    /// Execute a script in the page and return its JSON value.
    async fn execute_script(&mut self, _script: &str) -> Result<serde_json::Value, BackendError> {
        Err(BackendError::NotSupported("execute_script".into()))
    }

    /// Click the trigger and wait for the download it starts.
    async fn expect_download(&mut self, trigger: &Locator) -> Result<DownloadInfo, BackendError>;

    /// Reload the current page.
    async fn refresh(&mut self) -> Result<NavigationResult, BackendError> {
        Err(BackendError::NotSupported("refresh".into()))
    }

    async fn clear_cookies(&mut self) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("clear_cookies".into()))
    }

    async fn scroll_into_view(&mut self, _locator: &Locator) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("scroll_into_view".into()))
    }

    /// Candidate list for the element oracle.
    async fn interactive_elements(&mut self) -> Result<Vec<ElementDescriptor>, BackendError> {
        let value = self.execute_script(COLLECT_ELEMENTS_SCRIPT).await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Creates one fresh backend per scenario run.
pub trait BackendProvider: Send + Sync {
    fn create(&self) -> Box<dyn Backend>;
}

impl<F> BackendProvider for F
where
    F: Fn() -> Box<dyn Backend> + Send + Sync,
{
    fn create(&self) -> Box<dyn Backend> {
        self()
    }
}
