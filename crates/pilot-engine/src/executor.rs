//! Step dispatch.
//!
//! `StepDispatcher` owns the browser session for one scenario run and turns a
//! [`Step`] into a [`StepResult`]. Every action kind has exactly one handler.
//! Handler failures are converted into classified step failures here; only a
//! missing session escapes as an error.

use crate::backend::Backend;
use crate::config::SecurityConfig;
use crate::oracle::{ElementOracle, SmartKind};
use crate::planner::FallbackAction;
use pilot_common::error::{BackendError, ErrorKind};
use pilot_common::error_mapping::hint_for_kind;
use pilot_common::protocol::{Locator, SessionConfig};
use pilot_common::result::{StepFailure, StepOutcome, StepResult};
use pilot_common::scenario::{
    Action, ClickAction, DownloadAction, FillAction, ScreenshotAction, SelectAction, Step,
    WaitAction, resolve_url,
};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Fill target that needs a keystroke to wake up client-side search handlers.
const SEARCH_BOX_SELECTOR: &str = "#search_tb";

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("No active browser session. Open a session before executing steps.")]
    NoSession,

    #[error("Failed to open browser session: {0}")]
    SessionOpen(#[source] BackendError),
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub screenshots_dir: PathBuf,
    /// Bound on waiting for an element to appear.
    pub element_timeout: Duration,
    pub download_timeout: Duration,
    /// Step budget when neither the step nor the session sets one.
    pub default_timeout_ms: u64,
    pub security: SecurityConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            screenshots_dir: PathBuf::from("screenshots"),
            element_timeout: Duration::from_secs(10),
            download_timeout: Duration::from_secs(30),
            default_timeout_ms: 30000,
            security: SecurityConfig::default(),
        }
    }
}

pub struct StepDispatcher {
    backend: Option<Box<dyn Backend>>,
    oracle: Option<Arc<dyn ElementOracle>>,
    config: DispatcherConfig,
    base_url: Option<String>,
    session_timeout_ms: Option<u64>,
}

impl StepDispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            backend: None,
            oracle: None,
            config,
            base_url: None,
            session_timeout_ms: None,
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn ElementOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn set_base_url(&mut self, base_url: Option<String>) {
        self.base_url = base_url;
    }

    pub fn has_session(&self) -> bool {
        self.backend.is_some()
    }

    /// Launches `backend` and keeps it as the active session.
    pub async fn open(
        &mut self,
        mut backend: Box<dyn Backend>,
        session: &SessionConfig,
    ) -> Result<(), DispatchError> {
        info!(
            browser = session.browser.as_str(),
            headless = session.headless,
            "Opening browser session"
        );
        if let Err(e) = backend.launch(session).await {
            if let Err(close_err) = backend.close().await {
                debug!("Cleanup after failed launch also failed: {}", close_err);
            }
            return Err(DispatchError::SessionOpen(e));
        }
        self.session_timeout_ms = Some(session.timeout_ms);
        self.backend = Some(backend);
        Ok(())
    }

    /// Closes the active session, if any. Safe to call more than once.
    pub async fn close(&mut self) -> Result<(), BackendError> {
        self.session_timeout_ms = None;
        match self.backend.take() {
            Some(mut backend) => {
                info!("Closing browser session");
                backend.close().await
            }
            None => Ok(()),
        }
    }

    fn step_budget(&self, step: &Step) -> Duration {
        let base_ms = step
            .timeout_ms
            .or(self.session_timeout_ms)
            .unwrap_or(self.config.default_timeout_ms);
        // out-of-range seconds are rejected by the wait handler
        let extra = match &step.action {
            Action::Wait(WaitAction {
                seconds: Some(s), ..
            }) => Duration::try_from_secs_f64(*s).unwrap_or(Duration::ZERO),
            _ => Duration::ZERO,
        };
        Duration::from_millis(base_ms).saturating_add(extra)
    }

    /// Runs one step and returns its result. Handler failures are part of the
    /// result; only a missing session is an error.
    pub async fn execute(&mut self, step: &Step, index: usize) -> Result<StepResult, DispatchError> {
        let budget = self.step_budget(step);
        let backend = self
            .backend
            .as_deref_mut()
            .ok_or(DispatchError::NoSession)?;

        let kind = step.action_type();
        info!(step_index = index, action = %kind, "Executing step");

        let mut runner = ActionRunner {
            backend,
            oracle: self.oracle.as_deref(),
            config: &self.config,
            base_url: self.base_url.as_deref(),
        };

        let started = Instant::now();
        let outcome = match tokio::time::timeout(budget, runner.run(&step.action)).await {
            Ok(result) => result,
            Err(_) => Err(StepFailure::new(
                format!("Timeout {}ms exceeded", budget.as_millis()),
                ErrorKind::Timeout,
            )),
        };
        let duration = started.elapsed().as_secs_f64();

        let result = match outcome {
            Ok(outcome) => {
                debug!(step_index = index, duration, "Step succeeded");
                StepResult::success(index, kind, duration, outcome)
            }
            Err(failure) => {
                warn!(
                    step_index = index,
                    action = %kind,
                    error_kind = %failure.kind,
                    error = %failure.message,
                    hint = hint_for_kind(failure.kind),
                    "Step failed"
                );
                StepResult::failure(index, kind, duration, failure)
            }
        };
        Ok(result.with_target(step.target()))
    }

    /// Performs one recovery fallback action against the session.
    pub async fn apply_fallback(
        &mut self,
        action: &FallbackAction,
        step: &Step,
    ) -> Result<(), BackendError> {
        let backend = self.backend.as_deref_mut().ok_or(BackendError::NotReady)?;
        debug!(?action, "Applying fallback action");
        match action {
            FallbackAction::Wait { seconds } => {
                if let Ok(pause) = Duration::try_from_secs_f64(*seconds) {
                    tokio::time::sleep(pause).await;
                }
                Ok(())
            }
            FallbackAction::ScrollIntoView => match step_locator(step) {
                Some(locator) => backend.scroll_into_view(&locator).await,
                None => Ok(()),
            },
            FallbackAction::RefreshPage => backend.refresh().await.map(|_| ()),
            FallbackAction::ClearCookies => backend.clear_cookies().await,
            FallbackAction::RetryStep | FallbackAction::RetryNavigation => Ok(()),
        }
    }
}

/// The locator a step acts on, following each action's selector priority.
pub fn step_locator(step: &Step) -> Option<Locator> {
    match &step.action {
        Action::Fill(f) => fill_locator(f),
        Action::Click(c) => click_locator(c),
        Action::Select(s) => select_locator(s),
        Action::Wait(WaitAction {
            for_element: Some(sel),
            ..
        }) => Some(Locator::Css(sel.clone())),
        Action::ExpectDownload(d) => download_locator(d),
        _ => None,
    }
}

fn fill_locator(fill: &FillAction) -> Option<Locator> {
    fill.label
        .clone()
        .map(Locator::Label)
        .or_else(|| fill.placeholder.clone().map(Locator::Placeholder))
        .or_else(|| fill.selector.clone().map(Locator::Css))
}

fn click_locator(click: &ClickAction) -> Option<Locator> {
    click
        .text
        .clone()
        .map(Locator::Text)
        .or_else(|| click.selector.clone().map(Locator::Css))
        .or_else(|| click.label.clone().map(Locator::AriaLabel))
}

fn select_locator(select: &SelectAction) -> Option<Locator> {
    select
        .label
        .clone()
        .map(Locator::Label)
        .or_else(|| select.selector.clone().map(Locator::Css))
}

fn download_locator(download: &DownloadAction) -> Option<Locator> {
    download
        .trigger_selector
        .clone()
        .map(Locator::Css)
        .or_else(|| download.trigger_text.clone().map(Locator::Text))
}

fn invalid(action: &str, reason: &str) -> StepFailure {
    StepFailure::new(
        format!("invalid {} step: {}", action, reason),
        ErrorKind::InvalidStep,
    )
}

async fn bounded<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::timeout(
            operation,
            u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        )),
    }
}

/// Borrowed view of the dispatcher used while one step runs.
struct ActionRunner<'a> {
    backend: &'a mut dyn Backend,
    oracle: Option<&'a dyn ElementOracle>,
    config: &'a DispatcherConfig,
    base_url: Option<&'a str>,
}

impl ActionRunner<'_> {
    async fn run(&mut self, action: &Action) -> Result<StepOutcome, StepFailure> {
        match action {
            Action::Goto(url) => self.goto(url).await,
            Action::Fill(fill) => self.fill(fill).await,
            Action::Click(click) => self.click(click).await,
            Action::Select(select) => self.select(select).await,
            Action::AssertUrlContains(fragment) => self.assert_url(fragment, true).await,
            Action::AssertUrlNotContains(fragment) => self.assert_url(fragment, false).await,
            Action::Wait(wait) => self.wait(wait).await,
            Action::Screenshot(shot) => self.screenshot(shot).await,
            Action::ExpectDownload(download) => self.expect_download(download).await,
            Action::SmartFill(smart) => {
                self.smart(&smart.task, SmartKind::Fill, Some(&smart.value))
                    .await
            }
            Action::SmartClick(smart) => self.smart(&smart.task, SmartKind::Click, None).await,
        }
    }

    async fn wait_for_element(&mut self, locator: &Locator) -> Result<(), BackendError> {
        let limit = self.config.element_timeout;
        bounded(
            limit,
            &format!("waiting for {}", locator),
            self.backend.wait_for(locator),
        )
        .await
    }

    fn shown_value(&self, field: &str, value: &str) -> String {
        if self.config.security.is_sensitive(field) {
            "***".to_string()
        } else {
            value.to_string()
        }
    }

    async fn goto(&mut self, url: &str) -> Result<StepOutcome, StepFailure> {
        let target = resolve_url(self.base_url, url);
        let nav = self.backend.navigate(&target).await?;
        info!(url = %target, current_url = %nav.url, "Navigated");
        Ok(StepOutcome::Navigated {
            url: target,
            current_url: nav.url,
        })
    }

    async fn fill(&mut self, fill: &FillAction) -> Result<StepOutcome, StepFailure> {
        let locator = fill_locator(fill)
            .ok_or_else(|| invalid("fill", "needs a label, placeholder or selector"))?;

        self.wait_for_element(&locator).await?;
        self.backend.fill(&locator, &fill.value).await?;

        if matches!(&locator, Locator::Css(sel) if sel == SEARCH_BOX_SELECTOR) {
            self.backend.press(&locator, " ").await?;
            self.backend.press(&locator, "Backspace").await?;
        }

        let field = locator.to_string();
        let value = self.shown_value(&field, &fill.value);
        info!(field = %field, value = %value, "Filled field");
        Ok(StepOutcome::Filled { field, value })
    }

    async fn click(&mut self, click: &ClickAction) -> Result<StepOutcome, StepFailure> {
        let locator = click_locator(click)
            .ok_or_else(|| invalid("click", "needs text, a selector or a label"))?;

        self.wait_for_element(&locator).await?;
        self.backend.click(&locator).await?;

        info!(target = %locator, "Clicked");
        Ok(StepOutcome::Clicked {
            target: locator.to_string(),
        })
    }

    async fn select(&mut self, select: &SelectAction) -> Result<StepOutcome, StepFailure> {
        let locator =
            select_locator(select).ok_or_else(|| invalid("select", "needs a label or selector"))?;

        self.wait_for_element(&locator).await?;
        self.backend.select_option(&locator, &select.option).await?;

        info!(field = %locator, option = %select.option, "Selected option");
        Ok(StepOutcome::Selected {
            field: locator.to_string(),
            option: select.option.clone(),
        })
    }

    async fn assert_url(
        &mut self,
        fragment: &str,
        should_contain: bool,
    ) -> Result<StepOutcome, StepFailure> {
        let current_url = self.backend.current_url().await?;
        let contains = current_url.contains(fragment);
        if contains != should_contain {
            let expectation = if should_contain { "to contain" } else { "not to contain" };
            return Err(StepFailure::new(
                format!(
                    "URL assertion failed: expected '{}' {} '{}'",
                    current_url, expectation, fragment
                ),
                ErrorKind::AssertionFailed,
            ));
        }
        info!(url = %current_url, fragment, should_contain, "URL assertion passed");
        Ok(StepOutcome::UrlAsserted {
            fragment: fragment.to_string(),
            should_contain,
            current_url,
            passed: true,
        })
    }

    async fn wait(&mut self, wait: &WaitAction) -> Result<StepOutcome, StepFailure> {
        if let Some(seconds) = wait.seconds {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(invalid("wait", "seconds must be a non-negative number"));
            }
            let pause = Duration::try_from_secs_f64(seconds)
                .map_err(|_| invalid("wait", "seconds out of range"))?;
            tokio::time::sleep(pause).await;
        } else if let Some(selector) = &wait.for_element {
            self.wait_for_element(&Locator::Css(selector.clone()))
                .await?;
        } else if let Some(fragment) = &wait.for_url_contains {
            let limit = self.config.element_timeout;
            bounded(
                limit,
                &format!("waiting for URL containing '{}'", fragment),
                self.backend.wait_for_url(fragment),
            )
            .await?;
        } else {
            warn!("Wait step has no condition; treating it as a no-op");
        }
        Ok(StepOutcome::Waited)
    }

    async fn screenshot(&mut self, shot: &ScreenshotAction) -> Result<StepOutcome, StepFailure> {
        let bytes = self.backend.screenshot(shot.full_page).await?;
        let dir = &self.config.screenshots_dir;
        let path = dir.join(format!("{}.png", shot.name));
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(BackendError::from)?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(BackendError::from)?;

        info!(path = %path.display(), bytes = bytes.len(), "Screenshot saved");
        Ok(StepOutcome::Screenshot {
            name: shot.name.clone(),
            path: path.display().to_string(),
            full_page: shot.full_page,
        })
    }

    async fn expect_download(
        &mut self,
        download: &DownloadAction,
    ) -> Result<StepOutcome, StepFailure> {
        let trigger = download_locator(download).ok_or_else(|| {
            invalid("expect_download", "needs a trigger_selector or trigger_text")
        })?;

        let limit = self.config.download_timeout;
        let info = bounded(
            limit,
            &format!("download triggered by {}", trigger),
            self.backend.expect_download(&trigger),
        )
        .await?;

        info!(filename = %info.suggested_filename, "Download started");
        Ok(StepOutcome::Download {
            filename: info.suggested_filename,
        })
    }

    async fn smart(
        &mut self,
        task: &str,
        kind: SmartKind,
        value: Option<&str>,
    ) -> Result<StepOutcome, StepFailure> {
        let oracle = self.oracle.ok_or_else(|| {
            StepFailure::new(
                "Smart steps need an element oracle, none is configured",
                ErrorKind::Unknown,
            )
        })?;

        let candidates = self.backend.interactive_elements().await?;
        debug!(candidates = candidates.len(), task, "Asking element oracle");

        let choice = oracle
            .select(&candidates, task, kind)
            .await
            .map_err(|e| StepFailure::new(e.to_string(), ErrorKind::Unknown))?;

        let element = choice.and_then(|i| candidates.get(i)).ok_or_else(|| {
            StepFailure::new(
                format!("Element not found for task: {}", task),
                ErrorKind::ElementNotFound,
            )
        })?;

        let selector = element.preferred_selector();
        let locator = Locator::Css(selector.clone());
        match (kind, value) {
            (SmartKind::Fill, Some(value)) => {
                self.backend.fill(&locator, value).await?;
                let shown = self.shown_value(task, value);
                info!(task, selector = %selector, value = %shown, "Smart fill");
            }
            _ => {
                self.backend.click(&locator).await?;
                info!(task, selector = %selector, "Smart click");
            }
        }

        Ok(StepOutcome::Smart {
            task: task.to_string(),
            selector,
            element: element.describe(),
        })
    }
}
