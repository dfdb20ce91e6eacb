#![allow(dead_code)]

use async_trait::async_trait;
use pilot_engine::backend::{
    Backend, BackendError, BackendProvider, DownloadInfo, ElementDescriptor, Locator,
    NavigationResult, SessionConfig,
};
use pilot_engine::oracle::{ElementOracle, OracleError, SmartKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A scripted failure for one operation.
pub struct Scripted {
    /// How many more calls fail. `u32::MAX` means every call.
    pub remaining: u32,
    pub error: fn() -> BackendError,
}

#[derive(Default)]
pub struct MockState {
    pub url: String,
    pub calls: Vec<String>,
    pub launches: usize,
    pub closes: usize,
    pub sessions: Vec<SessionConfig>,
    pub launch_error: Option<String>,
    pub elements: Vec<ElementDescriptor>,
    /// Operations that never finish on their own.
    pub hang: Vec<&'static str>,
    failures: HashMap<&'static str, Scripted>,
}

impl MockState {
    pub fn fail(&mut self, op: &'static str, times: u32, error: fn() -> BackendError) {
        self.failures.insert(
            op,
            Scripted {
                remaining: times,
                error,
            },
        );
    }

    pub fn fail_always(&mut self, op: &'static str, error: fn() -> BackendError) {
        self.fail(op, u32::MAX, error);
    }

    pub fn calls_to(&self, op: &str) -> usize {
        self.calls
            .iter()
            .filter(|c| c.split(' ').next() == Some(op))
            .count()
    }
}

pub type Shared = Arc<Mutex<MockState>>;

pub fn shared() -> Shared {
    Arc::new(Mutex::new(MockState {
        url: "about:blank".into(),
        ..Default::default()
    }))
}

pub struct MockBackend {
    state: Shared,
}

impl MockBackend {
    pub fn new(state: Shared) -> Self {
        Self { state }
    }

    async fn record(&self, op: &'static str, arg: &str) -> Result<(), BackendError> {
        let hang = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("{} {}", op, arg).trim_end().to_string());
            if let Some(scripted) = state.failures.get_mut(op)
                && scripted.remaining > 0
            {
                if scripted.remaining != u32::MAX {
                    scripted.remaining -= 1;
                }
                return Err((scripted.error)());
            }
            state.hang.contains(&op)
        };
        if hang {
            tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        }
        Ok(())
    }

    fn nav(&self) -> NavigationResult {
        NavigationResult {
            url: self.state.lock().unwrap().url.clone(),
            title: "Mock".into(),
            status: 200,
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn launch(&mut self, config: &SessionConfig) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.launches += 1;
        state.sessions.push(config.clone());
        match &state.launch_error {
            Some(msg) => Err(BackendError::Launch(msg.clone())),
            None => Ok(()),
        }
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        true
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError> {
        self.record("navigate", url).await?;
        self.state.lock().unwrap().url = url.to_string();
        Ok(self.nav())
    }

    async fn current_url(&mut self) -> Result<String, BackendError> {
        self.record("current_url", "").await?;
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn wait_for(&mut self, locator: &Locator) -> Result<(), BackendError> {
        self.record("wait_for", &locator.to_string()).await
    }

    async fn fill(&mut self, locator: &Locator, value: &str) -> Result<(), BackendError> {
        self.record("fill", &format!("{} {}", locator, value)).await
    }

    async fn press(&mut self, locator: &Locator, key: &str) -> Result<(), BackendError> {
        self.record("press", &format!("{} {}", locator, key)).await
    }

    async fn click(&mut self, locator: &Locator) -> Result<(), BackendError> {
        self.record("click", &locator.to_string()).await
    }

    async fn select_option(&mut self, locator: &Locator, label: &str) -> Result<(), BackendError> {
        self.record("select", &format!("{} {}", locator, label)).await
    }

    async fn wait_for_url(&mut self, fragment: &str) -> Result<(), BackendError> {
        self.record("wait_for_url", fragment).await
    }

    async fn screenshot(&mut self, full_page: bool) -> Result<Vec<u8>, BackendError> {
        self.record("screenshot", &full_page.to_string()).await?;
        Ok(b"\x89PNG".to_vec())
    }

    async fn expect_download(&mut self, trigger: &Locator) -> Result<DownloadInfo, BackendError> {
        self.record("expect_download", &trigger.to_string()).await?;
        Ok(DownloadInfo {
            suggested_filename: "report.csv".into(),
            url: None,
        })
    }

    async fn refresh(&mut self) -> Result<NavigationResult, BackendError> {
        self.record("refresh", "").await?;
        Ok(self.nav())
    }

    async fn clear_cookies(&mut self) -> Result<(), BackendError> {
        self.record("clear_cookies", "").await
    }

    async fn scroll_into_view(&mut self, locator: &Locator) -> Result<(), BackendError> {
        self.record("scroll_into_view", &locator.to_string()).await
    }

    async fn interactive_elements(&mut self) -> Result<Vec<ElementDescriptor>, BackendError> {
        self.record("interactive_elements", "").await?;
        Ok(self.state.lock().unwrap().elements.clone())
    }
}

pub fn provider(state: &Shared) -> Arc<dyn BackendProvider> {
    let state = state.clone();
    Arc::new(move || -> Box<dyn Backend> { Box::new(MockBackend::new(state.clone())) })
}

/// Oracle that always returns the same answer.
pub struct StubOracle {
    pub choice: Option<usize>,
    pub fail: bool,
}

impl StubOracle {
    pub fn picks(choice: Option<usize>) -> Arc<dyn ElementOracle> {
        Arc::new(Self {
            choice,
            fail: false,
        })
    }

    pub fn failing() -> Arc<dyn ElementOracle> {
        Arc::new(Self {
            choice: None,
            fail: true,
        })
    }
}

#[async_trait]
impl ElementOracle for StubOracle {
    async fn select(
        &self,
        _candidates: &[ElementDescriptor],
        _task: &str,
        _kind: SmartKind,
    ) -> Result<Option<usize>, OracleError> {
        if self.fail {
            return Err(OracleError::Response("connection reset".into()));
        }
        Ok(self.choice)
    }
}

pub fn element(index: usize, tag: &str, id: &str, text: &str) -> ElementDescriptor {
    ElementDescriptor {
        index,
        tag_name: tag.into(),
        id: id.into(),
        text: text.into(),
        ..Default::default()
    }
}
