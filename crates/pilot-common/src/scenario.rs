//! Scenario and step model.
//!
//! A step carries exactly one action. The YAML form is a mapping with a single
//! action key (`goto`, `fill`, `click`, ...), which is validated when the step
//! is built from its raw form.

use crate::error::InvalidStepError;
use crate::protocol::{BrowserKind, SessionConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FillAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClickAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub option: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_element: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_url_contains: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotAction {
    #[serde(default = "default_screenshot_name")]
    pub name: String,
    #[serde(default)]
    pub full_page: bool,
}

fn default_screenshot_name() -> String {
    "step_screenshot".to_string()
}

impl Default for ScreenshotAction {
    fn default() -> Self {
        Self {
            name: default_screenshot_name(),
            full_page: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmartFillAction {
    pub task: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmartClickAction {
    pub task: String,
}

/// The closed set of step actions.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Goto(String),
    Fill(FillAction),
    Click(ClickAction),
    Select(SelectAction),
    AssertUrlContains(String),
    AssertUrlNotContains(String),
    Wait(WaitAction),
    Screenshot(ScreenshotAction),
    ExpectDownload(DownloadAction),
    SmartFill(SmartFillAction),
    SmartClick(SmartClickAction),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Goto(_) => ActionKind::Goto,
            Action::Fill(_) => ActionKind::Fill,
            Action::Click(_) => ActionKind::Click,
            Action::Select(_) => ActionKind::Select,
            Action::AssertUrlContains(_) => ActionKind::AssertUrlContains,
            Action::AssertUrlNotContains(_) => ActionKind::AssertUrlNotContains,
            Action::Wait(_) => ActionKind::Wait,
            Action::Screenshot(_) => ActionKind::Screenshot,
            Action::ExpectDownload(_) => ActionKind::ExpectDownload,
            Action::SmartFill(_) => ActionKind::SmartFill,
            Action::SmartClick(_) => ActionKind::SmartClick,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Goto,
    Fill,
    Click,
    Select,
    AssertUrlContains,
    AssertUrlNotContains,
    Wait,
    Screenshot,
    ExpectDownload,
    SmartFill,
    SmartClick,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Goto => "goto",
            ActionKind::Fill => "fill",
            ActionKind::Click => "click",
            ActionKind::Select => "select",
            ActionKind::AssertUrlContains => "assert_url_contains",
            ActionKind::AssertUrlNotContains => "assert_url_not_contains",
            ActionKind::Wait => "wait",
            ActionKind::Screenshot => "screenshot",
            ActionKind::ExpectDownload => "expect_download",
            ActionKind::SmartFill => "smart_fill",
            ActionKind::SmartClick => "smart_click",
        }
    }

    pub fn is_assertion(&self) -> bool {
        self.as_str().starts_with("assert")
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scenario step. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub struct Step {
    pub action: Action,
    pub description: Option<String>,
    /// Overrides the scenario timeout for this step.
    pub timeout_ms: Option<u64>,
}

impl Step {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            description: None,
            timeout_ms: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn action_type(&self) -> ActionKind {
        self.action.kind()
    }

    /// Short human-readable target of the step, used in reports.
    pub fn target(&self) -> Option<String> {
        match &self.action {
            Action::Goto(url) => Some(url.clone()),
            Action::Fill(f) => f
                .label
                .clone()
                .or_else(|| f.placeholder.clone())
                .or_else(|| f.selector.clone()),
            Action::Click(c) => c
                .text
                .clone()
                .or_else(|| c.selector.clone())
                .or_else(|| c.label.clone()),
            Action::Select(s) => s.label.clone().or_else(|| s.selector.clone()),
            Action::AssertUrlContains(f) | Action::AssertUrlNotContains(f) => Some(f.clone()),
            Action::Wait(w) => w
                .for_element
                .clone()
                .or_else(|| w.for_url_contains.clone()),
            Action::Screenshot(s) => Some(s.name.clone()),
            Action::ExpectDownload(d) => d
                .trigger_selector
                .clone()
                .or_else(|| d.trigger_text.clone()),
            Action::SmartFill(s) => Some(s.task.clone()),
            Action::SmartClick(s) => Some(s.task.clone()),
        }
    }
}

/// Wire form of a step: every action key is optional, validation happens in
/// `TryFrom<RawStep> for Step`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goto: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<FillAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click: Option<ClickAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<SelectAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assert_url_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assert_url_not_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<WaitAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<ScreenshotAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_download: Option<DownloadAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smart_fill: Option<SmartFillAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smart_click: Option<SmartClickAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl TryFrom<RawStep> for Step {
    type Error = InvalidStepError;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        if let Some(key) = raw.extra.keys().next() {
            return Err(InvalidStepError::UnsupportedAction(key.clone()));
        }

        let mut actions: Vec<Action> = Vec::new();
        actions.extend(raw.goto.map(Action::Goto));
        actions.extend(raw.fill.map(Action::Fill));
        actions.extend(raw.click.map(Action::Click));
        actions.extend(raw.select.map(Action::Select));
        actions.extend(raw.assert_url_not_contains.map(Action::AssertUrlNotContains));
        actions.extend(raw.assert_url_contains.map(Action::AssertUrlContains));
        actions.extend(raw.wait.map(Action::Wait));
        actions.extend(raw.screenshot.map(Action::Screenshot));
        actions.extend(raw.expect_download.map(Action::ExpectDownload));
        actions.extend(raw.smart_fill.map(Action::SmartFill));
        actions.extend(raw.smart_click.map(Action::SmartClick));

        let action = match actions.len() {
            0 => return Err(InvalidStepError::NoAction),
            1 => actions.remove(0),
            _ => {
                return Err(InvalidStepError::MultipleActions(
                    actions.iter().map(|a| a.kind().to_string()).collect(),
                ));
            }
        };

        validate_action(&action)?;

        Ok(Step {
            action,
            description: raw.description,
            timeout_ms: raw.timeout_ms,
        })
    }
}

fn validate_action(action: &Action) -> Result<(), InvalidStepError> {
    let malformed = |reason: &str| InvalidStepError::Malformed {
        action: action.kind().to_string(),
        reason: reason.to_string(),
    };

    match action {
        Action::Goto(url) if url.trim().is_empty() => Err(malformed("url is empty")),
        Action::SmartFill(s) if s.task.trim().is_empty() => Err(malformed("task is empty")),
        Action::SmartClick(s) if s.task.trim().is_empty() => Err(malformed("task is empty")),
        _ => Ok(()),
    }
}

impl From<Step> for RawStep {
    fn from(step: Step) -> Self {
        let mut raw = RawStep {
            description: step.description,
            timeout_ms: step.timeout_ms,
            ..Default::default()
        };
        match step.action {
            Action::Goto(v) => raw.goto = Some(v),
            Action::Fill(v) => raw.fill = Some(v),
            Action::Click(v) => raw.click = Some(v),
            Action::Select(v) => raw.select = Some(v),
            Action::AssertUrlContains(v) => raw.assert_url_contains = Some(v),
            Action::AssertUrlNotContains(v) => raw.assert_url_not_contains = Some(v),
            Action::Wait(v) => raw.wait = Some(v),
            Action::Screenshot(v) => raw.screenshot = Some(v),
            Action::ExpectDownload(v) => raw.expect_download = Some(v),
            Action::SmartFill(v) => raw.smart_fill = Some(v),
            Action::SmartClick(v) => raw.smart_click = Some(v),
        }
        raw
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub browser: BrowserKind,
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Default per-operation timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Overrides the planner's recovery attempt budget when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

fn default_headless() -> bool {
    true
}

fn default_timeout() -> u64 {
    30000
}

impl Scenario {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: Some(name.into()),
            description: None,
            browser: BrowserKind::default(),
            headless: default_headless(),
            timeout: default_timeout(),
            base_url: None,
            steps,
            tags: Vec::new(),
            retry_count: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unnamed Scenario")
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn steps_by_kind(&self, kind: ActionKind) -> Vec<&Step> {
        self.steps
            .iter()
            .filter(|s| s.action_type() == kind)
            .collect()
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            browser: self.browser,
            headless: self.headless,
            timeout_ms: self.timeout,
        }
    }

    /// Joins relative navigation targets onto `base_url`. Absolute URLs and
    /// unparsable input are returned unchanged.
    pub fn resolve_url(&self, target: &str) -> String {
        resolve_url(self.base_url.as_deref(), target)
    }
}

pub fn resolve_url(base_url: Option<&str>, target: &str) -> String {
    match (Url::parse(target), base_url) {
        (Err(url::ParseError::RelativeUrlWithoutBase), Some(base)) => Url::parse(base)
            .and_then(|b| b.join(target))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| target.to_string()),
        _ => target.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(yaml: &str) -> Result<Step, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    #[test]
    fn test_single_action_step() {
        let s = step("goto: https://example.com").unwrap();
        assert_eq!(s.action_type(), ActionKind::Goto);
        assert_eq!(s.target().as_deref(), Some("https://example.com"));

        let s = step("fill:\n  label: Username\n  value: bob\ndescription: user").unwrap();
        assert_eq!(s.action_type(), ActionKind::Fill);
        assert_eq!(s.description.as_deref(), Some("user"));
    }

    #[test]
    fn test_zero_actions_rejected() {
        let raw = RawStep {
            description: Some("nothing".into()),
            ..Default::default()
        };
        assert_eq!(Step::try_from(raw), Err(InvalidStepError::NoAction));

        let err = step("description: only a description").unwrap_err();
        assert!(err.to_string().contains("no action"));
    }

    #[test]
    fn test_multiple_actions_rejected() {
        let raw = RawStep {
            goto: Some("https://x.com".into()),
            click: Some(ClickAction {
                text: Some("Go".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        match Step::try_from(raw) {
            Err(InvalidStepError::MultipleActions(names)) => {
                assert_eq!(names, vec!["goto".to_string(), "click".to_string()]);
            }
            other => panic!("Expected MultipleActions, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = step("hover:\n  text: Menu").unwrap_err();
        assert!(err.to_string().contains("unsupported action: hover"));

        let mut raw = RawStep::default();
        raw.extra
            .insert("drag".into(), serde_yaml::Value::Bool(true));
        let err = Step::try_from(raw).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnsupportedAction);
    }

    #[test]
    fn test_malformed_smart_step() {
        let err = step("smart_click:\n  task: '  '").unwrap_err();
        assert!(err.to_string().contains("task is empty"));
    }

    #[test]
    fn test_step_round_trip_keeps_single_key() {
        let s = Step::new(Action::AssertUrlContains("dashboard".into())).with_timeout_ms(500);
        let yaml = serde_yaml::to_string(&s).unwrap();
        assert!(yaml.contains("assert_url_contains: dashboard"));
        assert!(yaml.contains("timeout_ms: 500"));
        let back: Step = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_assertion_kinds() {
        assert!(ActionKind::AssertUrlContains.is_assertion());
        assert!(ActionKind::AssertUrlNotContains.is_assertion());
        assert!(!ActionKind::Click.is_assertion());
    }

    #[test]
    fn test_scenario_defaults() {
        let yaml = "name: Login\nsteps:\n  - goto: https://example.com\n  - click:\n      text: Login\n";
        let sc: Scenario = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(sc.browser, BrowserKind::Chromium);
        assert!(sc.headless);
        assert_eq!(sc.timeout, 30000);
        assert_eq!(sc.retry_count, None);
        assert_eq!(sc.step_count(), 2);
        assert_eq!(sc.steps_by_kind(ActionKind::Click).len(), 1);
        assert_eq!(sc.display_name(), "Login");
    }

    #[test]
    fn test_resolve_url() {
        let mut sc = Scenario::new("s", vec![]);
        assert_eq!(sc.resolve_url("/login"), "/login");

        sc.base_url = Some("https://x.com/app/".into());
        assert_eq!(sc.resolve_url("login"), "https://x.com/app/login");
        assert_eq!(sc.resolve_url("/login"), "https://x.com/login");
        assert_eq!(sc.resolve_url("https://y.com"), "https://y.com");
    }
}
