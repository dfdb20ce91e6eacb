//! Per-step results produced by the dispatcher and recorded by the crew.

use crate::error::{BackendError, ErrorKind};
use crate::scenario::ActionKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Error,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Success => "success",
            StepStatus::Error => "error",
            StepStatus::Skipped => "skipped",
        }
    }
}

/// Typed payload of a successful action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepOutcome {
    Navigated {
        url: String,
        current_url: String,
    },
    Filled {
        field: String,
        value: String,
    },
    Clicked {
        target: String,
    },
    Selected {
        field: String,
        option: String,
    },
    UrlAsserted {
        fragment: String,
        should_contain: bool,
        current_url: String,
        passed: bool,
    },
    Waited,
    Screenshot {
        name: String,
        path: String,
        full_page: bool,
    },
    Download {
        filename: String,
    },
    Smart {
        task: String,
        selector: String,
        element: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    pub message: String,
    pub kind: ErrorKind,
}

impl StepFailure {
    pub fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Builds a failure whose kind comes from the message classifier.
    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = ErrorKind::classify(&message);
        Self { message, kind }
    }
}

impl From<BackendError> for StepFailure {
    fn from(err: BackendError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMethod {
    Retry,
    Skip,
}

/// How the crew recovered a failing step, plus the failed attempts it saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub method: RecoveryMethod,
    /// Dispatches of the step, the initial one included.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_attempts: Vec<StepFailure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternative_selectors: Vec<String>,
}

/// The final result of one executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_index: usize,
    pub action: ActionKind,
    pub status: StepStatus,
    /// Wall-clock seconds spent in the handler.
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StepOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryRecord>,
}

impl StepResult {
    pub fn success(
        step_index: usize,
        action: ActionKind,
        duration: f64,
        outcome: StepOutcome,
    ) -> Self {
        Self {
            step_index,
            action,
            status: StepStatus::Success,
            duration,
            target: None,
            outcome: Some(outcome),
            error: None,
            recovery: None,
        }
    }

    pub fn failure(
        step_index: usize,
        action: ActionKind,
        duration: f64,
        error: StepFailure,
    ) -> Self {
        Self {
            step_index,
            action,
            status: StepStatus::Error,
            duration,
            target: None,
            outcome: None,
            error: Some(error),
            recovery: None,
        }
    }

    pub fn with_target(mut self, target: Option<String>) -> Self {
        self.target = target;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    /// Assertion verdict: a URL assertion outcome, else the step status.
    pub fn passed(&self) -> bool {
        match &self.outcome {
            Some(StepOutcome::UrlAsserted { passed, .. }) => *passed && self.is_success(),
            _ => self.is_success(),
        }
    }
}
