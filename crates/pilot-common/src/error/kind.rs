use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification attached to every failed step.
///
/// `InvalidStep` and `UnsupportedAction` are contract violations and are never
/// retried. The remaining kinds are recoverable according to planner policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidStep,
    UnsupportedAction,
    Timeout,
    ElementNotFound,
    NavigationFailed,
    NetworkError,
    AssertionFailed,
    Unknown,
}

impl ErrorKind {
    /// Classify an opaque error message.
    ///
    /// Rules are checked in a fixed order against the lowercased text and the
    /// first match wins.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("timeout") {
            ErrorKind::Timeout
        } else if lower.contains("not found") || lower.contains("element") {
            ErrorKind::ElementNotFound
        } else if lower.contains("navigation") || lower.contains("load") {
            ErrorKind::NavigationFailed
        } else if lower.contains("network") {
            ErrorKind::NetworkError
        } else if lower.contains("assertion") {
            ErrorKind::AssertionFailed
        } else {
            ErrorKind::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidStep => "invalid_step",
            ErrorKind::UnsupportedAction => "unsupported_action",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ElementNotFound => "element_not_found",
            ErrorKind::NavigationFailed => "navigation_failed",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::AssertionFailed => "assertion_failed",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
