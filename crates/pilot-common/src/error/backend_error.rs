use super::kind::ErrorKind;

/// Errors raised by a session driver.
///
/// Drivers should pick the most specific variant they can. `Script` and
/// `Other` carry opaque upstream text and are classified by message.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Session not ready")]
    NotReady,

    #[error("Operation not supported by this backend: {0}")]
    NotSupported(String),

    #[error("Timeout {timeout_ms}ms exceeded: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Element not found: {locator}")]
    ElementNotFound { locator: String },

    #[error("Option not found: {label}")]
    OptionNotFound { label: String },

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Launch failed: {0}")]
    Launch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Other(String),
}

impl BackendError {
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        BackendError::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Structured classification. Opaque variants fall back to message matching.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::Timeout { .. } => ErrorKind::Timeout,
            BackendError::ElementNotFound { .. } | BackendError::OptionNotFound { .. } => {
                ErrorKind::ElementNotFound
            }
            BackendError::Navigation(_) => ErrorKind::NavigationFailed,
            BackendError::Network(_) => ErrorKind::NetworkError,
            BackendError::Assertion(_) => ErrorKind::AssertionFailed,
            BackendError::NotSupported(_) => ErrorKind::UnsupportedAction,
            BackendError::Script(msg) | BackendError::Other(msg) | BackendError::Launch(msg) => {
                ErrorKind::classify(msg)
            }
            BackendError::NotReady | BackendError::Io(_) | BackendError::Serialization(_) => {
                ErrorKind::classify(&self.to_string())
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            BackendError::NotReady => "NOT_READY",
            BackendError::NotSupported(_) => "NOT_SUPPORTED",
            BackendError::Timeout { .. } => "TIMEOUT",
            BackendError::ElementNotFound { .. } => "ELEMENT_NOT_FOUND",
            BackendError::OptionNotFound { .. } => "OPTION_NOT_FOUND",
            BackendError::Navigation(_) => "NAVIGATION_ERROR",
            BackendError::Network(_) => "NETWORK_ERROR",
            BackendError::Assertion(_) => "ASSERTION_FAILED",
            BackendError::Script(_) => "SCRIPT_ERROR",
            BackendError::Launch(_) => "LAUNCH_FAILED",
            BackendError::Io(_) => "IO_ERROR",
            BackendError::Serialization(_) => "SERIALIZATION_ERROR",
            BackendError::Other(_) => "INTERNAL_ERROR",
        }
    }

    pub fn recovery_hint(&self) -> &'static str {
        crate::error_mapping::hint_for_kind(self.kind())
    }
}
