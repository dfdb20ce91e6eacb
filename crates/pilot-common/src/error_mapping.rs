//! Error Code Mapping
//!
//! Maps the error codes returned by in-page driver scripts to `BackendError`
//! variants, and gives a recovery hint per error kind.

use crate::error::{BackendError, ErrorKind};
use serde_json::Value;

/// Maps an in-page script error code and message to a BackendError.
///
/// Unknown codes become `BackendError::Other` so the message classifier still
/// gets a chance at them.
pub fn map_script_error(code: &str, message: &str, details: Option<&Value>) -> BackendError {
    match code {
        "ELEMENT_NOT_FOUND" => BackendError::ElementNotFound {
            locator: detail_str(details, "locator").unwrap_or_else(|| message.to_string()),
        },
        "OPTION_NOT_FOUND" => BackendError::OptionNotFound {
            label: detail_str(details, "label").unwrap_or_default(),
        },
        "TIMEOUT" => BackendError::Timeout {
            operation: message.to_string(),
            timeout_ms: details
                .and_then(|d| d.get("timeout_ms"))
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
        },
        "NAVIGATION_ERROR" => BackendError::Navigation(message.to_string()),
        "NETWORK_ERROR" => BackendError::Network(message.to_string()),
        "SCRIPT_ERROR" => BackendError::Script(message.to_string()),
        "NOT_SUPPORTED" => BackendError::NotSupported(message.to_string()),
        _ => BackendError::Other(format!("[{}] {}", code, message)),
    }
}

/// Returns a recovery hint for the given error kind.
pub fn hint_for_kind(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Timeout => "Increase the timeout or add a wait step before this one",
        ErrorKind::ElementNotFound => "Use a label or a stronger selector, or wait for the element",
        ErrorKind::NavigationFailed => "Check the URL is reachable and add a retry policy",
        ErrorKind::NetworkError => "Check connectivity to the target host",
        ErrorKind::AssertionFailed => "Verify the expected page state before asserting",
        ErrorKind::InvalidStep => "Fix the step definition in the scenario file",
        ErrorKind::UnsupportedAction => "Use one of the supported step actions",
        ErrorKind::Unknown => "Inspect the driver logs for details",
    }
}

fn detail_str(details: Option<&Value>, key: &str) -> Option<String> {
    details
        .and_then(|d| d.get(key))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_element_not_found() {
        let details = json!({"locator": "text=Login"});
        let err = map_script_error("ELEMENT_NOT_FOUND", "no match", Some(&details));
        match &err {
            BackendError::ElementNotFound { locator } => assert_eq!(locator, "text=Login"),
            _ => panic!("Expected ElementNotFound"),
        }
        assert_eq!(err.kind(), ErrorKind::ElementNotFound);
        assert_eq!(err.code(), "ELEMENT_NOT_FOUND");
    }

    #[test]
    fn test_map_element_not_found_without_details() {
        let err = map_script_error("ELEMENT_NOT_FOUND", "#missing", None);
        match err {
            BackendError::ElementNotFound { locator } => assert_eq!(locator, "#missing"),
            _ => panic!("Expected ElementNotFound"),
        }
    }

    #[test]
    fn test_map_option_not_found() {
        let details = json!({"label": "Turkey"});
        let err = map_script_error("OPTION_NOT_FOUND", "option missing", Some(&details));
        match &err {
            BackendError::OptionNotFound { label } => assert_eq!(label, "Turkey"),
            _ => panic!("Expected OptionNotFound"),
        }
        assert_eq!(err.kind(), ErrorKind::ElementNotFound);
    }

    #[test]
    fn test_map_timeout() {
        let details = json!({"timeout_ms": 5000});
        let err = map_script_error("TIMEOUT", "waiting for url", Some(&details));
        match &err {
            BackendError::Timeout {
                operation,
                timeout_ms,
            } => {
                assert_eq!(operation, "waiting for url");
                assert_eq!(*timeout_ms, 5000);
            }
            _ => panic!("Expected Timeout"),
        }
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_map_unknown_code_falls_back_to_message() {
        let err = map_script_error("WEIRD", "network socket closed", None);
        match &err {
            BackendError::Other(msg) => {
                assert!(msg.contains("WEIRD"));
                assert!(msg.contains("network socket closed"));
            }
            _ => panic!("Expected Other"),
        }
        assert_eq!(err.kind(), ErrorKind::NetworkError);
    }

    #[test]
    fn test_structured_kind_beats_message() {
        // The message mentions "element" but the variant says navigation.
        let err = BackendError::Navigation("element frame detached".into());
        assert_eq!(err.kind(), ErrorKind::NavigationFailed);

        let err = BackendError::Script("Timeout while evaluating".into());
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_recovery_hints() {
        let err = BackendError::ElementNotFound {
            locator: "#x".into(),
        };
        assert!(err.recovery_hint().contains("selector"));

        let err = BackendError::timeout("navigate", 30000);
        assert!(err.recovery_hint().contains("timeout"));
        assert_eq!(err.to_string(), "Timeout 30000ms exceeded: navigate");
    }
}
