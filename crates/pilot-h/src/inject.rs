//! Page-side JavaScript: locator resolution, form helpers and evaluation with
//! retries while the page navigates.
//!
//! Helpers report failures as `{error: {code, message, details}}`, which
//! [`script_result`] maps to a `BackendError`.

use chromiumoxide::Page;
use pilot_engine::backend::{BackendError, Locator};
use pilot_engine::error_mapping::map_script_error;
use serde_json::Value;
use std::time::Duration;

/// Upper bound for a single evaluation. A pending dialog blocks the JS thread.
const EVAL_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_CONTEXT_RETRIES: u32 = 10;

const CONTEXT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Attribute used to hand a resolved element from page JS back to CDP.
pub const REF_ATTRIBUTE: &str = "data-pilot-ref";

const FIND_SCRIPT: &str = r#"
((loc, shown) => {
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
  const want = norm(loc.value);
  const visible = (el) => {
    const r = el.getBoundingClientRect();
    return r.width > 0 && r.height > 0;
  };
  const byAttr = (attr) =>
    [...document.querySelectorAll(`[${attr}]`)].find((el) => norm(el.getAttribute(attr)) === want) || null;
  const byText = (nodes) => {
    const list = [...nodes].filter(visible);
    return list.find((el) => norm(el.innerText || el.value) === want)
      || list.find((el) => norm(el.innerText || el.value).includes(want))
      || null;
  };

  let found = null;
  switch (loc.by) {
    case 'css':
      found = document.querySelector(loc.value);
      break;
    case 'label': {
      for (const label of document.querySelectorAll('label')) {
        const text = norm(label.textContent);
        if (text === want || text.includes(want)) {
          found = label.control
            || (label.htmlFor && document.getElementById(label.htmlFor))
            || label.querySelector('input, textarea, select');
          if (found) break;
        }
      }
      found = found || byAttr('aria-label') || byAttr('name');
      break;
    }
    case 'placeholder':
      found = byAttr('placeholder');
      break;
    case 'text':
      found = byText(document.querySelectorAll(
        'button, a, [role="button"], [role="link"], input[type="submit"], input[type="button"], summary, label'
      )) || byText([...document.querySelectorAll('body *')].filter((el) => el.children.length === 0));
      break;
    case 'aria_label':
      found = byAttr('aria-label');
      break;
  }
  if (!found) {
    return { error: { code: 'ELEMENT_NOT_FOUND', message: 'No element matches ' + shown, details: { locator: shown } } };
  }
  if (!found.hasAttribute('data-pilot-ref')) {
    window.__pilotRefSeq = (window.__pilotRefSeq || 0) + 1;
    found.setAttribute('data-pilot-ref', String(window.__pilotRefSeq));
  }
  return found.getAttribute('data-pilot-ref');
})
"#;

const FILL_SCRIPT: &str = r#"
((ref, value) => {
  const el = document.querySelector(`[data-pilot-ref="${ref}"]`);
  if (!el) {
    return { error: { code: 'ELEMENT_NOT_FOUND', message: 'Element detached before fill' } };
  }
  el.focus();
  if (el.isContentEditable) {
    el.textContent = value;
  } else {
    const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
    const setter = Object.getOwnPropertyDescriptor(proto, 'value');
    if (setter && setter.set && (el instanceof HTMLInputElement || el instanceof HTMLTextAreaElement)) {
      setter.set.call(el, value);
    } else {
      el.value = value;
    }
  }
  el.dispatchEvent(new Event('input', { bubbles: true }));
  el.dispatchEvent(new Event('change', { bubbles: true }));
  return true;
})
"#;

const SELECT_SCRIPT: &str = r#"
((ref, wanted) => {
  const el = document.querySelector(`[data-pilot-ref="${ref}"]`);
  if (!el) {
    return { error: { code: 'ELEMENT_NOT_FOUND', message: 'Element detached before select' } };
  }
  if (!el.options) {
    return { error: { code: 'NOT_SUPPORTED', message: 'Element is not a select: ' + el.tagName } };
  }
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
  const option = [...el.options].find((o) => norm(o.label) === norm(wanted) || o.value === wanted);
  if (!option) {
    return { error: { code: 'OPTION_NOT_FOUND', message: 'No such option', details: { label: wanted } } };
  }
  el.value = option.value;
  el.dispatchEvent(new Event('input', { bubbles: true }));
  el.dispatchEvent(new Event('change', { bubbles: true }));
  return true;
})
"#;

pub fn ref_selector(reference: &str) -> String {
    format!("[{}=\"{}\"]", REF_ATTRIBUTE, reference)
}

pub fn find_expression(locator: &Locator) -> Result<String, BackendError> {
    Ok(format!(
        "{}({}, {})",
        FIND_SCRIPT.trim(),
        serde_json::to_string(locator)?,
        serde_json::to_string(&locator.to_string())?
    ))
}

pub fn fill_expression(reference: &str, value: &str) -> Result<String, BackendError> {
    Ok(format!(
        "{}({}, {})",
        FILL_SCRIPT.trim(),
        serde_json::to_string(reference)?,
        serde_json::to_string(value)?
    ))
}

pub fn select_expression(reference: &str, option: &str) -> Result<String, BackendError> {
    Ok(format!(
        "{}({}, {})",
        SELECT_SCRIPT.trim(),
        serde_json::to_string(reference)?,
        serde_json::to_string(option)?
    ))
}

/// Splits a helper's return value into its result or the error it reported.
pub fn script_result(value: Value) -> Result<Value, BackendError> {
    let Some(error) = value.get("error") else {
        return Ok(value);
    };
    let code = error
        .get("code")
        .and_then(Value::as_str)
        .unwrap_or("SCRIPT_ERROR");
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let err = map_script_error(code, message, error.get("details"));
    tracing::debug!(error_code = err.code(), "Page helper reported an error: {}", err);
    Err(err)
}

/// True when the page context is gone, e.g. mid-navigation.
fn is_context_error(err: &str) -> bool {
    err.contains("Cannot find context")
        || err.contains("Execution context was destroyed")
        || err.contains("-32000")
}

enum EvalError {
    Timeout,
    Context(String),
    Other(String),
}

async fn evaluate_with_timeout(
    page: &Page,
    expression: &str,
) -> Result<serde_json::Value, EvalError> {
    match tokio::time::timeout(EVAL_TIMEOUT, page.evaluate(expression)).await {
        Err(_) => Err(EvalError::Timeout),
        Ok(Err(e)) => {
            let err_str = e.to_string();
            if is_context_error(&err_str) {
                Err(EvalError::Context(err_str))
            } else {
                Err(EvalError::Other(err_str))
            }
        }
        // `undefined` has no value
        Ok(Ok(remote_object)) => Ok(remote_object
            .value()
            .cloned()
            .unwrap_or(serde_json::Value::Null)),
    }
}

/// Evaluates `expression`, retrying while the execution context is being
/// replaced by a navigation.
pub async fn evaluate(page: &Page, expression: &str) -> Result<serde_json::Value, BackendError> {
    let mut last_error = None;

    for attempt in 0..MAX_CONTEXT_RETRIES {
        match evaluate_with_timeout(page, expression).await {
            Ok(value) => return Ok(value),
            Err(EvalError::Timeout) => {
                return Err(BackendError::timeout(
                    "script evaluation, possibly blocked by a dialog",
                    EVAL_TIMEOUT.as_millis() as u64,
                ));
            }
            Err(EvalError::Context(err_str)) => {
                tracing::debug!(
                    "Context error during evaluation (attempt {}/{}), retrying...",
                    attempt + 1,
                    MAX_CONTEXT_RETRIES
                );
                last_error = Some(err_str);
                tokio::time::sleep(CONTEXT_RETRY_DELAY).await;
            }
            Err(EvalError::Other(err_str)) => return Err(BackendError::Script(err_str)),
        }
    }

    Err(BackendError::Script(last_error.unwrap_or_else(|| {
        "Evaluation failed after retries".to_string()
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expressions_escape_arguments() {
        let expr = fill_expression("3", "it's \"quoted\"").unwrap();
        assert!(expr.ends_with(r#"("3", "it's \"quoted\"")"#));

        let expr = find_expression(&Locator::AriaLabel("Close".into())).unwrap();
        assert!(expr.ends_with(r#"({"by":"aria_label","value":"Close"}, "[aria-label='Close']")"#));

        assert_eq!(ref_selector("7"), r#"[data-pilot-ref="7"]"#);
    }

    #[test]
    fn test_script_result_maps_helper_errors() {
        let value = serde_json::json!({
            "error": {
                "code": "ELEMENT_NOT_FOUND",
                "message": "No element matches text=Go",
                "details": {"locator": "text=Go"}
            }
        });
        match script_result(value) {
            Err(BackendError::ElementNotFound { locator }) => assert_eq!(locator, "text=Go"),
            other => panic!("expected ElementNotFound, got {:?}", other),
        }

        let value = serde_json::json!({
            "error": {"code": "OPTION_NOT_FOUND", "message": "No such option", "details": {"label": "Blue"}}
        });
        assert!(matches!(
            script_result(value),
            Err(BackendError::OptionNotFound { label }) if label == "Blue"
        ));

        assert_eq!(script_result(Value::from("4")).unwrap(), Value::from("4"));
        assert_eq!(script_result(Value::Bool(true)).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_context_errors() {
        assert!(is_context_error("Execution context was destroyed."));
        assert!(!is_context_error("ReferenceError: x is not defined"));
    }
}
