use serde::{Deserialize, Serialize};
use std::fmt;

/// Browser engine requested by a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for BrowserKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" => Ok(BrowserKind::Webkit),
            other => Err(format!("unknown browser: {}", other)),
        }
    }
}

/// Settings used to open one browser session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub browser: BrowserKind,
    pub headless: bool,
    pub timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            browser: BrowserKind::Chromium,
            headless: true,
            timeout_ms: 30000,
        }
    }
}

/// How a step finds its element on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Locator {
    /// Raw CSS selector.
    Css(String),
    /// Visible label text of a form control.
    Label(String),
    /// Placeholder attribute of an input.
    Placeholder(String),
    /// Visible text of a clickable element.
    Text(String),
    /// `aria-label` attribute.
    AriaLabel(String),
}

impl Locator {
    pub fn value(&self) -> &str {
        match self {
            Locator::Css(v)
            | Locator::Label(v)
            | Locator::Placeholder(v)
            | Locator::Text(v)
            | Locator::AriaLabel(v) => v,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "{}", s),
            Locator::Label(s) => write!(f, "label={}", s),
            Locator::Placeholder(s) => write!(f, "[placeholder='{}']", s),
            Locator::Text(s) => write!(f, "text={}", s),
            Locator::AriaLabel(s) => write!(f, "[aria-label='{}']", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationResult {
    pub url: String,
    pub title: String,
    pub status: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadInfo {
    pub suggested_filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A visible interactive element offered to the element oracle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    pub index: usize,
    pub tag_name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, rename = "type")]
    pub element_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub aria_label: String,
}

impl ElementDescriptor {
    /// Selector for acting on this element: id, then first class token, then tag.
    pub fn preferred_selector(&self) -> String {
        let id = self.id.trim();
        if !id.is_empty() {
            return format!("#{}", id);
        }
        if let Some(class) = self.class_name.split_whitespace().next() {
            return format!(".{}", class);
        }
        self.tag_name.to_lowercase()
    }

    /// One-line rendering used in oracle prompts.
    pub fn describe(&self) -> String {
        let mut parts = vec![self.tag_name.to_lowercase()];
        if !self.id.is_empty() {
            parts.push(format!("#{}", self.id));
        }
        if let Some(class) = self.class_name.split_whitespace().next() {
            parts.push(format!(".{}", class));
        }
        if !self.element_type.is_empty() {
            parts.push(format!("type={}", self.element_type));
        }
        if !self.name.is_empty() {
            parts.push(format!("name={}", self.name));
        }
        if !self.placeholder.is_empty() {
            parts.push(format!("placeholder=\"{}\"", self.placeholder));
        }
        if !self.aria_label.is_empty() {
            parts.push(format!("aria-label=\"{}\"", self.aria_label));
        }
        let text = self.text.trim();
        if !text.is_empty() {
            let short: String = text.chars().take(60).collect();
            parts.push(format!("\"{}\"", short));
        }
        format!("{}: {}", self.index, parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tag: &str, id: &str, class: &str) -> ElementDescriptor {
        ElementDescriptor {
            index: 0,
            tag_name: tag.into(),
            id: id.into(),
            class_name: class.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_preferred_selector_order() {
        assert_eq!(element("INPUT", "user", "form-control").preferred_selector(), "#user");
        assert_eq!(
            element("INPUT", "", "form-control wide").preferred_selector(),
            ".form-control"
        );
        assert_eq!(element("BUTTON", "  ", "").preferred_selector(), "button");
    }

    #[test]
    fn test_describe() {
        let el = ElementDescriptor {
            index: 3,
            tag_name: "INPUT".into(),
            id: "pw".into(),
            element_type: "password".into(),
            placeholder: "Password".into(),
            ..Default::default()
        };
        assert_eq!(el.describe(), "3: input #pw type=password placeholder=\"Password\"");
    }

    #[test]
    fn test_element_descriptor_from_script_json() {
        let raw = r#"{"index":1,"tagName":"A","id":"","className":"nav link","text":"Home","type":"","ariaLabel":"home"}"#;
        let el: ElementDescriptor = serde_json::from_str(raw).unwrap();
        assert_eq!(el.tag_name, "A");
        assert_eq!(el.aria_label, "home");
        assert_eq!(el.preferred_selector(), ".nav");
    }

    #[test]
    fn test_locator_display() {
        assert_eq!(Locator::Text("Login".into()).to_string(), "text=Login");
        assert_eq!(Locator::Css("#q".into()).to_string(), "#q");
        assert_eq!(
            Locator::AriaLabel("Close".into()).to_string(),
            "[aria-label='Close']"
        );
    }

    #[test]
    fn test_browser_kind_parse() {
        assert_eq!("Firefox".parse::<BrowserKind>(), Ok(BrowserKind::Firefox));
        assert!("opera".parse::<BrowserKind>().is_err());
    }
}
