//! Element selection oracle.
//!
//! Smart steps describe their target in plain language. The oracle receives
//! the visible interactive elements of the page and picks one of them, or
//! reports that none matches.

use crate::config::OracleConfig;
use async_trait::async_trait;
use pilot_common::protocol::ElementDescriptor;
use regex::Regex;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmartKind {
    Fill,
    Click,
}

impl SmartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmartKind::Fill => "fill",
            SmartKind::Click => "click",
        }
    }
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle http error: {0}")]
    Http(String),
    #[error("oracle response error: {0}")]
    Response(String),
    #[error("oracle is not configured: {0}")]
    NotConfigured(String),
}

/// Picks the candidate best matching a task description.
#[async_trait]
pub trait ElementOracle: Send + Sync {
    /// Returns the chosen candidate index, or `None` when nothing matches.
    async fn select(
        &self,
        candidates: &[ElementDescriptor],
        task: &str,
        kind: SmartKind,
    ) -> Result<Option<usize>, OracleError>;
}

const SYSTEM_PROMPT: &str = "You pick web page elements for a UI test runner. \
Reply with only the index of the best matching element, or -1 if none matches.";

/// Renders the user prompt listing every candidate on its own line.
pub fn build_prompt(candidates: &[ElementDescriptor], task: &str, kind: SmartKind) -> String {
    let mut prompt = format!(
        "Task: {}\nThe element will be used to {}.\n\nCandidates:\n",
        task,
        kind.as_str()
    );
    for c in candidates {
        prompt.push_str(&c.describe());
        prompt.push('\n');
    }
    prompt.push_str("\nAnswer with a single index.");
    prompt
}

static INDEX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d+").unwrap());

/// Extracts the chosen index from a model reply.
///
/// The first integer wins. `-1`, a reply saying "none", or an index outside
/// the candidate list all mean no match.
pub fn parse_choice(reply: &str, candidate_count: usize) -> Option<usize> {
    let lower = reply.to_lowercase();
    let found = INDEX_RE.find(&lower);
    if found.is_none() && lower.contains("none") {
        return None;
    }
    let n: i64 = found?.as_str().parse().ok()?;
    if n < 0 {
        return None;
    }
    let idx = usize::try_from(n).ok()?;
    (idx < candidate_count).then_some(idx)
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// Oracle backed by an OpenAI-compatible chat completions endpoint.
pub struct LlmOracle {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl LlmOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| OracleError::Http(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: std::env::var(&config.api_key_env).ok(),
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    async fn complete(&self, user: String) -> Result<String, OracleError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            let value = format!("Bearer {}", key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&value).map_err(|e| OracleError::Http(e.to_string()))?,
            );
        }

        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(OracleError::Response(format!("HTTP {}: {}", status, text)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Response(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| OracleError::Response("Missing choices".to_string()))
    }
}

#[async_trait]
impl ElementOracle for LlmOracle {
    async fn select(
        &self,
        candidates: &[ElementDescriptor],
        task: &str,
        kind: SmartKind,
    ) -> Result<Option<usize>, OracleError> {
        if candidates.is_empty() {
            return Ok(None);
        }
        if self.api_key.is_none() {
            return Err(OracleError::NotConfigured("missing API key".into()));
        }
        let reply = self.complete(build_prompt(candidates, task, kind)).await?;
        debug!(reply = %reply.trim(), "Oracle reply");
        Ok(parse_choice(&reply, candidates.len()))
    }
}
