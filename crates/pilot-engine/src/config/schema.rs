use pilot_common::protocol::{BrowserKind, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PilotConfig {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

impl PilotConfig {
    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`. Unparsable values are ignored with a warning.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BROWSER_TYPE") {
            match v.parse::<BrowserKind>() {
                Ok(browser) => self.browser.browser = browser,
                Err(e) => warn!(value = %v, "Ignoring BROWSER_TYPE: {}", e),
            }
        }
        if let Some(v) = lookup("HEADLESS") {
            match v.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => self.browser.headless = true,
                "0" | "false" | "no" => self.browser.headless = false,
                _ => warn!(value = %v, "Ignoring HEADLESS: expected true or false"),
            }
        }
        if let Some(v) = lookup("DEFAULT_TIMEOUT") {
            match v.trim().parse::<u64>() {
                Ok(ms) => self.browser.timeout_ms = ms,
                Err(_) => warn!(value = %v, "Ignoring DEFAULT_TIMEOUT: expected milliseconds"),
            }
        }
        if let Some(v) = lookup("RETRY_COUNT") {
            match v.trim().parse::<u32>() {
                Ok(n) => self.planner.max_recovery_attempts = n,
                Err(_) => warn!(value = %v, "Ignoring RETRY_COUNT: expected an integer"),
            }
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.logging.level = v.trim().to_lowercase();
        }
        if let Some(v) = lookup("LOG_FORMAT") {
            match v.trim().to_lowercase().as_str() {
                "json" => self.logging.format = LogFormat::Json,
                "text" => self.logging.format = LogFormat::Text,
                _ => warn!(value = %v, "Ignoring LOG_FORMAT: expected json or text"),
            }
        }
        if let Some(v) = lookup("PILOT_ORACLE_ENDPOINT") {
            self.oracle.endpoint = v.trim().to_string();
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            browser: self.browser.browser,
            headless: self.browser.headless,
            timeout_ms: self.browser.timeout_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default)]
    pub browser: BrowserKind,
    /// Scenarios run headless only when this and their own setting allow it.
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            browser: BrowserKind::default(),
            headless: default_headless(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_headless() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    30000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_max_recovery_attempts")]
    pub max_recovery_attempts: u32,
    #[serde(default = "default_complexity_split_threshold")]
    pub complexity_split_threshold: u32,
    #[serde(default = "default_fill_batch_threshold")]
    pub fill_batch_threshold: usize,
    #[serde(default = "default_risk_threshold")]
    pub risk_threshold: u8,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_timeout_strategy")]
    pub timeout_strategy: String,
    #[serde(default = "default_retry_strategy")]
    pub retry_strategy: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_recovery_attempts: default_max_recovery_attempts(),
            complexity_split_threshold: default_complexity_split_threshold(),
            fill_batch_threshold: default_fill_batch_threshold(),
            risk_threshold: default_risk_threshold(),
            strategy: default_strategy(),
            timeout_strategy: default_timeout_strategy(),
            retry_strategy: default_retry_strategy(),
        }
    }
}

fn default_max_recovery_attempts() -> u32 {
    3
}

fn default_complexity_split_threshold() -> u32 {
    15
}

fn default_fill_batch_threshold() -> usize {
    5
}

fn default_risk_threshold() -> u8 {
    2
}

fn default_strategy() -> String {
    "sequential".to_string()
}

fn default_timeout_strategy() -> String {
    "adaptive".to_string()
}

fn default_retry_strategy() -> String {
    "smart".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_oracle_enabled")]
    pub enabled: bool,
    #[serde(default = "default_oracle_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_oracle_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_oracle_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: default_oracle_enabled(),
            endpoint: default_oracle_endpoint(),
            model: default_oracle_model(),
            api_key_env: default_api_key_env(),
            timeout_ms: default_oracle_timeout_ms(),
        }
    }
}

fn default_oracle_enabled() -> bool {
    true
}

fn default_oracle_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_oracle_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_oracle_timeout_ms() -> u64 {
    15000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_screenshots_dir")]
    pub screenshots_dir: PathBuf,
    #[serde(default = "default_traces_dir")]
    pub traces_dir: PathBuf,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            screenshots_dir: default_screenshots_dir(),
            traces_dir: default_traces_dir(),
            logs_dir: default_logs_dir(),
            downloads_dir: default_downloads_dir(),
        }
    }
}

impl ArtifactsConfig {
    pub fn all_dirs(&self) -> [&PathBuf; 4] {
        [
            &self.screenshots_dir,
            &self.traces_dir,
            &self.logs_dir,
            &self.downloads_dir,
        ]
    }
}

fn default_screenshots_dir() -> PathBuf {
    PathBuf::from("screenshots")
}

fn default_traces_dir() -> PathBuf {
    PathBuf::from("traces")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_downloads_dir() -> PathBuf {
    PathBuf::from("downloads")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub to_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            to_file: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default = "default_apply_fallback_actions")]
    pub apply_fallback_actions: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            apply_fallback_actions: default_apply_fallback_actions(),
        }
    }
}

fn default_max_parallel() -> usize {
    1
}

fn default_apply_fallback_actions() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_sensitive_fields")]
    pub sensitive_fields: Vec<String>,
    #[serde(default = "default_redact_in_logs")]
    pub redact_in_logs: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            sensitive_fields: default_sensitive_fields(),
            redact_in_logs: default_redact_in_logs(),
        }
    }
}

impl SecurityConfig {
    /// Whether a fill into `field` should have its value masked in logs.
    pub fn is_sensitive(&self, field: &str) -> bool {
        if !self.redact_in_logs {
            return false;
        }
        let field = field.to_lowercase();
        self.sensitive_fields
            .iter()
            .any(|s| field.contains(&s.to_lowercase()))
    }
}

fn default_sensitive_fields() -> Vec<String> {
    vec![
        "password".to_string(),
        "token".to_string(),
        "card_number".to_string(),
        "cvv".to_string(),
        "ssn".to_string(),
        "secret".to_string(),
    ]
}

fn default_redact_in_logs() -> bool {
    true
}
