//! Scenario files: loading, discovery, syntax validation and the example
//! scenario.

use pilot_common::protocol::BrowserKind;
use pilot_common::scenario::{
    Action, ActionKind, ClickAction, FillAction, Scenario, ScreenshotAction, Step, WaitAction,
};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

const SCENARIO_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Scenario file not found: {0}")]
    NotFound(PathBuf),

    #[error("Not a YAML file: {0}")]
    WrongExtension(PathBuf),

    #[error("Scenario file is empty: {0}")]
    Empty(PathBuf),

    #[error("Scenario directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("YAML syntax error in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid scenario {path}: {message}")]
    Validation { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Glob pattern error: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// A scenario together with the file it came from.
#[derive(Debug, Clone)]
pub struct LoadedScenario {
    pub path: PathBuf,
    pub scenario: Scenario,
}

/// Outcome of [`validate_syntax`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps_count: Option<usize>,
}

fn has_scenario_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SCENARIO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
}

async fn read_document(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    if !has_scenario_extension(path) {
        return Err(LoadError::WrongExtension(path.to_path_buf()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    let document: Value = serde_yaml::from_str(&content).map_err(|source| LoadError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;

    if document.is_null() {
        return Err(LoadError::Empty(path.to_path_buf()));
    }
    Ok(document)
}

/// Checks the document shape before handing it to the model.
fn check_structure(path: &Path, document: &Value) -> Result<(), LoadError> {
    let invalid = |message: &str| LoadError::Validation {
        path: path.to_path_buf(),
        message: message.to_string(),
    };

    let mapping = document
        .as_mapping()
        .ok_or_else(|| invalid("root must be a mapping"))?;
    match mapping.get("steps") {
        None => Err(invalid("'steps' is required")),
        Some(steps) if !steps.is_sequence() => Err(invalid("'steps' must be a list")),
        Some(_) => Ok(()),
    }
}

fn build_scenario(path: &Path, document: Value) -> Result<Scenario, LoadError> {
    check_structure(path, &document)?;
    serde_yaml::from_value(document).map_err(|e| LoadError::Validation {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

pub async fn load_scenario(path: &Path) -> Result<Scenario, LoadError> {
    let document = read_document(path).await?;
    let scenario = build_scenario(path, document)?;
    info!(
        path = %path.display(),
        name = scenario.display_name(),
        steps_count = scenario.step_count(),
        "Scenario loaded"
    );
    Ok(scenario)
}

/// Scenario files directly inside `dir`, sorted. Subdirectories are not
/// searched.
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::DirectoryNotFound(dir.to_path_buf()));
    }

    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let mut files = Vec::new();
    for ext in SCENARIO_EXTENSIONS {
        for entry in glob::glob(&format!("{}/*.{}", escaped, ext))? {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable entry: {}", e),
            }
        }
    }
    files.sort();
    files.dedup();

    info!(directory = %dir.display(), file_count = files.len(), "Scenario files found");
    Ok(files)
}

/// Loads every scenario in `dir`. Files that fail to load are logged and
/// left out.
pub async fn load_directory(dir: &Path) -> Result<Vec<LoadedScenario>, LoadError> {
    let files = discover(dir)?;
    let total = files.len();

    let mut loaded = Vec::with_capacity(total);
    for path in files {
        match load_scenario(&path).await {
            Ok(scenario) => loaded.push(LoadedScenario { path, scenario }),
            Err(e) => error!("Failed to load scenario: {}", e),
        }
    }

    info!(total_files = total, loaded_scenarios = loaded.len(), "Scenarios loaded");
    Ok(loaded)
}

/// Checks a scenario file without running it.
pub async fn validate_syntax(path: &Path) -> ValidationReport {
    let mut report = ValidationReport::default();

    let scenario = match read_document(path).await {
        Ok(document) => build_scenario(path, document),
        Err(e) => Err(e),
    };

    match scenario {
        Ok(scenario) => {
            report.valid = true;
            report.warnings = lint(&scenario);
            report.scenario_name = scenario.name.clone();
            report.steps_count = Some(scenario.step_count());
        }
        Err(LoadError::Validation { message, .. }) => {
            report.errors.push(format!("Validation: {}", message));
        }
        Err(e) => report.errors.push(e.to_string()),
    }
    report
}

fn lint(scenario: &Scenario) -> Vec<String> {
    let mut warnings = Vec::new();
    if scenario.steps.is_empty() {
        warnings.push("Steps list is empty".to_string());
    }
    for (i, step) in scenario.steps.iter().enumerate() {
        if let Action::Wait(w) = &step.action
            && w.seconds.is_none()
            && w.for_element.is_none()
            && w.for_url_contains.is_none()
        {
            warnings.push(format!("Step {}: wait has no condition and does nothing", i));
        }
    }
    let goto_relative = scenario
        .steps_by_kind(ActionKind::Goto)
        .iter()
        .filter_map(|s| s.target())
        .any(|t| url::Url::parse(&t).is_err());
    if goto_relative && scenario.base_url.is_none() {
        warnings.push("Relative goto targets without a base_url".to_string());
    }
    warnings
}

pub fn example_scenario() -> Scenario {
    let mut scenario = Scenario::new(
        "Example Login Scenario",
        vec![
            Step::new(Action::Goto("https://example.com".into())),
            Step::new(Action::Fill(FillAction {
                label: Some("Username".into()),
                value: "test_user".into(),
                ..Default::default()
            })),
            Step::new(Action::Fill(FillAction {
                label: Some("Password".into()),
                value: "test_pass".into(),
                ..Default::default()
            })),
            Step::new(Action::Click(ClickAction {
                text: Some("Login".into()),
                ..Default::default()
            })),
            Step::new(Action::AssertUrlNotContains("login".into())),
            Step::new(Action::Screenshot(ScreenshotAction {
                name: "login_success".into(),
                full_page: false,
            })),
            Step::new(Action::Click(ClickAction {
                text: Some("Dashboard".into()),
                ..Default::default()
            })),
            Step::new(Action::Wait(WaitAction {
                seconds: Some(2.0),
                ..Default::default()
            })),
            Step::new(Action::AssertUrlContains("dashboard".into())),
        ],
    );
    scenario.description = Some("An example scenario".into());
    scenario.browser = BrowserKind::Chromium;
    scenario
}

/// Writes [`example_scenario`] as YAML, creating parent directories.
pub async fn write_example(path: &Path) -> Result<(), LoadError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let yaml = serde_yaml::to_string(&example_scenario()).map_err(|source| LoadError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    tokio::fs::write(path, yaml).await?;
    info!(path = %path.display(), "Example scenario written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        tokio::fs::write(&path, content).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_load_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "login.yaml",
            "name: Login\nsteps:\n  - goto: https://x.com\n  - click:\n      text: Sign in\n",
        )
        .await;

        let scenario = load_scenario(&path).await.unwrap();
        assert_eq!(scenario.display_name(), "Login");
        assert_eq!(scenario.step_count(), 2);
        assert!(scenario.headless);
        assert_eq!(scenario.timeout, 30000);
    }

    #[tokio::test]
    async fn test_load_errors_are_distinct() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.yaml");
        assert!(matches!(
            load_scenario(&missing).await,
            Err(LoadError::NotFound(_))
        ));

        let txt = write(dir.path(), "scenario.txt", "steps: []").await;
        assert!(matches!(
            load_scenario(&txt).await,
            Err(LoadError::WrongExtension(_))
        ));

        let empty = write(dir.path(), "empty.yaml", "").await;
        assert!(matches!(load_scenario(&empty).await, Err(LoadError::Empty(_))));

        let broken = write(dir.path(), "broken.yaml", "steps: [goto: {").await;
        assert!(matches!(
            load_scenario(&broken).await,
            Err(LoadError::Yaml { .. })
        ));

        let two = write(
            dir.path(),
            "two.yaml",
            "steps:\n  - goto: https://x.com\n    assert_url_contains: x\n",
        )
        .await;
        assert!(matches!(
            load_scenario(&two).await,
            Err(LoadError::Validation { .. })
        ));

        let unknown = write(dir.path(), "unknown.yml", "steps:\n  - hover: '#menu'\n").await;
        match load_scenario(&unknown).await {
            Err(LoadError::Validation { message, .. }) => assert!(message.contains("hover")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_discover_sorted_non_recursive() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.yml", "steps: []").await;
        write(dir.path(), "a.yaml", "steps: []").await;
        write(dir.path(), "notes.md", "# notes").await;
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        write(&dir.path().join("nested"), "c.yaml", "steps: []").await;

        let files = discover(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.yaml", "b.yml"]);

        assert!(matches!(
            discover(&dir.path().join("nope")),
            Err(LoadError::DirectoryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_load_directory_skips_invalid() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.yaml", "steps:\n  - goto: https://x.com\n").await;
        write(dir.path(), "bad.yaml", "steps:\n  - {}\n").await;

        let loaded = load_directory(dir.path()).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].path.ends_with("good.yaml"));
    }

    #[tokio::test]
    async fn test_validate_syntax() {
        let dir = tempfile::tempdir().unwrap();

        let ok = write(dir.path(), "ok.yaml", "name: Ok\nsteps:\n  - wait: {}\n").await;
        let report = validate_syntax(&ok).await;
        assert!(report.valid);
        assert_eq!(report.scenario_name.as_deref(), Some("Ok"));
        assert_eq!(report.steps_count, Some(1));
        assert_eq!(report.warnings.len(), 1);

        let empty_steps = write(dir.path(), "none.yaml", "steps: []\n").await;
        let report = validate_syntax(&empty_steps).await;
        assert!(report.valid);
        assert_eq!(report.warnings, vec!["Steps list is empty".to_string()]);

        let no_steps = write(dir.path(), "nosteps.yaml", "name: x\n").await;
        let report = validate_syntax(&no_steps).await;
        assert!(!report.valid);
        assert_eq!(report.errors, vec!["Validation: 'steps' is required".to_string()]);
        assert_eq!(report.steps_count, None);
    }

    #[tokio::test]
    async fn test_write_example_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("example.yaml");
        write_example(&path).await.unwrap();

        let loaded = load_scenario(&path).await.unwrap();
        assert_eq!(loaded, example_scenario());
        assert_eq!(loaded.steps_by_kind(ActionKind::Fill).len(), 2);
    }
}
