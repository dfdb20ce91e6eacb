//! Runs scenario files and directories and collects one record per file.

use crate::crew::{CrewError, CrewManager, RunResult};
use crate::loader::{self, LoadError};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("No scenarios found in {0}")]
    NoScenarios(PathBuf),

    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize results: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStatus {
    ValidationFailed,
    Error,
    Cancelled,
}

impl FailureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStatus::ValidationFailed => "validation_failed",
            FailureStatus::Error => "error",
            FailureStatus::Cancelled => "cancelled",
        }
    }
}

/// What a single scenario file produced.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RunRecord {
    Completed(Box<RunResult>),
    Failed {
        status: FailureStatus,
        scenario_path: String,
        errors: Vec<String>,
    },
}

impl RunRecord {
    fn failed(status: FailureStatus, path: &Path, errors: Vec<String>) -> Self {
        RunRecord::Failed {
            status,
            scenario_path: path.display().to_string(),
            errors,
        }
    }

    pub fn passed(&self) -> bool {
        match self {
            RunRecord::Completed(result) => result.passed(),
            RunRecord::Failed { .. } => false,
        }
    }

    pub fn status_str(&self) -> &'static str {
        match self {
            RunRecord::Completed(result) => result.overall_status().as_str(),
            RunRecord::Failed { status, .. } => status.as_str(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            RunRecord::Failed {
                status: FailureStatus::Cancelled,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_records(records: &[RunRecord]) -> Self {
        let passed = records.iter().filter(|r| r.passed()).count();
        Self {
            total: records.len(),
            passed,
            failed: records.len() - passed,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} scenarios: {} passed, {} failed",
            self.total, self.passed, self.failed
        )
    }
}

/// 0 only when there is at least one record and every record passed.
pub fn exit_code(records: &[RunRecord]) -> i32 {
    if !records.is_empty() && records.iter().all(RunRecord::passed) {
        0
    } else {
        1
    }
}

/// Persists the records as a JSON array.
pub async fn write_output(path: &Path, records: &[RunRecord]) -> Result<(), RunnerError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(records)?;
    tokio::fs::write(path, json).await?;
    info!(path = %path.display(), records = records.len(), "Results written");
    Ok(())
}

pub struct Runner {
    crew: Arc<CrewManager>,
    max_parallel: usize,
}

impl Runner {
    pub fn new(crew: Arc<CrewManager>, max_parallel: usize) -> Self {
        Self {
            crew,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Runs a single file, or every scenario file directly inside a directory.
    pub async fn run_path(
        &self,
        path: &Path,
        cancel: CancellationToken,
    ) -> Result<Vec<RunRecord>, RunnerError> {
        if path.is_dir() {
            self.run_directory(path, cancel).await
        } else {
            let record = self.run_file(path, cancel).await;
            log_summary(std::slice::from_ref(&record));
            Ok(vec![record])
        }
    }

    pub async fn run_directory(
        &self,
        dir: &Path,
        cancel: CancellationToken,
    ) -> Result<Vec<RunRecord>, RunnerError> {
        let files = loader::discover(dir)?;
        if files.is_empty() {
            return Err(RunnerError::NoScenarios(dir.to_path_buf()));
        }
        info!(
            scenario_count = files.len(),
            max_parallel = self.max_parallel,
            "Running scenarios"
        );

        let records: Vec<RunRecord> = stream::iter(files)
            .map(|path| {
                let cancel = cancel.clone();
                async move { self.run_file(&path, cancel).await }
            })
            .buffered(self.max_parallel)
            .collect()
            .await;

        log_summary(&records);
        Ok(records)
    }

    /// Never fails: load and run errors become `RunRecord::Failed`.
    pub async fn run_file(&self, path: &Path, cancel: CancellationToken) -> RunRecord {
        if cancel.is_cancelled() {
            let errors = vec!["Run cancelled before start".to_string()];
            return RunRecord::failed(FailureStatus::Cancelled, path, errors);
        }

        let validation = loader::validate_syntax(path).await;
        if !validation.valid {
            error!(path = %path.display(), errors = ?validation.errors, "Scenario validation failed");
            return RunRecord::failed(FailureStatus::ValidationFailed, path, validation.errors);
        }
        for warning in &validation.warnings {
            warn!(path = %path.display(), "{}", warning);
        }

        let scenario = match loader::load_scenario(path).await {
            Ok(scenario) => scenario,
            Err(e) => {
                let errors = vec![e.to_string()];
                return RunRecord::failed(FailureStatus::ValidationFailed, path, errors);
            }
        };

        match self
            .crew
            .run_scenario_with_cancel(&scenario, Some(path), cancel)
            .await
        {
            Ok(result) => RunRecord::Completed(Box::new(result)),
            Err(e @ CrewError::Cancelled) => {
                RunRecord::failed(FailureStatus::Cancelled, path, vec![e.to_string()])
            }
            Err(e) => RunRecord::failed(FailureStatus::Error, path, vec![e.to_string()]),
        }
    }
}

fn log_summary(records: &[RunRecord]) {
    let summary = RunSummary::from_records(records);
    info!(
        total_tests = summary.total,
        passed = summary.passed,
        failed = summary.failed,
        success_rate = summary.success_rate(),
        "Test execution finished"
    );
}
