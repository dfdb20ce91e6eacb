//! Final per-scenario report.

use crate::config::ArtifactsConfig;
use crate::crew::ExecutionSummary;
use crate::verifier::{CriticalFailure, OverallStatus, VerificationReport};
use chrono::{DateTime, Utc};
use pilot_common::error::ErrorKind;
use pilot_common::protocol::BrowserKind;
use pilot_common::result::{RecoveryRecord, StepResult, StepStatus};
use pilot_common::scenario::{ActionKind, Scenario};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

const LOW_SUCCESS_RATE: f64 = 0.8;
const SLOW_AVERAGE_STEP_SECS: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub test_name: String,
    pub timestamp: DateTime<Utc>,
    pub duration: f64,
    pub browser: BrowserKind,
    pub headless: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub overall_status: OverallStatus,
    pub total_steps: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub success_rate: f64,
    pub quality_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDetail {
    pub index: usize,
    pub action: ActionKind,
    pub status: StepStatus,
    pub duration: f64,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    pub screenshots: Vec<String>,
    pub traces: Vec<String>,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub summary: ReportSummary,
    pub step_details: Vec<StepDetail>,
    pub failures: Vec<CriticalFailure>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    pub artifacts: Artifacts,
}

pub fn generate_report(
    scenario: &Scenario,
    execution: &ExecutionSummary,
    verification: &VerificationReport,
    artifacts: &ArtifactsConfig,
) -> Report {
    info!("Generating report");

    let step_details = execution
        .steps
        .iter()
        .map(|r| {
            let failed = r.status != StepStatus::Success;
            StepDetail {
                index: r.step_index,
                action: r.action,
                status: r.status,
                duration: r.duration,
                target: r.target.clone().unwrap_or_else(|| "N/A".to_string()),
                error: r
                    .error_message()
                    .filter(|_| failed)
                    .map(str::to_string),
                error_kind: r.error_kind().filter(|_| failed),
                recovery: r.recovery.clone(),
            }
        })
        .collect();

    let report = Report {
        metadata: ReportMetadata {
            test_name: scenario.display_name().to_string(),
            timestamp: Utc::now(),
            duration: execution.total_duration,
            browser: execution.session.browser,
            headless: execution.session.headless,
            tags: scenario.tags.clone(),
        },
        summary: ReportSummary {
            overall_status: verification.overall_status,
            total_steps: verification.total_steps,
            passed: verification.passed_steps,
            failed: verification.failed_steps,
            skipped: verification.skipped_steps,
            success_rate: verification.success_rate,
            quality_score: verification.quality_score,
        },
        step_details,
        failures: verification.critical_failures.clone(),
        warnings: verification.warnings.clone(),
        recommendations: recommendations(verification, &execution.steps),
        artifacts: collect_artifacts(artifacts),
    };

    info!(status = report.summary.overall_status.as_str(), "Report generated");
    report
}

/// `steps` supplies per-step durations; recovery waits between dispatches do not count.
pub fn recommendations(verification: &VerificationReport, steps: &[StepResult]) -> Vec<String> {
    let mut out = Vec::new();

    if verification.success_rate < LOW_SUCCESS_RATE {
        out.push("Add wait strategies to improve test stability".to_string());
    }

    if !steps.is_empty()
        && steps.iter().map(|r| r.duration).sum::<f64>() / steps.len() as f64
            > SLOW_AVERAGE_STEP_SECS
    {
        out.push("Consider running scenarios in parallel to improve performance".to_string());
    }

    if !verification.critical_failures.is_empty() {
        out.push("Strengthen selectors to prevent critical failures".to_string());
    }

    out
}

/// Snapshot of the files currently present in the artifact directories.
pub fn collect_artifacts(config: &ArtifactsConfig) -> Artifacts {
    Artifacts {
        screenshots: list_files(&config.screenshots_dir, "*.png"),
        traces: list_files(&config.traces_dir, "*.zip"),
        logs: list_files(&config.logs_dir, "*.log"),
    }
}

fn list_files(dir: &Path, pattern: &str) -> Vec<String> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let full = format!("{}/{}", escaped, pattern);
    match glob::glob(&full) {
        Ok(paths) => {
            let mut files: Vec<String> = paths
                .filter_map(Result::ok)
                .map(|p| p.display().to_string())
                .collect();
            files.sort();
            files
        }
        Err(e) => {
            debug!(pattern = %full, "Invalid artifact pattern: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier;
    use pilot_common::protocol::SessionConfig;
    use pilot_common::result::{StepFailure, StepOutcome, StepResult};
    use pilot_common::scenario::{Action, Step};

    fn execution(steps: Vec<StepResult>, total_duration: f64) -> ExecutionSummary {
        ExecutionSummary {
            steps,
            total_duration,
            aborted_at: None,
            session: SessionConfig::default(),
        }
    }

    #[test]
    fn test_report_details_and_recommendations() {
        let scenario = Scenario::new(
            "Login",
            vec![
                Step::new(Action::Goto("https://x.com".into())),
                Step::new(Action::AssertUrlContains("dashboard".into())),
            ],
        );
        let steps = vec![
            StepResult::success(
                0,
                ActionKind::Goto,
                8.0,
                StepOutcome::Navigated {
                    url: "https://x.com".into(),
                    current_url: "https://x.com/".into(),
                },
            )
            .with_target(Some("https://x.com".into())),
            StepResult::failure(
                1,
                ActionKind::AssertUrlContains,
                0.2,
                StepFailure::new("URL assertion failed", ErrorKind::AssertionFailed),
            ),
        ];
        let verification = verifier::verify(&steps);
        let exec = execution(steps, 9.0);
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactsConfig {
            screenshots_dir: dir.path().join("missing"),
            traces_dir: dir.path().join("missing"),
            logs_dir: dir.path().join("missing"),
            downloads_dir: dir.path().join("missing"),
        };

        let report = generate_report(&scenario, &exec, &verification, &artifacts);

        assert_eq!(report.metadata.test_name, "Login");
        assert_eq!(report.summary.total_steps, 2);
        assert_eq!(report.summary.passed, 1);
        assert_eq!(report.step_details[0].target, "https://x.com");
        assert_eq!(report.step_details[0].error, None);
        assert_eq!(report.step_details[1].target, "N/A");
        assert_eq!(
            report.step_details[1].error_kind,
            Some(ErrorKind::AssertionFailed)
        );
        assert_eq!(report.failures.len(), 1);
        // rate 0.5, 4.1s per step, one critical failure
        assert_eq!(report.recommendations.len(), 3);
        assert_eq!(report.artifacts, Artifacts::default());
    }

    #[test]
    fn test_slow_advice_uses_step_durations() {
        let steps = vec![
            StepResult::success(0, ActionKind::Goto, 0.5, StepOutcome::Waited),
            StepResult::success(1, ActionKind::Click, 0.7, StepOutcome::Waited),
        ];
        let verification = verifier::verify(&steps);
        // a long step loop (recovery waits) does not make the steps slow
        let exec = execution(steps, 30.0);
        assert!(recommendations(&verification, &exec.steps).is_empty());
    }

    #[test]
    fn test_collect_artifacts_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let shots = dir.path().join("screenshots");
        std::fs::create_dir_all(&shots).unwrap();
        std::fs::write(shots.join("b.png"), b"png").unwrap();
        std::fs::write(shots.join("a.png"), b"png").unwrap();
        std::fs::write(shots.join("notes.txt"), b"txt").unwrap();

        let config = ArtifactsConfig {
            screenshots_dir: shots.clone(),
            traces_dir: dir.path().join("traces"),
            logs_dir: dir.path().join("logs"),
            downloads_dir: dir.path().join("downloads"),
        };
        let artifacts = collect_artifacts(&config);
        assert_eq!(artifacts.screenshots.len(), 2);
        assert!(artifacts.screenshots[0].ends_with("a.png"));
        assert!(artifacts.traces.is_empty());
    }
}
