//! Result verification and scoring.

use pilot_common::error::ErrorKind;
use pilot_common::result::{StepOutcome, StepResult, StepStatus};
use pilot_common::scenario::ActionKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

const SLOW_STEP_SECS: f64 = 5.0;
const CRITICAL_PENALTY: f64 = 0.2;
const DIVERSITY_BONUS_PER_KIND: f64 = 0.1;
const MAX_DIVERSITY_BONUS: f64 = 0.3;
const RETRY_WARNING_THRESHOLD: usize = 2;
const ASSERTION_CONFIDENCE_DECAY: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Passed,
    PassedWithWarnings,
    PartiallyFailed,
    Failed,
}

impl OverallStatus {
    /// Band for a success rate; each band includes its lower bound.
    pub fn from_rate(rate: f64) -> Self {
        if rate >= 1.0 {
            OverallStatus::Passed
        } else if rate >= 0.8 {
            OverallStatus::PassedWithWarnings
        } else if rate >= 0.5 {
            OverallStatus::PartiallyFailed
        } else {
            OverallStatus::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Passed => "passed",
            OverallStatus::PassedWithWarnings => "passed_with_warnings",
            OverallStatus::PartiallyFailed => "partially_failed",
            OverallStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalFailure {
    pub step_index: usize,
    pub action: ActionKind,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub impact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub overall_status: OverallStatus,
    pub total_steps: usize,
    pub passed_steps: usize,
    pub failed_steps: usize,
    pub skipped_steps: usize,
    pub success_rate: f64,
    pub critical_failures: Vec<CriticalFailure>,
    pub warnings: Vec<String>,
    pub quality_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion_validation: Option<AssertionValidation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_analysis: Option<FailureAnalysis>,
}

/// Failed or skipped-after-failure assertion and navigation steps.
fn is_critical(result: &StepResult) -> bool {
    if result.is_success() || result.error.is_none() {
        return false;
    }
    result.action.is_assertion() || result.error_kind() == Some(ErrorKind::NavigationFailed)
}

fn mentions_retry(result: &StepResult) -> bool {
    result
        .error_message()
        .is_some_and(|m| m.to_lowercase().contains("retry"))
}

/// Aggregates step results into counts, status, score and warnings.
pub fn verify(results: &[StepResult]) -> VerificationReport {
    info!(total_steps = results.len(), "Verifying step results");

    let total_steps = results.len();
    let mut passed_steps = 0;
    let mut failed_steps = 0;
    let mut skipped_steps = 0;
    let mut critical_failures = Vec::new();

    for result in results {
        match result.status {
            StepStatus::Success => passed_steps += 1,
            StepStatus::Error => failed_steps += 1,
            StepStatus::Skipped => skipped_steps += 1,
        }
        if is_critical(result) {
            critical_failures.push(CriticalFailure {
                step_index: result.step_index,
                action: result.action,
                error: result.error_message().map(str::to_string),
                error_kind: result.error_kind(),
                impact: "critical".to_string(),
            });
        }
    }

    let success_rate = if total_steps > 0 {
        passed_steps as f64 / total_steps as f64
    } else {
        0.0
    };
    let overall_status = OverallStatus::from_rate(success_rate);

    let distinct_kinds = results.iter().map(|r| r.action).collect::<BTreeSet<_>>().len();
    let quality_score = quality_score(success_rate, critical_failures.len(), distinct_kinds);

    let warnings = detect_warnings(results, success_rate);

    info!(
        status = overall_status.as_str(),
        success_rate,
        quality_score,
        "Verification complete"
    );

    VerificationReport {
        overall_status,
        total_steps,
        passed_steps,
        failed_steps,
        skipped_steps,
        success_rate,
        critical_failures,
        warnings,
        quality_score,
        assertion_validation: None,
        failure_analysis: None,
    }
}

/// `clamp(rate - 0.2 * critical + min(0.1 * kinds, 0.3), 0, 1)`, two decimals.
pub fn quality_score(success_rate: f64, critical_count: usize, distinct_kinds: usize) -> f64 {
    let penalty = critical_count as f64 * CRITICAL_PENALTY;
    let bonus = (distinct_kinds as f64 * DIVERSITY_BONUS_PER_KIND).min(MAX_DIVERSITY_BONUS);
    let score = (success_rate - penalty + bonus).clamp(0.0, 1.0);
    (score * 100.0).round() / 100.0
}

fn detect_warnings(results: &[StepResult], success_rate: f64) -> Vec<String> {
    let mut warnings = Vec::new();

    let slow = results.iter().filter(|r| r.duration > SLOW_STEP_SECS).count();
    if slow > 0 {
        warnings.push(format!("{} steps took longer than 5s", slow));
    }

    if (0.8..1.0).contains(&success_rate) {
        warnings.push("Success rate is below the ideal level".to_string());
    }

    let retries = results.iter().filter(|r| mentions_retry(r)).count();
    if retries > RETRY_WARNING_THRESHOLD {
        warnings.push("Excessive retries were needed, the test may be unstable".to_string());
    }

    warnings
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureAnalysis {
    /// Step indexes grouped by error kind.
    pub failure_patterns: BTreeMap<ErrorKind, Vec<usize>>,
    pub root_causes: Vec<String>,
    pub fix_suggestions: Vec<String>,
    pub impact_assessment: Impact,
}

pub fn analyze_failures<'a, I>(failed_steps: I) -> FailureAnalysis
where
    I: IntoIterator<Item = &'a StepResult>,
{
    let mut failure_patterns: BTreeMap<ErrorKind, Vec<usize>> = BTreeMap::new();
    let mut total = 0;
    for result in failed_steps {
        total += 1;
        let kind = result.error_kind().unwrap_or(ErrorKind::Unknown);
        failure_patterns
            .entry(kind)
            .or_default()
            .push(result.step_index);
    }
    info!(failure_count = total, "Analyzing failures");

    let mut root_causes = Vec::new();
    let mut fix_suggestions = Vec::new();
    for kind in failure_patterns.keys() {
        let pair = match kind {
            ErrorKind::Timeout => Some((
                "Pages may be loading slowly",
                "Increase timeouts or add a wait step",
            )),
            ErrorKind::ElementNotFound => Some((
                "DOM changes or weak selectors",
                "Use stronger selectors or add a wait condition",
            )),
            ErrorKind::NavigationFailed => Some((
                "Network connectivity or server problems",
                "Add a network retry policy",
            )),
            _ => None,
        };
        if let Some((cause, fix)) = pair {
            root_causes.push(cause.to_string());
            fix_suggestions.push(fix.to_string());
        }
    }

    let impact_assessment = if total >= 3 {
        Impact::High
    } else if total >= 2 {
        Impact::Medium
    } else {
        Impact::Low
    };

    FailureAnalysis {
        failure_patterns,
        root_causes,
        fix_suggestions,
        impact_assessment,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionDetail {
    pub step_index: usize,
    pub action: ActionKind,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionValidation {
    pub total_assertions: usize,
    pub passed_assertions: usize,
    pub failed_assertions: usize,
    pub assertion_details: Vec<AssertionDetail>,
    /// 1.0 times 0.8 per failed assertion.
    pub confidence_score: f64,
}

pub fn validate_assertions<'a, I>(assertion_steps: I) -> AssertionValidation
where
    I: IntoIterator<Item = &'a StepResult>,
{
    let mut validation = AssertionValidation {
        total_assertions: 0,
        passed_assertions: 0,
        failed_assertions: 0,
        assertion_details: Vec::new(),
        confidence_score: 1.0,
    };

    for result in assertion_steps {
        let passed = result.passed();
        let actual = match &result.outcome {
            Some(StepOutcome::UrlAsserted { current_url, .. }) => Some(current_url.clone()),
            _ => None,
        };

        validation.total_assertions += 1;
        if passed {
            validation.passed_assertions += 1;
        } else {
            validation.failed_assertions += 1;
            validation.confidence_score *= ASSERTION_CONFIDENCE_DECAY;
        }
        validation.assertion_details.push(AssertionDetail {
            step_index: result.step_index,
            action: result.action,
            expected: result.target.clone(),
            actual,
            passed,
        });
    }

    info!(
        count = validation.total_assertions,
        confidence = validation.confidence_score,
        "Assertions validated"
    );
    validation
}
