use crate::loader::ValidationReport;
use crate::runner::{RunRecord, RunSummary};
use pilot_common::result::StepStatus;

pub fn format_record(record: &RunRecord) -> String {
    match record {
        RunRecord::Completed(result) => {
            let summary = &result.summary;
            let mut output = format!(
                "{}: {}\nSteps: {}/{} passed, {} failed, {} skipped\nSuccess rate: {:.0}%  Quality: {:.2}  Duration: {:.1}s",
                result.metadata.scenario_name,
                summary.overall_status.as_str(),
                summary.passed,
                summary.total_steps,
                summary.failed,
                summary.skipped,
                summary.success_rate * 100.0,
                summary.quality_score,
                result.metadata.duration,
            );

            let problems: Vec<_> = result
                .report
                .step_details
                .iter()
                .filter(|d| d.status != StepStatus::Success)
                .collect();
            if !problems.is_empty() {
                output.push_str("\n\nFailed steps:");
                for detail in problems {
                    output.push_str(&format!(
                        "\n- [{}] {} {} ({}): {}",
                        detail.index,
                        detail.action,
                        detail.target,
                        detail.status.as_str(),
                        detail.error.as_deref().unwrap_or("no error recorded")
                    ));
                }
            }

            if !result.report.warnings.is_empty() {
                output.push_str("\n\nWarnings:");
                for w in &result.report.warnings {
                    output.push_str(&format!("\n- {}", w));
                }
            }

            if !result.report.recommendations.is_empty() {
                output.push_str("\n\nRecommendations:");
                for r in &result.report.recommendations {
                    output.push_str(&format!("\n- {}", r));
                }
            }

            output
        }
        RunRecord::Failed {
            status,
            scenario_path,
            errors,
        } => {
            let mut output = format!("{}: {}", scenario_path, status.as_str());
            for e in errors {
                output.push_str(&format!("\n- {}", e));
            }
            output
        }
    }
}

pub fn format_summary(records: &[RunRecord]) -> String {
    RunSummary::from_records(records).to_string()
}

pub fn format_validation(path: &str, report: &ValidationReport) -> String {
    let mut output = if report.valid {
        format!(
            "Valid scenario: {} ({}, {} steps)",
            path,
            report.scenario_name.as_deref().unwrap_or("Unnamed Scenario"),
            report.steps_count.unwrap_or(0)
        )
    } else {
        format!("Invalid scenario: {}", path)
    };

    for e in &report.errors {
        output.push_str(&format!("\nError: {}", e));
    }
    for w in &report.warnings {
        output.push_str(&format!("\nWarning: {}", w));
    }
    output
}
