//! Per-step fragility scoring.

use pilot_common::scenario::{Action, Step};
use serde::{Deserialize, Serialize};

const BASE_RISK: u8 = 1;
const BASE_COMPLEXITY: u32 = 2;
const BASE_DURATION_SECS: f64 = 1.0;
const MAX_RISK: u8 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub step_index: usize,
    /// 1 (safe) to 5 (fragile).
    pub risk_level: u8,
    pub complexity: u32,
    pub estimated_duration: f64,
    pub risks: Vec<String>,
    pub mitigations: Vec<String>,
}

/// Scores one step in isolation. Deterministic and additive.
pub fn assess(step: &Step, index: usize) -> RiskAssessment {
    let mut assessment = RiskAssessment {
        step_index: index,
        risk_level: BASE_RISK,
        complexity: BASE_COMPLEXITY,
        estimated_duration: BASE_DURATION_SECS,
        risks: Vec::new(),
        mitigations: Vec::new(),
    };

    match &step.action {
        Action::Fill(fill) if fill.selector.is_none() && fill.label.is_none() => {
            assessment.risk_level += 1;
            assessment.risks.push("weak element locator".to_string());
            assessment
                .mitigations
                .push("use label or strong selector".to_string());
        }
        Action::Click(click) => {
            if let Some(text) = click.text.as_deref() {
                let len = text.chars().count();
                if len > 0 && len < 3 {
                    assessment.risk_level += 1;
                    assessment.risks.push("very short button text".to_string());
                }
            }
        }
        _ => {}
    }

    if step.action_type().is_assertion() {
        assessment.complexity += 2;
        assessment
            .risks
            .push("assertion step: critical checkpoint".to_string());
    }

    assessment.risk_level = assessment.risk_level.min(MAX_RISK);
    assessment
}
