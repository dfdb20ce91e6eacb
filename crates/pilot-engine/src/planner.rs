//! Scenario analysis, execution planning and recovery suggestions.

use crate::config::PlannerConfig;
use crate::risk;
use pilot_common::error::ErrorKind;
use pilot_common::scenario::{Action, ActionKind, Scenario, Step};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("Scenario '{0}' has no steps")]
    EmptyScenario(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskArea {
    pub step_index: usize,
    pub action: ActionKind,
    pub risk_level: u8,
    pub risks: Vec<String>,
    pub mitigations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioAnalysis {
    pub total_steps: usize,
    pub risk_areas: Vec<RiskArea>,
    pub complexity_score: u32,
    pub estimated_duration: f64,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointAction {
    Screenshot,
}

/// A mandatory verification before a risky step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub before_step: usize,
    pub required_action: CheckpointAction,
    pub validation: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPointKind {
    Assertion,
    FinalStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanFallback {
    RetryFromLastCheckpoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPoint {
    pub step_index: usize,
    pub kind: RecoveryPointKind,
    pub fallback_action: PlanFallback,
}

/// Declarative plan. The strategy labels never change how steps are scheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub strategy: String,
    pub timeout_strategy: String,
    pub retry_strategy: String,
    pub checkpoints: Vec<Checkpoint>,
    pub recovery_points: Vec<RecoveryPoint>,
    pub parallel_groups: Vec<Vec<usize>>,
}

/// What went wrong, handed to [`Planner::suggest_recovery`].
#[derive(Debug, Clone)]
pub struct ErrorContext<'a> {
    pub error_kind: ErrorKind,
    pub failed_step: &'a Step,
    pub step_index: usize,
    pub error_message: &'a str,
    /// Scenario-level override of the attempt budget.
    pub retry_budget: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    RetryWithFallback,
    Skip,
    Abort,
}

/// Session-level action performed before a recovery retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FallbackAction {
    Wait { seconds: f64 },
    ScrollIntoView,
    RetryStep,
    RefreshPage,
    ClearCookies,
    RetryNavigation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPlan {
    pub strategy: RecoveryStrategy,
    pub max_attempts: u32,
    pub fallback_actions: Vec<FallbackAction>,
    pub alternative_selectors: Vec<String>,
}

pub struct Planner {
    config: PlannerConfig,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new(PlannerConfig::default())
    }
}

impl Planner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn analyze(&self, scenario: &Scenario) -> Result<ScenarioAnalysis, PlanningError> {
        if scenario.steps.is_empty() {
            return Err(PlanningError::EmptyScenario(
                scenario.display_name().to_string(),
            ));
        }
        info!(steps = scenario.step_count(), "Analyzing scenario");

        let mut analysis = ScenarioAnalysis {
            total_steps: scenario.step_count(),
            risk_areas: Vec::new(),
            complexity_score: 0,
            estimated_duration: 0.0,
            recommendations: Vec::new(),
        };

        for (i, step) in scenario.steps.iter().enumerate() {
            let assessment = risk::assess(step, i);
            analysis.complexity_score += assessment.complexity;
            analysis.estimated_duration += assessment.estimated_duration;
            if assessment.risk_level > self.config.risk_threshold {
                analysis.risk_areas.push(RiskArea {
                    step_index: i,
                    action: step.action_type(),
                    risk_level: assessment.risk_level,
                    risks: assessment.risks,
                    mitigations: assessment.mitigations,
                });
            }
        }

        if analysis.complexity_score > self.config.complexity_split_threshold {
            analysis
                .recommendations
                .push("Split the scenario into smaller scenarios".to_string());
        }

        if scenario.steps_by_kind(ActionKind::Fill).len() > self.config.fill_batch_threshold {
            analysis
                .recommendations
                .push("Batch form fill steps and watch for page loads between them".to_string());
        }

        info!(
            complexity = analysis.complexity_score,
            risk_count = analysis.risk_areas.len(),
            "Scenario analysis complete"
        );
        Ok(analysis)
    }

    pub fn plan(
        &self,
        scenario: &Scenario,
        analysis: &ScenarioAnalysis,
    ) -> Result<ExecutionPlan, PlanningError> {
        if scenario.steps.is_empty() {
            return Err(PlanningError::EmptyScenario(
                scenario.display_name().to_string(),
            ));
        }

        let checkpoints = analysis
            .risk_areas
            .iter()
            .map(|area| Checkpoint {
                before_step: area.step_index,
                required_action: CheckpointAction::Screenshot,
                validation: area.mitigations.clone(),
            })
            .collect::<Vec<_>>();

        let last = scenario.steps.len() - 1;
        let recovery_points = scenario
            .steps
            .iter()
            .enumerate()
            .filter_map(|(i, step)| {
                let kind = if step.action_type().is_assertion() {
                    RecoveryPointKind::Assertion
                } else if i == last {
                    RecoveryPointKind::FinalStep
                } else {
                    return None;
                };
                Some(RecoveryPoint {
                    step_index: i,
                    kind,
                    fallback_action: PlanFallback::RetryFromLastCheckpoint,
                })
            })
            .collect::<Vec<_>>();

        info!(
            checkpoints = checkpoints.len(),
            recovery_points = recovery_points.len(),
            "Execution plan created"
        );

        Ok(ExecutionPlan {
            strategy: self.config.strategy.clone(),
            timeout_strategy: self.config.timeout_strategy.clone(),
            retry_strategy: self.config.retry_strategy.clone(),
            checkpoints,
            recovery_points,
            parallel_groups: Vec::new(),
        })
    }

    pub fn suggest_recovery(&self, ctx: &ErrorContext<'_>) -> RecoveryPlan {
        warn!(
            step_index = ctx.step_index,
            error_kind = %ctx.error_kind,
            error = %ctx.error_message,
            "Building recovery plan"
        );

        let max_attempts = ctx
            .retry_budget
            .unwrap_or(self.config.max_recovery_attempts);
        let mut plan = RecoveryPlan {
            strategy: RecoveryStrategy::RetryWithFallback,
            max_attempts,
            fallback_actions: Vec::new(),
            alternative_selectors: Vec::new(),
        };

        match ctx.error_kind {
            ErrorKind::Timeout => {
                plan.fallback_actions = vec![
                    FallbackAction::Wait { seconds: 2.0 },
                    FallbackAction::ScrollIntoView,
                    FallbackAction::RetryStep,
                ];
            }
            ErrorKind::ElementNotFound => {
                plan.alternative_selectors = alternative_selectors(ctx.failed_step);
            }
            ErrorKind::NavigationFailed => {
                plan.fallback_actions = vec![
                    FallbackAction::RefreshPage,
                    FallbackAction::ClearCookies,
                    FallbackAction::RetryNavigation,
                ];
            }
            ErrorKind::InvalidStep | ErrorKind::UnsupportedAction => {
                plan.strategy = RecoveryStrategy::Abort;
            }
            ErrorKind::NetworkError | ErrorKind::AssertionFailed | ErrorKind::Unknown => {
                plan.strategy = RecoveryStrategy::Skip;
            }
        }

        plan
    }
}

/// Advisory selectors derived from a failed click's text or fill's label.
pub fn alternative_selectors(step: &Step) -> Vec<String> {
    match &step.action {
        Action::Click(click) => match click.text.as_deref().filter(|t| !t.is_empty()) {
            Some(text) => vec![
                format!("button:has-text('{}')", text),
                format!("[aria-label*='{}']", text),
                format!("a:has-text('{}')", text),
                format!("input[value='{}']", text),
            ],
            None => Vec::new(),
        },
        Action::Fill(fill) => match fill.label.as_deref().filter(|l| !l.is_empty()) {
            Some(label) => vec![
                format!("input[placeholder*='{}']", label),
                format!("label:has-text('{}') + input", label),
                format!("[aria-label*='{}']", label),
            ],
            None => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_common::scenario::{ClickAction, FillAction};

    fn fill(placeholder: &str) -> Step {
        Step::new(Action::Fill(FillAction {
            placeholder: Some(placeholder.into()),
            value: "x".into(),
            ..Default::default()
        }))
    }

    fn click(text: &str) -> Step {
        Step::new(Action::Click(ClickAction {
            text: Some(text.into()),
            ..Default::default()
        }))
    }

    fn ctx<'a>(kind: ErrorKind, step: &'a Step) -> ErrorContext<'a> {
        ErrorContext {
            error_kind: kind,
            failed_step: step,
            step_index: 0,
            error_message: "boom",
            retry_budget: None,
        }
    }

    #[test]
    fn test_analyze_empty_scenario_fails() {
        let planner = Planner::default();
        let err = planner.analyze(&Scenario::new("empty", vec![])).unwrap_err();
        assert!(matches!(err, PlanningError::EmptyScenario(_)));
    }

    #[test]
    fn test_analyze_sums_and_recommends() {
        let steps = vec![
            Step::new(Action::Goto("https://x.com".into())),
            fill("a"),
            fill("b"),
            fill("c"),
            fill("d"),
            fill("e"),
            fill("f"),
            Step::new(Action::AssertUrlContains("done".into())),
        ];
        let analysis = Planner::default()
            .analyze(&Scenario::new("form", steps))
            .unwrap();

        assert_eq!(analysis.total_steps, 8);
        // 8 steps at 2, plus 2 for the assertion
        assert_eq!(analysis.complexity_score, 18);
        assert_eq!(analysis.estimated_duration, 8.0);
        assert_eq!(analysis.recommendations.len(), 2);
        // risk 2 is not above the threshold
        assert!(analysis.risk_areas.is_empty());
    }

    #[test]
    fn test_plan_recovery_points() {
        let steps = vec![
            Step::new(Action::Goto("https://x.com".into())),
            Step::new(Action::AssertUrlContains("x".into())),
            click("Next"),
        ];
        let scenario = Scenario::new("s", steps);
        let planner = Planner::default();
        let analysis = planner.analyze(&scenario).unwrap();
        let plan = planner.plan(&scenario, &analysis).unwrap();

        assert_eq!(plan.strategy, "sequential");
        assert_eq!(plan.timeout_strategy, "adaptive");
        assert_eq!(plan.retry_strategy, "smart");
        assert!(plan.parallel_groups.is_empty());
        assert!(plan.checkpoints.is_empty());
        let points: Vec<_> = plan
            .recovery_points
            .iter()
            .map(|p| (p.step_index, p.kind))
            .collect();
        assert_eq!(
            points,
            vec![
                (1, RecoveryPointKind::Assertion),
                (2, RecoveryPointKind::FinalStep)
            ]
        );
    }

    #[test]
    fn test_plan_checkpoints_before_risky_steps() {
        let config = PlannerConfig {
            risk_threshold: 1,
            ..Default::default()
        };
        let planner = Planner::new(config);
        let scenario = Scenario::new(
            "s",
            vec![Step::new(Action::Goto("https://x.com".into())), click("OK")],
        );
        let analysis = planner.analyze(&scenario).unwrap();
        let plan = planner.plan(&scenario, &analysis).unwrap();

        assert_eq!(plan.checkpoints.len(), 1);
        assert_eq!(plan.checkpoints[0].before_step, 1);
        assert_eq!(plan.checkpoints[0].required_action, CheckpointAction::Screenshot);
    }

    #[test]
    fn test_recovery_for_timeout() {
        let step = click("Save");
        let plan = Planner::default().suggest_recovery(&ctx(ErrorKind::Timeout, &step));
        assert_eq!(plan.strategy, RecoveryStrategy::RetryWithFallback);
        assert_eq!(plan.max_attempts, 3);
        assert_eq!(
            plan.fallback_actions,
            vec![
                FallbackAction::Wait { seconds: 2.0 },
                FallbackAction::ScrollIntoView,
                FallbackAction::RetryStep
            ]
        );
    }

    #[test]
    fn test_recovery_for_missing_element() {
        let step = click("Login");
        let plan = Planner::default().suggest_recovery(&ctx(ErrorKind::ElementNotFound, &step));
        assert_eq!(plan.strategy, RecoveryStrategy::RetryWithFallback);
        assert!(plan.fallback_actions.is_empty());
        assert_eq!(
            plan.alternative_selectors,
            vec![
                "button:has-text('Login')",
                "[aria-label*='Login']",
                "a:has-text('Login')",
                "input[value='Login']"
            ]
        );

        let step = Step::new(Action::Fill(FillAction {
            label: Some("Email".into()),
            value: "a".into(),
            ..Default::default()
        }));
        let plan = Planner::default().suggest_recovery(&ctx(ErrorKind::ElementNotFound, &step));
        assert_eq!(
            plan.alternative_selectors,
            vec![
                "input[placeholder*='Email']",
                "label:has-text('Email') + input",
                "[aria-label*='Email']"
            ]
        );
    }

    #[test]
    fn test_recovery_for_navigation() {
        let step = Step::new(Action::Goto("https://x.com".into()));
        let plan = Planner::default().suggest_recovery(&ctx(ErrorKind::NavigationFailed, &step));
        assert_eq!(
            plan.fallback_actions,
            vec![
                FallbackAction::RefreshPage,
                FallbackAction::ClearCookies,
                FallbackAction::RetryNavigation
            ]
        );
    }

    #[test]
    fn test_recovery_skip_and_abort() {
        let step = click("Go");
        let planner = Planner::default();
        for kind in [
            ErrorKind::NetworkError,
            ErrorKind::AssertionFailed,
            ErrorKind::Unknown,
        ] {
            assert_eq!(
                planner.suggest_recovery(&ctx(kind, &step)).strategy,
                RecoveryStrategy::Skip
            );
        }
        for kind in [ErrorKind::InvalidStep, ErrorKind::UnsupportedAction] {
            assert_eq!(
                planner.suggest_recovery(&ctx(kind, &step)).strategy,
                RecoveryStrategy::Abort
            );
        }
    }

    #[test]
    fn test_retry_budget_override() {
        let step = click("Go");
        let mut c = ctx(ErrorKind::Timeout, &step);
        c.retry_budget = Some(2);
        assert_eq!(Planner::default().suggest_recovery(&c).max_attempts, 2);
    }
}
