//! Scenario orchestration.
//!
//! `CrewManager` runs one scenario through Planning, Executing, Verifying and
//! Finalizing. Step failures go through the planner's recovery policy: retry
//! (with fallback actions), skip, or abort the remaining steps. The session is
//! closed exactly once per run, on every path that opened it.

use crate::backend::BackendProvider;
use crate::config::{ArtifactsConfig, PilotConfig};
use crate::executor::{DispatchError, DispatcherConfig, StepDispatcher};
use crate::oracle::ElementOracle;
use crate::planner::{
    ErrorContext, ExecutionPlan, Planner, PlanningError, RecoveryPlan, RecoveryStrategy,
    ScenarioAnalysis,
};
use crate::report::{self, Report, ReportSummary};
use crate::verifier::{self, OverallStatus, VerificationReport};
use chrono::{DateTime, Utc};
use pilot_common::error::BackendError;
use pilot_common::protocol::SessionConfig;
use pilot_common::result::{
    RecoveryMethod, RecoveryRecord, StepFailure, StepResult, StepStatus,
};
use pilot_common::scenario::{Scenario, Step};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Planning,
    Executing,
    Verifying,
    Finalizing,
    Completed,
    Error,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Planning => "planning",
            RunPhase::Executing => "executing",
            RunPhase::Verifying => "verifying",
            RunPhase::Finalizing => "finalizing",
            RunPhase::Completed => "completed",
            RunPhase::Error => "error",
        }
    }
}

#[derive(Debug, Error)]
pub enum CrewError {
    #[error("Planning failed: {0}")]
    Planning(#[from] PlanningError),

    #[error("Failed to open browser session: {0}")]
    SessionOpen(#[source] BackendError),

    #[error("Run cancelled")]
    Cancelled,
}

impl CrewError {
    /// Phase in which the run stopped.
    pub fn phase(&self) -> RunPhase {
        match self {
            CrewError::Planning(_) => RunPhase::Planning,
            CrewError::SessionOpen(_) | CrewError::Cancelled => RunPhase::Executing,
        }
    }
}

/// Step results of the execution phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub steps: Vec<StepResult>,
    /// Wall-clock seconds of the step loop, recovery included.
    pub total_duration: f64,
    /// Index of the step that aborted the run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted_at: Option<usize>,
    pub session: SessionConfig,
}

impl ExecutionSummary {
    pub fn aborted(&self) -> bool {
        self.aborted_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub scenario_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_path: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: f64,
}

/// Everything one scenario run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub metadata: RunMetadata,
    pub summary: ReportSummary,
    pub analysis: ScenarioAnalysis,
    pub plan: ExecutionPlan,
    pub execution: ExecutionSummary,
    pub verification: VerificationReport,
    pub report: Report,
    pub phases: Vec<RunPhase>,
}

impl RunResult {
    pub fn overall_status(&self) -> OverallStatus {
        self.summary.overall_status
    }

    pub fn passed(&self) -> bool {
        self.overall_status() == OverallStatus::Passed
    }
}

#[derive(Debug, Clone)]
pub struct CrewConfig {
    pub dispatcher: DispatcherConfig,
    pub artifacts: ArtifactsConfig,
    pub apply_fallback_actions: bool,
    /// When false, every scenario runs headful.
    pub headless: bool,
}

impl Default for CrewConfig {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherConfig::default(),
            artifacts: ArtifactsConfig::default(),
            apply_fallback_actions: true,
            headless: true,
        }
    }
}

impl CrewConfig {
    pub fn from_pilot_config(config: &PilotConfig) -> Self {
        Self {
            dispatcher: DispatcherConfig {
                screenshots_dir: config.artifacts.screenshots_dir.clone(),
                default_timeout_ms: config.browser.timeout_ms,
                security: config.security.clone(),
                ..DispatcherConfig::default()
            },
            artifacts: config.artifacts.clone(),
            apply_fallback_actions: config.runner.apply_fallback_actions,
            headless: config.browser.headless,
        }
    }
}

enum Flow {
    Continue,
    Abort,
}

struct PhaseLog {
    phases: Vec<RunPhase>,
}

impl PhaseLog {
    fn new() -> Self {
        Self { phases: Vec::new() }
    }

    fn enter(&mut self, phase: RunPhase) {
        info!(phase = phase.as_str(), "Entering phase");
        self.phases.push(phase);
    }

    fn fail(&mut self, err: &CrewError) {
        error!(phase = err.phase().as_str(), "Run failed: {}", err);
        self.enter(RunPhase::Error);
    }
}

pub struct CrewManager {
    planner: Planner,
    provider: Arc<dyn BackendProvider>,
    oracle: Option<Arc<dyn ElementOracle>>,
    config: CrewConfig,
}

impl CrewManager {
    pub fn new(planner: Planner, provider: Arc<dyn BackendProvider>, config: CrewConfig) -> Self {
        Self {
            planner,
            provider,
            oracle: None,
            config,
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn ElementOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    fn session_config(&self, scenario: &Scenario) -> SessionConfig {
        let mut session = scenario.session_config();
        session.headless = session.headless && self.config.headless;
        session
    }

    pub async fn run_scenario(
        &self,
        scenario: &Scenario,
        source: Option<&Path>,
    ) -> Result<RunResult, CrewError> {
        self.run_scenario_with_cancel(scenario, source, CancellationToken::new())
            .await
    }

    /// Runs a scenario until it finishes or `cancel` fires. On cancellation
    /// the session is still closed before `CrewError::Cancelled` is returned.
    pub async fn run_scenario_with_cancel(
        &self,
        scenario: &Scenario,
        source: Option<&Path>,
        cancel: CancellationToken,
    ) -> Result<RunResult, CrewError> {
        let span = info_span!("scenario", name = %scenario.display_name());
        self.run_inner(scenario, source, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        scenario: &Scenario,
        source: Option<&Path>,
        cancel: CancellationToken,
    ) -> Result<RunResult, CrewError> {
        let start_time = Utc::now();
        let started = Instant::now();
        let mut phases = PhaseLog::new();
        info!(steps = scenario.step_count(), "Running scenario");

        phases.enter(RunPhase::Planning);
        let planned = self
            .planner
            .analyze(scenario)
            .and_then(|analysis| {
                let plan = self.planner.plan(scenario, &analysis)?;
                Ok((analysis, plan))
            })
            .map_err(CrewError::from);
        let (analysis, plan) = match planned {
            Ok(planned) => planned,
            Err(e) => {
                phases.fail(&e);
                return Err(e);
            }
        };

        phases.enter(RunPhase::Executing);
        let execution = match self.execute_phase(scenario, &cancel).await {
            Ok(execution) => execution,
            Err(e) => {
                phases.fail(&e);
                return Err(e);
            }
        };

        phases.enter(RunPhase::Verifying);
        let verification = self.verify_phase(&execution);
        let report = report::generate_report(
            scenario,
            &execution,
            &verification,
            &self.config.artifacts,
        );

        phases.enter(RunPhase::Finalizing);
        let end_time = Utc::now();
        let duration = started.elapsed().as_secs_f64();
        phases.enter(RunPhase::Completed);

        info!(
            status = report.summary.overall_status.as_str(),
            duration, "Scenario finished"
        );

        Ok(RunResult {
            metadata: RunMetadata {
                scenario_name: scenario.display_name().to_string(),
                scenario_path: source.map(|p| p.display().to_string()),
                start_time,
                end_time,
                duration,
            },
            summary: report.summary.clone(),
            analysis,
            plan,
            execution,
            verification,
            report,
            phases: phases.phases,
        })
    }

    async fn execute_phase(
        &self,
        scenario: &Scenario,
        cancel: &CancellationToken,
    ) -> Result<ExecutionSummary, CrewError> {
        let session = self.session_config(scenario);
        let mut dispatcher = StepDispatcher::new(self.config.dispatcher.clone());
        if let Some(oracle) = &self.oracle {
            dispatcher = dispatcher.with_oracle(oracle.clone());
        }
        dispatcher.set_base_url(scenario.base_url.clone());

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            res = dispatcher.open(self.provider.create(), &session) => Some(res),
        };
        match opened {
            None => {
                Self::teardown(&mut dispatcher).await;
                return Err(CrewError::Cancelled);
            }
            Some(Err(DispatchError::SessionOpen(e))) => return Err(CrewError::SessionOpen(e)),
            Some(Err(DispatchError::NoSession)) => {
                return Err(CrewError::SessionOpen(BackendError::NotReady));
            }
            Some(Ok(())) => {}
        }

        let started = Instant::now();
        let looped = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            out = self.step_loop(&mut dispatcher, scenario) => Some(out),
        };
        Self::teardown(&mut dispatcher).await;

        let (steps, aborted_at) = match looped {
            Some(out) => out,
            None => {
                warn!("Run cancelled during execution");
                return Err(CrewError::Cancelled);
            }
        };

        Ok(ExecutionSummary {
            steps,
            total_duration: started.elapsed().as_secs_f64(),
            aborted_at,
            session,
        })
    }

    async fn teardown(dispatcher: &mut StepDispatcher) {
        if let Err(e) = dispatcher.close().await {
            warn!("Failed to close browser session: {}", e);
        }
    }

    async fn step_loop(
        &self,
        dispatcher: &mut StepDispatcher,
        scenario: &Scenario,
    ) -> (Vec<StepResult>, Option<usize>) {
        let mut results = Vec::with_capacity(scenario.step_count());

        for (index, step) in scenario.steps.iter().enumerate() {
            let result = match dispatcher.execute(step, index).await {
                Ok(result) => result,
                Err(e) => {
                    error!(step_index = index, "Step dispatch failed: {}", e);
                    results.push(Self::dispatch_failure(step, index, &e));
                    continue;
                }
            };

            if result.is_success() {
                results.push(result);
                continue;
            }

            let (result, flow) = self
                .recover(dispatcher, scenario, step, index, result)
                .await;
            results.push(result);
            if let Flow::Abort = flow {
                warn!(step_index = index, "Aborting run, remaining steps are not executed");
                return (results, Some(index));
            }
        }

        (results, None)
    }

    fn dispatch_failure(step: &Step, index: usize, err: &DispatchError) -> StepResult {
        StepResult::failure(
            index,
            step.action_type(),
            0.0,
            StepFailure::classified(err.to_string()),
        )
        .with_target(step.target())
    }

    async fn recover(
        &self,
        dispatcher: &mut StepDispatcher,
        scenario: &Scenario,
        step: &Step,
        index: usize,
        failed: StepResult,
    ) -> (StepResult, Flow) {
        let failure = failed
            .error
            .clone()
            .unwrap_or_else(|| StepFailure::classified("step failed without an error"));

        let plan = self.planner.suggest_recovery(&ErrorContext {
            error_kind: failure.kind,
            failed_step: step,
            step_index: index,
            error_message: &failure.message,
            retry_budget: scenario.retry_count,
        });

        match plan.strategy {
            RecoveryStrategy::RetryWithFallback => {
                self.retry(dispatcher, step, index, failed, failure, plan)
                    .await
            }
            RecoveryStrategy::Skip => {
                warn!(step_index = index, "Skipping failed step");
                let mut result = failed;
                result.status = StepStatus::Skipped;
                result.recovery = Some(RecoveryRecord {
                    method: RecoveryMethod::Skip,
                    attempts: 1,
                    warning: Some("Step skipped due to failure".to_string()),
                    failed_attempts: Vec::new(),
                    alternative_selectors: Vec::new(),
                });
                (result, Flow::Continue)
            }
            RecoveryStrategy::Abort => {
                warn!(step_index = index, error_kind = %failure.kind, "No recovery for this failure");
                (failed, Flow::Abort)
            }
        }
    }

    async fn retry(
        &self,
        dispatcher: &mut StepDispatcher,
        step: &Step,
        index: usize,
        failed: StepResult,
        failure: StepFailure,
        plan: RecoveryPlan,
    ) -> (StepResult, Flow) {
        let mut failed_attempts = vec![failure];
        let mut last = failed;

        for attempt in 1..=plan.max_attempts {
            if self.config.apply_fallback_actions {
                for action in &plan.fallback_actions {
                    if let Err(e) = dispatcher.apply_fallback(action, step).await {
                        warn!(
                            step_index = index,
                            ?action,
                            error_code = e.code(),
                            hint = e.recovery_hint(),
                            "Fallback action failed: {}",
                            e
                        );
                    }
                }
            }

            info!(step_index = index, attempt, max_attempts = plan.max_attempts, "Recovery attempt");
            let retried = match dispatcher.execute(step, index).await {
                Ok(result) => result,
                Err(e) => Self::dispatch_failure(step, index, &e),
            };

            if retried.is_success() {
                info!(step_index = index, attempts = attempt + 1, "Step recovered by retry");
                let mut result = retried;
                result.recovery = Some(RecoveryRecord {
                    method: RecoveryMethod::Retry,
                    attempts: attempt + 1,
                    warning: None,
                    failed_attempts,
                    alternative_selectors: plan.alternative_selectors,
                });
                return (result, Flow::Continue);
            }

            if let Some(err) = &retried.error {
                failed_attempts.push(err.clone());
            }
            last = retried;
        }

        let mut result = last;
        if let Some(err) = result.error.as_mut() {
            err.message = format!(
                "{} (gave up after {} retry attempts)",
                err.message, plan.max_attempts
            );
        }
        result.recovery = Some(RecoveryRecord {
            method: RecoveryMethod::Retry,
            attempts: plan.max_attempts + 1,
            warning: Some("Max retry attempts exceeded".to_string()),
            failed_attempts,
            alternative_selectors: plan.alternative_selectors,
        });
        (result, Flow::Abort)
    }

    fn verify_phase(&self, execution: &ExecutionSummary) -> VerificationReport {
        let mut verification = verifier::verify(&execution.steps);

        let assertions: Vec<&StepResult> = execution
            .steps
            .iter()
            .filter(|r| r.action.is_assertion())
            .collect();
        if !assertions.is_empty() {
            verification.assertion_validation = Some(verifier::validate_assertions(assertions));
        }

        let failed: Vec<&StepResult> = execution
            .steps
            .iter()
            .filter(|r| r.error.is_some())
            .collect();
        if !failed.is_empty() {
            verification.failure_analysis = Some(verifier::analyze_failures(failed));
        }

        verification
    }
}

