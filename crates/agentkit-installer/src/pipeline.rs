use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::error::PlanError;

pub type StepAction = Box<dyn FnMut() -> anyhow::Result<()>>;

/// One unit of work. Only `Reversible` steps carry a compensating action; a
/// `OneShot` step simply has nothing to undo.
pub enum Step {
    OneShot {
        id: String,
        run: StepAction,
    },
    Reversible {
        id: String,
        run: StepAction,
        rollback: StepAction,
    },
}

impl Step {
    pub fn one_shot<R>(id: impl Into<String>, run: R) -> Self
    where
        R: FnMut() -> anyhow::Result<()> + 'static,
    {
        Self::OneShot {
            id: id.into(),
            run: Box::new(run),
        }
    }

    pub fn reversible<R, C>(id: impl Into<String>, run: R, rollback: C) -> Self
    where
        R: FnMut() -> anyhow::Result<()> + 'static,
        C: FnMut() -> anyhow::Result<()> + 'static,
    {
        Self::Reversible {
            id: id.into(),
            run: Box::new(run),
            rollback: Box::new(rollback),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::OneShot { id, .. } | Self::Reversible { id, .. } => id,
        }
    }

    pub fn is_reversible(&self) -> bool {
        matches!(self, Self::Reversible { .. })
    }

    fn run(&mut self) -> anyhow::Result<()> {
        match self {
            Self::OneShot { run, .. } | Self::Reversible { run, .. } => run(),
        }
    }

    fn compensation(&mut self) -> Option<&mut StepAction> {
        match self {
            Self::OneShot { .. } => None,
            Self::Reversible { rollback, .. } => Some(rollback),
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id())
            .field("reversible", &self.is_reversible())
            .finish()
    }
}

/// Prepare and apply steps in execution order. Step ids are unique across both.
#[derive(Debug, Default)]
pub struct StagePlan {
    prepare: Vec<Step>,
    apply: Vec<Step>,
}

impl StagePlan {
    pub fn new(prepare: Vec<Step>, apply: Vec<Step>) -> Result<Self, PlanError> {
        let mut plan = Self::default();
        for step in prepare {
            plan.push_prepare(step)?;
        }
        for step in apply {
            plan.push_apply(step)?;
        }
        Ok(plan)
    }

    pub fn push_prepare(&mut self, step: Step) -> Result<(), PlanError> {
        self.ensure_unique(step.id())?;
        self.prepare.push(step);
        Ok(())
    }

    pub fn push_apply(&mut self, step: Step) -> Result<(), PlanError> {
        self.ensure_unique(step.id())?;
        self.apply.push(step);
        Ok(())
    }

    fn ensure_unique(&self, id: &str) -> Result<(), PlanError> {
        if self.prepare.iter().chain(&self.apply).any(|step| step.id() == id) {
            return Err(PlanError::DuplicateStepId(id.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Prepare,
    Apply,
    Rollback,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Apply => "apply",
            Self::Rollback => "rollback",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageResult {
    pub stage: StageKind,
    pub success: bool,
    pub steps: Vec<StepResult>,
}

impl StageResult {
    fn empty(stage: StageKind) -> Self {
        Self {
            stage,
            success: true,
            steps: Vec::new(),
        }
    }

    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.step_id.as_str()).collect()
    }

    pub fn failures(&self) -> Vec<StepFailure> {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Failed)
            .map(|step| StepFailure {
                step_id: step.step_id.clone(),
                message: step.error.clone().unwrap_or_default(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub step_id: String,
    pub message: String,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step_id, self.message)
    }
}

/// Every failure one stage produced, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} stage failed: {}", join_failures(.failures))]
pub struct StageError {
    pub stage: StageKind,
    pub failures: Vec<StepFailure>,
}

fn join_failures(failures: &[StepFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error(transparent)]
    Prepare(StageError),

    #[error("{apply} (rolled back: {rolled_back})")]
    Apply { apply: StageError, rolled_back: bool },

    /// A compensating action failed; files may be left mutated.
    #[error("rollback failed at {failure} while recovering from: {apply}")]
    Rollback {
        apply: StageError,
        failure: StepFailure,
    },
}

impl RunError {
    pub fn is_rollback_failure(&self) -> bool {
        matches!(self, Self::Rollback { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub prepare: StageResult,
    pub apply: StageResult,
    pub rollback: StageResult,
    #[serde(serialize_with = "serialize_run_error")]
    pub error: Option<RunError>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

fn serialize_run_error<S>(error: &Option<RunError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match error {
        Some(error) => serializer.serialize_some(&error.to_string()),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the stage at the first failing step.
    #[default]
    StopOnFirstError,
    /// Run every step and report all failures together.
    ContinueCollecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackPolicy {
    pub enabled: bool,
}

impl Default for RollbackPolicy {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub apply_policy: FailurePolicy,
    pub rollback: RollbackPolicy,
}

/// Runs a [`StagePlan`]: prepare, then apply, then compensation if apply failed.
pub struct Orchestrator {
    steps: Vec<Step>,
    prepare_len: usize,
    index: HashMap<String, usize>,
    options: PipelineOptions,
}

impl Orchestrator {
    pub fn new(plan: StagePlan, options: PipelineOptions) -> Self {
        let prepare_len = plan.prepare.len();
        let steps = plan
            .prepare
            .into_iter()
            .chain(plan.apply)
            .collect::<Vec<_>>();
        let index = steps
            .iter()
            .enumerate()
            .map(|(position, step)| (step.id().to_string(), position))
            .collect();
        Self {
            steps,
            prepare_len,
            index,
            options,
        }
    }

    pub fn execute(mut self) -> ExecutionResult {
        let prepare_len = self.prepare_len;
        let total = self.steps.len();

        let prepare = run_stage(
            StageKind::Prepare,
            &mut self.steps[..prepare_len],
            FailurePolicy::StopOnFirstError,
        );
        if !prepare.success {
            let failures = prepare.failures();
            return ExecutionResult {
                prepare,
                apply: StageResult::empty(StageKind::Apply),
                rollback: StageResult::empty(StageKind::Rollback),
                error: Some(RunError::Prepare(StageError {
                    stage: StageKind::Prepare,
                    failures,
                })),
            };
        }

        let mut apply = run_stage(
            StageKind::Apply,
            &mut self.steps[prepare_len..total],
            self.options.apply_policy,
        );
        if apply.success {
            info!(steps = apply.steps.len(), "apply stage complete");
            return ExecutionResult {
                prepare,
                apply,
                rollback: StageResult::empty(StageKind::Rollback),
                error: None,
            };
        }

        let apply_error = StageError {
            stage: StageKind::Apply,
            failures: apply.failures(),
        };

        if !self.options.rollback.enabled {
            warn!("apply failed and rollback is disabled");
            return ExecutionResult {
                prepare,
                apply,
                rollback: StageResult::empty(StageKind::Rollback),
                error: Some(RunError::Apply {
                    apply: apply_error,
                    rolled_back: false,
                }),
            };
        }

        let (rollback, rollback_failure) = self.compensate(&mut apply);
        let error = match rollback_failure {
            Some(failure) => RunError::Rollback {
                apply: apply_error,
                failure,
            },
            None => RunError::Apply {
                apply: apply_error,
                rolled_back: true,
            },
        };

        ExecutionResult {
            prepare,
            apply,
            rollback,
            error: Some(error),
        }
    }

    /// Walks succeeded apply steps newest first and runs their compensating actions.
    ///
    /// Stops at the first compensation failure, keeping the results gathered so far.
    fn compensate(&mut self, apply: &mut StageResult) -> (StageResult, Option<StepFailure>) {
        let mut rollback = StageResult::empty(StageKind::Rollback);

        for applied in apply.steps.iter_mut().rev() {
            if applied.status != StepStatus::Succeeded {
                continue;
            }
            let Some(&position) = self.index.get(&applied.step_id) else {
                unreachable!("step '{}' was never registered", applied.step_id);
            };
            let Some(compensation) = self.steps[position].compensation() else {
                debug!(step = %applied.step_id, "no compensating action");
                continue;
            };

            let started_at = Utc::now();
            match compensation() {
                Ok(()) => {
                    info!(step = %applied.step_id, "rolled back");
                    applied.status = StepStatus::RolledBack;
                    rollback.steps.push(StepResult {
                        step_id: applied.step_id.clone(),
                        status: StepStatus::RolledBack,
                        started_at,
                        finished_at: Utc::now(),
                        error: None,
                    });
                }
                Err(err) => {
                    let message = format!("{err:#}");
                    error!(step = %applied.step_id, error = %message, "rollback failed");
                    rollback.success = false;
                    rollback.steps.push(StepResult {
                        step_id: applied.step_id.clone(),
                        status: StepStatus::Failed,
                        started_at,
                        finished_at: Utc::now(),
                        error: Some(message.clone()),
                    });
                    return (
                        rollback,
                        Some(StepFailure {
                            step_id: applied.step_id.clone(),
                            message,
                        }),
                    );
                }
            }
        }

        (rollback, None)
    }
}

/// Convenience wrapper: build an [`Orchestrator`] and run it.
pub fn execute(plan: StagePlan, options: PipelineOptions) -> ExecutionResult {
    Orchestrator::new(plan, options).execute()
}

fn run_stage(stage: StageKind, steps: &mut [Step], policy: FailurePolicy) -> StageResult {
    let mut result = StageResult::empty(stage);

    for step in steps.iter_mut() {
        let step_id = step.id().to_string();
        debug!(stage = %stage, step = %step_id, "running step");
        let started_at = Utc::now();
        let outcome = step.run();
        let finished_at = Utc::now();

        match outcome {
            Ok(()) => {
                debug!(stage = %stage, step = %step_id, "step succeeded");
                result.steps.push(StepResult {
                    step_id,
                    status: StepStatus::Succeeded,
                    started_at,
                    finished_at,
                    error: None,
                });
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(stage = %stage, step = %step_id, error = %message, "step failed");
                result.success = false;
                result.steps.push(StepResult {
                    step_id,
                    status: StepStatus::Failed,
                    started_at,
                    finished_at,
                    error: Some(message),
                });
                if policy == FailurePolicy::StopOnFirstError {
                    break;
                }
            }
        }
    }

    result
}
