mod atomic;
mod command;
mod error;
mod fs_utils;
mod layout;
mod merge;
mod pipeline;
mod plan;
mod snapshot;

pub use atomic::{write_atomic, WriteOutcome, DEFAULT_FILE_MODE};
pub use command::run_install_command;
pub use error::{PlanError, SnapshotError};
pub use fs_utils::remove_file_if_exists;
pub use layout::{default_state_dir, default_user_home, InstallLayout, HOME_ENV, STATE_DIR_ENV};
pub use merge::{
    append_section, inject_marked_section, merge_json, merge_json_document, section_markers,
};
pub use pipeline::{
    execute, ExecutionResult, FailurePolicy, Orchestrator, PipelineOptions, RollbackPolicy,
    RunError, StageError, StageKind, StagePlan, StageResult, Step, StepAction, StepFailure,
    StepResult, StepStatus,
};
pub use plan::{
    FileMutation, InstallPlan, InstallPlanner, PlannedAction, PlannedStep, SNAPSHOT_STEP_ID,
};
pub use snapshot::{
    create_snapshot, list_snapshots, manifest_path, read_manifest, restore_paths,
    restore_snapshot, Manifest, ManifestEntry, MANIFEST_FILE_NAME, SNAPSHOT_FILES_DIR,
};

/// Runs a planned install end to end: snapshot, apply, and rollback on failure.
pub fn apply_install_plan(
    plan: InstallPlan,
    options: PipelineOptions,
) -> Result<ExecutionResult, PlanError> {
    Ok(execute(plan.into_stage_plan(options.rollback)?, options))
}
