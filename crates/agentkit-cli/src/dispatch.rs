use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use agentkit_core::{Catalog, PackageManager, PlatformProfile, Selection};
use agentkit_installer::{
    apply_install_plan, list_snapshots, read_manifest, restore_snapshot, ExecutionResult,
    FailurePolicy, InstallLayout, InstallPlan, InstallPlanner, Manifest, PipelineOptions,
    RollbackPolicy,
};
use agentkit_resolver::{ResolvedPlan, Resolver};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::warn;

use crate::completion::{resolve_completion_shell, write_completions_script};
use crate::render::{
    format_execution_lines, format_plan_lines, format_snapshot_lines, TerminalRenderer,
};
use crate::{Cli, Commands, SelectionArgs};

pub(crate) const CATALOG_ENV: &str = "AGENTKIT_CATALOG";

const EXIT_FAILURE: u8 = 1;
const EXIT_ROLLBACK_FAILURE: u8 = 2;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum CommandOutcome {
    Success,
    Failed,
    RollbackFailed,
}

impl CommandOutcome {
    pub(crate) fn from_execution(result: &ExecutionResult) -> Self {
        match &result.error {
            None => Self::Success,
            Some(error) if error.is_rollback_failure() => Self::RollbackFailed,
            Some(_) => Self::Failed,
        }
    }

    pub(crate) fn exit_code(self) -> ExitCode {
        match self {
            Self::Success => ExitCode::SUCCESS,
            Self::Failed => ExitCode::from(EXIT_FAILURE),
            Self::RollbackFailed => ExitCode::from(EXIT_ROLLBACK_FAILURE),
        }
    }
}

#[derive(Serialize)]
struct PlanReport<'a> {
    resolved: &'a ResolvedPlan,
    plan: &'a InstallPlan,
}

#[derive(Serialize)]
struct InstallReport<'a> {
    snapshot_id: &'a str,
    result: &'a ExecutionResult,
}

pub(crate) fn run_cli(cli: Cli) -> Result<CommandOutcome> {
    let Cli {
        home,
        state_dir,
        catalog,
        command,
        ..
    } = cli;
    let renderer = TerminalRenderer::current();

    match command {
        Commands::Plan { selection, json } => {
            let layout = InstallLayout::resolve(home, state_dir)?;
            let catalog = load_catalog(catalog.as_deref())?;
            let (resolved, plan) = build_install_plan(&layout, &catalog, &selection)?;
            print_plan(renderer, &resolved, &plan, json)?;
        }
        Commands::Install {
            selection,
            dry_run,
            no_rollback,
            keep_going,
            json,
        } => {
            let layout = InstallLayout::resolve(home, state_dir)?;
            let catalog = load_catalog(catalog.as_deref())?;
            let (resolved, plan) = build_install_plan(&layout, &catalog, &selection)?;
            if dry_run {
                print_plan(renderer, &resolved, &plan, json)?;
                return Ok(CommandOutcome::Success);
            }

            layout.ensure_base_dirs()?;
            let snapshot_id = plan.snapshot_id.clone();
            let result = apply_install_plan(plan, pipeline_options(no_rollback, keep_going))?;
            if json {
                print_json(&InstallReport {
                    snapshot_id: &snapshot_id,
                    result: &result,
                })?;
            } else {
                renderer.print_section("install");
                renderer.print_lines(&format_execution_lines(
                    renderer.style(),
                    &snapshot_id,
                    &result,
                ));
            }
            return Ok(CommandOutcome::from_execution(&result));
        }
        Commands::Restore { snapshot } => {
            let layout = InstallLayout::resolve(home, state_dir)?;
            let manifest = select_snapshot(&layout, snapshot.as_deref())?;
            restore_snapshot(&manifest)
                .with_context(|| format!("failed to restore snapshot '{}'", manifest.id))?;
            renderer.print_status(
                "ok",
                &format!(
                    "restored snapshot {} ({} paths)",
                    manifest.id,
                    manifest.entries.len()
                ),
            );
        }
        Commands::Snapshots { json } => {
            let layout = InstallLayout::resolve(home, state_dir)?;
            let manifests = list_snapshots(&layout.snapshots_dir()).with_context(|| {
                format!(
                    "failed to list snapshots in {}",
                    layout.snapshots_dir().display()
                )
            })?;
            if json {
                print_json(&manifests)?;
            } else {
                renderer.print_lines(&format_snapshot_lines(&manifests));
            }
        }
        Commands::Completions { shell } => {
            let shell_env = std::env::var("SHELL").ok();
            let shell = resolve_completion_shell(shell, shell_env.as_deref(), cfg!(windows));
            write_completions_script(shell, &mut io::stdout().lock())?;
        }
    }

    Ok(CommandOutcome::Success)
}

/// Flag wins over `AGENTKIT_CATALOG`; neither means the built-in catalog.
pub(crate) fn load_catalog(flag: Option<&Path>) -> Result<Catalog> {
    let env_path = std::env::var_os(CATALOG_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from);
    let Some(path) = flag.map(Path::to_path_buf).or(env_path) else {
        return Catalog::builtin();
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read catalog: {}", path.display()))?;
    Catalog::from_toml_str(&content)
        .with_context(|| format!("failed to load catalog: {}", path.display()))
}

pub(crate) fn platform_profile(package_manager: Option<&str>) -> Result<PlatformProfile> {
    let profile = PlatformProfile::detect();
    let Some(name) = package_manager else {
        return Ok(profile);
    };
    let manager = PackageManager::parse(name)
        .ok_or_else(|| anyhow!("unknown package manager '{name}'"))?;
    Ok(profile.with_package_manager(manager))
}

pub(crate) fn resolve_selection(
    catalog: &Catalog,
    profile: &PlatformProfile,
    selection: &SelectionArgs,
) -> Result<ResolvedPlan> {
    if !profile.supported {
        warn!(os = %profile.os, "platform is not supported; no agent will be configured");
    }
    let resolver = Resolver::from_catalog(catalog, catalog.supported_agents(profile));
    let selection = Selection::new(
        selection.agents.iter().map(String::as_str),
        selection.components.iter().map(String::as_str),
    );
    Ok(resolver.resolve(&selection)?)
}

fn build_install_plan(
    layout: &InstallLayout,
    catalog: &Catalog,
    selection: &SelectionArgs,
) -> Result<(ResolvedPlan, InstallPlan)> {
    let profile = platform_profile(selection.package_manager.as_deref())?;
    let resolved = resolve_selection(catalog, &profile, selection)?;
    let plan = InstallPlanner::new(layout, catalog, &profile)
        .skip_install(selection.skip_install)
        .plan(&resolved)?;
    Ok((resolved, plan))
}

pub(crate) fn pipeline_options(no_rollback: bool, keep_going: bool) -> PipelineOptions {
    PipelineOptions {
        apply_policy: if keep_going {
            FailurePolicy::ContinueCollecting
        } else {
            FailurePolicy::StopOnFirstError
        },
        rollback: RollbackPolicy {
            enabled: !no_rollback,
        },
    }
}

/// The named snapshot, or the newest one when no id is given.
pub(crate) fn select_snapshot(layout: &InstallLayout, snapshot_id: Option<&str>) -> Result<Manifest> {
    if let Some(snapshot_id) = snapshot_id {
        return read_manifest(&layout.snapshot_dir(snapshot_id))
            .with_context(|| format!("failed to read snapshot '{snapshot_id}'"));
    }

    let snapshots_dir = layout.snapshots_dir();
    list_snapshots(&snapshots_dir)
        .with_context(|| format!("failed to list snapshots in {}", snapshots_dir.display()))?
        .pop()
        .ok_or_else(|| anyhow!("no snapshots found in {}", snapshots_dir.display()))
}

fn print_plan(
    renderer: TerminalRenderer,
    resolved: &ResolvedPlan,
    plan: &InstallPlan,
    json: bool,
) -> Result<()> {
    if json {
        return print_json(&PlanReport { resolved, plan });
    }
    renderer.print_section("plan");
    renderer.print_lines(&format_plan_lines(resolved, plan));
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(value).context("failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}
