use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use agentkit_core::{
    AgentPaths, AgentSpec, Catalog, ComponentSpec, McpStrategy, PlatformProfile,
    SystemPromptStrategy,
};
use agentkit_resolver::ResolvedPlan;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::atomic::{write_atomic, WriteOutcome};
use crate::command::run_install_command;
use crate::error::{PlanError, SnapshotError};
use crate::fs_utils::read_if_exists;
use crate::layout::InstallLayout;
use crate::merge::{append_section, inject_marked_section, merge_json_document};
use crate::pipeline::{RollbackPolicy, StagePlan, Step};
use crate::snapshot::{create_snapshot, read_manifest, restore_paths};

pub const SNAPSHOT_STEP_ID: &str = "snapshot";

/// A single file change an apply step performs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileMutation {
    WriteFile {
        path: PathBuf,
        content: String,
    },
    MergeJson {
        path: PathBuf,
        overlay: Value,
    },
    InjectSection {
        path: PathBuf,
        section_id: String,
        content: String,
    },
    AppendSection {
        path: PathBuf,
        content: String,
    },
}

impl FileMutation {
    pub fn path(&self) -> &Path {
        match self {
            Self::WriteFile { path, .. }
            | Self::MergeJson { path, .. }
            | Self::InjectSection { path, .. }
            | Self::AppendSection { path, .. } => path,
        }
    }

    pub fn apply(&self) -> Result<WriteOutcome> {
        let path = self.path();
        let existing = read_if_exists(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        let next = match self {
            Self::WriteFile { content, .. } => content.clone().into_bytes(),
            Self::MergeJson { overlay, .. } => merge_json_document(existing.as_deref(), overlay)
                .with_context(|| format!("failed to merge settings into {}", path.display()))?,
            Self::InjectSection {
                section_id,
                content,
                ..
            } => inject_marked_section(&utf8_document(path, existing)?, section_id, content)
                .into_bytes(),
            Self::AppendSection { content, .. } => {
                append_section(&utf8_document(path, existing)?, content).into_bytes()
            }
        };

        write_atomic(path, &next, None)
    }
}

fn utf8_document(path: &Path, existing: Option<Vec<u8>>) -> Result<String> {
    String::from_utf8(existing.unwrap_or_default())
        .with_context(|| format!("{} is not valid UTF-8", path.display()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlannedAction {
    Command { argv: Vec<String> },
    Files { mutations: Vec<FileMutation> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedStep {
    pub id: String,
    pub action: PlannedAction,
}

/// Everything one install run will do, before any of it happens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallPlan {
    pub snapshot_id: String,
    pub snapshot_dir: PathBuf,
    pub steps: Vec<PlannedStep>,
}

impl InstallPlan {
    /// Every file an apply step may mutate, deduplicated and sorted.
    pub fn targets(&self) -> Vec<PathBuf> {
        self.steps
            .iter()
            .flat_map(|step| match &step.action {
                PlannedAction::Files { mutations } => {
                    mutations.iter().map(|m| m.path().to_path_buf()).collect::<Vec<_>>()
                }
                PlannedAction::Command { .. } => Vec::new(),
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.id.as_str()).collect()
    }

    /// Turns the description into executable steps.
    ///
    /// File steps undo themselves by re-reading the manifest from disk and restoring
    /// only the paths they touch. With rollback enabled, a file step that fails
    /// partway through also restores its own paths before reporting the failure,
    /// since the reverse walk never visits failed steps. With rollback disabled its
    /// partial changes stay on disk. Command steps are not reversible.
    pub fn into_stage_plan(self, rollback: RollbackPolicy) -> Result<StagePlan, PlanError> {
        let targets = self.targets();
        let mut plan = StagePlan::default();

        let snapshot_dir = self.snapshot_dir.clone();
        plan.push_prepare(Step::one_shot(SNAPSHOT_STEP_ID, move || {
            create_snapshot(&snapshot_dir, &targets)?;
            Ok(())
        }))?;

        for planned in self.steps {
            let step = match planned.action {
                PlannedAction::Command { argv } => {
                    Step::one_shot(planned.id, move || run_install_command(&argv))
                }
                PlannedAction::Files { mutations } => {
                    let paths = mutations
                        .iter()
                        .map(|m| m.path().to_path_buf())
                        .collect::<BTreeSet<_>>()
                        .into_iter()
                        .collect::<Vec<_>>();
                    let run_dir = self.snapshot_dir.clone();
                    let run_paths = paths.clone();
                    let undo_dir = self.snapshot_dir.clone();
                    Step::reversible(
                        planned.id,
                        move || {
                            let Err(err) = apply_mutations(&mutations) else {
                                return Ok(());
                            };
                            if !rollback.enabled {
                                return Err(err);
                            }
                            match restore_step_paths(&run_dir, &run_paths) {
                                Ok(()) => Err(err),
                                Err(restore_err) => Err(err.context(format!(
                                    "failed to undo partial changes: {restore_err}"
                                ))),
                            }
                        },
                        move || {
                            restore_step_paths(&undo_dir, &paths)?;
                            Ok(())
                        },
                    )
                }
            };
            plan.push_apply(step)?;
        }

        Ok(plan)
    }
}

fn apply_mutations(mutations: &[FileMutation]) -> Result<()> {
    for mutation in mutations {
        mutation.apply()?;
    }
    Ok(())
}

fn restore_step_paths(snapshot_dir: &Path, paths: &[PathBuf]) -> Result<(), SnapshotError> {
    let manifest = read_manifest(snapshot_dir)?;
    restore_paths(&manifest, paths)
}

/// Builds [`InstallPlan`]s for one layout, catalog and platform.
#[derive(Debug, Clone, Copy)]
pub struct InstallPlanner<'a> {
    layout: &'a InstallLayout,
    catalog: &'a Catalog,
    profile: &'a PlatformProfile,
    skip_install: bool,
}

impl<'a> InstallPlanner<'a> {
    pub fn new(layout: &'a InstallLayout, catalog: &'a Catalog, profile: &'a PlatformProfile) -> Self {
        Self {
            layout,
            catalog,
            profile,
            skip_install: false,
        }
    }

    /// Leave agent binaries alone and only touch configuration files.
    pub fn skip_install(mut self, skip: bool) -> Self {
        self.skip_install = skip;
        self
    }

    pub fn plan(&self, resolved: &ResolvedPlan) -> Result<InstallPlan> {
        self.plan_at(resolved, Utc::now())
    }

    pub fn plan_at(&self, resolved: &ResolvedPlan, now: DateTime<Utc>) -> Result<InstallPlan> {
        let snapshot_id = self.layout.allocate_snapshot_id(now);
        let snapshot_dir = self.layout.snapshot_dir(&snapshot_id);
        let mut steps = Vec::new();

        for agent_id in &resolved.supported_agents {
            let agent = self
                .catalog
                .agent(agent_id.as_str())
                .ok_or_else(|| anyhow!("agent '{agent_id}' is not in the catalog"))?;

            if let Some(argv) = self.install_command(agent) {
                steps.push(PlannedStep {
                    id: format!("install:{}", agent.id),
                    action: PlannedAction::Command { argv },
                });
            }

            let paths = agent.paths(self.layout.home());
            let mut replaced_prompt = String::new();
            for component_id in &resolved.ordered_components {
                let component = self
                    .catalog
                    .component(component_id.as_str())
                    .ok_or_else(|| anyhow!("component '{component_id}' is not in the catalog"))?;
                let mutations =
                    component_mutations(agent, &paths, component, &mut replaced_prompt);
                if mutations.is_empty() {
                    continue;
                }
                steps.push(PlannedStep {
                    id: format!("inject:{}:{}", agent.id, component.id),
                    action: PlannedAction::Files { mutations },
                });
            }
        }

        info!(
            snapshot = %snapshot_id,
            steps = steps.len(),
            "planned install"
        );
        Ok(InstallPlan {
            snapshot_id,
            snapshot_dir,
            steps,
        })
    }

    fn install_command(&self, agent: &AgentSpec) -> Option<Vec<String>> {
        if self.skip_install {
            return None;
        }
        let Some(manager) = self.profile.package_manager else {
            warn!(agent = %agent.id, "no package manager detected; skipping binary install");
            return None;
        };
        let argv = agent.install_command(manager);
        if argv.is_none() {
            warn!(
                agent = %agent.id,
                manager = manager.as_str(),
                "agent has no install command for this package manager"
            );
        }
        argv.map(<[String]>::to_vec)
    }
}

fn component_mutations(
    agent: &AgentSpec,
    paths: &AgentPaths,
    component: &ComponentSpec,
    replaced_prompt: &mut String,
) -> Vec<FileMutation> {
    let mut mutations = Vec::new();

    if let Some(prompt) = &component.prompt {
        let prompt_path = paths.system_prompt_file.clone();
        mutations.push(match agent.system_prompt {
            SystemPromptStrategy::MarkedSection => FileMutation::InjectSection {
                path: prompt_path,
                section_id: component.id.to_string(),
                content: prompt.clone(),
            },
            SystemPromptStrategy::Append => FileMutation::AppendSection {
                path: prompt_path,
                content: prompt.clone(),
            },
            SystemPromptStrategy::ReplaceFile => {
                if !replaced_prompt.is_empty() {
                    replaced_prompt.push('\n');
                }
                replaced_prompt.push_str(prompt.trim_end());
                replaced_prompt.push('\n');
                FileMutation::WriteFile {
                    path: prompt_path,
                    content: replaced_prompt.clone(),
                }
            }
        });
    }

    if let Some(settings) = &component.settings {
        mutations.push(FileMutation::MergeJson {
            path: paths.settings_file.clone(),
            overlay: Value::Object(settings.clone()),
        });
    }

    if let Some(servers) = &component.mcp {
        let path = match (agent.mcp, &paths.mcp_config) {
            (McpStrategy::SeparateFile, Some(mcp_config)) => mcp_config.clone(),
            _ => paths.settings_file.clone(),
        };
        mutations.push(FileMutation::MergeJson {
            path,
            overlay: mcp_overlay(servers),
        });
    }

    for (name, content) in &component.skills {
        mutations.push(FileMutation::WriteFile {
            path: paths.skills_dir.join(name),
            content: content.clone(),
        });
    }

    mutations
}

fn mcp_overlay(servers: &Map<String, Value>) -> Value {
    json!({ "mcpServers": Value::Object(servers.clone()) })
}
