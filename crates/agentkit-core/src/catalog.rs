use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{AgentId, ComponentId};
use crate::platform::PlatformProfile;
use crate::strategy::{McpStrategy, PackageManager, SystemPromptStrategy};

const BUILTIN_CATALOG: &str = include_str!("../catalog/default.toml");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentSpec {
    pub id: ComponentId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<ComponentId>,
    /// Markdown injected into each agent's system prompt file.
    pub prompt: Option<String>,
    /// JSON overlay deep-merged into each agent's settings file.
    pub settings: Option<Map<String, Value>>,
    /// MCP server definitions keyed by server name.
    pub mcp: Option<Map<String, Value>>,
    /// Skill file name to content, written under the agent skills directory.
    #[serde(default)]
    pub skills: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSpec {
    pub id: AgentId,
    #[serde(default)]
    pub display_name: String,
    pub config_dir: String,
    pub settings_file: String,
    pub system_prompt_file: String,
    pub skills_dir: String,
    pub mcp_config: Option<String>,
    pub system_prompt: SystemPromptStrategy,
    pub mcp: McpStrategy,
    /// Operating systems the agent runs on; empty means all of them.
    #[serde(default)]
    pub platforms: Vec<String>,
    /// Install argv per package manager name.
    #[serde(default)]
    pub install: BTreeMap<String, Vec<String>>,
}

/// Absolute locations of an agent's configuration files under one home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentPaths {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
    pub system_prompt_file: PathBuf,
    pub skills_dir: PathBuf,
    pub mcp_config: Option<PathBuf>,
}

impl Catalog {
    /// Parses the catalog compiled into the binary. Every call returns a fresh value.
    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_toml_str(BUILTIN_CATALOG).context("failed to parse built-in catalog")
    }

    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let catalog: Self = toml::from_str(input).context("failed to parse agentkit catalog")?;

        let mut seen_components = HashSet::new();
        for component in &catalog.components {
            if component.id.as_str().trim().is_empty() {
                return Err(anyhow!("component id must not be empty"));
            }
            if !seen_components.insert(component.id.clone()) {
                return Err(anyhow!("duplicate component declaration '{}'", component.id));
            }
            if component.dependencies.contains(&component.id) {
                return Err(anyhow!("component '{}' depends on itself", component.id));
            }
            for skill_name in component.skills.keys() {
                validate_skill_file_name(skill_name).with_context(|| {
                    format!(
                        "invalid skill file '{}' for component '{}'",
                        skill_name, component.id
                    )
                })?;
            }
        }

        let mut seen_agents = HashSet::new();
        for agent in &catalog.agents {
            if agent.id.as_str().trim().is_empty() {
                return Err(anyhow!("agent id must not be empty"));
            }
            if !seen_agents.insert(agent.id.clone()) {
                return Err(anyhow!("duplicate agent declaration '{}'", agent.id));
            }
            if agent.mcp == McpStrategy::SeparateFile && agent.mcp_config.is_none() {
                return Err(anyhow!(
                    "agent '{}' uses separate-file MCP strategy without mcp_config",
                    agent.id
                ));
            }
            for manager in agent.install.keys() {
                if PackageManager::parse(manager).is_none() {
                    return Err(anyhow!(
                        "agent '{}' declares unknown package manager '{}'",
                        agent.id,
                        manager
                    ));
                }
            }
        }

        Ok(catalog)
    }

    pub fn component(&self, id: &str) -> Option<&ComponentSpec> {
        self.components.iter().find(|c| c.id.as_str() == id)
    }

    pub fn agent(&self, id: &str) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| a.id.as_str() == id)
    }

    /// Declared dependency edges, keyed by component id.
    pub fn dependency_edges(&self) -> BTreeMap<ComponentId, Vec<ComponentId>> {
        self.components
            .iter()
            .map(|c| (c.id.clone(), c.dependencies.clone()))
            .collect()
    }

    /// Agents the installer can configure on the given platform.
    pub fn supported_agents(&self, profile: &PlatformProfile) -> BTreeSet<AgentId> {
        if !profile.supported {
            return BTreeSet::new();
        }
        self.agents
            .iter()
            .filter(|agent| agent.runs_on(&profile.os))
            .map(|agent| agent.id.clone())
            .collect()
    }
}

impl AgentSpec {
    pub fn runs_on(&self, os: &str) -> bool {
        self.platforms.is_empty() || self.platforms.iter().any(|p| p == os)
    }

    pub fn install_command(&self, manager: PackageManager) -> Option<&[String]> {
        self.install
            .get(manager.as_str())
            .map(Vec::as_slice)
            .filter(|argv| !argv.is_empty())
    }

    pub fn paths(&self, home: &Path) -> AgentPaths {
        AgentPaths {
            config_dir: home.join(&self.config_dir),
            settings_file: home.join(&self.settings_file),
            system_prompt_file: home.join(&self.system_prompt_file),
            skills_dir: home.join(&self.skills_dir),
            mcp_config: self.mcp_config.as_ref().map(|path| home.join(path)),
        }
    }
}

fn validate_skill_file_name(name: &str) -> anyhow::Result<()> {
    if name.trim().is_empty() {
        return Err(anyhow!("skill file name must not be empty"));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(anyhow!(
            "skill file name must be a plain file name: {name}"
        ));
    }
    Ok(())
}
