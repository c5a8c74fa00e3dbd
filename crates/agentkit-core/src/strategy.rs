use serde::{Deserialize, Serialize};

/// How an agent's system prompt file receives component prompt sections.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SystemPromptStrategy {
    ReplaceFile,
    Append,
    MarkedSection,
}

/// Where MCP server definitions for an agent are written.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum McpStrategy {
    MergeIntoSettings,
    SeparateFile,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Brew,
    Apt,
    Dnf,
    Pacman,
    Winget,
    Npm,
}

impl SystemPromptStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReplaceFile => "replace-file",
            Self::Append => "append",
            Self::MarkedSection => "marked-section",
        }
    }
}

impl McpStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MergeIntoSettings => "merge-into-settings",
            Self::SeparateFile => "separate-file",
        }
    }
}

impl PackageManager {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Brew => "brew",
            Self::Apt => "apt",
            Self::Dnf => "dnf",
            Self::Pacman => "pacman",
            Self::Winget => "winget",
            Self::Npm => "npm",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "brew" | "homebrew" => Some(Self::Brew),
            "apt" | "apt-get" => Some(Self::Apt),
            "dnf" => Some(Self::Dnf),
            "pacman" => Some(Self::Pacman),
            "winget" => Some(Self::Winget),
            "npm" => Some(Self::Npm),
            _ => None,
        }
    }

    /// Executable probed on `PATH` to decide whether this manager is available.
    pub fn executable(self) -> &'static str {
        match self {
            Self::Apt => "apt-get",
            other => other.as_str(),
        }
    }
}
