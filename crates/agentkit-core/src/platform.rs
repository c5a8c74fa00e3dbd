use std::fs;

use serde::Serialize;

use crate::strategy::PackageManager;

/// Host facts the installer consumes; probing is kept shallow on purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformProfile {
    pub os: String,
    pub distro: Option<String>,
    pub package_manager: Option<PackageManager>,
    pub supported: bool,
}

impl PlatformProfile {
    pub fn detect() -> Self {
        let os_release = if std::env::consts::OS == "linux" {
            fs::read_to_string("/etc/os-release").ok()
        } else {
            None
        };
        Self::from_parts(std::env::consts::OS, os_release.as_deref(), |executable| {
            which::which(executable).is_ok()
        })
    }

    pub fn from_parts<F>(os: &str, os_release: Option<&str>, is_available: F) -> Self
    where
        F: Fn(&str) -> bool,
    {
        let distro = os_release.and_then(parse_os_release_id);
        let package_manager = package_manager_preference(os)
            .iter()
            .copied()
            .find(|manager| is_available(manager.executable()));

        Self {
            os: os.to_string(),
            distro,
            package_manager,
            supported: matches!(os, "linux" | "macos" | "windows"),
        }
    }

    /// The same profile pinned to a specific package manager.
    pub fn with_package_manager(mut self, package_manager: PackageManager) -> Self {
        self.package_manager = Some(package_manager);
        self
    }
}

fn package_manager_preference(os: &str) -> &'static [PackageManager] {
    match os {
        "macos" => &[PackageManager::Brew, PackageManager::Npm],
        "linux" => &[
            PackageManager::Brew,
            PackageManager::Apt,
            PackageManager::Dnf,
            PackageManager::Pacman,
            PackageManager::Npm,
        ],
        "windows" => &[PackageManager::Winget, PackageManager::Npm],
        _ => &[],
    }
}

fn parse_os_release_id(raw: &str) -> Option<String> {
    raw.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("ID="))
        .map(|value| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}
