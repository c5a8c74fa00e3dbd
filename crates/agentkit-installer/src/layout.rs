use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::snapshot::manifest_path;

pub const HOME_ENV: &str = "AGENTKIT_HOME";
pub const STATE_DIR_ENV: &str = "AGENTKIT_STATE_DIR";

/// Where agent configuration lives and where agentkit keeps its own state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    home: PathBuf,
    state_dir: PathBuf,
}

impl InstallLayout {
    pub fn new(home: impl Into<PathBuf>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            state_dir: state_dir.into(),
        }
    }

    /// Flag values win over environment, which wins over platform defaults.
    pub fn resolve(home: Option<PathBuf>, state_dir: Option<PathBuf>) -> Result<Self> {
        let home = match home.or_else(|| env_path(HOME_ENV)) {
            Some(home) => home,
            None => default_user_home()?,
        };
        let state_dir = match state_dir.or_else(|| env_path(STATE_DIR_ENV)) {
            Some(state_dir) => state_dir,
            None => default_state_dir()?,
        };
        Ok(Self::new(home, state_dir))
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.state_dir.join("snapshots")
    }

    pub fn snapshot_dir(&self, snapshot_id: &str) -> PathBuf {
        self.snapshots_dir().join(snapshot_id)
    }

    pub fn snapshot_manifest_path(&self, snapshot_id: &str) -> PathBuf {
        manifest_path(&self.snapshot_dir(snapshot_id))
    }

    /// Picks an unused snapshot id derived from `now`.
    ///
    /// Nothing is created on disk; the prepare stage does that.
    pub fn allocate_snapshot_id(&self, now: DateTime<Utc>) -> String {
        let base = now.format("%Y%m%dT%H%M%S%.6fZ").to_string();
        let mut candidate = base.clone();
        let mut sequence = 1_u32;
        while self.snapshot_dir(&candidate).exists() {
            candidate = format!("{base}-{sequence}");
            sequence += 1;
        }
        candidate
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [self.state_dir.clone(), self.snapshots_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

pub fn default_user_home() -> Result<PathBuf> {
    if cfg!(windows) {
        let profile = std::env::var("USERPROFILE")
            .context("USERPROFILE is not set; cannot resolve Windows user home")?;
        return Ok(PathBuf::from(profile));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve user home")?;
    Ok(PathBuf::from(home))
}

pub fn default_state_dir() -> Result<PathBuf> {
    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows state dir")?;
        return Ok(PathBuf::from(app_data).join("Agentkit"));
    }

    Ok(default_user_home()?.join(".agentkit"))
}
