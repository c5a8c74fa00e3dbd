use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::fs_utils::{mode_of, read_if_exists, set_mode};

/// Permission bits for files created without an explicit mode.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub changed: bool,
    pub created: bool,
}

/// Replaces `path` with `content` through a same-directory temp file and rename.
///
/// Identical bytes are a no-op with no write at all. When `mode` is `None` an existing
/// file keeps its permission bits and a new file gets [`DEFAULT_FILE_MODE`].
pub fn write_atomic(path: &Path, content: &[u8], mode: Option<u32>) -> Result<WriteOutcome> {
    let existing = read_if_exists(path)
        .with_context(|| format!("failed to read existing file: {}", path.display()))?;
    let existing_mode = match existing {
        Some(_) => fs::metadata(path)
            .map(|metadata| mode_of(&metadata))
            .with_context(|| format!("failed to stat existing file: {}", path.display()))?,
        None => None,
    };

    if existing.as_deref() == Some(content) {
        return match mode {
            Some(mode) if existing_mode.is_some() && existing_mode != Some(mode) => {
                set_mode(path, mode).with_context(|| {
                    format!("failed to update permissions: {}", path.display())
                })?;
                debug!(path = %path.display(), mode, "updated permissions");
                Ok(WriteOutcome {
                    changed: true,
                    created: false,
                })
            }
            _ => Ok(WriteOutcome::default()),
        };
    }

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;

    // Dropping the temp file on any early return removes it.
    let mut staged = tempfile::Builder::new()
        .prefix(".agentkit-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    staged
        .write_all(content)
        .with_context(|| format!("failed to write temp file for {}", path.display()))?;
    staged
        .as_file()
        .sync_all()
        .with_context(|| format!("failed to sync temp file for {}", path.display()))?;

    let final_mode = mode.or(existing_mode).unwrap_or(DEFAULT_FILE_MODE);
    set_mode(staged.path(), final_mode)
        .with_context(|| format!("failed to set permissions for {}", path.display()))?;

    staged
        .persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to replace {}", path.display()))?;

    let outcome = WriteOutcome {
        changed: true,
        created: existing.is_none(),
    };
    debug!(path = %path.display(), created = outcome.created, "wrote file");
    Ok(outcome)
}
