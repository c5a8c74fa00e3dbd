use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::atomic::write_atomic;
use crate::error::SnapshotError;
use crate::fs_utils::{mode_of, remove_file_if_exists};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";
pub const SNAPSHOT_FILES_DIR: &str = "files";
const RELATIVE_TARGETS_DIR: &str = "__relative__";

/// Durable record of one snapshot. Written once; never rewritten by restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub root_dir: PathBuf,
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub original_path: PathBuf,
    pub snapshot_path: Option<PathBuf>,
    pub existed: bool,
    pub mode: Option<u32>,
}

/// Copies the current state of `paths` into `snapshot_dir` and persists the manifest.
///
/// Paths that do not exist yet are recorded so that restore deletes them.
pub fn create_snapshot(snapshot_dir: &Path, paths: &[PathBuf]) -> Result<Manifest, SnapshotError> {
    fs::create_dir_all(snapshot_dir)
        .map_err(|err| SnapshotError::io("create snapshot directory", snapshot_dir, err))?;

    let files_dir = snapshot_dir.join(SNAPSHOT_FILES_DIR);
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(paths.len());

    for original in paths {
        if !seen.insert(original.as_path()) {
            continue;
        }

        let metadata = match fs::metadata(original) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %original.display(), "snapshot target absent");
                entries.push(ManifestEntry {
                    original_path: original.clone(),
                    snapshot_path: None,
                    existed: false,
                    mode: None,
                });
                continue;
            }
            Err(err) => return Err(SnapshotError::io("stat snapshot target", original, err)),
        };
        if metadata.is_dir() {
            return Err(SnapshotError::DirectoryTarget(original.clone()));
        }

        let copy_path = files_dir.join(snapshot_relative_path(original));
        if let Some(parent) = copy_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| SnapshotError::io("create snapshot directory", parent, err))?;
        }
        fs::copy(original, &copy_path)
            .map_err(|err| SnapshotError::io("copy snapshot target", original, err))?;

        debug!(path = %original.display(), copy = %copy_path.display(), "captured file");
        entries.push(ManifestEntry {
            original_path: original.clone(),
            snapshot_path: Some(copy_path),
            existed: true,
            mode: mode_of(&metadata),
        });
    }

    let manifest = Manifest {
        id: snapshot_id_for(snapshot_dir),
        created_at: Utc::now(),
        root_dir: snapshot_dir.to_path_buf(),
        entries,
    };
    write_manifest(snapshot_dir, &manifest)?;

    info!(
        snapshot = %manifest.id,
        entries = manifest.entries.len(),
        "created snapshot"
    );
    Ok(manifest)
}

/// Puts every entry of `manifest` back to its captured state.
pub fn restore_snapshot(manifest: &Manifest) -> Result<(), SnapshotError> {
    for entry in &manifest.entries {
        restore_entry(entry)?;
    }
    info!(snapshot = %manifest.id, entries = manifest.entries.len(), "restored snapshot");
    Ok(())
}

/// Restores only the entries whose original path is listed in `paths`.
pub fn restore_paths(manifest: &Manifest, paths: &[PathBuf]) -> Result<(), SnapshotError> {
    let wanted = paths.iter().map(PathBuf::as_path).collect::<HashSet<_>>();
    for entry in manifest
        .entries
        .iter()
        .filter(|entry| wanted.contains(entry.original_path.as_path()))
    {
        restore_entry(entry)?;
    }
    Ok(())
}

fn restore_entry(entry: &ManifestEntry) -> Result<(), SnapshotError> {
    let original = &entry.original_path;
    if !entry.existed {
        let removed = remove_file_if_exists(original)
            .map_err(|err| SnapshotError::io("remove", original, err))?;
        debug!(path = %original.display(), removed, "restored absent file");
        return Ok(());
    }

    let Some(copy_path) = &entry.snapshot_path else {
        return Err(SnapshotError::MissingSnapshotCopy {
            original: original.clone(),
            snapshot: "<none recorded>".to_string(),
        });
    };
    let bytes = match fs::read(copy_path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(SnapshotError::MissingSnapshotCopy {
                original: original.clone(),
                snapshot: copy_path.display().to_string(),
            });
        }
        Err(err) => return Err(SnapshotError::io("read snapshot copy", copy_path, err)),
    };

    let outcome = write_atomic(original, &bytes, entry.mode)
        .map_err(|err| SnapshotError::write(original, err))?;
    debug!(path = %original.display(), changed = outcome.changed, "restored file");
    Ok(())
}

pub fn manifest_path(snapshot_dir: &Path) -> PathBuf {
    snapshot_dir.join(MANIFEST_FILE_NAME)
}

fn write_manifest(snapshot_dir: &Path, manifest: &Manifest) -> Result<(), SnapshotError> {
    let path = manifest_path(snapshot_dir);
    let mut content = serde_json::to_vec_pretty(manifest).map_err(|source| {
        SnapshotError::Manifest {
            action: "serialize",
            path: path.clone(),
            source,
        }
    })?;
    content.push(b'\n');
    write_atomic(&path, &content, None).map_err(|err| SnapshotError::write(&path, err))?;
    Ok(())
}

pub fn read_manifest(snapshot_dir: &Path) -> Result<Manifest, SnapshotError> {
    let path = manifest_path(snapshot_dir);
    let raw = fs::read(&path).map_err(|err| SnapshotError::io("read", &path, err))?;
    serde_json::from_slice(&raw).map_err(|source| SnapshotError::Manifest {
        action: "parse",
        path,
        source,
    })
}

/// Every readable snapshot under `snapshots_root`, oldest first.
pub fn list_snapshots(snapshots_root: &Path) -> Result<Vec<Manifest>, SnapshotError> {
    let read_dir = match fs::read_dir(snapshots_root) {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(SnapshotError::io("read", snapshots_root, err)),
    };

    let mut manifests = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|err| SnapshotError::io("read", snapshots_root, err))?;
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        match read_manifest(&dir) {
            Ok(manifest) => manifests.push(manifest),
            Err(err) => warn!(dir = %dir.display(), error = %err, "skipping unreadable snapshot"),
        }
    }

    manifests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(manifests)
}

fn snapshot_id_for(snapshot_dir: &Path) -> String {
    snapshot_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| snapshot_dir.display().to_string())
}

/// Location of a file's copy under `files/`, with root and prefix components dropped.
///
/// Relative targets live under their own `__relative__` directory so that `a/b`
/// and `/a/b` never share a copy.
pub(crate) fn snapshot_relative_path(original: &Path) -> PathBuf {
    let mut relative = PathBuf::new();
    if original.is_relative() && !original.as_os_str().is_empty() {
        relative.push(RELATIVE_TARGETS_DIR);
    }
    for component in original.components() {
        match component {
            Component::Prefix(prefix) => {
                let drive = prefix
                    .as_os_str()
                    .to_string_lossy()
                    .chars()
                    .filter(char::is_ascii_alphanumeric)
                    .collect::<String>();
                if !drive.is_empty() {
                    relative.push(drive);
                }
            }
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => relative.push("__parent__"),
            Component::Normal(part) => relative.push(part),
        }
    }

    if relative.as_os_str().is_empty() {
        PathBuf::from("root")
    } else {
        relative
    }
}
