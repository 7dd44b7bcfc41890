// Binary Replacer
// Portable deployments: stage the new executable next to the running one.
// The staged file only becomes the live image across a restart.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::auto_update::UpdateError;

/// Stages replacement executables for portable deployments
#[derive(Debug, Clone, Default)]
pub struct BinaryReplacer {
    /// Executable to replace; the running image when unset
    executable: Option<PathBuf>,
}

impl BinaryReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `executable` instead of the running image
    pub fn with_executable(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: Some(executable.into()),
        }
    }

    /// The executable this replacer targets
    pub fn target(&self) -> Result<PathBuf, UpdateError> {
        match &self.executable {
            Some(path) => Ok(path.clone()),
            None => current_exe_path(),
        }
    }

    /// `<exe>.new`, next to the executable
    pub fn staging_path(executable: &Path) -> PathBuf {
        sibling_with_suffix(executable, "new")
    }

    /// `<exe>.old`, where activation parks the previous image
    pub fn backup_path(executable: &Path) -> PathBuf {
        sibling_with_suffix(executable, "old")
    }

    /// Extract the executable from `archive` and write it to the staging path.
    ///
    /// Returns the staged path. The running executable is left untouched.
    pub fn stage_from_archive(&self, archive: &Path, scratch: &Path) -> Result<PathBuf, UpdateError> {
        let target = self.target()?;
        let wanted = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| UpdateError::FileSystem(format!("Invalid executable path {}", target.display())))?;

        let extracted = extract_executable(archive, &wanted, scratch)?;
        let staged = Self::staging_path(&target);

        std::fs::copy(&extracted, &staged).map_err(|e| {
            UpdateError::FileSystem(format!("Cannot stage new binary at {}: {}", staged.display(), e))
        })?;
        set_executable(&staged)?;

        log::info!(
            "[BinaryReplacer] Staged {} for {} (active after restart)",
            staged.display(),
            target.display()
        );
        Ok(staged)
    }
}

/// Swap a staged `<exe>.new` into place. Call right before relaunching.
///
/// Returns `Ok(false)` when nothing is staged. On failure the previous image is restored.
pub fn activate_staged(executable: &Path) -> Result<bool, UpdateError> {
    let staged = BinaryReplacer::staging_path(executable);
    if !staged.exists() {
        return Ok(false);
    }

    let backup = BinaryReplacer::backup_path(executable);
    if let Err(e) = std::fs::remove_file(&backup) {
        if e.kind() != std::io::ErrorKind::NotFound {
            return Err(UpdateError::FileSystem(format!(
                "Cannot remove stale backup {}: {}",
                backup.display(),
                e
            )));
        }
    }

    if executable.exists() {
        std::fs::rename(executable, &backup).map_err(|e| {
            UpdateError::FileSystem(format!(
                "Cannot back up {} -> {}: {}",
                executable.display(),
                backup.display(),
                e
            ))
        })?;
    }

    if let Err(e) = std::fs::rename(&staged, executable) {
        let mut message = format!("Cannot move {} into place: {}", staged.display(), e);
        if backup.exists() {
            if let Err(restore) = std::fs::rename(&backup, executable) {
                log::error!(
                    "[BinaryReplacer] Failed to restore {} from {}: {}",
                    executable.display(),
                    backup.display(),
                    restore
                );
                message.push_str(&format!(
                    "; previous binary left at {} ({})",
                    backup.display(),
                    restore
                ));
            }
        }
        return Err(UpdateError::FileSystem(message));
    }

    set_executable(executable)?;
    log::info!("[BinaryReplacer] Activated new binary at {}", executable.display());
    Ok(true)
}

/// Remove the `<exe>.old` left by a previous activation (best-effort)
pub fn cleanup_previous(executable: &Path) {
    let backup = BinaryReplacer::backup_path(executable);
    if backup.exists() {
        if let Err(e) = std::fs::remove_file(&backup) {
            log::warn!("[BinaryReplacer] Failed to remove {}: {}", backup.display(), e);
        }
    }
}

/// Returns the path to the currently running executable
pub fn current_exe_path() -> Result<PathBuf, UpdateError> {
    std::env::current_exe().map_err(|e| {
        UpdateError::FileSystem(format!("Cannot determine current executable path: {}", e))
    })
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Pull the entry named `wanted` (or the archive's only file) out of a zip
fn extract_executable(archive: &Path, wanted: &str, scratch: &Path) -> Result<PathBuf, UpdateError> {
    let file = File::open(archive)
        .map_err(|e| UpdateError::FileSystem(format!("Cannot open {}: {}", archive.display(), e)))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| UpdateError::Archive(e.to_string()))?;

    let mut file_entries = Vec::new();
    let mut chosen = None;
    for i in 0..zip.len() {
        let entry = zip.by_index(i).map_err(|e| UpdateError::Archive(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let Some(entry_path) = entry.enclosed_name() else {
            log::warn!("[BinaryReplacer] Skipping unsafe archive entry {}", entry.name());
            continue;
        };
        if entry_path.file_name().is_some_and(|name| name.to_string_lossy() == wanted) {
            chosen = Some(i);
            break;
        }
        file_entries.push(i);
    }

    let index = match (chosen, file_entries.as_slice()) {
        (Some(i), _) => i,
        (None, [only]) => *only,
        _ => {
            return Err(UpdateError::Archive(format!(
                "{} not found in {}",
                wanted,
                archive.display()
            )))
        }
    };

    let mut entry = zip.by_index(index).map_err(|e| UpdateError::Archive(e.to_string()))?;
    let out_path = scratch.join(format!("extracted-{}", wanted));
    let mut out = File::create(&out_path)
        .map_err(|e| UpdateError::FileSystem(format!("Cannot create {}: {}", out_path.display(), e)))?;
    std::io::copy(&mut entry, &mut out)
        .map_err(|e| UpdateError::Archive(format!("Failed to extract {}: {}", entry.name(), e)))?;

    Ok(out_path)
}

/// Set executable permission on Unix platforms
fn set_executable(path: &Path) -> Result<(), UpdateError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|e| {
            UpdateError::FileSystem(format!(
                "Cannot set executable permission on {}: {}",
                path.display(),
                e
            ))
        })?;
    }
    let _ = path;
    Ok(())
}
