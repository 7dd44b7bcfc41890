// Temporary Workspace
// Uniquely named scratch directory for one apply attempt

use std::path::Path;
use tempfile::TempDir;

use crate::auto_update::UpdateError;

/// Scratch directory created on first use and removed on `dispose`
pub struct TempWorkspace {
    prefix: String,
    dir: Option<TempDir>,
}

impl TempWorkspace {
    /// Workspace whose directory name starts with `<product>-update`
    pub fn new(product: &str) -> Self {
        Self {
            prefix: format!("{}-update", product),
            dir: None,
        }
    }

    /// Path of the workspace directory, creating it on first call
    pub fn acquire(&mut self) -> Result<&Path, UpdateError> {
        if self.dir.is_none() {
            let dir = tempfile::Builder::new()
                .prefix(&self.prefix)
                .tempdir()
                .map_err(|e| UpdateError::FileSystem(format!("Failed to create temp dir: {}", e)))?;
            log::debug!("[TempWorkspace] Created {}", dir.path().display());
            self.dir = Some(dir);
        }

        match &self.dir {
            Some(dir) => Ok(dir.path()),
            None => Err(UpdateError::FileSystem("Temp dir unavailable".to_string())),
        }
    }

    /// Whether a directory has been created and not yet disposed
    pub fn is_acquired(&self) -> bool {
        self.dir.is_some()
    }

    /// Remove the directory and its contents. Failures are logged, never returned.
    pub fn dispose(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => log::debug!("[TempWorkspace] Removed {}", path.display()),
                Err(e) => log::warn!("[TempWorkspace] Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_is_lazy_and_idempotent() {
        let mut workspace = TempWorkspace::new("wails-demo");
        assert!(!workspace.is_acquired());

        let first = workspace.acquire().unwrap().to_path_buf();
        let second = workspace.acquire().unwrap().to_path_buf();

        assert_eq!(first, second);
        assert!(first.is_dir());
        assert!(first
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("wails-demo-update"));

        workspace.dispose();
    }

    #[test]
    fn test_dispose_removes_contents() {
        let mut workspace = TempWorkspace::new("wails-demo");
        let dir = workspace.acquire().unwrap().to_path_buf();
        std::fs::write(dir.join("partial.zip"), b"half").unwrap();

        workspace.dispose();

        assert!(!dir.exists());
        assert!(!workspace.is_acquired());
        // Second dispose is a no-op
        workspace.dispose();
    }

    #[test]
    fn test_workspaces_are_unique() {
        let mut a = TempWorkspace::new("wails-demo");
        let mut b = TempWorkspace::new("wails-demo");
        assert_ne!(a.acquire().unwrap(), b.acquire().unwrap());
    }
}
