// Installer Launcher
// Installer deployments: fetch the standalone setup executable and start it
// unattended. The launcher never waits for the installer to finish.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::auto_update::{UpdateConfig, UpdateError};

/// File name of the installer for `version`: `<repo>-setup-<version>.exe`
pub fn installer_file_name(repo: &str, version: &semver::Version) -> String {
    format!("{}-setup-{}.exe", repo, version)
}

/// `<download base>/<owner>/<repo>/releases/download/v<version>/<repo>-setup-<version>.exe`
pub fn installer_url(config: &UpdateConfig, version: &semver::Version) -> String {
    format!(
        "{}/{}/{}/releases/download/v{}/{}",
        config.download_base_url.trim_end_matches('/'),
        config.owner,
        config.repo,
        version,
        installer_file_name(&config.repo, version)
    )
}

/// Starts an external process without waiting for it
pub trait InstallerSpawner: Send + Sync {
    /// Spawn `program` with `args`, returning the child's process id
    fn spawn(&self, program: &Path, args: &[String]) -> std::io::Result<u32>;
}

/// Spawns a real detached child process
#[derive(Debug, Default)]
pub struct CommandSpawner;

impl InstallerSpawner for CommandSpawner {
    fn spawn(&self, program: &Path, args: &[String]) -> std::io::Result<u32> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Detach so the installer outlives this process
        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
            const DETACHED_PROCESS: u32 = 0x00000008;
            command.creation_flags(CREATE_NEW_PROCESS_GROUP | DETACHED_PROCESS);
        }

        let child = command.spawn()?;
        Ok(child.id())
    }
}

/// Downloads and launches the installer for a release
pub struct InstallerLauncher {
    config: UpdateConfig,
    spawner: Arc<dyn InstallerSpawner>,
}

impl InstallerLauncher {
    pub fn new(config: &UpdateConfig) -> Self {
        Self::with_spawner(config, Arc::new(CommandSpawner))
    }

    pub fn with_spawner(config: &UpdateConfig, spawner: Arc<dyn InstallerSpawner>) -> Self {
        Self {
            config: config.clone(),
            spawner,
        }
    }

    /// Installer URL for `version`
    pub fn url_for(&self, version: &semver::Version) -> String {
        installer_url(&self.config, version)
    }

    /// Where the installer for `version` is written inside `workspace`
    pub fn destination(&self, workspace: &Path, version: &semver::Version) -> PathBuf {
        workspace.join(installer_file_name(&self.config.repo, version))
    }

    /// Start the downloaded installer with the silent flag
    ///
    /// # Errors
    /// * `Cancelled` - the token fired before the spawn
    /// * `ProcessLaunch` - the process could not be started
    pub fn launch(&self, installer: &Path, cancel: &CancellationToken) -> Result<u32, UpdateError> {
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        let args = vec![self.config.installer_silent_flag.clone()];
        log::info!(
            "[InstallerLauncher] Launching {} {:?}",
            installer.display(),
            args
        );

        let pid = self.spawner.spawn(installer, &args).map_err(|e| {
            log::error!("[InstallerLauncher] Failed to start installer: {}", e);
            UpdateError::ProcessLaunch(format!("{}: {}", installer.display(), e))
        })?;

        log::info!("[InstallerLauncher] Installer running as pid {}", pid);
        Ok(pid)
    }
}
