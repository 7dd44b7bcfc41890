// Update Coordinator - State Machine for Auto-Update System
// Orchestrates check/apply, owns the cached release and the progress model

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::auto_update::downloader::Downloader;
use crate::auto_update::installer::{installer_url, InstallerSpawner};
use crate::auto_update::mode::{detect_mode, platform_probe, InstallProbe};
use crate::auto_update::platform::{self, AssetFilter};
use crate::auto_update::release_source::ReleaseSource;
use crate::auto_update::strategy::{ApplyStrategy, ProgressSink};
use crate::auto_update::version;
use crate::auto_update::workspace::TempWorkspace;
use crate::auto_update::{
    DeploymentMode, ProgressListener, ReleaseMetadata, UpdateConfig, UpdateError, UpdateInfo,
    UpdateProgress, UpdateState,
};

/// Update coordinator - the single entry point hosts talk to
pub struct UpdateCoordinator {
    /// Update configuration
    config: UpdateConfig,
    /// Version of the running build, as injected
    current_version: String,
    /// Resolved once at construction
    mode: DeploymentMode,
    install_path: Option<PathBuf>,
    source: ReleaseSource,
    downloader: Downloader,
    filter: AssetFilter,
    strategy: ApplyStrategy,
    /// Release found by the last successful check
    latest: Mutex<Option<ReleaseMetadata>>,
    /// Current update state
    state: Arc<Mutex<UpdateState>>,
    /// Held for the duration of a check or apply
    busy: tokio::sync::Mutex<()>,
    listener: Option<ProgressListener>,
}

impl UpdateCoordinator {
    /// Create a new UpdateCoordinator
    ///
    /// # Arguments
    /// * `config` - Update configuration
    /// * `current_version` - Version of the running build (`v` prefix optional)
    /// * `probe` - Install record probe, consulted once
    ///
    /// # Errors
    /// `Configuration` if the HTTP clients or asset filter cannot be built
    pub fn new(
        config: UpdateConfig,
        current_version: impl Into<String>,
        probe: &dyn InstallProbe,
    ) -> Result<Self, UpdateError> {
        let install_path = probe.install_path().filter(|p| !p.as_os_str().is_empty());
        let mode = detect_mode(probe);

        let user_agent = format!("{}-updater/{}", config.product, env!("CARGO_PKG_VERSION"));
        let source = ReleaseSource::from_config(&config, &user_agent)?;
        let downloader = Downloader::new(&user_agent)?;
        let filter = AssetFilter::for_current_platform(&config.product)?;
        let strategy = ApplyStrategy::for_mode(mode, &config);

        log::info!(
            "[UpdateCoordinator] {} in {} mode, strategy {}",
            config.slug(),
            mode,
            strategy.name()
        );

        Ok(Self {
            config,
            current_version: current_version.into(),
            mode,
            install_path,
            source,
            downloader,
            filter,
            strategy,
            latest: Mutex::new(None),
            state: Arc::new(Mutex::new(UpdateState::Idle)),
            busy: tokio::sync::Mutex::new(()),
            listener: None,
        })
    }

    /// Create a coordinator from the stored configuration, the platform
    /// install probe and the build-time version
    pub fn with_defaults() -> Result<Self, UpdateError> {
        let config = crate::auto_update::load_config();
        log::info!("[UpdateCoordinator] Using API URL: {}", config.api_base_url);
        let probe = platform_probe(&config);
        Self::new(config, version::CURRENT_VERSION, probe.as_ref())
    }

    /// Stage portable updates for `executable` instead of the running image
    pub fn with_executable(mut self, executable: impl AsRef<Path>) -> Self {
        self.strategy.set_executable(executable.as_ref());
        self
    }

    /// Launch installers through `spawner`
    pub fn with_spawner(mut self, spawner: Arc<dyn InstallerSpawner>) -> Self {
        self.strategy.set_spawner(&self.config, spawner);
        self
    }

    /// Receive every progress snapshot emitted during apply
    pub fn with_progress_listener(mut self, listener: ProgressListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Get the current update state
    pub fn get_state(&self) -> UpdateState {
        self.state.lock().clone()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Get the current application version
    pub fn get_current_version(&self) -> &str {
        &self.current_version
    }

    /// Release cached by the last successful check
    pub fn get_latest_release(&self) -> Option<ReleaseMetadata> {
        self.latest.lock().clone()
    }

    /// `"<os>/<arch>"` of the running build
    pub fn platform_info(&self) -> String {
        platform::platform_info()
    }

    /// `"portable"` or `"installer"`
    pub fn update_mode(&self) -> &'static str {
        self.mode.as_str()
    }

    pub fn deployment_mode(&self) -> DeploymentMode {
        self.mode
    }

    /// Install location recorded by the installer, if any
    pub fn install_path(&self) -> Option<&Path> {
        self.install_path.as_deref()
    }

    fn transition_state(&self, new_state: UpdateState) {
        let previous_state = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, new_state.clone())
        };

        log::info!(
            "[UpdateCoordinator] State transition: {:?} -> {:?}",
            previous_state,
            new_state
        );
    }

    fn begin(&self) -> Result<tokio::sync::MutexGuard<'_, ()>, UpdateError> {
        self.busy.try_lock().map_err(|_| {
            log::warn!("[UpdateCoordinator] Rejecting call, another operation is in flight");
            UpdateError::Busy
        })
    }

    /// Query the registry for a newer release.
    ///
    /// A found release replaces the cached one. Finding no release with a
    /// matching asset is not an error: `available` is false and
    /// `latest_version` echoes the current version.
    ///
    /// # Errors
    /// * `UpdateCheckFailed` - registry unreachable or malformed response
    /// * `Cancelled` - the token fired
    /// * `Busy` - another check or apply is running
    pub async fn check(&self, cancel: &CancellationToken) -> Result<UpdateInfo, UpdateError> {
        let _guard = self.begin()?;
        self.transition_state(UpdateState::Checking);

        let slug = self.config.slug();
        let current = version::normalize(&self.current_version).to_string();
        log::info!(
            "[UpdateCoordinator] Checking {} for releases newer than {} (filter {})",
            slug,
            current,
            self.filter.as_str()
        );

        let found = match self.source.find_latest(&slug, &self.filter, cancel).await {
            Ok(found) => found,
            Err(e) => {
                log::error!("[UpdateCoordinator] Update check failed: {}", e);
                self.transition_state(UpdateState::Failed { error: e.to_string() });
                return Err(e);
            }
        };

        let Some(release) = found else {
            log::info!("[UpdateCoordinator] No release with a matching asset");
            self.transition_state(UpdateState::Idle);
            return Ok(UpdateInfo {
                available: false,
                current_version: self.current_version.clone(),
                latest_version: self.current_version.clone(),
                debug_info: format!(
                    "found=false, repo={}, currentVersion={}, no matching release asset",
                    slug, current
                ),
                ..Default::default()
            });
        };

        let available = version::is_newer(&release.version, &self.current_version);
        let latest_version = format!("v{}", release.version);
        let installer_url = match self.mode {
            DeploymentMode::Installer => installer_url(&self.config, &release.version),
            DeploymentMode::Portable => String::new(),
        };

        let info = UpdateInfo {
            available,
            current_version: self.current_version.clone(),
            latest_version: latest_version.clone(),
            release_notes: release.release_notes.clone(),
            release_url: release.release_url.clone(),
            installer_url,
            debug_info: format!(
                "found=true, repo={}, currentVersion={}, latestVersion={}",
                slug, current, release.version
            ),
        };

        *self.latest.lock() = Some(release);

        if available {
            log::info!("[UpdateCoordinator] Update available: {}", latest_version);
            self.transition_state(UpdateState::UpdateAvailable {
                version: latest_version,
            });
        } else {
            log::info!("[UpdateCoordinator] Already up to date ({})", current);
            self.transition_state(UpdateState::Idle);
        }

        Ok(info)
    }

    /// Download and apply the release cached by the last check.
    ///
    /// Portable deployments stage a replacement executable; installer
    /// deployments launch the setup program. Either way the host must
    /// restart to finish (`need_restart`). The temporary workspace is removed
    /// before returning, whatever the outcome.
    ///
    /// # Errors
    /// * `PrecedingCheckRequired` - no release cached; no network access is made
    /// * `Network` / `DownloadFailed` - the artifact could not be fetched
    /// * `FileSystem` / `Archive` - staging failed
    /// * `ProcessLaunch` - the installer did not start
    /// * `Cancelled` - the token fired
    /// * `Busy` - another check or apply is running
    pub async fn apply(&self, cancel: &CancellationToken) -> Result<UpdateProgress, UpdateError> {
        let _guard = self.begin()?;
        let sink = ProgressSink::new(self.listener.clone(), Arc::clone(&self.state));

        let Some(release) = self.get_latest_release() else {
            let error = UpdateError::PrecedingCheckRequired;
            self.fail(&error, &sink);
            return Err(error);
        };

        log::info!(
            "[UpdateCoordinator] Applying v{} via {}",
            release.version,
            self.strategy.name()
        );
        self.transition_state(UpdateState::Downloading { progress: 0.0 });

        let mut workspace = TempWorkspace::new(&self.config.product);
        let result = self
            .strategy
            .run(&release, &mut workspace, &self.downloader, cancel, &sink)
            .await;
        workspace.dispose();

        match result {
            Ok(message) => {
                self.transition_state(UpdateState::Ready);
                let progress = UpdateProgress::ready(message);
                sink.report(progress.clone());
                Ok(progress)
            }
            Err(error) => {
                self.fail(&error, &sink);
                Err(error)
            }
        }
    }

    fn fail(&self, error: &UpdateError, sink: &ProgressSink) {
        log::error!("[UpdateCoordinator] Apply failed: {}", error);
        self.transition_state(UpdateState::Failed {
            error: error.to_string(),
        });
        sink.report(UpdateProgress::from(error));
    }
}
