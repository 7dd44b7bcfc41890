// Apply Strategy
// The two ways an update is applied, chosen once from the deployment mode

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::auto_update::downloader::{Downloader, ProgressCallback};
use crate::auto_update::installer::{InstallerLauncher, InstallerSpawner};
use crate::auto_update::replacer::BinaryReplacer;
use crate::auto_update::workspace::TempWorkspace;
use crate::auto_update::{
    DeploymentMode, ProgressListener, ReleaseMetadata, UpdateConfig, UpdateError, UpdateProgress,
    UpdateState, UpdateStatus,
};

/// Share of the progress bar covered by the download itself
const DOWNLOAD_SHARE: f64 = 90.0;

/// Fans progress out to the coordinator state and the host listener
#[derive(Clone)]
pub(crate) struct ProgressSink {
    listener: Option<ProgressListener>,
    state: Arc<Mutex<UpdateState>>,
}

impl ProgressSink {
    pub(crate) fn new(listener: Option<ProgressListener>, state: Arc<Mutex<UpdateState>>) -> Self {
        Self { listener, state }
    }

    pub(crate) fn report(&self, progress: UpdateProgress) {
        if progress.status == UpdateStatus::Downloading {
            *self.state.lock() = UpdateState::Downloading {
                progress: progress.progress,
            };
        }
        if let Some(listener) = &self.listener {
            listener(progress);
        }
    }

    /// Downloader callback scaling byte progress into the download share
    fn download_callback(&self, artifact: &str) -> ProgressCallback {
        let sink = self.clone();
        let artifact = artifact.to_string();
        Box::new(move |p| {
            sink.report(UpdateProgress::downloading(
                f64::from(p.percentage) / 100.0 * DOWNLOAD_SHARE,
                format!("Downloading {} ({} bytes)", artifact, p.bytes_downloaded),
            ));
        })
    }
}

/// Where an asset is downloaded inside the workspace.
///
/// Only the final path component of the registry-supplied name is used.
fn archive_destination(scratch: &Path, asset_name: &str) -> Result<PathBuf, UpdateError> {
    let file_name = Path::new(asset_name)
        .file_name()
        .ok_or_else(|| UpdateError::Archive(format!("Asset name {:?} has no file name", asset_name)))?;
    Ok(scratch.join(file_name))
}

/// How a downloaded release is applied
pub enum ApplyStrategy {
    /// Portable: stage a replacement executable, active after restart
    ReplaceBinary(BinaryReplacer),
    /// Installer: launch the setup program unattended
    RunInstaller(InstallerLauncher),
}

impl ApplyStrategy {
    pub fn for_mode(mode: DeploymentMode, config: &UpdateConfig) -> Self {
        match mode {
            DeploymentMode::Portable => ApplyStrategy::ReplaceBinary(BinaryReplacer::new()),
            DeploymentMode::Installer => ApplyStrategy::RunInstaller(InstallerLauncher::new(config)),
        }
    }

    /// Stage into `executable` instead of the running image (portable only)
    pub(crate) fn set_executable(&mut self, executable: &Path) {
        if let ApplyStrategy::ReplaceBinary(replacer) = self {
            *replacer = BinaryReplacer::with_executable(executable);
        }
    }

    /// Launch installers through `spawner` (installer only)
    pub(crate) fn set_spawner(&mut self, config: &UpdateConfig, spawner: Arc<dyn InstallerSpawner>) {
        if let ApplyStrategy::RunInstaller(launcher) = self {
            *launcher = InstallerLauncher::with_spawner(config, spawner);
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ApplyStrategy::ReplaceBinary(_) => "ReplaceBinary",
            ApplyStrategy::RunInstaller(_) => "RunInstaller",
        }
    }

    /// Download and apply `release`. Returns the ready message.
    pub(crate) async fn run(
        &self,
        release: &ReleaseMetadata,
        workspace: &mut TempWorkspace,
        downloader: &Downloader,
        cancel: &CancellationToken,
        sink: &ProgressSink,
    ) -> Result<String, UpdateError> {
        match self {
            ApplyStrategy::ReplaceBinary(replacer) => {
                let asset = release.primary_asset().ok_or_else(|| {
                    UpdateError::Archive(format!("Release v{} has no asset for this platform", release.version))
                })?;

                sink.report(UpdateProgress::downloading(0.0, format!("Downloading {}", asset.name)));
                let scratch = workspace.acquire()?.to_path_buf();
                let archive = archive_destination(&scratch, &asset.name)?;
                downloader
                    .download(
                        &asset.download_url,
                        &archive,
                        cancel,
                        Some(sink.download_callback(&asset.name)),
                    )
                    .await?;
                sink.report(UpdateProgress::downloading(DOWNLOAD_SHARE, "Download complete, staging update"));

                let replacer = replacer.clone();
                let staged = tokio::task::spawn_blocking(move || replacer.stage_from_archive(&archive, &scratch))
                    .await
                    .map_err(|e| UpdateError::FileSystem(format!("Staging task failed: {}", e)))??;

                Ok(format!(
                    "Update v{} staged at {}; restart to finish",
                    release.version,
                    staged.display()
                ))
            }
            ApplyStrategy::RunInstaller(launcher) => {
                let url = launcher.url_for(&release.version);
                sink.report(UpdateProgress::downloading(0.0, "Downloading installer"));

                let scratch = workspace.acquire()?.to_path_buf();
                let installer = launcher.destination(&scratch, &release.version);
                downloader
                    .download(&url, &installer, cancel, Some(sink.download_callback("installer")))
                    .await?;
                sink.report(UpdateProgress::downloading(DOWNLOAD_SHARE, "Download complete, starting installer"));

                launcher.launch(&installer, cancel)?;
                Ok(format!("Installer for v{} started; restart to finish", release.version))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auto_update::ReleaseAsset;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_archive_destination_stays_in_workspace() {
        let scratch = Path::new("/tmp/wails-demo-update-x");
        assert_eq!(
            archive_destination(scratch, "wails-demo_linux_amd64.zip").unwrap(),
            scratch.join("wails-demo_linux_amd64.zip")
        );
        assert_eq!(
            archive_destination(scratch, "../../etc/wails-demo_linux_amd64.zip").unwrap(),
            scratch.join("wails-demo_linux_amd64.zip")
        );
        assert!(matches!(
            archive_destination(scratch, ".."),
            Err(UpdateError::Archive(_))
        ));
        assert!(matches!(archive_destination(scratch, ""), Err(UpdateError::Archive(_))));
    }

    #[tokio::test]
    async fn test_replace_binary_never_writes_outside_workspace() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not a zip".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let escaped = format!("escaped-{}-wails-demo_linux_amd64.zip", std::process::id());
        let release = ReleaseMetadata {
            version: semver::Version::new(1, 1, 0),
            release_notes: String::new(),
            release_url: String::new(),
            assets: vec![ReleaseAsset {
                name: format!("../{}", escaped),
                download_url: format!("{}/asset.zip", server.uri()),
            }],
        };

        let install_dir = tempfile::tempdir().unwrap();
        let strategy =
            ApplyStrategy::ReplaceBinary(BinaryReplacer::with_executable(install_dir.path().join("wails-demo")));
        let mut workspace = TempWorkspace::new("wails-demo");
        let scratch = workspace.acquire().unwrap().to_path_buf();
        let outside = scratch.parent().unwrap().join(&escaped);
        let sink = ProgressSink::new(None, Arc::new(Mutex::new(UpdateState::Idle)));

        let result = strategy
            .run(
                &release,
                &mut workspace,
                &Downloader::new("strategy-test").unwrap(),
                &CancellationToken::new(),
                &sink,
            )
            .await;

        assert!(matches!(result, Err(UpdateError::Archive(_))));
        assert!(scratch.join(&escaped).exists());
        assert!(!outside.exists());

        workspace.dispose();
        assert!(!scratch.exists());
    }

    #[test]
    fn test_strategy_follows_mode() {
        let config = UpdateConfig::default();
        assert_eq!(
            ApplyStrategy::for_mode(DeploymentMode::Portable, &config).name(),
            "ReplaceBinary"
        );
        assert_eq!(
            ApplyStrategy::for_mode(DeploymentMode::Installer, &config).name(),
            "RunInstaller"
        );
    }

    #[test]
    fn test_sink_updates_state_and_listener() {
        let state = Arc::new(Mutex::new(UpdateState::Idle));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let listener: ProgressListener = Arc::new(move |p: UpdateProgress| seen_clone.lock().push(p.progress));

        let sink = ProgressSink::new(Some(listener), Arc::clone(&state));
        sink.report(UpdateProgress::downloading(45.0, "half"));

        assert_eq!(*state.lock(), UpdateState::Downloading { progress: 45.0 });
        assert_eq!(*seen.lock(), vec![45.0]);
    }

    #[test]
    fn test_download_callback_scales_into_share() {
        let state = Arc::new(Mutex::new(UpdateState::Idle));
        let sink = ProgressSink::new(None, Arc::clone(&state));

        let callback = sink.download_callback("a.zip");
        callback(crate::auto_update::downloader::DownloadProgress {
            bytes_downloaded: 100,
            total_bytes: Some(100),
            percentage: 100.0,
        });

        assert_eq!(*state.lock(), UpdateState::Downloading { progress: 90.0 });
    }
}
