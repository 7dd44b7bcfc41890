// Auto-Update System Module
// Self-update for a desktop application:
// - Check: query the release registry for a newer build for this platform
// - Apply: stage a replacement binary (portable) or launch the installer (installer mode)

mod types;
mod config;
mod platform;
mod version;
mod mode;
mod release_source;
mod downloader;
mod workspace;
mod replacer;
mod installer;
mod strategy;
mod coordinator;

// Re-export core types for external use
pub use types::{
    DeploymentMode,
    ProgressListener,
    ReleaseAsset,
    ReleaseMetadata,
    UpdateConfig,
    UpdateError,
    UpdateInfo,
    UpdateProgress,
    UpdateState,
    UpdateStatus,
};

// Re-export config functions
pub use config::{
    ensure_config_exists, get_config_path, load_config, load_config_from, save_config,
    save_config_to,
};

// Re-export platform and version helpers
pub use platform::{arch_name, os_name, platform_info, AssetFilter};
pub use version::{is_newer, normalize as normalize_version, CURRENT_VERSION};

// Re-export mode detection
pub use mode::{detect_mode, platform_probe, InstallProbe, ManifestInstallProbe};
#[cfg(windows)]
pub use mode::RegistryInstallProbe;

// Re-export release source and downloader
pub use release_source::ReleaseSource;
pub use downloader::{DownloadProgress, Downloader, ProgressCallback};

// Re-export apply machinery
pub use workspace::TempWorkspace;
pub use replacer::{activate_staged, cleanup_previous, BinaryReplacer};
pub use installer::{installer_url, CommandSpawner, InstallerLauncher, InstallerSpawner};
pub use strategy::ApplyStrategy;

// Re-export coordinator
pub use coordinator::UpdateCoordinator;
