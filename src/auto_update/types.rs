// Core types and enums for the Auto-Update System
// Value objects handed to the host plus the shared error taxonomy

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How the running application was deployed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// The running executable is the only artifact; updating replaces it
    Portable,
    /// Managed by an OS-level installer; updating re-runs the installer
    Installer,
}

impl DeploymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentMode::Portable => "portable",
            DeploymentMode::Installer => "installer",
        }
    }
}

impl std::fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Update states tracked by the coordinator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum UpdateState {
    /// No update operation in progress
    Idle,

    /// Querying the release registry
    Checking,

    /// The last check found a newer release
    UpdateAvailable { version: String },

    /// Downloading and applying the cached release
    Downloading { progress: f64 },

    /// Update staged or installer launched; the host should restart
    Ready,

    /// The last operation failed
    Failed { error: String },
}

impl Default for UpdateState {
    fn default() -> Self {
        UpdateState::Idle
    }
}

/// A downloadable file attached to a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub download_url: String,
}

/// The newest release matching this platform, as reported by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseMetadata {
    /// Normalized semantic version (no leading `v`)
    pub version: semver::Version,
    /// Release notes (markdown)
    pub release_notes: String,
    /// Release page URL
    pub release_url: String,
    /// Assets matching the platform filter, in registry order
    pub assets: Vec<ReleaseAsset>,
}

impl ReleaseMetadata {
    /// First asset matching the platform filter
    pub fn primary_asset(&self) -> Option<&ReleaseAsset> {
        self.assets.first()
    }
}

/// Result of a single update check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    /// Whether the registry has a newer version
    pub available: bool,

    /// Version of the running build, as injected at build time
    pub current_version: String,

    /// Latest matching release (`v`-prefixed), or the current version when none matched
    pub latest_version: String,

    /// Release notes in markdown format
    pub release_notes: String,

    /// Release page URL
    pub release_url: String,

    /// Installer download URL (installer deployments only)
    pub installer_url: String,

    /// Free-form diagnostics describing how the check resolved
    pub debug_info: String,
}

/// Phase reported by an apply attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    Checking,
    Downloading,
    Ready,
    Error,
}

/// Progress snapshot produced while applying an update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgress {
    pub status: UpdateStatus,

    /// Percentage (0 - 100)
    pub progress: f64,

    /// Human-readable status message
    pub message: String,

    /// The host must restart to finish the update
    pub need_restart: bool,
}

impl UpdateProgress {
    pub fn downloading(progress: f64, message: impl Into<String>) -> Self {
        Self {
            status: UpdateStatus::Downloading,
            progress: progress.clamp(0.0, 100.0),
            message: message.into(),
            need_restart: false,
        }
    }

    pub fn ready(message: impl Into<String>) -> Self {
        Self {
            status: UpdateStatus::Ready,
            progress: 100.0,
            message: message.into(),
            need_restart: true,
        }
    }
}

impl From<&UpdateError> for UpdateProgress {
    fn from(error: &UpdateError) -> Self {
        Self {
            status: UpdateStatus::Error,
            progress: 0.0,
            message: error.to_string(),
            need_restart: false,
        }
    }
}

/// Listener receiving every progress snapshot emitted during apply
pub type ProgressListener = std::sync::Arc<dyn Fn(UpdateProgress) + Send + Sync>;

/// Configuration for the update system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Repository owner (user or organization)
    pub owner: String,

    /// Repository name; also names the installer asset
    pub repo: String,

    /// Product name used in archive asset names and temp directories
    pub product: String,

    /// Base URL of the release registry API
    pub api_base_url: String,

    /// Base URL releases are downloaded from
    pub download_base_url: String,

    /// Command-line switch that makes the installer unattended
    pub installer_silent_flag: String,

    /// Consider pre-release versions when looking for the latest release
    pub include_prereleases: bool,

    /// Optional API token; `GITHUB_TOKEN` is used when unset
    pub api_token: Option<String>,

    /// Registry key (under HKLM) written by the installer
    pub install_registry_key: String,

    /// Registry value holding the install path
    pub install_registry_value: String,

    /// Install manifest location on platforms without a registry
    pub install_manifest_path: Option<PathBuf>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            owner: "keepon-online".to_string(),
            repo: "wails-demo".to_string(),
            product: "wails-demo".to_string(),
            api_base_url: "https://api.github.com".to_string(),
            download_base_url: "https://github.com".to_string(),
            installer_silent_flag: "/S".to_string(),
            include_prereleases: false,
            api_token: None,
            install_registry_key: r"Software\Wails Demo".to_string(),
            install_registry_value: "InstallPath".to_string(),
            install_manifest_path: None,
        }
    }
}

impl UpdateConfig {
    /// `owner/repo` slug used in API paths and diagnostics
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Error types for update operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, thiserror::Error)]
#[serde(tag = "type", content = "message")]
pub enum UpdateError {
    /// The HTTP client or asset filter could not be built
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Release query failed (transport, status or malformed response)
    #[error("Update check failed: {0}")]
    UpdateCheckFailed(String),

    /// Transport failure while downloading an artifact
    #[error("Network error: {0}")]
    Network(String),

    /// The download host answered with a non-success status
    #[error("Download failed with HTTP status {status_code}")]
    DownloadFailed { status_code: u16 },

    /// Apply was called before a check cached a release
    #[error("No release cached; check for updates first")]
    PrecedingCheckRequired,

    /// The installer process could not be started
    #[error("Failed to launch installer: {0}")]
    ProcessLaunch(String),

    /// Temp directory, file creation or write failure
    #[error("File system error: {0}")]
    FileSystem(String),

    /// The update archive is unreadable or lacks the executable
    #[error("Invalid update archive: {0}")]
    Archive(String),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Another check or apply is already running on this coordinator
    #[error("Another update operation is already in progress")]
    Busy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_state_default() {
        assert_eq!(UpdateState::default(), UpdateState::Idle);
    }

    #[test]
    fn test_update_config_default() {
        let config = UpdateConfig::default();
        assert_eq!(config.slug(), "keepon-online/wails-demo");
        assert_eq!(config.installer_silent_flag, "/S");
        assert_eq!(config.api_base_url, "https://api.github.com");
        assert!(!config.include_prereleases);
        assert!(config.install_manifest_path.is_none());
    }

    #[test]
    fn test_update_config_partial_json_uses_defaults() {
        let config: UpdateConfig = serde_json::from_str(r#"{"owner":"acme"}"#).unwrap();
        assert_eq!(config.owner, "acme");
        assert_eq!(config.repo, "wails-demo");
    }

    #[test]
    fn test_update_info_uses_camel_case_keys() {
        let info = UpdateInfo {
            available: true,
            current_version: "v1.0.0".to_string(),
            latest_version: "v1.1.0".to_string(),
            release_url: "https://example.com/r".to_string(),
            installer_url: "https://example.com/i.exe".to_string(),
            ..Default::default()
        };

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["currentVersion"], "v1.0.0");
        assert_eq!(json["latestVersion"], "v1.1.0");
        assert_eq!(json["releaseUrl"], "https://example.com/r");
        assert_eq!(json["installerUrl"], "https://example.com/i.exe");
        assert!(json.get("debugInfo").is_some());
    }

    #[test]
    fn test_update_progress_serialization() {
        let json = serde_json::to_value(UpdateProgress::ready("done")).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["progress"], 100.0);
        assert_eq!(json["needRestart"], true);
    }

    #[test]
    fn test_progress_from_error() {
        let error = UpdateError::DownloadFailed { status_code: 404 };
        let progress = UpdateProgress::from(&error);

        assert_eq!(progress.status, UpdateStatus::Error);
        assert!(!progress.need_restart);
        assert!(progress.message.contains("404"));
    }

    #[test]
    fn test_downloading_progress_is_clamped() {
        assert_eq!(UpdateProgress::downloading(140.0, "x").progress, 100.0);
        assert_eq!(UpdateProgress::downloading(-3.0, "x").progress, 0.0);
    }

    #[test]
    fn test_deployment_mode_display() {
        assert_eq!(DeploymentMode::Portable.to_string(), "portable");
        assert_eq!(
            serde_json::to_string(&DeploymentMode::Installer).unwrap(),
            r#""installer""#
        );
    }

    #[test]
    fn test_update_error_serialization() {
        let error = UpdateError::DownloadFailed { status_code: 503 };

        let json = serde_json::to_string(&error).unwrap();
        let deserialized: UpdateError = serde_json::from_str(&json).unwrap();

        assert_eq!(error, deserialized);
    }

    #[test]
    fn test_unit_error_serialization() {
        let json = serde_json::to_value(UpdateError::PrecedingCheckRequired).unwrap();
        assert_eq!(json["type"], "PrecedingCheckRequired");
    }
}
