// Deployment Mode Detection
// Decides Portable vs Installer once, from the install record the installer leaves behind

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::auto_update::{DeploymentMode, UpdateConfig};

/// Read-only access to the platform's persisted install record
pub trait InstallProbe: Send + Sync {
    /// Install path recorded by the installer, if any
    fn install_path(&self) -> Option<PathBuf>;
}

/// Resolve the deployment mode from a probe.
///
/// A record naming a non-empty install path means Installer; anything else is Portable.
pub fn detect_mode(probe: &dyn InstallProbe) -> DeploymentMode {
    let mode = match probe.install_path() {
        Some(path) if !path.as_os_str().is_empty() => {
            log::info!("[ModeDetector] Install record found at {}", path.display());
            DeploymentMode::Installer
        }
        _ => DeploymentMode::Portable,
    };
    log::info!("[ModeDetector] Deployment mode: {}", mode);
    mode
}

/// Probe reading `HKLM\<key>` / `<value>`
#[cfg(windows)]
pub struct RegistryInstallProbe {
    key: String,
    value: String,
}

#[cfg(windows)]
impl RegistryInstallProbe {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[cfg(windows)]
impl InstallProbe for RegistryInstallProbe {
    fn install_path(&self) -> Option<PathBuf> {
        use winreg::enums::{HKEY_LOCAL_MACHINE, KEY_READ};
        use winreg::RegKey;

        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let key = match hklm.open_subkey_with_flags(&self.key, KEY_READ) {
            Ok(key) => key,
            Err(e) => {
                log::debug!("[ModeDetector] Registry key {} not readable: {}", self.key, e);
                return None;
            }
        };

        let path: String = key.get_value(&self.value).ok()?;
        if path.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(path))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstallManifest {
    #[serde(default)]
    install_path: String,
}

/// Probe reading a JSON install manifest (`{"installPath": "..."}`)
pub struct ManifestInstallProbe {
    manifest_path: PathBuf,
}

impl ManifestInstallProbe {
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
        }
    }

    /// `<data dir>/<product>/install.json`
    pub fn default_path(product: &str) -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(product)
            .join("install.json")
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }
}

impl InstallProbe for ManifestInstallProbe {
    fn install_path(&self) -> Option<PathBuf> {
        let content = std::fs::read_to_string(&self.manifest_path).ok()?;
        let manifest: InstallManifest = match serde_json::from_str(&content) {
            Ok(manifest) => manifest,
            Err(e) => {
                log::warn!(
                    "[ModeDetector] Ignoring unreadable install manifest {}: {}",
                    self.manifest_path.display(),
                    e
                );
                return None;
            }
        };

        let path = manifest.install_path.trim();
        if path.is_empty() {
            None
        } else {
            Some(PathBuf::from(path))
        }
    }
}

/// The install probe appropriate for this platform
pub fn platform_probe(config: &UpdateConfig) -> Box<dyn InstallProbe> {
    #[cfg(windows)]
    {
        if config.install_manifest_path.is_none() {
            return Box::new(RegistryInstallProbe::new(
                config.install_registry_key.clone(),
                config.install_registry_value.clone(),
            ));
        }
    }

    let manifest = config
        .install_manifest_path
        .clone()
        .unwrap_or_else(|| ManifestInstallProbe::default_path(&config.product));
    Box::new(ManifestInstallProbe::new(manifest))
}
