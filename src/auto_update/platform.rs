// Platform identifiers
// OS/arch names follow the release asset naming used by the build pipeline
// (windows/darwin/linux, amd64/arm64/386)

use regex::Regex;

use crate::auto_update::UpdateError;

/// Operating system identifier used in asset names
pub fn os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "darwin"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        std::env::consts::OS
    }
}

/// Architecture identifier used in asset names
pub fn arch_name() -> &'static str {
    if cfg!(target_arch = "x86_64") {
        "amd64"
    } else if cfg!(target_arch = "aarch64") {
        "arm64"
    } else if cfg!(target_arch = "x86") {
        "386"
    } else {
        std::env::consts::ARCH
    }
}

/// `<os>/<arch>` string reported to the host
pub fn platform_info() -> String {
    format!("{}/{}", os_name(), arch_name())
}

/// Matches release assets built for one product/os/arch triple
#[derive(Debug, Clone)]
pub struct AssetFilter {
    pattern: Regex,
}

impl AssetFilter {
    /// Filter for asset names that are exactly `<product>[-_]<os>[-_]<arch>.zip`
    pub fn new(product: &str, os: &str, arch: &str) -> Result<Self, UpdateError> {
        let pattern = format!(
            r"^{}[-_]{}[-_]{}\.zip$",
            regex::escape(product),
            regex::escape(os),
            regex::escape(arch)
        );
        let pattern = Regex::new(&pattern)
            .map_err(|e| UpdateError::Configuration(format!("Invalid asset filter: {}", e)))?;
        Ok(Self { pattern })
    }

    /// Filter for the platform this binary was built for
    pub fn for_current_platform(product: &str) -> Result<Self, UpdateError> {
        Self::new(product, os_name(), arch_name())
    }

    pub fn matches(&self, asset_name: &str) -> bool {
        self.pattern.is_match(asset_name)
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}
