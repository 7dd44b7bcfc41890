// Version comparison
// Semantic-version ordering over tags that may carry a leading `v`

use semver::Version;

/// Version of the running build. Set `APP_VERSION` at compile time to override
/// the package version (e.g. with the release tag).
pub const CURRENT_VERSION: &str = match option_env!("APP_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};

/// Strip a single leading `v`/`V` and surrounding whitespace
pub fn normalize(version: &str) -> &str {
    let trimmed = version.trim();
    trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed)
}

/// Parse a possibly `v`-prefixed version string
pub fn parse(version: &str) -> Option<Version> {
    Version::parse(normalize(version)).ok()
}

/// True when `candidate` orders strictly after `current`.
///
/// An unparseable `current` (such as a `dev` build) never compares as older.
pub fn is_newer(candidate: &Version, current: &str) -> bool {
    match parse(current) {
        Some(current) => *candidate > current,
        None => {
            log::warn!(
                "[VersionComparator] Current version {:?} is not semantic, treating as up to date",
                current
            );
            false
        }
    }
}
