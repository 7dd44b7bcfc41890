// Release Source
// Queries the release registry (GitHub Releases API) for the newest release
// carrying an asset for this platform

use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::auto_update::platform::AssetFilter;
use crate::auto_update::{ReleaseAsset, ReleaseMetadata, UpdateConfig, UpdateError};

/// Release entry as returned by `GET /repos/{owner}/{repo}/releases`
#[derive(Debug, Clone, Deserialize)]
struct RegistryRelease {
    tag_name: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    assets: Vec<RegistryAsset>,
}

#[derive(Debug, Clone, Deserialize)]
struct RegistryAsset {
    name: String,
    browser_download_url: String,
}

/// HTTP client for the release registry
pub struct ReleaseSource {
    /// Base URL of the registry API
    api_base_url: String,
    http_client: Client,
    /// Bearer token, if any
    api_token: Option<String>,
    include_prereleases: bool,
}

impl ReleaseSource {
    /// Create a release source
    ///
    /// # Errors
    /// `Configuration` if the HTTP client cannot be built
    pub fn new(api_base_url: &str, user_agent: &str) -> Result<Self, UpdateError> {
        let http_client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| UpdateError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            http_client,
            api_token: None,
            include_prereleases: false,
        })
    }

    /// Create a release source from UpdateConfig
    pub fn from_config(config: &UpdateConfig, user_agent: &str) -> Result<Self, UpdateError> {
        let mut source = Self::new(&config.api_base_url, user_agent)?;
        source.api_token = config
            .api_token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|token| !token.trim().is_empty());
        source.include_prereleases = config.include_prereleases;
        Ok(source)
    }

    /// Find the newest release for `owner/repo` with at least one asset accepted by `filter`.
    ///
    /// Returns `Ok(None)` when no release carries a matching asset.
    ///
    /// # Errors
    /// * `UpdateCheckFailed` - transport failure, non-success status or malformed response
    /// * `Cancelled` - the token fired before or during the request
    pub async fn find_latest(
        &self,
        slug: &str,
        filter: &AssetFilter,
        cancel: &CancellationToken,
    ) -> Result<Option<ReleaseMetadata>, UpdateError> {
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        let url = format!("{}/repos/{}/releases", self.api_base_url, slug);
        log::debug!("[ReleaseSource] GET {}", url);

        let mut request = self
            .http_client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UpdateError::Cancelled),
            result = request.send() => result.map_err(|e| {
                if e.is_connect() {
                    UpdateError::UpdateCheckFailed(format!("Connection failed: {}", e))
                } else {
                    UpdateError::UpdateCheckFailed(format!("Request failed: {}", e))
                }
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            return Err(UpdateError::UpdateCheckFailed(match status_code {
                404 => format!("Repository {} not found", slug),
                403 | 429 => format!("Registry rate limit or access denied (HTTP {})", status_code),
                _ => format!("HTTP {}", status_code),
            }));
        }

        let releases: Vec<RegistryRelease> = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UpdateError::Cancelled),
            body = response.json() => body.map_err(|e| {
                UpdateError::UpdateCheckFailed(format!("Failed to parse releases: {}", e))
            })?,
        };

        log::debug!("[ReleaseSource] {} release(s) listed for {}", releases.len(), slug);
        Ok(self.select_latest(releases, filter))
    }

    /// Pick the highest-versioned eligible release
    fn select_latest(
        &self,
        releases: Vec<RegistryRelease>,
        filter: &AssetFilter,
    ) -> Option<ReleaseMetadata> {
        releases
            .into_iter()
            .filter(|release| !release.draft)
            .filter(|release| self.include_prereleases || !release.prerelease)
            .filter_map(|release| {
                let version = match crate::auto_update::version::parse(&release.tag_name) {
                    Some(version) => version,
                    None => {
                        log::debug!("[ReleaseSource] Skipping non-semver tag {}", release.tag_name);
                        return None;
                    }
                };
                let assets: Vec<ReleaseAsset> = release
                    .assets
                    .into_iter()
                    .filter(|asset| filter.matches(&asset.name))
                    .map(|asset| ReleaseAsset {
                        name: asset.name,
                        download_url: asset.browser_download_url,
                    })
                    .collect();
                if assets.is_empty() {
                    return None;
                }
                Some(ReleaseMetadata {
                    version,
                    release_notes: release.body.unwrap_or_default(),
                    release_url: release.html_url,
                    assets,
                })
            })
            .max_by(|a, b| a.version.cmp(&b.version))
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.api_base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(tag: &str, assets: &[&str]) -> RegistryRelease {
        RegistryRelease {
            tag_name: tag.to_string(),
            body: Some(format!("notes for {}", tag)),
            html_url: format!("https://example.com/releases/{}", tag),
            draft: false,
            prerelease: false,
            assets: assets
                .iter()
                .map(|name| RegistryAsset {
                    name: name.to_string(),
                    browser_download_url: format!("https://example.com/dl/{}", name),
                })
                .collect(),
        }
    }

    fn source() -> ReleaseSource {
        ReleaseSource::new("http://localhost:3030/", "test-agent").unwrap()
    }

    fn filter() -> AssetFilter {
        AssetFilter::new("wails-demo", "windows", "amd64").unwrap()
    }

    #[test]
    fn test_new_source_trims_trailing_slash() {
        assert_eq!(source().base_url(), "http://localhost:3030");
    }

    #[test]
    fn test_select_latest_picks_highest_matching_version() {
        let releases = vec![
            release("v1.0.0", &["wails-demo_windows_amd64.zip"]),
            release("v1.2.0", &["wails-demo-windows-amd64.zip", "checksums.txt"]),
            release("v1.1.0", &["wails-demo_windows_amd64.zip"]),
        ];

        let latest = source().select_latest(releases, &filter()).unwrap();
        assert_eq!(latest.version, semver::Version::new(1, 2, 0));
        assert_eq!(latest.assets.len(), 1);
        assert_eq!(latest.assets[0].name, "wails-demo-windows-amd64.zip");
        assert_eq!(latest.release_notes, "notes for v1.2.0");
    }

    #[test]
    fn test_select_latest_skips_releases_without_matching_asset() {
        let releases = vec![
            release("v2.0.0", &["wails-demo_linux_amd64.zip"]),
            release("v1.5.0", &["wails-demo_windows_amd64.zip"]),
        ];

        let latest = source().select_latest(releases, &filter()).unwrap();
        assert_eq!(latest.version, semver::Version::new(1, 5, 0));
    }

    #[test]
    fn test_select_latest_ignores_checksum_sidecars() {
        let releases = vec![release(
            "v1.3.0",
            &["wails-demo_windows_amd64.zip.sha256", "wails-demo_windows_amd64.zip"],
        )];

        let latest = source().select_latest(releases, &filter()).unwrap();
        assert_eq!(latest.assets.len(), 1);
        assert_eq!(
            latest.primary_asset().unwrap().name,
            "wails-demo_windows_amd64.zip"
        );
    }

    #[test]
    fn test_select_latest_none_when_nothing_matches() {
        let releases = vec![release("v2.0.0", &["wails-demo_darwin_arm64.zip"])];
        assert!(source().select_latest(releases, &filter()).is_none());
    }

    #[test]
    fn test_select_latest_skips_drafts_prereleases_and_bad_tags() {
        let mut draft = release("v3.0.0", &["wails-demo_windows_amd64.zip"]);
        draft.draft = true;
        let mut pre = release("v2.0.0-beta.1", &["wails-demo_windows_amd64.zip"]);
        pre.prerelease = true;
        let nightly = release("nightly", &["wails-demo_windows_amd64.zip"]);
        let stable = release("v1.0.0", &["wails-demo_windows_amd64.zip"]);

        let latest = source()
            .select_latest(vec![draft, pre, nightly, stable], &filter())
            .unwrap();
        assert_eq!(latest.version, semver::Version::new(1, 0, 0));
    }

    #[test]
    fn test_select_latest_includes_prereleases_when_enabled() {
        let mut pre = release("v2.0.0-beta.1", &["wails-demo_windows_amd64.zip"]);
        pre.prerelease = true;
        let stable = release("v1.0.0", &["wails-demo_windows_amd64.zip"]);

        let mut source = source();
        source.include_prereleases = true;
        let latest = source.select_latest(vec![stable, pre], &filter()).unwrap();
        assert_eq!(latest.version.to_string(), "2.0.0-beta.1");
    }

    #[tokio::test]
    async fn test_find_latest_respects_cancelled_token() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = source()
            .find_latest("keepon-online/wails-demo", &filter(), &cancel)
            .await;
        assert_eq!(result, Err(UpdateError::Cancelled));
    }
}
