// Downloader Module
// Streams update artifacts to disk with progress reporting and cancellation

use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::auto_update::UpdateError;

/// Download progress information
#[derive(Debug, Clone, serde::Serialize)]
pub struct DownloadProgress {
    /// Bytes downloaded so far
    pub bytes_downloaded: u64,
    /// Total bytes to download (if known)
    pub total_bytes: Option<u64>,
    /// Download progress as percentage (0.0 - 100.0)
    pub percentage: f32,
}

/// Progress callback type for download operations
pub type ProgressCallback = Box<dyn Fn(DownloadProgress) + Send + Sync>;

/// File downloader streaming response bodies straight to disk
pub struct Downloader {
    http_client: Client,
}

impl Downloader {
    /// Create a new Downloader instance
    ///
    /// No request timeout is set; callers bound downloads with their cancellation token.
    pub fn new(user_agent: &str) -> Result<Self, UpdateError> {
        let http_client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| UpdateError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }

    /// Download `url` to `dest_path`.
    ///
    /// On failure the destination may hold a partial file; it lives in a disposable
    /// workspace and is not cleaned up here.
    ///
    /// # Errors
    /// * `Network` - transport failure
    /// * `DownloadFailed` - non-success HTTP status
    /// * `FileSystem` - destination could not be created or written
    /// * `Cancelled` - the token fired before completion
    pub async fn download(
        &self,
        url: &str,
        dest_path: &Path,
        cancel: &CancellationToken,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<PathBuf, UpdateError> {
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        // Create parent directories if they don't exist
        if let Some(parent) = dest_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| UpdateError::FileSystem(format!("Failed to create directory: {}", e)))?;
        }

        log::info!("[Downloader] Downloading {} -> {}", url, dest_path.display());

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UpdateError::Cancelled),
            result = self.http_client.get(url).send() => result.map_err(|e| {
                if e.is_connect() {
                    UpdateError::Network(format!("Connection failed: {}", e))
                } else {
                    UpdateError::Network(format!("Request failed: {}", e))
                }
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            log::warn!("[Downloader] {} answered HTTP {}", url, status.as_u16());
            return Err(UpdateError::DownloadFailed {
                status_code: status.as_u16(),
            });
        }

        let total_bytes = response.content_length();

        let mut file = File::create(dest_path)
            .await
            .map_err(|e| UpdateError::FileSystem(format!("Failed to create file: {}", e)))?;

        let mut bytes_downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::info!("[Downloader] Cancelled after {} bytes", bytes_downloaded);
                    return Err(UpdateError::Cancelled);
                }
                next = stream.next() => next,
            };
            let Some(chunk_result) = next else { break };

            let chunk = chunk_result
                .map_err(|e| UpdateError::Network(format!("Failed to read chunk: {}", e)))?;

            file.write_all(&chunk)
                .await
                .map_err(|e| UpdateError::FileSystem(format!("Failed to write chunk: {}", e)))?;

            bytes_downloaded += chunk.len() as u64;

            if let Some(ref callback) = progress_callback {
                callback(DownloadProgress {
                    bytes_downloaded,
                    total_bytes,
                    percentage: percentage(bytes_downloaded, total_bytes),
                });
            }
        }

        // Ensure all data is flushed to disk
        file.flush()
            .await
            .map_err(|e| UpdateError::FileSystem(format!("Failed to flush file: {}", e)))?;

        log::info!("[Downloader] Finished {} ({} bytes)", dest_path.display(), bytes_downloaded);
        Ok(dest_path.to_path_buf())
    }
}

fn percentage(bytes_downloaded: u64, total_bytes: Option<u64>) -> f32 {
    match total_bytes {
        Some(total) if total > 0 => ((bytes_downloaded as f32 / total as f32) * 100.0).min(100.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn downloader() -> Downloader {
        Downloader::new("downloader-test").unwrap()
    }

    #[test]
    fn test_percentage_calculation() {
        assert!((percentage(500, Some(1000)) - 50.0).abs() < f32::EPSILON);
        assert!((percentage(1000, Some(1000)) - 100.0).abs() < f32::EPSILON);
        assert_eq!(percentage(500, Some(0)), 0.0);
        assert_eq!(percentage(500, None), 0.0);
    }

    #[tokio::test]
    async fn test_download_writes_body_and_reports_progress() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/artifact.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("artifact.bin");

        let last_bytes = Arc::new(AtomicU64::new(0));
        let last_bytes_clone = Arc::clone(&last_bytes);
        let callback: ProgressCallback = Box::new(move |progress| {
            last_bytes_clone.store(progress.bytes_downloaded, Ordering::SeqCst);
        });

        let path = downloader()
            .download(
                &format!("{}/artifact.bin", server.uri()),
                &dest,
                &CancellationToken::new(),
                Some(callback),
            )
            .await
            .unwrap();

        assert_eq!(path, dest);
        assert_eq!(std::fs::read(&dest).unwrap().len(), 4096);
        assert_eq!(last_bytes.load(Ordering::SeqCst), 4096);
    }

    #[tokio::test]
    async fn test_download_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let result = downloader()
            .download(
                &format!("{}/missing.zip", server.uri()),
                &dir.path().join("missing.zip"),
                &CancellationToken::new(),
                None,
            )
            .await;

        assert_eq!(result, Err(UpdateError::DownloadFailed { status_code: 404 }));
    }

    #[tokio::test]
    async fn test_download_network_error() {
        let dir = tempfile::tempdir().unwrap();

        // Nothing listens on port 9 (discard) locally
        let result = downloader()
            .download(
                "http://127.0.0.1:9/nonexistent.txt",
                &dir.path().join("test.txt"),
                &CancellationToken::new(),
                None,
            )
            .await;

        match result {
            Err(UpdateError::Network(_)) => {}
            other => panic!("Expected network error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_download_pre_cancelled_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let dir = tempfile::tempdir().unwrap();
        let result = downloader()
            .download(
                &format!("{}/a.zip", server.uri()),
                &dir.path().join("a.zip"),
                &cancel,
                None,
            )
            .await;

        assert_eq!(result, Err(UpdateError::Cancelled));
    }

    #[tokio::test]
    async fn test_download_cancelled_mid_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![1u8; 16])
                    .set_delay(std::time::Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let dir = tempfile::tempdir().unwrap();
        let started = std::time::Instant::now();
        let result = downloader()
            .download(
                &format!("{}/slow.zip", server.uri()),
                &dir.path().join("slow.zip"),
                &cancel,
                None,
            )
            .await;

        assert_eq!(result, Err(UpdateError::Cancelled));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}
