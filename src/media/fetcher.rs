//! Concurrent media downloader
//!
//! Downloads every file in an item's media set with a shared concurrency
//! cap. Files are written to a staging directory first and renamed into the
//! artifact directory only once the whole set succeeded; a failed set
//! leaves nothing behind.

use crate::config::MediaConfig;
use crate::media::{MediaError, MediaResult, RetryPolicy};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// A fully downloaded media file, moved into the artifact directory
#[derive(Debug, Clone)]
pub struct MediaArtifact {
    /// Final path under the artifact directory
    pub path: PathBuf,

    /// Size in bytes
    pub bytes: u64,

    /// The URL this artifact was downloaded from
    pub source_url: String,

    /// Attempts consumed for this file (1 = first try succeeded)
    pub attempts: u32,
}

/// The materialized media set of one item
#[derive(Debug)]
pub struct MediaSet {
    /// Artifacts in the same order as the requested URLs
    pub artifacts: Vec<MediaArtifact>,

    /// Total download attempts across the set
    pub total_attempts: u32,
}

/// Downloads media sets with bounded concurrency and retry
pub struct MediaFetcher {
    client: Client,
    policy: RetryPolicy,
    semaphore: Arc<Semaphore>,
    staging_dir: PathBuf,
    artifact_dir: PathBuf,
}

impl MediaFetcher {
    /// Creates a fetcher from the media configuration
    ///
    /// The concurrency cap is shared across all downloads issued through
    /// this fetcher, not per media set.
    pub fn new(client: Client, config: &MediaConfig) -> Self {
        Self {
            client,
            policy: RetryPolicy::from_config(config),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_downloads as usize)),
            staging_dir: PathBuf::from(&config.staging_dir),
            artifact_dir: PathBuf::from(&config.artifact_dir),
        }
    }

    /// Downloads an item's entire media set, all-or-nothing
    ///
    /// # Arguments
    ///
    /// * `source_id` - The item's source id, used to name artifacts
    /// * `urls` - Media URLs in listing order
    ///
    /// # Returns
    ///
    /// * `Ok(MediaSet)` - Every file landed in the artifact directory
    /// * `Err(MediaError)` - At least one file failed; staging was cleaned
    pub async fn fetch_all(&self, source_id: &str, urls: &[String]) -> MediaResult<MediaSet> {
        if urls.is_empty() {
            return Ok(MediaSet {
                artifacts: Vec::new(),
                total_attempts: 0,
            });
        }

        tokio::fs::create_dir_all(&self.staging_dir).await?;
        tokio::fs::create_dir_all(&self.artifact_dir).await?;

        let slug = sanitize_source_id(source_id);

        let mut tasks: JoinSet<(usize, MediaResult<StagedFile>)> = JoinSet::new();
        for (index, url) in urls.iter().enumerate() {
            let client = self.client.clone();
            let policy = self.policy;
            let semaphore = Arc::clone(&self.semaphore);
            let url = url.clone();
            let staging_path = self
                .staging_dir
                .join(format!("{}_{}{}.part", slug, index, extension_of(&url)));

            tasks.spawn(async move {
                // Closed semaphores never occur here; treat acquisition
                // failure as a transient error rather than panicking.
                let result = match semaphore.acquire().await {
                    Ok(_permit) => download_with_retry(&client, &policy, &url, &staging_path).await,
                    Err(e) => Err(MediaError::Transient(e.to_string())),
                };
                (index, result)
            });
        }

        let mut staged: Vec<Option<StagedFile>> = (0..urls.len()).map(|_| None).collect();
        let mut failure: Option<MediaError> = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(file))) => staged[index] = Some(file),
                Ok((_, Err(e))) => {
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
                Err(e) => {
                    if failure.is_none() {
                        failure = Some(MediaError::Transient(format!("Task failed: {}", e)));
                    }
                }
            }
        }

        if let Some(error) = failure {
            // All-or-nothing: remove whatever made it to staging
            for file in staged.into_iter().flatten() {
                let _ = tokio::fs::remove_file(&file.staging_path).await;
            }
            return Err(error);
        }

        // Every file staged; move the set into the artifact directory
        let mut artifacts = Vec::with_capacity(urls.len());
        let mut total_attempts = 0;
        for (index, file) in staged.into_iter().enumerate() {
            let file = match file {
                Some(f) => f,
                None => {
                    return Err(MediaError::Transient(format!(
                        "Missing staged file for index {}",
                        index
                    )))
                }
            };
            let final_path = self
                .artifact_dir
                .join(format!("{}_{}{}", slug, index, extension_of(&file.url)));
            tokio::fs::rename(&file.staging_path, &final_path).await?;

            total_attempts += file.attempts;
            artifacts.push(MediaArtifact {
                path: final_path,
                bytes: file.bytes,
                source_url: file.url,
                attempts: file.attempts,
            });
        }

        Ok(MediaSet {
            artifacts,
            total_attempts,
        })
    }
}

struct StagedFile {
    staging_path: PathBuf,
    url: String,
    bytes: u64,
    attempts: u32,
}

/// Downloads one URL to a staging path, retrying transient failures
async fn download_with_retry(
    client: &Client,
    policy: &RetryPolicy,
    url: &str,
    staging_path: &Path,
) -> MediaResult<StagedFile> {
    let mut last_error = String::new();

    for attempt in 1..=policy.max_attempts {
        match download_once(client, url, staging_path).await {
            Ok(bytes) => {
                return Ok(StagedFile {
                    staging_path: staging_path.to_path_buf(),
                    url: url.to_string(),
                    bytes,
                    attempts: attempt,
                });
            }
            Err(MediaError::Permanent(e)) => {
                tracing::warn!("Permanent failure for {}: {}", url, e);
                return Err(MediaError::Permanent(e));
            }
            Err(e) => {
                last_error = e.to_string();
                if attempt < policy.max_attempts {
                    let delay = policy.delay_for(attempt);
                    tracing::debug!(
                        "Attempt {}/{} failed for {} ({}), retrying in {:?}",
                        attempt,
                        policy.max_attempts,
                        url,
                        last_error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(MediaError::Exhausted {
        attempts: policy.max_attempts,
        last_error,
    })
}

/// Performs a single download attempt, classifying failures
async fn download_once(client: &Client, url: &str, staging_path: &Path) -> MediaResult<u64> {
    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            MediaError::Transient("Request timeout".to_string())
        } else if e.is_connect() {
            MediaError::Transient("Connection failed".to_string())
        } else {
            MediaError::Transient(e.to_string())
        }
    })?;

    let status = response.status();
    if status.is_server_error() || status.as_u16() == 429 {
        return Err(MediaError::Transient(format!("HTTP {}", status.as_u16())));
    }
    if !status.is_success() {
        return Err(MediaError::Permanent(format!("HTTP {}", status.as_u16())));
    }

    // A media URL answering with an HTML page is an error page in disguise
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if content_type.starts_with("text/html") {
        return Err(MediaError::Permanent(format!(
            "Expected media, got {}",
            content_type
        )));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| MediaError::Transient(e.to_string()))?;

    tokio::fs::write(staging_path, &body).await?;
    Ok(body.len() as u64)
}

/// Turns a source id into a filesystem-safe artifact name prefix
fn sanitize_source_id(source_id: &str) -> String {
    source_id
        .trim_matches('/')
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Extracts the file extension (with leading dot) from a URL path
fn extension_of(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit_once('.') {
        Some((_, ext)) if !ext.contains('/') && ext.len() <= 5 && !ext.is_empty() => {
            format!(".{}", ext)
        }
        _ => ".bin".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaConfig;
    use std::time::{Duration, Instant};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn media_config(staging: &Path, artifacts: &Path) -> MediaConfig {
        MediaConfig {
            max_concurrent_downloads: 3,
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
            staging_dir: staging.to_string_lossy().into_owned(),
            artifact_dir: artifacts.to_string_lossy().into_owned(),
        }
    }

    fn fetcher(config: &MediaConfig) -> MediaFetcher {
        let client = Client::builder().build().unwrap();
        MediaFetcher::new(client, config)
    }

    fn jpeg_response() -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "image/jpeg")
            .set_body_bytes(vec![0xFFu8; 64])
    }

    #[tokio::test]
    async fn test_fetch_all_lands_artifacts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.jpg"))
            .respond_with(jpeg_response())
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b.jpg"))
            .respond_with(jpeg_response())
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = media_config(&dir.path().join("staging"), &dir.path().join("artifacts"));
        let urls = vec![
            format!("{}/a.jpg", server.uri()),
            format!("{}/b.jpg", server.uri()),
        ];

        let set = fetcher(&config)
            .fetch_all("/photos/0001.html", &urls)
            .await
            .unwrap();

        assert_eq!(set.artifacts.len(), 2);
        assert_eq!(set.total_attempts, 2);
        for (artifact, url) in set.artifacts.iter().zip(&urls) {
            assert_eq!(&artifact.source_url, url);
            assert!(artifact.path.exists());
            assert_eq!(artifact.bytes, 64);
        }

        // Staging holds nothing once the set landed
        let mut staged = tokio::fs::read_dir(dir.path().join("staging")).await.unwrap();
        assert!(staged.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_media_set_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let config = media_config(&dir.path().join("staging"), &dir.path().join("artifacts"));

        let set = fetcher(&config).fetch_all("/photos/0001.html", &[]).await.unwrap();
        assert!(set.artifacts.is_empty());
        assert_eq!(set.total_attempts, 0);
    }

    #[tokio::test]
    async fn test_transient_failure_retries_then_succeeds() {
        let server = MockServer::start().await;
        // Two 500s, then success
        Mock::given(method("GET"))
            .and(path("/flaky.jpg"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky.jpg"))
            .respond_with(jpeg_response())
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = media_config(&dir.path().join("staging"), &dir.path().join("artifacts"));
        let urls = vec![format!("{}/flaky.jpg", server.uri())];

        let set = fetcher(&config)
            .fetch_all("/photos/0002.html", &urls)
            .await
            .unwrap();

        assert_eq!(set.artifacts.len(), 1);
        assert_eq!(set.artifacts[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down.jpg"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = media_config(&dir.path().join("staging"), &dir.path().join("artifacts"));
        let urls = vec![format!("{}/down.jpg", server.uri())];

        let err = fetcher(&config)
            .fetch_all("/photos/0003.html", &urls)
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::Exhausted { attempts: 3, .. }));
        // Mock's expect(3) verifies exactly max_attempts requests were made
    }

    #[tokio::test]
    async fn test_permanent_failure_does_not_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = media_config(&dir.path().join("staging"), &dir.path().join("artifacts"));
        let urls = vec![format!("{}/gone.jpg", server.uri())];

        let err = fetcher(&config)
            .fetch_all("/photos/0004.html", &urls)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Permanent(_)));
    }

    #[tokio::test]
    async fn test_html_body_is_permanent_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/soft404.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html>not found</html>", "text/html"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = media_config(&dir.path().join("staging"), &dir.path().join("artifacts"));
        let urls = vec![format!("{}/soft404.jpg", server.uri())];

        let err = fetcher(&config)
            .fetch_all("/photos/0005.html", &urls)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Permanent(_)));
    }

    #[tokio::test]
    async fn test_failed_set_leaves_no_artifacts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/good.jpg"))
            .respond_with(jpeg_response())
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bad.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = media_config(&dir.path().join("staging"), &dir.path().join("artifacts"));
        let urls = vec![
            format!("{}/good.jpg", server.uri()),
            format!("{}/bad.jpg", server.uri()),
        ];

        let result = fetcher(&config).fetch_all("/photos/0006.html", &urls).await;
        assert!(result.is_err());

        // Neither artifacts nor staged leftovers exist
        let mut artifacts = tokio::fs::read_dir(dir.path().join("artifacts")).await.unwrap();
        assert!(artifacts.next_entry().await.unwrap().is_none());
        let mut staged = tokio::fs::read_dir(dir.path().join("staging")).await.unwrap();
        assert!(staged.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrency_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(jpeg_response().set_delay(Duration::from_millis(100)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = media_config(&dir.path().join("staging"), &dir.path().join("artifacts"));
        config.max_concurrent_downloads = 2;

        let urls: Vec<_> = (0..6).map(|i| format!("{}/{}.jpg", server.uri(), i)).collect();

        let start = Instant::now();
        fetcher(&config)
            .fetch_all("/photos/0007.html", &urls)
            .await
            .unwrap();

        // 6 downloads at 100ms each through 2 permits take at least 3 waves
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn test_sanitize_source_id() {
        assert_eq!(
            sanitize_source_id("/photos/29054-first.html"),
            "photos_29054-first_html"
        );
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("https://x.com/a/b.jpg"), ".jpg");
        assert_eq!(extension_of("https://x.com/a/b.jpeg?size=full"), ".jpeg");
        assert_eq!(extension_of("https://x.com/a/noext"), ".bin");
    }
}
