use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::FailureReason;

const USER_AGENT: &str = concat!("audio-quiz/", env!("CARGO_PKG_VERSION"));

/// Retrieves the compressed bytes behind a clip URL
#[async_trait]
pub trait ClipFetcher: Send + Sync {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>, FailureReason>;
}

/// Fetches `http(s)://` URLs over the network and everything else from disk
pub struct SourceFetcher {
    http_client: reqwest::Client,
}

impl SourceFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FailureReason> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FailureReason::Fetch(e.to_string()))?;

        Ok(Self { http_client })
    }

    async fn fetch_http(&self, url: &str) -> Result<Vec<u8>, FailureReason> {
        log::debug!("Downloading clip {}", url);
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| FailureReason::Fetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| FailureReason::Fetch(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FailureReason::Fetch(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn fetch_file(&self, path: &Path) -> Result<Vec<u8>, FailureReason> {
        tokio::fs::read(path)
            .await
            .map_err(|e| FailureReason::Fetch(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl ClipFetcher for SourceFetcher {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>, FailureReason> {
        match classify(source) {
            SourceKind::Http => self.fetch_http(source).await,
            SourceKind::File(path) => self.fetch_file(Path::new(path)).await,
            SourceKind::Unsupported(scheme) => Err(FailureReason::Fetch(format!(
                "unsupported URL scheme '{}'",
                scheme
            ))),
        }
    }
}

#[derive(Debug, PartialEq)]
enum SourceKind<'a> {
    Http,
    File(&'a str),
    Unsupported(&'a str),
}

fn classify(source: &str) -> SourceKind<'_> {
    if source.starts_with("http://") || source.starts_with("https://") {
        return SourceKind::Http;
    }
    if let Some(path) = source.strip_prefix("file://") {
        return SourceKind::File(path);
    }
    match source.split_once("://") {
        Some((scheme, _)) => SourceKind::Unsupported(scheme),
        None => SourceKind::File(source),
    }
}
