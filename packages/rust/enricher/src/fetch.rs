//! Page fetching.
//!
//! [`PageFetcher`] is the seam between the enrichment engine and the network:
//! production uses [`HttpFetcher`], tests substitute scripted fetchers.

use std::future::Future;

use bookmark_reorg_shared::{EnrichConfig, FetchError, PageMetadata, ReorgError, Result};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use tracing::debug;
use url::Url;

use crate::extract::extract_metadata;

/// Outcome of fetching a single page.
pub type FetchResult = std::result::Result<PageMetadata, FetchError>;

/// Fetches one URL and extracts its page metadata.
pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = FetchResult> + Send;
}

/// HTTP fetcher backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    tag_limit: usize,
}

impl HttpFetcher {
    pub fn new(config: &EnrichConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .redirect(Policy::limited(10))
            .build()
            .map_err(|e| ReorgError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            tag_limit: config.tag_limit,
        })
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchResult {
        let target = Url::parse(url)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| FetchError::InvalidUrl { url: url.to_string() })?;

        debug!(%url, "fetching page");
        let response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.to_ascii_lowercase().contains("text/html") {
            return Err(FetchError::NotHtml {
                url: url.to_string(),
                content_type,
            });
        }

        let body = response.text().await.map_err(|e| transport_error(url, e))?;
        Ok(extract_metadata(&body, self.tag_limit))
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout { url: url.to_string() }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}
