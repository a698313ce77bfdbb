//! Description document fetch boundary and tree construction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{DeviceError, FetchError};
use crate::parse;
use crate::registry::DeviceRegistry;
use crate::tree::{DeviceTree, DiscoveryInfo, SharedTree};

/// A fetched description document: raw body plus response headers.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Raw document bytes
    pub body: Vec<u8>,
    /// Response headers, lower-fidelity string map
    pub headers: HashMap<String, String>,
}

/// Transport used to fetch description documents.
///
/// One attempt per call; retry policy is the caller's concern and the tree
/// build never retries.
#[async_trait]
pub trait DescriptionFetcher: Send + Sync {
    /// Fetch the document at `url`.
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError>;
}

/// reqwest-backed fetcher with a 10 second request timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create the fetcher and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Network` if the client cannot be constructed.
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DescriptionFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(format!("Failed to fetch {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(format!("Failed to read body of {url}: {e}")))?
            .to_vec();

        Ok(FetchedDocument { body, headers })
    }
}

/// Build the description tree for an announced root device.
///
/// Fetches the description at `info.location` once (the single asynchronous
/// suspension point), then parses the whole hierarchy synchronously. Nodes
/// register their constituents as they attach, so completion reports can
/// start flowing the moment this returns.
///
/// # Errors
///
/// A fetch or root-parse failure yields no tree at all; the device simply
/// never reports completion and nothing is retried here.
pub async fn build_tree(
    info: DiscoveryInfo,
    fetcher: &dyn DescriptionFetcher,
    registry: Arc<dyn DeviceRegistry>,
) -> Result<SharedTree, DeviceError> {
    let location = info.location.clone();
    debug!("fetching device description from {location}");

    let document = fetcher.fetch(&location).await.map_err(|e| {
        warn!("error getting device description from {location}: {e}");
        DeviceError::from(e)
    })?;

    let mut tree = DeviceTree::new(info, registry);
    parse::parse_description(&mut tree, &document.body)?;
    Ok(tree.shared())
}
