//! Network retrieval of raw image bytes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::domain::entities::{Bounds, DecodedImage};
use crate::domain::errors::{CacheError, CacheResult, FetchError};
use crate::domain::ports::{ChunkSink, FetchPort};

use super::disk_cache::Transaction;
use super::downscaler::decode_blocking;
use super::origin::assert_off_origin;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP adapter for [`FetchPort`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher whose requests time out after `timeout`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(timeout: Duration) -> CacheResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                FetchError::Connection(format!("Failed to create HTTP client: {e}"))
            })?;
        Ok(Self { client })
    }

    async fn send(&self, locator: &str) -> Result<reqwest::Response, FetchError> {
        let response = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        if !response.status().is_success() {
            return Err(FetchError::MalformedResponse(format!(
                "HTTP {}: {}",
                response.status(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl FetchPort for HttpFetcher {
    async fn fetch(&self, locator: &str) -> Result<Bytes, FetchError> {
        self.send(locator)
            .await?
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))
    }

    async fn fetch_into(&self, locator: &str, sink: &mut dyn ChunkSink) -> CacheResult<u64> {
        let mut response = self.send(locator).await?;
        let mut total = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?
        {
            sink.write_chunk(&chunk).await?;
            total += chunk.len() as u64;
        }
        Ok(total)
    }
}

/// Fetch operations used by the loader, guarded against running on the
/// origin context.
#[derive(Clone)]
pub struct Fetcher {
    port: Arc<dyn FetchPort>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher").finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Wraps a fetch adapter.
    #[must_use]
    pub fn new(port: Arc<dyn FetchPort>) -> Self {
        Self { port }
    }

    /// Downloads the full body of `locator`.
    ///
    /// # Errors
    /// Returns the classified network failure.
    ///
    /// # Panics
    /// Panics when called on the origin context.
    pub async fn fetch(&self, locator: &str) -> Result<Bytes, FetchError> {
        assert_off_origin("network fetch");
        self.port.fetch(locator).await
    }

    /// Streams `locator` into `transaction`, committing on success and
    /// aborting on any failure.
    ///
    /// # Errors
    /// Returns the network or I/O failure; the entry's prior state is kept.
    ///
    /// # Panics
    /// Panics when called on the origin context.
    pub async fn fetch_into_transaction(
        &self,
        locator: &str,
        mut transaction: Transaction,
    ) -> CacheResult<u64> {
        assert_off_origin("network fetch");
        let key = transaction.key().clone();
        match self.port.fetch_into(locator, &mut transaction).await {
            Ok(_) => {
                let written = transaction.commit().await?;
                debug!(key = %key, written, "Fetched into disk cache");
                Ok(written)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Fetch failed, aborting disk cache write");
                transaction.abort();
                Err(e)
            }
        }
    }

    /// Downloads and decodes `locator` without persisting it.
    ///
    /// # Errors
    /// Returns the network or decode failure.
    ///
    /// # Panics
    /// Panics when called on the origin context.
    pub async fn fetch_decoded(&self, locator: &str, bounds: Bounds) -> CacheResult<DecodedImage> {
        let bytes = self.fetch(locator).await.map_err(CacheError::from)?;
        decode_blocking(bytes, bounds).await
    }
}
