//! Port definition for network retrieval.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::errors::{CacheResult, FetchError};

/// Destination for streamed response bytes.
#[async_trait]
pub trait ChunkSink: Send {
    /// Appends a chunk.
    async fn write_chunk(&mut self, chunk: &[u8]) -> CacheResult<()>;
}

/// Port for retrieving raw bytes for a resource locator.
#[async_trait]
pub trait FetchPort: Send + Sync {
    /// Downloads the full response body.
    async fn fetch(&self, locator: &str) -> Result<Bytes, FetchError>;

    /// Streams the response body into `sink`, returning the byte count.
    ///
    /// The default buffers the whole body; network adapters should stream.
    async fn fetch_into(&self, locator: &str, sink: &mut dyn ChunkSink) -> CacheResult<u64> {
        let bytes = self.fetch(locator).await?;
        sink.write_chunk(&bytes).await?;
        Ok(bytes.len() as u64)
    }
}
