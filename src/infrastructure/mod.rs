//! Infrastructure layer with cache, network and configuration adapters.

/// Application configuration.
pub mod config;
/// Image handling (caching, fetching, loading).
pub mod image;

pub use config::{AppConfig, CliArgs, LogLevel, StorageManager};
pub use image::{
    CacheStats, DiskImageCache, HttpFetcher, ImageLoadedEvent, ImageLoader, ImageLoaderConfig,
    MemoryImageCache, Request,
};
