//! Image handling infrastructure.
//!
//! This module provides:
//! - Memory caching with weighted LRU eviction
//! - Disk caching with staged, crash-safe writes
//! - Subsampling decode
//! - Async loading on a dedicated worker pool

pub mod disk_cache;
pub mod downscaler;
pub mod fetcher;
pub mod loader;
pub mod memory_cache;
pub mod origin;
pub mod worker_pool;

pub use disk_cache::{DiskImageCache, DiskTier, Transaction};
pub use fetcher::{Fetcher, HttpFetcher};
pub use loader::{ImageLoadedEvent, ImageLoader, ImageLoaderConfig, Request};
pub use memory_cache::{CacheStats, MemoryImageCache};
pub use worker_pool::{PoolSize, WorkerPool};
