//! Image loading orchestrator.
//!
//! Implements a three-tier lookup: Memory -> Disk -> Network. Memory hits are
//! answered synchronously on the origin context; everything else runs on the
//! worker pool and is reported once on the completion channel.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use tokio::sync::{OnceCell, mpsc};
use tracing::{debug, info, trace, warn};

use crate::domain::entities::{
    Bounds, CacheKey, DecodedImage, ImageSource, LoadedImage, TargetId, Weigher,
};
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::{FetchPort, ImageCachePort};

use super::disk_cache::{DEFAULT_MAX_CACHE_SIZE, DiskTier};
use super::downscaler::decode_blocking;
use super::fetcher::{DEFAULT_TIMEOUT_SECS, Fetcher};
use super::memory_cache::{MemoryImageCache, memory_capacity};
use super::origin::{assert_off_origin, mark_origin_context};
use super::worker_pool::{PoolSize, WorkerPool};

/// Message sent when a queued request reaches a terminal state.
#[derive(Debug, Clone)]
pub struct ImageLoadedEvent {
    /// Target the request was made for.
    pub target: TargetId,
    /// Locator that was requested.
    pub locator: String,
    /// The loaded image, or the failure. Never a partial image.
    pub result: Result<LoadedImage, CacheError>,
}

/// Outcome of [`ImageLoader::request`].
#[derive(Debug, Clone)]
pub enum Request {
    /// Served from the memory tier without leaving the origin context.
    Ready(LoadedImage),
    /// Queued; an [`ImageLoadedEvent`] will follow.
    Pending,
}

/// Configuration for the image loader.
#[derive(Debug, Clone)]
pub struct ImageLoaderConfig {
    /// Directory of the disk tier.
    pub disk_cache_dir: PathBuf,
    /// Maximum disk cache size in bytes.
    pub disk_cache_size: u64,
    /// Bumping this discards every disk entry.
    pub cache_version: u32,
    /// Weight function of the memory tier.
    pub weigher: Weigher,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Worker pool thread counts.
    pub pool_size: PoolSize,
}

impl ImageLoaderConfig {
    /// Default configuration with the disk tier in `disk_cache_dir`.
    #[must_use]
    pub fn new(disk_cache_dir: PathBuf) -> Self {
        Self {
            disk_cache_dir,
            disk_cache_size: DEFAULT_MAX_CACHE_SIZE,
            cache_version: 1,
            weigher: Weigher::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            pool_size: PoolSize::detect(),
        }
    }
}

/// Orchestrates image loading from memory, disk, and network.
///
/// Construct once at startup and share it; the caches it owns are the
/// process-wide tiers.
pub struct ImageLoader {
    config: ImageLoaderConfig,
    fetcher: Fetcher,
    handle: OnceLock<LoaderHandle>,
    event_tx: mpsc::UnboundedSender<ImageLoadedEvent>,
    pool: WorkerPool,
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("config", &self.config)
            .field("initialized", &self.handle.get().is_some())
            .finish_non_exhaustive()
    }
}

impl ImageLoader {
    /// Creates a loader and its worker pool. The calling thread becomes the
    /// origin context: it may request and drain, never fetch.
    ///
    /// # Errors
    /// Returns error if the worker pool cannot be started.
    pub fn new(
        config: ImageLoaderConfig,
        event_tx: &mpsc::UnboundedSender<ImageLoadedEvent>,
        fetch_port: Arc<dyn FetchPort>,
    ) -> CacheResult<Self> {
        let pool = WorkerPool::new(config.pool_size)?;
        mark_origin_context();
        Ok(Self {
            config,
            fetcher: Fetcher::new(fetch_port),
            handle: OnceLock::new(),
            event_tx: event_tx.clone(),
            pool,
        })
    }

    /// Sizes the memory tier and arms the disk tier. Only the first call has
    /// an effect.
    ///
    /// The disk tier is opened on the worker pool by the first request that
    /// needs it, and degrades to network-only if there is not enough space.
    pub fn initialize(&self, memory_budget: u64, display: Option<(u32, u32)>) {
        let mut created = false;
        self.handle.get_or_init(|| {
            created = true;
            let capacity = memory_capacity(memory_budget, display);
            info!(
                memory_capacity = capacity,
                disk_dir = %self.config.disk_cache_dir.display(),
                disk_capacity = self.config.disk_cache_size,
                "Image loader initialized"
            );
            LoaderHandle {
                memory: Arc::new(MemoryImageCache::new(capacity, self.config.weigher)),
                disk: Arc::new(OnceCell::new()),
                config: Arc::new(self.config.clone()),
                fetcher: self.fetcher.clone(),
            }
        });
        if !created {
            trace!("Image loader already initialized");
        }
    }

    fn handle(&self) -> CacheResult<&LoaderHandle> {
        self.handle.get().ok_or(CacheError::Uninitialized)
    }

    /// Returns the memory tier.
    ///
    /// # Errors
    /// Returns `Uninitialized` before [`ImageLoader::initialize`].
    pub fn memory_cache(&self) -> CacheResult<Arc<MemoryImageCache>> {
        Ok(Arc::clone(&self.handle()?.memory))
    }

    /// Looks `locator` up for `target`. Memory hits return immediately;
    /// misses are queued on the worker pool and answered on the event channel.
    ///
    /// # Errors
    /// Returns `Uninitialized` before [`ImageLoader::initialize`] and
    /// `InvalidKey` for an empty locator.
    pub fn request(&self, target: TargetId, locator: &str, bounds: Bounds) -> CacheResult<Request> {
        let handle = self.handle()?;
        if locator.is_empty() {
            return Err(CacheError::InvalidKey("empty locator".to_string()));
        }

        let key = CacheKey::for_memory(locator, bounds.width, bounds.height);
        if let Some(image) = handle.memory.get(&key) {
            trace!(target_id = %target, key = %key, "Served from memory cache");
            return Ok(Request::Ready(LoadedImage {
                key,
                image,
                source: ImageSource::MemoryCache,
            }));
        }

        let handle = handle.clone();
        let event_tx = self.event_tx.clone();
        let locator = locator.to_string();
        self.pool.spawn(async move {
            let task_locator = locator.clone();
            let result =
                match tokio::spawn(async move { handle.load_image(&task_locator, bounds).await })
                    .await
                {
                    Ok(result) => result,
                    Err(e) => Err(CacheError::IoError(format!("Load task failed: {e}"))),
                };

            if let Err(e) = &result {
                warn!(target_id = %target, locator = %locator, error = %e, "Image load failed");
            }
            let event = ImageLoadedEvent {
                target,
                locator,
                result,
            };
            if event_tx.send(event).is_err() {
                trace!("Event receiver dropped, discarding result");
            }
        });
        Ok(Request::Pending)
    }

    /// Runs the full lookup chain in the current task.
    ///
    /// # Errors
    /// Returns `Uninitialized`, `InvalidKey`, or the terminal failure of the chain.
    ///
    /// # Panics
    /// Panics on the origin context unless the memory tier answers.
    pub async fn load(&self, locator: &str, bounds: Bounds) -> CacheResult<LoadedImage> {
        let handle = self.handle()?;
        if locator.is_empty() {
            return Err(CacheError::InvalidKey("empty locator".to_string()));
        }
        handle.load_image(locator, bounds).await
    }

    /// Empties both tiers, blocking the calling thread until the disk tier is
    /// cleared on the pool.
    ///
    /// Call before the event loop starts draining completions; the origin
    /// context must not block once it is serving requests.
    ///
    /// # Errors
    /// Returns `Uninitialized` or the disk failure.
    pub fn clear_all(&self) -> CacheResult<()> {
        let handle = self.handle()?.clone();
        handle.memory.evict_all();
        self.pool.run(async move { handle.disk().await.clear().await })??;
        info!("Cleared all image caches");
        Ok(())
    }

    /// Returns whether the disk tier is usable, opening it on the pool if
    /// needed. Blocks the calling thread like [`ImageLoader::clear_all`], so
    /// it belongs in startup code, not in the event loop.
    ///
    /// # Errors
    /// Returns `Uninitialized` before [`ImageLoader::initialize`].
    pub fn disk_available(&self) -> CacheResult<bool> {
        let handle = self.handle()?.clone();
        self.pool
            .run(async move { handle.disk().await.is_available() })
    }
}

/// Shared state for load chains running on the pool.
#[derive(Clone)]
struct LoaderHandle {
    memory: Arc<MemoryImageCache>,
    disk: Arc<OnceCell<DiskTier>>,
    config: Arc<ImageLoaderConfig>,
    fetcher: Fetcher,
}

impl LoaderHandle {
    /// Opens the disk tier on first use.
    ///
    /// # Panics
    /// Panics on the origin context.
    async fn disk(&self) -> &DiskTier {
        assert_off_origin("disk I/O");
        self.disk
            .get_or_init(|| {
                DiskTier::open(
                    self.config.disk_cache_dir.clone(),
                    self.config.disk_cache_size,
                    self.config.cache_version,
                )
            })
            .await
    }

    async fn load_image(&self, locator: &str, bounds: Bounds) -> CacheResult<LoadedImage> {
        let memory_key = CacheKey::for_memory(locator, bounds.width, bounds.height);
        if let Some(image) = self.memory.get(&memory_key) {
            return Ok(loaded(memory_key, image, ImageSource::MemoryCache));
        }

        let disk_key = CacheKey::from_locator(locator);
        let disk = self.disk().await;

        if let Some(image) = self.load_from_disk(disk, &disk_key, &memory_key, bounds).await? {
            debug!(key = %memory_key, source = "disk", "Image loaded");
            return Ok(loaded(memory_key, image, ImageSource::DiskCache));
        }

        match disk.begin_write(&disk_key).await {
            Ok(transaction) => {
                debug!(key = %disk_key, "Downloading image into disk cache");
                self.fetcher
                    .fetch_into_transaction(locator, transaction)
                    .await?;
                let image = self
                    .load_from_disk(disk, &disk_key, &memory_key, bounds)
                    .await?
                    .ok_or_else(|| {
                        CacheError::IoError(format!("{disk_key} evicted before read-back"))
                    })?;
                debug!(key = %memory_key, source = "network", "Image loaded");
                Ok(loaded(memory_key, image, ImageSource::Network))
            }
            Err(e) => {
                if e.is_write_in_progress() {
                    debug!(key = %disk_key, "Entry being written elsewhere, loading without caching to disk");
                } else if disk.is_available() {
                    warn!(key = %disk_key, error = %e, "Cannot stage disk cache write, loading without it");
                }
                let image = self.fetcher.fetch_decoded(locator, bounds).await?;
                self.memory.put(memory_key.clone(), image.clone());
                debug!(key = %memory_key, source = "network", "Image loaded");
                Ok(loaded(memory_key, image, ImageSource::Network))
            }
        }
    }

    /// Decodes a disk entry and promotes it into the memory tier.
    /// A corrupt entry is dropped so the next request refetches it.
    async fn load_from_disk(
        &self,
        disk: &DiskTier,
        disk_key: &CacheKey,
        memory_key: &CacheKey,
        bounds: Bounds,
    ) -> CacheResult<Option<DecodedImage>> {
        let Some(bytes) = disk.read(disk_key).await else {
            return Ok(None);
        };
        match decode_blocking(bytes, bounds).await {
            Ok(image) => {
                self.memory.put(memory_key.clone(), image.clone());
                Ok(Some(image))
            }
            Err(e) => {
                warn!(key = %disk_key, error = %e, "Failed to decode cached image, removing it");
                disk.remove(disk_key).await;
                Err(e)
            }
        }
    }
}

const fn loaded(key: CacheKey, image: DecodedImage, source: ImageSource) -> LoadedImage {
    LoadedImage { key, image, source }
}
