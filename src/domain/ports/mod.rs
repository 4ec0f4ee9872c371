mod fetch_port;
mod image_cache_port;

pub use fetch_port::{ChunkSink, FetchPort};
pub use image_cache_port::ImageCachePort;
