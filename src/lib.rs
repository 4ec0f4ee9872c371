//! Pixloader - tiered image fetching and caching.
//!
//! Images are looked up in a size-weighted memory cache, then a crash-safe
//! disk cache, then the network. Misses are served on a dedicated worker
//! pool and reported on a single-consumer completion channel.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing cache tiers, the fetcher, and configuration.
pub mod infrastructure;
/// Presentation layer binding display targets to loaded images.
pub mod presentation;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "pixloader";
