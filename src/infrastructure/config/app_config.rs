//! Application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::entities::Weigher;
use crate::infrastructure::image::ImageLoaderConfig;
use crate::infrastructure::image::disk_cache::DEFAULT_MAX_CACHE_SIZE;
use crate::infrastructure::image::fetcher::DEFAULT_TIMEOUT_SECS;

pub(super) const APP_NAME: &str = "pixloader";
pub(super) const APP_QUALIFIER: &str = "com";
pub(super) const APP_ORGANIZATION: &str = "linuxmobile";

/// Subdirectory of the cache directory holding the disk tier.
const BITMAP_CACHE_DIR: &str = "bitmap";

/// Default process memory budget handed to the memory tier sizing.
pub const DEFAULT_MEMORY_BUDGET: u64 = 256 * 1024 * 1024;

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Display size used to cap the memory tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Cache directory; the platform cache directory when unset.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Disk tier capacity in bytes.
    #[serde(default = "default_disk_cache_size")]
    pub disk_cache_size: u64,

    /// Process memory budget in bytes; the memory tier gets an eighth.
    #[serde(default = "default_memory_budget")]
    pub memory_budget: u64,

    /// Display size, if known.
    #[serde(default)]
    pub display: Option<DisplayConfig>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How decoded images are weighed in the memory tier.
    #[serde(default)]
    pub weigher: Weigher,

    /// Bumping this discards the disk tier on next start.
    #[serde(default = "default_cache_version")]
    pub cache_version: u32,
}

const fn default_disk_cache_size() -> u64 {
    DEFAULT_MAX_CACHE_SIZE
}

const fn default_memory_budget() -> u64 {
    DEFAULT_MEMORY_BUDGET
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_cache_version() -> u32 {
    1
}

use super::args::CliArgs;

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.cache_dir = Some(cache_dir.clone());
        }
        if let Some(disk_cache_size) = args.disk_cache_size {
            self.disk_cache_size = disk_cache_size;
        }
        if let Some(memory_budget) = args.memory_budget {
            self.memory_budget = memory_budget;
        }
        if let Some(timeout_secs) = args.timeout_secs {
            self.timeout_secs = timeout_secs;
        }
        if let Some(weigher) = args.weigher {
            self.weigher = weigher;
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("pixloader.log"))
    }

    /// Returns the platform cache directory, or the temp dir without one.
    #[must_use]
    pub fn default_cache_dir() -> PathBuf {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME).map_or_else(
            || std::env::temp_dir().join(APP_NAME),
            |dirs| dirs.cache_dir().to_path_buf(),
        )
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }

    /// Returns the directory of the disk tier.
    #[must_use]
    pub fn disk_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(Self::default_cache_dir)
            .join(BITMAP_CACHE_DIR)
    }

    /// Returns the display size as a pair.
    #[must_use]
    pub fn display_size(&self) -> Option<(u32, u32)> {
        self.display.map(|d| (d.width, d.height))
    }

    /// Builds the loader configuration.
    #[must_use]
    pub fn loader_config(&self) -> ImageLoaderConfig {
        let mut config = ImageLoaderConfig::new(self.disk_cache_dir());
        config.disk_cache_size = self.disk_cache_size;
        config.cache_version = self.cache_version;
        config.weigher = self.weigher;
        config.timeout_secs = self.timeout_secs;
        config
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::Info,
            cache_dir: None,
            disk_cache_size: DEFAULT_MAX_CACHE_SIZE,
            memory_budget: DEFAULT_MEMORY_BUDGET,
            display: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            weigher: Weigher::default(),
            cache_version: default_cache_version(),
        }
    }
}
