use super::app_config::LogLevel;
use crate::domain::entities::Weigher;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "pixloader",
    version,
    about = "Fetch images through a memory, disk and network cache",
    long_about = None
)]
pub struct CliArgs {
    /// Image URLs to load.
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// Requested width in pixels (0 = full size).
    #[arg(long, default_value_t = 0)]
    pub width: u32,

    /// Requested height in pixels (0 = full size).
    #[arg(long, default_value_t = 0)]
    pub height: u32,

    /// Load the whole URL list this many times.
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,

    /// Empty both cache tiers before loading.
    #[arg(long)]
    pub clear_cache: bool,

    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Cache directory.
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Disk tier capacity in bytes.
    #[arg(long)]
    pub disk_cache_size: Option<u64>,

    /// Process memory budget in bytes.
    #[arg(long)]
    pub memory_budget: Option<u64>,

    /// Request timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Memory tier weight function.
    #[arg(long, value_enum)]
    pub weigher: Option<Weigher>,
}
