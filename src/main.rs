use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::Result;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pixloader::domain::entities::{LoadedImage, TargetId};
use pixloader::domain::errors::CacheError;
use pixloader::infrastructure::{
    AppConfig, CliArgs, HttpFetcher, ImageLoader, Request, StorageManager,
};
use pixloader::presentation::{Delivery, TargetBindings};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_names(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let storage = StorageManager::new()?;
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok(config)
}

fn report(round: u32, locator: &str, result: &Result<LoadedImage, CacheError>) {
    match result {
        Ok(loaded) => println!(
            "[{round}] {locator}: {}x{} from {}",
            loaded.image.width(),
            loaded.image.height(),
            loaded.source
        ),
        Err(e) => eprintln!("[{round}] {locator}: {e}"),
    }
}

/// The main thread is the origin context: it queues requests and drains
/// completions but never touches the network.
fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(version = pixloader::VERSION, "Starting pixloader");

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(config.timeout_secs))?);
    let loader = ImageLoader::new(config.loader_config(), &event_tx, fetcher)?;
    loader.initialize(config.memory_budget, config.display_size());

    if args.clear_cache {
        loader.clear_all()?;
    }
    if !loader.disk_available()? {
        warn!("Disk cache unavailable, images will not persist");
    }

    let mut bindings = TargetBindings::new();
    for round in 1..=args.repeat {
        let mut pending = 0usize;
        for (target, locator) in (0u64..).map(TargetId).zip(&args.urls) {
            match bindings.bind_target(&loader, locator, target, args.width, args.height) {
                Ok(Request::Ready(loaded)) => report(round, locator, &Ok(loaded)),
                Ok(Request::Pending) => pending += 1,
                Err(e) => report(round, locator, &Err(e)),
            }
        }

        while pending > 0 {
            let Some(event) = event_rx.blocking_recv() else {
                break;
            };
            pending -= 1;
            let locator = event.locator.clone();
            match bindings.deliver(event) {
                Delivery::Apply(_, result) => report(round, &locator, &result),
                Delivery::Stale => {}
            }
        }
    }

    let stats = loader.memory_cache()?.stats();
    info!(%stats, "Finished");
    println!("{stats}");

    Ok(())
}
