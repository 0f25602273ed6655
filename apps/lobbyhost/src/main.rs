//! lobbyhost entry point.

mod app;
mod config;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Configuration first: it carries the default log level.
    let path = config::Config::path_from(
        std::env::args().nth(1),
        std::env::var(config::CONFIG_ENV).ok(),
    );
    let loaded = config::Config::load(&path);

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&loaded.config.log_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting lobbyhost");
    if let Some(warning) = &loaded.warning {
        tracing::warn!(path = %loaded.path.display(), "{warning}, using defaults");
    }
    tracing::info!(path = %loaded.path.display(), "configuration loaded");

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(loaded.config))?;

    tracing::info!("lobbyhost shut down cleanly");
    Ok(())
}
