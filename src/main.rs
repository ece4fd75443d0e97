use anyhow::Result;
use dotenvy::dotenv;

use vidra::core::utils::expand_path;
use vidra::core::{config, init_logger};
use vidra::janitor;
use vidra::web::{self, AppState};

/// Main entry point for the download service
///
/// # Errors
/// Returns an error if initialization fails (logging, directories, listener).
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();

    // Initialize logger (console + file)
    init_logger(&config::LOG_FILE_PATH)?;

    // Catch panics from spawned tasks so a broken worker can't take the
    // process down silently
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    let download_dir = expand_path(&config::DOWNLOAD_FOLDER);
    let temp_dir = expand_path(&config::TEMP_FOLDER);
    std::fs::create_dir_all(&download_dir)?;
    std::fs::create_dir_all(&temp_dir)?;

    log::info!("Output folder: {}", download_dir);
    log::info!("Temp folder: {}", temp_dir);
    log::info!(
        "Configured max concurrent downloads: {} (advisory)",
        *config::download::MAX_CONCURRENT_DOWNLOADS
    );

    // Background cleanup of expired files
    janitor::start_janitor_task();

    let state = AppState::new();
    web::serve(*config::PORT, state).await
}
