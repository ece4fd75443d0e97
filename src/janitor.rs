//! Periodic cleanup of expired files.
//!
//! Sweeps the temp and output directories on a fixed interval and removes
//! any entry whose mtime is older than the expiry threshold. Runs with no
//! knowledge of active tasks: a download outliving the expiry window can
//! lose its files. Per-entry failures are swallowed and the sweep keeps
//! going.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use crate::core::config;
use crate::core::utils::expand_path;

/// Flag to stop the background janitor (used by tests and shutdown paths)
static STOP_JANITOR: AtomicBool = AtomicBool::new(false);

/// Removes expired entries from one directory. Returns how many were removed.
///
/// Files are removed, directories recursively. Entries whose metadata can't
/// be read are skipped.
pub fn sweep_dir(dir: &Path, expiry: Duration) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    let now = SystemTime::now();
    let mut removed = 0;

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|mtime| now.duration_since(mtime).ok());

        let expired = match age {
            Some(age) => age > expiry,
            None => continue,
        };

        if !expired {
            continue;
        }

        let result = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };

        match result {
            Ok(()) => {
                log::debug!("Janitor removed expired entry: {}", path.display());
                removed += 1;
            }
            Err(e) => {
                log::warn!("Janitor failed to remove {}: {}", path.display(), e);
            }
        }
    }

    removed
}

/// One full sweep over the temp and output directories.
pub fn run_sweep(expiry: Duration) -> usize {
    let temp = expand_path(&config::TEMP_FOLDER);
    let output = expand_path(&config::DOWNLOAD_FOLDER);
    sweep_dir(Path::new(&temp), expiry) + sweep_dir(Path::new(&output), expiry)
}

/// Starts the background janitor task.
///
/// Sweeps every `SWEEP_INTERVAL_SECS` forever; returns the JoinHandle so the
/// caller can await or abort it.
pub fn start_janitor_task() -> tokio::task::JoinHandle<()> {
    STOP_JANITOR.store(false, Ordering::SeqCst);

    tokio::spawn(async move {
        let interval = config::janitor::sweep_interval();

        log::info!(
            "Janitor started (interval: {}s, expiry: {}h)",
            interval.as_secs(),
            *config::janitor::FILE_EXPIRY_HOURS
        );

        loop {
            tokio::time::sleep(interval).await;

            if STOP_JANITOR.load(Ordering::SeqCst) {
                log::info!("Janitor stopped");
                break;
            }

            let removed = run_sweep(config::janitor::file_expiry());
            if removed > 0 {
                log::info!("Janitor removed {} expired entries", removed);
            }
        }
    })
}

/// Requests the background janitor to stop after its current sleep.
pub fn stop_janitor_task() {
    STOP_JANITOR.store(true, Ordering::SeqCst);
}
