use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Configuration constants for the service
/// Cached yt-dlp binary path
/// Read once at startup from YTDL_BIN environment variable or defaults to "yt-dlp"
pub static YTDL_BIN: Lazy<String> = Lazy::new(|| env::var("YTDL_BIN").unwrap_or_else(|_| "yt-dlp".to_string()));

/// Cached ffmpeg binary path
/// Read from FFMPEG_BIN environment variable or defaults to "ffmpeg"
pub static FFMPEG_BIN: Lazy<String> = Lazy::new(|| env::var("FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".to_string()));

/// Listening port for the HTTP server
/// Read from PORT environment variable
/// Default: 8080
pub static PORT: Lazy<u16> = Lazy::new(|| {
    env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080)
});

/// Permanent output folder for completed downloads
/// Read from DOWNLOAD_FOLDER environment variable
/// Supports tilde (~) expansion for home directory
pub static DOWNLOAD_FOLDER: Lazy<String> =
    Lazy::new(|| env::var("DOWNLOAD_FOLDER").unwrap_or_else(|_| "downloads".to_string()));

/// Working directory for in-flight downloads, keyed by task id
/// Read from TEMP_FOLDER environment variable
pub static TEMP_FOLDER: Lazy<String> = Lazy::new(|| env::var("TEMP_FOLDER").unwrap_or_else(|_| "temp".to_string()));

/// History log file path
/// Read from HISTORY_FILE environment variable
/// Default: download_history.json
pub static HISTORY_FILE: Lazy<String> =
    Lazy::new(|| env::var("HISTORY_FILE").unwrap_or_else(|_| "download_history.json".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: vidra.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "vidra.log".to_string()));

/// Download configuration
pub mod download {
    use super::{env, Duration, Lazy};

    /// Maximum number of concurrent downloads.
    ///
    /// Carried for operators but not enforced by the worker spawner; each
    /// accepted request gets its own task. See DESIGN.md.
    pub static MAX_CONCURRENT_DOWNLOADS: Lazy<usize> = Lazy::new(|| {
        env::var("MAX_CONCURRENT_DOWNLOADS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3)
    });

    /// Timeout for yt-dlp metadata queries (in seconds)
    pub const INFO_TIMEOUT_SECS: u64 = 60;

    /// Timeout for the ffmpeg audio transcode fallback (in seconds)
    pub const TRANSCODE_TIMEOUT_SECS: u64 = 300; // 5 minutes

    /// Metadata query timeout duration
    pub fn info_timeout() -> Duration {
        Duration::from_secs(INFO_TIMEOUT_SECS)
    }

    /// Transcode timeout duration
    pub fn transcode_timeout() -> Duration {
        Duration::from_secs(TRANSCODE_TIMEOUT_SECS)
    }
}

/// Janitor configuration
pub mod janitor {
    use super::{env, Duration, Lazy};

    /// Interval between cleanup sweeps (in seconds)
    pub const SWEEP_INTERVAL_SECS: u64 = 600; // 10 minutes

    /// File expiry threshold in hours
    /// Read from FILE_EXPIRY_HOURS environment variable
    /// Default: 2 hours
    pub static FILE_EXPIRY_HOURS: Lazy<u64> = Lazy::new(|| {
        env::var("FILE_EXPIRY_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2)
    });

    /// Sweep interval duration
    pub fn sweep_interval() -> Duration {
        Duration::from_secs(SWEEP_INTERVAL_SECS)
    }

    /// File expiry threshold duration
    pub fn file_expiry() -> Duration {
        Duration::from_secs(*FILE_EXPIRY_HOURS * 3600)
    }
}

/// Progress channel configuration
pub mod events {
    /// Broadcast channel capacity; slow subscribers past this lag drop events
    pub const CHANNEL_CAPACITY: usize = 256;

    /// SSE keep-alive ping interval (in seconds)
    pub const KEEP_ALIVE_SECS: u64 = 30;
}

/// Validation configuration
pub mod validation {
    /// Maximum URL length (RFC 7230 recommends 8000, but we use 2048 for safety)
    pub const MAX_URL_LENGTH: usize = 2048;

    /// Maximum number of formats returned by /api/info
    pub const MAX_FORMATS: usize = 20;

    /// Maximum title length kept in a final filename (before the extension)
    pub const MAX_TITLE_LENGTH: usize = 50;
}
