//! Vidra - self-hosted web service for downloading media from multiple
//! sources (yt-dlp + ffmpeg)
//!
//! This library provides all the core functionality for the Vidra service:
//! the task registry and download workers, progress push channel, history
//! log, file janitor, and the HTTP API.
//!
//! # Module Structure
//!
//! - `core`: Configuration, errors, logging, and common utilities
//! - `download`: Task records, the registry, the yt-dlp adapter, and workers
//! - `conversion`: ffmpeg transcode fallback
//! - `history`: Bounded log of completed downloads
//! - `janitor`: Periodic cleanup of expired files
//! - `web`: Axum routes, handlers, and the SSE progress channel

pub mod conversion;
pub mod core;
pub mod download;
pub mod history;
pub mod janitor;
pub mod web;

// Re-export commonly used types for convenience
pub use crate::core::{config, AppError, AppResult};
pub use crate::download::{spawn_worker, TaskRegistry};
pub use crate::history::HistoryLog;
pub use crate::web::{AppState, ProgressNotifier};
