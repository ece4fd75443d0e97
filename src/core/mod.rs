//! Core utilities: configuration, errors, logging, process helpers.

pub mod config;
pub mod error;
pub mod logging;
pub mod process;
pub mod utils;

pub use error::{AppError, AppResult};
pub use logging::init_logger;
pub use utils::{format_eta, format_speed, sanitize_title};
