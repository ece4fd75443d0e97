//! Download orchestration: task records, the registry, progress parsing,
//! the yt-dlp engine adapter, and the per-task workers.

pub mod progress;
pub mod registry;
pub mod task;
pub mod worker;
pub mod ytdlp;

pub use registry::TaskRegistry;
pub use task::{MediaType, TaskKind, TaskRecord, TaskState};
pub use worker::spawn_worker;
