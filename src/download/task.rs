use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle state of a download task.
///
/// States only move forward: `Pending -> Downloading -> {Completed, Failed}`.
/// `Cancelled` can be set from any non-terminal state, but is advisory: a
/// worker finishing its engine call may still overwrite it with a real
/// terminal state. See DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Created, worker not started yet
    Pending,
    /// Worker is driving the engine
    Downloading,
    /// Finished, output file available
    Completed,
    /// Finished with an error
    Failed,
    /// Cancel requested by a client
    Cancelled,
}

impl TaskState {
    /// Returns true for states no task is expected to leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }

    /// Serialize to the wire string used by the status endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Downloading => "downloading",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }
}

/// Whether a task covers a single item or a whole playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Single,
    Playlist,
}

/// Requested media type for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Video,
    Audio,
}

impl MediaType {
    /// Parse from the request's `format_type` field. Unknown values mean video.
    pub fn parse(s: &str) -> Self {
        match s {
            "audio" => MediaType::Audio,
            _ => MediaType::Video,
        }
    }

    /// Wire/history string for this media type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Audio => "audio",
        }
    }
}

/// Mutable state of one download, owned by its worker while running.
///
/// Readers (status endpoint, queue endpoint, notifier) see clone snapshots
/// taken under the registry lock; only the owning worker and the cancel
/// endpoint mutate a record.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    /// Unique task identifier (UUID), immutable
    pub id: String,
    /// Source URL, immutable
    pub source_url: String,
    /// Single item or playlist, immutable
    pub kind: TaskKind,
    /// Video or audio, immutable
    pub media_type: MediaType,
    /// Requested format id ("best" when the caller didn't pick one)
    pub format_id: String,
    /// Current lifecycle state
    pub state: TaskState,
    /// Percent of the current (sub-)item, 0-100
    pub percent: f32,
    /// Display speed, latest value wins
    pub speed: String,
    /// Display ETA, latest value wins
    pub eta: String,
    /// Item title, set once known
    pub title: String,
    /// Playlist title, playlist tasks only
    pub playlist_title: String,
    /// 1-based index of the item currently downloading (playlist only)
    pub current_item: u32,
    /// Total number of playlist items (playlist only)
    pub total_items: u32,
    /// Final file path, set on transition to completed
    pub output_path: Option<String>,
    /// Human-readable failure cause, set on transition to failed
    pub error_message: Option<String>,
    /// Creation timestamp, immutable
    pub created_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Creates a fresh record in `Pending` state.
    pub fn new(id: String, url: String, kind: TaskKind, media_type: MediaType, format_id: String) -> Self {
        Self {
            id,
            source_url: url,
            kind,
            media_type,
            format_id,
            state: TaskState::Pending,
            percent: 0.0,
            speed: String::new(),
            eta: String::new(),
            title: String::new(),
            playlist_title: String::new(),
            current_item: 0,
            total_items: 0,
            output_path: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    /// Best available title for queue/progress display.
    pub fn display_title(&self) -> &str {
        if !self.title.is_empty() {
            &self.title
        } else if !self.playlist_title.is_empty() {
            &self.playlist_title
        } else {
            "downloading..."
        }
    }
}
