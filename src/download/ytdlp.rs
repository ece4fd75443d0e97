//! yt-dlp engine adapter.
//!
//! Everything that touches the yt-dlp binary lives here: metadata queries
//! for the info endpoint, the streaming download invocation with per-line
//! progress parsing, and locating the file a finished run produced.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tokio::process::Command as TokioCommand;
use tokio::sync::mpsc;
use url::Url;

use crate::core::config;
use crate::core::error::AppError;
use crate::core::process::run_with_timeout;
use crate::download::progress::{parse_destination, parse_playlist_item, parse_progress, ProgressUpdate};
use crate::download::task::{MediaType, TaskKind};

/// Container/audio extensions accepted by the info endpoint's format list.
const INFO_FORMAT_EXTS: &[&str] = &["mp4", "webm", "m4a", "mp3"];

/// Extension preference when locating the produced file.
const OUTPUT_EXT_PREFERENCE: &[&str] = &["mp3", "mp4", "m4a", "webm", "mkv", "opus"];

/// One selectable format, as shown by the info endpoint.
#[derive(Debug, Clone)]
pub struct MediaFormat {
    pub format_id: String,
    pub ext: String,
    pub resolution: String,
    pub filesize: Option<u64>,
    pub format_note: String,
}

/// Metadata for a URL, extracted without downloading.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    /// True when the URL resolves to a playlist
    pub is_playlist: bool,
    pub title: String,
    pub thumbnail: Option<String>,
    pub duration_secs: Option<u64>,
    pub uploader: Option<String>,
    pub view_count: Option<u64>,
    /// Number of playlist entries (0 for single items)
    pub entry_count: u32,
    pub formats: Vec<MediaFormat>,
}

/// JSON structure from yt-dlp -J
#[derive(Debug, Deserialize)]
struct RawInfo {
    #[serde(rename = "_type", default)]
    info_type: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<RawThumbnail>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    view_count: Option<u64>,
    #[serde(default)]
    playlist_count: Option<u32>,
    #[serde(default)]
    formats: Vec<RawFormat>,
    #[serde(default)]
    entries: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct RawThumbnail {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    #[serde(default)]
    format_id: Option<String>,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    filesize: Option<u64>,
    #[serde(default)]
    format_note: Option<String>,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl From<RawInfo> for MediaInfo {
    fn from(raw: RawInfo) -> Self {
        let is_playlist = raw.info_type.as_deref() == Some("playlist") || raw.entries.is_some();

        let entry_count = raw
            .playlist_count
            .or_else(|| raw.entries.as_ref().map(|e| e.len() as u32))
            .unwrap_or(0);

        // Playlists usually carry no top-level thumbnail field, only a list
        let thumbnail = raw
            .thumbnail
            .or_else(|| raw.thumbnails.into_iter().rev().find_map(|t| t.url));

        let formats = raw
            .formats
            .into_iter()
            .filter(|f| f.url.is_some() && f.ext.as_deref().map(|e| INFO_FORMAT_EXTS.contains(&e)).unwrap_or(false))
            .take(config::validation::MAX_FORMATS)
            .map(|f| {
                let format_note = f.format_note.unwrap_or_default();
                let resolution = match f.resolution.as_deref() {
                    Some(res) if !res.is_empty() && res != "audio only" => res.to_string(),
                    _ => {
                        if f.vcodec.as_deref() == Some("none") {
                            "audio only".to_string()
                        } else {
                            format_note.clone()
                        }
                    }
                };
                MediaFormat {
                    format_id: f.format_id.unwrap_or_default(),
                    ext: f.ext.unwrap_or_default(),
                    resolution,
                    filesize: f.filesize,
                    format_note,
                }
            })
            .collect();

        Self {
            is_playlist,
            title: raw.title.unwrap_or_else(|| "video".to_string()),
            thumbnail,
            duration_secs: raw.duration.map(|d| d as u64),
            uploader: raw.uploader,
            view_count: raw.view_count,
            entry_count,
            formats,
        }
    }
}

/// Fetches metadata for a URL without downloading anything.
///
/// Uses `-J --flat-playlist`, so playlists come back as a flat entry list
/// instead of being resolved item by item.
pub async fn fetch_media_info(url: &Url) -> Result<MediaInfo, AppError> {
    let ytdl_bin = &*config::YTDL_BIN;

    log::info!("Fetching media info for: {}", url);

    let mut cmd = TokioCommand::new(ytdl_bin);
    cmd.args([
        "-J",
        "--flat-playlist",
        "--no-warnings",
        "--socket-timeout",
        "30",
        url.as_str(),
    ])
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let output = run_with_timeout(&mut cmd, config::download::info_timeout()).await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::Download(format!(
            "yt-dlp failed to fetch info: {}",
            stderr_tail(&stderr)
        )));
    }

    let raw: RawInfo = serde_json::from_slice(&output.stdout)?;
    Ok(MediaInfo::from(raw))
}

/// Resolves the title of a single item, best-effort.
///
/// Returns `None` when yt-dlp fails or times out; callers fall back to a
/// generic title rather than failing the task.
pub async fn probe_title(url: &Url) -> Option<String> {
    let ytdl_bin = &*config::YTDL_BIN;

    let mut cmd = TokioCommand::new(ytdl_bin);
    cmd.args([
        "--print",
        "%(title)s",
        "--skip-download",
        "--no-playlist",
        "--no-warnings",
        "--socket-timeout",
        "30",
        url.as_str(),
    ])
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    match run_with_timeout(&mut cmd, config::download::info_timeout()).await {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let title = stdout.lines().next().unwrap_or("").trim().to_string();
            if title.is_empty() {
                None
            } else {
                Some(title)
            }
        }
        Ok(output) => {
            log::warn!(
                "Title probe failed for {}: {}",
                url,
                stderr_tail(&String::from_utf8_lossy(&output.stderr))
            );
            None
        }
        Err(e) => {
            log::warn!("Title probe error for {}: {}", url, e);
            None
        }
    }
}

/// What the engine is asked to produce for one task.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub url: String,
    pub kind: TaskKind,
    pub media_type: MediaType,
    /// Caller-chosen format id, "best" when none was picked
    pub format_id: String,
    /// yt-dlp output template (absolute or cwd-relative)
    pub output_template: String,
}

/// Progress callbacks emitted while the engine runs.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A progress tick for the current item
    Progress(ProgressUpdate),
    /// A new playlist item started downloading
    PlaylistItem { index: u32, total: u32 },
    /// The engine announced where the current item is written
    Destination(String),
}

/// Builds the yt-dlp argument list for a download request.
pub fn build_download_args(request: &EngineRequest) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-o".to_string(),
        request.output_template.clone(),
        "--newline".to_string(),
        "--no-warnings".to_string(),
        "--socket-timeout".to_string(),
        "30".to_string(),
    ];

    match request.kind {
        TaskKind::Single => {
            args.push("--no-playlist".to_string());
            match request.media_type {
                MediaType::Audio => {
                    // Best audio stream, transcoded to mp3 by the engine's
                    // own ffmpeg postprocessor
                    args.extend(
                        ["-f", "bestaudio/best", "-x", "--audio-format", "mp3", "--audio-quality", "192K"]
                            .map(String::from),
                    );
                }
                MediaType::Video => {
                    args.push("-f".to_string());
                    args.push(request.format_id.clone());
                    args.push("--merge-output-format".to_string());
                    args.push("mp4".to_string());
                }
            }
        }
        TaskKind::Playlist => {
            args.push("--yes-playlist".to_string());
            args.push("-f".to_string());
            args.push(request.format_id.clone());
            args.push("--merge-output-format".to_string());
            args.push("mp4".to_string());
        }
    }

    args.push(request.url.clone());
    args
}

/// Runs a download to completion, streaming progress events.
///
/// The subprocess blocks its worker for the whole transfer, so stdout is
/// consumed on a blocking task; stderr is drained on a side thread and its
/// tail kept for the error message. Progress lines from either stream are
/// parsed and forwarded over `events`.
pub async fn run_download(request: EngineRequest, events: mpsc::UnboundedSender<EngineEvent>) -> Result<(), AppError> {
    let ytdl_bin = config::YTDL_BIN.clone();
    let args = build_download_args(&request);

    log::info!("Starting yt-dlp for {} ({:?})", request.url, request.kind);
    log::debug!("yt-dlp args: {}", args.join(" "));

    let handle = tokio::task::spawn_blocking(move || -> Result<(), AppError> {
        let mut child = Command::new(&ytdl_bin)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AppError::Download(format!("Failed to spawn {}: {}", ytdl_bin, e)))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stderr_lines = Arc::new(Mutex::new(VecDeque::<String>::new()));

        let stderr_thread = stderr.map(|stderr_stream| {
            let events = events.clone();
            let stderr_lines = Arc::clone(&stderr_lines);
            std::thread::spawn(move || {
                let reader = BufReader::new(stderr_stream);
                for line in reader.lines().map_while(Result::ok) {
                    log::debug!("yt-dlp stderr: {}", line);
                    if let Ok(mut lines) = stderr_lines.lock() {
                        lines.push_back(line.clone());
                        if lines.len() > 200 {
                            lines.pop_front();
                        }
                    }
                    forward_line(&line, &events);
                }
            })
        });

        if let Some(stdout_stream) = stdout {
            let reader = BufReader::new(stdout_stream);
            for line in reader.lines().map_while(Result::ok) {
                log::debug!("yt-dlp: {}", line);
                forward_line(&line, &events);
            }
        }

        if let Some(thread) = stderr_thread {
            let _ = thread.join();
        }

        let status = child
            .wait()
            .map_err(|e| AppError::Download(format!("downloader process failed: {}", e)))?;

        if status.success() {
            return Ok(());
        }

        let stderr_text = stderr_lines
            .lock()
            .map(|mut lines| lines.make_contiguous().join("\n"))
            .unwrap_or_default();

        if stderr_text.is_empty() {
            Err(AppError::Download(format!("yt-dlp exited with status {}", status)))
        } else {
            Err(AppError::Download(stderr_tail(&stderr_text).to_string()))
        }
    });

    handle
        .await
        .map_err(|e| AppError::Download(format!("download task panicked: {}", e)))?
}

/// Forwards one output line as an engine event, when it carries one.
fn forward_line(line: &str, events: &mpsc::UnboundedSender<EngineEvent>) {
    if let Some((index, total)) = parse_playlist_item(line) {
        let _ = events.send(EngineEvent::PlaylistItem { index, total });
    } else if let Some(path) = parse_destination(line) {
        let _ = events.send(EngineEvent::Destination(path.to_string()));
    } else if let Some(update) = parse_progress(line) {
        let _ = events.send(EngineEvent::Progress(update));
    }
}

/// Locates the file a finished single-item run produced.
///
/// The requested extension and the produced one can differ (the audio
/// postprocessor may emit m4a when mp3 extraction is unavailable, merges
/// settle on mp4), so the temp dir is scanned for the task-id stem.
pub fn find_output_file(temp_dir: &Path, task_id: &str) -> Result<PathBuf, AppError> {
    let mut matches: Vec<PathBuf> = std::fs::read_dir(temp_dir)
        .map_err(AppError::Io)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy() == task_id)
                    .unwrap_or(false)
        })
        .collect();

    if matches.is_empty() {
        return Err(AppError::Download(format!(
            "Output file for task {} not found after download",
            task_id
        )));
    }

    matches.sort_by_key(|path| {
        let ext = path.extension().map(|e| e.to_string_lossy().to_lowercase());
        OUTPUT_EXT_PREFERENCE
            .iter()
            .position(|p| Some(*p) == ext.as_deref())
            .unwrap_or(OUTPUT_EXT_PREFERENCE.len())
    });

    Ok(matches.remove(0))
}

/// Last chunk of a stderr dump, enough for a human-readable error.
fn stderr_tail(stderr: &str) -> &str {
    let trimmed = stderr.trim();
    let mut start = trimmed.len().saturating_sub(500);
    // Avoid splitting a UTF-8 character
    while start < trimmed.len() && !trimmed.is_char_boundary(start) {
        start += 1;
    }
    &trimmed[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== build_download_args Tests ====================

    fn request(kind: TaskKind, media_type: MediaType, format_id: &str) -> EngineRequest {
        EngineRequest {
            url: "https://example.com/watch?v=abc".to_string(),
            kind,
            media_type,
            format_id: format_id.to_string(),
            output_template: "temp/task.%(ext)s".to_string(),
        }
    }

    #[test]
    fn test_args_single_audio() {
        let args = build_download_args(&request(TaskKind::Single, MediaType::Audio, "best"));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"-x".to_string()));
        assert!(args.contains(&"mp3".to_string()));
        assert!(args.contains(&"bestaudio/best".to_string()));
        assert_eq!(args.last().unwrap(), "https://example.com/watch?v=abc");
    }

    #[test]
    fn test_args_single_video_uses_format_id() {
        let args = build_download_args(&request(TaskKind::Single, MediaType::Video, "137+140"));
        assert!(args.contains(&"137+140".to_string()));
        assert!(args.contains(&"--merge-output-format".to_string()));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(!args.contains(&"-x".to_string()));
    }

    #[test]
    fn test_args_playlist() {
        let args = build_download_args(&request(TaskKind::Playlist, MediaType::Video, "best"));
        assert!(args.contains(&"--yes-playlist".to_string()));
        assert!(!args.contains(&"--no-playlist".to_string()));
    }

    // ==================== Info parsing Tests ====================

    #[test]
    fn test_raw_info_single_video() {
        let json = serde_json::json!({
            "title": "A Video",
            "thumbnail": "https://example.com/t.jpg",
            "duration": 125.7,
            "uploader": "someone",
            "view_count": 42,
            "formats": [
                {"format_id": "22", "ext": "mp4", "resolution": "1280x720", "url": "https://cdn/x", "filesize": 1000},
                {"format_id": "140", "ext": "m4a", "resolution": "audio only", "vcodec": "none", "url": "https://cdn/y"},
                {"format_id": "sb0", "ext": "mhtml", "url": "https://cdn/z"}
            ]
        });
        let raw: RawInfo = serde_json::from_value(json).unwrap();
        let info = MediaInfo::from(raw);

        assert!(!info.is_playlist);
        assert_eq!(info.title, "A Video");
        assert_eq!(info.duration_secs, Some(125));
        // mhtml storyboard filtered out
        assert_eq!(info.formats.len(), 2);
        assert_eq!(info.formats[0].resolution, "1280x720");
        assert_eq!(info.formats[1].resolution, "audio only");
    }

    #[test]
    fn test_raw_info_playlist() {
        let json = serde_json::json!({
            "_type": "playlist",
            "title": "My Mix",
            "playlist_count": 12,
            "thumbnails": [{"url": "https://example.com/small.jpg"}, {"url": "https://example.com/big.jpg"}],
            "entries": [{}, {}, {}]
        });
        let raw: RawInfo = serde_json::from_value(json).unwrap();
        let info = MediaInfo::from(raw);

        assert!(info.is_playlist);
        assert_eq!(info.entry_count, 12);
        assert_eq!(info.thumbnail.as_deref(), Some("https://example.com/big.jpg"));
    }

    #[test]
    fn test_raw_info_entries_without_count() {
        let json = serde_json::json!({
            "title": "Mix",
            "entries": [{}, {}, {}]
        });
        let raw: RawInfo = serde_json::from_value(json).unwrap();
        let info = MediaInfo::from(raw);
        assert!(info.is_playlist);
        assert_eq!(info.entry_count, 3);
    }

    // ==================== find_output_file Tests ====================

    #[test]
    fn test_find_output_file_prefers_mp3() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("task-1.webm"), b"x").unwrap();
        std::fs::write(dir.path().join("task-1.mp3"), b"x").unwrap();
        std::fs::write(dir.path().join("other.mp3"), b"x").unwrap();

        let found = find_output_file(dir.path(), "task-1").unwrap();
        assert_eq!(found.file_name().unwrap().to_string_lossy(), "task-1.mp3");
    }

    #[test]
    fn test_find_output_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_output_file(dir.path(), "nope").is_err());
    }

    // ==================== stderr_tail Tests ====================

    #[test]
    fn test_stderr_tail_short_input() {
        assert_eq!(stderr_tail("  boom  "), "boom");
    }

    #[test]
    fn test_stderr_tail_truncates_long_input() {
        let long = "x".repeat(2000);
        assert_eq!(stderr_tail(&long).len(), 500);
    }
}
