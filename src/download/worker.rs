//! Per-task download workers.
//!
//! One spawned task per download drives the engine call end to end: state
//! transitions on the task record, progress mapping to display strings,
//! finalization of the produced file, and the history append. A worker owns
//! its record's mutable fields for the whole run; failures are confined to
//! the task and never propagate out of the worker.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use url::Url;

use crate::conversion::convert_to_mp3;
use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::core::utils::{expand_path, format_eta, format_speed, sanitize_title};
use crate::download::registry::TaskRegistry;
use crate::download::task::{MediaType, TaskKind, TaskRecord, TaskState};
use crate::download::ytdlp::{self, EngineEvent, EngineRequest};
use crate::history::{HistoryEntry, HistoryLog};
use crate::web::events::ProgressNotifier;

/// Spawns the worker task for a freshly registered download.
///
/// Fire-and-forget: the request handler returns as soon as the task is
/// spawned. The handle is returned for tests.
pub fn spawn_worker(
    registry: Arc<TaskRegistry>,
    notifier: ProgressNotifier,
    history: Arc<HistoryLog>,
    task_id: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let worker = Worker {
            registry,
            notifier,
            history,
            task_id,
        };
        worker.run().await;
    })
}

struct Worker {
    registry: Arc<TaskRegistry>,
    notifier: ProgressNotifier,
    history: Arc<HistoryLog>,
    task_id: String,
}

impl Worker {
    async fn run(self) {
        let Some(record) = self.registry.get(&self.task_id).await else {
            log::warn!("Worker started for unknown task {}", self.task_id);
            return;
        };

        let result = match record.kind {
            TaskKind::Single => self.run_single(&record).await,
            TaskKind::Playlist => self.run_playlist(&record).await,
        };

        if let Err(e) = result {
            self.fail(e.to_string()).await;
        }
    }

    /// Drives one non-playlist download to a terminal state.
    async fn run_single(&self, record: &TaskRecord) -> AppResult<()> {
        self.registry
            .update(&self.task_id, |r| r.state = TaskState::Downloading)
            .await;
        self.notifier
            .publish(&self.task_id, "starting download", 0.0, "", "", false);

        let url = Url::parse(&record.source_url)?;
        if let Some(title) = ytdlp::probe_title(&url).await {
            self.registry.update(&self.task_id, |r| r.title = title).await;
        }

        let temp_dir = expand_path(&config::TEMP_FOLDER);
        let request = EngineRequest {
            url: record.source_url.clone(),
            kind: TaskKind::Single,
            media_type: record.media_type,
            format_id: effective_format_id(&record.format_id),
            output_template: format!("{}/{}.%(ext)s", temp_dir, self.task_id),
        };

        self.run_engine(request).await?;
        self.finalize_single(record.media_type, Path::new(&temp_dir)).await
    }

    /// Drives a whole playlist through one aggregated task.
    async fn run_playlist(&self, record: &TaskRecord) -> AppResult<()> {
        self.registry
            .update(&self.task_id, |r| r.state = TaskState::Downloading)
            .await;
        self.notifier
            .publish(&self.task_id, "starting playlist download", 0.0, "", "", false);

        // Lightweight metadata prefetch; absence never blocks the download
        let url = Url::parse(&record.source_url)?;
        match ytdlp::fetch_media_info(&url).await {
            Ok(info) if info.is_playlist => {
                self.registry
                    .update(&self.task_id, |r| {
                        r.playlist_title = info.title.clone();
                        r.total_items = info.entry_count;
                    })
                    .await;
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("Playlist metadata prefetch failed for {}: {}", url, e);
            }
        }

        let temp_dir = expand_path(&config::TEMP_FOLDER);
        let request = EngineRequest {
            url: record.source_url.clone(),
            kind: TaskKind::Playlist,
            media_type: record.media_type,
            format_id: effective_format_id(&record.format_id),
            output_template: format!("{}/{}/%(playlist)s/%(title)s.%(ext)s", temp_dir, self.task_id),
        };

        self.run_engine(request).await?;
        self.finalize_playlist(&record.source_url).await
    }

    /// Runs the engine call while consuming its progress events.
    async fn run_engine(&self, request: EngineRequest) -> AppResult<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = tokio::spawn(ytdlp::run_download(request, tx));

        self.pump_events(rx).await;

        engine
            .await
            .map_err(|e| AppError::Download(format!("engine task panicked: {}", e)))?
    }

    /// Maps engine events onto the task record and the push channel.
    ///
    /// Runs until the engine drops its sender. Percent is the current
    /// (sub-)item's percent; it resets at playlist item boundaries.
    async fn pump_events(&self, mut rx: mpsc::UnboundedReceiver<EngineEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                EngineEvent::Progress(update) => {
                    let speed = update.speed_bps.map(format_speed).unwrap_or_default();
                    let eta = update.eta_seconds.map(format_eta).unwrap_or_default();

                    let mut status_text = String::from("downloading...");
                    self.registry
                        .update(&self.task_id, |r| {
                            r.percent = update.percent;
                            if !speed.is_empty() {
                                r.speed = speed.clone();
                            }
                            if !eta.is_empty() {
                                r.eta = eta.clone();
                            }
                            if r.kind == TaskKind::Playlist && r.current_item > 0 {
                                status_text = format!("downloading item {} of {}", r.current_item, r.total_items);
                            } else if !r.title.is_empty() {
                                status_text = r.title.clone();
                            }
                        })
                        .await;

                    self.notifier
                        .publish(&self.task_id, &status_text, update.percent, &speed, &eta, false);
                }
                EngineEvent::Destination(path) => {
                    // Playlist runs reveal the playlist title through the
                    // playlist directory in the output template
                    let dir_name = Path::new(&path)
                        .parent()
                        .and_then(|p| p.file_name())
                        .map(|n| n.to_string_lossy().into_owned());

                    if let Some(name) = dir_name {
                        self.registry
                            .update(&self.task_id, |r| {
                                if r.kind == TaskKind::Playlist && r.playlist_title.is_empty() && name != "NA" {
                                    r.playlist_title = name.clone();
                                }
                            })
                            .await;
                    }
                }
                EngineEvent::PlaylistItem { index, total } => {
                    let mut totals = total;
                    let mut percent = 0.0;
                    self.registry
                        .update(&self.task_id, |r| {
                            r.current_item = index;
                            // Prefer the prefetched count; the engine's total
                            // fills in when the prefetch came up empty
                            if r.total_items == 0 {
                                r.total_items = total;
                            }
                            totals = r.total_items;
                            percent = r.percent;
                        })
                        .await;

                    self.notifier.publish(
                        &self.task_id,
                        &format!("downloading item {} of {}", index, totals),
                        percent,
                        "",
                        "",
                        false,
                    );
                }
            }
        }
    }

    /// Moves the produced file into the output folder and closes the books.
    async fn finalize_single(&self, media_type: MediaType, temp_dir: &Path) -> AppResult<()> {
        let mut produced = ytdlp::find_output_file(temp_dir, &self.task_id)?;

        // The engine's postprocessor normally emits mp3 for audio tasks;
        // fall back to a direct transcode when it didn't
        if media_type == MediaType::Audio && extension_of(&produced) != "mp3" {
            let mp3_path = temp_dir.join(format!("{}.mp3", self.task_id));
            convert_to_mp3(&produced, &mp3_path).await?;
            let _ = std::fs::remove_file(&produced);
            produced = mp3_path;
        }

        let record = self
            .registry
            .get(&self.task_id)
            .await
            .ok_or_else(|| AppError::Download("task record disappeared".to_string()))?;

        let title = if record.title.is_empty() { "video" } else { &record.title };
        let extension = format!(".{}", extension_of(&produced));
        let final_name = sanitize_title(title, &extension);

        let output_dir = expand_path(&config::DOWNLOAD_FOLDER);
        let final_path = Path::new(&output_dir).join(&final_name);
        move_file(&produced, &final_path)?;

        let size = std::fs::metadata(&final_path).map(|m| m.len()).ok();

        self.registry
            .update(&self.task_id, |r| {
                r.state = TaskState::Completed;
                r.percent = 100.0;
                r.output_path = Some(final_path.to_string_lossy().into_owned());
            })
            .await;
        self.notifier
            .publish(&self.task_id, "download complete", 100.0, "", "", false);

        log::info!("Task {} completed: {}", self.task_id, final_path.display());

        let entry = HistoryEntry {
            task_id: self.task_id.clone(),
            url: record.source_url.clone(),
            title: title.to_string(),
            media_kind: media_type.as_str().to_string(),
            filename: final_name,
            completed_at: Utc::now(),
            size,
            items: None,
        };
        if let Err(e) = self.history.append(entry).await {
            log::error!("Failed to append history entry for {}: {}", self.task_id, e);
        }

        Ok(())
    }

    /// Marks a playlist task completed and records it in the history.
    ///
    /// Playlist items stay under the task's temp subtree; there is no single
    /// aggregate output file, so `output_path` remains unset.
    async fn finalize_playlist(&self, source_url: &str) -> AppResult<()> {
        let mut title = String::new();
        let mut items = 0;
        self.registry
            .update(&self.task_id, |r| {
                if r.playlist_title.is_empty() {
                    r.playlist_title = "playlist".to_string();
                }
                r.title = r.playlist_title.clone();
                r.state = TaskState::Completed;
                r.percent = 100.0;
                title = r.title.clone();
                items = r.total_items;
            })
            .await;

        self.notifier
            .publish(&self.task_id, "playlist download complete", 100.0, "", "", false);

        log::info!("Playlist task {} completed: {} ({} items)", self.task_id, title, items);

        let entry = HistoryEntry {
            task_id: self.task_id.clone(),
            url: source_url.to_string(),
            title: title.clone(),
            media_kind: "playlist".to_string(),
            filename: title,
            completed_at: Utc::now(),
            size: None,
            items: Some(items),
        };
        if let Err(e) = self.history.append(entry).await {
            log::error!("Failed to append history entry for {}: {}", self.task_id, e);
        }

        Ok(())
    }

    /// Terminal failure path: record the cause, push an error-flagged event.
    async fn fail(&self, message: String) {
        log::error!("Task {} failed: {}", self.task_id, message);

        self.registry
            .update(&self.task_id, |r| {
                r.state = TaskState::Failed;
                r.percent = 0.0;
                r.error_message = Some(message.clone());
            })
            .await;

        self.notifier
            .publish(&self.task_id, &format!("error: {}", message), 0.0, "", "", true);
    }
}

/// The caller-chosen format id, with "best" as the fallback.
fn effective_format_id(format_id: &str) -> String {
    if format_id.trim().is_empty() {
        "best".to_string()
    } else {
        format_id.to_string()
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

/// Moves a file into the output folder, falling back to copy+remove when a
/// plain rename crosses filesystems.
fn move_file(from: &Path, to: &Path) -> AppResult<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)?;
            Ok(())
        }
    }
}
