//! SSE broadcaster for download progress.
//!
//! Progress deltas are fanned out to all connected subscribers over a
//! broadcast channel. Fire-and-forget: no delivery guarantee, no replay for
//! late subscribers, and publishing never blocks a worker beyond the local
//! channel send.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::Stream;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::core::config;

/// One progress notification, as delivered to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub task_id: String,
    pub status: String,
    pub progress: f32,
    pub speed: String,
    pub eta: String,
    pub error: bool,
}

/// Fire-and-forget progress broadcaster.
///
/// Cloning is cheap; all clones share one channel.
#[derive(Debug, Clone)]
pub struct ProgressNotifier {
    sender: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressNotifier {
    fn default() -> Self {
        Self::new(config::events::CHANNEL_CAPACITY)
    }
}

impl ProgressNotifier {
    /// Creates a notifier with the given channel capacity. Subscribers that
    /// lag past the capacity drop events silently.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcasts one progress delta to all current subscribers.
    ///
    /// A send error only means nobody is listening; it is ignored.
    pub fn publish(&self, task_id: &str, status: &str, progress: f32, speed: &str, eta: &str, error: bool) {
        let event = ProgressEvent {
            task_id: task_id.to_string(),
            status: status.to_string(),
            progress,
            speed: speed.to_string(),
            eta: eta.to_string(),
            error,
        };
        let _ = self.sender.send(event);
    }

    /// Raw receiver, for tests and non-SSE consumers.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// SSE response streaming `download_progress` events to one client.
    ///
    /// Includes a keep-alive ping so idle proxies don't drop the connection.
    pub fn sse_stream(&self) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
        let receiver = self.sender.subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(|result| match result {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => Some(Ok(Event::default().event("download_progress").data(json))),
                Err(e) => {
                    log::warn!("Failed to serialize progress event: {}", e);
                    None
                }
            },
            // Lagged or closed: skip and keep streaming
            Err(e) => {
                log::debug!("SSE subscriber lagged: {}", e);
                None
            }
        });

        Sse::new(stream).keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(config::events::KEEP_ALIVE_SECS))
                .text("ping"),
        )
    }

    /// Number of currently connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
