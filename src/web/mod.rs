//! HTTP surface: routes, handlers, shared state, and the SSE push channel.

pub mod error;
pub mod events;
pub mod handlers;
pub mod routes;
pub mod state;

pub use events::{ProgressEvent, ProgressNotifier};
pub use routes::{build_router, serve};
pub use state::AppState;
