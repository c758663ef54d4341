//! Jukebox Server Library
//!
//! Shared channel playlists driven over websockets, with a durable queue in
//! SQLite and background media preparation.

pub mod background_jobs;
pub mod config;
pub mod error;
pub mod events;
pub mod lease;
pub mod media;
pub mod notifications;
pub mod playlist;
pub mod queue_store;
pub mod server;
pub mod sqlite_persistence;
pub mod tasks;
pub mod user;

// Re-export commonly used types for convenience
pub use error::{JukeboxError, JukeboxResult};
pub use server::{run_server, RequestsLoggingLevel};
pub use user::{SqliteUserStore, UserStore};
