//! Channel playlist operations on top of the queue store, and the lookup
//! of the audio files behind queued media.

mod library;
mod models;
mod service;

pub use library::{AudioFile, MediaLibrary};
pub use models::{AddedItem, PlaylistItem, PlaylistView};
pub use service::{PlaylistConfig, PlaylistService};
