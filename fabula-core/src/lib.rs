//! Branching story playback engine.
//!
//! This crate provides:
//! - Story graphs of nodes with zero or two choices
//! - A typewriter scheduler that reveals text one character at a time
//! - The playback state machine and a task-based runner for it
//! - A bridge that mirrors choices to a backend story session
//! - Playthrough summaries, local persistence and history listing
//!
//! # Quick Start
//!
//! ```ignore
//! use fabula_core::{ClientConfig, PlaybackEvent, Storyteller};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storyteller = Storyteller::from_config(ClientConfig::from_env()?, false)?;
//!     let mut player = storyteller.play("leonRaton").await?;
//!
//!     player.skip();
//!     player.select(1);
//!     while let Some(event) = player.next_event().await {
//!         if let PlaybackEvent::Reveal { chunk, .. } = event {
//!             print!("{chunk}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod graph;
pub mod history;
pub mod library;
pub mod persist;
pub mod player;
pub mod recorder;
pub mod runner;
pub mod source;
pub mod storyteller;
pub mod testing;
pub mod typewriter;

// Primary public API
pub use bridge::{RemoteSession, RemoteStep, StoryBackend};
pub use config::{ClientConfig, ConfigError};
pub use error::PlaybackError;
pub use graph::{Choice, DanglingReference, GraphError, StoryGraph, StoryNode};
pub use history::{
    load_history, FallbackHistory, HistoryListing, LocalHistory, RemoteHistory, SessionHistoryRepository,
    SessionRecord,
};
pub use persist::{
    FileStore, ListEdit, MemoryStore, PlayedStoryStore, StoreError, UserKey, MAX_PLAYED_STORIES,
};
pub use player::{PlaybackEvent, PlaybackState, PlayerBuilder, PlayerView, StoryPlayer, Transition};
pub use recorder::{HistoryEntry, PlaythroughRecorder, PlaythroughSummary};
pub use runner::{PlayerCommand, PlayerHandle, PlayerRunner};
pub use source::{CatalogEntry, LocalGraphs, RemoteGraphs, ResolvedStory, SourceError, StoryMeta, StorySource};
pub use storyteller::{LaunchError, Storyteller};
pub use typewriter::{RevealTimer, Tick, Typewriter, DEFAULT_TYPING_INTERVAL};
