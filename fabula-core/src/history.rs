//! Listing past playthroughs.
//!
//! The backend keeps a list of the user's sessions; the local store keeps the
//! summaries of finished local playthroughs. Both are exposed through
//! [`SessionHistoryRepository`], and [`FallbackHistory`] composes them so a
//! failing backend degrades to the local list.

use crate::bridge::StoryBackend;
use crate::error::PlaybackError;
use crate::persist::{PlayedStoryStore, UserKey};
use crate::recorder::PlaythroughSummary;
use async_trait::async_trait;
use fabula_api::UserSession;
use std::sync::Arc;
use tracing::{debug, warn};

/// One past playthrough, whichever repository it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: String,
    pub title: String,
    pub image: Option<String>,
    pub status: String,
    /// RFC 3339 timestamp as reported by the source.
    pub created_at: String,
    /// Choice texts in the order they were taken.
    pub decisions: Vec<String>,
    pub ending: Option<String>,
}

impl From<UserSession> for SessionRecord {
    fn from(session: UserSession) -> Self {
        Self {
            id: session.id.to_string(),
            title: session.story.title,
            image: session.story.image,
            status: session.status,
            created_at: session.created_at,
            decisions: session.choices.into_iter().map(|c| c.choice_text).collect(),
            ending: None,
        }
    }
}

impl From<PlaythroughSummary> for SessionRecord {
    fn from(summary: PlaythroughSummary) -> Self {
        Self {
            id: summary.id,
            title: summary.title,
            image: summary.image,
            status: "completed".to_string(),
            created_at: summary.finished_at_iso,
            decisions: summary.decisions,
            ending: Some(summary.ending_text),
        }
    }
}

/// A list of the user's past playthroughs.
#[async_trait]
pub trait SessionHistoryRepository: Send + Sync {
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, PlaybackError>;
}

/// Sessions recorded by the backend.
pub struct RemoteHistory {
    backend: Arc<dyn StoryBackend>,
}

impl RemoteHistory {
    pub fn new(backend: Arc<dyn StoryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SessionHistoryRepository for RemoteHistory {
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, PlaybackError> {
        let sessions = self
            .backend
            .list_sessions()
            .await
            .map_err(|e| PlaybackError::HistoryFetch(e.to_string()))?;
        debug!(count = sessions.len(), "fetched remote sessions");
        Ok(sessions.into_iter().map(SessionRecord::from).collect())
    }
}

/// Playthroughs saved in the local store.
pub struct LocalHistory {
    store: Arc<dyn PlayedStoryStore>,
    user: UserKey,
}

impl LocalHistory {
    pub fn new(store: Arc<dyn PlayedStoryStore>, user: UserKey) -> Self {
        Self { store, user }
    }
}

#[async_trait]
impl SessionHistoryRepository for LocalHistory {
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, PlaybackError> {
        let summaries = self
            .store
            .list(&self.user)
            .await
            .map_err(|e| PlaybackError::HistoryFetch(e.to_string()))?;
        Ok(summaries.into_iter().map(SessionRecord::from).collect())
    }
}

/// Asks `primary` first and falls back to `fallback` on any error.
pub struct FallbackHistory {
    primary: Box<dyn SessionHistoryRepository>,
    fallback: Box<dyn SessionHistoryRepository>,
}

impl FallbackHistory {
    pub fn new(
        primary: impl SessionHistoryRepository + 'static,
        fallback: impl SessionHistoryRepository + 'static,
    ) -> Self {
        Self {
            primary: Box::new(primary),
            fallback: Box::new(fallback),
        }
    }
}

#[async_trait]
impl SessionHistoryRepository for FallbackHistory {
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, PlaybackError> {
        match self.primary.list_sessions().await {
            Ok(sessions) => Ok(sessions),
            Err(e) => {
                warn!(error = %e, "history unavailable; using fallback");
                self.fallback.list_sessions().await
            }
        }
    }
}

/// History ready for display.
///
/// `error` is set when the list could not be loaded, so an empty list after a
/// failure can be told apart from a user with no history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryListing {
    pub sessions: Vec<SessionRecord>,
    pub error: Option<PlaybackError>,
}

/// Load history without ever failing.
pub async fn load_history(repository: &dyn SessionHistoryRepository) -> HistoryListing {
    match repository.list_sessions().await {
        Ok(sessions) => HistoryListing {
            sessions,
            error: None,
        },
        Err(e) => {
            warn!(error = %e, "could not load history");
            HistoryListing {
                sessions: Vec::new(),
                error: Some(e),
            }
        }
    }
}
