//! Playthrough history and the summary written when a story ends.

use crate::error::PlaybackError;
use crate::graph::StoryNode;
use crate::persist::{PlayedStoryStore, UserKey};
use crate::source::StoryMeta;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One visited node, and the choice taken there if any.
///
/// Entries are only ever appended. The final entry of a finished playthrough
/// is the terminal node, without a choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_text: Option<String>,
}

impl HistoryEntry {
    /// A node where the reader took choice `index`.
    pub fn choice(node_id: impl Into<String>, index: usize, text: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            choice_index: Some(index),
            choice_text: Some(text.into()),
        }
    }

    /// A node passed through without choosing (the ending).
    pub fn visit(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            choice_index: None,
            choice_text: None,
        }
    }
}

/// Durable record of one completed playthrough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaythroughSummary {
    pub id: String,
    pub story_key: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(rename = "finishedAtISO")]
    pub finished_at_iso: String,
    /// Always 100: a stored playthrough is a finished one.
    pub progress: u8,
    /// Texts of the chosen choices, in order.
    pub decisions: Vec<String>,
    pub ending_id: String,
    pub ending_text: String,
}

/// Turns a finished history into a [`PlaythroughSummary`] and stores it.
#[derive(Clone)]
pub struct PlaythroughRecorder {
    store: Arc<dyn PlayedStoryStore>,
    user: UserKey,
}

impl PlaythroughRecorder {
    pub fn new(store: Arc<dyn PlayedStoryStore>, user: UserKey) -> Self {
        Self { store, user }
    }

    pub fn user(&self) -> &UserKey {
        &self.user
    }

    /// Build the summary for a playthrough that ended at `ending`.
    pub fn summarize(
        meta: &StoryMeta,
        history: &[HistoryEntry],
        ending: &StoryNode,
    ) -> PlaythroughSummary {
        let decisions = history
            .iter()
            .filter(|entry| entry.choice_index.is_some())
            .map(|entry| entry.choice_text.clone().unwrap_or_default())
            .collect();

        PlaythroughSummary {
            id: uuid::Uuid::new_v4().to_string(),
            story_key: meta.story_key.clone(),
            title: meta.title.clone(),
            image: meta.image.clone(),
            finished_at_iso: chrono::Utc::now().to_rfc3339(),
            progress: 100,
            decisions,
            ending_id: ending.id.clone(),
            ending_text: ending.content.clone(),
        }
    }

    /// Store `summary` in the background.
    ///
    /// Failures are logged and dropped; the playthrough is already over.
    /// Returns `None` when called outside a tokio runtime.
    pub fn record(&self, summary: PlaythroughSummary) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(summary_id = %summary.id, "no runtime available; playthrough not saved");
            return None;
        };

        let store = Arc::clone(&self.store);
        let user = self.user.clone();
        Some(runtime.spawn(async move {
            let id = summary.id.clone();
            match store.add(&user, summary).await {
                Ok(()) => debug!(summary_id = %id, user = %user, "playthrough saved"),
                Err(e) => {
                    let err = PlaybackError::Persistence(e.to_string());
                    warn!(summary_id = %id, user = %user, error = %err, "playthrough lost");
                }
            }
        }))
    }
}
