//! Playback error taxonomy.
//!
//! Errors that threaten the integrity of a playthrough (a missing node, no
//! remote session, a server that disagrees with the local walk) halt forward
//! progress. A failed choice submission only fails the current step. Failed
//! bookkeeping is logged and absorbed.

use thiserror::Error;

/// Errors surfaced by the playback engine to the embedding shell.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// A referenced node id is not in the graph. Fatal to the playthrough.
    #[error("Story graph is missing node '{node_id}'")]
    GraphIntegrity {
        node_id: String,
        /// The node whose choice pointed at the missing id, if any.
        referenced_from: Option<String>,
    },

    /// The backend session could not be created. Blocks playback.
    #[error("Could not start a story session: {0}")]
    SessionStart(String),

    /// Submitting a choice failed. The reader may retry the same choice.
    #[error("Could not submit choice: {0}")]
    ChoiceSubmission(String),

    /// The server moved somewhere the local graph does not go. Fatal.
    #[error("Story session out of sync: expected node '{expected}', server reports '{actual}'")]
    SessionDesync { expected: String, actual: String },

    /// A playthrough summary could not be saved. Never fatal.
    #[error("Could not save playthrough: {0}")]
    Persistence(String),

    /// Past sessions could not be listed.
    #[error("Could not load story history: {0}")]
    HistoryFetch(String),
}

impl PlaybackError {
    /// Whether this error ends the current playthrough.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PlaybackError::GraphIntegrity { .. }
                | PlaybackError::SessionStart(_)
                | PlaybackError::SessionDesync { .. }
        )
    }

    pub(crate) fn missing_node(node_id: impl Into<String>, referenced_from: Option<&str>) -> Self {
        PlaybackError::GraphIntegrity {
            node_id: node_id.into(),
            referenced_from: referenced_from.map(str::to_string),
        }
    }
}
