//! Remote session bridge.
//!
//! Backend-authored stories are mirrored by a server session. The bridge
//! starts that session, translates local choice indices into the server's
//! choice ids, and reports where the server moved. It never decides what
//! text is shown; the local graph stays authoritative for that.

use crate::error::PlaybackError;
use async_trait::async_trait;
use fabula_api::{
    ChoiceResponse, Session, SessionNode, StoryApi, StoryDetail, StoryGraphResponse, UnifiedStory,
    UserSession,
};
use std::sync::Arc;
use tracing::{info, warn};

/// The backend calls the engine depends on.
#[async_trait]
pub trait StoryBackend: Send + Sync {
    async fn start_session(&self, story_id: i64) -> Result<Session, fabula_api::Error>;

    async fn submit_choice(
        &self,
        session_id: i64,
        choice_id: i64,
    ) -> Result<ChoiceResponse, fabula_api::Error>;

    async fn list_sessions(&self) -> Result<Vec<UserSession>, fabula_api::Error>;

    async fn catalog(&self) -> Result<Vec<UnifiedStory>, fabula_api::Error>;

    async fn story_graph(&self, story_key: &str) -> Result<StoryGraphResponse, fabula_api::Error>;

    async fn story_detail(&self, story_id: i64) -> Result<StoryDetail, fabula_api::Error>;
}

#[async_trait]
impl StoryBackend for StoryApi {
    async fn start_session(&self, story_id: i64) -> Result<Session, fabula_api::Error> {
        self.start_story(story_id).await
    }

    async fn submit_choice(
        &self,
        session_id: i64,
        choice_id: i64,
    ) -> Result<ChoiceResponse, fabula_api::Error> {
        self.make_choice(session_id, choice_id).await
    }

    async fn list_sessions(&self) -> Result<Vec<UserSession>, fabula_api::Error> {
        self.user_sessions().await
    }

    async fn catalog(&self) -> Result<Vec<UnifiedStory>, fabula_api::Error> {
        self.unified_stories().await
    }

    async fn story_graph(&self, story_key: &str) -> Result<StoryGraphResponse, fabula_api::Error> {
        StoryApi::story_graph(self, story_key).await
    }

    async fn story_detail(&self, story_id: i64) -> Result<StoryDetail, fabula_api::Error> {
        StoryApi::story_detail(self, story_id).await
    }
}

/// Where the server went after accepting a choice.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteStep {
    Next(SessionNode),
    Finished { ending: Option<String> },
}

impl RemoteStep {
    /// Id of the node the server moved to, if it reported one.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            RemoteStep::Next(node) => Some(&node.id),
            RemoteStep::Finished { .. } => None,
        }
    }
}

/// A live server session for one playthrough.
pub struct RemoteSession {
    backend: Arc<dyn StoryBackend>,
    session_id: i64,
    story_id: i64,
    current_node: SessionNode,
}

impl std::fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession")
            .field("session_id", &self.session_id)
            .field("story_id", &self.story_id)
            .field("current_node", &self.current_node.id)
            .finish()
    }
}

impl RemoteSession {
    /// Ask the backend for a new session.
    ///
    /// Failure is a [`PlaybackError::SessionStart`]: a backend story cannot be
    /// played without a session to attach choices to.
    pub async fn start(backend: Arc<dyn StoryBackend>, story_id: i64) -> Result<Self, PlaybackError> {
        let session = backend.start_session(story_id).await.map_err(|e| {
            warn!(story_id, error = %e, "session start failed");
            PlaybackError::SessionStart(e.to_string())
        })?;

        info!(
            session_id = session.id,
            story_id,
            node = %session.current_node.id,
            "remote session started"
        );

        Ok(Self {
            backend,
            session_id: session.id,
            story_id,
            current_node: session.current_node,
        })
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    pub fn story_id(&self) -> i64 {
        self.story_id
    }

    /// The server's view of the current position.
    pub fn current_node(&self) -> &SessionNode {
        &self.current_node
    }

    /// Server choice id for local choice `index`.
    ///
    /// Uses the id the server sent for that position. When it sent none, falls
    /// back to the 1-based position (`index + 1`), which older backends
    /// expect. That fallback assumes local and server choice order agree.
    pub fn server_choice_id(&self, index: usize) -> i64 {
        match self.current_node.choices.get(index).and_then(|c| c.id) {
            Some(id) => id,
            None => {
                let positional = index as i64 + 1;
                warn!(
                    session_id = self.session_id,
                    node = %self.current_node.id,
                    index,
                    positional,
                    "server sent no choice id; using positional id"
                );
                positional
            }
        }
    }

    /// Submit local choice `index`. Not retried on failure.
    ///
    /// The session's view only changes once the server answers, so dropping
    /// this future leaves the session as it was.
    pub async fn submit(&mut self, index: usize) -> Result<RemoteStep, PlaybackError> {
        let choice_id = self.server_choice_id(index);

        let response = self
            .backend
            .submit_choice(self.session_id, choice_id)
            .await
            .map_err(|e| {
                warn!(session_id = self.session_id, choice_id, error = %e, "choice submission failed");
                PlaybackError::ChoiceSubmission(e.to_string())
            })?;

        match response.next_node {
            Some(node) => {
                self.current_node = node.clone();
                Ok(RemoteStep::Next(node))
            }
            None if response.story_finished => Ok(RemoteStep::Finished {
                ending: response.ending,
            }),
            None => Err(PlaybackError::ChoiceSubmission(
                "server response carried neither a next node nor an ending".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{session_node, MockBackend};

    #[tokio::test]
    async fn test_start_failure_is_session_start_error() {
        let backend = Arc::new(MockBackend::new().fail_start(503));
        let err = RemoteSession::start(backend, 7).await.unwrap_err();
        assert!(matches!(err, PlaybackError::SessionStart(msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn test_server_choice_id_mapping() {
        let backend = Arc::new(
            MockBackend::new().with_session(
                11,
                session_node("start", &[(Some(501), "a"), (None, "b")]),
            ),
        );
        let session = RemoteSession::start(backend, 7).await.unwrap();

        assert_eq!(session.server_choice_id(0), 501);
        assert_eq!(session.server_choice_id(1), 2);
    }

    #[tokio::test]
    async fn test_positional_fallback_without_choices() {
        let backend = Arc::new(MockBackend::new().with_session(11, session_node("start", &[])));
        let session = RemoteSession::start(backend, 7).await.unwrap();

        assert_eq!(session.server_choice_id(0), 1);
        assert_eq!(session.server_choice_id(1), 2);
    }

    #[tokio::test]
    async fn test_submit_updates_current_node() {
        let backend = Arc::new(
            MockBackend::new()
                .with_session(11, session_node("start", &[(Some(1), "a"), (Some(2), "b")]))
                .then_node(session_node("b", &[])),
        );
        let mut session = RemoteSession::start(backend.clone(), 7).await.unwrap();

        let step = session.submit(1).await.unwrap();
        assert_eq!(step.node_id(), Some("b"));
        assert_eq!(session.current_node().id, "b");
        assert_eq!(backend.submitted(), vec![(11, 2)]);
    }

    #[tokio::test]
    async fn test_submit_failure_keeps_node() {
        let backend = Arc::new(
            MockBackend::new()
                .with_session(11, session_node("start", &[(Some(1), "a"), (Some(2), "b")]))
                .then_fail(500),
        );
        let mut session = RemoteSession::start(backend, 7).await.unwrap();

        let err = session.submit(0).await.unwrap_err();
        assert!(matches!(err, PlaybackError::ChoiceSubmission(_)));
        assert_eq!(session.current_node().id, "start");
    }

    #[tokio::test]
    async fn test_submit_finished_signal() {
        let backend = Arc::new(
            MockBackend::new()
                .with_session(11, session_node("start", &[(Some(1), "a"), (Some(2), "b")]))
                .then_finished(Some("Fin.")),
        );
        let mut session = RemoteSession::start(backend, 7).await.unwrap();

        let step = session.submit(0).await.unwrap();
        assert_eq!(
            step,
            RemoteStep::Finished {
                ending: Some("Fin.".to_string())
            }
        );
    }
}
