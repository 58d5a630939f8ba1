//! Top-level entry point wiring configuration, sources and storage together.

use crate::bridge::{RemoteSession, StoryBackend};
use crate::config::ClientConfig;
use crate::error::PlaybackError;
use crate::graph::GraphError;
use crate::history::{
    load_history, FallbackHistory, HistoryListing, LocalHistory, RemoteHistory,
    SessionHistoryRepository,
};
use crate::persist::{PlayedStoryStore, StoreError};
use crate::player::PlayerBuilder;
use crate::recorder::{PlaythroughRecorder, PlaythroughSummary};
use crate::runner::{PlayerHandle, PlayerRunner};
use crate::source::{
    CatalogEntry, LocalGraphs, RemoteGraphs, ResolvedStory, SourceError, StorySource,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors from opening a story.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("No backend configured (set FABULA_API_URL)")]
    NoBackend,
}

/// Opens stories and lists what the user has played.
pub struct Storyteller {
    config: ClientConfig,
    source: Arc<dyn StorySource>,
    backend: Option<Arc<dyn StoryBackend>>,
    store: Arc<dyn PlayedStoryStore>,
}

impl Storyteller {
    pub fn new(
        config: ClientConfig,
        source: Arc<dyn StorySource>,
        store: Arc<dyn PlayedStoryStore>,
    ) -> Self {
        Self {
            config,
            source,
            backend: None,
            store,
        }
    }

    /// Attach the backend used for sessions and remote history.
    pub fn with_backend(mut self, backend: Arc<dyn StoryBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Build from configuration alone.
    ///
    /// With `remote`, stories come from the backend catalog; otherwise from the
    /// bundled library. The backend is attached whenever one is configured.
    pub fn from_config(config: ClientConfig, remote: bool) -> Result<Self, LaunchError> {
        let backend: Option<Arc<dyn StoryBackend>> = config
            .api()
            .map(|api| Arc::new(api) as Arc<dyn StoryBackend>);

        let source: Arc<dyn StorySource> = match (&backend, remote) {
            (Some(backend), true) => Arc::new(RemoteGraphs::new(Arc::clone(backend))),
            (None, true) => return Err(LaunchError::NoBackend),
            (_, false) => Arc::new(LocalGraphs::builtin()?),
        };
        let store = Arc::new(config.store());

        let storyteller = Self::new(config, source, store);
        Ok(match backend {
            Some(backend) => storyteller.with_backend(backend),
            None => storyteller,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn catalog(&self) -> Result<Vec<CatalogEntry>, SourceError> {
        self.source.catalog().await
    }

    pub async fn resolve(&self, story_key: &str) -> Result<ResolvedStory, SourceError> {
        self.source.resolve_graph(story_key).await
    }

    /// Resolve `story_key` and prepare a player for it.
    ///
    /// Stories that need a server session get one here; failing to start it
    /// fails the launch.
    pub async fn open(&self, story_key: &str) -> Result<PlayerBuilder, LaunchError> {
        let story = self.resolve(story_key).await?;
        let recorder = PlaythroughRecorder::new(Arc::clone(&self.store), self.config.user_key());

        let mut builder = PlayerBuilder::for_story(&story)
            .with_typing_interval(self.config.typing_interval)
            .with_recorder(recorder);

        if let Some(story_id) = story.session_story_id {
            let backend = self.backend.clone().ok_or(LaunchError::NoBackend)?;
            let session = RemoteSession::start(backend, story_id).await?;
            builder = builder.with_remote(session);
        }

        info!(story_key, nodes = story.graph.len(), "story opened");
        Ok(builder)
    }

    /// Open `story_key` and run it in the background.
    pub async fn play(&self, story_key: &str) -> Result<PlayerHandle, LaunchError> {
        let builder = self.open(story_key).await?;
        Ok(PlayerRunner::spawn(builder)?)
    }

    /// Where history is read from: the backend, falling back to local data.
    pub fn history_repository(&self) -> Box<dyn SessionHistoryRepository> {
        let local = LocalHistory::new(Arc::clone(&self.store), self.config.user_key());
        match &self.backend {
            Some(backend) => Box::new(FallbackHistory::new(
                RemoteHistory::new(Arc::clone(backend)),
                local,
            )),
            None => Box::new(local),
        }
    }

    pub async fn history(&self) -> HistoryListing {
        load_history(self.history_repository().as_ref()).await
    }

    /// Sessions as the backend reports them, without the local fallback.
    pub async fn remote_history(&self) -> Result<HistoryListing, LaunchError> {
        let backend = self.backend.clone().ok_or(LaunchError::NoBackend)?;
        Ok(load_history(&RemoteHistory::new(backend)).await)
    }

    /// Playthroughs saved on this device, most recent first.
    pub async fn played(&self) -> Result<Vec<PlaythroughSummary>, StoreError> {
        self.store.list(&self.config.user_key()).await
    }
}
