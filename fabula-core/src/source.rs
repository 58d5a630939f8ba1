//! Where story graphs come from.
//!
//! Playback never cares whether a graph was compiled in or fetched from the
//! backend: every source resolves a story key to a [`ResolvedStory`].

use crate::bridge::StoryBackend;
use crate::graph::{GraphError, StoryGraph};
use crate::library;
use async_trait::async_trait;
use fabula_api::{StoryKind, UnifiedStory};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Start node used when a source does not name one.
pub const DEFAULT_START_ID: &str = "start";

/// Errors from resolving a story.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Unknown story '{0}'")]
    UnknownStory(String),

    #[error("Backend error: {0}")]
    Backend(#[from] fabula_api::Error),

    #[error("Invalid story graph: {0}")]
    Graph(#[from] GraphError),

    #[error("Story '{0}' needs a server session but the catalog has no session id for it")]
    NoSessionId(String),
}

/// Display metadata of a story, carried into its playthrough summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryMeta {
    pub story_key: String,
    pub title: String,
    pub image: Option<String>,
}

impl StoryMeta {
    pub fn new(story_key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            story_key: story_key.into(),
            title: title.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}

/// A story ready to be played.
#[derive(Debug, Clone)]
pub struct ResolvedStory {
    pub graph: Arc<StoryGraph>,
    pub start_id: String,
    pub meta: StoryMeta,
    /// Backend story id when playback must be mirrored by a server session.
    pub session_story_id: Option<i64>,
}

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub story_key: String,
    pub title: String,
    pub description: String,
    pub image: Option<String>,
    pub requires_session: bool,
}

/// Resolves story keys to playable graphs.
#[async_trait]
pub trait StorySource: Send + Sync {
    async fn resolve_graph(&self, story_key: &str) -> Result<ResolvedStory, SourceError>;

    async fn catalog(&self) -> Result<Vec<CatalogEntry>, SourceError>;
}

/// Graphs compiled into the application.
#[derive(Debug, Clone, Default)]
pub struct LocalGraphs {
    stories: HashMap<String, (Arc<StoryGraph>, StoryMeta)>,
}

impl LocalGraphs {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in story library.
    pub fn builtin() -> Result<Self, GraphError> {
        let mut source = Self::new();
        for (meta, graph) in library::all()? {
            source = source.with_story(meta, graph)?;
        }
        Ok(source)
    }

    /// Register a graph. Its start node must be `start`.
    pub fn with_story(mut self, meta: StoryMeta, graph: StoryGraph) -> Result<Self, GraphError> {
        if !graph.contains(DEFAULT_START_ID) {
            return Err(GraphError::MissingStart(DEFAULT_START_ID.to_string()));
        }
        self.stories
            .insert(meta.story_key.clone(), (Arc::new(graph), meta));
        Ok(self)
    }
}

#[async_trait]
impl StorySource for LocalGraphs {
    async fn resolve_graph(&self, story_key: &str) -> Result<ResolvedStory, SourceError> {
        let (graph, meta) = self
            .stories
            .get(story_key)
            .ok_or_else(|| SourceError::UnknownStory(story_key.to_string()))?;

        Ok(ResolvedStory {
            graph: Arc::clone(graph),
            start_id: DEFAULT_START_ID.to_string(),
            meta: meta.clone(),
            session_story_id: None,
        })
    }

    async fn catalog(&self) -> Result<Vec<CatalogEntry>, SourceError> {
        let mut entries: Vec<_> = self
            .stories
            .values()
            .map(|(_, meta)| CatalogEntry {
                story_key: meta.story_key.clone(),
                title: meta.title.clone(),
                description: String::new(),
                image: meta.image.clone(),
                requires_session: false,
            })
            .collect();
        entries.sort_by(|a, b| a.story_key.cmp(&b.story_key));
        Ok(entries)
    }
}

/// Graphs fetched from the backend, cached after the first fetch.
pub struct RemoteGraphs {
    backend: Arc<dyn StoryBackend>,
    catalog: RwLock<Option<Vec<UnifiedStory>>>,
    graphs: RwLock<HashMap<String, ResolvedStory>>,
}

impl RemoteGraphs {
    pub fn new(backend: Arc<dyn StoryBackend>) -> Self {
        Self {
            backend,
            catalog: RwLock::new(None),
            graphs: RwLock::new(HashMap::new()),
        }
    }

    /// Forget cached catalog and graphs.
    pub async fn clear_cache(&self) {
        debug!("clearing story caches");
        *self.catalog.write().await = None;
        self.graphs.write().await.clear();
    }

    async fn unified_catalog(&self) -> Result<Vec<UnifiedStory>, SourceError> {
        if let Some(stories) = self.catalog.read().await.as_ref() {
            return Ok(stories.clone());
        }

        let stories = self.backend.catalog().await?;
        info!(count = stories.len(), "fetched story catalog");
        *self.catalog.write().await = Some(stories.clone());
        Ok(stories)
    }
}

#[async_trait]
impl StorySource for RemoteGraphs {
    async fn resolve_graph(&self, story_key: &str) -> Result<ResolvedStory, SourceError> {
        if let Some(cached) = self.graphs.read().await.get(story_key) {
            return Ok(cached.clone());
        }

        let response = self.backend.story_graph(story_key).await?;
        let (start_id, session_story_id) = match response.kind {
            StoryKind::Story => {
                let catalog = self.unified_catalog().await?;
                let id = catalog
                    .iter()
                    .find(|s| s.story_key == story_key)
                    .and_then(|s| s.original_id)
                    .ok_or_else(|| SourceError::NoSessionId(story_key.to_string()))?;
                // Sessions begin wherever the backend story says they do.
                let detail = self.backend.story_detail(id).await?;
                debug!(story_key, story_id = id, start = %detail.start_node_id, "fetched story detail");
                (detail.start_node_id, Some(id))
            }
            StoryKind::Cuento | StoryKind::Unknown => (
                response
                    .start_node_id
                    .clone()
                    .unwrap_or_else(|| DEFAULT_START_ID.to_string()),
                None,
            ),
        };

        let graph = StoryGraph::try_from(response.graph)?;
        if !graph.contains(&start_id) {
            return Err(GraphError::MissingStart(start_id).into());
        }

        let title = if response.metadata.title.is_empty() {
            story_key.to_string()
        } else {
            response.metadata.title
        };
        let resolved = ResolvedStory {
            graph: Arc::new(graph),
            start_id,
            meta: StoryMeta {
                story_key: story_key.to_string(),
                title,
                image: response.metadata.image,
            },
            session_story_id,
        };

        info!(story_key, nodes = resolved.graph.len(), "fetched story graph");
        self.graphs
            .write()
            .await
            .insert(story_key.to_string(), resolved.clone());
        Ok(resolved)
    }

    async fn catalog(&self) -> Result<Vec<CatalogEntry>, SourceError> {
        Ok(self
            .unified_catalog()
            .await?
            .into_iter()
            .map(|s| CatalogEntry {
                requires_session: s.kind == StoryKind::Story,
                story_key: s.story_key,
                title: s.title,
                description: s.description,
                image: s.image,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{graph_response, story_detail, unified_story, MockBackend};

    #[tokio::test]
    async fn test_builtin_library_resolves() {
        let source = LocalGraphs::builtin().unwrap();
        let story = source.resolve_graph("leonRaton").await.unwrap();

        assert_eq!(story.start_id, "start");
        assert_eq!(story.meta.story_key, "leonRaton");
        assert!(story.session_story_id.is_none());
        assert!(story.graph.contains("finalFree"));
    }

    #[tokio::test]
    async fn test_unknown_local_story() {
        let source = LocalGraphs::builtin().unwrap();
        let err = source.resolve_graph("dragones").await.unwrap_err();
        assert!(matches!(err, SourceError::UnknownStory(key) if key == "dragones"));
    }

    #[tokio::test]
    async fn test_local_catalog_lists_all() {
        let catalog = LocalGraphs::builtin().unwrap().catalog().await.unwrap();
        assert_eq!(catalog.len(), 4);
        assert!(catalog.iter().all(|entry| !entry.requires_session));

        let keys: Vec<_> = catalog.iter().map(|entry| entry.story_key.as_str()).collect();
        assert_eq!(keys, vec!["forest", "leonRaton", "midnight", "spaceship"]);
    }

    #[tokio::test]
    async fn test_remote_graph_is_cached() {
        let backend = Arc::new(MockBackend::new().with_graph(graph_response("forest", StoryKind::Cuento)));
        let source = RemoteGraphs::new(backend.clone());

        let first = source.resolve_graph("forest").await.unwrap();
        let second = source.resolve_graph("forest").await.unwrap();

        assert!(Arc::ptr_eq(&first.graph, &second.graph));
        assert_eq!(backend.graph_requests(), 1);
        assert!(first.session_story_id.is_none());

        source.clear_cache().await;
        source.resolve_graph("forest").await.unwrap();
        assert_eq!(backend.graph_requests(), 2);
    }

    #[tokio::test]
    async fn test_remote_story_requires_session() {
        let backend = Arc::new(
            MockBackend::new()
                .with_graph(graph_response("nave", StoryKind::Story))
                .with_catalog(vec![unified_story("nave", StoryKind::Story, Some(9))])
                .with_detail(story_detail(9, "start")),
        );
        let source = RemoteGraphs::new(backend);

        let story = source.resolve_graph("nave").await.unwrap();
        assert_eq!(story.session_story_id, Some(9));
        assert_eq!(story.start_id, "start");

        let catalog = source.catalog().await.unwrap();
        assert!(catalog[0].requires_session);
    }

    #[tokio::test]
    async fn test_remote_story_without_session_id() {
        let backend = Arc::new(
            MockBackend::new()
                .with_graph(graph_response("nave", StoryKind::Story))
                .with_catalog(vec![unified_story("nave", StoryKind::Story, None)]),
        );
        let err = RemoteGraphs::new(backend).resolve_graph("nave").await.unwrap_err();
        assert!(matches!(err, SourceError::NoSessionId(_)));
    }

    #[tokio::test]
    async fn test_remote_graph_missing_start() {
        let mut response = graph_response("forest", StoryKind::Cuento);
        response.start_node_id = Some("nowhere".to_string());
        let backend = Arc::new(MockBackend::new().with_graph(response));

        let err = RemoteGraphs::new(backend).resolve_graph("forest").await.unwrap_err();
        assert!(matches!(err, SourceError::Graph(GraphError::MissingStart(id)) if id == "nowhere"));
    }

    #[tokio::test]
    async fn test_remote_story_starts_at_detail_start_node() {
        let mut response = graph_response("nave", StoryKind::Story);
        // The unified graph's own start hint is ignored for session stories.
        response.start_node_id = Some("start".to_string());
        let backend = Arc::new(
            MockBackend::new()
                .with_graph(response)
                .with_catalog(vec![unified_story("nave", StoryKind::Story, Some(9))])
                .with_detail(story_detail(9, "b")),
        );

        let story = RemoteGraphs::new(backend).resolve_graph("nave").await.unwrap();
        assert_eq!(story.start_id, "b");
    }

    #[tokio::test]
    async fn test_remote_story_detail_unavailable() {
        let backend = Arc::new(
            MockBackend::new()
                .with_graph(graph_response("nave", StoryKind::Story))
                .with_catalog(vec![unified_story("nave", StoryKind::Story, Some(9))]),
        );

        let err = RemoteGraphs::new(backend).resolve_graph("nave").await.unwrap_err();
        assert!(matches!(
            err,
            SourceError::Backend(fabula_api::Error::Api { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_remote_story_detail_start_must_exist() {
        let backend = Arc::new(
            MockBackend::new()
                .with_graph(graph_response("nave", StoryKind::Story))
                .with_catalog(vec![unified_story("nave", StoryKind::Story, Some(9))])
                .with_detail(story_detail(9, "bridge")),
        );

        let err = RemoteGraphs::new(backend).resolve_graph("nave").await.unwrap_err();
        assert!(matches!(err, SourceError::Graph(GraphError::MissingStart(id)) if id == "bridge"));
    }
}
