//! Testing utilities for the playback engine.
//!
//! This module provides tools for integration testing:
//! - `MockBackend` for scripted backend responses without network calls
//! - `FailingStore` for exercising swallowed persistence failures
//! - Graph and wire-type builders for compact test fixtures

use crate::bridge::StoryBackend;
use crate::graph::{Choice, StoryGraph, StoryNode};
use crate::persist::{PlayedStoryStore, StoreError, UserKey};
use crate::player::PlaybackEvent;
use crate::recorder::PlaythroughSummary;
use async_trait::async_trait;
use fabula_api::{
    BackendStory, ChoiceResponse, GraphChoice, GraphNode, RecordedChoice, Session, SessionChoice,
    SessionNode, SessionStory, StoryDetail, StoryGraphResponse, StoryKind, StoryMetadata,
    UnifiedStory, UserSession, UserSessionStory,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// A scripted answer to a choice submission.
#[derive(Debug, Clone)]
enum ScriptedStep {
    Node(SessionNode),
    Fail(u16),
    Finished(Option<String>),
}

/// A backend that answers from a script.
///
/// Choice submissions consume scripted steps in order; an exhausted script
/// answers with HTTP 500.
#[derive(Default)]
pub struct MockBackend {
    session: Option<(i64, SessionNode)>,
    start_failure: Option<u16>,
    steps: Mutex<VecDeque<ScriptedStep>>,
    submitted: Mutex<Vec<(i64, i64)>>,
    submit_delay: Option<Duration>,
    sessions: Vec<UserSession>,
    history_failure: Option<u16>,
    catalog: Vec<UnifiedStory>,
    graphs: HashMap<String, StoryGraphResponse>,
    graph_requests: AtomicUsize,
    details: HashMap<i64, StoryDetail>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions start with this id at this node.
    pub fn with_session(mut self, session_id: i64, node: SessionNode) -> Self {
        self.session = Some((session_id, node));
        self
    }

    /// Session start fails with HTTP `status`.
    pub fn fail_start(mut self, status: u16) -> Self {
        self.start_failure = Some(status);
        self
    }

    /// Next submission moves the session to `node`.
    pub fn then_node(self, node: SessionNode) -> Self {
        self.script(ScriptedStep::Node(node))
    }

    /// Next submission fails with HTTP `status`.
    pub fn then_fail(self, status: u16) -> Self {
        self.script(ScriptedStep::Fail(status))
    }

    /// Next submission reports the story finished.
    pub fn then_finished(self, ending: Option<&str>) -> Self {
        self.script(ScriptedStep::Finished(ending.map(str::to_string)))
    }

    /// Every submission waits this long before answering.
    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    pub fn with_history(mut self, sessions: Vec<UserSession>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Session listing fails with HTTP `status`.
    pub fn fail_history(mut self, status: u16) -> Self {
        self.history_failure = Some(status);
        self
    }

    pub fn with_catalog(mut self, catalog: Vec<UnifiedStory>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_graph(mut self, response: StoryGraphResponse) -> Self {
        self.graphs.insert(response.story_key.clone(), response);
        self
    }

    pub fn with_detail(mut self, detail: StoryDetail) -> Self {
        self.details.insert(detail.story.id, detail);
        self
    }

    /// `(session_id, choice_id)` of every submission, in order.
    pub fn submitted(&self) -> Vec<(i64, i64)> {
        self.submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// How many graphs were fetched.
    pub fn graph_requests(&self) -> usize {
        self.graph_requests.load(Ordering::SeqCst)
    }

    fn script(self, step: ScriptedStep) -> Self {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
        self
    }
}

fn api_error(status: u16) -> fabula_api::Error {
    fabula_api::Error::Api {
        status,
        message: format!("mock backend answered {status}"),
    }
}

#[async_trait]
impl StoryBackend for MockBackend {
    async fn start_session(&self, story_id: i64) -> Result<Session, fabula_api::Error> {
        if let Some(status) = self.start_failure {
            return Err(api_error(status));
        }

        let (id, current_node) = self
            .session
            .clone()
            .unwrap_or_else(|| (1, session_node("start", &[])));
        Ok(Session {
            id,
            story: SessionStory {
                id: story_id,
                title: format!("Story {story_id}"),
                description: String::new(),
            },
            current_node,
        })
    }

    async fn submit_choice(
        &self,
        session_id: i64,
        choice_id: i64,
    ) -> Result<ChoiceResponse, fabula_api::Error> {
        self.submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((session_id, choice_id));

        if let Some(delay) = self.submit_delay {
            tokio::time::sleep(delay).await;
        }

        let step = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match step {
            Some(ScriptedStep::Node(node)) => Ok(ChoiceResponse {
                choice: None,
                next_node: Some(node),
                ending: None,
                story_finished: false,
            }),
            Some(ScriptedStep::Finished(ending)) => Ok(ChoiceResponse {
                choice: None,
                next_node: None,
                ending,
                story_finished: true,
            }),
            Some(ScriptedStep::Fail(status)) => Err(api_error(status)),
            None => Err(api_error(500)),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<UserSession>, fabula_api::Error> {
        match self.history_failure {
            Some(status) => Err(api_error(status)),
            None => Ok(self.sessions.clone()),
        }
    }

    async fn catalog(&self) -> Result<Vec<UnifiedStory>, fabula_api::Error> {
        Ok(self.catalog.clone())
    }

    async fn story_graph(&self, story_key: &str) -> Result<StoryGraphResponse, fabula_api::Error> {
        self.graph_requests.fetch_add(1, Ordering::SeqCst);
        self.graphs
            .get(story_key)
            .cloned()
            .ok_or_else(|| api_error(404))
    }

    async fn story_detail(&self, story_id: i64) -> Result<StoryDetail, fabula_api::Error> {
        self.details.get(&story_id).cloned().ok_or_else(|| api_error(404))
    }
}

/// A store that refuses every operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingStore;

#[async_trait]
impl PlayedStoryStore for FailingStore {
    async fn load(&self, _user: &UserKey) -> Result<Vec<PlaythroughSummary>, StoreError> {
        Err(StoreError::Unavailable("store is offline".to_string()))
    }

    async fn save(&self, _user: &UserKey, _list: &[PlaythroughSummary]) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("store is offline".to_string()))
    }

    async fn delete(&self, _user: &UserKey) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("store is offline".to_string()))
    }
}

// ============================================================================
// Fixture builders
// ============================================================================

/// A server node with the given `(server choice id, next node id)` choices.
pub fn session_node(id: &str, choices: &[(Option<i64>, &str)]) -> SessionNode {
    SessionNode {
        id: id.to_string(),
        content: format!("Server text for {id}"),
        is_ending: choices.is_empty(),
        choices: choices
            .iter()
            .enumerate()
            .map(|(i, (choice_id, next))| SessionChoice {
                id: *choice_id,
                text: format!("Choice {}", i + 1),
                next_node_id: next.to_string(),
            })
            .collect(),
    }
}

/// The server's mirror of a local node, with choice ids `base + index`.
pub fn mirror_node(node: &StoryNode, base: i64) -> SessionNode {
    SessionNode {
        id: node.id.clone(),
        content: node.content.clone(),
        is_ending: node.is_terminal(),
        choices: node
            .choices
            .iter()
            .flatten()
            .enumerate()
            .map(|(i, c)| SessionChoice {
                id: Some(base + i as i64),
                text: c.text.clone(),
                next_node_id: c.next_id.clone(),
            })
            .collect(),
    }
}

/// A straight path of `steps` branching nodes ending at `end`.
///
/// Node `i` is `start` for `i == 0`, else `step{i}`. Both choices of a node
/// lead to the next one; their texts are `"{id}: left"` and `"{id}: right"`.
pub fn path_graph(steps: usize) -> StoryGraph {
    let id = |i: usize| match i {
        0 => "start".to_string(),
        i if i == steps => "end".to_string(),
        i => format!("step{i}"),
    };

    let mut nodes: Vec<_> = (0..steps)
        .map(|i| {
            let here = id(i);
            let next = id(i + 1);
            StoryNode::branch(
                here.clone(),
                format!("Text of {here}"),
                Choice::new(format!("{here}: left"), next.clone()),
                Choice::new(format!("{here}: right"), next),
            )
        })
        .collect();
    nodes.push(StoryNode::ending(id(steps), "The end."));

    StoryGraph::from_nodes(nodes).unwrap_or_default()
}

/// `start` branches to `ghost` (missing) and `end`.
pub fn dangling_graph() -> StoryGraph {
    StoryGraph::from_nodes([
        StoryNode::branch(
            "start",
            "Two doors.",
            Choice::new("Left door", "end"),
            Choice::new("Right door", "ghost"),
        ),
        StoryNode::ending("end", "Fin."),
    ])
    .unwrap_or_default()
}

/// Wire form of a small graph: `start` branching to endings `a` and `b`.
pub fn graph_response(story_key: &str, kind: StoryKind) -> StoryGraphResponse {
    let node = |id: &str, choices: Vec<GraphChoice>| {
        (
            id.to_string(),
            GraphNode {
                id: id.to_string(),
                content: format!("Text of {id}"),
                choices,
            },
        )
    };
    let choice = |text: &str, next: &str| GraphChoice {
        text: text.to_string(),
        next_id: next.to_string(),
    };

    StoryGraphResponse {
        story_key: story_key.to_string(),
        kind,
        graph: HashMap::from([
            node("start", vec![choice("Go to a", "a"), choice("Go to b", "b")]),
            node("a", Vec::new()),
            node("b", Vec::new()),
        ]),
        metadata: StoryMetadata {
            title: format!("Title of {story_key}"),
            ..StoryMetadata::default()
        },
        start_node_id: None,
    }
}

/// Backend detail of story `id`, starting at `start_node_id`.
///
/// The graph is left empty; sources only read the start node from it.
pub fn story_detail(id: i64, start_node_id: &str) -> StoryDetail {
    StoryDetail {
        story: BackendStory {
            id,
            title: format!("Story {id}"),
            description: String::new(),
            image: None,
            category: None,
            duration: None,
        },
        start_node_id: start_node_id.to_string(),
        graph: HashMap::new(),
    }
}

pub fn unified_story(story_key: &str, kind: StoryKind, original_id: Option<i64>) -> UnifiedStory {
    UnifiedStory {
        id: format!("u-{story_key}"),
        title: format!("Title of {story_key}"),
        image: None,
        description: String::new(),
        duration: None,
        category: None,
        story_key: story_key.to_string(),
        kind,
        original_id,
    }
}

/// A past backend session with `(choice text, from, to)` choices.
pub fn user_session(id: i64, title: &str, choices: &[(&str, &str, &str)]) -> UserSession {
    UserSession {
        id,
        status: "completed".to_string(),
        created_at: "2025-03-01T10:00:00Z".to_string(),
        story: UserSessionStory {
            id: id * 10,
            title: title.to_string(),
            image: None,
        },
        choices: choices
            .iter()
            .map(|(text, from, to)| RecordedChoice {
                choice_text: text.to_string(),
                from_node_id: from.to_string(),
                to_node_id: to.to_string(),
            })
            .collect(),
    }
}

/// Every event currently queued.
pub fn drain_events(events: &mut UnboundedReceiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
