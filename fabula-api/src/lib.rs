//! Minimal client for the interactive story backend.
//!
//! This crate provides a focused client for the story REST API with:
//! - Story catalog and story graph retrieval
//! - Remote play sessions (start a session, submit choices)
//! - The per-user session history
//!
//! Every request is JSON over HTTPS. Authenticated endpoints carry a bearer
//! token when one is configured.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Endpoint paths, relative to the configured base URL.
pub mod endpoints {
    pub const STORY_DETAIL: &str = "/api/stories";
    pub const UNIFIED_STORIES: &str = "/api/unified-stories";
    pub const STORY_GRAPH: &str = "/api/unified-stories/graph";
    pub const START_STORY: &str = "/api/stories/start";
    pub const MAKE_CHOICE: &str = "/api/stories/choice";
    pub const USER_SESSIONS: &str = "/api/stories/sessions";
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur when talking to the story backend.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Story backend client.
#[derive(Clone)]
pub struct StoryApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl StoryApi {
    /// Create a new client for the backend at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Attach a bearer token to authenticated requests.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// The base URL requests are resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a backend story with its graph.
    pub async fn story_detail(&self, story_id: i64) -> Result<StoryDetail, Error> {
        let path = format!("{}/{story_id}", endpoints::STORY_DETAIL);
        let envelope: DetailEnvelope = self.get(&path, true).await?;
        Ok(match envelope {
            DetailEnvelope::Wrapped { story } => story,
            DetailEnvelope::Bare(story) => story,
        })
    }

    /// List the unified catalog (local tales and backend stories alike).
    ///
    /// This endpoint does not require authentication.
    pub async fn unified_stories(&self) -> Result<Vec<UnifiedStory>, Error> {
        let envelope: UnifiedEnvelope = self.get(endpoints::UNIFIED_STORIES, false).await?;
        Ok(envelope.stories)
    }

    /// Fetch the graph of a unified story by its key.
    pub async fn story_graph(&self, story_key: &str) -> Result<StoryGraphResponse, Error> {
        let path = format!("{}/{story_key}", endpoints::STORY_GRAPH);
        self.get(&path, true).await
    }

    /// Start a new play session for a backend story.
    pub async fn start_story(&self, story_id: i64) -> Result<Session, Error> {
        let envelope: SessionEnvelope = self
            .post(endpoints::START_STORY, &StartRequest { story_id })
            .await?;
        Ok(envelope.session)
    }

    /// Submit a choice within a session.
    pub async fn make_choice(&self, session_id: i64, choice_id: i64) -> Result<ChoiceResponse, Error> {
        self.post(
            endpoints::MAKE_CHOICE,
            &ChoiceRequest {
                session_id,
                choice_id,
            },
        )
        .await
    }

    /// List the current user's past sessions.
    pub async fn user_sessions(&self) -> Result<Vec<UserSession>, Error> {
        let envelope: SessionsEnvelope = self.get(endpoints::USER_SESSIONS, true).await?;
        Ok(envelope.sessions)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, authenticated: bool) -> Result<T, Error> {
        let headers = if authenticated {
            self.build_headers()?
        } else {
            plain_headers()
        };

        debug!(path, "GET");
        let response = self
            .client
            .get(self.url(path))
            .headers(headers)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        decode(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, Error> {
        let headers = self.build_headers()?;

        debug!(path, "POST");
        let response = self
            .client
            .post(self.url(path))
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        decode(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = plain_headers();
        if let Some(token) = &self.token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| Error::Config(format!("Invalid token: {e}")))?,
            );
        }
        Ok(headers)
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .unwrap_or_default()
}

fn plain_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, Error> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Api {
            status,
            message: body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| Error::Parse(e.to_string()))
}

// ============================================================================
// Public types
// ============================================================================

/// A story authored on the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendStory {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
}

/// A backend story together with its graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryDetail {
    #[serde(flatten)]
    pub story: BackendStory,
    pub start_node_id: String,
    pub graph: HashMap<String, GraphNode>,
}

/// A node of a story graph as delivered by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub choices: Vec<GraphChoice>,
}

/// An outgoing edge of a [`GraphNode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphChoice {
    pub text: String,
    pub next_id: String,
}

/// Whether a catalog entry is a local tale or a backend story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryKind {
    /// Played entirely on the device.
    Cuento,
    /// Backed by a server session.
    Story,
    #[serde(other)]
    Unknown,
}

/// An entry of the unified catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedStory {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub story_key: String,
    #[serde(rename = "type")]
    pub kind: StoryKind,
    #[serde(default)]
    pub original_id: Option<i64>,
}

/// Display metadata returned alongside a story graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoryMetadata {
    pub title: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Response of the story graph endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryGraphResponse {
    pub story_key: String,
    #[serde(rename = "type")]
    pub kind: StoryKind,
    pub graph: HashMap<String, GraphNode>,
    #[serde(default)]
    pub metadata: StoryMetadata,
    #[serde(default)]
    pub start_node_id: Option<String>,
}

/// A server-side play session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: i64,
    pub story: SessionStory,
    pub current_node: SessionNode,
}

/// The story a session belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStory {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// The server's view of a position in the story graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionNode {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub is_ending: bool,
    #[serde(default)]
    pub choices: Vec<SessionChoice>,
}

/// A choice as identified by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionChoice {
    /// Server-assigned choice id; older payloads omit it.
    #[serde(default)]
    pub id: Option<i64>,
    pub text: String,
    pub next_node_id: String,
}

/// Response to a submitted choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceResponse {
    #[serde(default)]
    pub choice: Option<ChoiceEcho>,
    #[serde(default)]
    pub next_node: Option<SessionNode>,
    #[serde(default)]
    pub ending: Option<String>,
    #[serde(default)]
    pub story_finished: bool,
}

/// The server's record of the choice it accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceEcho {
    pub text: String,
    pub from_node_id: String,
    pub to_node_id: String,
}

/// A past session of the current user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub id: i64,
    pub status: String,
    pub created_at: String,
    pub story: UserSessionStory,
    #[serde(default)]
    pub choices: Vec<RecordedChoice>,
}

/// Story summary attached to a [`UserSession`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSessionStory {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// A choice recorded within a past session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedChoice {
    pub choice_text: String,
    pub from_node_id: String,
    pub to_node_id: String,
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    story_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChoiceRequest {
    session_id: i64,
    choice_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DetailEnvelope {
    Wrapped { story: StoryDetail },
    Bare(StoryDetail),
}

#[derive(Debug, Deserialize)]
struct UnifiedEnvelope {
    stories: Vec<UnifiedStory>,
}

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    session: Session,
}

#[derive(Debug, Deserialize)]
struct SessionsEnvelope {
    #[serde(default)]
    sessions: Vec<UserSession>,
}
