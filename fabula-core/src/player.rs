//! Playback state machine.
//!
//! A [`StoryPlayer`] walks one story graph from its start node. Each node is
//! revealed by the typewriter, then either offers its two choices or, when it
//! has none, ends the playthrough. The player owns every piece of mutable
//! playback state: the typewriter and its timer, the history, and the remote
//! session when there is one. Collaborators only report results back.
//!
//! Progress is reported to the embedding shell as [`PlaybackEvent`]s on an
//! unbounded channel; [`StoryPlayer::view`] gives a snapshot at any time.

use crate::bridge::{RemoteSession, RemoteStep};
use crate::error::PlaybackError;
use crate::graph::{StoryGraph, StoryNode};
use crate::recorder::{HistoryEntry, PlaythroughRecorder, PlaythroughSummary};
use crate::source::{ResolvedStory, StoryMeta};
use crate::typewriter::{RevealTimer, Tick, Typewriter, DEFAULT_TYPING_INTERVAL};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where the player is in the current node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// The node's text is still being revealed.
    Revealing,
    /// The text is shown and two choices are on offer.
    AwaitingChoice,
    /// The text is shown and the node has no choices. Absorbing.
    Terminal,
}

/// Notifications for the embedding shell.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// A new node became current and its reveal started.
    NodeEntered { node_id: String },
    /// More text became visible.
    Reveal {
        chunk: String,
        revealed: usize,
        total: usize,
    },
    /// The reveal finished on a branching node.
    AwaitingChoice { choices: Vec<String> },
    /// A choice was accepted and recorded.
    ChoiceMade {
        node_id: String,
        index: usize,
        text: String,
    },
    /// The playthrough ended. Sent once.
    Finished {
        history: Vec<HistoryEntry>,
        summary: PlaythroughSummary,
    },
    Error(PlaybackError),
}

/// Result of a [`StoryPlayer::select_choice`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The call was not valid in the current state and changed nothing.
    Ignored,
    /// Playback moved to `node_id` and is revealing it.
    Advanced { node_id: String },
    /// Playback moved to a terminal node and finished.
    Finished,
}

/// Snapshot of what the shell should display.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerView {
    pub node_id: String,
    pub revealed: String,
    /// Visible and total characters.
    pub progress: (usize, usize),
    pub state: PlaybackState,
    /// Labels of the choices on offer; empty unless awaiting a choice.
    pub choices: Vec<String>,
    pub finished: bool,
    pub error: Option<PlaybackError>,
}

/// Assembles a [`StoryPlayer`].
pub struct PlayerBuilder {
    graph: Arc<StoryGraph>,
    start_id: String,
    meta: StoryMeta,
    interval: Duration,
    remote: Option<RemoteSession>,
    recorder: Option<PlaythroughRecorder>,
    events: Option<UnboundedSender<PlaybackEvent>>,
}

impl std::fmt::Debug for PlayerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerBuilder")
            .field("story_key", &self.meta.story_key)
            .field("start_id", &self.start_id)
            .field("interval", &self.interval)
            .field("remote", &self.remote)
            .field("recorder", &self.recorder.is_some())
            .finish()
    }
}

impl PlayerBuilder {
    pub fn new(graph: Arc<StoryGraph>, start_id: impl Into<String>, meta: StoryMeta) -> Self {
        Self {
            graph,
            start_id: start_id.into(),
            meta,
            interval: DEFAULT_TYPING_INTERVAL,
            remote: None,
            recorder: None,
            events: None,
        }
    }

    /// Start from a resolved story. Any remote session is attached separately.
    pub fn for_story(story: &ResolvedStory) -> Self {
        Self::new(
            Arc::clone(&story.graph),
            story.start_id.clone(),
            story.meta.clone(),
        )
    }

    pub fn with_typing_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_remote(mut self, session: RemoteSession) -> Self {
        self.remote = Some(session);
        self
    }

    pub fn with_recorder(mut self, recorder: PlaythroughRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_events(mut self, events: UnboundedSender<PlaybackEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Enter the start node and begin revealing it.
    ///
    /// Fails when the start node is missing, or when an attached session
    /// starts somewhere else.
    pub fn build(self) -> Result<StoryPlayer, PlaybackError> {
        let start = self
            .graph
            .get(&self.start_id)
            .cloned()
            .ok_or_else(|| PlaybackError::missing_node(&self.start_id, None))?;

        if let Some(remote) = &self.remote {
            let server_start = &remote.current_node().id;
            if *server_start != start.id {
                return Err(PlaybackError::SessionDesync {
                    expected: start.id,
                    actual: server_start.clone(),
                });
            }
        }

        info!(
            story_key = %self.meta.story_key,
            start = %start.id,
            remote = self.remote.is_some(),
            "starting playback"
        );

        let mut player = StoryPlayer {
            graph: self.graph,
            meta: self.meta,
            current: start.clone(),
            typewriter: Typewriter::new(),
            timer: RevealTimer::new(self.interval),
            history: Vec::new(),
            remote: self.remote,
            recorder: self.recorder,
            events: self.events,
            finished: false,
            summary: None,
            persistence: None,
            halted: None,
            torn_down: false,
        };
        player.enter(start);
        Ok(player)
    }
}

/// The playback state machine for one playthrough.
pub struct StoryPlayer {
    graph: Arc<StoryGraph>,
    meta: StoryMeta,
    current: StoryNode,
    typewriter: Typewriter,
    timer: RevealTimer,
    history: Vec<HistoryEntry>,
    remote: Option<RemoteSession>,
    recorder: Option<PlaythroughRecorder>,
    events: Option<UnboundedSender<PlaybackEvent>>,
    /// Latched on the first arrival at a terminal node.
    finished: bool,
    summary: Option<PlaythroughSummary>,
    persistence: Option<JoinHandle<()>>,
    halted: Option<PlaybackError>,
    torn_down: bool,
}

impl std::fmt::Debug for StoryPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryPlayer")
            .field("story_key", &self.meta.story_key)
            .field("current", &self.current.id)
            .field("state", &self.state())
            .field("history", &self.history.len())
            .field("remote", &self.remote)
            .field("finished", &self.finished)
            .field("halted", &self.halted)
            .finish()
    }
}

impl StoryPlayer {
    pub fn state(&self) -> PlaybackState {
        if self.typewriter.is_revealing() {
            PlaybackState::Revealing
        } else if self.current.is_terminal() {
            PlaybackState::Terminal
        } else {
            PlaybackState::AwaitingChoice
        }
    }

    pub fn current_node(&self) -> &StoryNode {
        &self.current
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn meta(&self) -> &StoryMeta {
        &self.meta
    }

    pub fn graph(&self) -> &StoryGraph {
        &self.graph
    }

    pub fn remote_session(&self) -> Option<&RemoteSession> {
        self.remote.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The summary built when playback finished.
    pub fn summary(&self) -> Option<&PlaythroughSummary> {
        self.summary.as_ref()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// The fatal error that halted playback, if any.
    pub fn halt_reason(&self) -> Option<&PlaybackError> {
        self.halted.as_ref()
    }

    pub fn view(&self) -> PlayerView {
        let choices = match self.state() {
            PlaybackState::AwaitingChoice => self.choice_labels(),
            PlaybackState::Revealing | PlaybackState::Terminal => Vec::new(),
        };
        PlayerView {
            node_id: self.current.id.clone(),
            revealed: self.typewriter.revealed().to_string(),
            progress: self.typewriter.progress(),
            state: self.state(),
            choices,
            finished: self.finished,
            error: self.halted.clone(),
        }
    }

    /// Wait for the reveal timer and return the generation it fired for.
    ///
    /// Pending forever while nothing is being revealed. Cancel-safe.
    pub async fn next_tick(&mut self) -> u64 {
        self.timer.fire().await
    }

    /// Apply a timer tick. Ticks from a superseded reveal are ignored.
    pub fn apply_tick(&mut self, generation: u64) -> Tick {
        if self.torn_down {
            return Tick::Stale;
        }

        let tick = self.typewriter.tick(generation);
        match &tick {
            Tick::Advanced(chunk) => self.emit_reveal(chunk.clone()),
            Tick::Completed(chunk) => {
                self.emit_reveal(chunk.clone());
                self.reveal_complete();
            }
            Tick::Stale => debug!(generation, "dropping stale reveal tick"),
            Tick::Idle => {}
        }
        tick
    }

    /// Show the rest of the current text at once.
    ///
    /// Returns `false`, changing nothing, when no reveal is in progress.
    pub fn skip_reveal(&mut self) -> bool {
        if self.torn_down {
            return false;
        }
        let Some(rest) = self.typewriter.skip() else {
            return false;
        };
        self.emit_reveal(rest);
        self.reveal_complete();
        true
    }

    /// Take choice `index` (0 or 1) of the current node.
    ///
    /// Ignored unless awaiting a choice. With a remote session attached, the
    /// server must accept the choice before anything changes locally: a
    /// failed submission leaves the node, its choices and the history as
    /// they were. A missing target node or a server that went somewhere else
    /// halts playback.
    ///
    /// Dropping the returned future before it resolves changes nothing.
    pub async fn select_choice(&mut self, index: usize) -> Result<Transition, PlaybackError> {
        if self.torn_down {
            return Ok(Transition::Ignored);
        }
        if let Some(err) = &self.halted {
            return Err(err.clone());
        }
        if self.state() != PlaybackState::AwaitingChoice {
            debug!(node = %self.current.id, state = ?self.state(), "ignoring choice");
            return Ok(Transition::Ignored);
        }
        let Some(choice) = self.current.choice(index).cloned() else {
            debug!(node = %self.current.id, index, "ignoring out-of-range choice");
            return Ok(Transition::Ignored);
        };

        let Some(next) = self.graph.get(&choice.next_id).cloned() else {
            return Err(self.halt(PlaybackError::missing_node(
                &choice.next_id,
                Some(&self.current.id),
            )));
        };

        if let Some(remote) = self.remote.as_mut() {
            match remote.submit(index).await {
                Ok(RemoteStep::Next(node)) if node.id != next.id => {
                    return Err(self.halt(PlaybackError::SessionDesync {
                        expected: next.id,
                        actual: node.id,
                    }));
                }
                Ok(RemoteStep::Finished { .. }) if !next.is_terminal() => {
                    return Err(self.halt(PlaybackError::SessionDesync {
                        expected: next.id,
                        actual: "<finished>".to_string(),
                    }));
                }
                Ok(_) => {}
                Err(err) => {
                    self.emit(PlaybackEvent::Error(err.clone()));
                    return Err(err);
                }
            }
        }

        debug!(from = %self.current.id, to = %next.id, index, "choice taken");
        self.history.push(HistoryEntry::choice(
            self.current.id.clone(),
            index,
            choice.text.clone(),
        ));
        self.emit(PlaybackEvent::ChoiceMade {
            node_id: self.current.id.clone(),
            index,
            text: choice.text,
        });

        let node_id = next.id.clone();
        self.enter(next);
        Ok(if self.finished {
            Transition::Finished
        } else {
            Transition::Advanced { node_id }
        })
    }

    /// Finish playback if it is sitting on a fully revealed terminal node.
    ///
    /// Safe to call any number of times: the summary is built and handed off
    /// only on the first arrival. Returns whether this call finished playback.
    pub fn settle(&mut self) -> bool {
        if self.finished || self.torn_down || self.state() != PlaybackState::Terminal {
            return false;
        }
        self.finished = true;
        self.timer.cancel();

        self.history.push(HistoryEntry::visit(self.current.id.clone()));
        let summary = PlaythroughRecorder::summarize(&self.meta, &self.history, &self.current);
        if let Some(recorder) = &self.recorder {
            self.persistence = recorder.record(summary.clone());
        }
        if let Some(remote) = self.remote.take() {
            debug!(session_id = remote.session_id(), "releasing remote session");
        }

        info!(
            story_key = %self.meta.story_key,
            ending = %self.current.id,
            decisions = summary.decisions.len(),
            "playback finished"
        );
        self.summary = Some(summary.clone());
        self.emit(PlaybackEvent::Finished {
            history: self.history.clone(),
            summary,
        });
        true
    }

    /// Wait for the playthrough summary to reach the store.
    pub async fn flush_persistence(&mut self) {
        if let Some(handle) = self.persistence.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "playthrough save task failed");
            }
        }
    }

    /// Stop playback for good: cancels the reveal, drops the remote session
    /// and closes the event stream. Nothing changes state afterwards.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        debug!(node = %self.current.id, "tearing down player");
        self.torn_down = true;
        self.typewriter.cancel();
        self.timer.cancel();
        self.remote = None;
        self.events = None;
    }

    fn enter(&mut self, node: StoryNode) {
        let generation = self.typewriter.start(node.content.clone());
        self.emit(PlaybackEvent::NodeEntered {
            node_id: node.id.clone(),
        });
        self.current = node;

        if self.typewriter.is_revealing() {
            self.timer.start(generation);
        } else {
            self.reveal_complete();
        }
    }

    fn reveal_complete(&mut self) {
        self.timer.cancel();
        if self.current.is_terminal() {
            self.settle();
        } else {
            self.emit(PlaybackEvent::AwaitingChoice {
                choices: self.choice_labels(),
            });
        }
    }

    fn halt(&mut self, err: PlaybackError) -> PlaybackError {
        warn!(node = %self.current.id, error = %err, "playback halted");
        self.timer.cancel();
        self.halted = Some(err.clone());
        self.emit(PlaybackEvent::Error(err.clone()));
        err
    }

    fn choice_labels(&self) -> Vec<String> {
        self.current
            .choices
            .iter()
            .flatten()
            .map(|c| c.text.clone())
            .collect()
    }

    fn emit_reveal(&self, chunk: String) {
        let (revealed, total) = self.typewriter.progress();
        self.emit(PlaybackEvent::Reveal {
            chunk,
            revealed,
            total,
        });
    }

    fn emit(&self, event: PlaybackEvent) {
        if let Some(events) = &self.events {
            // A closed receiver only means nobody is watching.
            let _ = events.send(event);
        }
    }
}
