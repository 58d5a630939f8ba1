//! Drives a [`StoryPlayer`] inside one tokio task.
//!
//! The task owns the player and therefore the reveal timer. The shell talks
//! to it through a [`PlayerHandle`]: commands go in, [`PlaybackEvent`]s come
//! out. Timer ticks and commands are handled one at a time, so a reveal never
//! races a choice.

use crate::error::PlaybackError;
use crate::player::{PlaybackEvent, PlayerBuilder, StoryPlayer, Transition};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Input from the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    Select(usize),
    Skip,
    /// Leave the story. Any choice still waiting on the server is abandoned.
    Exit,
}

/// Shell-side end of a running player.
pub struct PlayerHandle {
    commands: UnboundedSender<PlayerCommand>,
    events: UnboundedReceiver<PlaybackEvent>,
    task: JoinHandle<StoryPlayer>,
}

impl PlayerHandle {
    /// Send a command. Returns `false` once the player has stopped.
    pub fn send(&self, command: PlayerCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn select(&self, index: usize) -> bool {
        self.send(PlayerCommand::Select(index))
    }

    pub fn skip(&self) -> bool {
        self.send(PlayerCommand::Skip)
    }

    pub fn exit(&self) -> bool {
        self.send(PlayerCommand::Exit)
    }

    /// Next event, or `None` once the player has stopped and every event was
    /// delivered.
    pub async fn next_event(&mut self) -> Option<PlaybackEvent> {
        self.events.recv().await
    }

    /// Wait for the player to stop and take it back.
    ///
    /// Returns `None` if the player task panicked or was aborted.
    pub async fn join(self) -> Option<StoryPlayer> {
        match self.task.await {
            Ok(player) => Some(player),
            Err(e) => {
                warn!(error = %e, "player task failed");
                None
            }
        }
    }
}

/// Spawns players.
pub struct PlayerRunner;

impl PlayerRunner {
    /// Build the player with an event channel and run it on the current
    /// runtime.
    pub fn spawn(builder: PlayerBuilder) -> Result<PlayerHandle, PlaybackError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let player = builder.with_events(event_tx).build()?;
        let task = tokio::spawn(run(player, command_rx));

        Ok(PlayerHandle {
            commands: command_tx,
            events: event_rx,
            task,
        })
    }
}

async fn run(mut player: StoryPlayer, mut commands: UnboundedReceiver<PlayerCommand>) -> StoryPlayer {
    while !player.is_finished() && !player.is_halted() {
        tokio::select! {
            generation = player.next_tick() => {
                player.apply_tick(generation);
            }
            command = commands.recv() => match command {
                Some(PlayerCommand::Skip) => {
                    player.skip_reveal();
                }
                Some(PlayerCommand::Select(index)) => {
                    if !submit(&mut player, &mut commands, index).await {
                        break;
                    }
                }
                Some(PlayerCommand::Exit) | None => break,
            },
        }
    }

    player.flush_persistence().await;
    player.teardown();
    player
}

/// Run one choice to completion while still listening for `Exit`.
///
/// Returns `false` when the shell left before the choice resolved; the
/// submission is dropped and its result never applied.
async fn submit(
    player: &mut StoryPlayer,
    commands: &mut UnboundedReceiver<PlayerCommand>,
    index: usize,
) -> bool {
    let outcome = {
        let submission = player.select_choice(index);
        tokio::pin!(submission);
        loop {
            tokio::select! {
                biased;
                result = &mut submission => break Some(result),
                command = commands.recv() => match command {
                    Some(PlayerCommand::Exit) | None => break None,
                    Some(other) => debug!(?other, "ignoring command during choice submission"),
                },
            }
        }
    };

    match outcome {
        Some(Ok(Transition::Ignored)) => debug!(index, "choice ignored"),
        Some(Ok(_)) => {}
        // Already reported as an event.
        Some(Err(e)) => debug!(error = %e, "choice failed"),
        None => {
            debug!(index, "abandoning choice submission");
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StoryGraph;
    use crate::source::StoryMeta;
    use crate::bridge::RemoteSession;
    use crate::testing::{mirror_node, path_graph, MockBackend};
    use crate::typewriter::DEFAULT_TYPING_INTERVAL;
    use std::sync::Arc;
    use std::time::Duration;

    fn builder(graph: StoryGraph) -> PlayerBuilder {
        PlayerBuilder::new(Arc::new(graph), "start", StoryMeta::new("t", "T"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_reveals_start_text() {
        let mut handle = PlayerRunner::spawn(builder(path_graph(1))).unwrap();

        let mut text = String::new();
        loop {
            match handle.next_event().await.unwrap() {
                PlaybackEvent::Reveal { chunk, .. } => text.push_str(&chunk),
                PlaybackEvent::AwaitingChoice { choices } => {
                    assert_eq!(choices.len(), 2);
                    break;
                }
                _ => {}
            }
        }
        assert_eq!(text, "Text of start");

        handle.exit();
        let player = handle.join().await.unwrap();
        assert!(!player.is_finished());
        assert!(player.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveal_takes_one_interval_per_char() {
        let started = tokio::time::Instant::now();
        let mut handle = PlayerRunner::spawn(builder(path_graph(1))).unwrap();

        while !matches!(
            handle.next_event().await.unwrap(),
            PlaybackEvent::AwaitingChoice { .. }
        ) {}

        let chars = "Text of start".chars().count() as u32;
        assert!(started.elapsed() >= DEFAULT_TYPING_INTERVAL * chars);
        handle.exit();
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_and_select_to_finish() {
        let mut handle = PlayerRunner::spawn(builder(path_graph(2))).unwrap();

        handle.skip();
        handle.select(0);
        handle.skip();
        handle.select(1);
        handle.skip();

        let mut finished = None;
        while let Some(event) = handle.next_event().await {
            if let PlaybackEvent::Finished { summary, .. } = event {
                finished = Some(summary);
            }
        }

        let summary = finished.unwrap();
        assert_eq!(summary.decisions, vec!["start: left", "step1: right"]);
        assert_eq!(summary.ending_id, "end");

        let player = handle.join().await.unwrap();
        assert!(player.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_closes_events() {
        let mut handle = PlayerRunner::spawn(builder(path_graph(3))).unwrap();
        handle.exit();

        while handle.next_event().await.is_some() {}
        assert!(!handle.skip());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_during_submission_discards_choice() {
        let graph = path_graph(1);
        let backend = Arc::new(
            MockBackend::new()
                .with_session(9, mirror_node(graph.get("start").unwrap(), 1))
                .then_finished(None)
                .with_submit_delay(Duration::from_secs(5)),
        );
        let session = RemoteSession::start(backend.clone(), 3).await.unwrap();
        let mut handle = PlayerRunner::spawn(builder(graph).with_remote(session)).unwrap();

        handle.skip();
        handle.select(0);
        handle.exit();

        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            events.push(event);
        }
        let player = handle.join().await.unwrap();

        assert_eq!(backend.submitted(), vec![(9, 1)]);
        assert!(!player.is_finished());
        assert!(player.history().is_empty());
        assert_eq!(player.current_node().id, "start");
        assert!(!events.iter().any(|e| matches!(
            e,
            PlaybackEvent::ChoiceMade { .. } | PlaybackEvent::Finished { .. }
        )));
    }
}
