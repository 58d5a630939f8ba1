//! Recording finished playthroughs and reading them back as history.

use fabula_core::testing::{user_session, MockBackend};
use fabula_core::{
    ClientConfig, LocalGraphs, MemoryStore, PlaybackEvent, PlayedStoryStore, PlayerCommand,
    Storyteller,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn config(dir: &TempDir) -> ClientConfig {
    ClientConfig::new()
        .with_data_dir(dir.path())
        .with_user("ana")
        .with_typing_interval(Duration::from_millis(1))
}

/// Play `key` to the end always taking the first choice.
async fn play_first_choices(storyteller: &Storyteller, key: &str) -> Vec<PlaybackEvent> {
    let mut handle = storyteller.play(key).await.unwrap();
    for _ in 0..16 {
        handle.send(PlayerCommand::Skip);
        handle.send(PlayerCommand::Select(0));
    }
    handle.send(PlayerCommand::Skip);

    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    let player = handle.join().await.unwrap();
    assert!(player.is_finished());
    events
}

#[tokio::test]
async fn test_finished_story_saved_to_disk() {
    let dir = TempDir::new().unwrap();
    let storyteller = Storyteller::from_config(config(&dir), false).unwrap();

    let events = play_first_choices(&storyteller, "leonRaton").await;
    let summary = events
        .iter()
        .find_map(|e| match e {
            PlaybackEvent::Finished { summary, .. } => Some(summary.clone()),
            _ => None,
        })
        .unwrap();

    let played = storyteller.played().await.unwrap();
    assert_eq!(played, vec![summary.clone()]);
    assert_eq!(played[0].story_key, "leonRaton");
    assert_eq!(played[0].progress, 100);

    // A fresh client over the same directory sees the same record.
    let reopened = Storyteller::from_config(config(&dir), false).unwrap();
    let listing = reopened.history().await;
    assert!(listing.error.is_none());
    assert_eq!(listing.sessions.len(), 1);
    assert_eq!(listing.sessions[0].title, "El león y el ratón");
    assert_eq!(listing.sessions[0].decisions, summary.decisions);
    assert_eq!(listing.sessions[0].ending.as_deref(), Some(summary.ending_text.as_str()));
}

#[tokio::test]
async fn test_most_recent_first() {
    let dir = TempDir::new().unwrap();
    let storyteller = Storyteller::from_config(config(&dir), false).unwrap();

    play_first_choices(&storyteller, "forest").await;
    play_first_choices(&storyteller, "midnight").await;

    let keys: Vec<_> = storyteller
        .played()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.story_key)
        .collect();
    assert_eq!(keys, vec!["midnight", "forest"]);
}

#[tokio::test]
async fn test_history_falls_back_to_local_records() {
    let store = Arc::new(MemoryStore::new());
    let backend = Arc::new(MockBackend::new().fail_history(503));
    let storyteller = Storyteller::new(
        ClientConfig::new().with_typing_interval(Duration::from_millis(1)),
        Arc::new(LocalGraphs::builtin().unwrap()),
        store.clone(),
    )
    .with_backend(backend);

    play_first_choices(&storyteller, "spaceship").await;

    let listing = storyteller.history().await;
    assert!(listing.error.is_none());
    assert_eq!(listing.sessions.len(), 1);
    assert_eq!(listing.sessions[0].title, "La nave silenciosa");
}

#[tokio::test]
async fn test_history_prefers_backend_sessions() {
    let backend = Arc::new(MockBackend::new().with_history(vec![user_session(
        4,
        "La nave silenciosa",
        &[("Abrir la escotilla", "start", "hatch")],
    )]));
    let storyteller = Storyteller::new(
        ClientConfig::new(),
        Arc::new(LocalGraphs::builtin().unwrap()),
        Arc::new(MemoryStore::new()),
    )
    .with_backend(backend);

    let listing = storyteller.history().await;
    assert!(listing.error.is_none());
    assert_eq!(listing.sessions.len(), 1);
    assert_eq!(listing.sessions[0].id, "4");
    assert_eq!(listing.sessions[0].decisions, vec!["Abrir la escotilla"]);
}

#[tokio::test]
async fn test_history_without_any_source_reports_error() {
    let storyteller = Storyteller::new(
        ClientConfig::new(),
        Arc::new(LocalGraphs::builtin().unwrap()),
        Arc::new(fabula_core::testing::FailingStore),
    );

    let listing = storyteller.history().await;
    assert!(listing.sessions.is_empty());
    assert!(listing.error.is_some());
}

#[tokio::test]
async fn test_store_keeps_users_apart() {
    let store = Arc::new(MemoryStore::new());
    let storyteller = Storyteller::new(
        ClientConfig::new()
            .with_user("ana")
            .with_typing_interval(Duration::from_millis(1)),
        Arc::new(LocalGraphs::builtin().unwrap()),
        store.clone(),
    );
    play_first_choices(&storyteller, "forest").await;

    let other = fabula_core::UserKey::new("luis");
    assert!(store.list(&other).await.unwrap().is_empty());
    assert_eq!(store.list(&storyteller.config().user_key()).await.unwrap().len(), 1);
}
