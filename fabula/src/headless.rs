//! Line-oriented story shell.
//!
//! The story is printed to stdout as it is revealed. Input is one command per
//! line:
//! - `1` / `2` take a choice
//! - an empty line or `s` skips the reveal
//! - `q` quits

use fabula_core::{
    ClientConfig, LaunchError, PlaybackEvent, PlayerCommand, PlayerHandle, Storyteller,
};
use std::io::{self, BufRead, Write};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Parsed command line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Options {
    pub command: Option<String>,
    pub story_key: Option<String>,
    pub remote: bool,
    pub speed: Option<Duration>,
    pub user: Option<String>,
}

pub fn parse_options(args: &[String]) -> Options {
    let mut options = Options::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--remote" => options.remote = true,
            "--speed" => {
                if let Some(ms) = args.get(i + 1).and_then(|s| s.parse().ok()) {
                    options.speed = Some(Duration::from_millis(ms));
                    i += 1;
                }
            }
            "--user" => {
                if let Some(user) = args.get(i + 1) {
                    options.user = Some(user.clone());
                    i += 1;
                }
            }
            positional if options.command.is_none() => {
                options.command = Some(positional.to_string());
            }
            positional if options.story_key.is_none() => {
                options.story_key = Some(positional.to_string());
            }
            _ => {}
        }
        i += 1;
    }

    options
}

/// Map an input line to a player command.
pub fn parse_input(line: &str) -> Option<PlayerCommand> {
    match line.trim() {
        "" | "s" => Some(PlayerCommand::Skip),
        "1" => Some(PlayerCommand::Select(0)),
        "2" => Some(PlayerCommand::Select(1)),
        "q" | "quit" => Some(PlayerCommand::Exit),
        _ => None,
    }
}

/// Play `story_key` until it ends or the reader quits.
pub async fn run_play(config: ClientConfig, remote: bool, story_key: &str) -> Result<(), LaunchError> {
    let storyteller = Storyteller::from_config(config, remote)?;
    let handle = storyteller.play(story_key).await?;
    drive(handle).await;
    Ok(())
}

/// Read stdin on its own thread so a pending read never holds up exit.
fn spawn_input() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn drive(mut handle: PlayerHandle) {
    let mut input = spawn_input();
    let mut input_open = true;

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(event) => render(&event),
                None => break,
            },
            line = input.recv(), if input_open => match line {
                Some(line) => match parse_input(&line) {
                    Some(command) => {
                        debug!(?command, "reader command");
                        handle.send(command);
                    }
                    None => println!("[?] 1/2 to choose, enter to skip, q to quit"),
                },
                None => {
                    debug!("stdin closed, leaving story");
                    input_open = false;
                    handle.exit();
                }
            },
        }
    }

    handle.join().await;
}

fn render(event: &PlaybackEvent) {
    let mut stdout = io::stdout();
    match event {
        PlaybackEvent::NodeEntered { .. } => println!(),
        PlaybackEvent::Reveal { chunk, .. } => {
            print!("{chunk}");
            stdout.flush().ok();
        }
        PlaybackEvent::AwaitingChoice { choices } => {
            println!();
            println!();
            for (i, choice) in choices.iter().enumerate() {
                println!("  [{}] {choice}", i + 1);
            }
        }
        PlaybackEvent::ChoiceMade { text, .. } => println!("> {text}"),
        PlaybackEvent::Finished { summary, .. } => {
            println!();
            println!();
            println!("=== {} ===", summary.title);
            for (i, decision) in summary.decisions.iter().enumerate() {
                println!("  {}. {decision}", i + 1);
            }
            println!("[END] {}", summary.ending_id);
        }
        PlaybackEvent::Error(e) if e.is_fatal() => println!("\n[ERROR] {e}"),
        PlaybackEvent::Error(e) => println!("\n[ERROR] {e} (choose again to retry)"),
    }
}

pub async fn run_list(config: ClientConfig, remote: bool) -> Result<(), LaunchError> {
    let storyteller = Storyteller::from_config(config, remote)?;
    for entry in storyteller.catalog().await? {
        let marker = if entry.requires_session { " [online]" } else { "" };
        println!("{:<16} {}{marker}", entry.story_key, entry.title);
        if !entry.description.is_empty() {
            println!("{:<16} {}", "", entry.description);
        }
    }
    Ok(())
}

/// Print past playthroughs. With `remote`, only the backend's sessions are
/// shown and a failed fetch is reported instead of falling back to local data.
pub async fn run_history(config: ClientConfig, remote: bool) -> Result<(), LaunchError> {
    let storyteller = Storyteller::from_config(config, false)?;
    let listing = if remote {
        storyteller.remote_history().await?
    } else {
        storyteller.history().await
    };

    if let Some(e) = &listing.error {
        println!("[ERROR] Couldn't load history: {e}");
        return Ok(());
    }
    if listing.sessions.is_empty() {
        println!("No stories played yet.");
    }
    for session in &listing.sessions {
        println!("{}  {} ({})", session.created_at, session.title, session.status);
        for decision in &session.decisions {
            println!("    - {decision}");
        }
        if let Some(ending) = &session.ending {
            println!("    {ending}");
        }
    }
    Ok(())
}

pub async fn run_check(config: ClientConfig, remote: bool, story_key: &str) -> Result<(), LaunchError> {
    let storyteller = Storyteller::from_config(config, remote)?;
    let story = storyteller.resolve(story_key).await?;
    let dangling = story.graph.dangling_references();

    println!("{}: {} nodes, start '{}'", story.meta.title, story.graph.len(), story.start_id);
    if dangling.is_empty() {
        println!("All choices lead somewhere.");
    }
    for reference in &dangling {
        println!(
            "  {} choice {} -> missing '{}'",
            reference.from_node,
            reference.choice_index + 1,
            reference.missing_id
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_play_options() {
        let options = parse_options(&args(&["play", "forest", "--speed", "5", "--user", "ana", "--remote"]));
        assert_eq!(options.command.as_deref(), Some("play"));
        assert_eq!(options.story_key.as_deref(), Some("forest"));
        assert_eq!(options.speed, Some(Duration::from_millis(5)));
        assert_eq!(options.user.as_deref(), Some("ana"));
        assert!(options.remote);
    }

    #[test]
    fn test_parse_bad_speed_ignored() {
        let options = parse_options(&args(&["play", "--speed", "fast", "forest"]));
        assert_eq!(options.speed, None);
        // "fast" is taken as the story key, "forest" is extra
        assert_eq!(options.story_key.as_deref(), Some("fast"));
    }

    #[tokio::test]
    async fn test_remote_history_without_backend() {
        let options = parse_options(&args(&["history", "--remote"]));
        assert_eq!(options.command.as_deref(), Some("history"));
        assert!(options.remote);

        let err = run_history(ClientConfig::new(), options.remote).await.unwrap_err();
        assert!(matches!(err, LaunchError::NoBackend));
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("1"), Some(PlayerCommand::Select(0)));
        assert_eq!(parse_input(" 2 "), Some(PlayerCommand::Select(1)));
        assert_eq!(parse_input(""), Some(PlayerCommand::Skip));
        assert_eq!(parse_input("s"), Some(PlayerCommand::Skip));
        assert_eq!(parse_input("q"), Some(PlayerCommand::Exit));
        assert_eq!(parse_input("3"), None);
    }
}
