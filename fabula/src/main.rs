//! Interactive story player for the terminal.
//!
//! Plays branching stories with a typewriter effect, either from the bundled
//! library or from the story backend.
//!
//! ```bash
//! cargo run -p fabula -- play leonRaton
//! cargo run -p fabula -- play forest --speed 5
//! ```

mod headless;

use fabula_core::ClientConfig;
use headless::Options;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Logs go to stderr so they never interleave with the story on stdout
    let filter = EnvFilter::try_from_env("FABULA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let options = headless::parse_options(&args);
    let config = apply_options(ClientConfig::from_env()?, &options);

    match options.command.as_deref() {
        Some("play") => match options.story_key.as_deref() {
            Some(key) => headless::run_play(config, options.remote, key).await?,
            None => return Err("Usage: fabula play <story-key>".into()),
        },
        Some("check") => match options.story_key.as_deref() {
            Some(key) => headless::run_check(config, options.remote, key).await?,
            None => return Err("Usage: fabula check <story-key>".into()),
        },
        Some("list") => headless::run_list(config, options.remote).await?,
        Some("history") => headless::run_history(config, options.remote).await?,
        Some(other) => return Err(format!("Unknown command '{other}'. Try --help.").into()),
        None => print_help(),
    }

    Ok(())
}

fn apply_options(mut config: ClientConfig, options: &Options) -> ClientConfig {
    if let Some(speed) = options.speed {
        config = config.with_typing_interval(speed);
    }
    if let Some(user) = &options.user {
        config = config.with_user(user.as_str());
    }
    config
}

fn print_help() {
    println!("fabula - interactive story player");
    println!();
    println!("USAGE:");
    println!("  fabula <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("  play <KEY>       Play a story");
    println!("  list             List available stories");
    println!("  history          Show past playthroughs");
    println!("  check <KEY>      Report choices that lead to missing nodes");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help       Show this help message");
    println!("  --remote         Use the backend catalog instead of the bundled stories;");
    println!("                   with history, show only the backend's sessions");
    println!("  --speed <MS>     Milliseconds per revealed character (default: 18)");
    println!("  --user <ID>      Play as this user (default: guest)");
    println!();
    println!("WHILE PLAYING:");
    println!("  1 / 2            Take the first or second choice");
    println!("  <enter> or s     Show the rest of the text");
    println!("  q                Quit");
    println!();
    println!("ENVIRONMENT:");
    println!("  FABULA_API_URL, FABULA_TOKEN, FABULA_USER, FABULA_DATA_DIR,");
    println!("  FABULA_TYPING_MS, FABULA_LOG (log filter, default: warn)");
    println!();
    println!("EXAMPLES:");
    println!("  fabula play leonRaton");
    println!("  fabula play forest --speed 5 --user ana");
    println!("  fabula list --remote");
}
