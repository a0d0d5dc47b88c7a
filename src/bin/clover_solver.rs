use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

use clover::api::HttpCloverApi;
use clover::config::ClientConfig;
use clover::puzzle::{card_faces, clue_pairs};
use clover::realtime::WebSocketFeed;
use clover::storage::{FileStore, KeyValueStore};
use clover::{ClientId, PuzzleId, SessionHandle, StateReplicator};

const LOG_TARGET: &str = "bin::clover_solver";
const DEFAULT_API_URL: &str = "http://localhost:8000/api/";
const DEFAULT_STORAGE_DIR: &str = ".clover";
const CLIENT_ID_KEY: &str = "client_id";

#[derive(Debug, Parser)]
#[command(name = "clover_solver")]
#[command(about = "Solve a clover puzzle from the terminal, in sync with other sessions", long_about = None)]
struct Args {
    /// Puzzle to open
    puzzle_id: String,

    /// Backend REST base URL
    #[arg(long, env = "CLOVER_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Optional explicit websocket base URL (derived from the api url otherwise)
    #[arg(long, env = "CLOVER_REALTIME_URL")]
    realtime_url: Option<String>,

    /// Directory holding cached solver state
    #[arg(long, env = "CLOVER_STORAGE_DIR", default_value = DEFAULT_STORAGE_DIR)]
    storage_dir: PathBuf,

    /// Seconds between reconcile polls
    #[arg(long, env = "CLOVER_POLL_SECS", default_value_t = 60)]
    poll_secs: u64,

    /// Session token sent to the backend (persisted in the storage dir otherwise)
    #[arg(long, env = "CLOVER_CLIENT_ID")]
    client_id: Option<String>,

    /// Prefix of the link placed in share text
    #[arg(long, env = "CLOVER_PLAY_URL")]
    play_url: Option<String>,

    /// Toggle structured (JSON) logs
    #[arg(long, env = "CLOVER_LOG_JSON", default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = Args::parse();
    init_tracing(args.json)?;
    let puzzle_id = PuzzleId::new(args.puzzle_id.clone());
    let explicit_client = args.client_id.clone();
    let config = build_config(args).context("failed to build client config")?;
    run(puzzle_id, config, explicit_client).await
}

fn load_dotenv() {
    let manifest_env = env!("CARGO_MANIFEST_DIR");
    let manifest_env_path = PathBuf::from(manifest_env).join(".env");
    dotenv::from_filename(manifest_env_path).ok();
    dotenv::dotenv().ok();
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().flatten_event(true).init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

fn build_config(args: Args) -> Result<ClientConfig> {
    let api_base = Url::parse(&args.api_url).context("invalid CLOVER_API_URL")?;
    let mut config = ClientConfig::new(api_base, args.storage_dir)?;
    if let Some(raw) = args.realtime_url {
        config.realtime_base = Url::parse(&raw).context("invalid CLOVER_REALTIME_URL")?;
    }
    if args.poll_secs == 0 {
        bail!("poll interval must be at least one second");
    }
    config.poll_interval = Duration::from_secs(args.poll_secs);
    if let Some(play_url) = args.play_url {
        config.play_url_base = play_url;
    }
    Ok(config)
}

fn resolve_client_id(store: &dyn KeyValueStore, explicit: Option<String>) -> Result<ClientId> {
    if let Some(id) = explicit {
        return Ok(ClientId::new(id));
    }
    if let Some(saved) = store.get(CLIENT_ID_KEY)? {
        return Ok(ClientId::new(saved.trim()));
    }
    let id = ClientId::random();
    store
        .set(CLIENT_ID_KEY, id.as_str())
        .context("failed to persist client id")?;
    Ok(id)
}

async fn run(puzzle_id: PuzzleId, config: ClientConfig, explicit_client: Option<String>) -> Result<()> {
    let store = Arc::new(
        FileStore::open(&config.storage_dir).context("failed to open state directory")?,
    );
    let client_id = resolve_client_id(store.as_ref(), explicit_client)?;
    info!(target: LOG_TARGET, %client_id, api = %config.api_base, "starting solver");

    let api = Arc::new(
        HttpCloverApi::new(config.api_base.clone(), &client_id)
            .context("failed to build api client")?,
    );
    let feed = Arc::new(WebSocketFeed::new(config.feed()));
    let replicator =
        StateReplicator::new(config.replicator(), api, feed, store).with_client_id(client_id);
    let handle = replicator
        .initialize(puzzle_id)
        .await
        .context("failed to start replication session")?;

    render(&handle);
    println!("{USAGE}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else { break };
                let command = match Command::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(err) => {
                        println!("{err}\n{USAGE}");
                        continue;
                    }
                };
                if command == Command::Quit {
                    break;
                }
                if let Err(err) = execute(&handle, command).await {
                    warn!(target: LOG_TARGET, error = %err, "command failed");
                    println!("error: {err}");
                }
            }
        }
    }

    handle.settle().await;
    handle.teardown();
    Ok(())
}

const USAGE: &str =
    "commands: show | swap A B | select N | rotate N [STEPS] | submit | share | sync | quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Show,
    Swap(usize, usize),
    Select(usize),
    Rotate(usize, i32),
    Submit,
    Share,
    Sync,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let command = match verb {
            "show" => Command::Show,
            "swap" => Command::Swap(
                next_arg(&mut words, "slot")?.parse()?,
                next_arg(&mut words, "slot")?.parse()?,
            ),
            "select" => Command::Select(next_arg(&mut words, "slot")?.parse()?),
            "rotate" => {
                let slot = next_arg(&mut words, "slot")?.parse()?;
                let steps = match words.next() {
                    Some(raw) => raw.parse()?,
                    None => 1,
                };
                Command::Rotate(slot, steps)
            }
            "submit" => Command::Submit,
            "share" => Command::Share,
            "sync" => Command::Sync,
            "quit" | "exit" => Command::Quit,
            other => bail!("unknown command {other:?}"),
        };
        Ok(Some(command))
    }
}

fn next_arg<'a>(words: &mut impl Iterator<Item = &'a str>, name: &str) -> Result<&'a str> {
    words.next().ok_or_else(|| anyhow!("missing {name}"))
}

async fn execute(handle: &SessionHandle, command: Command) -> Result<()> {
    match command {
        Command::Show => {}
        Command::Swap(a, b) => {
            handle.swap(a, b)?;
        }
        Command::Select(slot) => {
            if handle.select(slot)?.is_none() {
                match handle.selected() {
                    Some(selected) => println!("selected slot {selected}"),
                    None => println!("selection cleared"),
                }
                return Ok(());
            }
        }
        Command::Rotate(slot, steps) => {
            handle.rotate(slot, steps)?;
        }
        Command::Submit => {
            let record = handle.submit_guess().await?;
            if record.is_solved() {
                println!("solved!");
            }
        }
        Command::Share => {
            println!("{}", handle.mark_copied());
            return Ok(());
        }
        Command::Sync => handle.reconcile().await,
        Command::Quit => return Ok(()),
    }
    render(handle);
    Ok(())
}

fn render(handle: &SessionHandle) {
    let state = handle.state();
    let puzzle = handle.puzzle();
    let placements = state.board.placements();
    let card_states = handle.card_states();

    println!("puzzle {} by {}", puzzle.id, puzzle.author);
    for (slot, placement) in placements.iter().enumerate() {
        let faces = card_faces(puzzle, *placement)
            .map(|words| words.join(" / "))
            .unwrap_or_else(|| "?".to_string());
        let marker = if handle.selected() == Some(slot) { '*' } else { ' ' };
        println!(
            "{marker}{slot}: [{faces}] rot {} {:?}",
            placement.orientation.steps(),
            card_states[slot]
        );
    }
    for (index, pair) in clue_pairs(puzzle, placements).into_iter().enumerate() {
        let clue = puzzle.clue(index).unwrap_or("?");
        match pair {
            Some((left, right)) => println!("  {clue}: {left} + {right}"),
            None => println!("  {clue}"),
        }
    }
    for record in &state.board.previous_guesses {
        let row: String = record.feedback().iter().map(|code| code.glyph()).collect();
        println!("  {row}");
    }
    if state.board.guess_submitted {
        println!("(guess submitted)");
    }
}
