use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use pulse_assistant::capability::ConvaClient;
use pulse_assistant::config::{AssistantConfig, TRANSACTIONS_TABLE, USERS_TABLE};
use pulse_assistant::pipeline::{run_pipeline, ProgressSink};
use pulse_assistant::render::{render_or_blank, Figure};
use pulse_assistant::session::SessionState;
use pulse_assistant::store::DataStore;

const APOLOGY: &str = "Sorry, I couldn't find any information on that.";

#[derive(Parser)]
#[command(name = "pulse-assistant")]
#[command(about = "Conversational Q&A over the PhonePe Pulse dataset")]
struct Args {
    /// Run a single query and exit instead of starting the chat loop
    query: Option<String>,

    /// Path to the dataset directory (default: ./data)
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Directory rendered figures are written to (default: ./charts)
    #[arg(short, long, default_value = "charts")]
    out_dir: PathBuf,

    /// Capability service base URL (or set CONVA_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,
}

/// Prints pipeline progress the way the chat UI showed its progress bar.
struct TerminalProgress;

impl ProgressSink for TerminalProgress {
    fn update(&self, percent: u8, label: &str) {
        println!("[{:>3}%] {}", percent, label);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = AssistantConfig::from_env(&args.data_dir, args.base_url.clone())?;

    let store = DataStore::open_in_memory()?;
    let loaded = store.load_csv_table(TRANSACTIONS_TABLE, &config.transactions_csv)?;
    println!("[OK] Loaded {} rows into {}", loaded, TRANSACTIONS_TABLE);
    let loaded = store.load_csv_table(USERS_TABLE, &config.users_csv)?;
    println!("[OK] Loaded {} rows into {}", loaded, USERS_TABLE);

    let mut session = SessionState::new();
    session.seed_related(&config.related_seed)?;

    let client = ConvaClient::new(&config);

    if let Some(query) = args.query {
        session.started = true;
        run_turn(&query, &store, &mut session, &client, &config, &args.out_dir).await?;
        return Ok(());
    }

    chat_loop(&store, &mut session, &client, &config, &args.out_dir).await
}

async fn chat_loop(
    store: &DataStore,
    session: &mut SessionState,
    client: &ConvaClient,
    config: &AssistantConfig,
    out_dir: &Path,
) -> Result<()> {
    println!("PhonePe Pulse Q&A");
    println!("Type a question, the number of a suggestion, or 'exit' to quit.");

    let stdin = std::io::stdin();
    loop {
        let suggestions = session.suggestions();
        if !suggestions.is_empty() {
            println!();
            for (idx, suggestion) in suggestions.iter().enumerate() {
                println!("  {}. {}", idx + 1, suggestion);
            }
        }

        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        if let Ok(choice) = input.parse::<usize>() {
            if choice >= 1 && choice <= suggestions.len() {
                session.inject_query(&suggestions[choice - 1]);
            } else {
                println!("No suggestion number {}", choice);
                continue;
            }
        } else {
            session.started = true;
        }

        let query = match session.take_pending() {
            Some(query) => query,
            None => input.to_string(),
        };

        if let Err(e) = run_turn(&query, store, session, client, config, out_dir).await {
            eprintln!("[WARN] Turn failed: {}", e);
        }
    }

    Ok(())
}

async fn run_turn(
    query: &str,
    store: &DataStore,
    session: &mut SessionState,
    client: &ConvaClient,
    config: &AssistantConfig,
    out_dir: &Path,
) -> Result<()> {
    session.push_user(query);

    let progress = TerminalProgress;
    progress.update(0, "Understanding your query...");
    let reply = run_pipeline(query, store, session, client, &progress, config).await?;

    let figure = reply
        .chart
        .as_ref()
        .map(render_or_blank)
        .filter(|figure| !figure.is_blank());
    let analysis = if reply.analysis.is_empty() {
        APOLOGY.to_string()
    } else {
        reply.analysis
    };

    println!("\n{}\n", analysis);
    if let Some(figure) = &figure {
        match write_figure(session, figure, out_dir) {
            Ok(path) => println!("[OK] Figure written to {}", path.display()),
            Err(e) => warn!("Failed to write figure: {}", e),
        }
    }

    session.push_assistant(&analysis, figure);
    Ok(())
}

fn write_figure(session: &SessionState, figure: &Figure, out_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir)?;
    let path = out_dir.join(format!("{}_{:03}.json", session.id, session.messages.len()));
    let contents = serde_json::to_string_pretty(figure)?;
    std::fs::write(&path, contents)?;
    Ok(path)
}
