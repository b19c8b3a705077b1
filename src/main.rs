// ChatDB: chat with a SQL database from the terminal
//
// This is the main entry point for the ChatDB application.

use anyhow::Result;
use chatdb::agent::{QueryAgent, SqlAgent};
use chatdb::cli::{EditorReader, PreviewWriter, Repl};
use chatdb::config::Settings;
use chatdb::database::DatabasePool;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Ask questions about your database and read the answers in the browser
#[derive(Parser, Debug)]
#[command(name = "chatdb", version, about)]
struct Cli {
    /// Start with the browser preview disabled
    #[arg(long)]
    no_html: bool,

    /// Do not stream model tokens to the terminal
    #[arg(long)]
    no_stream: bool,

    /// Log every agent step to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();
    init_logging(cli.verbose);

    let settings = Settings::load(!cli.no_stream)?;

    let db = DatabasePool::connect(&settings.database_url).await?;
    info!("Connected to {} database", db.backend());

    let agent: Arc<dyn QueryAgent> = Arc::new(SqlAgent::from_settings(&settings, db.clone())?);
    let preview = PreviewWriter::new(settings.preview_path.clone());
    let reader = EditorReader::new()?;

    let mut repl = Repl::new(Box::new(reader), agent, preview, !cli.no_html);
    let outcome = repl.run().await;

    db.close().await;
    Ok(outcome?)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "chatdb=debug" } else { "chatdb=warn" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
