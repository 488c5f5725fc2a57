mod commands;
mod runtime;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use subtag_annotation_sync::persistence::{JsonFilePersistence, MemoryPersistence};
use subtag_annotation_sync::{AnnotationStore, Persistence, SyncConfig};

use crate::runtime::CliRuntime;

#[derive(Parser)]
#[command(name = "subtag", about = "Token-level subtitle annotation")]
struct Cli {
    /// JSON document used as the store of record.
    #[arg(long, global = true, env = "SUBTAG_STORE", default_value = "subtag.json")]
    store: PathBuf,

    /// Keep everything in memory; nothing is read from or written to disk.
    #[arg(long, global = true)]
    ephemeral: bool,

    #[arg(long, global = true, env = "SUBTAG_STALE_AFTER_SECS", default_value_t = 30)]
    stale_after_secs: u64,

    #[arg(long, global = true, env = "SUBTAG_TIME_QUERY_TIMEOUT_MS", default_value_t = 150)]
    time_query_timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load parser output for one media item into the store.
    Import(commands::import::Args),
    /// Print every segment with its tagging progress.
    Inspect(commands::inspect::Args),
    /// Apply one token edit to a segment.
    Edit(commands::edit::Args),
    /// Play a media item back against a simulated clock.
    Replay(commands::replay::Args),
}

impl Cli {
    fn config(&self) -> SyncConfig {
        SyncConfig {
            stale_after_secs: self.stale_after_secs,
            time_query_timeout_ms: self.time_query_timeout_ms,
        }
    }

    fn persistence(&self) -> Arc<dyn Persistence> {
        if self.ephemeral {
            Arc::new(MemoryPersistence::new())
        } else {
            Arc::new(JsonFilePersistence::new(&self.store))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = AnnotationStore::new(cli.persistence(), Arc::new(CliRuntime), cli.config());
    tracing::debug!(store = %cli.store.display(), ephemeral = cli.ephemeral, "store_opened");

    match cli.command {
        Command::Import(args) => commands::import::run(&store, args).await,
        Command::Inspect(args) => commands::inspect::run(&store, args).await,
        Command::Edit(args) => commands::edit::run(&store, args).await,
        Command::Replay(args) => commands::replay::run(&store, args).await,
    }
}
