//! mucca server binary.
//!
//! Reads `mucca.toml` (or the path given with `--config`), opens the SQLite
//! store and runs one of the commands below.
//!
//! ```text
//! mucca serve                   # REST API + enrichment worker
//! mucca enrich --once           # drain the change feed and exit
//! mucca enrich --from 1200      # skip changes up to sequence 1200
//! mucca reconcile [--article ID]
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use axum::Router;
use clap::{Parser, Subcommand};
use mucca_core::engagement::{reconcile_all, reconcile_article};
use mucca_server::{EnrichmentWorker, HttpFetcher, ServerConfig};
use mucca_store_sqlite::SqliteStore;
use tokio::{net::TcpListener, sync::watch};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about = "Mucca article sharing backend")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "mucca.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the REST API and run the enrichment worker in the background.
  Serve,
  /// Run the enrichment worker against the change feed.
  Enrich {
    /// Drain the feed once and exit instead of polling.
    #[arg(long)]
    once: bool,

    /// Start after this change sequence number instead of replaying the
    /// whole feed.
    #[arg(long, value_name = "SEQ")]
    from: Option<u64>,
  },
  /// Recompute aggregate counters from clap records.
  Reconcile {
    /// Only reconcile this article.
    #[arg(long)]
    article: Option<Uuid>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let cfg = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to load config from {:?}", cli.config))?;

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;

  match cli.command {
    Command::Serve => serve(cfg, store).await,
    Command::Enrich { once, from } => enrich(cfg, store, once, from).await,
    Command::Reconcile { article } => reconcile(store, article).await,
  }
}

fn worker(
  cfg: &ServerConfig,
  store: SqliteStore,
) -> anyhow::Result<EnrichmentWorker<SqliteStore, HttpFetcher>> {
  let fetcher = HttpFetcher::new(cfg.fetch_timeout(), &cfg.user_agent)
    .context("failed to build HTTP client")?;
  Ok(EnrichmentWorker::new(store, fetcher, cfg.batch_size, cfg.poll_interval()))
}

async fn serve(cfg: ServerConfig, store: SqliteStore) -> anyhow::Result<()> {
  let (shutdown_tx, shutdown_rx) = watch::channel(false);
  let worker = tokio::spawn(worker(&cfg, store.clone())?.run(shutdown_rx));

  let app = Router::new().nest("/api", mucca_api::api_router(Arc::new(store)));
  let address = cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
      }
    })
    .await
    .context("server error")?;

  tracing::info!("shutting down");
  shutdown_tx.send(true).ok();
  worker.await.context("enrichment worker panicked")?;
  Ok(())
}

async fn enrich(
  cfg: ServerConfig,
  store: SqliteStore,
  once: bool,
  from: Option<u64>,
) -> anyhow::Result<()> {
  let mut worker = worker(&cfg, store)?;
  if let Some(sequence) = from {
    worker = worker.with_cursor(sequence);
  }

  if once {
    let report = worker.drain().await.context("failed to read change feed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    return Ok(());
  }

  let (shutdown_tx, shutdown_rx) = watch::channel(false);
  let handle = tokio::spawn(worker.run(shutdown_rx));
  tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
  shutdown_tx.send(true).ok();
  handle.await.context("enrichment worker panicked")?;
  Ok(())
}

async fn reconcile(store: SqliteStore, article: Option<Uuid>) -> anyhow::Result<()> {
  let output = match article {
    Some(id) => {
      let outcome = reconcile_article(&store, id)
        .await
        .with_context(|| format!("failed to reconcile article {id}"))?;
      serde_json::to_string_pretty(&outcome)?
    }
    None => {
      let report = reconcile_all(&store).await.context("reconciliation failed")?;
      serde_json::to_string_pretty(&report)?
    }
  };
  println!("{output}");
  Ok(())
}
