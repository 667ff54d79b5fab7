//! `indexdata`: load source tables and rebuild the search index.
//!
//! Reads `config.toml` (or the path given with `--config`) layered under
//! `ORGID_*` environment variables.
//!
//! ```
//! indexdata import --records records.jsonl --links links.jsonl
//! indexdata index
//! ```

use std::{
  fs::File,
  io::BufReader,
  path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use orgid_core::settings::Settings;
use orgid_indexer::{IndexJob, import};
use orgid_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Organisation resolver indexer")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Merge every organisation and rewrite the search index.
  Index {
    /// Documents per bulk write; overrides `bulk_limit`.
    #[arg(long)]
    bulk_limit: Option<usize>,
  },

  /// Load records and links from JSON-lines files into the source tables.
  Import {
    /// One organisation record per line.
    #[arg(long)]
    records: Option<PathBuf>,
    /// One organisation link per line.
    #[arg(long)]
    links:   Option<PathBuf>,
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

  let settings: Settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("ORGID"))
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise settings")?;

  let store = SqliteStore::open(&settings.database_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.database_path))?;
  store.ping().await.context("store is not reachable")?;

  match cli.command {
    Command::Index { bulk_limit } => {
      let job = IndexJob::new(&store, &store, settings.merger())
        .with_bulk_limit(bulk_limit.unwrap_or(settings.bulk_limit));
      tracing::info!(run = %job.run_timestamp(), "starting index run");
      let report = job.run().await.context("index run failed")?;
      println!("{}", report.to_json());
    }
    Command::Import { records, links } => {
      if let Some(path) = records {
        let parsed = import::read_records(open(&path)?)
          .with_context(|| format!("failed to read {}", path.display()))?;
        report_rejected(&path, &parsed.rejected);
        let n = store.insert_records(&parsed.rows).await?;
        tracing::info!(records = n, path = %path.display(), "imported records");
      }
      if let Some(path) = links {
        let parsed = import::read_links(open(&path)?)
          .with_context(|| format!("failed to read {}", path.display()))?;
        report_rejected(&path, &parsed.rejected);
        let n = store.insert_links(&parsed.rows).await?;
        tracing::info!(links = n, path = %path.display(), "imported links");
      }
    }
  }

  Ok(())
}

fn open(path: &Path) -> anyhow::Result<BufReader<File>> {
  let file =
    File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
  Ok(BufReader::new(file))
}

fn report_rejected(path: &Path, rejected: &[String]) {
  for line in rejected {
    tracing::warn!(path = %path.display(), "{line}");
  }
}
