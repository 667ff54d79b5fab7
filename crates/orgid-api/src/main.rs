//! orgid-api server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) layered under
//! `ORGID_*` environment variables, opens the SQLite store and serves the
//! JSON API over HTTP. The store must answer a ping before the listener is
//! bound.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use orgid_api::AppState;
use orgid_core::{settings::Settings, store::SearchIndex as _};
use orgid_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Organisation resolver JSON API")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
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

  let documents = store.count().await.context("failed to count documents")?;
  match store.last_indexed().await? {
    Some(run) => tracing::info!(documents, %run, "search index loaded"),
    None => tracing::warn!("search index is empty; run `indexdata index`"),
  }

  let address = format!("{}:{}", settings.host, settings.port);
  let state = AppState { store: Arc::new(store), settings: Arc::new(settings) };
  let app = orgid_api::router(state);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
