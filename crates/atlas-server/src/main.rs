//! atlas-server binary.
//!
//! Reads `atlas.toml` (or the path specified with `--config`) and `ATLAS_*`
//! environment variables, opens the SQLite store, and serves the JSON API
//! under `/api`.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use atlas_core::{order::OrderConfig, recent::CacheConfig};
use atlas_store_sqlite::{SqliteStore, StoreConfig};
use axum::Router;
use clap::Parser;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "History Atlas API server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "atlas.toml")]
  config: PathBuf,
}

/// Runtime server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ServerConfig {
  host:        String,
  port:        u16,
  store_path:  PathBuf,
  story_order: OrderConfig,
  cache:       CacheConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:        "127.0.0.1".into(),
      port:        8080,
      store_path:  PathBuf::from("atlas.db"),
      story_order: OrderConfig::default(),
      cache:       CacheConfig::default(),
    }
  }
}

/// `ATLAS_PORT`, `ATLAS_STORE_PATH`; nested keys use `__`, as in
/// `ATLAS_STORY_ORDER__STEP`.
fn environment() -> config::Environment {
  config::Environment::with_prefix("ATLAS")
    .prefix_separator("_")
    .separator("__")
}

fn load_config(
  path: PathBuf,
  env: config::Environment,
) -> Result<ServerConfig, config::ConfigError> {
  config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(env)
    .build()?
    .try_deserialize()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let server_cfg =
    load_config(cli.config, environment()).context("failed to load ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store_cfg = StoreConfig { order: server_cfg.story_order, cache: server_cfg.cache };

  let store = SqliteStore::open_with(&store_path, store_cfg)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let app = Router::new()
    .nest("/api", atlas_api::api_router(Arc::new(store)))
    .layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn environment_overrides_defaults() {
    let env = environment().source(Some(config::Map::from([
      ("ATLAS_PORT".to_owned(), "9090".to_owned()),
      ("ATLAS_STORE_PATH".to_owned(), "/srv/atlas/atlas.db".to_owned()),
      ("ATLAS_STORY_ORDER__STEP".to_owned(), "10".to_owned()),
    ])));
    let cfg = load_config(PathBuf::from("missing-atlas.toml"), env).unwrap();

    assert_eq!(cfg.port, 9090);
    assert_eq!(cfg.host, "127.0.0.1");
    assert_eq!(cfg.store_path, PathBuf::from("/srv/atlas/atlas.db"));
    assert_eq!(cfg.story_order.step, 10);
    assert_eq!(cfg.story_order.base, OrderConfig::default().base);
  }
}
