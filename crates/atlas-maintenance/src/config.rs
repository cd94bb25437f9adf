//! Configuration for the `story-order` binary and the SQLite connector.

use std::path::{Path, PathBuf};

use atlas_core::{order::OrderConfig, recent::CacheConfig};
use atlas_store_sqlite::{SqliteStore, StoreConfig};
use serde::Deserialize;

use crate::Connect;

/// Deserialised from an optional TOML file plus `ATLAS_*` variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
  pub store_path:  PathBuf,
  pub story_order: OrderConfig,
  pub cache:       CacheConfig,
}

impl Default for MaintenanceConfig {
  fn default() -> Self {
    Self {
      store_path:  PathBuf::from("atlas.db"),
      story_order: OrderConfig::default(),
      cache:       CacheConfig::default(),
    }
  }
}

/// `ATLAS_STORE_PATH` and friends; nested keys use `__`, as in
/// `ATLAS_STORY_ORDER__GAP_STRATEGY`.
pub fn environment() -> ::config::Environment {
  ::config::Environment::with_prefix("ATLAS")
    .prefix_separator("_")
    .separator("__")
}

impl MaintenanceConfig {
  /// Read the optional TOML file at `path`, then `env` on top of it.
  pub fn load(path: &Path, env: ::config::Environment) -> Result<Self, ::config::ConfigError> {
    ::config::Config::builder()
      .add_source(::config::File::from(path).required(false))
      .add_source(env)
      .build()?
      .try_deserialize()
  }

  pub fn store_config(&self) -> StoreConfig {
    StoreConfig { order: self.story_order, cache: self.cache }
  }

  pub fn connector(&self) -> SqliteConnect {
    SqliteConnect { path: self.store_path.clone(), config: self.store_config() }
  }
}

/// Opens a fresh [`SqliteStore`] on every call, so each backfill worker gets
/// its own connection thread.
#[derive(Debug, Clone)]
pub struct SqliteConnect {
  pub path:   PathBuf,
  pub config: StoreConfig,
}

impl Connect for SqliteConnect {
  type Store = SqliteStore;

  async fn connect(&self) -> atlas_store_sqlite::Result<SqliteStore> {
    SqliteStore::open_with(&self.path, self.config).await
  }
}
