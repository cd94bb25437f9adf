//! `story-order` — story-order maintenance from the command line.
//!
//! Reads `atlas.toml` (or the path given with `--config`) and `ATLAS_*`
//! environment variables, opens the SQLite store and runs one operation.
//! With no operation flag it fixes every story.
//!
//! ```text
//! story-order --update-all --workers 8
//! story-order --update-all --start <uuid> --stop <uuid>
//! story-order --verify --sample 50
//! ```
//!
//! Exits with status 2 when any per-tag operation failed or a verification
//! found a story out of order.

use std::{num::NonZeroUsize, path::PathBuf, process::ExitCode};

use anyhow::Context as _;
use atlas_maintenance::{
  BackfillOptions, Concurrency, Connect as _, MaintenanceConfig, Report, VerifyReport,
  backfill, config::environment, maintenance,
};
use atlas_store_sqlite::SqliteStore;
use clap::{ArgGroup, Parser};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about = "History Atlas story-order maintenance")]
#[command(group(
  ArgGroup::new("operation")
    .args(["update_all", "tag", "reset_all", "reset_tag", "verify", "verify_tag"])
))]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "atlas.toml")]
  config: PathBuf,

  /// SQLite database path; overrides the configuration.
  #[arg(long)]
  store: Option<PathBuf>,

  /// Give an order to every unordered tag instance.
  #[arg(long)]
  update_all: bool,

  /// Backfill workers, each with its own connection.
  #[arg(long, requires = "update_all")]
  workers: Option<NonZeroUsize>,

  /// First tag id of a range-bounded backfill.
  #[arg(long, requires_all = ["update_all", "stop"])]
  start: Option<Uuid>,

  /// Last tag id of a range-bounded backfill.
  #[arg(long, requires_all = ["update_all", "start"])]
  stop: Option<Uuid>,

  /// Fix a single tag.
  #[arg(long, value_name = "ID")]
  tag: Option<Uuid>,

  /// Clear every story order.
  #[arg(long)]
  reset_all: bool,

  /// Clear one tag's story order.
  #[arg(long, value_name = "ID")]
  reset_tag: Option<Uuid>,

  /// Verify every story.
  #[arg(long)]
  verify: bool,

  /// Verify a single tag.
  #[arg(long, value_name = "ID")]
  verify_tag: Option<Uuid>,

  /// Verify a random sample of this many stories.
  #[arg(long, value_name = "N", requires = "verify")]
  sample: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let mut cfg = MaintenanceConfig::load(&cli.config, environment())
    .context("failed to load MaintenanceConfig")?;
  if let Some(store) = cli.store.clone() {
    cfg.store_path = store;
  }

  let connect = cfg.connector();
  let clean = if cli.update_all {
    let options = BackfillOptions {
      range:       cli.start.zip(cli.stop),
      concurrency: cli.workers.map_or(Concurrency::Sequential, Concurrency::Workers),
    };
    let report = backfill(&connect, options)
      .await
      .context("backfill aborted")?;
    print_report("backfill", &report);
    report.is_clean()
  } else {
    let store = connect
      .connect()
      .await
      .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;
    run_operation(&cli, &store).await?
  };

  Ok(if clean { ExitCode::SUCCESS } else { ExitCode::from(2) })
}

/// Everything except backfill. Returns whether the run was clean.
async fn run_operation(cli: &Cli, store: &SqliteStore) -> anyhow::Result<bool> {
  if let Some(tag_id) = cli.tag {
    let count = maintenance::fix_tag(store, tag_id)
      .await
      .with_context(|| format!("failed to fix tag {tag_id}"))?;
    println!("fixed {tag_id}: {count} instances renumbered");
    return Ok(true);
  }

  if cli.reset_all {
    let cleared = maintenance::reset_all(store).await.context("reset failed")?;
    println!("cleared {cleared} story orders");
    return Ok(true);
  }

  if let Some(tag_id) = cli.reset_tag {
    let cleared = maintenance::reset_tag(store, tag_id)
      .await
      .with_context(|| format!("failed to reset tag {tag_id}"))?;
    println!("cleared {cleared} story orders on {tag_id}");
    return Ok(true);
  }

  if let Some(tag_id) = cli.verify_tag {
    let verification = maintenance::verify_tag(store, tag_id)
      .await
      .with_context(|| format!("failed to verify tag {tag_id}"))?;
    print_json(&verification)?;
    return Ok(verification.is_ok());
  }

  if cli.verify {
    let report = match cli.sample {
      Some(n) => maintenance::verify_sample(store, n).await,
      None => maintenance::verify_all(store).await,
    }
    .context("verify failed")?;
    print_verify_report(&report)?;
    return Ok(report.is_clean());
  }

  let report = maintenance::fix_all(store).await.context("fix failed")?;
  print_report("fix", &report);
  Ok(report.is_clean())
}

fn print_report(label: &str, report: &Report) {
  println!(
    "{label}: {} tags, {} placed, {} rebalanced, {} failed",
    report.tags,
    report.placed,
    report.rebalanced,
    report.failed.len()
  );
  for failure in &report.failed {
    eprintln!("  {}: {}", failure.tag_id, failure.message);
  }
}

fn print_verify_report(report: &VerifyReport) -> anyhow::Result<()> {
  println!(
    "verify: {} tags checked, {} out of order, {} failed",
    report.checked,
    report.mismatched.len(),
    report.failed.len()
  );
  for verification in &report.mismatched {
    print_json(verification)?;
  }
  for failure in &report.failed {
    eprintln!("  {}: {}", failure.tag_id, failure.message);
  }
  Ok(())
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
