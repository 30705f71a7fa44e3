//! `roster`: resolve observed GitHub accounts into canonical identities.
//!
//! Reads `roster.toml` (or the path given with `--config`), layered with
//! `ROSTER__SECTION__KEY` environment variables.
//!
//! ```text
//! roster resolve --export
//! roster export --output github_users.json
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use roster_core::store::ActorSource;
use roster_resolve::{
  CacheCheckpoint, Config, EmployeeRegistry, GeoResolver, GitHubHttp,
  GoogleGeocoder, IdentityMerger, LarkDirectory, OrganizationMatcher,
  ProfileClient, ResolutionScheduler, ResponseCache, export_snapshot,
  load_snapshot, seed,
};
use roster_snapshot::SnapshotIndex;
use roster_store_sqlite::{SqliteStore, SqliteWarehouse};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Roster identity resolution engine")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "roster.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Import reference data, then resolve every active account.
  Resolve {
    /// Write the export file once resolution finishes.
    #[arg(long)]
    export: bool,
  },
  /// Write every resolved identity in the snapshot format.
  Export {
    /// Defaults to `resolver.export_path`.
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Import countries and organizations unless already imported.
  Seed,
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

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(config::Environment::with_prefix("ROSTER").separator("__"))
    .build()
    .context("failed to read config file")?;
  let config: Config = settings
    .try_deserialize()
    .context("failed to deserialise Config")?;

  let store = SqliteStore::open(&config.database.identity_path)
    .await
    .with_context(|| {
      format!("failed to open identity store at {:?}", config.database.identity_path)
    })?;
  let store = Arc::new(store);

  match cli.command {
    Command::Resolve { export } => {
      resolve(&config, store.clone()).await?;
      if export {
        write_export(&store, &config.resolver.export_path).await?;
      }
    }
    Command::Export { output } => {
      let path = output.unwrap_or_else(|| config.resolver.export_path.clone());
      write_export(&store, &path).await?;
    }
    Command::Seed => {
      seed(store.as_ref(), &config.seed)
        .await
        .context("failed to import seed data")?;
    }
  }

  Ok(())
}

async fn resolve(config: &Config, store: Arc<SqliteStore>) -> anyhow::Result<()> {
  seed(store.as_ref(), &config.seed)
    .await
    .context("failed to import seed data")?;

  let cache = Arc::new(ResponseCache::load(&config.cache.path).await);

  let snapshot = match &config.seed.snapshot_source {
    Some(source) => load_snapshot(source)
      .await
      .with_context(|| format!("failed to load snapshot from {source}"))?,
    None => SnapshotIndex::default(),
  };

  let directory = if config.directory.enabled {
    let directory = LarkDirectory::connect(&config.directory)
      .await
      .context("failed to connect to the employee directory")?;
    Some(directory)
  } else {
    tracing::info!("employee directory disabled");
    None
  };
  let employees = EmployeeRegistry::new(
    directory,
    config.directory.login_attr_id.clone(),
    cache.clone(),
    config.cache.directory_ttl(),
  );
  employees
    .refresh()
    .await
    .context("failed to load employee logins")?;

  let matcher = OrganizationMatcher::load(store.clone())
    .await
    .context("failed to load organizations")?;

  let github = GitHubHttp::new(&config.github.base_url, &config.github.tokens)
    .context("failed to build the GitHub client")?;
  let profiles = ProfileClient::new(
    github,
    cache.clone(),
    config.github.retry_settings(config.cache.profile_ttl()),
  );

  let geocoder =
    GoogleGeocoder::new(&config.geocoding.base_url, &config.geocoding.api_key)
      .context("failed to build the geocoding client")?;
  let geo = GeoResolver::new(geocoder, cache.clone(), config.cache.location_ttl());

  let merger = IdentityMerger::new(
    store,
    profiles,
    geo,
    employees,
    matcher,
    snapshot,
    config.directory.employer.clone(),
  );

  let warehouse = SqliteWarehouse::open(&config.database.warehouse_path)
    .await
    .with_context(|| {
      format!("failed to open warehouse at {:?}", config.database.warehouse_path)
    })?;
  let actors = warehouse
    .list_active_actors()
    .await
    .context("failed to read active actors")?;

  let scheduler = ResolutionScheduler::new(
    Arc::new(merger),
    config.resolver.workers,
    config.resolver.checkpoint_every,
  )
  .with_checkpoint(CacheCheckpoint {
    cache: cache.clone(),
    path:  config.cache.path.clone(),
  });
  let outcome = scheduler.run_all(actors).await;

  // Keep whatever was fetched, even when the run was aborted.
  if let Err(e) = cache.save(&config.cache.path).await {
    tracing::warn!(path = %config.cache.path.display(), error = %e, "failed to save cache");
  }

  let summary = outcome.context("resolution aborted")?;
  tracing::info!(
    total = summary.total,
    resolved = summary.resolved,
    skipped = summary.skipped,
    failed = summary.failed,
    "done"
  );
  Ok(())
}

async fn write_export(store: &SqliteStore, path: &std::path::Path) -> anyhow::Result<()> {
  export_snapshot(store, path)
    .await
    .with_context(|| format!("failed to export to {path:?}"))?;
  Ok(())
}
