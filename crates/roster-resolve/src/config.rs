//! Run configuration.
//!
//! Deserialized by the binary from a TOML file layered with `ROSTER__*`
//! environment variables. Every section except `database` has defaults.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub database:  DatabaseConfig,
  #[serde(default)]
  pub github:    GitHubConfig,
  #[serde(default)]
  pub geocoding: GeocodingConfig,
  #[serde(default)]
  pub directory: DirectoryConfig,
  #[serde(default)]
  pub cache:     CacheConfig,
  #[serde(default)]
  pub seed:      SeedConfig,
  #[serde(default)]
  pub resolver:  ResolverConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
  /// The identity database; created if missing.
  pub identity_path:  PathBuf,
  /// The event warehouse; opened read-only in spirit.
  pub warehouse_path: PathBuf,
}

// ─── Profile API ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
  pub base_url:       String,
  /// One credential slot per token. Empty means a single anonymous slot.
  pub tokens:         Vec<String>,
  pub max_retry:      u32,
  /// A slot with this many calls left or fewer counts as exhausted.
  pub min_points:     u32,
  pub max_wait_secs:  u64,
  pub retry_delay_ms: u64,
}

impl Default for GitHubConfig {
  fn default() -> Self {
    Self {
      base_url:       "https://api.github.com".into(),
      tokens:         Vec::new(),
      max_retry:      6,
      min_points:     1,
      max_wait_secs:  10,
      retry_delay_ms: 1000,
    }
  }
}

impl GitHubConfig {
  pub fn retry_settings(&self, ttl: Duration) -> RetrySettings {
    RetrySettings {
      max_retry:   self.max_retry.max(1),
      min_points:  self.min_points,
      max_wait:    Duration::from_secs(self.max_wait_secs),
      retry_delay: Duration::from_millis(self.retry_delay_ms),
      ttl,
    }
  }
}

/// Knobs for [`crate::github::ProfileClient`].
#[derive(Debug, Clone, Copy)]
pub struct RetrySettings {
  pub max_retry:   u32,
  pub min_points:  u32,
  pub max_wait:    Duration,
  pub retry_delay: Duration,
  /// Lifetime of both positive and negative cache entries.
  pub ttl:         Duration,
}

// ─── Geocoding ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
  pub base_url: String,
  pub api_key:  String,
}

impl Default for GeocodingConfig {
  fn default() -> Self {
    Self {
      base_url: "https://maps.googleapis.com/maps/api/geocode/json".into(),
      api_key:  String::new(),
    }
  }
}

// ─── Employee directory ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
  /// With the directory disabled nobody is an employee.
  pub enabled:       bool,
  pub base_url:      String,
  pub app_id:        String,
  pub app_secret:    String,
  /// Custom attribute holding the employee's GitHub login.
  pub login_attr_id: String,
  /// Organization every employee is enrolled in.
  pub employer:      String,
}

impl Default for DirectoryConfig {
  fn default() -> Self {
    Self {
      enabled:       false,
      base_url:      "https://open.feishu.cn/open-apis".into(),
      app_id:        String::new(),
      app_secret:    String::new(),
      login_attr_id: "C-6934211695879389211".into(),
      employer:      "PingCAP".into(),
    }
  }
}

// ─── Cache ───────────────────────────────────────────────────────────────────

const DAY_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub path:               PathBuf,
  pub profile_ttl_secs:   u64,
  pub location_ttl_secs:  u64,
  pub directory_ttl_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      path:               PathBuf::from("roster-cache.json"),
      profile_ttl_secs:   2 * DAY_SECS,
      location_ttl_secs:  365 * DAY_SECS,
      directory_ttl_secs: 2 * DAY_SECS,
    }
  }
}

impl CacheConfig {
  pub fn profile_ttl(&self) -> Duration { Duration::from_secs(self.profile_ttl_secs) }

  pub fn location_ttl(&self) -> Duration { Duration::from_secs(self.location_ttl_secs) }

  pub fn directory_ttl(&self) -> Duration {
    Duration::from_secs(self.directory_ttl_secs)
  }
}

// ─── Seed data ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
  pub organizations_path: Option<PathBuf>,
  pub countries_path:     Option<PathBuf>,
  /// File path or HTTP(S) URL of the bulk affiliation snapshot.
  pub snapshot_source:    Option<String>,
}

// ─── Resolver ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
  pub workers:          usize,
  pub checkpoint_every: usize,
  /// Where `roster export` writes when no path is given.
  pub export_path:      PathBuf,
}

impl Default for ResolverConfig {
  fn default() -> Self {
    Self {
      workers:          16,
      checkpoint_every: 100,
      export_path:      PathBuf::from("github_users.json"),
    }
  }
}
