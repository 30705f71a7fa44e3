//! Error type for `roster-resolve`.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The profile API quota will not reset soon enough; the run must stop.
  #[error("API quota exhausted; reset in {reset_in:?} exceeds the {max_wait:?} limit")]
  QuotaExhausted { reset_in: Duration, max_wait: Duration },

  #[error("no credential slots reported by the profile API")]
  NoCredentials,

  #[error("{key}: still failing after {attempts} attempts: {last}")]
  RetriesExhausted { key: String, attempts: u32, last: String },

  /// A failure remembered from an earlier run or task.
  #[error("{key}: {reason} (cached)")]
  CachedFailure { key: String, reason: String },

  #[error("location is empty")]
  EmptyLocation,

  #[error("no matching locations were found for {0:?}")]
  NoLocationMatch(String),

  #[error("no country found for {0:?}")]
  NoCountry(String),

  #[error("{endpoint} returned HTTP {status}")]
  Status { endpoint: String, status: u16 },

  #[error("{endpoint} failed: {message}")]
  Api { endpoint: String, message: String },

  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("snapshot error: {0}")]
  Snapshot(#[from] roster_snapshot::Error),

  #[error("invalid seed data in {path}: {message}")]
  Seed { path: String, message: String },

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("YAML error: {0}")]
  Yaml(#[from] serde_yaml::Error),

  #[error("CSV error: {0}")]
  Csv(#[from] csv::Error),

  #[error("task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

impl Error {
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }

  /// Whether this error must abort the whole run rather than one identity.
  pub fn is_fatal(&self) -> bool {
    matches!(self, Self::QuotaExhausted { .. })
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
