//! Error types for the roster-snapshot codec.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid date in affiliation {affiliation:?}: {value}")]
  InvalidDate { affiliation: String, value: String },

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
