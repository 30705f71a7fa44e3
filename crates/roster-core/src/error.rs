//! Error types for `roster-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown profile source: {0:?}")]
  UnknownSource(String),

  #[error("unknown organization type: {0:?}")]
  UnknownOrgType(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
