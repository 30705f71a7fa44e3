//! Error type for `roster-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] roster_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A numeric ID does not fit the signed 64-bit column type.
  #[error("id out of range: {0}")]
  IdOutOfRange(String),

  #[error("identity {0} vanished after insert")]
  IdentityMissing(uuid::Uuid),

  #[error("organization {0:?} vanished after insert")]
  OrganizationMissing(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
