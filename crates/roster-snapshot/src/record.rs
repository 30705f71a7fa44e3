//! One row of the bulk affiliation snapshot.

use serde::{Deserialize, Serialize};

/// The snapshot writes `!` where an email address has `@`, so the file is
/// not trivially harvestable.
const EMAIL_AT_SUBSTITUTE: char = '!';

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
  pub login:       String,
  /// Obfuscated address; see [`SnapshotRecord::email`].
  #[serde(default)]
  pub email:       String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub affiliation: String,
  #[serde(default)]
  pub source:      String,
  #[serde(default)]
  pub name:        String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub country_id:  Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sex:         Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sex_prob:    Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tz:          Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub age:         Option<i32>,
}

impl SnapshotRecord {
  /// The email address with `@` restored.
  pub fn email(&self) -> String {
    self.email.replace(EMAIL_AT_SUBSTITUTE, "@")
  }

  /// Store `email` in the obfuscated form.
  pub fn set_email(&mut self, email: &str) {
    self.email = email.replace('@', &EMAIL_AT_SUBSTITUTE.to_string());
  }
}
