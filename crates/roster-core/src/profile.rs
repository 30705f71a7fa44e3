//! GitHub-shaped records returned by the external profile source.
//!
//! These are ephemeral: they are fetched, cached, and folded into an
//! [`Identity`](crate::identity::Identity), but never persisted as-is.

use serde::{Deserialize, Serialize};

/// The account type GitHub reports for automation accounts.
pub const BOT_ACCOUNT_TYPE: &str = "Bot";

/// A public user profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalProfile {
  pub id:           u64,
  pub login:        String,
  #[serde(default)]
  pub name:         Option<String>,
  #[serde(default)]
  pub email:        Option<String>,
  #[serde(default)]
  pub company:      Option<String>,
  #[serde(default)]
  pub location:     Option<String>,
  #[serde(default)]
  pub blog:         Option<String>,
  #[serde(default)]
  pub bio:          Option<String>,
  #[serde(default)]
  pub followers:    u32,
  #[serde(default)]
  pub following:    u32,
  #[serde(default)]
  pub avatar_url:   Option<String>,
  #[serde(default, rename = "type")]
  pub account_type: Option<String>,
}

impl ExternalProfile {
  pub fn is_bot(&self) -> bool {
    self.account_type.as_deref() == Some(BOT_ACCOUNT_TYPE)
  }
}

/// The owner half of a repository record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryOwner {
  pub login: String,
  #[serde(default)]
  pub id:    u64,
}

/// A public repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
  pub id:               u64,
  pub name:             String,
  pub full_name:        String,
  pub owner:            RepositoryOwner,
  #[serde(default)]
  pub description:      Option<String>,
  #[serde(default)]
  pub default_branch:   Option<String>,
  #[serde(default)]
  pub fork:             bool,
  #[serde(default)]
  pub stargazers_count: u32,
}

/// Return `value` only when it holds a non-blank string.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
  value.map(str::trim).filter(|s| !s.is_empty())
}
