//! Identity types: the canonical person and the raw accounts merged into it.
//!
//! A [`RawIdentifier`] is what the event warehouse observed. An [`Identity`]
//! is the deduplicated person those observations resolve to; it is keyed by
//! an opaque UUID minted exactly once and linked to one or more
//! [`GitHubAccount`]s.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

/// GitHub's privacy-preserving commit address; never useful for inference.
pub const NOREPLY_EMAIL_SUFFIX: &str = "@users.noreply.github.com";

/// Whether `email` is a GitHub noreply address.
pub fn is_noreply_email(email: &str) -> bool {
  email.ends_with(NOREPLY_EMAIL_SUFFIX)
}

// ─── Provenance ──────────────────────────────────────────────────────────────

/// Where a field value (or an enrollment) came from.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProfileSource {
  /// Nothing has been resolved for this field yet.
  #[default]
  NotFound,
  /// Inferred from the domain part of an email address.
  EmailDomain,
  /// Read from the public GitHub profile.
  GithubProfile,
  /// Imported from the bulk affiliation snapshot.
  GithubJson,
  /// Corrected by an operator.
  Manual,
  /// Corrected by the person themselves.
  UserManual,
  /// Present in the employee directory.
  LarkContact,
}

impl ProfileSource {
  /// Manual corrections are sticky: automated sources never overwrite them.
  pub fn is_manual(self) -> bool {
    matches!(self, Self::Manual | Self::UserManual)
  }

  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownSource(s.to_owned()))
  }
}

// ─── Raw input ───────────────────────────────────────────────────────────────

/// An account as observed in event history, before resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIdentifier {
  /// The GitHub numeric ID; the stable key.
  pub id:     u64,
  pub logins: BTreeSet<String>,
  pub names:  BTreeSet<String>,
  pub emails: BTreeSet<String>,
}

impl RawIdentifier {
  pub fn new(id: u64) -> Self {
    Self { id, ..Default::default() }
  }
}

// ─── Canonical identity ──────────────────────────────────────────────────────

/// One real person. Every enrichable field carries the source it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
  pub uuid:            Uuid,
  pub name:            String,
  pub name_source:     ProfileSource,
  pub email:           String,
  pub email_source:    ProfileSource,
  pub gender:          String,
  /// Confidence of the gender guess in `[0, 1]`.
  pub gender_acc:      f64,
  pub gender_source:   ProfileSource,
  pub location:        String,
  pub location_source: ProfileSource,
  /// ISO 3166-1 alpha-2 code.
  pub country_code:    Option<String>,
  pub country_source:  ProfileSource,
  pub is_bot:          bool,
}

impl Identity {
  /// A blank identity with every field unresolved.
  pub fn new(uuid: Uuid) -> Self {
    Self {
      uuid,
      name: String::new(),
      name_source: ProfileSource::NotFound,
      email: String::new(),
      email_source: ProfileSource::NotFound,
      gender: String::new(),
      gender_acc: 0.0,
      gender_source: ProfileSource::NotFound,
      location: String::new(),
      location_source: ProfileSource::NotFound,
      country_code: None,
      country_source: ProfileSource::NotFound,
      is_bot: false,
    }
  }
}

// ─── Accounts ────────────────────────────────────────────────────────────────

/// The persisted GitHub account row, linked to its owning identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubAccount {
  pub id:         u64,
  /// `None` until the account has been resolved once.
  pub uuid:       Option<Uuid>,
  pub login:      String,
  pub email:      String,
  pub name:       Option<String>,
  pub company:    Option<String>,
  pub location:   Option<String>,
  pub blog:       Option<String>,
  pub bio:        Option<String>,
  pub followers:  u32,
  pub following:  u32,
  pub avatar_url: Option<String>,
}

/// The fan-out tables hanging off an account.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum AliasKind {
  Login,
  Name,
  Email,
}

// ─── Countries ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
  /// ISO 3166-1 alpha-2 code.
  pub code:   String,
  pub name:   String,
  pub alpha3: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn source_tags_round_trip_through_strings() {
    for source in [
      ProfileSource::NotFound,
      ProfileSource::EmailDomain,
      ProfileSource::GithubProfile,
      ProfileSource::GithubJson,
      ProfileSource::Manual,
      ProfileSource::UserManual,
      ProfileSource::LarkContact,
    ] {
      assert_eq!(ProfileSource::parse(source.as_ref()).unwrap(), source);
    }
    assert_eq!(ProfileSource::GithubProfile.as_ref(), "github_profile");
    assert!(ProfileSource::parse("bogus").is_err());
  }

  #[test]
  fn only_manual_sources_are_sticky() {
    assert!(ProfileSource::Manual.is_manual());
    assert!(ProfileSource::UserManual.is_manual());
    assert!(!ProfileSource::GithubProfile.is_manual());
    assert!(!ProfileSource::NotFound.is_manual());
  }

  #[test]
  fn noreply_detection() {
    assert!(is_noreply_email("123+octo@users.noreply.github.com"));
    assert!(!is_noreply_email("octo@github.com"));
  }
}
