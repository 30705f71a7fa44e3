//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. UUIDs are stored as
//! hyphenated lowercase strings. Enum tags use their snake_case names.

use chrono::{DateTime, Utc};
use roster_core::{
  enrollment::Enrollment,
  identity::{GitHubAccount, Identity, ProfileSource},
  organization::{OrgDomain, OrgType, Organization},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Numeric IDs ─────────────────────────────────────────────────────────────

/// GitHub IDs are unsigned; SQLite integers are signed.
pub fn encode_id(id: u64) -> Result<i64> {
  i64::try_from(id).map_err(|_| Error::IdOutOfRange(id.to_string()))
}

pub fn decode_id(id: i64) -> Result<u64> {
  u64::try_from(id).map_err(|_| Error::IdOutOfRange(id.to_string()))
}

fn decode_count(n: i64) -> u32 { u32::try_from(n.max(0)).unwrap_or(u32::MAX) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `unique_identities` row.
pub struct RawIdentity {
  pub uuid:            String,
  pub name:            String,
  pub name_source:     String,
  pub email:           String,
  pub email_source:    String,
  pub gender:          String,
  pub gender_acc:      f64,
  pub gender_source:   String,
  pub location:        String,
  pub location_source: String,
  pub country_code:    Option<String>,
  pub country_source:  String,
  pub is_bot:          bool,
}

pub const IDENTITY_COLUMNS: &str = "uuid, name, name_source, email, \
   email_source, gender, gender_acc, gender_source, location, \
   location_source, country_code, country_source, is_bot";

impl RawIdentity {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      uuid:            row.get(0)?,
      name:            row.get(1)?,
      name_source:     row.get(2)?,
      email:           row.get(3)?,
      email_source:    row.get(4)?,
      gender:          row.get(5)?,
      gender_acc:      row.get(6)?,
      gender_source:   row.get(7)?,
      location:        row.get(8)?,
      location_source: row.get(9)?,
      country_code:    row.get(10)?,
      country_source:  row.get(11)?,
      is_bot:          row.get(12)?,
    })
  }

  pub fn into_identity(self) -> Result<Identity> {
    Ok(Identity {
      uuid:            decode_uuid(&self.uuid)?,
      name:            self.name,
      name_source:     ProfileSource::parse(&self.name_source)?,
      email:           self.email,
      email_source:    ProfileSource::parse(&self.email_source)?,
      gender:          self.gender,
      gender_acc:      self.gender_acc,
      gender_source:   ProfileSource::parse(&self.gender_source)?,
      location:        self.location,
      location_source: ProfileSource::parse(&self.location_source)?,
      country_code:    self.country_code.filter(|c| !c.is_empty()),
      country_source:  ProfileSource::parse(&self.country_source)?,
      is_bot:          self.is_bot,
    })
  }
}

/// Raw values read directly from a `github_users` row.
pub struct RawAccount {
  pub id:         i64,
  pub uuid:       Option<String>,
  pub login:      String,
  pub email:      String,
  pub name:       Option<String>,
  pub company:    Option<String>,
  pub location:   Option<String>,
  pub blog:       Option<String>,
  pub bio:        Option<String>,
  pub followers:  i64,
  pub following:  i64,
  pub avatar_url: Option<String>,
}

pub const ACCOUNT_COLUMNS: &str = "id, uuid, login, email, name, company, \
   location, blog, bio, followers, following, avatar_url";

impl RawAccount {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      uuid:       row.get(1)?,
      login:      row.get(2)?,
      email:      row.get(3)?,
      name:       row.get(4)?,
      company:    row.get(5)?,
      location:   row.get(6)?,
      blog:       row.get(7)?,
      bio:        row.get(8)?,
      followers:  row.get(9)?,
      following:  row.get(10)?,
      avatar_url: row.get(11)?,
    })
  }

  pub fn into_account(self) -> Result<GitHubAccount> {
    Ok(GitHubAccount {
      id:         decode_id(self.id)?,
      uuid:       self.uuid.as_deref().map(decode_uuid).transpose()?,
      login:      self.login,
      email:      self.email,
      name:       self.name,
      company:    self.company,
      location:   self.location,
      blog:       self.blog,
      bio:        self.bio,
      followers:  decode_count(self.followers),
      following:  decode_count(self.following),
      avatar_url: self.avatar_url,
    })
  }
}

/// Raw values read directly from an `enrollments` row.
pub struct RawEnrollment {
  pub uuid:       String,
  pub org_id:     i64,
  pub start_date: String,
  pub end_date:   String,
  pub source:     String,
  pub invalid:    bool,
}

impl RawEnrollment {
  pub fn into_enrollment(self) -> Result<Enrollment> {
    Ok(Enrollment {
      uuid:    decode_uuid(&self.uuid)?,
      org_id:  self.org_id,
      start:   decode_dt(&self.start_date)?,
      end:     decode_dt(&self.end_date)?,
      source:  ProfileSource::parse(&self.source)?,
      invalid: self.invalid,
    })
  }
}

/// Raw values read directly from an `organizations` row, plus its hint rows.
pub struct RawOrganization {
  pub id:       i64,
  pub name:     String,
  pub fullname: String,
  pub org_type: String,
  pub website:  String,
  pub invalid:  bool,
  pub patterns: Vec<String>,
  pub domains:  Vec<OrgDomain>,
}

impl RawOrganization {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:       row.get(0)?,
      name:     row.get(1)?,
      fullname: row.get(2)?,
      org_type: row.get(3)?,
      website:  row.get(4)?,
      invalid:  row.get(5)?,
      patterns: Vec::new(),
      domains:  Vec::new(),
    })
  }

  pub fn into_organization(self) -> Result<Organization> {
    Ok(Organization {
      id:       self.id,
      name:     self.name,
      fullname: self.fullname,
      org_type: OrgType::parse(&self.org_type)?,
      website:  self.website,
      invalid:  self.invalid,
      patterns: self.patterns,
      domains:  self.domains,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ids_beyond_i64_are_rejected() {
    assert_eq!(encode_id(42).unwrap(), 42);
    assert!(encode_id(u64::MAX).is_err());
    assert!(decode_id(-1).is_err());
  }

  #[test]
  fn datetimes_round_trip_through_rfc3339() {
    let dt = roster_core::enrollment::default_start_date();
    assert_eq!(decode_dt(&encode_dt(dt)).unwrap(), dt);
    assert!(decode_dt("yesterday").is_err());
  }
}
