//! Organizations and the hints used to map free text onto them.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result};

/// The name under which individual contributors are filed.
pub const INDIVIDUAL_ORG_NAME: &str = "Individual";

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
pub enum OrgType {
  #[default]
  Company,
  Education,
  OpenSource,
  Individual,
}

impl OrgType {
  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownOrgType(s.to_owned()))
  }

  /// Classify a bare organization name.
  ///
  /// Education institutions are recognised by common prefixes and suffixes,
  /// the literal `Individual` is the individual bucket, and a leading `@`
  /// names a GitHub organization (open source). Anything else is a company.
  pub fn classify(name: &str) -> Self {
    if is_education_name(name) {
      Self::Education
    } else if name == INDIVIDUAL_ORG_NAME {
      Self::Individual
    } else if name.starts_with('@') {
      Self::OpenSource
    } else {
      Self::Company
    }
  }
}

const EDUCATION_PREFIXES: &[&str] = &[
  "university",
  "college",
  "大学",
  "universidad",
  "universitat",
  "université",
  "universitas",
  "universidade",
  "universitetet",
];

const EDUCATION_SUFFIXES: &[&str] =
  &["university", "college", "学院", "universidad"];

/// Whether `name` looks like a school or university.
pub fn is_education_name(name: &str) -> bool {
  let name = name.to_lowercase();
  EDUCATION_PREFIXES.iter().any(|p| name.starts_with(p))
    || EDUCATION_SUFFIXES.iter().any(|s| name.ends_with(s))
}

// ─── Organization ────────────────────────────────────────────────────────────

/// A canonical company, school, open-source group, or the individual bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
  pub id:       i64,
  pub name:     String,
  pub fullname: String,
  pub org_type: OrgType,
  pub website:  String,
  /// Soft delete. Enrollments pointing at an invalid organization are never
  /// exported, and the matcher refuses to hand it out.
  pub invalid:  bool,
  pub patterns: Vec<String>,
  pub domains:  Vec<OrgDomain>,
}

/// An email domain owned by an organization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgDomain {
  pub name:   String,
  #[serde(default)]
  pub is_top: bool,
  /// A public mail provider such as `gmail.com`; never used for inference.
  #[serde(default)]
  pub common: bool,
}

/// Input to [`crate::store::IdentityStore::find_or_create_organization`].
#[derive(Debug, Clone, Default)]
pub struct NewOrganization {
  pub name:     String,
  pub fullname: String,
  pub org_type: OrgType,
  pub website:  String,
}

impl NewOrganization {
  /// A bare organization known only by name, typed by [`OrgType::classify`].
  pub fn from_name(name: &str) -> Self {
    Self {
      name: name.to_owned(),
      org_type: OrgType::classify(name),
      ..Default::default()
    }
  }
}
