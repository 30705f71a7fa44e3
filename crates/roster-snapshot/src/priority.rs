//! Source priorities and the login-keyed snapshot index.

use std::collections::HashMap;

use roster_core::identity::ProfileSource;

use crate::record::SnapshotRecord;

/// Rank of a snapshot `source` value, ignoring case. Unknown values rank
/// with `""`.
pub fn source_priority(source: &str) -> i32 {
  match source.to_ascii_lowercase().as_str() {
    "notfound" => -20,
    "domain" => -10,
    "config" => 10,
    "manual" => 20,
    "user_manual" => 30,
    "user" => 40,
    _ => 0,
  }
}

/// Rows from any other source carry no usable affiliation.
pub fn is_kept_source(source: &str) -> bool {
  matches!(
    source.to_ascii_lowercase().as_str(),
    "domain" | "config" | "manual" | "user_manual" | "user"
  )
}

/// The provenance an enrollment derived from a snapshot row carries.
pub fn enrollment_source(source: &str) -> ProfileSource {
  match source.to_ascii_lowercase().as_str() {
    "user" | "user_manual" => ProfileSource::UserManual,
    "domain" => ProfileSource::EmailDomain,
    _ => ProfileSource::GithubJson,
  }
}

// ─── Index ───────────────────────────────────────────────────────────────────

/// Snapshot rows keyed by login, one winner per login.
#[derive(Debug, Clone, Default)]
pub struct SnapshotIndex {
  by_login: HashMap<String, SnapshotRecord>,
}

impl SnapshotIndex {
  /// Keep only rows from accepted sources; when a login repeats, the row with
  /// strictly higher priority replaces the held one.
  pub fn from_records(records: impl IntoIterator<Item = SnapshotRecord>) -> Self {
    let mut index = Self::default();
    for record in records {
      index.insert(record);
    }
    index
  }

  pub fn insert(&mut self, record: SnapshotRecord) {
    if !is_kept_source(&record.source) {
      return;
    }
    match self.by_login.get(&record.login) {
      Some(held)
        if source_priority(&record.source) <= source_priority(&held.source) => {}
      _ => {
        self.by_login.insert(record.login.clone(), record);
      }
    }
  }

  pub fn get(&self, login: &str) -> Option<&SnapshotRecord> {
    self.by_login.get(login)
  }

  /// The highest-priority row among `logins`; earlier logins win ties.
  pub fn best_for<'a, I>(&self, logins: I) -> Option<&SnapshotRecord>
  where
    I: IntoIterator<Item = &'a String>,
  {
    let mut best: Option<&SnapshotRecord> = None;
    for record in logins.into_iter().filter_map(|l| self.get(l)) {
      match best {
        Some(held)
          if source_priority(&record.source)
            <= source_priority(&held.source) => {}
        _ => best = Some(record),
      }
    }
    best
  }

  pub fn len(&self) -> usize { self.by_login.len() }

  pub fn is_empty(&self) -> bool { self.by_login.is_empty() }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn row(login: &str, source: &str, affiliation: &str) -> SnapshotRecord {
    SnapshotRecord {
      login: login.into(),
      source: source.into(),
      affiliation: affiliation.into(),
      ..Default::default()
    }
  }

  #[test]
  fn priority_order() {
    let ordered = ["notfound", "domain", "", "config", "manual", "user_manual", "user"];
    for pair in ordered.windows(2) {
      assert!(source_priority(pair[0]) < source_priority(pair[1]), "{pair:?}");
    }
  }

  #[test]
  fn higher_priority_wins_regardless_of_order() {
    let index = SnapshotIndex::from_records([
      row("ada", "domain", "Acme"),
      row("ada", "user_manual", "Initech"),
    ]);
    assert_eq!(index.get("ada").unwrap().affiliation, "Initech");

    let index = SnapshotIndex::from_records([
      row("ada", "user_manual", "Initech"),
      row("ada", "domain", "Acme"),
    ]);
    assert_eq!(index.get("ada").unwrap().affiliation, "Initech");
  }

  #[test]
  fn sources_compare_case_insensitively() {
    let index = SnapshotIndex::from_records([
      row("ada", "Domain", "Acme"),
      row("ada", "User_Manual", "Initech"),
      row("bob", "DOMAIN", "Globex"),
    ]);
    assert_eq!(index.len(), 2);
    assert_eq!(index.get("ada").unwrap().affiliation, "Initech");
    assert_eq!(enrollment_source("User_Manual"), ProfileSource::UserManual);
  }

  #[test]
  fn first_row_wins_ties() {
    let index = SnapshotIndex::from_records([
      row("ada", "config", "First"),
      row("ada", "config", "Second"),
    ]);
    assert_eq!(index.get("ada").unwrap().affiliation, "First");
  }

  #[test]
  fn unaccepted_sources_are_dropped() {
    let index = SnapshotIndex::from_records([
      row("a", "notfound", "Acme"),
      row("b", "", "Acme"),
      row("c", "robot", "Acme"),
      row("d", "user", "Acme"),
    ]);
    assert_eq!(index.len(), 1);
    assert!(index.get("d").is_some());
  }

  #[test]
  fn best_for_picks_highest_priority_login() {
    let index = SnapshotIndex::from_records([
      row("old", "user", "Initech"),
      row("new", "config", "Acme"),
    ]);
    let logins = vec!["new".to_string(), "old".to_string(), "gone".to_string()];
    assert_eq!(index.best_for(&logins).unwrap().login, "old");
    assert!(index.best_for(&["gone".to_string()]).is_none());
  }

  #[test]
  fn enrollment_sources() {
    assert_eq!(enrollment_source("user"), ProfileSource::UserManual);
    assert_eq!(enrollment_source("user_manual"), ProfileSource::UserManual);
    assert_eq!(enrollment_source("domain"), ProfileSource::EmailDomain);
    assert_eq!(enrollment_source("config"), ProfileSource::GithubJson);
  }
}
