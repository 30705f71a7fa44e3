//! Codec for the bulk affiliation snapshot.
//!
//! The snapshot is a JSON array of per-login records carrying a name, an
//! obfuscated email, demographic guesses, and an affiliation history string.
//! Pure synchronous; fetching the document is the caller's job.
//!
//! # Quick start
//!
//! ```no_run
//! use roster_snapshot::{SnapshotIndex, parse};
//!
//! let json = r#"[{"login":"ada","email":"ada!acme.io","source":"user",
//!                 "name":"Ada","affiliation":"Initech < 2018-09-01, Acme"}]"#;
//! let index = SnapshotIndex::from_records(parse(json).unwrap());
//! assert_eq!(index.get("ada").unwrap().email(), "ada@acme.io");
//! ```

mod affiliation;
pub mod error;
mod priority;
mod record;

pub use affiliation::{
  Affiliation, ROBOT_AFFILIATION, is_unknown_affiliation, parse_affiliations,
  render_affiliations,
};
pub use error::{Error, Result};
pub use priority::{
  SnapshotIndex, enrollment_source, is_kept_source, source_priority,
};
pub use record::SnapshotRecord;

/// Parse a snapshot document.
pub fn parse(input: &str) -> Result<Vec<SnapshotRecord>> {
  Ok(serde_json::from_str(input)?)
}

/// Encode records as a tab-indented JSON document.
pub fn encode(records: &[SnapshotRecord]) -> Result<String> {
  let mut buf = Vec::new();
  let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
  let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
  serde::Serialize::serialize(records, &mut ser)?;
  // serde_json only ever writes UTF-8.
  Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_a_document_with_optional_fields() {
    let json = r#"[
      {"login":"ada","email":"ada!acme.io","source":"user","name":"Ada",
       "affiliation":"Acme","sex":"female","sex_prob":0.9,"country_id":"GB"},
      {"login":"bob","email":"","source":"domain","name":"Bob"}
    ]"#;
    let records = parse(json).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].sex.as_deref(), Some("female"));
    assert_eq!(records[0].sex_prob, Some(0.9));
    assert_eq!(records[1].affiliation, "");
    assert!(records[1].age.is_none());
  }

  #[test]
  fn malformed_documents_are_errors() {
    assert!(parse("{\"login\": 1}").is_err());
    assert!(parse("not json").is_err());
  }

  #[test]
  fn encode_is_tab_indented_and_parses_back() {
    let records = vec![SnapshotRecord {
      login: "ada".into(),
      email: "ada!acme.io".into(),
      source: "user_manual".into(),
      affiliation: "Acme".into(),
      ..Default::default()
    }];
    let json = encode(&records).unwrap();
    assert!(json.contains("\n\t{"));
    assert_eq!(parse(&json).unwrap(), records);
  }
}
