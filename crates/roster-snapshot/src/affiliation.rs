//! Affiliation strings: `"Org1 < 2016-10-01, Org2"`.
//!
//! Each comma-separated segment names an organization and, optionally, the
//! date the affiliation ended. The segment without a date is current.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use roster_core::enrollment::default_end_date;

use crate::error::{Error, Result};

const SEGMENT_SEPARATOR: &str = ", ";
const UNTIL_SEPARATOR: &str = " < ";

/// Affiliation strings that mean "we do not know".
const UNKNOWN_AFFILIATIONS: &[&str] = &["NotFound", "(Unknown)", "?", "-", ""];

/// Written for accounts flagged as automation.
pub const ROBOT_AFFILIATION: &str = "(Robots)";

/// One segment of an affiliation string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Affiliation {
  pub company: String,
  /// Exclusive end; the default end date when the segment had no date.
  pub until:   DateTime<Utc>,
}

pub fn is_unknown_affiliation(affiliation: &str) -> bool {
  UNKNOWN_AFFILIATIONS.contains(&affiliation)
}

/// Split an affiliation string into its segments, in order.
///
/// Unknown strings yield nothing. Segments with an empty company are
/// dropped. The start of each segment is the `until` of the previous
/// segment the caller accepted, beginning at the default start date.
pub fn parse_affiliations(affiliation: &str) -> Result<Vec<Affiliation>> {
  if is_unknown_affiliation(affiliation) {
    return Ok(Vec::new());
  }

  let mut out = Vec::new();
  for segment in affiliation.split(SEGMENT_SEPARATOR) {
    let mut parts = segment.split(UNTIL_SEPARATOR);
    let company = parts.next().unwrap_or_default().trim();
    let until = match parts.next() {
      Some(date) => parse_date(date).ok_or_else(|| Error::InvalidDate {
        affiliation: affiliation.to_owned(),
        value:       date.to_owned(),
      })?,
      None => default_end_date(),
    };
    if company.is_empty() {
      continue;
    }
    out.push(Affiliation { company: company.to_owned(), until });
  }
  Ok(out)
}

/// Parse `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, or RFC 3339.
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
  let value = value.trim();
  if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
    return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
  }
  if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
    return Some(dt.and_utc());
  }
  DateTime::parse_from_rfc3339(value)
    .ok()
    .map(|dt| dt.with_timezone(&Utc))
}

/// Render `(organization, end)` pairs, ordered by start, back into an
/// affiliation string. The last organization is written without a date.
pub fn render_affiliations<S: AsRef<str>>(spans: &[(S, DateTime<Utc>)]) -> String {
  let mut out = String::new();
  for (i, (name, until)) in spans.iter().enumerate() {
    out.push_str(name.as_ref());
    if i + 1 < spans.len() {
      out.push_str(UNTIL_SEPARATOR);
      out.push_str(&until.format("%Y-%m-%d").to_string());
      out.push_str(SEGMENT_SEPARATOR);
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
  }

  #[test]
  fn unknown_strings_yield_nothing() {
    for s in ["NotFound", "(Unknown)", "?", "-", ""] {
      assert!(parse_affiliations(s).unwrap().is_empty(), "{s:?}");
    }
  }

  #[test]
  fn single_company_runs_to_default_end() {
    let got = parse_affiliations("Acme").unwrap();
    assert_eq!(got, vec![Affiliation {
      company: "Acme".into(),
      until:   default_end_date(),
    }]);
  }

  #[test]
  fn dated_history() {
    let got =
      parse_affiliations("Initech < 2016-10-01, Acme < 2019-03-15 12:00:00, Umbrella")
        .unwrap();
    assert_eq!(got.len(), 3);
    assert_eq!(got[0].company, "Initech");
    assert_eq!(got[0].until, at(2016, 10, 1));
    assert_eq!(
      got[1].until,
      Utc.with_ymd_and_hms(2019, 3, 15, 12, 0, 0).unwrap()
    );
    assert_eq!(got[2].company, "Umbrella");
    assert_eq!(got[2].until, default_end_date());
  }

  #[test]
  fn empty_segments_are_skipped() {
    let got = parse_affiliations(" < 2010-01-01, Acme").unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].company, "Acme");
  }

  #[test]
  fn bad_date_is_an_error() {
    assert!(parse_affiliations("Acme < someday, Initech").is_err());
  }

  #[test]
  fn rfc3339_dates() {
    let got = parse_affiliations("Acme < 2020-02-02T00:00:00Z, B").unwrap();
    assert_eq!(got[0].until, at(2020, 2, 2));
  }

  #[test]
  fn render_writes_dates_on_all_but_the_last() {
    let spans = vec![
      ("Initech", at(2018, 9, 1)),
      ("Acme", at(2020, 1, 1)),
      ("Umbrella", default_end_date()),
    ];
    assert_eq!(
      render_affiliations(&spans),
      "Initech < 2018-09-01, Acme < 2020-01-01, Umbrella"
    );
    assert_eq!(render_affiliations(&spans[..1]), "Initech");
    assert_eq!(render_affiliations::<&str>(&[]), "");
  }

  #[test]
  fn render_output_parses_back() {
    let spans = vec![("Initech", at(2018, 9, 1)), ("Acme", default_end_date())];
    let parsed = parse_affiliations(&render_affiliations(&spans)).unwrap();
    let back: Vec<(&str, DateTime<Utc>)> =
      parsed.iter().map(|a| (a.company.as_str(), a.until)).collect();
    assert_eq!(back, spans);
  }
}
