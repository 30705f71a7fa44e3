//! Enrollments: time-bounded organization affiliations.
//!
//! For a given identity the enrollments form a timeline: closed-open
//! intervals `[start, end)` ordered by start, never overlapping, with each
//! organization appearing at most once. [`append_enrollment`] is the only
//! operation that grows a live timeline and it preserves that invariant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::ProfileSource;

// ─── Sentinels ───────────────────────────────────────────────────────────────

/// 1900-01-01T00:00:00Z.
const DEFAULT_START_TIMESTAMP: i64 = -2_208_988_800;
/// 2100-01-01T00:00:00Z.
const DEFAULT_END_TIMESTAMP: i64 = 4_102_444_800;

/// "Since the beginning of time."
pub fn default_start_date() -> DateTime<Utc> {
  DateTime::from_timestamp(DEFAULT_START_TIMESTAMP, 0)
    .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// "Still ongoing."
pub fn default_end_date() -> DateTime<Utc> {
  DateTime::from_timestamp(DEFAULT_END_TIMESTAMP, 0)
    .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ─── Enrollment ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
  pub uuid:    Uuid,
  pub org_id:  i64,
  pub start:   DateTime<Utc>,
  pub end:     DateTime<Utc>,
  pub source:  ProfileSource,
  pub invalid: bool,
}

impl Enrollment {
  pub fn new(
    uuid: Uuid,
    org_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    source: ProfileSource,
  ) -> Self {
    Self { uuid, org_id, start, end, source, invalid: false }
  }
}

/// Whether `org_id` already appears in `enrollments`.
pub fn is_enrolled(enrollments: &[Enrollment], org_id: i64) -> bool {
  enrollments.iter().any(|e| e.org_id == org_id)
}

/// Sort a timeline ascending by `(start, end)`.
pub fn sort_timeline(enrollments: &mut [Enrollment]) {
  enrollments.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
}

/// Record that `uuid` is affiliated with `org_id` from now on.
///
/// See [`append_enrollment_at`].
pub fn append_enrollment(
  enrollments: Vec<Enrollment>,
  uuid: Uuid,
  org_id: i64,
  source: ProfileSource,
) -> Vec<Enrollment> {
  append_enrollment_at(enrollments, uuid, org_id, source, Utc::now())
}

/// Record that `uuid` is affiliated with `org_id` from `now` on.
///
/// - An empty timeline gets a single open-ended enrollment spanning all time.
/// - An organization that is already enrolled leaves the timeline untouched.
/// - Otherwise the latest enrollment is closed at `now` and a new one opens at
///   `now` and runs to the default end date.
pub fn append_enrollment_at(
  mut enrollments: Vec<Enrollment>,
  uuid: Uuid,
  org_id: i64,
  source: ProfileSource,
  now: DateTime<Utc>,
) -> Vec<Enrollment> {
  if enrollments.is_empty() {
    enrollments.push(Enrollment::new(
      uuid,
      org_id,
      default_start_date(),
      default_end_date(),
      source,
    ));
    return enrollments;
  }

  sort_timeline(&mut enrollments);

  if is_enrolled(&enrollments, org_id) {
    return enrollments;
  }

  if let Some(last) = enrollments.last_mut() {
    last.end = now;
  }
  enrollments.push(Enrollment::new(uuid, org_id, now, default_end_date(), source));
  enrollments
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;

  fn uuid() -> Uuid { Uuid::from_u128(0xfeed) }

  fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
  }

  fn enrollment(
    org_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Enrollment {
    Enrollment::new(uuid(), org_id, start, end, ProfileSource::GithubProfile)
  }

  fn assert_close(a: DateTime<Utc>, b: DateTime<Utc>) {
    assert!((a - b).num_seconds().abs() < 3, "{a} is not close to {b}");
  }

  fn assert_well_formed(timeline: &[Enrollment]) {
    for pair in timeline.windows(2) {
      assert!(pair[0].start <= pair[1].start, "not ordered: {pair:?}");
      assert!(pair[0].end <= pair[1].start, "overlapping: {pair:?}");
    }
    let mut orgs: Vec<i64> = timeline.iter().map(|e| e.org_id).collect();
    orgs.sort_unstable();
    orgs.dedup();
    assert_eq!(orgs.len(), timeline.len(), "duplicate org: {timeline:?}");
  }

  #[test]
  fn sentinel_dates() {
    assert_eq!(default_start_date(), at(1900, 1, 1));
    assert_eq!(default_end_date(), at(2100, 1, 1));
  }

  #[test]
  fn empty_timeline_gets_an_all_time_enrollment() {
    let got = append_enrollment(vec![], uuid(), 1, ProfileSource::GithubProfile);
    assert_eq!(got, vec![enrollment(1, default_start_date(), default_end_date())]);
  }

  #[test]
  fn second_org_closes_the_first_one_now() {
    let start = vec![enrollment(1, default_start_date(), default_end_date())];
    let now = Utc::now();

    let got = append_enrollment(start, uuid(), 2, ProfileSource::GithubProfile);

    assert_eq!(got.len(), 2);
    assert_eq!(got[0].org_id, 1);
    assert_eq!(got[0].start, default_start_date());
    assert_close(got[0].end, now);
    assert_eq!(got[1].org_id, 2);
    assert_close(got[1].start, now);
    assert_eq!(got[1].end, default_end_date());
    assert_eq!(got[1].source, ProfileSource::GithubProfile);
  }

  #[test]
  fn known_org_is_a_no_op() {
    let timeline = vec![
      enrollment(1, default_start_date(), at(2018, 9, 1)),
      enrollment(2, at(2018, 9, 1), default_end_date()),
    ];

    let got = append_enrollment(
      timeline.clone(),
      uuid(),
      1,
      ProfileSource::LarkContact,
    );
    assert_eq!(got, timeline);
  }

  #[test]
  fn unsorted_history_is_sorted_before_closing_the_latest() {
    let timeline = vec![
      enrollment(1, default_start_date(), at(2018, 9, 1)),
      enrollment(2, at(2019, 9, 7), default_end_date()),
      enrollment(3, at(2018, 9, 1), at(2019, 9, 7)),
    ];
    let now = at(2024, 1, 1);

    let got = append_enrollment_at(
      timeline,
      uuid(),
      4,
      ProfileSource::GithubProfile,
      now,
    );

    let orgs: Vec<i64> = got.iter().map(|e| e.org_id).collect();
    assert_eq!(orgs, vec![1, 3, 2, 4]);
    assert_eq!(got[2].start, at(2019, 9, 7));
    assert_eq!(got[2].end, now);
    assert_eq!(got[3].start, now);
    assert_eq!(got[3].end, default_end_date());
    assert_well_formed(&got);
  }

  #[test]
  fn repeated_appends_never_overlap() {
    let mut timeline = Vec::new();
    let mut now = at(2020, 1, 1);
    for org_id in [5, 3, 5, 9, 3, 1, 9, 2] {
      timeline = append_enrollment_at(
        timeline,
        uuid(),
        org_id,
        ProfileSource::EmailDomain,
        now,
      );
      now += Duration::days(30);
      assert_well_formed(&timeline);
    }
    let orgs: Vec<i64> = timeline.iter().map(|e| e.org_id).collect();
    assert_eq!(orgs, vec![5, 3, 9, 1, 2]);
  }
}
