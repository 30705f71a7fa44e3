//! Resolution of one observed account into its canonical identity.

use std::{collections::BTreeSet, future::Future, sync::Arc};

use roster_core::{
  enrollment::{Enrollment, append_enrollment, default_start_date, is_enrolled},
  identity::{
    AliasKind, GitHubAccount, Identity, ProfileSource, RawIdentifier,
    is_noreply_email,
  },
  profile::{ExternalProfile, non_empty},
  store::IdentityStore,
};
use roster_snapshot::{
  Affiliation, SnapshotIndex, SnapshotRecord, enrollment_source,
  parse_affiliations,
};
use uuid::Uuid;

use crate::{
  Error, Result,
  directory::{Directory, EmployeeRegistry},
  geo::{GeoResolver, Geocoder},
  github::{ProfileApi, ProfileClient},
  matcher::OrganizationMatcher,
};

/// What became of one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  Resolved,
  /// Nothing to resolve, e.g. an account never seen under any login.
  Skipped,
}

/// Anything the scheduler can run once per observed account.
pub trait Resolve: Send + Sync {
  fn resolve(
    &self,
    raw: RawIdentifier,
  ) -> impl Future<Output = Result<Outcome>> + Send + '_;
}

// ─── Candidates ──────────────────────────────────────────────────────────────

/// Observed values merged with the fetched profile.
#[derive(Debug)]
struct Candidates {
  logins: BTreeSet<String>,
  names:  BTreeSet<String>,
  emails: BTreeSet<String>,
  login:  String,
  name:   String,
  /// Never a noreply address; empty when none is known.
  email:  String,
}

impl Candidates {
  fn merge(raw: RawIdentifier, profile: &ExternalProfile) -> Self {
    let RawIdentifier { mut logins, mut names, mut emails, .. } = raw;

    let observed_login = logins.iter().next().cloned().unwrap_or_default();
    let observed_name = names.iter().find(|n| !n.trim().is_empty()).cloned();
    let observed_email = emails
      .iter()
      .find(|e| !e.is_empty() && !is_noreply_email(e))
      .cloned();

    let login = match non_empty(Some(profile.login.as_str())) {
      Some(login) => {
        logins.insert(login.to_owned());
        login.to_owned()
      }
      None => observed_login,
    };

    let name = match non_empty(profile.name.as_deref()) {
      Some(name) => {
        names.insert(name.to_owned());
        name.to_owned()
      }
      None => observed_name.unwrap_or_default(),
    };

    let profile_email = non_empty(profile.email.as_deref());
    if let Some(email) = profile_email {
      emails.insert(email.to_owned());
    }
    let email = profile_email
      .filter(|e| !is_noreply_email(e))
      .map(str::to_owned)
      .or(observed_email)
      .unwrap_or_default();

    Self { logins, names, emails, login, name, email }
  }

  /// The primary login first, then the rest in order.
  fn logins_by_preference(&self) -> impl Iterator<Item = &String> {
    std::iter::once(&self.login)
      .chain(self.logins.iter().filter(move |l| **l != self.login))
  }
}

// ─── Merger ──────────────────────────────────────────────────────────────────

/// The shared context every resolution task works against.
pub struct IdentityMerger<S, P, G, D> {
  store:     Arc<S>,
  profiles:  ProfileClient<P>,
  geo:       GeoResolver<G>,
  employees: EmployeeRegistry<D>,
  matcher:   OrganizationMatcher<S>,
  snapshot:  SnapshotIndex,
  /// Organization every employee is enrolled in.
  employer:  String,
}

impl<S, P, G, D> IdentityMerger<S, P, G, D>
where
  S: IdentityStore,
  P: ProfileApi,
  G: Geocoder,
  D: Directory,
{
  pub fn new(
    store: Arc<S>,
    profiles: ProfileClient<P>,
    geo: GeoResolver<G>,
    employees: EmployeeRegistry<D>,
    matcher: OrganizationMatcher<S>,
    snapshot: SnapshotIndex,
    employer: impl Into<String>,
  ) -> Self {
    Self {
      store,
      profiles,
      geo,
      employees,
      matcher,
      snapshot,
      employer: employer.into(),
    }
  }

  async fn merge(&self, raw: RawIdentifier) -> Result<Outcome> {
    if raw.logins.is_empty() {
      return Ok(Outcome::Skipped);
    }
    let id = raw.id;

    let profile = self.profiles.user_by_id(id).await?;
    let candidates = Candidates::merge(raw, &profile);

    let existing = self.store.get_account(id).await.map_err(Error::store)?;
    let uuid = existing
      .and_then(|account| account.uuid)
      .unwrap_or_else(Uuid::new_v4);
    let mut identity = self
      .store
      .find_or_create_identity(uuid)
      .await
      .map_err(Error::store)?;

    self.save_account(id, uuid, &candidates, &profile).await?;

    let snapshot = self.snapshot.best_for(candidates.logins_by_preference());
    self
      .merge_fields(&mut identity, &candidates, &profile, snapshot)
      .await;

    let enrollments = self
      .infer_enrollments(uuid, &candidates, &profile, snapshot)
      .await?;
    let enrolled = enrollments.len();
    self
      .store
      .upsert_enrollments(enrollments)
      .await
      .map_err(Error::store)?;

    self.store.save_identity(identity).await.map_err(Error::store)?;

    tracing::debug!(id, login = %candidates.login, %uuid, enrolled, "resolved identity");
    Ok(Outcome::Resolved)
  }

  async fn save_account(
    &self,
    id: u64,
    uuid: Uuid,
    c: &Candidates,
    profile: &ExternalProfile,
  ) -> Result<()> {
    let account = GitHubAccount {
      id,
      uuid: Some(uuid),
      login: c.login.clone(),
      email: c.email.clone(),
      name: Some(c.name.clone()).filter(|n| !n.is_empty()),
      company: profile.company.clone(),
      location: profile.location.clone(),
      blog: profile.blog.clone(),
      bio: profile.bio.clone(),
      followers: profile.followers,
      following: profile.following,
      avatar_url: profile.avatar_url.clone(),
    };
    self.store.upsert_account(account).await.map_err(Error::store)?;

    for (kind, values) in [
      (AliasKind::Login, &c.logins),
      (AliasKind::Name, &c.names),
      (AliasKind::Email, &c.emails),
    ] {
      let values: Vec<String> =
        values.iter().filter(|v| !v.is_empty()).cloned().collect();
      self
        .store
        .insert_aliases(id, kind, values)
        .await
        .map_err(Error::store)?;
    }
    Ok(())
  }

  /// Overwrite every field whose current value was not set by hand.
  async fn merge_fields(
    &self,
    identity: &mut Identity,
    c: &Candidates,
    profile: &ExternalProfile,
    snapshot: Option<&SnapshotRecord>,
  ) {
    if !identity.name_source.is_manual() && !c.name.is_empty() {
      identity.name = c.name.clone();
      identity.name_source = ProfileSource::GithubProfile;
    }
    if !identity.email_source.is_manual() && !c.email.is_empty() {
      identity.email = c.email.clone();
      identity.email_source = ProfileSource::GithubProfile;
    }

    if let Some(text) = non_empty(profile.location.as_deref()) {
      match self.geo.resolve(text).await {
        Ok(location) => {
          if !identity.location_source.is_manual() {
            identity.location = location.address;
            identity.location_source = ProfileSource::GithubProfile;
          }
          if !identity.country_source.is_manual() {
            identity.country_code = Some(location.country_code);
            identity.country_source = ProfileSource::GithubProfile;
          }
        }
        Err(e) => {
          tracing::warn!(uuid = %identity.uuid, location = text, error = %e, "could not resolve location");
        }
      }
    }

    let gender = snapshot
      .and_then(|r| non_empty(r.sex.as_deref()).map(|sex| (sex, r.sex_prob)))
      .filter(|_| !identity.gender_source.is_manual());
    if let Some((sex, prob)) = gender {
      identity.gender = sex.to_owned();
      identity.gender_acc = prob.unwrap_or_default();
      identity.gender_source = ProfileSource::GithubJson;
    }

    if profile.is_bot() {
      identity.is_bot = true;
    }
  }

  /// The identity's stored timeline grown by every affiliation signal, in
  /// order: snapshot history, email domains, profile company, directory.
  async fn infer_enrollments(
    &self,
    uuid: Uuid,
    c: &Candidates,
    profile: &ExternalProfile,
    snapshot: Option<&SnapshotRecord>,
  ) -> Result<Vec<Enrollment>> {
    let mut enrollments =
      self.store.list_enrollments(uuid).await.map_err(Error::store)?;

    // Dated history is only laid down on an empty timeline; its spans carry
    // fixed dates that cannot be reconciled with intervals already stored.
    match snapshot {
      Some(record) if enrollments.is_empty() => {
        self
          .import_affiliations(uuid, record, &mut enrollments)
          .await?;
      }
      Some(record) => {
        tracing::debug!(%uuid, login = %record.login, "timeline exists, skipping snapshot history");
      }
      None => {}
    }

    for email in c.emails.iter().filter(|e| !is_noreply_email(e)) {
      if let Some(org) = self.matcher.match_email(email) {
        enrollments =
          append_enrollment(enrollments, uuid, org.id, ProfileSource::EmailDomain);
      }
    }

    let company = non_empty(profile.company.as_deref());
    let company_org = match company {
      Some(company) => self.matcher.match_name(company).await?,
      None => None,
    };
    if let Some(org) = company_org {
      enrollments =
        append_enrollment(enrollments, uuid, org.id, ProfileSource::GithubProfile);
    }

    let employer_org = if c.logins.iter().any(|l| self.employees.is_employee(l)) {
      self.matcher.match_name(&self.employer).await?
    } else {
      None
    };
    if let Some(org) = employer_org {
      enrollments =
        append_enrollment(enrollments, uuid, org.id, ProfileSource::LarkContact);
    }

    Ok(enrollments)
  }

  /// Insert the dated spans of a snapshot affiliation string as-is. Spans
  /// for organizations already enrolled are dropped; an unmatched company
  /// does not advance the start of the next span.
  async fn import_affiliations(
    &self,
    uuid: Uuid,
    record: &SnapshotRecord,
    enrollments: &mut Vec<Enrollment>,
  ) -> Result<()> {
    let affiliations = match parse_affiliations(&record.affiliation) {
      Ok(affiliations) => affiliations,
      Err(e) => {
        tracing::warn!(login = %record.login, error = %e, "skipping snapshot affiliation");
        return Ok(());
      }
    };

    let source = enrollment_source(&record.source);
    let mut start = default_start_date();
    for Affiliation { company, until } in affiliations {
      let Some(org) = self.matcher.match_name(&company).await? else {
        continue;
      };
      if !is_enrolled(enrollments, org.id) {
        enrollments.push(Enrollment::new(uuid, org.id, start, until, source));
      }
      start = until;
    }
    Ok(())
  }
}

impl<S, P, G, D> Resolve for IdentityMerger<S, P, G, D>
where
  S: IdentityStore,
  P: ProfileApi,
  G: Geocoder,
  D: Directory,
{
  async fn resolve(&self, raw: RawIdentifier) -> Result<Outcome> {
    self.merge(raw).await
  }
}
