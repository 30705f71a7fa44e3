//! Writing resolved identities back out in the snapshot format.

use std::{collections::HashMap, path::Path};

use roster_core::{
  enrollment::sort_timeline,
  identity::{AliasKind, Identity},
  organization::Organization,
  store::IdentityStore,
};
use roster_snapshot::{ROBOT_AFFILIATION, SnapshotRecord, render_affiliations};

use crate::{Error, Result};

/// Every exported row claims the highest trust so a re-import keeps it.
const EXPORT_SOURCE: &str = "user_manual";

/// Build one record per (login, email) pair of every account of every
/// identity.
pub async fn export_records<S: IdentityStore>(store: &S) -> Result<Vec<SnapshotRecord>> {
  let orgs: HashMap<i64, Organization> = store
    .list_organizations(false)
    .await
    .map_err(Error::store)?
    .into_iter()
    .map(|org| (org.id, org))
    .collect();

  let identities = store.list_identities().await.map_err(Error::store)?;
  let total = identities.len();
  let mut records = Vec::new();

  for (i, identity) in identities.into_iter().enumerate() {
    if i % 100 == 0 || i + 1 == total {
      tracing::info!(done = i + 1, total, "exporting identities");
    }
    let affiliation = affiliation(store, &identity, &orgs).await?;

    let accounts = store
      .list_accounts(identity.uuid)
      .await
      .map_err(Error::store)?;
    for account in accounts {
      let logins = store
        .list_aliases(account.id, AliasKind::Login)
        .await
        .map_err(Error::store)?;
      let emails = store
        .list_aliases(account.id, AliasKind::Email)
        .await
        .map_err(Error::store)?;

      for login in &logins {
        for email in &emails {
          let mut record = SnapshotRecord {
            login: login.clone(),
            affiliation: affiliation.clone(),
            source: EXPORT_SOURCE.into(),
            name: identity.name.clone(),
            country_id: identity.country_code.clone(),
            sex: Some(identity.gender.clone()),
            sex_prob: Some(identity.gender_acc),
            ..Default::default()
          };
          record.set_email(email);
          records.push(record);
        }
      }
    }
  }
  Ok(records)
}

/// The rendered timeline of valid enrollments at valid organizations.
async fn affiliation<S: IdentityStore>(
  store: &S,
  identity: &Identity,
  orgs: &HashMap<i64, Organization>,
) -> Result<String> {
  if identity.is_bot {
    return Ok(ROBOT_AFFILIATION.to_owned());
  }

  let mut enrollments = store
    .list_enrollments(identity.uuid)
    .await
    .map_err(Error::store)?;
  enrollments.retain(|e| !e.invalid);
  sort_timeline(&mut enrollments);

  let spans: Vec<_> = enrollments
    .iter()
    .filter_map(|e| orgs.get(&e.org_id).map(|org| (org.name.as_str(), e.end)))
    .collect();
  Ok(render_affiliations(&spans))
}

/// Export every identity to `path` as tab-indented JSON. Returns the number
/// of records written.
pub async fn export_snapshot<S: IdentityStore>(store: &S, path: &Path) -> Result<usize> {
  let records = export_records(store).await?;
  let json = roster_snapshot::encode(&records)?;
  tokio::fs::write(path, json).await?;
  tracing::info!(records = records.len(), path = %path.display(), "wrote export");
  Ok(records.len())
}
