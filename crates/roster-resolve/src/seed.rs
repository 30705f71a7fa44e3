//! One-off reference data: countries and the curated organization list.

use std::path::Path;

use roster_core::{
  identity::Country,
  organization::{NewOrganization, OrgDomain, OrgType},
  store::IdentityStore,
};
use serde::Deserialize;

use crate::{Error, Result, config::SeedConfig};

#[derive(Debug, Deserialize)]
struct OrgConfig {
  #[serde(default)]
  organizations: Vec<OrgEntry>,
}

#[derive(Debug, Deserialize)]
struct OrgEntry {
  name:     String,
  #[serde(default)]
  fullname: String,
  #[serde(default, rename = "type")]
  org_type: Option<OrgType>,
  #[serde(default)]
  website:  String,
  #[serde(default)]
  patterns: Vec<String>,
  #[serde(default)]
  domains:  Vec<OrgDomain>,
}

impl OrgEntry {
  /// The name heuristics win over the configured type.
  fn org_type(&self) -> OrgType {
    match OrgType::classify(&self.name) {
      OrgType::Company => self.org_type.unwrap_or_default(),
      classified => classified,
    }
  }
}

/// Parse a `name,code,alpha3` CSV without a header row.
pub fn load_countries(path: &Path) -> Result<Vec<Country>> {
  let mut reader = csv::ReaderBuilder::new()
    .has_headers(false)
    .flexible(true)
    .from_path(path)?;

  let mut countries = Vec::new();
  for (line, row) in reader.records().enumerate() {
    let row = row?;
    if row.len() != 3 {
      return Err(Error::Seed {
        path:    path.display().to_string(),
        message: format!("line {}: expected 3 fields, found {}", line + 1, row.len()),
      });
    }
    countries.push(Country {
      name:   row[0].trim().to_owned(),
      code:   row[1].trim().to_owned(),
      alpha3: row[2].trim().to_owned(),
    });
  }
  Ok(countries)
}

async fn seed_countries<S: IdentityStore>(store: &S, path: &Path) -> Result<()> {
  let countries = load_countries(path)?;
  let count = countries.len();
  store.upsert_countries(countries).await.map_err(Error::store)?;
  tracing::info!(count, path = %path.display(), "imported countries");
  Ok(())
}

async fn seed_organizations<S: IdentityStore>(store: &S, path: &Path) -> Result<()> {
  let text = tokio::fs::read_to_string(path).await?;
  let config: OrgConfig = serde_yaml::from_str(&text)?;
  let total = config.organizations.len();

  for (i, entry) in config.organizations.into_iter().enumerate() {
    if i % 100 == 0 || i + 1 == total {
      tracing::info!(done = i + 1, total, "importing organizations");
    }
    if entry.name.trim().is_empty() {
      tracing::warn!(index = i, "skipping organization without a name");
      continue;
    }

    let org = store
      .find_or_create_organization(NewOrganization {
        name:     entry.name.clone(),
        fullname: entry.fullname.clone(),
        org_type: entry.org_type(),
        website:  entry.website.clone(),
      })
      .await
      .map_err(Error::store)?;

    for pattern in entry.patterns.into_iter().filter(|p| !p.is_empty()) {
      store.insert_pattern(org.id, pattern).await.map_err(Error::store)?;
    }
    for domain in entry.domains.into_iter().filter(|d| !d.name.is_empty()) {
      store.insert_domain(org.id, domain).await.map_err(Error::store)?;
    }
  }
  Ok(())
}

/// Import the configured reference data unless it was imported before.
/// Returns whether anything was imported.
pub async fn seed<S: IdentityStore>(store: &S, config: &SeedConfig) -> Result<bool> {
  if store.is_seeded().await.map_err(Error::store)? {
    tracing::info!("seed data already imported, skipping");
    return Ok(false);
  }

  if let Some(path) = &config.countries_path {
    seed_countries(store, path).await?;
  }
  if let Some(path) = &config.organizations_path {
    seed_organizations(store, path).await?;
  }

  store.mark_seeded().await.map_err(Error::store)?;
  Ok(true)
}

#[cfg(test)]
mod tests {
  use roster_store_sqlite::SqliteStore;

  use super::*;

  const ORGS: &str = r#"
organizations:
  - name: Acme
    fullname: Acme Corporation
    type: company
    website: https://acme.example
    patterns: ["acme( inc\\.?)?", ""]
    domains:
      - name: acme.com
        is_top: true
      - name: gmail.com
        common: true
  - name: Springfield University
    type: company
  - name: "@rust-lang"
"#;

  fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
  }

  #[test]
  fn countries_need_three_fields() {
    let dir = tempfile::tempdir().unwrap();
    let good = write(&dir, "good.csv", "Germany,DE,DEU\n\"Korea, Republic of\",KR,KOR\n");
    let countries = load_countries(&good).unwrap();
    assert_eq!(countries.len(), 2);
    assert_eq!(countries[1].name, "Korea, Republic of");
    assert_eq!(countries[1].alpha3, "KOR");

    let bad = write(&dir, "bad.csv", "Germany,DE,DEU\nFrance,FR\n");
    let err = load_countries(&bad).unwrap_err();
    assert!(matches!(err, Error::Seed { .. }), "{err}");
  }

  #[tokio::test]
  async fn seeds_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = SeedConfig {
      organizations_path: Some(write(&dir, "orgs.yaml", ORGS)),
      countries_path:     Some(write(&dir, "countries.csv", "Germany,DE,DEU\n")),
      snapshot_source:    None,
    };
    let store = SqliteStore::open_in_memory().await.unwrap();

    assert!(seed(&store, &config).await.unwrap());
    assert!(!seed(&store, &config).await.unwrap());

    assert_eq!(store.list_countries().await.unwrap().len(), 1);
    let orgs = store.list_organizations(true).await.unwrap();
    assert_eq!(orgs.len(), 3);

    let acme = &orgs[0];
    assert_eq!(acme.fullname, "Acme Corporation");
    assert_eq!(acme.patterns, vec!["acme( inc\\.?)?"]);
    assert_eq!(acme.domains.len(), 2);
    assert!(acme.domains[0].is_top);
    assert!(acme.domains[1].common);

    assert_eq!(orgs[1].org_type, OrgType::Education);
    assert_eq!(orgs[2].org_type, OrgType::OpenSource);
  }

  #[tokio::test]
  async fn malformed_yaml_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = SeedConfig {
      organizations_path: Some(write(&dir, "orgs.yaml", "organizations: {")),
      ..Default::default()
    };
    let store = SqliteStore::open_in_memory().await.unwrap();

    assert!(matches!(seed(&store, &config).await, Err(Error::Yaml(_))));
    assert!(!store.is_seeded().await.unwrap());
  }
}
