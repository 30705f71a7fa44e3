//! Free text and email addresses → canonical organizations.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use regex::Regex;
use roster_core::{
  identity::is_noreply_email,
  organization::{NewOrganization, Organization},
  store::IdentityStore,
};

use crate::{Error, Result};

/// Characters escaped in generated patterns. The backslash goes first so the
/// escapes added for the others are left alone. Braces are included because
/// `regex` rejects a brace that is not a valid repetition.
const REGEX_METACHARACTERS: [&str; 14] =
  ["\\", "[", "]", "^", "$", ".", "|", "?", "*", "+", "(", ")", "{", "}"];

/// Escape `name` for use as a literal inside a pattern.
pub fn escape_regex(name: &str) -> String {
  let mut out = name.trim().to_owned();
  for symbol in REGEX_METACHARACTERS {
    out = out.replace(symbol, &format!("\\{symbol}"));
  }
  out
}

/// The pattern recorded for an organization created from a bare name.
pub fn generated_pattern(name: &str) -> String {
  format!("^{}$", escape_regex(name))
}

/// Patterns match case-insensitively against the whole name.
fn compile(pattern: &str) -> Result<Regex, regex::Error> {
  Regex::new(&format!("(?i)^(?:{pattern})$"))
}

// ─── Matcher ─────────────────────────────────────────────────────────────────

pub struct OrganizationMatcher<S> {
  store:    Arc<S>,
  /// Load order; the first match wins.
  patterns: Mutex<Vec<(Regex, Organization)>>,
  /// Non-common domains of valid organizations.
  domains:  Vec<(String, Organization)>,
}

impl<S: IdentityStore> OrganizationMatcher<S> {
  /// Build the pattern and domain tables from every valid organization.
  pub async fn load(store: Arc<S>) -> Result<Self> {
    let orgs = store.list_organizations(false).await.map_err(Error::store)?;

    let mut patterns = Vec::new();
    let mut domains = Vec::new();
    for org in orgs {
      for pattern in &org.patterns {
        match compile(pattern) {
          Ok(re) => patterns.push((re, org.clone())),
          Err(e) => {
            tracing::error!(org_id = org.id, %pattern, error = %e, "skipping bad org pattern");
          }
        }
      }
      for domain in &org.domains {
        if !domain.name.is_empty() && !domain.common {
          domains.push((domain.name.clone(), org.clone()));
        }
      }
    }

    tracing::info!(patterns = patterns.len(), domains = domains.len(), "loaded org matcher");
    Ok(Self { store, patterns: Mutex::new(patterns), domains })
  }

  fn lock(&self) -> MutexGuard<'_, Vec<(Regex, Organization)>> {
    self.patterns.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn lookup(&self, name: &str) -> Option<Organization> {
    self
      .lock()
      .iter()
      .find(|(re, _)| re.is_match(name))
      .map(|(_, org)| org.clone())
  }

  /// Map a free-text company name to an organization, creating one (and its
  /// name pattern) when nothing matches. Names under two characters and
  /// organizations marked invalid yield `None`.
  pub async fn match_name(&self, name: &str) -> Result<Option<Organization>> {
    let name = name.trim();
    if name.chars().count() < 2 {
      return Ok(None);
    }
    if let Some(org) = self.lookup(name) {
      return Ok(Some(org));
    }

    // Two tasks may both get here for the same name; the store dedupes.
    let org = self
      .store
      .find_or_create_organization(NewOrganization::from_name(name))
      .await
      .map_err(Error::store)?;
    if org.invalid {
      return Ok(None);
    }

    let pattern = generated_pattern(name);
    match compile(&pattern) {
      Ok(re) => self.lock().push((re, org.clone())),
      Err(e) => tracing::error!(%pattern, error = %e, "generated pattern does not compile"),
    }
    self
      .store
      .insert_pattern(org.id, pattern)
      .await
      .map_err(Error::store)?;

    tracing::debug!(org_id = org.id, name, "created organization");
    Ok(Some(org))
  }

  /// The organization owning the domain of `email`, if any.
  pub fn match_email(&self, email: &str) -> Option<Organization> {
    if is_noreply_email(email) {
      return None;
    }
    self
      .domains
      .iter()
      .find(|(domain, _)| {
        email
          .strip_suffix(domain.as_str())
          .is_some_and(|rest| rest.ends_with('@'))
      })
      .map(|(_, org)| org.clone())
  }

  pub fn pattern_count(&self) -> usize { self.lock().len() }
}

#[cfg(test)]
mod tests {
  use roster_core::organization::{OrgDomain, OrgType};
  use roster_store_sqlite::SqliteStore;

  use super::*;

  async fn store_with(orgs: &[(&str, &[&str], &[(&str, bool)])]) -> Arc<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    for (name, patterns, domains) in orgs {
      let org = store
        .find_or_create_organization(NewOrganization::from_name(name))
        .await
        .unwrap();
      for p in *patterns {
        store.insert_pattern(org.id, (*p).into()).await.unwrap();
      }
      for (d, common) in *domains {
        store
          .insert_domain(org.id, OrgDomain {
            name:   (*d).into(),
            is_top: false,
            common: *common,
          })
          .await
          .unwrap();
      }
    }
    Arc::new(store)
  }

  #[test]
  fn escapes_every_metacharacter_once() {
    assert_eq!(escape_regex(" a.b "), "a\\.b");
    assert_eq!(escape_regex("C++ (Labs)"), "C\\+\\+ \\(Labs\\)");
    assert_eq!(escape_regex("x\\y"), "x\\\\y");
    assert_eq!(escape_regex("[^$|?*]"), "\\[\\^\\$\\|\\?\\*\\]");
    assert_eq!(escape_regex("Foo {Bar}"), "Foo \\{Bar\\}");
    assert_eq!(generated_pattern("Acme"), "^Acme$");
  }

  #[tokio::test]
  async fn braced_names_register_their_pattern() {
    let store = store_with(&[]).await;
    let m = OrganizationMatcher::load(store.clone()).await.unwrap();

    let first = m.match_name("Foo {Bar}").await.unwrap().unwrap();
    assert_eq!(m.pattern_count(), 1);
    let second = m.match_name("foo {bar}").await.unwrap().unwrap();
    assert_eq!(first.id, second.id);

    let reloaded = OrganizationMatcher::load(store).await.unwrap();
    assert_eq!(reloaded.pattern_count(), 1);
  }

  #[test]
  fn generated_patterns_match_the_literal_name_only() {
    let re = compile(&generated_pattern("Yahoo!.com (Inc)")).unwrap();
    assert!(re.is_match("yahoo!.com (inc)"));
    assert!(!re.is_match("yahoo!Xcom (inc)"));
  }

  #[tokio::test]
  async fn first_loaded_pattern_wins() {
    let store = store_with(&[
      ("Acme", &["acme.*"], &[]),
      ("Acme Labs", &["acme labs"], &[]),
    ])
    .await;
    let m = OrganizationMatcher::load(store).await.unwrap();

    let org = m.match_name("  ACME LABS ").await.unwrap().unwrap();
    assert_eq!(org.name, "Acme");
  }

  #[tokio::test]
  async fn patterns_are_anchored() {
    let store = store_with(&[("Acme", &["acme"], &[])]).await;
    let m = OrganizationMatcher::load(store.clone()).await.unwrap();

    let org = m.match_name("Not Acme Really").await.unwrap().unwrap();
    assert_eq!(org.name, "Not Acme Really");
    assert_eq!(store.list_organizations(true).await.unwrap().len(), 2);
  }

  #[tokio::test]
  async fn unmatched_names_are_created_once() {
    let store = store_with(&[]).await;
    let m = OrganizationMatcher::load(store.clone()).await.unwrap();

    let first = m.match_name("University of Nowhere").await.unwrap().unwrap();
    let second = m.match_name("university of nowhere").await.unwrap().unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.org_type, OrgType::Education);
    assert_eq!(m.pattern_count(), 1);
    let orgs = store.list_organizations(true).await.unwrap();
    assert_eq!(orgs.len(), 1);
    assert_eq!(orgs[0].patterns, vec!["^University of Nowhere$"]);

    // A fresh matcher picks the persisted pattern up.
    let reloaded = OrganizationMatcher::load(store).await.unwrap();
    assert_eq!(reloaded.pattern_count(), 1);
  }

  #[tokio::test]
  async fn short_names_are_rejected() {
    let m = OrganizationMatcher::load(store_with(&[]).await).await.unwrap();
    assert!(m.match_name(" x ").await.unwrap().is_none());
    assert!(m.match_name("").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn bad_patterns_are_skipped() {
    let store = store_with(&[("Broken", &["(unclosed"], &[]), ("Fine", &["fine"], &[])]).await;
    let m = OrganizationMatcher::load(store).await.unwrap();
    assert_eq!(m.pattern_count(), 1);
    assert_eq!(m.match_name("FINE").await.unwrap().unwrap().name, "Fine");
  }

  #[tokio::test]
  async fn invalid_organizations_are_never_returned() {
    let store = store_with(&[]).await;
    let m = OrganizationMatcher::load(store.clone()).await.unwrap();
    let defunct = store
      .find_or_create_organization(NewOrganization::from_name("Defunct"))
      .await
      .unwrap();
    store.set_organization_invalid(defunct.id, true).await.unwrap();

    assert!(m.match_name("Defunct").await.unwrap().is_none());
    assert_eq!(m.pattern_count(), 0);
  }

  #[tokio::test]
  async fn email_domains() {
    let store = store_with(&[
      ("Acme", &[], &[("acme.com", false)]),
      ("Gmail", &[], &[("gmail.com", true)]),
    ])
    .await;
    let m = OrganizationMatcher::load(store).await.unwrap();

    assert_eq!(m.match_email("ada@acme.com").unwrap().name, "Acme");
    assert!(m.match_email("ada@notacme.com").is_none());
    assert!(m.match_email("ada@gmail.com").is_none());
    assert!(m.match_email("1+ada@users.noreply.github.com").is_none());
  }
}
