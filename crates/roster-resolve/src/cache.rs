//! Typed TTL caches shared by the external clients, and their on-disk form.
//!
//! Each cache kind has its own lock, so a checkpoint snapshots the caches one
//! at a time. The file is JSON, written to a sibling temp file and renamed
//! into place.

use std::{
  collections::{BTreeSet, HashMap},
  path::{Path, PathBuf},
  sync::{Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use chrono::{DateTime, Utc};
use roster_core::profile::{ExternalProfile, Repository};
use serde::{Deserialize, Serialize};

use crate::{Result, geo::Location};

// ─── Entries ─────────────────────────────────────────────────────────────────

/// A remembered outcome. Failures are cached too so a dead key is not
/// re-queried on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cached<T> {
  Found(T),
  Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry<V> {
  pub value:      V,
  pub expires_at: DateTime<Utc>,
}

impl<V> Entry<V> {
  fn is_live(&self, now: DateTime<Utc>) -> bool { now < self.expires_at }
}

fn expiry(ttl: Duration) -> DateTime<Utc> {
  let now = Utc::now();
  chrono::Duration::from_std(ttl)
    .ok()
    .and_then(|d| now.checked_add_signed(d))
    .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ─── TtlCache ────────────────────────────────────────────────────────────────

/// A string-keyed map whose entries expire.
#[derive(Debug)]
pub struct TtlCache<V> {
  entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V> Default for TtlCache<V> {
  fn default() -> Self { Self { entries: Mutex::new(HashMap::new()) } }
}

impl<V: Clone> TtlCache<V> {
  fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// The live value for `key`; an expired entry is evicted.
  pub fn get(&self, key: &str) -> Option<V> {
    let mut entries = self.lock();
    match entries.get(key) {
      Some(entry) if entry.is_live(Utc::now()) => Some(entry.value.clone()),
      Some(_) => {
        entries.remove(key);
        None
      }
      None => None,
    }
  }

  pub fn insert(&self, key: impl Into<String>, value: V, ttl: Duration) {
    let entry = Entry { value, expires_at: expiry(ttl) };
    self.lock().insert(key.into(), entry);
  }

  pub fn len(&self) -> usize { self.lock().len() }

  pub fn is_empty(&self) -> bool { self.lock().is_empty() }

  /// Live entries only.
  fn snapshot(&self) -> HashMap<String, Entry<V>> {
    let now = Utc::now();
    self
      .lock()
      .iter()
      .filter(|(_, e)| e.is_live(now))
      .map(|(k, e)| (k.clone(), e.clone()))
      .collect()
  }

  fn restore(&self, entries: HashMap<String, Entry<V>>) {
    let now = Utc::now();
    let mut held = self.lock();
    held.extend(entries.into_iter().filter(|(_, e)| e.is_live(now)));
  }
}

// ─── ResponseCache ───────────────────────────────────────────────────────────

/// Every cache the resolution run uses.
#[derive(Debug, Default)]
pub struct ResponseCache {
  pub users_by_id:     TtlCache<Cached<ExternalProfile>>,
  pub users_by_login:  TtlCache<Cached<ExternalProfile>>,
  pub repositories:    TtlCache<Cached<Repository>>,
  /// An entry with empty fields records "no match".
  pub locations:       TtlCache<Location>,
  pub employee_logins: TtlCache<BTreeSet<String>>,
}

#[derive(Default, Serialize, Deserialize)]
struct CacheFile {
  #[serde(default)]
  users_by_id:     HashMap<String, Entry<Cached<ExternalProfile>>>,
  #[serde(default)]
  users_by_login:  HashMap<String, Entry<Cached<ExternalProfile>>>,
  #[serde(default)]
  repositories:    HashMap<String, Entry<Cached<Repository>>>,
  #[serde(default)]
  locations:       HashMap<String, Entry<Location>>,
  #[serde(default)]
  employee_logins: HashMap<String, Entry<BTreeSet<String>>>,
}

impl ResponseCache {
  /// Load the cache file at `path`. A missing or unreadable file is a cold
  /// start, never an error.
  pub async fn load(path: &Path) -> Self {
    let cache = Self::default();
    let bytes = match tokio::fs::read(path).await {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        tracing::info!(path = %path.display(), "no cache file, starting cold");
        return cache;
      }
      Err(e) => {
        tracing::warn!(path = %path.display(), error = %e, "unreadable cache file, starting cold");
        return cache;
      }
    };

    match serde_json::from_slice::<CacheFile>(&bytes) {
      Ok(file) => {
        cache.users_by_id.restore(file.users_by_id);
        cache.users_by_login.restore(file.users_by_login);
        cache.repositories.restore(file.repositories);
        cache.locations.restore(file.locations);
        cache.employee_logins.restore(file.employee_logins);
        tracing::info!(
          path = %path.display(),
          users = cache.users_by_id.len(),
          locations = cache.locations.len(),
          "loaded cache file"
        );
      }
      Err(e) => {
        tracing::warn!(path = %path.display(), error = %e, "corrupt cache file, starting cold");
      }
    }
    cache
  }

  /// Write every live entry to `path` atomically.
  pub async fn save(&self, path: &Path) -> Result<()> {
    let file = CacheFile {
      users_by_id:     self.users_by_id.snapshot(),
      users_by_login:  self.users_by_login.snapshot(),
      repositories:    self.repositories.snapshot(),
      locations:       self.locations.snapshot(),
      employee_logins: self.employee_logins.snapshot(),
    };
    let bytes = serde_json::to_vec(&file)?;

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "saved cache file");
    Ok(())
  }
}

fn temp_path(path: &Path) -> PathBuf {
  let mut name = path.file_name().unwrap_or_default().to_os_string();
  name.push(".tmp");
  path.with_file_name(name)
}

#[cfg(test)]
mod tests {
  use super::*;

  const HOUR: Duration = Duration::from_secs(3600);

  fn profile(id: u64, login: &str) -> ExternalProfile {
    ExternalProfile { id, login: login.into(), ..Default::default() }
  }

  #[test]
  fn expired_entries_are_evicted() {
    let cache: TtlCache<u32> = TtlCache::default();
    cache.insert("live", 1, HOUR);
    cache.insert("dead", 2, Duration::ZERO);
    assert_eq!(cache.get("live"), Some(1));
    assert_eq!(cache.get("dead"), None);
    assert_eq!(cache.len(), 1);
  }

  #[test]
  fn huge_ttls_do_not_overflow() {
    let cache: TtlCache<u32> = TtlCache::default();
    cache.insert("k", 1, Duration::from_secs(u64::MAX));
    assert_eq!(cache.get("k"), Some(1));
  }

  #[tokio::test]
  async fn file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");

    let cache = ResponseCache::default();
    cache.users_by_id.insert("1", Cached::Found(profile(1, "octo")), HOUR);
    cache.users_by_id.insert("2", Cached::Failed("gone".into()), HOUR);
    cache.users_by_login.insert("stale", Cached::Failed("x".into()), Duration::ZERO);
    cache.locations.insert("paris", Location {
      address:      "Paris, France".into(),
      country_code: "FR".into(),
      country_name: "France".into(),
    }, HOUR);
    cache.employee_logins.insert(
      "employees",
      BTreeSet::from(["octo".to_string()]),
      HOUR,
    );
    cache.save(&path).await.unwrap();
    assert!(!temp_path(&path).exists());

    let loaded = ResponseCache::load(&path).await;
    assert_eq!(loaded.users_by_id.get("1"), Some(Cached::Found(profile(1, "octo"))));
    assert_eq!(loaded.users_by_id.get("2"), Some(Cached::Failed("gone".into())));
    assert!(loaded.users_by_login.is_empty());
    assert_eq!(loaded.locations.get("paris").unwrap().country_code, "FR");
    assert!(loaded.employee_logins.get("employees").unwrap().contains("octo"));
  }

  #[tokio::test]
  async fn missing_or_corrupt_file_is_a_cold_start() {
    let dir = tempfile::tempdir().unwrap();

    let missing = ResponseCache::load(&dir.path().join("nope.json")).await;
    assert!(missing.users_by_id.is_empty());

    let corrupt = dir.path().join("corrupt.json");
    std::fs::write(&corrupt, b"{\"users_by_id\": [").unwrap();
    let loaded = ResponseCache::load(&corrupt).await;
    assert!(loaded.users_by_id.is_empty());
    assert!(loaded.locations.is_empty());
  }
}
