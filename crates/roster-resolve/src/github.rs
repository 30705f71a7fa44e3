//! The rate-limited, caching profile client.
//!
//! [`ProfileApi`] is the raw source: one request per call, addressed to a
//! credential slot. [`ProfileClient`] adds the cache, the quota check, and
//! the bounded retry loop on top.

use std::{
  future::Future,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use chrono::Utc;
use reqwest::{Client, RequestBuilder, StatusCode, header};
use roster_core::profile::{ExternalProfile, Repository};
use serde::{Deserialize, de::DeserializeOwned};

use crate::{
  Error, Result,
  cache::{Cached, ResponseCache, TtlCache},
  config::RetrySettings,
};

/// Extra pause on top of the advertised reset time.
const QUOTA_WAIT_PADDING: Duration = Duration::from_secs(1);

/// Remaining quota of one credential slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
  pub remaining: u32,
  pub reset_in:  Duration,
}

/// A profile source reachable through one or more credential slots.
pub trait ProfileApi: Send + Sync {
  /// Current quota of every slot, indexed by slot.
  fn rate_limits(
    &self,
  ) -> impl Future<Output = Result<Vec<RateLimit>>> + Send + '_;

  fn user_by_id(
    &self,
    slot: usize,
    id: u64,
  ) -> impl Future<Output = Result<ExternalProfile>> + Send + '_;

  fn user_by_login(
    &self,
    slot: usize,
    login: String,
  ) -> impl Future<Output = Result<ExternalProfile>> + Send + '_;

  fn repository(
    &self,
    slot: usize,
    owner: String,
    name: String,
  ) -> impl Future<Output = Result<Repository>> + Send + '_;
}

// ─── GitHub REST implementation ──────────────────────────────────────────────

#[derive(Deserialize)]
struct RateLimitResponse {
  resources: RateLimitResources,
}

#[derive(Deserialize)]
struct RateLimitResources {
  core: RateLimitCore,
}

#[derive(Deserialize)]
struct RateLimitCore {
  remaining: u32,
  /// Epoch seconds.
  reset:     i64,
}

/// The GitHub REST API with a pool of tokens, one slot per token.
#[derive(Clone)]
pub struct GitHubHttp {
  client:   Client,
  base_url: String,
  /// `None` is the anonymous slot.
  tokens:   Vec<Option<String>>,
}

impl GitHubHttp {
  pub fn new(base_url: &str, tokens: &[String]) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .user_agent(concat!("roster/", env!("CARGO_PKG_VERSION")))
      .build()?;
    let mut tokens: Vec<Option<String>> =
      tokens.iter().filter(|t| !t.is_empty()).cloned().map(Some).collect();
    if tokens.is_empty() {
      tokens.push(None);
    }
    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_owned(),
      tokens,
    })
  }

  fn get(&self, slot: usize, path: &str) -> RequestBuilder {
    let req = self
      .client
      .get(format!("{}{path}", self.base_url))
      .header(header::ACCEPT, "application/vnd.github+json");
    match self.tokens.get(slot).cloned().flatten() {
      Some(token) => req.bearer_auth(token),
      None => req,
    }
  }

  async fn fetch<T: DeserializeOwned>(&self, slot: usize, path: &str) -> Result<T> {
    let resp = self.get(slot, path).send().await?;
    let status = resp.status();
    if status != StatusCode::OK {
      return Err(Error::Status { endpoint: path.to_owned(), status: status.as_u16() });
    }
    Ok(resp.json().await?)
  }
}

impl ProfileApi for GitHubHttp {
  async fn rate_limits(&self) -> Result<Vec<RateLimit>> {
    let now = Utc::now().timestamp();
    let mut limits = Vec::with_capacity(self.tokens.len());
    for slot in 0..self.tokens.len() {
      let body: RateLimitResponse = self.fetch(slot, "/rate_limit").await?;
      let reset_in = u64::try_from(body.resources.core.reset - now).unwrap_or(0);
      limits.push(RateLimit {
        remaining: body.resources.core.remaining,
        reset_in:  Duration::from_secs(reset_in),
      });
    }
    Ok(limits)
  }

  async fn user_by_id(&self, slot: usize, id: u64) -> Result<ExternalProfile> {
    self.fetch(slot, &format!("/user/{id}")).await
  }

  async fn user_by_login(&self, slot: usize, login: String) -> Result<ExternalProfile> {
    self.fetch(slot, &format!("/users/{login}")).await
  }

  async fn repository(
    &self,
    slot: usize,
    owner: String,
    name: String,
  ) -> Result<Repository> {
    self.fetch(slot, &format!("/repos/{owner}/{name}")).await
  }
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// Cached, quota-aware access to a [`ProfileApi`]. Safe to share between
/// tasks.
pub struct ProfileClient<P> {
  api:       P,
  cache:     Arc<ResponseCache>,
  settings:  RetrySettings,
  next_slot: AtomicUsize,
}

impl<P: ProfileApi> ProfileClient<P> {
  pub fn new(api: P, cache: Arc<ResponseCache>, settings: RetrySettings) -> Self {
    Self { api, cache, settings, next_slot: AtomicUsize::new(0) }
  }

  pub async fn user_by_id(&self, id: u64) -> Result<ExternalProfile> {
    self
      .fetch(&self.cache.users_by_id, format!("user {id}"), id.to_string(), |slot| {
        self.api.user_by_id(slot, id)
      })
      .await
  }

  pub async fn user_by_login(&self, login: &str) -> Result<ExternalProfile> {
    self
      .fetch(
        &self.cache.users_by_login,
        format!("user {login:?}"),
        login.to_owned(),
        |slot| self.api.user_by_login(slot, login.to_owned()),
      )
      .await
  }

  pub async fn repository(&self, owner: &str, name: &str) -> Result<Repository> {
    let full_name = format!("{owner}/{name}");
    self
      .fetch(
        &self.cache.repositories,
        format!("repository {full_name}"),
        full_name.clone(),
        |slot| self.api.repository(slot, owner.to_owned(), name.to_owned()),
      )
      .await
  }

  /// The slot with the most remaining calls. Ties rotate between callers.
  fn pick_slot(&self, limits: &[RateLimit]) -> Option<(usize, RateLimit)> {
    let best = limits.iter().map(|l| l.remaining).max()?;
    let start = self.next_slot.fetch_add(1, Ordering::Relaxed);
    (0..limits.len())
      .map(|i| (start + i) % limits.len())
      .find(|&i| limits[i].remaining == best)
      .map(|i| (i, limits[i]))
  }

  async fn fetch<T, F, Fut>(
    &self,
    cache: &TtlCache<Cached<T>>,
    what: String,
    key: String,
    mut call: F,
  ) -> Result<T>
  where
    T: Clone,
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    match cache.get(&key) {
      Some(Cached::Found(value)) => return Ok(value),
      Some(Cached::Failed(reason)) => {
        return Err(Error::CachedFailure { key: what, reason });
      }
      None => {}
    }

    let attempts = self.settings.max_retry;
    let mut last = String::new();
    for attempt in 1..=attempts {
      let picked = match self.api.rate_limits().await {
        Ok(limits) => self.pick_slot(&limits).ok_or(Error::NoCredentials),
        Err(e) => Err(e),
      };
      let (slot, limit) = match picked {
        Ok(picked) => picked,
        Err(e) => {
          tracing::warn!(%what, attempt, attempts, error = %e, "rate limit check failed");
          last = e.to_string();
          tokio::time::sleep(self.settings.retry_delay).await;
          continue;
        }
      };

      if limit.remaining <= self.settings.min_points {
        if limit.reset_in > self.settings.max_wait {
          tracing::error!(
            %what,
            reset_in = ?limit.reset_in,
            max_wait = ?self.settings.max_wait,
            "API quota exhausted, aborting"
          );
          return Err(Error::QuotaExhausted {
            reset_in: limit.reset_in,
            max_wait: self.settings.max_wait,
          });
        }
        tracing::info!(%what, slot, reset_in = ?limit.reset_in, "waiting for API quota");
        tokio::time::sleep(QUOTA_WAIT_PADDING + limit.reset_in).await;
        last = format!("quota exhausted on slot {slot}");
        continue;
      }

      match call(slot).await {
        Ok(value) => {
          cache.insert(key, Cached::Found(value.clone()), self.settings.ttl);
          return Ok(value);
        }
        Err(e) => {
          tracing::warn!(%what, attempt, attempts, error = %e, "profile request failed, retrying");
          last = e.to_string();
          tokio::time::sleep(self.settings.retry_delay).await;
        }
      }
    }

    let err = Error::RetriesExhausted { key: what, attempts, last };
    cache.insert(key, Cached::Failed(err.to_string()), self.settings.ttl);
    Err(err)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;

  const HOUR: Duration = Duration::from_secs(3600);

  fn settings(max_retry: u32) -> RetrySettings {
    RetrySettings {
      max_retry,
      min_points: 1,
      max_wait: Duration::from_secs(10),
      retry_delay: Duration::ZERO,
      ttl: HOUR,
    }
  }

  /// Scripted profile source. `failures` requests fail before it succeeds.
  struct FakeApi {
    limits:   Mutex<Vec<Vec<RateLimit>>>,
    failures: AtomicUsize,
    calls:    AtomicUsize,
    slots:    Mutex<Vec<usize>>,
  }

  impl FakeApi {
    fn healthy(slots: usize) -> Self {
      Self::with_limits(vec![vec![full(); slots]])
    }

    /// Each `rate_limits` call pops the next entry; the last one repeats.
    fn with_limits(limits: Vec<Vec<RateLimit>>) -> Self {
      Self {
        limits:   Mutex::new(limits),
        failures: AtomicUsize::new(0),
        calls:    AtomicUsize::new(0),
        slots:    Mutex::new(Vec::new()),
      }
    }

    fn failing(self, n: usize) -> Self {
      self.failures.store(n, Ordering::SeqCst);
      self
    }

    fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }

    fn answer(&self, slot: usize) -> Result<()> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.slots.lock().unwrap().push(slot);
      let left = self.failures.load(Ordering::SeqCst);
      if left > 0 {
        self.failures.store(left - 1, Ordering::SeqCst);
        return Err(Error::Status { endpoint: "/user".into(), status: 502 });
      }
      Ok(())
    }
  }

  fn full() -> RateLimit { RateLimit { remaining: 5000, reset_in: HOUR } }

  impl ProfileApi for FakeApi {
    async fn rate_limits(&self) -> Result<Vec<RateLimit>> {
      let mut limits = self.limits.lock().unwrap();
      if limits.len() > 1 {
        Ok(limits.remove(0))
      } else {
        Ok(limits[0].clone())
      }
    }

    async fn user_by_id(&self, slot: usize, id: u64) -> Result<ExternalProfile> {
      self.answer(slot)?;
      Ok(ExternalProfile { id, login: format!("user{id}"), ..Default::default() })
    }

    async fn user_by_login(&self, slot: usize, login: String) -> Result<ExternalProfile> {
      self.answer(slot)?;
      Ok(ExternalProfile { id: 1, login, ..Default::default() })
    }

    async fn repository(
      &self,
      slot: usize,
      owner: String,
      name: String,
    ) -> Result<Repository> {
      self.answer(slot)?;
      Ok(Repository {
        id: 9,
        full_name: format!("{owner}/{name}"),
        name,
        ..Default::default()
      })
    }
  }

  fn client(api: FakeApi, max_retry: u32) -> ProfileClient<FakeApi> {
    ProfileClient::new(api, Arc::new(ResponseCache::default()), settings(max_retry))
  }

  #[tokio::test]
  async fn success_is_cached() {
    let c = client(FakeApi::healthy(1), 3);
    assert_eq!(c.user_by_id(42).await.unwrap().login, "user42");
    assert_eq!(c.user_by_id(42).await.unwrap().login, "user42");
    assert_eq!(c.api.calls(), 1);
  }

  #[tokio::test]
  async fn transient_failures_are_retried() {
    let c = client(FakeApi::healthy(1).failing(2), 3);
    assert!(c.user_by_login("octo").await.is_ok());
    assert_eq!(c.api.calls(), 3);
  }

  #[tokio::test]
  async fn exhausted_retries_are_cached_and_replayed() {
    let c = client(FakeApi::healthy(1).failing(10), 3);

    let err = c.user_by_id(7).await.unwrap_err();
    assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }), "{err}");
    assert_eq!(c.api.calls(), 3);

    let err = c.user_by_id(7).await.unwrap_err();
    assert!(matches!(err, Error::CachedFailure { .. }), "{err}");
    assert_eq!(c.api.calls(), 3);
    assert!(!err.is_fatal());
  }

  #[tokio::test]
  async fn quota_beyond_max_wait_is_fatal() {
    let api = FakeApi::with_limits(vec![vec![RateLimit {
      remaining: 1,
      reset_in:  HOUR,
    }]]);
    let c = client(api, 3);

    let err = c.repository("rust-lang", "rust").await.unwrap_err();
    assert!(err.is_fatal(), "{err}");
    assert_eq!(c.api.calls(), 0);
    assert!(c.cache.repositories.is_empty());
  }

  #[tokio::test]
  async fn short_quota_wait_consumes_an_attempt() {
    let api = FakeApi::with_limits(vec![
      vec![RateLimit { remaining: 0, reset_in: Duration::ZERO }],
      vec![full()],
    ]);
    let c = client(api, 2);

    assert!(c.user_by_id(1).await.is_ok());
    assert_eq!(c.api.calls(), 1);
  }

  #[tokio::test]
  async fn richest_slot_wins_and_ties_rotate() {
    let api = FakeApi::with_limits(vec![vec![
      RateLimit { remaining: 10, reset_in: HOUR },
      RateLimit { remaining: 900, reset_in: HOUR },
      RateLimit { remaining: 900, reset_in: HOUR },
    ]]);
    let c = client(api, 1);

    for id in 0..4 {
      c.user_by_id(id).await.unwrap();
    }
    let used = c.api.slots.lock().unwrap().clone();
    assert!(used.iter().all(|&s| s == 1 || s == 2), "{used:?}");
    assert!(used.contains(&1) && used.contains(&2), "{used:?}");
  }
}
