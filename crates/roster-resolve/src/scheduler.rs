//! Bounded fan-out of resolution tasks over the observed population.

use std::{path::PathBuf, sync::Arc};

use roster_core::identity::RawIdentifier;
use tokio::{
  sync::Semaphore,
  task::{JoinError, JoinSet},
};

use crate::{
  Result,
  cache::ResponseCache,
  merger::{Outcome, Resolve},
};

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
  pub total:    usize,
  pub resolved: usize,
  pub skipped:  usize,
  pub failed:   usize,
}

/// Where periodic cache snapshots go.
#[derive(Debug, Clone)]
pub struct CacheCheckpoint {
  pub cache: Arc<ResponseCache>,
  pub path:  PathBuf,
}

pub struct ResolutionScheduler<R> {
  resolver:         Arc<R>,
  workers:          usize,
  checkpoint_every: usize,
  checkpoint:       Option<CacheCheckpoint>,
}

type Joined = std::result::Result<(u64, Result<Outcome>), JoinError>;

impl<R: Resolve + 'static> ResolutionScheduler<R> {
  pub fn new(resolver: Arc<R>, workers: usize, checkpoint_every: usize) -> Self {
    Self {
      resolver,
      workers: workers.max(1),
      checkpoint_every: checkpoint_every.max(1),
      checkpoint: None,
    }
  }

  pub fn with_checkpoint(mut self, checkpoint: CacheCheckpoint) -> Self {
    self.checkpoint = Some(checkpoint);
    self
  }

  /// Resolve every identity with at most `workers` in flight.
  ///
  /// Per-identity failures are counted. A fatal failure aborts every task
  /// still running and is returned.
  pub async fn run_all(&self, identities: Vec<RawIdentifier>) -> Result<RunSummary> {
    let total = identities.len();
    let mut summary = RunSummary { total, ..Default::default() };
    let permits = Arc::new(Semaphore::new(self.workers));
    let mut tasks = JoinSet::new();

    tracing::info!(total, workers = self.workers, "resolving identities");

    for (index, raw) in identities.into_iter().enumerate() {
      let Ok(permit) = permits.clone().acquire_owned().await else {
        break;
      };

      while let Some(joined) = tasks.try_join_next() {
        if let Err(e) = record(&mut summary, joined) {
          tasks.abort_all();
          return Err(e);
        }
      }

      let resolver = self.resolver.clone();
      let id = raw.id;
      tasks.spawn(async move {
        let _permit = permit;
        (id, resolver.resolve(raw).await)
      });

      if index % self.checkpoint_every == 0 || index + 1 == total {
        tracing::info!(done = index + 1, total, "resolution progress");
        self.save_checkpoint().await;
      }
    }

    while let Some(joined) = tasks.join_next().await {
      if let Err(e) = record(&mut summary, joined) {
        tasks.abort_all();
        return Err(e);
      }
    }

    tracing::info!(
      total,
      resolved = summary.resolved,
      skipped = summary.skipped,
      failed = summary.failed,
      "resolution finished"
    );
    Ok(summary)
  }

  async fn save_checkpoint(&self) {
    let Some(checkpoint) = &self.checkpoint else {
      return;
    };
    if let Err(e) = checkpoint.cache.save(&checkpoint.path).await {
      tracing::warn!(path = %checkpoint.path.display(), error = %e, "cache checkpoint failed");
    }
  }
}

/// Fold one finished task into `summary`. Only fatal errors are returned.
fn record(summary: &mut RunSummary, joined: Joined) -> Result<()> {
  let (id, outcome) = match joined {
    Ok(done) => done,
    Err(e) if e.is_panic() => {
      tracing::error!(error = %e, "resolution task panicked");
      summary.failed += 1;
      return Ok(());
    }
    Err(e) => return Err(e.into()),
  };

  match outcome {
    Ok(Outcome::Resolved) => summary.resolved += 1,
    Ok(Outcome::Skipped) => summary.skipped += 1,
    Err(e) if e.is_fatal() => {
      tracing::error!(id, error = %e, "fatal error, aborting run");
      return Err(e);
    }
    Err(e) => {
      tracing::error!(id, error = %e, "failed to resolve identity");
      summary.failed += 1;
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
  };

  use super::*;
  use crate::Error;

  /// Tracks how many calls overlap. IDs divisible by `fail_every` fail, the
  /// ID `fatal_at` fails fatally, ID 0 is skipped.
  #[derive(Default)]
  struct Instrumented {
    in_flight:  AtomicUsize,
    peak:       AtomicUsize,
    finished:   AtomicUsize,
    fail_every: Option<u64>,
    fatal_at:   Option<u64>,
  }

  impl Resolve for Instrumented {
    async fn resolve(&self, raw: RawIdentifier) -> Result<Outcome> {
      let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
      self.peak.fetch_max(now, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(5)).await;
      self.in_flight.fetch_sub(1, Ordering::SeqCst);

      if Some(raw.id) == self.fatal_at {
        return Err(Error::QuotaExhausted {
          reset_in: Duration::from_secs(3600),
          max_wait: Duration::from_secs(10),
        });
      }
      // The slow path after a fatal error; aborted tasks never get here.
      if self.fatal_at.is_some() {
        tokio::time::sleep(Duration::from_millis(200)).await;
      }
      self.finished.fetch_add(1, Ordering::SeqCst);

      if raw.id == 0 {
        return Ok(Outcome::Skipped);
      }
      match self.fail_every {
        Some(n) if raw.id % n == 0 => Err(Error::EmptyLocation),
        _ => Ok(Outcome::Resolved),
      }
    }
  }

  fn population(n: u64) -> Vec<RawIdentifier> { (0..n).map(RawIdentifier::new).collect() }

  #[tokio::test]
  async fn concurrency_never_exceeds_the_worker_count() {
    let resolver = Arc::new(Instrumented::default());
    let scheduler = ResolutionScheduler::new(resolver.clone(), 4, 10);

    let summary = scheduler.run_all(population(40)).await.unwrap();

    assert_eq!(summary, RunSummary { total: 40, resolved: 39, skipped: 1, failed: 0 });
    let peak = resolver.peak.load(Ordering::SeqCst);
    assert!(peak <= 4, "peak {peak}");
    assert!(peak >= 2, "peak {peak}");
    assert_eq!(resolver.in_flight.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn ordinary_failures_are_counted() {
    let resolver = Arc::new(Instrumented { fail_every: Some(3), ..Default::default() });
    let scheduler = ResolutionScheduler::new(resolver, 2, 100);

    let summary = scheduler.run_all(population(10)).await.unwrap();

    // 3, 6 and 9 fail; 0 is skipped.
    assert_eq!(summary, RunSummary { total: 10, resolved: 6, skipped: 1, failed: 3 });
  }

  #[tokio::test]
  async fn fatal_errors_abort_the_run() {
    let resolver = Arc::new(Instrumented { fatal_at: Some(1), ..Default::default() });
    let scheduler = ResolutionScheduler::new(resolver.clone(), 4, 100);

    let err = scheduler.run_all(population(100)).await.unwrap_err();

    assert!(err.is_fatal());
    assert!(resolver.finished.load(Ordering::SeqCst) < 100);
  }

  #[tokio::test]
  async fn empty_population() {
    let scheduler = ResolutionScheduler::new(Arc::new(Instrumented::default()), 4, 100);
    let summary = scheduler.run_all(Vec::new()).await.unwrap();
    assert_eq!(summary, RunSummary::default());
  }

  #[tokio::test]
  async fn checkpoints_write_the_cache_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    let cache = Arc::new(ResponseCache::default());
    cache.employee_logins.insert("k", Default::default(), Duration::from_secs(60));

    let scheduler = ResolutionScheduler::new(Arc::new(Instrumented::default()), 2, 3)
      .with_checkpoint(CacheCheckpoint { cache, path: path.clone() });
    scheduler.run_all(population(5)).await.unwrap();

    assert!(path.exists());
    let reloaded = ResponseCache::load(&path).await;
    assert!(reloaded.employee_logins.get("k").is_some());
  }

  #[tokio::test]
  async fn checkpoint_failures_are_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = ResolutionScheduler::new(Arc::new(Instrumented::default()), 2, 1)
      .with_checkpoint(CacheCheckpoint {
        cache: Arc::new(ResponseCache::default()),
        path:  dir.path().join("missing").join("cache.json"),
      });

    let summary = scheduler.run_all(population(3)).await.unwrap();
    assert_eq!(summary.resolved, 2);
  }
}
