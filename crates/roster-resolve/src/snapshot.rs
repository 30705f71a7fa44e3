//! Loading the bulk affiliation snapshot.

use std::time::Duration;

use roster_snapshot::SnapshotIndex;

use crate::Result;

fn is_url(source: &str) -> bool {
  source.starts_with("http://") || source.starts_with("https://")
}

/// Read the snapshot from a file path or an HTTP(S) URL and index it by
/// login.
pub async fn load_snapshot(source: &str) -> Result<SnapshotIndex> {
  let text = if is_url(source) {
    tracing::info!(url = source, "downloading snapshot");
    reqwest::Client::builder()
      .timeout(Duration::from_secs(300))
      .build()?
      .get(source)
      .send()
      .await?
      .error_for_status()?
      .text()
      .await?
  } else {
    tracing::info!(path = source, "reading snapshot");
    tokio::fs::read_to_string(source).await?
  };

  let records = roster_snapshot::parse(&text)?;
  let read = records.len();
  let index = SnapshotIndex::from_records(records);
  tracing::info!(bytes = text.len(), read, kept = index.len(), "loaded snapshot");
  Ok(index)
}
