//! [`SqliteWarehouse`]: read-only access to the event warehouse.

use std::{collections::BTreeMap, path::Path};

use roster_core::{identity::RawIdentifier, store::ActorSource};

use crate::{Result, encode::decode_id};

/// Actors that produced at least one event. Negative IDs are placeholder
/// accounts the warehouse invents for unknown authors.
const ACTIVE_ACTORS: &str =
  "SELECT id, login FROM gha_actors
   WHERE id >= 0 AND id IN (SELECT DISTINCT actor_id FROM gha_events)";

const ACTIVE_NAMES: &str =
  "SELECT actor_id, name FROM gha_actors_names
   WHERE actor_id >= 0
     AND actor_id IN (SELECT DISTINCT actor_id FROM gha_events)";

const ACTIVE_EMAILS: &str =
  "SELECT actor_id, email FROM gha_actors_emails
   WHERE actor_id >= 0
     AND actor_id IN (SELECT DISTINCT actor_id FROM gha_events)";

#[derive(Clone)]
pub struct SqliteWarehouse {
  conn: tokio_rusqlite::Connection,
}

impl SqliteWarehouse {
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = tokio_rusqlite::Connection::open(path).await?;
    tracing::debug!(path = %path.display(), "opened event warehouse");
    Ok(Self { conn })
  }

  /// Open an in-memory warehouse with empty tables, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    conn
      .call(|conn| {
        conn.execute_batch(crate::schema::WAREHOUSE_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn })
  }

  /// Run arbitrary SQL against the warehouse; used to load fixtures.
  pub async fn execute_batch(&self, sql: impl Into<String>) -> Result<()> {
    let sql = sql.into();
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

impl ActorSource for SqliteWarehouse {
  type Error = crate::Error;

  async fn list_active_actors(&self) -> Result<Vec<RawIdentifier>> {
    let (logins, names, emails) = self
      .conn
      .call(|conn| {
        let pairs = |sql: &str| -> rusqlite::Result<Vec<(i64, String)>> {
          let mut stmt = conn.prepare(sql)?;
          let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        };
        Ok((pairs(ACTIVE_ACTORS)?, pairs(ACTIVE_NAMES)?, pairs(ACTIVE_EMAILS)?))
      })
      .await?;

    let mut actors: BTreeMap<u64, RawIdentifier> = BTreeMap::new();
    for (id, login) in logins {
      let id = decode_id(id)?;
      actors
        .entry(id)
        .or_insert_with(|| RawIdentifier::new(id))
        .logins
        .insert(login);
    }
    // Names and emails only attach to actors that have a login row.
    for (id, name) in names {
      if let Some(actor) = actors.get_mut(&decode_id(id)?) {
        actor.names.insert(name);
      }
    }
    for (id, email) in emails {
      if let Some(actor) = actors.get_mut(&decode_id(id)?) {
        actor.emails.insert(email);
      }
    }

    tracing::info!(actors = actors.len(), "loaded active actors");
    Ok(actors.into_values().collect())
  }
}
