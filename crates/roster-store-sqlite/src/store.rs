//! [`SqliteStore`]: the SQLite implementation of [`IdentityStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use roster_core::{
  enrollment::{Enrollment, sort_timeline},
  identity::{AliasKind, Country, GitHubAccount, Identity},
  organization::{NewOrganization, OrgDomain, Organization},
  store::IdentityStore,
};

use crate::{
  Error, Result,
  encode::{
    ACCOUNT_COLUMNS, IDENTITY_COLUMNS, RawAccount, RawEnrollment,
    RawIdentity, RawOrganization, encode_dt, encode_id, encode_uuid,
  },
  schema::SCHEMA,
};

/// Marker row written once the seed import has completed.
const SEED_MARKER: &str = "identifier_init_data";

// ─── Store ───────────────────────────────────────────────────────────────────

/// The identity database backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    tracing::debug!(path = %path.display(), "opened identity store");
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Soft-delete (or restore) an organization. Its enrollments stay but are
  /// no longer exported, and the matcher stops handing it out.
  pub async fn set_organization_invalid(&self, org_id: i64, invalid: bool) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE organizations SET invalid = ?2 WHERE id = ?1",
          rusqlite::params![org_id, invalid],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Load organizations matching `filter` (a trailing SQL clause) together
  /// with their patterns and domains.
  async fn load_organizations(
    &self,
    filter: &'static str,
    param: Option<String>,
  ) -> Result<Vec<Organization>> {
    let raws: Vec<RawOrganization> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT id, name, fullname, type, website, invalid
           FROM organizations {filter} ORDER BY id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut orgs = match param {
          Some(p) => stmt
            .query_map(rusqlite::params![p], RawOrganization::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
          None => stmt
            .query_map([], RawOrganization::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        };

        let mut pat_stmt = conn.prepare(
          "SELECT pattern FROM organization_patterns
           WHERE org_id = ?1 ORDER BY id",
        )?;
        let mut dom_stmt = conn.prepare(
          "SELECT name, is_top, common FROM organization_domains
           WHERE org_id = ?1 ORDER BY id",
        )?;
        for org in &mut orgs {
          org.patterns = pat_stmt
            .query_map(rusqlite::params![org.id], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
          org.domains = dom_stmt
            .query_map(rusqlite::params![org.id], |r| {
              Ok(OrgDomain {
                name:   r.get(0)?,
                is_top: r.get(1)?,
                common: r.get(2)?,
              })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        }
        Ok(orgs)
      })
      .await?;

    raws.into_iter().map(RawOrganization::into_organization).collect()
  }
}

fn alias_table(kind: AliasKind) -> (&'static str, &'static str) {
  match kind {
    AliasKind::Login => ("github_user_logins", "login"),
    AliasKind::Name => ("github_user_names", "name"),
    AliasKind::Email => ("github_user_emails", "email"),
  }
}

// ─── IdentityStore impl ──────────────────────────────────────────────────────

impl IdentityStore for SqliteStore {
  type Error = Error;

  // ── Identities ────────────────────────────────────────────────────────────

  async fn find_or_create_identity(&self, uuid: Uuid) -> Result<Identity> {
    let id_str = encode_uuid(uuid);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO unique_identities (uuid) VALUES (?1)
           ON CONFLICT (uuid) DO NOTHING",
          rusqlite::params![id_str],
        )?;
        Ok(())
      })
      .await?;

    self
      .get_identity(uuid)
      .await?
      .ok_or(Error::IdentityMissing(uuid))
  }

  async fn get_identity(&self, uuid: Uuid) -> Result<Option<Identity>> {
    let id_str = encode_uuid(uuid);
    let raw: Option<RawIdentity> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {IDENTITY_COLUMNS} FROM unique_identities
                 WHERE uuid = ?1"
              ),
              rusqlite::params![id_str],
              RawIdentity::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawIdentity::into_identity).transpose()
  }

  async fn save_identity(&self, identity: Identity) -> Result<()> {
    let id_str = encode_uuid(identity.uuid);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO unique_identities (
             uuid, name, name_source, email, email_source,
             gender, gender_acc, gender_source,
             location, location_source, country_code, country_source, is_bot
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
           ON CONFLICT (uuid) DO UPDATE SET
             name            = excluded.name,
             name_source     = excluded.name_source,
             email           = excluded.email,
             email_source    = excluded.email_source,
             gender          = excluded.gender,
             gender_acc      = excluded.gender_acc,
             gender_source   = excluded.gender_source,
             location        = excluded.location,
             location_source = excluded.location_source,
             country_code    = excluded.country_code,
             country_source  = excluded.country_source,
             is_bot          = excluded.is_bot",
          rusqlite::params![
            id_str,
            identity.name,
            identity.name_source.as_ref(),
            identity.email,
            identity.email_source.as_ref(),
            identity.gender,
            identity.gender_acc,
            identity.gender_source.as_ref(),
            identity.location,
            identity.location_source.as_ref(),
            identity.country_code,
            identity.country_source.as_ref(),
            identity.is_bot,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_identities(&self) -> Result<Vec<Identity>> {
    let raws: Vec<RawIdentity> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {IDENTITY_COLUMNS} FROM unique_identities ORDER BY uuid"
        ))?;
        let rows = stmt
          .query_map([], RawIdentity::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawIdentity::into_identity).collect()
  }

  // ── Accounts ──────────────────────────────────────────────────────────────

  async fn get_account(&self, id: u64) -> Result<Option<GitHubAccount>> {
    let id = encode_id(id)?;
    let raw: Option<RawAccount> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ACCOUNT_COLUMNS} FROM github_users WHERE id = ?1"),
              rusqlite::params![id],
              RawAccount::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAccount::into_account).transpose()
  }

  async fn upsert_account(&self, account: GitHubAccount) -> Result<()> {
    let id = encode_id(account.id)?;
    let uuid_str = account.uuid.map(encode_uuid);
    let now_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        // An unlinked write never detaches an account from its identity.
        conn.execute(
          "INSERT INTO github_users (
             id, uuid, login, email, name, company, location, blog, bio,
             followers, following, avatar_url, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
           ON CONFLICT (id) DO UPDATE SET
             uuid       = COALESCE(excluded.uuid, github_users.uuid),
             login      = excluded.login,
             email      = excluded.email,
             name       = excluded.name,
             company    = excluded.company,
             location   = excluded.location,
             blog       = excluded.blog,
             bio        = excluded.bio,
             followers  = excluded.followers,
             following  = excluded.following,
             avatar_url = excluded.avatar_url,
             updated_at = excluded.updated_at",
          rusqlite::params![
            id,
            uuid_str,
            account.login,
            account.email,
            account.name,
            account.company,
            account.location,
            account.blog,
            account.bio,
            i64::from(account.followers),
            i64::from(account.following),
            account.avatar_url,
            now_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_accounts(&self, uuid: Uuid) -> Result<Vec<GitHubAccount>> {
    let id_str = encode_uuid(uuid);
    let raws: Vec<RawAccount> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ACCOUNT_COLUMNS} FROM github_users
           WHERE uuid = ?1 ORDER BY id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawAccount::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAccount::into_account).collect()
  }

  async fn insert_aliases(
    &self,
    account_id: u64,
    kind: AliasKind,
    values: Vec<String>,
  ) -> Result<()> {
    let id = encode_id(account_id)?;
    let (table, column) = alias_table(kind);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(&format!(
            "INSERT INTO {table} (github_user_id, {column}) VALUES (?1, ?2)
             ON CONFLICT DO NOTHING"
          ))?;
          for value in &values {
            stmt.execute(rusqlite::params![id, value])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_aliases(
    &self,
    account_id: u64,
    kind: AliasKind,
  ) -> Result<Vec<String>> {
    let id = encode_id(account_id)?;
    let (table, column) = alias_table(kind);

    let values = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {column} FROM {table}
           WHERE github_user_id = ?1 ORDER BY {column}"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(values)
  }

  // ── Enrollments ───────────────────────────────────────────────────────────

  async fn list_enrollments(&self, uuid: Uuid) -> Result<Vec<Enrollment>> {
    let id_str = encode_uuid(uuid);
    let raws: Vec<RawEnrollment> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT uuid, org_id, start_date, end_date, source, invalid
           FROM enrollments WHERE uuid = ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |r| {
            Ok(RawEnrollment {
              uuid:       r.get(0)?,
              org_id:     r.get(1)?,
              start_date: r.get(2)?,
              end_date:   r.get(3)?,
              source:     r.get(4)?,
              invalid:    r.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut enrollments = raws
      .into_iter()
      .map(RawEnrollment::into_enrollment)
      .collect::<Result<Vec<_>>>()?;
    sort_timeline(&mut enrollments);
    Ok(enrollments)
  }

  async fn upsert_enrollments(&self, enrollments: Vec<Enrollment>) -> Result<()> {
    if enrollments.is_empty() {
      return Ok(());
    }

    let rows: Vec<(String, i64, String, String, String, bool)> = enrollments
      .into_iter()
      .map(|e| {
        (
          encode_uuid(e.uuid),
          e.org_id,
          encode_dt(e.start),
          encode_dt(e.end),
          e.source.as_ref().to_owned(),
          e.invalid,
        )
      })
      .collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO enrollments (
               uuid, org_id, start_date, end_date, source, invalid
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (uuid, org_id) DO UPDATE SET
               end_date = excluded.end_date",
          )?;
          for (uuid, org_id, start, end, source, invalid) in &rows {
            stmt.execute(rusqlite::params![
              uuid, org_id, start, end, source, invalid
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Organizations ─────────────────────────────────────────────────────────

  async fn list_organizations(
    &self,
    include_invalid: bool,
  ) -> Result<Vec<Organization>> {
    let filter = if include_invalid { "" } else { "WHERE invalid = 0" };
    self.load_organizations(filter, None).await
  }

  async fn find_or_create_organization(
    &self,
    input: NewOrganization,
  ) -> Result<Organization> {
    let name = input.name.clone();
    let now_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO organizations (name, fullname, type, website, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (name) DO NOTHING",
          rusqlite::params![
            input.name,
            input.fullname,
            input.org_type.as_ref(),
            input.website,
            now_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    self
      .load_organizations("WHERE name = ?1", Some(name.clone()))
      .await?
      .into_iter()
      .next()
      .ok_or(Error::OrganizationMissing(name))
  }

  async fn insert_pattern(&self, org_id: i64, pattern: String) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO organization_patterns (org_id, pattern) VALUES (?1, ?2)
           ON CONFLICT DO NOTHING",
          rusqlite::params![org_id, pattern],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn insert_domain(&self, org_id: i64, domain: OrgDomain) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO organization_domains (org_id, name, is_top, common)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT DO NOTHING",
          rusqlite::params![org_id, domain.name, domain.is_top, domain.common],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Reference data ────────────────────────────────────────────────────────

  async fn upsert_countries(&self, countries: Vec<Country>) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO countries (code, name, alpha3) VALUES (?1, ?2, ?3)
             ON CONFLICT (code) DO UPDATE SET
               name   = excluded.name,
               alpha3 = excluded.alpha3",
          )?;
          for c in &countries {
            stmt.execute(rusqlite::params![c.code, c.name, c.alpha3])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_countries(&self) -> Result<Vec<Country>> {
    let countries = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT code, name, alpha3 FROM countries ORDER BY code")?;
        let rows = stmt
          .query_map([], |r| {
            Ok(Country { code: r.get(0)?, name: r.get(1)?, alpha3: r.get(2)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(countries)
  }

  async fn is_seeded(&self) -> Result<bool> {
    let seeded = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM computed_markers WHERE metric = ?1",
              rusqlite::params![SEED_MARKER],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(seeded)
  }

  async fn mark_seeded(&self) -> Result<()> {
    let now_str = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO computed_markers (metric, dt) VALUES (?1, ?2)
           ON CONFLICT (metric) DO UPDATE SET dt = excluded.dt",
          rusqlite::params![SEED_MARKER, now_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
