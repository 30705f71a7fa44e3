//! The `IdentityStore` and `ActorSource` traits.
//!
//! Both are implemented by storage backends (e.g. `roster-store-sqlite`).
//! The resolution engine depends on these abstractions, not on any concrete
//! backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  enrollment::Enrollment,
  identity::{AliasKind, Country, GitHubAccount, Identity, RawIdentifier},
  organization::{NewOrganization, OrgDomain, Organization},
};

// ─── Identity store ──────────────────────────────────────────────────────────

/// Abstraction over the identity database.
///
/// Every write is idempotent: inserting a row that already exists is a no-op
/// or an update of specific columns, never an error. Re-running a resolution
/// pass over the same population is therefore always safe.
///
/// All methods return `Send` futures so the trait can be used from tasks on a
/// multi-threaded tokio runtime.
pub trait IdentityStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Identities ────────────────────────────────────────────────────────

  /// Return the identity with `uuid`, creating a blank one if absent.
  fn find_or_create_identity(
    &self,
    uuid: Uuid,
  ) -> impl Future<Output = Result<Identity, Self::Error>> + Send + '_;

  fn get_identity(
    &self,
    uuid: Uuid,
  ) -> impl Future<Output = Result<Option<Identity>, Self::Error>> + Send + '_;

  /// Overwrite every field of an existing identity.
  fn save_identity(
    &self,
    identity: Identity,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn list_identities(
    &self,
  ) -> impl Future<Output = Result<Vec<Identity>, Self::Error>> + Send + '_;

  // ── Accounts ──────────────────────────────────────────────────────────

  fn get_account(
    &self,
    id: u64,
  ) -> impl Future<Output = Result<Option<GitHubAccount>, Self::Error>> + Send + '_;

  /// Insert the account, or update its profile columns if it exists.
  fn upsert_account(
    &self,
    account: GitHubAccount,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// All accounts owned by `uuid`.
  fn list_accounts(
    &self,
    uuid: Uuid,
  ) -> impl Future<Output = Result<Vec<GitHubAccount>, Self::Error>> + Send + '_;

  /// Insert each value that is not already recorded for the account.
  fn insert_aliases(
    &self,
    account_id: u64,
    kind: AliasKind,
    values: Vec<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// All recorded values of `kind` for the account, sorted.
  fn list_aliases(
    &self,
    account_id: u64,
    kind: AliasKind,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  // ── Enrollments ───────────────────────────────────────────────────────

  fn list_enrollments(
    &self,
    uuid: Uuid,
  ) -> impl Future<Output = Result<Vec<Enrollment>, Self::Error>> + Send + '_;

  /// Insert each enrollment keyed by `(uuid, org_id)`; an existing row only
  /// has its end date rewritten.
  fn upsert_enrollments(
    &self,
    enrollments: Vec<Enrollment>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Organizations ─────────────────────────────────────────────────────

  /// All organizations with their patterns and domains, ordered by ID.
  fn list_organizations(
    &self,
    include_invalid: bool,
  ) -> impl Future<Output = Result<Vec<Organization>, Self::Error>> + Send + '_;

  /// Return the organization named `input.name`, creating it if absent.
  /// An existing organization is returned unchanged.
  fn find_or_create_organization(
    &self,
    input: NewOrganization,
  ) -> impl Future<Output = Result<Organization, Self::Error>> + Send + '_;

  fn insert_pattern(
    &self,
    org_id: i64,
    pattern: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn insert_domain(
    &self,
    org_id: i64,
    domain: OrgDomain,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Reference data ────────────────────────────────────────────────────

  /// Insert or fully update countries keyed by code.
  fn upsert_countries(
    &self,
    countries: Vec<Country>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn list_countries(
    &self,
  ) -> impl Future<Output = Result<Vec<Country>, Self::Error>> + Send + '_;

  /// Whether the one-off seed data has already been imported.
  fn is_seeded(
    &self,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn mark_seeded(
    &self,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Actor source ────────────────────────────────────────────────────────────

/// Read-only view of the accounts observed in event history.
pub trait ActorSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Every actor that produced at least one event, with its logins, names,
  /// and emails collected and deduplicated. Ordered by ID.
  fn list_active_actors(
    &self,
  ) -> impl Future<Output = Result<Vec<RawIdentifier>, Self::Error>> + Send + '_;
}
