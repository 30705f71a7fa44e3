//! SQL schema for the Roster SQLite stores.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Identity database DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS countries (
    code    TEXT PRIMARY KEY,          -- ISO 3166-1 alpha-2
    name    TEXT NOT NULL,
    alpha3  TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS unique_identities (
    uuid            TEXT PRIMARY KEY,
    name            TEXT NOT NULL DEFAULT '',
    name_source     TEXT NOT NULL DEFAULT 'not_found',
    email           TEXT NOT NULL DEFAULT '',
    email_source    TEXT NOT NULL DEFAULT 'not_found',
    gender          TEXT NOT NULL DEFAULT '',
    gender_acc      REAL NOT NULL DEFAULT 0,
    gender_source   TEXT NOT NULL DEFAULT 'not_found',
    location        TEXT NOT NULL DEFAULT '',
    location_source TEXT NOT NULL DEFAULT 'not_found',
    country_code    TEXT,
    country_source  TEXT NOT NULL DEFAULT 'not_found',
    is_bot          INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS organizations (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL UNIQUE,
    fullname    TEXT NOT NULL DEFAULT '',
    type        TEXT NOT NULL DEFAULT 'company',
    website     TEXT NOT NULL DEFAULT '',
    -- Soft delete; also stops the matcher from re-creating a bad name.
    invalid     INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS organization_patterns (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    org_id   INTEGER NOT NULL REFERENCES organizations(id),
    pattern  TEXT NOT NULL,
    UNIQUE (org_id, pattern)
);

CREATE TABLE IF NOT EXISTS organization_domains (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    org_id  INTEGER NOT NULL REFERENCES organizations(id),
    name    TEXT NOT NULL,
    is_top  INTEGER NOT NULL DEFAULT 0,
    common  INTEGER NOT NULL DEFAULT 0,   -- public mail provider
    UNIQUE (org_id, name)
);

-- One row per (identity, organization). The end date is rewritten when a
-- later affiliation closes the interval; rows are never deleted.
CREATE TABLE IF NOT EXISTS enrollments (
    uuid        TEXT NOT NULL REFERENCES unique_identities(uuid),
    org_id      INTEGER NOT NULL REFERENCES organizations(id),
    start_date  TEXT NOT NULL,   -- ISO 8601 UTC
    end_date    TEXT NOT NULL,   -- ISO 8601 UTC, exclusive
    source      TEXT NOT NULL,
    invalid     INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (uuid, org_id)
);

CREATE TABLE IF NOT EXISTS github_users (
    id          INTEGER PRIMARY KEY,   -- GitHub numeric ID
    uuid        TEXT REFERENCES unique_identities(uuid),
    login       TEXT NOT NULL,
    email       TEXT NOT NULL DEFAULT '',
    name        TEXT,
    company     TEXT,
    location    TEXT,
    blog        TEXT,
    bio         TEXT,
    followers   INTEGER NOT NULL DEFAULT 0,
    following   INTEGER NOT NULL DEFAULT 0,
    avatar_url  TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS github_user_logins (
    github_user_id  INTEGER NOT NULL REFERENCES github_users(id),
    login           TEXT NOT NULL,
    UNIQUE (github_user_id, login)
);

CREATE TABLE IF NOT EXISTS github_user_names (
    github_user_id  INTEGER NOT NULL REFERENCES github_users(id),
    name            TEXT NOT NULL,
    UNIQUE (github_user_id, name)
);

CREATE TABLE IF NOT EXISTS github_user_emails (
    github_user_id  INTEGER NOT NULL REFERENCES github_users(id),
    email           TEXT NOT NULL,
    UNIQUE (github_user_id, email)
);

-- Markers for one-off jobs, e.g. the seed import.
CREATE TABLE IF NOT EXISTS computed_markers (
    metric  TEXT PRIMARY KEY,
    dt      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS github_users_uuid_idx ON github_users(uuid);
CREATE INDEX IF NOT EXISTS enrollments_org_idx   ON enrollments(org_id);

PRAGMA user_version = 1;
";

/// The subset of the event warehouse the actor reader needs.
///
/// The warehouse is owned elsewhere; this DDL only exists so tests and local
/// runs can create a compatible file.
pub const WAREHOUSE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS gha_actors (
    id     INTEGER NOT NULL,
    login  TEXT NOT NULL,
    PRIMARY KEY (id, login)
);

CREATE TABLE IF NOT EXISTS gha_actors_names (
    actor_id  INTEGER NOT NULL,
    name      TEXT NOT NULL,
    origin    INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (actor_id, name)
);

CREATE TABLE IF NOT EXISTS gha_actors_emails (
    actor_id  INTEGER NOT NULL,
    email     TEXT NOT NULL,
    origin    INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (actor_id, email)
);

CREATE TABLE IF NOT EXISTS gha_events (
    id        INTEGER PRIMARY KEY,
    actor_id  INTEGER NOT NULL
);
";
