//! SQL schema for the Warden SQLite store.
//!
//! Executed at connection startup. Timestamps are fixed-width RFC 3339 UTC
//! strings with microseconds (see `encode::encode_dt`), so plain text
//! comparison orders them chronologically.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    name              TEXT NOT NULL,
    email             TEXT NOT NULL UNIQUE,
    password          TEXT NOT NULL,      -- argon2 PHC string
    status            TEXT NOT NULL DEFAULT 'pending'
                      CHECK (status IN ('approved', 'denied', 'pending')),
    email_verified_at TEXT,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    deleted_at        TEXT                -- soft delete marker
);

CREATE TABLE IF NOT EXISTS roles (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Static catalog; seeded, never written through the admin surface.
CREATE TABLE IF NOT EXISTS permissions (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS role_permissions (
    role_id       INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
    permission_id INTEGER NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
    PRIMARY KEY (role_id, permission_id)
);

CREATE TABLE IF NOT EXISTS user_roles (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, role_id)
);

CREATE TABLE IF NOT EXISTS invitations (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    email       TEXT NOT NULL UNIQUE,
    role_id     INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
    invited_by  INTEGER REFERENCES users(id) ON DELETE SET NULL,
    token_hash  TEXT NOT NULL UNIQUE,     -- hex SHA-256 of the mailed token
    expires_at  TEXT NOT NULL,
    accepted_at TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- causer_id is a weak reference: entries outlive hard-deleted users.
CREATE TABLE IF NOT EXISTS activity_log (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    log_name     TEXT NOT NULL DEFAULT 'default',
    description  TEXT NOT NULL,
    event        TEXT,
    subject_type TEXT,
    subject_id   INTEGER,
    causer_id    INTEGER,
    properties   TEXT NOT NULL DEFAULT '{}',
    batch_uuid   TEXT,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS users_deleted_idx      ON users(deleted_at);
CREATE INDEX IF NOT EXISTS user_roles_role_idx    ON user_roles(role_id);
CREATE INDEX IF NOT EXISTS activity_log_name_idx  ON activity_log(log_name);
CREATE INDEX IF NOT EXISTS activity_causer_idx    ON activity_log(causer_id);
CREATE INDEX IF NOT EXISTS activity_created_idx   ON activity_log(created_at);

PRAGMA user_version = 1;
";
