//! SQL schema for the parish SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Every collection shares one table; bodies are JSON objects without the id.
CREATE TABLE IF NOT EXISTS documents (
    collection  TEXT NOT NULL,
    id          TEXT NOT NULL,
    data        TEXT NOT NULL,
    PRIMARY KEY (collection, id)
);

CREATE TABLE IF NOT EXISTS blobs (
    path            TEXT PRIMARY KEY,
    content_type    TEXT NOT NULL,
    size            INTEGER NOT NULL,
    content_hash    TEXT NOT NULL,   -- SHA-256, lowercase hex
    download_token  TEXT NOT NULL,
    metadata        TEXT NOT NULL,   -- JSON UploadMetadata
    created_at      TEXT NOT NULL,
    bytes           BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS accounts (
    uid                TEXT PRIMARY KEY,
    email              TEXT,
    password_hash      TEXT,            -- PHC string; NULL for federated
    provider           TEXT NOT NULL,   -- 'password' or a federated provider
    federated_subject  TEXT,
    created_at         TEXT NOT NULL,
    UNIQUE (provider, federated_subject)
);

CREATE UNIQUE INDEX IF NOT EXISTS accounts_password_email_idx
    ON accounts(email) WHERE provider = 'password';

CREATE TABLE IF NOT EXISTS sessions (
    token       TEXT PRIMARY KEY,
    uid         TEXT NOT NULL REFERENCES accounts(uid) ON DELETE CASCADE,
    created_at  TEXT NOT NULL
);

PRAGMA user_version = 1;
";
