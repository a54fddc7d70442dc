//! SQL schema for the Mucca SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;

-- One table for every entity kind, keyed by (pk, sk).
--   articles:     sk = 'ART'
--   clap records: sk = 'CLAPS#<user>'
-- Columns not used by a kind stay NULL.
CREATE TABLE IF NOT EXISTS items (
    pk          TEXT NOT NULL,
    sk          TEXT NOT NULL,
    link        TEXT,
    title       TEXT,
    referrer    TEXT,
    domain      TEXT,
    tags        TEXT,              -- JSON array
    enriched_at TEXT,              -- RFC 3339; NULL until enriched
    claps       INTEGER,
    clappers    INTEGER,
    created_at  TEXT,
    updated_at  TEXT,
    PRIMARY KEY (pk, sk)
);

CREATE INDEX IF NOT EXISTS items_created_idx ON items(sk, created_at);

-- Append-only log of item mutations; the change feed.
CREATE TABLE IF NOT EXISTS changes (
    sequence    INTEGER PRIMARY KEY AUTOINCREMENT,
    kind        TEXT NOT NULL,     -- 'INSERT' | 'MODIFY' | 'REMOVE'
    pk          TEXT NOT NULL,
    sk          TEXT NOT NULL,
    new_image   TEXT,              -- JSON post-image
    recorded_at TEXT NOT NULL
);

PRAGMA user_version = 1;
";

/// JSON post-image of an article row, matching the serde form of
/// `mucca_core::article::Article`.
pub const ARTICLE_IMAGE: &str = "json_object(
    'article_id',  pk,
    'link',        link,
    'title',       title,
    'referrer',    referrer,
    'domain',      domain,
    'tags',        json(coalesce(tags, '[]')),
    'enriched_at', enriched_at,
    'claps',       max(claps, 0),
    'clappers',    max(clappers, 0),
    'created_at',  created_at
)";

/// JSON post-image of a clap record row, matching the serde form of
/// `mucca_core::clap::ClapRecord`.
pub const CLAP_IMAGE: &str = "json_object(
    'article_id', pk,
    'user',       substr(sk, 7),
    'claps',      claps,
    'updated_at', updated_at
)";
