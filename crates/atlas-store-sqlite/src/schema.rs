//! SQL schema for the History Atlas SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS tags (
    tag_id         TEXT PRIMARY KEY,
    kind           TEXT NOT NULL,   -- 'PERSON' | 'PLACE' | 'TIME'
    value_json     TEXT NOT NULL,   -- JSON payload (inner data only)
    created_at     TEXT NOT NULL,
    -- TIME tags only: the datetime as sortable integers (BCE-aware).
    time_year      INTEGER,
    time_rest      INTEGER,
    time_precision INTEGER
);

CREATE TABLE IF NOT EXISTS summaries (
    summary_id     TEXT PRIMARY KEY,
    text           TEXT NOT NULL,
    citation       TEXT,
    -- Cached from the summary's TIME tag.
    time_datetime  TEXT,
    time_precision INTEGER,
    created_at     TEXT NOT NULL
);

-- story_order is NULL until the instance is placed. Negative values exist
-- only inside an open renumbering transaction.
CREATE TABLE IF NOT EXISTS tag_instances (
    instance_id TEXT PRIMARY KEY,
    tag_id      TEXT NOT NULL REFERENCES tags(tag_id),
    summary_id  TEXT NOT NULL REFERENCES summaries(summary_id),
    start_char  INTEGER NOT NULL,
    stop_char   INTEGER NOT NULL,
    story_order INTEGER,
    after_json  TEXT,               -- JSON array of summary ids or NULL
    UNIQUE (tag_id, story_order)
);

CREATE INDEX IF NOT EXISTS tag_instances_summary_idx ON tag_instances(summary_id);
CREATE INDEX IF NOT EXISTS tags_kind_idx             ON tags(kind);
CREATE INDEX IF NOT EXISTS tags_time_idx
    ON tags(time_year, time_rest, time_precision) WHERE kind = 'TIME';

PRAGMA user_version = 1;
";
