//! SQL migration definitions for the chatlist database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: track_links, publish_runs, publish_batches",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One harvested link per chat message
CREATE TABLE IF NOT EXISTS track_links (
    message_id INTEGER PRIMARY KEY,
    link       TEXT NOT NULL,
    posted_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_track_links_posted_at ON track_links(posted_at);

-- Publish runs that created a playlist
CREATE TABLE IF NOT EXISTS publish_runs (
    id            TEXT PRIMARY KEY,
    playlist_id   TEXT NOT NULL,
    playlist_name TEXT NOT NULL,
    started_at    TEXT NOT NULL,
    finished_at   TEXT,
    stats_json    TEXT
);

-- Outcome of every append batch, kept for reconciliation
CREATE TABLE IF NOT EXISTS publish_batches (
    run_id      TEXT NOT NULL REFERENCES publish_runs(id) ON DELETE CASCADE,
    batch_index INTEGER NOT NULL,
    first_track INTEGER NOT NULL,
    last_track  INTEGER NOT NULL,
    track_count INTEGER NOT NULL,
    status      TEXT NOT NULL,
    attempts    INTEGER NOT NULL,
    last_error  TEXT,
    track_ids   TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    PRIMARY KEY (run_id, batch_index)
);

CREATE INDEX IF NOT EXISTS idx_publish_batches_status ON publish_batches(status);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
