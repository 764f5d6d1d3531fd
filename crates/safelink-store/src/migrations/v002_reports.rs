//! v002 -- Community reports.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS reports (
    id          TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    reporter_id TEXT,                         -- NULL for anonymous reports
    category    TEXT NOT NULL,
    title       TEXT NOT NULL,
    description TEXT NOT NULL,
    latitude    REAL NOT NULL CHECK (latitude BETWEEN -90 AND 90),
    longitude   REAL NOT NULL CHECK (longitude BETWEEN -180 AND 180),
    accuracy    REAL,
    altitude    REAL,
    address     TEXT,
    media_urls  TEXT NOT NULL DEFAULT '[]',   -- JSON array
    anonymous   INTEGER NOT NULL DEFAULT 0,
    status      TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'reviewed', 'resolved', 'dismissed')),
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reports_reporter_created
    ON reports(reporter_id, created_at DESC);

CREATE INDEX IF NOT EXISTS idx_reports_position
    ON reports(latitude, longitude);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
