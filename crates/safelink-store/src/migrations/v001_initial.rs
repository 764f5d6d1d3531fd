//! v001 -- Initial schema creation.
//!
//! Creates the alert tables (`alerts`, `alert_locations`) and the trusted
//! contact directory.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Alerts
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS alerts (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    owner_id     TEXT NOT NULL,
    category     TEXT NOT NULL,
    status       TEXT NOT NULL DEFAULT 'active'
                 CHECK (status IN ('active', 'resolved', 'cancelled', 'false_alarm')),
    latitude     REAL NOT NULL CHECK (latitude BETWEEN -90 AND 90),
    longitude    REAL NOT NULL CHECK (longitude BETWEEN -180 AND 180),
    accuracy     REAL,
    altitude     REAL,
    address      TEXT,
    message      TEXT,
    triggered_at TEXT NOT NULL,               -- RFC-3339, microseconds
    resolved_at  TEXT,

    CHECK ((status = 'active') = (resolved_at IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_alerts_owner_triggered
    ON alerts(owner_id, triggered_at DESC);

CREATE INDEX IF NOT EXISTS idx_alerts_status_position
    ON alerts(status, latitude, longitude);

-- ----------------------------------------------------------------
-- Location trail (append-only)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS alert_locations (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    alert_id   TEXT NOT NULL,                 -- FK -> alerts(id)
    latitude   REAL NOT NULL,
    longitude  REAL NOT NULL,
    accuracy   REAL,
    recorded_at TEXT NOT NULL,

    FOREIGN KEY (alert_id) REFERENCES alerts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_alert_locations_alert
    ON alert_locations(alert_id, seq);

-- ----------------------------------------------------------------
-- Trusted contacts
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS trusted_contacts (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    user_id      TEXT NOT NULL,
    name         TEXT NOT NULL,
    phone_number TEXT,
    relationship TEXT,
    is_primary   INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_trusted_contacts_user
    ON trusted_contacts(user_id);

-- at most one primary contact per user
CREATE UNIQUE INDEX IF NOT EXISTS idx_trusted_contacts_primary
    ON trusted_contacts(user_id) WHERE is_primary = 1;
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
