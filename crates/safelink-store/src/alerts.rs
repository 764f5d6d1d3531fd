use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use safelink_shared::{
    Alert, AlertId, AlertStatus, BoundingBox, Location, LocationSample, Page, Principal,
    SafelinkError, UserId,
};

use crate::database::{decode_text, decode_ts, encode_ts, Database};
use crate::error::Result;

const SELECT_ALERT: &str = "SELECT id, owner_id, category, status, latitude, longitude, accuracy,
            altitude, address, message, triggered_at, resolved_at
     FROM alerts";

const SELECT_SAMPLE: &str = "SELECT alert_id, latitude, longitude, accuracy, recorded_at
     FROM alert_locations";

impl Database {
    /// Persist a new alert together with the first sample of its trail, in
    /// one transaction.
    pub fn insert_alert(&mut self, alert: &Alert) -> Result<LocationSample> {
        let sample = LocationSample {
            timestamp: alert.triggered_at,
            ..LocationSample::new(alert.id, &alert.location)
        };

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO alerts (id, owner_id, category, status, latitude, longitude, accuracy,
                                 altitude, address, message, triggered_at, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                alert.id.to_string(),
                alert.owner_id.as_str(),
                alert.category.as_str(),
                alert.status.as_str(),
                alert.location.latitude,
                alert.location.longitude,
                alert.location.accuracy,
                alert.location.altitude,
                alert.location.address,
                alert.message,
                encode_ts(&alert.triggered_at),
                alert.resolved_at.as_ref().map(encode_ts),
            ],
        )?;
        insert_sample(&tx, &sample)?;
        tx.commit()?;

        Ok(sample)
    }

    pub fn get_alert(&self, id: AlertId) -> Result<Option<Alert>> {
        Ok(select_alert(self.conn(), id)?)
    }

    /// Move an active alert into a terminal state.
    ///
    /// The outer result carries database failures, the inner one the
    /// domain rejection (`NotFound`, `Forbidden`, `InvalidState`). Only the
    /// first transition out of `active` can match the conditional update.
    pub fn close_alert(
        &mut self,
        id: AlertId,
        target: AlertStatus,
        actor: &Principal,
        at: DateTime<Utc>,
    ) -> Result<std::result::Result<Alert, SafelinkError>> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(mut alert) = select_alert(&tx, id)? else {
            return Ok(Err(SafelinkError::not_found("alert", id)));
        };
        if let Err(rejected) = alert.authorize_transition(target, actor) {
            return Ok(Err(rejected));
        }

        let changed = tx.execute(
            "UPDATE alerts SET status = ?1, resolved_at = ?2
             WHERE id = ?3 AND status = 'active'",
            params![target.as_str(), encode_ts(&at), id.to_string()],
        )?;
        if changed == 0 {
            let status = status_of(&tx, id)?.unwrap_or(alert.status);
            return Ok(Err(SafelinkError::invalid_state("alert", id, status)));
        }
        tx.commit()?;

        alert.close(target, at);
        Ok(Ok(alert))
    }

    /// Append a sample to an active alert's trail. The existence and state
    /// check is part of the insert itself.
    pub fn insert_location(
        &self,
        id: AlertId,
        location: &Location,
    ) -> Result<std::result::Result<LocationSample, SafelinkError>> {
        let sample = LocationSample::new(id, location);

        let inserted = self.conn().execute(
            "INSERT INTO alert_locations (alert_id, latitude, longitude, accuracy, recorded_at)
             SELECT ?1, ?2, ?3, ?4, ?5
             WHERE EXISTS (SELECT 1 FROM alerts WHERE id = ?1 AND status = 'active')",
            params![
                id.to_string(),
                sample.latitude,
                sample.longitude,
                sample.accuracy,
                encode_ts(&sample.timestamp),
            ],
        )?;
        if inserted == 1 {
            return Ok(Ok(sample));
        }

        Ok(Err(match status_of(self.conn(), id)? {
            None => SafelinkError::not_found("alert", id),
            Some(status) => SafelinkError::invalid_state("alert", id, status),
        }))
    }

    pub fn latest_location(&self, id: AlertId) -> Result<Option<LocationSample>> {
        let sql = format!("{SELECT_SAMPLE} WHERE alert_id = ?1 ORDER BY seq DESC LIMIT 1");
        Ok(self
            .conn()
            .query_row(&sql, params![id.to_string()], row_to_sample)
            .optional()?)
    }

    pub fn locations(&self, id: AlertId) -> Result<Vec<LocationSample>> {
        let sql = format!("{SELECT_SAMPLE} WHERE alert_id = ?1 ORDER BY seq ASC");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![id.to_string()], row_to_sample)?;

        let mut samples = Vec::new();
        for row in rows {
            samples.push(row?);
        }
        Ok(samples)
    }

    /// One page of an owner's alerts, newest first, plus the owner's total.
    pub fn list_alerts_by_owner(&self, owner: &UserId, page: Page) -> Result<(Vec<Alert>, u64)> {
        let total: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM alerts WHERE owner_id = ?1",
            params![owner.as_str()],
            |row| row.get(0),
        )?;

        let sql = format!(
            "{SELECT_ALERT} WHERE owner_id = ?1
             ORDER BY triggered_at DESC, rowid DESC
             LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                owner.as_str(),
                page.limit(),
                i64::try_from(page.offset()).unwrap_or(i64::MAX)
            ],
            row_to_alert,
        )?;

        let mut alerts = Vec::new();
        for row in rows {
            alerts.push(row?);
        }
        Ok((alerts, u64::try_from(total).unwrap_or_default()))
    }

    pub fn list_active_alerts(&self, limit: usize) -> Result<Vec<Alert>> {
        let sql = format!(
            "{SELECT_ALERT} WHERE status = 'active'
             ORDER BY triggered_at DESC, rowid DESC
             LIMIT ?1"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            params![i64::try_from(limit).unwrap_or(i64::MAX)],
            row_to_alert,
        )?;

        let mut alerts = Vec::new();
        for row in rows {
            alerts.push(row?);
        }
        Ok(alerts)
    }

    /// Active alerts inside a bounding box; the exact radius check happens
    /// in the caller.
    pub fn active_alerts_within(&self, bbox: &BoundingBox) -> Result<Vec<Alert>> {
        let sql = format!(
            "{SELECT_ALERT} WHERE status = 'active'
               AND latitude BETWEEN ?1 AND ?2
               AND longitude BETWEEN ?3 AND ?4"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            params![bbox.min_lat, bbox.max_lat, bbox.min_lng, bbox.max_lng],
            row_to_alert,
        )?;

        let mut alerts = Vec::new();
        for row in rows {
            alerts.push(row?);
        }
        Ok(alerts)
    }
}

fn insert_sample(conn: &Connection, sample: &LocationSample) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO alert_locations (alert_id, latitude, longitude, accuracy, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            sample.alert_id.to_string(),
            sample.latitude,
            sample.longitude,
            sample.accuracy,
            encode_ts(&sample.timestamp),
        ],
    )
}

fn select_alert(conn: &Connection, id: AlertId) -> rusqlite::Result<Option<Alert>> {
    let sql = format!("{SELECT_ALERT} WHERE id = ?1");
    conn.query_row(&sql, params![id.to_string()], row_to_alert)
        .optional()
}

fn status_of(conn: &Connection, id: AlertId) -> rusqlite::Result<Option<AlertStatus>> {
    conn.query_row(
        "SELECT status FROM alerts WHERE id = ?1",
        params![id.to_string()],
        |row| {
            let status: String = row.get(0)?;
            decode_text(0, &status)
        },
    )
    .optional()
}

fn row_to_alert(row: &rusqlite::Row<'_>) -> rusqlite::Result<Alert> {
    let id: String = row.get(0)?;
    let owner_id: String = row.get(1)?;
    let category: String = row.get(2)?;
    let status: String = row.get(3)?;
    let triggered_at: String = row.get(10)?;
    let resolved_at: Option<String> = row.get(11)?;

    Ok(Alert {
        id: decode_text(0, &id)?,
        owner_id: UserId::new(owner_id),
        category: decode_text(2, &category)?,
        status: decode_text(3, &status)?,
        location: Location {
            latitude: row.get(4)?,
            longitude: row.get(5)?,
            accuracy: row.get(6)?,
            altitude: row.get(7)?,
            address: row.get(8)?,
        },
        message: row.get(9)?,
        triggered_at: decode_ts(10, &triggered_at)?,
        resolved_at: resolved_at.map(|s| decode_ts(11, &s)).transpose()?,
    })
}

fn row_to_sample(row: &rusqlite::Row<'_>) -> rusqlite::Result<LocationSample> {
    let alert_id: String = row.get(0)?;
    let recorded_at: String = row.get(4)?;

    Ok(LocationSample {
        alert_id: decode_text(0, &alert_id)?,
        latitude: row.get(1)?,
        longitude: row.get(2)?,
        accuracy: row.get(3)?,
        timestamp: decode_ts(4, &recorded_at)?,
    })
}
