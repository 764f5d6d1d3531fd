use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use safelink_shared::{BoundingBox, Location, Page, Report, ReportId, ReportStatus, UserId};

use crate::database::{conversion_error, decode_text, decode_ts, encode_ts, Database};
use crate::error::Result;
use crate::traits::ReportFilter;

const SELECT_REPORT: &str = "SELECT id, reporter_id, category, title, description, latitude,
            longitude, accuracy, altitude, address, media_urls, anonymous, status,
            created_at, updated_at
     FROM reports";

impl Database {
    pub fn insert_report(&self, report: &Report) -> Result<()> {
        self.conn().execute(
            "INSERT INTO reports (id, reporter_id, category, title, description, latitude,
                                  longitude, accuracy, altitude, address, media_urls,
                                  anonymous, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                report.id.to_string(),
                report.reporter_id.as_ref().map(UserId::as_str),
                report.category.as_str(),
                report.title,
                report.description,
                report.location.latitude,
                report.location.longitude,
                report.location.accuracy,
                report.location.altitude,
                report.location.address,
                serde_json::to_string(&report.media_urls)?,
                report.anonymous,
                report.status.as_str(),
                encode_ts(&report.created_at),
                encode_ts(&report.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_report(&self, id: ReportId) -> Result<Option<Report>> {
        let sql = format!("{SELECT_REPORT} WHERE id = ?1");
        Ok(self
            .conn()
            .query_row(&sql, params![id.to_string()], row_to_report)
            .optional()?)
    }

    /// One page of reports matching the filter, newest first, plus the
    /// filtered total.
    pub fn list_reports(&self, filter: &ReportFilter, page: Page) -> Result<(Vec<Report>, u64)> {
        let reporter = filter.reporter.as_ref().map(UserId::as_str);
        let status = filter.status.map(ReportStatus::as_str);

        let total: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM reports
             WHERE (?1 IS NULL OR reporter_id = ?1) AND (?2 IS NULL OR status = ?2)",
            params![reporter, status],
            |row| row.get(0),
        )?;

        let sql = format!(
            "{SELECT_REPORT}
             WHERE (?1 IS NULL OR reporter_id = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3 OFFSET ?4"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                reporter,
                status,
                page.limit(),
                i64::try_from(page.offset()).unwrap_or(i64::MAX)
            ],
            row_to_report,
        )?;

        let mut reports = Vec::new();
        for row in rows {
            reports.push(row?);
        }
        Ok((reports, u64::try_from(total).unwrap_or_default()))
    }

    /// Returns `None` when the report does not exist.
    pub fn update_report_status(
        &self,
        id: ReportId,
        status: ReportStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Report>> {
        let changed = self.conn().execute(
            "UPDATE reports SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), encode_ts(&at), id.to_string()],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_report(id)
    }

    /// Reports inside a bounding box, dismissed ones excluded.
    pub fn reports_within(&self, bbox: &BoundingBox) -> Result<Vec<Report>> {
        let sql = format!(
            "{SELECT_REPORT} WHERE status != 'dismissed'
               AND latitude BETWEEN ?1 AND ?2
               AND longitude BETWEEN ?3 AND ?4"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            params![bbox.min_lat, bbox.max_lat, bbox.min_lng, bbox.max_lng],
            row_to_report,
        )?;

        let mut reports = Vec::new();
        for row in rows {
            reports.push(row?);
        }
        Ok(reports)
    }
}

fn row_to_report(row: &rusqlite::Row<'_>) -> rusqlite::Result<Report> {
    let id: String = row.get(0)?;
    let reporter_id: Option<String> = row.get(1)?;
    let category: String = row.get(2)?;
    let media_urls: String = row.get(10)?;
    let status: String = row.get(12)?;
    let created_at: String = row.get(13)?;
    let updated_at: String = row.get(14)?;

    Ok(Report {
        id: decode_text(0, &id)?,
        reporter_id: reporter_id.map(UserId::new),
        category: decode_text(2, &category)?,
        title: row.get(3)?,
        description: row.get(4)?,
        location: Location {
            latitude: row.get(5)?,
            longitude: row.get(6)?,
            accuracy: row.get(7)?,
            altitude: row.get(8)?,
            address: row.get(9)?,
        },
        media_urls: serde_json::from_str(&media_urls).map_err(|e| conversion_error(10, e))?,
        anonymous: row.get(11)?,
        status: decode_text(12, &status)?,
        created_at: decode_ts(13, &created_at)?,
        updated_at: decode_ts(14, &updated_at)?,
    })
}
