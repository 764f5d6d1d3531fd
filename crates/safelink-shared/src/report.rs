//! Community incident reports.
//!
//! Reports are geolocated like alerts and share the nearby query engine, but
//! have their own moderation lifecycle (`pending` → `reviewed` / `resolved` /
//! `dismissed`). Dismissed reports never show up in nearby results.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::Location;
use crate::constants::{
    MAX_REPORT_DESCRIPTION_LEN, MAX_REPORT_TITLE_LEN, MIN_REPORT_DESCRIPTION_LEN,
    MIN_REPORT_TITLE_LEN,
};
use crate::geo::{GeoPoint, Geolocated};
use crate::types::{now_utc, Principal, ReportId, UserId};
use crate::validation::{ValidationErrors, Validator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportCategory {
    Crime,
    Accident,
    Hazard,
    SuspiciousActivity,
    InfrastructureIssue,
    Other,
}

impl ReportCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportCategory::Crime => "crime",
            ReportCategory::Accident => "accident",
            ReportCategory::Hazard => "hazard",
            ReportCategory::SuspiciousActivity => "suspicious_activity",
            ReportCategory::InfrastructureIssue => "infrastructure_issue",
            ReportCategory::Other => "other",
        }
    }
}

impl FromStr for ReportCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crime" => Ok(ReportCategory::Crime),
            "accident" => Ok(ReportCategory::Accident),
            "hazard" => Ok(ReportCategory::Hazard),
            "suspicious_activity" => Ok(ReportCategory::SuspiciousActivity),
            "infrastructure_issue" => Ok(ReportCategory::InfrastructureIssue),
            "other" => Ok(ReportCategory::Other),
            other => Err(format!("unknown report category: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Reviewed,
    Resolved,
    Dismissed,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Reviewed => "reviewed",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Dismissed => "dismissed",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "reviewed" => Ok(ReportStatus::Reviewed),
            "resolved" => Ok(ReportStatus::Resolved),
            "dismissed" => Ok(ReportStatus::Dismissed),
            other => Err(format!("unknown report status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: ReportId,
    /// Absent for anonymous reports.
    pub reporter_id: Option<UserId>,
    pub category: ReportCategory,
    pub title: String,
    pub description: String,
    pub location: Location,
    #[serde(default)]
    pub media_urls: Vec<String>,
    pub anonymous: bool,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    /// Moderators see every report; users see the ones they filed.
    pub fn visible_to(&self, principal: &Principal) -> bool {
        principal.is_responder() || self.reporter_id.as_ref() == Some(&principal.user_id)
    }
}

impl Geolocated for Report {
    fn position(&self) -> GeoPoint {
        self.location.point()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub reporter_id: UserId,
    pub category: ReportCategory,
    pub title: String,
    pub description: String,
    pub location: Location,
    pub media_urls: Vec<String>,
    pub anonymous: bool,
}

impl NewReport {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut v = Validator::new();
        self.location.check(&mut v);
        v.chars_between("title", &self.title, MIN_REPORT_TITLE_LEN, MAX_REPORT_TITLE_LEN)
            .chars_between(
                "description",
                &self.description,
                MIN_REPORT_DESCRIPTION_LEN,
                MAX_REPORT_DESCRIPTION_LEN,
            );
        v.finish()
    }

    pub fn build(self) -> Result<Report, ValidationErrors> {
        self.validate()?;
        let now = now_utc();
        Ok(Report {
            id: ReportId::new(),
            reporter_id: (!self.anonymous).then_some(self.reporter_id),
            category: self.category,
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            location: self.location,
            media_urls: self.media_urls,
            anonymous: self.anonymous,
            status: ReportStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }
}
