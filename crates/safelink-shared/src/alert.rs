//! Emergency alerts and their lifecycle.
//!
//! An alert starts `active` and leaves that state exactly once, into one of
//! the terminal states `resolved`, `cancelled` or `false_alarm`. Leaving sets
//! `resolved_at`; nothing ever moves an alert back to `active`, and once it is
//! terminal its location trail is frozen.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{MAX_ADDRESS_LEN, MAX_ALERT_MESSAGE_LEN};
use crate::error::{Result, SafelinkError};
use crate::geo::{GeoPoint, Geolocated};
use crate::types::{now_utc, AlertId, Principal, UserId};
use crate::validation::{ValidationErrors, Validator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Medical,
    Security,
    Fire,
    Accident,
    #[serde(alias = "natural-disaster")]
    NaturalDisaster,
    Other,
}

impl AlertCategory {
    pub const ALL: [AlertCategory; 6] = [
        AlertCategory::Medical,
        AlertCategory::Security,
        AlertCategory::Fire,
        AlertCategory::Accident,
        AlertCategory::NaturalDisaster,
        AlertCategory::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlertCategory::Medical => "medical",
            AlertCategory::Security => "security",
            AlertCategory::Fire => "fire",
            AlertCategory::Accident => "accident",
            AlertCategory::NaturalDisaster => "natural_disaster",
            AlertCategory::Other => "other",
        }
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertCategory {
    type Err = ValidationErrors;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| {
                ValidationErrors::single(
                    "category",
                    "must be one of: medical, security, fire, accident, natural_disaster, other",
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Resolved,
    Cancelled,
    FalseAlarm,
}

impl AlertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Cancelled => "cancelled",
            AlertStatus::FalseAlarm => "false_alarm",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != AlertStatus::Active
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(AlertStatus::Active),
            "resolved" => Ok(AlertStatus::Resolved),
            "cancelled" => Ok(AlertStatus::Cancelled),
            "false_alarm" => Ok(AlertStatus::FalseAlarm),
            other => Err(format!("unknown alert status: {other}")),
        }
    }
}

/// Where an alert was raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Location {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            altitude: None,
            address: None,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    pub(crate) fn check(&self, v: &mut Validator) {
        self.point().check(v);
        v.non_negative("accuracy", self.accuracy)
            .finite("altitude", self.altitude)
            .max_chars("address", self.address.as_deref(), MAX_ADDRESS_LEN);
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut v = Validator::new();
        self.check(&mut v);
        v.finish()
    }
}

/// A single emergency-trigger record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: AlertId,
    pub owner_id: UserId,
    pub category: AlertCategory,
    pub status: AlertStatus,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub triggered_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }

    /// Owners see their own alerts; responders and admins see all of them.
    pub fn visible_to(&self, principal: &Principal) -> bool {
        principal.is(&self.owner_id) || principal.is_responder()
    }

    /// Check that `actor` may move this alert into `target` right now.
    ///
    /// Permission is checked before state, so a caller without rights learns
    /// nothing about where the alert is in its lifecycle.
    pub fn authorize_transition(&self, target: AlertStatus, actor: &Principal) -> Result<()> {
        let owner = actor.is(&self.owner_id);
        let allowed = match target {
            AlertStatus::Active => {
                return Err(ValidationErrors::single(
                    "status",
                    "an alert cannot be moved back to active",
                )
                .into())
            }
            AlertStatus::Cancelled => owner,
            AlertStatus::Resolved => owner || actor.is_responder(),
            AlertStatus::FalseAlarm => actor.is_responder(),
        };

        if !allowed {
            return Err(SafelinkError::forbidden(format!(
                "{} may not mark alert {} as {}",
                actor.user_id, self.id, target
            )));
        }

        if !self.is_active() {
            return Err(SafelinkError::invalid_state("alert", self.id, self.status));
        }

        Ok(())
    }

    /// Move into a terminal state. Callers must have run
    /// [`authorize_transition`](Self::authorize_transition) first.
    pub fn close(&mut self, target: AlertStatus, at: DateTime<Utc>) {
        debug_assert!(target.is_terminal() && self.is_active());
        self.status = target;
        self.resolved_at = Some(at);
    }
}

impl Geolocated for Alert {
    fn position(&self) -> GeoPoint {
        self.location.point()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.triggered_at
    }
}

/// Input for creating an alert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub owner_id: UserId,
    pub category: AlertCategory,
    pub location: Location,
    pub message: Option<String>,
}

impl NewAlert {
    pub fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut v = Validator::new();
        self.location.check(&mut v);
        v.max_chars("message", self.message.as_deref(), MAX_ALERT_MESSAGE_LEN)
            .check(!self.owner_id.as_str().is_empty(), "ownerId", "is required");
        v.finish()
    }

    /// Validate and allocate a fresh active alert.
    pub fn build(self) -> std::result::Result<Alert, ValidationErrors> {
        self.validate()?;
        Ok(Alert {
            id: AlertId::new(),
            owner_id: self.owner_id,
            category: self.category,
            status: AlertStatus::Active,
            location: self.location,
            message: self.message.filter(|m| !m.trim().is_empty()),
            triggered_at: now_utc(),
            resolved_at: None,
        })
    }
}

/// One point of an active alert's live trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub alert_id: AlertId,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl LocationSample {
    pub fn new(alert_id: AlertId, location: &Location) -> Self {
        Self {
            alert_id,
            latitude: location.latitude,
            longitude: location.longitude,
            accuracy: location.accuracy,
            timestamp: now_utc(),
        }
    }
}
