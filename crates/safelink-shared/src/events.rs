//! Real-time events and the rooms they are published to.
//!
//! Every event travels inside the envelope `{"event": "<name>", "data": {...}}`.
//! Delivery is best-effort and at-most-once; nothing is replayed to a
//! subscriber that joins after an event went out.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::{Alert, AlertStatus, LocationSample};
use crate::types::{AlertId, ContactId, UserId};

/// A named subscription scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    /// Every connection of one user.
    User(UserId),
    /// Every connection authenticated as responder or admin.
    Responders,
    /// Everyone watching one alert.
    Alert(AlertId),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::User(id) => write!(f, "user:{id}"),
            Room::Responders => f.write_str("responders"),
            Room::Alert(id) => write!(f, "alert:{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum RealtimeEvent {
    #[serde(rename = "alert.created")]
    AlertCreated(Alert),

    #[serde(rename = "alert.location", rename_all = "camelCase")]
    AlertLocation {
        alert_id: AlertId,
        sample: LocationSample,
    },

    #[serde(rename = "alert.resolved", rename_all = "camelCase")]
    AlertResolved {
        alert_id: AlertId,
        status: AlertStatus,
        resolved_at: Option<DateTime<Utc>>,
    },

    /// Fan-out outcome for the alert's owner, sent once all dispatches finish.
    #[serde(rename = "alert.fanout", rename_all = "camelCase")]
    FanOutCompleted {
        alert_id: AlertId,
        summary: FanOutSummary,
    },
}

impl RealtimeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEvent::AlertCreated(_) => "alert.created",
            RealtimeEvent::AlertLocation { .. } => "alert.location",
            RealtimeEvent::AlertResolved { .. } => "alert.resolved",
            RealtimeEvent::FanOutCompleted { .. } => "alert.fanout",
        }
    }
}

// ---------------------------------------------------------------------------
// Notification outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Push,
    Sms,
    Ussd,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Push => "push",
            ChannelKind::Sms => "sms",
            ChannelKind::Ussd => "ussd",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a notification is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NotificationTarget {
    /// The user who triggered the alert.
    #[serde(rename_all = "camelCase")]
    Owner { user_id: UserId },
    #[serde(rename_all = "camelCase")]
    Contact {
        contact_id: ContactId,
        name: String,
        phone_number: Option<String>,
    },
}

impl NotificationTarget {
    pub fn is_owner(&self) -> bool {
        matches!(self, NotificationTarget::Owner { .. })
    }
}

impl fmt::Display for NotificationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationTarget::Owner { user_id } => write!(f, "owner {user_id}"),
            NotificationTarget::Contact { contact_id, .. } => write!(f, "contact {contact_id}"),
        }
    }
}

/// One dispatch try. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAttempt {
    pub target: NotificationTarget,
    pub channel: ChannelKind,
    pub sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutSummary {
    pub contacts_notified: usize,
    pub contacts_failed: usize,
    pub owner_notified: bool,
    pub attempts: Vec<NotificationAttempt>,
}

impl FanOutSummary {
    pub fn from_attempts(attempts: Vec<NotificationAttempt>) -> Self {
        let mut summary = Self::default();
        for attempt in &attempts {
            match (&attempt.target, attempt.sent) {
                (NotificationTarget::Owner { .. }, sent) => summary.owner_notified |= sent,
                (NotificationTarget::Contact { .. }, true) => summary.contacts_notified += 1,
                (NotificationTarget::Contact { .. }, false) => summary.contacts_failed += 1,
            }
        }
        summary.attempts = attempts;
        summary
    }
}
