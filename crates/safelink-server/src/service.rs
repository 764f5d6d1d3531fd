//! The emergency alert service: every public operation, composed from the
//! stores, the broadcaster and the fan-out coordinator.
//!
//! Permission checks that depend on who is asking live here; the stores
//! only enforce the alert lifecycle itself.

use std::sync::Arc;

use tracing::{debug, info};

use safelink_shared::{
    Alert, AlertId, AlertStatus, ContactId, Location, LocationSample, Nearby, NearbyQuery,
    NewAlert, NewContact, NewReport, Page, Paginated, Principal, RealtimeEvent, Report, ReportId,
    ReportStatus, Result, Room, SafelinkError, TrustedContact, UserId,
};
use safelink_store::{AlertStore, ContactDirectory, ReportFilter, ReportStore};

use crate::fanout::FanOutCoordinator;
use crate::realtime::Broadcaster;

/// Upper bound for the responder dashboard's active-alert list.
pub const MAX_ACTIVE_ALERTS: usize = 100;

pub struct EmergencyService {
    alerts: Arc<dyn AlertStore>,
    contacts: Arc<dyn ContactDirectory>,
    reports: Arc<dyn ReportStore>,
    broadcaster: Arc<dyn Broadcaster>,
    fanout: Arc<FanOutCoordinator>,
}

fn require_responder(principal: &Principal, action: &str) -> Result<()> {
    if principal.is_responder() {
        Ok(())
    } else {
        Err(SafelinkError::forbidden(format!(
            "only responders and admins may {action}"
        )))
    }
}

impl EmergencyService {
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        contacts: Arc<dyn ContactDirectory>,
        reports: Arc<dyn ReportStore>,
        broadcaster: Arc<dyn Broadcaster>,
        fanout: Arc<FanOutCoordinator>,
    ) -> Self {
        Self {
            alerts,
            contacts,
            reports,
            broadcaster,
            fanout,
        }
    }

    // -----------------------------------------------------------------------
    // Alerts
    // -----------------------------------------------------------------------

    /// Persist the alert, announce it, and start the fan-out in the
    /// background. Returns as soon as the alert is durable; the fan-out
    /// summary arrives later as `alert.fanout` in the owner's room.
    pub async fn trigger(&self, new: NewAlert) -> Result<Alert> {
        let alert = self.alerts.create(new).await?;
        info!(
            alert = %alert.id,
            owner = %alert.owner_id,
            category = %alert.category,
            "Emergency alert triggered"
        );

        let created = RealtimeEvent::AlertCreated(alert.clone());
        self.broadcaster.publish(&Room::Responders, created.clone());
        self.broadcaster
            .publish(&Room::User(alert.owner_id.clone()), created);

        let fanout = Arc::clone(&self.fanout);
        let broadcaster = Arc::clone(&self.broadcaster);
        let snapshot = alert.clone();
        tokio::spawn(async move {
            let summary = fanout.run(&snapshot).await;
            broadcaster.publish(
                &Room::User(snapshot.owner_id.clone()),
                RealtimeEvent::FanOutCompleted {
                    alert_id: snapshot.id,
                    summary,
                },
            );
        });

        Ok(alert)
    }

    /// Only the owner moves their own trail.
    pub async fn append_location(
        &self,
        principal: &Principal,
        id: AlertId,
        location: Location,
    ) -> Result<LocationSample> {
        let alert = self.alerts.get(id).await?;
        if !principal.is(&alert.owner_id) {
            return Err(SafelinkError::forbidden(format!(
                "only the owner may update the location of alert {id}"
            )));
        }

        let sample = self.alerts.append_location(id, location).await?;
        debug!(alert = %id, "Location appended");

        self.broadcaster.publish(
            &Room::Alert(id),
            RealtimeEvent::AlertLocation {
                alert_id: id,
                sample: sample.clone(),
            },
        );
        Ok(sample)
    }

    pub async fn transition(
        &self,
        principal: &Principal,
        id: AlertId,
        target: AlertStatus,
    ) -> Result<Alert> {
        let alert = self.alerts.transition(id, target, principal).await?;
        info!(
            alert = %id,
            status = %alert.status,
            actor = %principal.user_id,
            "Alert closed"
        );

        let resolved = RealtimeEvent::AlertResolved {
            alert_id: id,
            status: alert.status,
            resolved_at: alert.resolved_at,
        };
        self.broadcaster.publish(&Room::Responders, resolved.clone());
        self.broadcaster
            .publish(&Room::User(alert.owner_id.clone()), resolved.clone());
        self.broadcaster.publish(&Room::Alert(id), resolved);

        Ok(alert)
    }

    /// The alert plus the newest point of its trail.
    pub async fn get(
        &self,
        principal: &Principal,
        id: AlertId,
    ) -> Result<(Alert, Option<LocationSample>)> {
        let alert = self.visible_alert(principal, id).await?;
        let latest = self.alerts.latest_location(id).await?;
        Ok((alert, latest))
    }

    pub async fn locations(&self, principal: &Principal, id: AlertId) -> Result<Vec<LocationSample>> {
        self.visible_alert(principal, id).await?;
        self.alerts.locations(id).await
    }

    /// `NotFound` before `Forbidden`, like every other alert lookup.
    pub async fn visible_alert(&self, principal: &Principal, id: AlertId) -> Result<Alert> {
        let alert = self.alerts.get(id).await?;
        if !alert.visible_to(principal) {
            return Err(SafelinkError::forbidden(format!(
                "{} may not view alert {id}",
                principal.user_id
            )));
        }
        Ok(alert)
    }

    /// A user's own history; responders may read anyone's.
    pub async fn history(
        &self,
        principal: &Principal,
        owner: Option<UserId>,
        page: Page,
    ) -> Result<Paginated<Alert>> {
        let owner = owner.unwrap_or_else(|| principal.user_id.clone());
        if !principal.is(&owner) {
            require_responder(principal, "read another user's history")?;
        }
        self.alerts.list_by_owner(&owner, page).await
    }

    pub async fn list_active(&self, principal: &Principal, limit: usize) -> Result<Vec<Alert>> {
        require_responder(principal, "list active alerts")?;
        self.alerts
            .list_active(limit.clamp(1, MAX_ACTIVE_ALERTS))
            .await
    }

    pub async fn nearby_alerts(
        &self,
        principal: &Principal,
        query: &NearbyQuery,
    ) -> Result<Vec<Nearby<Alert>>> {
        require_responder(principal, "search alerts by location")?;
        self.alerts.find_near(query).await
    }

    // -----------------------------------------------------------------------
    // Trusted contacts
    // -----------------------------------------------------------------------

    pub async fn contacts(&self, principal: &Principal) -> Result<Vec<TrustedContact>> {
        self.contacts.contacts_for(&principal.user_id).await
    }

    pub async fn add_contact(&self, principal: &Principal, mut new: NewContact) -> Result<TrustedContact> {
        new.user_id = principal.user_id.clone();
        let contact = self.contacts.add_contact(new).await?;
        info!(user = %principal.user_id, contact = %contact.id, "Trusted contact added");
        Ok(contact)
    }

    pub async fn remove_contact(&self, principal: &Principal, id: ContactId) -> Result<()> {
        self.contacts.remove_contact(&principal.user_id, id).await?;
        info!(user = %principal.user_id, contact = %id, "Trusted contact removed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Community reports
    // -----------------------------------------------------------------------

    pub async fn create_report(&self, new: NewReport) -> Result<Report> {
        let report = self.reports.create_report(new).await?;
        info!(report = %report.id, category = report.category.as_str(), "Report filed");
        Ok(report)
    }

    /// Open reports are community information; dismissed ones are only
    /// visible to their reporter and to moderators.
    pub async fn get_report(&self, principal: &Principal, id: ReportId) -> Result<Report> {
        let report = self.reports.get_report(id).await?;
        if report.status == ReportStatus::Dismissed && !report.visible_to(principal) {
            return Err(SafelinkError::forbidden(format!(
                "{} may not view report {id}",
                principal.user_id
            )));
        }
        Ok(report)
    }

    /// Moderators see every report, users the ones filed under their name.
    pub async fn list_reports(
        &self,
        principal: &Principal,
        status: Option<ReportStatus>,
        page: Page,
    ) -> Result<Paginated<Report>> {
        let filter = ReportFilter {
            reporter: (!principal.is_responder()).then(|| principal.user_id.clone()),
            status,
        };
        self.reports.list_reports(&filter, page).await
    }

    pub async fn update_report_status(
        &self,
        principal: &Principal,
        id: ReportId,
        status: ReportStatus,
    ) -> Result<Report> {
        require_responder(principal, "moderate reports")?;
        let report = self.reports.update_report_status(id, status).await?;
        info!(report = %id, status = %status, moderator = %principal.user_id, "Report status updated");
        Ok(report)
    }

    pub async fn nearby_reports(&self, query: &NearbyQuery) -> Result<Vec<Nearby<Report>>> {
        self.reports.reports_near(query).await
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use safelink_shared::{AlertCategory, GeoPoint, ReportCategory, Role};

    use super::*;
    use crate::test_support::TestApp;

    fn new_alert(owner: &str) -> NewAlert {
        NewAlert {
            owner_id: UserId::from(owner),
            category: AlertCategory::Medical,
            location: Location::at(6.5244, 3.3792),
            message: Some("chest pain".into()),
        }
    }

    #[tokio::test]
    async fn trigger_announces_then_reports_fanout() {
        let app = TestApp::new();
        let mut owner_room = app.broadcaster.subscribe(Room::User(UserId::from("u1")));
        let mut responders = app.broadcaster.subscribe(Room::Responders);

        let alert = app.service.trigger(new_alert("u1")).await.unwrap();
        assert!(alert.is_active());

        let first = owner_room.next().await.unwrap();
        assert_eq!(*first, RealtimeEvent::AlertCreated(alert.clone()));
        assert_eq!(*responders.next().await.unwrap(), RealtimeEvent::AlertCreated(alert.clone()));

        match &*owner_room.next().await.unwrap() {
            RealtimeEvent::FanOutCompleted { alert_id, summary } => {
                assert_eq!(*alert_id, alert.id);
                assert_eq!(summary.attempts.len(), 1);
            }
            other => panic!("expected fan-out summary, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn location_updates_reach_watchers_only_from_owner() {
        let app = TestApp::new();
        let alert = app.service.trigger(new_alert("u1")).await.unwrap();
        let mut watchers = app.broadcaster.subscribe(Room::Alert(alert.id));

        let stranger = Principal::new("u2", Role::User);
        let err = app
            .service
            .append_location(&stranger, alert.id, Location::at(6.525, 3.38))
            .await
            .unwrap_err();
        assert!(matches!(err, SafelinkError::Forbidden(_)));

        let owner = Principal::new("u1", Role::User);
        let sample = app
            .service
            .append_location(&owner, alert.id, Location::at(6.525, 3.38))
            .await
            .unwrap();

        match &*watchers.next().await.unwrap() {
            RealtimeEvent::AlertLocation { sample: seen, .. } => assert_eq!(*seen, sample),
            other => panic!("expected location event, got {other:?}"),
        }

        let (_, latest) = app.service.get(&owner, alert.id).await.unwrap();
        assert_eq!(latest, Some(sample));
    }

    #[tokio::test]
    async fn unknown_alert_is_not_found_before_forbidden() {
        let app = TestApp::new();
        let stranger = Principal::new("u2", Role::User);
        let err = app
            .service
            .append_location(&stranger, AlertId::new(), Location::at(0.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, SafelinkError::NotFound { .. }));
    }

    #[tokio::test]
    async fn resolution_goes_to_every_interested_room() {
        let app = TestApp::new();
        let alert = app.service.trigger(new_alert("u1")).await.unwrap();

        let mut watchers = app.broadcaster.subscribe(Room::Alert(alert.id));
        let mut responders = app.broadcaster.subscribe(Room::Responders);

        let responder = Principal::new("r1", Role::Responder);
        let closed = app
            .service
            .transition(&responder, alert.id, AlertStatus::FalseAlarm)
            .await
            .unwrap();

        let expected = RealtimeEvent::AlertResolved {
            alert_id: alert.id,
            status: AlertStatus::FalseAlarm,
            resolved_at: closed.resolved_at,
        };
        assert_eq!(*watchers.next().await.unwrap(), expected);
        assert_eq!(*responders.next().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn history_and_dashboard_permissions() {
        let app = TestApp::new();
        app.service.trigger(new_alert("u1")).await.unwrap();
        app.service.trigger(new_alert("u1")).await.unwrap();

        let user = Principal::new("u1", Role::User);
        let other = Principal::new("u2", Role::User);
        let admin = Principal::new("a1", Role::Admin);

        let own = app.service.history(&user, None, Page::default()).await.unwrap();
        assert_eq!(own.pagination.total, 2);

        let err = app
            .service
            .history(&other, Some(UserId::from("u1")), Page::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SafelinkError::Forbidden(_)));

        let seen = app
            .service
            .history(&admin, Some(UserId::from("u1")), Page::default())
            .await
            .unwrap();
        assert_eq!(seen.items.len(), 2);

        assert!(app.service.list_active(&user, 10).await.is_err());
        assert_eq!(app.service.list_active(&admin, 10).await.unwrap().len(), 2);

        let query = NearbyQuery::new(GeoPoint::new(6.5244, 3.3792).unwrap(), None, None).unwrap();
        assert!(matches!(
            app.service.nearby_alerts(&user, &query).await,
            Err(SafelinkError::Forbidden(_))
        ));
        assert_eq!(app.service.nearby_alerts(&admin, &query).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn dismissed_reports_are_private() {
        let app = TestApp::new();
        let report = app
            .service
            .create_report(NewReport {
                reporter_id: UserId::from("u1"),
                category: ReportCategory::Crime,
                title: "Phone snatching".into(),
                description: "Two people on a motorbike grabbing phones".into(),
                location: Location::at(6.45, 3.39),
                media_urls: vec![],
                anonymous: false,
            })
            .await
            .unwrap();

        let neighbour = Principal::new("u2", Role::User);
        let moderator = Principal::new("m1", Role::Responder);

        assert!(app.service.get_report(&neighbour, report.id).await.is_ok());
        assert!(matches!(
            app.service
                .update_report_status(&neighbour, report.id, ReportStatus::Dismissed)
                .await,
            Err(SafelinkError::Forbidden(_))
        ));

        app.service
            .update_report_status(&moderator, report.id, ReportStatus::Dismissed)
            .await
            .unwrap();
        assert!(matches!(
            app.service.get_report(&neighbour, report.id).await,
            Err(SafelinkError::Forbidden(_))
        ));
        assert!(app
            .service
            .get_report(&Principal::new("u1", Role::User), report.id)
            .await
            .is_ok());

        let mine = app
            .service
            .list_reports(&neighbour, None, Page::default())
            .await
            .unwrap();
        assert_eq!(mine.pagination.total, 0);
        let all = app
            .service
            .list_reports(&moderator, None, Page::default())
            .await
            .unwrap();
        assert_eq!(all.pagination.total, 1);
    }
}
