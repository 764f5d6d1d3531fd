//! Storage contracts consumed by the service layer.
//!
//! [`SqliteStore`](crate::SqliteStore) is the durable implementation and
//! [`MemoryStore`](crate::MemoryStore) the in-process one used by tests; both
//! honour the same contract and are injected as trait objects.

use async_trait::async_trait;

use safelink_shared::{
    Alert, AlertId, AlertStatus, ContactId, Location, LocationSample, Nearby, NearbyQuery,
    NewAlert, NewContact, NewReport, Page, Paginated, Principal, Report, ReportId, ReportStatus,
    Result, TrustedContact, UserId,
};

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Validate and persist a new active alert. Its trail starts with the
    /// trigger coordinate.
    async fn create(&self, new: NewAlert) -> Result<Alert>;

    /// `NotFound` for an unknown alert, `InvalidState` once it left `active`.
    async fn append_location(&self, id: AlertId, location: Location) -> Result<LocationSample>;

    /// Leave `active`. Checks existence, then permission, then state; of two
    /// concurrent calls on one alert only the first can succeed.
    async fn transition(&self, id: AlertId, target: AlertStatus, actor: &Principal)
        -> Result<Alert>;

    async fn get(&self, id: AlertId) -> Result<Alert>;

    async fn latest_location(&self, id: AlertId) -> Result<Option<LocationSample>>;

    /// The whole trail in append order.
    async fn locations(&self, id: AlertId) -> Result<Vec<LocationSample>>;

    /// Newest first.
    async fn list_by_owner(&self, owner: &UserId, page: Page) -> Result<Paginated<Alert>>;

    async fn list_active(&self, limit: usize) -> Result<Vec<Alert>>;

    /// Active alerts only.
    async fn find_near(&self, query: &NearbyQuery) -> Result<Vec<Nearby<Alert>>>;
}

#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Primary contact first, the rest in insertion order.
    async fn contacts_for(&self, user: &UserId) -> Result<Vec<TrustedContact>>;

    async fn add_contact(&self, new: NewContact) -> Result<TrustedContact>;

    async fn remove_contact(&self, user: &UserId, id: ContactId) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub reporter: Option<UserId>,
    pub status: Option<ReportStatus>,
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn create_report(&self, new: NewReport) -> Result<Report>;

    async fn get_report(&self, id: ReportId) -> Result<Report>;

    async fn list_reports(&self, filter: &ReportFilter, page: Page) -> Result<Paginated<Report>>;

    async fn update_report_status(&self, id: ReportId, status: ReportStatus) -> Result<Report>;

    /// Dismissed reports are excluded.
    async fn reports_near(&self, query: &NearbyQuery) -> Result<Vec<Nearby<Report>>>;
}

/// Behaviour every store implementation must share. Each backend's test
/// module runs these against a fresh instance.
#[cfg(test)]
pub(crate) mod contract {
    use std::sync::Arc;

    use safelink_shared::{AlertCategory, GeoPoint, ReportCategory, Role, SafelinkError};

    use super::*;

    pub fn new_alert(owner: &str, latitude: f64, longitude: f64) -> NewAlert {
        NewAlert {
            owner_id: UserId::from(owner),
            category: AlertCategory::Security,
            location: Location::at(latitude, longitude),
            message: None,
        }
    }

    pub async fn lifecycle(store: &dyn AlertStore) {
        let alert = store.create(new_alert("u1", 6.5244, 3.3792)).await.unwrap();
        assert!(alert.is_active());
        assert!(alert.resolved_at.is_none());

        let sample = store
            .append_location(alert.id, Location::at(6.525, 3.38))
            .await
            .unwrap();
        assert_eq!(store.latest_location(alert.id).await.unwrap(), Some(sample));
        assert_eq!(store.locations(alert.id).await.unwrap().len(), 2);

        let owner = Principal::new("u1", Role::User);
        let resolved = store
            .transition(alert.id, AlertStatus::Resolved, &owner)
            .await
            .unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert!(resolved.resolved_at.is_some());
        assert_eq!(store.get(alert.id).await.unwrap(), resolved);

        let again = store.transition(alert.id, AlertStatus::Resolved, &owner).await;
        assert!(matches!(again, Err(SafelinkError::InvalidState { .. })));

        let late = store
            .append_location(alert.id, Location::at(6.526, 3.381))
            .await;
        assert!(matches!(late, Err(SafelinkError::InvalidState { .. })));
        assert_eq!(store.locations(alert.id).await.unwrap().len(), 2);
    }

    pub async fn rejects_invalid_input(store: &dyn AlertStore) {
        let err = store.create(new_alert("u1", 91.0, 0.0)).await.unwrap_err();
        assert!(matches!(err, SafelinkError::Validation(_)));

        let alert = store.create(new_alert("u1", 0.0, 0.0)).await.unwrap();
        let err = store
            .append_location(alert.id, Location::at(0.0, 181.0))
            .await
            .unwrap_err();
        assert!(matches!(err, SafelinkError::Validation(_)));

        let err = store.get(AlertId::new()).await.unwrap_err();
        assert!(matches!(err, SafelinkError::NotFound { .. }));

        let err = store
            .transition(AlertId::new(), AlertStatus::Cancelled, &Principal::new("u1", Role::User))
            .await
            .unwrap_err();
        assert!(matches!(err, SafelinkError::NotFound { .. }));
    }

    pub async fn concurrent_transitions_have_one_winner<S>(store: Arc<S>)
    where
        S: AlertStore + 'static,
    {
        let alert = store.create(new_alert("u1", 0.0, 0.0)).await.unwrap();

        let owner = Principal::new("u1", Role::User);
        let responder = Principal::new("r1", Role::Responder);

        let a = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.transition(alert.id, AlertStatus::Cancelled, &owner).await })
        };
        let b = {
            let store = Arc::clone(&store);
            tokio::spawn(
                async move { store.transition(alert.id, AlertStatus::FalseAlarm, &responder).await },
            )
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(SafelinkError::InvalidState { .. }))));

        let stored = store.get(alert.id).await.unwrap();
        let winner = results.iter().find_map(|r| r.as_ref().ok()).unwrap();
        assert_eq!(stored.status, winner.status);
    }

    pub async fn history_is_paged_newest_first(store: &dyn AlertStore) {
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(store.create(new_alert("u1", 0.0, 0.0)).await.unwrap().id);
        }
        store.create(new_alert("u2", 0.0, 0.0)).await.unwrap();

        let page = Page::new(Some(1), Some(2)).unwrap();
        let history = store.list_by_owner(&UserId::from("u1"), page).await.unwrap();
        assert_eq!(history.pagination.total, 3);
        assert_eq!(history.pagination.total_pages, 2);
        assert_eq!(
            history.items.iter().map(|a| a.id).collect::<Vec<_>>(),
            vec![ids[2], ids[1]]
        );

        let active = store.list_active(10).await.unwrap();
        assert_eq!(active.len(), 4);
    }

    pub async fn nearby_alerts(store: &dyn AlertStore) {
        // Roughly 100 m, 4 km and 9 km north of the query point.
        let center = GeoPoint::new(6.5244, 3.3792).unwrap();
        let near = store.create(new_alert("u1", 6.5253, 3.3792)).await.unwrap();
        let mid = store.create(new_alert("u2", 6.5604, 3.3792)).await.unwrap();
        store.create(new_alert("u3", 6.6053, 3.3792)).await.unwrap();

        let query = NearbyQuery::new(center, Some(5000.0), None).unwrap();
        let found = store.find_near(&query).await.unwrap();
        assert_eq!(
            found.iter().map(|n| n.item.id).collect::<Vec<_>>(),
            vec![near.id, mid.id]
        );
        assert!(found[0].distance_meters <= found[1].distance_meters);

        store
            .transition(near.id, AlertStatus::Cancelled, &Principal::new("u1", Role::User))
            .await
            .unwrap();
        let found = store.find_near(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].item.id, mid.id);
    }

    pub async fn contacts(store: &dyn ContactDirectory) {
        let add = |name: &str, is_primary| NewContact {
            user_id: UserId::from("u1"),
            name: name.into(),
            phone_number: None,
            relationship: Some("sibling".into()),
            is_primary,
        };

        let first = store.add_contact(add("Ada", true)).await.unwrap();
        store.add_contact(add("Bola", false)).await.unwrap();
        let second = store.add_contact(add("Chidi", true)).await.unwrap();

        let listed = store.contacts_for(&UserId::from("u1")).await.unwrap();
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed.iter().filter(|c| c.is_primary).count(), 1);

        let err = store
            .remove_contact(&UserId::from("u2"), first.id)
            .await
            .unwrap_err();
        assert!(matches!(err, SafelinkError::NotFound { .. }));
        store.remove_contact(&UserId::from("u1"), first.id).await.unwrap();
        assert_eq!(store.contacts_for(&UserId::from("u1")).await.unwrap().len(), 2);

        let err = store.add_contact(add("", false)).await.unwrap_err();
        assert!(matches!(err, SafelinkError::Validation(_)));
    }

    pub async fn reports(store: &dyn ReportStore) {
        let new = |title: &str, anonymous| NewReport {
            reporter_id: UserId::from("u1"),
            category: ReportCategory::SuspiciousActivity,
            title: title.into(),
            description: "Someone trying car doors on the street".into(),
            location: Location::at(6.45, 3.39),
            media_urls: vec![],
            anonymous,
        };

        let named = store.create_report(new("Car break-in", false)).await.unwrap();
        let hidden = store.create_report(new("Car break-in again", true)).await.unwrap();
        assert!(hidden.reporter_id.is_none());

        let mine = ReportFilter {
            reporter: Some(UserId::from("u1")),
            status: None,
        };
        let listed = store.list_reports(&mine, Page::default()).await.unwrap();
        assert_eq!(listed.pagination.total, 1);

        store
            .update_report_status(hidden.id, ReportStatus::Dismissed)
            .await
            .unwrap();

        let center = GeoPoint::new(6.45, 3.39).unwrap();
        let query = NearbyQuery::new(center, None, None).unwrap();
        let near = store.reports_near(&query).await.unwrap();
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].item.id, named.id);

        let err = store.get_report(ReportId::new()).await.unwrap_err();
        assert!(matches!(err, SafelinkError::NotFound { .. }));

        let err = store.create_report(new("Hi", false)).await.unwrap_err();
        assert!(matches!(err, SafelinkError::Validation(_)));
    }
}
