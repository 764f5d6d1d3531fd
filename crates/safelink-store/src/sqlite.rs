use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::error;

use safelink_shared::types::now_utc;
use safelink_shared::{
    Alert, AlertId, AlertStatus, ContactId, Location, LocationSample, Nearby, NearbyQuery,
    NewAlert, NewContact, NewReport, Page, Paginated, Principal, Report, ReportId, ReportStatus,
    Result, SafelinkError, TrustedContact, UserId,
};

use crate::database::Database;
use crate::error::StoreError;
use crate::traits::{AlertStore, ContactDirectory, ReportFilter, ReportStore};

/// Durable store over one SQLite connection.
///
/// Every call runs on the blocking pool and holds the connection for its
/// whole duration, which serializes writes.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Option<Database>>>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(Some(db))),
        }
    }

    pub fn open(path: &Path) -> std::result::Result<Self, StoreError> {
        Ok(Self::new(Database::open_at(path)?))
    }

    /// Close the underlying connection. Later calls fail with
    /// `TransientStore`.
    pub async fn close(&self) -> std::result::Result<(), StoreError> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let taken = match db.lock() {
                Ok(mut guard) => guard.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            match taken {
                Some(db) => db.close(),
                None => Ok(()),
            }
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }

    async fn with_db<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Database) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = db
                .lock()
                .map_err(|_| SafelinkError::TransientStore("database lock poisoned".into()))?;
            let db = guard
                .as_mut()
                .ok_or_else(|| SafelinkError::TransientStore("database is closed".into()))?;
            work(db)
        })
        .await
        .map_err(|e| SafelinkError::TransientStore(format!("store task failed: {e}")))?;

        if let Err(err) = &result {
            if err.is_store_error() {
                error!(error = %err, "Store operation failed");
            }
        }
        result
    }
}

#[async_trait]
impl AlertStore for SqliteStore {
    async fn create(&self, new: NewAlert) -> Result<Alert> {
        let alert = new.build()?;
        self.with_db(move |db| {
            db.insert_alert(&alert)?;
            tracing::debug!(alert = %alert.id, owner = %alert.owner_id, "alert persisted");
            Ok(alert)
        })
        .await
    }

    async fn append_location(&self, id: AlertId, location: Location) -> Result<LocationSample> {
        location.validate()?;
        self.with_db(move |db| db.insert_location(id, &location)?)
            .await
    }

    async fn transition(
        &self,
        id: AlertId,
        target: AlertStatus,
        actor: &Principal,
    ) -> Result<Alert> {
        let actor = actor.clone();
        self.with_db(move |db| db.close_alert(id, target, &actor, now_utc())?)
            .await
    }

    async fn get(&self, id: AlertId) -> Result<Alert> {
        self.with_db(move |db| {
            db.get_alert(id)?
                .ok_or_else(|| SafelinkError::not_found("alert", id))
        })
        .await
    }

    async fn latest_location(&self, id: AlertId) -> Result<Option<LocationSample>> {
        self.with_db(move |db| Ok(db.latest_location(id)?)).await
    }

    async fn locations(&self, id: AlertId) -> Result<Vec<LocationSample>> {
        self.with_db(move |db| Ok(db.locations(id)?)).await
    }

    async fn list_by_owner(&self, owner: &UserId, page: Page) -> Result<Paginated<Alert>> {
        let owner = owner.clone();
        self.with_db(move |db| {
            let (items, total) = db.list_alerts_by_owner(&owner, page)?;
            Ok(Paginated::new(items, total, page))
        })
        .await
    }

    async fn list_active(&self, limit: usize) -> Result<Vec<Alert>> {
        self.with_db(move |db| Ok(db.list_active_alerts(limit)?))
            .await
    }

    async fn find_near(&self, query: &NearbyQuery) -> Result<Vec<Nearby<Alert>>> {
        let query = *query;
        self.with_db(move |db| {
            let candidates = db.active_alerts_within(&query.bounding_box())?;
            Ok(query.rank(candidates))
        })
        .await
    }
}

#[async_trait]
impl ContactDirectory for SqliteStore {
    async fn contacts_for(&self, user: &UserId) -> Result<Vec<TrustedContact>> {
        let user = user.clone();
        self.with_db(move |db| Ok(db.contacts_for_user(&user)?))
            .await
    }

    async fn add_contact(&self, new: NewContact) -> Result<TrustedContact> {
        let contact = new.build()?;
        self.with_db(move |db| {
            db.insert_contact(&contact)?;
            Ok(contact)
        })
        .await
    }

    async fn remove_contact(&self, user: &UserId, id: ContactId) -> Result<()> {
        let user = user.clone();
        self.with_db(move |db| {
            if db.delete_contact(&user, id)? {
                Ok(())
            } else {
                Err(SafelinkError::not_found("contact", id))
            }
        })
        .await
    }
}

#[async_trait]
impl ReportStore for SqliteStore {
    async fn create_report(&self, new: NewReport) -> Result<Report> {
        let report = new.build()?;
        self.with_db(move |db| {
            db.insert_report(&report)?;
            Ok(report)
        })
        .await
    }

    async fn get_report(&self, id: ReportId) -> Result<Report> {
        self.with_db(move |db| {
            db.get_report(id)?
                .ok_or_else(|| SafelinkError::not_found("report", id))
        })
        .await
    }

    async fn list_reports(&self, filter: &ReportFilter, page: Page) -> Result<Paginated<Report>> {
        let filter = filter.clone();
        self.with_db(move |db| {
            let (items, total) = db.list_reports(&filter, page)?;
            Ok(Paginated::new(items, total, page))
        })
        .await
    }

    async fn update_report_status(&self, id: ReportId, status: ReportStatus) -> Result<Report> {
        self.with_db(move |db| {
            db.update_report_status(id, status, now_utc())?
                .ok_or_else(|| SafelinkError::not_found("report", id))
        })
        .await
    }

    async fn reports_near(&self, query: &NearbyQuery) -> Result<Vec<Nearby<Report>>> {
        let query = *query;
        self.with_db(move |db| {
            let candidates = db.reports_within(&query.bounding_box())?;
            Ok(query.rank(candidates))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::contract;

    fn open() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("safelink.db")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn lifecycle() {
        let (_dir, store) = open();
        contract::lifecycle(&store).await;
    }

    #[tokio::test]
    async fn rejects_invalid_input() {
        let (_dir, store) = open();
        contract::rejects_invalid_input(&store).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transitions_have_one_winner() {
        let (_dir, store) = open();
        contract::concurrent_transitions_have_one_winner(Arc::new(store)).await;
    }

    #[tokio::test]
    async fn history_is_paged_newest_first() {
        let (_dir, store) = open();
        contract::history_is_paged_newest_first(&store).await;
    }

    #[tokio::test]
    async fn nearby_alerts() {
        let (_dir, store) = open();
        contract::nearby_alerts(&store).await;
    }

    #[tokio::test]
    async fn contacts() {
        let (_dir, store) = open();
        contract::contacts(&store).await;
    }

    #[tokio::test]
    async fn reports() {
        let (_dir, store) = open();
        contract::reports(&store).await;
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("safelink.db");

        let store = SqliteStore::open(&path).unwrap();
        let alert = store
            .create(contract::new_alert("u1", 1.0, 1.0))
            .await
            .unwrap();
        store.close().await.unwrap();

        let err = store.get(alert.id).await.unwrap_err();
        assert!(matches!(err, SafelinkError::TransientStore(_)));

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.get(alert.id).await.unwrap(), alert);
        assert_eq!(reopened.locations(alert.id).await.unwrap().len(), 1);
    }
}
