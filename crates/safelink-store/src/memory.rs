use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use safelink_shared::contact::primary_first;
use safelink_shared::types::now_utc;
use safelink_shared::{
    Alert, AlertId, AlertStatus, ContactId, Location, LocationSample, Nearby, NearbyQuery,
    NewAlert, NewContact, NewReport, Page, Paginated, Principal, Report, ReportId, ReportStatus,
    Result, SafelinkError, TrustedContact, UserId,
};

use crate::traits::{AlertStore, ContactDirectory, ReportFilter, ReportStore};

/// In-process store with the same contract as [`SqliteStore`](crate::SqliteStore).
///
/// One async mutex guards everything, so transitions are trivially atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    /// Insertion order, oldest first.
    alerts: Vec<Alert>,
    index: HashMap<AlertId, usize>,
    trails: HashMap<AlertId, Vec<LocationSample>>,
    contacts: Vec<TrustedContact>,
    reports: Vec<Report>,
}

impl Inner {
    fn alert_mut(&mut self, id: AlertId) -> Result<&mut Alert> {
        let idx = *self
            .index
            .get(&id)
            .ok_or_else(|| SafelinkError::not_found("alert", id))?;
        Ok(&mut self.alerts[idx])
    }

    fn report_mut(&mut self, id: ReportId) -> Result<&mut Report> {
        self.reports
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| SafelinkError::not_found("report", id))
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest first; later insertions win ties.
fn newest_first<'a, T: 'a, I, K>(items: I, created_at: K) -> Vec<&'a T>
where
    I: DoubleEndedIterator<Item = &'a T>,
    K: Fn(&T) -> chrono::DateTime<chrono::Utc>,
{
    let mut out: Vec<&T> = items.rev().collect();
    out.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    out
}

fn paginate<T: Clone>(matching: Vec<&T>, page: Page) -> Paginated<T> {
    let total = matching.len() as u64;
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let items = matching
        .into_iter()
        .skip(offset)
        .take(page.limit() as usize)
        .cloned()
        .collect();
    Paginated::new(items, total, page)
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn create(&self, new: NewAlert) -> Result<Alert> {
        let alert = new.build()?;
        let first = LocationSample {
            timestamp: alert.triggered_at,
            ..LocationSample::new(alert.id, &alert.location)
        };

        let mut inner = self.inner.lock().await;
        let idx = inner.alerts.len();
        inner.index.insert(alert.id, idx);
        inner.trails.insert(alert.id, vec![first]);
        inner.alerts.push(alert.clone());
        Ok(alert)
    }

    async fn append_location(&self, id: AlertId, location: Location) -> Result<LocationSample> {
        location.validate()?;

        let mut inner = self.inner.lock().await;
        let alert = inner.alert_mut(id)?;
        if !alert.is_active() {
            return Err(SafelinkError::invalid_state("alert", id, alert.status));
        }

        let sample = LocationSample::new(id, &location);
        inner.trails.entry(id).or_default().push(sample.clone());
        Ok(sample)
    }

    async fn transition(
        &self,
        id: AlertId,
        target: AlertStatus,
        actor: &Principal,
    ) -> Result<Alert> {
        let mut inner = self.inner.lock().await;
        let alert = inner.alert_mut(id)?;
        alert.authorize_transition(target, actor)?;
        alert.close(target, now_utc());
        Ok(alert.clone())
    }

    async fn get(&self, id: AlertId) -> Result<Alert> {
        let mut inner = self.inner.lock().await;
        inner.alert_mut(id).map(|a| a.clone())
    }

    async fn latest_location(&self, id: AlertId) -> Result<Option<LocationSample>> {
        let inner = self.inner.lock().await;
        Ok(inner.trails.get(&id).and_then(|t| t.last().cloned()))
    }

    async fn locations(&self, id: AlertId) -> Result<Vec<LocationSample>> {
        let inner = self.inner.lock().await;
        Ok(inner.trails.get(&id).cloned().unwrap_or_default())
    }

    async fn list_by_owner(&self, owner: &UserId, page: Page) -> Result<Paginated<Alert>> {
        let inner = self.inner.lock().await;
        let owned = newest_first(
            inner.alerts.iter().filter(|a| &a.owner_id == owner),
            |a| a.triggered_at,
        );
        Ok(paginate(owned, page))
    }

    async fn list_active(&self, limit: usize) -> Result<Vec<Alert>> {
        let inner = self.inner.lock().await;
        let active = newest_first(inner.alerts.iter().filter(|a| a.is_active()), |a| {
            a.triggered_at
        });
        Ok(active.into_iter().take(limit).cloned().collect())
    }

    async fn find_near(&self, query: &NearbyQuery) -> Result<Vec<Nearby<Alert>>> {
        let inner = self.inner.lock().await;
        Ok(query.rank(inner.alerts.iter().filter(|a| a.is_active()).cloned()))
    }
}

#[async_trait]
impl ContactDirectory for MemoryStore {
    async fn contacts_for(&self, user: &UserId) -> Result<Vec<TrustedContact>> {
        let inner = self.inner.lock().await;
        let mut contacts: Vec<_> = inner
            .contacts
            .iter()
            .filter(|c| &c.user_id == user)
            .cloned()
            .collect();
        primary_first(&mut contacts);
        Ok(contacts)
    }

    async fn add_contact(&self, new: NewContact) -> Result<TrustedContact> {
        let contact = new.build()?;

        let mut inner = self.inner.lock().await;
        if contact.is_primary {
            for existing in inner
                .contacts
                .iter_mut()
                .filter(|c| c.user_id == contact.user_id)
            {
                existing.is_primary = false;
            }
        }
        inner.contacts.push(contact.clone());
        Ok(contact)
    }

    async fn remove_contact(&self, user: &UserId, id: ContactId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let before = inner.contacts.len();
        inner.contacts.retain(|c| !(c.id == id && &c.user_id == user));
        if inner.contacts.len() == before {
            return Err(SafelinkError::not_found("contact", id));
        }
        Ok(())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn create_report(&self, new: NewReport) -> Result<Report> {
        let report = new.build()?;
        self.inner.lock().await.reports.push(report.clone());
        Ok(report)
    }

    async fn get_report(&self, id: ReportId) -> Result<Report> {
        let mut inner = self.inner.lock().await;
        inner.report_mut(id).map(|r| r.clone())
    }

    async fn list_reports(&self, filter: &ReportFilter, page: Page) -> Result<Paginated<Report>> {
        let inner = self.inner.lock().await;
        let matching = newest_first(
            inner.reports.iter().filter(|r| {
                filter
                    .reporter
                    .as_ref()
                    .map_or(true, |who| r.reporter_id.as_ref() == Some(who))
                    && filter.status.map_or(true, |s| r.status == s)
            }),
            |r| r.created_at,
        );
        Ok(paginate(matching, page))
    }

    async fn update_report_status(&self, id: ReportId, status: ReportStatus) -> Result<Report> {
        let mut inner = self.inner.lock().await;
        let report = inner.report_mut(id)?;
        report.status = status;
        report.updated_at = now_utc();
        Ok(report.clone())
    }

    async fn reports_near(&self, query: &NearbyQuery) -> Result<Vec<Nearby<Report>>> {
        let inner = self.inner.lock().await;
        Ok(query.rank(
            inner
                .reports
                .iter()
                .filter(|r| r.status != ReportStatus::Dismissed)
                .cloned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::traits::contract;

    #[tokio::test]
    async fn lifecycle() {
        contract::lifecycle(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn rejects_invalid_input() {
        contract::rejects_invalid_input(&MemoryStore::new()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transitions_have_one_winner() {
        contract::concurrent_transitions_have_one_winner(Arc::new(MemoryStore::new())).await;
    }

    #[tokio::test]
    async fn history_is_paged_newest_first() {
        contract::history_is_paged_newest_first(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn nearby_alerts() {
        contract::nearby_alerts(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn contacts() {
        contract::contacts(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn reports() {
        contract::reports(&MemoryStore::new()).await;
    }
}
