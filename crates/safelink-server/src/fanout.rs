//! Fan-out of a freshly created alert to the owner's trusted contacts.
//!
//! One dispatch per contact plus one push to the owner, issued concurrently
//! under a semaphore, each bounded by a timeout. Failures are collected into
//! the [`FanOutSummary`]; nothing here is retried and nothing fails the
//! trigger that started it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use safelink_shared::contact::primary_first;
use safelink_shared::types::now_utc;
use safelink_shared::{
    Alert, ChannelKind, FanOutSummary, NotificationAttempt, NotificationTarget, TrustedContact,
};
use safelink_store::ContactDirectory;

use crate::notify::{Dispatcher, Notification, Outcome};

pub struct FanOutCoordinator {
    contacts: Arc<dyn ContactDirectory>,
    dispatcher: Arc<Dispatcher>,
    max_concurrency: usize,
    dispatch_timeout: Duration,
}

/// One planned dispatch.
#[derive(Debug, Clone)]
struct Job {
    target: NotificationTarget,
    channel: ChannelKind,
    notification: Notification,
}

impl FanOutCoordinator {
    pub fn new(
        contacts: Arc<dyn ContactDirectory>,
        dispatcher: Arc<Dispatcher>,
        max_concurrency: usize,
        dispatch_timeout: Duration,
    ) -> Self {
        Self {
            contacts,
            dispatcher,
            max_concurrency: max_concurrency.max(1),
            dispatch_timeout,
        }
    }

    /// Notify everyone about `alert` and wait for every outcome. Attempts in
    /// the summary follow the plan order: contacts primary first, then the
    /// owner.
    pub async fn run(&self, alert: &Alert) -> FanOutSummary {
        let mut contacts = match self.contacts.contacts_for(&alert.owner_id).await {
            Ok(contacts) => contacts,
            Err(e) => {
                warn!(
                    alert = %alert.id,
                    owner = %alert.owner_id,
                    error = %e,
                    "Contact lookup failed, notifying owner only"
                );
                Vec::new()
            }
        };
        primary_first(&mut contacts);

        let jobs: Vec<Job> = contacts
            .iter()
            .map(|contact| self.contact_job(alert, contact))
            .chain(std::iter::once(owner_job(alert)))
            .collect();

        let attempts = self.dispatch_all(alert, jobs).await;
        let summary = FanOutSummary::from_attempts(attempts);

        info!(
            alert = %alert.id,
            contacts_notified = summary.contacts_notified,
            contacts_failed = summary.contacts_failed,
            owner_notified = summary.owner_notified,
            "Fan-out finished"
        );
        summary
    }

    async fn dispatch_all(&self, alert: &Alert, jobs: Vec<Job>) -> Vec<NotificationAttempt> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut set = JoinSet::new();

        for (idx, job) in jobs.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let dispatcher = Arc::clone(&self.dispatcher);
            let timeout = self.dispatch_timeout;

            set.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        let send = dispatcher.send(job.channel, &job.target, &job.notification);
                        tokio::time::timeout(timeout, send).await.unwrap_or_else(|_| {
                            Outcome::failed(format!("timed out after {}ms", timeout.as_millis()))
                        })
                    }
                    Err(_) => Outcome::failed("dispatch pool closed"),
                };
                (idx, outcome)
            });
        }

        let mut outcomes: HashMap<usize, (Outcome, chrono::DateTime<chrono::Utc>)> =
            HashMap::with_capacity(jobs.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, outcome)) => {
                    outcomes.insert(idx, (outcome, now_utc()));
                }
                Err(e) => error!(alert = %alert.id, error = %e, "Dispatch task failed"),
            }
        }

        jobs.into_iter()
            .enumerate()
            .map(|(idx, job)| {
                let (outcome, at) = outcomes
                    .remove(&idx)
                    .unwrap_or_else(|| (Outcome::failed("dispatch task failed"), now_utc()));

                if let Some(reason) = &outcome.error {
                    warn!(
                        alert = %alert.id,
                        channel = %job.channel,
                        recipient = %job.target,
                        error = %reason,
                        "Notification not delivered"
                    );
                }

                NotificationAttempt {
                    target: job.target,
                    channel: job.channel,
                    sent: outcome.sent,
                    error: outcome.error,
                    at,
                }
            })
            .collect()
    }

    /// SMS when a phone number is on file (USSD if only that is configured),
    /// push otherwise.
    fn contact_channel(&self, contact: &TrustedContact) -> ChannelKind {
        if contact.phone_number.is_none() {
            return ChannelKind::Push;
        }
        if !self.dispatcher.is_configured(ChannelKind::Sms)
            && self.dispatcher.is_configured(ChannelKind::Ussd)
        {
            return ChannelKind::Ussd;
        }
        ChannelKind::Sms
    }

    fn contact_job(&self, alert: &Alert, contact: &TrustedContact) -> Job {
        let place = alert.location.address.clone().unwrap_or_else(|| {
            format!("{:.5}, {:.5}", alert.location.latitude, alert.location.longitude)
        });
        let mut body = format!(
            "{} has triggered a {} emergency alert. Location: {place}",
            alert.owner_id,
            alert.category.as_str().replace('_', " ")
        );
        if let Some(message) = &alert.message {
            body.push_str(&format!(". Message: {message}"));
        }

        Job {
            target: NotificationTarget::Contact {
                contact_id: contact.id,
                name: contact.name.clone(),
                phone_number: contact.phone_number.clone(),
            },
            channel: self.contact_channel(contact),
            notification: Notification {
                title: "Emergency Alert".into(),
                body,
                metadata: metadata(alert, [("contactName", contact.name.clone())]),
            },
        }
    }
}

fn owner_job(alert: &Alert) -> Job {
    Job {
        target: NotificationTarget::Owner {
            user_id: alert.owner_id.clone(),
        },
        channel: ChannelKind::Push,
        notification: Notification {
            title: "Emergency Alert Activated".into(),
            body: "Your emergency alert has been activated. Help is on the way.".into(),
            metadata: metadata(alert, []),
        },
    }
}

fn metadata<const N: usize>(alert: &Alert, extra: [(&str, String); N]) -> HashMap<String, String> {
    let mut data = HashMap::from([
        ("alertId".to_string(), alert.id.to_string()),
        ("category".to_string(), alert.category.as_str().to_string()),
    ]);
    data.extend(extra.into_iter().map(|(k, v)| (k.to_string(), v)));
    data
}
