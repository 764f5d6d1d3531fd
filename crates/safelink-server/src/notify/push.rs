use async_trait::async_trait;
use serde::Serialize;

use safelink_shared::{ChannelKind, NotificationTarget};

use super::{DispatchError, Notification, NotificationChannel};
use crate::config::PushConfig;

/// Push notifications through an HTTP push gateway. The gateway resolves
/// the recipient to device tokens; this service never sees them.
pub struct PushChannel {
    client: reqwest::Client,
    config: PushConfig,
}

#[derive(Serialize)]
struct PushRequest<'a> {
    recipient: &'a NotificationTarget,
    title: &'a str,
    body: &'a str,
    data: &'a std::collections::HashMap<String, String>,
}

impl PushChannel {
    pub fn new(client: reqwest::Client, config: PushConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl NotificationChannel for PushChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Push
    }

    async fn deliver(
        &self,
        target: &NotificationTarget,
        notification: &Notification,
    ) -> Result<(), DispatchError> {
        let mut request = self.client.post(&self.config.gateway_url).json(&PushRequest {
            recipient: target,
            title: &notification.title,
            body: &notification.body,
            data: &notification.metadata,
        });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|source| DispatchError::Transport {
                channel: ChannelKind::Push,
                source,
            })?;

        if !response.status().is_success() {
            return Err(DispatchError::Gateway {
                channel: ChannelKind::Push,
                status: response.status().as_u16(),
            });
        }

        tracing::debug!(recipient = %target, "Push notification sent");
        Ok(())
    }
}
