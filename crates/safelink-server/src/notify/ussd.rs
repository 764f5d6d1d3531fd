use async_trait::async_trait;
use serde::Serialize;

use safelink_shared::{ChannelKind, NotificationTarget};

use super::{phone_number, DispatchError, Notification, NotificationChannel};
use crate::config::UssdConfig;

// USSD pages are short; operators commonly cap them at 182 characters.
const MAX_USSD_CHARS: usize = 182;

/// USSD push through an operator gateway that accepts JSON.
pub struct UssdChannel {
    client: reqwest::Client,
    config: UssdConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UssdRequest<'a> {
    phone_number: &'a str,
    message: String,
}

impl UssdChannel {
    pub fn new(client: reqwest::Client, config: UssdConfig) -> Self {
        Self { client, config }
    }
}

fn ussd_text(notification: &Notification) -> String {
    format!("{}: {}", notification.title, notification.body)
        .chars()
        .take(MAX_USSD_CHARS)
        .collect()
}

#[async_trait]
impl NotificationChannel for UssdChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Ussd
    }

    async fn deliver(
        &self,
        target: &NotificationTarget,
        notification: &Notification,
    ) -> Result<(), DispatchError> {
        let phone = phone_number(ChannelKind::Ussd, target)?;

        let response = self
            .client
            .post(&self.config.gateway_url)
            .json(&UssdRequest {
                phone_number: phone,
                message: ussd_text(notification),
            })
            .send()
            .await
            .map_err(|source| DispatchError::Transport {
                channel: ChannelKind::Ussd,
                source,
            })?;

        if !response.status().is_success() {
            return Err(DispatchError::Gateway {
                channel: ChannelKind::Ussd,
                status: response.status().as_u16(),
            });
        }

        tracing::debug!(recipient = %target, "USSD message sent");
        Ok(())
    }
}
