use async_trait::async_trait;

use safelink_shared::{ChannelKind, NotificationTarget};

use super::{phone_number, DispatchError, Notification, NotificationChannel};
use crate::config::SmsConfig;

/// SMS through a Twilio-compatible messages API: a form POST to
/// `{gateway}/Accounts/{sid}/Messages.json` with basic auth.
pub struct SmsChannel {
    client: reqwest::Client,
    config: SmsConfig,
}

impl SmsChannel {
    pub fn new(client: reqwest::Client, config: SmsConfig) -> Self {
        Self { client, config }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Messages.json",
            self.config.gateway_url.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

/// SMS has no title field; the title leads the text.
fn sms_text(notification: &Notification) -> String {
    format!("{}: {}", notification.title, notification.body)
}

#[async_trait]
impl NotificationChannel for SmsChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn deliver(
        &self,
        target: &NotificationTarget,
        notification: &Notification,
    ) -> Result<(), DispatchError> {
        let to = phone_number(ChannelKind::Sms, target)?;
        let text = sms_text(notification);

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to),
                ("From", self.config.from_number.as_str()),
                ("Body", text.as_str()),
            ])
            .send()
            .await
            .map_err(|source| DispatchError::Transport {
                channel: ChannelKind::Sms,
                source,
            })?;

        if !response.status().is_success() {
            return Err(DispatchError::Gateway {
                channel: ChannelKind::Sms,
                status: response.status().as_u16(),
            });
        }

        tracing::debug!(recipient = %target, "SMS sent");
        Ok(())
    }
}
