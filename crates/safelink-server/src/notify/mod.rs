//! Single-notification dispatch over push, SMS and USSD.
//!
//! Each channel is a [`NotificationChannel`] behind the [`Dispatcher`]. The
//! dispatcher never fails: an unconfigured channel or a gateway error comes
//! back as an [`Outcome`] with `sent = false`, so one broken channel cannot
//! abort a caller that is notifying many people.

pub mod push;
pub mod sms;
pub mod ussd;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use safelink_shared::{ChannelKind, NotificationTarget};

use crate::config::ServerConfig;

/// What gets sent, independent of the channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Extra key/value data for the receiving app (alert id, category, ...).
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0} channel is not configured")]
    NotConfigured(ChannelKind),

    #[error("{channel} needs a phone number but {target} has none")]
    MissingAddress {
        channel: ChannelKind,
        target: String,
    },

    #[error("{channel} gateway answered {status}")]
    Gateway { channel: ChannelKind, status: u16 },

    #[error("{channel} gateway unreachable: {source}")]
    Transport {
        channel: ChannelKind,
        #[source]
        source: reqwest::Error,
    },
}

/// Result of one dispatch try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub sent: bool,
    pub error: Option<String>,
}

impl Outcome {
    pub fn sent() -> Self {
        Self {
            sent: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            sent: false,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn deliver(
        &self,
        target: &NotificationTarget,
        notification: &Notification,
    ) -> Result<(), DispatchError>;
}

/// Phone number of a contact target, or the reason there is none.
pub(crate) fn phone_number(
    channel: ChannelKind,
    target: &NotificationTarget,
) -> Result<&str, DispatchError> {
    match target {
        NotificationTarget::Contact {
            phone_number: Some(phone),
            ..
        } => Ok(phone.as_str()),
        other => Err(DispatchError::MissingAddress {
            channel,
            target: other.to_string(),
        }),
    }
}

/// Registry of configured channels.
#[derive(Default, Clone)]
pub struct Dispatcher {
    channels: HashMap<ChannelKind, Arc<dyn NotificationChannel>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every channel the configuration enables.
    pub fn from_config(config: &ServerConfig, client: reqwest::Client) -> Self {
        let mut dispatcher = Self::new();

        if let Some(push) = &config.push {
            dispatcher.register(Arc::new(push::PushChannel::new(client.clone(), push.clone())));
        }
        if let Some(sms) = &config.sms {
            dispatcher.register(Arc::new(sms::SmsChannel::new(client.clone(), sms.clone())));
        }
        if let Some(ussd) = &config.ussd {
            dispatcher.register(Arc::new(ussd::UssdChannel::new(client, ussd.clone())));
        }

        let enabled: Vec<&str> = dispatcher.channels.keys().map(|k| k.as_str()).collect();
        tracing::info!(channels = ?enabled, "Notification channels ready");

        dispatcher
    }

    /// Replace the channel of the same kind, if any.
    pub fn register(&mut self, channel: Arc<dyn NotificationChannel>) {
        self.channels.insert(channel.kind(), channel);
    }

    pub fn is_configured(&self, kind: ChannelKind) -> bool {
        self.channels.contains_key(&kind)
    }

    pub async fn send(
        &self,
        kind: ChannelKind,
        target: &NotificationTarget,
        notification: &Notification,
    ) -> Outcome {
        let result = match self.channels.get(&kind) {
            Some(channel) => channel.deliver(target, notification).await,
            None => Err(DispatchError::NotConfigured(kind)),
        };

        match result {
            Ok(()) => Outcome::sent(),
            Err(e) => Outcome::failed(e.to_string()),
        }
    }
}
