//! Delivery channels for admin notifications.
//!
//! Each channel is one variant of [`Channel`] with a single `send`. A failing
//! channel reports its own error and never affects the others.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use super::Notification;
use missive_core::Severity;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChannelKind {
  Console,
  Email,
  Webhook,
  InApp,
}

#[derive(Debug, Error)]
pub enum ChannelError {
  #[error("no email recipients configured")]
  NoRecipients,

  #[error("no mail transport attached")]
  NoMailTransport,

  #[error("mail transport has shut down")]
  MailTransportClosed,

  #[error("webhook url not configured")]
  MissingWebhookUrl,

  #[error("webhook request failed: {0}")]
  Http(#[from] reqwest::Error),
}

/// A mail handed to the host's mail transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMail {
  pub to:      Vec<String>,
  pub subject: String,
  pub body:    String,
}

#[derive(Debug, Clone)]
pub struct EmailChannel {
  pub recipients: Vec<String>,
  pub outbox:     Option<mpsc::UnboundedSender<OutboundMail>>,
}

#[derive(Debug, Clone)]
pub struct WebhookChannel {
  pub url:    Option<String>,
  pub client: reqwest::Client,
}

#[derive(Debug, Clone)]
pub enum Channel {
  /// Emits a `tracing` event under `missive::notify`.
  Console,
  Email(EmailChannel),
  /// POSTs the notification as JSON.
  Webhook(WebhookChannel),
  /// Publishes to the in-app feed; having no subscriber is not a failure.
  InApp(broadcast::Sender<Notification>),
}

impl Channel {
  pub fn kind(&self) -> ChannelKind {
    match self {
      Channel::Console => ChannelKind::Console,
      Channel::Email(_) => ChannelKind::Email,
      Channel::Webhook(_) => ChannelKind::Webhook,
      Channel::InApp(_) => ChannelKind::InApp,
    }
  }

  pub async fn send(&self, notification: &Notification) -> Result<(), ChannelError> {
    match self {
      Channel::Console => {
        log_to_console(notification);
        Ok(())
      }
      Channel::Email(email) => {
        if email.recipients.is_empty() {
          return Err(ChannelError::NoRecipients);
        }
        let outbox = email.outbox.as_ref().ok_or(ChannelError::NoMailTransport)?;
        outbox
          .send(OutboundMail {
            to:      email.recipients.clone(),
            subject: format!("[{}] {}", notification.severity, notification.title),
            body:    notification.message.clone(),
          })
          .map_err(|_| ChannelError::MailTransportClosed)
      }
      Channel::Webhook(webhook) => {
        let url = webhook.url.as_deref().ok_or(ChannelError::MissingWebhookUrl)?;
        webhook
          .client
          .post(url)
          .json(notification)
          .send()
          .await?
          .error_for_status()?;
        Ok(())
      }
      Channel::InApp(feed) => {
        let _ = feed.send(notification.clone());
        Ok(())
      }
    }
  }
}

fn log_to_console(n: &Notification) {
  let kind = n.notification_type.to_string();
  match n.severity {
    Severity::Critical | Severity::Error => tracing::error!(
      target: "missive::notify",
      notification_type = %kind,
      severity = %n.severity,
      title = %n.title,
      "{}",
      n.message,
    ),
    Severity::Warning => tracing::warn!(
      target: "missive::notify",
      notification_type = %kind,
      severity = %n.severity,
      title = %n.title,
      "{}",
      n.message,
    ),
  }
}
