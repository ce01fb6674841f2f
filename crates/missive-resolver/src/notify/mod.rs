//! Rate-limited, multi-channel operator alerting.
//!
//! Every accepted notification is appended to an in-memory history and then
//! fanned out to each configured [`Channel`]. Equivalent notifications are
//! suppressed for `rate_limit_minutes` after the first one goes out.

mod channel;

use std::{
  collections::{BTreeMap, HashMap, VecDeque},
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Duration as TimeDelta, Utc};
use missive_core::{
  ErrorCode, ErrorRecord, Severity,
  clock::{Clock, SystemClock},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumIter};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

pub use self::channel::{
  Channel, ChannelError, ChannelKind, EmailChannel, OutboundMail, WebhookChannel,
};

const IN_APP_FEED_CAPACITY: usize = 64;

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
  pub enabled:             bool,
  pub channels:            Vec<ChannelKind>,
  pub rate_limit_minutes:  u32,
  /// Errors below this severity are not sent by [`AdminNotifier::notify_error`].
  pub severity_threshold:  Severity,
  pub include_context:     bool,
  /// Append the rendered cause chain to the message.
  pub include_stack_trace: bool,
  pub email_recipients:    Vec<String>,
  pub webhook_url:         Option<String>,
  pub max_history:         usize,
}

impl Default for NotifierConfig {
  fn default() -> Self {
    Self {
      enabled:             true,
      channels:            vec![ChannelKind::Console],
      rate_limit_minutes:  15,
      severity_threshold:  Severity::Error,
      include_context:     true,
      include_stack_trace: false,
      email_recipients:    Vec::new(),
      webhook_url:         None,
      max_history:         500,
    }
  }
}

// ─── Notifications ───────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationType {
  CriticalError,
  SystemFailure,
  ConfigurationIssue,
  PerformanceIssue,
  ErrorAlert,
  Warning,
}

impl NotificationType {
  /// Data-store and connectivity codes are system failures, configuration
  /// codes configuration issues; anything else goes by severity.
  pub fn for_error(code: ErrorCode, severity: Severity) -> Self {
    match code {
      ErrorCode::DatabaseError
      | ErrorCode::ConnectionFailed
      | ErrorCode::NetworkError
      | ErrorCode::Timeout => Self::SystemFailure,
      ErrorCode::InvalidConfiguration => Self::ConfigurationIssue,
      ErrorCode::FallbackChainExhausted => Self::CriticalError,
      _ => match severity {
        Severity::Critical => Self::CriticalError,
        Severity::Error => Self::ErrorAlert,
        Severity::Warning => Self::Warning,
      },
    }
  }

  fn title(self) -> &'static str {
    match self {
      Self::CriticalError => "Critical error",
      Self::SystemFailure => "System failure",
      Self::ConfigurationIssue => "Configuration issue",
      Self::PerformanceIssue => "Performance issue",
      Self::ErrorAlert => "Error",
      Self::Warning => "Warning",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
  pub notification_id:   Uuid,
  #[serde(rename = "type")]
  pub notification_type: NotificationType,
  pub title:             String,
  pub message:           String,
  pub severity:          Severity,
  pub context:           BTreeMap<String, String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error:             Option<ErrorRecord>,
  pub timestamp:         DateTime<Utc>,
}

/// The result of one channel's delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelOutcome {
  pub channel: ChannelKind,
  pub success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error:   Option<String>,
  pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationStatistics {
  pub total:       usize,
  pub by_type:     BTreeMap<NotificationType, usize>,
  pub by_severity: BTreeMap<Severity, usize>,
  /// Sent within the last 24 hours.
  pub recent:      usize,
}

struct Draft {
  notification_type: NotificationType,
  title:             String,
  message:           String,
  severity:          Severity,
  context:           BTreeMap<String, String>,
  error:             Option<ErrorRecord>,
  /// Code or title; part of the rate-limit key.
  subject:           String,
}

// ─── Notifier ────────────────────────────────────────────────────────────────

pub struct AdminNotifier {
  config:    NotifierConfig,
  clock:     Arc<dyn Clock>,
  channels:  Vec<Channel>,
  in_app:    broadcast::Sender<Notification>,
  last_sent: Mutex<HashMap<String, DateTime<Utc>>>,
  history:   Mutex<VecDeque<Notification>>,
}

impl AdminNotifier {
  pub fn new(config: NotifierConfig) -> Self {
    Self::with_clock(config, Arc::new(SystemClock))
  }

  pub fn with_clock(config: NotifierConfig, clock: Arc<dyn Clock>) -> Self {
    let (in_app, _) = broadcast::channel(IN_APP_FEED_CAPACITY);
    let mut channels = Vec::new();
    for kind in &config.channels {
      if channels.iter().any(|c: &Channel| c.kind() == *kind) {
        continue;
      }
      channels.push(match kind {
        ChannelKind::Console => Channel::Console,
        ChannelKind::Email => Channel::Email(EmailChannel {
          recipients: config.email_recipients.clone(),
          outbox:     None,
        }),
        ChannelKind::Webhook => Channel::Webhook(WebhookChannel {
          url:    config.webhook_url.clone(),
          client: reqwest::Client::new(),
        }),
        ChannelKind::InApp => Channel::InApp(in_app.clone()),
      });
    }

    Self {
      config,
      clock,
      channels,
      in_app,
      last_sent: Mutex::new(HashMap::new()),
      history: Mutex::new(VecDeque::new()),
    }
  }

  /// Hand email notifications to `outbox`; the receiver is the mail transport.
  pub fn with_mail_outbox(mut self, outbox: mpsc::UnboundedSender<OutboundMail>) -> Self {
    for channel in &mut self.channels {
      if let Channel::Email(email) = channel {
        email.outbox = Some(outbox.clone());
      }
    }
    self
  }

  pub fn config(&self) -> &NotifierConfig { &self.config }

  /// Receive every notification dispatched to the in-app channel from now on.
  pub fn subscribe_in_app(&self) -> broadcast::Receiver<Notification> {
    self.in_app.subscribe()
  }

  /// Alert operators about `error`. Returns one outcome per channel, or none
  /// when disabled, below the severity threshold, or rate-limited.
  pub async fn notify_error(
    &self,
    error: &ErrorRecord,
    context: Option<&BTreeMap<String, String>>,
  ) -> Vec<ChannelOutcome> {
    let severity = error.severity();
    if severity < self.config.severity_threshold {
      return Vec::new();
    }

    let notification_type = NotificationType::for_error(error.code(), severity);
    let mut merged = error.context().clone();
    merged.extend(context.into_iter().flatten().map(|(k, v)| (k.clone(), v.clone())));

    self
      .emit(Draft {
        notification_type,
        title: format!("{}: {}", notification_type.title(), error.code()),
        message: error.message().to_owned(),
        severity,
        context: merged,
        error: Some(error.clone()),
        subject: error.code().to_string(),
      })
      .await
  }

  pub async fn notify_system_issue(
    &self,
    title: &str,
    message: &str,
    severity: Severity,
    context: Option<&BTreeMap<String, String>>,
  ) -> Vec<ChannelOutcome> {
    self
      .emit(Draft {
        notification_type: NotificationType::SystemFailure,
        title: title.to_owned(),
        message: message.to_owned(),
        severity,
        context: context.cloned().unwrap_or_default(),
        error: None,
        subject: title.to_owned(),
      })
      .await
  }

  /// Always severity `warning`.
  pub async fn notify_performance_issue(
    &self,
    operation: &str,
    duration_ms: u64,
    threshold_ms: u64,
    context: Option<&BTreeMap<String, String>>,
  ) -> Vec<ChannelOutcome> {
    let mut context = context.cloned().unwrap_or_default();
    context.insert("operation".into(), operation.into());
    context.insert("duration_ms".into(), duration_ms.to_string());
    context.insert("threshold_ms".into(), threshold_ms.to_string());

    let title = format!("Slow operation: {operation}");
    self
      .emit(Draft {
        notification_type: NotificationType::PerformanceIssue,
        message: format!(
          "'{operation}' took {duration_ms} ms, above the {threshold_ms} ms threshold"
        ),
        severity: Severity::Warning,
        context,
        error: None,
        subject: title.clone(),
        title,
      })
      .await
  }

  pub async fn notify_configuration_issue(
    &self,
    config_key: &str,
    issue: &str,
    suggestion: Option<&str>,
  ) -> Vec<ChannelOutcome> {
    let mut context = BTreeMap::from([("config_key".to_owned(), config_key.to_owned())]);
    let mut message = format!("configuration '{config_key}': {issue}");
    if let Some(suggestion) = suggestion {
      context.insert("suggestion".into(), suggestion.into());
      message.push_str(&format!("\nsuggestion: {suggestion}"));
    }

    let title = format!("Configuration issue: {config_key}");
    self
      .emit(Draft {
        notification_type: NotificationType::ConfigurationIssue,
        message,
        severity: Severity::Error,
        context,
        error: None,
        subject: title.clone(),
        title,
      })
      .await
  }

  /// Newest first.
  pub fn get_notification_history(&self, limit: Option<usize>) -> Vec<Notification> {
    let history = lock(&self.history);
    let newest_first = history.iter().rev().cloned();
    match limit {
      Some(limit) => newest_first.take(limit).collect(),
      None => newest_first.collect(),
    }
  }

  pub fn get_statistics(&self) -> NotificationStatistics {
    let recent_since = self.clock.now() - TimeDelta::hours(24);
    let history = lock(&self.history);

    let mut by_type = BTreeMap::new();
    let mut by_severity = BTreeMap::new();
    for n in history.iter() {
      *by_type.entry(n.notification_type).or_insert(0) += 1;
      *by_severity.entry(n.severity).or_insert(0) += 1;
    }

    NotificationStatistics {
      total: history.len(),
      by_type,
      by_severity,
      recent: history.iter().filter(|n| n.timestamp >= recent_since).count(),
    }
  }

  pub fn clear_rate_limits(&self) { lock(&self.last_sent).clear(); }

  pub fn clear_history(&self) { lock(&self.history).clear(); }

  async fn emit(&self, draft: Draft) -> Vec<ChannelOutcome> {
    if !self.config.enabled {
      return Vec::new();
    }

    let now = self.clock.now();
    let key = rate_key(draft.notification_type, &draft.subject, &draft.context);
    if !self.try_acquire(key, now) {
      tracing::debug!(
        notification_type = %draft.notification_type,
        subject = %draft.subject,
        "notification suppressed by rate limit"
      );
      return Vec::new();
    }

    let notification = Notification {
      notification_id:   Uuid::new_v4(),
      notification_type: draft.notification_type,
      message:           self.render_message(&draft),
      title:             draft.title,
      severity:          draft.severity,
      context:           draft.context,
      error:             draft.error,
      timestamp:         now,
    };

    {
      let mut history = lock(&self.history);
      history.push_back(notification.clone());
      while history.len() > self.config.max_history {
        history.pop_front();
      }
    }

    let mut outcomes = Vec::with_capacity(self.channels.len());
    for channel in &self.channels {
      let result = channel.send(&notification).await;
      if let Err(err) = &result {
        tracing::warn!(channel = %channel.kind(), error = %err, "notification channel failed");
      }
      outcomes.push(ChannelOutcome {
        channel: channel.kind(),
        success: result.is_ok(),
        error:   result.err().map(|e| e.to_string()),
        sent_at: self.clock.now(),
      });
    }
    outcomes
  }

  /// Check and record the last-sent time in one step.
  fn try_acquire(&self, key: String, now: DateTime<Utc>) -> bool {
    let window = TimeDelta::minutes(i64::from(self.config.rate_limit_minutes));
    let mut last_sent = lock(&self.last_sent);
    if last_sent.get(&key).is_some_and(|at| now - *at < window) {
      return false;
    }
    last_sent.insert(key, now);
    true
  }

  fn render_message(&self, draft: &Draft) -> String {
    let mut message = draft.message.clone();
    if self.config.include_context && !draft.context.is_empty() {
      message.push_str("\n\nContext:");
      for (k, v) in &draft.context {
        message.push_str(&format!("\n  {k}: {v}"));
      }
    }
    if self.config.include_stack_trace {
      let causes = draft.error.as_ref().map(|e| e.cause_chain()).unwrap_or_default();
      if !causes.is_empty() {
        message.push_str("\n\nCaused by:");
        for cause in causes {
          message.push_str(&format!("\n  {cause}"));
        }
      }
    }
    message
  }
}

/// `type:subject:digest`, the digest being the first 16 hex chars of the
/// SHA-256 of the (already sorted) context.
fn rate_key(
  notification_type: NotificationType,
  subject: &str,
  context: &BTreeMap<String, String>,
) -> String {
  let mut hasher = Sha256::new();
  for (k, v) in context {
    hasher.update(k.as_bytes());
    hasher.update(b"=");
    hasher.update(v.as_bytes());
    hasher.update(b"\n");
  }
  let digest = hex::encode(hasher.finalize());
  format!("{notification_type}:{subject}:{}", &digest[..16])
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
