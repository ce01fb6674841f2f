//! Error taxonomy: normalised, classified failure records.
//!
//! Every failure inside missive is converted to an [`ErrorRecord`] carrying a
//! fixed [`ErrorCode`] before any retry, logging or alerting decision is made.
//! Classification is a pure function of the code against the four sets held
//! by a [`Classification`]; a code may sit in several sets at once.

use std::{
  collections::{BTreeMap, HashSet},
  sync::LazyLock,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

// ─── Codes ───────────────────────────────────────────────────────────────────

/// The fixed set of failure codes known to missive.
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
  EnumString,
  EnumIter,
  IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
  /// A second active mapping for an identical `(form_kind, modality)` pair.
  DuplicateMapping,
  TemplateNotFound,
  MappingNotFound,
  /// A reference to a template that does not exist or is inactive.
  InvalidTemplate,
  ValidationFailed,
  InvalidConfiguration,
  DatabaseError,
  ConnectionFailed,
  Timeout,
  NetworkError,
  /// Every level of the fallback chain came up empty.
  FallbackChainExhausted,
  /// Any failure that carried no classification of its own.
  SystemError,
}

/// Derived severity, ordered from least to most severe.
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
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
  Warning,
  Error,
  Critical,
}

// ─── Classification ──────────────────────────────────────────────────────────

/// The four membership sets that drive every policy decision.
///
/// Built once and never mutated; share it by reference or behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Classification {
  temporary:        HashSet<ErrorCode>,
  admin_notifiable: HashSet<ErrorCode>,
  critical:         HashSet<ErrorCode>,
  warning:          HashSet<ErrorCode>,
}

static STANDARD: LazyLock<Classification> = LazyLock::new(Classification::default);

impl Classification {
  pub fn new(
    temporary: impl IntoIterator<Item = ErrorCode>,
    admin_notifiable: impl IntoIterator<Item = ErrorCode>,
    critical: impl IntoIterator<Item = ErrorCode>,
    warning: impl IntoIterator<Item = ErrorCode>,
  ) -> Self {
    Self {
      temporary:        temporary.into_iter().collect(),
      admin_notifiable: admin_notifiable.into_iter().collect(),
      critical:         critical.into_iter().collect(),
      warning:          warning.into_iter().collect(),
    }
  }

  /// The process-wide standard classification.
  pub fn standard() -> &'static Self { &STANDARD }

  pub fn is_temporary(&self, code: ErrorCode) -> bool {
    self.temporary.contains(&code)
  }

  pub fn requires_admin_notification(&self, code: ErrorCode) -> bool {
    self.admin_notifiable.contains(&code)
  }

  /// Critical membership wins over warning membership; anything in neither
  /// set is an `Error`.
  pub fn severity(&self, code: ErrorCode) -> Severity {
    if self.critical.contains(&code) {
      Severity::Critical
    } else if self.warning.contains(&code) {
      Severity::Warning
    } else {
      Severity::Error
    }
  }
}

impl Default for Classification {
  fn default() -> Self {
    use ErrorCode::*;
    Self::new(
      [ConnectionFailed, Timeout, NetworkError],
      [
        ConnectionFailed,
        SystemError,
        FallbackChainExhausted,
        DatabaseError,
        InvalidConfiguration,
      ],
      [ConnectionFailed, SystemError, FallbackChainExhausted],
      [
        TemplateNotFound,
        MappingNotFound,
        ValidationFailed,
        DuplicateMapping,
        InvalidTemplate,
      ],
    )
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// The normalised representation of any failure in missive.
///
/// Immutable once built: the `with_*` builders consume the record and are
/// meant for construction sites only.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ErrorRecord {
  message:     String,
  code:        ErrorCode,
  timestamp:   DateTime<Utc>,
  #[serde(default)]
  details:     serde_json::Value,
  #[serde(default)]
  context:     BTreeMap<String, String>,
  /// Rendered `source()` chain of the lower-level error, outermost first.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  cause_chain: Vec<String>,
}

impl ErrorRecord {
  /// Build a record with a fresh timestamp and no details or context.
  pub fn new(message: impl Into<String>, code: ErrorCode) -> Self {
    Self {
      message: message.into(),
      code,
      timestamp: Utc::now(),
      details: serde_json::Value::Null,
      context: BTreeMap::new(),
      cause_chain: Vec::new(),
    }
  }

  /// Wrap an error that carries no classification as a `SYSTEM_ERROR`.
  pub fn from_foreign(err: &(dyn std::error::Error + 'static)) -> Self {
    Self::new(err.to_string(), ErrorCode::SystemError).with_cause(err)
  }

  pub fn with_details(mut self, details: serde_json::Value) -> Self {
    self.details = details;
    self
  }

  pub fn with_context(
    mut self,
    key: impl Into<String>,
    value: impl Into<String>,
  ) -> Self {
    self.context.insert(key.into(), value.into());
    self
  }

  pub fn with_context_map(mut self, context: BTreeMap<String, String>) -> Self {
    self.context.extend(context);
    self
  }

  /// Record `cause` and its whole `source()` chain.
  pub fn with_cause(mut self, cause: &(dyn std::error::Error + 'static)) -> Self {
    let mut next = Some(cause);
    while let Some(err) = next {
      self.cause_chain.push(err.to_string());
      next = err.source();
    }
    self
  }

  pub fn message(&self) -> &str { &self.message }

  pub fn code(&self) -> ErrorCode { self.code }

  pub fn timestamp(&self) -> DateTime<Utc> { self.timestamp }

  pub fn details(&self) -> &serde_json::Value { &self.details }

  pub fn context(&self) -> &BTreeMap<String, String> { &self.context }

  pub fn cause_chain(&self) -> &[String] { &self.cause_chain }

  pub fn is_temporary(&self) -> bool {
    Classification::standard().is_temporary(self.code)
  }

  pub fn requires_admin_notification(&self) -> bool {
    Classification::standard().requires_admin_notification(self.code)
  }

  pub fn severity(&self) -> Severity {
    Classification::standard().severity(self.code)
  }

  /// A flat, fully serialisable view including the derived classification.
  pub fn to_log_object(&self) -> ErrorLogObject {
    ErrorLogObject {
      message:                     self.message.clone(),
      code:                        self.code,
      severity:                    self.severity(),
      is_temporary:                self.is_temporary(),
      requires_admin_notification: self.requires_admin_notification(),
      timestamp:                   self.timestamp,
      details:                     self.details.clone(),
      context:                     self.context.clone(),
      cause_chain:                 self.cause_chain.clone(),
    }
  }
}

/// See [`ErrorRecord::to_log_object`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogObject {
  pub message:                     String,
  pub code:                        ErrorCode,
  pub severity:                    Severity,
  pub is_temporary:                bool,
  pub requires_admin_notification: bool,
  pub timestamp:                   DateTime<Utc>,
  pub details:                     serde_json::Value,
  pub context:                     BTreeMap<String, String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub cause_chain:                 Vec<String>,
}
