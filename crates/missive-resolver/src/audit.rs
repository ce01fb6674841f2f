//! Append-only, size-bounded, queryable audit trail.
//!
//! Entries are kept in memory, oldest first. Appending evicts the oldest
//! entries beyond `max_log_entries` and everything older than
//! `retention_days`, under the same lock as the append.

use std::{
  collections::{BTreeMap, VecDeque},
  sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Duration as TimeDelta, Utc};
use missive_core::{
  ErrorCode, ErrorRecord,
  clock::{Clock, SystemClock},
  resolution::FallbackType,
  template::{FormKind, Modality, modality_label},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::Display;
use uuid::Uuid;

use crate::recovery::RecoveryStrategy;

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
  pub enabled:         bool,
  /// Mirror every entry as a `tracing` event under `missive::audit`.
  pub console_echo:    bool,
  pub max_log_entries: usize,
  pub retention_days:  u32,
}

impl Default for AuditConfig {
  fn default() -> Self {
    Self {
      enabled:         true,
      console_echo:    false,
      max_log_entries: 1000,
      retention_days:  30,
    }
  }
}

// ─── Entries ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AuditResult {
  Success,
  Warning,
  Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
  pub entry_id:    Uuid,
  pub timestamp:   DateTime<Utc>,
  pub operation:   String,
  pub entity_type: String,
  pub details:     Map<String, Value>,
  pub result:      AuditResult,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub entity_id:   Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub user_id:     Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration_ms: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error:       Option<ErrorRecord>,
}

/// Input to [`AuditLog::log_operation`].
#[derive(Debug, Clone)]
pub struct OperationRecord {
  pub operation:   String,
  pub entity_type: String,
  pub details:     Map<String, Value>,
  pub result:      AuditResult,
  pub entity_id:   Option<String>,
  pub user_id:     Option<String>,
  pub duration_ms: Option<u64>,
  pub error:       Option<ErrorRecord>,
}

impl OperationRecord {
  pub fn new(
    operation: impl Into<String>,
    entity_type: impl Into<String>,
    result: AuditResult,
  ) -> Self {
    Self {
      operation: operation.into(),
      entity_type: entity_type.into(),
      details: Map::new(),
      result,
      entity_id: None,
      user_id: None,
      duration_ms: None,
      error: None,
    }
  }

  pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
    self.details.insert(key.to_owned(), value.into());
    self
  }

  pub fn entity_id(mut self, id: impl ToString) -> Self {
    self.entity_id = Some(id.to_string());
    self
  }

  pub fn user_id(mut self, user: Option<&str>) -> Self {
    self.user_id = user.map(str::to_owned);
    self
  }

  pub fn duration_ms(mut self, ms: u64) -> Self {
    self.duration_ms = Some(ms);
    self
  }

  pub fn error(mut self, error: ErrorRecord) -> Self {
    self.error = Some(error);
    self
  }
}

/// Input to [`AuditLog::log_template_search`].
#[derive(Debug, Clone)]
pub struct TemplateSearch<'a> {
  pub form_kind:     &'a FormKind,
  pub modality:      Option<&'a Modality>,
  pub found:         bool,
  pub template_id:   Option<Uuid>,
  /// `None` or `Some(Specific)` means no fallback was needed.
  pub fallback_type: Option<FallbackType>,
  pub duration_ms:   Option<u64>,
  pub cached:        bool,
}

// ─── Queries ─────────────────────────────────────────────────────────────────

/// Filter for [`AuditLog::get_logs`]. Every set field must match.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogFilter {
  pub operation:   Option<String>,
  pub result:      Option<AuditResult>,
  pub entity_type: Option<String>,
  pub since:       Option<DateTime<Utc>>,
  pub until:       Option<DateTime<Utc>>,
  pub limit:       Option<usize>,
}

impl LogFilter {
  fn matches(&self, entry: &AuditEntry) -> bool {
    self.operation.as_ref().is_none_or(|op| *op == entry.operation)
      && self.result.is_none_or(|r| r == entry.result)
      && self.entity_type.as_ref().is_none_or(|t| *t == entry.entity_type)
      && self.since.is_none_or(|since| entry.timestamp >= since)
      && self.until.is_none_or(|until| entry.timestamp <= until)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditStatistics {
  pub total_entries:       usize,
  /// Percentages in `0.0..=100.0`.
  pub success_rate:        f64,
  pub error_rate:          f64,
  pub warning_rate:        f64,
  pub operations:          BTreeMap<String, usize>,
  pub error_codes:         BTreeMap<ErrorCode, usize>,
  /// Mean over entries that recorded a duration.
  pub average_duration_ms: Option<f64>,
}

// ─── Log ─────────────────────────────────────────────────────────────────────

pub struct AuditLog {
  config:  AuditConfig,
  clock:   Arc<dyn Clock>,
  entries: Mutex<VecDeque<AuditEntry>>,
}

impl AuditLog {
  pub fn new(config: AuditConfig) -> Self {
    Self::with_clock(config, Arc::new(SystemClock))
  }

  pub fn with_clock(config: AuditConfig, clock: Arc<dyn Clock>) -> Self {
    Self { config, clock, entries: Mutex::new(VecDeque::new()) }
  }

  pub fn config(&self) -> &AuditConfig { &self.config }

  pub fn len(&self) -> usize { self.lock().len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Append an entry. A no-op while the log is disabled.
  pub fn log_operation(&self, record: OperationRecord) {
    if !self.config.enabled {
      return;
    }

    let entry = AuditEntry {
      entry_id:    Uuid::new_v4(),
      timestamp:   self.clock.now(),
      operation:   record.operation,
      entity_type: record.entity_type,
      details:     record.details,
      result:      record.result,
      entity_id:   record.entity_id,
      user_id:     record.user_id,
      duration_ms: record.duration_ms,
      error:       record.error,
    };

    if self.config.console_echo {
      echo(&entry);
    }

    let cutoff = self.retention_cutoff();
    let mut entries = self.lock();
    entries.push_back(entry);
    while entries.len() > self.config.max_log_entries {
      entries.pop_front();
    }
    while entries.front().is_some_and(|e| e.timestamp < cutoff) {
      entries.pop_front();
    }
  }

  /// `success` for a direct hit, `warning` for a fallback hit or a miss.
  pub fn log_template_search(&self, search: TemplateSearch<'_>) {
    let fallback_used = search
      .fallback_type
      .is_some_and(|t| t != FallbackType::Specific);
    let result = if search.found && !fallback_used {
      AuditResult::Success
    } else {
      AuditResult::Warning
    };

    let mut record = OperationRecord::new("template_search", "template", result)
      .detail("form_kind", search.form_kind.as_str())
      .detail("modality", modality_label(search.modality))
      .detail("found", search.found)
      .detail("fallback_used", fallback_used)
      .detail("cached", search.cached);
    if let Some(t) = search.fallback_type {
      record = record.detail("fallback_type", t.to_string());
    }
    if let Some(id) = search.template_id {
      record = record.entity_id(id);
    }
    if let Some(ms) = search.duration_ms {
      record = record.duration_ms(ms);
    }
    self.log_operation(record);
  }

  /// Always a `warning`.
  pub fn log_fallback_usage(
    &self,
    form_kind: &FormKind,
    modality: Option<&Modality>,
    fallback_type: FallbackType,
    template_id: Uuid,
    template_name: &str,
    reason: &str,
  ) {
    self.log_operation(
      OperationRecord::new("fallback_used", "template", AuditResult::Warning)
        .entity_id(template_id)
        .detail("form_kind", form_kind.as_str())
        .detail("modality", modality_label(modality))
        .detail("fallback_type", fallback_type.to_string())
        .detail("template_name", template_name)
        .detail("reason", reason),
    );
  }

  /// Always a `failure`. `error.context` and `extra_context` are merged into
  /// the details, `extra_context` winning on conflicts.
  pub fn log_error(
    &self,
    operation: &str,
    error: &ErrorRecord,
    extra_context: &BTreeMap<String, String>,
  ) {
    let mut record = OperationRecord::new(operation, "error", AuditResult::Failure)
      .detail("code", error.code().to_string())
      .detail("message", error.message());
    for (k, v) in error.context().iter().chain(extra_context) {
      record = record.detail(k, v.as_str());
    }
    self.log_operation(record.error(error.clone()));
  }

  pub fn log_error_recovery(
    &self,
    original_error: &ErrorRecord,
    attempt: u32,
    strategy: RecoveryStrategy,
    succeeded: bool,
    details: Option<Map<String, Value>>,
  ) {
    let (operation, result) = if succeeded {
      ("error_recovery_success", AuditResult::Success)
    } else {
      ("error_recovery_failed", AuditResult::Failure)
    };
    let mut record = OperationRecord::new(operation, "error_recovery", result)
      .detail("original_code", original_error.code().to_string())
      .detail("attempt", attempt)
      .detail("strategy", strategy.to_string())
      .error(original_error.clone());
    record.details.extend(details.unwrap_or_default());
    self.log_operation(record);
  }

  /// Matching entries, newest first.
  pub fn get_logs(&self, filter: &LogFilter) -> Vec<AuditEntry> {
    let entries = self.lock();
    let matching = entries.iter().rev().filter(|e| filter.matches(e)).cloned();
    match filter.limit {
      Some(limit) => matching.take(limit).collect(),
      None => matching.collect(),
    }
  }

  /// Aggregate over all entries, or over the trailing `timeframe` only.
  pub fn get_statistics(&self, timeframe: Option<TimeDelta>) -> AuditStatistics {
    let since = timeframe.map(|window| self.clock.now() - window);
    let entries = self.lock();
    let window: Vec<&AuditEntry> = entries
      .iter()
      .filter(|e| since.is_none_or(|since| e.timestamp >= since))
      .collect();

    let total = window.len();
    let count = |result: AuditResult| window.iter().filter(|e| e.result == result).count();
    let rate = |n: usize| if total == 0 { 0.0 } else { n as f64 * 100.0 / total as f64 };

    let mut operations = BTreeMap::new();
    let mut error_codes = BTreeMap::new();
    for entry in &window {
      *operations.entry(entry.operation.clone()).or_insert(0) += 1;
      if let Some(err) = &entry.error {
        *error_codes.entry(err.code()).or_insert(0) += 1;
      }
    }

    let durations: Vec<u64> = window.iter().filter_map(|e| e.duration_ms).collect();
    let average_duration_ms = (!durations.is_empty())
      .then(|| durations.iter().sum::<u64>() as f64 / durations.len() as f64);

    AuditStatistics {
      total_entries: total,
      success_rate: rate(count(AuditResult::Success)),
      error_rate: rate(count(AuditResult::Failure)),
      warning_rate: rate(count(AuditResult::Warning)),
      operations,
      error_codes,
      average_duration_ms,
    }
  }

  /// Drop entries older than `retention_days`; returns how many went.
  pub fn cleanup_expired(&self) -> usize {
    let cutoff = self.retention_cutoff();
    let mut entries = self.lock();
    let before = entries.len();
    entries.retain(|e| e.timestamp >= cutoff);
    before - entries.len()
  }

  pub fn clear(&self) { self.lock().clear(); }

  fn retention_cutoff(&self) -> DateTime<Utc> {
    self.clock.now() - TimeDelta::days(i64::from(self.config.retention_days))
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<AuditEntry>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

fn echo(entry: &AuditEntry) {
  let details = Value::Object(entry.details.clone());
  match entry.result {
    AuditResult::Success => tracing::info!(
      target: "missive::audit",
      operation = %entry.operation,
      entity_type = %entry.entity_type,
      %details,
      "audit entry",
    ),
    AuditResult::Warning => tracing::warn!(
      target: "missive::audit",
      operation = %entry.operation,
      entity_type = %entry.entity_type,
      %details,
      "audit entry",
    ),
    AuditResult::Failure => tracing::error!(
      target: "missive::audit",
      operation = %entry.operation,
      entity_type = %entry.entity_type,
      error = entry.error.as_ref().map(|e| e.message()),
      %details,
      "audit entry",
    ),
  }
}
