//! Classification-driven retry with exponential backoff.
//!
//! The engine only ever retries. Strategy-specific remediation such as
//! falling back to a default template is reported by
//! [`RecoveryEngine::applicable_strategies`] and carried out by the caller.

use std::{future::Future, sync::Arc, time::Duration};

use missive_core::{Classification, ErrorCode, ErrorRecord};
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::time::Instant;

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
  /// Retries after the first attempt; `0` disables retrying.
  pub max_retries:          u32,
  pub base_delay_ms:        u64,
  /// Values below `1.0` are treated as `1.0`.
  pub backoff_multiplier:   f64,
  pub max_delay_ms:         u64,
  pub enable_auto_recovery: bool,
  /// Codes retried in addition to the temporary set.
  pub retryable_codes:      Vec<ErrorCode>,
}

impl Default for RecoveryConfig {
  fn default() -> Self {
    Self {
      max_retries:          3,
      base_delay_ms:        1000,
      backoff_multiplier:   2.0,
      max_delay_ms:         10_000,
      enable_auto_recovery: true,
      retryable_codes:      Vec::new(),
    }
  }
}

impl RecoveryConfig {
  /// Delay before retry `attempt` (1-based): `base × multiplier^(attempt-1)`,
  /// capped at `max_delay_ms`.
  pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let raw = self.base_delay_ms as f64 * self.backoff_multiplier.max(1.0).powi(exponent);
    let capped = raw.min(self.max_delay_ms as f64);
    Duration::from_millis(capped as u64)
  }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// Named remediation strategies, for diagnostics and the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecoveryStrategy {
  RetryWithBackoff,
  FallbackToDefault,
  UseCachedResult,
  ManualInterventionRequired,
}

/// What happened when an operation ran under the engine.
#[derive(Debug)]
pub struct RecoveryOutcome<T> {
  pub result:            Result<T, ErrorRecord>,
  /// Attempts actually made, including the first.
  pub attempts_used:     u32,
  pub strategy:          RecoveryStrategy,
  pub total_duration_ms: u64,
  /// The last failure seen before a successful retry.
  pub recovered_from:    Option<ErrorRecord>,
}

impl<T> RecoveryOutcome<T> {
  pub fn is_success(&self) -> bool { self.result.is_ok() }

  pub fn error(&self) -> Option<&ErrorRecord> { self.result.as_ref().err() }

  pub fn into_result(self) -> Result<T, ErrorRecord> { self.result }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RecoveryEngine {
  config:         RecoveryConfig,
  classification: Arc<Classification>,
}

impl RecoveryEngine {
  pub fn new(config: RecoveryConfig) -> Self {
    Self::with_classification(config, Arc::new(Classification::default()))
  }

  pub fn with_classification(
    config: RecoveryConfig,
    classification: Arc<Classification>,
  ) -> Self {
    Self { config, classification }
  }

  pub fn config(&self) -> &RecoveryConfig { &self.config }

  /// Whether a failure with this record would be retried.
  pub fn is_retryable(&self, error: &ErrorRecord) -> bool {
    self.config.enable_auto_recovery
      && (self.classification.is_temporary(error.code())
        || self.config.retryable_codes.contains(&error.code()))
  }

  /// Run `operation`, retrying retryable failures with exponential backoff.
  ///
  /// `label` names the operation in logs. Failures of any type are
  /// normalised through `Into<ErrorRecord>` before classification.
  pub async fn execute_with_recovery<T, E, F, Fut>(
    &self,
    label: &str,
    mut operation: F,
  ) -> RecoveryOutcome<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<ErrorRecord>,
  {
    let started = Instant::now();
    let mut attempt: u32 = 1;
    let mut last_error: Option<ErrorRecord> = None;

    loop {
      match operation().await {
        Ok(value) => {
          if attempt > 1 {
            tracing::info!(operation = label, attempts = attempt, "recovered after retry");
          }
          return RecoveryOutcome {
            result:            Ok(value),
            attempts_used:     attempt,
            strategy:          RecoveryStrategy::RetryWithBackoff,
            total_duration_ms: elapsed_ms(started),
            recovered_from:    last_error,
          };
        }
        Err(err) => {
          let err: ErrorRecord = err.into();
          let retries_done = attempt - 1;

          if !self.is_retryable(&err) || retries_done >= self.config.max_retries {
            tracing::warn!(
              operation = label,
              attempts = attempt,
              code = %err.code(),
              error = %err.message(),
              "operation failed; manual intervention required",
            );
            return RecoveryOutcome {
              result:            Err(err),
              attempts_used:     attempt,
              strategy:          RecoveryStrategy::ManualInterventionRequired,
              total_duration_ms: elapsed_ms(started),
              recovered_from:    None,
            };
          }

          let delay = self.config.delay_for_attempt(attempt);
          tracing::debug!(
            operation = label,
            attempt,
            delay_ms = delay.as_millis() as u64,
            code = %err.code(),
            "retrying after temporary failure",
          );
          last_error = Some(err);
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
      }
    }
  }

  /// Remediation strategies that apply to `error`, most preferred first.
  pub fn applicable_strategies(&self, error: &ErrorRecord) -> Vec<RecoveryStrategy> {
    let mut strategies = Vec::new();
    if self.is_retryable(error) {
      strategies.push(RecoveryStrategy::RetryWithBackoff);
    }
    match error.code() {
      ErrorCode::TemplateNotFound | ErrorCode::MappingNotFound => {
        strategies.push(RecoveryStrategy::FallbackToDefault);
      }
      ErrorCode::ConnectionFailed
      | ErrorCode::NetworkError
      | ErrorCode::Timeout
      | ErrorCode::DatabaseError => {
        strategies.push(RecoveryStrategy::UseCachedResult);
      }
      _ => {}
    }
    if strategies.is_empty() {
      strategies.push(RecoveryStrategy::ManualInterventionRequired);
    }
    strategies
  }
}

fn elapsed_ms(started: Instant) -> u64 { started.elapsed().as_millis() as u64 }

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU32, Ordering};

  use strum::IntoEnumIterator;

  use super::*;

  fn fast(max_retries: u32) -> RecoveryEngine {
    RecoveryEngine::new(RecoveryConfig {
      max_retries,
      base_delay_ms: 1,
      max_delay_ms: 2,
      ..RecoveryConfig::default()
    })
  }

  /// Fails with `code` for the first `failures` calls, then succeeds.
  async fn run(engine: &RecoveryEngine, code: ErrorCode, failures: u32) -> (RecoveryOutcome<u32>, u32) {
    let calls = AtomicU32::new(0);
    let outcome = engine
      .execute_with_recovery("test", || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move {
          if n < failures {
            Err(ErrorRecord::new("nope", code))
          } else {
            Ok(n)
          }
        }
      })
      .await;
    (outcome, calls.load(Ordering::SeqCst))
  }

  #[test]
  fn backoff_doubles_then_caps() {
    let config = RecoveryConfig::default();
    let delays: Vec<u64> = (1..=6)
      .map(|n| config.delay_for_attempt(n).as_millis() as u64)
      .collect();
    assert_eq!(delays, [1000, 2000, 4000, 8000, 10_000, 10_000]);
  }

  #[test]
  fn backoff_is_monotonic_and_bounded() {
    let config = RecoveryConfig {
      base_delay_ms: 250,
      backoff_multiplier: 1.7,
      max_delay_ms: 7000,
      ..RecoveryConfig::default()
    };
    let mut previous = Duration::ZERO;
    for attempt in 1..200 {
      let delay = config.delay_for_attempt(attempt);
      assert!(delay >= previous, "attempt {attempt}");
      assert!(delay <= Duration::from_millis(7000), "attempt {attempt}");
      previous = delay;
    }
  }

  #[test]
  fn shrinking_multiplier_is_clamped() {
    let config = RecoveryConfig { backoff_multiplier: 0.5, ..RecoveryConfig::default() };
    assert_eq!(config.delay_for_attempt(3), Duration::from_millis(1000));
  }

  #[tokio::test]
  async fn first_attempt_success_uses_one_attempt() {
    let (outcome, calls) = run(&fast(3), ErrorCode::Timeout, 0).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.attempts_used, 1);
    assert_eq!(outcome.strategy, RecoveryStrategy::RetryWithBackoff);
    assert!(outcome.recovered_from.is_none());
    assert_eq!(calls, 1);
  }

  #[tokio::test]
  async fn temporary_failures_are_retried_until_success() {
    let (outcome, calls) = run(&fast(3), ErrorCode::ConnectionFailed, 2).await;
    assert_eq!(outcome.into_result().unwrap(), 2);
    assert_eq!(calls, 3);
  }

  #[tokio::test]
  async fn retries_stop_at_the_bound() {
    let (outcome, calls) = run(&fast(2), ErrorCode::Timeout, 10).await;
    assert!(!outcome.is_success());
    assert_eq!(outcome.attempts_used, 3);
    assert_eq!(outcome.strategy, RecoveryStrategy::ManualInterventionRequired);
    assert_eq!(outcome.error().unwrap().code(), ErrorCode::Timeout);
    assert_eq!(calls, 3);
  }

  #[tokio::test]
  async fn only_temporary_codes_are_retried() {
    let engine = fast(2);
    for code in ErrorCode::iter() {
      let (outcome, calls) = run(&engine, code, 1).await;
      let temporary = Classification::standard().is_temporary(code);
      assert_eq!(outcome.is_success(), temporary, "{code}");
      assert_eq!(calls, if temporary { 2 } else { 1 }, "{code}");
    }
  }

  #[tokio::test]
  async fn configured_codes_are_retried_too() {
    let engine = RecoveryEngine::new(RecoveryConfig {
      base_delay_ms: 1,
      retryable_codes: vec![ErrorCode::DatabaseError],
      ..RecoveryConfig::default()
    });
    let (outcome, calls) = run(&engine, ErrorCode::DatabaseError, 1).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.attempts_used, 2);
    assert_eq!(outcome.recovered_from.unwrap().code(), ErrorCode::DatabaseError);
    assert_eq!(calls, 2);
  }

  #[tokio::test]
  async fn disabled_auto_recovery_never_retries() {
    let engine = RecoveryEngine::new(RecoveryConfig {
      enable_auto_recovery: false,
      ..RecoveryConfig::default()
    });
    let (outcome, calls) = run(&engine, ErrorCode::ConnectionFailed, 1).await;
    assert!(!outcome.is_success());
    assert_eq!(outcome.attempts_used, 1);
    assert_eq!(calls, 1);
  }

  #[tokio::test]
  async fn foreign_errors_are_wrapped_as_system_errors() {
    #[derive(Debug, thiserror::Error)]
    #[error("socket exploded")]
    struct Foreign;

    impl From<Foreign> for ErrorRecord {
      fn from(err: Foreign) -> Self { ErrorRecord::from_foreign(&err) }
    }

    let outcome: RecoveryOutcome<()> = fast(3)
      .execute_with_recovery("foreign", || async { Err(Foreign) })
      .await;
    assert_eq!(outcome.attempts_used, 1);
    assert_eq!(outcome.error().unwrap().code(), ErrorCode::SystemError);
  }

  #[test]
  fn strategies_by_code() {
    let engine = RecoveryEngine::new(RecoveryConfig::default());
    let of = |code| engine.applicable_strategies(&ErrorRecord::new("x", code));

    assert_eq!(of(ErrorCode::TemplateNotFound), [RecoveryStrategy::FallbackToDefault]);
    assert_eq!(of(ErrorCode::ConnectionFailed), [
      RecoveryStrategy::RetryWithBackoff,
      RecoveryStrategy::UseCachedResult,
    ]);
    assert_eq!(of(ErrorCode::FallbackChainExhausted), [
      RecoveryStrategy::ManualInterventionRequired
    ]);
  }
}
