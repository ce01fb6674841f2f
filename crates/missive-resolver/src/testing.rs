//! Test doubles shared by the unit tests in this crate.

use std::sync::{
  Mutex,
  atomic::{AtomicU32, Ordering},
};

use chrono::{DateTime, Duration as TimeDelta, Utc};
use missive_core::{
  ErrorCode, ErrorRecord,
  clock::Clock,
  store::TemplateStore,
  template::{FormKind, Mapping, MappingView, Modality, NewMapping, NewTemplate, Template},
};
use missive_store_sqlite::SqliteStore;
use uuid::Uuid;

/// A clock that only moves when told to.
pub struct ManualClock {
  now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
  fn default() -> Self { Self { now: Mutex::new(Utc::now()) } }
}

impl ManualClock {
  pub fn advance(&self, by: TimeDelta) {
    *self.now.lock().unwrap() += by;
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> { *self.now.lock().unwrap() }
}

/// Wraps a [`SqliteStore`] and fails the next `n` calls with a chosen code.
pub struct FlakyStore {
  inner:    SqliteStore,
  failures: AtomicU32,
  code:     Mutex<ErrorCode>,
  calls:    AtomicU32,
}

impl FlakyStore {
  pub async fn new() -> Self {
    Self {
      inner:    SqliteStore::open_in_memory().await.expect("in-memory store"),
      failures: AtomicU32::new(0),
      code:     Mutex::new(ErrorCode::ConnectionFailed),
      calls:    AtomicU32::new(0),
    }
  }

  /// Fail the next `n` store calls with `code`.
  pub fn fail_next(&self, n: u32, code: ErrorCode) {
    *self.code.lock().unwrap() = code;
    self.failures.store(n, Ordering::SeqCst);
  }

  /// Store calls made so far, failed ones included.
  pub fn calls(&self) -> u32 { self.calls.load(Ordering::SeqCst) }

  fn check(&self) -> Result<(), ErrorRecord> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let injected = self
      .failures
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if injected {
      Err(ErrorRecord::new("injected failure", *self.code.lock().unwrap()))
    } else {
      Ok(())
    }
  }
}

fn inner(err: missive_store_sqlite::Error) -> ErrorRecord { err.into() }

impl TemplateStore for FlakyStore {
  type Error = ErrorRecord;

  async fn get_active_template_by_mapping(
    &self,
    form_kind: &FormKind,
    modality: Option<&Modality>,
  ) -> Result<Option<Template>, ErrorRecord> {
    self.check()?;
    self
      .inner
      .get_active_template_by_mapping(form_kind, modality)
      .await
      .map_err(inner)
  }

  async fn get_template_by_id(&self, id: Uuid) -> Result<Option<Template>, ErrorRecord> {
    self.check()?;
    self.inner.get_template_by_id(id).await.map_err(inner)
  }

  async fn list_active_templates_for_form(
    &self,
    form_kind: &FormKind,
  ) -> Result<Vec<Template>, ErrorRecord> {
    self.check()?;
    self.inner.list_active_templates_for_form(form_kind).await.map_err(inner)
  }

  async fn insert_template(&self, input: NewTemplate) -> Result<Template, ErrorRecord> {
    self.check()?;
    self.inner.insert_template(input).await.map_err(inner)
  }

  async fn set_template_active(&self, id: Uuid, active: bool) -> Result<bool, ErrorRecord> {
    self.check()?;
    self.inner.set_template_active(id, active).await.map_err(inner)
  }

  async fn list_mappings(&self) -> Result<Vec<MappingView>, ErrorRecord> {
    self.check()?;
    self.inner.list_mappings().await.map_err(inner)
  }

  async fn insert_mapping(&self, input: NewMapping) -> Result<Mapping, ErrorRecord> {
    self.check()?;
    self.inner.insert_mapping(input).await.map_err(inner)
  }

  async fn update_mapping(
    &self,
    id: Uuid,
    input: NewMapping,
  ) -> Result<Option<Mapping>, ErrorRecord> {
    self.check()?;
    self.inner.update_mapping(id, input).await.map_err(inner)
  }
}
