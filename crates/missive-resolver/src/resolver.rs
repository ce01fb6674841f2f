//! The fallback-chain template resolver.
//!
//! Resolution walks `specific → configured_default → form_default →
//! any_active → global_fallback → none` and stops at the first active
//! template. Each store call runs under the [`RecoveryEngine`]; a level whose
//! store call still fails is recorded as attempted and skipped, and the
//! result is then treated as degraded and not cached.

use std::{
  collections::BTreeMap,
  future::Future,
  sync::{Arc, PoisonError, RwLock, RwLockWriteGuard},
};

use missive_core::{
  ErrorRecord, factory,
  resolution::{FallbackType, ResolutionResult},
  store::TemplateStore,
  template::{FormKind, Mapping, MappingView, Modality, NewMapping, Template, modality_label},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::{sync::Mutex as AsyncMutex, time::Instant};
use uuid::Uuid;

use crate::{
  audit::{AuditLog, AuditResult, OperationRecord, TemplateSearch},
  cache::ResolutionCache,
  notify::AdminNotifier,
  recovery::{RecoveryEngine, RecoveryOutcome},
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
  /// Per-form default template, checked after the exact mapping.
  pub default_templates:                   BTreeMap<FormKind, Uuid>,
  pub global_fallback_template:            Option<Uuid>,
  pub use_any_active_template_as_fallback: bool,
  /// Surface an empty chain as `FALLBACK_CHAIN_EXHAUSTED` instead of `none`.
  pub fail_when_no_template_found:         bool,
  pub enable_logging:                      bool,
  pub log_fallback_usage:                  bool,
  pub log_not_found:                       bool,
  /// Resolutions slower than this raise a performance notification.
  pub slow_resolution_ms:                  u64,
}

impl Default for FallbackConfig {
  fn default() -> Self {
    Self {
      default_templates:                   BTreeMap::new(),
      global_fallback_template:            None,
      use_any_active_template_as_fallback: true,
      fail_when_no_template_found:         false,
      enable_logging:                      true,
      log_fallback_usage:                  true,
      log_not_found:                       true,
      slow_resolution_ms:                  2000,
    }
  }
}

/// Partial update of the behaviour toggles. Template ids are changed through
/// [`TemplateResolver::set_default_template`] and
/// [`TemplateResolver::set_global_fallback_template`], which validate them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfigPatch {
  pub use_any_active_template_as_fallback: Option<bool>,
  pub fail_when_no_template_found:         Option<bool>,
  pub enable_logging:                      Option<bool>,
  pub log_fallback_usage:                  Option<bool>,
  pub log_not_found:                       Option<bool>,
  pub slow_resolution_ms:                  Option<u64>,
}

impl FallbackConfigPatch {
  fn apply(&self, config: &mut FallbackConfig) -> Map<String, Value> {
    let mut changed = Map::new();
    macro_rules! set {
      ($field:ident) => {
        if let Some(value) = self.$field {
          config.$field = value;
          changed.insert(stringify!($field).to_owned(), value.into());
        }
      };
    }
    set!(use_any_active_template_as_fallback);
    set!(fail_when_no_template_found);
    set!(enable_logging);
    set!(log_fallback_usage);
    set!(log_not_found);
    set!(slow_resolution_ms);
    changed
  }
}

// ─── Resolver ────────────────────────────────────────────────────────────────

pub struct TemplateResolver<S> {
  store:          Arc<S>,
  recovery:       RecoveryEngine,
  audit:          Arc<AuditLog>,
  notifier:       Arc<AdminNotifier>,
  config:         RwLock<FallbackConfig>,
  cache:          ResolutionCache,
  /// Held across the uniqueness check and the store write of a mapping.
  mapping_writes: AsyncMutex<()>,
}

/// Outcome of one chain level's store lookup.
struct Level {
  template: Option<Template>,
  failed:   bool,
}

impl<S: TemplateStore> TemplateResolver<S> {
  pub fn new(
    store: Arc<S>,
    config: FallbackConfig,
    recovery: RecoveryEngine,
    audit: Arc<AuditLog>,
    notifier: Arc<AdminNotifier>,
  ) -> Self {
    Self {
      store,
      recovery,
      audit,
      notifier,
      config: RwLock::new(config),
      cache: ResolutionCache::default(),
      mapping_writes: AsyncMutex::new(()),
    }
  }

  pub fn with_cache(mut self, cache: ResolutionCache) -> Self {
    self.cache = cache;
    self
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn audit(&self) -> &Arc<AuditLog> { &self.audit }

  pub fn notifier(&self) -> &Arc<AdminNotifier> { &self.notifier }

  // ── Resolution ────────────────────────────────────────────────────────

  /// Resolve the template for `(form_kind, modality)` through the fallback
  /// chain. Errors only when the chain is exhausted and
  /// `fail_when_no_template_found` is set.
  pub async fn find_with_fallback(
    &self,
    form_kind: &FormKind,
    modality: Option<&Modality>,
  ) -> Result<ResolutionResult, ErrorRecord> {
    let started = Instant::now();
    // Must precede the config snapshot.
    let generation = self.cache.generation();
    let config = self.config_snapshot();

    if let Some(hit) = self.cache.get(form_kind, modality) {
      if config.enable_logging {
        self.audit.log_template_search(TemplateSearch {
          form_kind,
          modality,
          found: hit.template.is_some(),
          template_id: hit.template_id(),
          fallback_type: Some(hit.fallback_type),
          duration_ms: Some(elapsed_ms(started)),
          cached: true,
        });
      }
      self.log_fallback(&config, form_kind, modality, &hit);
      return Ok(hit);
    }

    let mut attempted = Vec::new();
    let (result, degraded) = self
      .walk_chain(form_kind, modality, &config, &mut attempted)
      .await;
    let duration_ms = elapsed_ms(started);

    tracing::debug!(
      form_kind = %form_kind,
      modality = modality_label(modality),
      fallback_type = %result.fallback_type,
      template_id = ?result.template_id(),
      duration_ms,
      degraded,
      "template resolved"
    );

    let found = result.template.is_some();
    if config.enable_logging && (found || config.log_not_found) {
      self.audit.log_template_search(TemplateSearch {
        form_kind,
        modality,
        found,
        template_id: result.template_id(),
        fallback_type: Some(result.fallback_type),
        duration_ms: Some(duration_ms),
        cached: false,
      });
    }
    self.log_fallback(&config, form_kind, modality, &result);

    if duration_ms > config.slow_resolution_ms {
      let context = lookup_context("find_with_fallback", form_kind, modality);
      self
        .notifier
        .notify_performance_issue(
          "find_with_fallback",
          duration_ms,
          config.slow_resolution_ms,
          Some(&context),
        )
        .await;
    }

    if !found {
      if config.fail_when_no_template_found {
        let err = factory::fallback_chain_exhausted(form_kind, modality, &attempted);
        tracing::error!(
          form_kind = %form_kind,
          modality = modality_label(modality),
          "fallback chain exhausted"
        );
        self.notifier.notify_error(&err, None).await;
        return Err(err);
      }
    } else if !degraded && !self.cache.insert(generation, form_kind, modality, result.clone()) {
      tracing::debug!(form_kind = %form_kind, "cache cleared during resolution; result not cached");
    }
    Ok(result)
  }

  fn log_fallback(
    &self,
    config: &FallbackConfig,
    form_kind: &FormKind,
    modality: Option<&Modality>,
    result: &ResolutionResult,
  ) {
    if !(config.enable_logging && config.log_fallback_usage && result.is_default) {
      return;
    }
    if let Some(template) = &result.template {
      self.audit.log_fallback_usage(
        form_kind,
        modality,
        result.fallback_type,
        template.template_id,
        &template.name,
        &result.fallback_reason,
      );
    }
  }

  /// Returns the result and whether any level's store call failed.
  async fn walk_chain(
    &self,
    form_kind: &FormKind,
    modality: Option<&Modality>,
    config: &FallbackConfig,
    attempted: &mut Vec<FallbackType>,
  ) -> (ResolutionResult, bool) {
    let mut degraded = false;
    let label = modality_label(modality);

    // specific
    attempted.push(FallbackType::Specific);
    let level = self.mapped(form_kind, modality).await;
    degraded |= level.failed;
    if let Some(t) = level.template {
      return (ResolutionResult::specific(t), degraded);
    }

    // configured_default
    if let Some(&id) = config.default_templates.get(form_kind) {
      attempted.push(FallbackType::ConfiguredDefault);
      let level = self.active_by_id(id, form_kind, modality).await;
      degraded |= level.failed;
      match level.template {
        Some(t) => {
          let reason = format!("no mapping for '{form_kind}'/'{label}'; using configured default");
          return (ResolutionResult::fallback(t, FallbackType::ConfiguredDefault, reason), degraded);
        }
        None if !level.failed => {
          self
            .notifier
            .notify_configuration_issue(
              &format!("default_templates.{form_kind}"),
              &format!("configured default template {id} is missing or inactive"),
              Some("set a new default template or clear it"),
            )
            .await;
        }
        None => {}
      }
    }

    // form_default; with no modality the specific lookup already covered it
    if modality.is_some() {
      attempted.push(FallbackType::FormDefault);
      let level = self.mapped(form_kind, None).await;
      degraded |= level.failed;
      if let Some(t) = level.template {
        let reason = format!("no mapping for '{form_kind}'/'{label}'; using form-level mapping");
        return (ResolutionResult::fallback(t, FallbackType::FormDefault, reason), degraded);
      }
    }

    // any_active
    if config.use_any_active_template_as_fallback {
      attempted.push(FallbackType::AnyActive);
      let context = lookup_context("list_active_templates_for_form", form_kind, modality);
      let store = &self.store;
      match self
        .call("list_active_templates_for_form", &context, move || {
          store.list_active_templates_for_form(form_kind)
        })
        .await
      {
        Ok(templates) => {
          if let Some(t) = templates.into_iter().next() {
            let reason = format!("no mapping for '{form_kind}'; using first active template of the form");
            return (ResolutionResult::fallback(t, FallbackType::AnyActive, reason), degraded);
          }
        }
        Err(_) => degraded = true,
      }
    }

    // global_fallback
    if let Some(id) = config.global_fallback_template {
      attempted.push(FallbackType::GlobalFallback);
      let level = self.active_by_id(id, form_kind, modality).await;
      degraded |= level.failed;
      match level.template {
        Some(t) => {
          let reason = "nothing found for the form kind; using global fallback template";
          return (ResolutionResult::fallback(t, FallbackType::GlobalFallback, reason), degraded);
        }
        None if !level.failed => {
          self
            .notifier
            .notify_configuration_issue(
              "global_fallback_template",
              &format!("global fallback template {id} is missing or inactive"),
              Some("set a new global fallback template or clear it"),
            )
            .await;
        }
        None => {}
      }
    }

    let levels: Vec<String> = attempted.iter().map(ToString::to_string).collect();
    let reason = format!("no template found after trying: {}", levels.join(", "));
    (ResolutionResult::none(reason), degraded)
  }

  async fn mapped(&self, form_kind: &FormKind, modality: Option<&Modality>) -> Level {
    let context = lookup_context("get_active_template_by_mapping", form_kind, modality);
    let store = &self.store;
    match self
      .call("get_active_template_by_mapping", &context, move || {
        store.get_active_template_by_mapping(form_kind, modality)
      })
      .await
    {
      Ok(template) => Level { template, failed: false },
      Err(_) => Level { template: None, failed: true },
    }
  }

  async fn active_by_id(
    &self,
    id: Uuid,
    form_kind: &FormKind,
    modality: Option<&Modality>,
  ) -> Level {
    let mut context = lookup_context("get_template_by_id", form_kind, modality);
    context.insert("template_id".into(), id.to_string());
    let store = &self.store;
    match self
      .call("get_template_by_id", &context, move || store.get_template_by_id(id))
      .await
    {
      Ok(template) => Level {
        template: template.filter(|t| t.is_active),
        failed:   false,
      },
      Err(_) => Level { template: None, failed: true },
    }
  }

  /// Exact mapping lookup only; no fallback.
  pub async fn find_by_mapping(
    &self,
    form_kind: &FormKind,
    modality: Option<&Modality>,
  ) -> Result<Option<Template>, ErrorRecord> {
    let context = lookup_context("find_by_mapping", form_kind, modality);
    let store = &self.store;
    self
      .call("find_by_mapping", &context, move || {
        store.get_active_template_by_mapping(form_kind, modality)
      })
      .await
  }

  // ── Mappings ──────────────────────────────────────────────────────────

  /// `false` if another active mapping exists for the same concrete pair.
  /// Form-level (`None` modality) mappings never collide.
  pub async fn validate_uniqueness(
    &self,
    form_kind: &FormKind,
    modality: Option<&Modality>,
    exclude_id: Option<Uuid>,
  ) -> Result<bool, ErrorRecord> {
    Ok(self.find_collision(form_kind, modality, exclude_id).await?.is_none())
  }

  async fn find_collision(
    &self,
    form_kind: &FormKind,
    modality: Option<&Modality>,
    exclude_id: Option<Uuid>,
  ) -> Result<Option<Uuid>, ErrorRecord> {
    let Some(modality) = modality else {
      return Ok(None);
    };
    let mappings = self.get_mappings_list().await?;
    Ok(
      mappings
        .iter()
        .find(|v| {
          v.is_active()
            && v.mapping.form_kind == *form_kind
            && v.mapping.modality.as_ref() == Some(modality)
            && exclude_id.is_none_or(|id| id != v.mapping.mapping_id)
        })
        .map(|v| v.mapping.mapping_id),
    )
  }

  pub async fn get_mappings_list(&self) -> Result<Vec<MappingView>, ErrorRecord> {
    let context = BTreeMap::from([("operation".to_owned(), "list_mappings".to_owned())]);
    let store = &self.store;
    self
      .call("list_mappings", &context, move || store.list_mappings())
      .await
  }

  /// Validate and persist a new mapping.
  pub async fn create_mapping(&self, input: NewMapping) -> Result<Mapping, ErrorRecord> {
    let _guard = self.mapping_writes.lock().await;
    self.check_mapping(&input, None, "mapping_create").await?;

    let context = lookup_context("insert_mapping", &input.form_kind, input.modality.as_ref());
    let store = &self.store;
    let payload = input.clone();
    let mapping = self
      .call("insert_mapping", &context, move || store.insert_mapping(payload.clone()))
      .await?;

    self.audit.log_operation(
      mapping_record("mapping_create", AuditResult::Success, &input).entity_id(mapping.mapping_id),
    );
    self.cache.clear();
    tracing::info!(mapping_id = %mapping.mapping_id, form_kind = %mapping.form_kind, "mapping created");
    Ok(mapping)
  }

  /// Validate and replace mapping `id`; the mapping itself is exempt from the
  /// uniqueness check.
  pub async fn update_mapping(&self, id: Uuid, input: NewMapping) -> Result<Mapping, ErrorRecord> {
    let _guard = self.mapping_writes.lock().await;
    self.check_mapping(&input, Some(id), "mapping_update").await?;

    let context = lookup_context("update_mapping", &input.form_kind, input.modality.as_ref());
    let store = &self.store;
    let payload = input.clone();
    let updated = self
      .call("update_mapping", &context, move || store.update_mapping(id, payload.clone()))
      .await?;
    let Some(mapping) = updated else {
      return Err(self.reject("mapping_update", &input, factory::mapping_not_found(id)));
    };

    self.audit.log_operation(
      mapping_record("mapping_update", AuditResult::Success, &input).entity_id(id),
    );
    self.cache.clear();
    tracing::info!(mapping_id = %id, form_kind = %mapping.form_kind, "mapping updated");
    Ok(mapping)
  }

  async fn check_mapping(
    &self,
    input: &NewMapping,
    exclude_id: Option<Uuid>,
    operation: &str,
  ) -> Result<(), ErrorRecord> {
    if input.form_kind.as_str().trim().is_empty() {
      let err = factory::validation_failed("form_kind", "must not be empty");
      return Err(self.reject(operation, input, err));
    }
    if input.modality.as_ref().is_some_and(|m| m.as_str().trim().is_empty()) {
      let err = factory::validation_failed("modality", "must be omitted or non-empty");
      return Err(self.reject(operation, input, err));
    }

    match self.fetch_template(input.template_id).await? {
      None => {
        let err = factory::invalid_template(input.template_id, "template does not exist");
        return Err(self.reject(operation, input, err));
      }
      Some(t) if !t.is_active => {
        let err = factory::invalid_template(input.template_id, "template is inactive");
        return Err(self.reject(operation, input, err));
      }
      Some(_) => {}
    }

    let modality = input.modality.as_ref();
    if let Some(existing) = self.find_collision(&input.form_kind, modality, exclude_id).await? {
      let err = factory::duplicate_mapping(&input.form_kind, modality, existing);
      return Err(self.reject(operation, input, err));
    }
    Ok(())
  }

  /// Audit an operator-visible rejection as a warning. Never escalated.
  fn reject(&self, operation: &str, input: &NewMapping, err: ErrorRecord) -> ErrorRecord {
    self.audit.log_operation(
      mapping_record(operation, AuditResult::Warning, input)
        .detail("code", err.code().to_string())
        .error(err.clone()),
    );
    err
  }

  // ── Configuration ─────────────────────────────────────────────────────

  /// Set the default template for `form_kind`. `Ok(false)` if the template
  /// does not exist or is inactive.
  pub async fn set_default_template(
    &self,
    form_kind: &FormKind,
    template_id: Uuid,
  ) -> Result<bool, ErrorRecord> {
    let key = format!("default_templates.{form_kind}");
    if !self.template_usable(template_id, &key).await? {
      return Ok(false);
    }
    self
      .write_config()
      .default_templates
      .insert(form_kind.clone(), template_id);
    self.config_changed(&key, template_id.to_string().into());
    Ok(true)
  }

  /// Returns whether a default was set.
  pub fn clear_default_template(&self, form_kind: &FormKind) -> bool {
    let removed = self.write_config().default_templates.remove(form_kind).is_some();
    if removed {
      self.config_changed(&format!("default_templates.{form_kind}"), Value::Null);
    }
    removed
  }

  /// Set, or with `None` clear, the global fallback template. `Ok(false)` if
  /// the template does not exist or is inactive.
  pub async fn set_global_fallback_template(
    &self,
    template_id: Option<Uuid>,
  ) -> Result<bool, ErrorRecord> {
    const KEY: &str = "global_fallback_template";
    if let Some(id) = template_id {
      if !self.template_usable(id, KEY).await? {
        return Ok(false);
      }
    }
    self.write_config().global_fallback_template = template_id;
    self.config_changed(KEY, template_id.map(|id| id.to_string()).into());
    Ok(true)
  }

  pub fn get_fallback_config(&self) -> FallbackConfig { self.config_snapshot() }

  pub fn update_fallback_config(&self, patch: &FallbackConfigPatch) -> FallbackConfig {
    let (changed, config) = {
      let mut config = self.write_config();
      let changed = patch.apply(&mut config);
      (changed, config.clone())
    };
    if !changed.is_empty() {
      let mut record =
        OperationRecord::new("config_update", "fallback_config", AuditResult::Success);
      record.details = changed;
      self.audit.log_operation(record);
      self.cache.clear();
    }
    config
  }

  pub fn invalidate_cache(&self) {
    self.cache.clear();
    tracing::debug!("resolution cache cleared");
  }

  async fn template_usable(&self, id: Uuid, key: &str) -> Result<bool, ErrorRecord> {
    let usable = self.fetch_template(id).await?.is_some_and(|t| t.is_active);
    if !usable {
      self.audit.log_operation(
        OperationRecord::new("config_update", "fallback_config", AuditResult::Warning)
          .entity_id(id)
          .detail("key", key)
          .detail("reason", "template missing or inactive"),
      );
    }
    Ok(usable)
  }

  fn config_changed(&self, key: &str, value: Value) {
    self.audit.log_operation(
      OperationRecord::new("config_update", "fallback_config", AuditResult::Success)
        .detail("key", key)
        .detail("value", value),
    );
    self.cache.clear();
    tracing::info!(key, "fallback configuration updated");
  }

  // ── Store access ──────────────────────────────────────────────────────

  async fn fetch_template(&self, id: Uuid) -> Result<Option<Template>, ErrorRecord> {
    let context = BTreeMap::from([
      ("operation".to_owned(), "get_template_by_id".to_owned()),
      ("template_id".to_owned(), id.to_string()),
    ]);
    let store = &self.store;
    self
      .call("get_template_by_id", &context, move || store.get_template_by_id(id))
      .await
  }

  /// Run a store call under the recovery engine and record what happened.
  async fn call<T, F, Fut>(
    &self,
    label: &str,
    context: &BTreeMap<String, String>,
    operation: F,
  ) -> Result<T, ErrorRecord>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, S::Error>>,
  {
    let outcome = self.recovery.execute_with_recovery(label, operation).await;
    self.report(label, context, &outcome).await;
    outcome.into_result()
  }

  async fn report<T>(
    &self,
    label: &str,
    context: &BTreeMap<String, String>,
    outcome: &RecoveryOutcome<T>,
  ) {
    let details = || {
      let mut details = Map::new();
      details.insert("operation".into(), label.into());
      details.insert("attempts_used".into(), outcome.attempts_used.into());
      details.insert("total_duration_ms".into(), outcome.total_duration_ms.into());
      Some(details)
    };

    match &outcome.result {
      Ok(_) => {
        if let Some(previous) = &outcome.recovered_from {
          self.audit.log_error_recovery(
            previous,
            outcome.attempts_used,
            outcome.strategy,
            true,
            details(),
          );
        }
      }
      Err(err) => {
        self.audit.log_error_recovery(
          err,
          outcome.attempts_used,
          outcome.strategy,
          false,
          details(),
        );
        self.audit.log_error(label, err, context);
        tracing::error!(
          operation = label,
          code = %err.code(),
          attempts = outcome.attempts_used,
          error = %err.message(),
          "store call failed"
        );
        if err.requires_admin_notification() {
          self.notifier.notify_error(err, Some(context)).await;
        }
      }
    }
  }

  fn config_snapshot(&self) -> FallbackConfig {
    self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
  }

  fn write_config(&self) -> RwLockWriteGuard<'_, FallbackConfig> {
    self.config.write().unwrap_or_else(PoisonError::into_inner)
  }
}

fn lookup_context(
  operation: &str,
  form_kind: &FormKind,
  modality: Option<&Modality>,
) -> BTreeMap<String, String> {
  BTreeMap::from([
    ("operation".to_owned(), operation.to_owned()),
    ("form_kind".to_owned(), form_kind.to_string()),
    ("modality".to_owned(), modality_label(modality).to_owned()),
  ])
}

fn mapping_record(operation: &str, result: AuditResult, input: &NewMapping) -> OperationRecord {
  OperationRecord::new(operation, "mapping", result)
    .detail("form_kind", input.form_kind.as_str())
    .detail("modality", modality_label(input.modality.as_ref()))
    .detail("template_id", input.template_id.to_string())
}

fn elapsed_ms(started: Instant) -> u64 { started.elapsed().as_millis() as u64 }
