//! The `TemplateStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `missive-store-sqlite`).
//! The resolver depends on this abstraction, not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  error::ErrorRecord,
  template::{FormKind, Mapping, MappingView, Modality, NewMapping, NewTemplate, Template},
};

/// Abstraction over the persistent store holding templates and mappings.
///
/// Every backend error converts into an [`ErrorRecord`] so callers can
/// classify it before deciding whether to retry.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait TemplateStore: Send + Sync {
  type Error: std::error::Error + Into<ErrorRecord> + Send + Sync + 'static;

  // ── Templates ─────────────────────────────────────────────────────────

  /// The active template behind the mapping for exactly
  /// `(form_kind, modality)`. `modality = None` matches only form-level
  /// mappings, not every modality.
  fn get_active_template_by_mapping<'a>(
    &'a self,
    form_kind: &'a FormKind,
    modality: Option<&'a Modality>,
  ) -> impl Future<Output = Result<Option<Template>, Self::Error>> + Send + 'a;

  /// Retrieve a template by id regardless of whether it is active.
  fn get_template_by_id(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Template>, Self::Error>> + Send + '_;

  /// All active templates tagged with `form_kind`, oldest first.
  fn list_active_templates_for_form<'a>(
    &'a self,
    form_kind: &'a FormKind,
  ) -> impl Future<Output = Result<Vec<Template>, Self::Error>> + Send + 'a;

  fn insert_template(
    &self,
    input: NewTemplate,
  ) -> impl Future<Output = Result<Template, Self::Error>> + Send + '_;

  /// Activate or retire a template. Returns `false` if it does not exist.
  fn set_template_active(
    &self,
    id: Uuid,
    active: bool,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Mappings ──────────────────────────────────────────────────────────

  /// Every mapping, joined with its template's name and active flag.
  fn list_mappings(
    &self,
  ) -> impl Future<Output = Result<Vec<MappingView>, Self::Error>> + Send + '_;

  /// Persist a new mapping. Uniqueness is the caller's responsibility.
  fn insert_mapping(
    &self,
    input: NewMapping,
  ) -> impl Future<Output = Result<Mapping, Self::Error>> + Send + '_;

  /// Replace the mapping with id `id`. Returns `None` if it does not exist.
  fn update_mapping(
    &self,
    id: Uuid,
    input: NewMapping,
  ) -> impl Future<Output = Result<Option<Mapping>, Self::Error>> + Send + '_;
}
