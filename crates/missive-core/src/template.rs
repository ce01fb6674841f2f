//! Templates, the mappings that select them, and the keys mappings use.
//!
//! A mapping ties a `(form_kind, modality)` pair to a template. A mapping is
//! considered active while its template is active; retiring a mapping means
//! deactivating the template, never deleting the mapping row.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Keys ────────────────────────────────────────────────────────────────────

/// The business form category a mapping applies to (e.g. a product line).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormKind(String);

impl FormKind {
  pub fn new(kind: impl Into<String>) -> Self { Self(kind.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for FormKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for FormKind {
  fn from(s: &str) -> Self { Self::new(s) }
}

/// The deployment mode a mapping applies to (e.g. on-premise or hosted).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Modality(String);

impl Modality {
  pub fn new(modality: impl Into<String>) -> Self { Self(modality.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Modality {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for Modality {
  fn from(s: &str) -> Self { Self::new(s) }
}

/// Render an optional modality the way logs and messages show it.
pub fn modality_label(modality: Option<&Modality>) -> &str {
  modality.map(Modality::as_str).unwrap_or("all")
}

// ─── Templates ───────────────────────────────────────────────────────────────

/// A message template as held by the store. Rendering is somebody else's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
  pub template_id: Uuid,
  pub name:        String,
  /// The form kind this template is tagged with.
  pub form_kind:   FormKind,
  pub subject:     String,
  pub body:        String,
  pub is_active:   bool,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

/// Input to [`TemplateStore::insert_template`](crate::store::TemplateStore::insert_template).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTemplate {
  pub name:      String,
  pub form_kind: FormKind,
  #[serde(default)]
  pub subject:   String,
  #[serde(default)]
  pub body:      String,
  #[serde(default = "default_active")]
  pub is_active: bool,
}

fn default_active() -> bool { true }

impl NewTemplate {
  /// An active template with an empty subject and body.
  pub fn new(name: impl Into<String>, form_kind: FormKind) -> Self {
    Self {
      name: name.into(),
      form_kind,
      subject: String::new(),
      body: String::new(),
      is_active: true,
    }
  }

  pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
    self.subject = subject.into();
    self
  }

  pub fn with_body(mut self, body: impl Into<String>) -> Self {
    self.body = body.into();
    self
  }
}

// ─── Mappings ────────────────────────────────────────────────────────────────

/// `(form_kind, modality) → template_id`.
///
/// `modality = None` is a form-level default that applies to every modality
/// of `form_kind`. Such mappings are exempt from the uniqueness rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
  pub mapping_id:  Uuid,
  pub form_kind:   FormKind,
  pub modality:    Option<Modality>,
  pub template_id: Uuid,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

/// Input for creating or replacing a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMapping {
  pub form_kind:   FormKind,
  #[serde(default)]
  pub modality:    Option<Modality>,
  pub template_id: Uuid,
}

/// A mapping joined with the template it points at, for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingView {
  #[serde(flatten)]
  pub mapping:         Mapping,
  pub template_name:   String,
  pub template_active: bool,
}

impl MappingView {
  pub fn is_active(&self) -> bool { self.template_active }
}
