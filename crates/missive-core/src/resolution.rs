//! The outcome of a template resolution.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::template::Template;

/// Which level of the fallback chain produced the template, in chain order.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FallbackType {
  /// Exact `(form_kind, modality)` mapping.
  Specific,
  /// Operator-set default template for the form kind.
  ConfiguredDefault,
  /// Mapping with no modality for the form kind.
  FormDefault,
  /// Any active template tagged with the form kind.
  AnyActive,
  /// Operator-set template used regardless of form kind.
  GlobalFallback,
  /// Nothing found.
  None,
}

/// Produced fresh for every resolution; logged, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
  pub template:        Option<Template>,
  pub mapping_found:   bool,
  /// `true` whenever the template did not come from an exact mapping.
  pub is_default:      bool,
  pub fallback_type:   FallbackType,
  pub fallback_reason: String,
}

impl ResolutionResult {
  pub fn specific(template: Template) -> Self {
    Self {
      template:        Some(template),
      mapping_found:   true,
      is_default:      false,
      fallback_type:   FallbackType::Specific,
      fallback_reason: "exact mapping found".to_owned(),
    }
  }

  pub fn fallback(
    template: Template,
    fallback_type: FallbackType,
    reason: impl Into<String>,
  ) -> Self {
    Self {
      template: Some(template),
      mapping_found: false,
      is_default: true,
      fallback_type,
      fallback_reason: reason.into(),
    }
  }

  pub fn none(reason: impl Into<String>) -> Self {
    Self {
      template:        None,
      mapping_found:   false,
      is_default:      true,
      fallback_type:   FallbackType::None,
      fallback_reason: reason.into(),
    }
  }

  pub fn template_id(&self) -> Option<uuid::Uuid> {
    self.template.as_ref().map(|t| t.template_id)
  }
}
