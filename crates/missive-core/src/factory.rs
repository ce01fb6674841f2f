//! Named constructors for recurring failures.
//!
//! Call sites use these instead of building messages by hand so wording,
//! codes and context keys stay consistent across crates.

use serde_json::json;
use uuid::Uuid;

use crate::{
  error::{ErrorCode, ErrorRecord},
  resolution::FallbackType,
  template::{FormKind, Modality, modality_label},
};

pub fn duplicate_mapping(
  form_kind: &FormKind,
  modality: Option<&Modality>,
  existing_mapping_id: Uuid,
) -> ErrorRecord {
  ErrorRecord::new(
    format!(
      "an active mapping already exists for form kind '{form_kind}' and modality '{}'",
      modality_label(modality),
    ),
    ErrorCode::DuplicateMapping,
  )
  .with_context("form_kind", form_kind.as_str())
  .with_context("modality", modality_label(modality))
  .with_context("existing_mapping_id", existing_mapping_id.to_string())
}

pub fn template_not_found_by_id(template_id: Uuid) -> ErrorRecord {
  ErrorRecord::new(
    format!("template {template_id} not found"),
    ErrorCode::TemplateNotFound,
  )
  .with_context("template_id", template_id.to_string())
}

pub fn template_not_found_for(
  form_kind: &FormKind,
  modality: Option<&Modality>,
) -> ErrorRecord {
  ErrorRecord::new(
    format!(
      "no active template mapped for form kind '{form_kind}' and modality '{}'",
      modality_label(modality),
    ),
    ErrorCode::TemplateNotFound,
  )
  .with_context("form_kind", form_kind.as_str())
  .with_context("modality", modality_label(modality))
}

pub fn mapping_not_found(mapping_id: Uuid) -> ErrorRecord {
  ErrorRecord::new(
    format!("mapping {mapping_id} not found"),
    ErrorCode::MappingNotFound,
  )
  .with_context("mapping_id", mapping_id.to_string())
}

/// Wrap a lower-level store failure, keeping its cause chain.
pub fn data_store_error(
  operation: &str,
  cause: &(dyn std::error::Error + 'static),
) -> ErrorRecord {
  ErrorRecord::new(
    format!("data store error during {operation}: {cause}"),
    ErrorCode::DatabaseError,
  )
  .with_context("operation", operation)
  .with_cause(cause)
}

pub fn fallback_chain_exhausted(
  form_kind: &FormKind,
  modality: Option<&Modality>,
  attempted: &[FallbackType],
) -> ErrorRecord {
  let levels: Vec<String> = attempted.iter().map(ToString::to_string).collect();
  ErrorRecord::new(
    format!(
      "no template found for form kind '{form_kind}' and modality '{}' after trying: {}",
      modality_label(modality),
      levels.join(", "),
    ),
    ErrorCode::FallbackChainExhausted,
  )
  .with_details(json!({ "attempted_levels": levels }))
  .with_context("form_kind", form_kind.as_str())
  .with_context("modality", modality_label(modality))
}

pub fn validation_failed(field: &str, reason: &str) -> ErrorRecord {
  ErrorRecord::new(
    format!("validation failed for {field}: {reason}"),
    ErrorCode::ValidationFailed,
  )
  .with_context("field", field)
}

pub fn invalid_template(template_id: Uuid, reason: &str) -> ErrorRecord {
  ErrorRecord::new(
    format!("template {template_id} cannot be used: {reason}"),
    ErrorCode::InvalidTemplate,
  )
  .with_context("template_id", template_id.to_string())
}

pub fn invalid_configuration(key: &str, issue: &str) -> ErrorRecord {
  ErrorRecord::new(
    format!("invalid configuration for {key}: {issue}"),
    ErrorCode::InvalidConfiguration,
  )
  .with_context("config_key", key)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Severity;

  #[test]
  fn exhausted_lists_attempted_levels() {
    let err = fallback_chain_exhausted(
      &FormKind::new("quote"),
      Some(&Modality::new("hosted")),
      &[FallbackType::Specific, FallbackType::FormDefault],
    );
    assert_eq!(err.code(), ErrorCode::FallbackChainExhausted);
    assert_eq!(
      err.details()["attempted_levels"],
      json!(["specific", "form_default"])
    );
    assert!(err.message().contains("specific, form_default"));
    assert_eq!(err.severity(), Severity::Critical);
  }

  #[test]
  fn null_modality_is_labelled_all() {
    let err = template_not_found_for(&FormKind::new("quote"), None);
    assert_eq!(err.context()["modality"], "all");
    assert_eq!(err.severity(), Severity::Warning);
  }

  #[test]
  fn data_store_error_keeps_cause() {
    let cause = std::io::Error::other("socket closed");
    let err = data_store_error("list_mappings", &cause);
    assert_eq!(err.code(), ErrorCode::DatabaseError);
    assert_eq!(err.cause_chain(), ["socket closed".to_string()]);
    assert_eq!(err.context()["operation"], "list_mappings");
  }

  #[test]
  fn duplicate_mapping_names_existing_row() {
    let id = Uuid::new_v4();
    let err = duplicate_mapping(&FormKind::new("quote"), Some(&Modality::new("cloud")), id);
    assert_eq!(err.code(), ErrorCode::DuplicateMapping);
    assert_eq!(err.context()["existing_mapping_id"], id.to_string());
    assert!(!err.requires_admin_notification());
  }
}
