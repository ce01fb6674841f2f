//! Handlers for the approval workflow's lookups.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/resolve` | `?form_kind=...[&modality=...]`; walks the fallback chain |
//! | `GET`  | `/mappings/lookup` | Same params; exact mapping only, 404 if none |

use axum::{
  Json,
  extract::{Query, State},
};
use missive_core::{
  factory,
  resolution::ResolutionResult,
  store::TemplateStore,
  template::{FormKind, Modality, Template},
};
use serde::Deserialize;

use crate::{Shared, error::Result};

#[derive(Debug, Deserialize)]
pub struct LookupParams {
  pub form_kind: FormKind,
  /// Absent or empty means "all modalities".
  pub modality:  Option<Modality>,
}

impl LookupParams {
  pub fn modality(&self) -> Option<&Modality> {
    self.modality.as_ref().filter(|m| !m.as_str().is_empty())
  }
}

/// `GET /resolve?form_kind=<kind>[&modality=<modality>]`
pub async fn resolve<S: TemplateStore>(
  State(resolver): State<Shared<S>>,
  Query(params): Query<LookupParams>,
) -> Result<Json<ResolutionResult>> {
  let result = resolver
    .find_with_fallback(&params.form_kind, params.modality())
    .await?;
  Ok(Json(result))
}

/// `GET /mappings/lookup?form_kind=<kind>[&modality=<modality>]`
pub async fn lookup<S: TemplateStore>(
  State(resolver): State<Shared<S>>,
  Query(params): Query<LookupParams>,
) -> Result<Json<Template>> {
  let template = resolver
    .find_by_mapping(&params.form_kind, params.modality())
    .await?
    .ok_or_else(|| factory::template_not_found_for(&params.form_kind, params.modality()))?;
  Ok(Json(template))
}
