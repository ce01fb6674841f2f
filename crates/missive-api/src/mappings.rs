//! Handlers for `/mappings` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/mappings` | Every mapping with its template's name and active flag |
//! | `POST` | `/mappings` | Body: [`NewMapping`]; returns 201, 409 on a duplicate |
//! | `PUT`  | `/mappings/{id}` | Body: [`NewMapping`]; 404 if the mapping is unknown |
//! | `GET`  | `/mappings/validate` | `?form_kind&modality[&exclude_id]` → `{"unique": bool}` |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use missive_core::{
  store::TemplateStore,
  template::{FormKind, Mapping, MappingView, Modality, NewMapping},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Shared, error::Result};

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /mappings`
pub async fn list<S: TemplateStore>(
  State(resolver): State<Shared<S>>,
) -> Result<Json<Vec<MappingView>>> {
  Ok(Json(resolver.get_mappings_list().await?))
}

// ─── Create / update ──────────────────────────────────────────────────────────

/// `POST /mappings` — body: `{"form_kind":"quote","modality":"hosted","template_id":"..."}`
pub async fn create<S: TemplateStore>(
  State(resolver): State<Shared<S>>,
  Json(body): Json<NewMapping>,
) -> Result<impl IntoResponse> {
  let mapping = resolver.create_mapping(body).await?;
  Ok((StatusCode::CREATED, Json(mapping)))
}

/// `PUT /mappings/{id}`
pub async fn update<S: TemplateStore>(
  State(resolver): State<Shared<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<NewMapping>,
) -> Result<Json<Mapping>> {
  Ok(Json(resolver.update_mapping(id, body).await?))
}

// ─── Validate ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ValidateParams {
  pub form_kind:  FormKind,
  pub modality:   Option<Modality>,
  /// The mapping being edited, exempt from the check.
  pub exclude_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
  pub unique: bool,
}

/// `GET /mappings/validate?form_kind=<kind>[&modality=<modality>][&exclude_id=<id>]`
pub async fn validate<S: TemplateStore>(
  State(resolver): State<Shared<S>>,
  Query(params): Query<ValidateParams>,
) -> Result<Json<ValidateResponse>> {
  let modality = params.modality.as_ref().filter(|m| !m.as_str().is_empty());
  let unique = resolver
    .validate_uniqueness(&params.form_kind, modality, params.exclude_id)
    .await?;
  Ok(Json(ValidateResponse { unique }))
}
