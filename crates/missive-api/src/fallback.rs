//! Handlers for `/config` endpoints.
//!
//! Every handler returns the fallback configuration as it stands afterwards.
//! Setting a template that does not exist or is inactive is a 422.

use axum::{
  Json,
  extract::{Path, State},
};
use missive_core::{factory, store::TemplateStore, template::FormKind};
use missive_resolver::{FallbackConfig, FallbackConfigPatch};
use serde::Deserialize;
use uuid::Uuid;

use crate::{Shared, error::Result};

#[derive(Debug, Deserialize)]
pub struct DefaultBody {
  pub template_id: Uuid,
}

/// `PUT /config/defaults/{form_kind}` — body: `{"template_id":"..."}`
pub async fn set_default<S: TemplateStore>(
  State(resolver): State<Shared<S>>,
  Path(form_kind): Path<FormKind>,
  Json(body): Json<DefaultBody>,
) -> Result<Json<FallbackConfig>> {
  if !resolver.set_default_template(&form_kind, body.template_id).await? {
    return Err(factory::invalid_template(body.template_id, "template is missing or inactive").into());
  }
  Ok(Json(resolver.get_fallback_config()))
}

/// `DELETE /config/defaults/{form_kind}`
pub async fn clear_default<S: TemplateStore>(
  State(resolver): State<Shared<S>>,
  Path(form_kind): Path<FormKind>,
) -> Json<FallbackConfig> {
  resolver.clear_default_template(&form_kind);
  Json(resolver.get_fallback_config())
}

#[derive(Debug, Deserialize)]
pub struct GlobalBody {
  /// `null` clears the global fallback.
  pub template_id: Option<Uuid>,
}

/// `PUT /config/global-fallback` — body: `{"template_id":"..."}` or `{"template_id":null}`
pub async fn set_global<S: TemplateStore>(
  State(resolver): State<Shared<S>>,
  Json(body): Json<GlobalBody>,
) -> Result<Json<FallbackConfig>> {
  if !resolver.set_global_fallback_template(body.template_id).await? {
    let id = body.template_id.unwrap_or_default();
    return Err(factory::invalid_template(id, "template is missing or inactive").into());
  }
  Ok(Json(resolver.get_fallback_config()))
}

/// `GET /config/fallback`
pub async fn get_config<S: TemplateStore>(
  State(resolver): State<Shared<S>>,
) -> Json<FallbackConfig> {
  Json(resolver.get_fallback_config())
}

/// `PUT /config/fallback` — body: any subset of the behaviour toggles
pub async fn update_config<S: TemplateStore>(
  State(resolver): State<Shared<S>>,
  Json(patch): Json<FallbackConfigPatch>,
) -> Json<FallbackConfig> {
  Json(resolver.update_fallback_config(&patch))
}
