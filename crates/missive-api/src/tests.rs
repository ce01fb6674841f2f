//! Router tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use missive_core::{
  store::TemplateStore,
  template::{FormKind, NewTemplate, Template},
};
use missive_resolver::{
  AdminNotifier, AuditConfig, AuditLog, FallbackConfig, NotifierConfig, RecoveryConfig,
  RecoveryEngine, TemplateResolver,
};
use missive_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::{Shared, api_router};

async fn resolver(config: FallbackConfig) -> Shared<SqliteStore> {
  let store = SqliteStore::open_in_memory().await.unwrap();
  Arc::new(TemplateResolver::new(
    Arc::new(store),
    config,
    RecoveryEngine::new(RecoveryConfig { base_delay_ms: 1, ..RecoveryConfig::default() }),
    Arc::new(AuditLog::new(AuditConfig::default())),
    Arc::new(AdminNotifier::new(NotifierConfig::default())),
  ))
}

async fn template(r: &Shared<SqliteStore>, name: &str) -> Template {
  r.store()
    .insert_template(NewTemplate::new(name, FormKind::new("quote")))
    .await
    .unwrap()
}

async fn send(router: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(json) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(json.to_string())
    }
    None => Body::empty(),
  };
  let resp = router.oneshot(builder.body(body).unwrap()).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
    .await
    .unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, value)
}

#[tokio::test]
async fn create_mapping_then_resolve() {
  let r = resolver(FallbackConfig::default()).await;
  let t = template(&r, "hosted quote").await;

  let (status, created) = send(
    api_router(r.clone()),
    "POST",
    "/mappings",
    Some(json!({ "form_kind": "quote", "modality": "hosted", "template_id": t.template_id })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(created["form_kind"], "quote");

  let (status, result) =
    send(api_router(r.clone()), "GET", "/resolve?form_kind=quote&modality=hosted", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(result["fallback_type"], "specific");
  assert_eq!(result["template"]["name"], "hosted quote");
  assert_eq!(result["is_default"], false);

  let (status, views) = send(api_router(r), "GET", "/mappings", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(views[0]["template_name"], "hosted quote");
}

#[tokio::test]
async fn duplicate_mapping_is_a_conflict() {
  let r = resolver(FallbackConfig::default()).await;
  let t = template(&r, "A").await;
  let body = json!({ "form_kind": "quote", "modality": "hosted", "template_id": t.template_id });

  send(api_router(r.clone()), "POST", "/mappings", Some(body.clone())).await;
  let (status, err) = send(api_router(r.clone()), "POST", "/mappings", Some(body)).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(err["code"], "DUPLICATE_MAPPING");

  let (_, validation) = send(
    api_router(r),
    "GET",
    "/mappings/validate?form_kind=quote&modality=hosted",
    None,
  )
  .await;
  assert_eq!(validation["unique"], false);
}

#[tokio::test]
async fn unknown_template_reference_is_unprocessable() {
  let r = resolver(FallbackConfig::default()).await;
  let (status, err) = send(
    api_router(r),
    "POST",
    "/mappings",
    Some(json!({ "form_kind": "quote", "template_id": uuid::Uuid::new_v4() })),
  )
  .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(err["code"], "INVALID_TEMPLATE");
}

#[tokio::test]
async fn exact_lookup_without_mapping_is_not_found() {
  let r = resolver(FallbackConfig::default()).await;
  let (status, err) = send(api_router(r), "GET", "/mappings/lookup?form_kind=quote", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(err["code"], "TEMPLATE_NOT_FOUND");
}

#[tokio::test]
async fn exhausted_chain_is_a_server_error_when_configured() {
  let r = resolver(FallbackConfig {
    fail_when_no_template_found: true,
    ..FallbackConfig::default()
  })
  .await;
  let (status, err) = send(api_router(r.clone()), "GET", "/resolve?form_kind=quote", None).await;
  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
  assert_eq!(err["code"], "FALLBACK_CHAIN_EXHAUSTED");

  let (_, history) = send(api_router(r), "GET", "/notifications?limit=5", None).await;
  assert_eq!(history.as_array().unwrap().len(), 1);
  assert_eq!(history[0]["type"], "critical_error");
}

#[tokio::test]
async fn configuration_endpoints_round_trip() {
  let r = resolver(FallbackConfig::default()).await;
  let t = template(&r, "default").await;

  let (status, config) = send(
    api_router(r.clone()),
    "PUT",
    "/config/defaults/quote",
    Some(json!({ "template_id": t.template_id })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(config["default_templates"]["quote"], t.template_id.to_string());

  let (_, result) = send(api_router(r.clone()), "GET", "/resolve?form_kind=quote&modality=hosted", None).await;
  assert_eq!(result["fallback_type"], "configured_default");

  let (status, config) = send(
    api_router(r.clone()),
    "PUT",
    "/config/fallback",
    Some(json!({ "fail_when_no_template_found": true })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(config["fail_when_no_template_found"], true);
  assert_eq!(config["use_any_active_template_as_fallback"], true);

  let (_, config) = send(api_router(r.clone()), "DELETE", "/config/defaults/quote", None).await;
  assert_eq!(config["default_templates"], json!({}));

  let (status, err) = send(
    api_router(r),
    "PUT",
    "/config/global-fallback",
    Some(json!({ "template_id": uuid::Uuid::new_v4() })),
  )
  .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(err["code"], "INVALID_TEMPLATE");
}

#[tokio::test]
async fn audit_endpoints_report_resolutions() {
  let r = resolver(FallbackConfig::default()).await;
  send(api_router(r.clone()), "GET", "/resolve?form_kind=quote", None).await;

  let (status, logs) = send(
    api_router(r.clone()),
    "GET",
    "/audit/logs?operation=template_search&result=warning",
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(logs.as_array().unwrap().len(), 1);
  assert_eq!(logs[0]["details"]["found"], false);

  let (status, stats) = send(api_router(r.clone()), "GET", "/audit/stats?timeframe_hours=1", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(stats["total_entries"], 1);
  assert_eq!(stats["warning_rate"], 100.0);

  let (status, _) = send(api_router(r), "GET", "/audit/stats?timeframe_hours=0", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}
