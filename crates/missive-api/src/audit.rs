//! Handlers for `/audit` endpoints.
//!
//! Query params for `/audit/logs` map directly to [`LogFilter`] fields.

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::Duration as TimeDelta;
use missive_core::store::TemplateStore;
use missive_resolver::audit::{AuditEntry, AuditStatistics, LogFilter};
use serde::Deserialize;

use crate::{Shared, error::{ApiError, Result}};

/// `GET /audit/logs[?operation=...][&result=...][&entity_type=...][&since=...][&until=...][&limit=...]`
pub async fn logs<S: TemplateStore>(
  State(resolver): State<Shared<S>>,
  Query(filter): Query<LogFilter>,
) -> Json<Vec<AuditEntry>> {
  Json(resolver.audit().get_logs(&filter))
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
  /// Only aggregate over the trailing window; everything when absent.
  pub timeframe_hours: Option<i64>,
}

/// `GET /audit/stats[?timeframe_hours=<n>]`
pub async fn stats<S: TemplateStore>(
  State(resolver): State<Shared<S>>,
  Query(params): Query<StatsParams>,
) -> Result<Json<AuditStatistics>> {
  let timeframe = match params.timeframe_hours {
    Some(hours) if hours <= 0 => {
      return Err(ApiError::BadRequest("timeframe_hours must be positive".into()));
    }
    Some(hours) => Some(
      TimeDelta::try_hours(hours)
        .ok_or_else(|| ApiError::BadRequest("timeframe_hours out of range".into()))?,
    ),
    None => None,
  };
  Ok(Json(resolver.audit().get_statistics(timeframe)))
}
