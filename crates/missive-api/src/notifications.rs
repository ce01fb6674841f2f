//! Handlers for `/notifications` endpoints.

use axum::{
  Json,
  extract::{Query, State},
};
use missive_core::store::TemplateStore;
use missive_resolver::notify::{Notification, NotificationStatistics};
use serde::Deserialize;

use crate::Shared;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  pub limit: Option<usize>,
}

/// `GET /notifications[?limit=<n>]` — newest first
pub async fn history<S: TemplateStore>(
  State(resolver): State<Shared<S>>,
  Query(params): Query<HistoryParams>,
) -> Json<Vec<Notification>> {
  Json(resolver.notifier().get_notification_history(params.limit))
}

/// `GET /notifications/stats`
pub async fn stats<S: TemplateStore>(
  State(resolver): State<Shared<S>>,
) -> Json<NotificationStatistics> {
  Json(resolver.notifier().get_statistics())
}
