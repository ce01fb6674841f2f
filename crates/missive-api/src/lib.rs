//! JSON REST API for missive.
//!
//! Exposes an axum [`Router`] backed by a shared
//! [`TemplateResolver`](missive_resolver::TemplateResolver). Auth, TLS, and
//! transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", missive_api::api_router(resolver.clone()))
//! ```

pub mod audit;
pub mod error;
pub mod fallback;
pub mod mappings;
pub mod notifications;
pub mod resolve;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, put},
};
use missive_core::store::TemplateStore;
use missive_resolver::TemplateResolver;

pub use error::ApiError;

/// Shared handler state.
pub type Shared<S> = Arc<TemplateResolver<S>>;

/// Build a fully-materialised API router for `resolver`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(resolver: Shared<S>) -> Router<()>
where
  S: TemplateStore + 'static,
{
  Router::new()
    // Resolution
    .route("/resolve", get(resolve::resolve::<S>))
    .route("/mappings/lookup", get(resolve::lookup::<S>))
    // Mappings
    .route("/mappings", get(mappings::list::<S>).post(mappings::create::<S>))
    .route("/mappings/validate", get(mappings::validate::<S>))
    .route("/mappings/{id}", put(mappings::update::<S>))
    // Fallback configuration
    .route(
      "/config/defaults/{form_kind}",
      put(fallback::set_default::<S>).delete(fallback::clear_default::<S>),
    )
    .route("/config/global-fallback", put(fallback::set_global::<S>))
    .route("/config/fallback", get(fallback::get_config::<S>).put(fallback::update_config::<S>))
    // Monitoring
    .route("/notifications", get(notifications::history::<S>))
    .route("/notifications/stats", get(notifications::stats::<S>))
    .route("/audit/logs", get(audit::logs::<S>))
    .route("/audit/stats", get(audit::stats::<S>))
    .with_state(resolver)
}

#[cfg(test)]
mod tests;
