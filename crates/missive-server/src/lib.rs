//! Wiring for the missive server binary.
//!
//! [`ServerConfig`] is read from a TOML file layered under `MISSIVE_`
//! environment variables; [`build_app`] turns it into a ready-to-serve axum
//! [`Router`].

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use axum::Router;
use missive_resolver::{
  AdminNotifier, AuditConfig, AuditLog, FallbackConfig, NotifierConfig, RecoveryConfig,
  RecoveryEngine, TemplateResolver,
  notify::{ChannelKind, OutboundMail},
};
use missive_store_sqlite::SqliteStore;
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `missive.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  pub fallback:   FallbackConfig,
  pub recovery:   RecoveryConfig,
  pub audit:      AuditConfig,
  pub notifier:   NotifierConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".to_string(),
      port:       8080,
      store_path: PathBuf::from("~/.local/share/missive/missive.db"),
      fallback:   FallbackConfig::default(),
      recovery:   RecoveryConfig::default(),
      audit:      AuditConfig::default(),
      notifier:   NotifierConfig::default(),
    }
  }
}

impl ServerConfig {
  /// Read `path` (optional) and overlay `MISSIVE_*` variables. Nested keys
  /// use `__`, e.g. `MISSIVE_NOTIFIER__RATE_LIMIT_MINUTES=5`.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    Self::from_builder(
      config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
          config::Environment::with_prefix("MISSIVE")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
        ),
    )
  }

  fn from_builder(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
  ) -> anyhow::Result<Self> {
    builder
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Application ──────────────────────────────────────────────────────────────

/// Open the store, wire the resolver and build the router, mounted at `/api`.
pub async fn build_app(config: &ServerConfig) -> anyhow::Result<Router> {
  let store_path = expand_tilde(&config.store_path);
  if let Some(parent) = store_path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  tracing::info!(path = ?store_path, "opened template store");

  let mut notifier = AdminNotifier::new(config.notifier.clone());
  if config.notifier.channels.contains(&ChannelKind::Email) {
    notifier = notifier.with_mail_outbox(spawn_mail_log());
  }

  let resolver = TemplateResolver::new(
    Arc::new(store),
    config.fallback.clone(),
    RecoveryEngine::new(config.recovery.clone()),
    Arc::new(AuditLog::new(config.audit.clone())),
    Arc::new(notifier),
  );

  Ok(
    Router::new()
      .nest("/api", missive_api::api_router(Arc::new(resolver)))
      .layer(TraceLayer::new_for_http()),
  )
}

/// No mail transport ships with the server; queued mail is logged instead.
fn spawn_mail_log() -> mpsc::UnboundedSender<OutboundMail> {
  let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMail>();
  tokio::spawn(async move {
    while let Some(mail) = rx.recv().await {
      tracing::info!(
        target: "missive::mail",
        to = ?mail.to,
        subject = %mail.subject,
        "outbound admin mail"
      );
    }
  });
  tx
}
