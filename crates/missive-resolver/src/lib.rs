//! Template resolution with retries, an audit trail and operator alerting.
//!
//! [`TemplateResolver`] walks the fallback chain against any
//! [`TemplateStore`](missive_core::store::TemplateStore). Every store call goes
//! through the [`RecoveryEngine`], every resolution lands in the [`AuditLog`],
//! and failures that need a human are escalated through the
//! [`AdminNotifier`].

pub mod audit;
pub mod cache;
pub mod notify;
pub mod recovery;
pub mod resolver;

pub use audit::{AuditConfig, AuditLog};
pub use cache::ResolutionCache;
pub use notify::{AdminNotifier, NotifierConfig};
pub use recovery::{RecoveryConfig, RecoveryEngine, RecoveryOutcome, RecoveryStrategy};
pub use resolver::{FallbackConfig, FallbackConfigPatch, TemplateResolver};

#[cfg(test)]
mod testing;
