//! Integration tests for `SqliteStore` against an in-memory database.

use missive_core::{
  ErrorCode, ErrorRecord,
  store::TemplateStore,
  template::{FormKind, Modality, NewMapping, NewTemplate},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn quote() -> FormKind { FormKind::new("quote") }

fn hosted() -> Modality { Modality::new("hosted") }

// ─── Templates ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_get_template() {
  let s = store().await;

  let t = s
    .insert_template(NewTemplate::new("Quote mail", quote()).with_subject("Your quote"))
    .await
    .unwrap();
  assert!(t.is_active);

  let fetched = s.get_template_by_id(t.template_id).await.unwrap().unwrap();
  assert_eq!(fetched.name, "Quote mail");
  assert_eq!(fetched.subject, "Your quote");
  assert_eq!(fetched.form_kind, quote());
}

#[tokio::test]
async fn get_missing_template_returns_none() {
  let s = store().await;
  assert!(s.get_template_by_id(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn deactivated_templates_drop_out_of_active_listing() {
  let s = store().await;
  let a = s.insert_template(NewTemplate::new("A", quote())).await.unwrap();
  let b = s.insert_template(NewTemplate::new("B", quote())).await.unwrap();
  s.insert_template(NewTemplate::new("C", FormKind::new("order")))
    .await
    .unwrap();

  let active = s.list_active_templates_for_form(&quote()).await.unwrap();
  assert_eq!(active.len(), 2);
  assert_eq!(active[0].template_id, a.template_id);

  assert!(s.set_template_active(a.template_id, false).await.unwrap());
  let active = s.list_active_templates_for_form(&quote()).await.unwrap();
  assert_eq!(active.len(), 1);
  assert_eq!(active[0].template_id, b.template_id);
}

#[tokio::test]
async fn set_active_on_missing_template_returns_false() {
  let s = store().await;
  assert!(!s.set_template_active(Uuid::new_v4(), true).await.unwrap());
}

// ─── Mappings ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn mapping_lookup_distinguishes_concrete_and_null_modality() {
  let s = store().await;
  let specific = s.insert_template(NewTemplate::new("hosted", quote())).await.unwrap();
  let general = s.insert_template(NewTemplate::new("general", quote())).await.unwrap();

  s.insert_mapping(NewMapping {
    form_kind:   quote(),
    modality:    Some(hosted()),
    template_id: specific.template_id,
  })
  .await
  .unwrap();
  s.insert_mapping(NewMapping {
    form_kind:   quote(),
    modality:    None,
    template_id: general.template_id,
  })
  .await
  .unwrap();

  let hit = s
    .get_active_template_by_mapping(&quote(), Some(&hosted()))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(hit.template_id, specific.template_id);

  let form_level = s
    .get_active_template_by_mapping(&quote(), None)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(form_level.template_id, general.template_id);

  let other = s
    .get_active_template_by_mapping(&quote(), Some(&Modality::new("on_premise")))
    .await
    .unwrap();
  assert!(other.is_none());
}

#[tokio::test]
async fn mapping_to_inactive_template_is_not_returned() {
  let s = store().await;
  let t = s.insert_template(NewTemplate::new("old", quote())).await.unwrap();
  s.insert_mapping(NewMapping {
    form_kind:   quote(),
    modality:    Some(hosted()),
    template_id: t.template_id,
  })
  .await
  .unwrap();

  s.set_template_active(t.template_id, false).await.unwrap();
  let hit = s
    .get_active_template_by_mapping(&quote(), Some(&hosted()))
    .await
    .unwrap();
  assert!(hit.is_none());

  let views = s.list_mappings().await.unwrap();
  assert_eq!(views.len(), 1);
  assert!(!views[0].template_active);
  assert_eq!(views[0].template_name, "old");
}

#[tokio::test]
async fn insert_mapping_to_unknown_template_fails() {
  let s = store().await;
  let missing = Uuid::new_v4();
  let err = s
    .insert_mapping(NewMapping {
      form_kind:   quote(),
      modality:    None,
      template_id: missing,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::TemplateNotFound(id) if id == missing));

  let record: ErrorRecord = err.into();
  assert_eq!(record.code(), ErrorCode::TemplateNotFound);
}

#[tokio::test]
async fn update_mapping_replaces_fields() {
  let s = store().await;
  let a = s.insert_template(NewTemplate::new("A", quote())).await.unwrap();
  let b = s.insert_template(NewTemplate::new("B", quote())).await.unwrap();

  let m = s
    .insert_mapping(NewMapping {
      form_kind:   quote(),
      modality:    Some(hosted()),
      template_id: a.template_id,
    })
    .await
    .unwrap();

  let updated = s
    .update_mapping(m.mapping_id, NewMapping {
      form_kind:   quote(),
      modality:    None,
      template_id: b.template_id,
    })
    .await
    .unwrap()
    .unwrap();
  assert_eq!(updated.mapping_id, m.mapping_id);
  assert_eq!(updated.modality, None);
  assert_eq!(updated.template_id, b.template_id);
  assert_eq!(updated.created_at, m.created_at);
}

#[tokio::test]
async fn update_missing_mapping_returns_none() {
  let s = store().await;
  let t = s.insert_template(NewTemplate::new("A", quote())).await.unwrap();
  let result = s
    .update_mapping(Uuid::new_v4(), NewMapping {
      form_kind:   quote(),
      modality:    None,
      template_id: t.template_id,
    })
    .await
    .unwrap();
  assert!(result.is_none());
}

// ─── Error classification ────────────────────────────────────────────────────

#[test]
fn closed_connection_is_retryable() {
  let record: ErrorRecord = Error::Database(tokio_rusqlite::Error::ConnectionClosed).into();
  assert_eq!(record.code(), ErrorCode::ConnectionFailed);
  assert!(record.is_temporary());
}

#[test]
fn busy_database_classifies_as_timeout() {
  let busy = rusqlite::Error::SqliteFailure(
    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
    None,
  );
  let record: ErrorRecord = Error::Database(tokio_rusqlite::Error::Rusqlite(busy)).into();
  assert_eq!(record.code(), ErrorCode::Timeout);
  assert!(record.is_temporary());
}

#[test]
fn other_failures_are_database_errors() {
  let record: ErrorRecord = Error::DateParse("garbage".into()).into();
  assert_eq!(record.code(), ErrorCode::DatabaseError);
  assert!(!record.is_temporary());
  assert!(record.requires_admin_notification());
  assert!(!record.cause_chain().is_empty());
}
