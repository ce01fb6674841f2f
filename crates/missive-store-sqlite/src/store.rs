//! [`SqliteStore`] — the SQLite implementation of [`TemplateStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use missive_core::{
  store::TemplateStore,
  template::{FormKind, Mapping, MappingView, Modality, NewMapping, NewTemplate, Template},
};

use crate::{
  Error, Result,
  encode::{RawMappingView, RawTemplate, TEMPLATE_COLUMNS, encode_dt, encode_uuid},
  schema::SCHEMA,
};

const MAPPING_VIEW_SELECT: &str = "
  SELECT m.mapping_id, m.form_kind, m.modality, m.template_id,
         m.created_at, m.updated_at, t.name, t.is_active
  FROM mappings m
  JOIN templates t ON t.template_id = m.template_id";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A missive template store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn template_exists(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let exists = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM templates WHERE template_id = ?1",
              rusqlite::params![id_str],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(exists)
  }

  async fn query_one_template(
    &self,
    sql: String,
    params: Vec<Option<String>>,
  ) -> Result<Option<Template>> {
    let raw: Option<RawTemplate> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &sql,
              rusqlite::params_from_iter(params.iter()),
              RawTemplate::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTemplate::into_template).transpose()
  }
}

// ─── TemplateStore impl ──────────────────────────────────────────────────────

impl TemplateStore for SqliteStore {
  type Error = Error;

  // ── Templates ─────────────────────────────────────────────────────────────

  async fn get_active_template_by_mapping(
    &self,
    form_kind: &FormKind,
    modality:  Option<&Modality>,
  ) -> Result<Option<Template>> {
    // `IS` compares NULL equal to NULL, so one statement serves both the
    // concrete and the form-level lookup. Newest mapping wins if several
    // active ones ever coexist.
    let sql = format!(
      "SELECT {cols} FROM templates t
       JOIN mappings m ON m.template_id = t.template_id
       WHERE m.form_kind = ?1 AND m.modality IS ?2 AND t.is_active = 1
       ORDER BY m.updated_at DESC
       LIMIT 1",
      cols = prefixed_template_columns("t"),
    );
    let params = vec![
      Some(form_kind.as_str().to_owned()),
      modality.map(|m| m.as_str().to_owned()),
    ];
    self.query_one_template(sql, params).await
  }

  async fn get_template_by_id(&self, id: Uuid) -> Result<Option<Template>> {
    let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE template_id = ?1");
    self.query_one_template(sql, vec![Some(encode_uuid(id))]).await
  }

  async fn list_active_templates_for_form(
    &self,
    form_kind: &FormKind,
  ) -> Result<Vec<Template>> {
    let form_kind_str = form_kind.as_str().to_owned();

    let raws: Vec<RawTemplate> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {TEMPLATE_COLUMNS} FROM templates
           WHERE form_kind = ?1 AND is_active = 1
           ORDER BY created_at ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![form_kind_str], RawTemplate::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTemplate::into_template).collect()
  }

  async fn insert_template(&self, input: NewTemplate) -> Result<Template> {
    let now = Utc::now();
    let template = Template {
      template_id: Uuid::new_v4(),
      name:        input.name,
      form_kind:   input.form_kind,
      subject:     input.subject,
      body:        input.body,
      is_active:   input.is_active,
      created_at:  now,
      updated_at:  now,
    };

    let id_str        = encode_uuid(template.template_id);
    let name          = template.name.clone();
    let form_kind_str = template.form_kind.as_str().to_owned();
    let subject       = template.subject.clone();
    let body          = template.body.clone();
    let is_active     = template.is_active;
    let at_str        = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO templates (
             template_id, name, form_kind, subject, body, is_active,
             created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
          rusqlite::params![id_str, name, form_kind_str, subject, body, is_active, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(template)
  }

  async fn set_template_active(&self, id: Uuid, active: bool) -> Result<bool> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE templates SET is_active = ?2, updated_at = ?3 WHERE template_id = ?1",
          rusqlite::params![id_str, active, at_str],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }

  // ── Mappings ──────────────────────────────────────────────────────────────

  async fn list_mappings(&self) -> Result<Vec<MappingView>> {
    let raws: Vec<RawMappingView> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "{MAPPING_VIEW_SELECT} ORDER BY m.form_kind, m.modality, m.created_at"
        ))?;
        let rows = stmt
          .query_map([], RawMappingView::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMappingView::into_view).collect()
  }

  async fn insert_mapping(&self, input: NewMapping) -> Result<Mapping> {
    if !self.template_exists(input.template_id).await? {
      return Err(Error::TemplateNotFound(input.template_id));
    }

    let now = Utc::now();
    let mapping = Mapping {
      mapping_id:  Uuid::new_v4(),
      form_kind:   input.form_kind,
      modality:    input.modality,
      template_id: input.template_id,
      created_at:  now,
      updated_at:  now,
    };

    let id_str          = encode_uuid(mapping.mapping_id);
    let form_kind_str   = mapping.form_kind.as_str().to_owned();
    let modality_str    = mapping.modality.as_ref().map(|m| m.as_str().to_owned());
    let template_id_str = encode_uuid(mapping.template_id);
    let at_str          = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO mappings (
             mapping_id, form_kind, modality, template_id, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
          rusqlite::params![id_str, form_kind_str, modality_str, template_id_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(mapping)
  }

  async fn update_mapping(&self, id: Uuid, input: NewMapping) -> Result<Option<Mapping>> {
    if !self.template_exists(input.template_id).await? {
      return Err(Error::TemplateNotFound(input.template_id));
    }

    let id_str          = encode_uuid(id);
    let form_kind_str   = input.form_kind.as_str().to_owned();
    let modality_str    = input.modality.as_ref().map(|m| m.as_str().to_owned());
    let template_id_str = encode_uuid(input.template_id);
    let at_str          = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE mappings
           SET form_kind = ?2, modality = ?3, template_id = ?4, updated_at = ?5
           WHERE mapping_id = ?1",
          rusqlite::params![id_str, form_kind_str, modality_str, template_id_str, at_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Ok(None);
    }

    let id_str = encode_uuid(id);
    let raw: Option<RawMappingView> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("{MAPPING_VIEW_SELECT} WHERE m.mapping_id = ?1"),
              rusqlite::params![id_str],
              RawMappingView::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    Ok(raw.map(RawMappingView::into_view).transpose()?.map(|v| v.mapping))
  }
}

fn prefixed_template_columns(alias: &str) -> String {
  TEMPLATE_COLUMNS
    .split(", ")
    .map(|col| format!("{alias}.{col}"))
    .collect::<Vec<_>>()
    .join(", ")
}
