//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. UUIDs are stored as
//! hyphenated lowercase strings. `is_active` is stored as 0/1.

use chrono::{DateTime, Utc};
use missive_core::template::{FormKind, Mapping, MappingView, Modality, Template};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Raw rows ─────────────────────────────────────────────────────────────────

/// Column list matching [`RawTemplate::from_row`].
pub const TEMPLATE_COLUMNS: &str =
  "template_id, name, form_kind, subject, body, is_active, created_at, updated_at";

/// A `templates` row as read from SQLite, before decoding.
pub struct RawTemplate {
  pub template_id: String,
  pub name:        String,
  pub form_kind:   String,
  pub subject:     String,
  pub body:        String,
  pub is_active:   bool,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawTemplate {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      template_id: row.get(0)?,
      name:        row.get(1)?,
      form_kind:   row.get(2)?,
      subject:     row.get(3)?,
      body:        row.get(4)?,
      is_active:   row.get(5)?,
      created_at:  row.get(6)?,
      updated_at:  row.get(7)?,
    })
  }

  pub fn into_template(self) -> Result<Template> {
    Ok(Template {
      template_id: decode_uuid(&self.template_id)?,
      name:        self.name,
      form_kind:   FormKind::new(self.form_kind),
      subject:     self.subject,
      body:        self.body,
      is_active:   self.is_active,
      created_at:  decode_dt(&self.created_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

/// A `mappings` row joined with its template's name and active flag.
pub struct RawMappingView {
  pub mapping_id:      String,
  pub form_kind:       String,
  pub modality:        Option<String>,
  pub template_id:     String,
  pub created_at:      String,
  pub updated_at:      String,
  pub template_name:   String,
  pub template_active: bool,
}

impl RawMappingView {
  /// Decode a row selected with the column order `mapping_id, form_kind,
  /// modality, template_id, created_at, updated_at, name, is_active`.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      mapping_id:      row.get(0)?,
      form_kind:       row.get(1)?,
      modality:        row.get(2)?,
      template_id:     row.get(3)?,
      created_at:      row.get(4)?,
      updated_at:      row.get(5)?,
      template_name:   row.get(6)?,
      template_active: row.get(7)?,
    })
  }

  pub fn into_view(self) -> Result<MappingView> {
    Ok(MappingView {
      mapping:         Mapping {
        mapping_id:  decode_uuid(&self.mapping_id)?,
        form_kind:   FormKind::new(self.form_kind),
        modality:    self.modality.map(Modality::new),
        template_id: decode_uuid(&self.template_id)?,
        created_at:  decode_dt(&self.created_at)?,
        updated_at:  decode_dt(&self.updated_at)?,
      },
      template_name:   self.template_name,
      template_active: self.template_active,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dt_round_trips_through_rfc3339() {
    let now = Utc::now();
    assert_eq!(decode_dt(&encode_dt(now)).unwrap(), now);
  }

  #[test]
  fn bad_uuid_is_an_error() {
    assert!(matches!(decode_uuid("not-a-uuid"), Err(Error::Uuid(_))));
  }
}
