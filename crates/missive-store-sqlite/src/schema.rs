//! SQL schema for the missive SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS templates (
    template_id TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    form_kind   TEXT NOT NULL,
    subject     TEXT NOT NULL DEFAULT '',
    body        TEXT NOT NULL DEFAULT '',
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,   -- RFC 3339 UTC
    updated_at  TEXT NOT NULL
);

-- Mappings are never deleted; they are retired by deactivating the template.
-- Uniqueness of active (form_kind, modality) pairs is checked before writes,
-- not here, because retired rows may share a pair with an active one.
CREATE TABLE IF NOT EXISTS mappings (
    mapping_id  TEXT PRIMARY KEY,
    form_kind   TEXT NOT NULL,
    modality    TEXT,            -- NULL = every modality of form_kind
    template_id TEXT NOT NULL REFERENCES templates(template_id),
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS mappings_pair_idx    ON mappings(form_kind, modality);
CREATE INDEX IF NOT EXISTS templates_form_idx   ON templates(form_kind, is_active);

PRAGMA user_version = 1;
";
