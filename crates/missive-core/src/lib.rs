//! Core types and trait definitions for missive, the notification template
//! resolver.
//!
//! No HTTP or database dependencies live here; every other crate builds on
//! these types.

pub mod clock;
pub mod error;
pub mod factory;
pub mod resolution;
pub mod store;
pub mod template;

pub use error::{Classification, ErrorCode, ErrorRecord, Severity};
