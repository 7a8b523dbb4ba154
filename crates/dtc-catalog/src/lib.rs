//! Diagnostic Trouble Code Catalog
//!
//! Parses OBD-II trouble codes (`P0301`, `U0100`, ...) from text or from the
//! two-byte wire encoding and resolves them to a subsystem name and a
//! human-readable description.

mod catalog;
mod dtc;
mod error;

pub use catalog::{description, subsystem, DtcCatalog};
pub use dtc::{Dtc, DtcClass};
pub use error::CatalogError;
