//! Template projection for payloads and CSV artifacts.
//!
//! This crate provides:
//! - `FieldLayout`: a template flattened into aligned field names and data keys,
//!   with grouping blocks unrolled
//! - `project`: the layout applied to one submission's data
//! - `CsvWriter`: delimited text rendering with the quoting policy used by the
//!   downstream systems

pub mod csv;
pub mod projector;

pub use csv::{format_value, CsvFormat, CsvWriter};
pub use projector::{project, FieldLayout, Projection};
