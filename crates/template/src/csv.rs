//! Delimited text rendering.
//!
//! Quoting policy: `None` renders as an empty field, strings are wrapped in
//! double quotes (embedded quotes doubled), numbers and booleans are written
//! in their natural textual form. Arrays and objects are written as compact
//! JSON inside quotes.

use serde_json::Value;

use crate::projector::FieldLayout;

/// First column of every artifact: the submission id.
pub const ID_COLUMN: &str = "adu_id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvFormat {
    pub delimiter: char,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self { delimiter: '|' }
    }
}

impl CsvFormat {
    pub fn new(delimiter: char) -> Self {
        Self { delimiter }
    }

    fn join<I: IntoIterator<Item = String>>(&self, cells: I) -> String {
        let sep = self.delimiter.to_string();
        cells.into_iter().collect::<Vec<_>>().join(&sep)
    }

    /// Header line: the id column followed by the field names.
    pub fn header(&self, field_names: &[String]) -> String {
        self.join(std::iter::once(ID_COLUMN.to_string()).chain(field_names.iter().cloned()))
    }

    /// Data line for one submission.
    pub fn row(&self, id: i64, values: &[Option<Value>]) -> String {
        self.join(std::iter::once(id.to_string()).chain(values.iter().map(format_value)))
    }
}

/// Render a single value according to the quoting policy.
pub fn format_value(value: &Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => quote(s),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other @ (Value::Array(_) | Value::Object(_))) => quote(&other.to_string()),
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Accumulates a header and data rows into one artifact body.
#[derive(Debug)]
pub struct CsvWriter {
    format: CsvFormat,
    buffer: String,
    rows: usize,
}

impl CsvWriter {
    /// Start an artifact for `layout`; the header is written immediately.
    pub fn new(format: CsvFormat, layout: &FieldLayout) -> Self {
        let mut buffer = format.header(&layout.field_names);
        buffer.push('\n');
        Self {
            format,
            buffer,
            rows: 0,
        }
    }

    pub fn push_row(&mut self, id: i64, values: &[Option<Value>]) {
        self.buffer.push_str(&self.format.row(id, values));
        self.buffer.push('\n');
        self.rows += 1;
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn finish(self) -> String {
        self.buffer
    }
}
