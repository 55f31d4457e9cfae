use std::collections::HashMap;

use crate::error::{BridgeError, Result};

use super::csv::split_record;

/// Columns every csv response must carry
pub const REQUIRED_FIELDS: [&str; 9] = [
    "Id",
    "Verbatim",
    "Cardinality",
    "CanonicalFull",
    "CanonicalSimple",
    "CanonicalStem",
    "Authorship",
    "Year",
    "Quality",
];

/// Column name to position table, built from the engine's header row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    /// Column names in header order
    columns: Vec<String>,

    /// Position of each column name
    index: HashMap<String, usize>,
}

impl FieldMapping {
    /// Build a mapping from the header line the engine prints at startup
    pub fn from_header(line: &str) -> Result<Self> {
        let columns = split_record(line)?;
        if columns.iter().all(|c| c.is_empty()) {
            return Err(BridgeError::MalformedResponse(
                "empty csv header".to_string(),
            ));
        }

        let mut index = HashMap::with_capacity(columns.len());
        for (pos, name) in columns.iter().enumerate() {
            // first occurrence wins on duplicate names
            index.entry(name.clone()).or_insert(pos);
        }

        Ok(Self { columns, index })
    }

    /// Position of a named column
    pub fn position(&self, field: &str) -> Result<usize> {
        self.index.get(field).copied().ok_or_else(|| {
            BridgeError::MalformedResponse(format!("csv header has no '{}' column", field))
        })
    }

    /// Number of columns a data row must have
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Names from `REQUIRED_FIELDS` missing in this header
    pub fn missing_required(&self) -> Vec<&'static str> {
        REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|f| !self.index.contains_key(*f))
            .collect()
    }
}
