//! Decoding of engine response lines into normalized records
//!
//! The engine answers every request line with one response line in one of
//! two serializations. `compact` is a self-describing JSON object; `csv`
//! is a delimited row whose column order is announced by a header row the
//! engine prints once at startup.

mod compact;
mod csv;
mod mapping;

pub use compact::CompactDecoder;
pub use csv::{CsvDecoder, split_record};
pub use mapping::{FieldMapping, REQUIRED_FIELDS};

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;

/// Output serialization requested from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// One JSON object per line
    Compact,
    /// Header row once, then one delimited row per line
    Csv,
}

impl OutputFormat {
    /// Map the `simple` flag of the public API onto a format
    pub fn from_simple(simple: bool) -> Self {
        if simple {
            OutputFormat::Csv
        } else {
            OutputFormat::Compact
        }
    }

    /// Value passed to the engine's `--format` flag
    pub fn as_arg(&self) -> &'static str {
        match self {
            OutputFormat::Compact => "compact",
            OutputFormat::Csv => "csv",
        }
    }

    /// Whether the engine prints a header row before any response
    pub fn emits_header(&self) -> bool {
        matches!(self, OutputFormat::Csv)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// Canonical forms of a parsed name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Canonical {
    pub full: String,
    pub simple: String,
    pub stem: String,
}

/// Normalized record for one parsed name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    pub id: String,
    /// Input exactly as the engine received it
    pub verbatim: String,
    pub parsed: bool,
    pub cardinality: Option<u32>,
    pub canonical: Option<Canonical>,
    pub normalized: Option<String>,
    pub authorship: Option<String>,
    pub year: Option<String>,
    pub quality: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parser_version: Option<String>,
}

/// Turns one raw response line into a `ParseResult`
pub trait RecordDecoder: Send + Sync + 'static {
    fn decode(&self, line: &str) -> Result<ParseResult>;
}

/// Build the decoder for a format
///
/// `csv` requires the session's field mapping; `compact` ignores it.
pub fn decoder_for(
    format: OutputFormat,
    mapping: Option<Arc<FieldMapping>>,
) -> Result<Arc<dyn RecordDecoder>> {
    match format {
        OutputFormat::Compact => Ok(Arc::new(CompactDecoder)),
        OutputFormat::Csv => {
            let mapping = mapping.ok_or_else(|| {
                crate::error::BridgeError::MalformedResponse(
                    "csv session has no header mapping".to_string(),
                )
            })?;
            Ok(Arc::new(CsvDecoder::new(mapping)))
        }
    }
}

/// Empty engine fields mean "absent"
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_flag_selects_csv() {
        assert_eq!(OutputFormat::from_simple(true), OutputFormat::Csv);
        assert_eq!(OutputFormat::from_simple(false), OutputFormat::Compact);
        assert!(OutputFormat::Csv.emits_header());
        assert!(!OutputFormat::Compact.emits_header());
        assert_eq!(OutputFormat::Csv.to_string(), "csv");
    }

    #[test]
    fn test_csv_decoder_needs_mapping() {
        assert!(decoder_for(OutputFormat::Csv, None).is_err());
        assert!(decoder_for(OutputFormat::Compact, None).is_ok());
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = ParseResult {
            id: "x".to_string(),
            verbatim: "Homo sapiens".to_string(),
            parsed: true,
            cardinality: Some(2),
            canonical: None,
            normalized: None,
            authorship: None,
            year: None,
            quality: Some(1),
            parser_version: Some("1.0.0".to_string()),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["parserVersion"], "1.0.0");
        assert_eq!(json["verbatim"], "Homo sapiens");
    }
}
