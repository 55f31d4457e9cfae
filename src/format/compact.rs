use serde::Deserialize;

use crate::error::{BridgeError, Result};

use super::{Canonical, ParseResult, RecordDecoder, non_empty};

/// Decoder for `compact` (JSON line) responses
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactDecoder;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompactRecord {
    #[serde(default)]
    id: String,
    verbatim: String,
    parsed: Option<bool>,
    cardinality: Option<u32>,
    #[serde(alias = "canonicalName")]
    canonical: Option<CompactCanonical>,
    normalized: Option<String>,
    authorship: Option<CompactAuthorship>,
    year: Option<YearField>,
    quality: Option<u32>,
    #[serde(alias = "parser_version")]
    parser_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompactCanonical {
    #[serde(default)]
    full: String,
    #[serde(default)]
    simple: String,
    #[serde(default, alias = "stemmed")]
    stem: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CompactAuthorship {
    Text(String),
    Detailed {
        normalized: Option<String>,
        verbatim: Option<String>,
        year: Option<YearField>,
    },
}

/// Years arrive as strings, but some engine builds emit bare numbers
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum YearField {
    Text(String),
    Number(u32),
}

impl YearField {
    fn into_string(self) -> String {
        match self {
            YearField::Text(s) => s,
            YearField::Number(n) => n.to_string(),
        }
    }
}

impl RecordDecoder for CompactDecoder {
    fn decode(&self, line: &str) -> Result<ParseResult> {
        let record: CompactRecord = serde_json::from_str(line)
            .map_err(|e| BridgeError::MalformedResponse(format!("Invalid JSON: {}", e)))?;

        let (authorship, authorship_year) = match record.authorship {
            Some(CompactAuthorship::Text(text)) => (non_empty(Some(text)), None),
            Some(CompactAuthorship::Detailed {
                normalized,
                verbatim,
                year,
            }) => (
                non_empty(normalized).or(non_empty(verbatim)),
                year.map(YearField::into_string),
            ),
            None => (None, None),
        };

        let canonical = record
            .canonical
            .filter(|c| !c.full.is_empty())
            .map(|c| Canonical {
                full: c.full,
                simple: c.simple,
                stem: c.stem,
            });

        let parsed = record
            .parsed
            .unwrap_or_else(|| record.quality.is_some_and(|q| q > 0));

        Ok(ParseResult {
            id: record.id,
            verbatim: record.verbatim,
            parsed,
            cardinality: record.cardinality,
            canonical,
            normalized: non_empty(record.normalized),
            authorship,
            year: non_empty(record.year.map(YearField::into_string)).or(non_empty(authorship_year)),
            quality: record.quality,
            parser_version: non_empty(record.parser_version),
        })
    }
}
