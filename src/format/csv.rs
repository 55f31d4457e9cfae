use std::sync::Arc;

use crate::error::{BridgeError, Result};

use super::mapping::FieldMapping;
use super::{Canonical, ParseResult, RecordDecoder, non_empty};

const DELIMITER: char = ',';
const QUOTE: char = '"';

/// Split one csv row into fields
///
/// Fields may be wrapped in double quotes, inside which the delimiter is
/// literal and `""` stands for one quote character.
pub fn split_record(line: &str) -> Result<Vec<String>> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;
    let mut at_field_start = true;

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == QUOTE {
                if chars.peek() == Some(&QUOTE) {
                    field.push(QUOTE);
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            DELIMITER => {
                fields.push(std::mem::take(&mut field));
                at_field_start = true;
                continue;
            }
            QUOTE if at_field_start => in_quotes = true,
            _ => field.push(c),
        }
        at_field_start = false;
    }

    if in_quotes {
        return Err(BridgeError::MalformedResponse(format!(
            "unterminated quote in csv row: {}",
            line
        )));
    }

    fields.push(field);
    Ok(fields)
}

/// Decoder for `csv` rows, driven by the session's header mapping
pub struct CsvDecoder {
    mapping: Arc<FieldMapping>,
}

impl CsvDecoder {
    pub fn new(mapping: Arc<FieldMapping>) -> Self {
        Self { mapping }
    }

    fn field<'a>(&self, row: &'a [String], name: &str) -> Result<&'a str> {
        let pos = self.mapping.position(name)?;
        row.get(pos).map(String::as_str).ok_or_else(|| {
            BridgeError::MalformedResponse(format!("csv row has no value for '{}'", name))
        })
    }

    fn number(&self, row: &[String], name: &str) -> Result<Option<u32>> {
        let raw = self.field(row, name)?;
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(|_| {
            BridgeError::MalformedResponse(format!("'{}' is not a number: {}", name, raw))
        })
    }
}

impl RecordDecoder for CsvDecoder {
    fn decode(&self, line: &str) -> Result<ParseResult> {
        let row = split_record(line)?;
        if row.len() != self.mapping.width() {
            return Err(BridgeError::MalformedResponse(format!(
                "csv row has {} fields, header has {}",
                row.len(),
                self.mapping.width()
            )));
        }

        let quality = self.number(&row, "Quality")?;
        let parsed = quality.is_some_and(|q| q > 0);
        let full = self.field(&row, "CanonicalFull")?;
        let canonical = if full.is_empty() {
            None
        } else {
            Some(Canonical {
                full: full.to_string(),
                simple: self.field(&row, "CanonicalSimple")?.to_string(),
                stem: self.field(&row, "CanonicalStem")?.to_string(),
            })
        };

        Ok(ParseResult {
            id: self.field(&row, "Id")?.to_string(),
            verbatim: self.field(&row, "Verbatim")?.to_string(),
            parsed,
            cardinality: self.number(&row, "Cardinality")?,
            canonical,
            normalized: None,
            authorship: non_empty(Some(self.field(&row, "Authorship")?.to_string())),
            year: non_empty(Some(self.field(&row, "Year")?.to_string())),
            quality,
            parser_version: None,
        })
    }
}
