//! Sampling and detection options: encoding, header span and schema inference.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::TableResult;
use crate::schema::{InferOptions, Schema, infer_fields, infer::DEFAULT_CONFIDENCE, normalize_names};
use crate::types::{Cell, FieldType};

pub const DEFAULT_BUFFER_SIZE: usize = 10_000;
pub const DEFAULT_SAMPLE_SIZE: usize = 100;
pub const DEFAULT_ENCODING: &str = "utf-8";
pub const DEFAULT_ENCODING_CONFIDENCE: f64 = 0.5;

/// Guess a character encoding from a byte sample.
pub trait EncodingDetector: Send + Sync {
    /// Return an encoding label understood by `encoding_rs` and a confidence in `0..=1`.
    fn detect(&self, sample: &[u8]) -> (String, f64);
}

/// BOM sniffing, then UTF-8 validity, then `windows-1252`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEncodingDetector;

impl EncodingDetector for DefaultEncodingDetector {
    fn detect(&self, sample: &[u8]) -> (String, f64) {
        if let Some((encoding, _)) = encoding_rs::Encoding::for_bom(sample) {
            return (encoding.name().to_ascii_lowercase(), 1.0);
        }
        match std::str::from_utf8(sample) {
            Ok(text) if text.is_ascii() => ("utf-8".to_string(), 1.0),
            Ok(_) => ("utf-8".to_string(), 0.99),
            // A multi-byte sequence cut by the buffer boundary is still UTF-8.
            Err(e) if e.error_len().is_none() => ("utf-8".to_string(), 0.9),
            Err(_) => ("windows-1252".to_string(), 0.6),
        }
    }
}

/// Detection settings used by [`crate::table::Table::open`].
#[derive(Clone)]
pub struct Detector {
    /// Bytes inspected for encoding (and delimiter) detection.
    pub buffer_size: usize,
    /// Data records sampled for header and schema inference.
    pub sample_size: usize,
    pub encoding_detector: Arc<dyn EncodingDetector>,
    /// Below this confidence the default encoding is used.
    pub encoding_confidence: f64,
    /// Force every inferred field to this type.
    pub field_type: Option<FieldType>,
    /// Override inferred field names.
    pub field_names: Option<Vec<String>>,
    pub field_confidence: f64,
    /// Missing values used for inference and the inferred schema.
    pub field_missing_values: Option<Vec<String>>,
    /// Reorder/extend a supplied schema to match the header.
    pub schema_sync: bool,
    /// Partial schema override applied after inference, see [`Schema::patch`].
    pub schema_patch: Option<serde_json::Value>,
}

impl fmt::Debug for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detector")
            .field("buffer_size", &self.buffer_size)
            .field("sample_size", &self.sample_size)
            .field("encoding_confidence", &self.encoding_confidence)
            .field("field_type", &self.field_type)
            .field("field_names", &self.field_names)
            .field("field_confidence", &self.field_confidence)
            .field("field_missing_values", &self.field_missing_values)
            .field("schema_sync", &self.schema_sync)
            .field("schema_patch_set", &self.schema_patch.is_some())
            .finish()
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            sample_size: DEFAULT_SAMPLE_SIZE,
            encoding_detector: Arc::new(DefaultEncodingDetector),
            encoding_confidence: DEFAULT_ENCODING_CONFIDENCE,
            field_type: None,
            field_names: None,
            field_confidence: DEFAULT_CONFIDENCE,
            field_missing_values: None,
            schema_sync: false,
            schema_patch: None,
        }
    }
}

impl Detector {
    /// Resolve an encoding label for the first bytes of a source.
    pub fn detect_encoding(&self, buffer: &[u8]) -> String {
        let (name, confidence) = self.encoding_detector.detect(buffer);
        if confidence < self.encoding_confidence {
            log::debug!("encoding {name} below confidence ({confidence:.2}), using {DEFAULT_ENCODING}");
            return DEFAULT_ENCODING.to_string();
        }
        name
    }

    /// Choose header rows among sampled records.
    ///
    /// `sample` holds `(row_position, cells)` of visible records. The modal width of non-empty
    /// records is computed with a drift of 10% (at least one cell); the first record whose
    /// width falls in range becomes the header if all its cells are strings, otherwise there
    /// is no header.
    pub fn detect_header_rows(&self, sample: &[(usize, Vec<Cell>)]) -> Vec<usize> {
        let mut widths: HashMap<usize, usize> = HashMap::new();
        for (_, cells) in sample.iter().filter(|(_, cells)| !cells.is_empty()) {
            *widths.entry(cells.len()).or_insert(0) += 1;
        }
        // Ties go to the wider record.
        let Some((&modal, _)) = widths.iter().max_by_key(|&(width, count)| (*count, *width)) else {
            return Vec::new();
        };
        let drift = ((modal as f64) * 0.1).round().max(1.0) as usize;
        let range = modal.saturating_sub(drift)..=modal + drift;
        for (position, cells) in sample {
            if cells.is_empty() || !range.contains(&cells.len()) {
                continue;
            }
            if cells.iter().all(|c| c.is_string()) {
                return vec![*position];
            }
            break;
        }
        Vec::new()
    }

    /// Infer a schema from header labels and sampled data records.
    pub fn detect_schema(&self, labels: &[String], fragment: &[Vec<Cell>]) -> TableResult<Schema> {
        let names = match &self.field_names {
            Some(names) => names.clone(),
            None if !labels.is_empty() => normalize_names(labels),
            None => {
                let width = fragment.iter().map(Vec::len).max().unwrap_or(0);
                (1..=width).map(|i| format!("field{i}")).collect()
            }
        };
        let missing_values = self
            .field_missing_values
            .clone()
            .unwrap_or_else(|| vec![String::new()]);
        let options = InferOptions {
            confidence: self.field_confidence,
            missing_values: missing_values.clone(),
            field_type: self.field_type,
        };
        let fields = infer_fields(&names, fragment, &options);
        let schema = Schema::from_fields(fields, missing_values);
        schema.validate()?;
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample(rows: &[Vec<Cell>]) -> Vec<(usize, Vec<Cell>)> {
        rows.iter().cloned().enumerate().map(|(i, r)| (i + 1, r)).collect()
    }

    #[test]
    fn header_is_first_in_range_string_row() {
        let rows = vec![
            vec![json!("title")],
            vec![json!("id"), json!("name"), json!("age")],
            vec![json!(1), json!("a"), json!(3)],
            vec![json!(2), json!("b"), json!(4)],
        ];
        assert_eq!(Detector::default().detect_header_rows(&sample(&rows)), vec![2]);
    }

    #[test]
    fn no_header_when_first_row_is_typed() {
        let rows = vec![vec![json!(1), json!(2)], vec![json!(3), json!(4)]];
        assert!(Detector::default().detect_header_rows(&sample(&rows)).is_empty());
        assert!(Detector::default().detect_header_rows(&[]).is_empty());
    }

    #[test]
    fn encoding_detection() {
        let d = Detector::default();
        assert_eq!(d.detect_encoding(b"id,name\n1,a\n"), "utf-8");
        assert_eq!(d.detect_encoding("id,中国人".as_bytes()), "utf-8");
        assert_eq!(d.detect_encoding(b"id,caf\xe9\n"), "windows-1252");
        assert_eq!(d.detect_encoding(b"\xef\xbb\xbfid"), "utf-8");

        let strict = Detector {
            encoding_confidence: 0.9,
            ..Detector::default()
        };
        assert_eq!(strict.detect_encoding(b"id,caf\xe9\n"), "utf-8");
    }

    #[test]
    fn schema_without_labels_uses_positional_names() {
        let d = Detector::default();
        let schema = d
            .detect_schema(&[], &[vec![json!("1"), json!("x")], vec![json!("2"), json!("y")]])
            .unwrap();
        assert_eq!(schema.field_names(), vec!["field1", "field2"]);
        assert_eq!(schema.fields()[0].field_type(), FieldType::Integer);
    }
}
