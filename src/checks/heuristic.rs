//! Checks that flag data which is likely wrong rather than provably invalid.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::diagnostics::{self, CellContext, Diagnostic, ErrorKind, RowContext};
use crate::error::{TableError, TableResult};
use crate::file::Stats;
use crate::row::Row;
use crate::schema::Schema;
use crate::types::{FieldType, Value};

use super::{Check, field_requirement};

static DUPLICATE_ROW_ERRORS: [&ErrorKind; 1] = [&diagnostics::DUPLICATE_ROW];
static DEVIATED_VALUE_ERRORS: [&ErrorKind; 1] = [&diagnostics::DEVIATED_VALUE];
static TRUNCATED_VALUE_ERRORS: [&ErrorKind; 1] = [&diagnostics::TRUNCATED_VALUE];

/// Rows whose values hash identically to an earlier row.
#[derive(Debug, Default)]
pub struct DuplicateRowCheck {
    seen: HashMap<String, usize>,
}

impl DuplicateRowCheck {
    pub fn new() -> Self {
        Self::default()
    }

    fn fingerprint(row: &Row) -> String {
        let mut hasher = Sha256::new();
        for (index, value) in row.values().iter().enumerate() {
            if index > 0 {
                hasher.update(b",");
            }
            hasher.update(value.to_string().as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

impl Check for DuplicateRowCheck {
    fn code(&self) -> &'static str {
        "duplicate-row"
    }

    fn possible_errors(&self) -> &'static [&'static ErrorKind] {
        &DUPLICATE_ROW_ERRORS
    }

    fn validate_row(&mut self, row: &Row) -> Vec<Diagnostic> {
        if row.is_blank() {
            return Vec::new();
        }
        let fingerprint = Self::fingerprint(row);
        match self.seen.get(&fingerprint) {
            Some(first) => vec![Diagnostic::for_row(
                &diagnostics::DUPLICATE_ROW,
                format!("the same as row at position \"{first}\""),
                &row.context(),
            )],
            None => {
                self.seen.insert(fingerprint, row.row_position());
                Vec::new()
            }
        }
    }
}

/// Central value used by [`DeviatedValueCheck`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Average {
    #[default]
    Mean,
    Median,
    Mode,
}

impl Average {
    fn of(self, values: &[f64]) -> f64 {
        match self {
            Average::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Average::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
            Average::Mode => {
                let mut counts: HashMap<u64, (f64, usize)> = HashMap::new();
                for &v in values {
                    counts.entry(v.to_bits()).or_insert((v, 0)).1 += 1;
                }
                counts
                    .into_values()
                    .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then(b.total_cmp(a)))
                    .map_or(0.0, |(v, _)| v)
            }
        }
    }
}

/// Sample standard deviation; `None` below two values.
fn stdev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// One streamed value of the checked field.
#[derive(Debug)]
struct Sample {
    value: f64,
    cell: String,
    row_number: usize,
    row_position: usize,
}

/// Numeric cells further than `interval` standard deviations from the average.
///
/// Only the checked cell of each row is kept while streaming; values are judged once
/// the table ends, so a reported row carries its position but not its other cells.
#[derive(Debug)]
pub struct DeviatedValueCheck {
    field_name: String,
    average: Average,
    interval: f64,
    index: Option<usize>,
    field: CellContext,
    collected: Vec<Sample>,
}

impl DeviatedValueCheck {
    pub fn new(field_name: impl Into<String>, average: Average, interval: f64) -> TableResult<Self> {
        if !(interval.is_finite() && interval > 0.0) {
            return Err(TableError::options(format!(
                "deviated-value interval must be a positive number, got {interval}"
            )));
        }
        Ok(Self {
            field_name: field_name.into(),
            average,
            interval,
            index: None,
            field: CellContext::default(),
            collected: Vec::new(),
        })
    }
}

impl Check for DeviatedValueCheck {
    fn code(&self) -> &'static str {
        "deviated-value"
    }

    fn possible_errors(&self) -> &'static [&'static ErrorKind] {
        &DEVIATED_VALUE_ERRORS
    }

    fn validate_task(&self, schema: &Schema) -> Vec<Diagnostic> {
        field_requirement(self.code(), schema, &self.field_name, |t| {
            matches!(t, FieldType::Integer | FieldType::Number)
        })
    }

    fn validate_schema(&mut self, schema: &Schema) -> Vec<Diagnostic> {
        self.index = schema.field_index(&self.field_name);
        Vec::new()
    }

    fn validate_row(&mut self, row: &Row) -> Vec<Diagnostic> {
        let Some(index) = self.index else { return Vec::new() };
        if let Some(value) = row.values().get(index).and_then(Value::as_f64) {
            let mut cell = row.cell_context(index);
            let text = std::mem::take(&mut cell.cell);
            if self.collected.is_empty() {
                self.field = cell;
            }
            self.collected.push(Sample {
                value,
                cell: text,
                row_number: row.row_number(),
                row_position: row.row_position(),
            });
        }
        Vec::new()
    }

    fn validate_table(&mut self, _stats: &Stats) -> Vec<Diagnostic> {
        let values: Vec<f64> = self.collected.iter().map(|s| s.value).collect();
        let Some(deviation) = stdev(&values) else {
            return Vec::new();
        };
        let average = self.average.of(&values);
        let low = average - deviation * self.interval;
        let high = average + deviation * self.interval;
        self.collected
            .iter()
            .filter(|s| s.value < low || s.value > high)
            .map(|sample| {
                let row = RowContext {
                    cells: Vec::new(),
                    row_number: sample.row_number,
                    row_position: sample.row_position,
                };
                let cell = CellContext {
                    cell: sample.cell.clone(),
                    ..self.field.clone()
                };
                Diagnostic::for_cell(
                    &diagnostics::DEVIATED_VALUE,
                    format!(
                        "value \"{}\" in row at position \"{}\" and field \"{}\" is deviated \"[{low:.2}, {high:.2}]\"",
                        sample.cell, sample.row_position, self.field_name
                    ),
                    &row,
                    cell,
                )
            })
            .collect()
    }
}

/// String lengths at which database exports commonly cut text.
pub const TRUNCATED_STRING_LENGTHS: [usize; 1] = [255];

/// Integer maxima at which database exports commonly clamp numbers.
pub const TRUNCATED_INTEGER_NUMBERS: [i64; 4] = [9_223_372_036_854_775_807, 4_294_967_295, 2_147_483_647, 2_097_152];

/// Values sitting exactly on common column-width limits.
#[derive(Debug, Default, Clone, Copy)]
pub struct TruncatedValueCheck;

impl Check for TruncatedValueCheck {
    fn code(&self) -> &'static str {
        "truncated-value"
    }

    fn possible_errors(&self) -> &'static [&'static ErrorKind] {
        &TRUNCATED_VALUE_ERRORS
    }

    fn validate_row(&mut self, row: &Row) -> Vec<Diagnostic> {
        let mut errors = Vec::new();
        for (index, value) in row.values().iter().enumerate() {
            let truncated = match value {
                Value::String(s) => TRUNCATED_STRING_LENGTHS.contains(&s.chars().count()),
                Value::Integer(i) => TRUNCATED_INTEGER_NUMBERS.contains(i),
                _ => false,
            };
            if truncated {
                errors.push(Diagnostic::for_cell(
                    &diagnostics::TRUNCATED_VALUE,
                    "value is probably truncated",
                    &row.context(),
                    row.cell_context(index),
                ));
            }
        }
        errors
    }
}
