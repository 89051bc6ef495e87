//! Validation checks.
//!
//! A [`Check`] is bound to one table per validation run and goes through a fixed
//! lifecycle driven by [`crate::validate`]:
//!
//! `prepare → validate_task → validate_schema → validate_headers → validate_row* → validate_table`
//!
//! Every hook has an empty default, so a check implements only what it needs. A check
//! whose `validate_task` returns errors is dropped for the rest of the run and its errors
//! are reported once at task level. [`Check::possible_errors`] declares the error kinds a
//! check may emit; their union forms the report scope.
//!
//! Built-in checks are described by [`CheckDescriptor`], which (de)serializes from
//! `{"code": "deviated-value", "fieldName": "price", "interval": 3}`.

mod baseline;
mod expression;
mod heuristic;
mod integrity;
mod policy;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{self, Diagnostic, ErrorKind};
use crate::error::TableResult;
use crate::file::Stats;
use crate::row::Row;
use crate::schema::Schema;
use crate::table::Header;
use crate::types::Cell;

pub use baseline::BaselineCheck;
pub use expression::Expression;
pub use heuristic::{Average, DeviatedValueCheck, DuplicateRowCheck, TruncatedValueCheck};
pub use integrity::{IntegrityCheck, IntegrityState, Lookup, compare_stats};
pub use policy::{BlacklistedValueCheck, RowConstraintCheck, SequentialValueCheck};

/// Inputs available to [`Check::prepare`].
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    pub schema: &'a Schema,
    /// Stats declared on the resource.
    pub expected: &'a Stats,
    /// Referenced keys for foreign-key checks.
    pub lookup: Option<&'a Arc<Lookup>>,
}

/// A validation rule with a fixed lifecycle.
pub trait Check: Send {
    /// Stable identifier, e.g. `"duplicate-row"`.
    fn code(&self) -> &'static str;

    /// Error kinds this check may emit.
    fn possible_errors(&self) -> &'static [&'static ErrorKind];

    fn prepare(&mut self, _context: &CheckContext<'_>) {}

    /// Reject a schema this check cannot work with (returns `check-error`s).
    fn validate_task(&self, _schema: &Schema) -> Vec<Diagnostic> {
        Vec::new()
    }

    fn validate_schema(&mut self, _schema: &Schema) -> Vec<Diagnostic> {
        Vec::new()
    }

    fn validate_headers(&mut self, _header: &Header) -> Vec<Diagnostic> {
        Vec::new()
    }

    fn validate_row(&mut self, _row: &Row) -> Vec<Diagnostic> {
        Vec::new()
    }

    /// Called once after the last row, with measured stats; skipped when validation
    /// stopped early.
    fn validate_table(&mut self, _stats: &Stats) -> Vec<Diagnostic> {
        Vec::new()
    }
}

/// `check-error` for a field the check needs but the schema lacks (or has with the wrong type).
pub(crate) fn field_requirement(
    code: &str,
    schema: &Schema,
    field_name: &str,
    accepts: impl Fn(crate::types::FieldType) -> bool,
) -> Vec<Diagnostic> {
    match schema.field(field_name) {
        None => vec![Diagnostic::new(
            &diagnostics::CHECK_ERROR,
            format!("{code} check requires field \"{field_name}\" to exist"),
        )],
        Some(field) if !accepts(field.field_type()) => vec![Diagnostic::new(
            &diagnostics::CHECK_ERROR,
            format!(
                "{code} check does not support field \"{field_name}\" of type \"{}\"",
                field.field_type().as_str()
            ),
        )],
        Some(_) => Vec::new(),
    }
}

/// Serializable description of a built-in check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "kebab-case")]
pub enum CheckDescriptor {
    Baseline,
    Integrity,
    DuplicateRow,
    DeviatedValue {
        #[serde(rename = "fieldName")]
        field_name: String,
        #[serde(default)]
        average: Average,
        #[serde(default = "default_interval")]
        interval: f64,
    },
    TruncatedValue,
    BlacklistedValue {
        #[serde(rename = "fieldName")]
        field_name: String,
        blacklist: Vec<Cell>,
    },
    SequentialValue {
        #[serde(rename = "fieldName")]
        field_name: String,
    },
    RowConstraint {
        formula: String,
    },
}

fn default_interval() -> f64 {
    3.0
}

impl CheckDescriptor {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Integrity => "integrity",
            Self::DuplicateRow => "duplicate-row",
            Self::DeviatedValue { .. } => "deviated-value",
            Self::TruncatedValue => "truncated-value",
            Self::BlacklistedValue { .. } => "blacklisted-value",
            Self::SequentialValue { .. } => "sequential-value",
            Self::RowConstraint { .. } => "row-constraint",
        }
    }

    /// Instantiate the check; a malformed row-constraint formula is rejected here.
    pub fn build(&self) -> TableResult<Box<dyn Check>> {
        Ok(match self {
            Self::Baseline => Box::new(BaselineCheck),
            Self::Integrity => Box::new(IntegrityCheck::new()),
            Self::DuplicateRow => Box::new(DuplicateRowCheck::new()),
            Self::DeviatedValue {
                field_name,
                average,
                interval,
            } => Box::new(DeviatedValueCheck::new(field_name.clone(), *average, *interval)?),
            Self::TruncatedValue => Box::new(TruncatedValueCheck),
            Self::BlacklistedValue { field_name, blacklist } => {
                Box::new(BlacklistedValueCheck::new(field_name.clone(), blacklist.clone()))
            }
            Self::SequentialValue { field_name } => Box::new(SequentialValueCheck::new(field_name.clone())),
            Self::RowConstraint { formula } => Box::new(RowConstraintCheck::new(formula)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_parse_with_defaults() {
        let parsed: Vec<CheckDescriptor> = serde_json::from_str(
            r#"[
                {"code": "duplicate-row"},
                {"code": "deviated-value", "fieldName": "price"},
                {"code": "blacklisted-value", "fieldName": "name", "blacklist": ["bad"]},
                {"code": "row-constraint", "formula": "salary > bonus"}
            ]"#,
        )
        .unwrap();
        assert_eq!(parsed[0], CheckDescriptor::DuplicateRow);
        assert_eq!(
            parsed[1],
            CheckDescriptor::DeviatedValue {
                field_name: "price".into(),
                average: Average::Mean,
                interval: 3.0
            }
        );
        let codes: Vec<&str> = parsed.iter().map(CheckDescriptor::code).collect();
        assert_eq!(codes, vec!["duplicate-row", "deviated-value", "blacklisted-value", "row-constraint"]);
        for descriptor in &parsed {
            assert_eq!(descriptor.build().unwrap().code(), descriptor.code());
        }
    }

    #[test]
    fn unknown_codes_and_bad_formulas_are_rejected() {
        assert!(serde_json::from_str::<CheckDescriptor>(r#"{"code": "nope"}"#).is_err());
        let bad = CheckDescriptor::RowConstraint {
            formula: "a >".into(),
        };
        assert!(bad.build().is_err());
        let bad_interval = CheckDescriptor::DeviatedValue {
            field_name: "x".into(),
            average: Average::Median,
            interval: -1.0,
        };
        assert!(bad_interval.build().is_err());
    }
}
