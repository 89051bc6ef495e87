//! Validation results.
//!
//! A [`Report`] is built once at the end of a run and never mutated afterwards. It
//! serializes to the camelCase shape
//! `{version, time, valid, stats: {errors, tables}, errors, tables: [...]}` and reads back
//! from JSON or YAML, restoring built-in error kinds by code.

use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostic;
use crate::error::TableResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStats {
    pub errors: usize,
    pub tables: usize,
}

/// Counters of one validated table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub errors: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Result of validating one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTable {
    pub name: String,
    /// Where the data came from (path, `<text>`, ...).
    pub place: String,
    pub valid: bool,
    /// True when an error or memory budget stopped the run.
    pub partial: bool,
    /// Error codes the registered checks could have produced.
    pub scope: Vec<String>,
    /// Seconds spent.
    pub time: f64,
    pub stats: TableStats,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub field_names: Vec<String>,
    pub errors: Vec<Diagnostic>,
}

impl ReportTable {
    /// A table that could not be opened: invalid, with that single error.
    pub fn from_error(name: String, place: String, scope: Vec<String>, error: Diagnostic, time: f64) -> Self {
        Self {
            name,
            place,
            valid: false,
            partial: false,
            scope,
            time,
            stats: TableStats {
                errors: 1,
                ..TableStats::default()
            },
            labels: Vec::new(),
            field_names: Vec::new(),
            errors: vec![error],
        }
    }

    /// Project every error onto `keys` (serialized names such as `rowPosition` or `code`);
    /// absent keys become `null`.
    pub fn flatten(&self, keys: &[&str]) -> Vec<Vec<serde_json::Value>> {
        flatten_errors(&self.errors, keys)
    }

    pub fn error_codes(&self) -> Vec<&'static str> {
        self.errors.iter().map(Diagnostic::code).collect()
    }
}

fn flatten_errors(errors: &[Diagnostic], keys: &[&str]) -> Vec<Vec<serde_json::Value>> {
    errors
        .iter()
        .map(|error| {
            let value = serde_json::to_value(error).unwrap_or_default();
            keys.iter()
                .map(|key| value.get(*key).cloned().unwrap_or(serde_json::Value::Null))
                .collect()
        })
        .collect()
}

/// Outcome of a validation run over one or more tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub version: String,
    pub time: f64,
    pub valid: bool,
    pub stats: ReportStats,
    /// Errors not tied to a table (e.g. an unreadable package descriptor).
    pub errors: Vec<Diagnostic>,
    pub tables: Vec<ReportTable>,
}

impl Report {
    pub fn from_tables(tables: Vec<ReportTable>, errors: Vec<Diagnostic>, time: f64) -> Self {
        let error_count = errors.len() + tables.iter().map(|t| t.errors.len()).sum::<usize>();
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            time,
            valid: error_count == 0 && tables.iter().all(|t| t.valid),
            stats: ReportStats {
                errors: error_count,
                tables: tables.len(),
            },
            errors,
            tables,
        }
    }

    /// A report for a task that failed before any table was read.
    pub fn from_errors(errors: Vec<Diagnostic>, time: f64) -> Self {
        Self::from_tables(Vec::new(), errors, time)
    }

    /// First table, for single-table runs.
    pub fn table(&self) -> Option<&ReportTable> {
        self.tables.first()
    }

    /// [`ReportTable::flatten`] across all tables, prefixed by task-level errors.
    pub fn flatten(&self, keys: &[&str]) -> Vec<Vec<serde_json::Value>> {
        let mut rows = flatten_errors(&self.errors, keys);
        for table in &self.tables {
            rows.extend(table.flatten(keys));
        }
        rows
    }

    pub fn to_json(&self) -> TableResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> TableResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_json_str(input: &str) -> TableResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_yaml_str(input: &str) -> TableResult<Self> {
        Ok(serde_yaml::from_str(input)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::diagnostics::{self, RowContext};

    fn sample() -> Report {
        let row = RowContext {
            cells: vec!["1".into(), "x".into()],
            row_number: 1,
            row_position: 2,
        };
        let table = ReportTable {
            name: "people".into(),
            place: "people.csv".into(),
            valid: false,
            partial: false,
            scope: vec!["blank-row".into()],
            time: 0.01,
            stats: TableStats {
                errors: 1,
                rows: Some(1),
                bytes: Some(8),
                hash: None,
            },
            labels: vec!["id".into(), "name".into()],
            field_names: vec!["id".into(), "name".into()],
            errors: vec![Diagnostic::for_row(&diagnostics::BLANK_ROW, "", &row)],
        };
        Report::from_tables(vec![table], Vec::new(), 0.02)
    }

    #[test]
    fn counts_and_validity() {
        let report = sample();
        assert!(!report.valid);
        assert_eq!(report.stats, ReportStats { errors: 1, tables: 1 });
        assert!(Report::from_tables(Vec::new(), Vec::new(), 0.0).valid);
        assert!(!Report::from_errors(vec![Diagnostic::new(&diagnostics::TASK_ERROR, "boom")], 0.0).valid);
    }

    #[test]
    fn serializes_with_camel_case_keys_and_reads_back() {
        let report = sample();
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["tables"][0]["fieldNames"], json!(["id", "name"]));
        assert_eq!(value["tables"][0]["errors"][0]["rowPosition"], json!(2));
        assert_eq!(value["stats"]["tables"], json!(1));
        assert_eq!(Report::from_json_str(&report.to_json().unwrap()).unwrap(), report);
        assert_eq!(Report::from_yaml_str(&report.to_yaml().unwrap()).unwrap(), report);
    }

    #[test]
    fn flatten_projects_keys() {
        let report = sample();
        assert_eq!(
            report.flatten(&["rowPosition", "fieldPosition", "code"]),
            vec![vec![json!(2), json!(null), json!("blank-row")]]
        );
    }
}
