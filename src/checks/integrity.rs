//! Uniqueness, primary-key, foreign-key and stream-stats checks.
//!
//! [`IntegrityState`] holds the matching logic and is shared by [`IntegrityCheck`] and the
//! inline path of [`crate::table::RowStream`], so both report the same diagnostics for the
//! same rows.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::diagnostics::{self, Diagnostic, ErrorKind};
use crate::file::Stats;
use crate::row::Row;
use crate::schema::Schema;
use crate::types::Value;

use super::{Check, CheckContext};

/// Referenced key tuples: resource name → referenced field names → value tuples.
///
/// The empty resource name stands for the table itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lookup {
    tables: HashMap<String, HashMap<Vec<String>, HashSet<Vec<Value>>>>,
}

impl Lookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one key tuple.
    pub fn insert(&mut self, resource: &str, fields: &[String], values: Vec<Value>) {
        self.tables
            .entry(resource.to_string())
            .or_default()
            .entry(fields.to_vec())
            .or_default()
            .insert(values);
    }

    /// Register many key tuples at once.
    pub fn extend(&mut self, resource: &str, fields: &[String], rows: impl IntoIterator<Item = Vec<Value>>) {
        let keys = self
            .tables
            .entry(resource.to_string())
            .or_default()
            .entry(fields.to_vec())
            .or_default();
        keys.extend(rows);
    }

    /// `None` when nothing was registered for `resource`, so the key cannot be checked.
    pub fn contains(&self, resource: &str, fields: &[String], values: &[Value]) -> Option<bool> {
        let table = self.tables.get(resource)?;
        Some(table.get(fields).is_some_and(|keys| keys.contains(values)))
    }
}

struct ForeignKeyIndex {
    local: Vec<usize>,
    resource: String,
    fields: Vec<String>,
    names: Vec<String>,
}

/// Running state of the integrity rules over one row stream.
pub struct IntegrityState {
    unique: Vec<(usize, HashMap<Value, usize>)>,
    primary_key: Option<(Vec<usize>, HashMap<Vec<Value>, usize>)>,
    foreign_keys: Vec<ForeignKeyIndex>,
    lookup: Option<Arc<Lookup>>,
}

impl std::fmt::Debug for IntegrityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityState")
            .field("unique_fields", &self.unique.len())
            .field("primary_key", &self.primary_key.as_ref().map(|(i, _)| i))
            .field("foreign_keys", &self.foreign_keys.len())
            .field("lookup", &self.lookup.is_some())
            .finish()
    }
}

impl IntegrityState {
    pub fn new(schema: &Schema, lookup: Option<Arc<Lookup>>) -> Self {
        let unique = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| f.unique())
            .map(|(i, _)| (i, HashMap::new()))
            .collect();
        let primary_key = (!schema.primary_key().is_empty()).then(|| {
            let indexes = schema
                .primary_key()
                .iter()
                .filter_map(|name| schema.field_index(name))
                .collect();
            (indexes, HashMap::new())
        });
        let foreign_keys = schema
            .foreign_keys()
            .iter()
            .map(|fk| ForeignKeyIndex {
                local: fk.fields.iter().filter_map(|n| schema.field_index(n)).collect(),
                resource: fk.reference.resource.clone(),
                fields: fk.reference.fields.clone(),
                names: fk.fields.clone(),
            })
            .collect();
        Self {
            unique,
            primary_key,
            foreign_keys,
            lookup,
        }
    }

    /// Diagnostics for one row, in unique → primary key → foreign key order.
    pub fn evaluate(&mut self, row: &Row) -> Vec<Diagnostic> {
        let mut errors = Vec::new();
        if row.is_blank() {
            return errors;
        }
        let context = row.context();
        let position = row.row_position();

        for (index, seen) in &mut self.unique {
            let Some(value) = row.values().get(*index) else { continue };
            if value.is_null() {
                continue;
            }
            match seen.get(value) {
                Some(first) => errors.push(Diagnostic::for_cell(
                    &diagnostics::UNIQUE_ERROR,
                    format!("the same as in the row at position {first}"),
                    &context,
                    row.cell_context(*index),
                )),
                None => {
                    seen.insert(value.clone(), position);
                }
            }
        }

        if let Some((indexes, seen)) = &mut self.primary_key {
            let key: Vec<Value> = indexes
                .iter()
                .map(|&i| row.values().get(i).cloned().unwrap_or(Value::Null))
                .collect();
            if key.iter().all(Value::is_null) {
                errors.push(Diagnostic::for_row(
                    &diagnostics::PRIMARY_KEY_ERROR,
                    "cells composing the primary key are all null",
                    &context,
                ));
            } else if let Some(first) = seen.get(&key) {
                errors.push(Diagnostic::for_row(
                    &diagnostics::PRIMARY_KEY_ERROR,
                    format!("the same as in the row at position {first}"),
                    &context,
                ));
            } else {
                seen.insert(key, position);
            }
        }

        if let Some(lookup) = &self.lookup {
            for fk in &self.foreign_keys {
                let key: Vec<Value> = fk
                    .local
                    .iter()
                    .map(|&i| row.values().get(i).cloned().unwrap_or(Value::Null))
                    .collect();
                if key.iter().all(Value::is_null) {
                    continue;
                }
                if lookup.contains(&fk.resource, &fk.fields, &key) == Some(false) {
                    let shown: Vec<String> = key.iter().map(Value::to_string).collect();
                    let target = if fk.resource.is_empty() { "<self>" } else { fk.resource.as_str() };
                    errors.push(Diagnostic::for_row(
                        &diagnostics::FOREIGN_KEY_ERROR,
                        format!(
                            "for \"{}\": values \"{}\" not found in the lookup table \"{}\" as \"{}\"",
                            fk.names.join(", "),
                            shown.join(", "),
                            target,
                            fk.fields.join(", "),
                        ),
                        &context,
                    ));
                }
            }
        }
        errors
    }
}

/// Compare measured stream stats with the expected ones.
pub fn compare_stats(expected: &Stats, actual: &Stats) -> Vec<Diagnostic> {
    let mut errors = Vec::new();
    if let (Some(want), Some(got)) = (&expected.hash, &actual.hash) {
        let want = want.split_once(':').map_or(want.as_str(), |(_, digest)| digest);
        if !want.eq_ignore_ascii_case(got) {
            errors.push(Diagnostic::new(
                &diagnostics::HASH_COUNT_ERROR,
                format!("expected is \"{want}\" and actual is \"{got}\""),
            ));
        }
    }
    if let (Some(want), Some(got)) = (expected.bytes, actual.bytes) {
        if want != got {
            errors.push(Diagnostic::new(
                &diagnostics::BYTE_COUNT_ERROR,
                format!("expected is \"{want}\" and actual is \"{got}\""),
            ));
        }
    }
    if let (Some(want), Some(got)) = (expected.rows, actual.rows) {
        if want != got {
            errors.push(Diagnostic::new(
                &diagnostics::ROW_COUNT_ERROR,
                format!("expected is \"{want}\" and actual is \"{got}\""),
            ));
        }
    }
    errors
}

static POSSIBLE_ERRORS: [&ErrorKind; 6] = [
    &diagnostics::HASH_COUNT_ERROR,
    &diagnostics::BYTE_COUNT_ERROR,
    &diagnostics::ROW_COUNT_ERROR,
    &diagnostics::UNIQUE_ERROR,
    &diagnostics::PRIMARY_KEY_ERROR,
    &diagnostics::FOREIGN_KEY_ERROR,
];

/// Unique/primary/foreign keys per row, stream stats at the end.
#[derive(Debug, Default)]
pub struct IntegrityCheck {
    state: Option<IntegrityState>,
    expected: Stats,
}

impl IntegrityCheck {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Check for IntegrityCheck {
    fn code(&self) -> &'static str {
        "integrity"
    }

    fn possible_errors(&self) -> &'static [&'static ErrorKind] {
        &POSSIBLE_ERRORS
    }

    fn prepare(&mut self, context: &CheckContext<'_>) {
        self.state = Some(IntegrityState::new(context.schema, context.lookup.cloned()));
        self.expected = context.expected.clone();
    }

    fn validate_row(&mut self, row: &Row) -> Vec<Diagnostic> {
        match &mut self.state {
            Some(state) => state.evaluate(row),
            None => Vec::new(),
        }
    }

    fn validate_table(&mut self, stats: &Stats) -> Vec<Diagnostic> {
        compare_stats(&self.expected, stats)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn schema(descriptor: &str) -> Arc<Schema> {
        Arc::new(Schema::from_json_str(descriptor).unwrap())
    }

    fn row(schema: &Arc<Schema>, cells: Vec<serde_json::Value>, position: usize) -> Row {
        let positions: Vec<usize> = (1..=cells.len()).collect();
        Row::new(Arc::clone(schema), cells, &positions, position, position - 1)
    }

    fn codes(errors: &[Diagnostic]) -> Vec<&'static str> {
        errors.iter().map(Diagnostic::code).collect()
    }

    #[test]
    fn unique_points_at_first_occurrence() {
        let s = schema(r#"{"fields": [{"name": "id", "type": "integer", "constraints": {"unique": true}}]}"#);
        let mut state = IntegrityState::new(&s, None);
        assert!(state.evaluate(&row(&s, vec![json!("1")], 2)).is_empty());
        assert!(state.evaluate(&row(&s, vec![json!("2")], 3)).is_empty());
        let errors = state.evaluate(&row(&s, vec![json!("1")], 4));
        assert_eq!(codes(&errors), vec!["unique-error"]);
        assert_eq!(errors[0].note, "the same as in the row at position 2");
        assert!(state.evaluate(&row(&s, vec![json!("")], 5)).is_empty());
    }

    #[test]
    fn primary_key_duplicates_and_nulls() {
        let s = schema(
            r#"{"fields": [{"name": "a", "type": "integer"}, {"name": "b", "type": "string"}],
                "primaryKey": ["a", "b"]}"#,
        );
        let mut state = IntegrityState::new(&s, None);
        assert!(state.evaluate(&row(&s, vec![json!("1"), json!("x")], 2)).is_empty());
        assert!(state.evaluate(&row(&s, vec![json!("1"), json!("y")], 3)).is_empty());
        let dup = state.evaluate(&row(&s, vec![json!("1"), json!("x")], 4));
        assert_eq!(codes(&dup), vec!["primary-key-error"]);
        assert!(dup[0].note.contains("position 2"));

        let mut all_null = Row::new(Arc::clone(&s), vec![json!(""), json!("")], &[1, 2], 5, 4);
        // A blank row only carries its blank-row error.
        assert!(state.evaluate(&all_null).is_empty());
        all_null = Row::new(Arc::clone(&s), vec![json!(""), json!(""), json!("z")], &[1, 2, 3], 6, 5);
        let errors = state.evaluate(&all_null);
        assert_eq!(codes(&errors), vec!["primary-key-error"]);
        assert!(errors[0].note.contains("all null"));
    }

    #[test]
    fn foreign_keys_use_the_lookup() {
        let s = schema(
            r#"{"fields": [{"name": "id", "type": "integer"}],
                "foreignKeys": [{"fields": "id", "reference": {"resource": "ids", "fields": "id"}}]}"#,
        );
        let mut lookup = Lookup::new();
        let fields = vec!["id".to_string()];
        lookup.extend("ids", &fields, [vec![Value::Integer(1)], vec![Value::Integer(2)]]);
        let mut state = IntegrityState::new(&s, Some(Arc::new(lookup)));

        let found: Vec<_> = (1..=3)
            .flat_map(|id| state.evaluate(&row(&s, vec![json!(id.to_string())], id + 1)))
            .collect();
        assert_eq!(codes(&found), vec!["foreign-key-error"]);
        assert_eq!(found[0].row_position(), Some(4));
        assert!(found[0].note.contains("\"3\""));
    }

    #[test]
    fn unknown_lookup_resource_is_not_checked() {
        let s = schema(
            r#"{"fields": [{"name": "id", "type": "integer"}],
                "foreignKeys": [{"fields": "id", "reference": {"resource": "other", "fields": "id"}}]}"#,
        );
        let mut state = IntegrityState::new(&s, Some(Arc::new(Lookup::new())));
        assert!(state.evaluate(&row(&s, vec![json!("9")], 2)).is_empty());
    }

    #[test]
    fn stats_comparison() {
        let expected = Stats {
            hash: Some("sha256:ABC".into()),
            bytes: Some(10),
            rows: Some(2),
        };
        let actual = Stats {
            hash: Some("abc".into()),
            bytes: Some(11),
            rows: Some(2),
        };
        assert_eq!(codes(&compare_stats(&expected, &actual)), vec!["byte-count-error"]);
        assert!(compare_stats(&Stats::default(), &actual).is_empty());
    }
}
