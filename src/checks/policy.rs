//! Checks enforcing publisher-defined rules.

use std::collections::HashSet;

use crate::diagnostics::{self, Diagnostic, ErrorKind};
use crate::error::TableResult;
use crate::row::Row;
use crate::schema::Schema;
use crate::types::{Cell, FieldType, Value, cell_to_string};

use super::{Check, Expression, field_requirement};

static BLACKLISTED_VALUE_ERRORS: [&ErrorKind; 1] = [&diagnostics::BLACKLISTED_VALUE];
static SEQUENTIAL_VALUE_ERRORS: [&ErrorKind; 1] = [&diagnostics::SEQUENTIAL_VALUE];
static ROW_CONSTRAINT_ERRORS: [&ErrorKind; 1] = [&diagnostics::ROW_CONSTRAINT];

/// Values of one field that must not appear.
///
/// A value matches a blacklist entry when their JSON forms are equal or their text is.
#[derive(Debug)]
pub struct BlacklistedValueCheck {
    field_name: String,
    blacklist: Vec<Cell>,
    texts: HashSet<String>,
    index: Option<usize>,
}

impl BlacklistedValueCheck {
    pub fn new(field_name: impl Into<String>, blacklist: Vec<Cell>) -> Self {
        let texts = blacklist.iter().map(cell_to_string).collect();
        Self {
            field_name: field_name.into(),
            blacklist,
            texts,
            index: None,
        }
    }

    fn is_blacklisted(&self, value: &Value) -> bool {
        self.blacklist.contains(&value.to_json()) || self.texts.contains(&value.to_string())
    }

    fn texts_joined(&self) -> String {
        self.blacklist.iter().map(cell_to_string).collect::<Vec<_>>().join(", ")
    }
}

impl Check for BlacklistedValueCheck {
    fn code(&self) -> &'static str {
        "blacklisted-value"
    }

    fn possible_errors(&self) -> &'static [&'static ErrorKind] {
        &BLACKLISTED_VALUE_ERRORS
    }

    fn validate_task(&self, schema: &Schema) -> Vec<Diagnostic> {
        field_requirement(self.code(), schema, &self.field_name, |_| true)
    }

    fn validate_schema(&mut self, schema: &Schema) -> Vec<Diagnostic> {
        self.index = schema.field_index(&self.field_name);
        Vec::new()
    }

    fn validate_row(&mut self, row: &Row) -> Vec<Diagnostic> {
        let Some(index) = self.index else { return Vec::new() };
        match row.values().get(index) {
            Some(value) if !value.is_null() && self.is_blacklisted(value) => vec![Diagnostic::for_cell(
                &diagnostics::BLACKLISTED_VALUE,
                format!("blacklisted values are \"{}\"", self.texts_joined()),
                &row.context(),
                row.cell_context(index),
            )],
            _ => Vec::new(),
        }
    }
}

/// What the sequence expects from the next row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expected {
    First,
    Next(i64),
    /// The previous value was `i64::MAX`; any further row breaks the sequence.
    End,
}

/// An integer field counting up by one from its first value.
///
/// The first break is reported and the check stops.
#[derive(Debug)]
pub struct SequentialValueCheck {
    field_name: String,
    index: Option<usize>,
    next: Expected,
    exited: bool,
}

impl SequentialValueCheck {
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            index: None,
            next: Expected::First,
            exited: false,
        }
    }
}

impl Check for SequentialValueCheck {
    fn code(&self) -> &'static str {
        "sequential-value"
    }

    fn possible_errors(&self) -> &'static [&'static ErrorKind] {
        &SEQUENTIAL_VALUE_ERRORS
    }

    fn validate_task(&self, schema: &Schema) -> Vec<Diagnostic> {
        field_requirement(self.code(), schema, &self.field_name, |t| t == FieldType::Integer)
    }

    fn validate_schema(&mut self, schema: &Schema) -> Vec<Diagnostic> {
        self.index = schema.field_index(&self.field_name);
        Vec::new()
    }

    fn validate_row(&mut self, row: &Row) -> Vec<Diagnostic> {
        let Some(index) = self.index else { return Vec::new() };
        if self.exited {
            return Vec::new();
        }
        let current = match row.values().get(index) {
            Some(Value::Integer(i)) => Some(*i),
            _ => None,
        };
        let after = |value: i64| value.checked_add(1).map_or(Expected::End, Expected::Next);
        match (current, self.next) {
            (Some(value), Expected::First) => self.next = after(value),
            (Some(value), Expected::Next(expected)) if value == expected => self.next = after(value),
            _ => {
                self.exited = true;
                return vec![Diagnostic::for_cell(
                    &diagnostics::SEQUENTIAL_VALUE,
                    "the value is not sequential",
                    &row.context(),
                    row.cell_context(index),
                )];
            }
        }
        Vec::new()
    }
}

/// A boolean expression over field values that every row must satisfy.
#[derive(Debug)]
pub struct RowConstraintCheck {
    expression: Expression,
}

impl RowConstraintCheck {
    pub fn new(formula: &str) -> TableResult<Self> {
        Ok(Self {
            expression: Expression::parse(formula)?,
        })
    }
}

impl Check for RowConstraintCheck {
    fn code(&self) -> &'static str {
        "row-constraint"
    }

    fn possible_errors(&self) -> &'static [&'static ErrorKind] {
        &ROW_CONSTRAINT_ERRORS
    }

    fn validate_row(&mut self, row: &Row) -> Vec<Diagnostic> {
        if self.expression.holds(&row.to_map()) {
            return Vec::new();
        }
        vec![Diagnostic::for_row(
            &diagnostics::ROW_CONSTRAINT,
            format!("the row constraint to conform is \"{}\"", self.expression),
            &row.context(),
        )]
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    fn schema(descriptor: &str) -> Arc<Schema> {
        Arc::new(Schema::from_json_str(descriptor).unwrap())
    }

    fn row(schema: &Arc<Schema>, cells: Vec<Cell>, position: usize) -> Row {
        let positions: Vec<usize> = (1..=cells.len()).collect();
        Row::new(Arc::clone(schema), cells, &positions, position, position - 1)
    }

    #[test]
    fn blacklisted_values() {
        let s = schema(
            r#"{"fields": [{"name": "id", "type": "integer"}, {"name": "name", "type": "string"}]}"#,
        );
        let mut check = BlacklistedValueCheck::new("id", vec![json!(2), json!("3")]);
        assert!(check.validate_task(&s).is_empty());
        check.validate_schema(&s);
        assert!(check.validate_row(&row(&s, vec![json!("1"), json!("a")], 2)).is_empty());
        assert_eq!(check.validate_row(&row(&s, vec![json!("2"), json!("b")], 3)).len(), 1);
        let errors = check.validate_row(&row(&s, vec![json!("3"), json!("c")], 4));
        assert_eq!(errors[0].note, "blacklisted values are \"2, 3\"");
        assert_eq!(errors[0].field_name(), Some("id"));
    }

    #[test]
    fn sequence_breaks_once() {
        let s = schema(r#"{"fields": [{"name": "id", "type": "integer"}]}"#);
        let mut check = SequentialValueCheck::new("id");
        check.validate_schema(&s);
        let mut errors = Vec::new();
        for (i, value) in ["5", "6", "8", "9", "1"].iter().enumerate() {
            errors.extend(check.validate_row(&row(&s, vec![json!(value)], i + 2)));
        }
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].row_position(), Some(4));

        let strings = schema(r#"{"fields": [{"name": "id", "type": "string"}]}"#);
        assert_eq!(check.validate_task(&strings)[0].code(), "check-error");
    }

    #[test]
    fn sequence_ends_at_the_largest_integer() {
        let s = schema(r#"{"fields": [{"name": "id", "type": "integer"}]}"#);
        let mut check = SequentialValueCheck::new("id");
        check.validate_schema(&s);
        let max = i64::MAX.to_string();
        let before = (i64::MAX - 1).to_string();
        assert!(check.validate_row(&row(&s, vec![json!(before)], 2)).is_empty());
        assert!(check.validate_row(&row(&s, vec![json!(max)], 3)).is_empty());
        let errors = check.validate_row(&row(&s, vec![json!("0")], 4));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].row_position(), Some(4));
    }

    #[test]
    fn row_constraint() {
        let s = schema(
            r#"{"fields": [{"name": "salary", "type": "number"}, {"name": "bonus", "type": "number"}]}"#,
        );
        let mut check = RowConstraintCheck::new("salary > bonus * 4").unwrap();
        assert!(check.validate_row(&row(&s, vec![json!("100"), json!("10")], 2)).is_empty());
        let errors = check.validate_row(&row(&s, vec![json!("100"), json!("30")], 3));
        assert_eq!(errors[0].code(), "row-constraint");
        assert_eq!(errors[0].note, "the row constraint to conform is \"salary > bonus * 4\"");
    }
}
