use crate::diagnostics::{self, Diagnostic, ErrorKind};
use crate::row::Row;
use crate::table::Header;

use super::Check;

static POSSIBLE_ERRORS: [&ErrorKind; 10] = [
    &diagnostics::BLANK_HEADER,
    &diagnostics::DUPLICATE_HEADER,
    &diagnostics::NON_MATCHING_HEADER,
    &diagnostics::EXTRA_HEADER,
    &diagnostics::MISSING_HEADER,
    &diagnostics::BLANK_ROW,
    &diagnostics::EXTRA_CELL,
    &diagnostics::MISSING_CELL,
    &diagnostics::TYPE_ERROR,
    &diagnostics::CONSTRAINT_ERROR,
];

/// Surfaces the header and row errors computed while reading the table.
///
/// Errors appended by other paths (inline integrity) are left to their own checks.
#[derive(Debug, Default, Clone, Copy)]
pub struct BaselineCheck;

impl BaselineCheck {
    fn owns(error: &Diagnostic) -> bool {
        POSSIBLE_ERRORS.iter().any(|kind| kind.code == error.code())
    }
}

impl Check for BaselineCheck {
    fn code(&self) -> &'static str {
        "baseline"
    }

    fn possible_errors(&self) -> &'static [&'static ErrorKind] {
        &POSSIBLE_ERRORS
    }

    fn validate_headers(&mut self, header: &Header) -> Vec<Diagnostic> {
        header.errors().to_vec()
    }

    fn validate_row(&mut self, row: &Row) -> Vec<Diagnostic> {
        row.errors().iter().filter(|e| Self::owns(e)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::schema::Schema;

    #[test]
    fn forwards_structural_and_type_errors_only() {
        let schema = Arc::new(
            Schema::from_json_str(
                r#"{"fields": [{"name": "id", "type": "integer"}, {"name": "n", "type": "string"}]}"#,
            )
            .unwrap(),
        );
        let mut row = Row::new(schema, vec![json!("x"), json!("a"), json!("extra")], &[1, 2], 2, 1);
        row.push_error(Diagnostic::new(&diagnostics::UNIQUE_ERROR, ""));
        let codes: Vec<_> = BaselineCheck.validate_row(&row).iter().map(Diagnostic::code).collect();
        assert_eq!(codes, vec!["extra-cell", "type-error"]);
    }
}
