//! Header assembly and header-level diagnostics.

use crate::diagnostics::{self, Diagnostic, HeaderContext};
use crate::schema::{Schema, labels_match};
use crate::types::{Cell, cell_to_string};

/// Join header records column by column.
///
/// A cell identical to the previous header row's cell at the same position is not joined
/// again (merged cells spanning a multi-row header), and empty cells add nothing.
pub fn join_labels(records: &[Vec<Cell>], joiner: &str) -> Vec<String> {
    let width = records.iter().map(Vec::len).max().unwrap_or(0);
    let mut labels = vec![String::new(); width];
    let mut previous: Vec<Option<String>> = vec![None; width];
    for record in records {
        for (index, cell) in record.iter().enumerate() {
            let text = match cell {
                Cell::Null => String::new(),
                other => cell_to_string(other).trim().to_string(),
            };
            if text.is_empty() || previous[index].as_deref() == Some(text.as_str()) {
                continue;
            }
            if !labels[index].is_empty() {
                labels[index].push_str(joiner);
            }
            labels[index].push_str(&text);
            previous[index] = Some(text);
        }
    }
    labels
}

/// Resolved header of an open table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    labels: Vec<String>,
    field_names: Vec<String>,
    field_positions: Vec<usize>,
    row_positions: Vec<usize>,
    errors: Vec<Diagnostic>,
}

impl Header {
    /// Compare `labels` (already field-filtered) with the schema.
    ///
    /// Positions past `field_positions` continue counting from its last entry.
    pub fn new(
        labels: Vec<String>,
        schema: &Schema,
        field_positions: &[usize],
        row_positions: Vec<usize>,
        case_sensitive: bool,
    ) -> Self {
        let field_names: Vec<String> = schema.field_names().iter().map(|n| n.to_string()).collect();
        let width = labels.len().max(field_names.len());
        let positions: Vec<usize> = (0..width)
            .map(|index| match field_positions.get(index) {
                Some(&p) => p,
                None => field_positions.last().copied().unwrap_or(0) + index + 1 - field_positions.len(),
            })
            .collect();

        let mut errors = Vec::new();
        if !row_positions.is_empty() {
            let context = |index: usize, label: &str, name: &str| HeaderContext {
                labels: labels.clone(),
                label: label.to_string(),
                field_name: name.to_string(),
                field_number: index + 1,
                field_position: positions[index],
                row_positions: row_positions.clone(),
            };
            for index in 0..width {
                let name = field_names.get(index).map(String::as_str);
                let Some(label) = labels.get(index) else {
                    let name = name.unwrap_or_default();
                    errors.push(Diagnostic::for_header(
                        &diagnostics::MISSING_HEADER,
                        "",
                        context(index, "", name),
                    ));
                    continue;
                };
                let Some(name) = name else {
                    errors.push(Diagnostic::for_header(
                        &diagnostics::EXTRA_HEADER,
                        "",
                        context(index, label, ""),
                    ));
                    continue;
                };
                if label.is_empty() {
                    errors.push(Diagnostic::for_header(
                        &diagnostics::BLANK_HEADER,
                        "",
                        context(index, label, name),
                    ));
                    continue;
                }
                let earlier: Vec<String> = labels[..index]
                    .iter()
                    .enumerate()
                    .filter(|(_, other)| labels_match(other, label, case_sensitive))
                    .map(|(i, _)| positions[i].to_string())
                    .collect();
                if !earlier.is_empty() {
                    errors.push(Diagnostic::for_header(
                        &diagnostics::DUPLICATE_HEADER,
                        format!("at position \"{}\"", earlier.join(", ")),
                        context(index, label, name),
                    ));
                    continue;
                }
                if !labels_match(label, name, case_sensitive) {
                    errors.push(Diagnostic::for_header(
                        &diagnostics::NON_MATCHING_HEADER,
                        "",
                        context(index, label, name),
                    ));
                }
            }
        }

        Self {
            labels,
            field_names,
            field_positions: positions,
            row_positions,
            errors,
        }
    }

    /// Labels as read from the header rows; empty for headerless tables.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn field_positions(&self) -> &[usize] {
        &self.field_positions
    }

    /// Physical positions of the header rows.
    pub fn row_positions(&self) -> &[usize] {
        &self.row_positions
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether the table had header rows at all.
    pub fn is_present(&self) -> bool {
        !self.row_positions.is_empty()
    }
}
