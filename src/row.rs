//! One materialized record aligned to a schema.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::diagnostics::{self, CellContext, Diagnostic, RowContext};
use crate::schema::Schema;
use crate::types::{Cell, Value, cell_to_string};

/// A typed row produced by [`crate::table::RowStream`].
///
/// Construction runs the structural rules in order:
///
/// 1. surplus cells each produce an `extra-cell` error at their physical field position and
///    are dropped before alignment
/// 2. absent cells each produce a `missing-cell` error at the field's expected position and
///    read as `null`
/// 3. every aligned cell goes through [`crate::schema::Field::read_cell`]; a failed cast is a
///    `type-error`, every other note a `constraint-error`
/// 4. a row whose cells are all blank keeps exactly one `blank-row` error
///
/// Checks may append diagnostics with [`Row::push_error`]; values never change.
#[derive(Debug, Clone)]
pub struct Row {
    schema: Arc<Schema>,
    cells: Vec<Cell>,
    values: Vec<Value>,
    field_positions: Vec<usize>,
    row_position: usize,
    row_number: usize,
    blank_cells: BTreeMap<String, Cell>,
    error_cells: BTreeMap<String, Cell>,
    errors: Vec<Diagnostic>,
}

impl Row {
    /// Build a row from raw (already field-filtered) cells.
    ///
    /// `field_positions[i]` is the physical 1-based position of the `i`-th cell slot. Slots
    /// beyond the list continue counting from its last entry.
    pub fn new(
        schema: Arc<Schema>,
        cells: Vec<Cell>,
        field_positions: &[usize],
        row_position: usize,
        row_number: usize,
    ) -> Self {
        let position_at = |index: usize| match field_positions.get(index) {
            Some(&p) => p,
            None => field_positions.last().copied().unwrap_or(0) + index + 1 - field_positions.len(),
        };
        let context = RowContext {
            cells: cells.iter().map(cell_to_string).collect(),
            row_number,
            row_position,
        };

        let fields = schema.fields();
        let width = cells.len().max(fields.len());
        let positions: Vec<usize> = (0..width).map(position_at).collect();
        let mut errors = Vec::new();
        let mut values = Vec::with_capacity(fields.len());
        let mut blank_cells = BTreeMap::new();
        let mut error_cells = BTreeMap::new();
        let mut non_blank = false;

        // Extra cells
        for (index, cell) in cells.iter().enumerate().skip(fields.len()) {
            let is_blank = match cell {
                Cell::Null => true,
                Cell::String(s) => schema.missing_values().iter().any(|m| m == s),
                _ => false,
            };
            non_blank |= !is_blank;
            errors.push(Diagnostic::for_cell(
                &diagnostics::EXTRA_CELL,
                "",
                &context,
                CellContext {
                    cell: cell_to_string(cell),
                    field_name: String::new(),
                    field_number: index + 1,
                    field_position: positions[index],
                },
            ));
        }

        for (index, field) in fields.iter().enumerate() {
            let Some(cell) = cells.get(index) else {
                errors.push(Diagnostic::for_cell(
                    &diagnostics::MISSING_CELL,
                    "",
                    &context,
                    CellContext {
                        cell: String::new(),
                        field_name: field.name().to_string(),
                        field_number: index + 1,
                        field_position: positions[index],
                    },
                ));
                blank_cells.insert(field.name().to_string(), Cell::Null);
                values.push(Value::Null);
                continue;
            };

            let (value, notes) = field.read_cell(cell);
            let type_failed = notes.iter().any(|n| n.is_type());
            if value.is_null() && !type_failed {
                blank_cells.insert(field.name().to_string(), cell.clone());
            } else {
                non_blank = true;
            }
            if !notes.is_empty() {
                error_cells.insert(field.name().to_string(), cell.clone());
            }
            for note in notes {
                let kind = if note.is_type() {
                    &diagnostics::TYPE_ERROR
                } else {
                    &diagnostics::CONSTRAINT_ERROR
                };
                errors.push(Diagnostic::for_cell(
                    kind,
                    note.message,
                    &context,
                    CellContext {
                        cell: cell_to_string(cell),
                        field_name: field.name().to_string(),
                        field_number: index + 1,
                        field_position: positions[index],
                    },
                ));
            }
            values.push(value);
        }

        if !non_blank {
            errors = vec![Diagnostic::for_row(&diagnostics::BLANK_ROW, "", &context)];
        }

        Self {
            schema,
            cells,
            values,
            field_positions: positions,
            row_position,
            row_number,
            blank_cells,
            error_cells,
            errors,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Raw cells as read from the source (after field filtering).
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Typed values aligned with the schema fields.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.field_index(name).and_then(|i| self.values.get(i))
    }

    pub fn field_positions(&self) -> &[usize] {
        &self.field_positions
    }

    pub fn row_position(&self) -> usize {
        self.row_position
    }

    pub fn row_number(&self) -> usize {
        self.row_number
    }

    pub fn blank_cells(&self) -> &BTreeMap<String, Cell> {
        &self.blank_cells
    }

    pub fn error_cells(&self) -> &BTreeMap<String, Cell> {
        &self.error_cells
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_blank(&self) -> bool {
        self.errors.first().is_some_and(|e| e.code() == diagnostics::BLANK_ROW.code)
    }

    pub fn push_error(&mut self, error: Diagnostic) {
        self.errors.push(error);
    }

    /// Context used by row- and cell-level diagnostics emitted by checks.
    pub fn context(&self) -> RowContext {
        RowContext {
            cells: self.cells.iter().map(cell_to_string).collect(),
            row_number: self.row_number,
            row_position: self.row_position,
        }
    }

    /// Cell context for the field at `index` in the schema.
    pub fn cell_context(&self, index: usize) -> CellContext {
        CellContext {
            cell: self.cells.get(index).map(cell_to_string).unwrap_or_default(),
            field_name: self
                .schema
                .fields()
                .get(index)
                .map(|f| f.name().to_string())
                .unwrap_or_default(),
            field_number: index + 1,
            field_position: self.field_positions.get(index).copied().unwrap_or(index + 1),
        }
    }

    /// Field name → JSON value mapping in schema order.
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.schema
            .fields()
            .iter()
            .zip(&self.values)
            .map(|(f, v)| (f.name().to_string(), v.to_json()))
            .collect()
    }

    /// Raw text of each value written back through its field.
    pub fn to_strings(&self) -> Vec<Option<String>> {
        self.schema
            .fields()
            .iter()
            .zip(&self.values)
            .map(|(f, v)| f.write_cell(v).0)
            .collect()
    }
}
