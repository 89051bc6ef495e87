use std::sync::Arc;

use proptest::prelude::*;
use tabular_validate::row::Row;
use tabular_validate::schema::{Field, Schema};
use tabular_validate::types::{Cell, FieldType};

fn string_schema(width: usize) -> Arc<Schema> {
    let fields = (1..=width).map(|i| Field::new(format!("f{i}"), FieldType::String)).collect();
    Arc::new(Schema::new(fields).unwrap())
}

fn positions(width: usize) -> Vec<usize> {
    (1..=width).collect()
}

fn write_back(field: &Field, raw: &str) -> (Option<String>, usize) {
    let (value, notes) = field.read_cell(&Cell::from(raw));
    (field.write_cell(&value).0, notes.len())
}

fn codes(row: &Row) -> Vec<&'static str> {
    row.errors().iter().map(|e| e.code()).collect()
}

proptest! {
    #[test]
    fn surplus_cells_are_extra_cells(width in 1usize..6, surplus in 1usize..4, word in "[a-z]{1,6}") {
        let cells: Vec<Cell> = (0..width + surplus).map(|_| Cell::String(word.clone())).collect();
        let row = Row::new(string_schema(width), cells, &positions(width), 2, 1);

        prop_assert_eq!(codes(&row), vec!["extra-cell"; surplus]);
        let fields: Vec<Option<usize>> = row.errors().iter().map(|e| e.field_position()).collect();
        let expected: Vec<Option<usize>> = (width + 1..=width + surplus).map(Some).collect();
        prop_assert_eq!(fields, expected);
        prop_assert_eq!(row.values().len(), width);
    }

    #[test]
    fn absent_cells_are_missing_cells(width in 2usize..7, present in 1usize..6, word in "[a-z]{1,6}") {
        prop_assume!(present < width);
        let cells: Vec<Cell> = (0..present).map(|_| Cell::String(word.clone())).collect();
        let row = Row::new(string_schema(width), cells, &positions(width), 2, 1);

        prop_assert_eq!(codes(&row), vec!["missing-cell"; width - present]);
        prop_assert!(row.values()[present..].iter().all(|v| v.is_null()));
    }

    #[test]
    fn blank_rows_keep_a_single_error(width in 1usize..7, present in 0usize..7) {
        prop_assume!(present <= width);
        let cells: Vec<Cell> = (0..present).map(|_| Cell::String(String::new())).collect();
        let row = Row::new(string_schema(width), cells, &positions(width), 5, 3);

        prop_assert!(row.is_blank());
        prop_assert_eq!(codes(&row), vec!["blank-row"]);
        prop_assert_eq!(row.errors()[0].row_position(), Some(5));
    }

    #[test]
    fn numbers_write_back_as_read(raw in "[+-]?[0-9]{1,4}(\\.[0-9]{1,4})?([eE][+-]?[0-9]{1,2})?") {
        let (written, notes) = write_back(&Field::new("n", FieldType::Number), &raw);
        prop_assert_eq!(notes, 0);
        prop_assert_eq!(written.as_deref(), Some(raw.as_str()));
    }

    #[test]
    fn datetimes_write_back_as_read(
        date in (1970i32..2100, 1u32..=12, 1u32..=28),
        time in (0u32..24, 0u32..60, 0u32..60),
        fraction in proptest::option::of("[0-9]{1,6}"),
        zone in 0u8..3,
        quarters in -56i32..=56,
    ) {
        let mut raw = format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            date.0, date.1, date.2, time.0, time.1, time.2
        );
        if let Some(digits) = &fraction {
            raw.push('.');
            raw.push_str(digits);
        }
        match zone {
            1 => raw.push('Z'),
            2 => {
                let minutes = quarters * 15;
                let sign = if minutes < 0 { '-' } else { '+' };
                raw.push_str(&format!("{sign}{:02}:{:02}", minutes.abs() / 60, minutes.abs() % 60));
            }
            _ => {}
        }
        let (written, notes) = write_back(&Field::new("at", FieldType::Datetime), &raw);
        prop_assert_eq!(notes, 0);
        prop_assert_eq!(written.as_deref(), Some(raw.as_str()));
    }
}
