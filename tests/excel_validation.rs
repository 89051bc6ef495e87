#![cfg(feature = "excel_test_writer")]

use std::path::{Path, PathBuf};

use tabular_validate::dialect::{Dialect, SheetRef};
use tabular_validate::schema::Schema;
use tabular_validate::table::Table;
use tabular_validate::types::Value;
use tabular_validate::validate::{ValidateOptions, validate};

fn write_people_xlsx(path: &Path) {
    use rust_xlsxwriter::Workbook;

    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.set_name("People").unwrap();
    for (col, label) in ["id", "name", "score", "active"].into_iter().enumerate() {
        ws.write_string(0, col as u16, label).unwrap();
    }
    ws.write_number(1, 0, 1).unwrap();
    ws.write_string(1, 1, "Ada").unwrap();
    ws.write_number(1, 2, 98.5).unwrap();
    ws.write_boolean(1, 3, true).unwrap();
    ws.write_number(2, 0, 2).unwrap();
    ws.write_string(2, 1, "Grace").unwrap();
    ws.write_number(2, 2, 87.25).unwrap();
    ws.write_boolean(2, 3, false).unwrap();

    let broken = wb.add_worksheet();
    broken.set_name("Broken").unwrap();
    for (col, label) in ["id", "name", "score", "active"].into_iter().enumerate() {
        broken.write_string(0, col as u16, label).unwrap();
    }
    broken.write_string(1, 0, "not a number").unwrap();
    broken.write_string(1, 1, "Linus").unwrap();
    broken.write_number(1, 2, 50).unwrap();
    broken.write_boolean(1, 3, true).unwrap();

    wb.save(path).unwrap();
}

fn workbook() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.xlsx");
    write_people_xlsx(&path);
    (dir, path)
}

fn sheet(name: &str) -> Dialect {
    let mut dialect = Dialect::default();
    dialect.excel.sheet = Some(SheetRef::Name(name.to_string()));
    dialect
}

#[test]
fn first_sheet_is_read_with_native_cell_types() {
    let (_dir, path) = workbook();
    let mut table = Table::from_path(&path);
    table.open().unwrap();
    assert_eq!(table.header().unwrap().labels(), ["id", "name", "score", "active"]);
    let rows: Vec<_> = table.row_stream().unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("id"), Some(&Value::Integer(1)));
    assert_eq!(rows[1].get("active"), Some(&Value::Boolean(false)));
}

#[test]
fn schema_validation_on_a_named_sheet() {
    let (_dir, path) = workbook();
    let schema = Schema::from_path("tests/fixtures/people.schema.json").unwrap();

    let mut valid = Table::from_path(&path).with_dialect(sheet("People")).with_schema(schema.clone());
    assert!(validate(&mut valid, &ValidateOptions::default()).valid);

    let mut broken = Table::from_path(&path).with_dialect(sheet("Broken")).with_schema(schema);
    let report = validate(&mut broken, &ValidateOptions::default());
    assert_eq!(report.table().unwrap().error_codes(), ["type-error", "primary-key-error"]);
}

#[test]
fn missing_sheet_is_a_source_error() {
    let (_dir, path) = workbook();
    let mut table = Table::from_path(&path).with_dialect(sheet("Nope"));
    let report = validate(&mut table, &ValidateOptions::default());
    assert_eq!(report.table().unwrap().error_codes(), ["source-error"]);
}
