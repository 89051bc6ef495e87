#![cfg(feature = "excel")]

//! Workbook parser (`.xlsx`, `.xls`, `.xlsm`, `.xlsb`, `.ods`) backed by `calamine`.

use std::io::{Cursor, Read};

use calamine::{Data, Range, Reader, open_workbook_auto_from_rs};
use chrono::{Duration, NaiveDate};

use crate::dialect::{Dialect, ExcelSheetSelection};
use crate::error::{TableError, TableResult};
use crate::types::Cell;

use super::{InputKind, ParserInput, Parser, RecordStream};

/// Reads the selected sheet(s) into records.
///
/// Physical positions follow the sheet: rows above the used range come out as empty
/// records and columns left of it as `null` cells. When several sheets are concatenated,
/// the first non-empty row of every sheet after the first is treated as a repeated header
/// and dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExcelParser;

impl Parser for ExcelParser {
    fn input_kind(&self) -> InputKind {
        InputKind::Binary
    }

    fn open(&self, input: ParserInput, dialect: &Dialect) -> TableResult<RecordStream> {
        let ParserInput::Stream(mut stream) = input else {
            return Err(TableError::source("excel parser expects a byte stream"));
        };
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;

        let names = workbook.sheet_names().to_vec();
        if names.is_empty() {
            return Err(TableError::source("workbook has no sheets"));
        }
        let sheets: Vec<String> = match dialect.excel.selection() {
            ExcelSheetSelection::First => vec![names[0].clone()],
            ExcelSheetSelection::Index(i) => vec![
                names
                    .get(i.wrapping_sub(1))
                    .cloned()
                    .ok_or_else(|| TableError::source(format!("workbook has no sheet at index {i}")))?,
            ],
            ExcelSheetSelection::Sheet(name) => vec![name],
            ExcelSheetSelection::AllSheets => names,
            ExcelSheetSelection::Sheets(list) => list,
        };

        let mut records = Vec::new();
        for (index, sheet) in sheets.iter().enumerate() {
            let range = workbook
                .worksheet_range(sheet)
                .map_err(|e| TableError::source(format!("sheet '{sheet}': {e}")))?;
            let mut sheet_records = range_records(&range);
            if index > 0 {
                if let Some(header) = sheet_records.iter().position(|r| !r.is_empty()) {
                    sheet_records.drain(..=header);
                }
            }
            records.append(&mut sheet_records);
        }
        Ok(Box::new(records.into_iter().map(Ok)))
    }
}

fn range_records(range: &Range<Data>) -> Vec<Vec<Cell>> {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };
    let mut records: Vec<Vec<Cell>> = (0..start_row).map(|_| Vec::new()).collect();
    for row in range.rows() {
        let mut cells: Vec<Cell> = (0..start_col).map(|_| Cell::Null).collect();
        cells.extend(row.iter().map(convert_cell));
        while matches!(cells.last(), Some(Cell::Null)) {
            cells.pop();
        }
        records.push(cells);
    }
    records
}

fn convert_cell(c: &Data) -> Cell {
    match c {
        Data::Empty => Cell::Null,
        Data::String(s) => Cell::String(s.clone()),
        Data::Int(i) => Cell::from(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Cell::from(*f as i64),
        Data::Float(f) => Cell::from(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => Cell::String(serial_to_iso(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::String(s.clone()),
        Data::Error(e) => Cell::String(format!("#{e:?}")),
    }
}

/// Excel serial date (days since 1899-12-30) to `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS`.
fn serial_to_iso(serial: f64) -> String {
    let Some(epoch) = NaiveDate::from_ymd_opt(1899, 12, 30) else {
        return serial.to_string();
    };
    let days = serial.trunc() as i64;
    let seconds = ((serial - serial.trunc()) * 86_400.0).round() as i64;
    let Some(date) = epoch.checked_add_signed(Duration::days(days)) else {
        return serial.to_string();
    };
    if seconds == 0 {
        return date.format("%Y-%m-%d").to_string();
    }
    match date.and_hms_opt(0, 0, 0) {
        Some(midnight) => (midnight + Duration::seconds(seconds))
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string(),
        None => serial.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_dates() {
        assert_eq!(serial_to_iso(45_000.0), "2023-03-15");
        assert_eq!(serial_to_iso(45_000.5), "2023-03-15T12:00:00");
    }

    #[test]
    fn whole_floats_become_integers() {
        assert_eq!(convert_cell(&Data::Float(3.0)), Cell::from(3));
        assert_eq!(convert_cell(&Data::Float(2.5)), Cell::from(2.5));
        assert_eq!(convert_cell(&Data::Empty), Cell::Null);
    }
}
