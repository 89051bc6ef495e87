//! Structured validation errors.
//!
//! Every problem found in the data (as opposed to a failure of the crate itself, see
//! [`crate::error::TableError`]) is represented as a [`Diagnostic`]. The set of built-in
//! kinds below is closed, but it is extensible: a custom check declares its own
//! `static ErrorKind` and emits diagnostics of that kind like any built-in.

use std::fmt;

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Static description of one error class.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ErrorKind {
    /// Stable, machine-readable code (e.g. `type-error`).
    pub code: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// Tags used by `pick_errors`/`skip_errors` selectors (e.g. `#cell`).
    pub tags: &'static [&'static str],
    /// Message template; `{placeholders}` are filled from the diagnostic context.
    pub template: &'static str,
    /// Longer description for documentation and reports.
    pub description: &'static str,
}

impl ErrorKind {
    /// Whether a `pick_errors`/`skip_errors` selector matches this kind.
    ///
    /// Selectors starting with `#` match tags; anything else matches the code exactly.
    pub fn matches(&self, selector: &str) -> bool {
        if selector.starts_with('#') {
            self.tags.contains(&selector)
        } else {
            self.code == selector
        }
    }
}

macro_rules! error_kind {
    ($ident:ident, $code:literal, $name:literal, [$($tag:literal),*], $template:literal, $description:literal) => {
        #[doc = $description]
        pub static $ident: ErrorKind = ErrorKind {
            code: $code,
            name: $name,
            tags: &[$($tag),*],
            template: $template,
            description: $description,
        };
    };
}

// Task and table level.
error_kind!(TASK_ERROR, "task-error", "Task Error", ["#general"],
    "The task has an error: {note}",
    "General task-level error.");
error_kind!(CHECK_ERROR, "check-error", "Check Error", ["#general"],
    "The check has an error: {note}",
    "A validation check is not applicable to this table and was disabled.");
error_kind!(SOURCE_ERROR, "source-error", "Source Error", ["#table"],
    "The data source has not supported or has inconsistent contents: {note}",
    "Data reading error because of not supported or inconsistent contents.");
error_kind!(SCHEME_ERROR, "scheme-error", "Scheme Error", ["#table"],
    "The data source could not be successfully loaded: {note}",
    "Data reading error because of incorrect scheme.");
error_kind!(FORMAT_ERROR, "format-error", "Format Error", ["#table"],
    "The data source could not be successfully parsed: {note}",
    "Data reading error because of incorrect format.");
error_kind!(ENCODING_ERROR, "encoding-error", "Encoding Error", ["#table"],
    "The data source could not be successfully decoded: {note}",
    "Data reading error because of an encoding problem.");
error_kind!(COMPRESSION_ERROR, "compression-error", "Compression Error", ["#table"],
    "The data source could not be successfully decompressed: {note}",
    "Data reading error because of a decompression problem.");
error_kind!(SCHEMA_ERROR, "schema-error", "Schema Error", ["#table", "#schema"],
    "The data source could not be successfully described by the invalid Table Schema: {note}",
    "Provided schema is not valid.");
error_kind!(DIALECT_ERROR, "dialect-error", "Dialect Error", ["#table"],
    "Dialect is not valid: {note}",
    "Provided dialect is not valid.");
error_kind!(HASH_COUNT_ERROR, "hash-count-error", "Hash Count Error", ["#table", "#integrity"],
    "The data source does not match the expected hash count: {note}",
    "This error can happen if the data is corrupted.");
error_kind!(BYTE_COUNT_ERROR, "byte-count-error", "Byte Count Error", ["#table", "#integrity"],
    "The data source does not match the expected byte count: {note}",
    "This error can happen if the data is corrupted.");
error_kind!(ROW_COUNT_ERROR, "row-count-error", "Row Count Error", ["#table", "#integrity"],
    "The data source does not match the expected row count: {note}",
    "This error can happen if the data is corrupted.");

// Header level.
error_kind!(BLANK_HEADER, "blank-header", "Blank Header", ["#table", "#header", "#structure"],
    "Header in field at position \"{fieldPosition}\" is blank",
    "A column in the header row is missing a value. Headers should be provided and not be blank.");
error_kind!(DUPLICATE_HEADER, "duplicate-header", "Duplicate Header", ["#table", "#header", "#structure"],
    "Header \"{label}\" in field at position \"{fieldPosition}\" is duplicated to a header: {note}",
    "Two columns in the header row have the same value. Column names should be unique.");
error_kind!(NON_MATCHING_HEADER, "non-matching-header", "Non-matching Header", ["#table", "#header", "#schema"],
    "Header \"{label}\" in field {fieldName} at position \"{fieldPosition}\" does not match the field name in the schema",
    "One of the data source header does not match the field name defined in the schema.");
error_kind!(EXTRA_HEADER, "extra-header", "Extra Header", ["#table", "#header", "#schema"],
    "There is an extra header \"{label}\" in field at position \"{fieldPosition}\"",
    "The first row of the data source contains header that does not exist in the schema.");
error_kind!(MISSING_HEADER, "missing-header", "Missing Header", ["#table", "#header", "#schema"],
    "There is a missing header in the field \"{fieldName}\" at position \"{fieldPosition}\"",
    "Based on the schema there should be a header that is missing in the first row of the data source.");

// Row level.
error_kind!(BLANK_ROW, "blank-row", "Blank Row", ["#table", "#row", "#structure"],
    "Row at position \"{rowPosition}\" is completely blank",
    "This row is empty. A row should contain at least one value.");
error_kind!(PRIMARY_KEY_ERROR, "primary-key-error", "PrimaryKey Error", ["#table", "#row", "#integrity"],
    "Row at position \"{rowPosition}\" violates the primary key: {note}",
    "Values in the primary key fields should be unique for every row.");
error_kind!(FOREIGN_KEY_ERROR, "foreign-key-error", "ForeignKey Error", ["#table", "#row", "#integrity"],
    "Row at position \"{rowPosition}\" violates the foreign key: {note}",
    "Values in the foreign key fields should exist in the referenced resource.");
error_kind!(DUPLICATE_ROW, "duplicate-row", "Duplicate Row", ["#table", "#row", "#heuristic"],
    "Row at position {rowPosition} is duplicated: {note}",
    "The row is duplicated.");
error_kind!(ROW_CONSTRAINT, "row-constraint", "Row Constraint", ["#table", "#row", "#policy"],
    "The row at position {rowPosition} has an error: {note}",
    "The value does not conform to the row constraint.");

// Cell level.
error_kind!(EXTRA_CELL, "extra-cell", "Extra Cell", ["#table", "#row", "#cell", "#structure"],
    "Row at position \"{rowPosition}\" has an extra value in field at position \"{fieldPosition}\"",
    "This row has more values compared to the header row.");
error_kind!(MISSING_CELL, "missing-cell", "Missing Cell", ["#table", "#row", "#cell", "#structure"],
    "Row at position \"{rowPosition}\" has a missing cell in field \"{fieldName}\" at position \"{fieldPosition}\"",
    "This row has less values compared to the header row.");
error_kind!(TYPE_ERROR, "type-error", "Type Error", ["#table", "#row", "#cell", "#schema"],
    "Type error in the cell \"{cell}\" in row \"{rowPosition}\" and field \"{fieldName}\" at position \"{fieldPosition}\": {note}",
    "The value does not match the schema type and format for this field.");
error_kind!(CONSTRAINT_ERROR, "constraint-error", "Constraint Error", ["#table", "#row", "#cell", "#schema"],
    "The cell \"{cell}\" in row at position \"{rowPosition}\" and field \"{fieldName}\" at position \"{fieldPosition}\" does not conform to a constraint: {note}",
    "A field value does not conform to a constraint.");
error_kind!(UNIQUE_ERROR, "unique-error", "Unique Error", ["#table", "#row", "#cell", "#integrity"],
    "Row at position \"{rowPosition}\" has unique constraint violation in field \"{fieldName}\" at position \"{fieldPosition}\": {note}",
    "This field is a unique field but it contains a value that has been used in another row.");
error_kind!(TRUNCATED_VALUE, "truncated-value", "Truncated Value", ["#table", "#row", "#cell", "#heuristic"],
    "The cell {cell} in row at position {rowPosition} and field {fieldName} at position {fieldPosition} has an error: {note}",
    "The value is possible truncated.");
error_kind!(DEVIATED_VALUE, "deviated-value", "Deviated Value", ["#table", "#row", "#cell", "#heuristic"],
    "There is a possible error because the value is deviated: {note}",
    "The value is deviated.");
error_kind!(BLACKLISTED_VALUE, "blacklisted-value", "Blacklisted Value", ["#table", "#row", "#cell", "#policy"],
    "The cell {cell} in row at position {rowPosition} and field {fieldName} at position {fieldPosition} has an error: {note}",
    "The value is blacklisted.");
error_kind!(SEQUENTIAL_VALUE, "sequential-value", "Sequential Value", ["#table", "#row", "#cell", "#policy"],
    "The cell {cell} in row at position {rowPosition} and field {fieldName} at position {fieldPosition} has an error: {note}",
    "The value is not sequential.");

/// Every built-in kind, used to restore diagnostics from serialized reports.
pub static BUILTIN_KINDS: &[&ErrorKind] = &[
    &TASK_ERROR,
    &CHECK_ERROR,
    &SOURCE_ERROR,
    &SCHEME_ERROR,
    &FORMAT_ERROR,
    &ENCODING_ERROR,
    &COMPRESSION_ERROR,
    &SCHEMA_ERROR,
    &DIALECT_ERROR,
    &HASH_COUNT_ERROR,
    &BYTE_COUNT_ERROR,
    &ROW_COUNT_ERROR,
    &BLANK_HEADER,
    &DUPLICATE_HEADER,
    &NON_MATCHING_HEADER,
    &EXTRA_HEADER,
    &MISSING_HEADER,
    &BLANK_ROW,
    &PRIMARY_KEY_ERROR,
    &FOREIGN_KEY_ERROR,
    &DUPLICATE_ROW,
    &ROW_CONSTRAINT,
    &EXTRA_CELL,
    &MISSING_CELL,
    &TYPE_ERROR,
    &CONSTRAINT_ERROR,
    &UNIQUE_ERROR,
    &TRUNCATED_VALUE,
    &DEVIATED_VALUE,
    &BLACKLISTED_VALUE,
    &SEQUENTIAL_VALUE,
];

pub fn builtin_kind(code: &str) -> Option<&'static ErrorKind> {
    BUILTIN_KINDS.iter().copied().find(|kind| kind.code == code)
}

/// Row context shared by row- and cell-level diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowContext {
    /// Stringified cells of the whole row.
    pub cells: Vec<String>,
    /// 1-based logical row number among yielded data rows.
    pub row_number: usize,
    /// 1-based physical record position in the source.
    pub row_position: usize,
}

/// Cell context for cell-level diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CellContext {
    pub cell: String,
    pub field_name: String,
    pub field_number: usize,
    pub field_position: usize,
}

/// Header context for header-level diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderContext {
    pub labels: Vec<String>,
    pub label: String,
    pub field_name: String,
    pub field_number: usize,
    pub field_position: usize,
    pub row_positions: Vec<usize>,
}

/// One structured validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: &'static ErrorKind,
    pub note: String,
    pub message: String,
    pub row: Option<RowContext>,
    pub cell: Option<CellContext>,
    pub header: Option<HeaderContext>,
}

impl Diagnostic {
    /// Task- or table-level diagnostic without positional context.
    pub fn new(kind: &'static ErrorKind, note: impl Into<String>) -> Self {
        Self::build(kind, note.into(), None, None, None)
    }

    /// Row-level diagnostic.
    pub fn for_row(kind: &'static ErrorKind, note: impl Into<String>, row: &RowContext) -> Self {
        Self::build(kind, note.into(), Some(row.clone()), None, None)
    }

    /// Cell-level diagnostic.
    pub fn for_cell(
        kind: &'static ErrorKind,
        note: impl Into<String>,
        row: &RowContext,
        cell: CellContext,
    ) -> Self {
        Self::build(kind, note.into(), Some(row.clone()), Some(cell), None)
    }

    /// Header-level diagnostic.
    pub fn for_header(kind: &'static ErrorKind, note: impl Into<String>, header: HeaderContext) -> Self {
        Self::build(kind, note.into(), None, None, Some(header))
    }

    fn build(
        kind: &'static ErrorKind,
        note: String,
        row: Option<RowContext>,
        cell: Option<CellContext>,
        header: Option<HeaderContext>,
    ) -> Self {
        let mut out = Self {
            kind,
            note,
            message: String::new(),
            row,
            cell,
            header,
        };
        out.message = out.render(kind.template);
        out
    }

    /// Error code shorthand.
    pub fn code(&self) -> &'static str {
        self.kind.code
    }

    pub fn row_position(&self) -> Option<usize> {
        self.row.as_ref().map(|r| r.row_position)
    }

    pub fn row_number(&self) -> Option<usize> {
        self.row.as_ref().map(|r| r.row_number)
    }

    pub fn field_position(&self) -> Option<usize> {
        match (&self.cell, &self.header) {
            (Some(c), _) => Some(c.field_position),
            (None, Some(h)) => Some(h.field_position),
            _ => None,
        }
    }

    pub fn field_name(&self) -> Option<&str> {
        match (&self.cell, &self.header) {
            (Some(c), _) => Some(c.field_name.as_str()),
            (None, Some(h)) => Some(h.field_name.as_str()),
            _ => None,
        }
    }

    fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len() + self.note.len());
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            match after.find('}') {
                Some(end) => {
                    let key = &after[..end];
                    match self.placeholder(key) {
                        Some(value) => out.push_str(&value),
                        None => {
                            out.push('{');
                            out.push_str(key);
                            out.push('}');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn placeholder(&self, key: &str) -> Option<String> {
        match key {
            "note" => Some(self.note.clone()),
            "rowNumber" => self.row.as_ref().map(|r| r.row_number.to_string()),
            "rowPosition" => self.row.as_ref().map(|r| r.row_position.to_string()),
            "cell" => self.cell.as_ref().map(|c| c.cell.clone()),
            "fieldName" => self.field_name().map(str::to_string),
            "fieldNumber" => match (&self.cell, &self.header) {
                (Some(c), _) => Some(c.field_number.to_string()),
                (None, Some(h)) => Some(h.field_number.to_string()),
                _ => None,
            },
            "fieldPosition" => self.field_position().map(|p| p.to_string()),
            "label" => self.header.as_ref().map(|h| h.label.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.code, self.message)
    }
}

impl Serialize for Diagnostic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("code", self.kind.code)?;
        map.serialize_entry("name", self.kind.name)?;
        map.serialize_entry("tags", self.kind.tags)?;
        map.serialize_entry("note", &self.note)?;
        map.serialize_entry("message", &self.message)?;
        map.serialize_entry("description", self.kind.description)?;
        if let Some(row) = &self.row {
            map.serialize_entry("cells", &row.cells)?;
            map.serialize_entry("rowNumber", &row.row_number)?;
            map.serialize_entry("rowPosition", &row.row_position)?;
        }
        if let Some(cell) = &self.cell {
            map.serialize_entry("cell", &cell.cell)?;
            map.serialize_entry("fieldName", &cell.field_name)?;
            map.serialize_entry("fieldNumber", &cell.field_number)?;
            map.serialize_entry("fieldPosition", &cell.field_position)?;
        }
        if let Some(header) = &self.header {
            map.serialize_entry("labels", &header.labels)?;
            map.serialize_entry("label", &header.label)?;
            map.serialize_entry("fieldName", &header.field_name)?;
            map.serialize_entry("fieldNumber", &header.field_number)?;
            map.serialize_entry("fieldPosition", &header.field_position)?;
            map.serialize_entry("rowPositions", &header.row_positions)?;
        }
        map.end()
    }
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDiagnostic {
    code: String,
    #[serde(default)]
    note: String,
    message: Option<String>,
    cells: Option<Vec<String>>,
    row_number: Option<usize>,
    row_position: Option<usize>,
    cell: Option<String>,
    field_name: Option<String>,
    field_number: Option<usize>,
    field_position: Option<usize>,
    labels: Option<Vec<String>>,
    label: Option<String>,
    row_positions: Option<Vec<usize>>,
}

/// Only built-in kinds can be restored; custom kinds are rejected.
impl<'de> Deserialize<'de> for Diagnostic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawDiagnostic::deserialize(deserializer)?;
        let kind = builtin_kind(&raw.code)
            .ok_or_else(|| de::Error::custom(format!("unknown error code \"{}\"", raw.code)))?;
        let row = raw.row_position.map(|row_position| RowContext {
            cells: raw.cells.clone().unwrap_or_default(),
            row_number: raw.row_number.unwrap_or_default(),
            row_position,
        });
        let header = raw.labels.clone().map(|labels| HeaderContext {
            labels,
            label: raw.label.clone().unwrap_or_default(),
            field_name: raw.field_name.clone().unwrap_or_default(),
            field_number: raw.field_number.unwrap_or_default(),
            field_position: raw.field_position.unwrap_or_default(),
            row_positions: raw.row_positions.clone().unwrap_or_default(),
        });
        let cell = match (&header, raw.cell) {
            (None, Some(cell)) => Some(CellContext {
                cell,
                field_name: raw.field_name.unwrap_or_default(),
                field_number: raw.field_number.unwrap_or_default(),
                field_position: raw.field_position.unwrap_or_default(),
            }),
            _ => None,
        };
        let mut diagnostic = Self::build(kind, raw.note, row, cell, header);
        if let Some(message) = raw.message {
            diagnostic.message = message;
        }
        Ok(diagnostic)
    }
}
