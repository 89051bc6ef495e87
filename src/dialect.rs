//! Physical parse parameters of a source.

use serde::{Deserialize, Serialize};

use crate::error::{TableError, TableResult};

fn default_true() -> bool {
    true
}

fn default_header_join() -> String {
    " ".to_string()
}

fn default_quote_char() -> char {
    '"'
}

/// CSV controls. `delimiter: None` means sniff it from the first buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvControl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,
    #[serde(default = "default_quote_char")]
    pub quote_char: char,
    #[serde(default = "default_true")]
    pub double_quote: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escape_char: Option<char>,
    #[serde(default)]
    pub skip_initial_space: bool,
}

impl Default for CsvControl {
    fn default() -> Self {
        Self {
            delimiter: None,
            quote_char: default_quote_char(),
            double_quote: true,
            escape_char: None,
            skip_initial_space: false,
        }
    }
}

/// Sheet reference in a descriptor: a 1-based index or a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SheetRef {
    Index(usize),
    Name(String),
}

/// How to choose sheet(s) from a workbook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExcelSheetSelection {
    /// The first sheet (default).
    #[default]
    First,
    /// A sheet by 1-based index.
    Index(usize),
    /// A sheet by name.
    Sheet(String),
    /// Every sheet in workbook order, rows concatenated.
    AllSheets,
    /// The listed sheets in order, rows concatenated.
    Sheets(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcelControl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<SheetRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheets: Option<Vec<String>>,
    #[serde(default)]
    pub all_sheets: bool,
}

impl ExcelControl {
    pub fn selection(&self) -> ExcelSheetSelection {
        if self.all_sheets {
            return ExcelSheetSelection::AllSheets;
        }
        if let Some(names) = &self.sheets {
            return ExcelSheetSelection::Sheets(names.clone());
        }
        match &self.sheet {
            None => ExcelSheetSelection::First,
            Some(SheetRef::Index(i)) => ExcelSheetSelection::Index(*i),
            Some(SheetRef::Name(n)) => ExcelSheetSelection::Sheet(n.clone()),
        }
    }
}

/// JSON controls.
///
/// `keyed` forces array-of-objects (true) or array-of-arrays (false); by default it is
/// decided from the first item. `property` is a dot path to the array inside a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonControl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
}

/// Header span, comments and format controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dialect {
    #[serde(default = "default_true")]
    pub header: bool,
    /// Physical positions of header rows; `None` lets the detector choose.
    #[serde(default, alias = "headersRow", skip_serializing_if = "Option::is_none")]
    pub header_rows: Option<Vec<usize>>,
    #[serde(default = "default_header_join", alias = "headersJoiner")]
    pub header_join: String,
    #[serde(default = "default_true")]
    pub header_case: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_char: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comment_rows: Vec<usize>,
    #[serde(default)]
    pub csv: CsvControl,
    #[serde(default)]
    pub excel: ExcelControl,
    #[serde(default)]
    pub json: JsonControl,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            header: true,
            header_rows: None,
            header_join: default_header_join(),
            header_case: true,
            comment_char: None,
            comment_rows: Vec::new(),
            csv: CsvControl::default(),
            excel: ExcelControl::default(),
            json: JsonControl::default(),
        }
    }
}

impl Dialect {
    /// A dialect for sources without a header row.
    pub fn headerless() -> Self {
        Self {
            header: false,
            ..Default::default()
        }
    }

    pub fn with_header_rows(mut self, rows: Vec<usize>) -> Self {
        self.header_rows = Some(rows);
        self
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.csv.delimiter = Some(delimiter);
        self
    }

    pub fn with_comment_char(mut self, comment: impl Into<String>) -> Self {
        self.comment_char = Some(comment.into());
        self
    }

    pub fn from_json_str(input: &str) -> TableResult<Self> {
        let dialect: Self = serde_json::from_str(input)?;
        dialect.validate()?;
        Ok(dialect)
    }

    /// Check header rows and single-byte CSV controls.
    pub fn validate(&self) -> TableResult<()> {
        if let Some(rows) = &self.header_rows {
            if rows.contains(&0) {
                return Err(TableError::dialect("header rows are 1-based positions"));
            }
            if rows.windows(2).any(|w| w[0] >= w[1]) {
                return Err(TableError::dialect(format!(
                    "header rows must be strictly increasing, got {rows:?}"
                )));
            }
        }
        if self.comment_rows.contains(&0) {
            return Err(TableError::dialect("comment rows are 1-based positions"));
        }
        if self.comment_char.as_deref() == Some("") {
            return Err(TableError::dialect("comment char must not be empty"));
        }
        let single_byte = [
            ("delimiter", self.csv.delimiter),
            ("quoteChar", Some(self.csv.quote_char)),
            ("escapeChar", self.csv.escape_char),
        ];
        for (name, value) in single_byte {
            if value.is_some_and(|c| !c.is_ascii()) {
                return Err(TableError::dialect(format!("csv {name} must be a single ASCII character")));
            }
        }
        Ok(())
    }

    /// Declared header rows, or the default `[1]`, or nothing for headerless dialects.
    pub fn declared_header_rows(&self) -> Vec<usize> {
        if !self.header {
            return Vec::new();
        }
        self.header_rows.clone().unwrap_or_else(|| vec![1])
    }

    /// Whether a physical record is a comment by position or leading text.
    pub fn is_comment(&self, row_position: usize, first_cell: Option<&str>) -> bool {
        if self.comment_rows.contains(&row_position) {
            return true;
        }
        match (&self.comment_char, first_cell) {
            (Some(prefix), Some(cell)) => cell.starts_with(prefix.as_str()),
            _ => false,
        }
    }
}
