//! Row and field filters applied while streaming.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{TableError, TableResult};
use crate::schema::labels_match;
use crate::types::Cell;

const BLANK_SENTINEL: &str = "<blank>";
const REGEX_PREFIX: &str = "<regex>";

/// Row selector for `pick_rows`/`skip_rows`.
#[derive(Debug, Clone)]
pub enum RowSelector {
    /// 1-based physical record position.
    Position(usize),
    /// Literal prefix of the first cell.
    Prefix(String),
    /// Every cell is empty.
    Blank,
    /// Regex matched at the start of the first cell.
    Regex(Regex),
}

impl RowSelector {
    pub fn matches(&self, row_position: usize, cells: &[Cell]) -> bool {
        let first = cells.first().map(|c| match c {
            Cell::String(s) => s.clone(),
            Cell::Null => String::new(),
            other => other.to_string(),
        });
        match self {
            Self::Position(p) => *p == row_position,
            Self::Prefix(prefix) => first.is_some_and(|s| s.starts_with(prefix.as_str())),
            Self::Blank => is_blank_record(cells),
            Self::Regex(re) => first.is_some_and(|s| re.find(&s).is_some_and(|m| m.start() == 0)),
        }
    }

    fn parse(raw: &serde_json::Value) -> TableResult<Self> {
        match raw {
            serde_json::Value::Number(n) => n
                .as_u64()
                .filter(|&p| p > 0)
                .map(|p| Self::Position(p as usize))
                .ok_or_else(|| TableError::options(format!("invalid row position {n}"))),
            serde_json::Value::String(s) if s == BLANK_SENTINEL => Ok(Self::Blank),
            serde_json::Value::String(s) => match s.strip_prefix(REGEX_PREFIX) {
                Some(pattern) => Ok(Self::Regex(compile(pattern)?)),
                None => Ok(Self::Prefix(s.clone())),
            },
            other => Err(TableError::options(format!("invalid row selector {other}"))),
        }
    }
}

/// Field selector for `pick_fields`/`skip_fields`.
#[derive(Debug, Clone)]
pub enum FieldSelector {
    Name(String),
    /// 1-based physical field position.
    Position(usize),
    /// Regex matched against the whole label.
    Regex(Regex),
}

impl FieldSelector {
    pub fn matches(&self, position: usize, label: Option<&str>, case_sensitive: bool) -> bool {
        match self {
            Self::Position(p) => *p == position,
            Self::Name(name) => label.is_some_and(|l| labels_match(l, name, case_sensitive)),
            Self::Regex(re) => label.is_some_and(|l| re.is_match(l)),
        }
    }

    fn parse(raw: &serde_json::Value) -> TableResult<Self> {
        match raw {
            serde_json::Value::Number(n) => n
                .as_u64()
                .filter(|&p| p > 0)
                .map(|p| Self::Position(p as usize))
                .ok_or_else(|| TableError::options(format!("invalid field position {n}"))),
            serde_json::Value::String(s) => match s.strip_prefix(REGEX_PREFIX) {
                Some(pattern) => Ok(Self::Regex(compile(&format!("^(?:{pattern})$"))?)),
                None => Ok(Self::Name(s.clone())),
            },
            other => Err(TableError::options(format!("invalid field selector {other}"))),
        }
    }
}

fn compile(pattern: &str) -> TableResult<Regex> {
    Regex::new(pattern).map_err(|e| TableError::options(format!("invalid regex \"{pattern}\": {e}")))
}

/// Whether every cell of a raw record is empty.
pub fn is_blank_record(cells: &[Cell]) -> bool {
    cells.iter().all(|c| match c {
        Cell::Null => true,
        Cell::String(s) => s.is_empty(),
        _ => false,
    })
}

/// Serializable layout descriptor (`{"skipRows": ["#", "<blank>", 3], ...}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDescriptor {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pick_rows: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_rows: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pick_fields: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_fields: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_fields: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_fields: Option<usize>,
}

/// Compiled row and field filters.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub pick_rows: Vec<RowSelector>,
    pub skip_rows: Vec<RowSelector>,
    /// Number of data rows to skip after filtering.
    pub offset_rows: usize,
    /// Maximum number of data rows to yield.
    pub limit_rows: Option<usize>,
    pub pick_fields: Vec<FieldSelector>,
    pub skip_fields: Vec<FieldSelector>,
    pub offset_fields: usize,
    pub limit_fields: Option<usize>,
}

impl TryFrom<&LayoutDescriptor> for Layout {
    type Error = TableError;

    fn try_from(d: &LayoutDescriptor) -> TableResult<Self> {
        let rows = |items: &[serde_json::Value]| items.iter().map(RowSelector::parse).collect::<TableResult<Vec<_>>>();
        let fields =
            |items: &[serde_json::Value]| items.iter().map(FieldSelector::parse).collect::<TableResult<Vec<_>>>();
        Ok(Self {
            pick_rows: rows(&d.pick_rows)?,
            skip_rows: rows(&d.skip_rows)?,
            offset_rows: d.offset_rows.unwrap_or(0),
            limit_rows: d.limit_rows,
            pick_fields: fields(&d.pick_fields)?,
            skip_fields: fields(&d.skip_fields)?,
            offset_fields: d.offset_fields.unwrap_or(0),
            limit_fields: d.limit_fields,
        })
    }
}

impl Layout {
    pub fn from_json_str(input: &str) -> TableResult<Self> {
        let descriptor: LayoutDescriptor = serde_json::from_str(input)?;
        Layout::try_from(&descriptor)
    }

    pub fn skip_rows(mut self, selectors: Vec<RowSelector>) -> Self {
        self.skip_rows = selectors;
        self
    }

    pub fn pick_fields(mut self, selectors: Vec<FieldSelector>) -> Self {
        self.pick_fields = selectors;
        self
    }

    pub fn skip_fields(mut self, selectors: Vec<FieldSelector>) -> Self {
        self.skip_fields = selectors;
        self
    }

    pub fn limit_rows(mut self, limit: usize) -> Self {
        self.limit_rows = Some(limit);
        self
    }

    pub fn offset_rows(mut self, offset: usize) -> Self {
        self.offset_rows = offset;
        self
    }

    pub fn has_field_filters(&self) -> bool {
        !self.pick_fields.is_empty()
            || !self.skip_fields.is_empty()
            || self.offset_fields > 0
            || self.limit_fields.is_some()
    }

    /// Whether a physical record survives the row filters.
    pub fn keeps_row(&self, row_position: usize, cells: &[Cell]) -> bool {
        if !self.pick_rows.is_empty() && !self.pick_rows.iter().any(|s| s.matches(row_position, cells)) {
            return false;
        }
        !self.skip_rows.iter().any(|s| s.matches(row_position, cells))
    }

    /// Retained 1-based field positions for `width` physical columns, or `None` when no
    /// field filter is set (every position of every row is kept).
    pub fn field_positions(&self, labels: &[String], width: usize, case_sensitive: bool) -> Option<Vec<usize>> {
        if !self.has_field_filters() {
            return None;
        }
        let kept = (1..=width)
            .filter(|&position| {
                let label = labels.get(position - 1).map(String::as_str);
                let picked = self.pick_fields.is_empty()
                    || self.pick_fields.iter().any(|s| s.matches(position, label, case_sensitive));
                let skipped = self.skip_fields.iter().any(|s| s.matches(position, label, case_sensitive));
                picked && !skipped
            })
            .skip(self.offset_fields)
            .take(self.limit_fields.unwrap_or(usize::MAX))
            .collect();
        Some(kept)
    }
}

/// Project a record onto retained positions; positions past the end are dropped.
pub fn project(cells: &[Cell], positions: &[usize]) -> Vec<Cell> {
    positions
        .iter()
        .map_while(|&p| cells.get(p - 1).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn cells(items: &[&str]) -> Vec<Cell> {
        items.iter().map(|s| json!(s)).collect()
    }

    #[test]
    fn row_selectors() {
        let layout = Layout::from_json_str(r##"{"skipRows": ["#", "<blank>", 7, "<regex>\\d{3}-"]}"##).unwrap();
        assert!(!layout.keeps_row(2, &cells(&["# comment", "x"])));
        assert!(!layout.keeps_row(3, &cells(&["", ""])));
        assert!(!layout.keeps_row(7, &cells(&["a"])));
        assert!(!layout.keeps_row(8, &cells(&["123-4"])));
        assert!(layout.keeps_row(9, &cells(&["a123-4"])));

        let pick = Layout::from_json_str(r#"{"pickRows": [1, "keep"]}"#).unwrap();
        assert!(pick.keeps_row(1, &cells(&["x"])));
        assert!(pick.keeps_row(5, &cells(&["keep me"])));
        assert!(!pick.keeps_row(5, &cells(&["drop"])));
    }

    #[test]
    fn field_positions_with_filters() {
        let labels: Vec<String> = ["id", "name", "age", "note"].iter().map(|s| s.to_string()).collect();
        assert_eq!(Layout::default().field_positions(&labels, 4, true), None);

        let layout = Layout::from_json_str(r#"{"skipFields": ["name", 4]}"#).unwrap();
        assert_eq!(layout.field_positions(&labels, 4, true), Some(vec![1, 3]));

        let layout = Layout::from_json_str(r#"{"pickFields": ["<regex>.*a.*"], "offsetFields": 1}"#).unwrap();
        assert_eq!(layout.field_positions(&labels, 4, true), Some(vec![3]));

        let layout = Layout::from_json_str(r#"{"pickFields": ["ID"]}"#).unwrap();
        assert_eq!(layout.field_positions(&labels, 4, false), Some(vec![1]));
        assert_eq!(layout.field_positions(&labels, 4, true), Some(vec![]));
    }

    #[test]
    fn projection_stops_at_short_rows() {
        let row = cells(&["a", "b", "c"]);
        assert_eq!(project(&row, &[1, 3]), cells(&["a", "c"]));
        assert_eq!(project(&row, &[2, 5]), cells(&["b"]));
    }

    #[test]
    fn rejects_bad_selectors() {
        assert!(Layout::from_json_str(r#"{"skipRows": [0]}"#).is_err());
        assert!(Layout::from_json_str(r#"{"pickFields": ["<regex>("]}"#).is_err());
    }
}
