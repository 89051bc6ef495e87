//! Parser for rows that are already in memory.

use std::sync::Arc;

use crate::dialect::Dialect;
use crate::error::{TableError, TableResult};
use crate::types::Cell;

use super::{InputKind, ParserInput, Parser, RecordStream};

/// Serves `Source::Inline` rows; the first row is the header unless the dialect says otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineParser;

impl Parser for InlineParser {
    fn input_kind(&self) -> InputKind {
        InputKind::Inline
    }

    fn open(&self, input: ParserInput, _dialect: &Dialect) -> TableResult<RecordStream> {
        let ParserInput::Rows(rows) = input else {
            return Err(TableError::source("inline parser expects in-memory rows"));
        };
        Ok(Box::new(InlineRecords { rows, next: 0 }))
    }
}

struct InlineRecords {
    rows: Arc<Vec<Vec<Cell>>>,
    next: usize,
}

impl Iterator for InlineRecords {
    type Item = TableResult<Vec<Cell>>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.get(self.next)?.clone();
        self.next += 1;
        Some(Ok(row))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.rows.len() - self.next;
        (left, Some(left))
    }
}
