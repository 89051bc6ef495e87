//! Lazy row and record iteration over an open table.

use std::sync::Arc;

use super::{TableState, is_visible};
use crate::dialect::Dialect;
use crate::error::TableResult;
use crate::layout::{Layout, project};
use crate::row::Row;
use crate::schema::Schema;
use crate::types::Cell;

/// Replays the buffered sample, then pulls live records through the same filters.
struct Cursor<'a> {
    state: &'a mut TableState,
    dialect: &'a Dialect,
    layout: &'a Layout,
    replayed: usize,
    skipped: usize,
    yielded: usize,
    done: bool,
}

impl<'a> Cursor<'a> {
    fn new(state: &'a mut TableState, dialect: &'a Dialect, layout: &'a Layout) -> Self {
        state.consumed = true;
        state.rows_read = 0;
        Self {
            state,
            dialect,
            layout,
            replayed: 0,
            skipped: 0,
            yielded: 0,
            done: false,
        }
    }

    fn next_visible(&mut self) -> Option<TableResult<(usize, Vec<Cell>)>> {
        if let Some(record) = self.state.buffered.get(self.replayed) {
            self.replayed += 1;
            return Some(Ok(record.clone()));
        }
        loop {
            let (position, cells) = match self.state.records.next()? {
                Ok(record) => record,
                Err(err) => return Some(Err(err)),
            };
            if !is_visible(self.dialect, self.layout, position, &cells) {
                continue;
            }
            let cells = match &self.state.field_positions {
                Some(positions) => project(&cells, positions),
                None => cells,
            };
            return Some(Ok((position, cells)));
        }
    }
}

impl Iterator for Cursor<'_> {
    type Item = TableResult<(usize, Vec<Cell>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.layout.limit_rows.is_some_and(|limit| self.yielded >= limit) {
            self.done = true;
            return None;
        }
        loop {
            match self.next_visible() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(err)) => {
                    log::debug!("record stream failed after {} rows: {err}", self.yielded);
                    self.done = true;
                    return Some(Err(err));
                }
                Some(Ok(_)) if self.skipped < self.layout.offset_rows => {
                    self.skipped += 1;
                }
                Some(Ok(record)) => {
                    self.yielded += 1;
                    self.state.rows_read = self.yielded;
                    return Some(Ok(record));
                }
            }
        }
    }
}

/// Typed rows of an open table, see [`super::Table::row_stream`].
///
/// Row numbers count yielded rows from 1. When inline integrity is enabled, unique,
/// primary-key and foreign-key errors are appended to each row.
pub struct RowStream<'a> {
    cursor: Cursor<'a>,
}

impl<'a> RowStream<'a> {
    pub(crate) fn new(state: &'a mut TableState, dialect: &'a Dialect, layout: &'a Layout) -> Self {
        Self {
            cursor: Cursor::new(state, dialect, layout),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.cursor.state.schema
    }
}

impl Iterator for RowStream<'_> {
    type Item = TableResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let (position, cells) = match self.cursor.next()? {
            Ok(record) => record,
            Err(err) => return Some(Err(err)),
        };
        let state = &mut *self.cursor.state;
        let mut row = Row::new(
            Arc::clone(&state.schema),
            cells,
            &state.row_field_positions,
            position,
            self.cursor.yielded,
        );
        if let Some(integrity) = state.integrity.as_mut() {
            for error in integrity.evaluate(&row) {
                row.push_error(error);
            }
        }
        Some(Ok(row))
    }
}

/// Raw field-filtered data records, see [`super::Table::data_stream`].
pub struct DataStream<'a> {
    cursor: Cursor<'a>,
}

impl<'a> DataStream<'a> {
    pub(crate) fn new(state: &'a mut TableState, dialect: &'a Dialect, layout: &'a Layout) -> Self {
        Self {
            cursor: Cursor::new(state, dialect, layout),
        }
    }
}

impl Iterator for DataStream<'_> {
    type Item = TableResult<Vec<Cell>>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.cursor.next()?.map(|(_, cells)| cells))
    }
}
