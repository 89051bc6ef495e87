//! CSV parser backed by the `csv` crate.
//!
//! - Records are read without headers and with flexible widths; header handling is the
//!   table's job.
//! - When the dialect has no delimiter, it is sniffed from the first buffered lines.
//! - Blank lines (which the `csv` crate skips) are re-emitted as empty records so physical
//!   row positions stay aligned with the source.

use std::io::{BufRead, BufReader, Read};

use crate::dialect::{CsvControl, Dialect};
use crate::error::TableResult;
use crate::types::Cell;

use super::{ParserInput, Parser, RecordStream};

const SNIFF_BUFFER: usize = 64 * 1024;
const SNIFF_LINES: usize = 20;
const CANDIDATES: [u8; 5] = [b',', b';', b'\t', b'|', b':'];

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvParser;

impl Parser for CsvParser {
    fn open(&self, input: ParserInput, dialect: &Dialect) -> TableResult<RecordStream> {
        let ParserInput::Stream(stream) = input else {
            return Err(crate::error::TableError::source("csv parser expects a byte stream"));
        };
        let mut reader = BufReader::with_capacity(SNIFF_BUFFER, stream);
        let delimiter = match dialect.csv.delimiter {
            Some(c) => c as u8,
            None => sniff_delimiter(reader.fill_buf()?),
        };
        log::debug!("csv delimiter {:?}", delimiter as char);
        let rdr = builder(&dialect.csv, delimiter).from_reader(reader);
        Ok(Box::new(CsvRecords {
            records: rdr.into_records(),
            next_line: 1,
            pending_blank: 0,
            buffered: None,
            skip_initial_space: dialect.csv.skip_initial_space,
        }))
    }
}

fn builder(control: &CsvControl, delimiter: u8) -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .quote(control.quote_char as u8)
        .double_quote(control.double_quote)
        .escape(control.escape_char.map(|c| c as u8));
    builder
}

/// Pick the candidate whose per-line count is most consistent (and non-zero) across the
/// sampled lines; `,` when nothing qualifies.
pub fn sniff_delimiter(buffer: &[u8]) -> u8 {
    let text = String::from_utf8_lossy(buffer);
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();
    // The last line may be cut by the buffer boundary.
    let complete = if lines.len() > 1 && !text.ends_with('\n') {
        &lines[..lines.len() - 1]
    } else {
        &lines[..]
    };

    let mut best: Option<(u8, usize, usize)> = None;
    for &candidate in &CANDIDATES {
        let counts: Vec<usize> = complete
            .iter()
            .map(|line| count_unquoted(line, candidate))
            .collect();
        let Some(&first) = counts.first() else { continue };
        if first == 0 {
            continue;
        }
        let consistent = counts.iter().filter(|&&c| c == first).count();
        let better = match best {
            None => true,
            Some((_, best_consistent, best_count)) => {
                (consistent, first) > (best_consistent, best_count)
            }
        };
        if better {
            best = Some((candidate, consistent, first));
        }
    }
    best.map(|(c, _, _)| c).unwrap_or(b',')
}

fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let mut quoted = false;
    let mut count = 0;
    for b in line.bytes() {
        if b == b'"' {
            quoted = !quoted;
        } else if b == delimiter && !quoted {
            count += 1;
        }
    }
    count
}

struct CsvRecords<R> {
    records: csv::StringRecordsIntoIter<R>,
    next_line: u64,
    pending_blank: u64,
    buffered: Option<Vec<Cell>>,
    skip_initial_space: bool,
}

impl<R: Read> Iterator for CsvRecords<R> {
    type Item = TableResult<Vec<Cell>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pending_blank > 0 {
            self.pending_blank -= 1;
            return Some(Ok(Vec::new()));
        }
        if let Some(cells) = self.buffered.take() {
            return Some(Ok(cells));
        }
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e.into())),
        };
        let line = record.position().map(|p| p.line()).unwrap_or(self.next_line);
        let embedded_newlines: u64 = record.iter().map(|f| f.matches('\n').count() as u64).sum();
        let gap = line.saturating_sub(self.next_line);
        self.next_line = line + embedded_newlines + 1;

        let cells: Vec<Cell> = record
            .iter()
            .map(|field| {
                let field = if self.skip_initial_space { field.trim_start() } else { field };
                Cell::String(field.to_string())
            })
            .collect();
        if gap > 0 {
            self.pending_blank = gap - 1;
            self.buffered = Some(cells);
            return Some(Ok(Vec::new()));
        }
        Some(Ok(cells))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use serde_json::json;

    use super::*;

    fn parse(text: &str, dialect: &Dialect) -> Vec<Vec<Cell>> {
        let input = ParserInput::Stream(Box::new(Cursor::new(text.as_bytes().to_vec())));
        CsvParser
            .open(input, dialect)
            .unwrap()
            .collect::<TableResult<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn reads_ragged_records_as_strings() {
        let rows = parse("id,name\n1,english\n2\n3,a,b\n", &Dialect::default());
        assert_eq!(rows[0], vec![json!("id"), json!("name")]);
        assert_eq!(rows[2], vec![json!("2")]);
        assert_eq!(rows[3].len(), 3);
    }

    #[test]
    fn blank_lines_keep_positions() {
        let rows = parse("id\n1\n\n\n2\n", &Dialect::default());
        assert_eq!(rows.len(), 5);
        assert!(rows[2].is_empty() && rows[3].is_empty());
        assert_eq!(rows[4], vec![json!("2")]);
    }

    #[test]
    fn quoted_newlines_do_not_create_blank_records() {
        let rows = parse("id,note\n1,\"a\nb\"\n2,c\n", &Dialect::default());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][1], json!("a\nb"));
    }

    #[test]
    fn sniffs_common_delimiters() {
        assert_eq!(sniff_delimiter(b"a;b;c\n1;2;3\n"), b';');
        assert_eq!(sniff_delimiter(b"a\tb\n1\t2\n"), b'\t');
        assert_eq!(sniff_delimiter(b"a,\"x;y\"\n1,2\n"), b',');
        assert_eq!(sniff_delimiter(b"single\n"), b',');
        let rows = parse("a|b\n1|2\n", &Dialect::default());
        assert_eq!(rows[1], vec![json!("1"), json!("2")]);
    }

    #[test]
    fn explicit_controls() {
        let mut dialect = Dialect::default().with_delimiter(';');
        dialect.csv.skip_initial_space = true;
        let rows = parse("a; b\n1;  2\n", &dialect);
        assert_eq!(rows[1], vec![json!("1"), json!("2")]);
    }
}
