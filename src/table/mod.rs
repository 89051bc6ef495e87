//! The streaming table engine.
//!
//! A [`Table`] is configured with a [`Resource`] (file, dialect, layout, optional schema,
//! detector and expected stats) and then opened. [`Table::open`] performs all inference
//! exactly once:
//!
//! 1. validate the dialect and schema descriptors
//! 2. resolve loader and parser from the [`Registry`]; detect the encoding from the first
//!    `buffer_size` bytes when none was given
//! 3. buffer visible records until `sample_size` data records are available, then detect
//!    the header rows (unless declared) and join multi-row headers
//! 4. row filters (layout selectors and dialect comments) hide records from every later
//!    stage; declared header rows are exempt
//! 5. field filters resolve once into the retained field positions
//! 6. infer, sync or patch the schema
//! 7. reject duplicate field names
//!
//! After that [`Table::header`], [`Table::sample`] and [`Table::schema`] are available and
//! [`Table::row_stream`] pulls typed [`Row`]s lazily.
//!
//! ```rust
//! use tabular_validate::file::File;
//! use tabular_validate::table::Table;
//!
//! let mut table = Table::new(File::from_text("id,name\n1,english\n2,中国人\n"));
//! table.open().unwrap();
//! assert_eq!(table.header().unwrap().labels(), ["id", "name"]);
//! let rows: Vec<_> = table.row_stream().unwrap().collect::<Result<_, _>>().unwrap();
//! assert_eq!(rows.len(), 2);
//! ```

pub mod header;
mod stream;

use std::io::Write;
use std::sync::Arc;

use crate::checks::{IntegrityState, Lookup};
use crate::detector::Detector;
use crate::dialect::Dialect;
use crate::error::{TableError, TableResult};
use crate::file::{File, Source, Stats};
use crate::ingestion::loader::{lookup_encoding, peek};
use crate::ingestion::{
    ByteStream, DecodingReader, InputKind, ParserInput, RecordStream, Registry, StreamStats, open_byte_stream,
};
use crate::layout::{Layout, project};
use crate::resource::Resource;
use crate::row::Row;
use crate::schema::Schema;
use crate::types::{Cell, cell_to_string};

pub use header::{Header, join_labels};
pub use stream::{DataStream, RowStream};

/// Parser output tagged with 1-based physical record positions.
pub(crate) struct PositionedRecords {
    inner: RecordStream,
    next_position: usize,
}

impl PositionedRecords {
    fn new(inner: RecordStream) -> Self {
        Self {
            inner,
            next_position: 1,
        }
    }
}

impl Iterator for PositionedRecords {
    type Item = TableResult<(usize, Vec<Cell>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.inner.next()?;
        let position = self.next_position;
        self.next_position += 1;
        Some(record.map(|cells| (position, cells)))
    }
}

/// Whether a record survives comment and layout row filters.
pub(crate) fn is_visible(dialect: &Dialect, layout: &Layout, position: usize, cells: &[Cell]) -> bool {
    let first = cells.first().map(cell_to_string);
    !dialect.is_comment(position, first.as_deref()) && layout.keeps_row(position, cells)
}

/// Everything derived at open time.
pub(crate) struct TableState {
    pub(crate) header: Header,
    pub(crate) schema: Arc<Schema>,
    /// Visible data records read during sampling, already field-filtered.
    pub(crate) buffered: Vec<(usize, Vec<Cell>)>,
    pub(crate) sample_size: usize,
    /// `None` when no field filter is set.
    pub(crate) field_positions: Option<Vec<usize>>,
    /// Positions passed to [`Row::new`].
    pub(crate) row_field_positions: Vec<usize>,
    pub(crate) records: PositionedRecords,
    pub(crate) stream_stats: Option<StreamStats>,
    pub(crate) encoding: Option<String>,
    pub(crate) integrity: Option<IntegrityState>,
    pub(crate) rows_read: usize,
    pub(crate) consumed: bool,
}

impl std::fmt::Debug for TableState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableState")
            .field("header", &self.header.labels())
            .field("fields", &self.schema.field_names())
            .field("buffered", &self.buffered.len())
            .field("field_positions", &self.field_positions)
            .field("encoding", &self.encoding)
            .field("rows_read", &self.rows_read)
            .field("consumed", &self.consumed)
            .finish()
    }
}

/// A tabular source, closed until [`Table::open`] succeeds.
#[derive(Debug)]
pub struct Table {
    resource: Resource,
    registry: Arc<Registry>,
    lookup: Option<Arc<Lookup>>,
    integrity: bool,
    inline_suspended: bool,
    state: Option<TableState>,
}

impl Table {
    pub fn new(file: File) -> Self {
        Self::from_resource(Resource::new(file))
    }

    /// A table over a local file; format and compression come from the extension.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(File::from_path(path))
    }

    pub fn from_resource(resource: Resource) -> Self {
        Self {
            resource,
            registry: Arc::new(Registry::default()),
            lookup: None,
            integrity: false,
            inline_suspended: false,
            state: None,
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.resource.dialect = dialect;
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.resource.layout = layout;
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.resource.schema = Some(schema);
        self
    }

    pub fn with_detector(mut self, detector: Detector) -> Self {
        self.resource.detector = detector;
        self
    }

    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    /// Expected stats compared by the integrity check.
    pub fn with_stats(mut self, stats: Stats) -> Self {
        self.resource.stats = stats;
        self
    }

    /// Check foreign keys against `lookup` while streaming; enables inline integrity.
    pub fn with_lookup(mut self, lookup: Arc<Lookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Evaluate unique and primary-key rules inline, appending errors to each row.
    pub fn with_integrity(mut self, enabled: bool) -> Self {
        self.integrity = enabled;
        self
    }

    /// Turn off inline integrity for the next opens; validation leaves it to the integrity check.
    pub(crate) fn suspend_inline_integrity(&mut self, suspended: bool) {
        self.inline_suspended = suspended;
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn name(&self) -> &str {
        &self.resource.name
    }

    pub fn file(&self) -> &File {
        &self.resource.file
    }

    pub fn dialect(&self) -> &Dialect {
        &self.resource.dialect
    }

    pub fn layout(&self) -> &Layout {
        &self.resource.layout
    }

    pub fn lookup(&self) -> Option<&Arc<Lookup>> {
        self.lookup.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// Open (or re-open) the table. A previous session is closed first.
    pub fn open(&mut self) -> TableResult<()> {
        self.close();
        let state = self.prepare()?;
        log::debug!(
            "opened table {} (encoding {:?}, header rows {:?}, fields {:?})",
            self.resource.name,
            state.encoding,
            state.header.row_positions(),
            state.schema.field_names()
        );
        self.state = Some(state);
        Ok(())
    }

    /// Drop the parser and every derived state.
    pub fn close(&mut self) {
        self.state = None;
    }

    fn state(&self) -> TableResult<&TableState> {
        self.state.as_ref().ok_or(TableError::NotOpen)
    }

    pub fn header(&self) -> TableResult<&Header> {
        Ok(&self.state()?.header)
    }

    pub fn schema(&self) -> TableResult<&Arc<Schema>> {
        Ok(&self.state()?.schema)
    }

    /// First `sample_size` visible data records, field-filtered.
    pub fn sample(&self) -> TableResult<Vec<Vec<Cell>>> {
        let state = self.state()?;
        Ok(state
            .buffered
            .iter()
            .take(state.sample_size)
            .map(|(_, cells)| cells.clone())
            .collect())
    }

    /// Physical positions of [`Table::sample`] records.
    pub fn sample_positions(&self) -> TableResult<Vec<usize>> {
        let state = self.state()?;
        Ok(state.buffered.iter().take(state.sample_size).map(|(p, _)| *p).collect())
    }

    /// Resolved encoding label; `None` for inline and binary sources.
    pub fn encoding(&self) -> TableResult<Option<&str>> {
        Ok(self.state()?.encoding.as_deref())
    }

    /// Measured stats: hash and bytes of what was read so far and the rows yielded.
    pub fn stats(&self) -> TableResult<Stats> {
        let state = self.state()?;
        Ok(Stats {
            hash: state.stream_stats.as_ref().map(StreamStats::hash),
            bytes: state.stream_stats.as_ref().map(StreamStats::bytes),
            rows: Some(state.rows_read),
        })
    }

    /// Typed rows. A consumed stream re-opens the table first.
    pub fn row_stream(&mut self) -> TableResult<RowStream<'_>> {
        self.rewind_if_consumed()?;
        let Table { resource, state, .. } = self;
        let state = state.as_mut().ok_or(TableError::NotOpen)?;
        Ok(RowStream::new(state, &resource.dialect, &resource.layout))
    }

    /// Raw field-filtered data records, with the same row filters and offset/limit as
    /// [`Table::row_stream`].
    pub fn data_stream(&mut self) -> TableResult<DataStream<'_>> {
        self.rewind_if_consumed()?;
        let Table { resource, state, .. } = self;
        let state = state.as_mut().ok_or(TableError::NotOpen)?;
        Ok(DataStream::new(state, &resource.dialect, &resource.layout))
    }

    fn rewind_if_consumed(&mut self) -> TableResult<()> {
        if self.state()?.consumed {
            self.open()?;
        }
        Ok(())
    }

    /// Write the typed rows as CSV (schema field names as header) and return the row count.
    pub fn write_csv<W: Write>(&mut self, writer: W) -> TableResult<usize> {
        let mut out = csv::Writer::from_writer(writer);
        let names: Vec<String> = self.schema()?.field_names().iter().map(|n| n.to_string()).collect();
        out.write_record(&names)?;
        let mut count = 0;
        for row in self.row_stream()? {
            let row = row?;
            out.write_record(row.to_strings().into_iter().map(Option::unwrap_or_default))?;
            count += 1;
        }
        out.flush()?;
        Ok(count)
    }

    fn prepare(&self) -> TableResult<TableState> {
        let resource = &self.resource;
        let dialect = &resource.dialect;
        let layout = &resource.layout;
        let detector = &resource.detector;
        dialect.validate()?;
        if let Some(schema) = &resource.schema {
            schema.validate()?;
        }

        let (records, stream_stats, encoding) = self.open_records()?;
        let mut records = PositionedRecords::new(records);

        let declared: Option<Vec<usize>> = if dialect.header {
            dialect.header_rows.clone()
        } else {
            Some(Vec::new())
        };
        let last_declared = declared.as_ref().and_then(|rows| rows.last().copied()).unwrap_or(0);
        let wanted = detector.sample_size + declared.as_ref().map_or(1, Vec::len);

        let mut buffer: Vec<(usize, Vec<Cell>)> = Vec::new();
        let mut last_position = 0;
        while buffer.len() < wanted || last_position < last_declared {
            let Some(record) = records.next() else { break };
            let (position, cells) = record?;
            last_position = position;
            let exempt = declared.as_ref().is_some_and(|rows| rows.contains(&position));
            if exempt || is_visible(dialect, layout, position, &cells) {
                buffer.push((position, cells));
            }
        }

        let header_rows: Vec<usize> = match &declared {
            Some(rows) => rows.iter().copied().filter(|r| buffer.iter().any(|(p, _)| p == r)).collect(),
            None => detector.detect_header_rows(&buffer),
        };
        let last_header = header_rows.last().copied().unwrap_or(0);
        let header_records: Vec<Vec<Cell>> = buffer
            .iter()
            .filter(|(p, _)| header_rows.contains(p))
            .map(|(_, cells)| cells.clone())
            .collect();
        let raw_labels = join_labels(&header_records, &dialect.header_join);
        let data: Vec<(usize, Vec<Cell>)> = buffer.into_iter().filter(|(p, _)| *p > last_header).collect();

        let width = data.iter().map(|(_, c)| c.len()).max().unwrap_or(0).max(raw_labels.len());
        let field_positions = layout.field_positions(&raw_labels, width, dialect.header_case);
        let (labels, buffered): (Vec<String>, Vec<(usize, Vec<Cell>)>) = match &field_positions {
            Some(positions) => (
                positions.iter().map_while(|&p| raw_labels.get(p - 1).cloned()).collect(),
                data.into_iter().map(|(p, cells)| (p, project(&cells, positions))).collect(),
            ),
            None => (raw_labels, data),
        };

        let sample: Vec<Vec<Cell>> = buffered
            .iter()
            .take(detector.sample_size)
            .map(|(_, cells)| cells.clone())
            .collect();
        let mut schema = match &resource.schema {
            Some(schema) if detector.schema_sync && !labels.is_empty() => {
                schema.synced_to(&labels, dialect.header_case)
            }
            Some(schema) => schema.clone(),
            None => detector.detect_schema(&labels, &sample)?,
        };
        if let Some(patch) = &detector.schema_patch {
            schema = schema.patch(patch)?;
        }
        schema.validate()?;

        let row_field_positions = field_positions
            .clone()
            .unwrap_or_else(|| (1..=schema.len().max(labels.len())).collect());
        let header = Header::new(labels, &schema, &row_field_positions, header_rows, dialect.header_case);
        let integrity = (!self.inline_suspended && (self.integrity || self.lookup.is_some()))
            .then(|| IntegrityState::new(&schema, self.lookup.clone()));

        Ok(TableState {
            header,
            schema: Arc::new(schema),
            buffered,
            sample_size: detector.sample_size,
            field_positions,
            row_field_positions,
            records,
            stream_stats,
            encoding,
            integrity,
            rows_read: 0,
            consumed: false,
        })
    }

    fn open_records(&self) -> TableResult<(RecordStream, Option<StreamStats>, Option<String>)> {
        let file = &self.resource.file;
        let dialect = &self.resource.dialect;
        let parser = self.registry.parser(file.format())?;
        let kind = parser.input_kind();
        if kind == InputKind::Inline {
            let Source::Inline(rows) = file.source() else {
                return Err(TableError::source(format!(
                    "format \"{}\" needs in-memory rows, got {}",
                    file.format().unwrap_or_default(),
                    file.source()
                )));
            };
            let records = parser.open(ParserInput::Rows(Arc::clone(rows)), dialect)?;
            return Ok((records, None, None));
        }

        let loader = self.registry.loader(file.scheme())?;
        let stats = StreamStats::new(file.hashing());
        let stream = open_byte_stream(loader.as_ref(), file, &stats)?;
        let (stream, encoding): (ByteStream, Option<String>) = match kind {
            InputKind::Text => {
                let (prefix, stream) = peek(stream, self.resource.detector.buffer_size)?;
                let label = match file.encoding() {
                    Some(label) => label.to_string(),
                    None => self.resource.detector.detect_encoding(&prefix),
                };
                let encoding = lookup_encoding(&label)?;
                (
                    Box::new(DecodingReader::new(stream, encoding)),
                    Some(encoding.name().to_ascii_lowercase()),
                )
            }
            _ => (stream, None),
        };
        let records = parser.open(ParserInput::Stream(stream), dialect)?;
        Ok((records, Some(stats), encoding))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::layout::{FieldSelector, RowSelector};
    use crate::types::{FieldType, Value};

    fn rows(table: &mut Table) -> Vec<Row> {
        table.row_stream().unwrap().collect::<TableResult<_>>().unwrap()
    }

    #[test]
    fn infers_header_and_schema() {
        let mut table = Table::new(File::from_text("id,name\n1,english\n2,中国人\n"));
        table.open().unwrap();
        let schema = table.schema().unwrap();
        assert_eq!(schema.field_names(), vec!["id", "name"]);
        assert_eq!(schema.fields()[0].field_type(), FieldType::Integer);
        assert_eq!(schema.fields()[1].field_type(), FieldType::String);
        assert_eq!(table.encoding().unwrap(), Some("utf-8"));

        let rows = rows(&mut table);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("name"), Some(&Value::String("中国人".into())));
        assert_eq!((rows[1].row_position(), rows[1].row_number()), (3, 2));
        assert!(rows.iter().all(Row::is_valid));
        assert_eq!(table.stats().unwrap().rows, Some(2));
    }

    #[test]
    fn operations_need_an_open_table() {
        let mut table = Table::new(File::from_text("id\n1\n"));
        assert!(matches!(table.header(), Err(TableError::NotOpen)));
        assert!(table.row_stream().is_err());
        table.open().unwrap();
        table.close();
        assert!(!table.is_open());
    }

    #[test]
    fn reopening_yields_the_same_rows() {
        let mut table = Table::new(File::from_text("id,name\n1,a\n2,b\n3,c\n"));
        table.open().unwrap();
        let first: Vec<_> = rows(&mut table).iter().map(Row::to_map).collect();
        let again: Vec<_> = rows(&mut table).iter().map(Row::to_map).collect();
        table.open().unwrap();
        let reopened: Vec<_> = rows(&mut table).iter().map(Row::to_map).collect();
        assert_eq!(first, again);
        assert_eq!(first, reopened);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn comment_rows_are_skipped_before_header_detection() {
        let text = "# exported 2024\nid,name\n1,a\n# note\n2,b\n";
        let mut table = Table::new(File::from_text(text))
            .with_dialect(Dialect::default().with_comment_char("#"));
        table.open().unwrap();
        assert_eq!(table.header().unwrap().row_positions(), [2]);
        let rows = rows(&mut table);
        assert_eq!(rows.iter().map(Row::row_position).collect::<Vec<_>>(), vec![3, 5]);
        assert_eq!(rows.iter().map(Row::row_number).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn multi_row_header() {
        let text = "id,name,name\n,first,last\n1,a,b\n";
        let mut table =
            Table::new(File::from_text(text)).with_dialect(Dialect::default().with_header_rows(vec![1, 2]));
        table.open().unwrap();
        assert_eq!(table.header().unwrap().labels(), ["id", "name first", "name last"]);
        assert_eq!(rows(&mut table)[0].row_position(), 3);
    }

    #[test]
    fn headerless_source_gets_positional_names() {
        let mut table = Table::new(File::from_text("1,a\n2,b\n")).with_dialect(Dialect::headerless());
        table.open().unwrap();
        assert!(!table.header().unwrap().is_present());
        assert_eq!(table.schema().unwrap().field_names(), vec!["field1", "field2"]);
        assert_eq!(rows(&mut table).len(), 2);
    }

    #[test]
    fn row_and_field_filters() {
        let text = "id,name,age\n1,a,30\nskip,b,40\n3,c,50\n4,d,60\n";
        let layout = Layout::default()
            .skip_rows(vec![RowSelector::Prefix("skip".into())])
            .skip_fields(vec![FieldSelector::Name("name".into())])
            .offset_rows(1)
            .limit_rows(1);
        let mut table = Table::new(File::from_text(text)).with_layout(layout);
        table.open().unwrap();
        assert_eq!(table.header().unwrap().labels(), ["id", "age"]);
        assert_eq!(
            table.sample().unwrap(),
            vec![
                vec![json!("1"), json!("30")],
                vec![json!("3"), json!("50")],
                vec![json!("4"), json!("60")]
            ]
        );
        let rows = rows(&mut table);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&Value::Integer(3)));
        assert_eq!(rows[0].row_number(), 1);
        assert_eq!(rows[0].field_positions(), [1, 3]);
    }

    #[test]
    fn forced_schema_reports_type_error() {
        let schema = Schema::from_json_str(
            r#"{"fields": [{"name": "id", "type": "integer"}, {"name": "name", "type": "string"}]}"#,
        )
        .unwrap();
        let mut table = Table::new(File::from_text("id,name\n1,english\nabc,break\n")).with_schema(schema);
        table.open().unwrap();
        let rows = rows(&mut table);
        assert!(rows[0].is_valid());
        assert_eq!(rows[1].errors().len(), 1);
        assert_eq!(rows[1].errors()[0].code(), "type-error");
        assert_eq!(rows[1].errors()[0].field_name(), Some("id"));
    }

    #[test]
    fn schema_sync_and_patch() {
        let schema = Schema::from_json_str(
            r#"{"fields": [{"name": "b", "type": "integer"}, {"name": "a", "type": "string"}]}"#,
        )
        .unwrap();
        let detector = Detector {
            schema_sync: true,
            schema_patch: Some(json!({"fields": {"c": {"type": "boolean"}}})),
            ..Detector::default()
        };
        let mut table = Table::new(File::from_text("a,b,c\nx,1,true\n"))
            .with_schema(schema)
            .with_detector(detector);
        table.open().unwrap();
        let schema = table.schema().unwrap();
        assert_eq!(schema.field_names(), vec!["a", "b", "c"]);
        assert_eq!(schema.fields()[2].field_type(), FieldType::Boolean);
        assert!(table.header().unwrap().is_valid());
    }

    #[test]
    fn schema_sync_tolerates_a_missing_key_column() {
        let schema = Schema::from_json_str(
            r#"{"fields": [{"name": "id", "type": "integer"}, {"name": "name"}], "primaryKey": "id"}"#,
        )
        .unwrap();
        let detector = Detector {
            schema_sync: true,
            ..Detector::default()
        };
        let mut table = Table::new(File::from_text("name
x
"))
            .with_schema(schema)
            .with_detector(detector);
        table.open().unwrap();
        let schema = table.schema().unwrap();
        assert_eq!(schema.field_names(), vec!["name"]);
        assert!(schema.primary_key().is_empty());
    }

    #[test]
    fn duplicate_names_from_detector_are_rejected() {
        let detector = Detector {
            field_names: Some(vec!["x".into(), "x".into()]),
            ..Detector::default()
        };
        let mut table = Table::new(File::from_text("a,b\n1,2\n")).with_detector(detector);
        assert!(matches!(table.open(), Err(TableError::Schema { .. })));
        assert!(!table.is_open());
    }

    #[test]
    fn inline_integrity_appends_row_errors() {
        let schema = Schema::from_json_str(r#"{"fields": [{"name": "id", "type": "integer"}], "primaryKey": "id"}"#)
            .unwrap();
        let mut table = Table::new(File::from_rows(vec![vec![json!("id")], vec![json!(1)], vec![json!(1)]]))
            .with_schema(schema)
            .with_integrity(true);
        table.open().unwrap();
        let rows = rows(&mut table);
        assert!(rows[0].is_valid());
        assert_eq!(rows[1].errors()[0].code(), "primary-key-error");
    }

    #[test]
    fn write_csv_round_trips_typed_rows() {
        let mut table = Table::new(File::from_text("id,when\n1,2024-01-02\n2,\n"));
        table.open().unwrap();
        let mut out = Vec::new();
        assert_eq!(table.write_csv(&mut out).unwrap(), 2);
        assert_eq!(String::from_utf8(out).unwrap(), "id,when\n1,2024-01-02\n2,\n");
    }

    #[test]
    fn latin1_is_detected_and_decoded() {
        let mut table = Table::new(File::from_bytes(b"id,name\n1,caf\xe9\n".to_vec()));
        table.open().unwrap();
        assert_eq!(table.encoding().unwrap(), Some("windows-1252"));
        assert_eq!(rows(&mut table)[0].get("name"), Some(&Value::String("café".into())));
    }

    #[test]
    fn unknown_format_fails_to_open() {
        let mut table = Table::new(File::from_text("x").with_format("xml"));
        assert!(matches!(table.open(), Err(TableError::Format { .. })));
    }
}
