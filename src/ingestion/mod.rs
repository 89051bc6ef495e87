//! Loader and parser contracts plus the registry that maps schemes and formats to them.
//!
//! A [`Loader`] turns a [`File`] into a raw byte stream (scheme `file`, `text`, `buffer`).
//! [`open_byte_stream`] then applies decompression and wraps the stream so that byte count
//! and hash accumulate into a [`StreamStats`] as the parser reads. A [`Parser`] turns the
//! (decoded) stream into raw records. Both are looked up in a [`Registry`]:
//!
//! - loaders by scheme: `file`, `text`, `buffer`
//! - parsers by format: `csv`, `json`, `inline`, and `excel` with the `excel` feature
//!
//! Custom schemes and formats are added with [`Registry::register_loader`] and
//! [`Registry::register_parser`].

pub mod csv;
#[cfg(feature = "excel")]
pub mod excel;
pub mod inline;
pub mod json;
pub mod loader;

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use crate::dialect::Dialect;
use crate::error::{TableError, TableResult};
use crate::file::File;
use crate::types::Cell;

pub use loader::{BufferLoader, DecodingReader, FileLoader, StreamStats, TextLoader, open_byte_stream};

/// Raw records produced by a parser; an `Err` ends the stream.
pub type RecordStream = Box<dyn Iterator<Item = TableResult<Vec<Cell>>> + Send>;

/// Byte stream handed from a loader to a parser.
pub type ByteStream = Box<dyn Read + Send>;

/// What a parser consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// UTF-8 text decoded from the source encoding.
    Text,
    /// Undecoded bytes (binary formats such as workbooks).
    Binary,
    /// Rows already in memory; no loader is involved.
    Inline,
}

/// Parser input matching its [`InputKind`].
pub enum ParserInput {
    Stream(ByteStream),
    Rows(Arc<Vec<Vec<Cell>>>),
}

impl fmt::Debug for ParserInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("ParserInput::Stream"),
            Self::Rows(rows) => write!(f, "ParserInput::Rows({})", rows.len()),
        }
    }
}

/// Opens a raw byte stream for a file's scheme.
pub trait Loader: Send + Sync {
    fn open(&self, file: &File) -> TableResult<ByteStream>;
}

/// Turns an input into records of raw cells.
pub trait Parser: Send + Sync {
    fn input_kind(&self) -> InputKind {
        InputKind::Text
    }

    fn open(&self, input: ParserInput, dialect: &Dialect) -> TableResult<RecordStream>;
}

/// Scheme → loader and format → parser tables.
#[derive(Clone)]
pub struct Registry {
    loaders: HashMap<String, Arc<dyn Loader>>,
    parsers: HashMap<String, Arc<dyn Parser>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<&String> = self.loaders.keys().collect();
        let mut formats: Vec<&String> = self.parsers.keys().collect();
        schemes.sort();
        formats.sort();
        f.debug_struct("Registry")
            .field("schemes", &schemes)
            .field("formats", &formats)
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_loader("file", Arc::new(FileLoader));
        registry.register_loader("text", Arc::new(TextLoader));
        registry.register_loader("buffer", Arc::new(BufferLoader));
        registry.register_parser("csv", Arc::new(csv::CsvParser));
        registry.register_parser("json", Arc::new(json::JsonParser));
        registry.register_parser("inline", Arc::new(inline::InlineParser));
        #[cfg(feature = "excel")]
        registry.register_parser("excel", Arc::new(excel::ExcelParser));
        registry
    }
}

impl Registry {
    /// A registry without any loader or parser.
    pub fn empty() -> Self {
        Self {
            loaders: HashMap::new(),
            parsers: HashMap::new(),
        }
    }

    pub fn register_loader(&mut self, scheme: impl Into<String>, loader: Arc<dyn Loader>) {
        self.loaders.insert(scheme.into(), loader);
    }

    pub fn register_parser(&mut self, format: impl Into<String>, parser: Arc<dyn Parser>) {
        self.parsers.insert(format.into(), parser);
    }

    pub fn loader(&self, scheme: &str) -> TableResult<Arc<dyn Loader>> {
        self.loaders.get(scheme).cloned().ok_or_else(|| TableError::Scheme {
            message: format!("scheme \"{scheme}\" is not supported"),
        })
    }

    pub fn parser(&self, format: Option<&str>) -> TableResult<Arc<dyn Parser>> {
        let format = format.ok_or_else(|| TableError::Format {
            message: "cannot infer format from the source".to_string(),
        })?;
        self.parsers.get(format).cloned().ok_or_else(|| {
            let hint = if format == "excel" {
                " (enable cargo feature 'excel')"
            } else {
                ""
            };
            TableError::Format {
                message: format!("format \"{format}\" is not supported{hint}"),
            }
        })
    }
}
