//! Resolved source descriptor: where the bytes come from and how to read them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::Cell;

/// Where table data comes from.
#[derive(Clone, PartialEq)]
pub enum Source {
    /// A local file (scheme `file`).
    Path(PathBuf),
    /// In-memory text (scheme `text`).
    Text(String),
    /// In-memory bytes (scheme `buffer`).
    Bytes(Arc<[u8]>),
    /// Already parsed rows (scheme and format `inline`).
    Inline(Arc<Vec<Vec<Cell>>>),
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Self::Text(t) => f.debug_struct("Text").field("len", &t.len()).finish(),
            Self::Bytes(b) => f.debug_struct("Bytes").field("len", &b.len()).finish(),
            Self::Inline(rows) => f.debug_struct("Inline").field("rows", &rows.len()).finish(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => write!(f, "{}", p.display()),
            Self::Text(_) => f.write_str("<text>"),
            Self::Bytes(_) => f.write_str("<buffer>"),
            Self::Inline(_) => f.write_str("<inline>"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Gz,
    Zip,
}

impl Compression {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "gz" | "gzip" => Some(Self::Gz),
            "zip" => Some(Self::Zip),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gz => "gz",
            Self::Zip => "zip",
        }
    }
}

/// Streaming hash algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hashing {
    #[default]
    Sha256,
    Sha512,
}

/// Byte count, hash and row count of a stream, either expected or measured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
}

impl Stats {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Format tag derived from a file extension.
pub fn format_from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "csv" | "tsv" | "txt" => Some("csv"),
        "json" | "ndjson" | "jsonl" => Some("json"),
        "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Some("excel"),
        _ => None,
    }
}

/// A source plus its scheme, format, compression, encoding and hashing.
///
/// Scheme, format and compression are derived from the source once, at construction; the
/// `with_*` builders override them explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    source: Source,
    scheme: String,
    format: Option<String>,
    compression: Option<Compression>,
    compression_path: Option<String>,
    encoding: Option<String>,
    hashing: Hashing,
}

impl File {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let (format, compression) = detect_from_path(&path);
        Self {
            source: Source::Path(path),
            scheme: "file".to_string(),
            format,
            compression,
            compression_path: None,
            encoding: None,
            hashing: Hashing::default(),
        }
    }

    /// In-memory text; format defaults to `csv`.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            source: Source::Text(text.into()),
            scheme: "text".to_string(),
            format: Some("csv".to_string()),
            compression: None,
            compression_path: None,
            encoding: Some("utf-8".to_string()),
            hashing: Hashing::default(),
        }
    }

    /// In-memory bytes; format must be given with [`File::with_format`] unless it is csv.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            source: Source::Bytes(bytes.into()),
            scheme: "buffer".to_string(),
            format: Some("csv".to_string()),
            compression: None,
            compression_path: None,
            encoding: None,
            hashing: Hashing::default(),
        }
    }

    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Self {
        Self {
            source: Source::Inline(Arc::new(rows)),
            scheme: "inline".to_string(),
            format: Some("inline".to_string()),
            compression: None,
            compression_path: None,
            encoding: None,
            hashing: Hashing::default(),
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_compression(mut self, compression: Option<Compression>) -> Self {
        self.compression = compression;
        self
    }

    /// Member to read from a zip archive (alphabetically first file by default).
    pub fn with_compression_path(mut self, member: impl Into<String>) -> Self {
        let member = member.into();
        if self.format.is_none() {
            self.format = Path::new(&member)
                .extension()
                .and_then(|e| e.to_str())
                .and_then(format_from_extension)
                .map(str::to_string);
        }
        self.compression_path = Some(member);
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn with_hashing(mut self, hashing: Hashing) -> Self {
        self.hashing = hashing;
        self
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// `None` when the format could not be derived (e.g. a path without extension).
    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    pub fn compression(&self) -> Option<Compression> {
        self.compression
    }

    pub fn compression_path(&self) -> Option<&str> {
        self.compression_path.as_deref()
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn hashing(&self) -> Hashing {
        self.hashing
    }

    /// Short label used in logs and observer contexts.
    pub fn name(&self) -> String {
        match &self.source {
            Source::Path(p) => p
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.split('.').next().unwrap_or(s).to_string())
                .unwrap_or_else(|| p.display().to_string()),
            other => other.to_string(),
        }
    }
}

/// `data.csv` → (csv, none); `data.csv.gz` → (csv, gz); `data.zip` → (none, zip).
fn detect_from_path(path: &Path) -> (Option<String>, Option<Compression>) {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    match Compression::from_extension(ext) {
        Some(compression) => {
            let inner = path
                .file_stem()
                .map(Path::new)
                .and_then(|stem| stem.extension())
                .and_then(|e| e.to_str())
                .and_then(format_from_extension);
            (inner.map(str::to_string), Some(compression))
        }
        None => (format_from_extension(ext).map(str::to_string), None),
    }
}
