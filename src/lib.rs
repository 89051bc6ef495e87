//! `tabular-validate` opens tabular data (CSV, JSON, Excel, in-memory rows), infers its
//! dialect, header and [`schema::Schema`] from a bounded sample, streams typed
//! [`row::Row`]s, and validates the stream into a [`report::Report`].
//!
//! The primary entrypoints are [`table::Table`] for reading and [`validate::validate`] for
//! validation. Both are configured with plain option structs that implement `Default`.
//!
//! ## What you can read
//!
//! **Formats (detected from the extension, or forced with [`file::File::with_format`]):**
//!
//! - **CSV**: `.csv`, `.tsv`, `.txt` (delimiter sniffed from the sample)
//! - **JSON**: `.json` / `.ndjson` / `.jsonl`, as arrays of rows or of keyed objects
//! - **Excel/workbooks** (requires the Cargo feature `excel`): `.xlsx`, `.xls`, `.xlsm`, `.xlsb`, `.ods`
//! - **Inline** rows already in memory ([`file::File::from_rows`])
//!
//! Sources may be local paths, text, or byte buffers, optionally gzip or zip compressed.
//! Text is decoded from a detected or declared encoding.
//!
//! **Field types:**
//!
//! `string`, `integer`, `number`, `boolean`, `date`, `time`, `datetime`, `year`,
//! `yearmonth`, `duration`, `geopoint`, `geojson`, `object`, `array` and `any`; see
//! [`types::FieldType`]. Missing-value tokens (by default the empty string) read as
//! [`types::Value::Null`].
//!
//! ## Quick example: read a table
//!
//! ```rust
//! use tabular_validate::file::File;
//! use tabular_validate::table::Table;
//! use tabular_validate::types::Value;
//!
//! # fn main() -> Result<(), tabular_validate::TableError> {
//! let mut table = Table::new(File::from_text("id,name\n1,english\n2,german\n"));
//! table.open()?;
//! assert_eq!(table.schema()?.field_names(), ["id", "name"]);
//! for row in table.row_stream()? {
//!     let row = row?;
//!     assert!(matches!(row.get("id"), Some(Value::Integer(_))));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Quick example: validate
//!
//! ```rust
//! use tabular_validate::checks::CheckDescriptor;
//! use tabular_validate::file::File;
//! use tabular_validate::table::Table;
//! use tabular_validate::validate::{validate, ValidateOptions};
//!
//! let mut table = Table::new(File::from_text("id,name\n1,a\n1,a\n"));
//! let options = ValidateOptions {
//!     checks: vec![CheckDescriptor::DuplicateRow],
//!     ..Default::default()
//! };
//! let report = validate(&mut table, &options);
//! assert!(!report.valid);
//! assert_eq!(report.flatten(&["rowPosition", "code"]), [[serde_json::json!(3), serde_json::json!("duplicate-row")]]);
//! ```
//!
//! ## Modules
//!
//! - [`table`]: the streaming engine (open protocol, header, row and data streams)
//! - [`schema`]: schema and field descriptors, type inference, casting and constraints
//! - [`row`]: typed rows with structural and cell errors
//! - [`file`], [`dialect`], [`layout`], [`detector`], [`resource`]: what to read and how
//! - [`ingestion`]: loader and parser contracts plus the built-in registry
//! - [`checks`]: validation checks
//! - [`validate`]: validation orchestration with error and memory budgets
//! - [`report`]: validation results
//! - [`diagnostics`]: the error taxonomy used in reports
//! - [`execution`]: bounded worker pool for package validation
//! - [`error`]: the Rust error type

pub mod checks;
pub mod detector;
pub mod diagnostics;
pub mod dialect;
pub mod error;
pub mod execution;
pub mod file;
pub mod ingestion;
pub mod layout;
pub mod report;
pub mod resource;
pub mod row;
pub mod schema;
pub mod table;
pub mod types;
pub mod validate;

pub use error::{TableError, TableResult};
