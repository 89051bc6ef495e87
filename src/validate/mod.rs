//! Validation orchestration.
//!
//! [`validate`] drives one [`Table`] through a set of [`Check`]s and always returns a
//! [`Report`]; configuration and source failures become report errors instead of `Err`.
//!
//! A run goes through these stages:
//!
//! 1. build the checks (`baseline` is always present); a descriptor that cannot be built
//!    becomes a `check-error`
//! 2. keep only checks with at least one error kind admitted by `pick_errors`/`skip_errors`;
//!    their admitted codes form the report scope
//! 3. open the table; a failure yields an invalid report holding exactly that error
//! 4. prepare the checks and drop those rejecting the schema (`validate_task`)
//! 5. schema, header and row hooks, with every error filtered and counted against
//!    `limit_errors`; resident memory is sampled every 100,000 rows against `limit_memory`
//! 6. table-end hooks, unless a budget stopped the run (`partial`)
//!
//! Packages validate their resources in parallel on an [`ExecutionEngine`]; foreign keys
//! into sibling resources are resolved against a lookup built before dispatch.
//!
//! ```rust
//! use tabular_validate::file::File;
//! use tabular_validate::table::Table;
//! use tabular_validate::validate::{validate, ValidateOptions};
//!
//! let mut table = Table::new(File::from_text("id,name\n1,a\n2\n"));
//! let report = validate(&mut table, &ValidateOptions::default());
//! assert!(!report.valid);
//! assert_eq!(report.tables[0].error_codes(), ["missing-cell"]);
//! ```

mod memory;
mod observer;

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::checks::{BaselineCheck, Check, CheckContext, CheckDescriptor, Lookup};
use crate::diagnostics::{self, Diagnostic, ErrorKind};
use crate::error::{TableError, TableResult};
use crate::execution::{ExecutionEngine, ExecutionObserver, ExecutionOptions, LogExecutionObserver};
use crate::file::{File, Stats, format_from_extension};
use crate::report::{Report, ReportTable, TableStats};
use crate::resource::{Package, Resource};
use crate::schema::Schema;
use crate::table::Table;
use crate::types::Value;

pub use observer::{CompositeObserver, FileObserver, Severity, StdErrObserver, ValidationContext, ValidationObserver};

pub const DEFAULT_LIMIT_ERRORS: usize = 1000;

/// Megabytes.
pub const DEFAULT_LIMIT_MEMORY: u64 = 1000;

const MEMORY_SAMPLE_ROWS: usize = 100_000;

/// Options controlling a validation run.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct ValidateOptions {
    /// Checks run in addition to `baseline`.
    pub checks: Vec<CheckDescriptor>,
    /// Error codes or `#tags` to keep; empty keeps everything.
    pub pick_errors: Vec<String>,
    /// Error codes or `#tags` to drop.
    pub skip_errors: Vec<String>,
    /// Stop after this many errors and mark the table partial.
    pub limit_errors: usize,
    /// Stop when resident memory exceeds this many megabytes.
    pub limit_memory: u64,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn ValidationObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: Severity,
    /// Receives per-resource task events of package runs; `None` logs them at debug level.
    pub execution_observer: Option<Arc<dyn ExecutionObserver>>,
}

impl fmt::Debug for ValidateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidateOptions")
            .field("checks", &self.checks)
            .field("pick_errors", &self.pick_errors)
            .field("skip_errors", &self.skip_errors)
            .field("limit_errors", &self.limit_errors)
            .field("limit_memory", &self.limit_memory)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .field("execution_observer_set", &self.execution_observer.is_some())
            .finish()
    }
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            checks: vec![CheckDescriptor::Integrity],
            pick_errors: Vec::new(),
            skip_errors: Vec::new(),
            limit_errors: DEFAULT_LIMIT_ERRORS,
            limit_memory: DEFAULT_LIMIT_MEMORY,
            observer: None,
            alert_at_or_above: Severity::Critical,
            execution_observer: None,
        }
    }
}

impl ValidateOptions {
    /// Whether an error kind passes `pick_errors` and `skip_errors`.
    pub fn admits(&self, kind: &ErrorKind) -> bool {
        let picked = self.pick_errors.is_empty() || self.pick_errors.iter().any(|s| kind.matches(s));
        picked && !self.skip_errors.iter().any(|s| kind.matches(s))
    }
}

/// Validate one table with the checks described in `options`.
pub fn validate(table: &mut Table, options: &ValidateOptions) -> Report {
    let started = Instant::now();
    let mut checks: Vec<Box<dyn Check>> = vec![Box::new(BaselineCheck)];
    let mut check_errors = Vec::new();
    for descriptor in &options.checks {
        if *descriptor == CheckDescriptor::Baseline {
            continue;
        }
        match descriptor.build() {
            Ok(check) => checks.push(check),
            Err(error) => check_errors.push(Diagnostic::new(&diagnostics::CHECK_ERROR, error.note())),
        }
    }
    let table_report = run(table, checks, check_errors, options);
    Report::from_tables(vec![table_report], Vec::new(), started.elapsed().as_secs_f64())
}

/// Validate one table with caller-built checks; `options.checks` is ignored.
///
/// `baseline` is added unless one of `checks` already is a baseline check.
pub fn validate_with_checks(table: &mut Table, mut checks: Vec<Box<dyn Check>>, options: &ValidateOptions) -> Report {
    let started = Instant::now();
    if !checks.iter().any(|c| c.code() == "baseline") {
        checks.insert(0, Box::new(BaselineCheck));
    }
    let table_report = run(table, checks, Vec::new(), options);
    Report::from_tables(vec![table_report], Vec::new(), started.elapsed().as_secs_f64())
}

pub fn validate_resource(resource: Resource, options: &ValidateOptions) -> Report {
    validate(&mut Table::from_resource(resource), options)
}

/// Validate a package: resources run in parallel, foreign keys may reference siblings.
pub fn validate_package(package: &Package, options: &ValidateOptions, execution: &ExecutionOptions) -> Report {
    let started = Instant::now();
    let engine = match ExecutionEngine::new(execution.clone()) {
        Ok(engine) => engine,
        Err(error) => return Report::from_errors(vec![error.to_diagnostic()], started.elapsed().as_secs_f64()),
    };
    let engine = engine.with_observer(
        options
            .execution_observer
            .clone()
            .unwrap_or_else(|| Arc::new(LogExecutionObserver)),
    );
    let lookup = Arc::new(package_lookup(package));
    let metrics = engine.metrics();
    let tables = engine.run_tasks(
        package.resources.clone(),
        |resource: &Resource| resource.name.clone(),
        |resource: Resource| {
            let mut table = Table::from_resource(resource).with_lookup(Arc::clone(&lookup));
            let report = validate(&mut table, options);
            report.tables.into_iter().next().inspect(|t| {
                metrics.on_rows_processed(t.stats.rows.unwrap_or_default() as u64);
            })
        },
    );
    log::debug!("validated package {:?}: {}", package.name, metrics.snapshot());
    Report::from_tables(tables.into_iter().flatten().collect(), Vec::new(), started.elapsed().as_secs_f64())
}

/// Validate a data file or a resource/package descriptor.
///
/// YAML files are descriptors. A JSON object with `resources` is a package and one with
/// `path` or `data` is a resource; any other file is data.
pub fn validate_path(path: impl AsRef<Path>, options: &ValidateOptions) -> Report {
    let started = Instant::now();
    let path = path.as_ref();
    match describe_path(path) {
        Ok(Described::Package(package)) => validate_package(&package, options, &ExecutionOptions::default()),
        Ok(Described::Resource(resource)) => validate_resource(*resource, options),
        Ok(Described::Data) => validate_resource(Resource::new(File::from_path(path)), options),
        Err(error) => Report::from_errors(vec![error.to_diagnostic()], started.elapsed().as_secs_f64()),
    }
}

/// Validate every data file matching a glob pattern as one package.
pub fn validate_glob(pattern: &str, options: &ValidateOptions, execution: &ExecutionOptions) -> Report {
    let started = Instant::now();
    let paths = match glob::glob(pattern) {
        Ok(paths) => paths,
        Err(error) => {
            let error = TableError::options(format!("invalid glob pattern \"{pattern}\": {error}"));
            return Report::from_errors(vec![error.to_diagnostic()], started.elapsed().as_secs_f64());
        }
    };
    let resources = paths
        .filter_map(|entry| match entry {
            Ok(path) if path.is_file() => Some(Resource::new(File::from_path(path))),
            Ok(_) => None,
            Err(error) => {
                log::debug!("skipping unreadable glob entry: {error}");
                None
            }
        })
        .collect();
    validate_package(&Package::new(resources), options, execution)
}

/// Validate every file under `dir` with a known data format, in file-name order.
pub fn validate_dir(dir: impl AsRef<Path>, options: &ValidateOptions, execution: &ExecutionOptions) -> Report {
    let resources = walkdir::WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                log::debug!("skipping unreadable directory entry: {error}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(format_from_extension)
                .is_some()
        })
        .map(|entry| Resource::new(File::from_path(entry.path())))
        .collect();
    validate_package(&Package::new(resources), options, execution)
}

enum Described {
    Package(Package),
    Resource(Box<Resource>),
    Data,
}

fn describe_path(path: &Path) -> TableResult<Described> {
    let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    let value: serde_json::Value = match ext.as_deref() {
        Some("yaml" | "yml") => serde_yaml::from_str(&fs::read_to_string(path)?)?,
        Some("json") => match serde_json::from_str(&fs::read_to_string(path)?) {
            Ok(value) => value,
            Err(_) => return Ok(Described::Data),
        },
        _ => return Ok(Described::Data),
    };
    if value.get("resources").is_some() {
        Ok(Described::Package(Package::from_path(path)?))
    } else if value.get("path").is_some() || value.get("data").is_some() {
        Ok(Described::Resource(Box::new(Resource::from_path(path)?)))
    } else {
        Ok(Described::Data)
    }
}

/// Referenced key tuples of every sibling resource named by a foreign key.
///
/// A resource that cannot be read completely is left out, so keys into it go unchecked.
fn package_lookup(package: &Package) -> Lookup {
    let mut lookup = Lookup::new();
    let references = package
        .resources
        .iter()
        .filter_map(|r| r.schema.as_ref())
        .flat_map(|schema| schema.foreign_keys().iter())
        .filter(|fk| !fk.is_self_reference());
    for fk in references {
        let resource = &fk.reference.resource;
        let Some(target) = package.resource(resource) else {
            log::debug!("foreign key references unknown resource \"{resource}\"");
            continue;
        };
        match read_keys(&mut Table::from_resource(target.clone()), &fk.reference.fields) {
            Ok(keys) => lookup.extend(resource, &fk.reference.fields, keys),
            Err(error) => log::debug!("cannot build lookup for \"{resource}\": {error}"),
        }
    }
    lookup
}

/// Values of `fields` for every row of `table`.
fn read_keys(table: &mut Table, fields: &[String]) -> TableResult<Vec<Vec<Value>>> {
    table.open()?;
    let schema = Arc::clone(table.schema()?);
    let indexes = fields
        .iter()
        .map(|name| {
            schema
                .field_index(name)
                .ok_or_else(|| TableError::schema(format!("referenced field \"{name}\" does not exist")))
        })
        .collect::<TableResult<Vec<_>>>()?;
    let mut keys = Vec::new();
    for row in table.row_stream()? {
        let row = row?;
        keys.push(
            indexes
                .iter()
                .map(|&i| row.values().get(i).cloned().unwrap_or(Value::Null))
                .collect(),
        );
    }
    Ok(keys)
}

/// The table lookup extended with self-referenced keys, when the schema has any.
fn with_self_references(table: &mut Table, schema: &Schema) -> Option<Arc<Lookup>> {
    let existing = table.lookup().cloned();
    let self_refs: Vec<&[String]> = schema
        .foreign_keys()
        .iter()
        .filter(|fk| fk.is_self_reference())
        .map(|fk| fk.reference.fields.as_slice())
        .collect();
    if self_refs.is_empty() {
        return existing;
    }
    let mut lookup = existing.as_deref().cloned().unwrap_or_default();
    for fields in self_refs {
        match read_keys(table, fields) {
            Ok(keys) => lookup.extend("", fields, keys),
            Err(error) => log::debug!("cannot build self-reference lookup: {error}"),
        }
    }
    Some(Arc::new(lookup))
}

/// Error budget and admission filter for one table.
struct Budget<'a> {
    options: &'a ValidateOptions,
    context: &'a ValidationContext,
    limit: usize,
    errors: Vec<Diagnostic>,
    partial: bool,
}

impl<'a> Budget<'a> {
    fn new(options: &'a ValidateOptions, context: &'a ValidationContext) -> Self {
        Self {
            options,
            context,
            limit: options.limit_errors.max(1),
            errors: Vec::new(),
            partial: false,
        }
    }

    /// Record admitted errors; `false` once the error budget is spent.
    fn record(&mut self, candidates: Vec<Diagnostic>) -> bool {
        for error in candidates {
            if !self.options.admits(error.kind) {
                continue;
            }
            if let Some(observer) = &self.options.observer {
                observer.on_error(self.context, &error);
            }
            self.errors.push(error);
            if self.errors.len() >= self.limit {
                self.partial = true;
                return false;
            }
        }
        true
    }

    fn memory_exceeded(&self) -> Option<u64> {
        memory::resident_mb().filter(|&used| used > self.options.limit_memory)
    }
}

fn run(
    table: &mut Table,
    checks: Vec<Box<dyn Check>>,
    mut task_errors: Vec<Diagnostic>,
    options: &ValidateOptions,
) -> ReportTable {
    let started = Instant::now();
    let context = ValidationContext {
        name: table.name().to_string(),
        place: table.file().source().to_string(),
    };
    let mut checks: Vec<Box<dyn Check>> = checks
        .into_iter()
        .filter(|check| check.possible_errors().iter().any(|kind| options.admits(kind)))
        .collect();
    let mut scope: Vec<String> = Vec::new();
    for kind in checks.iter().flat_map(|c| c.possible_errors().iter()) {
        if options.admits(kind) && !scope.iter().any(|code| code == kind.code) {
            scope.push(kind.code.to_string());
        }
    }

    log::debug!(
        "validating {} with checks {:?}",
        context.name,
        checks.iter().map(|c| c.code()).collect::<Vec<_>>()
    );
    let integrity_checked = checks.iter().any(|c| c.code() == "integrity");
    // Integrity errors only come from a registered integrity check.
    table.suspend_inline_integrity(true);
    let opened = table.open().and_then(|()| table.schema().map(Arc::clone));
    let schema = match opened {
        Ok(schema) => schema,
        Err(error) => {
            log::debug!("cannot open {}: {error}", context.name);
            let report = ReportTable::from_error(
                context.name.clone(),
                context.place.clone(),
                scope,
                error.to_diagnostic(),
                started.elapsed().as_secs_f64(),
            );
            if let Some(observer) = &options.observer {
                observer.on_error(&context, &report.errors[0]);
            }
            notify(options, &context, &report, severity_for_open(&error));
            table.suspend_inline_integrity(false);
            return report;
        }
    };

    let lookup = if integrity_checked {
        with_self_references(table, &schema)
    } else {
        table.lookup().cloned()
    };
    let expected = table.resource().stats.clone();
    let check_context = CheckContext {
        schema: &schema,
        expected: &expected,
        lookup: lookup.as_ref(),
    };
    for check in &mut checks {
        check.prepare(&check_context);
    }
    let mut active: Vec<Box<dyn Check>> = Vec::with_capacity(checks.len());
    for check in checks {
        let errors = check.validate_task(&schema);
        if errors.is_empty() {
            active.push(check);
        } else {
            log::debug!("check {} disabled for {}", check.code(), context.name);
            task_errors.extend(errors);
        }
    }

    let (labels, field_names) = match table.header() {
        Ok(header) => (header.labels().to_vec(), header.field_names().to_vec()),
        Err(_) => (Vec::new(), Vec::new()),
    };

    let mut budget = Budget::new(options, &context);
    let mut stream_failed = false;
    'run: {
        for check in &mut active {
            if !budget.record(check.validate_schema(&schema)) {
                break 'run;
            }
        }
        if let Ok(header) = table.header() {
            if header.is_present() {
                for check in &mut active {
                    if !budget.record(check.validate_headers(header)) {
                        break 'run;
                    }
                }
            }
        }
        let stream = match table.row_stream() {
            Ok(stream) => stream,
            Err(error) => {
                task_errors.push(error.to_diagnostic());
                stream_failed = true;
                break 'run;
            }
        };
        for (count, item) in stream.enumerate() {
            let row = match item {
                Ok(row) => row,
                Err(error) => {
                    task_errors.push(error.to_diagnostic());
                    stream_failed = true;
                    break 'run;
                }
            };
            for check in &mut active {
                if !budget.record(check.validate_row(&row)) {
                    break 'run;
                }
            }
            if (count + 1) % MEMORY_SAMPLE_ROWS == 0 {
                if let Some(used) = budget.memory_exceeded() {
                    task_errors.push(Diagnostic::new(
                        &diagnostics::TASK_ERROR,
                        format!(
                            "exceeded memory limit \"{}MB\" (using \"{used}MB\")",
                            options.limit_memory
                        ),
                    ));
                    budget.partial = true;
                    break 'run;
                }
            }
        }
    }

    let stats = table.stats().unwrap_or_default();
    if !budget.partial && !stream_failed {
        for check in &mut active {
            if !budget.record(check.validate_table(&stats)) {
                break;
            }
        }
    }
    table.close();
    table.suspend_inline_integrity(false);

    let aborted = stream_failed || !task_errors.is_empty();
    let Budget { errors, partial, .. } = budget;
    let mut all_errors = task_errors;
    all_errors.extend(errors);
    let report = finish(&context, scope, partial, labels, field_names, stats, all_errors, started);
    let severity = if aborted || partial { Severity::Error } else { Severity::Warning };
    notify(options, &context, &report, severity);
    report
}

#[allow(clippy::too_many_arguments)]
fn finish(
    context: &ValidationContext,
    scope: Vec<String>,
    partial: bool,
    labels: Vec<String>,
    field_names: Vec<String>,
    stats: Stats,
    errors: Vec<Diagnostic>,
    started: Instant,
) -> ReportTable {
    ReportTable {
        name: context.name.clone(),
        place: context.place.clone(),
        valid: errors.is_empty(),
        partial,
        scope,
        time: started.elapsed().as_secs_f64(),
        stats: TableStats {
            errors: errors.len(),
            rows: stats.rows,
            bytes: stats.bytes,
            hash: stats.hash,
        },
        labels,
        field_names,
        errors,
    }
}

fn notify(options: &ValidateOptions, context: &ValidationContext, table: &ReportTable, severity: Severity) {
    let Some(observer) = options.observer.as_ref() else {
        return;
    };
    if table.valid {
        observer.on_success(context, table);
        return;
    }
    observer.on_failure(context, severity, table);
    if severity >= options.alert_at_or_above {
        observer.on_alert(context, severity, table);
    }
}

fn severity_for_open(error: &TableError) -> Severity {
    match error {
        TableError::Io(err) if err.kind() != std::io::ErrorKind::InvalidData => Severity::Critical,
        TableError::Csv(err) => match err.kind() {
            ::csv::ErrorKind::Io(_) => Severity::Critical,
            _ => Severity::Error,
        },
        _ => Severity::Error,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::checks::DuplicateRowCheck;
    use crate::file::File;

    fn table(text: &str) -> Table {
        Table::new(File::from_text(text))
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ValidationObserver for Recorder {
        fn on_success(&self, ctx: &ValidationContext, _table: &ReportTable) {
            self.events.lock().unwrap().push(format!("ok:{}", ctx.name));
        }

        fn on_failure(&self, _ctx: &ValidationContext, severity: Severity, _table: &ReportTable) {
            self.events.lock().unwrap().push(format!("fail:{severity:?}"));
        }

        fn on_alert(&self, _ctx: &ValidationContext, severity: Severity, _table: &ReportTable) {
            self.events.lock().unwrap().push(format!("alert:{severity:?}"));
        }

        fn on_error(&self, _ctx: &ValidationContext, error: &Diagnostic) {
            self.events.lock().unwrap().push(format!("error:{}", error.code()));
        }
    }

    #[test]
    fn valid_table() {
        let report = validate(&mut table("id,name\n1,a\n2,b\n"), &ValidateOptions::default());
        assert!(report.valid);
        let t = report.table().unwrap();
        assert_eq!(t.stats.rows, Some(2));
        assert_eq!(t.labels, ["id", "name"]);
        assert!(t.scope.contains(&"type-error".to_string()));
        assert!(t.scope.contains(&"unique-error".to_string()));
    }

    #[test]
    fn error_limit_marks_partial() {
        let schema = Schema::from_json_str(r#"{"fields": [{"name": "n", "type": "integer"}]}"#).unwrap();
        let mut t = table("n\na\nb\nc\n").with_schema(schema);
        let options = ValidateOptions {
            limit_errors: 1,
            ..ValidateOptions::default()
        };
        let report = validate(&mut t, &options);
        let t = report.table().unwrap();
        assert!(t.partial);
        assert_eq!(t.error_codes(), ["type-error"]);
    }

    #[test]
    fn pick_and_skip_filter_errors_and_scope() {
        let text = "id,name\n1,a\n1,a\n,\n";
        let options = ValidateOptions {
            checks: vec![CheckDescriptor::DuplicateRow],
            pick_errors: vec!["#row".into()],
            skip_errors: vec!["blank-row".into()],
            ..ValidateOptions::default()
        };
        let report = validate(&mut table(text), &options);
        let t = report.table().unwrap();
        assert_eq!(t.error_codes(), ["duplicate-row"]);
        assert!(!t.scope.contains(&"blank-row".to_string()));
        assert!(!t.scope.contains(&"blank-header".to_string()));

        let only_duplicates = ValidateOptions {
            checks: vec![CheckDescriptor::DuplicateRow],
            pick_errors: vec!["duplicate-row".into()],
            ..ValidateOptions::default()
        };
        let report = validate(&mut table(text), &only_duplicates);
        assert_eq!(report.table().unwrap().scope, ["duplicate-row"]);
    }

    #[test]
    fn failed_open_is_a_single_error() {
        let mut t = Table::new(File::from_text("a,b\n1,2\n").with_format("nope"));
        let report = validate(&mut t, &ValidateOptions::default());
        assert!(!report.valid);
        assert_eq!(report.stats.errors, 1);
        assert_eq!(report.table().unwrap().error_codes(), ["format-error"]);
    }

    #[test]
    fn inapplicable_checks_become_check_errors() {
        let options = ValidateOptions {
            checks: vec![
                CheckDescriptor::SequentialValue {
                    field_name: "missing".into(),
                },
                CheckDescriptor::RowConstraint { formula: "(".into() },
            ],
            ..ValidateOptions::default()
        };
        let report = validate(&mut table("id\n1\n2\n"), &options);
        let t = report.table().unwrap();
        assert_eq!(t.error_codes(), ["check-error", "check-error"]);
        assert!(!t.partial);
        assert_eq!(t.stats.rows, Some(2));
    }

    #[test]
    fn custom_checks_get_a_baseline() {
        let checks: Vec<Box<dyn Check>> = vec![Box::new(DuplicateRowCheck::new())];
        let report = validate_with_checks(&mut table("a,b\n1,2\n1,2\n3\n"), checks, &ValidateOptions::default());
        assert_eq!(report.table().unwrap().error_codes(), ["duplicate-row", "missing-cell"]);
    }

    #[test]
    fn self_referencing_foreign_key() {
        let schema = Schema::from_json_str(
            r#"{"fields": [{"name": "id", "type": "integer"}, {"name": "parent", "type": "integer"}],
                "foreignKeys": [{"fields": "parent", "reference": {"resource": "", "fields": "id"}}]}"#,
        )
        .unwrap();
        let mut t = table("id,parent\n1,\n2,1\n3,7\n").with_schema(schema);
        let report = validate(&mut t, &ValidateOptions::default());
        let t = report.table().unwrap();
        assert_eq!(t.error_codes(), ["foreign-key-error"]);
        assert_eq!(t.errors[0].row_position(), Some(4));
    }

    #[test]
    fn expected_stats_are_compared_at_table_end() {
        let mut t = table("id\n1\n2\n").with_stats(Stats {
            rows: Some(3),
            ..Stats::default()
        });
        let report = validate(&mut t, &ValidateOptions::default());
        assert_eq!(report.table().unwrap().error_codes(), ["row-count-error"]);
    }

    #[test]
    fn observer_sees_errors_and_outcome() {
        let recorder = Arc::new(Recorder::default());
        let options = ValidateOptions {
            observer: Some(recorder.clone()),
            alert_at_or_above: Severity::Warning,
            ..ValidateOptions::default()
        };
        validate(&mut table("a\n1\n"), &options);
        validate(&mut table("a,b\n1\n"), &options);
        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events, ["ok:<text>", "error:missing-cell", "fail:Warning", "alert:Warning"]);
    }

    #[test]
    fn descriptors_pick_data_or_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("people.json");
        fs::write(&data, json!([{"id": 1}, {"id": 2}]).to_string()).unwrap();
        let descriptor = dir.path().join("people.resource.yaml");
        fs::write(&descriptor, "name: people\npath: people.json\nstats: {rows: 5}\n").unwrap();

        assert!(validate_path(&data, &ValidateOptions::default()).valid);
        let report = validate_path(&descriptor, &ValidateOptions::default());
        assert_eq!(report.table().unwrap().name, "people");
        assert_eq!(report.table().unwrap().error_codes(), ["row-count-error"]);
    }

    #[test]
    fn options_admit_by_code_and_tag() {
        let options = ValidateOptions {
            pick_errors: vec!["#cell".into()],
            skip_errors: vec!["type-error".into()],
            ..ValidateOptions::default()
        };
        assert!(options.admits(&diagnostics::EXTRA_CELL));
        assert!(!options.admits(&diagnostics::TYPE_ERROR));
        assert!(!options.admits(&diagnostics::BLANK_ROW));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn memory_limit_stops_the_run() {
        let rows: Vec<Vec<serde_json::Value>> = std::iter::once(vec![json!("n")])
            .chain((0..MEMORY_SAMPLE_ROWS + 10).map(|i| vec![json!(i)]))
            .collect();
        let mut t = Table::new(File::from_rows(rows));
        let options = ValidateOptions {
            limit_memory: 0,
            ..ValidateOptions::default()
        };
        let report = validate(&mut t, &options);
        let t = report.table().unwrap();
        assert!(t.partial);
        assert_eq!(t.error_codes(), ["task-error"]);
        assert!(t.errors[0].note.starts_with("exceeded memory limit \"0MB\""));
    }
}
