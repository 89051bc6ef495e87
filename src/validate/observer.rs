use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::diagnostics::Diagnostic;
use crate::report::ReportTable;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational event.
    Info,
    /// The table was read to the end but has errors.
    Warning,
    /// Validation could not finish: a check or the source failed, or a budget was hit.
    Error,
    /// The source could not be reached at all (I/O).
    Critical,
}

/// Which table a callback is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationContext {
    pub name: String,
    pub place: String,
}

/// Observer interface for validation outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait ValidationObserver: Send + Sync {
    /// Called when a table validates without errors.
    fn on_success(&self, _ctx: &ValidationContext, _table: &ReportTable) {}

    /// Called when a table is invalid.
    fn on_failure(&self, _ctx: &ValidationContext, _severity: Severity, _table: &ReportTable) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &ValidationContext, severity: Severity, table: &ReportTable) {
        self.on_failure(ctx, severity, table)
    }

    /// Called for every admitted error as soon as it is recorded.
    fn on_error(&self, _ctx: &ValidationContext, _error: &Diagnostic) {}
}

/// Fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn ValidationObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn ValidationObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl ValidationObserver for CompositeObserver {
    fn on_success(&self, ctx: &ValidationContext, table: &ReportTable) {
        for o in &self.observers {
            o.on_success(ctx, table);
        }
    }

    fn on_failure(&self, ctx: &ValidationContext, severity: Severity, table: &ReportTable) {
        for o in &self.observers {
            o.on_failure(ctx, severity, table);
        }
    }

    fn on_alert(&self, ctx: &ValidationContext, severity: Severity, table: &ReportTable) {
        for o in &self.observers {
            o.on_alert(ctx, severity, table);
        }
    }

    fn on_error(&self, ctx: &ValidationContext, error: &Diagnostic) {
        for o in &self.observers {
            o.on_error(ctx, error);
        }
    }
}

/// Logs validation outcomes to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl ValidationObserver for StdErrObserver {
    fn on_success(&self, ctx: &ValidationContext, table: &ReportTable) {
        eprintln!(
            "[validate][ok] name={} place={} rows={}",
            ctx.name,
            ctx.place,
            table.stats.rows.unwrap_or_default()
        );
    }

    fn on_failure(&self, ctx: &ValidationContext, severity: Severity, table: &ReportTable) {
        eprintln!(
            "[validate][{:?}] name={} place={} errors={} partial={}",
            severity, ctx.name, ctx.place, table.stats.errors, table.partial
        );
    }

    fn on_alert(&self, ctx: &ValidationContext, severity: Severity, table: &ReportTable) {
        eprintln!(
            "[ALERT][validate][{:?}] name={} place={} first={}",
            severity,
            ctx.name,
            ctx.place,
            table.errors.first().map(ToString::to_string).unwrap_or_default()
        );
    }
}

/// Appends validation outcomes to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Writes are best-effort; failures to open or write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl ValidationObserver for FileObserver {
    fn on_success(&self, ctx: &ValidationContext, table: &ReportTable) {
        self.append_line(&format!(
            "{} ok name={} place={} rows={}",
            unix_ts(),
            ctx.name,
            ctx.place,
            table.stats.rows.unwrap_or_default()
        ));
    }

    fn on_failure(&self, ctx: &ValidationContext, severity: Severity, table: &ReportTable) {
        self.append_line(&format!(
            "{} fail severity={:?} name={} place={} errors={} codes={}",
            unix_ts(),
            severity,
            ctx.name,
            ctx.place,
            table.stats.errors,
            table.error_codes().join(",")
        ));
    }

    fn on_alert(&self, ctx: &ValidationContext, severity: Severity, table: &ReportTable) {
        self.append_line(&format!(
            "{} ALERT severity={:?} name={} place={} errors={}",
            unix_ts(),
            severity,
            ctx.name,
            ctx.place,
            table.stats.errors
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
