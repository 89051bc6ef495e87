use std::sync::{Arc, Mutex};

use serde_json::json;
use tabular_validate::checks::{CheckDescriptor, Lookup};
use tabular_validate::execution::{ExecutionEvent, ExecutionObserver, ExecutionOptions};
use tabular_validate::file::File;
use tabular_validate::report::Report;
use tabular_validate::schema::Schema;
use tabular_validate::table::Table;
use tabular_validate::types::Value;
use tabular_validate::validate::{
    ValidateOptions, validate, validate_dir, validate_glob, validate_path, validate_resource,
};
use tabular_validate::resource::Resource;

fn people_schema() -> Schema {
    Schema::from_path("tests/fixtures/people.schema.json").unwrap()
}

fn serial() -> ExecutionOptions {
    ExecutionOptions {
        num_threads: Some(2),
        max_in_flight_tasks: 2,
    }
}

#[test]
fn inferred_table_is_valid() {
    let mut table = Table::new(File::from_text("id,name\n1,english\n2,中国人\n"));
    let report = validate(&mut table, &ValidateOptions::default());
    assert!(report.valid, "{:?}", report.errors);
    let table = report.table().unwrap();
    assert!(table.valid);
    assert!(!table.partial);
    assert_eq!(table.stats.rows, Some(2));
    assert_eq!(table.labels, ["id", "name"]);
}

#[test]
fn forced_schema_reports_type_error() {
    let schema = Schema::from_json_str(
        r#"{"fields": [{"name": "id", "type": "integer"}, {"name": "name", "type": "string"}]}"#,
    )
    .unwrap();
    let mut table = Table::new(File::from_text("id,name\n1,english\nabc,break\n")).with_schema(schema);
    let report = validate(&mut table, &ValidateOptions::default());
    assert!(!report.valid);
    assert_eq!(
        report.flatten(&["rowPosition", "fieldPosition", "code"]),
        vec![vec![json!(3), json!(1), json!("type-error")]]
    );
}

#[test]
fn invalid_fixture_reports_cell_and_integrity_errors() {
    let mut table = Table::from_path("tests/fixtures/invalid.csv").with_schema(people_schema());
    let report = validate(&mut table, &ValidateOptions::default());
    assert!(!report.valid);
    assert_eq!(
        report.flatten(&["rowPosition", "fieldPosition", "code"]),
        vec![
            vec![json!(3), json!(3), json!("constraint-error")],
            vec![json!(3), json!(4), json!("type-error")],
            vec![json!(3), json!(1), json!("unique-error")],
            vec![json!(3), json!(null), json!("primary-key-error")],
            vec![json!(4), json!(1), json!("type-error")],
            vec![json!(4), json!(null), json!("primary-key-error")],
            vec![json!(5), json!(5), json!("extra-cell")],
        ]
    );
}

#[test]
fn null_primary_key_cell_is_a_required_constraint_error() {
    let schema = Schema::from_json_str(
        r#"{"fields": [{"name": "id", "type": "integer"}, {"name": "name", "type": "string"}], "primaryKey": "id"}"#,
    )
    .unwrap();
    let mut table = Table::new(File::from_text("id,name
1,a
,b
")).with_schema(schema);
    let report = validate(&mut table, &ValidateOptions::default());
    assert_eq!(
        report.flatten(&["rowPosition", "fieldPosition", "code"]),
        vec![
            vec![json!(3), json!(1), json!("constraint-error")],
            vec![json!(3), json!(null), json!("primary-key-error")],
        ]
    );
}

#[test]
fn skip_errors_by_tag_removes_integrity_errors() {
    let mut table = Table::from_path("tests/fixtures/invalid.csv").with_schema(people_schema());
    let options = ValidateOptions {
        skip_errors: vec!["#integrity".to_string()],
        ..Default::default()
    };
    let report = validate(&mut table, &options);
    let codes = report.table().unwrap().error_codes();
    assert!(!codes.contains(&"primary-key-error"));
    assert!(!codes.contains(&"unique-error"));
    assert!(codes.contains(&"type-error"));
    assert!(!report.table().unwrap().scope.iter().any(|c| c == "unique-error"));
}

#[test]
fn error_limit_stops_and_marks_partial() {
    let mut table = Table::new(File::from_text("id\n1\nx\ny\nz\n")).with_schema(
        Schema::from_json_str(r#"{"fields": [{"name": "id", "type": "integer"}]}"#).unwrap(),
    );
    let options = ValidateOptions {
        limit_errors: 1,
        ..Default::default()
    };
    let report = validate(&mut table, &options);
    let table = report.table().unwrap();
    assert!(table.partial);
    assert!(!table.valid);
    assert_eq!(table.errors.len(), 1);
    assert_eq!(table.errors[0].row_position(), Some(3));
}

#[test]
fn foreign_keys_resolve_against_a_lookup() {
    let mut lookup = Lookup::new();
    let fields = vec!["id".to_string()];
    lookup.extend("ids", &fields, vec![vec![Value::Integer(1)], vec![Value::Integer(2)]]);

    let schema = Schema::from_json_str(
        r#"{
            "fields": [{"name": "ref", "type": "integer"}],
            "foreignKeys": [{"fields": "ref", "reference": {"resource": "ids", "fields": "id"}}]
        }"#,
    )
    .unwrap();
    let rows = vec![vec![json!("ref")], vec![json!(1)], vec![json!(2)], vec![json!(3)]];
    let mut table = Table::new(File::from_rows(rows))
        .with_schema(schema)
        .with_lookup(Arc::new(lookup));
    let report = validate(&mut table, &ValidateOptions::default());
    assert_eq!(report.table().unwrap().error_codes(), ["foreign-key-error"]);
    assert_eq!(report.flatten(&["rowPosition"]), vec![vec![json!(4)]]);
}

#[test]
fn baseline_only_validation_leaves_foreign_keys_out_of_scope() {
    let mut lookup = Lookup::new();
    lookup.extend("ids", &["id".to_string()], vec![vec![Value::Integer(1)]]);
    let schema = Schema::from_json_str(
        r#"{
            "fields": [{"name": "ref", "type": "integer"}],
            "foreignKeys": [{"fields": "ref", "reference": {"resource": "ids", "fields": "id"}}]
        }"#,
    )
    .unwrap();
    let rows = vec![vec![json!("ref")], vec![json!(1)], vec![json!(9)]];
    let mut table = Table::new(File::from_rows(rows))
        .with_schema(schema)
        .with_lookup(Arc::new(lookup));
    let options = ValidateOptions {
        checks: vec![CheckDescriptor::Baseline],
        ..Default::default()
    };
    let report = validate(&mut table, &options);
    assert!(report.valid, "{:?}", report.tables[0].errors);
    assert!(!report.tables[0].scope.iter().any(|c| c == "foreign-key-error"));

    table.open().unwrap();
    let rows: Vec<_> = table.row_stream().unwrap().collect::<Result<_, _>>().unwrap();
    let codes: Vec<&str> = rows[1].errors().iter().map(|e| e.code()).collect();
    assert_eq!(codes, ["foreign-key-error"]);
}

#[test]
fn package_descriptor_checks_sibling_foreign_keys() {
    let report = validate_path("tests/fixtures/package.yaml", &ValidateOptions::default());
    assert_eq!(report.stats.tables, 2);
    assert!(!report.valid);

    let names: Vec<&str> = report.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["countries", "capitals"]);
    assert!(report.tables[0].valid);
    assert_eq!(
        report.tables[1].flatten(&["rowPosition", "code"]),
        vec![vec![json!(4), json!("foreign-key-error")]]
    );
}

#[derive(Default)]
struct TaskLog(Mutex<Vec<String>>);

impl ExecutionObserver for TaskLog {
    fn on_event(&self, event: &ExecutionEvent) {
        let line = match event {
            ExecutionEvent::RunStarted { tasks } => format!("run:{tasks}"),
            ExecutionEvent::TaskStarted { name, .. } => format!("start:{name}"),
            ExecutionEvent::TaskFinished { name, .. } => format!("finish:{name}"),
            ExecutionEvent::RunFinished { metrics, .. } => format!("done:{}", metrics.tasks_finished),
            ExecutionEvent::ThrottleWaited { .. } => return,
        };
        self.0.lock().unwrap().push(line);
    }
}

#[test]
fn package_runs_report_task_events_to_the_execution_observer() {
    let log = Arc::new(TaskLog::default());
    let options = ValidateOptions {
        execution_observer: Some(log.clone()),
        ..Default::default()
    };
    let report = validate_path("tests/fixtures/package.yaml", &options);
    assert_eq!(report.stats.tables, 2);

    let mut events = log.0.lock().unwrap().clone();
    assert_eq!(events.first().map(String::as_str), Some("run:2"));
    assert_eq!(events.last().map(String::as_str), Some("done:2"));
    events.sort();
    assert_eq!(
        events,
        ["done:2", "finish:capitals", "finish:countries", "run:2", "start:capitals", "start:countries"]
    );
}

#[test]
fn resource_descriptor_with_expected_stats() {
    let report = validate_path("tests/fixtures/people.resource.json", &ValidateOptions::default());
    assert!(report.valid, "{:?}", report.tables);
    assert_eq!(report.table().unwrap().name, "people");

    let mut resource = Resource::from_path("tests/fixtures/people.resource.json").unwrap();
    resource.stats.rows = Some(5);
    let report = validate_resource(resource, &ValidateOptions::default());
    assert_eq!(report.table().unwrap().error_codes(), ["row-count-error"]);
}

#[test]
fn plain_data_paths_are_validated_directly() {
    let report = validate_path("tests/fixtures/people.csv", &ValidateOptions::default());
    assert!(report.valid);
    assert_eq!(report.table().unwrap().stats.rows, Some(2));
}

#[test]
fn missing_path_is_a_single_source_error() {
    let report = validate_path("tests/fixtures/does-not-exist.csv", &ValidateOptions::default());
    assert!(!report.valid);
    let table = report.table().unwrap();
    assert_eq!(table.errors.len(), 1);
    assert_eq!(table.errors[0].code(), "source-error");
}

#[test]
fn directories_and_globs_become_packages() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.csv"), "id\n1\n2\n").unwrap();
    std::fs::write(dir.path().join("b.csv"), "id,name\n1\n").unwrap();
    std::fs::write(dir.path().join("notes.md"), "# not data\n").unwrap();

    let report = validate_dir(dir.path(), &ValidateOptions::default(), &serial());
    let names: Vec<&str> = report.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);
    assert!(report.tables[0].valid);
    assert_eq!(report.tables[1].error_codes(), ["missing-cell"]);

    let pattern = format!("{}/*.csv", dir.path().display());
    let report = validate_glob(&pattern, &ValidateOptions::default(), &serial());
    assert_eq!(report.stats.tables, 2);
    assert_eq!(report.stats.errors, 1);
}

#[test]
fn row_constraint_and_duplicate_checks() {
    let mut table = Table::new(File::from_text("low,high\n1,2\n3,2\n1,2\n"));
    let options = ValidateOptions {
        checks: vec![
            CheckDescriptor::RowConstraint {
                formula: "low < high".to_string(),
            },
            CheckDescriptor::DuplicateRow,
        ],
        ..Default::default()
    };
    let report = validate(&mut table, &options);
    assert_eq!(
        report.flatten(&["rowPosition", "code"]),
        vec![vec![json!(3), json!("row-constraint")], vec![json!(4), json!("duplicate-row")]]
    );
}

#[test]
fn reports_round_trip_through_json() {
    let mut table = Table::from_path("tests/fixtures/invalid.csv").with_schema(people_schema());
    let report = validate(&mut table, &ValidateOptions::default());
    let restored = Report::from_json_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(restored.valid, report.valid);
    assert_eq!(restored.tables[0].errors, report.tables[0].errors);
    assert_eq!(
        restored.flatten(&["rowPosition", "code"]),
        report.flatten(&["rowPosition", "code"])
    );
}
