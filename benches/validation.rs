use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tabular_validate::checks::CheckDescriptor;
use tabular_validate::file::File;
use tabular_validate::table::Table;
use tabular_validate::validate::{ValidateOptions, validate};

fn people_csv(rows: usize) -> String {
    let mut out = String::from("id,name,score,active,joined\n");
    for i in 0..rows {
        let score = (i % 100) as f64 + 0.5;
        let active = i % 3 != 0;
        out.push_str(&format!("{i},person{i},{score},{active},2024-01-{:02}\n", i % 28 + 1));
    }
    out
}

fn bench_row_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("row_stream");
    for rows in [1_000usize, 10_000] {
        let text = people_csv(rows);
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &text, |b, text| {
            b.iter(|| {
                let mut table = Table::new(File::from_text(text.clone()));
                table.open().unwrap();
                let count = table.row_stream().unwrap().filter_map(Result::ok).count();
                black_box(count)
            })
        });
    }
    group.finish();
}

fn bench_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate");
    let rows = 10_000usize;
    let text = people_csv(rows);
    group.throughput(Throughput::Elements(rows as u64));

    group.bench_function("default_checks", |b| {
        b.iter(|| {
            let mut table = Table::new(File::from_text(text.clone()));
            black_box(validate(&mut table, &ValidateOptions::default()))
        })
    });

    let heuristics = ValidateOptions {
        checks: vec![
            CheckDescriptor::Integrity,
            CheckDescriptor::DuplicateRow,
            CheckDescriptor::TruncatedValue,
            CheckDescriptor::RowConstraint {
                formula: "score >= 0 and score <= 100".to_string(),
            },
        ],
        ..Default::default()
    };
    group.bench_function("heuristic_checks", |b| {
        b.iter(|| {
            let mut table = Table::new(File::from_text(text.clone()));
            black_box(validate(&mut table, &heuristics))
        })
    });
    group.finish();
}

criterion_group!(benches, bench_row_stream, bench_validate);
criterion_main!(benches);
