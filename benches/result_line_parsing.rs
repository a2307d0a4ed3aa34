use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tae::infrastructure::process::parse_result_line;

const LINES: &[(&str, &str)] = &[
    ("plain", "Result for SMAC: SAT, 0.9, -1, 0, 12345"),
    ("additional", "Result for ParamILS: TIMEOUT, 10.0, 2147483647, 0, 7, reached cutoff"),
    ("lowercase", "final results of this wrapper: unsat, 3.25, 100, 1.5, 99"),
    ("malformed", "Result for SMAC: SAT, fast, -1, 0, 1"),
    ("not_a_result", "c Solving instance with 12 variables and 40 clauses"),
];

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_result_line");
    for (name, line) in LINES {
        group.bench_with_input(BenchmarkId::from_parameter(name), line, |b, line| {
            b.iter(|| black_box(parse_result_line(black_box(line))));
        });
    }
    group.finish();
}

fn bench_scan_output(c: &mut Criterion) {
    let mut output: Vec<String> = (0..1000)
        .map(|i| format!("c iteration {i}: {} conflicts", i * 37))
        .collect();
    output.push("Result for SMAC: SAT, 0.9, -1, 0, 12345".to_string());

    c.bench_function("scan_1000_lines", |b| {
        b.iter(|| {
            output
                .iter()
                .filter_map(|line| parse_result_line(black_box(line)))
                .count()
        });
    });
}

criterion_group!(benches, bench_parse, bench_scan_output);
criterion_main!(benches);
