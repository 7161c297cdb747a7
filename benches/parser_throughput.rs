//! Test runner output parsing throughput benchmark.
//!
//! Measures parse_test_output on structured JSON reports of growing size and
//! on the plain-text summary fallback using Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quality_guard::tools::test_suite::parse_test_output;
use serde_json::json;

fn json_report(suites: usize) -> String {
    let results: Vec<_> = (0..suites)
        .map(|i| {
            json!({
                "name": format!("/repo/tests/suite_{}.test.js", i),
                "status": if i % 10 == 0 { "failed" } else { "passed" },
                "endTime": 1_700_000_000_000u64 + i as u64,
                "assertionResults": [
                    {"fullName": format!("suite {} works", i), "status": "passed", "failureMessages": []},
                    {
                        "fullName": format!("suite {} edge case", i),
                        "status": if i % 10 == 0 { "failed" } else { "passed" },
                        "failureMessages": if i % 10 == 0 { vec!["expected 1 to be 2\n    at Object.<anonymous>"] } else { vec![] },
                    },
                ],
            })
        })
        .collect();
    let failed = suites.div_ceil(10);
    let report = json!({
        "success": failed == 0,
        "numTotalTests": suites * 2,
        "numPassedTests": suites * 2 - failed,
        "numFailedTests": failed,
        "numPendingTests": 0,
        "numTodoTests": 0,
        "testResults": results,
    });
    format!("> jest --json\n{}\n", report)
}

fn bench_json_report(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_json_report");
    for &suites in &[1usize, 10, 100, 1000] {
        let stdout = json_report(suites);
        group.bench_with_input(BenchmarkId::from_parameter(suites), &stdout, |b, s| {
            b.iter(|| parse_test_output(black_box(s)));
        });
    }
    group.finish();
}

fn bench_text_fallback(c: &mut Criterion) {
    let mut stdout = String::new();
    for i in 0..500 {
        stdout.push_str(&format!("PASS tests/case_{}.test.js\n", i));
    }
    stdout.push_str("Tests:       2 failed, 1 skipped, 497 passed, 500 total\nTime:        4.2 s\n");

    c.bench_function("parse_text_fallback", |b| {
        b.iter(|| parse_test_output(black_box(&stdout)));
    });
}

criterion_group!(benches, bench_json_report, bench_text_fallback);
criterion_main!(benches);
