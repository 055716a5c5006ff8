//! Startup time benchmarks for the startup-time binary itself

use criterion::{Criterion, criterion_group, criterion_main};
use std::process::Command;

const BIN: &str = env!("CARGO_BIN_EXE_startup-time");

fn startup_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("startup");

    // Benchmark --version startup time
    group.bench_function("version_startup", |b| {
        b.iter(|| {
            let output = Command::new(BIN)
                .arg("--version")
                .output()
                .expect("Failed to execute command");
            assert!(output.status.success());
        });
    });

    // Benchmark loading the bundled catalog
    group.bench_function("help_only_startup", |b| {
        b.iter(|| {
            let output = Command::new(BIN)
                .args(["--help-only", "--json"])
                .output()
                .expect("Failed to execute command");
            assert!(output.status.success());
        });
    });

    group.finish();
}

criterion_group!(benches, startup_benchmark);
criterion_main!(benches);
