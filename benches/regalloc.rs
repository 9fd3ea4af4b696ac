use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use dexopt::ir::ircode_from_string;
use dexopt::regalloc::{allocate, AllocConfig};

/// A straight-line body with `n` constants all live until a final fold.
fn generate_pressure(n: usize) -> String {
    let mut body = String::from("((load-param v0)\n");
    for i in 1..=n {
        body.push_str(&format!("(const v{} {})\n", i, i));
    }
    for i in 1..=n {
        body.push_str(&format!("(add-int v0 v0 v{})\n", i));
    }
    body.push_str("(return v0))");
    body
}

/// `n` diamonds in sequence, each joining a value defined on both arms.
fn generate_diamonds(n: usize) -> String {
    let mut body = String::from("((load-param v0)\n(const v1 0)\n");
    for i in 0..n {
        body.push_str(&format!(
            "(if-eqz v0 :else{i})\n(const v2 {i})\n(goto :join{i})\n(:else{i})\n(const v2 -{i})\n(:join{i})\n(add-int v1 v1 v2)\n"
        ));
    }
    body.push_str("(return v1))");
    body
}

fn bench_allocators(c: &mut Criterion) {
    let mut group = c.benchmark_group("regalloc");
    let allocators = [
        ("coloring", AllocConfig::default()),
        (
            "linear_scan",
            AllocConfig {
                use_linear_scan: true,
                ..AllocConfig::default()
            },
        ),
    ];

    for size in [16usize, 64, 256] {
        for (shape, src) in [("pressure", generate_pressure(size)), ("diamonds", generate_diamonds(size))] {
            for (name, config) in &allocators {
                group.bench_with_input(
                    BenchmarkId::new(format!("{}/{}", shape, name), size),
                    &size,
                    |b, _| {
                        b.iter_batched(
                            || {
                                let mut code = ircode_from_string(&src).expect("bench body parses");
                                code.build_cfg(true).expect("bench body builds a cfg");
                                code
                            },
                            |mut code| {
                                let stats = allocate("Lbench/T;.m:()V", &mut code, config);
                                black_box(stats.is_ok());
                            },
                            BatchSize::SmallInput,
                        );
                    },
                );
            }
        }
    }

    group.finish();
}

criterion_group!(benches, bench_allocators);
criterion_main!(benches);
