use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dexopt::dex::{ClassCreator, DexMethodRef, DexStore, DexStoresVector, DexType, ACC_PUBLIC};
use dexopt::ir::method_from_string;
use dexopt::reachability::{compute_reachable_objects, IgnoreSets, ReachabilityOptions};

/// `n` classes in a call chain from a single root, plus `n` unreferenced
/// classes for the sweep to find.
fn generate_chain(n: usize) -> DexStoresVector {
    let mut classes = Vec::with_capacity(2 * n);
    for i in 0..n {
        let cls = format!("Lbench/chain{}/C{};", n, i);
        let body = if i + 1 < n {
            format!(
                r#"((invoke-static () "Lbench/chain{}/C{};.step:()V") (return-void))"#,
                n,
                i + 1
            )
        } else {
            "((return-void))".to_string()
        };
        let method = method_from_string(&format!(
            "(method (public static) \"{}.step:()V\" {})",
            cls, body
        ))
        .expect("bench method parses");
        classes.push(
            ClassCreator::new(DexType::make(&cls))
                .set_access(ACC_PUBLIC)
                .add_method(method)
                .create()
                .expect("bench class is new"),
        );
    }
    for i in 0..n {
        let cls = format!("Lbench/chain{}/Dead{};", n, i);
        classes.push(
            ClassCreator::new(DexType::make(&cls))
                .set_access(ACC_PUBLIC)
                .create()
                .expect("bench class is new"),
        );
    }
    if let Some(root) = DexMethodRef::make_from_descriptor(&format!("Lbench/chain{}/C0;.step:()V", n))
        .ok()
        .and_then(|m| m.as_def())
    {
        root.rstate().set_root();
    }
    let mut store = DexStore::new("classes");
    store.add_classes(classes);
    vec![store]
}

fn bench_marking(c: &mut Criterion) {
    let mut group = c.benchmark_group("reachability");

    for size in [100usize, 1000, 5000] {
        let stores = generate_chain(size);
        for jobs in [1usize, 4] {
            let options = ReachabilityOptions {
                num_threads: jobs,
                ..ReachabilityOptions::default()
            };
            group.bench_with_input(
                BenchmarkId::new(format!("threads_{}", jobs), size),
                &size,
                |b, _| {
                    b.iter(|| {
                        let result = compute_reachable_objects(&stores, &IgnoreSets::default(), &options);
                        black_box(result.map(|(r, _)| r.num_marked_classes()).ok());
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_marking);
criterion_main!(benches);
