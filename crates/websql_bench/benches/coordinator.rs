//! Coordinator benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use websql_bench::{generate_rows, random_params, scripted_database};
use websql_bridge::Resolution;
use websql_core::{StatementCallbacks, TransactionCallbacks};

/// Benchmark an empty transaction: connect, savepoint, success.
fn bench_empty_transaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("empty_transaction");

    for resolution in [Resolution::Immediate, Resolution::Deferred] {
        let label = format!("{resolution:?}").to_lowercase();
        group.bench_function(label, |b| {
            let (bridge, db) = scripted_database(resolution);
            b.iter(|| {
                db.transaction(|_| Ok(()), TransactionCallbacks::new());
                bridge.run_until_idle();
            });
        });
    }
    group.finish();
}

/// Benchmark transactions issuing many statements.
fn bench_statements_per_transaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("statements_per_transaction");

    for count in [1, 10, 100].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let (bridge, db) = scripted_database(Resolution::Deferred);
            let params = random_params(4);

            b.iter(|| {
                let params = params.clone();
                db.transaction(
                    move |tx| {
                        for _ in 0..count {
                            tx.execute("INSERT INTO t VALUES (?, ?, ?, ?)", black_box(params.clone()))?;
                        }
                        Ok(())
                    },
                    TransactionCallbacks::new(),
                );
                bridge.run_until_idle();
            });
        });
    }
    group.finish();
}

/// Benchmark out-of-order completion.
fn bench_lifo_completion(c: &mut Criterion) {
    c.bench_function("lifo_completion_50", |b| {
        let (bridge, db) = scripted_database(Resolution::Deferred);
        b.iter(|| {
            db.transaction(
                |tx| {
                    for i in 0..50 {
                        tx.execute("UPDATE t SET v = ?", vec![json!(i)])?;
                    }
                    Ok(())
                },
                TransactionCallbacks::new(),
            );
            bridge.run_until_idle_lifo();
        });
    });
}

/// Benchmark a queue of root transactions drained in one go.
fn bench_queue_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_drain");

    for depth in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*depth as u64));
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let (bridge, db) = scripted_database(Resolution::Deferred);
            b.iter(|| {
                for _ in 0..depth {
                    db.transaction(
                        |tx| tx.execute("SELECT 1", vec![]).map(|_| ()),
                        TransactionCallbacks::new(),
                    );
                }
                bridge.run_until_idle();
                assert!(!db.is_queue_active());
            });
        });
    }
    group.finish();
}

/// Benchmark result set decoding.
fn bench_result_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("result_rows");

    for rows in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), rows, |b, &rows| {
            let (bridge, db) = scripted_database(Resolution::Immediate);
            bridge.rows_for("SELECT", generate_rows(rows, 64));

            b.iter(|| {
                db.transaction(
                    |tx| {
                        tx.execute_sql(
                            "SELECT * FROM notes",
                            vec![],
                            StatementCallbacks::new().on_success(|_, rs| {
                                black_box(rs.rows().len());
                            }),
                        )?;
                        Ok(())
                    },
                    TransactionCallbacks::new(),
                );
            });
        });
    }
    group.finish();
}

/// Benchmark nested transactions sharing the root connection.
fn bench_nested(c: &mut Criterion) {
    c.bench_function("nested_depth_3", |b| {
        let (bridge, db) = scripted_database(Resolution::Deferred);
        b.iter(|| {
            db.transaction(
                |tx| {
                    tx.transaction(
                        |child| {
                            child.transaction(
                                |grandchild| grandchild.execute("SELECT 1", vec![]).map(|_| ()),
                                TransactionCallbacks::new(),
                            )?;
                            Ok(())
                        },
                        TransactionCallbacks::new(),
                    )?;
                    Ok(())
                },
                TransactionCallbacks::new(),
            );
            bridge.run_until_idle();
        });
    });
}

criterion_group!(
    benches,
    bench_empty_transaction,
    bench_statements_per_transaction,
    bench_lifo_completion,
    bench_queue_drain,
    bench_result_rows,
    bench_nested,
);
criterion_main!(benches);
