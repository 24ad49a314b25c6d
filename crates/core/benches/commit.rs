use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use repkv_core::TransactionManager;

/// Drive a scripted workload: `txns` transactions in windows of three,
/// each reading and writing a few variables, with a fail/recover pulse
/// every eighth transaction.
fn run_workload(txns: usize) -> TransactionManager {
    let mut tm = TransactionManager::new();
    for i in 0..txns {
        let name = format!("T{i}");
        tm.begin(&name).expect("begin");

        let variable = format!("x{}", (i % 20) + 1);
        let other = format!("x{}", ((i + 7) % 20) + 1);
        let _ = tm.read(&name, &variable).expect("read");
        tm.write(&name, &other, &format!("v{i}")).expect("write");

        if i % 8 == 7 {
            let site = format!("{}", (i % 10) + 1);
            tm.fail(&site).expect("fail");
            tm.recover(&site).expect("recover");
        }

        // End the transaction begun two iterations ago, keeping a small
        // window of live transactions.
        if i >= 2 {
            tm.end(&format!("T{}", i - 2)).expect("end");
        }
    }
    for i in txns.saturating_sub(2)..txns {
        tm.end(&format!("T{i}")).expect("end");
    }
    tm
}

fn bench_commit(c: &mut Criterion) {
    c.bench_function("workload_small_20_txns", |b| {
        b.iter(|| black_box(run_workload(20)));
    });

    c.bench_function("workload_medium_100_txns", |b| {
        b.iter(|| black_box(run_workload(100)));
    });

    c.bench_function("dump_after_workload", |b| {
        let tm = run_workload(50);
        b.iter(|| black_box(tm.dump()));
    });
}

criterion_group!(benches, bench_commit);
criterion_main!(benches);
