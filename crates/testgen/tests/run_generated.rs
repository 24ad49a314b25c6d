//! Cross-check: generated workloads must run through the engine without
//! dispatch errors, and the engine's invariants must hold afterwards.

use repkv_core::types::CommittedVersion;
use repkv_core::txn::TxnState;
use repkv_core::TransactionManager;
use repkv_parser::Command;
use repkv_testgen::generate_single_workload;

fn run(commands: &[Command]) -> TransactionManager {
    let mut tm = TransactionManager::new();
    for command in commands {
        match command {
            Command::Begin { txn } => tm.begin(txn).expect("begin dispatch"),
            Command::Read { txn, variable } => {
                tm.read(txn, variable).expect("read dispatch");
            }
            Command::Write {
                txn,
                variable,
                value,
            } => {
                tm.write(txn, variable, value).expect("write dispatch");
            }
            Command::Fail { site } => tm.fail(site).expect("fail dispatch"),
            Command::Recover { site } => {
                tm.recover(site).expect("recover dispatch");
            }
            Command::End { txn } => {
                tm.end(txn).expect("end dispatch");
            }
            Command::Dump => {
                tm.dump();
            }
        }
    }
    tm
}

#[test]
fn generated_workloads_dispatch_cleanly() {
    for _ in 0..5 {
        let commands = generate_single_workload(10, 5, 3, 3);
        let tm = run(&commands);

        // Every committed version belongs to a transaction that the
        // manager recorded as committed, after its own start.
        for variable in tm.database().variables() {
            if let CommittedVersion::Committed(name) = &variable.committed_version {
                let txn = tm.transaction(name).expect("committer is known");
                assert_eq!(txn.state, TxnState::Committed);
                let committed_at = txn.committed_at.expect("committed tick set");
                assert!(committed_at > txn.start_tick);
            }
        }

        // Every committed transaction is a node of the dependency graph.
        for name in ["T1", "T5", "T10"] {
            if let Some(txn) = tm.transaction(name) {
                if txn.state == TxnState::Committed {
                    assert!(tm.graph().nodes.contains_key(name));
                }
            }
        }

        // Dump stays stable once the run is over.
        assert_eq!(tm.dump(), tm.dump());
    }
}

#[test]
fn heavy_contention_still_dispatches() {
    // One variable window with many concurrent writers: plenty of
    // first-committer aborts, but never a dispatch error.
    let commands = generate_single_workload(20, 3, 6, 0);
    let tm = run(&commands);
    let committed = (1..=20)
        .filter(|i| {
            tm.transaction(&format!("T{i}"))
                .is_some_and(|txn| txn.state == TxnState::Committed)
        })
        .count();
    // The first transaction to end always has a clean slate somewhere,
    // but we only assert the run completed and bookkeeping is coherent.
    assert!(committed <= 20);
    assert_eq!(tm.dump(), tm.dump());
}
