//! End-to-end runs of the engine through full command sequences:
//! failures, recoveries, contended commits, and the serialization-graph
//! gate.

use repkv_core::txn::AbortReason;
use repkv_core::types::{CommittedVersion, SiteId, Value, VariableId};
use repkv_core::{CommitOutcome, ReadOutcome, TransactionManager};

fn x(index: u8) -> VariableId {
    VariableId::new(index).unwrap()
}

fn s(index: u8) -> SiteId {
    SiteId::new(index).unwrap()
}

fn read(tm: &mut TransactionManager, txn: &str, variable: &str) -> ReadOutcome {
    tm.read(txn, variable).expect("read dispatch")
}

fn end(tm: &mut TransactionManager, txn: &str) -> CommitOutcome {
    tm.end(txn).expect("end dispatch")
}

/// Committed value of a variable at one site, per dump.
fn dumped(tm: &TransactionManager, site: u8, variable: u8) -> Value {
    tm.dump()
        .into_iter()
        .find(|(id, _)| *id == s(site))
        .and_then(|(_, slots)| {
            slots
                .into_iter()
                .find(|(id, _)| *id == x(variable))
                .map(|(_, value)| value)
        })
        .expect("slot present in dump")
}

#[test]
fn single_write_commits_and_lands_on_the_home_site() {
    let mut tm = TransactionManager::new();
    tm.begin("T1").unwrap();
    assert!(tm.write("T1", "x1", "101").unwrap());
    assert!(end(&mut tm, "T1").is_committed());

    // x1 is odd and lives only on site 2.
    assert_eq!(dumped(&tm, 2, 1), Value::Text("101".into()));
    assert_eq!(
        tm.database().variable(x(1)).committed_version,
        CommittedVersion::Committed("T1".into())
    );
}

#[test]
fn first_committer_wins_on_a_replicated_variable() {
    let mut tm = TransactionManager::new();
    tm.begin("T1").unwrap();
    tm.begin("T2").unwrap();
    tm.write("T1", "x2", "50").unwrap();
    tm.write("T2", "x2", "60").unwrap();

    assert!(end(&mut tm, "T1").is_committed());

    let CommitOutcome::Aborted(reasons) = end(&mut tm, "T2") else {
        panic!("T2 should lose the first-committer race");
    };
    // One conflict entry per replica of x2 is recorded.
    assert_eq!(reasons.len(), 10);
    assert!(reasons.iter().all(|reason| {
        *reason
            == AbortReason::CommittedFirst {
                variable: x(2),
                by: "T1".into(),
            }
    }));

    // The committed value is T1's everywhere.
    for site in 1..=10 {
        assert_eq!(dumped(&tm, site, 2), Value::Text("50".into()));
    }
}

#[test]
fn committer_that_predates_the_start_is_tolerated() {
    let mut tm = TransactionManager::new();
    tm.begin("T1").unwrap();
    tm.write("T1", "x2", "50").unwrap();
    assert!(end(&mut tm, "T1").is_committed());

    // T2 begins after T1 committed, so its baseline already names T1.
    tm.begin("T2").unwrap();
    tm.write("T2", "x2", "60").unwrap();
    assert!(end(&mut tm, "T2").is_committed());
    assert_eq!(dumped(&tm, 1, 2), Value::Text("60".into()));
}

#[test]
fn site_failure_after_a_write_aborts() {
    let mut tm = TransactionManager::new();
    tm.begin("T1").unwrap();
    tm.write("T1", "x2", "77").unwrap();
    tm.fail("3").unwrap();

    assert_eq!(
        end(&mut tm, "T1"),
        CommitOutcome::Aborted(vec![AbortReason::SiteFailedAfterWrite])
    );
    // Nothing was promoted.
    assert_eq!(dumped(&tm, 1, 2), Value::Int(20));
    assert_eq!(
        tm.database().variable(x(2)).committed_version,
        CommittedVersion::Initial
    );
}

#[test]
fn failure_before_the_write_attempt_does_not_abort() {
    let mut tm = TransactionManager::new();
    tm.begin("T1").unwrap();
    tm.fail("3").unwrap();
    // Site 3 is DOWN during the write: nine replicas accept it.
    assert!(tm.write("T1", "x2", "77").unwrap());
    assert!(end(&mut tm, "T1").is_committed());

    // The DOWN replica kept its old value; UP replicas promoted.
    assert_eq!(dumped(&tm, 3, 2), Value::Int(20));
    assert_eq!(dumped(&tm, 4, 2), Value::Text("77".into()));
}

#[test]
fn write_reaching_no_replica_is_not_fatal() {
    let mut tm = TransactionManager::new();
    tm.begin("T1").unwrap();
    for site in 1..=10 {
        tm.fail(&site.to_string()).unwrap();
    }
    // No replica accepts, so the write reports failure...
    assert!(!tm.write("T1", "x2", "9").unwrap());
    // ...but nothing is dirty, so the commit is clean.
    assert!(end(&mut tm, "T1").is_committed());
    assert_eq!(dumped(&tm, 1, 2), Value::Int(20));
}

#[test]
fn blocked_read_aborts_unless_a_recovery_unblocks_it() {
    // Branch 1: no recovery, the flag survives to the validator.
    let mut tm = TransactionManager::new();
    for site in 1..=10 {
        tm.fail(&site.to_string()).unwrap();
    }
    tm.begin("T1").unwrap();
    assert_eq!(read(&mut tm, "T1", "x2"), ReadOutcome::Blocked);
    assert_eq!(
        end(&mut tm, "T1"),
        CommitOutcome::Aborted(vec![AbortReason::ReadBlocked])
    );

    // Branch 2: a recovery before end clears the flag globally and the
    // same sequence commits.
    let mut tm = TransactionManager::new();
    for site in 1..=10 {
        tm.fail(&site.to_string()).unwrap();
    }
    tm.begin("T2").unwrap();
    assert_eq!(read(&mut tm, "T2", "x2"), ReadOutcome::Blocked);
    assert!(tm.recover("5").unwrap());
    assert!(end(&mut tm, "T2").is_committed());
}

#[test]
fn two_anti_dependencies_closing_a_cycle_abort_the_last_committer() {
    let mut tm = TransactionManager::new();
    tm.begin("T1").unwrap();
    tm.begin("T2").unwrap();
    tm.begin("T3").unwrap();

    read(&mut tm, "T1", "x2");
    tm.write("T2", "x2", "22").unwrap();
    read(&mut tm, "T2", "x4");
    tm.write("T3", "x4", "44").unwrap();
    read(&mut tm, "T3", "x6");
    tm.write("T1", "x6", "66").unwrap();

    assert!(end(&mut tm, "T1").is_committed());
    assert!(end(&mut tm, "T2").is_committed());
    assert_eq!(
        end(&mut tm, "T3"),
        CommitOutcome::Aborted(vec![AbortReason::DependencyCycle])
    );
    // The rejected transaction never became a node.
    assert!(!tm.graph().nodes.contains_key("T3"));
    assert!(tm.graph().nodes.contains_key("T1"));
    assert!(tm.graph().nodes.contains_key("T2"));
}

#[test]
fn anti_dependency_chain_without_a_cycle_commits() {
    // T1 reads x2 which T2 overwrites, T2 reads x4 which T3 overwrites,
    // but nothing points back: all three commit.
    let mut tm = TransactionManager::new();
    tm.begin("T1").unwrap();
    tm.begin("T2").unwrap();
    tm.begin("T3").unwrap();

    read(&mut tm, "T1", "x2");
    tm.write("T2", "x2", "22").unwrap();
    read(&mut tm, "T2", "x4");
    tm.write("T3", "x4", "44").unwrap();

    assert!(end(&mut tm, "T1").is_committed());
    assert!(end(&mut tm, "T2").is_committed());
    assert!(end(&mut tm, "T3").is_committed());
}

#[test]
fn odd_variable_reads_through_an_unrelated_failure() {
    let mut tm = TransactionManager::new();
    tm.begin("T1").unwrap();
    tm.fail("3").unwrap();
    // x1 lives on site 2; failing site 3 is irrelevant to it.
    assert_eq!(
        read(&mut tm, "T1", "x1"),
        ReadOutcome::Served(Some(Value::Int(10)))
    );
}

#[test]
fn odd_variable_reads_from_a_prior_up_window() {
    let mut tm = TransactionManager::new();
    tm.begin("T1").unwrap();
    // x1's home site goes DOWN after T1 began: T1 started inside the
    // site's previous UP window and may still read its snapshot.
    tm.fail("2").unwrap();
    assert_eq!(
        read(&mut tm, "T1", "x1"),
        ReadOutcome::Served(Some(Value::Int(10)))
    );

    // A transaction that begins while the site is DOWN cannot.
    tm.begin("T2").unwrap();
    assert_eq!(read(&mut tm, "T2", "x1"), ReadOutcome::Blocked);
}

#[test]
fn recovered_replica_serves_only_after_a_committed_write() {
    let mut tm = TransactionManager::new();
    tm.fail("1").unwrap();
    tm.recover("1").unwrap();

    // T1 begins after the recovery; site 1 has no commit newer than its
    // recovery, so it cannot serve x2, but sites 2..10 still can.
    tm.begin("T1").unwrap();
    assert_eq!(
        read(&mut tm, "T1", "x2"),
        ReadOutcome::Served(Some(Value::Int(20)))
    );

    // A committed write to x2 makes site 1 readable again for later
    // transactions.
    tm.begin("T2").unwrap();
    tm.write("T2", "x2", "202").unwrap();
    assert!(end(&mut tm, "T2").is_committed());
    tm.begin("T3").unwrap();
    assert_eq!(
        read(&mut tm, "T3", "x2"),
        ReadOutcome::Served(Some(Value::Text("202".into())))
    );
}

#[test]
fn committed_writes_replicate_to_every_up_site() {
    let mut tm = TransactionManager::new();
    tm.begin("T1").unwrap();
    tm.write("T1", "x4", "abc").unwrap();
    tm.write("T1", "x7", "def").unwrap();
    assert!(end(&mut tm, "T1").is_committed());

    for site in 1..=10 {
        assert_eq!(dumped(&tm, site, 4), Value::Text("abc".into()));
    }
    // x7 is odd: only site 8 hosts it.
    assert_eq!(dumped(&tm, 8, 7), Value::Text("def".into()));
}

#[test]
fn commit_ticks_strictly_increase() {
    let mut tm = TransactionManager::new();
    let mut previous = 0;
    for name in ["T1", "T2", "T3"] {
        tm.begin(name).unwrap();
        tm.write(name, "x2", name).unwrap();
        assert!(end(&mut tm, name).is_committed());
        let committed_at = tm.transaction(name).unwrap().committed_at.unwrap();
        assert!(committed_at > previous);
        previous = committed_at;
    }
}

#[test]
fn write_then_read_round_trips() {
    let mut tm = TransactionManager::new();
    tm.begin("T1").unwrap();
    tm.write("T1", "x2", "v").unwrap();
    assert!(end(&mut tm, "T1").is_committed());

    tm.begin("U1").unwrap();
    assert_eq!(
        read(&mut tm, "U1", "x2"),
        ReadOutcome::Served(Some(Value::Text("v".into())))
    );
    assert!(end(&mut tm, "U1").is_committed());
}

#[test]
fn snapshot_reads_ignore_later_commits() {
    let mut tm = TransactionManager::new();
    tm.begin("T1").unwrap();
    tm.begin("T2").unwrap();
    tm.write("T2", "x2", "99").unwrap();
    assert!(end(&mut tm, "T2").is_committed());

    // T1's snapshot was taken at begin, before T2's commit.
    assert_eq!(
        read(&mut tm, "T1", "x2"),
        ReadOutcome::Served(Some(Value::Int(20)))
    );
}

#[test]
fn rewriting_the_committed_value_moves_no_version() {
    let mut tm = TransactionManager::new();
    tm.begin("T1").unwrap();
    tm.write("T1", "x2", "50").unwrap();
    assert!(end(&mut tm, "T1").is_committed());

    // T2 writes the byte-identical value: it commits, but the promotion
    // is a no-op and the committed version stays with T1.
    tm.begin("T2").unwrap();
    tm.write("T2", "x2", "50").unwrap();
    assert!(end(&mut tm, "T2").is_committed());
    assert_eq!(
        tm.database().variable(x(2)).committed_version,
        CommittedVersion::Committed("T1".into())
    );
}

#[test]
fn dump_is_side_effect_free() {
    let mut tm = TransactionManager::new();
    tm.begin("T1").unwrap();
    tm.write("T1", "x2", "5").unwrap();
    assert!(end(&mut tm, "T1").is_committed());

    let first = tm.dump();
    let second = tm.dump();
    assert_eq!(first, second);
}
