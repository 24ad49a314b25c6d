//! Transactions, their operation logs, and commit outcomes.

pub mod manager;

use alloc::collections::BTreeMap;
use alloc::string::ToString;
use alloc::vec::Vec;
use core::fmt::{self, Display, Formatter};

use crate::clock::VirtualClock;
use crate::types::{CommittedVersion, Tick, TxnName, Value, VariableId};

/// Operation recorded in a transaction's log.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Begin,
    Read,
    Write,
}

/// One entry of a transaction's log, stamped at the tick the operation
/// was issued. The merged, per-variable view of all logs is what the
/// dependency graph derives its edges from.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub txn: TxnName,
    pub op: Op,
    pub variable: Option<VariableId>,
    pub value: Option<Value>,
    pub tick: Tick,
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Committed,
    Aborted,
}

/// A transaction and the bookkeeping the validator needs at end time.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub name: TxnName,
    pub start_tick: Tick,
    pub committed_at: Option<Tick>,
    pub state: TxnState,
    /// Which transaction had last committed each variable when this one
    /// began; the baseline for first-committer-wins.
    pub last_seen_commits: BTreeMap<VariableId, CommittedVersion>,
    pub log: Vec<LogEntry>,
}

impl Transaction {
    #[must_use]
    pub fn new(
        name: &str,
        last_seen_commits: BTreeMap<VariableId, CommittedVersion>,
        clock: &mut VirtualClock,
    ) -> Self {
        Self {
            name: name.to_string(),
            start_tick: clock.now(),
            committed_at: None,
            state: TxnState::Active,
            last_seen_commits,
            log: Vec::new(),
        }
    }

    pub fn log_begin(&mut self, clock: &mut VirtualClock) {
        self.log.push(LogEntry {
            txn: self.name.clone(),
            op: Op::Begin,
            variable: None,
            value: None,
            tick: clock.now(),
        });
    }

    pub fn log_read(&mut self, clock: &mut VirtualClock, variable: VariableId) {
        self.log.push(LogEntry {
            txn: self.name.clone(),
            op: Op::Read,
            variable: Some(variable),
            value: None,
            tick: clock.now(),
        });
    }

    pub fn log_write(&mut self, clock: &mut VirtualClock, variable: VariableId, value: Value) {
        self.log.push(LogEntry {
            txn: self.name.clone(),
            op: Op::Write,
            variable: Some(variable),
            value: Some(value),
            tick: clock.now(),
        });
    }
}

/// Why a commit attempt was rejected. The displayed text is the abort
/// report the run output carries.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// A replica this transaction wrote to failed before the commit.
    SiteFailedAfterWrite,
    /// Another transaction won the first-committer race on `variable`.
    CommittedFirst { variable: VariableId, by: TxnName },
    /// A read found no available replica and was never unblocked.
    ReadBlocked,
    /// Committing would close a cycle in the serialization graph.
    DependencyCycle,
}

impl Display for AbortReason {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::SiteFailedAfterWrite => write!(f, "site failed after a write"),
            Self::CommittedFirst { variable, by } => {
                write!(f, "({variable}, {by}, committed first)")
            }
            Self::ReadBlocked => write!(
                f,
                "Aborted because no site has a committed write to read the variable being read"
            ),
            Self::DependencyCycle => {
                write!(f, "Aborting; because it would have created a cycle")
            }
        }
    }
}

/// Merge every transaction's log into per-variable sequences, sorted by
/// tick. BEGIN entries carry no variable and drop out.
#[must_use]
pub fn logs_by_variable(
    transactions: &BTreeMap<TxnName, Transaction>,
) -> BTreeMap<VariableId, Vec<LogEntry>> {
    let mut by_variable: BTreeMap<VariableId, Vec<LogEntry>> = BTreeMap::new();
    for txn in transactions.values() {
        for entry in &txn.log {
            if let Some(variable) = entry.variable {
                by_variable.entry(variable).or_default().push(entry.clone());
            }
        }
    }
    for entries in by_variable.values_mut() {
        entries.sort_by_key(|entry| entry.tick);
    }
    by_variable
}
