//! The facade a command dispatcher drives.
//!
//! Owns the clock, the database, the dependency graph, and the map of
//! every transaction ever begun. Graph nodes and committed versions
//! refer to transactions by name and resolve through that map; nothing
//! holds an owning back-reference.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::clock::VirtualClock;
use crate::database::{Database, ReadOutcome};
use crate::graph::dependency::DependencyGraph;
use crate::txn::{AbortReason, Transaction, TxnState};
use crate::types::{SiteId, TxnName, Value, VariableId};

/// A command named something the engine does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    UnknownTransaction(String),
    UnknownVariable(String),
    UnknownSite(String),
    /// A second `begin` with a name already in use this run.
    DuplicateTransaction(String),
}

/// What `end` decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    Aborted(Vec<AbortReason>),
}

impl CommitOutcome {
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }
}

/// Tracks every transaction and drives begin/read/write/end against the
/// database, plus the site fail/recover/dump passthroughs.
#[derive(Debug, Clone)]
pub struct TransactionManager {
    clock: VirtualClock,
    database: Database,
    graph: DependencyGraph,
    transactions: BTreeMap<TxnName, Transaction>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    /// A fresh cluster: all sites UP, every variable seeded.
    #[must_use]
    pub fn new() -> Self {
        let mut clock = VirtualClock::new();
        let database = Database::new(&mut clock);
        Self {
            clock,
            database,
            graph: DependencyGraph::default(),
            transactions: BTreeMap::new(),
        }
    }

    /// Starts a transaction: captures the first-committer baseline,
    /// records the BEGIN log entry, and installs snapshots everywhere.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateTransaction`] if the name is already in use.
    pub fn begin(&mut self, name: &str) -> Result<(), Error> {
        if self.transactions.contains_key(name) {
            return Err(Error::DuplicateTransaction(name.to_string()));
        }
        tracing::debug!(txn = name, "begin");
        let mut txn = Transaction::new(name, self.database.last_commits(), &mut self.clock);
        txn.log_begin(&mut self.clock);
        self.database.begin(&mut self.clock, name);
        self.transactions.insert(name.to_string(), txn);
        Ok(())
    }

    /// Records the READ log entry and routes the read.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownVariable`] / [`Error::UnknownTransaction`].
    pub fn read(&mut self, name: &str, variable: &str) -> Result<ReadOutcome, Error> {
        let variable = VariableId::from_name(variable)
            .ok_or_else(|| Error::UnknownVariable(variable.to_string()))?;
        let txn = self
            .transactions
            .get_mut(name)
            .ok_or_else(|| Error::UnknownTransaction(name.to_string()))?;
        txn.log_read(&mut self.clock, variable);
        let txn = self
            .transactions
            .get(name)
            .ok_or_else(|| Error::UnknownTransaction(name.to_string()))?;
        Ok(self.database.read(txn, variable))
    }

    /// Records the WRITE log entry and updates snapshots on every UP
    /// replica. Returns whether any replica accepted the write; a
    /// rejected write is not an abort by itself.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownVariable`] / [`Error::UnknownTransaction`].
    pub fn write(&mut self, name: &str, variable: &str, value: &str) -> Result<bool, Error> {
        let variable = VariableId::from_name(variable)
            .ok_or_else(|| Error::UnknownVariable(variable.to_string()))?;
        let txn = self
            .transactions
            .get_mut(name)
            .ok_or_else(|| Error::UnknownTransaction(name.to_string()))?;
        let value = Value::Text(value.to_string());
        txn.log_write(&mut self.clock, variable, value.clone());
        Ok(self.database.write(&mut self.clock, name, variable, &value))
    }

    /// Attempts to commit. The validator sees the logs of every
    /// transaction ever begun, committed ones included.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownTransaction`].
    pub fn end(&mut self, name: &str) -> Result<CommitOutcome, Error> {
        let txn = self
            .transactions
            .get(name)
            .ok_or_else(|| Error::UnknownTransaction(name.to_string()))?;
        let verdict = self.database.attempt_commit(
            &mut self.clock,
            &mut self.graph,
            txn,
            &self.transactions,
        );
        match verdict {
            Ok(()) => {
                let committed_at = self.clock.now();
                if let Some(txn) = self.transactions.get_mut(name) {
                    txn.state = TxnState::Committed;
                    txn.committed_at = Some(committed_at);
                }
                tracing::debug!(txn = name, committed_at, "transaction committed");
                Ok(CommitOutcome::Committed)
            }
            Err(reasons) => {
                if let Some(txn) = self.transactions.get_mut(name) {
                    txn.state = TxnState::Aborted;
                }
                tracing::debug!(txn = name, reasons = reasons.len(), "transaction aborted");
                Ok(CommitOutcome::Aborted(reasons))
            }
        }
    }

    /// # Errors
    ///
    /// [`Error::UnknownSite`].
    pub fn fail(&mut self, site: &str) -> Result<(), Error> {
        let id = SiteId::from_text(site).ok_or_else(|| Error::UnknownSite(site.to_string()))?;
        self.database.fail_site(&mut self.clock, id);
        Ok(())
    }

    /// Recovers a site. Returns whether any pending read blocks were
    /// cleared (i.e. any snapshots existed to unblock).
    ///
    /// # Errors
    ///
    /// [`Error::UnknownSite`].
    pub fn recover(&mut self, site: &str) -> Result<bool, Error> {
        let id = SiteId::from_text(site).ok_or_else(|| Error::UnknownSite(site.to_string()))?;
        Ok(self.database.recover_site(&mut self.clock, id))
    }

    /// Per-site committed values, for the `dump()` command.
    #[must_use]
    pub fn dump(&self) -> Vec<(SiteId, Vec<(VariableId, Value)>)> {
        self.database.dump()
    }

    #[must_use]
    pub fn transaction(&self, name: &str) -> Option<&Transaction> {
        self.transactions.get(name)
    }

    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.database
    }

    #[must_use]
    pub const fn graph(&self) -> &DependencyGraph {
        &self.graph
    }
}
