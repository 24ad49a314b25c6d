//! The serialization graph of committed and committing transactions.
//!
//! The graph persists across the whole run. Nodes are the transactions
//! that have committed; edges are `ww` and `rw` dependencies between
//! transaction names, accumulated as commits are attempted. A committing
//! transaction is incorporated hypothetically: its edges are derived and
//! added first, and only if the gate passes does its node join the graph.
//!
//! # Edge derivation
//!
//! For each variable's merged, tick-sorted log:
//!
//! - `rw` (anti-dependency): every *other* transaction with a read of
//!   the variable points at the committing transaction, provided the
//!   committing transaction appears in that variable's log and wrote it.
//!   Candidates collected for a variable the committing transaction
//!   never wrote are discarded wholesale.
//! - `ww`: every *other* transaction with a write of the variable that
//!   is already a node (i.e. committed) and whose commit tick precedes
//!   the committing transaction's start tick points at it. No check
//!   that the committing transaction wrote the variable is made.
//!
//! `wr` dependencies are carried per node for introspection only; the
//! gate never reads them.
//!
//! # The two-step gate
//!
//! 1. A greedy scan for two consecutive `rw` hops: from every node with
//!    outgoing edges, hop along the first available `rw` neighbor, at
//!    most twice, without backtracking. Two anti-dependencies in a row
//!    are the minimal dangerous structure under snapshot isolation.
//! 2. Only if step 1 fires, a directed cycle test over the unlabeled
//!    projection of the full edge set. Demanding an actual cycle on top
//!    of the dangerous structure avoids aborting transactions whose
//!    anti-dependency chain never closes.
//!
//! The greedy scan can miss chains whose first hop is shadowed by a
//! dead-end `rw` neighbor; that looseness is tolerated because step 2
//! is the decisive test. Edges are kept in a `BTreeSet` so "first
//! available neighbor" means the least `(target, kind)` pair and the
//! scan is deterministic. A rejected commit leaves its derived edges in
//! the set; only the node insertion is withheld.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::ToString;
use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::graph::digraph::DiGraph;
use crate::txn::{LogEntry, Op, Transaction};
use crate::types::{TxnName, VariableId};

/// Dependency label on an edge between two transactions.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    /// Write-write: the source committed a write the target overwrote.
    Ww,
    /// Write-read: the source committed a write the target read.
    Wr,
    /// Read-write (anti-dependency): the source read a value the target
    /// overwrites.
    Rw,
}

/// A committed transaction in the graph. The per-kind lists mirror the
/// node's edges for introspection; the gate works off the global edge
/// set.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub ww_edges: Vec<TxnName>,
    pub wr_edges: Vec<TxnName>,
    pub rw_edges: Vec<TxnName>,
}

/// The persistent serialization graph.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Committed transactions, by name.
    pub nodes: HashMap<TxnName, Node>,
    /// `(source, target, kind)` triples, ordered for deterministic walks.
    pub edges: BTreeSet<(TxnName, TxnName, EdgeKind)>,
}

impl DependencyGraph {
    /// Hypothetically incorporates `txn` and decides whether committing
    /// it is acceptable.
    ///
    /// Derives this transaction's `rw` and `ww` edges from the merged
    /// per-variable logs, adds them to the graph, and runs the two-step
    /// gate. Returns `true` when the commit must be rejected; on `false`
    /// the transaction becomes a node and its edges stay.
    pub fn will_create_cycle(
        &mut self,
        txn: &str,
        logs_by_variable: &BTreeMap<VariableId, Vec<LogEntry>>,
        transactions: &BTreeMap<TxnName, Transaction>,
    ) -> bool {
        for logs in logs_by_variable.values() {
            let mut rw_candidates: Vec<&str> = Vec::new();
            let mut has_begun = false;
            let mut writes_here = false;
            for entry in logs {
                if entry.txn == txn {
                    has_begun = true;
                    if entry.op == Op::Write {
                        writes_here = true;
                    }
                } else if entry.op == Op::Read {
                    rw_candidates.push(entry.txn.as_str());
                }
            }
            // Readers of a variable this transaction never wrote are not
            // anti-dependencies.
            if has_begun && writes_here {
                for reader in rw_candidates {
                    self.edges
                        .insert((reader.to_string(), txn.to_string(), EdgeKind::Rw));
                }
            }
        }

        let start_tick = transactions.get(txn).map(|t| t.start_tick);
        for logs in logs_by_variable.values() {
            for entry in logs {
                if entry.op != Op::Write || entry.txn == txn || !self.nodes.contains_key(&entry.txn)
                {
                    continue;
                }
                let committed_before_start = transactions
                    .get(&entry.txn)
                    .and_then(|other| other.committed_at)
                    .zip(start_tick)
                    .is_some_and(|(committed_at, start)| committed_at < start);
                if committed_before_start {
                    self.edges
                        .insert((entry.txn.clone(), txn.to_string(), EdgeKind::Ww));
                }
            }
        }

        if self.has_consecutive_rw() {
            let mut projection: DiGraph<TxnName> = DiGraph::default();
            for (source, target, _) in &self.edges {
                projection.add_edge(source.clone(), target.clone());
            }
            if projection.has_cycle() {
                tracing::debug!(txn, "dangerous structure closes a cycle; rejecting commit");
                return true;
            }
        }

        self.nodes.insert(txn.to_string(), Node::default());
        false
    }

    /// Greedy scan for two consecutive `rw` hops.
    ///
    /// From each node with outgoing edges, hops to the first available
    /// `rw` neighbor, then tries one more `rw` hop from there. No
    /// backtracking.
    #[must_use]
    pub fn has_consecutive_rw(&self) -> bool {
        let mut adjacency: BTreeMap<&str, Vec<(&str, EdgeKind)>> = BTreeMap::new();
        for (source, target, kind) in &self.edges {
            adjacency
                .entry(source.as_str())
                .or_default()
                .push((target.as_str(), *kind));
        }

        for &start in adjacency.keys() {
            let mut hops = 0;
            let mut current = start;
            while hops < 2 {
                let next = adjacency.get(current).and_then(|neighbors| {
                    neighbors
                        .iter()
                        .find(|(_, kind)| *kind == EdgeKind::Rw)
                        .map(|(target, _)| *target)
                });
                match next {
                    Some(target) => {
                        hops += 1;
                        current = target;
                    }
                    None => break,
                }
            }
            if hops == 2 {
                return true;
            }
        }
        false
    }
}
