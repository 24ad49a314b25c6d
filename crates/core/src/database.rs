//! The data manager: owns every site and variable, routes reads and
//! writes under the replica-availability rules, and validates commits.
//!
//! # Commit validation
//!
//! `attempt_commit` walks every (variable, replica) pair in variable-index
//! then site-id order and applies, per pair:
//!
//! 1. fail-after-write: a dirty snapshot whose site records a failure
//!    tick newer than the write attempt rejects the commit outright;
//! 2. first-committer-wins: a dirty snapshot whose variable was committed
//!    by someone other than the version seen at begin, at or after this
//!    transaction's start tick, records a conflict and keeps scanning;
//! 3. read-blocked: a snapshot still flagged from an unavailable read
//!    rejects the commit outright.
//!
//! Accumulated first-committer conflicts reject after the scan. Only a
//! clean scan consults the dependency graph, and only a clean graph
//! answer promotes the transaction's writes to every replica.
//!
//! The interleaving (not four separate passes) is observable on
//! adversarial inputs and is preserved deliberately, as is the duplicate
//! conflict entry per replica of a contended replicated variable.

use alloc::collections::BTreeMap;
use alloc::string::ToString;
use alloc::vec::Vec;

use crate::clock::VirtualClock;
use crate::graph::dependency::DependencyGraph;
use crate::site::{Site, SiteSlot, Snapshot, SiteStatus};
use crate::txn::{logs_by_variable, AbortReason, Transaction};
use crate::types::{CommittedVersion, SiteId, TxnName, Value, VariableId, SITE_COUNT, VARIABLE_COUNT};

/// A logical variable: identity plus the provenance of its committed
/// state. Placement and per-replica state live with the sites.
#[derive(Debug, Clone)]
pub struct Variable {
    pub id: VariableId,
    pub committed_version: CommittedVersion,
}

/// Result of a read attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A replica served the transaction's snapshot of the variable.
    /// `None` only when the snapshot itself holds no value.
    Served(Option<Value>),
    /// No replica could serve. The snapshot is flagged on every replica
    /// and the transaction will abort at end unless a recovery unblocks
    /// it first.
    Blocked,
}

/// Owns all sites and variables; the single store every transaction
/// reads from and writes to.
#[derive(Debug, Clone)]
pub struct Database {
    sites: Vec<Site>,
    variables: Vec<Variable>,
}

impl Database {
    /// Builds the cluster: ten UP sites, then every slot seeded with the
    /// variable's initial value. Each site's construction and each slot's
    /// seed consumes its own clock tick.
    #[must_use]
    pub fn new(clock: &mut VirtualClock) -> Self {
        let sites: Vec<Site> = (1..=SITE_COUNT)
            .filter_map(SiteId::new)
            .map(|id| Site::new(id, clock))
            .collect();
        let variables: Vec<Variable> = (1..=VARIABLE_COUNT)
            .filter_map(VariableId::new)
            .map(|id| Variable {
                id,
                committed_version: CommittedVersion::Initial,
            })
            .collect();

        let mut database = Self { sites, variables };
        for index in 0..database.variables.len() {
            let id = database.variables[index].id;
            for site_id in id.replica_sites() {
                let slot = SiteSlot::new(id.initial_value(), clock.now());
                database.site_mut(site_id).slots.insert(id, slot);
            }
        }
        database
    }

    #[must_use]
    pub fn site(&self, id: SiteId) -> &Site {
        &self.sites[usize::from(id.index()) - 1]
    }

    pub fn site_mut(&mut self, id: SiteId) -> &mut Site {
        &mut self.sites[usize::from(id.index()) - 1]
    }

    #[must_use]
    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    #[must_use]
    pub fn variable(&self, id: VariableId) -> &Variable {
        &self.variables[usize::from(id.index()) - 1]
    }

    /// Installs a snapshot of every slot for a beginning transaction:
    /// the committed value with fresh ticks on UP sites, an empty
    /// placeholder on DOWN sites.
    pub fn begin(&mut self, clock: &mut VirtualClock, txn: &str) {
        for site in &mut self.sites {
            match site.status {
                SiteStatus::Up => {
                    for slot in site.slots.values_mut() {
                        let snapshot =
                            Snapshot::live(slot.value.clone(), clock.now(), clock.now());
                        slot.snapshots.insert(txn.to_string(), snapshot);
                    }
                }
                SiteStatus::Down => {
                    for slot in site.slots.values_mut() {
                        slot.snapshots.insert(txn.to_string(), Snapshot::dark());
                    }
                }
            }
        }
    }

    /// The committed version of every variable right now; captured into
    /// a beginning transaction as its first-committer baseline.
    #[must_use]
    pub fn last_commits(&self) -> BTreeMap<VariableId, CommittedVersion> {
        self.variables
            .iter()
            .map(|variable| (variable.id, variable.committed_version.clone()))
            .collect()
    }

    /// Reads `variable` on behalf of `txn` under the availability rules.
    ///
    /// A non-replicated variable is served by its home site if that site
    /// is UP, or if the transaction began inside a prior UP window (after
    /// the last recovery, before the last failure).
    ///
    /// A replicated variable is served by the first UP replica whose last
    /// failure and recovery both precede the transaction's start and
    /// which has a commit newer than its last recovery that either
    /// precedes the transaction's start or belongs to a never-failed
    /// site. A site recovers into a state where its replicas are
    /// writable but not readable until a committed write lands.
    ///
    /// When no replica qualifies, the snapshot on every replica is
    /// flagged `read_blocked` and the read reports [`ReadOutcome::Blocked`].
    pub fn read(&mut self, txn: &Transaction, variable: VariableId) -> ReadOutcome {
        if variable.is_replicated() {
            for site_id in variable.replica_sites() {
                let site = self.site(site_id);
                if !site.is_up() {
                    continue;
                }
                let last_recovered = site.last_recovery();
                let last_failed = site.last_failure().unwrap_or(0);
                if last_failed < txn.start_tick && last_recovered < txn.start_tick {
                    if let Some(slot) = site.slots.get(&variable) {
                        if slot.committed_at > last_recovered
                            && (slot.committed_at < txn.start_tick || last_failed == 0)
                        {
                            let value = slot
                                .snapshots
                                .get(&txn.name)
                                .and_then(|snapshot| snapshot.value.clone());
                            return ReadOutcome::Served(value);
                        }
                    }
                }
            }
        } else {
            let site = self.site(variable.home_site());
            let in_prior_up_window = site.last_recovery() < txn.start_tick
                && site
                    .last_failure()
                    .is_some_and(|failed| txn.start_tick < failed);
            if site.is_up() || in_prior_up_window {
                let value = site
                    .slots
                    .get(&variable)
                    .and_then(|slot| slot.snapshots.get(&txn.name))
                    .and_then(|snapshot| snapshot.value.clone());
                return ReadOutcome::Served(value);
            }
        }

        tracing::debug!(txn = %txn.name, %variable, "read blocked: no replica can serve");
        for site_id in variable.replica_sites() {
            if let Some(snapshot) = self
                .site_mut(site_id)
                .slots
                .get_mut(&variable)
                .and_then(|slot| slot.snapshots.get_mut(&txn.name))
            {
                snapshot.read_blocked = true;
            }
        }
        ReadOutcome::Blocked
    }

    /// Writes `value` into the transaction's snapshot on every UP
    /// replica; DOWN replicas only record the attempt tick, which the
    /// fail-after-write gate later compares against failure history.
    ///
    /// Returns whether at least one replica accepted the write.
    pub fn write(
        &mut self,
        clock: &mut VirtualClock,
        txn: &str,
        variable: VariableId,
        value: &Value,
    ) -> bool {
        let mut accepted = 0usize;
        let mut replicas = 0usize;
        for site_id in variable.replica_sites() {
            replicas += 1;
            let up = self.site(site_id).is_up();
            let Some(snapshot) = self
                .site_mut(site_id)
                .slots
                .get_mut(&variable)
                .and_then(|slot| slot.snapshots.get_mut(txn))
            else {
                continue;
            };
            if up {
                snapshot.value = Some(value.clone());
                snapshot.dirty = true;
                snapshot.write_success_tick = Some(clock.now());
                snapshot.write_attempt_tick = Some(clock.now());
                accepted += 1;
            } else {
                snapshot.write_attempt_tick = Some(clock.now());
            }
        }
        if accepted == 0 {
            tracing::debug!(txn, %variable, replicas, "write reached no UP replica");
        }
        accepted >= 1
    }

    pub fn fail_site(&mut self, clock: &mut VirtualClock, id: SiteId) {
        self.site_mut(id).fail(clock);
    }

    /// Recovers a site and clears the `read_blocked` flag on every
    /// snapshot of every slot on every site, unblocking any transaction
    /// that was pending an unavailable read. Returns whether any
    /// snapshot entries were touched.
    pub fn recover_site(&mut self, clock: &mut VirtualClock, id: SiteId) -> bool {
        self.site_mut(id).recover(clock);
        let mut touched = false;
        for site in &mut self.sites {
            for slot in site.slots.values_mut() {
                for snapshot in slot.snapshots.values_mut() {
                    snapshot.read_blocked = false;
                    touched = true;
                }
            }
        }
        if touched {
            tracing::debug!(site = %id, "recovery cleared pending read blocks");
        }
        touched
    }

    /// Per-site committed values of all variables, sites in id order and
    /// slots in variable-index order. Side-effect free.
    #[must_use]
    pub fn dump(&self) -> Vec<(SiteId, Vec<(VariableId, Value)>)> {
        self.sites
            .iter()
            .map(|site| {
                (
                    site.id,
                    site.slots
                        .iter()
                        .map(|(variable, slot)| (*variable, slot.value.clone()))
                        .collect(),
                )
            })
            .collect()
    }

    /// Validates and, on success, applies a commit. See the module docs
    /// for the gate order. `transactions` must contain every transaction
    /// ever begun; the dependency graph derives edges from their merged
    /// logs.
    ///
    /// # Errors
    ///
    /// The collected [`AbortReason`]s of the first gate that rejected.
    pub fn attempt_commit(
        &mut self,
        clock: &mut VirtualClock,
        graph: &mut DependencyGraph,
        txn: &Transaction,
        transactions: &BTreeMap<TxnName, Transaction>,
    ) -> Result<(), Vec<AbortReason>> {
        let mut outcome = true;
        let mut conflicts = Vec::new();

        for variable in &self.variables {
            for site_id in variable.id.replica_sites() {
                let site = self.site(site_id);
                let Some(snapshot) = site
                    .slots
                    .get(&variable.id)
                    .and_then(|slot| slot.snapshots.get(&txn.name))
                else {
                    continue;
                };

                for &failure in &site.failure_ticks {
                    if snapshot.dirty
                        && snapshot
                            .write_attempt_tick
                            .is_some_and(|attempt| failure > attempt)
                    {
                        tracing::debug!(
                            txn = %txn.name,
                            site = %site_id,
                            variable = %variable.id,
                            "commit rejected: site failed after a write"
                        );
                        return Err(alloc::vec![AbortReason::SiteFailedAfterWrite]);
                    }
                }

                if snapshot.dirty {
                    if let CommittedVersion::Committed(owner) = &variable.committed_version {
                        let seen = txn
                            .last_seen_commits
                            .get(&variable.id)
                            .and_then(CommittedVersion::committer);
                        if seen == Some(owner.as_str()) {
                            continue;
                        }
                        // Equality with the start tick counts as losing the race.
                        let committed_first = transactions
                            .get(owner)
                            .and_then(|other| other.committed_at)
                            .is_some_and(|committed_at| committed_at >= txn.start_tick);
                        if committed_first {
                            outcome = false;
                            conflicts.push(AbortReason::CommittedFirst {
                                variable: variable.id,
                                by: owner.clone(),
                            });
                        }
                    }
                }

                if snapshot.read_blocked {
                    tracing::debug!(
                        txn = %txn.name,
                        variable = %variable.id,
                        "commit rejected: read was blocked and never unblocked"
                    );
                    return Err(alloc::vec![AbortReason::ReadBlocked]);
                }
            }
        }

        if !outcome {
            tracing::debug!(txn = %txn.name, conflicts = conflicts.len(), "commit rejected: lost first-committer race");
            return Err(conflicts);
        }

        if graph.will_create_cycle(&txn.name, &logs_by_variable(transactions), transactions) {
            return Err(alloc::vec![AbortReason::DependencyCycle]);
        }

        for index in 0..self.variables.len() {
            let id = self.variables[index].id;
            for site_id in id.replica_sites() {
                let mut promoted = false;
                if let Some(slot) = self.site_mut(site_id).slots.get_mut(&id) {
                    if let Some(snapshot) = slot.snapshots.get(&txn.name) {
                        if snapshot.dirty {
                            if let Some(value) = snapshot.value.clone() {
                                // Writing back the already-committed value
                                // promotes nothing and moves no version.
                                if slot.value != value {
                                    slot.value = value;
                                    slot.committed_at = clock.now();
                                    promoted = true;
                                }
                            }
                        }
                    }
                }
                if promoted {
                    self.variables[index].committed_version =
                        CommittedVersion::Committed(txn.name.clone());
                }
            }
        }
        tracing::debug!(txn = %txn.name, "commit applied");
        Ok(())
    }
}
