//! Sites, their per-variable slots, and per-transaction snapshots.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::clock::VirtualClock;
use crate::types::{SiteId, Tick, TxnName, Value, VariableId};

/// Availability of a site. DOWN gates writes and (for replicated
/// variables) reads; it does not discard any state.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteStatus {
    Up,
    Down,
}

/// What one transaction sees of (and intends for) one replica slot.
///
/// Installed for every live slot at `begin`, updated by writes, and read
/// by every gate of the commit validator. All five fields are preserved
/// through every update path.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// The value the transaction would commit here, or saw at begin.
    /// `None` when the site was DOWN at begin time.
    pub value: Option<Value>,
    /// Whether this transaction has successfully written this slot.
    pub dirty: bool,
    /// Tick of the last successful write that set `value`.
    pub write_success_tick: Option<Tick>,
    /// Tick of the last write attempt, successful or against a DOWN site.
    pub write_attempt_tick: Option<Tick>,
    /// Whether a read by this transaction found no replica available.
    pub read_blocked: bool,
}

impl Snapshot {
    /// Snapshot installed at begin on an UP site: the current committed
    /// value, stamped with fresh ticks.
    #[must_use]
    pub const fn live(value: Value, success_tick: Tick, attempt_tick: Tick) -> Self {
        Self {
            value: Some(value),
            dirty: false,
            write_success_tick: Some(success_tick),
            write_attempt_tick: Some(attempt_tick),
            read_blocked: false,
        }
    }

    /// Snapshot installed at begin on a DOWN site: no value, no ticks.
    #[must_use]
    pub const fn dark() -> Self {
        Self {
            value: None,
            dirty: false,
            write_success_tick: None,
            write_attempt_tick: None,
            read_blocked: false,
        }
    }
}

/// One replica of a variable on one site: the committed value, when it
/// was last committed, and every live transaction's snapshot of it.
#[derive(Debug, Clone)]
pub struct SiteSlot {
    pub value: Value,
    pub committed_at: Tick,
    pub snapshots: HashMap<TxnName, Snapshot>,
}

impl SiteSlot {
    #[must_use]
    pub fn new(value: Value, committed_at: Tick) -> Self {
        Self {
            value,
            committed_at,
            snapshots: HashMap::new(),
        }
    }
}

/// One of the ten sites.
///
/// The recovery history is seeded with a tick at construction, so
/// `recovery_ticks` is never empty, and fail/recover alternate from
/// there: a DOWN site always has a failure tick newer than its last
/// recovery tick.
#[derive(Debug, Clone)]
pub struct Site {
    pub id: SiteId,
    pub status: SiteStatus,
    /// Slots keyed by variable, in variable-index order.
    pub slots: BTreeMap<VariableId, SiteSlot>,
    pub recovery_ticks: Vec<Tick>,
    pub failure_ticks: Vec<Tick>,
}

impl Site {
    #[must_use]
    pub fn new(id: SiteId, clock: &mut VirtualClock) -> Self {
        Self {
            id,
            status: SiteStatus::Up,
            slots: BTreeMap::new(),
            recovery_ticks: alloc::vec![clock.now()],
            failure_ticks: Vec::new(),
        }
    }

    /// Marks the site DOWN. Snapshots are kept; only status and the
    /// failure history change.
    pub fn fail(&mut self, clock: &mut VirtualClock) {
        self.failure_ticks.push(clock.now());
        self.status = SiteStatus::Down;
        tracing::debug!(site = %self.id, "site failed");
    }

    /// Marks the site UP again. No variable values change.
    pub fn recover(&mut self, clock: &mut VirtualClock) {
        self.recovery_ticks.push(clock.now());
        self.status = SiteStatus::Up;
        tracing::debug!(site = %self.id, "site recovered");
    }

    #[must_use]
    pub fn is_up(&self) -> bool {
        self.status == SiteStatus::Up
    }

    /// Tick of the most recent recovery. Seeded at construction, so
    /// always present.
    #[must_use]
    pub fn last_recovery(&self) -> Tick {
        self.recovery_ticks.last().copied().unwrap_or(0)
    }

    /// Tick of the most recent failure, if the site has ever failed.
    #[must_use]
    pub fn last_failure(&self) -> Option<Tick> {
        self.failure_ticks.last().copied()
    }
}
