//! Identifier and value vocabulary shared across the engine.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Display, Formatter};

/// A virtual-clock tick. Strictly increasing across the whole run.
pub type Tick = u64;

/// Transactions are identified by the name the workload gave them.
pub type TxnName = String;

/// Number of sites in the cluster.
pub const SITE_COUNT: u8 = 10;

/// Number of logical variables (`x1` through `x20`).
pub const VARIABLE_COUNT: u8 = 20;

/// Identifier of one of the ten sites, `1..=10`.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, derive_more::Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("{_0}")]
pub struct SiteId(u8);

impl SiteId {
    #[must_use]
    pub const fn new(id: u8) -> Option<Self> {
        if id >= 1 && id <= SITE_COUNT {
            Some(Self(id))
        } else {
            None
        }
    }

    /// Parses a site identifier from workload text, e.g. `"3"`.
    #[must_use]
    pub fn from_text(text: &str) -> Option<Self> {
        text.parse::<u8>().ok().and_then(Self::new)
    }

    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }
}

/// Identifier of one of the twenty logical variables, `x1..x20`.
///
/// Placement is fixed by parity: even-indexed variables are replicated on
/// all ten sites; odd-indexed variables live on the single site with id
/// `(index % 10) + 1`.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, derive_more::Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("x{_0}")]
pub struct VariableId(u8);

impl VariableId {
    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if index >= 1 && index <= VARIABLE_COUNT {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Parses a variable name from workload text, e.g. `"x12"`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        name.strip_prefix('x')
            .and_then(|rest| rest.parse::<u8>().ok())
            .and_then(Self::new)
    }

    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Replicated variables have a copy on every site.
    #[must_use]
    pub const fn is_replicated(self) -> bool {
        self.0 % 2 == 0
    }

    /// The site anchoring this variable; for a non-replicated variable,
    /// its only replica.
    #[must_use]
    pub const fn home_site(self) -> SiteId {
        SiteId(self.0 % 10 + 1)
    }

    /// The sites holding a replica of this variable, in site-id order.
    #[must_use]
    pub fn replica_sites(self) -> Vec<SiteId> {
        if self.is_replicated() {
            (1..=SITE_COUNT).map(SiteId).collect()
        } else {
            alloc::vec![self.home_site()]
        }
    }

    /// The value every replica holds at construction time.
    #[must_use]
    pub fn initial_value(self) -> Value {
        Value::Int(i64::from(self.0) * 10)
    }
}

/// A committed or to-be-committed value.
///
/// Workload values are opaque `\w+` tokens and are kept as text; only the
/// construction-time seeds are integers. The two variants never compare
/// equal, even when the digits match, which the commit promotion rule
/// relies on.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::From)]
pub enum Value {
    Int(i64),
    Text(String),
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

/// The provenance of a variable's committed state: the construction-time
/// seed, or the transaction that last committed a write to it.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommittedVersion {
    Initial,
    Committed(TxnName),
}

impl CommittedVersion {
    /// The committing transaction's name, if any transaction committed.
    #[must_use]
    pub fn committer(&self) -> Option<&str> {
        match self {
            Self::Initial => None,
            Self::Committed(name) => Some(name),
        }
    }
}

impl Display for CommittedVersion {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Committed(name) => write!(f, "{name}"),
        }
    }
}
