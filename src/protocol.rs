// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Latency models of quorum-based replication protocols.
//!
//! Every protocol implements [`Protocol`], which estimates the commit latency
//! a client observes under ideal conditions (no failures, no contention),
//! purely from the one-way latencies in a [`DistanceTable`].
//!
//! Protocols that distinguish a fast path from a slow path report the
//! optimistic latency for `fast = true` and the guaranteed latency for
//! `fast = false`. Others ignore the flag.
//!
//! Protocol instances carry mutable state (replicas, leader, fast quorum)
//! and must not be shared between concurrent optimizations.
//! Use one instance per task instead; instances are cheap to clone.

pub mod curp;
pub mod paxos;
pub mod swift_paxos;

use std::fmt;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

pub use self::curp::CurpN2Paxos;
pub use self::paxos::Paxos;
pub use self::swift_paxos::SwiftPaxos;
use crate::Region;
use crate::distance::DistanceTable;
use crate::latency::div;
use crate::quorum::Quorum;

/// Common interface of all protocol latency models.
pub trait Protocol {
    /// Short display label.
    fn name(&self) -> &'static str;

    /// Gives the current replica set.
    fn replicas(&self) -> &[Region];

    /// Replaces the replica set.
    fn set_replicas(&mut self, replicas: Vec<Region>);

    /// Estimates the commit latency observed by `client`, in milliseconds.
    ///
    /// This never modifies the protocol state.
    fn accept(&self, client: &str, fast: bool) -> f64;
}

/// Protocols coordinated by a single designated leader replica.
pub trait LeaderBased: Protocol {
    /// Gives the current leader, if one was selected.
    fn leader(&self) -> Option<&str>;

    /// Selects a leader (or none).
    fn set_leader(&mut self, leader: Option<Region>);
}

/// Objective the optimizers minimize.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Objective {
    /// Mean slow-path latency, ties broken by mean fast-path latency.
    #[default]
    #[serde(rename = "worst")]
    MinimizeWorstCase,
    /// Mean fast-path latency.
    #[serde(rename = "best")]
    MinimizeBestCase,
}

/// Outcome of optimizing a protocol for a set of clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub leader: Option<Region>,
    pub fast_quorum: Option<Quorum>,
    /// Value of the objective for the selected configuration.
    pub score: f64,
}

/// Protocols that can adapt their internal configuration to a client set.
pub trait Optimize: Protocol {
    /// Selects leader (and fast quorum, if any) minimizing `objective` over `clients`.
    ///
    /// The selection is applied to `self` and returned.
    /// Results are deterministic for identical inputs.
    fn optimize(&mut self, clients: &[Region], objective: Objective) -> Selection;
}

/// Arithmetic mean of [`Protocol::accept`] over `clients`, rounded to two decimals.
///
/// Returns 0 for an empty client list.
pub fn average<P: Protocol + ?Sized>(protocol: &P, clients: &[Region], fast: bool) -> f64 {
    if clients.is_empty() {
        return 0.0;
    }
    let total: f64 = clients.iter().map(|c| protocol.accept(c, fast)).sum();
    div(total, clients.len() as f64)
}

/// Finds the leader among `candidates` that minimizes `objective` over `clients`.
///
/// Candidates are tried in order and a later one only replaces the current
/// best if it strictly improves on it. Under [`Objective::MinimizeWorstCase`]
/// an equal worst-case mean is decided by the lower best-case mean.
///
/// The winner is left selected in `protocol`. Returns the leader and its
/// score, or `None` (with no leader selected) if there are no candidates.
pub fn optimize_leader<P: LeaderBased + ?Sized>(
    protocol: &mut P,
    candidates: &[Region],
    clients: &[Region],
    objective: Objective,
) -> Option<(Region, f64)> {
    let mut best: Option<(Region, f64)> = None;
    for candidate in candidates {
        protocol.set_leader(Some(candidate.clone()));
        let score = match objective {
            Objective::MinimizeWorstCase => average(&*protocol, clients, false),
            Objective::MinimizeBestCase => average(&*protocol, clients, true),
        };
        debug!("{}: leader {candidate} scores {score:.2}", protocol.name());

        let replace = match &best {
            None => true,
            Some((_, min)) if score < *min => true,
            Some((leader, min))
                if score == *min && objective == Objective::MinimizeWorstCase =>
            {
                let challenger = average(&*protocol, clients, true);
                protocol.set_leader(Some(leader.clone()));
                let incumbent = average(&*protocol, clients, true);
                challenger < incumbent
            }
            _ => false,
        };
        if replace {
            best = Some((candidate.clone(), score));
        }
    }

    protocol.set_leader(best.as_ref().map(|(leader, _)| leader.clone()));
    best
}

/// The protocols this crate models.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolKind {
    SwiftPaxos,
    Paxos,
    N2Paxos,
    Curp,
}

impl ProtocolKind {
    /// All protocols, in display order.
    pub const ALL: [Self; 4] = [Self::SwiftPaxos, Self::Paxos, Self::N2Paxos, Self::Curp];

    /// Creates a fresh instance with no leader selected.
    pub fn instantiate(self, replicas: Vec<Region>, table: Arc<DistanceTable>) -> AnyProtocol {
        match self {
            Self::SwiftPaxos => AnyProtocol::SwiftPaxos(SwiftPaxos::new(replicas, table)),
            Self::Paxos => AnyProtocol::Paxos(Paxos::new(replicas, table, false)),
            Self::N2Paxos => AnyProtocol::Paxos(Paxos::new(replicas, table, true)),
            Self::Curp => AnyProtocol::Curp(CurpN2Paxos::new(replicas, table)),
        }
    }

    /// Returns `true` for protocols with distinct fast and slow paths.
    #[must_use]
    pub const fn has_fast_path(self) -> bool {
        matches!(self, Self::SwiftPaxos | Self::Curp)
    }

    /// Returns `true` for protocols where clients contact their closest replica.
    #[must_use]
    pub const fn uses_closest_replica(self) -> bool {
        matches!(self, Self::N2Paxos | Self::Curp)
    }
}

/// Any of the modeled protocols, chosen at runtime.
#[derive(Clone, Debug)]
pub enum AnyProtocol {
    Paxos(Paxos),
    Curp(CurpN2Paxos),
    SwiftPaxos(SwiftPaxos),
}

impl AnyProtocol {
    fn inner(&self) -> &dyn Optimize {
        match self {
            Self::Paxos(p) => p,
            Self::Curp(c) => c,
            Self::SwiftPaxos(sp) => sp,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Optimize {
        match self {
            Self::Paxos(p) => p,
            Self::Curp(c) => c,
            Self::SwiftPaxos(sp) => sp,
        }
    }
}

impl Protocol for AnyProtocol {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn replicas(&self) -> &[Region] {
        self.inner().replicas()
    }

    fn set_replicas(&mut self, replicas: Vec<Region>) {
        self.inner_mut().set_replicas(replicas);
    }

    fn accept(&self, client: &str, fast: bool) -> f64 {
        self.inner().accept(client, fast)
    }
}

impl Optimize for AnyProtocol {
    fn optimize(&mut self, clients: &[Region], objective: Objective) -> Selection {
        self.inner_mut().optimize(clients, objective)
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::SwiftPaxos => "SwiftPaxos",
            Self::Paxos => "Paxos",
            Self::N2Paxos => "N²Paxos",
            Self::Curp => "CURP (N²Paxos)",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{regions, triangle};

    #[test]
    fn average_of_nothing() {
        let p = Paxos::new(regions(&["A", "B", "C"]), triangle(), false);
        assert_eq!(average(&p, &[], true), 0.0);
    }

    #[test]
    fn optimize_without_candidates() {
        let mut p = Paxos::new(Vec::new(), triangle(), false);
        let clients = regions(&["A"]);
        assert_eq!(
            optimize_leader(&mut p, &[], &clients, Objective::MinimizeBestCase),
            None
        );
        assert_eq!(p.leader(), None);
    }

    #[test]
    fn instantiate_all() {
        let replicas = regions(&["A", "B", "C"]);
        let clients = regions(&["B"]);
        for kind in ProtocolKind::ALL {
            let mut p = kind.instantiate(replicas.clone(), triangle());
            let selection = p.optimize(&clients, Objective::MinimizeWorstCase);
            assert!(selection.leader.is_some());
            assert_eq!(selection.fast_quorum.is_some(), kind == ProtocolKind::SwiftPaxos);
            assert_eq!(p.replicas(), replicas);
        }
    }
}
