// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Leader-based majority consensus.
//!
//! The client sends its command to the leader, which replicates it to all
//! replicas. The command commits once a majority has acknowledged it.
//! In classic Paxos acknowledgments flow back to the leader, which answers
//! the client. In N²Paxos every replica broadcasts its acknowledgment, so the
//! replica closest to the client learns about the commit and answers it.

use std::sync::Arc;

use super::{LeaderBased, Objective, Optimize, Protocol, Selection, optimize_leader};
use crate::Region;
use crate::distance::DistanceTable;
use crate::latency::round;
use crate::quorum::{admit_all, majority, quorums_of_size};

/// Latency model of Paxos and N²Paxos.
#[derive(Clone, Debug)]
pub struct Paxos {
    replicas: Vec<Region>,
    /// Answer from the replica closest to each client (N²Paxos).
    n2: bool,
    leader: Option<Region>,
    table: Arc<DistanceTable>,
}

impl Paxos {
    /// Creates a new instance with no leader selected.
    pub const fn new(replicas: Vec<Region>, table: Arc<DistanceTable>, n2: bool) -> Self {
        Self {
            replicas,
            n2,
            leader: None,
            table,
        }
    }
}

impl Protocol for Paxos {
    fn name(&self) -> &'static str {
        if self.n2 { "N²" } else { "Pa" }
    }

    fn replicas(&self) -> &[Region] {
        &self.replicas
    }

    fn set_replicas(&mut self, replicas: Vec<Region>) {
        self.replicas = replicas;
    }

    fn accept(&self, client: &str, _fast: bool) -> f64 {
        let closest = if self.n2 {
            self.table.closest_replica(client, &self.replicas)
        } else {
            self.leader.as_deref()
        };
        majority_commit(
            &self.table,
            &self.replicas,
            self.leader.as_deref(),
            client,
            closest,
        )
    }
}

impl LeaderBased for Paxos {
    fn leader(&self) -> Option<&str> {
        self.leader.as_deref()
    }

    fn set_leader(&mut self, leader: Option<Region>) {
        self.leader = leader;
    }
}

impl Optimize for Paxos {
    fn optimize(&mut self, clients: &[Region], objective: Objective) -> Selection {
        let candidates = self.replicas.clone();
        let best = optimize_leader(self, &candidates, clients, objective);
        let (leader, score) = best.map_or((None, 0.0), |(l, s)| (Some(l), s));
        Selection {
            leader,
            fast_quorum: None,
            score,
        }
    }
}

/// Latency of committing through the fastest majority quorum.
///
/// For every majority quorum this takes the slowest member's path
/// `client -> leader -> member -> closest`, then the fastest quorum,
/// and finally adds the reply from `closest` to the client.
/// Hops to or from an unselected leader cost nothing.
pub(crate) fn majority_commit(
    table: &DistanceTable,
    replicas: &[Region],
    leader: Option<&str>,
    client: &str,
    closest: Option<&str>,
) -> f64 {
    if replicas.is_empty() {
        return 0.0;
    }
    let hop = |from: Option<&str>, to: Option<&str>| match (from, to) {
        (Some(from), Some(to)) => table.one_way_latency(from, to),
        _ => 0.0,
    };
    let m2b = |replica: &str| {
        let to_leader = hop(Some(client), leader);
        let to_replica = hop(leader, Some(replica));
        let to_closest = hop(Some(replica), closest);
        round(to_leader + to_replica + to_closest)
    };

    let fastest = quorums_of_size(majority(replicas.len()), replicas, admit_all)
        .map(|q| q.iter().map(|r| m2b(r)).fold(0.0, f64::max))
        .fold(f64::INFINITY, f64::min);
    round(fastest + hop(closest, Some(client)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::average;
    use crate::test_utils::{regions, triangle};

    #[test]
    fn fixed_leader() {
        let mut p = Paxos::new(regions(&["A", "B", "C"]), triangle(), false);
        let expected = [("A", 40.0), ("B", 20.0), ("C", 40.0)];
        for (leader, latency) in expected {
            p.set_leader(Some(leader.to_owned()));
            assert_eq!(p.accept("B", false), latency);
            assert_eq!(p.accept("B", true), latency);
        }
    }

    #[test]
    fn optimizer_picks_closest_leader() {
        let mut p = Paxos::new(regions(&["A", "B", "C"]), triangle(), false);
        let clients = regions(&["B"]);
        for objective in [Objective::MinimizeWorstCase, Objective::MinimizeBestCase] {
            let selection = p.optimize(&clients, objective);
            assert_eq!(selection.leader.as_deref(), Some("B"));
            assert_eq!(selection.score, 20.0);
            assert_eq!(p.leader(), Some("B"));
        }
    }

    #[test]
    fn n2_replies_from_closest() {
        let mut p = Paxos::new(regions(&["A", "B", "C"]), triangle(), true);
        p.set_leader(Some("A".to_owned()));
        // m2b(r) = 20 + d(A, r) + d(r, C): A -> 40, B -> 40, C -> 40
        assert_eq!(p.accept("C", false), 40.0);
        // m2b(r) = 10 + d(A, r) + d(r, B): A -> 20, B -> 20, C -> 40
        assert_eq!(p.accept("B", false), 20.0);
        assert_eq!(p.name(), "N²");
    }

    #[test]
    fn deterministic_optimizer() {
        let replicas = regions(&["A", "B", "C"]);
        let clients = regions(&["A", "C"]);
        let mut p1 = Paxos::new(replicas.clone(), triangle(), true);
        let mut p2 = Paxos::new(replicas, triangle(), true);
        let s1 = p1.optimize(&clients, Objective::MinimizeWorstCase);
        let s2 = p2.optimize(&clients, Objective::MinimizeWorstCase);
        assert_eq!(s1, s2);
        assert_eq!(average(&p1, &clients, false), s1.score);
    }

    #[test]
    fn no_replicas() {
        let p = Paxos::new(Vec::new(), triangle(), false);
        assert_eq!(p.accept("A", true), 0.0);
    }
}
