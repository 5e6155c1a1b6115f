// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! CURP on top of N²Paxos.
//!
//! The client sends its command to all replicas at once. If a three-quarter
//! quorum that includes the leader answers directly, the command is done
//! after a single round trip. Concurrently, the command goes through
//! N²Paxos and the client takes whichever answer arrives first.

use std::sync::Arc;

use super::paxos::majority_commit;
use super::{LeaderBased, Objective, Optimize, Protocol, Selection, optimize_leader};
use crate::Region;
use crate::distance::DistanceTable;
use crate::latency::mul;
use crate::quorum::{quorums_of_size, three_quarters};

/// Latency model of CURP with N²Paxos as the slow path.
#[derive(Clone, Debug)]
pub struct CurpN2Paxos {
    replicas: Vec<Region>,
    leader: Option<Region>,
    table: Arc<DistanceTable>,
}

impl CurpN2Paxos {
    /// Creates a new instance with no leader selected.
    pub const fn new(replicas: Vec<Region>, table: Arc<DistanceTable>) -> Self {
        Self {
            replicas,
            leader: None,
            table,
        }
    }

    /// Latency of the fastest leader-including three-quarter quorum.
    ///
    /// Infinite if there is no such quorum, e.g., without a leader.
    fn fast_path(&self, client: &str) -> f64 {
        let size = three_quarters(self.replicas.len());
        let leader = self.leader.as_deref();
        let with_leader = |candidate: &str, partial: &[Region]| {
            partial.len() + 1 < size
                || Some(candidate) == leader
                || partial.iter().any(|r| Some(r.as_str()) == leader)
        };

        quorums_of_size(size, &self.replicas, with_leader)
            .map(|q| {
                q.iter()
                    .map(|r| mul(self.table.one_way_latency(client, r), 2.0))
                    .fold(0.0, f64::max)
            })
            .fold(f64::INFINITY, f64::min)
    }
}

impl Protocol for CurpN2Paxos {
    fn name(&self) -> &'static str {
        "Cu"
    }

    fn replicas(&self) -> &[Region] {
        &self.replicas
    }

    fn set_replicas(&mut self, replicas: Vec<Region>) {
        self.replicas = replicas;
    }

    fn accept(&self, client: &str, fast: bool) -> f64 {
        let closest = self.table.closest_replica(client, &self.replicas);
        let slow = majority_commit(
            &self.table,
            &self.replicas,
            self.leader.as_deref(),
            client,
            closest,
        );
        if fast {
            self.fast_path(client).min(slow)
        } else {
            slow
        }
    }
}

impl LeaderBased for CurpN2Paxos {
    fn leader(&self) -> Option<&str> {
        self.leader.as_deref()
    }

    fn set_leader(&mut self, leader: Option<Region>) {
        self.leader = leader;
    }
}

impl Optimize for CurpN2Paxos {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::average;
    use crate::protocol::paxos::Paxos;
    use crate::test_utils::{regions, square, triangle};

    #[test]
    fn fast_path_with_three_replicas() {
        // three-quarter quorum of 3 replicas is all of them
        let mut c = CurpN2Paxos::new(regions(&["A", "B", "C"]), triangle());
        c.set_leader(Some("A".to_owned()));
        assert_eq!(c.fast_path("B"), 20.0);
        assert_eq!(c.fast_path("A"), 40.0);
        // slow path for A: m2b(r) = d(A, r) + d(r, A) -> A: 0, B: 20, C: 40
        assert_eq!(c.accept("A", false), 20.0);
        assert_eq!(c.accept("A", true), 20.0);
        assert_eq!(c.accept("B", true), 20.0);
    }

    #[test]
    fn fast_quorum_must_include_leader() {
        // three-quarter quorum of 4 replicas has 3 members
        let mut c = CurpN2Paxos::new(regions(&["A", "B", "C", "D"]), square());
        c.set_leader(Some("D".to_owned()));
        // {A, B, D}, {A, C, D} and {B, C, D} are admissible, {A, B, C} is not
        // d(A, *) = 0, 5, 50, 30 -> {A, B, D} takes 2 * 30
        assert_eq!(c.fast_path("A"), 60.0);
        c.set_leader(None);
        assert_eq!(c.fast_path("A"), f64::INFINITY);
    }

    #[test]
    fn slow_path_is_n2paxos() {
        let replicas = regions(&["A", "B", "C", "D"]);
        let mut c = CurpN2Paxos::new(replicas.clone(), square());
        let mut n2 = Paxos::new(replicas.clone(), square(), true);
        for leader in &replicas {
            c.set_leader(Some(leader.clone()));
            n2.set_leader(Some(leader.clone()));
            for client in &replicas {
                assert_eq!(c.accept(client, false), n2.accept(client, false));
                assert!(c.accept(client, true) <= c.accept(client, false));
            }
        }
    }

    #[test]
    fn optimizer_breaks_ties_by_best_case() {
        let replicas = regions(&["A", "B", "C", "D"]);
        let clients = regions(&["A", "B"]);
        let mut c = CurpN2Paxos::new(replicas, square());
        let selection = c.optimize(&clients, Objective::MinimizeWorstCase);
        let leader = selection.leader.clone().unwrap();
        assert_eq!(selection.score, average(&c, &clients, false));

        let best_case = average(&c, &clients, true);
        for other in ["A", "B", "C", "D"] {
            c.set_leader(Some(other.to_owned()));
            let worst = average(&c, &clients, false);
            assert!(worst >= selection.score);
            if worst == selection.score {
                assert!(average(&c, &clients, true) >= best_case);
            }
        }

        let again = c.optimize(&clients, Objective::MinimizeWorstCase);
        assert_eq!(again.leader, Some(leader));
    }
}
