// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! SwiftPaxos with an explicitly chosen fast quorum.
//!
//! The client sends its command to all replicas. Members of the fast quorum
//! acknowledge directly to the client; if all of them do, the command is
//! committed after one round trip. Otherwise each replica waits for the
//! leader's ordering before acknowledging, and any majority completes the
//! slow path. The client observes whichever path finishes first.
//!
//! Unlike the other protocols, the fast quorum is not recomputed per client.
//! It is selected once by [`SwiftPaxos::optimize_fast_quorum`].

use std::sync::Arc;

use log::debug;

use super::{
    LeaderBased, Objective, Optimize, Protocol, Selection, average, optimize_leader,
};
use crate::Region;
use crate::distance::DistanceTable;
use crate::quorum::{Quorum, admit_all, majority, quorums_of_size};

/// Latency model of SwiftPaxos.
#[derive(Clone, Debug)]
pub struct SwiftPaxos {
    replicas: Vec<Region>,
    fast_quorum: Option<Quorum>,
    leader: Option<Region>,
    table: Arc<DistanceTable>,
}

impl SwiftPaxos {
    /// Creates a new instance with neither leader nor fast quorum selected.
    pub const fn new(replicas: Vec<Region>, table: Arc<DistanceTable>) -> Self {
        Self {
            replicas,
            fast_quorum: None,
            leader: None,
            table,
        }
    }

    /// Gives the currently selected fast quorum.
    #[must_use]
    pub const fn fast_quorum(&self) -> Option<&Quorum> {
        self.fast_quorum.as_ref()
    }

    /// Selects a fast quorum (or none).
    pub fn set_fast_quorum(&mut self, fast_quorum: Option<Quorum>) {
        self.fast_quorum = fast_quorum;
    }

    /// Delay of a message from `from` to `to`.
    fn propagate(&self, from: &str, to: &str) -> f64 {
        self.table.one_way_latency(from, to)
    }

    /// Delay of an acknowledgment from `replica` to `to`.
    fn fast_ack(&self, replica: &str, to: &str) -> f64 {
        self.table.one_way_latency(replica, to)
    }

    /// Delay until `replica` has acknowledged `client`'s command on the slow path to `to`.
    ///
    /// The replica needs both the command and the leader's ordering of it.
    fn slow_ack(&self, client: &str, replica: &str, to: &str) -> f64 {
        let direct = self.propagate(client, replica);
        let via_leader = match self.leader.as_deref() {
            Some(leader) => self.propagate(client, leader) + self.fast_ack(leader, replica),
            None => 0.0,
        };
        direct.max(via_leader) + self.table.one_way_latency(replica, to)
    }

    fn slow_path(&self, client: &str) -> f64 {
        if self.replicas.is_empty() {
            return 0.0;
        }
        quorums_of_size(majority(self.replicas.len()), &self.replicas, admit_all)
            .map(|q| {
                q.iter()
                    .map(|r| self.slow_ack(client, r, client))
                    .fold(0.0, f64::max)
            })
            .fold(f64::INFINITY, f64::min)
    }

    /// Selects the fast quorum and leader that minimize `objective` over `clients`.
    ///
    /// Every majority quorum admitted by `admit` is tried as fast quorum,
    /// with the leader chosen among its members by [`optimize_leader`].
    /// A later pair only wins with a strictly lower score, or with an equal
    /// score and a strictly lower best-case mean.
    ///
    /// The winner is left selected. Returns `None` if no quorum is admitted.
    pub fn optimize_fast_quorum<F>(
        &mut self,
        clients: &[Region],
        objective: Objective,
        admit: F,
    ) -> Option<(Quorum, Region, f64)>
    where
        F: Fn(&str, &[Region]) -> bool,
    {
        let replicas = self.replicas.clone();
        let mut best: Option<(Quorum, Region, f64)> = None;
        for quorum in quorums_of_size(majority(replicas.len()), &replicas, admit) {
            self.fast_quorum = Some(quorum.clone());
            let Some((leader, score)) = optimize_leader(self, &quorum.to_vec(), clients, objective)
            else {
                continue;
            };

            let replace = match &best {
                None => true,
                Some((_, _, min)) if score < *min => true,
                Some((best_quorum, best_leader, min)) if score == *min => {
                    let challenger = average(&*self, clients, true);
                    self.fast_quorum = Some(best_quorum.clone());
                    self.leader = Some(best_leader.clone());
                    let incumbent = average(&*self, clients, true);
                    challenger < incumbent
                }
                _ => false,
            };
            if replace {
                best = Some((quorum, leader, score));
            }
        }

        if let Some((quorum, leader, score)) = &best {
            debug!("SP: fast quorum {quorum:?} with leader {leader} scores {score:.2}");
        }
        self.fast_quorum = best.as_ref().map(|(q, _, _)| q.clone());
        self.leader = best.as_ref().map(|(_, l, _)| l.clone());
        best
    }
}

impl Protocol for SwiftPaxos {
    fn name(&self) -> &'static str {
        "SP"
    }

    fn replicas(&self) -> &[Region] {
        &self.replicas
    }

    fn set_replicas(&mut self, replicas: Vec<Region>) {
        self.replicas = replicas;
    }

    fn accept(&self, client: &str, fast: bool) -> f64 {
        let slow = self.slow_path(client);
        if !fast {
            return slow;
        }
        let Some(fast_quorum) = &self.fast_quorum else {
            return slow;
        };
        let fast = fast_quorum
            .iter()
            .map(|r| self.propagate(client, r) + self.fast_ack(r, client))
            .fold(0.0, f64::max);
        fast.min(slow)
    }
}

impl LeaderBased for SwiftPaxos {
    fn leader(&self) -> Option<&str> {
        self.leader.as_deref()
    }

    fn set_leader(&mut self, leader: Option<Region>) {
        self.leader = leader;
    }
}

impl Optimize for SwiftPaxos {
    fn optimize(&mut self, clients: &[Region], objective: Objective) -> Selection {
        match self.optimize_fast_quorum(clients, objective, admit_all) {
            Some((fast_quorum, leader, score)) => Selection {
                leader: Some(leader),
                fast_quorum: Some(fast_quorum),
                score,
            },
            None => Selection {
                leader: None,
                fast_quorum: None,
                score: 0.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quorum::admit_not_in;
    use crate::test_utils::{regions, square, triangle};

    #[test]
    fn slow_and_fast_path() {
        let mut sp = SwiftPaxos::new(regions(&["A", "B", "C"]), triangle());
        sp.set_leader(Some("A".to_owned()));
        // slow_ack(B, r, B) = max(d(B, r), 10 + d(A, r)) + d(r, B)
        // A -> 20, B -> 20, C -> 40
        assert_eq!(sp.accept("B", false), 20.0);
        // without a fast quorum, there is no fast path
        assert_eq!(sp.accept("B", true), 20.0);

        let quorum: Quorum = ["B", "C"].into_iter().collect();
        sp.set_fast_quorum(Some(quorum));
        assert_eq!(sp.accept("B", true), 20.0);
        let quorum: Quorum = ["A", "B"].into_iter().collect();
        sp.set_fast_quorum(Some(quorum));
        // fast path for C via {A, B}: max(40, 20) = 40, slow path is cheaper
        // slow_ack(C, r, C) = max(d(C, r), 20 + d(A, r)) + d(r, C)
        // A -> 40, B -> 40, C -> 40
        assert_eq!(sp.accept("C", true), 40.0);
        assert_eq!(sp.accept("C", false), 40.0);
    }

    #[test]
    fn fast_never_slower() {
        let replicas = regions(&["A", "B", "C", "D"]);
        let mut sp = SwiftPaxos::new(replicas.clone(), square());
        for quorum in quorums_of_size(3, &replicas, admit_all) {
            sp.set_fast_quorum(Some(quorum));
            for leader in &replicas {
                sp.set_leader(Some(leader.clone()));
                for client in &replicas {
                    assert!(sp.accept(client, true) <= sp.accept(client, false));
                }
            }
        }
    }

    #[test]
    fn fast_quorum_optimizer() {
        let replicas = regions(&["A", "B", "C", "D"]);
        let clients = regions(&["A", "B"]);
        let mut sp = SwiftPaxos::new(replicas.clone(), square());
        let (quorum, leader, score) = sp
            .optimize_fast_quorum(&clients, Objective::MinimizeBestCase, admit_all)
            .unwrap();
        assert_eq!(quorum.len(), 3);
        assert!(quorum.contains(&leader));
        assert_eq!(sp.fast_quorum(), Some(&quorum));
        assert_eq!(sp.leader(), Some(leader.as_str()));
        assert_eq!(average(&sp, &clients, true), score);

        // exhaustively confirm nothing beats the selection
        for q in quorums_of_size(3, &replicas, admit_all) {
            sp.set_fast_quorum(Some(q.clone()));
            for l in q.iter() {
                sp.set_leader(Some(l.clone()));
                assert!(average(&sp, &clients, true) >= score);
            }
        }
    }

    #[test]
    fn fast_quorum_optimizer_with_exclusions() {
        let replicas = regions(&["A", "B", "C", "D"]);
        let clients = regions(&["A", "B"]);
        let excluded = regions(&["A"]);
        let mut sp = SwiftPaxos::new(replicas.clone(), square());
        let (quorum, leader, _) = sp
            .optimize_fast_quorum(
                &clients,
                Objective::MinimizeWorstCase,
                admit_not_in(&excluded),
            )
            .unwrap();
        assert_eq!(quorum, ["B", "C", "D"].into_iter().collect::<Quorum>());
        assert_ne!(leader, "A");

        // not enough admissible replicas for a majority
        let mut sp = SwiftPaxos::new(replicas, square());
        let result = sp.optimize_fast_quorum(
            &clients,
            Objective::MinimizeWorstCase,
            admit_not_in(&clients),
        );
        assert!(result.is_none());
        assert_eq!(sp.fast_quorum(), None);
        assert_eq!(sp.leader(), None);
    }

    #[test]
    fn deterministic() {
        let replicas = regions(&["A", "B", "C", "D"]);
        let clients = regions(&["A", "C", "D"]);
        let mut sp1 = SwiftPaxos::new(replicas.clone(), square());
        let mut sp2 = SwiftPaxos::new(replicas, square());
        let s1 = sp1.optimize(&clients, Objective::MinimizeWorstCase);
        let s2 = sp2.optimize(&clients, Objective::MinimizeWorstCase);
        assert_eq!(s1, s2);
    }
}
