// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Exhaustive search for placements where one protocol clearly wins.
//!
//! A placement consists of `replicas` replica regions drawn from a candidate
//! pool plus `clients` client regions. Exactly [`COLOCATED_CLIENTS`] of the
//! clients sit at replica sites; the others are drawn from the remaining pool.
//! For every placement both contenders are reconfigured and their mean
//! latencies compared. Placements where the first contender is at least
//! 10% faster are reported, best first.
//!
//! The search space grows exponentially with the pool size.
//! Replica placements are evaluated in parallel with [`rayon`], each worker
//! using its own clones of the two protocol instances.

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::Region;
use crate::latency::div;
use crate::protocol::{Objective, Optimize, Protocol, average};
use crate::quorum::{Quorum, admit_all, quorums_of_size, require_when_full};

/// Number of clients located at replica sites in every placement.
pub const COLOCATED_CLIENTS: usize = 2;

/// Minimum relative improvement, in hundredths of a percent, to report a placement.
pub const MIN_IMPROVEMENT: i64 = 1000;

/// Size of the placements to search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Number of replicas.
    pub replicas: usize,
    /// Total number of clients, including the co-located ones.
    pub clients: usize,
}

/// One side of the comparison.
pub struct Contender<P, R> {
    pub protocol: P,
    /// Whether to measure fast-path (best-case) latency.
    pub fast: bool,
    /// Adapts the protocol to `(replicas, clients)` before measuring.
    pub reconfigure: R,
}

impl<P, R> Contender<P, R> {
    pub const fn new(protocol: P, fast: bool, reconfigure: R) -> Self {
        Self {
            protocol,
            fast,
            reconfigure,
        }
    }
}

/// Reconfiguration that installs the replicas and re-optimizes for the clients.
pub fn reoptimize<P: Optimize>(
    objective: Objective,
) -> impl Fn(&mut P, &[Region], &[Region]) + Clone + Send + Sync {
    move |protocol: &mut P, replicas: &[Region], clients: &[Region]| {
        protocol.set_replicas(replicas.to_vec());
        protocol.optimize(clients, objective);
    }
}

/// A placement where the first contender beats the second.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub replicas: Vec<Region>,
    pub clients: Vec<Region>,
    /// Relative improvement of the first contender, in hundredths of a percent.
    pub score: i64,
}

/// Relative improvement of `avg1` over `avg2`, in hundredths of a percent.
///
/// The ratio is rounded to two decimals first, so scores are multiples of 100.
/// Returns `None` if `avg2` is zero.
#[must_use]
pub fn improvement(avg1: f64, avg2: f64) -> Option<i64> {
    if avg2 == 0.0 {
        return None;
    }
    Some((10_000.0 * (1.0 - div(avg1, avg2))).round() as i64)
}

/// Finds all placements from `pool` where `first` is at least 10% faster than `second`.
///
/// Replica sets are only considered if at least one replica satisfies
/// `required`. Results are sorted by score, highest first; ties keep
/// enumeration order, so the output is deterministic.
pub fn search_configurations<P1, R1, P2, R2, F>(
    pool: &[Region],
    params: SearchParams,
    first: &Contender<P1, R1>,
    second: &Contender<P2, R2>,
    required: F,
) -> Vec<Configuration>
where
    P1: Protocol + Clone + Send + Sync,
    P2: Protocol + Clone + Send + Sync,
    R1: Fn(&mut P1, &[Region], &[Region]) + Sync,
    R2: Fn(&mut P2, &[Region], &[Region]) + Sync,
    F: Fn(&str) -> bool + Clone,
{
    if params.clients < COLOCATED_CLIENTS {
        warn!(
            "need at least {COLOCATED_CLIENTS} clients, got {}",
            params.clients
        );
        return Vec::new();
    }

    let admit = require_when_full(params.replicas, required);
    let placements: Vec<Quorum> = quorums_of_size(params.replicas, pool, admit).collect();
    info!(
        "searching {} replica placements from {} regions",
        placements.len(),
        pool.len()
    );

    let mut configs: Vec<Configuration> = placements
        .par_iter()
        .map_init(
            || (first.protocol.clone(), second.protocol.clone()),
            |(p1, p2), placement| {
                evaluate_placement(pool, params, placement, (p1, first), (p2, second))
            },
        )
        .flatten()
        .collect();

    configs.sort_by(|a, b| b.score.cmp(&a.score));
    info!("found {} configurations", configs.len());
    configs
}

/// Evaluates all client choices for one replica placement.
fn evaluate_placement<P1, R1, P2, R2>(
    pool: &[Region],
    params: SearchParams,
    placement: &Quorum,
    (p1, first): (&mut P1, &Contender<P1, R1>),
    (p2, second): (&mut P2, &Contender<P2, R2>),
) -> Vec<Configuration>
where
    P1: Protocol,
    P2: Protocol,
    R1: Fn(&mut P1, &[Region], &[Region]),
    R2: Fn(&mut P2, &[Region], &[Region]),
{
    let replicas = placement.to_vec();
    let others: Vec<Region> = pool
        .iter()
        .filter(|r| !placement.contains(r))
        .cloned()
        .collect();

    let mut found = Vec::new();
    let remote_count = params.clients - COLOCATED_CLIENTS;
    for remote in quorums_of_size(remote_count, &others, admit_all) {
        for colocated in quorums_of_size(COLOCATED_CLIENTS, &replicas, admit_all) {
            let clients: Vec<Region> = remote.iter().chain(colocated.iter()).cloned().collect();
            (first.reconfigure)(p1, &replicas, &clients);
            (second.reconfigure)(p2, &replicas, &clients);
            let avg1 = average(&*p1, &clients, first.fast);
            let avg2 = average(&*p2, &clients, second.fast);
            let Some(score) = improvement(avg1, avg2) else {
                continue;
            };
            if score >= MIN_IMPROVEMENT {
                debug!("{replicas:?} / {clients:?}: {avg1:.2} vs. {avg2:.2} ({score})");
                found.push(Configuration {
                    replicas: replicas.clone(),
                    clients,
                    score,
                });
            }
        }
    }
    found
}
