// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Flat-text files for deploying a chosen placement.
//!
//! Regions are written by their short identifiers (see
//! [`DistanceTable::id_of`]), so the files can be consumed by scripts that
//! know nothing about the full region names.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use log::info;

use crate::Region;
use crate::distance::DistanceTable;
use crate::latency::mul;
use crate::protocol::{Objective, SwiftPaxos};
use crate::quorum::{Quorum, admit_all};

/// File name of the exported latency sub-table.
pub const LATENCY_FILE: &str = "latency.txt";
/// File name of the exported client-to-replica assignment.
pub const PROXIES_FILE: &str = "proxies.conf";
/// File name of the exported fast quorum and leader.
pub const QUORUM_FILE: &str = "config.info";

/// Round-trip latencies between all pairs of `regions`, including self pairs.
///
/// Duplicate regions are written once, at their first position.
/// Each line reads `<id> <id> <rtt>ms`, where the round trip is twice the
/// one-way latency, without decimals.
/// The output can be loaded again with [`DistanceTable::from_reader`].
#[must_use]
pub fn latency_table(table: &DistanceTable, regions: &[Region]) -> String {
    let mut unique: Vec<&Region> = Vec::with_capacity(regions.len());
    for region in regions {
        if !unique.contains(&region) {
            unique.push(region);
        }
    }

    let mut out = String::new();
    for r1 in &unique {
        for r2 in &unique {
            let rtt = mul(table.one_way_latency(r1, r2), 2.0);
            out.push_str(&format!(
                "{} {} {rtt:.0}ms\n",
                table.id_of(r1),
                table.id_of(r2)
            ));
        }
    }
    out
}

/// Assignment of every client to its closest replica.
///
/// For each replica, a `server_alias <id>` line is followed by the clients
/// it serves, marked `(local)` if co-located, and a blank line.
#[must_use]
pub fn proxies(table: &DistanceTable, replicas: &[Region], clients: &[Region]) -> String {
    let mut out = String::new();
    for replica in replicas {
        let replica_id = table.id_of(replica);
        out.push_str(&format!("server_alias {replica_id}\n"));
        for client in clients {
            let closest = table.closest_replica(client, replicas);
            let closest_id = closest.map_or("none", |r| table.id_of(r));
            if closest_id != replica_id {
                continue;
            }
            let client_id = table.id_of(client);
            if closest_id == client_id {
                out.push_str(&format!("{client_id} (local)\n"));
            } else {
                out.push_str(client_id);
                out.push('\n');
            }
        }
        out.push('\n');
    }
    out
}

/// Members of `quorum`, one per line, with the leader prefixed by `l `.
#[must_use]
pub fn quorum_config(table: &DistanceTable, quorum: &Quorum, leader: &str) -> String {
    let leader_id = table.id_of(leader);
    let mut out = String::new();
    for member in quorum {
        let id = table.id_of(member);
        if id == leader_id {
            out.push_str("l ");
        }
        out.push_str(id);
        out.push('\n');
    }
    out
}

/// Writes [`LATENCY_FILE`], [`PROXIES_FILE`] and [`QUORUM_FILE`] into `dir`.
///
/// The quorum file holds the SwiftPaxos fast quorum and leader optimized
/// for `clients` under `objective`. It is empty if no fast quorum exists.
///
/// # Errors
///
/// Fails if `dir` cannot be created or any file cannot be written.
pub fn write_all(
    dir: &Path,
    table: Arc<DistanceTable>,
    replicas: &[Region],
    clients: &[Region],
    objective: Objective,
) -> io::Result<()> {
    fs::create_dir_all(dir)?;

    let mut regions = replicas.to_vec();
    regions.extend_from_slice(clients);
    fs::write(dir.join(LATENCY_FILE), latency_table(&table, &regions))?;
    fs::write(dir.join(PROXIES_FILE), proxies(&table, replicas, clients))?;

    let mut sp = SwiftPaxos::new(replicas.to_vec(), table.clone());
    let config = match sp.optimize_fast_quorum(clients, objective, admit_all) {
        Some((quorum, leader, _)) => quorum_config(&table, &quorum, &leader),
        None => String::new(),
    };
    fs::write(dir.join(QUORUM_FILE), config)?;

    info!("exported placement to {}", dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{regions, triangle};

    fn named_table() -> DistanceTable {
        let mut table = DistanceTable::new();
        let virginia = "US East (N. Virginia) us-east-1";
        let ireland = "EU (Ireland) eu-west-1";
        let tokyo = "Asia Pacific (Tokyo) ap-northeast-1";
        for (a, b, rtt) in [
            (virginia, ireland, 70.0),
            (virginia, tokyo, 150.0),
            (ireland, tokyo, 210.0),
        ] {
            table.insert(a, b, rtt);
            table.insert(b, a, rtt);
        }
        table
    }

    #[test]
    fn latency_table_round_trips() {
        let table = triangle();
        let text = latency_table(&table, &regions(&["A", "B", "A", "C"]));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 9);
        assert_eq!(lines[0], "A A 0ms");
        assert_eq!(lines[1], "A B 20ms");
        assert_eq!(lines[2], "A C 40ms");

        let reloaded = DistanceTable::from_reader(text.as_bytes()).unwrap();
        assert_eq!(reloaded.regions(), ["A", "B", "C"]);
        assert_eq!(reloaded.one_way_latency("A", "C"), 20.0);
    }

    #[test]
    fn latency_table_uses_ids() {
        let table = named_table();
        let regions = table.regions()[..2].to_vec();
        let text = latency_table(&table, &regions);
        assert!(text.contains("us-east-1 eu-west-1 70ms\n"));
        assert!(text.contains("eu-west-1 eu-west-1 0ms\n"));
    }

    #[test]
    fn proxy_assignment() {
        let table = named_table();
        let all = table.regions().to_vec();
        let replicas = vec![all[0].clone(), all[1].clone()];
        let clients = vec![all[2].clone(), all[1].clone()];
        let text = proxies(&table, &replicas, &clients);
        assert_eq!(
            text,
            "server_alias us-east-1\nap-northeast-1\n\nserver_alias eu-west-1\neu-west-1 (local)\n\n"
        );
    }

    #[test]
    fn leader_is_marked() {
        let table = triangle();
        let quorum: Quorum = ["A", "B"].into_iter().collect();
        assert_eq!(quorum_config(&table, &quorum, "B"), "A\nl B\n");
    }
}
