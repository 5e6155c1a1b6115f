// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Side-by-side latency comparison of all protocols for one placement.
//!
//! An [`Evaluation`] optimizes every protocol in [`ProtocolKind::ALL`] for
//! the same replicas and clients. A [`Report`] then shows one of them in
//! detail, per client, with its relative advantage over each other protocol.

use std::fmt;
use std::sync::Arc;

use log::debug;
use serde::Serialize;

use crate::Region;
use crate::distance::DistanceTable;
use crate::latency::{div, mul};
use crate::protocol::{AnyProtocol, Objective, Optimize, ProtocolKind, Selection, average};
use crate::quorum::Quorum;

/// Percentage by which `l` is lower than `g`, relative to `g`.
///
/// Two zero latencies are equally fast. Any positive latency compared
/// against zero is infinitely worse.
#[must_use]
pub fn faster(g: f64, l: f64) -> f64 {
    if g == 0.0 {
        if l == 0.0 {
            return 0.0;
        } else if l > 0.0 {
            return f64::INFINITY;
        }
    }
    div(mul(g - l, 100.0), g)
}

/// Signed advantage of `own` over `other`, in percent.
///
/// Positive if `own` is at most as slow as `other`, negative otherwise.
#[must_use]
pub fn advantage(own: f64, other: f64) -> f64 {
    if own <= other {
        faster(other, own)
    } else {
        -faster(own, other)
    }
}

/// All protocols optimized for the same placement.
pub struct Evaluation {
    replicas: Vec<Region>,
    clients: Vec<Region>,
    table: Arc<DistanceTable>,
    models: Vec<(ProtocolKind, AnyProtocol, Selection)>,
}

impl Evaluation {
    /// Instantiates and optimizes every protocol for `replicas` and `clients`.
    pub fn new(
        table: Arc<DistanceTable>,
        replicas: &[Region],
        clients: &[Region],
        objective: Objective,
    ) -> Self {
        let models = ProtocolKind::ALL
            .into_iter()
            .map(|kind| {
                let mut protocol = kind.instantiate(replicas.to_vec(), table.clone());
                let selection = protocol.optimize(clients, objective);
                debug!("{kind}: {selection:?}");
                (kind, protocol, selection)
            })
            .collect();
        Self {
            replicas: replicas.to_vec(),
            clients: clients.to_vec(),
            table,
            models,
        }
    }

    /// Gives the optimized configuration of `kind`.
    #[must_use]
    pub fn selection(&self, kind: ProtocolKind) -> Option<&Selection> {
        self.model(kind).map(|(_, selection)| selection)
    }

    fn model(&self, kind: ProtocolKind) -> Option<(&AnyProtocol, &Selection)> {
        self.models
            .iter()
            .find(|(k, _, _)| *k == kind)
            .map(|(_, protocol, selection)| (protocol, selection))
    }

    /// Builds the detailed report for `kind`, compared against all other protocols.
    #[must_use]
    pub fn report(&self, kind: ProtocolKind) -> Report {
        let Some((protocol, selection)) = self.model(kind) else {
            unreachable!("every protocol kind is evaluated");
        };
        let others: Vec<(ProtocolKind, &AnyProtocol)> = self
            .models
            .iter()
            .filter(|(k, _, _)| *k != kind)
            .map(|(k, p, _)| (*k, p))
            .collect();

        let mut clients = self.clients.clone();
        clients.sort();
        let clients = clients
            .into_iter()
            .map(|client| {
                let one = std::slice::from_ref(&client);
                let best = average(protocol, one, true);
                let worst = average(protocol, one, false);
                let compare = |own: f64, fast: bool| -> Vec<Comparison> {
                    others
                        .iter()
                        .map(|(k, other)| Comparison {
                            protocol: *k,
                            percent: advantage(own, average(*other, one, fast)),
                        })
                        .collect()
                };
                let closest_site = kind.uses_closest_replica().then(|| {
                    let closest = self.table.closest_replica(&client, &self.replicas);
                    closest.map_or("none", |r| self.table.site(r)).to_owned()
                });
                let best_vs = compare(best, true);
                let worst_vs = compare(worst, false);
                ClientReport {
                    client,
                    best,
                    worst,
                    best_vs,
                    worst_vs,
                    closest_site,
                }
            })
            .collect();

        Report {
            protocol: kind,
            leader: selection.leader.clone(),
            fast_quorum: selection.fast_quorum.clone(),
            best: average(protocol, &self.clients, true),
            worst: average(protocol, &self.clients, false),
            clients,
        }
    }
}

/// Advantage over one other protocol.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Comparison {
    pub protocol: ProtocolKind,
    /// Positive if the reported protocol is faster, see [`advantage`].
    pub percent: f64,
}

/// Latencies observed by a single client.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClientReport {
    pub client: Region,
    pub best: f64,
    pub worst: f64,
    pub best_vs: Vec<Comparison>,
    pub worst_vs: Vec<Comparison>,
    /// Site of the replica answering this client, for protocols that reply from there.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closest_site: Option<String>,
}

/// Detailed latency report of one protocol.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Report {
    pub protocol: ProtocolKind,
    pub leader: Option<Region>,
    pub fast_quorum: Option<Quorum>,
    /// Mean fast-path latency over all clients.
    pub best: f64,
    /// Mean slow-path latency over all clients.
    pub worst: f64,
    /// Per-client breakdown, sorted by client name.
    pub clients: Vec<ClientReport>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "protocol: {}", self.protocol)?;
        if let Some(quorum) = &self.fast_quorum {
            let members: Vec<&str> = quorum.iter().map(String::as_str).collect();
            writeln!(f, "quorum:   {}", members.join(", "))?;
        }
        writeln!(f, "leader:   {}", self.leader.as_deref().unwrap_or("none"))?;
        if self.protocol.has_fast_path() {
            writeln!(f, "latency:  {:.3} (best)", self.best)?;
            writeln!(f, "          {:.3} (worst)", self.worst)?;
        } else {
            writeln!(f, "latency:  {:.3}", self.best)?;
        }

        let Some(first) = self.clients.first() else {
            return Ok(());
        };
        let width = self
            .clients
            .iter()
            .map(|c| c.client.chars().count())
            .max()
            .unwrap_or(0);
        writeln!(f)?;
        write!(f, "{:width$}  {:>9}", "", "")?;
        for comparison in &first.best_vs {
            write!(f, "  {:>16}", comparison.protocol.to_string())?;
        }
        writeln!(f)?;

        for client in &self.clients {
            write!(f, "{:width$}  {:>9.3}", client.client, client.best)?;
            write_comparisons(f, &client.best_vs)?;
            if client.best != client.worst {
                write!(f, "{:width$}  {:>9.3}", "", client.worst)?;
                write_comparisons(f, &client.worst_vs)?;
            }
            if let Some(site) = &client.closest_site {
                writeln!(f, "{:width$}  {site:>9}", "")?;
            }
        }
        Ok(())
    }
}

fn write_comparisons(f: &mut fmt::Formatter<'_>, comparisons: &[Comparison]) -> fmt::Result {
    for comparison in comparisons {
        write!(f, "  {:>15.0}%", comparison.percent)?;
    }
    writeln!(f)
}
