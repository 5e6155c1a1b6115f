// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Flint: latency estimation for quorum-based replication protocols.
//!
//! Given measured round-trip times between cloud regions, this crate
//! estimates the commit latency clients observe under Paxos, N²Paxos,
//! CURP and SwiftPaxos, optimizes each protocol's leader (and fast quorum),
//! and searches for replica and client placements where one protocol
//! clearly outperforms another.

#![deny(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod distance;
pub mod export;
pub mod latency;
pub mod logging;
pub mod protocol;
pub mod quorum;
pub mod report;
pub mod search;
#[cfg(test)]
pub mod test_utils;

pub use self::distance::DistanceTable;
pub use self::protocol::{Objective, Optimize, Protocol, ProtocolKind};
pub use self::quorum::Quorum;

/// Name of a region (a site hosting replicas and/or clients).
pub type Region = String;
