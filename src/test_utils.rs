// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Utility types and functions for tests.

use std::sync::Arc;

use crate::Region;
use crate::distance::DistanceTable;

/// Turns a list of names into regions.
pub fn regions(names: &[&str]) -> Vec<Region> {
    names.iter().map(|s| (*s).to_owned()).collect()
}

/// Creates a table with both directions of every given round-trip sample.
pub fn symmetric_table(samples: &[(&str, &str, f64)]) -> Arc<DistanceTable> {
    let mut table = DistanceTable::new();
    for (a, b, rtt) in samples {
        table.insert(a, b, *rtt);
        table.insert(b, a, *rtt);
    }
    Arc::new(table)
}

/// Three regions with one-way latencies `A-B = 10`, `B-C = 10`, `A-C = 20`.
pub fn triangle() -> Arc<DistanceTable> {
    symmetric_table(&[("A", "B", 20.0), ("B", "C", 20.0), ("A", "C", 40.0)])
}

/// Four regions with one-way latencies
/// `A-B = 5`, `A-C = 50`, `A-D = 30`, `B-C = 45`, `B-D = 35`, `C-D = 20`.
pub fn square() -> Arc<DistanceTable> {
    symmetric_table(&[
        ("A", "B", 10.0),
        ("A", "C", 100.0),
        ("A", "D", 60.0),
        ("B", "C", 90.0),
        ("B", "D", 70.0),
        ("C", "D", 40.0),
    ])
}
