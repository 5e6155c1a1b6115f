// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Pairwise latencies between named regions.
//!
//! A [`DistanceTable`] stores round-trip samples between regions as they
//! were measured, which means the table is neither necessarily symmetric nor
//! complete. One-way latencies are derived on demand by
//! [`DistanceTable::one_way_latency`].
//!
//! # Missing samples
//!
//! A pair of regions without any sample in either direction has a one-way
//! latency of **zero**, i.e., the regions are treated as co-located.
//! The same holds for regions the table has never heard of.
//! Downstream optimizers rely on this, so it is not reported as an error.

pub mod cloudping;
mod duration;

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::duration::parse_duration;
use crate::Region;
use crate::latency::div;

/// Errors that can occur while building a [`DistanceTable`].
#[derive(Debug, Error)]
pub enum DistanceTableError {
    #[error("failed to read latency table: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid duration {value:?} on line {line}")]
    InvalidDuration { line: usize, value: String },
    #[error("failed to fetch latency page: {0}")]
    Http(#[from] reqwest::Error),
    #[error("latency page returned status code {code}")]
    Status { code: u16 },
    #[error("malformed latency page: {0}")]
    MalformedPage(String),
}

/// Coarse geographic bucket of a region, derived from its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionFamily {
    Us,
    Asia,
    Europe,
}

impl RegionFamily {
    /// Classifies a region identifier by the `us-`, `ap-` and `eu-` naming convention.
    #[must_use]
    pub fn of(region: &str) -> Option<Self> {
        Self::classify(region, "")
    }

    /// Classifies a full region title such as `US East (Ohio) us-east-2`.
    ///
    /// Only the identifier at the end counts, so the prefix must follow a space.
    #[must_use]
    pub fn of_title(title: &str) -> Option<Self> {
        Self::classify(title, " ")
    }

    fn classify(region: &str, separator: &str) -> Option<Self> {
        let prefixed = |prefix: &str| region.contains(&format!("{separator}{prefix}"));
        if prefixed("us-") {
            Some(Self::Us)
        } else if prefixed("ap-") {
            Some(Self::Asia)
        } else if prefixed("eu-") {
            Some(Self::Europe)
        } else {
            None
        }
    }
}

/// Table of round-trip latency samples between regions.
#[derive(Clone, Debug, Default)]
pub struct DistanceTable {
    /// All known regions, in the order they were first seen.
    regions: Vec<Region>,
    /// Outgoing round-trip samples (in ms) for every known region.
    samples: HashMap<Region, HashMap<Region, f64>>,
    families: HashMap<Region, RegionFamily>,
}

impl DistanceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `region` with an empty row, if it is not yet known.
    pub fn add_region(&mut self, region: &str) {
        if self.samples.contains_key(region) {
            return;
        }
        self.regions.push(region.to_owned());
        self.samples.insert(region.to_owned(), HashMap::new());
        if let Some(family) = RegionFamily::of(region) {
            self.families.insert(region.to_owned(), family);
        }
    }

    /// Registers a region known by its full title, see [`RegionFamily::of_title`].
    pub fn add_titled_region(&mut self, title: &str) {
        if self.samples.contains_key(title) {
            return;
        }
        self.regions.push(title.to_owned());
        self.samples.insert(title.to_owned(), HashMap::new());
        if let Some(family) = RegionFamily::of_title(title) {
            self.families.insert(title.to_owned(), family);
        }
    }

    /// Records a round-trip sample from `from` to `to`, in milliseconds.
    ///
    /// Both regions are registered if necessary.
    /// A later sample for the same ordered pair replaces an earlier one.
    pub fn insert(&mut self, from: &str, to: &str, rtt_ms: f64) {
        self.add_region(from);
        self.add_region(to);
        if let Some(row) = self.samples.get_mut(from) {
            row.insert(to.to_owned(), rtt_ms);
        }
    }

    /// Records a sample without registering `to` as a region.
    ///
    /// This produces a region that is only known from one side of the table.
    pub fn insert_one_sided(&mut self, from: &str, to: &str, rtt_ms: f64) {
        self.add_region(from);
        if let Some(row) = self.samples.get_mut(from) {
            row.insert(to.to_owned(), rtt_ms);
        }
    }

    /// Loads a table from a file with one `<region> <region> <duration>` sample per line.
    ///
    /// See [`Self::from_reader`] for the format.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DistanceTableError> {
        let file = File::open(path.as_ref())?;
        let table = Self::from_reader(BufReader::new(file))?;
        debug!(
            "loaded {} regions from {}",
            table.regions.len(),
            path.as_ref().display()
        );
        Ok(table)
    }

    /// Parses a table with one `<region> <region> <duration>` sample per line.
    ///
    /// Lines that do not consist of exactly three whitespace-separated fields
    /// are skipped. Durations use unit suffixes such as `23ms` or `1.5s` and
    /// are stored as whole milliseconds.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors and on the first unparseable duration.
    /// No partial table is ever returned.
    pub fn from_reader(reader: impl BufRead) -> Result<Self, DistanceTableError> {
        let mut table = Self::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [from, to, duration] = fields[..] else {
                continue;
            };
            let duration =
                parse_duration(duration).ok_or_else(|| DistanceTableError::InvalidDuration {
                    line: i + 1,
                    value: duration.to_owned(),
                })?;
            table.insert(from, to, duration.as_millis() as f64);
        }
        Ok(table)
    }

    /// Gives all known regions in the order they were first seen.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Returns `true` if `region` has a row in this table.
    #[must_use]
    pub fn contains(&self, region: &str) -> bool {
        self.samples.contains_key(region)
    }

    /// Looks up a region by its full name or by its short identifier.
    ///
    /// See [`Self::id_of`] for identifiers. If several regions share an
    /// identifier, the one seen first wins.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&Region> {
        if let Some((region, _)) = self.samples.get_key_value(name) {
            return Some(region);
        }
        self.regions.iter().find(|r| self.id_of(r) == name)
    }

    /// Gives the raw round-trip sample from `from` to `to`, if any.
    #[must_use]
    pub fn sample(&self, from: &str, to: &str) -> Option<f64> {
        self.samples.get(from)?.get(to).copied()
    }

    /// Gives the geographic bucket of a known region.
    #[must_use]
    pub fn family(&self, region: &str) -> Option<RegionFamily> {
        self.families.get(region).copied()
    }

    /// Returns `true` if `region` is known and belongs to `family`.
    #[must_use]
    pub fn in_family(&self, region: &str, family: RegionFamily) -> bool {
        self.family(region) == Some(family)
    }

    /// Estimates the one-way latency between `r1` and `r2`.
    ///
    /// The estimate is half the round-trip sample, averaged over both
    /// directions if both were measured, rounded to two decimals.
    /// Returns 0 for identical regions and whenever no sample exists.
    #[must_use]
    pub fn one_way_latency(&self, r1: &str, r2: &str) -> f64 {
        if r1 == r2 {
            return 0.0;
        }

        let half = |rtt: f64| div(rtt, 2.0);
        match (self.samples.get(r1), self.samples.get(r2)) {
            (Some(row), None) => row.get(r2).copied().map_or(0.0, half),
            (None, Some(row)) => row.get(r1).copied().map_or(0.0, half),
            (None, None) => 0.0,
            (Some(row1), Some(row2)) => match (row1.get(r2), row2.get(r1)) {
                (Some(&l1), Some(&l2)) => div(half(l1) + half(l2), 2.0),
                (Some(&l), None) | (None, Some(&l)) => half(l),
                (None, None) => 0.0,
            },
        }
    }

    /// Finds the replica with the lowest one-way latency to `client`.
    ///
    /// Ties go to the replica listed first. Returns `None` if `replicas` is empty.
    #[must_use]
    pub fn closest_replica<'a>(&self, client: &str, replicas: &'a [Region]) -> Option<&'a str> {
        let mut min = f64::INFINITY;
        let mut closest = None;
        for r in replicas {
            let l = self.one_way_latency(r, client);
            if l < min {
                min = l;
                closest = Some(r.as_str());
            }
        }
        closest
    }

    /// Gives the short identifier of a region, its last whitespace-separated token.
    ///
    /// Returns `"none"` for unknown regions.
    #[must_use]
    pub fn id_of<'a>(&self, region: &'a str) -> &'a str {
        if !self.contains(region) {
            return "none";
        }
        region.split_whitespace().last().unwrap_or(region)
    }

    /// Gives the human-readable place of a region, the text inside its parentheses.
    ///
    /// Falls back to the full name if there is no parenthesized part.
    /// Returns `"none"` for unknown regions.
    #[must_use]
    pub fn site<'a>(&self, region: &'a str) -> &'a str {
        if !self.contains(region) {
            return "none";
        }
        let Some((_, rest)) = region.split_once('(') else {
            return region;
        };
        match rest.split(')').next() {
            Some(site) if !site.is_empty() => site,
            _ => region,
        }
    }
}

impl fmt::Display for DistanceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, region) in self.regions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{region} :")?;
            let mut row: Vec<_> = self.samples[region].iter().collect();
            row.sort_by(|a, b| a.0.cmp(b.0));
            for (dest, rtt) in row {
                writeln!(f, "---  {dest} {rtt}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> DistanceTable {
        let mut table = DistanceTable::new();
        table.insert("A", "B", 20.0);
        table.insert("B", "A", 20.0);
        table.insert("B", "C", 20.0);
        table.insert("C", "B", 20.0);
        table.insert("A", "C", 40.0);
        table.insert("C", "A", 40.0);
        table
    }

    #[test]
    fn one_way_symmetric() {
        let table = triangle();
        assert_eq!(table.one_way_latency("A", "B"), 10.0);
        assert_eq!(table.one_way_latency("B", "C"), 10.0);
        assert_eq!(table.one_way_latency("A", "C"), 20.0);
        for a in table.regions() {
            assert_eq!(table.one_way_latency(a, a), 0.0);
            for b in table.regions() {
                assert_eq!(table.one_way_latency(a, b), table.one_way_latency(b, a));
            }
        }
    }

    #[test]
    fn one_way_asymmetric() {
        let mut table = DistanceTable::new();
        table.insert("A", "B", 30.0);
        table.insert("B", "A", 21.0);
        // (15 + 10.5) / 2 = 12.75
        assert_eq!(table.one_way_latency("A", "B"), 12.75);

        table.insert("A", "C", 7.0);
        assert_eq!(table.one_way_latency("A", "C"), 3.5);
        assert_eq!(table.one_way_latency("C", "A"), 3.5);
    }

    #[test]
    fn one_way_one_sided() {
        let mut table = DistanceTable::new();
        table.insert_one_sided("A", "X", 50.0);
        assert!(!table.contains("X"));
        assert_eq!(table.one_way_latency("A", "X"), 25.0);
        assert_eq!(table.one_way_latency("X", "A"), 25.0);
    }

    #[test]
    fn one_way_missing_is_zero() {
        let mut table = triangle();
        table.add_region("D");
        assert_eq!(table.one_way_latency("A", "D"), 0.0);
        assert_eq!(table.one_way_latency("A", "unknown"), 0.0);
        assert_eq!(table.one_way_latency("foo", "bar"), 0.0);
    }

    #[test]
    fn parse_table() {
        let input = "\
us-east-1 eu-west-1 80ms
eu-west-1 us-east-1 82.9ms

this line is ignored
ap-south-1 ap-south-1 1ms
us-east-1 ap-south-1 0.2s
";
        let table = DistanceTable::from_reader(input.as_bytes()).unwrap();
        assert_eq!(table.regions(), ["us-east-1", "eu-west-1", "ap-south-1"]);
        assert_eq!(table.sample("eu-west-1", "us-east-1"), Some(82.0));
        assert_eq!(table.sample("us-east-1", "ap-south-1"), Some(200.0));
        assert_eq!(table.one_way_latency("us-east-1", "eu-west-1"), 40.5);
        assert_eq!(table.family("us-east-1"), Some(RegionFamily::Us));
        assert_eq!(table.family("eu-west-1"), Some(RegionFamily::Europe));
        assert!(table.in_family("ap-south-1", RegionFamily::Asia));
    }

    #[test]
    fn parse_table_invalid_duration() {
        let input = "a b 10ms\nb c ten\n";
        let err = DistanceTable::from_reader(input.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            DistanceTableError::InvalidDuration { line: 2, .. }
        ));
    }

    #[test]
    fn closest_replica() {
        let table = triangle();
        let replicas = vec!["A".to_owned(), "C".to_owned()];
        assert_eq!(table.closest_replica("B", &replicas), Some("A"));
        assert_eq!(table.closest_replica("C", &replicas), Some("C"));
        assert_eq!(table.closest_replica("B", &[]), None);
    }

    #[test]
    fn families() {
        assert_eq!(RegionFamily::of("us-east-1"), Some(RegionFamily::Us));
        assert_eq!(RegionFamily::of("ap-south-1"), Some(RegionFamily::Asia));
        assert_eq!(RegionFamily::of("sa-east-1"), None);

        assert_eq!(
            RegionFamily::of_title("Europe (Frankfurt) eu-central-1"),
            Some(RegionFamily::Europe)
        );
        // identifier must be a separate word of the title
        assert_eq!(RegionFamily::of_title("Campus-east-1"), None);
        assert_eq!(RegionFamily::of_title("us-east-1"), None);

        let mut table = DistanceTable::new();
        table.add_titled_region("Asia Pacific (Tokyo) ap-northeast-1");
        table.add_titled_region("Campus-east-1");
        assert_eq!(
            table.family("Asia Pacific (Tokyo) ap-northeast-1"),
            Some(RegionFamily::Asia)
        );
        assert_eq!(table.family("Campus-east-1"), None);
    }

    #[test]
    fn id_and_site() {
        let mut table = DistanceTable::new();
        let region = "Europe (Frankfurt) eu-central-1";
        table.add_region(region);
        table.add_region("plain");
        assert_eq!(table.id_of(region), "eu-central-1");
        assert_eq!(table.site(region), "Frankfurt");
        assert_eq!(table.site("plain"), "plain");
        assert_eq!(table.id_of("missing"), "none");
        assert_eq!(table.site("missing"), "none");

        assert_eq!(table.resolve("eu-central-1").map(String::as_str), Some(region));
        assert_eq!(table.resolve(region).map(String::as_str), Some(region));
        assert_eq!(table.resolve("plain").map(String::as_str), Some("plain"));
        assert_eq!(table.resolve("Frankfurt"), None);
    }
}
