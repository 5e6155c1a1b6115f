// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Quorums and their enumeration.
//!
//! [`quorums_of_size`] lazily walks all size-`k` subsets of a candidate list.
//! An admission predicate is consulted every time a candidate is about to
//! join a partial subset, which allows whole branches to be pruned early.
//! Subsets are produced in a fixed order: the branch including a candidate
//! is always explored before the branch excluding it.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Region;

/// A set of regions whose joint acknowledgment makes an operation durable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quorum(BTreeSet<Region>);

impl Quorum {
    /// Creates an empty quorum.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the quorum has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if `region` is a member.
    #[must_use]
    pub fn contains(&self, region: &str) -> bool {
        self.0.contains(region)
    }

    /// Iterates over the members in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.0.iter()
    }

    /// Gives the members as a list, in lexicographic order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Region> {
        self.0.iter().cloned().collect()
    }
}

impl<S: Into<Region>> FromIterator<S> for Quorum {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a Quorum {
    type Item = &'a Region;
    type IntoIter = std::collections::btree_set::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Quorum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{r}")?;
        }
        Ok(())
    }
}

/// Size of a simple majority quorum among `n` replicas.
#[must_use]
pub const fn majority(n: usize) -> usize {
    n / 2 + 1
}

/// Size of a three-quarter quorum among `n` replicas.
///
/// This is `floor(3n/4) + 1`, minus one if `3n` is divisible by 4.
#[must_use]
pub const fn three_quarters(n: usize) -> usize {
    let size = 3 * n / 4 + 1;
    if (3 * n) % 4 == 0 { size - 1 } else { size }
}

/// Admission predicate that accepts every candidate.
pub fn admit_all(_candidate: &str, _partial: &[Region]) -> bool {
    true
}

/// Admission predicate that rejects all regions in `excluded`.
pub fn admit_not_in(excluded: &[Region]) -> impl Fn(&str, &[Region]) -> bool + Clone + '_ {
    move |candidate: &str, _: &[Region]| !excluded.iter().any(|r| r == candidate)
}

/// Admission predicate for completing a subset of `size` elements.
///
/// Partial subsets that are still more than one element short are always
/// extended. The final element is only admitted if it, or one of the
/// elements already chosen, satisfies `required`.
pub fn require_when_full<F>(size: usize, required: F) -> impl Fn(&str, &[Region]) -> bool + Clone
where
    F: Fn(&str) -> bool + Clone,
{
    move |candidate: &str, partial: &[Region]| {
        partial.len() + 1 < size
            || required(candidate)
            || partial.iter().any(|r| required(r.as_str()))
    }
}

/// Lazily enumerates all subsets of `candidates` with exactly `size` elements.
///
/// `admit(candidate, partial)` is asked before `candidate` joins the subset
/// built so far. If it refuses, only the branches without `candidate` are
/// explored. Every surviving subset is produced exactly once.
///
/// A size of 0 yields exactly one empty quorum. A size larger than the
/// number of candidates yields nothing.
pub fn quorums_of_size<'a, F>(size: usize, candidates: &'a [Region], admit: F) -> Subsets<'a, F>
where
    F: Fn(&str, &[Region]) -> bool,
{
    Subsets {
        size,
        candidates,
        admit,
        chosen: Vec::with_capacity(size),
        partial: Vec::with_capacity(size),
        next: 0,
        done: false,
    }
}

/// Iterator returned by [`quorums_of_size`].
pub struct Subsets<'a, F> {
    size: usize,
    candidates: &'a [Region],
    admit: F,
    /// Indices of the candidates in the current partial subset.
    chosen: Vec<usize>,
    /// Names of the candidates in the current partial subset.
    partial: Vec<Region>,
    /// Next candidate index to consider.
    next: usize,
    done: bool,
}

impl<F> Subsets<'_, F> {
    /// Drops the most recently chosen candidate and continues without it.
    fn backtrack(&mut self) {
        match self.chosen.pop() {
            Some(i) => {
                self.partial.pop();
                self.next = i + 1;
            }
            None => self.done = true,
        }
    }
}

impl<F> Iterator for Subsets<'_, F>
where
    F: Fn(&str, &[Region]) -> bool,
{
    type Item = Quorum;

    fn next(&mut self) -> Option<Quorum> {
        loop {
            if self.done {
                return None;
            }
            if self.chosen.len() == self.size {
                let quorum = self.partial.iter().cloned().collect();
                self.backtrack();
                return Some(quorum);
            }
            let missing = self.size - self.chosen.len();
            if self.candidates.len() - self.next < missing {
                self.backtrack();
                continue;
            }

            let candidates = self.candidates;
            let candidate = &candidates[self.next];
            if (self.admit)(candidate.as_str(), &self.partial[..]) {
                self.chosen.push(self.next);
                self.partial.push(candidate.clone());
            }
            self.next += 1;
        }
    }
}
