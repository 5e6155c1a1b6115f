// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-precision arithmetic on latencies.
//!
//! All latencies are milliseconds kept at two decimal places.
//! Rounding happens at every step of a computation, not only at the end,
//! so the helpers here are used wherever two latencies are combined.

/// Rounds `x` to two decimal places, halves away from zero.
#[must_use]
pub fn round(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Multiplies and rounds to two decimal places.
#[must_use]
pub fn mul(x: f64, y: f64) -> f64 {
    round(x * y)
}

/// Divides and rounds to two decimal places.
#[must_use]
pub fn div(x: f64, y: f64) -> f64 {
    round(x / y)
}
