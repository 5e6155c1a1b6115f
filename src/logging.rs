// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging setup shared by the command-line tool and tests.
//!
//! Log lines go to stderr, so tables and CSV written to stdout stay clean.
//! The `RUST_LOG` environment variable overrides the default filter.

use logforth::color::LevelColor;
use logforth::filter::EnvFilter;
use logforth::{Layout, append};

const DEFAULT_FILTER: &str = "flint=info";
const VERBOSE_FILTER: &str = "flint=debug,info";

#[derive(Clone, Copy, Debug)]
struct MinimalLogforthLayout;

impl Layout for MinimalLogforthLayout {
    fn format(
        &self,
        record: &log::Record,
        _: &[Box<dyn logforth::Diagnostic>],
    ) -> anyhow::Result<Vec<u8>> {
        let colors = LevelColor::default();
        let level = colors.colorize_record_level(false, record.level());
        let message = record.args();
        Ok(format!("{level:>5} {message}").into_bytes())
    }
}

/// Installs the logger, showing `info` and above.
pub fn enable_logforth() {
    enable_logforth_with(DEFAULT_FILTER);
}

/// Installs the logger, also showing `debug` lines of this crate.
///
/// The optimizers log every candidate they evaluate at this level.
pub fn enable_logforth_verbose() {
    enable_logforth_with(VERBOSE_FILTER);
}

fn enable_logforth_with(default_filter: &str) {
    let filter = EnvFilter::from_default_env_or(default_filter);
    let to_append = append::Stderr::default().with_layout(MinimalLogforthLayout);
    logforth::builder()
        .dispatch(|d| d.filter(filter).append(to_append))
        .apply();
}

#[cfg(test)]
mod tests {
    use log::{Level, debug, error, info, log_enabled, trace, warn};

    use super::*;

    #[test]
    fn default_level() {
        enable_logforth();

        assert!(log_enabled!(Level::Error));
        assert!(log_enabled!(Level::Warn));
        assert!(log_enabled!(Level::Info));
        assert!(!log_enabled!(Level::Trace));

        trace!("trace");
        debug!("debug");
        info!("info");
        warn!("warn");
        error!("error");
    }
}
